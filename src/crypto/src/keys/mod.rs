//! Generated key material and its secure wipe discipline
//!
//! A [`KeyPair`] owns the private key, the matching public key and a raw
//! DER copy of the private key kept solely so it can be overwritten. The
//! pair is a scoped resource: [`KeyPair::wipe`] runs explicitly at the end of
//! a rotation and again from `Drop`, so every exit path (error, early return,
//! cancelled future, panic unwind) releases the material.

pub mod generation;

pub use generation::{KeyGenerator, StandardKeyGenerator};

use crate::error::{CryptoError, Result};
use crate::validate::{Algorithm, KeyParams};
use chrono::{DateTime, Utc};
use pkcs8::{EncodePrivateKey, EncodePublicKey, LineEnding};
use rsa::{RsaPrivateKey, RsaPublicKey};
use std::fmt;
use zeroize::{Zeroize, Zeroizing};

/// Private key, tagged by algorithm and curve
pub enum PrivateKey {
    P256(p256::SecretKey),
    P384(p384::SecretKey),
    P521(p521::SecretKey),
    Rsa(Box<RsaPrivateKey>),
}

/// Public key, tagged by algorithm and curve
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PublicKey {
    P256(p256::PublicKey),
    P384(p384::PublicKey),
    P521(p521::PublicKey),
    Rsa(RsaPublicKey),
}

impl PrivateKey {
    pub fn public_key(&self) -> PublicKey {
        match self {
            PrivateKey::P256(k) => PublicKey::P256(k.public_key()),
            PrivateKey::P384(k) => PublicKey::P384(k.public_key()),
            PrivateKey::P521(k) => PublicKey::P521(k.public_key()),
            PrivateKey::Rsa(k) => PublicKey::Rsa(k.to_public_key()),
        }
    }

    /// PKCS#8 `PrivateKeyInfo`, DER encoded
    pub fn to_pkcs8_der(&self) -> Result<Zeroizing<Vec<u8>>> {
        let doc = match self {
            PrivateKey::P256(k) => k.to_pkcs8_der(),
            PrivateKey::P384(k) => k.to_pkcs8_der(),
            PrivateKey::P521(k) => k.to_pkcs8_der(),
            PrivateKey::Rsa(k) => k.to_pkcs8_der(),
        }
        .map_err(|e| CryptoError::serialization("marshal private key to PKCS8", e))?;
        Ok(doc.to_bytes())
    }

    /// PKCS#8 wrapped in a `PRIVATE KEY` PEM block
    pub fn to_pkcs8_pem(&self) -> Result<Zeroizing<String>> {
        match self {
            PrivateKey::P256(k) => k.to_pkcs8_pem(LineEnding::LF),
            PrivateKey::P384(k) => k.to_pkcs8_pem(LineEnding::LF),
            PrivateKey::P521(k) => k.to_pkcs8_pem(LineEnding::LF),
            PrivateKey::Rsa(k) => k.to_pkcs8_pem(LineEnding::LF),
        }
        .map_err(|e| CryptoError::serialization("marshal private key to PKCS8 PEM", e))
    }

    /// Algorithm specific DER (SEC1 for EC, PKCS#1 for RSA), used only as
    /// the wipe-tracked raw copy.
    fn to_raw_der(&self) -> Result<Vec<u8>> {
        use rsa::pkcs1::EncodeRsaPrivateKey;

        let mut der = match self {
            PrivateKey::P256(k) => k.to_sec1_der(),
            PrivateKey::P384(k) => k.to_sec1_der(),
            PrivateKey::P521(k) => k.to_sec1_der(),
            PrivateKey::Rsa(k) => {
                let doc = k
                    .to_pkcs1_der()
                    .map_err(|e| CryptoError::serialization("marshal RSA private key for wipe tracking", e))?;
                return Ok(doc.as_bytes().to_vec());
            }
        }
        .map_err(|e| CryptoError::serialization("marshal EC private key for wipe tracking", e))?;
        Ok(std::mem::take(&mut *der))
    }
}

impl fmt::Debug for PrivateKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let kind = match self {
            PrivateKey::P256(_) => "P256",
            PrivateKey::P384(_) => "P384",
            PrivateKey::P521(_) => "P521",
            PrivateKey::Rsa(_) => "Rsa",
        };
        write!(f, "PrivateKey::{}(..)", kind)
    }
}

impl PublicKey {
    /// SubjectPublicKeyInfo, DER encoded
    pub fn to_spki_der(&self) -> Result<Vec<u8>> {
        let doc = match self {
            PublicKey::P256(k) => k.to_public_key_der(),
            PublicKey::P384(k) => k.to_public_key_der(),
            PublicKey::P521(k) => k.to_public_key_der(),
            PublicKey::Rsa(k) => k.to_public_key_der(),
        }
        .map_err(|e| CryptoError::serialization("marshal public key to PKIX", e))?;
        Ok(doc.into_vec())
    }

    /// SubjectPublicKeyInfo wrapped in a `PUBLIC KEY` PEM block
    pub fn to_spki_pem(&self) -> Result<String> {
        match self {
            PublicKey::P256(k) => k.to_public_key_pem(LineEnding::LF),
            PublicKey::P384(k) => k.to_public_key_pem(LineEnding::LF),
            PublicKey::P521(k) => k.to_public_key_pem(LineEnding::LF),
            PublicKey::Rsa(k) => k.to_public_key_pem(LineEnding::LF),
        }
        .map_err(|e| CryptoError::serialization("marshal public key to PKIX PEM", e))
    }
}

/// Generated key pair.
///
/// After [`wipe`](KeyPair::wipe) the pair is a tombstone: metadata (key ID,
/// algorithm, creation time) stays readable, any access to key material
/// returns [`CryptoError::KeyWiped`].
pub struct KeyPair {
    key_id: String,
    params: KeyParams,
    created_at: DateTime<Utc>,
    private_key: Option<PrivateKey>,
    public_key: Option<PublicKey>,
    raw_private: Vec<u8>,
    wiped: bool,
}

impl KeyPair {
    pub(crate) fn new(
        key_id: String,
        params: KeyParams,
        private_key: PrivateKey,
        created_at: DateTime<Utc>,
    ) -> Result<Self> {
        let raw_private = private_key.to_raw_der()?;
        let public_key = private_key.public_key();
        Ok(Self {
            key_id,
            params,
            created_at,
            private_key: Some(private_key),
            public_key: Some(public_key),
            raw_private,
            wiped: false,
        })
    }

    /// `{alg}-{param}-{YYYYMMDD}-{6hex}`
    pub fn key_id(&self) -> &str {
        &self.key_id
    }

    pub fn algorithm(&self) -> Algorithm {
        self.params.algorithm()
    }

    pub fn params(&self) -> KeyParams {
        self.params
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    pub fn private_key(&self) -> Result<&PrivateKey> {
        self.private_key.as_ref().ok_or(CryptoError::KeyWiped)
    }

    pub fn public_key(&self) -> Result<&PublicKey> {
        self.public_key.as_ref().ok_or(CryptoError::KeyWiped)
    }

    pub fn is_wiped(&self) -> bool {
        self.wiped
    }

    /// Zero the raw private buffer and the key's secret scalars, then drop
    /// both key references. Idempotent.
    pub fn wipe(&mut self) {
        if self.wiped {
            return;
        }

        // zero in place; the allocation is released on drop
        self.raw_private.as_mut_slice().zeroize();

        // RSA keys zero d, the primes and the CRT values on drop; EC secret
        // scalars do the same
        drop(self.private_key.take());
        self.public_key = None;
        self.wiped = true;

        tracing::debug!(key_id = %self.key_id, "key material wiped");
    }
}

impl Drop for KeyPair {
    fn drop(&mut self) {
        self.wipe();
    }
}

impl fmt::Debug for KeyPair {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("KeyPair")
            .field("key_id", &self.key_id)
            .field("params", &self.params)
            .field("created_at", &self.created_at)
            .field("wiped", &self.wiped)
            .finish_non_exhaustive()
    }
}
