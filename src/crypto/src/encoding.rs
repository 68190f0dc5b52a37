//! Key serialization: PEM, DER and JWK
//!
//! Private keys are always PKCS#8, public keys always SubjectPublicKeyInfo;
//! PEM and DER differ only in the text wrapping. JWK follows RFC 7517/7518.

use crate::error::{CryptoError, Result};
use crate::keys::{PrivateKey, PublicKey};
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use rsa::traits::{PrivateKeyParts, PublicKeyParts};
use serde::Serialize;
use std::fmt;
use std::str::FromStr;
use zeroize::{Zeroize, ZeroizeOnDrop, Zeroizing};

/// Supported key encodings
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum KeyEncoding {
    #[default]
    Pem,
    Der,
    Jwk,
}

impl KeyEncoding {
    pub const ALL: [KeyEncoding; 3] = [KeyEncoding::Pem, KeyEncoding::Der, KeyEncoding::Jwk];

    pub fn as_str(&self) -> &'static str {
        match self {
            KeyEncoding::Pem => "PEM",
            KeyEncoding::Der => "DER",
            KeyEncoding::Jwk => "JWK",
        }
    }

    /// Conventional file extension for this encoding
    pub fn extension(&self) -> &'static str {
        match self {
            KeyEncoding::Pem => "pem",
            KeyEncoding::Der => "der",
            KeyEncoding::Jwk => "jwk",
        }
    }

    pub fn encoder(&self) -> Box<dyn KeyEncoder> {
        match self {
            KeyEncoding::Pem => Box::new(PemEncoder),
            KeyEncoding::Der => Box::new(DerEncoder),
            KeyEncoding::Jwk => Box::new(JwkEncoder),
        }
    }
}

impl FromStr for KeyEncoding {
    type Err = CryptoError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "PEM" => Ok(KeyEncoding::Pem),
            "DER" => Ok(KeyEncoding::Der),
            "JWK" => Ok(KeyEncoding::Jwk),
            other => Err(CryptoError::UnsupportedEncoding(other.to_string())),
        }
    }
}

impl fmt::Display for KeyEncoding {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Serializes key material in one encoding.
pub trait KeyEncoder: Send + Sync {
    fn encoding(&self) -> KeyEncoding;

    fn encode_private(&self, key: &PrivateKey) -> Result<Zeroizing<Vec<u8>>>;

    fn encode_public(&self, key: &PublicKey) -> Result<Vec<u8>>;
}

/// Look up the encoder for an encoding name (`PEM`, `DER`, `JWK`).
pub fn new_key_encoder(encoding: &str) -> Result<Box<dyn KeyEncoder>> {
    Ok(encoding.parse::<KeyEncoding>()?.encoder())
}

/// PKCS#8 / SPKI in PEM text blocks
#[derive(Debug, Clone, Copy, Default)]
pub struct PemEncoder;

impl KeyEncoder for PemEncoder {
    fn encoding(&self) -> KeyEncoding {
        KeyEncoding::Pem
    }

    fn encode_private(&self, key: &PrivateKey) -> Result<Zeroizing<Vec<u8>>> {
        let mut pem = key.to_pkcs8_pem()?;
        Ok(Zeroizing::new(std::mem::take(&mut *pem).into_bytes()))
    }

    fn encode_public(&self, key: &PublicKey) -> Result<Vec<u8>> {
        Ok(key.to_spki_pem()?.into_bytes())
    }
}

/// PKCS#8 / SPKI as raw DER
#[derive(Debug, Clone, Copy, Default)]
pub struct DerEncoder;

impl KeyEncoder for DerEncoder {
    fn encoding(&self) -> KeyEncoding {
        KeyEncoding::Der
    }

    fn encode_private(&self, key: &PrivateKey) -> Result<Zeroizing<Vec<u8>>> {
        key.to_pkcs8_der()
    }

    fn encode_public(&self, key: &PublicKey) -> Result<Vec<u8>> {
        key.to_spki_der()
    }
}

/// JSON Web Key (RFC 7517)
#[derive(Debug, Clone, Copy, Default)]
pub struct JwkEncoder;

#[derive(Debug, Serialize, Zeroize, ZeroizeOnDrop)]
struct Jwk {
    kty: String,
    #[serde(rename = "use")]
    key_use: String,

    // RSA
    #[serde(skip_serializing_if = "Option::is_none")]
    n: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    e: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    d: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    p: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    q: Option<String>,

    // EC; `d` is shared with RSA
    #[serde(skip_serializing_if = "Option::is_none")]
    crv: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    x: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    y: Option<String>,
}

impl Jwk {
    fn new(kty: &str) -> Self {
        Self {
            kty: kty.to_string(),
            key_use: "sig".to_string(),
            n: None,
            e: None,
            d: None,
            p: None,
            q: None,
            crv: None,
            x: None,
            y: None,
        }
    }

    fn to_json(&self) -> Result<Vec<u8>> {
        serde_json::to_vec(self).map_err(|e| CryptoError::serialization("marshal JWK", e))
    }
}

fn b64(bytes: &[u8]) -> String {
    URL_SAFE_NO_PAD.encode(bytes)
}

/// Fill `crv`, `x` and `y` from an EC public key. Coordinates come out of the
/// uncompressed SEC1 point already left-padded to the field size.
macro_rules! ec_public_members {
    ($jwk:expr, $key:expr, $curve:literal) => {{
        use p256::elliptic_curve::sec1::ToEncodedPoint;
        let point = $key.to_encoded_point(false);
        let (x, y) = match (point.x(), point.y()) {
            (Some(x), Some(y)) => (x, y),
            _ => {
                return Err(CryptoError::serialization(
                    "marshal JWK",
                    "EC public key is the identity point",
                ))
            }
        };
        $jwk.crv = Some($curve.to_string());
        $jwk.x = Some(b64(x));
        $jwk.y = Some(b64(y));
    }};
}

fn ec_public_jwk(key: &PublicKey) -> Result<Jwk> {
    let mut jwk = Jwk::new("EC");
    match key {
        PublicKey::P256(k) => ec_public_members!(jwk, k, "P-256"),
        PublicKey::P384(k) => ec_public_members!(jwk, k, "P-384"),
        PublicKey::P521(k) => ec_public_members!(jwk, k, "P-521"),
        PublicKey::Rsa(_) => return Err(CryptoError::serialization("marshal JWK", "not an EC key")),
    }
    Ok(jwk)
}

fn ec_private_jwk(key: &PrivateKey, scalar: &[u8]) -> Result<Jwk> {
    let mut jwk = ec_public_jwk(&key.public_key())?;
    jwk.d = Some(b64(scalar));
    Ok(jwk)
}

fn rsa_public_jwk(key: &impl PublicKeyParts) -> Jwk {
    let mut jwk = Jwk::new("RSA");
    jwk.n = Some(b64(&key.n().to_bytes_be()));
    jwk.e = Some(b64(&key.e().to_bytes_be()));
    jwk
}

impl KeyEncoder for JwkEncoder {
    fn encoding(&self) -> KeyEncoding {
        KeyEncoding::Jwk
    }

    fn encode_private(&self, key: &PrivateKey) -> Result<Zeroizing<Vec<u8>>> {
        let jwk = match key {
            PrivateKey::P256(k) => ec_private_jwk(key, &k.to_bytes())?,
            PrivateKey::P384(k) => ec_private_jwk(key, &k.to_bytes())?,
            PrivateKey::P521(k) => ec_private_jwk(key, &k.to_bytes())?,
            PrivateKey::Rsa(k) => {
                let mut jwk = rsa_public_jwk(&**k);
                jwk.d = Some(b64(&Zeroizing::new(k.d().to_bytes_be())));
                let primes = k.primes();
                if primes.len() >= 2 {
                    jwk.p = Some(b64(&Zeroizing::new(primes[0].to_bytes_be())));
                    jwk.q = Some(b64(&Zeroizing::new(primes[1].to_bytes_be())));
                }
                jwk
            }
        };
        jwk.to_json().map(Zeroizing::new)
    }

    fn encode_public(&self, key: &PublicKey) -> Result<Vec<u8>> {
        let jwk = match key {
            PublicKey::Rsa(k) => rsa_public_jwk(k),
            ec => ec_public_jwk(ec)?,
        };
        jwk.to_json()
    }
}
