//! Public key fingerprints
//!
//! Format: `SHA256:` followed by the unpadded base64url encoding of the
//! SHA-256 digest of the key's SubjectPublicKeyInfo DER. The prefix names the
//! digest and is part of the contract; a different digest means a different
//! prefix.

use crate::error::{CryptoError, Result};
use crate::keys::{KeyPair, PublicKey};
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::fmt;

pub const FINGERPRINT_PREFIX: &str = "SHA256:";

/// A versioned public key fingerprint
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Fingerprint(String);

impl Fingerprint {
    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn into_string(self) -> String {
        self.0
    }
}

impl fmt::Display for Fingerprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for Fingerprint {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

pub fn compute_fingerprint(public_key: &PublicKey) -> Result<Fingerprint> {
    let der = public_key
        .to_spki_der()
        .map_err(|e| CryptoError::Fingerprint(e.to_string()))?;
    let digest = Sha256::digest(&der);
    Ok(Fingerprint(format!(
        "{}{}",
        FINGERPRINT_PREFIX,
        URL_SAFE_NO_PAD.encode(digest)
    )))
}

impl KeyPair {
    /// Fingerprint of the public half. Fails once the pair is wiped.
    pub fn fingerprint(&self) -> Result<Fingerprint> {
        compute_fingerprint(self.public_key()?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::keys::{KeyGenerator, StandardKeyGenerator};
    use keywarden_core::KeySpec;

    #[test]
    fn test_fingerprint_format() {
        let kp = StandardKeyGenerator::new().generate(&KeySpec::ec("P-256")).unwrap();
        let fp = kp.fingerprint().unwrap();

        let encoded = fp.as_str().strip_prefix(FINGERPRINT_PREFIX).unwrap();
        // 32 byte digest, unpadded
        assert_eq!(encoded.len(), 43);
        assert!(!encoded.contains('='));
        assert!(!encoded.contains('+'));
        assert!(!encoded.contains('/'));
        assert_eq!(URL_SAFE_NO_PAD.decode(encoded).unwrap().len(), 32);
    }

    #[test]
    fn test_fingerprint_is_deterministic() {
        let kp = StandardKeyGenerator::new().generate(&KeySpec::ec("P-384")).unwrap();
        let pk = kp.public_key().unwrap();
        assert_eq!(compute_fingerprint(pk).unwrap(), compute_fingerprint(pk).unwrap());
        assert_eq!(kp.fingerprint().unwrap(), compute_fingerprint(pk).unwrap());
    }

    #[test]
    fn test_fingerprint_matches_spki_digest() {
        let kp = StandardKeyGenerator::new().generate(&KeySpec::ec("P-256")).unwrap();
        let der = kp.public_key().unwrap().to_spki_der().unwrap();
        let expected = format!("SHA256:{}", URL_SAFE_NO_PAD.encode(Sha256::digest(&der)));
        assert_eq!(kp.fingerprint().unwrap().as_str(), expected);
    }

    #[test]
    fn test_distinct_keys_have_distinct_fingerprints() {
        let gen = StandardKeyGenerator::new();
        let a = gen.generate(&KeySpec::ec("P-256")).unwrap();
        let b = gen.generate(&KeySpec::ec("P-256")).unwrap();
        assert_ne!(a.fingerprint().unwrap(), b.fingerprint().unwrap());
    }

    #[test]
    fn test_fingerprint_after_wipe_fails() {
        let mut kp = StandardKeyGenerator::new().generate(&KeySpec::ec("P-256")).unwrap();
        kp.wipe();
        assert!(matches!(kp.fingerprint(), Err(CryptoError::KeyWiped)));
    }
}
