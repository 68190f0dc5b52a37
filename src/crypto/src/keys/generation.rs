use super::{KeyPair, PrivateKey};
use crate::error::{CryptoError, Result};
use crate::validate::{validate_key_spec, Curve, KeyParams};
use chrono::{DateTime, Utc};
use keywarden_core::KeySpec;
use rand_core::{OsRng, RngCore};
use rsa::RsaPrivateKey;
use zeroize::Zeroizing;

/// Number of random bytes in the key ID suffix (6 hex chars).
const KEY_ID_RANDOM_BYTES: usize = 3;

/// Draws before giving up on finding a scalar in `[1, n)`. A single retry is
/// already improbable for every supported curve.
const MAX_SCALAR_ATTEMPTS: usize = 8;

const P256_SCALAR_LEN: usize = 32;
const P384_SCALAR_LEN: usize = 48;
/// 521 bits in 66 bytes; only the lowest bit of the first byte is used
const P521_SCALAR_LEN: usize = 66;
const P521_TOP_BYTE_MASK: u8 = 0x01;

/// Produces fresh key pairs for a key spec.
///
/// Implementations must run the spec through [`validate_key_spec`] before
/// touching the random source.
pub trait KeyGenerator: Send + Sync {
    fn generate(&self, spec: &KeySpec) -> Result<KeyPair>;
}

/// Key generator backed by the operating system CSPRNG
#[derive(Debug, Clone, Copy, Default)]
pub struct StandardKeyGenerator;

impl StandardKeyGenerator {
    pub fn new() -> Self {
        Self
    }
}

impl KeyGenerator for StandardKeyGenerator {
    fn generate(&self, spec: &KeySpec) -> Result<KeyPair> {
        let validation = validate_key_spec(spec);
        for warning in &validation.warnings {
            tracing::warn!(algorithm = %spec.algorithm, "{}", warning);
        }
        let params = validation.result?;

        let created_at = Utc::now();
        let private_key = generate_private_key(params)?;
        let key_id = new_key_id(params, created_at)?;

        tracing::debug!(key_id = %key_id, algorithm = %params.algorithm(), "generated key pair");
        KeyPair::new(key_id, params, private_key, created_at)
    }
}

fn generate_private_key(params: KeyParams) -> Result<PrivateKey> {
    let key = match params {
        KeyParams::Ec(Curve::P256) => PrivateKey::P256(random_secret_key(
            P256_SCALAR_LEN,
            0xff,
            p256::SecretKey::from_slice,
        )?),
        KeyParams::Ec(Curve::P384) => PrivateKey::P384(random_secret_key(
            P384_SCALAR_LEN,
            0xff,
            p384::SecretKey::from_slice,
        )?),
        KeyParams::Ec(Curve::P521) => PrivateKey::P521(random_secret_key(
            P521_SCALAR_LEN,
            P521_TOP_BYTE_MASK,
            p521::SecretKey::from_slice,
        )?),
        KeyParams::Rsa { bits } => {
            let key = RsaPrivateKey::new(&mut OsRng, bits as usize).map_err(|e| {
                CryptoError::KeyGeneration {
                    algorithm: params.algorithm(),
                    reason: e.to_string(),
                }
            })?;
            PrivateKey::Rsa(Box::new(key))
        }
    };
    Ok(key)
}

/// Rejection-samples a big-endian scalar from the OS random source until
/// `from_slice` accepts it. Random source failures are returned, never
/// panicked on.
fn random_secret_key<K, E>(
    len: usize,
    top_byte_mask: u8,
    mut from_slice: impl FnMut(&[u8]) -> std::result::Result<K, E>,
) -> Result<K> {
    let mut scalar = Zeroizing::new(vec![0u8; len]);
    for _ in 0..MAX_SCALAR_ATTEMPTS {
        OsRng
            .try_fill_bytes(scalar.as_mut_slice())
            .map_err(|e| CryptoError::RandomGeneration(e.to_string()))?;
        scalar[0] &= top_byte_mask;
        if let Ok(key) = from_slice(&scalar) {
            return Ok(key);
        }
    }
    Err(CryptoError::RandomGeneration(format!(
        "no valid scalar after {} attempts",
        MAX_SCALAR_ATTEMPTS
    )))
}

/// `{alg}-{param}-{YYYYMMDD}-{6hex}`, e.g. `ec-P-256-20260101-3fa9c1`
pub(crate) fn new_key_id(params: KeyParams, created_at: DateTime<Utc>) -> Result<String> {
    let mut suffix = [0u8; KEY_ID_RANDOM_BYTES];
    OsRng
        .try_fill_bytes(&mut suffix)
        .map_err(|e| CryptoError::RandomGeneration(e.to_string()))?;

    Ok(format!(
        "{}-{}-{}-{}",
        params.algorithm().as_str().to_lowercase(),
        params.id_param(),
        created_at.format("%Y%m%d"),
        hex::encode(suffix)
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::KeySpecError;
    use crate::validate::Algorithm;
    use chrono::TimeZone;

    fn assert_key_id_shape(id: &str, prefix: &str) {
        let rest = id.strip_prefix(prefix).unwrap();
        let (date, hex_part) = rest.split_once('-').unwrap();
        assert_eq!(date.len(), 8);
        assert!(date.chars().all(|c| c.is_ascii_digit()));
        assert_eq!(hex_part.len(), 6);
        assert!(hex_part.chars().all(|c| c.is_ascii_hexdigit() && !c.is_ascii_uppercase()));
    }

    #[test]
    fn test_generate_ec_curves() {
        let gen = StandardKeyGenerator::new();
        for curve in ["P-256", "P-384", "P-521"] {
            let kp = gen.generate(&KeySpec::ec(curve)).unwrap();
            assert_eq!(kp.algorithm(), Algorithm::Ec);
            assert_key_id_shape(kp.key_id(), &format!("ec-{}-", curve));
        }
    }

    #[test]
    fn test_generate_rsa_legacy() {
        let kp = StandardKeyGenerator::new()
            .generate(&KeySpec::rsa(2048, true))
            .unwrap();
        assert_eq!(kp.params(), KeyParams::Rsa { bits: 2048 });
        assert_key_id_shape(kp.key_id(), "rsa-2048-");
        match kp.public_key().unwrap() {
            crate::keys::PublicKey::Rsa(pk) => {
                use rsa::traits::PublicKeyParts;
                assert_eq!(pk.size() * 8, 2048);
            }
            other => panic!("unexpected key type: {other:?}"),
        }
    }

    #[test]
    fn test_generate_rejects_invalid_spec() {
        let err = StandardKeyGenerator::new()
            .generate(&KeySpec::rsa(2048, false))
            .unwrap_err();
        assert!(matches!(
            err,
            CryptoError::Validation(KeySpecError::LegacyKeySize { size: 2048, .. })
        ));

        let err = StandardKeyGenerator::new()
            .generate(&KeySpec::ec("P-192"))
            .unwrap_err();
        assert!(matches!(err, CryptoError::Validation(KeySpecError::UnsupportedCurve(_))));
    }

    #[test]
    fn test_key_id_uses_creation_date() {
        let at = Utc.with_ymd_and_hms(2026, 3, 9, 12, 0, 0).unwrap();
        let id = new_key_id(KeyParams::Rsa { bits: 3072 }, at).unwrap();
        assert_key_id_shape(&id, "rsa-3072-");
        assert!(id.starts_with("rsa-3072-20260309-"));
    }

    #[test]
    fn test_scalar_sampling_retries_out_of_range_values() {
        let mut calls = 0;
        let key = random_secret_key(P521_SCALAR_LEN, P521_TOP_BYTE_MASK, |bytes| {
            calls += 1;
            assert!(bytes[0] <= P521_TOP_BYTE_MASK);
            if calls < 3 {
                Err(())
            } else {
                Ok(bytes.len())
            }
        })
        .unwrap();
        assert_eq!(key, P521_SCALAR_LEN);
        assert_eq!(calls, 3);
    }

    #[test]
    fn test_scalar_sampling_gives_up_with_an_error() {
        let err = random_secret_key(P256_SCALAR_LEN, 0xff, |_| Err::<(), _>(())).unwrap_err();
        assert!(matches!(err, CryptoError::RandomGeneration(_)));
    }

    #[test]
    fn test_sampled_keys_are_valid_scalars() {
        let key = random_secret_key(P521_SCALAR_LEN, P521_TOP_BYTE_MASK, p521::SecretKey::from_slice)
            .unwrap();
        assert_eq!(key.to_bytes().len(), P521_SCALAR_LEN);
        let key = random_secret_key(P384_SCALAR_LEN, 0xff, p384::SecretKey::from_slice).unwrap();
        assert_eq!(key.to_bytes().len(), P384_SCALAR_LEN);
    }

    #[test]
    fn test_key_ids_are_unique() {
        let gen = StandardKeyGenerator::new();
        let a = gen.generate(&KeySpec::ec("P-256")).unwrap();
        let b = gen.generate(&KeySpec::ec("P-256")).unwrap();
        assert_ne!(a.key_id(), b.key_id());
    }
}
