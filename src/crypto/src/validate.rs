//! Key spec validation rule set
//!
//! This is the single source of truth for algorithm validation. The
//! admission validator and [`crate::keys::KeyGenerator`] both call
//! [`validate_key_spec`], so a spec accepted into the profile store is
//! guaranteed to be generatable later.

use crate::error::KeySpecError;
use keywarden_core::types::profile::{KeySpec, PARAM_CURVE, PARAM_KEY_SIZE};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Absolute minimum accepted RSA modulus size.
pub const RSA_MIN_KEY_SIZE: u32 = 2048;

/// Minimum RSA size per BSI TR-02102-1 (2025+). Smaller keys require
/// `allowLegacyKeySize`.
pub const RSA_RECOMMENDED_MIN_KEY_SIZE: u32 = 3072;

/// Accepted RSA modulus sizes.
pub const RSA_KEY_SIZES: [u32; 3] = [2048, 3072, 4096];

/// Asymmetric algorithm family
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Algorithm {
    #[serde(rename = "EC")]
    Ec,
    #[serde(rename = "RSA")]
    Rsa,
}

impl Algorithm {
    pub fn as_str(&self) -> &'static str {
        match self {
            Algorithm::Ec => "EC",
            Algorithm::Rsa => "RSA",
        }
    }
}

impl fmt::Display for Algorithm {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// NIST curves on the allow-list
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Curve {
    P256,
    P384,
    P521,
}

impl Curve {
    pub fn parse(name: &str) -> Option<Self> {
        match name {
            "P-256" => Some(Curve::P256),
            "P-384" => Some(Curve::P384),
            "P-521" => Some(Curve::P521),
            _ => None,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            Curve::P256 => "P-256",
            Curve::P384 => "P-384",
            Curve::P521 => "P-521",
        }
    }

    /// Length of a field element / scalar in bytes
    pub fn byte_len(&self) -> usize {
        match self {
            Curve::P256 => 32,
            Curve::P384 => 48,
            Curve::P521 => 66,
        }
    }
}

/// A key spec that passed validation, in typed form.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeyParams {
    Ec(Curve),
    Rsa { bits: u32 },
}

impl KeyParams {
    pub fn algorithm(&self) -> Algorithm {
        match self {
            KeyParams::Ec(_) => Algorithm::Ec,
            KeyParams::Rsa { .. } => Algorithm::Rsa,
        }
    }

    /// The parameter component of a key ID (`P-256`, `3072`).
    pub fn id_param(&self) -> String {
        match self {
            KeyParams::Ec(curve) => curve.name().to_string(),
            KeyParams::Rsa { bits } => bits.to_string(),
        }
    }
}

/// Outcome of [`validate_key_spec`].
///
/// Warnings are reported independently of whether the spec was accepted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Validation {
    pub warnings: Vec<String>,
    pub result: Result<KeyParams, KeySpecError>,
}

impl Validation {
    fn accept(params: KeyParams) -> Self {
        Self {
            warnings: Vec::new(),
            result: Ok(params),
        }
    }

    fn reject(err: KeySpecError) -> Self {
        Self {
            warnings: Vec::new(),
            result: Err(err),
        }
    }

    pub fn is_ok(&self) -> bool {
        self.result.is_ok()
    }
}

/// Validate the cryptographic parameters of a key spec. Pure; consumes no
/// randomness.
pub fn validate_key_spec(spec: &KeySpec) -> Validation {
    match spec.algorithm.as_str() {
        "EC" => validate_ec(spec),
        "RSA" => validate_rsa(spec),
        other => Validation::reject(KeySpecError::UnsupportedAlgorithm(other.to_string())),
    }
}

fn validate_ec(spec: &KeySpec) -> Validation {
    let Some(name) = spec.param(PARAM_CURVE) else {
        return Validation::reject(KeySpecError::MissingParameter {
            algorithm: Algorithm::Ec,
            parameter: PARAM_CURVE,
        });
    };

    match Curve::parse(name) {
        Some(curve) => Validation::accept(KeyParams::Ec(curve)),
        None => Validation::reject(KeySpecError::UnsupportedCurve(name.to_string())),
    }
}

fn validate_rsa(spec: &KeySpec) -> Validation {
    let Some(raw) = spec.param(PARAM_KEY_SIZE) else {
        return Validation::reject(KeySpecError::MissingParameter {
            algorithm: Algorithm::Rsa,
            parameter: PARAM_KEY_SIZE,
        });
    };

    let size: u32 = match raw.parse() {
        Ok(size) => size,
        Err(_) => return Validation::reject(KeySpecError::InvalidKeySize(raw.to_string())),
    };

    if !RSA_KEY_SIZES.contains(&size) {
        return Validation::reject(KeySpecError::UnsupportedKeySize(size));
    }

    if size < RSA_MIN_KEY_SIZE {
        return Validation::reject(KeySpecError::BelowMinimum {
            size,
            minimum: RSA_MIN_KEY_SIZE,
        });
    }

    // BSI TR-02102-1: RSA < 3072 deprecated since 2025
    if size < RSA_RECOMMENDED_MIN_KEY_SIZE {
        let advisory = format!(
            "RSA keySize {} is deprecated per BSI TR-02102-1 (2025). Migrate to >= {} or EC P-256.",
            size, RSA_RECOMMENDED_MIN_KEY_SIZE
        );
        if !spec.allow_legacy_key_size {
            return Validation {
                warnings: vec![advisory],
                result: Err(KeySpecError::LegacyKeySize {
                    size,
                    recommended: RSA_RECOMMENDED_MIN_KEY_SIZE,
                }),
            };
        }
        return Validation {
            warnings: vec![advisory],
            result: Ok(KeyParams::Rsa { bits: size }),
        };
    }

    Validation::accept(KeyParams::Rsa { bits: size })
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use std::collections::BTreeMap;

    fn spec(algorithm: &str, params: &[(&str, &str)], legacy: bool) -> KeySpec {
        KeySpec {
            algorithm: algorithm.to_string(),
            params: params
                .iter()
                .map(|(k, v)| (k.to_string(), v.to_string()))
                .collect::<BTreeMap<_, _>>(),
            encoding: "PEM".to_string(),
            allow_legacy_key_size: legacy,
        }
    }

    #[test]
    fn test_valid_ec_curves() {
        for (name, curve) in [("P-256", Curve::P256), ("P-384", Curve::P384), ("P-521", Curve::P521)] {
            let v = validate_key_spec(&KeySpec::ec(name));
            assert_eq!(v.result, Ok(KeyParams::Ec(curve)));
            assert!(v.warnings.is_empty());
        }
    }

    #[test]
    fn test_ec_rejects_unknown_curve() {
        let v = validate_key_spec(&KeySpec::ec("secp256k1"));
        assert_eq!(v.result, Err(KeySpecError::UnsupportedCurve("secp256k1".to_string())));
    }

    #[test]
    fn test_ec_requires_curve() {
        let v = validate_key_spec(&spec("EC", &[], false));
        assert!(matches!(
            v.result,
            Err(KeySpecError::MissingParameter { parameter: "curve", .. })
        ));
    }

    #[test]
    fn test_unsupported_algorithm() {
        let v = validate_key_spec(&spec("Ed25519", &[], false));
        assert_eq!(v.result, Err(KeySpecError::UnsupportedAlgorithm("Ed25519".to_string())));
    }

    #[test]
    fn test_rsa_requires_key_size() {
        let v = validate_key_spec(&spec("RSA", &[("keySize", "")], false));
        assert!(matches!(
            v.result,
            Err(KeySpecError::MissingParameter { parameter: "keySize", .. })
        ));
    }

    #[test]
    fn test_rsa_rejects_non_numeric_and_unlisted_sizes() {
        let v = validate_key_spec(&spec("RSA", &[("keySize", "big")], false));
        assert_eq!(v.result, Err(KeySpecError::InvalidKeySize("big".to_string())));

        let v = validate_key_spec(&spec("RSA", &[("keySize", "1024")], true));
        assert_eq!(v.result, Err(KeySpecError::UnsupportedKeySize(1024)));

        let v = validate_key_spec(&spec("RSA", &[("keySize", "8192")], false));
        assert_eq!(v.result, Err(KeySpecError::UnsupportedKeySize(8192)));
    }

    #[test]
    fn test_rsa_2048_requires_legacy_opt_in() {
        let v = validate_key_spec(&KeySpec::rsa(2048, false));
        assert!(matches!(v.result, Err(KeySpecError::LegacyKeySize { size: 2048, .. })));

        let v = validate_key_spec(&KeySpec::rsa(2048, true));
        assert_eq!(v.result, Ok(KeyParams::Rsa { bits: 2048 }));
        assert_eq!(v.warnings.len(), 1);
        assert!(v.warnings[0].contains("deprecated"));
        assert!(v.warnings[0].contains("3072"));
    }

    #[test]
    fn test_rsa_recommended_sizes_have_no_warnings() {
        for bits in [3072, 4096] {
            let v = validate_key_spec(&KeySpec::rsa(bits, false));
            assert_eq!(v.result, Ok(KeyParams::Rsa { bits }));
            assert!(v.warnings.is_empty());
        }
    }

    #[test]
    fn test_key_params_id_param() {
        assert_eq!(KeyParams::Ec(Curve::P384).id_param(), "P-384");
        assert_eq!(KeyParams::Rsa { bits: 4096 }.id_param(), "4096");
        assert_eq!(KeyParams::Rsa { bits: 4096 }.algorithm(), Algorithm::Rsa);
    }

    proptest! {
        #[test]
        fn prop_rsa_accepted_iff_recommended_without_legacy(idx in 0usize..3) {
            let bits = RSA_KEY_SIZES[idx];
            let v = validate_key_spec(&KeySpec::rsa(bits, false));
            prop_assert_eq!(v.is_ok(), bits >= RSA_RECOMMENDED_MIN_KEY_SIZE);
        }

        #[test]
        fn prop_legacy_always_accepts_listed_sizes(idx in 0usize..3) {
            let bits = RSA_KEY_SIZES[idx];
            let v = validate_key_spec(&KeySpec::rsa(bits, true));
            prop_assert!(v.is_ok());
            prop_assert_eq!(v.warnings.is_empty(), bits >= RSA_RECOMMENDED_MIN_KEY_SIZE);
        }

        #[test]
        fn prop_unknown_algorithms_rejected(alg in "[a-z]{1,8}") {
            let v = validate_key_spec(&spec(&alg, &[("curve", "P-256")], true));
            prop_assert!(!v.is_ok());
        }
    }
}
