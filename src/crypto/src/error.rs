//! Error types for the cryptography module

use crate::validate::Algorithm;
use thiserror::Error;

/// Result type alias for cryptographic operations
pub type Result<T> = std::result::Result<T, CryptoError>;

/// A key spec rejected by the validation rule set.
///
/// These are policy violations: never retried, and raised before any
/// randomness is consumed.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum KeySpecError {
    #[error("unsupported algorithm {0:?}, must be one of: EC, RSA")]
    UnsupportedAlgorithm(String),

    #[error("{algorithm} algorithm requires '{parameter}' parameter")]
    MissingParameter {
        algorithm: Algorithm,
        parameter: &'static str,
    },

    #[error("unsupported EC curve {0:?}, must be one of: P-256, P-384, P-521")]
    UnsupportedCurve(String),

    #[error("invalid RSA keySize {0:?}")]
    InvalidKeySize(String),

    #[error("unsupported RSA keySize {0}, must be one of: 2048, 3072, 4096")]
    UnsupportedKeySize(u32),

    #[error("RSA keySize {size} is below absolute minimum {minimum}")]
    BelowMinimum { size: u32, minimum: u32 },

    #[error(
        "RSA keySize {size} is deprecated per BSI TR-02102-1 (2025): \
         set allowLegacyKeySize=true to override, or use >= {recommended}"
    )]
    LegacyKeySize { size: u32, recommended: u32 },
}

/// Errors that can occur during cryptographic operations
#[derive(Debug, Error)]
pub enum CryptoError {
    /// Key spec failed validation; no generation was attempted
    #[error("key spec validation failed: {0}")]
    Validation(#[from] KeySpecError),

    /// Key generation failed
    #[error("{algorithm} key generation failed: {reason}")]
    KeyGeneration { algorithm: Algorithm, reason: String },

    /// Random number generation failed
    #[error("Random number generation failed: {0}")]
    RandomGeneration(String),

    /// Key material was read after it had been wiped
    #[error("key material has been wiped")]
    KeyWiped,

    /// Unknown encoding name
    #[error("unsupported encoding {0:?}, must be one of: PEM, DER, JWK")]
    UnsupportedEncoding(String),

    /// Key serialization failed
    #[error("Key serialization failed: {0}")]
    Serialization(String),

    /// Fingerprint computation failed
    #[error("cannot compute fingerprint: {0}")]
    Fingerprint(String),
}

impl CryptoError {
    pub(crate) fn serialization<E: std::fmt::Display>(context: &str, err: E) -> Self {
        CryptoError::Serialization(format!("{}: {}", context, err))
    }
}
