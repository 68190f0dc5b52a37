//! Error types for the rotation module

use keywarden_core::CoreError;
use keywarden_crypto::{CryptoError, KeySpecError};
use keywarden_publish::PublishErrors;
use keywarden_vault::VaultError;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, RotationError>;

/// Failure of one `ensure_key` invocation
#[derive(Debug, Error)]
pub enum RotationError {
    /// The key spec failed validation; never retried
    #[error("key spec for {algorithm} rejected: {source}")]
    PolicyViolation {
        algorithm: String,
        #[source]
        source: KeySpecError,
    },

    /// Random source or key construction failure
    #[error("key generation failed for {algorithm}: {source}")]
    Generation {
        algorithm: String,
        #[source]
        source: CryptoError,
    },

    /// The generation task itself did not complete
    #[error("key generation task for {algorithm} failed: {reason}")]
    GenerationTask { algorithm: String, reason: String },

    #[error("fingerprint computation failed for key {key_id}: {source}")]
    Fingerprint {
        key_id: String,
        #[source]
        source: CryptoError,
    },

    /// One or more publish targets failed; the private key was not persisted
    #[error("failed to publish public key {key_id}: {source}")]
    Publish {
        key_id: String,
        #[source]
        source: PublishErrors,
    },

    /// The public key is published but the secret write failed
    #[error("failed to persist key material for key {key_id}: {source}")]
    Persist {
        key_id: String,
        #[source]
        source: VaultError,
    },

    #[error("rotation cancelled during {stage}")]
    Cancelled { stage: &'static str },
}

impl RotationError {
    /// Metric tag of the stage that failed
    pub fn stage(&self) -> &'static str {
        match self {
            RotationError::PolicyViolation { .. } => "validation",
            RotationError::Generation { .. } | RotationError::GenerationTask { .. } => "keygen",
            RotationError::Fingerprint { .. } => "fingerprint",
            RotationError::Publish { .. } => "publish",
            RotationError::Persist { .. } => "persist",
            RotationError::Cancelled { .. } => "cancelled",
        }
    }

    /// Policy violations are permanent; everything else may succeed on a
    /// later attempt.
    pub fn is_retryable(&self) -> bool {
        !matches!(self, RotationError::PolicyViolation { .. })
    }
}

/// Reasons a profile is refused at admission
#[derive(Debug, Error)]
pub enum AdmissionError {
    #[error("validation failed: {0}")]
    Profile(#[from] CoreError),

    #[error("validation failed: {0}")]
    KeySpec(#[from] KeySpecError),

    #[error("validation failed: unsupported encoding {0:?} (want PEM, DER or JWK)")]
    Encoding(String),

    #[error("validation failed: unsupported output format {0:?} (want split-pem, single-pem or jks)")]
    OutputFormat(String),

    #[error("validation failed: output format jks requires keystorePassword")]
    KeystorePasswordRequired,

    #[error("validation failed: publish[{index}]: unknown publisher type {target_type:?}")]
    UnknownPublisher { index: usize, target_type: String },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_stage_tags() {
        let err = RotationError::Cancelled { stage: "publish" };
        assert_eq!(err.stage(), "cancelled");
        assert!(err.is_retryable());
        assert_eq!(err.to_string(), "rotation cancelled during publish");

        let err = RotationError::PolicyViolation {
            algorithm: "DSA".to_string(),
            source: KeySpecError::UnsupportedAlgorithm("DSA".to_string()),
        };
        assert_eq!(err.stage(), "validation");
        assert!(!err.is_retryable());
    }
}
