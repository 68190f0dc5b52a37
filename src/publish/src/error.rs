//! Error types for the publish module

use keywarden_crypto::CryptoError;
use std::fmt;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, PublishError>;

/// Failure of a single publish target
#[derive(Debug, Error)]
pub enum PublishError {
    #[error("missing '{0}' in config")]
    MissingConfig(&'static str),

    #[error("publish path must be absolute, got: {0}")]
    RelativePath(String),

    #[error("publish path must not contain '..': {0}")]
    PathTraversal(String),

    #[error("endpoint must use HTTPS (got {0:?}); set insecureSkipVerify to allow HTTP")]
    InsecureEndpoint(String),

    #[error("invalid endpoint {endpoint:?}: {reason}")]
    InvalidEndpoint { endpoint: String, reason: String },

    #[error("unknown publisher type {0:?}")]
    UnknownType(String),

    #[error("failed to encode public key: {0}")]
    Encode(#[from] CryptoError),

    #[error("I/O error on {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("HTTP client setup failed: {0}")]
    Client(String),

    #[error("request to {endpoint} failed: {source}")]
    Request {
        endpoint: String,
        #[source]
        source: reqwest::Error,
    },

    #[error("server returned error: {status}")]
    Status { endpoint: String, status: reqwest::StatusCode },
}

impl PublishError {
    pub(crate) fn io(path: impl AsRef<std::path::Path>, source: std::io::Error) -> Self {
        PublishError::Io {
            path: path.as_ref().display().to_string(),
            source,
        }
    }
}

/// A failed target, tagged with its position and type
#[derive(Debug, Error)]
#[error("target[{index}] ({target_type}) failed: {error}")]
pub struct TargetFailure {
    pub index: usize,
    pub target_type: String,
    #[source]
    pub error: PublishError,
}

/// Every failed target of one publish pass, in target order
#[derive(Debug)]
pub struct PublishErrors {
    pub failures: Vec<TargetFailure>,
}

impl PublishErrors {
    pub fn indices(&self) -> Vec<usize> {
        self.failures.iter().map(|f| f.index).collect()
    }
}

impl fmt::Display for PublishErrors {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("publish errors: ")?;
        for (i, failure) in self.failures.iter().enumerate() {
            if i > 0 {
                f.write_str("; ")?;
            }
            write!(f, "{}", failure)?;
        }
        Ok(())
    }
}

impl std::error::Error for PublishErrors {}
