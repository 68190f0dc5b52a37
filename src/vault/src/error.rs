//! Error types for the vault module

use keywarden_crypto::CryptoError;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, VaultError>;

#[derive(Debug, Error)]
pub enum VaultError {
    #[error("unsupported output format {0:?}, must be one of: split-pem, single-pem, jks")]
    UnsupportedFormat(String),

    #[error("password is required for JKS format")]
    PasswordRequired,

    #[error("failed to encode key material: {0}")]
    Crypto(#[from] CryptoError),

    #[error("Certificate error: {0}")]
    Certificate(String),

    #[error("Keystore error: {0}")]
    Keystore(String),

    #[error("Storage error: {0}")]
    Storage(String),

    #[error("I/O error on {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },
}

impl VaultError {
    pub(crate) fn io(path: impl AsRef<std::path::Path>, source: std::io::Error) -> Self {
        VaultError::Io {
            path: path.as_ref().display().to_string(),
            source,
        }
    }
}
