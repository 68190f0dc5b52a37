//! # Keywarden Vault Module
//!
//! Turns generated key material into stored secrets.
//!
//! ## Features
//!
//! - **Rendering**: split-pem, single-pem and JKS output bundles
//! - **Keystore**: JKS v2 writer and reader
//! - **Wrapper certificates**: self-signed container certificates for JKS entries
//! - **Secret storage**: in-memory and on-disk stores with atomic create-or-update
//!
//! ## Module Structure
//!
//! ```text
//! vault/
//! ├── render/       - Output formats and render bundles
//! ├── keystore/     - JKS codec
//! ├── certificate/  - Self-signed wrapper certificate
//! ├── storage/      - Secret stores
//! └── writer/       - Secret writer (render + metadata + store)
//! ```

pub mod certificate;
pub mod error;
pub mod keystore;
pub mod render;
pub mod storage;
pub mod writer;

pub use error::{Result, VaultError};
pub use render::{FormatRenderer, OutputFormat, RenderBundle, RenderOptions, StandardRenderer};
pub use storage::{
    ApplyOutcome, FileSecretStore, InMemorySecretStore, SecretRecord, SecretStore, SecretType, StoredSecret,
};
pub use writer::SecretWriter;
