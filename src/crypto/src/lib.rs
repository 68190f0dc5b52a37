//! # Keywarden Cryptography Module
//!
//! Asymmetric key material for the keywarden key lifecycle engine.
//!
//! ## Features
//!
//! - **Validation**: one rule set shared by admission and generation (EC curve
//!   allow-list, RSA size floor with a legacy override)
//! - **Generation**: EC P-256/P-384/P-521 and RSA 2048/3072/4096 from the OS CSPRNG
//! - **Secure wipe**: [`keys::KeyPair`] zeroes its private material explicitly
//!   and on drop
//! - **Fingerprints**: `SHA256:` + base64url(SHA-256(SPKI DER))
//! - **Encoding**: PEM, DER and JWK
//!
//! ## Module Structure
//!
//! ```text
//! crypto/
//! ├── validate/     - Key spec validation rule set
//! ├── keys/         - KeyPair, wipe and generation
//! ├── fingerprint/  - Versioned public key fingerprints
//! └── encoding/     - PEM / DER / JWK encoders
//! ```

pub mod encoding;
pub mod error;
pub mod fingerprint;
pub mod keys;
pub mod validate;

pub use encoding::{new_key_encoder, KeyEncoder, KeyEncoding};
pub use error::{CryptoError, KeySpecError, Result};
pub use fingerprint::{compute_fingerprint, Fingerprint, FINGERPRINT_PREFIX};
pub use keys::{KeyGenerator, KeyPair, PrivateKey, PublicKey, StandardKeyGenerator};
pub use validate::{validate_key_spec, Algorithm, Curve, KeyParams, Validation};
