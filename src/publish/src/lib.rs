//! # Keywarden Publish Module
//!
//! Distributes public keys to external consumers. Only the public half of a
//! key pair ever reaches this crate's output.
//!
//! ## Publishers
//!
//! - **filesystem**: writes `{keyID}.pub` into an absolute directory
//! - **http**: POSTs the PEM public key to an HTTPS endpoint
//!
//! Additional publishers implement [`Publisher`] and are registered with
//! [`PublishManager::register`].

pub mod error;
pub mod filesystem;
pub mod http;
pub mod manager;
pub mod publisher;

pub use error::{PublishError, PublishErrors, Result, TargetFailure};
pub use filesystem::FilesystemPublisher;
pub use http::HttpPublisher;
pub use manager::{PublishManager, TYPE_FILESYSTEM, TYPE_HTTP};
pub use publisher::{Publisher, PublisherConfig};
