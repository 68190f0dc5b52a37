//! Publisher capability and shared configuration

use crate::error::Result;
use async_trait::async_trait;
use keywarden_core::PublishTarget;
use keywarden_crypto::KeyPair;
use std::time::Duration;

/// Publishes the public half of a key pair to one kind of target.
///
/// Implementations must only ever read the public key and must be
/// idempotent: publishing the same key to the same target twice leaves the
/// same external state as publishing it once.
#[async_trait]
pub trait Publisher: Send + Sync {
    async fn publish(&self, target: &PublishTarget, kp: &KeyPair) -> Result<()>;
}

/// Settings shared by the built-in publishers
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PublisherConfig {
    /// Overall timeout of one HTTP publish request
    pub http_timeout: Duration,

    /// Upper bound on how much of an HTTP response body is read
    pub max_response_bytes: usize,
}

impl Default for PublisherConfig {
    fn default() -> Self {
        Self {
            http_timeout: Duration::from_secs(10),
            max_response_bytes: 1 << 20, // 1 MiB
        }
    }
}
