//! Publisher registry and fan-out

use crate::error::{PublishError, PublishErrors, Result, TargetFailure};
use crate::filesystem::FilesystemPublisher;
use crate::http::HttpPublisher;
use crate::publisher::{Publisher, PublisherConfig};
use keywarden_core::PublishTarget;
use keywarden_crypto::KeyPair;
use std::collections::HashMap;
use std::sync::Arc;

pub const TYPE_FILESYSTEM: &str = "filesystem";
pub const TYPE_HTTP: &str = "http";

/// Dispatches publish targets to the publisher registered for their type.
#[derive(Clone, Default)]
pub struct PublishManager {
    publishers: HashMap<String, Arc<dyn Publisher>>,
}

impl PublishManager {
    /// Empty registry
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry with the built-in `filesystem` and `http` publishers
    pub fn with_defaults(config: &PublisherConfig) -> Result<Self> {
        let mut manager = Self::new();
        manager.register(TYPE_FILESYSTEM, Arc::new(FilesystemPublisher::new()));
        manager.register(TYPE_HTTP, Arc::new(HttpPublisher::new(config.clone())?));
        Ok(manager)
    }

    /// Registers (or replaces) the publisher for `target_type`.
    pub fn register(&mut self, target_type: &str, publisher: Arc<dyn Publisher>) {
        self.publishers.insert(target_type.to_string(), publisher);
    }

    pub fn supports(&self, target_type: &str) -> bool {
        self.publishers.contains_key(target_type)
    }

    /// Registered types, sorted
    pub fn types(&self) -> Vec<&str> {
        let mut types: Vec<&str> = self.publishers.keys().map(String::as_str).collect();
        types.sort_unstable();
        types
    }

    /// Publishes to every target in order.
    ///
    /// A failing target never stops the remaining ones; every failure is
    /// collected and returned together once all targets were attempted.
    pub async fn publish_all(
        &self,
        targets: &[PublishTarget],
        kp: &KeyPair,
    ) -> std::result::Result<(), PublishErrors> {
        let mut failures = Vec::new();

        for (index, target) in targets.iter().enumerate() {
            let outcome = match self.publishers.get(&target.target_type) {
                Some(publisher) => publisher.publish(target, kp).await,
                None => Err(PublishError::UnknownType(target.target_type.clone())),
            };

            match outcome {
                Ok(()) => {
                    tracing::info!(
                        key_id = %kp.key_id(),
                        index,
                        target_type = %target.target_type,
                        "public key published"
                    );
                }
                Err(error) => {
                    tracing::warn!(
                        key_id = %kp.key_id(),
                        index,
                        target_type = %target.target_type,
                        %error,
                        "publish target failed"
                    );
                    failures.push(TargetFailure {
                        index,
                        target_type: target.target_type.clone(),
                        error,
                    });
                }
            }
        }

        if failures.is_empty() {
            Ok(())
        } else {
            Err(PublishErrors { failures })
        }
    }
}

impl std::fmt::Debug for PublishManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PublishManager").field("types", &self.types()).finish()
    }
}
