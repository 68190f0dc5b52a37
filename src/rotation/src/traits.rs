//! Collaborator seams of the orchestrator

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use keywarden_core::{KeyProfile, PublishTarget};
use keywarden_crypto::KeyPair;
use keywarden_publish::{PublishErrors, PublishManager};
use keywarden_vault::{SecretWriter, VaultError};

/// Distributes the public half of a new key to every target of a profile
#[async_trait]
pub trait KeyPublisher: Send + Sync {
    async fn publish(&self, targets: &[PublishTarget], kp: &KeyPair) -> Result<(), PublishErrors>;
}

/// Stores the private material of a new key (create-or-update).
/// `rotated_at` is the rotation time recorded in the profile status.
#[async_trait]
pub trait KeyPersister: Send + Sync {
    async fn persist(
        &self,
        profile: &KeyProfile,
        kp: &KeyPair,
        rotated_at: DateTime<Utc>,
    ) -> Result<(), VaultError>;
}

#[async_trait]
impl KeyPublisher for PublishManager {
    async fn publish(&self, targets: &[PublishTarget], kp: &KeyPair) -> Result<(), PublishErrors> {
        self.publish_all(targets, kp).await
    }
}

#[async_trait]
impl KeyPersister for SecretWriter {
    async fn persist(
        &self,
        profile: &KeyProfile,
        kp: &KeyPair,
        rotated_at: DateTime<Utc>,
    ) -> Result<(), VaultError> {
        self.write(profile, kp, rotated_at).await.map(|_| ())
    }
}
