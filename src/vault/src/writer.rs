//! Secret writer: renders key material and hands it to a secret store
//! together with its ownership metadata.

use crate::error::Result;
use crate::render::{FormatRenderer, OutputFormat, RenderOptions, StandardRenderer};
use crate::storage::{ApplyOutcome, SecretRecord, SecretStore, SecretType};
use chrono::{DateTime, SecondsFormat, Utc};
use keywarden_core::KeyProfile;
use keywarden_crypto::KeyPair;
use std::collections::BTreeMap;
use std::sync::Arc;
use zeroize::Zeroizing;

pub const MANAGED_BY: &str = "keywarden";
pub const LABEL_MANAGED_BY: &str = "app.kubernetes.io/managed-by";
pub const LABEL_KEY_PROFILE: &str = "keywarden.io/key-profile";
pub const ANNOTATION_LAST_ROTATION: &str = "keywarden.io/last-rotation";
pub const ANNOTATION_KEY_ID: &str = "keywarden.io/key-id";
pub const ANNOTATION_ALGORITHM: &str = "keywarden.io/algorithm";

/// Writes a profile's private key material to its output secret.
#[derive(Clone)]
pub struct SecretWriter {
    store: Arc<dyn SecretStore>,
    renderer: Arc<dyn FormatRenderer>,
}

impl SecretWriter {
    pub fn new(store: Arc<dyn SecretStore>) -> Self {
        Self::with_renderer(store, Arc::new(StandardRenderer::new()))
    }

    pub fn with_renderer(store: Arc<dyn SecretStore>, renderer: Arc<dyn FormatRenderer>) -> Self {
        Self { store, renderer }
    }

    pub fn store(&self) -> &Arc<dyn SecretStore> {
        &self.store
    }

    /// Render `kp` and attach labels, annotations and secret type. The secret
    /// always lives in the profile's own namespace; `rotated_at` becomes the
    /// last-rotation annotation.
    pub fn build_record(
        &self,
        profile: &KeyProfile,
        kp: &KeyPair,
        rotated_at: DateTime<Utc>,
    ) -> Result<SecretRecord> {
        let output = &profile.spec.output;
        let format = if output.format.is_empty() {
            OutputFormat::default()
        } else {
            output.format.parse()?
        };

        let opts = RenderOptions {
            format,
            password: output.keystore_password.clone().map(Zeroizing::new),
            alias: output.keystore_alias.clone(),
        };
        let data = self.renderer.render(kp, &opts)?;

        let mut labels = output.labels.clone();
        labels.insert(LABEL_MANAGED_BY.to_string(), MANAGED_BY.to_string());
        labels.insert(LABEL_KEY_PROFILE.to_string(), profile.name.clone());

        let annotations = BTreeMap::from([
            (
                ANNOTATION_LAST_ROTATION.to_string(),
                rotated_at.to_rfc3339_opts(SecondsFormat::Secs, true),
            ),
            (ANNOTATION_KEY_ID.to_string(), kp.key_id().to_string()),
            (ANNOTATION_ALGORITHM.to_string(), kp.algorithm().to_string()),
        ]);

        let secret_type = match format {
            OutputFormat::SplitPem => SecretType::Tls,
            OutputFormat::SinglePem | OutputFormat::Jks => SecretType::Opaque,
        };

        Ok(SecretRecord {
            namespace: profile.namespace.clone(),
            name: output.secret_name.clone(),
            secret_type,
            labels,
            annotations,
            data,
        })
    }

    /// Create or update the profile's output secret.
    pub async fn write(
        &self,
        profile: &KeyProfile,
        kp: &KeyPair,
        rotated_at: DateTime<Utc>,
    ) -> Result<ApplyOutcome> {
        let record = self.build_record(profile, kp, rotated_at)?;
        let outcome = self.store.apply(&record).await?;
        tracing::info!(
            profile = %profile.qualified_name(),
            secret = %record.path(),
            key_id = %kp.key_id(),
            operation = outcome.as_str(),
            "secret written"
        );
        Ok(outcome)
    }
}
