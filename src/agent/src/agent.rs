//! Reconcile loop driving key rotation for every configured profile

use crate::config::AgentConfig;
use crate::state::{load_profiles, StateFile};
use anyhow::{Context, Result};
use chrono::Utc;
use keywarden_core::KeyProfile;
use keywarden_crypto::StandardKeyGenerator;
use keywarden_publish::PublishManager;
use keywarden_rotation::{
    apply_defaults, requeue_after, AdmissionValidator, PrometheusMetrics, RotationManager,
};
use keywarden_vault::{FileSecretStore, SecretWriter};
use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

/// Result of one reconcile pass
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PassSummary {
    pub rotated: usize,
    pub unchanged: usize,
    pub rejected: usize,
    pub failed: usize,
    /// How long to sleep before the next pass
    pub requeue: Option<Duration>,
}

pub struct Agent {
    config: AgentConfig,
    manager: RotationManager,
    validator: AdmissionValidator,
    metrics: Arc<PrometheusMetrics>,
    state: StateFile,
    /// Profiles already seen by this process; gates `triggerOnStartup`
    seen: HashSet<String>,
}

impl Agent {
    pub async fn new(config: AgentConfig) -> Result<Self> {
        let publisher = PublishManager::with_defaults(&config.publisher_config())
            .context("Failed to initialize publishers")?;
        let validator = AdmissionValidator::for_manager(&publisher);
        let metrics = Arc::new(PrometheusMetrics::new().context("Failed to register metrics")?);

        let store = Arc::new(FileSecretStore::new(config.secrets.root_dir.clone()));
        let manager = RotationManager::new(
            Arc::new(StandardKeyGenerator::new()),
            Arc::new(publisher),
            Arc::new(SecretWriter::new(store)),
        )
        .with_metrics(metrics.clone());

        let state = StateFile::open(config.agent.state_path.clone()).await?;
        info!(
            profiles = %config.agent.profiles_path.display(),
            state = %state.path().display(),
            known = state.len(),
            "agent initialized"
        );

        Ok(Self {
            config,
            manager,
            validator,
            metrics,
            state,
            seen: HashSet::new(),
        })
    }

    pub fn metrics(&self) -> &PrometheusMetrics {
        &self.metrics
    }

    /// Runs reconcile passes until `cancel` fires.
    pub async fn run(&mut self, cancel: CancellationToken) -> Result<()> {
        loop {
            let wait = match self.reconcile_once(&cancel).await {
                Ok(summary) => summary.requeue.unwrap_or_else(|| self.config.max_requeue()),
                Err(e) => {
                    let message = format!("{:#}", e);
                    error!(error = %message, "reconcile pass failed");
                    self.config.error_backoff()
                }
            };
            let wait = wait.clamp(self.config.min_requeue(), self.config.max_requeue());

            debug!(after = ?wait, "next pass scheduled");
            tokio::select! {
                _ = cancel.cancelled() => {
                    info!("shutdown requested, stopping reconcile loop");
                    return Ok(());
                }
                _ = tokio::time::sleep(wait) => {}
            }
        }
    }

    /// One pass over every profile: rotate what is due and record the
    /// resulting status.
    pub async fn reconcile_once(&mut self, cancel: &CancellationToken) -> Result<PassSummary> {
        let mut profiles = load_profiles(&self.config.agent.profiles_path).await?;
        let mut summary = PassSummary::default();
        let mut next: Option<Duration> = None;

        for profile in profiles.iter_mut() {
            if cancel.is_cancelled() {
                break;
            }

            apply_defaults(profile);
            match self.validator.validate(profile) {
                Ok(warnings) => {
                    for warning in warnings {
                        warn!(profile = %profile.qualified_name(), "{}", warning);
                    }
                }
                Err(e) => {
                    error!(profile = %profile.qualified_name(), error = %e, "profile rejected");
                    summary.rejected += 1;
                    continue;
                }
            }

            let wait = self.reconcile_profile(profile, cancel, &mut summary).await;
            next = match (next, wait) {
                (Some(a), Some(b)) => Some(a.min(b)),
                (a, b) => a.or(b),
            };
        }

        self.state.retain(&profiles);
        self.state.save().await?;
        self.export_metrics().await;

        summary.requeue = next;
        info!(
            rotated = summary.rotated,
            unchanged = summary.unchanged,
            rejected = summary.rejected,
            failed = summary.failed,
            "reconcile pass complete"
        );
        Ok(summary)
    }

    async fn reconcile_profile(
        &mut self,
        profile: &mut KeyProfile,
        cancel: &CancellationToken,
        summary: &mut PassSummary,
    ) -> Option<Duration> {
        let name = profile.qualified_name();
        profile.status = self.state.get(profile);

        let first_sighting = self.seen.insert(name.clone());
        let force = first_sighting && profile.spec.rotation.trigger_on_startup;

        let now = Utc::now();
        match self.manager.ensure_key_at(profile, now, force, cancel).await {
            Ok(result) => {
                if result.rotated {
                    summary.rotated += 1;
                } else {
                    summary.unchanged += 1;
                }
                let mut status = profile.status.clone();
                if result.apply_to(&mut status) {
                    self.state.set(profile, status);
                }
                requeue_after(result.next_rotation, now)
            }
            Err(e) => {
                summary.failed += 1;
                if force {
                    // retry the startup trigger on the next pass
                    self.seen.remove(&name);
                }
                error!(profile = %name, stage = e.stage(), error = %e, "ensure key failed");
                e.is_retryable().then(|| self.config.error_backoff())
            }
        }
    }

    async fn export_metrics(&self) {
        let Some(path) = self.config.metrics.export_path.as_ref() else {
            return;
        };
        match self.metrics.export() {
            Ok(text) => {
                if let Err(e) = tokio::fs::write(path, text).await {
                    warn!(path = %path.display(), error = %e, "failed to write metrics");
                }
            }
            Err(e) => warn!(error = %e, "failed to encode metrics"),
        }
    }
}
