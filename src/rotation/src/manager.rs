//! Rotation orchestrator
//!
//! One `ensure_key` call runs, strictly in sequence:
//! decide → generate → fingerprint → publish → persist → wipe.
//!
//! Generated key material is owned by the invocation. It is wiped explicitly
//! once persisted, and by `KeyPair`'s drop on every other exit (errors,
//! cancellation, early return).

use crate::decision::{decide, next_rotation, Decision};
use crate::error::{Result, RotationError};
use crate::metrics::{MetricsSink, NoopMetrics};
use crate::traits::{KeyPersister, KeyPublisher};
use chrono::{DateTime, Utc};
use keywarden_core::{KeyProfile, Phase, RotationState};
use keywarden_crypto::{CryptoError, KeyGenerator, KeyPair};
use std::sync::Arc;
use std::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{info, instrument, warn};

/// Outcome of [`RotationManager::ensure_key`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RotationResult {
    /// A new key was generated, published and persisted
    pub rotated: bool,

    /// Active key (new or existing)
    pub key_id: String,

    /// When the active key was rotated in
    pub rotation_time: DateTime<Utc>,

    /// `None` when rotation is disabled
    pub next_rotation: Option<DateTime<Utc>>,

    /// Fingerprint of the active key
    pub fingerprint: String,
}

impl RotationResult {
    /// Projects the result onto a profile status.
    ///
    /// A rotated key moves the previous active key into the grace-period
    /// slots. Returns whether the status changed.
    pub fn apply_to(&self, state: &mut RotationState) -> bool {
        let before = state.clone();

        let replaced = state.active_key_id().map_or(false, |id| id != self.key_id);
        if self.rotated && replaced {
            state.previous_key_id = state.current_key_id.take();
            state.previous_fingerprint = state.current_fingerprint.take();
        }

        state.current_key_id = Some(self.key_id.clone());
        state.current_fingerprint = Some(self.fingerprint.clone());
        state.last_rotation = Some(self.rotation_time);
        state.next_rotation = self.next_rotation;
        if state.phase.is_none() || self.rotated {
            state.phase = Some(Phase::Active);
        }

        *state != before
    }
}

/// Composes generation, fingerprinting, publishing and persistence into a
/// single idempotent "ensure key" operation.
pub struct RotationManager {
    keygen: Arc<dyn KeyGenerator>,
    publisher: Arc<dyn KeyPublisher>,
    persister: Arc<dyn KeyPersister>,
    metrics: Arc<dyn MetricsSink>,
}

impl RotationManager {
    pub fn new(
        keygen: Arc<dyn KeyGenerator>,
        publisher: Arc<dyn KeyPublisher>,
        persister: Arc<dyn KeyPersister>,
    ) -> Self {
        Self {
            keygen,
            publisher,
            persister,
            metrics: Arc::new(NoopMetrics),
        }
    }

    pub fn with_metrics(mut self, metrics: Arc<dyn MetricsSink>) -> Self {
        self.metrics = metrics;
        self
    }

    /// Ensures the profile has a current key, rotating it when due.
    pub async fn ensure_key(&self, profile: &KeyProfile, cancel: &CancellationToken) -> Result<RotationResult> {
        self.ensure_key_at(profile, Utc::now(), false, cancel).await
    }

    /// [`ensure_key`](Self::ensure_key) at an explicit decision time.
    ///
    /// `force` rotates even when the schedule says the key is still current.
    #[instrument(
        name = "ensure_key",
        skip_all,
        fields(profile = %profile.qualified_name(), algorithm = %profile.spec.key_spec.algorithm)
    )]
    pub async fn ensure_key_at(
        &self,
        profile: &KeyProfile,
        now: DateTime<Utc>,
        force: bool,
        cancel: &CancellationToken,
    ) -> Result<RotationResult> {
        let policy = &profile.spec.rotation;
        let state = &profile.status;

        let decision = decide(policy, state, now);
        let decision = if force { decision.force() } else { decision };
        if !decision.rotate {
            tracing::debug!(reason = %decision.reason, "rotation not needed");
            return Ok(current_result(state, now, policy.interval));
        }

        info!(reason = %decision.reason, "rotation needed");
        let result = self.rotate(profile, decision, now, cancel).await;
        if let Err(e) = &result {
            self.metrics.record_rotation_error(e.stage(), &profile.namespace);
            warn!(stage = e.stage(), error = %e, "rotation failed");
        }
        result
    }

    async fn rotate(
        &self,
        profile: &KeyProfile,
        decision: Decision,
        now: DateTime<Utc>,
        cancel: &CancellationToken,
    ) -> Result<RotationResult> {
        let mut kp = self.generate(profile, cancel).await?;

        let fingerprint = kp.fingerprint().map_err(|source| RotationError::Fingerprint {
            key_id: kp.key_id().to_string(),
            source,
        })?;

        // Public key must be available before the private key is distributed.
        tokio::select! {
            biased;
            _ = cancel.cancelled() => return Err(RotationError::Cancelled { stage: "publish" }),
            published = self.publisher.publish(&profile.spec.publish, &kp) => {
                published.map_err(|source| RotationError::Publish {
                    key_id: kp.key_id().to_string(),
                    source,
                })?;
            }
        }

        if cancel.is_cancelled() {
            return Err(RotationError::Cancelled { stage: "persist" });
        }
        self.persister
            .persist(profile, &kp, now)
            .await
            .map_err(|source| RotationError::Persist {
                key_id: kp.key_id().to_string(),
                source,
            })?;

        let key_id = kp.key_id().to_string();
        let algorithm = kp.algorithm();
        kp.wipe();

        self.metrics.record_rotation(algorithm.as_str(), &profile.namespace);

        let next = next_rotation(now, profile.spec.rotation.interval);
        info!(
            key_id = %key_id,
            fingerprint = %fingerprint,
            reason = %decision.reason,
            next_rotation = ?next,
            "key rotated"
        );

        Ok(RotationResult {
            rotated: true,
            key_id,
            rotation_time: now,
            next_rotation: next,
            fingerprint: fingerprint.into_string(),
        })
    }

    /// Runs the generator on the blocking pool, racing it against
    /// cancellation. A key finished after cancellation is dropped, and so
    /// wiped, by the abandoned task.
    async fn generate(&self, profile: &KeyProfile, cancel: &CancellationToken) -> Result<KeyPair> {
        let spec = profile.spec.key_spec.clone();
        let algorithm = spec.algorithm.clone();
        let keygen = Arc::clone(&self.keygen);

        let started = Instant::now();
        let task = tokio::task::spawn_blocking(move || keygen.generate(&spec));

        let joined = tokio::select! {
            biased;
            _ = cancel.cancelled() => return Err(RotationError::Cancelled { stage: "keygen" }),
            joined = task => joined,
        };

        match joined {
            Ok(Ok(kp)) => {
                self.metrics.observe_key_generation(&algorithm, started.elapsed());
                Ok(kp)
            }
            Ok(Err(CryptoError::Validation(source))) => {
                Err(RotationError::PolicyViolation { algorithm, source })
            }
            Ok(Err(source)) => {
                self.metrics.observe_key_generation(&algorithm, started.elapsed());
                Err(RotationError::Generation { algorithm, source })
            }
            Err(e) => Err(RotationError::GenerationTask {
                algorithm,
                reason: e.to_string(),
            }),
        }
    }
}

fn current_result(state: &RotationState, now: DateTime<Utc>, interval: std::time::Duration) -> RotationResult {
    let last = state.last_rotation.unwrap_or(now);
    RotationResult {
        rotated: false,
        key_id: state.current_key_id.clone().unwrap_or_default(),
        rotation_time: last,
        next_rotation: next_rotation(last, interval),
        fingerprint: state.current_fingerprint.clone().unwrap_or_default(),
    }
}
