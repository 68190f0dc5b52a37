//! # Keywarden Rotation Module
//!
//! Key lifecycle orchestration: decides when a profile's key is due,
//! generates its replacement, publishes the public key, persists the
//! private material and wipes it.
//!
//! ## Module Structure
//!
//! ```text
//! rotation/
//! ├── decision/   - Pure rotation schedule rules
//! ├── manager/    - ensure_key orchestrator and status projection
//! ├── traits/     - Publisher and persister seams
//! ├── metrics/    - Injected metrics sink (no-op and Prometheus)
//! └── admission/  - Profile defaulting and validation
//! ```
//!
//! ## Example
//!
//! ```rust,no_run
//! use keywarden_crypto::StandardKeyGenerator;
//! use keywarden_publish::{PublishManager, PublisherConfig};
//! use keywarden_rotation::RotationManager;
//! use keywarden_vault::{InMemorySecretStore, SecretWriter};
//! use std::sync::Arc;
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let manager = RotationManager::new(
//!     Arc::new(StandardKeyGenerator::new()),
//!     Arc::new(PublishManager::with_defaults(&PublisherConfig::default())?),
//!     Arc::new(SecretWriter::new(Arc::new(InMemorySecretStore::new()))),
//! );
//! # let _ = manager;
//! # Ok(())
//! # }
//! ```

pub mod admission;
pub mod decision;
pub mod error;
pub mod manager;
pub mod metrics;
pub mod traits;

pub use admission::{apply_defaults, AdmissionValidator, Warnings};
pub use decision::{decide, next_rotation, requeue_after, Decision, RotationReason, MIN_REQUEUE};
pub use error::{AdmissionError, Result, RotationError};
pub use manager::{RotationManager, RotationResult};
pub use metrics::{MetricsSink, NoopMetrics, PrometheusMetrics};
pub use traits::{KeyPersister, KeyPublisher};
