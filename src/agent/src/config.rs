//! Agent configuration loading and validation

use anyhow::{Context, Result};
use keywarden_publish::PublisherConfig;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Complete agent configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct AgentConfig {
    pub agent: AgentSection,

    pub secrets: SecretsSection,

    #[serde(default)]
    pub publish: PublishSection,

    #[serde(default)]
    pub metrics: MetricsSection,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct AgentSection {
    #[serde(default = "default_log_level")]
    pub log_level: String,
    /// JSON file holding the list of key profiles
    pub profiles_path: PathBuf,
    /// JSON file the observed rotation state is kept in
    pub state_path: PathBuf,
    #[serde(default = "default_min_requeue")]
    pub min_requeue_secs: u64,
    /// Upper bound on one sleep, so profile edits are picked up
    #[serde(default = "default_max_requeue")]
    pub max_requeue_secs: u64,
    /// Delay before retrying a profile whose rotation failed
    #[serde(default = "default_error_backoff")]
    pub error_backoff_secs: u64,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct SecretsSection {
    pub root_dir: PathBuf,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct PublishSection {
    #[serde(default = "default_http_timeout")]
    pub http_timeout_secs: u64,
    #[serde(default = "default_max_response_bytes")]
    pub max_response_bytes: usize,
}

impl Default for PublishSection {
    fn default() -> Self {
        Self {
            http_timeout_secs: default_http_timeout(),
            max_response_bytes: default_max_response_bytes(),
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize, Default)]
pub struct MetricsSection {
    /// Prometheus text dump rewritten after every pass
    #[serde(default)]
    pub export_path: Option<PathBuf>,
}

// Default value functions
fn default_log_level() -> String { "info".to_string() }
fn default_min_requeue() -> u64 { 1 }
fn default_max_requeue() -> u64 { 300 }
fn default_error_backoff() -> u64 { 30 }
fn default_http_timeout() -> u64 { 10 }
fn default_max_response_bytes() -> usize { 1 << 20 }

impl AgentConfig {
    /// Load configuration from TOML file
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let contents = std::fs::read_to_string(path.as_ref())
            .with_context(|| format!("Failed to read configuration file {}", path.as_ref().display()))?;

        let config: AgentConfig = toml::from_str(&contents)
            .context("Failed to parse configuration file")?;

        Ok(config)
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<()> {
        if self.agent.min_requeue_secs == 0 {
            anyhow::bail!("min_requeue_secs must be at least 1");
        }

        if self.agent.max_requeue_secs < self.agent.min_requeue_secs {
            anyhow::bail!("max_requeue_secs must not be below min_requeue_secs");
        }

        if self.publish.http_timeout_secs == 0 {
            anyhow::bail!("http_timeout_secs must be at least 1");
        }

        if self.publish.max_response_bytes == 0 {
            anyhow::bail!("max_response_bytes must be positive");
        }

        if !self.secrets.root_dir.is_absolute() {
            anyhow::bail!("secrets.root_dir must be an absolute path");
        }

        Ok(())
    }

    pub fn publisher_config(&self) -> PublisherConfig {
        PublisherConfig {
            http_timeout: Duration::from_secs(self.publish.http_timeout_secs),
            max_response_bytes: self.publish.max_response_bytes,
        }
    }

    pub fn min_requeue(&self) -> Duration {
        Duration::from_secs(self.agent.min_requeue_secs)
    }

    pub fn max_requeue(&self) -> Duration {
        Duration::from_secs(self.agent.max_requeue_secs)
    }

    pub fn error_backoff(&self) -> Duration {
        Duration::from_secs(self.agent.error_backoff_secs)
    }
}
