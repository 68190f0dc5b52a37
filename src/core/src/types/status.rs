//! Observed rotation state of a profile

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Rotation phase reported in the profile status. A profile enters
/// `Active` once its first key is published and persisted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Phase {
    Active,
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

/// Status owned by the reconciliation loop.
///
/// The engine reads this as input and proposes a replacement; it never
/// mutates a stored status directly.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RotationState {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub phase: Option<Phase>,

    #[serde(default, rename = "currentKeyID", skip_serializing_if = "Option::is_none")]
    pub current_key_id: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub current_fingerprint: Option<String>,

    /// Key that remains valid during the grace period
    #[serde(default, rename = "previousKeyID", skip_serializing_if = "Option::is_none")]
    pub previous_key_id: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub previous_fingerprint: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_rotation: Option<DateTime<Utc>>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub next_rotation: Option<DateTime<Utc>>,
}

impl RotationState {
    /// Key ID of the active key, treating an empty string as absent.
    pub fn active_key_id(&self) -> Option<&str> {
        self.current_key_id.as_deref().filter(|id| !id.is_empty())
    }
}
