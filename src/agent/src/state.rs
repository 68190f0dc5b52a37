//! Persisted rotation state, keyed by `namespace/name`

use anyhow::{Context, Result};
use keywarden_core::{KeyProfile, RotationState};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

/// Observed status of every profile, kept in a JSON file.
#[derive(Debug)]
pub struct StateFile {
    path: PathBuf,
    entries: BTreeMap<String, RotationState>,
}

impl StateFile {
    /// Opens the state file; a missing file is an empty state.
    pub async fn open(path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();
        let entries = match tokio::fs::read(&path).await {
            Ok(bytes) => serde_json::from_slice(&bytes)
                .with_context(|| format!("Failed to parse state file {}", path.display()))?,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => BTreeMap::new(),
            Err(e) => {
                return Err(e).with_context(|| format!("Failed to read state file {}", path.display()))
            }
        };
        Ok(Self { path, entries })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn get(&self, profile: &KeyProfile) -> RotationState {
        self.entries
            .get(&profile.qualified_name())
            .cloned()
            .unwrap_or_default()
    }

    pub fn set(&mut self, profile: &KeyProfile, state: RotationState) {
        self.entries.insert(profile.qualified_name(), state);
    }

    /// Drops entries of profiles that no longer exist.
    pub fn retain(&mut self, profiles: &[KeyProfile]) {
        let live: Vec<String> = profiles.iter().map(KeyProfile::qualified_name).collect();
        self.entries.retain(|name, _| live.contains(name));
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Writes the state through a temporary file and an atomic rename.
    pub async fn save(&self) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .with_context(|| format!("Failed to create {}", parent.display()))?;
        }

        let json = serde_json::to_vec_pretty(&self.entries).context("Failed to serialize state")?;
        let tmp = self.path.with_extension("json.tmp");
        tokio::fs::write(&tmp, json)
            .await
            .with_context(|| format!("Failed to write {}", tmp.display()))?;
        tokio::fs::rename(&tmp, &self.path)
            .await
            .with_context(|| format!("Failed to replace {}", self.path.display()))?;
        Ok(())
    }
}

/// Reads the profile list (a JSON array of key profiles).
pub async fn load_profiles(path: &Path) -> Result<Vec<KeyProfile>> {
    let bytes = tokio::fs::read(path)
        .await
        .with_context(|| format!("Failed to read profiles file {}", path.display()))?;
    serde_json::from_slice(&bytes).with_context(|| format!("Failed to parse profiles file {}", path.display()))
}
