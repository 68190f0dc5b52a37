//! Secret storage backends
//!
//! A [`SecretStore`] performs an atomic create-or-update of one named secret.
//! Two backends are provided: an in-memory map (versioned, for embedding and
//! tests) and a directory tree on disk.

use crate::error::{Result, VaultError};
use crate::render::RenderBundle;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::{Arc, RwLock};
use zeroize::Zeroize;

/// Kind of secret, mirroring the Kubernetes secret types
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SecretType {
    #[serde(rename = "kubernetes.io/tls")]
    Tls,
    #[serde(rename = "Opaque")]
    Opaque,
}

/// A fully rendered secret, ready to be written.
#[derive(Debug, Clone)]
pub struct SecretRecord {
    pub namespace: String,
    pub name: String,
    pub secret_type: SecretType,
    pub labels: BTreeMap<String, String>,
    pub annotations: BTreeMap<String, String>,
    pub data: RenderBundle,
}

impl SecretRecord {
    /// `namespace/name`
    pub fn path(&self) -> String {
        format!("{}/{}", self.namespace, self.name)
    }
}

/// Metadata kept alongside a stored secret
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SecretMetadata {
    #[serde(rename = "type")]
    pub secret_type: SecretType,
    pub labels: BTreeMap<String, String>,
    pub annotations: BTreeMap<String, String>,
    pub version: u64,
    pub files: Vec<String>,
}

/// A secret as read back from a store.
#[derive(Clone)]
pub struct StoredSecret {
    pub metadata: SecretMetadata,
    pub data: BTreeMap<String, Vec<u8>>,
}

impl Drop for StoredSecret {
    fn drop(&mut self) {
        for content in self.data.values_mut() {
            content.zeroize();
        }
    }
}

impl fmt::Debug for StoredSecret {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StoredSecret")
            .field("metadata", &self.metadata)
            .field("files", &self.data.keys().collect::<Vec<_>>())
            .finish()
    }
}

/// Whether an apply created a new secret or replaced an existing one
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ApplyOutcome {
    Created,
    Updated,
}

impl ApplyOutcome {
    pub fn as_str(&self) -> &'static str {
        match self {
            ApplyOutcome::Created => "created",
            ApplyOutcome::Updated => "updated",
        }
    }
}

/// Atomic create-or-update storage for rendered secrets.
#[async_trait]
pub trait SecretStore: Send + Sync {
    /// Replace the secret's data, labels, annotations and type in one step.
    async fn apply(&self, record: &SecretRecord) -> Result<ApplyOutcome>;

    async fn get(&self, namespace: &str, name: &str) -> Result<Option<StoredSecret>>;

    /// Returns whether a secret was removed.
    async fn delete(&self, namespace: &str, name: &str) -> Result<bool>;
}

fn metadata_for(record: &SecretRecord, version: u64) -> SecretMetadata {
    SecretMetadata {
        secret_type: record.secret_type,
        labels: record.labels.clone(),
        annotations: record.annotations.clone(),
        version,
        files: record.data.names().map(str::to_string).collect(),
    }
}

fn data_for(record: &SecretRecord) -> BTreeMap<String, Vec<u8>> {
    record
        .data
        .iter()
        .map(|(name, content)| (name.to_string(), content.to_vec()))
        .collect()
}

/// Secrets held in process memory
#[derive(Clone, Default)]
pub struct InMemorySecretStore {
    secrets: Arc<RwLock<HashMap<String, StoredSecret>>>,
}

impl InMemorySecretStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.secrets.read().map(|s| s.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

fn key(namespace: &str, name: &str) -> String {
    format!("{}/{}", namespace, name)
}

fn poisoned<T>(_: T) -> VaultError {
    VaultError::Storage("secret store lock poisoned".to_string())
}

#[async_trait]
impl SecretStore for InMemorySecretStore {
    async fn apply(&self, record: &SecretRecord) -> Result<ApplyOutcome> {
        let mut secrets = self.secrets.write().map_err(poisoned)?;
        let path = record.path();

        let (version, outcome) = match secrets.get(&path) {
            Some(existing) => (existing.metadata.version + 1, ApplyOutcome::Updated),
            None => (1, ApplyOutcome::Created),
        };
        secrets.insert(
            path,
            StoredSecret {
                metadata: metadata_for(record, version),
                data: data_for(record),
            },
        );
        Ok(outcome)
    }

    async fn get(&self, namespace: &str, name: &str) -> Result<Option<StoredSecret>> {
        let secrets = self.secrets.read().map_err(poisoned)?;
        Ok(secrets.get(&key(namespace, name)).cloned())
    }

    async fn delete(&self, namespace: &str, name: &str) -> Result<bool> {
        let mut secrets = self.secrets.write().map_err(poisoned)?;
        Ok(secrets.remove(&key(namespace, name)).is_some())
    }
}

const METADATA_FILE: &str = ".meta.json";
const DATA_LINK: &str = "..data";
const VERSION_DIR_PREFIX: &str = "..v";

/// Secrets stored as files under `root/<namespace>/<name>/`.
///
/// Each version is written in full to its own directory `..v<version>`
/// (every file plus `.meta.json`). The `..data` symlink names the current
/// version and is replaced by a single rename, and each secret file is a
/// stable symlink through it (`tls.key -> ..data/tls.key`). A reader that
/// goes through these paths sees one complete version, never a mix.
#[derive(Debug, Clone)]
pub struct FileSecretStore {
    root: PathBuf,
}

impl FileSecretStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn secret_dir(&self, namespace: &str, name: &str) -> Result<PathBuf> {
        check_component("namespace", namespace)?;
        check_component("name", name)?;
        Ok(self.root.join(namespace).join(name))
    }

    /// Directory of the version `..data` points at, if any
    async fn current_version_dir(dir: &Path) -> Result<Option<PathBuf>> {
        let link = dir.join(DATA_LINK);
        match tokio::fs::read_link(&link).await {
            Ok(target) => Ok(Some(dir.join(target))),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(VaultError::io(&link, e)),
        }
    }

    async fn read_metadata(version_dir: &Path) -> Result<Option<SecretMetadata>> {
        let path = version_dir.join(METADATA_FILE);
        match tokio::fs::read(&path).await {
            Ok(raw) => serde_json::from_slice(&raw)
                .map(Some)
                .map_err(|e| VaultError::Storage(format!("corrupt metadata {}: {}", path.display(), e))),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(VaultError::io(&path, e)),
        }
    }

    /// Writes one complete version into a directory no reader can see yet.
    async fn stage_version(dir: &Path, record: &SecretRecord, metadata: &SecretMetadata) -> Result<String> {
        let version_name = format!("{}{}", VERSION_DIR_PREFIX, metadata.version);
        let staging = dir.join(&version_name);

        // leftover from an interrupted apply of the same version
        match tokio::fs::remove_dir_all(&staging).await {
            Ok(()) => {}
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => return Err(VaultError::io(&staging, e)),
        }
        create_private_dir(&staging).await?;

        for (name, content) in record.data.iter() {
            check_component("file", name)?;
            write_private(&staging.join(name), content).await?;
        }
        let raw = serde_json::to_vec_pretty(metadata)
            .map_err(|e| VaultError::Storage(format!("cannot encode metadata: {}", e)))?;
        write_private(&staging.join(METADATA_FILE), &raw).await?;

        Ok(version_name)
    }

    /// Removes version directories other than `current`. Best effort.
    async fn prune_versions(dir: &Path, current: &str) {
        let mut entries = match tokio::fs::read_dir(dir).await {
            Ok(entries) => entries,
            Err(e) => {
                tracing::warn!(path = %dir.display(), error = %e, "failed to list secret versions");
                return;
            }
        };
        while let Ok(Some(entry)) = entries.next_entry().await {
            let name = entry.file_name();
            let Some(name) = name.to_str() else { continue };
            if name.starts_with(VERSION_DIR_PREFIX) && name != current {
                let path = entry.path();
                if let Err(e) = tokio::fs::remove_dir_all(&path).await {
                    tracing::warn!(path = %path.display(), error = %e, "failed to remove old secret version");
                }
            }
        }
    }
}

/// A path component must be a plain, non-hidden file name.
fn check_component(what: &str, value: &str) -> Result<()> {
    let valid = !value.is_empty()
        && !value.starts_with('.')
        && !value.contains(['/', '\\'])
        && value != "..";
    if valid {
        Ok(())
    } else {
        Err(VaultError::Storage(format!("invalid secret {} {:?}", what, value)))
    }
}

async fn create_private_dir(path: &Path) -> Result<()> {
    let mut builder = tokio::fs::DirBuilder::new();
    #[cfg(unix)]
    builder.mode(0o700);
    builder.create(path).await.map_err(|e| VaultError::io(path, e))
}

#[cfg(unix)]
async fn write_private(path: &Path, content: &[u8]) -> Result<()> {
    use tokio::io::AsyncWriteExt;

    let mut file = tokio::fs::OpenOptions::new()
        .write(true)
        .create(true)
        .truncate(true)
        .mode(0o600)
        .open(path)
        .await
        .map_err(|e| VaultError::io(path, e))?;
    file.write_all(content).await.map_err(|e| VaultError::io(path, e))?;
    file.sync_all().await.map_err(|e| VaultError::io(path, e))
}

#[cfg(not(unix))]
async fn write_private(path: &Path, content: &[u8]) -> Result<()> {
    tokio::fs::write(path, content)
        .await
        .map_err(|e| VaultError::io(path, e))
}

#[cfg(unix)]
async fn create_link(target: &Path, link: &Path, _is_dir: bool) -> std::io::Result<()> {
    tokio::fs::symlink(target, link).await
}

#[cfg(windows)]
async fn create_link(target: &Path, link: &Path, is_dir: bool) -> std::io::Result<()> {
    if is_dir {
        tokio::fs::symlink_dir(target, link).await
    } else {
        tokio::fs::symlink_file(target, link).await
    }
}

/// Points `dir/name` at `target` with a single rename over any existing entry.
async fn replace_link(dir: &Path, name: &str, target: &Path, is_dir: bool) -> Result<()> {
    let link = dir.join(name);
    let tmp = dir.join(format!("..{}_tmp", name.trim_start_matches('.')));

    let _ = tokio::fs::remove_file(&tmp).await;
    create_link(target, &tmp, is_dir)
        .await
        .map_err(|e| VaultError::io(&tmp, e))?;
    if let Err(e) = tokio::fs::rename(&tmp, &link).await {
        let _ = tokio::fs::remove_file(&tmp).await;
        return Err(VaultError::io(&link, e));
    }
    Ok(())
}

#[async_trait]
impl SecretStore for FileSecretStore {
    async fn apply(&self, record: &SecretRecord) -> Result<ApplyOutcome> {
        let dir = self.secret_dir(&record.namespace, &record.name)?;
        tokio::fs::create_dir_all(&dir)
            .await
            .map_err(|e| VaultError::io(&dir, e))?;

        let previous = match Self::current_version_dir(&dir).await? {
            Some(current) => Self::read_metadata(&current).await?,
            None => None,
        };
        let (version, outcome) = match &previous {
            Some(meta) => (meta.version + 1, ApplyOutcome::Updated),
            None => (1, ApplyOutcome::Created),
        };
        let metadata = metadata_for(record, version);
        let version_name = Self::stage_version(&dir, record, &metadata).await?;

        // the swap: every file of the new version becomes visible at once
        replace_link(&dir, DATA_LINK, Path::new(&version_name), true).await?;

        for name in record.data.names() {
            let link = dir.join(name);
            let target = Path::new(DATA_LINK).join(name);
            let linked = tokio::fs::read_link(&link).await.map_or(false, |t| t == target);
            if !linked {
                replace_link(&dir, name, &target, false).await?;
            }
        }

        // links of the previous layout that the new one no longer has
        if let Some(previous) = previous {
            for stale in previous.files.iter().filter(|f| !record.data.contains(f)) {
                if check_component("file", stale).is_ok() {
                    let path = dir.join(stale);
                    if let Err(e) = tokio::fs::remove_file(&path).await {
                        tracing::warn!(path = %path.display(), error = %e, "failed to remove stale secret file");
                    }
                }
            }
        }
        Self::prune_versions(&dir, &version_name).await;

        Ok(outcome)
    }

    async fn get(&self, namespace: &str, name: &str) -> Result<Option<StoredSecret>> {
        let dir = self.secret_dir(namespace, name)?;
        // resolve `..data` once so every file comes from the same version
        let Some(current) = Self::current_version_dir(&dir).await? else {
            return Ok(None);
        };
        let Some(metadata) = Self::read_metadata(&current).await? else {
            return Ok(None);
        };

        let mut data = BTreeMap::new();
        for file in &metadata.files {
            check_component("file", file)?;
            let path = current.join(file);
            let content = tokio::fs::read(&path).await.map_err(|e| VaultError::io(&path, e))?;
            data.insert(file.clone(), content);
        }
        Ok(Some(StoredSecret { metadata, data }))
    }

    async fn delete(&self, namespace: &str, name: &str) -> Result<bool> {
        let dir = self.secret_dir(namespace, name)?;
        match tokio::fs::remove_dir_all(&dir).await {
            Ok(()) => Ok(true),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(false),
            Err(e) => Err(VaultError::io(&dir, e)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(name: &str, files: &[(&str, &[u8])]) -> SecretRecord {
        let mut data = RenderBundle::new();
        for (file, content) in files {
            data.insert(*file, content.to_vec());
        }
        SecretRecord {
            namespace: "default".to_string(),
            name: name.to_string(),
            secret_type: SecretType::Opaque,
            labels: BTreeMap::from([("app".to_string(), "web".to_string())]),
            annotations: BTreeMap::new(),
            data,
        }
    }

    #[tokio::test]
    async fn test_in_memory_create_then_update() {
        let store = InMemorySecretStore::new();
        assert!(store.is_empty());

        let outcome = store.apply(&record("s", &[("a", b"one")])).await.unwrap();
        assert_eq!(outcome, ApplyOutcome::Created);
        let outcome = store.apply(&record("s", &[("a", b"two")])).await.unwrap();
        assert_eq!(outcome, ApplyOutcome::Updated);

        let stored = store.get("default", "s").await.unwrap().unwrap();
        assert_eq!(stored.metadata.version, 2);
        assert_eq!(stored.data["a"], b"two".to_vec());
        assert_eq!(store.len(), 1);
    }

    #[tokio::test]
    async fn test_in_memory_delete() {
        let store = InMemorySecretStore::new();
        store.apply(&record("s", &[("a", b"x")])).await.unwrap();
        assert!(store.delete("default", "s").await.unwrap());
        assert!(!store.delete("default", "s").await.unwrap());
        assert!(store.get("default", "s").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_file_store_layout() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileSecretStore::new(dir.path());

        store
            .apply(&record("s", &[("tls.key", b"k"), ("tls.crt", b"c")]))
            .await
            .unwrap();

        let secret_dir = dir.path().join("default").join("s");
        assert_eq!(std::fs::read(secret_dir.join("tls.key")).unwrap(), b"k");
        assert!(secret_dir.join(DATA_LINK).join(METADATA_FILE).exists());
        assert!(secret_dir.join("..v1").join("tls.crt").exists());
        assert!(!secret_dir.join("..data_tmp").exists());

        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            let mode = std::fs::metadata(secret_dir.join("tls.key")).unwrap().permissions().mode();
            assert_eq!(mode & 0o777, 0o600);
        }
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_file_store_swaps_whole_version() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileSecretStore::new(dir.path());
        let secret_dir = dir.path().join("default").join("s");

        store.apply(&record("s", &[("tls.key", b"k1"), ("tls.crt", b"c1")])).await.unwrap();
        // a reader that resolved the current version before the update
        let pinned = std::fs::canonicalize(secret_dir.join(DATA_LINK)).unwrap();

        store.apply(&record("s", &[("tls.key", b"k2"), ("tls.crt", b"c2")])).await.unwrap();

        assert_eq!(std::fs::read_link(secret_dir.join(DATA_LINK)).unwrap(), Path::new("..v2"));
        for file in ["tls.key", "tls.crt"] {
            let link = std::fs::symlink_metadata(secret_dir.join(file)).unwrap();
            assert!(link.file_type().is_symlink());
            assert_eq!(
                std::fs::read_link(secret_dir.join(file)).unwrap(),
                Path::new(DATA_LINK).join(file)
            );
        }
        assert_eq!(std::fs::read(secret_dir.join("tls.key")).unwrap(), b"k2");
        assert_eq!(std::fs::read(secret_dir.join("tls.crt")).unwrap(), b"c2");

        // the old version is pruned as a unit, never rewritten in place
        assert!(!pinned.exists());
        assert!(!secret_dir.join("..v1").exists());
    }

    #[tokio::test]
    async fn test_file_store_recovers_from_interrupted_staging() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileSecretStore::new(dir.path());
        let secret_dir = dir.path().join("default").join("s");

        store.apply(&record("s", &[("a", b"one")])).await.unwrap();
        std::fs::create_dir(secret_dir.join("..v2")).unwrap();
        std::fs::write(secret_dir.join("..v2").join("junk"), b"partial").unwrap();

        store.apply(&record("s", &[("a", b"two")])).await.unwrap();
        let stored = store.get("default", "s").await.unwrap().unwrap();
        assert_eq!(stored.metadata.version, 2);
        assert_eq!(stored.data["a"], b"two".to_vec());
        assert!(!secret_dir.join("..v2").join("junk").exists());
    }

    #[tokio::test]
    async fn test_file_store_update_removes_stale_files() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileSecretStore::new(dir.path());

        store.apply(&record("s", &[("tls.key", b"k"), ("tls.crt", b"c")])).await.unwrap();
        let outcome = store.apply(&record("s", &[("keypair.pem", b"kp")])).await.unwrap();
        assert_eq!(outcome, ApplyOutcome::Updated);

        let stored = store.get("default", "s").await.unwrap().unwrap();
        assert_eq!(stored.metadata.version, 2);
        assert_eq!(stored.data.keys().collect::<Vec<_>>(), vec!["keypair.pem"]);
        assert!(!dir.path().join("default/s/tls.key").exists());
    }

    #[tokio::test]
    async fn test_file_store_rejects_traversal() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileSecretStore::new(dir.path());

        let mut bad = record("s", &[("a", b"x")]);
        bad.namespace = "..".to_string();
        assert!(matches!(store.apply(&bad).await, Err(VaultError::Storage(_))));

        let bad = record("../escape", &[("a", b"x")]);
        assert!(store.apply(&bad).await.is_err());
    }

    #[tokio::test]
    async fn test_file_store_missing_secret() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileSecretStore::new(dir.path());
        assert!(store.get("default", "nope").await.unwrap().is_none());
        assert!(!store.delete("default", "nope").await.unwrap());
    }

    #[test]
    fn test_secret_type_serialization() {
        assert_eq!(serde_json::to_string(&SecretType::Tls).unwrap(), "\"kubernetes.io/tls\"");
        assert_eq!(serde_json::to_string(&SecretType::Opaque).unwrap(), "\"Opaque\"");
    }
}
