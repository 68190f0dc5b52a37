//! Filesystem publisher
//!
//! Config: `path`, an absolute directory. Output: `{path}/{keyID}.pub`
//! containing the PEM public key.

use crate::error::{PublishError, Result};
use crate::publisher::Publisher;
use async_trait::async_trait;
use keywarden_core::PublishTarget;
use keywarden_crypto::encoding::{KeyEncoder, PemEncoder};
use keywarden_crypto::KeyPair;
use std::path::{Component, Path, PathBuf};

pub const CONFIG_PATH: &str = "path";

#[derive(Debug, Clone, Copy, Default)]
pub struct FilesystemPublisher;

impl FilesystemPublisher {
    pub fn new() -> Self {
        Self
    }
}

/// Absolute, with no `..` component.
fn checked_dir(raw: &str) -> Result<PathBuf> {
    let path = Path::new(raw);
    if !path.is_absolute() {
        return Err(PublishError::RelativePath(raw.to_string()));
    }
    if path.components().any(|c| c == Component::ParentDir) {
        return Err(PublishError::PathTraversal(raw.to_string()));
    }
    Ok(path.components().collect())
}

async fn ensure_dir(dir: &Path) -> Result<()> {
    let mut builder = tokio::fs::DirBuilder::new();
    builder.recursive(true);
    #[cfg(unix)]
    builder.mode(0o750);
    builder.create(dir).await.map_err(|e| PublishError::io(dir, e))
}

async fn write_file(path: &Path, content: &[u8]) -> Result<()> {
    let mut options = tokio::fs::OpenOptions::new();
    options.write(true).create(true).truncate(true);
    #[cfg(unix)]
    options.mode(0o600);

    let mut file = options.open(path).await.map_err(|e| PublishError::io(path, e))?;
    tokio::io::AsyncWriteExt::write_all(&mut file, content)
        .await
        .map_err(|e| PublishError::io(path, e))?;
    file.sync_all().await.map_err(|e| PublishError::io(path, e))
}

#[async_trait]
impl Publisher for FilesystemPublisher {
    async fn publish(&self, target: &PublishTarget, kp: &KeyPair) -> Result<()> {
        let raw = target
            .config_value(CONFIG_PATH)
            .ok_or(PublishError::MissingConfig(CONFIG_PATH))?;
        let dir = checked_dir(raw)?;
        ensure_dir(&dir).await?;

        let pem = PemEncoder.encode_public(kp.public_key()?)?;
        let path = dir.join(format!("{}.pub", kp.key_id()));
        let tmp = dir.join(format!("{}.pub.tmp", kp.key_id()));

        write_file(&tmp, &pem).await?;
        if let Err(e) = tokio::fs::rename(&tmp, &path).await {
            let _ = tokio::fs::remove_file(&tmp).await;
            return Err(PublishError::io(&path, e));
        }

        tracing::debug!(key_id = %kp.key_id(), path = %path.display(), "public key written");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use keywarden_core::KeySpec;
    use keywarden_crypto::{KeyGenerator, StandardKeyGenerator};

    fn keypair() -> KeyPair {
        StandardKeyGenerator::new().generate(&KeySpec::ec("P-256")).unwrap()
    }

    fn target(path: &str) -> PublishTarget {
        PublishTarget::new("filesystem").with_config(CONFIG_PATH, path)
    }

    #[test]
    fn test_path_checks() {
        assert!(checked_dir("/var/lib/keys").is_ok());
        assert!(matches!(checked_dir("keys"), Err(PublishError::RelativePath(_))));
        assert!(matches!(
            checked_dir("/var/lib/../../etc"),
            Err(PublishError::PathTraversal(_))
        ));
        // trailing separators and `.` components normalise away
        assert_eq!(checked_dir("/var/./lib/").unwrap(), PathBuf::from("/var/lib"));
    }

    #[tokio::test]
    async fn test_publish_writes_pem_named_by_key_id() {
        let dir = tempfile::tempdir().unwrap();
        let out = dir.path().join("nested").join("keys");
        let kp = keypair();

        FilesystemPublisher::new()
            .publish(&target(out.to_str().unwrap()), &kp)
            .await
            .unwrap();

        let file = out.join(format!("{}.pub", kp.key_id()));
        let content = std::fs::read(&file).unwrap();
        assert!(content.starts_with(b"-----BEGIN PUBLIC KEY-----"));
        assert!(!String::from_utf8_lossy(&content).contains("PRIVATE"));
        assert!(!out.join(format!("{}.pub.tmp", kp.key_id())).exists());

        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            let mode = std::fs::metadata(&file).unwrap().permissions().mode();
            assert_eq!(mode & 0o777, 0o600);
        }
    }

    #[tokio::test]
    async fn test_publish_is_idempotent() {
        let dir = tempfile::tempdir().unwrap();
        let kp = keypair();
        let t = target(dir.path().to_str().unwrap());
        let publisher = FilesystemPublisher::new();

        publisher.publish(&t, &kp).await.unwrap();
        let first = std::fs::read(dir.path().join(format!("{}.pub", kp.key_id()))).unwrap();
        publisher.publish(&t, &kp).await.unwrap();
        let second = std::fs::read(dir.path().join(format!("{}.pub", kp.key_id()))).unwrap();

        assert_eq!(first, second);
        assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 1);
    }

    #[tokio::test]
    async fn test_missing_path() {
        let err = FilesystemPublisher::new()
            .publish(&PublishTarget::new("filesystem"), &keypair())
            .await
            .unwrap_err();
        assert!(matches!(err, PublishError::MissingConfig("path")));
    }

    #[tokio::test]
    async fn test_wiped_key_is_not_published() {
        let dir = tempfile::tempdir().unwrap();
        let mut kp = keypair();
        kp.wipe();
        let err = FilesystemPublisher::new()
            .publish(&target(dir.path().to_str().unwrap()), &kp)
            .await
            .unwrap_err();
        assert!(matches!(err, PublishError::Encode(_)));
    }
}
