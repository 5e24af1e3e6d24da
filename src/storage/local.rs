//! Filesystem-backed stages storage.
//!
//! Layout under the cache directory:
//!
//! ```text
//! <cache_dir>/stages/<repo-slug>/
//! ├── <fingerprint>.json     committed entries
//! ├── .<fingerprint>.json.<uuid>.tmp   in-flight commits
//! └── .locks/<fingerprint>.lock
//! ```
//!
//! Each registry address gets its own directory, so entries pushed to one
//! registry are never offered for another.

use anyhow::{Context, Result};
use async_trait::async_trait;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{debug, warn};

use super::{BuiltArtifact, CacheEntry, FingerprintLock, StageLock, StagesStorage};
use crate::core::ValuesError;
use crate::fingerprint::Fingerprint;
use crate::utils::{atomic_write, short_hash, slugify};

/// [`StagesStorage`] keeping one JSON entry per fingerprint on disk.
#[derive(Debug, Clone)]
pub struct LocalStagesStorage {
    address: String,
    root: PathBuf,
    lock_timeout: Duration,
}

impl LocalStagesStorage {
    /// Storage for `address` rooted in `cache_dir`.
    #[must_use]
    pub fn new(cache_dir: &Path, address: &str, lock_timeout: Duration) -> Self {
        let root = cache_dir.join("stages").join(Self::repo_dir_name(address));
        Self {
            address: address.to_string(),
            root,
            lock_timeout,
        }
    }

    /// Directory name for a registry address: readable slug plus a hash of the exact address.
    fn repo_dir_name(address: &str) -> String {
        format!("{}-{}", slugify(address), short_hash(address))
    }

    /// Directory holding this storage's entries.
    #[must_use]
    pub fn root(&self) -> &Path {
        &self.root
    }

    fn entry_path(&self, fingerprint: &Fingerprint) -> PathBuf {
        self.root.join(format!("{fingerprint}.json"))
    }

    fn unavailable(operation: &str, path: &Path, e: &std::io::Error) -> ValuesError {
        ValuesError::StorageUnavailable {
            operation: operation.to_string(),
            path: path.display().to_string(),
            reason: e.to_string(),
        }
    }
}

#[async_trait]
impl StagesStorage for LocalStagesStorage {
    fn address(&self) -> &str {
        &self.address
    }

    async fn lookup(&self, fingerprint: &Fingerprint) -> Result<Option<CacheEntry>> {
        let path = self.entry_path(fingerprint);
        let content = match tokio::fs::read_to_string(&path).await {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(Self::unavailable("read cache entry", &path, &e).into()),
        };

        match serde_json::from_str::<CacheEntry>(&content) {
            Ok(entry) if entry.fingerprint == fingerprint.as_str() => Ok(Some(entry)),
            Ok(_) => {
                warn!(path = %path.display(), "Ignoring cache entry recorded for another fingerprint");
                Ok(None)
            }
            Err(e) => {
                warn!(path = %path.display(), error = %e, "Ignoring unreadable cache entry");
                Ok(None)
            }
        }
    }

    async fn commit(
        &self,
        fingerprint: &Fingerprint,
        artifact: BuiltArtifact,
    ) -> Result<CacheEntry> {
        let entry = CacheEntry {
            fingerprint: fingerprint.to_string(),
            repository: self.address.clone(),
            tag: artifact.tag,
            digest: artifact.digest,
            created_at: artifact.created_at,
        };
        let content =
            serde_json::to_vec_pretty(&entry).context("Failed to serialize cache entry")?;

        let path = self.entry_path(fingerprint);
        let write_path = path.clone();
        tokio::task::spawn_blocking(move || atomic_write(&write_path, &content))
            .await
            .with_context(|| "spawn_blocking panicked")?
            .map_err(|e| ValuesError::StorageUnavailable {
                operation: "commit cache entry".to_string(),
                path: path.display().to_string(),
                reason: format!("{e:#}"),
            })?;

        debug!(fingerprint = %fingerprint, tag = %entry.tag, "Committed cache entry");
        Ok(entry)
    }

    async fn lock(&self, fingerprint: &Fingerprint) -> Result<StageLock> {
        let lock = FingerprintLock::acquire(
            &self.root.join(".locks"),
            fingerprint.as_str(),
            self.lock_timeout,
        )
        .await?;
        Ok(StageLock::new(fingerprint.clone(), lock))
    }
}
