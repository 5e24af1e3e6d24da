//! Build-cache (stages storage) collaborator.
//!
//! The pipeline talks to the build cache through [`StagesStorage`]: look up an
//! entry by fingerprint, commit a freshly built artifact, take the
//! per-fingerprint lock that keeps concurrent writers apart, and report the
//! registry address entries belong to.
//!
//! Implementations must keep commits atomic: a commit interrupted at any point
//! leaves either no entry or the complete entry, never something `lookup` would
//! return half-written. Retried attempts rely on this.
//!
//! [`LocalStagesStorage`] keeps entries on the local filesystem.

mod local;
mod lock;

pub use local::LocalStagesStorage;
pub use lock::FingerprintLock;

use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::fingerprint::Fingerprint;

/// A cache entry: where the image built for a fingerprint lives.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CacheEntry {
    /// Fingerprint the image was built from
    pub fingerprint: String,
    /// Repository the image was pushed to
    pub repository: String,
    /// Tag within the repository
    pub tag: String,
    /// Image digest or ID, when known
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub digest: Option<String>,
    /// When the entry was committed
    pub created_at: DateTime<Utc>,
}

impl CacheEntry {
    /// An entry only counts for the registry it was pushed to.
    #[must_use]
    pub fn is_valid_for(&self, address: &str) -> bool {
        self.repository == address
    }

    /// `repository:tag`.
    #[must_use]
    pub fn image_ref(&self) -> String {
        format!("{}:{}", self.repository, self.tag)
    }
}

/// Output of a successful build, handed to [`StagesStorage::commit`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BuiltArtifact {
    /// Tag the image was pushed under
    pub tag: String,
    /// Image digest or ID, when the builder reports one
    pub digest: Option<String>,
    /// Build completion time
    pub created_at: DateTime<Utc>,
}

/// Held lock on one fingerprint. Released on drop.
pub struct StageLock {
    fingerprint: Fingerprint,
    _guard: Box<dyn Send + Sync>,
}

impl StageLock {
    /// Wrap an implementation-specific guard.
    pub fn new(fingerprint: Fingerprint, guard: impl Send + Sync + 'static) -> Self {
        Self {
            fingerprint,
            _guard: Box::new(guard),
        }
    }

    /// Fingerprint this lock covers.
    #[must_use]
    pub fn fingerprint(&self) -> &Fingerprint {
        &self.fingerprint
    }
}

impl fmt::Debug for StageLock {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StageLock").field("fingerprint", &self.fingerprint).finish_non_exhaustive()
    }
}

/// Content-addressed build cache.
#[async_trait]
pub trait StagesStorage: Send + Sync {
    /// Registry address all entries of this storage are pushed to.
    fn address(&self) -> &str;

    /// Entry for `fingerprint`, if one was committed. Read-only.
    async fn lookup(&self, fingerprint: &Fingerprint) -> Result<Option<CacheEntry>>;

    /// Record `artifact` as the image for `fingerprint` and return the new entry.
    async fn commit(&self, fingerprint: &Fingerprint, artifact: BuiltArtifact)
    -> Result<CacheEntry>;

    /// Acquire the exclusive lock for `fingerprint`.
    ///
    /// Failing to acquire it in time is an infrastructure error.
    async fn lock(&self, fingerprint: &Fingerprint) -> Result<StageLock>;
}
