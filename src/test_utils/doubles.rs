//! Collaborator doubles with call counters.

use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use std::collections::VecDeque;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;
use tokio::sync::Mutex;

use crate::build::{BuildRequest, ImageBuilder};
use crate::config::PipelineConfig;
use crate::core::ValuesError;
use crate::fingerprint::Fingerprint;
use crate::git::CommitSource;
use crate::pipeline::Infrastructure;
use crate::storage::{BuiltArtifact, CacheEntry, StageLock, StagesStorage};

/// In-memory [`StagesStorage`] with per-fingerprint async locks.
#[derive(Debug)]
pub struct InMemoryStorage {
    address: String,
    entries: DashMap<String, CacheEntry>,
    locks: DashMap<String, Arc<Mutex<()>>>,
    lookups: AtomicUsize,
    commits: AtomicUsize,
    lock_calls: AtomicUsize,
    failing_locks: AtomicUsize,
}

impl InMemoryStorage {
    pub fn new(address: &str) -> Self {
        Self {
            address: address.to_string(),
            entries: DashMap::new(),
            locks: DashMap::new(),
            lookups: AtomicUsize::new(0),
            commits: AtomicUsize::new(0),
            lock_calls: AtomicUsize::new(0),
            failing_locks: AtomicUsize::new(0),
        }
    }

    /// Store an entry for `fingerprint` as if it had been pushed with `tag`.
    pub fn preload(&self, fingerprint: &Fingerprint, tag: &str) {
        self.insert_entry(CacheEntry {
            fingerprint: fingerprint.to_string(),
            repository: self.address.clone(),
            tag: tag.to_string(),
            digest: Some(format!("sha256:{}", fingerprint.short(12))),
            created_at: Utc::now(),
        });
    }

    /// Store `entry` verbatim, e.g. one pushed to another registry.
    pub fn insert_entry(&self, entry: CacheEntry) {
        self.entries.insert(entry.fingerprint.clone(), entry);
    }

    /// The stored entry for `fingerprint`, without counting a lookup.
    pub fn entry(&self, fingerprint: &Fingerprint) -> Option<CacheEntry> {
        self.entries.get(fingerprint.as_str()).map(|entry| entry.clone())
    }

    /// Make the next `count` lock calls fail with a lock timeout.
    pub fn fail_next_locks(&self, count: usize) {
        self.failing_locks.store(count, Ordering::SeqCst);
    }

    pub fn lookup_count(&self) -> usize {
        self.lookups.load(Ordering::SeqCst)
    }

    pub fn commit_count(&self) -> usize {
        self.commits.load(Ordering::SeqCst)
    }

    pub fn lock_count(&self) -> usize {
        self.lock_calls.load(Ordering::SeqCst)
    }

    /// Lookups, commits, and lock calls together.
    pub fn total_calls(&self) -> usize {
        self.lookup_count() + self.commit_count() + self.lock_count()
    }
}

#[async_trait]
impl StagesStorage for InMemoryStorage {
    fn address(&self) -> &str {
        &self.address
    }

    async fn lookup(&self, fingerprint: &Fingerprint) -> Result<Option<CacheEntry>> {
        self.lookups.fetch_add(1, Ordering::SeqCst);
        Ok(self.entry(fingerprint))
    }

    async fn commit(&self, fingerprint: &Fingerprint, artifact: BuiltArtifact) -> Result<CacheEntry> {
        self.commits.fetch_add(1, Ordering::SeqCst);
        let entry = CacheEntry {
            fingerprint: fingerprint.to_string(),
            repository: self.address.clone(),
            tag: artifact.tag,
            digest: artifact.digest,
            created_at: artifact.created_at,
        };
        self.insert_entry(entry.clone());
        Ok(entry)
    }

    async fn lock(&self, fingerprint: &Fingerprint) -> Result<StageLock> {
        self.lock_calls.fetch_add(1, Ordering::SeqCst);
        let should_fail = self
            .failing_locks
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if should_fail {
            return Err(ValuesError::LockTimeout {
                lock: format!("stage:{}", fingerprint.short(12)),
                timeout_secs: 0,
            }
            .into());
        }

        let mutex = self.locks.entry(fingerprint.to_string()).or_default().clone();
        let guard = mutex.lock_owned().await;
        Ok(StageLock::new(fingerprint.clone(), guard))
    }
}

/// Scripted outcome of one [`FakeBuilder`] build.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FakeFailure {
    /// Transient registry failure (retryable)
    Infrastructure,
    /// Recipe failure (fatal)
    BuildLogic,
    /// Never completes
    Hang,
}

/// [`ImageBuilder`] that succeeds instantly unless a failure is scripted.
#[derive(Debug, Default)]
pub struct FakeBuilder {
    builds: AtomicUsize,
    script: Mutex<VecDeque<FakeFailure>>,
    requests: Mutex<Vec<BuildRequest>>,
    delay: Duration,
}

impl FakeBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Sleep for `delay` inside every successful build.
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    /// Make the next `count` builds end with `failure`.
    pub async fn fail_next(&self, failure: FakeFailure, count: usize) {
        let mut script = self.script.lock().await;
        script.extend(std::iter::repeat_n(failure, count));
    }

    /// Number of build invocations, failed ones included.
    pub fn build_count(&self) -> usize {
        self.builds.load(Ordering::SeqCst)
    }

    /// Requests of every build invocation, in call order.
    pub async fn requests(&self) -> Vec<BuildRequest> {
        self.requests.lock().await.clone()
    }
}

#[async_trait]
impl ImageBuilder for FakeBuilder {
    async fn build(&self, request: &BuildRequest) -> Result<BuiltArtifact> {
        self.builds.fetch_add(1, Ordering::SeqCst);
        self.requests.lock().await.push(request.clone());

        let scripted = self.script.lock().await.pop_front();
        match scripted {
            Some(FakeFailure::Infrastructure) => {
                return Err(ValuesError::RegistryUnavailable {
                    image: request.image_ref(),
                    reason: "toomanyrequests: rate limit exceeded".to_string(),
                }
                .into());
            }
            Some(FakeFailure::BuildLogic) => {
                return Err(ValuesError::BuildFailed {
                    image: request.image.clone(),
                    reason: "RUN make: exit code 2".to_string(),
                }
                .into());
            }
            Some(FakeFailure::Hang) => std::future::pending::<()>().await,
            None => {}
        }

        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        Ok(BuiltArtifact {
            tag: request.tag.clone(),
            digest: Some(format!("sha256:{}", request.fingerprint.short(12))),
            created_at: Utc::now(),
        })
    }
}

/// [`CommitSource`] returning a fixed commit.
#[derive(Debug)]
pub struct FakeGit {
    hash: String,
    time: DateTime<Utc>,
    calls: AtomicUsize,
}

impl Default for FakeGit {
    fn default() -> Self {
        Self {
            hash: "0123456789abcdef0123456789abcdef01234567".to_string(),
            time: DateTime::from_timestamp(1_700_000_000, 0).unwrap_or_default(),
            calls: AtomicUsize::new(0),
        }
    }
}

impl FakeGit {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn hash(&self) -> &str {
        &self.hash
    }

    /// Number of hash and time reads.
    pub fn call_count(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl CommitSource for FakeGit {
    async fn head_commit_hash(&self) -> Result<String> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(self.hash.clone())
    }

    async fn head_commit_time(&self) -> Result<DateTime<Utc>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(self.time)
    }
}

/// [`Infrastructure`] handing out shared doubles and counting requests.
#[derive(Debug)]
pub struct CountingInfrastructure {
    storage: Arc<InMemoryStorage>,
    builder: Arc<FakeBuilder>,
    storage_requests: AtomicUsize,
    builder_requests: AtomicUsize,
}

impl CountingInfrastructure {
    pub fn new(storage: Arc<InMemoryStorage>, builder: Arc<FakeBuilder>) -> Self {
        Self {
            storage,
            builder,
            storage_requests: AtomicUsize::new(0),
            builder_requests: AtomicUsize::new(0),
        }
    }

    /// Times the storage or the builder was requested.
    pub fn request_count(&self) -> usize {
        self.storage_requests.load(Ordering::SeqCst) + self.builder_requests.load(Ordering::SeqCst)
    }
}

impl Infrastructure for CountingInfrastructure {
    fn stages_storage(&self, _repo: &str, _config: &PipelineConfig) -> Result<Arc<dyn StagesStorage>> {
        self.storage_requests.fetch_add(1, Ordering::SeqCst);
        Ok(self.storage.clone())
    }

    fn image_builder(&self) -> Result<Arc<dyn ImageBuilder>> {
        self.builder_requests.fetch_add(1, Ordering::SeqCst);
        Ok(self.builder.clone())
    }
}
