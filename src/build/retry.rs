//! Retrying Build Executor.
//!
//! [`RetryingExecutor::run`] executes a unit of work inside a bounded retry
//! envelope:
//!
//! - A [`BuildWorkspace`] is created before the first attempt and removed when
//!   the call returns, whatever the outcome.
//! - Each attempt gets a fresh `attempt-N` directory inside the workspace.
//! - Only [`FailureClass::Retryable`] failures start another attempt, after an
//!   exponential backoff delay; anything else is returned immediately.
//! - When attempts run out, the last error is returned unchanged.
//! - The whole envelope, backoff sleeps included, races the cancellation signal;
//!   cancellation drops the in-flight attempt and returns
//!   [`ValuesError::Cancelled`].

use anyhow::{Context, Result};
use std::future::Future;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU32, Ordering};
use std::time::Duration;
use tempfile::TempDir;
use tokio_retry::RetryIf;
use tokio_retry::strategy::ExponentialBackoff;
use tracing::{debug, warn};

use crate::cancel::CancelSignal;
use crate::constants::{ATTEMPT_BACKOFF_BASE_MS, ATTEMPT_BACKOFF_MAX_MS, DEFAULT_MAX_ATTEMPTS};
use crate::core::{FailureClass, ValuesError, classify};

/// Attempt limit and backoff between attempts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Total attempts, at least 1
    pub max_attempts: u32,
    /// Delay before the second attempt; doubles for each further attempt
    pub initial_delay: Duration,
    /// Upper bound on any single delay
    pub max_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: DEFAULT_MAX_ATTEMPTS,
            initial_delay: Duration::from_millis(ATTEMPT_BACKOFF_BASE_MS),
            max_delay: Duration::from_millis(ATTEMPT_BACKOFF_MAX_MS),
        }
    }
}

impl RetryPolicy {
    /// Policy with `max_attempts` (clamped to at least 1) and default delays.
    #[must_use]
    pub fn with_max_attempts(max_attempts: u32) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            ..Self::default()
        }
    }

    /// Policy without delays between attempts.
    #[must_use]
    pub fn immediate(max_attempts: u32) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            initial_delay: Duration::ZERO,
            max_delay: Duration::ZERO,
        }
    }

    /// Delays between consecutive attempts: one fewer than the attempt count.
    fn delays(&self) -> std::iter::Take<ExponentialBackoff> {
        // from_millis(2).factor(f) yields 2f, 4f, 8f, ...
        let factor = u64::try_from(self.initial_delay.as_millis() / 2).unwrap_or(u64::MAX);
        ExponentialBackoff::from_millis(2)
            .factor(factor)
            .max_delay(self.max_delay)
            .take(self.max_attempts.max(1).saturating_sub(1) as usize)
    }
}

/// Scoped temporary directory owned by one run.
///
/// Removed from disk when dropped.
#[derive(Debug)]
pub struct BuildWorkspace {
    dir: TempDir,
}

impl BuildWorkspace {
    /// Create a workspace under `parent`, or under the system temp directory.
    pub fn create(parent: Option<&Path>) -> Result<Self> {
        let mut builder = tempfile::Builder::new();
        builder.prefix("imgvals-");
        let dir = match parent {
            Some(parent) => {
                std::fs::create_dir_all(parent).with_context(|| {
                    format!("Failed to create temporary directory root {}", parent.display())
                })?;
                builder.tempdir_in(parent)
            }
            None => builder.tempdir(),
        }
        .context("Failed to create build workspace")?;

        debug!(path = %dir.path().display(), "Created build workspace");
        Ok(Self {
            dir,
        })
    }

    /// Workspace root.
    #[must_use]
    pub fn path(&self) -> &Path {
        self.dir.path()
    }

    /// Create and return the directory of attempt `attempt`.
    pub fn attempt_dir(&self, attempt: u32) -> Result<PathBuf> {
        let dir = self.dir.path().join(format!("attempt-{attempt}"));
        std::fs::create_dir_all(&dir)
            .with_context(|| format!("Failed to create attempt directory {}", dir.display()))?;
        Ok(dir)
    }
}

impl Drop for BuildWorkspace {
    fn drop(&mut self) {
        debug!(path = %self.dir.path().display(), "Releasing build workspace");
    }
}

/// Per-attempt state handed to the unit of work.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AttemptContext {
    /// 1-based attempt number
    pub attempt: u32,
    /// Fresh scratch directory of this attempt
    pub workdir: PathBuf,
}

/// Runs units of work under a [`RetryPolicy`].
#[derive(Debug, Clone)]
pub struct RetryingExecutor {
    policy: RetryPolicy,
    tmp_dir: Option<PathBuf>,
}

impl RetryingExecutor {
    /// Executor creating workspaces under `tmp_dir` (system temp when `None`).
    #[must_use]
    pub fn new(policy: RetryPolicy, tmp_dir: Option<PathBuf>) -> Self {
        Self {
            policy,
            tmp_dir,
        }
    }

    /// Run `work` until it succeeds, fails fatally, runs out of attempts, or
    /// `cancel` fires.
    ///
    /// The workspace is gone from disk by the time this returns.
    pub async fn run<T, F, Fut>(&self, cancel: &CancelSignal, mut work: F) -> Result<T>
    where
        F: FnMut(AttemptContext) -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        if cancel.is_cancelled() {
            return Err(ValuesError::Cancelled.into());
        }

        let workspace = BuildWorkspace::create(self.tmp_dir.as_deref())?;
        let attempts = AtomicU32::new(0);
        let max_attempts = self.policy.max_attempts.max(1);

        let action = || {
            let attempt = attempts.fetch_add(1, Ordering::SeqCst) + 1;
            debug!(attempt, max_attempts, "Starting build attempt");
            let started = workspace.attempt_dir(attempt).map(|workdir| {
                work(AttemptContext {
                    attempt,
                    workdir,
                })
            });
            async move {
                match started {
                    Ok(future) => future.await,
                    Err(e) => Err(e),
                }
            }
        };

        let should_retry = |error: &anyhow::Error| {
            let attempt = attempts.load(Ordering::SeqCst);
            match classify(error) {
                FailureClass::Retryable if attempt < max_attempts => {
                    warn!(
                        attempt,
                        max_attempts,
                        error = %format!("{error:#}"),
                        "Build attempt failed, retrying"
                    );
                    true
                }
                _ => false,
            }
        };

        let result = tokio::select! {
            biased;
            () = cancel.cancelled() => {
                warn!("Cancellation requested, aborting build attempts");
                Err(ValuesError::Cancelled.into())
            }
            result = RetryIf::spawn(self.policy.delays(), action, should_retry) => result,
        };

        if let Err(error) = &result
            && classify(error) == FailureClass::Retryable
        {
            warn!(attempts = attempts.load(Ordering::SeqCst), "Giving up after retryable failures");
        }

        drop(workspace);
        result
    }
}
