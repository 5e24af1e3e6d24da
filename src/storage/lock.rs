//! Per-fingerprint file locks for cross-process coordination.
//!
//! File operations run in `spawn_blocking` so lock polling never stalls tokio
//! worker threads.

use crate::constants::{MAX_BACKOFF_DELAY_MS, STARTING_BACKOFF_DELAY_MS};
use crate::core::ValuesError;
use anyhow::{Context, Result};
use fs4::fs_std::FileExt;
use std::fs::{File, OpenOptions};
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tokio_retry::strategy::ExponentialBackoff;
use tracing::debug;

/// An exclusive OS-level lock on `{locks_dir}/{name}.lock`.
///
/// The lock is released when the value is dropped. The lock file itself is left
/// in place: removing it would let a waiting process lock an unlinked inode
/// while a newcomer locks a fresh file of the same name.
#[derive(Debug)]
pub struct FingerprintLock {
    _file: Arc<File>,
    name: String,
}

impl Drop for FingerprintLock {
    fn drop(&mut self) {
        debug!(lock = %self.name, "Fingerprint lock released");
    }
}

impl FingerprintLock {
    /// Acquire the lock, polling with exponential backoff (10ms up to 500ms).
    ///
    /// # Errors
    ///
    /// - [`ValuesError::LockTimeout`] if the lock is still held after `timeout`
    /// - [`ValuesError::StorageUnavailable`] if the lock file cannot be opened or
    ///   locking fails for a reason other than contention
    pub async fn acquire(locks_dir: &Path, name: &str, timeout: Duration) -> Result<Self> {
        debug!(lock = %name, "Waiting for fingerprint lock");

        tokio::fs::create_dir_all(locks_dir).await.map_err(|e| {
            ValuesError::StorageUnavailable {
                operation: "create locks directory".to_string(),
                path: locks_dir.display().to_string(),
                reason: e.to_string(),
            }
        })?;

        let lock_path = locks_dir.join(format!("{name}.lock"));
        let open_path = lock_path.clone();
        let file = tokio::task::spawn_blocking(move || {
            OpenOptions::new().create(true).write(true).truncate(false).open(&open_path)
        })
        .await
        .with_context(|| "spawn_blocking panicked")?
        .map_err(|e| ValuesError::StorageUnavailable {
            operation: "open lock file".to_string(),
            path: lock_path.display().to_string(),
            reason: e.to_string(),
        })?;
        let file = Arc::new(file);

        let start = std::time::Instant::now();
        let backoff = ExponentialBackoff::from_millis(STARTING_BACKOFF_DELAY_MS)
            .max_delay(Duration::from_millis(MAX_BACKOFF_DELAY_MS));

        for delay in backoff {
            let attempt = Arc::clone(&file);
            let locked = tokio::task::spawn_blocking(move || attempt.try_lock_exclusive())
                .await
                .with_context(|| "spawn_blocking panicked")?;

            if is_acquired(locked, &lock_path)? {
                debug!(
                    lock = %name,
                    wait_ms = start.elapsed().as_millis(),
                    "Fingerprint lock acquired"
                );
                return Ok(Self {
                    _file: file,
                    name: name.to_string(),
                });
            }

            let remaining = timeout.saturating_sub(start.elapsed());
            if remaining.is_zero() {
                break;
            }
            tokio::time::sleep(delay.min(remaining)).await;
        }

        Err(ValuesError::LockTimeout {
            lock: name.to_string(),
            timeout_secs: timeout.as_secs(),
        }
        .into())
    }
}

/// Interpret one `try_lock_exclusive` result.
///
/// `Ok(false)` and `WouldBlock` mean another holder; any other I/O error is a
/// storage failure and is not waited out.
fn is_acquired(result: std::io::Result<bool>, lock_path: &Path) -> Result<bool> {
    match result {
        Ok(acquired) => Ok(acquired),
        Err(e) if e.kind() == std::io::ErrorKind::WouldBlock => Ok(false),
        Err(e) => Err(ValuesError::StorageUnavailable {
            operation: "lock".to_string(),
            path: lock_path.display().to_string(),
            reason: e.to_string(),
        }
        .into()),
    }
}
