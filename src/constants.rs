//! Global constants used throughout the imgvals codebase.
//!
//! Timeouts, retry parameters, and placeholder values shared by several
//! modules live here so the numbers are discoverable in one place.

use std::time::Duration;

/// Name of the project configuration file searched for in the project directory.
pub const MANIFEST_FILE_NAME: &str = "imgvals.toml";

/// Default number of build attempts made by the retry envelope.
///
/// Only infrastructure failures (lock contention, registry throttling,
/// transient I/O) consume additional attempts.
pub const DEFAULT_MAX_ATTEMPTS: u32 = 3;

/// Default timeout for fingerprint lock acquisition (120 seconds).
pub fn default_lock_timeout() -> Duration {
    Duration::from_secs(120)
}

/// Maximum backoff delay for exponential backoff (500ms).
pub const MAX_BACKOFF_DELAY_MS: u64 = 500;

/// Starting delay for exponential backoff (10ms).
pub const STARTING_BACKOFF_DELAY_MS: u64 = 10;

/// First delay between two build attempts (2 seconds).
pub const ATTEMPT_BACKOFF_BASE_MS: u64 = 2_000;

/// Upper bound on the delay between two build attempts (30 seconds).
pub const ATTEMPT_BACKOFF_MAX_MS: u64 = 30_000;

/// Timeout for a single `git` invocation (60 seconds).
pub const GIT_COMMAND_TIMEOUT: Duration = Duration::from_secs(60);

/// Minimum number of parallel build workers regardless of CPU count.
pub const MIN_PARALLELISM: usize = 2;

/// Repository address reported for every image in stub mode.
pub const STUB_REPO_ADDRESS: &str = "stub/repository";

/// Tag reported for every image in stub mode.
pub const STUB_TAG: &str = "TAG";

/// Number of fingerprint hex characters used in content-derived tags.
pub const CONTENT_TAG_FINGERPRINT_LEN: usize = 32;

/// Maximum length of a Kubernetes namespace (DNS-1123 label).
pub const MAX_NAMESPACE_LEN: usize = 63;

/// Default parallelism: the number of CPU cores, but never less than [`MIN_PARALLELISM`].
pub fn default_max_parallel() -> usize {
    std::thread::available_parallelism().map(|n| n.get()).unwrap_or(MIN_PARALLELISM).max(MIN_PARALLELISM)
}
