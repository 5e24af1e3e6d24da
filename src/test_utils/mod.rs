//! Test utilities for imgvals
//!
//! Collaborator doubles with call counters, project fixtures, and a git helper
//! for unit and integration tests. Compiled for `cfg(test)` and with the
//! `test-utils` feature.
//!
//! # Example
//!
//! ```rust,no_run
//! use imgvals_cli::test_utils::{InMemoryStorage, FakeBuilder, CountingInfrastructure};
//! use std::sync::Arc;
//!
//! let storage = Arc::new(InMemoryStorage::new("registry.example.com/demo"));
//! let builder = Arc::new(FakeBuilder::new());
//! let infra = CountingInfrastructure::new(storage.clone(), builder.clone());
//! // ... run the pipeline with `&infra` ...
//! assert_eq!(builder.build_count(), 0);
//! ```

pub mod doubles;
pub mod fixtures;
pub mod git_helper;

pub use doubles::{CountingInfrastructure, FakeBuilder, FakeFailure, FakeGit, InMemoryStorage};
pub use fixtures::{ManifestFixture, ProjectFixture};
pub use git_helper::TestGit;

use std::sync::Once;
use tracing::Level;
use tracing_subscriber::EnvFilter;

static INIT_LOGGING: Once = Once::new();

/// Initialize logging for tests.
///
/// Only the first call has an effect. Uses `level` when given, otherwise
/// `RUST_LOG`; with neither, logging stays off.
///
/// ```bash
/// RUST_LOG=debug cargo test
/// ```
pub fn init_test_logging(level: Option<Level>) {
    INIT_LOGGING.call_once(|| {
        let filter = if let Some(level) = level {
            EnvFilter::new(level.to_string())
        } else if std::env::var("RUST_LOG").is_ok() {
            EnvFilter::from_default_env()
        } else {
            return;
        };

        let _ = tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_test_writer()
            .with_target(true)
            .with_thread_ids(false)
            .try_init();
    });
}
