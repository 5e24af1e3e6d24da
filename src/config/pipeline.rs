//! Explicit per-run configuration.

use std::collections::HashMap;
use std::path::PathBuf;
use std::time::Duration;

use crate::build::RetryPolicy;
use crate::constants::{default_lock_timeout, default_max_parallel};
use crate::images::ImagesToProcess;

/// Everything one pipeline run needs besides the manifest and its collaborators.
///
/// Built once by the caller (the CLI merges flags, environment, and
/// [`super::GlobalConfig`]) and passed by reference; nothing reads process-wide
/// state during a run.
#[derive(Debug, Clone)]
pub struct PipelineConfig {
    /// Project directory; also the git working tree
    pub project_dir: PathBuf,
    /// Images to process
    pub images: ImagesToProcess,
    /// Deployment environment, e.g. `production`
    pub environment: Option<String>,
    /// Explicit namespace; overrides the manifest template
    pub namespace: Option<String>,
    /// Registry repository images are pushed to
    pub repo: Option<String>,
    /// Report placeholder image info instead of resolving real images
    pub stub_tags: bool,
    /// Custom tag template (`%image%`, `%image_slug%`, `%image_safe_slug%`)
    pub custom_tag: Option<String>,
    /// Retry envelope settings
    pub retry: RetryPolicy,
    /// Parent directory for the run's temporary workspace
    pub tmp_dir: Option<PathBuf>,
    /// Build cache directory
    pub cache_dir: PathBuf,
    /// Fingerprint lock timeout
    pub lock_timeout: Duration,
    /// Parallel builds per dependency level
    pub max_parallel: usize,
    /// Values for `{VAR}` placeholders in build arguments
    pub build_variables: HashMap<String, String>,
    /// Target platform passed to the builder
    pub platform: Option<String>,
}

impl PipelineConfig {
    /// Configuration with defaults for everything but the directories.
    #[must_use]
    pub fn new(project_dir: impl Into<PathBuf>, cache_dir: impl Into<PathBuf>) -> Self {
        Self {
            project_dir: project_dir.into(),
            images: ImagesToProcess::All,
            environment: None,
            namespace: None,
            repo: None,
            stub_tags: false,
            custom_tag: None,
            retry: RetryPolicy::default(),
            tmp_dir: None,
            cache_dir: cache_dir.into(),
            lock_timeout: default_lock_timeout(),
            max_parallel: default_max_parallel(),
            build_variables: HashMap::new(),
            platform: None,
        }
    }

    /// The environment, or the empty string when unset.
    #[must_use]
    pub fn environment_or_empty(&self) -> &str {
        self.environment.as_deref().unwrap_or("")
    }
}
