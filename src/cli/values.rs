//! The `values` command.

use anyhow::{Context, Result};
use clap::Args;
use std::collections::HashMap;
use std::path::PathBuf;
use std::time::Duration;
use tracing::debug;

use super::CliConfig;
use crate::build::RetryPolicy;
use crate::cancel::{CancelHandle, cancel_on_shutdown_signal};
use crate::config::{GlobalConfig, PipelineConfig};
use crate::git::GitRepo;
use crate::images::ImagesToProcess;
use crate::manifest::{Manifest, find_manifest_with_optional};
use crate::pipeline::{DefaultInfrastructure, get_service_values};

/// Resolve images and print the service values document.
///
/// Without image names every image of the manifest is processed. Each flag
/// can also be set through the environment variable shown in `--help`;
/// unset flags fall back to the global config file.
#[derive(Args, Debug, Default)]
pub struct ValuesCommand {
    /// Images to process (default: all)
    #[arg(value_name = "IMAGE", conflicts_with = "without_images")]
    pub images: Vec<String>,

    /// Process no images; the document only carries deployment context
    #[arg(long)]
    pub without_images: bool,

    /// Use placeholder repository and tags instead of resolving real images
    #[arg(long, env = "IMGVALS_STUB_TAGS")]
    pub stub_tags: bool,

    /// Deployment environment
    #[arg(long, env = "IMGVALS_ENV")]
    pub env: Option<String>,

    /// Kubernetes namespace (default: from the manifest template or project-env)
    #[arg(long, env = "IMGVALS_NAMESPACE")]
    pub namespace: Option<String>,

    /// Registry repository for built images
    #[arg(long, env = "IMGVALS_REPO")]
    pub repo: Option<String>,

    /// Report custom tags from a template with %image%, %image_slug%, %image_safe_slug%
    #[arg(long, value_name = "TEMPLATE", env = "IMGVALS_USE_CUSTOM_TAG")]
    pub use_custom_tag: Option<String>,

    /// Build attempts before giving up on transient failures
    #[arg(long, value_parser = clap::value_parser!(u32).range(1..))]
    pub max_attempts: Option<u32>,

    /// Parent directory for the temporary build workspace
    #[arg(long, env = "IMGVALS_TMP_DIR")]
    pub tmp_dir: Option<PathBuf>,

    /// Project directory to search for imgvals.toml (default: current directory)
    #[arg(long)]
    pub dir: Option<PathBuf>,

    /// Parallel image builds per dependency level
    #[arg(long, value_parser = clap::value_parser!(u64).range(1..))]
    pub parallel: Option<u64>,

    /// Target platform, e.g. linux/amd64
    #[arg(long)]
    pub platform: Option<String>,
}

fn non_empty(value: Option<&String>) -> Option<String> {
    value.map(|v| v.trim()).filter(|v| !v.is_empty()).map(str::to_string)
}

impl ValuesCommand {
    /// Resolve the service values and write them to stdout.
    pub async fn execute(self, cli: &CliConfig) -> Result<()> {
        let start_dir = match &self.dir {
            Some(dir) => dir.clone(),
            None => std::env::current_dir().context("Failed to determine current directory")?,
        };
        let manifest_path = find_manifest_with_optional(cli.manifest_path.clone(), &start_dir)?;
        debug!(path = %manifest_path.display(), "Using manifest");
        let manifest = Manifest::load(&manifest_path)?;

        let global = GlobalConfig::load_with_optional(cli.config_path.clone()).await?;
        let config = self.pipeline_config(&global, &manifest, std::env::vars().collect())?;

        let (handle, cancel) = CancelHandle::new_pair();
        cancel_on_shutdown_signal(handle);

        let git = GitRepo::new(&config.project_dir);
        let document =
            get_service_values(&config, &manifest, &DefaultInfrastructure, &git, &cancel).await?;

        print!("{}", document.to_yaml()?);
        Ok(())
    }

    /// Merge flags with `global` into the run configuration.
    pub fn pipeline_config(
        &self,
        global: &GlobalConfig,
        manifest: &Manifest,
        build_variables: HashMap<String, String>,
    ) -> Result<PipelineConfig> {
        let mut config = PipelineConfig::new(project_dir(manifest), global.resolved_cache_dir()?);

        config.images = ImagesToProcess::from_args(self.images.clone(), self.without_images);
        config.environment = non_empty(self.env.as_ref());
        config.namespace = non_empty(self.namespace.as_ref());
        config.repo = non_empty(self.repo.as_ref()).or_else(|| non_empty(global.repo.as_ref()));
        config.stub_tags = self.stub_tags;
        config.custom_tag = non_empty(self.use_custom_tag.as_ref());
        if let Some(max_attempts) = self.max_attempts.or(global.max_attempts) {
            config.retry = RetryPolicy::with_max_attempts(max_attempts);
        }
        config.tmp_dir = match &self.tmp_dir {
            Some(dir) => Some(dir.clone()),
            None => global.resolved_tmp_dir()?,
        };
        if let Some(secs) = global.lock_timeout_secs {
            config.lock_timeout = Duration::from_secs(secs);
        }
        let parallel = self.parallel.and_then(|n| usize::try_from(n).ok());
        if let Some(max_parallel) = parallel.or(global.max_parallel) {
            config.max_parallel = max_parallel.max(1);
        }
        config.platform = non_empty(self.platform.as_ref()).or_else(|| global.platform.clone());
        config.build_variables = build_variables;

        Ok(config)
    }
}

fn project_dir(manifest: &Manifest) -> PathBuf {
    if manifest.manifest_dir.as_os_str().is_empty() {
        PathBuf::from(".")
    } else {
        manifest.manifest_dir.clone()
    }
}
