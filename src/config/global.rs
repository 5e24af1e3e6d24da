//! User-wide settings from `~/.imgvals/config.toml`.
//!
//! Every field is optional; CLI flags and environment variables override it and
//! built-in defaults fill whatever is left.
//!
//! ```toml
//! repo = "registry.example.com/demo"
//! cache_dir = "~/.cache/imgvals"
//! tmp_dir = "/var/tmp"
//! max_attempts = 5
//! lock_timeout_secs = 300
//! max_parallel = 4
//! platform = "linux/amd64"
//! ```

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tokio::fs;

/// Parsed global configuration.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct GlobalConfig {
    /// Default registry repository
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub repo: Option<String>,

    /// Build cache directory; `~` and `$VAR` are expanded
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cache_dir: Option<String>,

    /// Parent directory for per-run workspaces; `~` and `$VAR` are expanded
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tmp_dir: Option<String>,

    /// Build attempts per run
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_attempts: Option<u32>,

    /// Fingerprint lock timeout in seconds
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub lock_timeout_secs: Option<u64>,

    /// Parallel image builds per dependency level
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_parallel: Option<usize>,

    /// Target platform passed to the builder
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub platform: Option<String>,
}

impl GlobalConfig {
    /// Load from the default location, or defaults if the file does not exist.
    pub async fn load() -> Result<Self> {
        Self::load_with_optional(None).await
    }

    /// Load from `path` when given, else from the default location.
    ///
    /// A missing file yields the defaults.
    pub async fn load_with_optional(path: Option<PathBuf>) -> Result<Self> {
        let path = match path {
            Some(path) => path,
            None => Self::default_path()?,
        };
        if path.exists() {
            Self::load_from(&path).await
        } else {
            Ok(Self::default())
        }
    }

    /// Load from `path`.
    pub async fn load_from(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path)
            .await
            .with_context(|| format!("Failed to read global config from {}", path.display()))?;

        toml::from_str(&content)
            .with_context(|| format!("Failed to parse global config from {}", path.display()))
    }

    /// `~/.imgvals/config.toml`, or `%LOCALAPPDATA%\imgvals\config.toml` on Windows.
    pub fn default_path() -> Result<PathBuf> {
        Ok(imgvals_home()?.join("config.toml"))
    }

    /// Cache directory: `IMGVALS_CACHE_DIR`, then `cache_dir`, then `<imgvals home>/cache`.
    pub fn resolved_cache_dir(&self) -> Result<PathBuf> {
        if let Ok(dir) = std::env::var("IMGVALS_CACHE_DIR") {
            return Ok(PathBuf::from(dir));
        }
        match &self.cache_dir {
            Some(dir) => expand_path(dir),
            None => Ok(imgvals_home()?.join("cache")),
        }
    }

    /// Workspace parent directory, if configured.
    pub fn resolved_tmp_dir(&self) -> Result<Option<PathBuf>> {
        self.tmp_dir.as_deref().map(expand_path).transpose()
    }
}

fn imgvals_home() -> Result<PathBuf> {
    if cfg!(target_os = "windows") {
        Ok(dirs::data_local_dir()
            .ok_or_else(|| anyhow::anyhow!("Unable to determine local data directory"))?
            .join("imgvals"))
    } else {
        Ok(dirs::home_dir()
            .ok_or_else(|| anyhow::anyhow!("Unable to determine home directory"))?
            .join(".imgvals"))
    }
}

/// Expand `~` and environment variables in a configured path.
pub fn expand_path(raw: &str) -> Result<PathBuf> {
    let expanded = shellexpand::full(raw)
        .with_context(|| format!("Failed to expand path '{raw}'"))?;
    Ok(PathBuf::from(expanded.as_ref()))
}
