//! Git collaborator: the commit a run describes.
//!
//! The pipeline only needs the HEAD commit hash and time of the project
//! repository. [`CommitSource`] is the seam; [`GitRepo`] implements it with the
//! system `git` binary.

mod command_builder;

pub use command_builder::{GitCommand, GitCommandOutput};

use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::path::{Path, PathBuf};

use crate::core::ValuesError;

/// Source of the HEAD commit metadata.
#[async_trait]
pub trait CommitSource: Send + Sync {
    /// Full hash of the HEAD commit.
    async fn head_commit_hash(&self) -> Result<String>;

    /// Commit time of the HEAD commit.
    async fn head_commit_time(&self) -> Result<DateTime<Utc>>;
}

/// A local git working tree.
#[derive(Debug, Clone)]
pub struct GitRepo {
    path: PathBuf,
}

impl GitRepo {
    /// Repository containing `path`.
    pub fn new(path: impl AsRef<Path>) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
        }
    }

    /// Working tree path.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }
}

#[async_trait]
impl CommitSource for GitRepo {
    async fn head_commit_hash(&self) -> Result<String> {
        GitCommand::new()
            .current_dir(&self.path)
            .args(["rev-parse", "HEAD"])
            .execute_stdout()
            .await
    }

    async fn head_commit_time(&self) -> Result<DateTime<Utc>> {
        let raw = GitCommand::new()
            .current_dir(&self.path)
            .args(["log", "-1", "--format=%ct", "HEAD"])
            .execute_stdout()
            .await?;
        parse_commit_time(&raw)
    }
}

fn parse_commit_time(raw: &str) -> Result<DateTime<Utc>> {
    raw.trim()
        .parse::<i64>()
        .ok()
        .and_then(|secs| DateTime::from_timestamp(secs, 0))
        .ok_or_else(|| {
            ValuesError::GitCommandError {
                operation: "log".to_string(),
                stderr: format!("unexpected commit time '{raw}'"),
            }
            .into()
        })
}
