//! Builder for `git` invocations.
//!
//! Every command runs with `-C <dir>` when a directory is set, captures its
//! output, and is bounded by a timeout so a hung git never blocks a run.

use anyhow::{Context, Result};
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::Duration;
use tokio::process::Command;
use tokio::time::timeout;

use crate::constants::GIT_COMMAND_TIMEOUT;
use crate::core::ValuesError;

/// A git command under construction.
///
/// # Examples
///
/// ```rust,no_run
/// use imgvals_cli::git::GitCommand;
///
/// # async fn example() -> anyhow::Result<()> {
/// let head = GitCommand::new()
///     .current_dir("/path/to/repo")
///     .args(["rev-parse", "HEAD"])
///     .execute_stdout()
///     .await?;
/// # Ok(())
/// # }
/// ```
#[derive(Debug)]
pub struct GitCommand {
    args: Vec<String>,
    current_dir: Option<PathBuf>,
    timeout_duration: Duration,
}

impl Default for GitCommand {
    fn default() -> Self {
        Self {
            args: Vec::new(),
            current_dir: None,
            timeout_duration: GIT_COMMAND_TIMEOUT,
        }
    }
}

/// Captured output of a successful git command.
#[derive(Debug, Clone)]
pub struct GitCommandOutput {
    /// Standard output
    pub stdout: String,
    /// Standard error
    pub stderr: String,
}

impl GitCommand {
    /// Start an empty command.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Run the command against the repository at `dir`.
    #[must_use]
    pub fn current_dir(mut self, dir: impl AsRef<Path>) -> Self {
        self.current_dir = Some(dir.as_ref().to_path_buf());
        self
    }

    /// Append one argument.
    #[must_use]
    pub fn arg(mut self, arg: impl Into<String>) -> Self {
        self.args.push(arg.into());
        self
    }

    /// Append several arguments.
    #[must_use]
    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args.extend(args.into_iter().map(Into::into));
        self
    }

    /// Override the default timeout.
    #[must_use]
    pub const fn with_timeout(mut self, duration: Duration) -> Self {
        self.timeout_duration = duration;
        self
    }

    /// Run the command.
    ///
    /// # Errors
    ///
    /// - [`ValuesError::GitNotFound`] if no `git` executable is on `PATH`
    /// - [`ValuesError::GitCommandError`] on a non-zero exit or timeout
    pub async fn execute(self) -> Result<GitCommandOutput> {
        let git = which::which("git").map_err(|_| ValuesError::GitNotFound)?;

        let mut full_args = Vec::new();
        if let Some(dir) = &self.current_dir {
            full_args.push("-C".to_string());
            full_args.push(dir.display().to_string());
        }
        full_args.extend(self.args.iter().cloned());
        let operation = self.args.first().cloned().unwrap_or_else(|| "unknown".to_string());

        tracing::debug!(target: "git", "Executing command: git {}", full_args.join(" "));

        let mut cmd = Command::new(git);
        cmd.args(&full_args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        let output = match timeout(self.timeout_duration, cmd.output()).await {
            Ok(result) => {
                result.with_context(|| format!("Failed to execute git {}", full_args.join(" ")))?
            }
            Err(_) => {
                tracing::warn!(
                    target: "git",
                    "Command timed out after {} seconds: git {}",
                    self.timeout_duration.as_secs(),
                    full_args.join(" ")
                );
                return Err(ValuesError::GitCommandError {
                    operation,
                    stderr: format!(
                        "timed out after {} seconds",
                        self.timeout_duration.as_secs()
                    ),
                }
                .into());
            }
        };

        let stdout = String::from_utf8_lossy(&output.stdout).to_string();
        let stderr = String::from_utf8_lossy(&output.stderr).to_string();

        if !output.status.success() {
            tracing::debug!(
                target: "git",
                "Command failed with exit code {:?}: {}",
                output.status.code(),
                stderr.trim()
            );
            return Err(ValuesError::GitCommandError {
                operation,
                stderr: if stderr.trim().is_empty() {
                    stdout
                } else {
                    stderr
                },
            }
            .into());
        }

        Ok(GitCommandOutput {
            stdout,
            stderr,
        })
    }

    /// Run the command and return its trimmed standard output.
    pub async fn execute_stdout(self) -> Result<String> {
        let output = self.execute().await?;
        Ok(output.stdout.trim().to_string())
    }
}
