//! Git helper for tests that need a real repository.

use anyhow::{Context, Result, bail};
use std::path::{Path, PathBuf};
use std::process::Command;

/// Runs git in a test repository.
pub struct TestGit {
    repo_path: PathBuf,
}

impl TestGit {
    fn run(&self, args: &[&str], action: &str) -> Result<std::process::Output> {
        let output = Command::new("git")
            .args(args)
            .current_dir(&self.repo_path)
            .output()
            .with_context(|| action.to_string())?;

        if !output.status.success() {
            bail!("{} failed: {}", action, String::from_utf8_lossy(&output.stderr));
        }
        Ok(output)
    }

    pub fn new(repo_path: impl Into<PathBuf>) -> Self {
        Self {
            repo_path: repo_path.into(),
        }
    }

    /// Whether git is installed; tests needing a repository skip without it.
    pub fn available() -> bool {
        which::which("git").is_ok()
    }

    pub fn repo_path(&self) -> &Path {
        &self.repo_path
    }

    /// `git init` with a local identity.
    pub fn init(&self) -> Result<()> {
        self.run(&["init", "--quiet"], "Failed to initialize git repository")?;
        self.run(&["config", "user.email", "test@imgvals.example"], "Failed to set user email")?;
        self.run(&["config", "user.name", "Test User"], "Failed to set user name")?;
        self.run(&["config", "commit.gpgsign", "false"], "Failed to disable signing")?;
        Ok(())
    }

    /// Stage everything and commit.
    pub fn commit_all(&self, message: &str) -> Result<()> {
        self.run(&["add", "."], "Failed to add files to git")?;
        self.run(&["commit", "--quiet", "-m", message], "Failed to create git commit")?;
        Ok(())
    }

    /// Full hash of HEAD.
    pub fn head(&self) -> Result<String> {
        let output = self.run(&["rev-parse", "HEAD"], "Failed to get current commit SHA")?;
        Ok(String::from_utf8_lossy(&output.stdout).trim().to_string())
    }

    /// `init` followed by an initial commit of the current contents.
    pub fn init_with_commit(&self) -> Result<String> {
        self.init()?;
        self.commit_all("Initial commit")?;
        self.head()
    }
}
