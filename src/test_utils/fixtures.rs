//! Project fixtures: manifests plus the files their recipes point at.

use anyhow::{Context, Result};
use std::path::{Path, PathBuf};
use tempfile::TempDir;

use crate::constants::MANIFEST_FILE_NAME;
use crate::manifest::Manifest;

/// Sample `imgvals.toml` content.
#[derive(Clone, Debug)]
pub struct ManifestFixture {
    pub name: String,
    pub content: String,
    /// Files the recipes need, relative to the project root
    pub files: Vec<(String, String)>,
}

impl ManifestFixture {
    /// One image, `web`, built from the project root.
    pub fn single_image() -> Self {
        Self {
            name: "single_image".to_string(),
            content: r#"
[project]
name = "demo"

[[image]]
name = "web"
"#
            .trim()
            .to_string(),
            files: vec![
                ("Dockerfile".to_string(), "FROM alpine\nCOPY . /app\n".to_string()),
                ("src/main.rs".to_string(), "fn main() {}\n".to_string()),
            ],
        }
    }

    /// Independent `web` and `worker` images.
    pub fn web_and_worker() -> Self {
        Self {
            name: "web_and_worker".to_string(),
            content: r#"
[project]
name = "demo"

[[image]]
name = "web"
dockerfile = "web/Dockerfile"
context = "web"

[[image]]
name = "worker"
dockerfile = "worker/Dockerfile"
context = "worker"
"#
            .trim()
            .to_string(),
            files: vec![
                ("web/Dockerfile".to_string(), "FROM nginx\n".to_string()),
                ("web/index.html".to_string(), "<h1>demo</h1>\n".to_string()),
                ("worker/Dockerfile".to_string(), "FROM python:3\n".to_string()),
                ("worker/main.py".to_string(), "print('work')\n".to_string()),
            ],
        }
    }

    /// `web` and `worker` both built on top of `base`.
    pub fn with_base_image() -> Self {
        Self {
            name: "with_base_image".to_string(),
            content: r#"
[project]
name = "demo"

[deploy]
namespace = "[[ project ]]-[[ env ]]"

[[image]]
name = "base"
dockerfile = "base/Dockerfile"
context = "base"

[[image]]
name = "web"
dockerfile = "web/Dockerfile"
context = "web"
dependencies = ["base"]
args = { COMMIT = "{GIT_SHA}" }

[[image]]
name = "worker"
dockerfile = "worker/Dockerfile"
context = "worker"
dependencies = ["base"]
"#
            .trim()
            .to_string(),
            files: vec![
                ("base/Dockerfile".to_string(), "FROM debian\n".to_string()),
                (
                    "web/Dockerfile".to_string(),
                    "ARG IMGVALS_IMAGE_BASE\nFROM ${IMGVALS_IMAGE_BASE}\n".to_string(),
                ),
                ("web/app.js".to_string(), "console.log('web')\n".to_string()),
                (
                    "worker/Dockerfile".to_string(),
                    "ARG IMGVALS_IMAGE_BASE\nFROM ${IMGVALS_IMAGE_BASE}\n".to_string(),
                ),
            ],
        }
    }

    /// Syntactically broken manifest.
    pub fn invalid_syntax() -> Self {
        Self {
            name: "invalid_syntax".to_string(),
            content: "[project\nname = ".to_string(),
            files: Vec::new(),
        }
    }
}

/// A temporary project directory holding a manifest and its recipe files.
pub struct ProjectFixture {
    dir: TempDir,
}

impl ProjectFixture {
    /// Write `fixture` into a fresh temporary directory.
    pub fn create(fixture: &ManifestFixture) -> Result<Self> {
        let dir = TempDir::new().context("Failed to create project directory")?;
        let project = Self {
            dir,
        };
        project.write(MANIFEST_FILE_NAME, &fixture.content)?;
        for (path, content) in &fixture.files {
            project.write(path, content)?;
        }
        Ok(project)
    }

    pub fn path(&self) -> &Path {
        self.dir.path()
    }

    pub fn manifest_path(&self) -> PathBuf {
        self.dir.path().join(MANIFEST_FILE_NAME)
    }

    /// Write `content` to `relative`, creating parent directories.
    pub fn write(&self, relative: &str, content: &str) -> Result<()> {
        let path = self.dir.path().join(relative);
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create {}", parent.display()))?;
        }
        std::fs::write(&path, content).with_context(|| format!("Failed to write {}", path.display()))
    }

    /// Load and validate the project's manifest.
    pub fn manifest(&self) -> Result<Manifest> {
        Manifest::load(&self.manifest_path())
    }
}
