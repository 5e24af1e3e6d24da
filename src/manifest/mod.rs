//! Project configuration (`imgvals.toml`) parsing and validation.
//!
//! The manifest is the configuration provider of the pipeline: it yields the
//! project identity, the optional namespace template, and the declared images
//! with their build recipes. Images are declared as an array of tables so their
//! declaration order is preserved; that order is the order of every image list
//! the pipeline produces.
//!
//! # Format
//!
//! ```toml
//! [project]
//! name = "demo"
//!
//! [deploy]
//! namespace = "[[ project ]]-[[ env ]]"
//!
//! [[image]]
//! name = "base"
//! dockerfile = "docker/base.Dockerfile"
//!
//! [[image]]
//! name = "web"
//! dockerfile = "web/Dockerfile"
//! context = "web"
//! target = "runtime"
//! dependencies = ["base"]
//! exclude = ["**/node_modules/**"]
//! args = { RUST_VERSION = "1.85", GIT_SHA = "{GIT_SHA}" }
//! ```
//!
//! Recipe paths are relative to the directory holding the manifest.

mod helpers;

pub use helpers::{find_manifest_from, find_manifest_with_optional};

use crate::core::ValuesError;
use crate::images::DependencyGraph;
use anyhow::Result;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashSet};
use std::path::{Path, PathBuf};

/// Parsed `imgvals.toml`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Manifest {
    /// Project identity
    pub project: ProjectMeta,

    /// Deployment settings
    #[serde(default)]
    pub deploy: DeploySettings,

    /// Declared images in declaration order
    #[serde(default, rename = "image")]
    pub images: Vec<ImageRecipe>,

    /// Directory containing the manifest; recipe paths resolve against it
    #[serde(skip)]
    pub manifest_dir: PathBuf,
}

/// `[project]` table.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProjectMeta {
    /// Project name, used for the document and the default namespace
    pub name: String,
}

/// `[deploy]` table.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DeploySettings {
    /// Namespace template with `[[ project ]]` and `[[ env ]]` placeholders
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub namespace: Option<String>,
}

/// One `[[image]]` entry: a logical image and its build recipe.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImageRecipe {
    /// Logical image name, unique within the manifest
    pub name: String,

    /// Dockerfile path
    #[serde(default = "default_dockerfile")]
    pub dockerfile: PathBuf,

    /// Build context directory
    #[serde(default = "default_context")]
    pub context: PathBuf,

    /// Multi-stage build target
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub target: Option<String>,

    /// Build arguments; values may contain `{VAR}` placeholders
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub args: BTreeMap<String, String>,

    /// Images that must be built before this one
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub dependencies: Vec<String>,

    /// Glob patterns of context files ignored by the fingerprint
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub exclude: Vec<String>,
}

fn default_dockerfile() -> PathBuf {
    PathBuf::from("Dockerfile")
}

fn default_context() -> PathBuf {
    PathBuf::from(".")
}

impl Manifest {
    /// Load and validate a manifest file.
    ///
    /// # Errors
    ///
    /// - [`ValuesError::ManifestNotFound`] if the file does not exist
    /// - [`ValuesError::ManifestParseError`] for invalid TOML or schema mismatch
    /// - [`ValuesError::ManifestValidationError`] for inconsistent content
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Err(ValuesError::ManifestNotFound.into());
        }
        let content = std::fs::read_to_string(path).map_err(ValuesError::IoError)?;
        let dir = path.parent().map(Path::to_path_buf).unwrap_or_default();
        Self::parse(&content, &dir).map_err(|e| match e.downcast::<ValuesError>() {
            Ok(ValuesError::ManifestParseError {
                reason,
                ..
            }) => ValuesError::ManifestParseError {
                file: path.display().to_string(),
                reason,
            }
            .into(),
            Ok(other) => other.into(),
            Err(other) => other,
        })
    }

    /// Parse and validate manifest content whose recipe paths resolve against `dir`.
    pub fn parse(content: &str, dir: &Path) -> Result<Self> {
        let mut manifest: Self =
            toml::from_str(content).map_err(|e| ValuesError::ManifestParseError {
                file: "imgvals.toml".to_string(),
                reason: e.message().to_string(),
            })?;
        manifest.manifest_dir = dir.to_path_buf();
        manifest.validate()?;
        Ok(manifest)
    }

    /// Check internal consistency.
    ///
    /// Rejects an empty project name, empty or duplicate image names, unknown or
    /// self dependencies, and dependency cycles.
    pub fn validate(&self) -> Result<()> {
        if self.project.name.trim().is_empty() {
            return Err(invalid("project name must not be empty"));
        }

        let mut seen = HashSet::new();
        for image in &self.images {
            if image.name.trim().is_empty() {
                return Err(invalid("image name must not be empty"));
            }
            if !seen.insert(image.name.as_str()) {
                return Err(invalid(format!("image '{}' is declared more than once", image.name)));
            }
        }

        for image in &self.images {
            for dep in &image.dependencies {
                if dep == &image.name {
                    return Err(invalid(format!("image '{}' depends on itself", image.name)));
                }
                if !seen.contains(dep.as_str()) {
                    return Err(invalid(format!(
                        "image '{}' depends on undeclared image '{}'",
                        image.name, dep
                    )));
                }
            }
        }

        DependencyGraph::build(self)?;
        Ok(())
    }

    /// Look up an image recipe by name.
    #[must_use]
    pub fn image(&self, name: &str) -> Option<&ImageRecipe> {
        self.images.iter().find(|image| image.name == name)
    }

    /// Fail with [`ValuesError::ImageNotFound`] for the first name not declared here.
    pub fn check_that_images_exist<S: AsRef<str>>(&self, names: &[S]) -> Result<()> {
        for name in names {
            if self.image(name.as_ref()).is_none() {
                return Err(ValuesError::ImageNotFound {
                    name: name.as_ref().to_string(),
                }
                .into());
            }
        }
        Ok(())
    }

    /// Names of all declared images in declaration order.
    pub fn image_names(&self) -> impl Iterator<Item = &str> {
        self.images.iter().map(|image| image.name.as_str())
    }

    /// Absolute path of a recipe-relative path.
    #[must_use]
    pub fn resolve_path(&self, relative: &Path) -> PathBuf {
        self.manifest_dir.join(relative)
    }
}

fn invalid(reason: impl Into<String>) -> anyhow::Error {
    ValuesError::ManifestValidationError {
        reason: reason.into(),
    }
    .into()
}
