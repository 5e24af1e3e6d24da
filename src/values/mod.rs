//! Service values document.
//!
//! The document is the only output of a run: project identity, deployment
//! context, the source commit, and one entry per image. Keys serialize in a
//! fixed order and images keep the order they were resolved in, so the same
//! inputs always render byte-identical YAML.

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use indexmap::IndexMap;
use serde::Serialize;

use crate::build::ImageInfo;
use crate::core::ValuesError;

/// Where the document is deployed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeployContext {
    /// Project name from the manifest
    pub project: String,
    /// Resolved Kubernetes namespace
    pub namespace: String,
    /// Environment, empty when unset
    pub environment: String,
    /// Repository shared by every image, if one was resolved
    pub repo: Option<String>,
}

/// Head commit of the project.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommitInfo {
    /// Full commit hash
    pub hash: String,
    /// Committer time
    pub time: DateTime<Utc>,
}

/// Values for one image.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ImageValues {
    /// Repository address
    pub repository: String,
    /// Tag
    pub tag: String,
    /// `repository:tag`
    pub image: String,
    /// Digest or image ID
    #[serde(skip_serializing_if = "Option::is_none")]
    pub digest: Option<String>,
}

impl From<ImageInfo> for ImageValues {
    fn from(info: ImageInfo) -> Self {
        Self {
            image: info.image_ref(),
            repository: info.repository,
            tag: info.tag,
            digest: info.digest,
        }
    }
}

/// The service values handed to the deployment layer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ServiceValuesDocument {
    pub project: String,
    pub namespace: String,
    pub env: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub repo: Option<String>,
    pub commit_hash: String,
    /// RFC 3339
    pub commit_date: String,
    /// Unix seconds
    pub commit_timestamp: i64,
    pub images: IndexMap<String, ImageValues>,
}

impl ServiceValuesDocument {
    /// Render the document as YAML.
    pub fn to_yaml(&self) -> Result<String> {
        serde_yaml::to_string(self).context("Failed to serialize service values")
    }
}

fn is_valid_commit_hash(hash: &str) -> bool {
    (4..=64).contains(&hash.len()) && hash.chars().all(|c| c.is_ascii_hexdigit())
}

fn assembly_error(reason: String) -> anyhow::Error {
    ValuesError::AssemblyError {
        reason,
    }
    .into()
}

/// Merge deployment context, commit metadata, and image info into one document.
///
/// # Errors
///
/// Returns [`ValuesError::AssemblyError`] for an empty project name, a commit
/// hash that is not hexadecimal, or two images with the same name.
pub fn assemble_service_values(
    context: DeployContext,
    commit: CommitInfo,
    images: Vec<ImageInfo>,
) -> Result<ServiceValuesDocument> {
    if context.project.trim().is_empty() {
        return Err(assembly_error("project name is empty".to_string()));
    }
    if !is_valid_commit_hash(&commit.hash) {
        return Err(assembly_error(format!("malformed commit hash '{}'", commit.hash)));
    }

    let mut values = IndexMap::with_capacity(images.len());
    for info in images {
        let name = info.name.clone();
        if values.insert(name.clone(), ImageValues::from(info)).is_some() {
            return Err(assembly_error(format!("image '{name}' appears twice")));
        }
    }

    Ok(ServiceValuesDocument {
        project: context.project,
        namespace: context.namespace,
        env: context.environment,
        repo: context.repo,
        commit_hash: commit.hash,
        commit_date: commit.time.to_rfc3339(),
        commit_timestamp: commit.time.timestamp(),
        images: values,
    })
}
