//! Image builders.
//!
//! How an image is built is opaque to the pipeline: it hands an
//! [`ImageBuilder`] a fully resolved [`BuildRequest`] and gets back the pushed
//! artifact. [`DockerCliBuilder`] shells out to the `docker` CLI.

use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::Utc;
use std::collections::BTreeMap;
use std::path::PathBuf;
use std::process::Stdio;
use tokio::process::Command;
use tracing::{debug, info};

use crate::core::ValuesError;
use crate::fingerprint::Fingerprint;
use crate::storage::BuiltArtifact;

/// Everything needed to build and push one image.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BuildRequest {
    /// Logical image name
    pub image: String,
    /// Fingerprint the image is built for
    pub fingerprint: Fingerprint,
    /// Absolute Dockerfile path
    pub dockerfile: PathBuf,
    /// Absolute build context directory
    pub context: PathBuf,
    /// Multi-stage target
    pub target: Option<String>,
    /// Target platform, e.g. `linux/amd64`
    pub platform: Option<String>,
    /// Build arguments after substitution, including dependency image references
    pub build_args: BTreeMap<String, String>,
    /// Repository to push to
    pub repository: String,
    /// Tag to push under
    pub tag: String,
    /// Scratch directory of the current attempt
    pub workdir: PathBuf,
}

impl BuildRequest {
    /// `repository:tag`.
    #[must_use]
    pub fn image_ref(&self) -> String {
        format!("{}:{}", self.repository, self.tag)
    }
}

/// Builds and pushes images.
#[async_trait]
pub trait ImageBuilder: Send + Sync {
    /// Build `request` and push the result to its repository.
    ///
    /// Recipe failures are build-logic errors; transient registry failures are
    /// infrastructure errors.
    async fn build(&self, request: &BuildRequest) -> Result<BuiltArtifact>;
}

/// [`ImageBuilder`] driving `docker build` and `docker push`.
#[derive(Debug, Clone)]
pub struct DockerCliBuilder {
    program: PathBuf,
}

impl DockerCliBuilder {
    /// Locate `docker` on `PATH`.
    ///
    /// # Errors
    ///
    /// Returns [`ValuesError::BuilderNotFound`] if it is not installed.
    pub fn new() -> Result<Self> {
        let program = which::which("docker").map_err(|_| ValuesError::BuilderNotFound {
            program: "docker".to_string(),
        })?;
        Ok(Self {
            program,
        })
    }

    /// Arguments of the `docker build` invocation for `request`.
    #[must_use]
    pub fn build_args(request: &BuildRequest) -> Vec<String> {
        let mut args = vec![
            "build".to_string(),
            "--file".to_string(),
            request.dockerfile.display().to_string(),
            "--tag".to_string(),
            request.image_ref(),
        ];
        if let Some(target) = &request.target {
            args.push("--target".to_string());
            args.push(target.clone());
        }
        if let Some(platform) = &request.platform {
            args.push("--platform".to_string());
            args.push(platform.clone());
        }
        for (key, value) in &request.build_args {
            args.push("--build-arg".to_string());
            args.push(format!("{key}={value}"));
        }
        args.push("--iidfile".to_string());
        args.push(Self::iid_path(request).display().to_string());
        args.push(request.context.display().to_string());
        args
    }

    fn iid_path(request: &BuildRequest) -> PathBuf {
        request.workdir.join(format!("{}.iid", request.image))
    }

    async fn run(&self, args: &[String]) -> Result<std::process::Output> {
        debug!("Executing command: docker {}", args.join(" "));
        let command = args.first().map_or("", String::as_str);
        Command::new(&self.program)
            .args(args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .output()
            .await
            .with_context(|| format!("Failed to execute docker {command}"))
    }
}

#[async_trait]
impl ImageBuilder for DockerCliBuilder {
    async fn build(&self, request: &BuildRequest) -> Result<BuiltArtifact> {
        info!(image = %request.image, tag = %request.tag, "Building image");

        let output = self.run(&Self::build_args(request)).await?;
        if !output.status.success() {
            // Base image pulls hit the registry too
            let stderr = String::from_utf8_lossy(&output.stderr).to_string();
            let reason = last_lines(&stderr, 20);
            return Err(if is_transient_registry_failure(&stderr) {
                ValuesError::RegistryUnavailable {
                    image: request.image.clone(),
                    reason,
                }
            } else {
                ValuesError::BuildFailed {
                    image: request.image.clone(),
                    reason,
                }
            }
            .into());
        }

        let digest = tokio::fs::read_to_string(Self::iid_path(request))
            .await
            .ok()
            .map(|id| id.trim().to_string())
            .filter(|id| !id.is_empty());

        let push = self.run(&["push".to_string(), request.image_ref()]).await?;
        if !push.status.success() {
            let stderr = String::from_utf8_lossy(&push.stderr).to_string();
            let reason = last_lines(&stderr, 10);
            return Err(if is_transient_registry_failure(&stderr) {
                ValuesError::RegistryUnavailable {
                    image: request.image.clone(),
                    reason,
                }
            } else {
                ValuesError::PushRejected {
                    image: request.image.clone(),
                    reason,
                }
            }
            .into());
        }

        info!(image = %request.image, image_ref = %request.image_ref(), "Pushed image");
        Ok(BuiltArtifact {
            tag: request.tag.clone(),
            digest,
            created_at: Utc::now(),
        })
    }
}

/// Whether registry output describes a failure worth retrying.
#[must_use]
pub fn is_transient_registry_failure(output: &str) -> bool {
    const PATTERNS: &[&str] = &[
        "toomanyrequests",
        "too many requests",
        "429 ",
        "502 bad gateway",
        "503 service unavailable",
        "504 gateway",
        "timeout",
        "timed out",
        "connection reset",
        "connection refused",
        "broken pipe",
        "unexpected eof",
    ];
    let lower = output.to_lowercase();
    PATTERNS.iter().any(|p| lower.contains(p))
}

fn last_lines(text: &str, count: usize) -> String {
    let lines: Vec<&str> = text.trim().lines().collect();
    lines[lines.len().saturating_sub(count)..].join("\n")
}
