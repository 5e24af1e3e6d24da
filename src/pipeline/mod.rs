//! End-to-end service values resolution.
//!
//! ```text
//! resolve images ─┬─ stub mode ──────────────────────────────┐
//!                 └─ evaluate + build (retried) ─ assemble ──┴─ service values
//! ```
//!
//! [`get_service_values`] is the single entry point. Everything it touches
//! outside the process goes through a collaborator: [`Infrastructure`] creates
//! the stages storage and the image builder, [`CommitSource`] reads the commit.
//! The infrastructure is only created once the image set is known to be valid
//! and real resolution is needed, so a bad filter or stub mode never opens the
//! cache.

use anyhow::{Context, Result};
use std::sync::Arc;
use tracing::{debug, info};

use crate::build::{
    Conveyor, CustomTagTemplate, DockerCliBuilder, ImageBuilder, ImageInfo, ImageInfoAssembler,
    RetryingExecutor, TagStrategy, stub_image_infos,
};
use crate::cancel::CancelSignal;
use crate::config::PipelineConfig;
use crate::constants::STUB_REPO_ADDRESS;
use crate::core::ValuesError;
use crate::deploy::resolve_namespace;
use crate::fingerprint::FingerprintCalculator;
use crate::git::CommitSource;
use crate::images::{DependencyGraph, ImageDescriptor, resolve_images};
use crate::manifest::Manifest;
use crate::storage::{LocalStagesStorage, StagesStorage};
use crate::values::{CommitInfo, DeployContext, ServiceValuesDocument, assemble_service_values};

/// Factory for the collaborators real resolution needs.
pub trait Infrastructure: Send + Sync {
    /// Stages storage for the registry repository `repo`.
    fn stages_storage(&self, repo: &str, config: &PipelineConfig)
    -> Result<Arc<dyn StagesStorage>>;

    /// The image builder.
    fn image_builder(&self) -> Result<Arc<dyn ImageBuilder>>;
}

/// Local file cache plus the docker CLI.
#[derive(Debug, Clone, Copy, Default)]
pub struct DefaultInfrastructure;

impl Infrastructure for DefaultInfrastructure {
    fn stages_storage(
        &self,
        repo: &str,
        config: &PipelineConfig,
    ) -> Result<Arc<dyn StagesStorage>> {
        Ok(Arc::new(LocalStagesStorage::new(&config.cache_dir, repo, config.lock_timeout)))
    }

    fn image_builder(&self) -> Result<Arc<dyn ImageBuilder>> {
        Ok(Arc::new(DockerCliBuilder::new()?))
    }
}

/// Resolve the service values of `manifest` under `config`.
///
/// # Errors
///
/// Configuration problems fail before any collaborator is used. Infrastructure
/// failures during the build pass are retried up to `config.retry.max_attempts`
/// and then returned. Cancellation returns [`ValuesError::Cancelled`].
pub async fn get_service_values(
    config: &PipelineConfig,
    manifest: &Manifest,
    infra: &dyn Infrastructure,
    git: &dyn CommitSource,
    cancel: &CancelSignal,
) -> Result<ServiceValuesDocument> {
    let images = resolve_images(manifest, &config.images)?;
    let custom_tag = config.custom_tag.as_deref().map(CustomTagTemplate::new).transpose()?;
    let environment = config.environment_or_empty();
    let namespace = resolve_namespace(manifest, environment, config.namespace.as_deref())?;
    debug!(images = images.len(), namespace = %namespace, stub = config.stub_tags, "Resolved image set");

    let (repo, infos) = if config.stub_tags {
        info!("Using stub image tags");
        (Some(STUB_REPO_ADDRESS.to_string()), stub_image_infos(&images))
    } else if images.is_empty() {
        (config.repo.clone(), Vec::new())
    } else {
        let repo = config.repo.clone().ok_or(ValuesError::RepoAddressRequired)?;
        let tag_strategy = match &custom_tag {
            Some(template) => TagStrategy::Custom(template),
            None => TagStrategy::Content,
        };
        let infos =
            resolve_image_infos(config, manifest, &images, &repo, infra, tag_strategy, cancel)
                .await?;
        (Some(repo), infos)
    };

    let commit = read_commit(git, cancel).await?;

    assemble_service_values(
        DeployContext {
            project: manifest.project.name.clone(),
            namespace,
            environment: environment.to_string(),
            repo,
        },
        commit,
        infos,
    )
}

async fn resolve_image_infos(
    config: &PipelineConfig,
    manifest: &Manifest,
    images: &[ImageDescriptor],
    repo: &str,
    infra: &dyn Infrastructure,
    tag_strategy: TagStrategy<'_>,
    cancel: &CancelSignal,
) -> Result<Vec<ImageInfo>> {
    let graph = DependencyGraph::build(manifest)?;
    let fingerprints =
        FingerprintCalculator::new(manifest, &config.build_variables, config.platform.as_deref());
    let storage = infra.stages_storage(repo, config)?;
    let builder = infra.image_builder()?;

    let conveyor = Conveyor::new(manifest, &graph, &fingerprints, storage.as_ref(), builder.as_ref())
        .with_variables(&config.build_variables)
        .with_platform(config.platform.as_deref())
        .with_max_parallel(config.max_parallel);

    let executor = RetryingExecutor::new(config.retry, config.tmp_dir.clone());
    let report = executor
        .run(cancel, |attempt| {
            let conveyor = &conveyor;
            async move { conveyor.run_attempt(images, &attempt.workdir).await }
        })
        .await?;
    info!(
        up_to_date = report.up_to_date.len(),
        built = report.built.len(),
        reused = report.reused.len(),
        "Build pass finished"
    );

    ImageInfoAssembler::new(&fingerprints, storage.as_ref()).assemble(images, tag_strategy).await
}

async fn read_commit(git: &dyn CommitSource, cancel: &CancelSignal) -> Result<CommitInfo> {
    let read = async {
        let hash = git.head_commit_hash().await.context("Failed to read HEAD commit hash")?;
        let time = git.head_commit_time().await.context("Failed to read HEAD commit time")?;
        Ok::<_, anyhow::Error>(CommitInfo {
            hash,
            time,
        })
    };

    tokio::select! {
        biased;
        () = cancel.cancelled() => Err(ValuesError::Cancelled.into()),
        commit = read => commit,
    }
}
