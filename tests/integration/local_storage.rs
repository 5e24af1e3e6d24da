//! The pipeline over the on-disk stages storage.

use std::sync::Arc;

use anyhow::Result;
use imgvals_cli::build::ImageBuilder;
use imgvals_cli::cancel::CancelSignal;
use imgvals_cli::config::PipelineConfig;
use imgvals_cli::pipeline::{Infrastructure, get_service_values};
use imgvals_cli::storage::{LocalStagesStorage, StagesStorage};
use imgvals_cli::test_utils::{FakeBuilder, FakeFailure, FakeGit, ManifestFixture, ProjectFixture};
use tempfile::TempDir;

use crate::common::REPO;

struct LocalInfrastructure {
    builder: Arc<FakeBuilder>,
}

impl Infrastructure for LocalInfrastructure {
    fn stages_storage(&self, repo: &str, config: &PipelineConfig) -> Result<Arc<dyn StagesStorage>> {
        Ok(Arc::new(LocalStagesStorage::new(&config.cache_dir, repo, config.lock_timeout)))
    }

    fn image_builder(&self) -> Result<Arc<dyn ImageBuilder>> {
        Ok(self.builder.clone())
    }
}

fn config(project: &ProjectFixture, scratch: &TempDir) -> PipelineConfig {
    let mut config = PipelineConfig::new(project.path(), scratch.path().join("cache"));
    config.repo = Some(REPO.to_string());
    config.retry = imgvals_cli::build::RetryPolicy::immediate(3);
    config.tmp_dir = Some(scratch.path().join("work"));
    config
}

#[tokio::test]
async fn test_cache_survives_between_runs() {
    let project = ProjectFixture::create(&ManifestFixture::with_base_image()).unwrap();
    let scratch = TempDir::new().unwrap();
    let config = config(&project, &scratch);
    let manifest = project.manifest().unwrap();
    let git = FakeGit::new();

    let first_builder = Arc::new(FakeBuilder::new());
    let infra = LocalInfrastructure {
        builder: first_builder.clone(),
    };
    let first = get_service_values(&config, &manifest, &infra, &git, &CancelSignal::never())
        .await
        .unwrap();
    assert_eq!(first_builder.build_count(), 3);

    let second_builder = Arc::new(FakeBuilder::new());
    let infra = LocalInfrastructure {
        builder: second_builder.clone(),
    };
    let second = get_service_values(&config, &manifest, &infra, &git, &CancelSignal::never())
        .await
        .unwrap();

    assert_eq!(second_builder.build_count(), 0);
    assert_eq!(first.images, second.images);
}

#[tokio::test]
async fn test_failed_attempt_leaves_no_entry_behind() {
    let project = ProjectFixture::create(&ManifestFixture::single_image()).unwrap();
    let scratch = TempDir::new().unwrap();
    let config = config(&project, &scratch);
    let manifest = project.manifest().unwrap();
    let git = FakeGit::new();

    let builder = Arc::new(FakeBuilder::new());
    builder.fail_next(FakeFailure::Infrastructure, 3).await;
    let infra = LocalInfrastructure {
        builder: builder.clone(),
    };
    get_service_values(&config, &manifest, &infra, &git, &CancelSignal::never())
        .await
        .unwrap_err();

    // The next run still sees a clean cache and builds exactly once
    get_service_values(&config, &manifest, &infra, &git, &CancelSignal::never()).await.unwrap();
    assert_eq!(builder.build_count(), 4);
}

#[tokio::test]
async fn test_registries_do_not_share_entries() {
    let project = ProjectFixture::create(&ManifestFixture::single_image()).unwrap();
    let scratch = TempDir::new().unwrap();
    let mut config = config(&project, &scratch);
    let manifest = project.manifest().unwrap();
    let git = FakeGit::new();
    let builder = Arc::new(FakeBuilder::new());
    let infra = LocalInfrastructure {
        builder: builder.clone(),
    };

    get_service_values(&config, &manifest, &infra, &git, &CancelSignal::never()).await.unwrap();
    config.repo = Some("mirror.example.com/demo".to_string());
    let doc =
        get_service_values(&config, &manifest, &infra, &git, &CancelSignal::never()).await.unwrap();

    assert_eq!(builder.build_count(), 2);
    assert_eq!(doc.images["web"].repository, "mirror.example.com/demo");
}
