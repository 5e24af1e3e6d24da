//! Shared harness: a project fixture wired to collaborator doubles.

use std::path::PathBuf;
use std::sync::Arc;
use tempfile::TempDir;

use imgvals_cli::build::RetryPolicy;
use imgvals_cli::config::PipelineConfig;
use imgvals_cli::fingerprint::{Fingerprint, FingerprintCalculator};
use imgvals_cli::test_utils::{
    CountingInfrastructure, FakeBuilder, FakeGit, InMemoryStorage, ManifestFixture,
    ProjectFixture, init_test_logging,
};

pub const REPO: &str = "registry.example.com/demo";

pub struct Harness {
    pub project: ProjectFixture,
    pub storage: Arc<InMemoryStorage>,
    pub builder: Arc<FakeBuilder>,
    pub infra: CountingInfrastructure,
    pub git: FakeGit,
    pub scratch: TempDir,
}

impl Harness {
    pub fn new(fixture: &ManifestFixture) -> Self {
        Self::with_builder(fixture, FakeBuilder::new())
    }

    pub fn with_builder(fixture: &ManifestFixture, builder: FakeBuilder) -> Self {
        init_test_logging(None);
        let storage = Arc::new(InMemoryStorage::new(REPO));
        let builder = Arc::new(builder);
        Self {
            project: ProjectFixture::create(fixture).unwrap(),
            infra: CountingInfrastructure::new(storage.clone(), builder.clone()),
            storage,
            builder,
            git: FakeGit::new(),
            scratch: TempDir::new().unwrap(),
        }
    }

    /// Directory the run's workspace is created in.
    pub fn work_dir(&self) -> PathBuf {
        self.scratch.path().join("work")
    }

    /// Config with a repository, three immediate attempts, and workspaces under `work_dir`.
    pub fn config(&self) -> PipelineConfig {
        let mut config =
            PipelineConfig::new(self.project.path(), self.scratch.path().join("cache"));
        config.repo = Some(REPO.to_string());
        config.retry = RetryPolicy::immediate(3);
        config.tmp_dir = Some(self.work_dir());
        config.max_parallel = 2;
        config
    }

    pub async fn fingerprint(&self, config: &PipelineConfig, image: &str) -> Fingerprint {
        let manifest = self.project.manifest().unwrap();
        FingerprintCalculator::new(&manifest, &config.build_variables, config.platform.as_deref())
            .fingerprint(image)
            .await
            .unwrap()
    }

    /// Number of entries left in the workspace parent directory.
    pub fn leftover_workspaces(&self) -> usize {
        match std::fs::read_dir(self.work_dir()) {
            Ok(entries) => entries.count(),
            Err(_) => 0,
        }
    }
}
