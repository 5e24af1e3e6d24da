//! One evaluate-then-build attempt.
//!
//! The conveyor evaluates the requested images and everything they depend on,
//! then builds the images that are not up to date level by level: images in a
//! level only depend on earlier levels and are built in parallel, bounded by
//! `max_parallel`. Every worker of a level finishes before the level's outcome
//! is looked at, and the first failure in declaration order ends the attempt.
//!
//! Each build happens under the storage's fingerprint lock. After taking the
//! lock the conveyor looks the fingerprint up again, so an image committed by
//! a concurrent writer in the meantime is reused instead of rebuilt.

use anyhow::{Context, Result};
use chrono::Utc;
use futures::stream::{self, StreamExt};
use std::collections::HashMap;
use std::path::Path;
use tracing::{debug, info};

use crate::build::builder::{BuildRequest, ImageBuilder};
use crate::build::evaluator::BuildNecessityEvaluator;
use crate::build::info::content_tag;
use crate::core::ValuesError;
use crate::fingerprint::{Fingerprint, FingerprintCalculator, resolve_build_args};
use crate::images::{DependencyGraph, ImageDescriptor};
use crate::manifest::Manifest;
use crate::storage::{CacheEntry, StagesStorage};

/// What one attempt did, by image name in dependency order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AttemptReport {
    /// Images that were already up to date
    pub up_to_date: Vec<String>,
    /// Images built and committed by this attempt
    pub built: Vec<String>,
    /// Images committed by another writer while this attempt waited for the lock
    pub reused: Vec<String>,
}

enum BuildOutcome {
    Built(CacheEntry),
    Reused(CacheEntry),
}

/// Build argument carrying the reference of dependency `image`.
#[must_use]
pub fn dependency_arg_name(image: &str) -> String {
    let suffix: String = image
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() { c.to_ascii_uppercase() } else { '_' })
        .collect();
    format!("IMGVALS_IMAGE_{suffix}")
}

/// Runs build attempts for one manifest against one storage and builder.
pub struct Conveyor<'a> {
    manifest: &'a Manifest,
    graph: &'a DependencyGraph,
    fingerprints: &'a FingerprintCalculator<'a>,
    storage: &'a dyn StagesStorage,
    builder: &'a dyn ImageBuilder,
    variables: Option<&'a HashMap<String, String>>,
    platform: Option<&'a str>,
    max_parallel: usize,
}

impl<'a> Conveyor<'a> {
    /// Conveyor building one image at a time with no substitution variables.
    #[must_use]
    pub fn new(
        manifest: &'a Manifest,
        graph: &'a DependencyGraph,
        fingerprints: &'a FingerprintCalculator<'a>,
        storage: &'a dyn StagesStorage,
        builder: &'a dyn ImageBuilder,
    ) -> Self {
        Self {
            manifest,
            graph,
            fingerprints,
            storage,
            builder,
            variables: None,
            platform: None,
            max_parallel: 1,
        }
    }

    /// Values for `{VAR}` placeholders in build arguments.
    #[must_use]
    pub fn with_variables(mut self, variables: &'a HashMap<String, String>) -> Self {
        self.variables = Some(variables);
        self
    }

    /// Target platform passed to the builder.
    #[must_use]
    pub fn with_platform(mut self, platform: Option<&'a str>) -> Self {
        self.platform = platform;
        self
    }

    /// Parallel builds per level, at least 1.
    #[must_use]
    pub fn with_max_parallel(mut self, max_parallel: usize) -> Self {
        self.max_parallel = max_parallel.max(1);
        self
    }

    /// Evaluate `images` with their dependencies and build whatever is missing.
    ///
    /// On success every image of `images` is up to date in the storage.
    pub async fn run_attempt(
        &self,
        images: &[ImageDescriptor],
        workdir: &Path,
    ) -> Result<AttemptReport> {
        let names: Vec<&str> = images.iter().map(|image| image.name.as_str()).collect();
        let closure = self.graph.closure(&names);

        let evaluator = BuildNecessityEvaluator::new(self.fingerprints, self.storage);
        let evaluations = evaluator.evaluate_all(&closure).await?;

        let mut report = AttemptReport::default();
        let mut fingerprints: HashMap<String, Fingerprint> = HashMap::new();
        let mut entries: HashMap<String, CacheEntry> = HashMap::new();
        let mut required = Vec::new();
        for evaluation in evaluations {
            fingerprints.insert(evaluation.image.clone(), evaluation.fingerprint);
            match evaluation.entry {
                Some(entry) => {
                    report.up_to_date.push(evaluation.image.clone());
                    entries.insert(evaluation.image, entry);
                }
                None => required.push(evaluation.image),
            }
        }

        if required.is_empty() {
            debug!(images = closure.len(), "All images are up to date");
            return Ok(report);
        }
        info!(count = required.len(), images = %required.join(", "), "Images require a build");

        for level in self.graph.levels(&required) {
            let results: Vec<Result<BuildOutcome>> = stream::iter(level.iter())
                .map(|name| self.build_one(name, &fingerprints[name], &entries, workdir))
                .buffered(self.max_parallel)
                .collect()
                .await;

            let mut first_error = None;
            for (name, result) in level.iter().zip(results) {
                match result {
                    Ok(BuildOutcome::Built(entry)) => {
                        report.built.push(name.clone());
                        entries.insert(name.clone(), entry);
                    }
                    Ok(BuildOutcome::Reused(entry)) => {
                        report.reused.push(name.clone());
                        entries.insert(name.clone(), entry);
                    }
                    Err(e) => {
                        first_error.get_or_insert(e);
                    }
                }
            }
            if let Some(error) = first_error {
                return Err(error);
            }
        }

        Ok(report)
    }

    async fn build_one(
        &self,
        name: &str,
        fingerprint: &Fingerprint,
        entries: &HashMap<String, CacheEntry>,
        workdir: &Path,
    ) -> Result<BuildOutcome> {
        let _lock = self
            .storage
            .lock(fingerprint)
            .await
            .with_context(|| format!("Failed to lock the build cache for image '{name}'"))?;

        if let Some(entry) = self
            .storage
            .lookup(fingerprint)
            .await
            .with_context(|| format!("Failed to look up cache entry of image '{name}'"))?
            .filter(|entry| entry.is_valid_for(self.storage.address()))
        {
            debug!(image = %name, "Image was committed by another writer");
            return Ok(BuildOutcome::Reused(entry));
        }

        let recipe = self.manifest.image(name).ok_or_else(|| ValuesError::ImageNotFound {
            name: name.to_string(),
        })?;

        let empty = HashMap::new();
        let mut build_args = resolve_build_args(recipe, self.variables.unwrap_or(&empty));
        for dep in self.graph.dependencies(name) {
            let entry = entries.get(&dep).ok_or_else(|| ValuesError::ImageNotBuilt {
                image: dep.clone(),
            })?;
            build_args.insert(dependency_arg_name(&dep), entry.image_ref());
        }

        let request = BuildRequest {
            image: name.to_string(),
            fingerprint: fingerprint.clone(),
            dockerfile: self.manifest.resolve_path(&recipe.dockerfile),
            context: self.manifest.resolve_path(&recipe.context),
            target: recipe.target.clone(),
            platform: self.platform.map(str::to_string),
            build_args,
            repository: self.storage.address().to_string(),
            tag: content_tag(fingerprint, Utc::now()),
            workdir: workdir.to_path_buf(),
        };

        let artifact = self
            .builder
            .build(&request)
            .await
            .with_context(|| format!("Failed to build image '{name}'"))?;
        let entry = self
            .storage
            .commit(fingerprint, artifact)
            .await
            .with_context(|| format!("Failed to record built image '{name}'"))?;

        info!(image = %name, image_ref = %entry.image_ref(), "Image built");
        Ok(BuildOutcome::Built(entry))
    }
}
