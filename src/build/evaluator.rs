//! Build Necessity Evaluator.
//!
//! An image is up to date when the stages storage holds an entry for its
//! current fingerprint that was pushed to the storage's registry. Evaluation
//! only reads: it computes fingerprints and performs lookups, so it can run any
//! number of times with the same result until something is committed.

use anyhow::{Context, Result};

use crate::fingerprint::{Fingerprint, FingerprintCalculator};
use crate::storage::{CacheEntry, StagesStorage};

/// Verdict for one image.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BuildDecision {
    /// A valid cache entry exists for the current fingerprint
    UpToDate,
    /// No valid entry; the image must be built
    BuildRequired,
}

/// Result of evaluating one image.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Evaluation {
    /// Logical image name
    pub image: String,
    /// Current fingerprint
    pub fingerprint: Fingerprint,
    /// Verdict
    pub decision: BuildDecision,
    /// The matching entry when up to date
    pub entry: Option<CacheEntry>,
}

/// Decides which images need a build.
pub struct BuildNecessityEvaluator<'a> {
    fingerprints: &'a FingerprintCalculator<'a>,
    storage: &'a dyn StagesStorage,
}

impl<'a> BuildNecessityEvaluator<'a> {
    /// Evaluator over `storage`.
    #[must_use]
    pub fn new(fingerprints: &'a FingerprintCalculator<'a>, storage: &'a dyn StagesStorage) -> Self {
        Self {
            fingerprints,
            storage,
        }
    }

    /// Evaluate one image.
    pub async fn evaluate(&self, image: &str) -> Result<Evaluation> {
        let fingerprint = self
            .fingerprints
            .fingerprint(image)
            .await
            .with_context(|| format!("Failed to compute fingerprint of image '{image}'"))?;

        let entry = self
            .storage
            .lookup(&fingerprint)
            .await
            .with_context(|| format!("Failed to look up cache entry of image '{image}'"))?
            .filter(|entry| entry.is_valid_for(self.storage.address()));

        let decision = if entry.is_some() {
            BuildDecision::UpToDate
        } else {
            BuildDecision::BuildRequired
        };
        tracing::debug!(image = %image, fingerprint = %fingerprint, ?decision, "Evaluated image");

        Ok(Evaluation {
            image: image.to_string(),
            fingerprint,
            decision,
            entry,
        })
    }

    /// Evaluate images in order, stopping at the first one that cannot be resolved.
    pub async fn evaluate_all<S: AsRef<str>>(&self, images: &[S]) -> Result<Vec<Evaluation>> {
        let mut evaluations = Vec::with_capacity(images.len());
        for image in images {
            evaluations.push(self.evaluate(image.as_ref()).await?);
        }
        Ok(evaluations)
    }
}
