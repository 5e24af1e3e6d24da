//! Image Info Assembler.
//!
//! After a successful build pass every image has a cache entry for its current
//! fingerprint. The assembler reads those entries and reports, per image, the
//! storage's repository address and a tag chosen by a [`TagStrategy`]:
//!
//! - [`TagStrategy::Content`] uses the tag the image was pushed under.
//! - [`TagStrategy::Custom`] asks a [`TagResolver`] for a tag by image name.
//!   The resolver claims every image, so a missing or empty tag is a fatal
//!   strategy mismatch.

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::constants::CONTENT_TAG_FINGERPRINT_LEN;
use crate::core::ValuesError;
use crate::fingerprint::{Fingerprint, FingerprintCalculator};
use crate::images::ImageDescriptor;
use crate::storage::StagesStorage;
use crate::utils::slugify;

/// Resolved location of one image.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ImageInfo {
    /// Logical image name
    pub name: String,
    /// Repository address
    pub repository: String,
    /// Tag within the repository
    pub tag: String,
    /// Digest or image ID, when known
    pub digest: Option<String>,
}

impl ImageInfo {
    /// `repository:tag`.
    #[must_use]
    pub fn image_ref(&self) -> String {
        format!("{}:{}", self.repository, self.tag)
    }
}

/// Capability resolving a tag from an image name.
pub trait TagResolver: Send + Sync {
    /// Tag for `image`, or `None` when no tag can be produced.
    fn resolve_tag(&self, image: &str) -> Option<String>;
}

/// How the assembler picks tags.
#[derive(Clone, Copy, Default)]
pub enum TagStrategy<'a> {
    /// Tag the image was pushed under
    #[default]
    Content,
    /// Tag from a caller-supplied resolver
    Custom(&'a dyn TagResolver),
}

impl std::fmt::Debug for TagStrategy<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Content => f.write_str("Content"),
            Self::Custom(_) => f.write_str("Custom"),
        }
    }
}

/// Tag for a newly built image: fingerprint prefix plus build time in unix millis.
#[must_use]
pub fn content_tag(fingerprint: &Fingerprint, built_at: DateTime<Utc>) -> String {
    format!("{}-{}", fingerprint.short(CONTENT_TAG_FINGERPRINT_LEN), built_at.timestamp_millis())
}

/// Custom tags from a template with `%image%`, `%image_slug%`, and `%image_safe_slug%`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CustomTagTemplate {
    template: String,
}

impl CustomTagTemplate {
    /// Wrap `template`, rejecting an empty one.
    pub fn new(template: impl Into<String>) -> Result<Self> {
        let template = template.into();
        if template.trim().is_empty() {
            return Err(ValuesError::ConfigError {
                message: "custom tag template must not be empty".to_string(),
            }
            .into());
        }
        Ok(Self {
            template,
        })
    }
}

impl TagResolver for CustomTagTemplate {
    fn resolve_tag(&self, image: &str) -> Option<String> {
        let slug = slugify(image);
        let tag = self
            .template
            .replace("%image_safe_slug%", &slug.replace('-', ""))
            .replace("%image_slug%", &slug)
            .replace("%image%", image);
        let tag = tag.trim().to_string();
        (!tag.is_empty()).then_some(tag)
    }
}

/// Whether `tag` is a valid Docker tag.
#[must_use]
pub fn is_valid_tag(tag: &str) -> bool {
    let mut chars = tag.chars();
    let Some(first) = chars.next() else {
        return false;
    };
    tag.len() <= 128
        && (first.is_ascii_alphanumeric() || first == '_')
        && chars.all(|c| c.is_ascii_alphanumeric() || matches!(c, '_' | '.' | '-'))
}

/// Builds the per-image info list once everything is in the cache.
pub struct ImageInfoAssembler<'a> {
    fingerprints: &'a FingerprintCalculator<'a>,
    storage: &'a dyn StagesStorage,
}

impl<'a> ImageInfoAssembler<'a> {
    /// Assembler reading from `storage`.
    #[must_use]
    pub fn new(fingerprints: &'a FingerprintCalculator<'a>, storage: &'a dyn StagesStorage) -> Self {
        Self {
            fingerprints,
            storage,
        }
    }

    /// One [`ImageInfo`] per image, in the order of `images`.
    ///
    /// # Errors
    ///
    /// - [`ValuesError::ImageNotBuilt`] if an image has no valid cache entry
    /// - [`ValuesError::TagUnresolved`] if a custom resolver yields no tag
    /// - [`ValuesError::AssemblyError`] if a custom tag is not a valid Docker tag
    pub async fn assemble(
        &self,
        images: &[ImageDescriptor],
        strategy: TagStrategy<'_>,
    ) -> Result<Vec<ImageInfo>> {
        let mut infos = Vec::with_capacity(images.len());
        for image in images {
            let fingerprint = self.fingerprints.fingerprint(&image.name).await?;
            let entry = self
                .storage
                .lookup(&fingerprint)
                .await
                .with_context(|| format!("Failed to read cache entry of image '{}'", image.name))?
                .filter(|entry| entry.is_valid_for(self.storage.address()))
                .ok_or_else(|| ValuesError::ImageNotBuilt {
                    image: image.name.clone(),
                })?;

            let (tag, digest) = match strategy {
                TagStrategy::Content => (entry.tag, entry.digest),
                TagStrategy::Custom(resolver) => {
                    let tag = resolver.resolve_tag(&image.name).ok_or_else(|| {
                        ValuesError::TagUnresolved {
                            image: image.name.clone(),
                        }
                    })?;
                    if !is_valid_tag(&tag) {
                        return Err(ValuesError::AssemblyError {
                            reason: format!(
                                "custom tag '{tag}' for image '{}' is not a valid tag",
                                image.name
                            ),
                        }
                        .into());
                    }
                    (tag, None)
                }
            };

            infos.push(ImageInfo {
                name: image.name.clone(),
                repository: self.storage.address().to_string(),
                tag,
                digest,
            });
        }
        Ok(infos)
    }
}
