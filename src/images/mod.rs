//! Image Set Resolver.
//!
//! Turns the manifest and an [`ImagesToProcess`] filter into the ordered list of
//! [`ImageDescriptor`]s a run works on. The filter is checked against the
//! manifest before anything else happens, so a bad image name never reaches
//! the build cache.

mod graph;

pub use graph::DependencyGraph;

use crate::manifest::{ImageRecipe, Manifest};
use anyhow::Result;
use std::collections::HashSet;

/// A logical image and its build recipe.
///
/// Derived once from the manifest at the start of a run and never mutated.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImageDescriptor {
    /// Logical name, unique within the manifest
    pub name: String,
    /// Build recipe; opaque to everything except fingerprinting and the builder
    pub recipe: ImageRecipe,
}

impl ImageDescriptor {
    /// Descriptor for a manifest recipe.
    #[must_use]
    pub fn from_recipe(recipe: &ImageRecipe) -> Self {
        Self {
            name: recipe.name.clone(),
            recipe: recipe.clone(),
        }
    }
}

/// Which images a run processes.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum ImagesToProcess {
    /// Every image declared in the manifest
    #[default]
    All,
    /// Only the named images
    Only(Vec<String>),
    /// No images; the document carries deployment context only
    WithoutImages,
}

impl ImagesToProcess {
    /// Filter from CLI arguments: no names means all images.
    #[must_use]
    pub fn from_args(names: Vec<String>, without_images: bool) -> Self {
        if without_images {
            Self::WithoutImages
        } else if names.is_empty() {
            Self::All
        } else {
            Self::Only(names)
        }
    }
}

/// Resolve the images to process, in manifest declaration order without duplicates.
///
/// # Errors
///
/// Returns [`crate::core::ValuesError::ImageNotFound`] if `filter` names an image
/// the manifest does not declare.
pub fn resolve_images(manifest: &Manifest, filter: &ImagesToProcess) -> Result<Vec<ImageDescriptor>> {
    let selected: Option<HashSet<&str>> = match filter {
        ImagesToProcess::All => None,
        ImagesToProcess::WithoutImages => return Ok(Vec::new()),
        ImagesToProcess::Only(names) => {
            manifest.check_that_images_exist(names)?;
            Some(names.iter().map(String::as_str).collect())
        }
    };

    let mut seen = HashSet::new();
    Ok(manifest
        .images
        .iter()
        .filter(|recipe| selected.as_ref().is_none_or(|s| s.contains(recipe.name.as_str())))
        .filter(|recipe| seen.insert(recipe.name.as_str()))
        .map(ImageDescriptor::from_recipe)
        .collect())
}
