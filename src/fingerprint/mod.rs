//! Content fingerprints for image recipes.
//!
//! A fingerprint is a SHA-256 over everything that determines the built image:
//! the image name, build target, platform, Dockerfile bytes, every file of the
//! build context that is not excluded, the build arguments after `{VAR}`
//! substitution, and the fingerprints of the images it depends on. Files are
//! visited in sorted relative-path order and paths are normalised to forward
//! slashes, so the value is stable across runs and platforms.
//!
//! The `.git` directory of a context is never part of the fingerprint. Symlinks
//! are not followed; a link contributes its target path.

use anyhow::{Context, Result};
use dashmap::DashMap;
use glob::Pattern;
use regex::Regex;
use sha2::{Digest, Sha256};
use std::collections::{BTreeMap, HashMap, HashSet};
use std::fmt;
use std::path::Path;
use std::sync::LazyLock;
use walkdir::WalkDir;

use crate::core::ValuesError;
use crate::manifest::{ImageRecipe, Manifest};

const FINGERPRINT_VERSION: &str = "imgvals-fingerprint-v1";

static PLACEHOLDER: LazyLock<Option<Regex>> =
    LazyLock::new(|| Regex::new(r"\{([A-Za-z_][A-Za-z0-9_]*)\}").ok());

/// Hex-encoded SHA-256 identifying a recipe's current inputs.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Fingerprint(String);

impl Fingerprint {
    /// Wrap an existing hex digest.
    #[must_use]
    pub fn from_hex(hex: impl Into<String>) -> Self {
        Self(hex.into())
    }

    /// The full hex digest.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// The first `len` hex characters.
    #[must_use]
    pub fn short(&self, len: usize) -> &str {
        &self.0[..len.min(self.0.len())]
    }
}

impl fmt::Display for Fingerprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Replace `{VAR}` placeholders with values from `variables`.
///
/// Unknown placeholders are kept verbatim so the fingerprint still reflects them.
#[must_use]
pub fn expand_variables(template: &str, variables: &HashMap<String, String>) -> String {
    let Some(placeholder) = PLACEHOLDER.as_ref() else {
        return template.to_string();
    };
    placeholder
        .replace_all(template, |caps: &regex::Captures<'_>| {
            variables.get(&caps[1]).cloned().unwrap_or_else(|| caps[0].to_string())
        })
        .into_owned()
}

/// Build arguments of a recipe after placeholder substitution.
#[must_use]
pub fn resolve_build_args(
    recipe: &ImageRecipe,
    variables: &HashMap<String, String>,
) -> BTreeMap<String, String> {
    recipe.args.iter().map(|(k, v)| (k.clone(), expand_variables(v, variables))).collect()
}

/// Computes and memoizes fingerprints for the images of one manifest.
///
/// Computation only reads the filesystem. Files are read on the blocking
/// thread pool.
pub struct FingerprintCalculator<'a> {
    manifest: &'a Manifest,
    variables: &'a HashMap<String, String>,
    platform: Option<&'a str>,
    cache: DashMap<String, Fingerprint>,
}

impl<'a> FingerprintCalculator<'a> {
    /// Create a calculator for `manifest`.
    #[must_use]
    pub fn new(
        manifest: &'a Manifest,
        variables: &'a HashMap<String, String>,
        platform: Option<&'a str>,
    ) -> Self {
        Self {
            manifest,
            variables,
            platform,
            cache: DashMap::new(),
        }
    }

    /// Fingerprint of the image `name`, including its dependencies.
    ///
    /// # Errors
    ///
    /// - [`ValuesError::ImageNotFound`] if the manifest does not declare `name`
    /// - [`ValuesError::RecipeInputMissing`] if the Dockerfile or context is absent
    pub async fn fingerprint(&self, name: &str) -> Result<Fingerprint> {
        let cached = self.cache.get(name).map(|fp| fp.value().clone());
        if let Some(cached) = cached {
            return Ok(cached);
        }

        for image in self.dependency_order(name)? {
            if self.cache.contains_key(&image) {
                continue;
            }
            let fingerprint = self.compute(&image).await;
            let fingerprint = if image == name {
                fingerprint?
            } else {
                fingerprint
                    .with_context(|| format!("Failed to fingerprint dependency '{image}' of '{name}'"))?
            };
            tracing::debug!(image = %image, fingerprint = %fingerprint, "Computed fingerprint");
            self.cache.insert(image, fingerprint);
        }

        let fingerprint = self.cache.get(name).map(|fp| fp.value().clone());
        fingerprint.ok_or_else(|| {
            ValuesError::ImageNotFound {
                name: name.to_string(),
            }
            .into()
        })
    }

    /// `name` and its transitive dependencies, dependencies first.
    fn dependency_order(&self, name: &str) -> Result<Vec<String>> {
        let mut order = Vec::new();
        let mut visited = HashSet::new();
        let mut stack = vec![(name.to_string(), false)];

        while let Some((image, expanded)) = stack.pop() {
            if expanded {
                order.push(image);
                continue;
            }
            if !visited.insert(image.clone()) {
                continue;
            }
            let recipe = self.recipe(&image)?;
            stack.push((image, true));
            for dep in recipe.dependencies.iter().rev() {
                if !visited.contains(dep) {
                    stack.push((dep.clone(), false));
                }
            }
        }
        Ok(order)
    }

    fn recipe(&self, name: &str) -> Result<&'a ImageRecipe> {
        self.manifest.image(name).ok_or_else(|| {
            ValuesError::ImageNotFound {
                name: name.to_string(),
            }
            .into()
        })
    }

    /// Fingerprint of one image whose dependencies are already cached.
    async fn compute(&self, name: &str) -> Result<Fingerprint> {
        let recipe = self.recipe(name)?;

        let dockerfile = self.manifest.resolve_path(&recipe.dockerfile);
        if !dockerfile.is_file() {
            return Err(missing_input(recipe, &dockerfile));
        }
        let context = self.manifest.resolve_path(&recipe.context);
        if !context.is_dir() {
            return Err(missing_input(recipe, &context));
        }

        let exclude = recipe.exclude.clone();
        let (dockerfile_digest, files) = tokio::task::spawn_blocking(move || {
            let bytes = std::fs::read(&dockerfile)
                .with_context(|| format!("Failed to read Dockerfile {}", dockerfile.display()))?;
            let files = context_file_digests(&context, &exclude)?;
            Ok::<_, anyhow::Error>((hex::encode(Sha256::digest(&bytes)), files))
        })
        .await
        .with_context(|| "spawn_blocking panicked")??;

        let mut hasher = Sha256::new();
        hasher.update(format!("{FINGERPRINT_VERSION}\n").as_bytes());
        hasher.update(format!("name:{}\n", recipe.name).as_bytes());
        hasher.update(format!("target:{}\n", recipe.target.as_deref().unwrap_or("")).as_bytes());
        hasher.update(format!("platform:{}\n", self.platform.unwrap_or("")).as_bytes());
        hasher.update(format!("dockerfile:{dockerfile_digest}\n").as_bytes());

        for (key, value) in resolve_build_args(recipe, self.variables) {
            hasher.update(format!("arg:{key}={value}\n").as_bytes());
        }

        for dep in &recipe.dependencies {
            let dep_fingerprint = self.cache.get(dep).map(|fp| fp.value().clone()).ok_or_else(|| {
                ValuesError::ImageNotFound {
                    name: dep.clone(),
                }
            })?;
            hasher.update(format!("dep:{dep}:{dep_fingerprint}\n").as_bytes());
        }

        for (relative, digest) in files {
            hasher.update(format!("file:{relative}:{digest}\n").as_bytes());
        }

        Ok(Fingerprint(hex::encode(hasher.finalize())))
    }
}

fn missing_input(recipe: &ImageRecipe, path: &Path) -> anyhow::Error {
    ValuesError::RecipeInputMissing {
        image: recipe.name.clone(),
        path: path.display().to_string(),
    }
    .into()
}

/// `(relative path, digest)` of every non-excluded entry below `context`, sorted by path.
///
/// Regular files contribute the sha256 of their bytes. Symlinks are not
/// followed; they contribute their target path.
fn context_file_digests(context: &Path, exclude: &[String]) -> Result<Vec<(String, String)>> {
    let patterns = exclude
        .iter()
        .map(|p| {
            Pattern::new(p).map_err(|e| {
                anyhow::Error::from(ValuesError::ManifestValidationError {
                    reason: format!("invalid exclude pattern '{p}': {e}"),
                })
            })
        })
        .collect::<Result<Vec<_>>>()?;

    let mut digests = Vec::new();
    let walker = WalkDir::new(context)
        .follow_links(false)
        .into_iter()
        .filter_entry(|entry| entry.depth() == 0 || entry.file_name() != ".git");

    for entry in walker {
        let entry = entry
            .with_context(|| format!("Failed to read build context {}", context.display()))?;
        let file_type = entry.file_type();
        if !file_type.is_file() && !file_type.is_symlink() {
            continue;
        }

        let relative = entry
            .path()
            .strip_prefix(context)
            .unwrap_or(entry.path())
            .to_string_lossy()
            .replace('\\', "/");
        if patterns.iter().any(|p| p.matches(&relative)) {
            continue;
        }

        let digest = if file_type.is_symlink() {
            let target = std::fs::read_link(entry.path())
                .with_context(|| format!("Failed to read link {}", entry.path().display()))?;
            format!("symlink:{}", target.to_string_lossy().replace('\\', "/"))
        } else {
            let bytes = std::fs::read(entry.path())
                .with_context(|| format!("Failed to read {}", entry.path().display()))?;
            hex::encode(Sha256::digest(&bytes))
        };
        digests.push((relative, digest));
    }

    digests.sort_by(|a, b| a.0.cmp(&b.0));
    Ok(digests)
}
