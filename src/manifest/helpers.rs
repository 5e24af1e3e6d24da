//! Manifest file discovery.

use crate::constants::MANIFEST_FILE_NAME;
use crate::core::ValuesError;
use anyhow::Result;
use std::path::{Path, PathBuf};

/// Find the manifest using an explicit path or a directory search.
///
/// An explicit path must exist. Without one, the search starts at `start_dir`
/// and walks up the directory tree, the way Cargo and Git locate their project
/// files.
///
/// # Examples
///
/// ```rust,no_run
/// use imgvals_cli::manifest::find_manifest_with_optional;
/// use std::path::Path;
///
/// # fn main() -> anyhow::Result<()> {
/// let manifest = find_manifest_with_optional(None, Path::new("."))?;
/// println!("using {}", manifest.display());
/// # Ok(())
/// # }
/// ```
pub fn find_manifest_with_optional(
    explicit_path: Option<PathBuf>,
    start_dir: &Path,
) -> Result<PathBuf> {
    match explicit_path {
        Some(path) if path.exists() => Ok(path),
        Some(_) => Err(ValuesError::ManifestNotFound.into()),
        None => find_manifest_from(start_dir.to_path_buf()),
    }
}

/// Find `imgvals.toml` in `current` or the closest parent directory that has one.
///
/// Returns [`ValuesError::ManifestNotFound`] after reaching the filesystem root.
pub fn find_manifest_from(mut current: PathBuf) -> Result<PathBuf> {
    loop {
        let manifest_path = current.join(MANIFEST_FILE_NAME);
        if manifest_path.exists() {
            return Ok(manifest_path);
        }

        if !current.pop() {
            return Err(ValuesError::ManifestNotFound.into());
        }
    }
}
