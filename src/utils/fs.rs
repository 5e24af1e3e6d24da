//! File system helpers.
//!
//! Writes that other processes may observe go through [`atomic_write`]: the
//! content lands in a uniquely named temporary file in the target directory and
//! is renamed over the target, so readers see either the old file or the
//! complete new one.

use anyhow::{Context, Result};
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

/// Create `path` and its parents if missing.
pub fn ensure_dir(path: &Path) -> Result<()> {
    if !path.exists() {
        fs::create_dir_all(path)
            .with_context(|| format!("Failed to create directory: {}", path.display()))?;
    }
    Ok(())
}

/// Temporary sibling used by [`atomic_write`] for `path`.
///
/// The name starts with `.` and ends with `.tmp` so directory scans can skip it.
#[must_use]
pub fn temp_path_for(path: &Path) -> PathBuf {
    let file_name = path.file_name().map(|n| n.to_string_lossy().into_owned()).unwrap_or_default();
    path.with_file_name(format!(".{file_name}.{}.tmp", uuid::Uuid::new_v4().simple()))
}

/// Write `content` to `path` atomically.
pub fn atomic_write(path: &Path, content: &[u8]) -> Result<()> {
    if let Some(parent) = path.parent() {
        ensure_dir(parent)?;
    }

    let temp_path = temp_path_for(path);
    {
        let mut file = fs::File::create(&temp_path)
            .with_context(|| format!("Failed to create temp file: {}", temp_path.display()))?;
        file.write_all(content)
            .with_context(|| format!("Failed to write to temp file: {}", temp_path.display()))?;
        file.sync_all().with_context(|| "Failed to sync file to disk")?;
    }

    fs::rename(&temp_path, path).with_context(|| {
        let _ = fs::remove_file(&temp_path);
        format!("Failed to rename temp file to: {}", path.display())
    })?;

    Ok(())
}
