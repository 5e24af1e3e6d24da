//! Small helpers shared by several modules.
//!
//! - [`fs`] - directory creation and atomic writes
//! - [`slug`] - name normalisation for namespaces, tags, and cache directories

pub mod fs;
pub mod slug;

pub use fs::{atomic_write, ensure_dir};
pub use slug::{short_hash, slugify};
