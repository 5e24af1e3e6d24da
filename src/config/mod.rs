//! Run configuration.
//!
//! Two layers feed a run:
//!
//! 1. **Global configuration** (`~/.imgvals/config.toml`, [`GlobalConfig`]) -
//!    user-wide defaults such as the registry repository, cache location, and
//!    retry limits.
//! 2. **Pipeline configuration** ([`PipelineConfig`]) - the explicit settings of
//!    one run, assembled by the CLI from flags, environment variables, the
//!    global configuration, and built-in defaults, in that order of precedence.
//!
//! The project manifest (`imgvals.toml`) is handled by [`crate::manifest`].

mod global;
mod pipeline;

pub use global::{GlobalConfig, expand_path};
pub use pipeline::PipelineConfig;
