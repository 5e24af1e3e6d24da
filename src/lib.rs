//! imgvals - container image resolution and deployment service values
//!
//! imgvals reads a project's `imgvals.toml`, decides which of the declared
//! container images are missing from a content-addressed build cache, builds
//! and pushes those with bounded retries, and prints a YAML "service values"
//! document for a templating or deployment layer.
//!
//! # Architecture Overview
//!
//! ```text
//! images::resolve_images ─┬─ build::stub ───────────────────────────────────┐
//!                         └─ build::evaluator → build::retry(conveyor) ──┐  │
//!                                              → build::info ────────────┴──┴─ values
//! ```
//!
//! - Every image has a fingerprint over its recipe, build context, substituted
//!   arguments, and dependency fingerprints. An image is up to date when the
//!   stages storage holds an entry for that fingerprint.
//! - Missing images are built level by level in dependency order inside a
//!   retry envelope. Transient infrastructure failures (lock contention,
//!   registry throttling) start another attempt; anything else stops the run.
//! - Stub mode skips the cache and builders entirely and reports placeholder
//!   image locations.
//!
//! # Core Modules
//!
//! ## Pipeline
//! - [`pipeline`] - End-to-end entry point and the infrastructure factory
//! - [`images`] - Image set resolution and the image dependency graph
//! - [`fingerprint`] - Content fingerprints of image recipes
//! - [`build`] - Build necessity, retried builds, image info, stub mode
//! - [`values`] - The service values document
//!
//! ## Collaborators
//! - [`storage`] - Stages storage contract and the local file cache
//! - [`git`] - HEAD commit hash and time via the system git
//! - [`deploy`] - Kubernetes namespace naming
//!
//! ## Supporting Modules
//! - [`cli`] - Command-line interface
//! - [`config`] - Per-run and global (`~/.imgvals/config.toml`) configuration
//! - [`manifest`] - `imgvals.toml` parsing and validation
//! - [`core`] - Error taxonomy and user-facing error reporting
//! - [`cancel`] - Cooperative cancellation
//! - [`utils`] - Atomic file writes and slugs
//!
//! # Command-Line Usage
//!
//! ```bash
//! # Build what is missing and print values for production
//! imgvals values --repo registry.example.com/demo --env production
//!
//! # Placeholder values, no docker or registry needed
//! imgvals values --stub-tags
//! ```

// Pipeline
pub mod build;
pub mod fingerprint;
pub mod images;
pub mod pipeline;
pub mod values;

// Collaborators
pub mod deploy;
pub mod git;
pub mod storage;

// Supporting modules
pub mod cancel;
pub mod cli;
pub mod config;
pub mod constants;
pub mod core;
pub mod manifest;
pub mod utils;

// test_utils module is available for both unit tests and integration tests
#[cfg(any(test, feature = "test-utils"))]
pub mod test_utils;
