//! Integration test suite for imgvals
//!
//! End-to-end tests driving the pipeline through its public API with the
//! `test_utils` doubles, plus CLI tests against the built binary.
//!
//! ```bash
//! cargo test --test integration
//! ```
//!
//! # Test Organization
//!
//! - **scenarios**: up-to-date, cache miss, stub mode, and bad filter runs
//! - **retry**: retry bound, recovery, and fatal failures
//! - **cancellation**: cancellation and workspace cleanup
//! - **tags**: custom tags and namespace resolution
//! - **local_storage**: the pipeline over the on-disk stages storage
//! - **cli**: the `imgvals` binary

mod common;

mod cancellation;
mod cli;
mod local_storage;
mod retry;
mod scenarios;
mod tags;
