//! Unit-level tests of the public helpers.
//!
//! ```bash
//! cargo test --test unit
//! ```

mod errors;
mod image_set;
mod namespace;
