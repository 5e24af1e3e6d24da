//! Core types shared across the pipeline.
//!
//! Currently this is the error taxonomy: [`ValuesError`] for typed failures,
//! [`classify`] for the retry decision, and [`user_friendly_error`] for CLI display.

pub mod error;

pub use error::{
    ErrorContext, ErrorKind, FailureClass, ValuesError, classify, find_values_error,
    user_friendly_error,
};
