//! Error handling for imgvals
//!
//! This module provides the error taxonomy of the service-values pipeline and
//! user-friendly error reporting for the CLI. The error system follows two rules:
//! 1. **Strongly-typed errors** at every point of failure, so the retry envelope
//!    can tell transient infrastructure trouble from fatal mistakes
//! 2. **User-friendly messages** with actionable suggestions for CLI users
//!
//! # Architecture
//!
//! - [`ValuesError`] - enumerated failure cases raised by the pipeline
//! - [`ErrorKind`] - the category a [`ValuesError`] belongs to
//! - [`FailureClass`] - whether a failure may be retried
//! - [`ErrorContext`] - wrapper that adds suggestions and details for display
//!
//! # Error Categories
//!
//! | Kind | Examples | Retried |
//! |------|----------|---------|
//! | Configuration | unknown image in filter, invalid manifest, missing repo address | no |
//! | Infrastructure | lock timeout, registry throttling, transient I/O | yes, up to the attempt limit |
//! | BuildLogic | a recipe fails to build | no |
//! | Assembly | malformed inputs to the service values document | no |
//! | Cancelled | the run was interrupted | no |
//!
//! Errors travel through the crate as [`anyhow::Error`] with context layers naming the
//! image and the stage that failed. [`classify`] walks the whole chain, so wrapping a
//! [`ValuesError`] with `.context(..)` never changes how it is retried.
//!
//! # Examples
//!
//! ```rust,no_run
//! use imgvals_cli::core::{ValuesError, FailureClass, classify};
//!
//! let err = anyhow::Error::from(ValuesError::LockTimeout {
//!     lock: "stage:0f3c".to_string(),
//!     timeout_secs: 30,
//! })
//! .context("Failed to build image 'web'");
//!
//! assert_eq!(classify(&err), FailureClass::Retryable);
//! ```

use colored::Colorize;
use std::fmt;
use thiserror::Error;

/// The main error type for imgvals operations
///
/// Each variant names one failure mode and carries the data needed to make the
/// message actionable (which image, which path, which registry).
#[derive(Error, Debug)]
pub enum ValuesError {
    /// No `imgvals.toml` was found
    #[error("Project configuration imgvals.toml not found in the project directory or any parent directory")]
    ManifestNotFound,

    /// The manifest is not valid TOML or does not match the schema
    #[error("Invalid project configuration in {file}: {reason}")]
    ManifestParseError {
        /// Path of the manifest
        file: String,
        /// Parser message
        reason: String,
    },

    /// The manifest parsed but its content is inconsistent
    #[error("Project configuration validation failed: {reason}")]
    ManifestValidationError {
        /// What is wrong
        reason: String,
    },

    /// An image named on the command line is not declared in the manifest
    #[error("Image '{name}' is not defined in imgvals.toml")]
    ImageNotFound {
        /// The requested image name
        name: String,
    },

    /// A file the recipe points at does not exist
    #[error("Recipe input for image '{image}' not found: {path}")]
    RecipeInputMissing {
        /// Image whose recipe is broken
        image: String,
        /// Missing path
        path: String,
    },

    /// Real resolution was requested without a repository address
    #[error("Repository address is required to resolve image tags")]
    RepoAddressRequired,

    /// Other configuration problems (global config, flags)
    #[error("Configuration error: {message}")]
    ConfigError {
        /// Description
        message: String,
    },

    /// Git is not installed
    #[error("Git is not installed or not found in PATH")]
    GitNotFound,

    /// A git command failed
    #[error("Git operation failed: {operation}")]
    GitCommandError {
        /// The git subcommand
        operation: String,
        /// Captured stderr
        stderr: String,
    },

    /// The image builder executable is not available
    #[error("Image builder '{program}' is not installed or not found in PATH")]
    BuilderNotFound {
        /// Executable name
        program: String,
    },

    /// A fingerprint lock could not be acquired in time
    #[error("Timeout acquiring lock '{lock}' after {timeout_secs}s")]
    LockTimeout {
        /// Lock name
        lock: String,
        /// Configured timeout
        timeout_secs: u64,
    },

    /// The registry answered with a transient failure (throttling, 5xx, reset)
    #[error("Registry temporarily unavailable for image '{image}': {reason}")]
    RegistryUnavailable {
        /// Image being published
        image: String,
        /// Registry output
        reason: String,
    },

    /// The registry refused the push for a non-transient reason
    #[error("Registry rejected image '{image}': {reason}")]
    PushRejected {
        /// Image being published
        image: String,
        /// Registry output
        reason: String,
    },

    /// A storage operation failed in a way that may succeed on another attempt
    #[error("Stages storage {operation} failed for {path}: {reason}")]
    StorageUnavailable {
        /// lookup, commit, lock
        operation: String,
        /// Entry or lock path
        path: String,
        /// Underlying message
        reason: String,
    },

    /// The recipe itself failed to build
    #[error("Failed to build image '{image}': {reason}")]
    BuildFailed {
        /// Image being built
        image: String,
        /// Builder output
        reason: String,
    },

    /// The tag strategy covers an image but produced no tag for it
    #[error("Tag strategy produced no tag for image '{image}'")]
    TagUnresolved {
        /// Image without a tag
        image: String,
    },

    /// The build pass finished but an image has no cache entry
    #[error("Image '{image}' has no cache entry after a successful build pass")]
    ImageNotBuilt {
        /// Image without an entry
        image: String,
    },

    /// Inputs to the service values document are malformed
    #[error("Cannot assemble service values: {reason}")]
    AssemblyError {
        /// What is malformed
        reason: String,
    },

    /// The run was cancelled
    #[error("Operation cancelled")]
    Cancelled,

    /// Standard I/O errors
    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    /// Failures outside the taxonomy, shown with their full context chain
    #[error("{message}")]
    Other {
        /// Description
        message: String,
    },
}

impl Clone for ValuesError {
    fn clone(&self) -> Self {
        match self {
            Self::ManifestNotFound => Self::ManifestNotFound,
            Self::ManifestParseError {
                file,
                reason,
            } => Self::ManifestParseError {
                file: file.clone(),
                reason: reason.clone(),
            },
            Self::ManifestValidationError {
                reason,
            } => Self::ManifestValidationError {
                reason: reason.clone(),
            },
            Self::ImageNotFound {
                name,
            } => Self::ImageNotFound {
                name: name.clone(),
            },
            Self::RecipeInputMissing {
                image,
                path,
            } => Self::RecipeInputMissing {
                image: image.clone(),
                path: path.clone(),
            },
            Self::RepoAddressRequired => Self::RepoAddressRequired,
            Self::ConfigError {
                message,
            } => Self::ConfigError {
                message: message.clone(),
            },
            Self::GitNotFound => Self::GitNotFound,
            Self::GitCommandError {
                operation,
                stderr,
            } => Self::GitCommandError {
                operation: operation.clone(),
                stderr: stderr.clone(),
            },
            Self::BuilderNotFound {
                program,
            } => Self::BuilderNotFound {
                program: program.clone(),
            },
            Self::LockTimeout {
                lock,
                timeout_secs,
            } => Self::LockTimeout {
                lock: lock.clone(),
                timeout_secs: *timeout_secs,
            },
            Self::RegistryUnavailable {
                image,
                reason,
            } => Self::RegistryUnavailable {
                image: image.clone(),
                reason: reason.clone(),
            },
            Self::PushRejected {
                image,
                reason,
            } => Self::PushRejected {
                image: image.clone(),
                reason: reason.clone(),
            },
            Self::StorageUnavailable {
                operation,
                path,
                reason,
            } => Self::StorageUnavailable {
                operation: operation.clone(),
                path: path.clone(),
                reason: reason.clone(),
            },
            Self::BuildFailed {
                image,
                reason,
            } => Self::BuildFailed {
                image: image.clone(),
                reason: reason.clone(),
            },
            Self::TagUnresolved {
                image,
            } => Self::TagUnresolved {
                image: image.clone(),
            },
            Self::ImageNotBuilt {
                image,
            } => Self::ImageNotBuilt {
                image: image.clone(),
            },
            Self::AssemblyError {
                reason,
            } => Self::AssemblyError {
                reason: reason.clone(),
            },
            Self::Cancelled => Self::Cancelled,
            // io::Error doesn't implement Clone, so we create a new one with the same kind and message
            Self::IoError(e) => Self::IoError(std::io::Error::new(e.kind(), e.to_string())),
            Self::Other {
                message,
            } => Self::Other {
                message: message.clone(),
            },
        }
    }
}

/// Category of a [`ValuesError`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Bad filter, invalid manifest, missing inputs
    Configuration,
    /// Lock contention, registry throttling, transient I/O
    Infrastructure,
    /// A recipe failed to build
    BuildLogic,
    /// Malformed inputs to the final document
    Assembly,
    /// The run was interrupted
    Cancelled,
}

/// Whether a failure may trigger another build attempt
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureClass {
    /// Another attempt may succeed
    Retryable,
    /// Stop immediately and surface the error
    Fatal,
    /// The run was cancelled; stop without further attempts
    Cancelled,
}

impl ValuesError {
    /// Category of this error.
    #[must_use]
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::ManifestNotFound
            | Self::ManifestParseError { .. }
            | Self::ManifestValidationError { .. }
            | Self::ImageNotFound { .. }
            | Self::RecipeInputMissing { .. }
            | Self::RepoAddressRequired
            | Self::ConfigError { .. }
            | Self::GitNotFound
            | Self::GitCommandError { .. }
            | Self::BuilderNotFound { .. }
            | Self::PushRejected { .. } => ErrorKind::Configuration,
            Self::LockTimeout { .. }
            | Self::RegistryUnavailable { .. }
            | Self::StorageUnavailable { .. } => ErrorKind::Infrastructure,
            Self::BuildFailed { .. } => ErrorKind::BuildLogic,
            Self::TagUnresolved { .. } | Self::ImageNotBuilt { .. } | Self::AssemblyError { .. } => {
                ErrorKind::Assembly
            }
            Self::Cancelled => ErrorKind::Cancelled,
            Self::IoError(e) if is_transient_io(e) => ErrorKind::Infrastructure,
            Self::IoError(_) | Self::Other { .. } => ErrorKind::Configuration,
        }
    }

    /// Returns true if another attempt may succeed.
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        self.kind() == ErrorKind::Infrastructure
    }
}

/// I/O error kinds that usually go away on their own.
fn is_transient_io(error: &std::io::Error) -> bool {
    use std::io::ErrorKind as Io;
    matches!(
        error.kind(),
        Io::TimedOut
            | Io::Interrupted
            | Io::ConnectionReset
            | Io::ConnectionAborted
            | Io::ConnectionRefused
            | Io::WouldBlock
    )
}

/// Classify an error chain for the retry envelope.
///
/// The first [`ValuesError`] found in the chain decides. Chains without one are
/// retryable only when they contain a transient [`std::io::Error`].
#[must_use]
pub fn classify(error: &anyhow::Error) -> FailureClass {
    if let Some(values_error) = find_values_error(error) {
        return match values_error.kind() {
            ErrorKind::Infrastructure => FailureClass::Retryable,
            ErrorKind::Cancelled => FailureClass::Cancelled,
            _ => FailureClass::Fatal,
        };
    }

    let transient = error
        .chain()
        .filter_map(|cause| cause.downcast_ref::<std::io::Error>())
        .any(is_transient_io);
    if transient {
        FailureClass::Retryable
    } else {
        FailureClass::Fatal
    }
}

/// Find the first [`ValuesError`] in an error chain.
#[must_use]
pub fn find_values_error(error: &anyhow::Error) -> Option<&ValuesError> {
    error.chain().find_map(|cause| cause.downcast_ref::<ValuesError>())
}

/// Error wrapper with suggestion and details for CLI display
///
/// # Examples
///
/// ```rust,no_run
/// use imgvals_cli::core::{ValuesError, ErrorContext};
///
/// let context = ErrorContext::new(ValuesError::RepoAddressRequired)
///     .with_suggestion("Pass --repo or use --stub-tags");
/// context.display();
/// ```
#[derive(Debug)]
pub struct ErrorContext {
    /// The underlying error
    pub error: ValuesError,
    /// Optional suggestion for resolving the error
    pub suggestion: Option<String>,
    /// Optional additional details about the error
    pub details: Option<String>,
}

impl ErrorContext {
    /// Create a new error context without suggestion or details.
    #[must_use]
    pub const fn new(error: ValuesError) -> Self {
        Self {
            error,
            suggestion: None,
            details: None,
        }
    }

    /// Attach a suggestion for resolving the error.
    #[must_use]
    pub fn with_suggestion(mut self, suggestion: impl Into<String>) -> Self {
        self.suggestion = Some(suggestion.into());
        self
    }

    /// Attach additional details.
    #[must_use]
    pub fn with_details(mut self, details: impl Into<String>) -> Self {
        self.details = Some(details.into());
        self
    }

    /// Print the error to stderr with colors.
    pub fn display(&self) {
        eprintln!("{}: {}", "error".red().bold(), self.error);

        if let Some(details) = &self.details {
            eprintln!("{}: {}", "details".yellow(), details);
        }

        if let Some(suggestion) = &self.suggestion {
            eprintln!("{}: {}", "suggestion".green(), suggestion);
        }
    }
}

impl fmt::Display for ErrorContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.error)?;

        if let Some(details) = &self.details {
            write!(f, "\nDetails: {details}")?;
        }

        if let Some(suggestion) = &self.suggestion {
            write!(f, "\nSuggestion: {suggestion}")?;
        }

        Ok(())
    }
}

impl std::error::Error for ErrorContext {}

/// Convert any error into an [`ErrorContext`] for display.
///
/// Known [`ValuesError`]s anywhere in the chain get tailored suggestions; the outer
/// context messages (which image, which stage) are kept as details.
#[must_use]
pub fn user_friendly_error(error: anyhow::Error) -> ErrorContext {
    if let Some(values_error) = find_values_error(&error) {
        let mut ctx = create_error_context(values_error.clone());
        let outer: Vec<String> = error
            .chain()
            .take_while(|cause| cause.downcast_ref::<ValuesError>().is_none())
            .map(ToString::to_string)
            .collect();
        if !outer.is_empty() && ctx.details.is_none() {
            ctx.details = Some(outer.join(": "));
        }
        return ctx;
    }

    let message = error.chain().map(ToString::to_string).collect::<Vec<_>>().join(": ");
    ErrorContext::new(ValuesError::Other {
        message,
    })
}

fn create_error_context(error: ValuesError) -> ErrorContext {
    match &error {
        ValuesError::ManifestNotFound => ErrorContext::new(error)
            .with_suggestion("Create imgvals.toml in the project root or pass --manifest-path <path>")
            .with_details("imgvals searches the project directory and its parents"),
        ValuesError::ImageNotFound {
            ..
        } => ErrorContext::new(error)
            .with_suggestion("Check the image names passed on the command line against [[image]] entries in imgvals.toml"),
        ValuesError::RepoAddressRequired => ErrorContext::new(error)
            .with_suggestion("Pass --repo <address> (or set IMGVALS_REPO), or use --stub-tags to get service values without real tags"),
        ValuesError::GitNotFound => ErrorContext::new(error)
            .with_suggestion("Install git and make sure it is on PATH"),
        ValuesError::GitCommandError {
            stderr,
            ..
        } => {
            let ctx = ErrorContext::new(error.clone())
                .with_suggestion("Run imgvals inside a git work tree with at least one commit");
            if stderr.trim().is_empty() {
                ctx
            } else {
                ctx.with_details(stderr.trim().to_string())
            }
        }
        ValuesError::BuilderNotFound {
            ..
        } => ErrorContext::new(error)
            .with_suggestion("Install docker or use --stub-tags"),
        ValuesError::LockTimeout {
            ..
        } => ErrorContext::new(error)
            .with_suggestion("Another build of the same image may still be running; retry later or raise lock_timeout_secs")
            .with_details("The lock was retried up to the configured attempt limit"),
        ValuesError::RegistryUnavailable {
            ..
        } => ErrorContext::new(error)
            .with_suggestion("The registry kept failing across all attempts; check its status or raise --max-attempts"),
        ValuesError::PushRejected {
            ..
        } => ErrorContext::new(error)
            .with_suggestion("Check registry credentials and that the repository exists"),
        ValuesError::BuildFailed {
            ..
        } => ErrorContext::new(error)
            .with_suggestion("Fix the Dockerfile or build arguments of this image; build errors are not retried"),
        _ => ErrorContext::new(error),
    }
}
