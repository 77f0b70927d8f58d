//! Error types for limit discovery and pressure monitoring.

use std::io;
use std::path::{Path, PathBuf};

use miette::Diagnostic;
use thiserror::Error;

/// Result type alias using [`LimitsError`].
pub type LimitsResult<T> = Result<T, LimitsError>;

/// Errors raised while resolving cgroup limits or arming a pressure watch.
///
/// "No limit configured" is not represented here: it is a valid answer and
/// surfaces as a sentinel value instead.
#[derive(Error, Diagnostic, Debug)]
pub enum LimitsError {
    /// An expected pseudo-file is absent.
    #[error("File not found: {}", path.display())]
    #[diagnostic(
        code(cglimits::not_found),
        help("Is the cgroup filesystem mounted and is the controller enabled for this process?")
    )]
    NotFound {
        /// The missing file.
        path: PathBuf,
    },

    /// Any other I/O failure.
    #[error("I/O error at {}: {source}", path.display())]
    #[diagnostic(code(cglimits::io))]
    Io {
        /// Path where the failure occurred.
        path: PathBuf,
        /// Underlying error.
        #[source]
        source: io::Error,
    },

    /// A pseudo-file held something that is not a valid value.
    #[error("Malformed content in {}: {value:?}", path.display())]
    #[diagnostic(code(cglimits::parse))]
    Parse {
        /// The file being parsed.
        path: PathBuf,
        /// The offending text.
        value: String,
    },

    /// The kernel facility needed for this request is unavailable.
    #[error("Feature not supported: {feature}")]
    #[diagnostic(
        code(cglimits::unsupported),
        help("Memory pressure monitoring requires the cgroup v2 unified hierarchy")
    )]
    Unsupported {
        /// The unsupported feature.
        feature: String,
    },

    /// The kernel or a security policy refused the operation.
    #[error("Permission denied: {operation}")]
    #[diagnostic(code(cglimits::permission_denied))]
    PermissionDenied {
        /// The operation that was denied.
        operation: String,
    },

    /// No record of the process cgroup descriptor covers the controller.
    #[error("No cgroup hierarchy found for controller {controller:?}")]
    #[diagnostic(
        code(cglimits::no_hierarchy),
        help("The controller is neither in the unified hierarchy nor mounted as a v1 hierarchy")
    )]
    NoMatchingHierarchy {
        /// The controller that was looked up.
        controller: String,
    },

    /// A pressure threshold outside the observation window.
    #[error("Invalid pressure threshold: {threshold}")]
    #[diagnostic(
        code(cglimits::invalid_threshold),
        help("The threshold must be greater than zero and at most 10s")
    )]
    InvalidThreshold {
        /// Human readable threshold.
        threshold: String,
    },

    /// Internal error (should not happen).
    #[error("Internal error: {message}")]
    #[diagnostic(code(cglimits::internal))]
    Internal {
        /// The error message.
        message: String,
    },
}

impl LimitsError {
    /// Convert an I/O error on `path`, keeping "not found" and "permission
    /// denied" apart from other failures.
    pub fn from_io(path: impl AsRef<Path>, err: io::Error) -> Self {
        let path = path.as_ref();
        match err.kind() {
            io::ErrorKind::NotFound => Self::NotFound {
                path: path.to_path_buf(),
            },
            io::ErrorKind::PermissionDenied => Self::PermissionDenied {
                operation: format!("access {}", path.display()),
            },
            _ => Self::Io {
                path: path.to_path_buf(),
                source: err,
            },
        }
    }

    /// Create a parse error for `value` read from `path`.
    pub fn parse(path: impl AsRef<Path>, value: impl Into<String>) -> Self {
        Self::Parse {
            path: path.as_ref().to_path_buf(),
            value: value.into(),
        }
    }

    /// Whether this error is a permission refusal.
    #[must_use]
    pub const fn is_permission_denied(&self) -> bool {
        matches!(self, Self::PermissionDenied { .. })
    }
}
