//! Error types for cran-pkgtest.

use std::path::PathBuf;

use thiserror::Error;

/// Errors raised by the classifier, collector, comparator and reconciler.
///
/// Per-package test failures are not errors: they end up as a
/// [`crate::types::PackageStatus`] plus a [`crate::reconcile::Diagnostic`].
#[derive(Debug, Error)]
pub enum PkgTestError {
    /// A line inside the install status block did not look like `<pkg>: OK|FAILED`.
    #[error("Malformed install status line: {line:?}")]
    ProtocolViolation { line: String },

    /// A transcript is missing the banner or footer the comparator anchors on.
    #[error("Marker {marker:?} not found in {transcript} transcript")]
    MarkerNotFound {
        marker: &'static str,
        transcript: &'static str,
    },

    #[error("I/O error on {}: {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Invalid config {}: {source}", .path.display())]
    Config {
        path: PathBuf,
        #[source]
        source: serde_yaml_ng::Error,
    },

    #[error("Test tree walk failed: {0}")]
    Walk(#[from] walkdir::Error),
}

impl PkgTestError {
    pub(crate) fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }
}

/// Result type for cran-pkgtest library operations.
pub type Result<T> = std::result::Result<T, PkgTestError>;
