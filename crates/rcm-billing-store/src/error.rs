//! Error types for rcm-billing storage.

use std::path::PathBuf;

use rcm_billing_core::BillingError;

/// Result type for storage operations.
pub type Result<T> = std::result::Result<T, StoreError>;

/// Errors that can occur in storage operations.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// Filesystem operation failed.
    #[error("{}: {source}", path.display())]
    Io {
        /// The file or directory involved.
        path: PathBuf,
        /// Underlying error.
        source: std::io::Error,
    },

    /// A required input file is absent.
    #[error("missing input: {}", .0.display())]
    NotFound(PathBuf),

    /// A file was read but its content is invalid.
    #[error(transparent)]
    Billing(#[from] BillingError),

    /// A CSV file could not be decoded.
    #[error("{}: {source}", path.display())]
    Csv {
        /// The file involved.
        path: PathBuf,
        /// Underlying error.
        source: csv::Error,
    },
}

impl StoreError {
    pub(crate) fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }
}
