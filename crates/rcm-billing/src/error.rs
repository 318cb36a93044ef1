//! Errors of a billing run.

use std::path::PathBuf;

use rcm_billing_collect::CollectError;
use rcm_billing_core::BillingError;
use rcm_billing_store::StoreError;

/// Run error type.
#[derive(Debug, thiserror::Error)]
pub enum RunError {
    /// The configuration file could not be read or parsed.
    #[error("invalid configuration {path}: {message}")]
    Config {
        /// Configuration file.
        path: PathBuf,
        /// What was wrong with it.
        message: String,
    },

    /// A mail role has no addressee.
    #[error("no addressee for role {0:?}")]
    MissingAddressee(String),

    /// Billing computation failed.
    #[error(transparent)]
    Billing(#[from] BillingError),

    /// Reading or writing the reports directory failed.
    #[error(transparent)]
    Store(#[from] StoreError),

    /// An external program failed.
    #[error(transparent)]
    Command(#[from] CollectError),
}

/// Result type for run operations.
pub type Result<T> = std::result::Result<T, RunError>;
