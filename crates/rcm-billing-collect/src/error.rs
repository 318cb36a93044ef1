//! Error types for usage collection.

use rcm_billing_core::BillingError;
use rcm_billing_store::StoreError;

/// Errors that can occur while running external collection commands.
#[derive(Debug, thiserror::Error)]
pub enum CollectError {
    /// The program is not installed or not on `PATH`.
    #[error("{program} is not available")]
    ProgramNotFound {
        /// Program that could not be started.
        program: String,
    },

    /// The program could not be started or waited on.
    #[error("Failed to execute {program}: {source}")]
    CommandExecution {
        /// Program being run.
        program: String,
        /// Underlying I/O error.
        #[source]
        source: std::io::Error,
    },

    /// The program exited unsuccessfully.
    #[error("{program} failed with exit code {exit_code}: {stderr}")]
    CommandFailed {
        /// Program being run.
        program: String,
        /// The exit code returned by the command, or -1 if killed.
        exit_code: i32,
        /// The stderr output from the command.
        stderr: String,
    },

    /// The groups directory could not be listed.
    #[error("Cannot list group directories under {path}: {source}")]
    GroupsRoot {
        /// Directory being listed.
        path: std::path::PathBuf,
        /// Underlying I/O error.
        #[source]
        source: std::io::Error,
    },

    /// Storing collected usage failed.
    #[error(transparent)]
    Store(#[from] StoreError),

    /// A domain error.
    #[error(transparent)]
    Billing(#[from] BillingError),
}

/// Result type for collection operations.
pub type Result<T> = std::result::Result<T, CollectError>;
