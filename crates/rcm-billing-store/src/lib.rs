//! Reports-directory storage for rcm-billing.
//!
//! Every input and output of a billing run is a plain file under one
//! reports directory, so operators can inspect and correct them by hand.
//!
//! # Layout
//!
//! - `myorg_pis.csv`, `fundorg_codes.csv`, `email_addressees.csv` at the root
//! - one `YYYY-MM` directory per period holding the raw usage (`sreport/`,
//!   `disk_usage/`), the statements and the summary and feed files
//!
//! See [`layout`] for exact paths.
//!
//! # Example
//!
//! ```no_run
//! use rcm_billing_store::{FsStore, LedgerStore};
//!
//! let store = FsStore::open("/ifs/sysadmin/RCM", "MYCLUSTER").unwrap();
//! let registry = store.load_registry().unwrap();
//! println!("{} projects", registry.project_count());
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]

pub mod error;
pub mod fs;
pub mod layout;
pub mod schema;

use std::path::PathBuf;

use chrono::NaiveDate;
use rcm_billing_core::{
    BillingPeriod, BillingPolicy, ComputeUsage, Document, Feed, Registry, StorageUsage,
    SummaryLedger, SummaryRow,
};

pub use error::{Result, StoreError};
pub use fs::FsStore;
pub use schema::Addressee;

/// Storage operations of a billing run.
///
/// Writes return the path written so callers can attach or convert the
/// file afterwards.
pub trait LedgerStore: Send + Sync {
    // =========================================================================
    // Registry
    // =========================================================================

    /// Load the PI roster and project registry.
    ///
    /// # Errors
    ///
    /// Returns `StoreError::NotFound` if a roster is missing, or the
    /// registry error for malformed content.
    fn load_registry(&self) -> Result<Registry>;

    /// Load the mail addressees.
    ///
    /// # Errors
    ///
    /// Returns an error if the file is missing or malformed.
    fn load_addressees(&self) -> Result<Vec<Addressee>>;

    // =========================================================================
    // Raw usage
    // =========================================================================

    /// Store one PI's compute feed for `period`.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be written.
    fn put_compute_feed(&self, period: BillingPeriod, pi_account: &str, text: &str)
        -> Result<PathBuf>;

    /// Store the storage snapshot taken on `date`.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be written.
    fn put_snapshot(&self, date: NaiveDate, text: &str) -> Result<PathBuf>;

    /// Parse every compute feed of `period`.
    ///
    /// # Errors
    ///
    /// Returns `StoreError::NotFound` if no feeds were collected, or the
    /// ingestion error of the first malformed feed.
    fn load_compute_usage(&self, period: BillingPeriod) -> Result<ComputeUsage>;

    /// Parse and weight every storage snapshot of `period`.
    ///
    /// # Errors
    ///
    /// Returns `StoreError::NotFound` if no snapshots were taken, or the
    /// ingestion error of the first malformed snapshot.
    fn load_storage_usage(&self, period: BillingPeriod, policy: &BillingPolicy)
        -> Result<StorageUsage>;

    // =========================================================================
    // Outputs
    // =========================================================================

    /// Write the period summary, replacing any earlier one.
    ///
    /// # Errors
    ///
    /// Returns an error if encoding or writing fails.
    fn put_summary(&self, ledger: &SummaryLedger) -> Result<PathBuf>;

    /// Read the summary of `period`, if one was written.
    ///
    /// # Errors
    ///
    /// Returns an error if the file exists but cannot be read.
    fn get_summary_rows(&self, period: BillingPeriod) -> Result<Option<Vec<SummaryRow>>>;

    /// Write the accounting feed, replacing any earlier one.
    ///
    /// # Errors
    ///
    /// Returns an error if encoding or writing fails.
    fn put_feed(&self, feed: &Feed, policy: &BillingPolicy) -> Result<PathBuf>;

    /// Write a rendered statement document.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be written.
    fn put_statement(&self, period: BillingPeriod, document: &Document) -> Result<PathBuf>;
}
