//! Error types for rcm-billing.
//!
//! Every variant here is fatal to a billing run. Soft stops (inactive PI,
//! missing prior ledger, credit zeroing a charge) are logged by the
//! components and never surface as errors.

use crate::period::BillingPeriod;

/// Result type for rcm-billing operations.
pub type Result<T> = std::result::Result<T, BillingError>;

/// Errors that can occur in a billing run.
#[derive(Debug, thiserror::Error)]
pub enum BillingError {
    /// Missing or inconsistent registry data.
    #[error(transparent)]
    Registry(#[from] RegistryError),

    /// Malformed usage feed.
    #[error(transparent)]
    Ingestion(#[from] IngestionError),

    /// Usage that cannot be reconciled with the registry.
    #[error(transparent)]
    Aggregation(#[from] AggregationError),

    /// Broken invariant while building the accounting feed.
    #[error(transparent)]
    Feed(#[from] FeedError),

    /// A prior-period ledger exists but could not be read.
    #[error("prior ledger for {period} unreadable: {message}")]
    History {
        /// The period whose ledger failed to load.
        period: BillingPeriod,
        /// What went wrong.
        message: String,
    },

    /// CSV encoding or decoding failure.
    #[error("csv error: {0}")]
    Csv(#[from] csv::Error),

    /// I/O failure while encoding an output document.
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// A statement could not be formatted.
    #[error("render error: {0}")]
    Render(#[from] std::fmt::Error),

    /// Invalid billing period text.
    #[error("invalid billing period: {0}")]
    InvalidPeriod(String),

    /// A billing policy value is out of range.
    #[error("invalid billing policy: {0}")]
    InvalidPolicy(String),
}

/// Registry loading errors.
#[derive(Debug, thiserror::Error)]
pub enum RegistryError {
    /// A project row names a PI email missing from the PI roster.
    #[error("project {project} references unknown PI email {email}")]
    UnknownPiEmail {
        /// The project row.
        project: String,
        /// The email that did not resolve.
        email: String,
    },

    /// A fund-org code is neither well-formed nor an unassigned sentinel.
    #[error("project {project} has malformed fund-org code {value:?}")]
    InvalidFundOrg {
        /// The project row.
        project: String,
        /// The offending cell.
        value: String,
    },

    /// A cell could not be interpreted.
    #[error("row {row}: invalid {field} value {value:?}")]
    InvalidField {
        /// 1-based data row number.
        row: usize,
        /// Column name.
        field: &'static str,
        /// The offending cell.
        value: String,
    },

    /// The roster is not valid CSV or lacks required columns.
    #[error("malformed roster: {0}")]
    Csv(#[from] csv::Error),
}

/// Usage ingestion errors.
#[derive(Debug, thiserror::Error)]
pub enum IngestionError {
    /// The compute feed ended before its header row.
    #[error("compute feed {source_name} has no header after the preamble")]
    MissingHeader {
        /// Feed name (usually the file name).
        source_name: String,
    },

    /// A required column is absent from the compute feed header.
    #[error("compute feed {source_name} lacks column {column}")]
    MissingColumn {
        /// Feed name.
        source_name: String,
        /// The missing column.
        column: &'static str,
    },

    /// A data row has fewer cells than the header.
    #[error("{source_name}:{line}: expected {expected} cells, found {found}")]
    ShortRow {
        /// Feed name.
        source_name: String,
        /// 1-based line number in the feed.
        line: usize,
        /// Number of header columns.
        expected: usize,
        /// Number of cells on the line.
        found: usize,
    },

    /// The account cell is blank.
    #[error("{source_name}:{line}: blank account cell")]
    BlankAccount {
        /// Feed name.
        source_name: String,
        /// 1-based line number.
        line: usize,
    },

    /// A project row appeared before any PI row.
    #[error("{source_name}:{line}: project {project} has no enclosing PI row")]
    OrphanProject {
        /// Feed name.
        source_name: String,
        /// 1-based line number.
        line: usize,
        /// The project account.
        project: String,
    },

    /// A user row appeared before any project row of the current PI.
    #[error("{source_name}:{line}: user {login} has no enclosing project row")]
    OrphanUser {
        /// Feed name.
        source_name: String,
        /// 1-based line number.
        line: usize,
        /// The user login.
        login: String,
    },

    /// The same project was reported by two feeds or twice in one feed.
    #[error("project {project} reported more than once (second time in {source_name})")]
    DuplicateProject {
        /// Feed name of the second occurrence.
        source_name: String,
        /// The project account.
        project: String,
    },

    /// A numeric cell could not be parsed.
    #[error("{source_name}:{line}: invalid number {value:?}")]
    InvalidNumber {
        /// Feed name.
        source_name: String,
        /// 1-based line number.
        line: usize,
        /// The offending cell.
        value: String,
    },

    /// A storage snapshot line is not `<kiB>\t<path>`.
    #[error("{source_name}:{line}: malformed snapshot line {content:?}")]
    MalformedSnapshotLine {
        /// Snapshot name.
        source_name: String,
        /// 1-based line number.
        line: usize,
        /// The offending line.
        content: String,
    },

    /// A snapshot file name does not encode a date.
    #[error("snapshot name {0:?} does not encode a date")]
    UndatedSnapshot(String),

    /// A snapshot is dated outside the billing period.
    #[error("snapshot {source_name} is dated {date}, outside {period}")]
    SnapshotOutsidePeriod {
        /// Snapshot name.
        source_name: String,
        /// Date encoded in the name.
        date: chrono::NaiveDate,
        /// The period being billed.
        period: BillingPeriod,
    },

    /// Two snapshots of one period carry the same date.
    #[error("snapshots {first} and {second} are both dated {date}")]
    DuplicateSnapshotDate {
        /// Date shared by both snapshots.
        date: chrono::NaiveDate,
        /// Name of the first snapshot.
        first: String,
        /// Name of the second snapshot.
        second: String,
    },

    /// Reading a feed failed.
    #[error("reading {source_name}: {source}")]
    Io {
        /// Feed name.
        source_name: String,
        /// Underlying error.
        source: std::io::Error,
    },
}

/// Aggregation errors.
#[derive(Debug, thiserror::Error)]
pub enum AggregationError {
    /// A storage project is absent from the project registry.
    #[error("project {project} has usage but no registry entry")]
    UnknownProject {
        /// The project name.
        project: String,
    },

    /// A registry project names a PI that is not loaded.
    #[error("project {project} resolves to no PI (email {email})")]
    UnresolvedPi {
        /// The project name.
        project: String,
        /// The PI email on the project record.
        email: String,
    },
}

/// Accounting feed invariant violations.
#[derive(Debug, thiserror::Error)]
pub enum FeedError {
    /// A fund-org code that passed the filter could not be split.
    #[error("project {project} has unsplittable fund-org code {value:?}")]
    MalformedFundOrg {
        /// The project name.
        project: String,
        /// The raw code.
        value: String,
    },

    /// Debit and credit totals differ.
    #[error("feed unbalanced: debits={debits}, credits={credits}")]
    Unbalanced {
        /// Sum of the debit column.
        debits: rust_decimal::Decimal,
        /// Sum of the credit column.
        credits: rust_decimal::Decimal,
    },
}
