//! Core billing engine for research-computing cluster usage.
//!
//! This crate turns one month of measured cluster usage into charges:
//!
//! - **Registry**: `Registry`, `Pi`, `ProjectRecord`, `FundOrgCode`
//! - **Usage**: compute feeds (`parse_compute_feed`) and storage snapshots
//!   (`parse_snapshot`, `StorageUsage`)
//! - **Ledger**: `aggregate` produces the period's `SummaryLedger`
//! - **Year to date**: `accumulate_ytd` over `PriorLedgers`
//! - **Outputs**: per-project `Statement`s and the accounting `Feed`
//!
//! Everything is driven by one [`BillingPolicy`] value.
//!
//! # Service units
//!
//! Usage is measured in service units (SU). One SU is one core-hour of
//! compute; storage costs 1081 SU per TiB held for a month. Charges are SU
//! times the policy rate, rounded to the cent once, when computed.

#![forbid(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]

pub mod aggregate;
pub mod error;
pub mod feed;
pub mod ledger;
pub mod money;
pub mod period;
pub mod policy;
pub mod registry;
pub mod statement;
pub mod usage;
pub mod ytd;

pub use aggregate::aggregate;
pub use error::{
    AggregationError, BillingError, FeedError, IngestionError, RegistryError, Result,
};
pub use feed::{to_feed, Feed, FeedRow};
pub use ledger::{read_summary_rows, LedgerEntry, SummaryLedger, SummaryRow, UserLine, UTF8_BOM};
pub use money::{format_amount, to_cents, RoundingMode};
pub use period::BillingPeriod;
pub use policy::{BillingPolicy, FeedAccounts};
pub use registry::{FundOrgCode, Pi, ProjectRecord, Registry};
pub use statement::{Document, HtmlRenderer, Statement, StatementRenderer};
pub use usage::{
    parse_compute_feed, parse_snapshot, snapshot_date_from_name, ComputeUsage, StorageSnapshot,
    StorageUsage,
};
pub use ytd::{accumulate_ytd, PriorLedgers, YtdCharges};
