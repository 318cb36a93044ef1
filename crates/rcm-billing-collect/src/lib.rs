//! Usage collection for rcm-billing.
//!
//! Runs the cluster's own accounting programs and stores their raw output
//! in the reports directory:
//!
//! - `sreport` once per active PI account, per period
//! - `du -sk` over the research group directories, on snapshot days
//! - `getent group` to list project members for statements
//!
//! [`run_command`] is the shared process runner; the binary reuses it for
//! PDF conversion and mail.
//!
//! # Example
//!
//! ```no_run
//! use rcm_billing_collect::{collect_compute, CollectorConfig};
//! use rcm_billing_core::BillingPeriod;
//! use rcm_billing_store::{FsStore, LedgerStore};
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let store = FsStore::open("/ifs/sysadmin/RCM", "MYCLUSTER")?;
//! let registry = store.load_registry()?;
//! let period: BillingPeriod = "2023-09".parse()?;
//!
//! collect_compute(&store, &registry, period, &CollectorConfig::default()).await?;
//! # Ok(())
//! # }
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]

mod collect;
mod command;
mod config;
mod error;

pub use collect::{
    collect_compute, group_dirs, load_group_members, parse_group_database, snapshot_storage,
    sreport_args, GroupMembers,
};
pub use command::run_command;
pub use config::CollectorConfig;
pub use error::{CollectError, Result};
