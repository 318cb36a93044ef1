//! Monthly billing for a research computing cluster.
//!
//! This crate wires the billing engine to the reports directory, the
//! cluster's accounting programs and mail:
//!
//! - `bill` - summary ledger, statements, accounting feed and mail
//! - `collect-compute` - per-PI `sreport` feeds for a period
//! - `snapshot-storage` - group disk usage on snapshot days
//!
//! # Mail
//!
//! Nothing is mailed unless `--email` is given; without it every message
//! is logged by a [`DryRunMailer`]. With `--debug` all mail goes to the
//! debug addressee.

#![forbid(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]

pub mod cli;
pub mod config;
pub mod error;
pub mod mail;
pub mod run;

pub use cli::{BillArgs, Cli, Command};
pub use config::{MailConfig, MailRoles, SiteConfig};
pub use error::{Result, RunError};
pub use mail::{AddressBook, CommandMailer, DryRunMailer, Mailer, Message};
pub use run::{bill, bill_options, execute, BillOptions, RunReport};
