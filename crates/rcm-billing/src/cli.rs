//! Command-line interface.

use std::path::PathBuf;

use chrono::NaiveDate;
use clap::{Args, Parser, Subcommand};
use rcm_billing_core::BillingPeriod;

use crate::config::DEFAULT_PREFIX;

/// Monthly research-computing billing.
#[derive(Debug, Parser)]
#[command(name = "rcm-billing", version)]
#[command(about = "Research computing cluster billing", long_about = None)]
pub struct Cli {
    /// Reports directory holding rosters, usage and outputs
    #[arg(long, global = true, env = "RCM_REPORTS_PREFIX", default_value = DEFAULT_PREFIX)]
    pub prefix: PathBuf,

    /// JSON configuration file (policy, collector and mail settings)
    #[arg(long, global = true, env = "RCM_POLICY", value_name = "FILE")]
    pub policy: Option<PathBuf>,

    /// Send all mail to the debug addressee and log verbosely
    #[arg(short, long, global = true)]
    pub debug: bool,

    #[command(subcommand)]
    pub command: Command,
}

/// Subcommands.
#[derive(Debug, Subcommand)]
pub enum Command {
    /// Bill a period: summary, statements, accounting feed and mail
    Bill(BillArgs),

    /// Run the per-PI compute usage reports for a period
    CollectCompute {
        /// Period as YYYY-MM (default: previous month)
        #[arg(long)]
        period: Option<BillingPeriod>,
    },

    /// Measure group storage if today is a snapshot day
    SnapshotStorage {
        /// Snapshot date as YYYY-MM-DD (default: today)
        #[arg(long)]
        date: Option<NaiveDate>,

        /// Measure even if the date is not a snapshot day
        #[arg(short, long)]
        force: bool,
    },
}

/// Arguments of `bill`.
#[derive(Debug, Clone, Args)]
pub struct BillArgs {
    /// Period as YYYY-MM (default: previous month)
    #[arg(long)]
    pub period: Option<BillingPeriod>,

    /// Actually send statements and the finance summary
    #[arg(short = 'e', long = "email")]
    pub send_email: bool,

    /// HTML to PDF converter, overriding the configuration
    #[arg(long, value_name = "PROGRAM")]
    pub pdf_program: Option<String>,

    /// Seconds between statement mails, overriding the configuration
    #[arg(long)]
    pub pause_secs: Option<u64>,

    /// List project group members on statements
    #[arg(long)]
    pub members: bool,
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_is_well_formed() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_bill_flags() {
        let cli = Cli::try_parse_from([
            "rcm-billing",
            "--prefix",
            "/tmp/rcm",
            "bill",
            "--period",
            "2023-09",
            "-e",
            "--pause-secs",
            "0",
        ])
        .unwrap();

        assert_eq!(cli.prefix, PathBuf::from("/tmp/rcm"));
        let Command::Bill(args) = cli.command else {
            panic!("expected bill");
        };
        assert_eq!(args.period, Some("2023-09".parse().unwrap()));
        assert!(args.send_email);
        assert_eq!(args.pause_secs, Some(0));
        assert!(!args.members);
    }

    #[test]
    fn test_bad_period_is_rejected() {
        let result = Cli::try_parse_from(["rcm-billing", "bill", "--period", "2023-13"]);
        assert!(result.is_err());
    }

    #[test]
    fn test_snapshot_flags() {
        let cli =
            Cli::try_parse_from(["rcm-billing", "snapshot-storage", "--date", "2023-09-07", "-f"])
                .unwrap();

        match cli.command {
            Command::SnapshotStorage { date, force } => {
                assert_eq!(date, NaiveDate::from_ymd_opt(2023, 9, 7));
                assert!(force);
            }
            other => panic!("unexpected command: {other:?}"),
        }
    }
}
