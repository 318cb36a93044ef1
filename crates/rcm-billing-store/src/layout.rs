//! Path construction for the reports directory.
//!
//! ```text
//! <root>/YYYY-MM/sreport/<pi>.txt
//! <root>/YYYY-MM/disk_usage/du_group-YYYY-MM-DD.txt
//! <root>/YYYY-MM/statements/<project>_YYYYMM.html
//! <root>/YYYY-MM/<cluster>_charges_YYYYMM.csv
//! <root>/YYYY-MM/<label>_banner_YYYYMM.csv
//! ```

use std::path::{Path, PathBuf};

use chrono::NaiveDate;
use rcm_billing_core::BillingPeriod;

use crate::schema::{dir, SNAPSHOT_PREFIX, TEXT_EXTENSION};

/// Directory holding everything for `period`.
#[must_use]
pub fn period_dir(root: &Path, period: BillingPeriod) -> PathBuf {
    root.join(period.to_string())
}

/// Directory of the period's compute feeds.
#[must_use]
pub fn compute_feed_dir(root: &Path, period: BillingPeriod) -> PathBuf {
    period_dir(root, period).join(dir::COMPUTE_FEEDS)
}

/// Directory of the period's storage snapshots.
#[must_use]
pub fn snapshot_dir(root: &Path, period: BillingPeriod) -> PathBuf {
    period_dir(root, period).join(dir::SNAPSHOTS)
}

/// Directory of the period's statements.
#[must_use]
pub fn statement_dir(root: &Path, period: BillingPeriod) -> PathBuf {
    period_dir(root, period).join(dir::STATEMENTS)
}

/// Compute feed of one PI account.
#[must_use]
pub fn compute_feed_path(root: &Path, period: BillingPeriod, pi_account: &str) -> PathBuf {
    compute_feed_dir(root, period).join(format!("{pi_account}.{TEXT_EXTENSION}"))
}

/// Name of the snapshot taken on `date`.
#[must_use]
pub fn snapshot_file_name(date: NaiveDate) -> String {
    format!("{SNAPSHOT_PREFIX}{}.{TEXT_EXTENSION}", date.format("%Y-%m-%d"))
}

/// Snapshot taken on `date`, filed under the period containing it.
#[must_use]
pub fn snapshot_path(root: &Path, date: NaiveDate) -> PathBuf {
    snapshot_dir(root, BillingPeriod::containing(date)).join(snapshot_file_name(date))
}

/// Summary file of the period.
#[must_use]
pub fn summary_path(root: &Path, period: BillingPeriod, cluster: &str) -> PathBuf {
    period_dir(root, period).join(format!(
        "{}_charges_{}.csv",
        cluster.to_lowercase(),
        period.compact()
    ))
}

/// Accounting feed file of the period.
#[must_use]
pub fn feed_path(root: &Path, period: BillingPeriod, label: &str) -> PathBuf {
    period_dir(root, period).join(format!(
        "{}_banner_{}.csv",
        label.to_lowercase(),
        period.compact()
    ))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn paths_follow_reports_layout() {
        let root = Path::new("/reports");
        let period: BillingPeriod = "2023-09".parse().unwrap();

        assert_eq!(
            compute_feed_path(root, period, "smith"),
            Path::new("/reports/2023-09/sreport/smith.txt")
        );
        assert_eq!(
            snapshot_path(root, NaiveDate::from_ymd_opt(2023, 9, 7).unwrap()),
            Path::new("/reports/2023-09/disk_usage/du_group-2023-09-07.txt")
        );
        assert_eq!(
            summary_path(root, period, "MYCLUSTER"),
            Path::new("/reports/2023-09/mycluster_charges_202309.csv")
        );
        assert_eq!(
            feed_path(root, period, "ORGNAME"),
            Path::new("/reports/2023-09/orgname_banner_202309.csv")
        );
        assert_eq!(statement_dir(root, period), Path::new("/reports/2023-09/statements"));
    }
}
