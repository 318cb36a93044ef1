//! Billing policy configuration.
//!
//! All rates, exemptions and accounting constants live in one
//! [`BillingPolicy`] value that callers thread through every component.

use std::collections::BTreeSet;

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::error::BillingError;
use crate::money::{to_cents, RoundingMode};
use crate::registry::normalize_project_name;

/// Storage SU charged per TiB held for a whole month.
pub const STORAGE_SU_PER_TIB_MONTH: i64 = 1081;

/// kiB in one TiB.
pub const KIB_PER_TIB: i64 = 1_073_741_824;

/// Default price of one SU in dollars (0.0123).
pub const DEFAULT_RATE_PER_SU: Decimal = Decimal::from_parts(123, 0, 0, false, 4);

/// Default monthly credit for eligible projects in dollars (100.00).
pub const DEFAULT_MONTHLY_CREDIT: Decimal = Decimal::from_parts(100, 0, 0, false, 0);

/// Month in which the fiscal year begins (July).
pub const DEFAULT_FISCAL_YEAR_START_MONTH: u32 = 7;

/// Pricing, exemptions and accounting constants for a billing run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BillingPolicy {
    /// Cluster name printed on statements and used in file names.
    pub cluster: String,

    /// Dollars per SU.
    pub rate_per_su: Decimal,

    /// Rounding rule at the cent boundary.
    pub rounding: RoundingMode,

    /// Credit subtracted from eligible projects' monthly totals in the feed.
    pub monthly_credit: Decimal,

    /// First month (1-12) of the fiscal year.
    pub fiscal_year_start_month: u32,

    /// Storage SU per TiB-month.
    pub storage_su_per_tib_month: Decimal,

    /// Projects never charged (interns, staff groups).
    pub no_charge_projects: BTreeSet<String>,

    /// Defunct projects whose empty group directories are still measured.
    pub defunct_projects: BTreeSet<String>,

    /// Terminal token of group directory names.
    pub group_suffix: String,

    /// Terminal token of project names.
    pub project_suffix: String,

    /// General-ledger accounts for the accounting feed.
    pub feed: FeedAccounts,
}

impl Default for BillingPolicy {
    fn default() -> Self {
        Self {
            cluster: "MYCLUSTER".to_string(),
            rate_per_su: DEFAULT_RATE_PER_SU,
            rounding: RoundingMode::HalfUp,
            monthly_credit: DEFAULT_MONTHLY_CREDIT,
            fiscal_year_start_month: DEFAULT_FISCAL_YEAR_START_MONTH,
            storage_su_per_tib_month: Decimal::from(STORAGE_SU_PER_TIB_MONTH),
            no_charge_projects: BTreeSet::new(),
            defunct_projects: BTreeSet::new(),
            group_suffix: "Grp".to_string(),
            project_suffix: "Prj".to_string(),
            feed: FeedAccounts::default(),
        }
    }
}

impl BillingPolicy {
    /// Charge for `su` service units, quantized to the cent.
    #[must_use]
    pub fn charge_for(&self, su: Decimal) -> Decimal {
        to_cents(su * self.rate_per_su, self.rounding)
    }

    /// Storage SU per kiB held for one day in a month of `days_in_month` days.
    #[must_use]
    pub fn storage_rate_per_kib_day(&self, days_in_month: u32) -> Decimal {
        let kib_days = Decimal::from(days_in_month) * Decimal::from(KIB_PER_TIB);
        self.storage_su_per_tib_month / kib_days
    }

    /// Check values a configuration file may have put out of range.
    ///
    /// # Errors
    ///
    /// Returns `BillingError::InvalidPolicy` naming the first bad field.
    pub fn validate(&self) -> Result<(), BillingError> {
        if !(1..=12).contains(&self.fiscal_year_start_month) {
            return Err(BillingError::InvalidPolicy(format!(
                "fiscal_year_start_month must be 1-12, got {}",
                self.fiscal_year_start_month
            )));
        }
        Ok(())
    }

    /// Whether `project` is excluded from billing by operator lists.
    ///
    /// Names are compared after project-name normalization on both sides.
    #[must_use]
    pub fn is_exempt(&self, project: &str) -> bool {
        let project = normalize_project_name(project);
        self.no_charge_projects
            .iter()
            .chain(&self.defunct_projects)
            .any(|listed| normalize_project_name(listed) == project)
    }

    /// Map a group directory basename to its project name.
    ///
    /// A trailing group suffix becomes the project suffix; the result is
    /// lower-cased.
    #[must_use]
    pub fn project_for_group(&self, group: &str) -> String {
        let name = match group.strip_suffix(self.group_suffix.as_str()) {
            Some(stem) if !self.group_suffix.is_empty() => format!("{stem}{}", self.project_suffix),
            _ => group.to_string(),
        };
        name.to_lowercase()
    }
}

/// Account codes and labels for the general-ledger feed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct FeedAccounts {
    /// Account charged on each project's fund/org.
    pub debit_account: String,

    /// Fund receiving the mirrored credits.
    pub clearing_fund: String,

    /// Organization receiving the mirrored credits.
    pub clearing_org: String,

    /// Account credited on the clearing fund/org.
    pub credit_account: String,

    /// Label inserted into every description after the PI's name.
    pub description_label: String,

    /// Prefix of the per-period reference id.
    pub reference_prefix: String,
}

impl Default for FeedAccounts {
    fn default() -> Self {
        Self {
            debit_account: "1111".to_string(),
            clearing_fund: "123456".to_string(),
            clearing_org: "1234".to_string(),
            credit_account: "2222".to_string(),
            description_label: "ORGNAME".to_string(),
            reference_prefix: "ORGNAME".to_string(),
        }
    }
}
