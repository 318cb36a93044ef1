//! Fiscal year-to-date charge totals.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::error::{BillingError, Result};
use crate::ledger::{LedgerEntry, SummaryRow};
use crate::period::BillingPeriod;
use crate::policy::BillingPolicy;

/// Source of summary rows persisted by earlier runs.
pub trait PriorLedgers {
    /// Rows of the summary written for `period`, or `None` if there is none.
    ///
    /// # Errors
    ///
    /// Returns an error if a summary exists but cannot be read.
    fn summary_rows(&self, period: BillingPeriod) -> Result<Option<Vec<SummaryRow>>>;
}

/// Cumulative charges of one project for the fiscal year so far.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct YtdCharges {
    /// Compute charges, current period included.
    pub compute: Decimal,
    /// Storage charges, current period included.
    pub storage: Decimal,
}

impl YtdCharges {
    /// Compute plus storage.
    #[must_use]
    pub fn total(&self) -> Decimal {
        self.compute + self.storage
    }
}

/// Sum a project's charges from the fiscal-year start through `period`.
///
/// Missing prior summaries contribute nothing.
///
/// # Errors
///
/// Returns `BillingError::History` if a prior summary has an unreadable
/// amount, `BillingError::InvalidPeriod` if the policy's fiscal-year start
/// month is out of range, or whatever `history` reports for an unreadable
/// file.
pub fn accumulate_ytd<H: PriorLedgers + ?Sized>(
    entry: &LedgerEntry,
    period: BillingPeriod,
    policy: &BillingPolicy,
    history: &H,
) -> Result<YtdCharges> {
    let mut ytd = YtdCharges::default();

    for prior in period.prior_fiscal_periods(policy.fiscal_year_start_month)? {
        let Some(rows) = history.summary_rows(prior)? else {
            tracing::info!(period = %prior, project = %entry.project, "No prior summary; counting zero");
            continue;
        };
        let bad = |message: String| BillingError::History {
            period: prior,
            message,
        };
        for row in rows.iter().filter(|r| r.project == entry.project) {
            ytd.compute += row.compute_charge_amount().map_err(bad)?;
            ytd.storage += row.storage_charge_amount().map_err(bad)?;
        }
    }

    ytd.compute += entry.compute_charge();
    ytd.storage += entry.storage_charge();
    Ok(ytd)
}
