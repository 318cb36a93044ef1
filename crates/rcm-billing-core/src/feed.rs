//! General-ledger accounting feed.
//!
//! Each billable project yields a debit against its own fund/org and a
//! mirrored credit to the clearing fund/org. Debits come first, then the
//! credits, both in ledger order.

use rust_decimal::Decimal;
use serde::{Serialize, Serializer};

use crate::error::{FeedError, Result as BillingResult};
use crate::ledger::{write_csv, LedgerEntry, SummaryLedger};
use crate::money::format_amount;
use crate::period::BillingPeriod;
use crate::policy::BillingPolicy;
use crate::registry::{split_fund_org, FundOrgCode};

/// Longest description the importer accepts.
pub const MAX_DESCRIPTION_CHARS: usize = 35;

/// One line of the feed file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FeedRow {
    /// Fund number.
    #[serde(rename = "Fund")]
    pub fund: String,
    /// Organization number.
    #[serde(rename = "Orgn")]
    pub org: String,
    /// General-ledger account.
    #[serde(rename = "Account")]
    pub account: String,
    /// Always empty.
    #[serde(rename = "Program")]
    pub program: String,
    /// Always empty.
    #[serde(rename = "Activity")]
    pub activity: String,
    /// Always empty.
    #[serde(rename = "Location")]
    pub location: String,
    /// Debit amount, empty on credit rows.
    #[serde(rename = "Debit", serialize_with = "two_decimals")]
    pub debit: Option<Decimal>,
    /// Credit amount, empty on debit rows.
    #[serde(rename = "Credit", serialize_with = "two_decimals")]
    pub credit: Option<Decimal>,
    /// PI, label and period.
    #[serde(rename = "Description (35 Characters maximum)")]
    pub description: String,
    /// Per-period reference.
    #[serde(rename = "Reference ID")]
    pub reference: String,
}

fn two_decimals<S: Serializer>(amount: &Option<Decimal>, serializer: S) -> Result<S::Ok, S::Error> {
    match amount {
        Some(amount) => serializer.serialize_str(&format_amount(*amount)),
        None => serializer.serialize_none(),
    }
}

/// The feed for one period.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Feed {
    period: BillingPeriod,
    debits: Vec<FeedRow>,
    credits: Vec<FeedRow>,
    total: Decimal,
}

impl Feed {
    /// The billed period.
    #[must_use]
    pub const fn period(&self) -> BillingPeriod {
        self.period
    }

    /// Debit rows.
    #[must_use]
    pub fn debits(&self) -> &[FeedRow] {
        &self.debits
    }

    /// Credit rows.
    #[must_use]
    pub fn credits(&self) -> &[FeedRow] {
        &self.credits
    }

    /// Every row in file order.
    pub fn rows(&self) -> impl Iterator<Item = &FeedRow> {
        self.debits.iter().chain(self.credits.iter())
    }

    /// Amount moved, equal to both column sums.
    #[must_use]
    pub const fn total(&self) -> Decimal {
        self.total
    }

    /// Whether nothing is billed this period.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.debits.is_empty()
    }

    /// Encode the feed file with a BOM and CRLF line endings.
    ///
    /// # Errors
    ///
    /// Returns `BillingError::Csv` if encoding fails.
    pub fn to_csv_bytes(&self) -> BillingResult<Vec<u8>> {
        let rows: Vec<&FeedRow> = self.rows().collect();
        write_csv(&rows)
    }
}

/// Description for `entry`, truncated to [`MAX_DESCRIPTION_CHARS`].
#[must_use]
pub fn description(entry: &LedgerEntry, period: BillingPeriod, policy: &BillingPolicy) -> String {
    let full = format!(
        "{} {} {} {} {}",
        entry.pi.first_name,
        entry.pi.last_name,
        policy.feed.description_label,
        period.short_month_name(),
        period.year()
    );
    full.chars().take(MAX_DESCRIPTION_CHARS).collect()
}

/// Reference id: prefix, two-digit month, two-digit year.
#[must_use]
pub fn reference_id(period: BillingPeriod, policy: &BillingPolicy) -> String {
    format!(
        "{}{:02}{:02}",
        policy.feed.reference_prefix,
        period.month(),
        period.year().rem_euclid(100)
    )
}

/// Build the feed from the period ledger.
///
/// Rows without an assigned fund-org or with nothing to charge are left
/// out. Credit-eligible projects have the monthly credit subtracted; a row
/// the credit covers entirely is dropped.
///
/// # Errors
///
/// Returns `FeedError::MalformedFundOrg` if an assigned code cannot be
/// split and `FeedError::Unbalanced` if debits and credits differ.
pub fn to_feed(ledger: &SummaryLedger, policy: &BillingPolicy) -> BillingResult<Feed> {
    let period = ledger.period();
    let reference = reference_id(period, policy);
    let accounts = &policy.feed;

    let mut debits = Vec::new();
    for entry in ledger.entries() {
        let FundOrgCode::Assigned { raw, .. } = &entry.fund_org else {
            tracing::debug!(project = %entry.project, "No fund-org code; left out of feed");
            continue;
        };
        let mut amount = entry.total_charge();
        if amount <= Decimal::ZERO {
            continue;
        }
        if entry.gets_credit {
            amount -= policy.monthly_credit;
            if amount <= Decimal::ZERO {
                tracing::info!(
                    project = %entry.project,
                    charge = %entry.total_charge(),
                    "Monthly credit covers the whole charge"
                );
                continue;
            }
        }
        let (fund, org) = split_fund_org(raw).ok_or_else(|| FeedError::MalformedFundOrg {
            project: entry.project.clone(),
            value: raw.clone(),
        })?;
        debits.push(FeedRow {
            fund: fund.to_string(),
            org: org.to_string(),
            account: accounts.debit_account.clone(),
            program: String::new(),
            activity: String::new(),
            location: String::new(),
            debit: Some(amount),
            credit: None,
            description: description(entry, period, policy),
            reference: reference.clone(),
        });
    }

    let credits: Vec<FeedRow> = debits
        .iter()
        .map(|debit| FeedRow {
            fund: accounts.clearing_fund.clone(),
            org: accounts.clearing_org.clone(),
            account: accounts.credit_account.clone(),
            debit: None,
            credit: debit.debit,
            ..debit.clone()
        })
        .collect();

    let total_debits: Decimal = debits.iter().filter_map(|r| r.debit).sum();
    let total_credits: Decimal = credits.iter().filter_map(|r| r.credit).sum();
    if total_debits != total_credits {
        return Err(FeedError::Unbalanced {
            debits: total_debits,
            credits: total_credits,
        }
        .into());
    }

    tracing::info!(%period, rows = debits.len() * 2, total = %total_debits, "Accounting feed built");
    Ok(Feed {
        period,
        debits,
        credits,
        total: total_debits,
    })
}
