//! The per-period charge ledger and its summary file.
//!
//! A [`SummaryLedger`] is the canonical output of a billing run. The summary
//! CSV written from it is the only input later runs read back, for
//! year-to-date totals.

use std::io::Read;

use chrono::NaiveDate;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::error::{BillingError, Result};
use crate::money::format_amount;
use crate::period::BillingPeriod;
use crate::policy::BillingPolicy;
use crate::registry::{FundOrgCode, Pi, ProjectRecord};
use crate::usage::{ProjectStorage, ProjectUsage};

/// UTF-8 byte-order mark prefixed to every CSV this crate writes.
pub const UTF8_BOM: &[u8] = b"\xEF\xBB\xBF";

/// One user's compute line on a statement.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserLine {
    /// Login.
    pub login: String,
    /// Display name.
    pub full_name: String,
    /// Service units.
    pub su: Decimal,
    /// Charge before class zeroing.
    charge: Decimal,
}

impl UserLine {
    /// Charge for this user, zero when the project is a class.
    #[must_use]
    pub fn charge(&self, is_class: bool) -> Decimal {
        if is_class {
            Decimal::ZERO
        } else {
            self.charge
        }
    }
}

/// Billing outcome for one project in one period.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LedgerEntry {
    /// Project name.
    pub project: String,
    /// Owning PI.
    pub pi: Pi,
    /// Coursework project.
    pub is_class: bool,
    /// MRI-funded share.
    pub is_mri: bool,
    /// Startup or grant funded share.
    pub is_startup: bool,
    /// Eligible for the monthly credit.
    pub gets_credit: bool,
    /// Share expiration, if any.
    pub share_expiration: Option<NaiveDate>,
    /// Accounting code.
    pub fund_org: FundOrgCode,
    compute_su: Decimal,
    compute_charge: Decimal,
    storage_su: Decimal,
    storage_charge: Decimal,
    users: Vec<UserLine>,
}

impl LedgerEntry {
    /// Build an entry from registry data and measured usage.
    ///
    /// Each charge is rounded to the cent here and nowhere else.
    #[must_use]
    pub fn new(
        record: &ProjectRecord,
        pi: &Pi,
        compute: Option<&ProjectUsage>,
        storage: Option<&ProjectStorage>,
        policy: &BillingPolicy,
    ) -> Self {
        let compute_su = compute.map_or(Decimal::ZERO, |c| c.su);
        let storage_su = storage.map_or(Decimal::ZERO, |s| s.su);
        let users = compute
            .map(|c| {
                c.users
                    .iter()
                    .map(|u| UserLine {
                        login: u.login.clone(),
                        full_name: u.full_name.clone(),
                        su: u.su,
                        charge: policy.charge_for(u.su),
                    })
                    .collect()
            })
            .unwrap_or_default();

        Self {
            project: record.name.clone(),
            pi: pi.clone(),
            is_class: record.is_class,
            is_mri: record.is_mri,
            is_startup: record.is_startup,
            gets_credit: record.gets_credit,
            share_expiration: record.share_expiration,
            fund_org: record.fund_org.clone(),
            compute_su,
            compute_charge: policy.charge_for(compute_su),
            storage_su,
            storage_charge: policy.charge_for(storage_su),
            users,
        }
    }

    /// Compute SU.
    #[must_use]
    pub const fn compute_su(&self) -> Decimal {
        self.compute_su
    }

    /// Storage SU.
    #[must_use]
    pub const fn storage_su(&self) -> Decimal {
        self.storage_su
    }

    /// Compute plus storage SU.
    #[must_use]
    pub fn total_su(&self) -> Decimal {
        self.compute_su + self.storage_su
    }

    /// Compute charge; zero for class projects.
    #[must_use]
    pub fn compute_charge(&self) -> Decimal {
        if self.is_class {
            Decimal::ZERO
        } else {
            self.compute_charge
        }
    }

    /// Storage charge; zero for class projects.
    #[must_use]
    pub fn storage_charge(&self) -> Decimal {
        if self.is_class {
            Decimal::ZERO
        } else {
            self.storage_charge
        }
    }

    /// Compute plus storage charge.
    #[must_use]
    pub fn total_charge(&self) -> Decimal {
        self.compute_charge() + self.storage_charge()
    }

    /// Per-user compute lines in feed order.
    #[must_use]
    pub fn users(&self) -> &[UserLine] {
        &self.users
    }
}

/// All charges of one period, ordered by PI last name.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SummaryLedger {
    period: BillingPeriod,
    cluster: String,
    entries: Vec<LedgerEntry>,
}

impl SummaryLedger {
    /// Build a ledger, sorting entries by PI last name (case-insensitive).
    ///
    /// The sort is stable, so entries of one PI keep their input order.
    #[must_use]
    pub fn new(period: BillingPeriod, cluster: impl Into<String>, mut entries: Vec<LedgerEntry>) -> Self {
        entries.sort_by_cached_key(|e| e.pi.last_name.to_lowercase());
        Self {
            period,
            cluster: cluster.into(),
            entries,
        }
    }

    /// The billed period.
    #[must_use]
    pub const fn period(&self) -> BillingPeriod {
        self.period
    }

    /// Cluster name.
    #[must_use]
    pub fn cluster(&self) -> &str {
        &self.cluster
    }

    /// Entries in ledger order.
    #[must_use]
    pub fn entries(&self) -> &[LedgerEntry] {
        &self.entries
    }

    /// Entry for `project`.
    #[must_use]
    pub fn entry(&self, project: &str) -> Option<&LedgerEntry> {
        self.entries.iter().find(|e| e.project == project)
    }

    /// Sum of every entry's total charge.
    #[must_use]
    pub fn total_charge(&self) -> Decimal {
        self.entries.iter().map(LedgerEntry::total_charge).sum()
    }

    /// Rows of the summary file.
    #[must_use]
    pub fn rows(&self) -> Vec<SummaryRow> {
        self.entries
            .iter()
            .map(|e| SummaryRow {
                year: self.period.year(),
                month: self.period.month(),
                cluster: self.cluster.clone(),
                last_name: e.pi.last_name.clone(),
                first_name: e.pi.first_name.clone(),
                email: e.pi.email.clone(),
                project: e.project.clone(),
                is_class: flag(e.is_class),
                is_mri: flag(e.is_mri),
                is_startup: flag(e.is_startup),
                gets_credit: flag(e.gets_credit),
                share_expiration: e
                    .share_expiration
                    .map(|d| d.format("%Y-%m-%d").to_string())
                    .unwrap_or_default(),
                fund_org: e.fund_org.to_string(),
                compute_charge: format_amount(e.compute_charge()),
                storage_charge: format_amount(e.storage_charge()),
                total_charge: format_amount(e.total_charge()),
            })
            .collect()
    }

    /// Encode the summary file: BOM, CRLF line endings, two-decimal amounts.
    ///
    /// # Errors
    ///
    /// Returns `BillingError::Csv` if encoding fails.
    pub fn to_csv_bytes(&self) -> Result<Vec<u8>> {
        write_csv(&self.rows())
    }
}

fn flag(value: bool) -> String {
    String::from(if value { "True" } else { "False" })
}

/// One row of the summary file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SummaryRow {
    /// Calendar year.
    #[serde(rename = "Year")]
    pub year: i32,
    /// Calendar month.
    #[serde(rename = "Month")]
    pub month: u32,
    /// Cluster name.
    #[serde(rename = "Cluster")]
    pub cluster: String,
    /// PI last name.
    #[serde(rename = "Last name")]
    pub last_name: String,
    /// PI first name.
    #[serde(rename = "First name")]
    pub first_name: String,
    /// PI email.
    #[serde(rename = "Email")]
    pub email: String,
    /// Project name.
    #[serde(rename = "Project")]
    pub project: String,
    /// `True` or `False`.
    #[serde(rename = "Is class?")]
    pub is_class: String,
    /// `True` or `False`.
    #[serde(rename = "Is MRI?")]
    pub is_mri: String,
    /// `True` or `False`.
    #[serde(rename = "Is startup/grant?")]
    pub is_startup: String,
    /// `True` or `False`.
    #[serde(rename = "Monthly credit?")]
    pub gets_credit: String,
    /// `YYYY-MM-DD` or empty.
    #[serde(rename = "Share expiration")]
    pub share_expiration: String,
    /// Fund-org code as registered.
    #[serde(rename = "Fund-Org code")]
    pub fund_org: String,
    /// Compute charge, two decimals.
    #[serde(rename = "CPU charge ($)")]
    pub compute_charge: String,
    /// Storage charge, two decimals.
    #[serde(rename = "Storage charge ($)")]
    pub storage_charge: String,
    /// Total charge, two decimals.
    #[serde(rename = "Total charge ($)")]
    pub total_charge: String,
}

impl SummaryRow {
    /// Parsed compute charge.
    ///
    /// # Errors
    ///
    /// Returns a message naming the bad cell.
    pub fn compute_charge_amount(&self) -> std::result::Result<Decimal, String> {
        parse_amount(&self.compute_charge)
    }

    /// Parsed storage charge.
    ///
    /// # Errors
    ///
    /// Returns a message naming the bad cell.
    pub fn storage_charge_amount(&self) -> std::result::Result<Decimal, String> {
        parse_amount(&self.storage_charge)
    }

    /// Whether the row is a class project.
    #[must_use]
    pub fn is_class(&self) -> bool {
        self.is_class.eq_ignore_ascii_case("true")
    }
}

fn parse_amount(cell: &str) -> std::result::Result<Decimal, String> {
    let cell = cell.trim();
    if cell.is_empty() {
        return Ok(Decimal::ZERO);
    }
    cell.parse::<Decimal>()
        .map_err(|e| format!("invalid amount {cell:?}: {e}"))
}

/// Read a summary file back.
///
/// # Errors
///
/// Returns `BillingError::Csv` if the file is not a summary file.
pub fn read_summary_rows<R: Read>(reader: R) -> Result<Vec<SummaryRow>> {
    let mut csv = csv::ReaderBuilder::new()
        .trim(csv::Trim::Fields)
        .from_reader(reader);
    csv.deserialize()
        .collect::<std::result::Result<Vec<SummaryRow>, _>>()
        .map_err(BillingError::from)
}

/// Encode `rows` as CSV with a BOM and CRLF line endings.
pub(crate) fn write_csv<T: Serialize>(rows: &[T]) -> Result<Vec<u8>> {
    let mut buffer = UTF8_BOM.to_vec();
    {
        let mut writer = csv::WriterBuilder::new()
            .terminator(csv::Terminator::CRLF)
            .from_writer(&mut buffer);
        for row in rows {
            writer.serialize(row)?;
        }
        writer.flush()?;
    }
    Ok(buffer)
}
