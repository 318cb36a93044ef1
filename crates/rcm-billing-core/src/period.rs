//! Monthly billing periods and fiscal-year arithmetic.

use std::fmt;
use std::str::FromStr;

use chrono::{Datelike, Months, NaiveDate};
use serde::{Deserialize, Serialize};

use crate::error::BillingError;

/// Day-of-month values on which weekly storage snapshots are taken.
pub const WEEKLY_SNAPSHOT_DAYS: [u32; 4] = [7, 14, 21, 28];

/// A calendar month being billed.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct BillingPeriod {
    year: i32,
    month: u32,
}

impl BillingPeriod {
    /// Create a period, validating the month.
    ///
    /// # Errors
    ///
    /// Returns `BillingError::InvalidPeriod` if `month` is not in `1..=12`.
    pub fn new(year: i32, month: u32) -> Result<Self, BillingError> {
        if (1..=12).contains(&month) && NaiveDate::from_ymd_opt(year, month, 1).is_some() {
            Ok(Self { year, month })
        } else {
            Err(BillingError::InvalidPeriod(format!("{year}-{month}")))
        }
    }

    /// The period containing `date`.
    #[must_use]
    pub fn containing(date: NaiveDate) -> Self {
        Self {
            year: date.year(),
            month: date.month(),
        }
    }

    /// The month before the one containing `today`.
    #[must_use]
    pub fn previous_to(today: NaiveDate) -> Self {
        Self::containing(today).pred()
    }

    /// Calendar year.
    #[must_use]
    pub const fn year(&self) -> i32 {
        self.year
    }

    /// Calendar month, 1-based.
    #[must_use]
    pub const fn month(&self) -> u32 {
        self.month
    }

    /// First day of the period.
    #[must_use]
    pub fn first_day(&self) -> NaiveDate {
        NaiveDate::from_ymd_opt(self.year, self.month, 1).unwrap_or(NaiveDate::MIN)
    }

    /// First day of the following period (exclusive end).
    #[must_use]
    pub fn end_exclusive(&self) -> NaiveDate {
        self.succ().first_day()
    }

    /// Number of days in the month.
    #[must_use]
    pub fn days_in_month(&self) -> u32 {
        let days = self.end_exclusive().signed_duration_since(self.first_day()).num_days();
        u32::try_from(days).unwrap_or(30)
    }

    /// Whether `date` falls within this period.
    #[must_use]
    pub fn contains(&self, date: NaiveDate) -> bool {
        date.year() == self.year && date.month() == self.month
    }

    /// The previous month.
    #[must_use]
    pub fn pred(&self) -> Self {
        Self::containing(
            self.first_day()
                .checked_sub_months(Months::new(1))
                .unwrap_or(NaiveDate::MIN),
        )
    }

    /// The next month.
    #[must_use]
    pub fn succ(&self) -> Self {
        Self::containing(
            self.first_day()
                .checked_add_months(Months::new(1))
                .unwrap_or(NaiveDate::MAX),
        )
    }

    /// Start of the fiscal year containing this period.
    ///
    /// # Errors
    ///
    /// Returns `BillingError::InvalidPeriod` if `start_month` is not in `1..=12`.
    pub fn fiscal_year_start(&self, start_month: u32) -> Result<Self, BillingError> {
        let year = if self.month >= start_month {
            self.year
        } else {
            self.year - 1
        };
        Self::new(year, start_month)
    }

    /// Every period of this fiscal year strictly before `self`, oldest first.
    ///
    /// # Errors
    ///
    /// Returns `BillingError::InvalidPeriod` if `start_month` is not in `1..=12`.
    pub fn prior_fiscal_periods(&self, start_month: u32) -> Result<Vec<Self>, BillingError> {
        let mut periods = Vec::new();
        let mut cursor = self.fiscal_year_start(start_month)?;
        while cursor < *self {
            periods.push(cursor);
            cursor = cursor.succ();
        }
        Ok(periods)
    }

    /// `YYYYMM`, used in file names.
    #[must_use]
    pub fn compact(&self) -> String {
        format!("{}{:02}", self.year, self.month)
    }

    /// Abbreviated month name, e.g. `Jan`.
    #[must_use]
    pub fn short_month_name(&self) -> String {
        self.first_day().format("%b").to_string()
    }

    /// Long label, e.g. `January 2023`.
    #[must_use]
    pub fn long_label(&self) -> String {
        self.first_day().format("%B %Y").to_string()
    }

    /// Short label, e.g. `Jan 2023`.
    #[must_use]
    pub fn short_label(&self) -> String {
        self.first_day().format("%b %Y").to_string()
    }

    /// Day weight for a storage snapshot taken on `day` of this month.
    ///
    /// Weekly snapshots stand for seven days; any other snapshot is the
    /// month-end one and stands for the days after the 28th.
    #[must_use]
    pub fn snapshot_weight(&self, day: u32) -> u32 {
        if WEEKLY_SNAPSHOT_DAYS.contains(&day) {
            7
        } else {
            self.days_in_month().saturating_sub(28)
        }
    }

    /// Whether a storage snapshot is due on `date`.
    #[must_use]
    pub fn is_snapshot_day(date: NaiveDate) -> bool {
        let period = Self::containing(date);
        WEEKLY_SNAPSHOT_DAYS.contains(&date.day()) || date.day() == period.days_in_month()
    }
}

impl FromStr for BillingPeriod {
    type Err = BillingError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let invalid = || BillingError::InvalidPeriod(s.to_string());
        let (year, month) = s.trim().split_once('-').ok_or_else(invalid)?;
        let year = year.parse().map_err(|_| invalid())?;
        let month = month.parse().map_err(|_| invalid())?;
        Self::new(year, month).map_err(|_| invalid())
    }
}

impl fmt::Display for BillingPeriod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}-{:02}", self.year, self.month)
    }
}

impl fmt::Debug for BillingPeriod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "BillingPeriod({self})")
    }
}

impl TryFrom<String> for BillingPeriod {
    type Error = BillingError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<BillingPeriod> for String {
    fn from(period: BillingPeriod) -> Self {
        period.to_string()
    }
}
