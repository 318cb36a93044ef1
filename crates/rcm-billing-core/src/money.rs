//! Fixed-point money helpers.
//!
//! Amounts are `rust_decimal::Decimal` dollars. A charge is quantized to the
//! cent exactly once, where it is computed; sums of quantized charges are
//! exact and never rounded again.

use rust_decimal::{Decimal, RoundingStrategy};
use serde::{Deserialize, Serialize};

/// Rounding rule applied at the cent boundary.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RoundingMode {
    /// Ties away from zero (0.125 → 0.13).
    #[default]
    HalfUp,
    /// Ties to the even cent (0.125 → 0.12).
    HalfEven,
}

impl RoundingMode {
    const fn strategy(self) -> RoundingStrategy {
        match self {
            Self::HalfUp => RoundingStrategy::MidpointAwayFromZero,
            Self::HalfEven => RoundingStrategy::MidpointNearestEven,
        }
    }
}

/// Quantize `amount` to whole cents.
#[must_use]
pub fn to_cents(amount: Decimal, mode: RoundingMode) -> Decimal {
    let mut cents = amount.round_dp_with_strategy(2, mode.strategy());
    cents.rescale(2);
    cents
}

/// Render an amount with exactly two decimals, e.g. `12.50`.
#[must_use]
pub fn format_amount(amount: Decimal) -> String {
    let mut shown = amount;
    shown.rescale(2);
    shown.to_string()
}

/// Render an amount with thousands separators, e.g. `1,234.50`.
#[must_use]
pub fn format_grouped(amount: Decimal) -> String {
    let plain = format_amount(amount.abs());
    let (whole, frac) = plain.split_once('.').unwrap_or((plain.as_str(), "00"));
    let mut grouped = String::with_capacity(whole.len() + whole.len() / 3);
    for (i, ch) in whole.chars().enumerate() {
        if i > 0 && (whole.len() - i) % 3 == 0 {
            grouped.push(',');
        }
        grouped.push(ch);
    }
    let sign = if amount.is_sign_negative() && !amount.is_zero() {
        "-"
    } else {
        ""
    };
    format!("{sign}{grouped}.{frac}")
}
