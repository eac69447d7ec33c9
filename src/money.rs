//! Normalization of monetary amounts whose unit is not carried by the schema.
//!
//! Stores hand back amounts either in major units (dollars) or in minor units
//! (cents) and nothing on the wire says which. Anything below
//! [`MINOR_UNIT_THRESHOLD`] is read as major units; everything else is read as
//! minor units. A genuine major-unit amount of 1000 or more is therefore shown
//! a hundred times too small. That is a known limitation of the heuristic and
//! is kept as-is rather than guessed around.

use serde::{Deserialize, Serialize};

/// Raw values strictly below this are taken to be major units already.
pub const MINOR_UNIT_THRESHOLD: f64 = 1000.0;
/// Minor units per major unit.
pub const MINOR_UNITS_PER_MAJOR: f64 = 100.0;

/// Canonical major-unit value for display.
pub fn to_display(raw: f64) -> f64 {
    if raw < MINOR_UNIT_THRESHOLD {
        raw
    } else {
        raw / MINOR_UNITS_PER_MAJOR
    }
}

/// Minor-unit value for submission. Form input is always major units.
///
/// `to_storage(to_display(x)) == x` does not hold for every `x`: a stored
/// value of `500` displays as `500` and is resubmitted as `50000`.
pub fn to_storage(display: f64) -> f64 {
    display * MINOR_UNITS_PER_MAJOR
}

/// An amount exactly as a store returned it, unit unknown.
#[derive(Debug, Clone, Copy, PartialEq, PartialOrd, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct MonetaryValue(f64);

impl MonetaryValue {
    pub fn from_raw(raw: f64) -> Self {
        Self(raw)
    }

    pub fn raw(&self) -> f64 {
        self.0
    }

    pub fn display(&self) -> f64 {
        to_display(self.0)
    }
}

/// Formats a major-unit amount as `$1,234.50`.
pub fn format_currency(amount: f64) -> String {
    let cents = (amount.abs() * MINOR_UNITS_PER_MAJOR).round() as u64;
    let whole = (cents / 100).to_string();
    let fraction = cents % 100;

    let mut grouped = String::with_capacity(whole.len() + whole.len() / 3);
    for (idx, ch) in whole.chars().enumerate() {
        if idx > 0 && (whole.len() - idx) % 3 == 0 {
            grouped.push(',');
        }
        grouped.push(ch);
    }

    let sign = if amount < 0.0 && cents > 0 { "-" } else { "" };
    format!("{sign}${grouped}.{fraction:02}")
}
