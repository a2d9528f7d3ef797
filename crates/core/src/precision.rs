//! Decimal-exact precision helpers
//!
//! Contract metadata arrives either as decimal counts (`pricePrecision: 2`) or
//! as raw increments (`tickSize: 0.5`). Orders must be snapped to those
//! increments before they are signed. Doing that arithmetic in `f64` drifts
//! (`100.237 / 0.01` is not `10023.7`), so every step here goes through
//! `rust_decimal` and only the final value is converted back.

use rust_decimal::{Decimal, RoundingStrategy};
use std::str::FromStr;

/// Precision arithmetic errors
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum PrecisionError {
    #[error("Invalid value: {0}")]
    InvalidValue(String),
    #[error("Increment must be positive, got {0}")]
    NonPositiveIncrement(String),
    #[error("Overflow in precision arithmetic")]
    Overflow,
}

/// Convert an `f64` through its shortest round-trip representation.
///
/// `0.1_f64` becomes exactly `0.1`, not `0.1000000000000000055...`.
pub fn to_decimal(value: f64) -> Result<Decimal, PrecisionError> {
    if !value.is_finite() {
        return Err(PrecisionError::InvalidValue(value.to_string()));
    }
    Decimal::from_str(&value.to_string())
        .map_err(|_| PrecisionError::InvalidValue(value.to_string()))
}

/// Round `value` to the nearest multiple of `increment` (half away from zero).
///
/// Applying it twice yields the same value: an aligned input is a fixed point.
pub fn round_to_increment(value: f64, increment: f64) -> Result<f64, PrecisionError> {
    let increment_dec = to_decimal(increment)?;
    if increment_dec <= Decimal::ZERO {
        return Err(PrecisionError::NonPositiveIncrement(increment.to_string()));
    }
    let value_dec = to_decimal(value)?;

    let steps = value_dec
        .checked_div(increment_dec)
        .ok_or(PrecisionError::Overflow)?
        .round_dp_with_strategy(0, RoundingStrategy::MidpointAwayFromZero);
    let rounded = steps.checked_mul(increment_dec).ok_or(PrecisionError::Overflow)?;

    from_decimal(rounded)
}

/// Back to the `f64` nearest to the decimal value.
fn from_decimal(value: Decimal) -> Result<f64, PrecisionError> {
    f64::from_str(&value.normalize().to_string())
        .map_err(|_| PrecisionError::InvalidValue(value.to_string()))
}

/// Count the significant fractional digits of an increment.
///
/// Trailing zeros do not count: `0.0010` has 3 decimals, `100` has 0.
pub fn decimals_in(increment: f64) -> u32 {
    to_decimal(increment)
        .map(|d| d.normalize().scale())
        .unwrap_or(0)
}

/// `10^-decimals` as an `f64` increment.
pub fn increment_from_decimals(decimals: u32) -> f64 {
    let scale = decimals.min(28);
    from_decimal(Decimal::new(1, scale)).unwrap_or(0.0)
}

/// Render a value for the wire with at most `decimals` fractional digits.
///
/// Trailing zeros are dropped, so `100.2400` goes out as `100.24` and
/// `200.0` as `200`.
pub fn format_with_decimals(value: f64, decimals: u32) -> String {
    match to_decimal(value) {
        Ok(d) => d
            .round_dp_with_strategy(decimals.min(28), RoundingStrategy::MidpointAwayFromZero)
            .normalize()
            .to_string(),
        Err(_) => format!("{:.*}", decimals as usize, value),
    }
}
