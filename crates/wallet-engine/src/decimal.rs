//! Decimal Helpers
//!
//! Fixed-point rounding and display formatting shared by every numeric output.

use rust_decimal::{Decimal, RoundingStrategy};

/// Round half away from zero to `places` fractional digits.
pub fn round_half_up(value: Decimal, places: u32) -> Decimal {
    value.round_dp_with_strategy(places, RoundingStrategy::MidpointAwayFromZero)
}

/// Round half away from zero, then strip insignificant trailing zeros.
pub fn scale_and_round(value: Decimal, places: u32) -> Decimal {
    round_half_up(value, places).normalize()
}

/// Display string for an amount: `format_amount(dec!(2.00), 2)` is `"2"`.
///
/// `Decimal`'s `Display` never switches to scientific notation.
pub fn format_amount(value: Decimal, places: u32) -> String {
    scale_and_round(value, places).to_string()
}
