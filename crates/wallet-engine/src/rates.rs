//! Rate Resolution
//!
//! Tiered lookup of a single conversion rate from a collection of rate tables.
//!
//! ```text
//! BTC -> USD   bands (sorted):   [≤ 1: 9194.26] [≤ 10: 9190.00] [≤ 100: 9185.50]
//!
//!   amount 0.5  ──► first band with threshold ≥ 0.5   ──► 9194.26
//!   amount 10   ──► first band with threshold ≥ 10    ──► 9190.00
//!   amount 500  ──► exceeds every band, last tier     ──► 9185.50
//! ```

use rust_decimal::Decimal;

use crate::model::{ExchangeRateTable, RateBand};

/// Resolve the rate converting `amount` of `from` into `to`.
///
/// When several tables share the pair, the last one in input order wins.
/// Returns zero when no table matches or the matching table has no bands;
/// zero is a valid "no conversion" result, not an error.
pub fn resolve_rate(tables: &[ExchangeRateTable], from: &str, to: &str, amount: Decimal) -> Decimal {
    tables
        .iter()
        .rev()
        .find(|table| table.matches(from, to))
        .map_or(Decimal::ZERO, |table| tier_rate(&table.rates, amount))
}

/// Rate of the smallest band whose threshold can hold `amount`, or of the
/// largest band when `amount` exceeds them all.
pub fn tier_rate(bands: &[RateBand], amount: Decimal) -> Decimal {
    let mut sorted: Vec<&RateBand> = bands.iter().collect();
    // Stable: bands with equal thresholds keep their published order
    sorted.sort_by(|a, b| a.amount.cmp(&b.amount));

    sorted
        .iter()
        .find(|band| band.amount >= amount)
        .or_else(|| sorted.last())
        .map_or(Decimal::ZERO, |band| band.rate)
}

/// Distinct destination currencies, in order of first appearance.
pub fn destination_currencies(tables: &[ExchangeRateTable]) -> Vec<String> {
    let mut seen = Vec::new();
    for table in tables {
        if !seen.contains(&table.to_currency) {
            seen.push(table.to_currency.clone());
        }
    }
    seen
}
