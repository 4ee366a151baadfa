//! Domain Models
//!
//! Reference data loaded from a data source, and the derived wallet items the
//! engine publishes. Uses `rust_decimal` for all amounts and rates.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::decimal::format_amount;

/// A currency in the catalog. Immutable once loaded.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Currency {
    /// Catalog identifier (e.g., "bitcoin")
    #[serde(default)]
    pub coin_id: String,

    /// Full name (e.g., "Bitcoin")
    pub name: String,

    /// Ticker symbol, the identity key (e.g., "BTC")
    pub symbol: String,

    /// Number of decimals of the smallest on-chain unit
    #[serde(default)]
    pub token_decimal: u32,

    /// Smallest-unit scale factor as published (e.g., "100000000")
    #[serde(default)]
    pub token_decimal_value: String,

    /// Fractional digits shown to the user
    pub display_decimal: u32,

    /// Icon reference
    #[serde(default)]
    pub colorful_image_url: String,
}

impl Currency {
    pub fn new(symbol: impl Into<String>, name: impl Into<String>, display_decimal: u32) -> Self {
        let symbol = symbol.into();
        Self {
            coin_id: symbol.to_lowercase(),
            name: name.into(),
            symbol,
            token_decimal: 0,
            token_decimal_value: "1".into(),
            display_decimal,
            colorful_image_url: String::new(),
        }
    }

    pub fn with_token_decimal(mut self, token_decimal: u32) -> Self {
        self.token_decimal = token_decimal;
        self.token_decimal_value = pow10(token_decimal).to_string();
        self
    }

    pub fn with_icon(mut self, url: impl Into<String>) -> Self {
        self.colorful_image_url = url.into();
        self
    }

    /// Smallest-unit scale factor.
    ///
    /// Falls back to `10^token_decimal` when the published value is missing,
    /// unparseable or zero.
    pub fn scale_factor(&self) -> Decimal {
        self.token_decimal_value
            .trim()
            .parse::<Decimal>()
            .ok()
            .filter(|v| !v.is_zero())
            .unwrap_or_else(|| pow10(self.token_decimal))
    }

    /// Convert a display amount into smallest units (e.g., BTC to satoshi)
    pub fn to_base_units(&self, amount: Decimal) -> Decimal {
        amount * self.scale_factor()
    }

    /// Convert smallest units back into a display amount
    pub fn from_base_units(&self, units: Decimal) -> Decimal {
        units / self.scale_factor()
    }
}

/// `10^exp`, saturating at `Decimal::MAX`
fn pow10(exp: u32) -> Decimal {
    (0..exp)
        .try_fold(Decimal::ONE, |acc, _| acc.checked_mul(Decimal::TEN))
        .unwrap_or(Decimal::MAX)
}

/// A raw balance held in one currency.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct WalletBalance {
    /// Currency symbol
    pub currency: String,

    /// Amount held, in display units of that currency
    pub amount: Decimal,
}

impl WalletBalance {
    pub fn new(currency: impl Into<String>, amount: Decimal) -> Self {
        Self { currency: currency.into(), amount }
    }
}

/// One tier of a rate table: `rate` applies to amounts up to `amount`.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct RateBand {
    /// Upper-bound threshold of the tier
    pub amount: Decimal,

    /// Conversion rate for the tier
    pub rate: Decimal,
}

impl RateBand {
    pub fn new(amount: Decimal, rate: Decimal) -> Self {
        Self { amount, rate }
    }
}

/// Tiered rates for one (source, destination) pair.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExchangeRateTable {
    pub from_currency: String,
    pub to_currency: String,

    /// Tiers, in whatever order the source published them
    pub rates: Vec<RateBand>,

    /// Unix seconds
    #[serde(default)]
    pub time_stamp: i64,
}

impl ExchangeRateTable {
    pub fn new(
        from_currency: impl Into<String>,
        to_currency: impl Into<String>,
        rates: Vec<RateBand>,
    ) -> Self {
        Self {
            from_currency: from_currency.into(),
            to_currency: to_currency.into(),
            rates,
            time_stamp: 0,
        }
    }

    pub fn with_time_stamp(mut self, time_stamp: i64) -> Self {
        self.time_stamp = time_stamp;
        self
    }

    pub fn matches(&self, from: &str, to: &str) -> bool {
        self.from_currency == from && self.to_currency == to
    }

    /// Publication time, if the timestamp is representable
    pub fn published_at(&self) -> Option<DateTime<Utc>> {
        DateTime::from_timestamp(self.time_stamp, 0)
    }
}

/// A balance converted into the selected display currency.
///
/// Identity across recomputations is the currency symbol.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct WalletItem {
    pub currency: Currency,

    /// Balance held, in the item's own currency
    pub balance: Decimal,

    /// Balance converted into `converted_currency`
    pub converted_amount: Decimal,

    /// Display currency the converted amount is denominated in
    pub converted_currency: String,
}

impl WalletItem {
    pub fn currency_symbol(&self) -> &str {
        &self.currency.symbol
    }

    pub fn currency_name(&self) -> &str {
        &self.currency.name
    }

    /// Symbol shown next to the converted amount
    pub fn currency_symbol_text(&self) -> &str {
        &self.converted_currency
    }

    pub fn display_decimal(&self) -> u32 {
        self.currency.display_decimal
    }

    pub fn icon_ref(&self) -> &str {
        &self.currency.colorful_image_url
    }

    /// Balance formatted with the item's own display precision
    pub fn display_balance(&self) -> String {
        format_amount(self.balance, self.display_decimal())
    }

    /// Converted amount formatted with the display currency's precision
    pub fn display_converted(&self, places: u32) -> String {
        format_amount(self.converted_amount, places)
    }
}
