//! JSON File Source
//!
//! Reads the three wallet data files from a directory:
//!
//! ```text
//! currencies.json       {"ok": true, "currencies": [{ "symbol": "BTC", ... }]}
//! wallet-balance.json  {"ok": true, "wallet": [{ "currency": "BTC", "amount": 1.4 }]}
//! live-rates.json       {"ok": true, "tiers": [{ "from_currency": "BTC", "to_currency": "USD", ... }]}
//! ```

use std::path::PathBuf;

use async_trait::async_trait;
use serde::Deserialize;
use serde::de::DeserializeOwned;

use super::WalletDataSource;
use crate::error::{Result, WalletError};
use crate::model::{Currency, ExchangeRateTable, WalletBalance};

pub const CURRENCIES_FILE: &str = "currencies.json";
pub const WALLET_FILE: &str = "wallet-balance.json";
pub const RATES_FILE: &str = "live-rates.json";

fn default_ok() -> bool {
    true
}

#[derive(Deserialize)]
struct CurrenciesFile {
    #[serde(default = "default_ok")]
    ok: bool,
    #[serde(default)]
    warning: String,
    currencies: Vec<Currency>,
}

#[derive(Deserialize)]
struct WalletFile {
    #[serde(default = "default_ok")]
    ok: bool,
    #[serde(default)]
    warning: String,
    wallet: Vec<WalletBalance>,
}

#[derive(Deserialize)]
struct RatesFile {
    #[serde(default = "default_ok")]
    ok: bool,
    #[serde(default)]
    warning: String,
    tiers: Vec<ExchangeRateTable>,
}

/// Data source backed by JSON files in one directory
pub struct JsonFileSource {
    dir: PathBuf,
}

impl JsonFileSource {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    async fn read<T: DeserializeOwned>(&self, file: &str) -> Result<T> {
        let path = self.dir.join(file);
        let raw = tokio::fs::read_to_string(&path).await?;
        Ok(serde_json::from_str(&raw)?)
    }
}

/// Reject envelopes the publisher flagged as failed
fn accept<T>(file: &str, ok: bool, warning: &str, records: Vec<T>) -> Result<Vec<T>> {
    if !ok {
        return Err(WalletError::DataUnavailable(format!("{file}: {warning}")));
    }
    if !warning.is_empty() {
        tracing::warn!(file, warning, "data file carries a warning");
    }
    Ok(records)
}

#[async_trait]
impl WalletDataSource for JsonFileSource {
    async fn currencies(&self) -> Result<Vec<Currency>> {
        let file: CurrenciesFile = self.read(CURRENCIES_FILE).await?;
        accept(CURRENCIES_FILE, file.ok, &file.warning, file.currencies)
    }

    async fn wallet_balances(&self) -> Result<Vec<WalletBalance>> {
        let file: WalletFile = self.read(WALLET_FILE).await?;
        accept(WALLET_FILE, file.ok, &file.warning, file.wallet)
    }

    async fn exchange_rates(&self) -> Result<Vec<ExchangeRateTable>> {
        let file: RatesFile = self.read(RATES_FILE).await?;
        accept(RATES_FILE, file.ok, &file.warning, file.tiers)
    }

    fn name(&self) -> &str {
        "JsonFiles"
    }
}
