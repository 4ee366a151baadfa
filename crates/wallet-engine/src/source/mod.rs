//! Data Sources
//!
//! Abstractions and implementations for loading wallet reference data.

mod json;
mod memory;

pub use json::JsonFileSource;
pub use memory::InMemorySource;

use async_trait::async_trait;

use crate::error::Result;
use crate::model::{Currency, ExchangeRateTable, WalletBalance};

/// Data access trait (Strategy pattern)
///
/// Implement this for each backing store: bundled JSON files, a database, a
/// remote service. Callers treat an `Err` as "no data".
#[async_trait]
pub trait WalletDataSource: Send + Sync {
    /// Currency catalog
    async fn currencies(&self) -> Result<Vec<Currency>>;

    /// Balances held in the wallet
    async fn wallet_balances(&self) -> Result<Vec<WalletBalance>>;

    /// Base tiered rate tables
    async fn exchange_rates(&self) -> Result<Vec<ExchangeRateTable>>;

    /// Source name, for logs
    fn name(&self) -> &str;
}
