//! In-Memory Source
//!
//! For testing and demo purposes. Holds records in memory and can be switched
//! into a failing state to exercise the "no data" paths.

use std::sync::RwLock;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

use async_trait::async_trait;
use rust_decimal_macros::dec;

use super::WalletDataSource;
use crate::error::{Result, WalletError};
use crate::model::{Currency, ExchangeRateTable, RateBand, WalletBalance};

/// In-memory data source
#[derive(Default)]
pub struct InMemorySource {
    currencies: Vec<Currency>,
    balances: Vec<WalletBalance>,
    rates: RwLock<Vec<ExchangeRateTable>>,
    failing: AtomicBool,
    rate_fetches: AtomicUsize,
}

impl InMemorySource {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_currencies(mut self, currencies: Vec<Currency>) -> Self {
        self.currencies = currencies;
        self
    }

    pub fn with_balances(mut self, balances: Vec<WalletBalance>) -> Self {
        self.balances = balances;
        self
    }

    pub fn with_rates(self, rates: Vec<ExchangeRateTable>) -> Self {
        self.set_rates(rates);
        self
    }

    /// Replace the base rate tables
    pub fn set_rates(&self, rates: Vec<ExchangeRateTable>) {
        let mut guard = self.rates.write().unwrap_or_else(std::sync::PoisonError::into_inner);
        *guard = rates;
    }

    /// Make every call fail with `DataUnavailable` until switched back
    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    /// Number of `exchange_rates` calls served so far, failed ones included
    pub fn rate_fetches(&self) -> usize {
        self.rate_fetches.load(Ordering::SeqCst)
    }

    fn check(&self, what: &str) -> Result<()> {
        if self.failing.load(Ordering::SeqCst) {
            return Err(WalletError::DataUnavailable(format!("{what} offline")));
        }
        Ok(())
    }

    /// A small wallet with crypto balances, USD/EUR tiers and one balance
    /// whose currency is missing from the catalog.
    pub fn sample() -> Self {
        let currencies = vec![
            Currency::new("BTC", "Bitcoin", 4)
                .with_token_decimal(8)
                .with_icon("https://static.wallet.local/coins/bitcoin.png"),
            Currency::new("ETH", "Ethereum", 4)
                .with_token_decimal(18)
                .with_icon("https://static.wallet.local/coins/ethereum.png"),
            Currency::new("CRO", "Crypto.com Chain", 2)
                .with_token_decimal(8)
                .with_icon("https://static.wallet.local/coins/cro.png"),
            Currency::new("USDC", "USD Coin", 2).with_token_decimal(6),
            Currency::new("USD", "US Dollar", 2),
            Currency::new("EUR", "Euro", 2),
        ];

        let balances = vec![
            WalletBalance::new("BTC", dec!(1.4)),
            WalletBalance::new("ETH", dec!(20.0)),
            WalletBalance::new("CRO", dec!(2590.5)),
            WalletBalance::new("USDC", dec!(1245.47)),
            WalletBalance::new("MCO", dec!(100)),
        ];

        let stamp = 1_597_368_816;
        let rates = vec![
            ExchangeRateTable::new("BTC", "USD", vec![
                RateBand::new(dec!(1000), dec!(9194.26)),
                RateBand::new(dec!(1), dec!(9200.10)),
            ])
            .with_time_stamp(stamp),
            ExchangeRateTable::new("ETH", "USD", vec![
                RateBand::new(dec!(10), dec!(380.72)),
                RateBand::new(dec!(1000), dec!(379.85)),
            ])
            .with_time_stamp(stamp),
            ExchangeRateTable::new("CRO", "USD", vec![RateBand::new(dec!(1000000), dec!(0.1514))])
                .with_time_stamp(stamp),
            ExchangeRateTable::new("USDC", "USD", vec![RateBand::new(dec!(1000000), dec!(1.0))])
                .with_time_stamp(stamp),
            ExchangeRateTable::new("BTC", "EUR", vec![RateBand::new(dec!(1000), dec!(7786.09))])
                .with_time_stamp(stamp),
            ExchangeRateTable::new("ETH", "EUR", vec![RateBand::new(dec!(1000), dec!(322.41))])
                .with_time_stamp(stamp),
            ExchangeRateTable::new("CRO", "EUR", vec![RateBand::new(dec!(1000000), dec!(0.1282))])
                .with_time_stamp(stamp),
            ExchangeRateTable::new("USDC", "EUR", vec![RateBand::new(dec!(1000000), dec!(0.8468))])
                .with_time_stamp(stamp),
        ];

        Self::new()
            .with_currencies(currencies)
            .with_balances(balances)
            .with_rates(rates)
    }
}

#[async_trait]
impl WalletDataSource for InMemorySource {
    async fn currencies(&self) -> Result<Vec<Currency>> {
        self.check("currencies")?;
        Ok(self.currencies.clone())
    }

    async fn wallet_balances(&self) -> Result<Vec<WalletBalance>> {
        self.check("wallet")?;
        Ok(self.balances.clone())
    }

    async fn exchange_rates(&self) -> Result<Vec<ExchangeRateTable>> {
        self.rate_fetches.fetch_add(1, Ordering::SeqCst);
        self.check("rates")?;
        let guard = self.rates.read().unwrap_or_else(std::sync::PoisonError::into_inner);
        Ok(guard.clone())
    }

    fn name(&self) -> &str {
        "InMemory"
    }
}
