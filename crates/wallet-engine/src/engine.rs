//! Derived-State Engine
//!
//! Owns the selected display currency, the active rate tables and the wallet
//! items derived from them. Every mutation runs under one lock and ends with a
//! single published [`WalletSnapshot`], so observers never see items from one
//! rate table next to a total from another.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::Serialize;
use tokio::sync::{Mutex, watch};

use crate::decimal::format_amount;
use crate::model::{Currency, ExchangeRateTable, WalletBalance, WalletItem};
use crate::rates::{destination_currencies, resolve_rate};
use crate::source::WalletDataSource;

/// Display currency used when nothing else is available
pub const FALLBACK_CURRENCY: &str = "USD";

/// Precision for a display currency missing from the catalog
pub const DEFAULT_DISPLAY_DECIMAL: u32 = 2;

/// Engine lifecycle
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum EnginePhase {
    Uninitialized,
    Loaded,
    Recomputing,
}

/// Everything the presentation layer observes, published as one value
#[derive(Clone, Debug, Serialize)]
pub struct WalletSnapshot {
    pub selected_currency: String,

    /// Distinct destination currencies of the active rate tables
    pub available_currencies: Vec<String>,

    /// Items in first-build order
    pub wallet_items: Vec<WalletItem>,

    /// Exact sum of `wallet_items[..].converted_amount`, saturating on overflow
    pub total_balance: Decimal,

    /// Catalog precision of the selected currency
    pub display_decimal: u32,

    /// Incremented on every publish
    pub revision: u64,

    pub updated_at: DateTime<Utc>,
}

impl WalletSnapshot {
    fn empty(selected_currency: String) -> Self {
        Self {
            selected_currency,
            available_currencies: Vec::new(),
            wallet_items: Vec::new(),
            total_balance: Decimal::ZERO,
            display_decimal: DEFAULT_DISPLAY_DECIMAL,
            revision: 0,
            updated_at: Utc::now(),
        }
    }

    /// Total formatted with the selected currency's precision
    pub fn display_total(&self) -> String {
        format_amount(self.total_balance, self.display_decimal)
    }

    pub fn item(&self, symbol: &str) -> Option<&WalletItem> {
        self.wallet_items.iter().find(|item| item.currency_symbol() == symbol)
    }

    pub fn symbols(&self) -> Vec<&str> {
        self.wallet_items.iter().map(WalletItem::currency_symbol).collect()
    }
}

/// `amount × rate`, or zero when the product does not fit a `Decimal`
fn convert(amount: Decimal, rate: Decimal, from: &str, to: &str) -> Decimal {
    amount.checked_mul(rate).unwrap_or_else(|| {
        tracing::warn!(%from, %to, %amount, %rate, "converted amount overflows, using zero");
        Decimal::ZERO
    })
}

/// Mutable engine state, only touched with the lock held
struct EngineState {
    catalog: Vec<Currency>,
    balances: Vec<WalletBalance>,
    rate_tables: Vec<ExchangeRateTable>,
    selected_currency: String,
    available_currencies: Vec<String>,
    wallet_items: Vec<WalletItem>,
    total_balance: Decimal,
    revision: u64,
}

impl EngineState {
    fn new(selected_currency: String) -> Self {
        Self {
            catalog: Vec::new(),
            balances: Vec::new(),
            rate_tables: Vec::new(),
            selected_currency,
            available_currencies: Vec::new(),
            wallet_items: Vec::new(),
            total_balance: Decimal::ZERO,
            revision: 0,
        }
    }

    fn display_decimal(&self) -> u32 {
        self.catalog
            .iter()
            .find(|c| c.symbol == self.selected_currency)
            .map_or(DEFAULT_DISPLAY_DECIMAL, |c| c.display_decimal)
    }

    fn snapshot(&self) -> WalletSnapshot {
        WalletSnapshot {
            selected_currency: self.selected_currency.clone(),
            available_currencies: self.available_currencies.clone(),
            wallet_items: self.wallet_items.clone(),
            total_balance: self.total_balance,
            display_decimal: self.display_decimal(),
            revision: self.revision,
            updated_at: Utc::now(),
        }
    }

    /// Replace the tables and keep the selected currency inside the new
    /// destination set.
    fn apply_rate_tables(&mut self, tables: Vec<ExchangeRateTable>) {
        self.available_currencies = destination_currencies(&tables);
        self.rate_tables = tables;

        if !self.available_currencies.contains(&self.selected_currency) {
            let next = self
                .available_currencies
                .first()
                .cloned()
                .unwrap_or_else(|| FALLBACK_CURRENCY.to_string());
            if next != self.selected_currency {
                tracing::info!(
                    from = %self.selected_currency,
                    to = %next,
                    "selected currency not offered by rate tables, reassigning"
                );
                self.selected_currency = next;
            }
        }
    }

    /// Rebuild converted amounts and the total.
    ///
    /// The first build (no items yet) resolves balances against the catalog;
    /// later builds keep the existing items and only refresh their amounts.
    fn recompute(&mut self) {
        if self.wallet_items.is_empty() {
            self.build_items();
        } else {
            for item in &mut self.wallet_items {
                let rate = resolve_rate(
                    &self.rate_tables,
                    &item.currency.symbol,
                    &self.selected_currency,
                    item.balance,
                );
                item.converted_amount = convert(item.balance, rate, &item.currency.symbol, &self.selected_currency);
                item.converted_currency.clone_from(&self.selected_currency);
            }
        }

        self.total_balance = self
            .wallet_items
            .iter()
            .try_fold(Decimal::ZERO, |acc, item| acc.checked_add(item.converted_amount))
            .unwrap_or_else(|| {
                tracing::warn!(selected = %self.selected_currency, "wallet total overflows, saturating");
                self.wallet_items
                    .iter()
                    .fold(Decimal::ZERO, |acc, item| acc.saturating_add(item.converted_amount))
            });
        self.revision += 1;

        tracing::debug!(
            selected = %self.selected_currency,
            items = self.wallet_items.len(),
            total = %self.total_balance,
            revision = self.revision,
            "wallet recomputed"
        );
    }

    fn build_items(&mut self) {
        let mut items = Vec::with_capacity(self.balances.len());

        for balance in &self.balances {
            let Some(currency) = self.catalog.iter().find(|c| c.symbol == balance.currency) else {
                tracing::warn!(symbol = %balance.currency, "balance references unknown currency, dropped");
                continue;
            };

            let rate = resolve_rate(&self.rate_tables, &balance.currency, &self.selected_currency, balance.amount);
            if rate.is_zero() {
                tracing::debug!(
                    from = %balance.currency,
                    to = %self.selected_currency,
                    "no applicable rate, converting to zero"
                );
            }

            items.push(WalletItem {
                currency: currency.clone(),
                balance: balance.amount,
                converted_amount: convert(balance.amount, rate, &balance.currency, &self.selected_currency),
                converted_currency: self.selected_currency.clone(),
            });
        }

        self.wallet_items = items;
    }
}

/// The wallet engine.
///
/// Cheap to share behind an `Arc`; commands from any task are applied one at a
/// time, in the order they acquire the lock (tokio's mutex is fair).
pub struct WalletEngine {
    source: Arc<dyn WalletDataSource>,
    state: Mutex<EngineState>,
    snapshot: watch::Sender<WalletSnapshot>,
    phase: watch::Sender<EnginePhase>,
}

impl WalletEngine {
    pub fn new(source: Arc<dyn WalletDataSource>) -> Self {
        Self::with_default_currency(source, FALLBACK_CURRENCY)
    }

    pub fn with_default_currency(source: Arc<dyn WalletDataSource>, currency: impl Into<String>) -> Self {
        let currency = currency.into();
        let (snapshot, _) = watch::channel(WalletSnapshot::empty(currency.clone()));
        let (phase, _) = watch::channel(EnginePhase::Uninitialized);

        Self {
            source,
            state: Mutex::new(EngineState::new(currency)),
            snapshot,
            phase,
        }
    }

    /// Load catalog, balances and rate tables, then build the wallet.
    ///
    /// A failing source yields empty collections; the engine still ends up
    /// `Loaded`. Calling this again reloads and rebuilds from scratch.
    pub async fn initialize(&self) {
        let (catalog, balances, tables) = tokio::join!(
            self.source.currencies(),
            self.source.wallet_balances(),
            self.source.exchange_rates(),
        );
        let catalog = self.or_empty("currencies", catalog);
        let balances = self.or_empty("wallet balances", balances);
        let tables = self.or_empty("exchange rates", tables);

        tracing::info!(
            source = self.source.name(),
            currencies = catalog.len(),
            balances = balances.len(),
            tables = tables.len(),
            "wallet data loaded"
        );

        let mut state = self.state.lock().await;
        state.catalog = catalog;
        state.balances = balances;
        state.wallet_items.clear();
        state.apply_rate_tables(tables);
        self.recompute_and_publish(&mut state);
    }

    /// Select the display currency, even one no table converts into yet
    pub async fn set_selected_currency(&self, code: impl Into<String>) {
        let code = code.into();
        let mut state = self.state.lock().await;
        tracing::debug!(currency = %code, "display currency selected");
        state.selected_currency = code;
        self.recompute_and_publish(&mut state);
    }

    /// Replace the active rate tables
    pub async fn update_rate_tables(&self, tables: Vec<ExchangeRateTable>) {
        let mut state = self.state.lock().await;
        state.apply_rate_tables(tables);
        self.recompute_and_publish(&mut state);
    }

    /// Rebuild derived state from the current inputs
    pub async fn recompute(&self) {
        let mut state = self.state.lock().await;
        self.recompute_and_publish(&mut state);
    }

    /// Synchronous critical section: no await between first write and publish
    fn recompute_and_publish(&self, state: &mut EngineState) {
        self.phase.send_replace(EnginePhase::Recomputing);
        state.recompute();
        self.snapshot.send_replace(state.snapshot());
        self.phase.send_replace(EnginePhase::Loaded);
    }

    fn or_empty<T>(&self, what: &str, result: crate::Result<Vec<T>>) -> Vec<T> {
        result.unwrap_or_else(|e| {
            tracing::warn!(source = self.source.name(), error = %e, "{what} unavailable, using empty set");
            Vec::new()
        })
    }

    pub fn phase(&self) -> EnginePhase {
        *self.phase.borrow()
    }

    /// Latest published state
    pub fn snapshot(&self) -> WalletSnapshot {
        self.snapshot.borrow().clone()
    }

    /// Receiver that is notified on every publish
    pub fn subscribe(&self) -> watch::Receiver<WalletSnapshot> {
        self.snapshot.subscribe()
    }

    pub fn selected_currency(&self) -> String {
        self.snapshot.borrow().selected_currency.clone()
    }

    pub fn available_currencies(&self) -> Vec<String> {
        self.snapshot.borrow().available_currencies.clone()
    }

    pub fn wallet_items(&self) -> Vec<WalletItem> {
        self.snapshot.borrow().wallet_items.clone()
    }

    pub fn total_balance(&self) -> Decimal {
        self.snapshot.borrow().total_balance
    }

    /// Active rate tables
    pub async fn rate_tables(&self) -> Vec<ExchangeRateTable> {
        self.state.lock().await.rate_tables.clone()
    }

    pub fn source_name(&self) -> &str {
        self.source.name()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::RateBand;
    use crate::source::InMemorySource;
    use rust_decimal_macros::dec;

    fn usd_wallet() -> InMemorySource {
        InMemorySource::new()
            .with_currencies(vec![Currency::new("USD", "US Dollar", 2)])
            .with_balances(vec![WalletBalance::new("USD", dec!(100))])
            .with_rates(vec![ExchangeRateTable::new(
                "USD",
                "EUR",
                vec![RateBand::new(dec!(1000), dec!(0.5))],
            )])
    }

    fn three_coins() -> InMemorySource {
        InMemorySource::new()
            .with_currencies(vec![
                Currency::new("BTC", "Bitcoin", 4),
                Currency::new("ETH", "Ethereum", 4),
                Currency::new("CRO", "Crypto.com Chain", 2),
                Currency::new("USD", "US Dollar", 2),
            ])
            .with_balances(vec![
                WalletBalance::new("BTC", dec!(2)),
                WalletBalance::new("ETH", dec!(10)),
                WalletBalance::new("CRO", dec!(1000)),
            ])
            .with_rates(vec![
                ExchangeRateTable::new("BTC", "USD", vec![RateBand::new(dec!(100), dec!(10000))]),
                ExchangeRateTable::new("ETH", "USD", vec![RateBand::new(dec!(100), dec!(300))]),
                ExchangeRateTable::new("CRO", "USD", vec![RateBand::new(dec!(100000), dec!(0.1))]),
            ])
    }

    #[tokio::test]
    async fn test_uninitialized_engine() {
        let engine = WalletEngine::new(Arc::new(usd_wallet()));
        assert_eq!(engine.phase(), EnginePhase::Uninitialized);
        assert_eq!(engine.selected_currency(), "USD");
        assert!(engine.wallet_items().is_empty());
        assert_eq!(engine.snapshot().revision, 0);
    }

    #[tokio::test]
    async fn test_single_balance_conversion() {
        let engine = WalletEngine::new(Arc::new(usd_wallet()));
        engine.initialize().await;
        engine.set_selected_currency("EUR").await;

        let snapshot = engine.snapshot();
        assert_eq!(engine.phase(), EnginePhase::Loaded);
        assert_eq!(snapshot.wallet_items.len(), 1);
        assert_eq!(snapshot.wallet_items[0].converted_amount, dec!(50.00));
        assert_eq!(snapshot.total_balance, dec!(50.00));
        assert_eq!(snapshot.display_total(), "50");
    }

    #[tokio::test]
    async fn test_initialize_reassigns_unavailable_currency() {
        let engine = WalletEngine::new(Arc::new(usd_wallet()));
        engine.initialize().await;

        // USD is not a destination of any table, EUR is the only one
        assert_eq!(engine.selected_currency(), "EUR");
        assert_eq!(engine.available_currencies(), vec!["EUR"]);
        assert_eq!(engine.total_balance(), dec!(50.0));
    }

    #[tokio::test]
    async fn test_unknown_currency_selected_converts_to_zero() {
        let engine = WalletEngine::new(Arc::new(three_coins()));
        engine.initialize().await;
        engine.set_selected_currency("JPY").await;

        let snapshot = engine.snapshot();
        assert_eq!(snapshot.selected_currency, "JPY");
        assert_eq!(snapshot.symbols(), vec!["BTC", "ETH", "CRO"]);
        assert!(snapshot.wallet_items.iter().all(|i| i.converted_amount.is_zero()));
        assert_eq!(snapshot.total_balance, Decimal::ZERO);
        assert_eq!(snapshot.display_decimal, DEFAULT_DISPLAY_DECIMAL);
    }

    #[tokio::test]
    async fn test_order_survives_table_replacement() {
        let engine = WalletEngine::new(Arc::new(three_coins()));
        engine.initialize().await;
        let first = engine.snapshot();
        assert_eq!(first.symbols(), vec!["BTC", "ETH", "CRO"]);
        assert_eq!(first.total_balance, dec!(23100));

        // Fully replaced tables, listed in a different order
        engine
            .update_rate_tables(vec![
                ExchangeRateTable::new("CRO", "USD", vec![RateBand::new(dec!(100000), dec!(0.2))]),
                ExchangeRateTable::new("ETH", "USD", vec![RateBand::new(dec!(100), dec!(400))]),
            ])
            .await;

        let second = engine.snapshot();
        assert_eq!(second.symbols(), vec!["BTC", "ETH", "CRO"]);
        assert_eq!(second.item("BTC").unwrap().converted_amount, Decimal::ZERO);
        assert_eq!(second.item("ETH").unwrap().converted_amount, dec!(4000));
        assert_eq!(second.item("CRO").unwrap().converted_amount, dec!(200));
        assert_eq!(second.total_balance, dec!(4200));
        assert_eq!(second.item("BTC").unwrap().balance, dec!(2));
        assert!(second.revision > first.revision);
    }

    #[tokio::test]
    async fn test_available_currencies_follow_tables() {
        let engine = WalletEngine::new(Arc::new(three_coins()));
        engine.initialize().await;
        engine.set_selected_currency("USD").await;

        engine
            .update_rate_tables(vec![
                ExchangeRateTable::new("BTC", "EUR", vec![RateBand::new(dec!(100), dec!(9000))]),
                ExchangeRateTable::new("BTC", "GBP", vec![RateBand::new(dec!(100), dec!(8000))]),
                ExchangeRateTable::new("ETH", "EUR", vec![RateBand::new(dec!(100), dec!(250))]),
            ])
            .await;

        let snapshot = engine.snapshot();
        assert_eq!(snapshot.available_currencies, vec!["EUR", "GBP"]);
        assert_eq!(snapshot.selected_currency, "EUR");
        assert_eq!(snapshot.total_balance, dec!(20500));

        engine.update_rate_tables(Vec::new()).await;
        let snapshot = engine.snapshot();
        assert!(snapshot.available_currencies.is_empty());
        assert_eq!(snapshot.selected_currency, FALLBACK_CURRENCY);
        assert_eq!(snapshot.total_balance, Decimal::ZERO);
    }

    #[tokio::test]
    async fn test_selected_currency_kept_when_still_available() {
        let engine = WalletEngine::new(Arc::new(InMemorySource::sample()));
        engine.initialize().await;
        engine.set_selected_currency("EUR").await;

        let tables = engine.rate_tables().await;
        engine.update_rate_tables(tables).await;
        assert_eq!(engine.selected_currency(), "EUR");
    }

    #[tokio::test]
    async fn test_unknown_balance_dropped_permanently() {
        let engine = WalletEngine::new(Arc::new(InMemorySource::sample()));
        engine.initialize().await;

        let snapshot = engine.snapshot();
        assert!(snapshot.item("MCO").is_none());
        assert_eq!(snapshot.symbols(), vec!["BTC", "ETH", "CRO", "USDC"]);

        engine
            .update_rate_tables(vec![ExchangeRateTable::new(
                "MCO",
                "USD",
                vec![RateBand::new(dec!(1000), dec!(3.5))],
            )])
            .await;
        assert!(engine.snapshot().item("MCO").is_none());
    }

    #[tokio::test]
    async fn test_failing_source_loads_empty() {
        let source = InMemorySource::sample();
        source.set_failing(true);
        let engine = WalletEngine::new(Arc::new(source));
        engine.initialize().await;

        let snapshot = engine.snapshot();
        assert_eq!(engine.phase(), EnginePhase::Loaded);
        assert!(snapshot.wallet_items.is_empty());
        assert!(snapshot.available_currencies.is_empty());
        assert_eq!(snapshot.selected_currency, FALLBACK_CURRENCY);
        assert_eq!(snapshot.total_balance, Decimal::ZERO);
    }

    #[tokio::test]
    async fn test_total_is_exact_sum() {
        let engine = WalletEngine::new(Arc::new(InMemorySource::sample()));
        engine.initialize().await;

        let snapshot = engine.snapshot();
        let sum: Decimal = snapshot.wallet_items.iter().map(|i| i.converted_amount).sum();
        assert_eq!(snapshot.total_balance, sum);
        // BTC 1.4 falls in the 1000 tier, ETH 20 in the 1000 tier
        assert_eq!(
            snapshot.item("BTC").unwrap().converted_amount,
            dec!(1.4) * dec!(9194.26)
        );
        assert_eq!(
            snapshot.item("ETH").unwrap().converted_amount,
            dec!(20.0) * dec!(379.85)
        );
    }

    #[tokio::test]
    async fn test_subscribers_see_each_publish() {
        let engine = WalletEngine::new(Arc::new(three_coins()));
        let mut rx = engine.subscribe();

        engine.initialize().await;
        assert!(rx.has_changed().unwrap());
        let seen = rx.borrow_and_update().clone();
        assert_eq!(seen.total_balance, dec!(23100));
        assert_eq!(seen.revision, 1);

        engine.set_selected_currency("EUR").await;
        rx.changed().await.unwrap();
        let seen = rx.borrow_and_update().clone();
        assert_eq!(seen.selected_currency, "EUR");
        assert_eq!(seen.total_balance, Decimal::ZERO);
        assert_eq!(seen.revision, 2);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_updates_stay_consistent() {
        let engine = Arc::new(WalletEngine::new(Arc::new(three_coins())));
        engine.initialize().await;

        let mut tasks = Vec::new();
        for i in 1..=20u32 {
            let engine = engine.clone();
            tasks.push(tokio::spawn(async move {
                let rate = Decimal::from(i);
                engine
                    .update_rate_tables(vec![
                        ExchangeRateTable::new("BTC", "USD", vec![RateBand::new(dec!(100), rate)]),
                        ExchangeRateTable::new("ETH", "USD", vec![RateBand::new(dec!(100), rate)]),
                        ExchangeRateTable::new("CRO", "USD", vec![RateBand::new(dec!(100000), rate)]),
                    ])
                    .await;
            }));
        }
        for task in tasks {
            task.await.unwrap();
        }

        let snapshot = engine.snapshot();
        let rate = snapshot.item("BTC").unwrap().converted_amount / dec!(2);
        // Every item reflects the same table and the total matches them
        assert_eq!(snapshot.item("ETH").unwrap().converted_amount, dec!(10) * rate);
        assert_eq!(snapshot.item("CRO").unwrap().converted_amount, dec!(1000) * rate);
        assert_eq!(snapshot.total_balance, dec!(1012) * rate);
        assert_eq!(snapshot.revision, 21);
    }

    #[tokio::test]
    async fn test_overflowing_conversion_is_zero() {
        let source = InMemorySource::new()
            .with_currencies(vec![Currency::new("BTC", "Bitcoin", 4), Currency::new("ETH", "Ethereum", 4)])
            .with_balances(vec![
                WalletBalance::new("BTC", Decimal::from(10_000_000_000_000_000_000_u64)),
                WalletBalance::new("ETH", dec!(2)),
            ])
            .with_rates(vec![
                ExchangeRateTable::new("BTC", "USD", vec![RateBand::new(dec!(100), dec!(10000000000))]),
                ExchangeRateTable::new("ETH", "USD", vec![RateBand::new(dec!(100), dec!(300))]),
            ]);
        let engine = Arc::new(WalletEngine::new(Arc::new(source)));

        let task = engine.clone();
        tokio::spawn(async move { task.initialize().await }).await.unwrap();

        let snapshot = engine.snapshot();
        assert_eq!(engine.phase(), EnginePhase::Loaded);
        assert_eq!(snapshot.revision, 1);
        assert_eq!(snapshot.item("BTC").unwrap().converted_amount, Decimal::ZERO);
        assert_eq!(snapshot.total_balance, dec!(600));

        // Later updates still go through
        engine
            .update_rate_tables(vec![ExchangeRateTable::new("BTC", "USD", vec![RateBand::new(dec!(100), dec!(1))])])
            .await;
        let snapshot = engine.snapshot();
        assert_eq!(snapshot.revision, 2);
        assert_eq!(snapshot.total_balance, Decimal::from(10_000_000_000_000_000_000_u64));
    }

    #[tokio::test]
    async fn test_overflowing_total_saturates() {
        let half = Decimal::from_i128_with_scale(5 * 10_i128.pow(28), 0);
        let source = InMemorySource::new()
            .with_currencies(vec![Currency::new("AAA", "A", 2), Currency::new("BBB", "B", 2)])
            .with_balances(vec![WalletBalance::new("AAA", half), WalletBalance::new("BBB", half)])
            .with_rates(vec![
                ExchangeRateTable::new("AAA", "USD", vec![RateBand::new(Decimal::MAX, dec!(1))]),
                ExchangeRateTable::new("BBB", "USD", vec![RateBand::new(Decimal::MAX, dec!(1))]),
            ]);
        let engine = WalletEngine::new(Arc::new(source));
        engine.initialize().await;

        let snapshot = engine.snapshot();
        assert_eq!(snapshot.item("AAA").unwrap().converted_amount, half);
        assert_eq!(snapshot.total_balance, Decimal::MAX);
    }
}
