//! # wallet-engine
//!
//! Multi-currency wallet: balances converted into a selected display currency
//! through tiered exchange rates that keep moving.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────┐
//! │                         WalletEngine                            │
//! │  ┌──────────────┐  ┌──────────────┐  ┌──────────────────────┐   │
//! │  │ resolve_rate │──│  recompute   │──│ watch<WalletSnapshot>│──►│ observers
//! │  │ (tiered)     │  │ (order-safe) │  │ (one value / update) │   │
//! │  └──────────────┘  └──────────────┘  └──────────────────────┘   │
//! └───────▲───────────────────▲─────────────────────────────────────┘
//!         │                   │ update_rate_tables
//! ┌───────┴──────────┐  ┌─────┴─────────────┐
//! │ WalletDataSource │◄─│ SimulatedRateFeed │
//! │ (Strategy)       │  │ (cancellable loop)│
//! └──────────────────┘  └───────────────────┘
//! ```
//!
//! ## Example
//!
//! ```rust,ignore
//! let source = Arc::new(InMemorySource::sample());
//! let engine = Arc::new(WalletEngine::new(source.clone()));
//! engine.initialize().await;
//! engine.set_selected_currency("EUR").await;
//!
//! let feed = SimulatedRateFeed::with_random_jitter(engine.clone(), source, FeedConfig::default());
//! feed.start().await;
//! println!("{} EUR", engine.snapshot().display_total());
//! ```

pub mod config;
pub mod decimal;
pub mod engine;
pub mod error;
pub mod feed;
pub mod model;
pub mod rates;
pub mod source;

pub use config::{FeedConfig, WalletConfig};
pub use decimal::{format_amount, scale_and_round};
pub use engine::{EnginePhase, WalletEngine, WalletSnapshot};
pub use error::{Result, WalletError};
pub use feed::{FixedJitter, RandomJitter, RateJitter, SimulatedRateFeed};
pub use model::{Currency, ExchangeRateTable, RateBand, WalletBalance, WalletItem};
pub use rates::resolve_rate;
pub use source::{InMemorySource, JsonFileSource, WalletDataSource};
