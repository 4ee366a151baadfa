//! Configuration
//!
//! Engine and feed settings, read from environment variables.

use std::path::PathBuf;
use std::time::Duration;

use rust_decimal::Decimal;
use rust_decimal_macros::dec;

use crate::engine::FALLBACK_CURRENCY;
use crate::error::{Result, WalletError};

/// Simulated rate feed settings
#[derive(Clone, Debug)]
pub struct FeedConfig {
    /// Wait between two updates
    pub interval: Duration,

    /// Lower bound of the perturbation factor (inclusive)
    pub jitter_low: Decimal,

    /// Upper bound of the perturbation factor (exclusive)
    pub jitter_high: Decimal,

    /// Fractional digits kept on perturbed rates
    pub precision: u32,
}

impl Default for FeedConfig {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(3),
            jitter_low: dec!(0.8),
            jitter_high: dec!(1.2),
            precision: 6,
        }
    }
}

impl FeedConfig {
    pub fn with_interval(mut self, interval: Duration) -> Self {
        self.interval = interval;
        self
    }
}

/// Wallet settings
#[derive(Clone, Debug)]
pub struct WalletConfig {
    /// Directory holding `currencies.json`, `wallet-balance.json` and
    /// `live-rates.json`. `None` selects the built-in sample data.
    pub data_dir: Option<PathBuf>,

    /// Display currency selected at startup
    pub default_currency: String,

    /// Start the simulated feed as soon as the engine is loaded
    pub feed_autostart: bool,

    pub feed: FeedConfig,
}

impl Default for WalletConfig {
    fn default() -> Self {
        Self {
            data_dir: None,
            default_currency: FALLBACK_CURRENCY.into(),
            feed_autostart: false,
            feed: FeedConfig::default(),
        }
    }
}

impl WalletConfig {
    /// Read `WALLET_*` environment variables, keeping defaults for unset ones
    pub fn from_env() -> Result<Self> {
        Self::from_vars(|key| std::env::var(key).ok())
    }

    /// Build from any key lookup
    pub fn from_vars<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = Self::default();

        if let Some(dir) = lookup("WALLET_DATA_DIR").filter(|d| !d.trim().is_empty()) {
            config.data_dir = Some(PathBuf::from(dir));
        }

        if let Some(code) = lookup("WALLET_DEFAULT_CURRENCY").filter(|c| !c.trim().is_empty()) {
            config.default_currency = code.trim().to_string();
        }

        if let Some(secs) = lookup("WALLET_FEED_INTERVAL_SECS") {
            let secs: u64 = secs.trim().parse().map_err(|_| {
                WalletError::Config(format!("WALLET_FEED_INTERVAL_SECS must be whole seconds, got '{secs}'"))
            })?;
            if secs == 0 {
                return Err(WalletError::Config("WALLET_FEED_INTERVAL_SECS must be positive".into()));
            }
            config.feed.interval = Duration::from_secs(secs);
        }

        if let Some(flag) = lookup("WALLET_FEED_AUTOSTART") {
            config.feed_autostart = matches!(
                flag.trim().to_ascii_lowercase().as_str(),
                "1" | "true" | "yes" | "on"
            );
        }

        Ok(config)
    }
}
