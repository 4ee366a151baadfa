//! Error Types for the Wallet Engine

use thiserror::Error;

pub type Result<T> = std::result::Result<T, WalletError>;

/// Failures raised by data sources and configuration.
///
/// None of these reach the presentation layer: the engine turns them into
/// empty collections and the feed turns them into skipped cycles.
#[derive(Error, Debug)]
pub enum WalletError {
    #[error("Data unavailable: {0}")]
    DataUnavailable(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}
