//! Application State

use std::sync::Arc;

use wallet_engine::{SimulatedRateFeed, WalletEngine};

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    /// Derived wallet state and commands
    pub engine: Arc<WalletEngine>,

    /// Simulated rate feed driving the engine
    pub feed: Arc<SimulatedRateFeed>,
}
