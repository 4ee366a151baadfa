//! wallet-server
//!
//! Axum-based server exposing the wallet engine over REST and WebSocket.
//!
//! The engine is loaded once at startup from `WALLET_DATA_DIR` (or built-in
//! sample data) and the simulated rate feed can be started and stopped
//! through the API.

mod handlers;
mod state;

use std::sync::Arc;

use axum::{Router, routing::{get, post}};
use tower_http::{
    cors::{Any, CorsLayer},
    trace::TraceLayer,
};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use wallet_engine::{
    InMemorySource, JsonFileSource, SimulatedRateFeed, WalletConfig, WalletDataSource, WalletEngine,
};

use crate::handlers::{
    feed_status, get_currencies, get_wallet, health_check, select_currency, start_feed, stop_feed,
    wallet_stream_handler,
};
use crate::state::AppState;

/// All routes, with CORS and request tracing
pub fn build_router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        // Health
        .route("/health", get(health_check))

        // Wallet
        .route("/api/wallet", get(get_wallet))
        .route("/api/wallet/stream", get(wallet_stream_handler))
        .route("/api/currencies", get(get_currencies))
        .route("/api/currency", post(select_currency))

        // Simulated feed
        .route("/api/feed", get(feed_status))
        .route("/api/feed/start", post(start_feed))
        .route("/api/feed/stop", post(stop_feed))

        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!("Failed to listen for shutdown signal: {}", e);
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(
            std::env::var("RUST_LOG").unwrap_or_else(|_| "info,tower_http=debug".into()),
        ))
        .with(tracing_subscriber::fmt::layer())
        .init();

    // Load environment
    dotenvy::dotenv().ok();
    let config = WalletConfig::from_env()?;

    // Data source
    let source: Arc<dyn WalletDataSource> = match &config.data_dir {
        Some(dir) => {
            tracing::info!("✓ Reading wallet data from {}", dir.display());
            Arc::new(JsonFileSource::new(dir))
        }
        None => {
            tracing::warn!("⚠ WALLET_DATA_DIR not set - using built-in sample data");
            Arc::new(InMemorySource::sample())
        }
    };

    // Engine
    let engine = Arc::new(WalletEngine::with_default_currency(
        source.clone(),
        config.default_currency.clone(),
    ));
    engine.initialize().await;

    let snapshot = engine.snapshot();
    tracing::info!(
        "Wallet loaded: {} items, total {} {}",
        snapshot.wallet_items.len(),
        snapshot.display_total(),
        snapshot.selected_currency
    );
    tracing::info!("  Display currencies: {}", snapshot.available_currencies.join(", "));

    // Simulated feed
    let feed = Arc::new(SimulatedRateFeed::with_random_jitter(
        engine.clone(),
        source,
        config.feed.clone(),
    ));
    if config.feed_autostart {
        feed.start().await;
    }

    let app = build_router(AppState {
        engine,
        feed: feed.clone(),
    });

    // Start server
    let addr = std::env::var("BIND_ADDR").unwrap_or_else(|_| "0.0.0.0:3000".into());
    let listener = tokio::net::TcpListener::bind(&addr).await?;

    tracing::info!("══════════════════════════════════════════════════");
    tracing::info!("wallet-server running on http://{}", addr);
    tracing::info!("══════════════════════════════════════════════════");
    tracing::info!("");
    tracing::info!("Endpoints:");
    tracing::info!("  GET  /health             - Health check");
    tracing::info!("  GET  /api/wallet         - Wallet snapshot");
    tracing::info!("  GET  /api/wallet/stream  - WebSocket snapshot stream");
    tracing::info!("  GET  /api/currencies     - Display currencies");
    tracing::info!("  POST /api/currency       - Select display currency");
    tracing::info!("  GET  /api/feed           - Feed status");
    tracing::info!("  POST /api/feed/start     - Start simulated feed");
    tracing::info!("  POST /api/feed/stop      - Stop simulated feed");
    tracing::info!("");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    feed.stop().await;
    tracing::info!("wallet-server stopped");

    Ok(())
}
