//! HTTP/WebSocket Handlers

use axum::{
    Json,
    extract::{State, WebSocketUpgrade, ws::{Message, WebSocket}},
    http::StatusCode,
    response::Response,
};
use futures::{SinkExt, StreamExt};
use serde::{Deserialize, Serialize};

use wallet_engine::{EnginePhase, WalletSnapshot};

use crate::state::AppState;

// ============================================================================
// Request/Response Types
// ============================================================================

#[derive(Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub version: &'static str,
    pub phase: EnginePhase,
    pub data_source: String,
    pub feed_running: bool,
}

#[derive(Debug, Deserialize)]
pub struct SelectCurrencyRequest {
    pub code: String,
}

#[derive(Debug, Serialize)]
pub struct CurrenciesResponse {
    pub selected: String,
    pub available: Vec<String>,
}

#[derive(Debug, Serialize)]
pub struct FeedStatusResponse {
    pub running: bool,
    pub cycles: u64,
    pub skipped_cycles: u64,
    pub interval_ms: u64,
}

#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: String,
    pub code: String,
}

/// Frames pushed over the wallet stream
#[derive(Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum StreamFrame<'a> {
    Snapshot { data: &'a WalletSnapshot },
    Error { error: String },
}

type ApiError = (StatusCode, Json<ErrorResponse>);

fn bad_request(error: impl Into<String>, code: &str) -> ApiError {
    (
        StatusCode::BAD_REQUEST,
        Json(ErrorResponse {
            error: error.into(),
            code: code.into(),
        }),
    )
}

// ============================================================================
// Handlers
// ============================================================================

/// Health check endpoint
pub async fn health_check(State(state): State<AppState>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "healthy",
        version: env!("CARGO_PKG_VERSION"),
        phase: state.engine.phase(),
        data_source: state.engine.source_name().to_string(),
        feed_running: state.feed.is_running().await,
    })
}

/// Latest wallet snapshot
pub async fn get_wallet(State(state): State<AppState>) -> Json<WalletSnapshot> {
    Json(state.engine.snapshot())
}

/// Display currencies offered by the current rate tables
pub async fn get_currencies(State(state): State<AppState>) -> Json<CurrenciesResponse> {
    let snapshot = state.engine.snapshot();
    Json(CurrenciesResponse {
        selected: snapshot.selected_currency,
        available: snapshot.available_currencies,
    })
}

/// Select the display currency
pub async fn select_currency(
    State(state): State<AppState>,
    Json(payload): Json<SelectCurrencyRequest>,
) -> Result<Json<WalletSnapshot>, ApiError> {
    let code = payload.code.trim();
    if code.is_empty() {
        return Err(bad_request("Currency code must not be empty", "INVALID_CURRENCY"));
    }

    state.engine.set_selected_currency(code).await;
    Ok(Json(state.engine.snapshot()))
}

async fn feed_status_of(state: &AppState) -> FeedStatusResponse {
    FeedStatusResponse {
        running: state.feed.is_running().await,
        cycles: state.feed.cycles(),
        skipped_cycles: state.feed.skipped_cycles(),
        interval_ms: u64::try_from(state.feed.config().interval.as_millis()).unwrap_or(u64::MAX),
    }
}

/// Simulated feed status
pub async fn feed_status(State(state): State<AppState>) -> Json<FeedStatusResponse> {
    Json(feed_status_of(&state).await)
}

/// Start (or restart) the simulated feed
pub async fn start_feed(State(state): State<AppState>) -> Json<FeedStatusResponse> {
    state.feed.start().await;
    Json(feed_status_of(&state).await)
}

/// Stop the simulated feed
pub async fn stop_feed(State(state): State<AppState>) -> Json<FeedStatusResponse> {
    state.feed.stop().await;
    Json(feed_status_of(&state).await)
}

/// WebSocket pushing every published snapshot
pub async fn wallet_stream_handler(
    ws: WebSocketUpgrade,
    State(state): State<AppState>,
) -> Response {
    ws.on_upgrade(move |socket| handle_stream(socket, state))
}

fn encode(frame: &StreamFrame<'_>) -> Option<Message> {
    match serde_json::to_string(frame) {
        Ok(text) => Some(Message::Text(text.into())),
        Err(e) => {
            tracing::error!("Stream encoding error: {}", e);
            None
        }
    }
}

async fn handle_stream(socket: WebSocket, state: AppState) {
    let (mut sender, mut receiver) = socket.split();
    let mut updates = state.engine.subscribe();

    loop {
        // Never hold the watch borrow across an await
        let frame = {
            let snapshot = updates.borrow_and_update();
            encode(&StreamFrame::Snapshot { data: &snapshot })
        };
        let Some(frame) = frame else { break };
        if sender.send(frame).await.is_err() {
            break;
        }

        // Wait for the next publish, applying selections sent by the client
        loop {
            tokio::select! {
                changed = updates.changed() => {
                    if changed.is_err() {
                        return;
                    }
                    break;
                }
                msg = receiver.next() => match msg {
                    Some(Ok(Message::Text(text))) => {
                        match serde_json::from_str::<SelectCurrencyRequest>(&text) {
                            Ok(request) if !request.code.trim().is_empty() => {
                                state.engine.set_selected_currency(request.code.trim()).await;
                            }
                            Ok(_) => {
                                let error = StreamFrame::Error { error: "Currency code must not be empty".into() };
                                if let Some(frame) = encode(&error) {
                                    let _ = sender.send(frame).await;
                                }
                            }
                            Err(e) => {
                                let error = StreamFrame::Error { error: e.to_string() };
                                if let Some(frame) = encode(&error) {
                                    let _ = sender.send(frame).await;
                                }
                            }
                        }
                    }
                    Some(Ok(Message::Close(_))) | None => return,
                    Some(Err(e)) => {
                        tracing::warn!("WebSocket error: {}", e);
                        return;
                    }
                    Some(Ok(_)) => {}
                },
            }
        }
    }
}
