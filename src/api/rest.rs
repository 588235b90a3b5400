// =============================================================================
// REST API Endpoints — Axum 0.7
// =============================================================================
//
// Everything under `/api/v1/` is the "downstream sinks" pull interface of
// §6: `list_channels()` / `list_signals(filter)`. These are read-only
// projections over `EngineState` — nothing here touches the Outcome or
// Reputation engines directly.
// =============================================================================

use std::sync::Arc;

use axum::{
    extract::{Query, State},
    response::IntoResponse,
    routing::get,
    Json, Router,
};
use tower_http::cors::{Any, CorsLayer};

use crate::state::{EngineState, SignalFilter};

/// Build the full REST API router with permissive CORS, mirroring the
/// teacher's dashboard router shape.
pub fn router(state: Arc<EngineState>) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/api/v1/health", get(health))
        .route("/api/v1/channels", get(list_channels))
        .route("/api/v1/channels/:channel_id", get(get_channel))
        .route("/api/v1/signals", get(list_signals))
        .route("/api/v1/coins/:coin_key/cross-channel", get(cross_channel))
        .route("/api/v1/ws", get(crate::api::ws::ws_handler))
        .layer(cors)
        .with_state(state)
}

#[derive(serde::Serialize)]
struct HealthResponse {
    status: &'static str,
    state_version: u64,
    server_time: i64,
    monitored_channels: usize,
}

async fn health(State(state): State<Arc<EngineState>>) -> impl IntoResponse {
    let overview = state.build_overview();
    Json(HealthResponse {
        status: "ok",
        state_version: overview.state_version,
        server_time: chrono::Utc::now().timestamp_millis(),
        monitored_channels: overview.monitored_channels,
    })
}

/// `list_channels() -> [ChannelReputationView]` (§6).
async fn list_channels(State(state): State<Arc<EngineState>>) -> impl IntoResponse {
    Json(state.build_channels_view())
}

async fn get_channel(
    State(state): State<Arc<EngineState>>,
    axum::extract::Path(channel_id): axum::extract::Path<String>,
) -> impl IntoResponse {
    match state.build_channel_summary(&channel_id) {
        Some(summary) => Json(summary).into_response(),
        None => (axum::http::StatusCode::NOT_FOUND, "channel not found").into_response(),
    }
}

/// `list_signals(filter) -> [SignalView]` (§6). `filter` is a flattened
/// query string: `?channel_id=...&status=...&coin_key=...&limit=...`.
async fn list_signals(
    State(state): State<Arc<EngineState>>,
    Query(filter): Query<SignalFilter>,
) -> impl IntoResponse {
    Json(state.build_signals_view(&filter))
}

async fn cross_channel(
    State(state): State<Arc<EngineState>>,
    axum::extract::Path(coin_key): axum::extract::Path<String>,
) -> impl IntoResponse {
    match state.reputation.get_cross_channel(&coin_key) {
        Some(entry) => Json(entry).into_response(),
        None => (axum::http::StatusCode::NOT_FOUND, "coin not tracked cross-channel").into_response(),
    }
}
