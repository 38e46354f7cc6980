// =============================================================================
// REST API Endpoints — Axum 0.7
// =============================================================================
//
// Purely observational and administrative: `/health` is public, everything
// else requires a valid Bearer token via the `AuthBearer` extractor. None of
// these handlers ever originate a trading decision — they read a snapshot
// off `ControlState` or flip one of its pause/resume/kill flags, which the
// engine tick loop checks at the top of its next iteration.
//
// CORS is configured permissively for development; tighten `allowed_origins`
// in production.
// =============================================================================

use std::sync::Arc;

use axum::{
    extract::State,
    http::StatusCode,
    response::IntoResponse,
    routing::{get, post},
    Json, Router,
};
use serde::Serialize;
use tower_http::cors::{Any, CorsLayer};
use tracing::info;

use crate::api::auth::AuthBearer;
use crate::control::ControlState;

/// Build the full REST API router with CORS middleware and shared state.
pub fn router(state: Arc<ControlState>) -> Router {
    let cors = CorsLayer::new().allow_origin(Any).allow_methods(Any).allow_headers(Any);

    Router::new()
        .route("/health", get(health))
        .route("/state", get(full_state))
        .route("/modes", get(modes))
        .route("/decisions", get(decisions))
        .route("/control/pause", post(control_pause))
        .route("/control/resume", post(control_resume))
        .route("/control/kill", post(control_kill))
        .route("/ws", get(crate::api::ws::ws_handler))
        .layer(cors)
        .with_state(state)
}

#[derive(Serialize)]
struct HealthResponse {
    status: &'static str,
    tick_count: u64,
    uptime_secs: u64,
}

async fn health(State(state): State<Arc<ControlState>>) -> impl IntoResponse {
    let snap = state.snapshot();
    Json(HealthResponse {
        status: "ok",
        tick_count: snap.tick_count,
        uptime_secs: snap.uptime_secs,
    })
}

async fn full_state(State(state): State<Arc<ControlState>>, _auth: AuthBearer) -> impl IntoResponse {
    Json(state.snapshot())
}

async fn modes(State(state): State<Arc<ControlState>>, _auth: AuthBearer) -> impl IntoResponse {
    Json(state.modes())
}

async fn decisions(State(state): State<Arc<ControlState>>, _auth: AuthBearer) -> impl IntoResponse {
    Json(state.decisions())
}

#[derive(Serialize)]
struct ControlAck {
    ok: bool,
    paused: bool,
    kill_requested: bool,
}

fn ack(state: &ControlState) -> ControlAck {
    ControlAck {
        ok: true,
        paused: state.is_paused(),
        kill_requested: state.is_kill_requested(),
    }
}

async fn control_pause(State(state): State<Arc<ControlState>>, _auth: AuthBearer) -> impl IntoResponse {
    state.pause();
    info!("control surface: pause requested");
    (StatusCode::OK, Json(ack(&state)))
}

async fn control_resume(State(state): State<Arc<ControlState>>, _auth: AuthBearer) -> impl IntoResponse {
    state.resume();
    info!("control surface: resume requested");
    (StatusCode::OK, Json(ack(&state)))
}

async fn control_kill(State(state): State<Arc<ControlState>>, _auth: AuthBearer) -> impl IntoResponse {
    state.kill();
    info!("control surface: kill requested");
    (StatusCode::OK, Json(ack(&state)))
}
