//! Liveness and status endpoints

use axum::extract::State;
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::Json;
use serde_json::json;

use crate::api::server::AppState;
use crate::models::StatusResponse;

/// Health check endpoint
pub async fn health_check() -> impl IntoResponse {
    (
        StatusCode::OK,
        Json(json!({
            "status": "healthy",
            "service": "subswitch"
        })),
    )
}

/// Current cycle state, active server and blacklist
pub async fn status(State(state): State<AppState>) -> Json<StatusResponse> {
    let controller = &state.controller;

    Json(StatusResponse {
        state: controller.state(),
        cycle_running: controller.is_running(),
        active_server: controller.active_server().map(|active| (*active).clone()),
        blacklist: controller.blacklist().snapshot(),
        uptime_secs: state.started_at.elapsed().as_secs(),
    })
}
