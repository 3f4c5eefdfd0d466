// src/api/http/ping.rs
// GET /ping and GET /status — unauthenticated liveness and capability probes.

use axum::extract::State;
use axum::Json;
use chrono::Utc;

use crate::api::types::{PingResponse, RateLimitsView, StatusResponse};
use crate::config::CONFIG;
use crate::state::AppState;

pub async fn ping_handler() -> Json<PingResponse> {
    Json(PingResponse {
        pong: true,
        timestamp: Utc::now().timestamp(),
    })
}

pub async fn status_handler(State(_state): State<AppState>) -> Json<StatusResponse> {
    Json(StatusResponse {
        a2a: true,
        version: env!("CARGO_PKG_VERSION"),
        capabilities: vec!["invoke", "multi-turn"],
        rate_limits: RateLimitsView {
            per_minute: CONFIG.rate_limit.per_minute,
            per_hour: CONFIG.rate_limit.per_hour,
            per_day: CONFIG.rate_limit.per_day,
        },
    })
}
