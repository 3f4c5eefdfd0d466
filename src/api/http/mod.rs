// src/api/http/mod.rs
// HTTP surface: router assembly for the call lifecycle endpoints plus the
// owner-only admin dashboard endpoints.

pub mod admin;
pub mod auth;
pub mod end;
pub mod invoke;
pub mod ping;
pub mod trace;

use axum::extract::DefaultBodyLimit;
use axum::middleware;
use axum::routing::{get, post};
use axum::Router;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use crate::api::http::trace::trace_middleware;
use crate::state::AppState;

const MAX_BODY_BYTES: usize = 100 * 1024;

pub fn create_router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/api/a2a/ping", get(ping::ping_handler))
        .route("/api/a2a/status", get(ping::status_handler))
        .route("/api/a2a/invoke", post(invoke::invoke_handler))
        .route("/api/a2a/end", post(end::end_handler))
        .route("/api/a2a/conversations", get(admin::list_conversations_handler))
        .route("/api/a2a/conversations/{id}", get(admin::get_conversation_handler))
        .layer(DefaultBodyLimit::max(MAX_BODY_BYTES))
        .layer(middleware::from_fn(trace_middleware))
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(state)
}
