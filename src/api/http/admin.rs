// src/api/http/admin.rs
// GET /api/a2a/conversations, GET /api/a2a/conversations/:id — owner-only
// dashboard endpoints. Gated by loopback origin or a matching
// `x-admin-token` header; never accepts Bearer call tokens.

use std::net::SocketAddr;

use axum::extract::{ConnectInfo, Path, Query, State};
use axum::http::HeaderMap;
use axum::Json;
use serde::Deserialize;

use crate::api::error::{ApiError, ErrorCode};
use crate::config::CONFIG;
use crate::conversation::{ConversationStatus, GetConversationOptions, ListConversationsOptions};
use crate::state::AppState;

fn require_admin(headers: &HeaderMap, addr: SocketAddr) -> Result<(), ApiError> {
    if addr.ip().is_loopback() {
        return Ok(());
    }

    let provided = headers.get("x-admin-token").and_then(|v| v.to_str().ok());

    match (&CONFIG.admin_token, provided) {
        (Some(expected), Some(actual)) if expected == actual => Ok(()),
        _ => Err(ApiError::unauthorized()),
    }
}

#[derive(Debug, Deserialize, Default)]
pub struct ListQuery {
    contact_id: Option<String>,
    status: Option<String>,
    limit: Option<i64>,
    include_messages: Option<bool>,
}

pub async fn list_conversations_handler(
    State(state): State<AppState>,
    ConnectInfo(addr): ConnectInfo<SocketAddr>,
    headers: HeaderMap,
    Query(q): Query<ListQuery>,
) -> Result<Json<serde_json::Value>, ApiError> {
    require_admin(&headers, addr)?;

    let conversations = state
        .conversations
        .list_conversations(ListConversationsOptions {
            contact_id: q.contact_id,
            status: q.status.as_deref().map(ConversationStatus::from_str),
            limit: q.limit.unwrap_or(50),
            include_messages: q.include_messages.unwrap_or(false),
        })
        .await
        .map_err(|e| {
            tracing::error!(error = %e, "failed to list conversations");
            ApiError::internal()
        })?;

    Ok(Json(serde_json::json!({ "conversations": conversations })))
}

pub async fn get_conversation_handler(
    State(state): State<AppState>,
    ConnectInfo(addr): ConnectInfo<SocketAddr>,
    headers: HeaderMap,
    Path(id): Path<String>,
) -> Result<Json<serde_json::Value>, ApiError> {
    require_admin(&headers, addr)?;

    let conversation = state
        .conversations
        .get_conversation(
            &id,
            GetConversationOptions {
                include_messages: true,
                message_limit: 200,
            },
        )
        .await
        .map_err(|e| {
            tracing::error!(error = %e, "failed to load conversation");
            ApiError::internal()
        })?;

    match conversation {
        Some(conv) => Ok(Json(serde_json::to_value(conv).unwrap_or_default())),
        None => Err(ApiError::new(ErrorCode::MissingConversationId, "conversation not found")),
    }
}
