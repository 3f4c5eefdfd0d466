// src/api/http/end.rs
// POST /api/a2a/end — concludes a conversation (optionally summarizing it)
// and best-effort notifies the owner.

use axum::extract::{Extension, State};
use axum::http::HeaderMap;
use axum::Json;

use crate::api::error::{ApiError, ErrorCode};
use crate::api::http::auth::authorize;
use crate::api::http::trace::TraceId;
use crate::api::types::{EndRequest, EndResponse};
use crate::conversation::GetConversationOptions;
use crate::external::OwnerEvent;
use crate::logging::LogFields;
use crate::state::AppState;

pub async fn end_handler(
    State(state): State<AppState>,
    Extension(trace_id): Extension<TraceId>,
    headers: HeaderMap,
    Json(req): Json<EndRequest>,
) -> Result<Json<EndResponse>, ApiError> {
    let logger = state.logger.child(LogFields {
        trace_id: Some(trace_id.0.clone()),
        ..Default::default()
    });

    let auth = authorize(&state, &logger, &headers).await?;

    let Some(conversation_id) = req.conversation_id.filter(|s| !s.trim().is_empty()) else {
        return Err(ApiError::new(ErrorCode::MissingConversationId, "conversation_id is required"));
    };

    let concluded = state
        .conversations
        .conclude_conversation(&conversation_id, Some(state.summarizer.as_ref()), None)
        .await
        .map_err(|e| {
            tracing::error!(error = %e, "failed to conclude conversation");
            ApiError::internal()
        })?;

    if !concluded {
        return Err(ApiError::new(ErrorCode::MissingConversationId, "conversation not found"));
    }

    state.activity.forget(&conversation_id);

    let summary = state
        .conversations
        .get_conversation(&conversation_id, GetConversationOptions::default())
        .await
        .ok()
        .flatten()
        .and_then(|conv| conv.summary);

    if auth.notify {
        let notifier = state.owner_notifier.clone();
        let conv_id = conversation_id.clone();
        let detail = serde_json::json!({ "token_id": auth.token_id });
        tokio::spawn(async move {
            if let Err(e) = notifier
                .notify(OwnerEvent {
                    kind: "conversation_ended",
                    conversation_id: conv_id,
                    detail,
                })
                .await
            {
                tracing::warn!(error = %e, "owner notification failed");
            }
        });
    }

    Ok(Json(EndResponse {
        success: true,
        conversation_id,
        status: "concluded",
        summary,
    }))
}
