// src/api/http/invoke.rs
// POST /api/a2a/invoke — the multi-turn call lifecycle endpoint: auth, rate
// limit, validation, conversation upsert, reply producer, collaboration
// state update, response.

use std::time::Duration;

use axum::extract::{Extension, State};
use axum::http::HeaderMap;
use axum::Json;
use rand::RngCore;

use crate::api::error::{ApiError, ErrorCode};
use crate::api::http::auth::authorize;
use crate::api::http::trace::TraceId;
use crate::api::types::{InvokeRequest, InvokeResponse, RawCaller};
use crate::collab::build_keyword_set;
use crate::conversation::{CollabPhase, Direction, MessageRole, NewMessage, StartConversationRequest};
use crate::external::{OwnerEvent, ReplyProducerError, SanitisedCaller};
use crate::logging::LogFields;
use crate::state::AppState;
use crate::utils::with_timeout;

const MAX_MESSAGE_CHARS: usize = 10_000;
const DEFAULT_TIMEOUT_SECS: i64 = 30;

pub async fn invoke_handler(
    State(state): State<AppState>,
    Extension(trace_id): Extension<TraceId>,
    headers: HeaderMap,
    Json(req): Json<InvokeRequest>,
) -> Result<Json<InvokeResponse>, ApiError> {
    let request_logger = state.logger.child(LogFields {
        trace_id: Some(trace_id.0.clone()),
        ..Default::default()
    });

    let auth = authorize(&state, &request_logger, &headers).await?;
    let logger = request_logger.child(LogFields {
        token_id: Some(auth.token_id.clone()),
        ..Default::default()
    });

    let message = extract_message(&req.message)?;
    let timeout_seconds = clamp_timeout(req.timeout_seconds.as_ref());
    let caller = sanitise_caller(req.caller.unwrap_or_default());

    let conversation_id = req
        .conversation_id
        .clone()
        .filter(|s| !s.trim().is_empty())
        .unwrap_or_else(synthesize_conversation_id);

    let start = state
        .conversations
        .start_conversation(StartConversationRequest {
            id: Some(conversation_id),
            contact_name: caller.name.clone(),
            token_id: Some(auth.token_id.clone()),
            direction: Direction::Inbound,
            ..Default::default()
        })
        .await
        .map_err(|e| {
            tracing::error!(error = %e, "failed to start or resume conversation");
            ApiError::internal()
        })?;

    state
        .conversations
        .add_message(
            &start.id,
            NewMessage {
                direction: Direction::Inbound,
                role: MessageRole::User,
                content: message.clone(),
                metadata: None,
            },
        )
        .await
        .map_err(|e| {
            tracing::error!(error = %e, "failed to append inbound message");
            ApiError::internal()
        })?;

    if let Err(e) = state
        .credentials
        .ensure_inbound_contact(caller.name.as_deref().unwrap_or("unknown"), &auth.token_id)
    {
        tracing::warn!(error = %e, "failed to record inbound contact");
    }

    state.activity.record(&start.id, caller.name.as_deref());

    let timeout = Duration::from_secs(timeout_seconds);
    let reply = match with_timeout(
        timeout,
        state
            .reply_producer
            .reply(&start.id, &message, &caller, req.context.as_ref(), timeout),
    )
    .await
    {
        Ok(Ok(text)) => text,
        Ok(Err(ReplyProducerError::Timeout)) | Err(_) => {
            logger
                .error("reply_producer_timeout", "reply producer timed out", Some("internal_error"), None)
                .await;
            return Err(ApiError::internal());
        }
        Ok(Err(ReplyProducerError::Failed(msg))) => {
            logger
                .error("reply_producer_failed", &msg, Some("internal_error"), None)
                .await;
            return Err(ApiError::internal());
        }
    };

    let keywords = build_keyword_set(&auth.allowed_topics, &auth.allowed_goals);
    let current_collab = match state.collab.get(&start.id) {
        Some(cached) => Some(cached),
        None => state
            .conversations
            .load_collab_state(&start.id)
            .await
            .unwrap_or_else(|e| {
                tracing::error!(error = %e, "failed to load collaboration state");
                None
            }),
    }
    .unwrap_or_default();

    let (updated_collab, cleaned_reply) = state
        .collab
        .update_turn(current_collab, &message, &reply, &keywords);

    state
        .conversations
        .add_message(
            &start.id,
            NewMessage {
                direction: Direction::Outbound,
                role: MessageRole::Assistant,
                content: cleaned_reply.clone(),
                metadata: None,
            },
        )
        .await
        .map_err(|e| {
            tracing::error!(error = %e, "failed to append outbound message");
            ApiError::internal()
        })?;

    state.collab.put(&start.id, updated_collab.clone());
    if let Err(e) = state.conversations.save_collab_state(&start.id, &updated_collab).await {
        tracing::error!(error = %e, "failed to persist collaboration state");
    }

    if auth.notify {
        dispatch_owner_notification(&state, &start.id, &auth.token_id, updated_collab.phase);
    }

    let response = InvokeResponse {
        success: true,
        conversation_id: start.id,
        response: cleaned_reply,
        can_continue: updated_collab.phase != CollabPhase::Close,
        tokens_remaining: auth.calls_remaining,
    };

    Ok(Json(response))
}

fn extract_message(raw: &Option<serde_json::Value>) -> Result<String, ApiError> {
    match raw {
        None | Some(serde_json::Value::Null) => Err(ApiError::new(ErrorCode::MissingMessage, "message is required")),
        Some(serde_json::Value::String(s)) if s.trim().is_empty() => {
            Err(ApiError::new(ErrorCode::MissingMessage, "message is required"))
        }
        Some(serde_json::Value::String(s)) if s.chars().count() > MAX_MESSAGE_CHARS => Err(ApiError::new(
            ErrorCode::InvalidMessage,
            format!("message exceeds {MAX_MESSAGE_CHARS} characters"),
        )),
        Some(serde_json::Value::String(s)) => Ok(s.clone()),
        Some(_) => Err(ApiError::new(ErrorCode::InvalidMessage, "message must be a string")),
    }
}

fn clamp_timeout(raw: Option<&serde_json::Value>) -> u64 {
    let parsed = match raw {
        Some(serde_json::Value::Number(n)) => n.as_i64(),
        Some(serde_json::Value::String(s)) => s.trim().parse::<i64>().ok(),
        _ => None,
    }
    .unwrap_or(DEFAULT_TIMEOUT_SECS);

    parsed.clamp(5, 300) as u64
}

/// Forwards only the whitelisted caller fields, length-capped; everything
/// else the body sent under `caller` is dropped on the floor.
pub fn sanitise_caller(raw: RawCaller) -> SanitisedCaller {
    SanitisedCaller {
        name: raw.name.map(|s| truncate_chars(&s, 100)),
        owner: raw.owner.map(|s| truncate_chars(&s, 100)),
        instance: raw.instance.map(|s| truncate_chars(&s, 200)),
        context: raw.context.map(|s| truncate_chars(&s, 500)),
    }
}

fn truncate_chars(s: &str, max_chars: usize) -> String {
    s.chars().take(max_chars).collect()
}

fn synthesize_conversation_id() -> String {
    let mut bytes = [0u8; 6];
    rand::rng().fill_bytes(&mut bytes);
    let hex: String = bytes.iter().map(|b| format!("{b:02x}")).collect();
    format!("conv_{}_{}", chrono::Utc::now().timestamp_millis(), hex)
}

fn dispatch_owner_notification(state: &AppState, conversation_id: &str, token_id: &str, phase: CollabPhase) {
    let notifier = state.owner_notifier.clone();
    let conversation_id = conversation_id.to_string();
    let detail = serde_json::json!({ "token_id": token_id, "phase": phase.as_str() });

    tokio::spawn(async move {
        if let Err(e) = notifier
            .notify(OwnerEvent {
                kind: "invoke",
                conversation_id,
                detail,
            })
            .await
        {
            tracing::warn!(error = %e, "owner notification failed");
        }
    });
}
