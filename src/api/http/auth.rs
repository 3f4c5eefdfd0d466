// src/api/http/auth.rs
// Shared bearer-token extraction, credential validation, and rate-limit
// admission for the call lifecycle endpoints. Every failure here collapses
// to a generic external error; the specific cause is only logged.

use axum::http::HeaderMap;

use crate::api::error::{ApiError, ErrorCode};
use crate::credential::{Disclosure, Tier, ValidationResult};
use crate::logging::Logger;
use crate::ratelimit::Admission;
use crate::state::AppState;

pub struct AuthorizedCall {
    pub token_id: String,
    pub name: String,
    pub tier: Tier,
    pub capabilities: Vec<String>,
    pub allowed_topics: Vec<String>,
    pub allowed_goals: Vec<String>,
    pub disclosure: Disclosure,
    pub notify: bool,
    pub calls_remaining: Option<i64>,
}

pub fn extract_bearer(headers: &HeaderMap) -> Result<&str, ApiError> {
    let raw = headers
        .get(axum::http::header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .ok_or_else(|| ApiError::new(ErrorCode::MissingToken, "missing bearer token"))?;

    raw.strip_prefix("Bearer ")
        .filter(|t| !t.is_empty())
        .ok_or_else(|| ApiError::new(ErrorCode::MissingToken, "missing bearer token"))
}

/// Validates the bearer token against the credential store and admits it
/// against the rate limiter. Both checks must pass for a call to proceed.
pub async fn authorize(
    state: &AppState,
    logger: &Logger,
    headers: &HeaderMap,
) -> Result<AuthorizedCall, ApiError> {
    let plaintext = extract_bearer(headers)?;

    let validation = state.credentials.validate(plaintext).map_err(|e| {
        tracing::error!(error = %e, "credential store validate() failed");
        ApiError::internal()
    })?;

    let call = match validation {
        ValidationResult::Valid {
            id,
            name,
            tier,
            capabilities,
            allowed_topics,
            allowed_goals,
            disclosure,
            notify,
            calls_remaining,
            ..
        } => AuthorizedCall {
            token_id: id,
            name,
            tier,
            capabilities,
            allowed_topics,
            allowed_goals,
            disclosure,
            notify,
            calls_remaining,
        },
        ValidationResult::Invalid { error, .. } => {
            logger
                .error("auth_failed", "bearer token failed validation", Some(error), None)
                .await;
            return Err(ApiError::unauthorized());
        }
    };

    match state
        .rate_limiter
        .check_and_increment(&call.token_id, crate::utils::now_secs())
    {
        Admission::Admitted => Ok(call),
        Admission::Limited { retry_after_s } => {
            logger
                .warn("rate_limited", &format!("token {} exceeded a rate-limit window", call.token_id))
                .await;
            Err(ApiError::rate_limited(retry_after_s))
        }
    }
}
