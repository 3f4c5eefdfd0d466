// src/api/error.rs
// The closed external error taxonomy for the call lifecycle HTTP surface.
// Every failure a caller can observe collapses into one of these codes;
// the specific cause (token_not_found, token_revoked, ...) is only ever
// logged, never returned.

use axum::http::{header, HeaderValue, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Serialize;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCode {
    MissingToken,
    Unauthorized,
    RateLimited,
    InvalidMessage,
    MissingMessage,
    MissingConversationId,
    InternalError,
}

impl ErrorCode {
    pub fn as_str(self) -> &'static str {
        match self {
            ErrorCode::MissingToken => "missing_token",
            ErrorCode::Unauthorized => "unauthorized",
            ErrorCode::RateLimited => "rate_limited",
            ErrorCode::InvalidMessage => "invalid_message",
            ErrorCode::MissingMessage => "missing_message",
            ErrorCode::MissingConversationId => "missing_conversation_id",
            ErrorCode::InternalError => "internal_error",
        }
    }

    fn status(self) -> StatusCode {
        match self {
            ErrorCode::MissingToken | ErrorCode::Unauthorized => StatusCode::UNAUTHORIZED,
            ErrorCode::RateLimited => StatusCode::TOO_MANY_REQUESTS,
            ErrorCode::InvalidMessage | ErrorCode::MissingMessage | ErrorCode::MissingConversationId => {
                StatusCode::BAD_REQUEST
            }
            ErrorCode::InternalError => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

#[derive(Debug)]
pub struct ApiError {
    pub code: ErrorCode,
    pub message: String,
    pub retry_after_s: Option<u64>,
}

impl ApiError {
    pub fn new(code: ErrorCode, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
            retry_after_s: None,
        }
    }

    pub fn unauthorized() -> Self {
        Self::new(ErrorCode::Unauthorized, "unauthorized")
    }

    pub fn internal() -> Self {
        Self::new(ErrorCode::InternalError, "internal error")
    }

    pub fn rate_limited(retry_after_s: u64) -> Self {
        Self {
            code: ErrorCode::RateLimited,
            message: "rate limit exceeded".to_string(),
            retry_after_s: Some(retry_after_s),
        }
    }
}

#[derive(Serialize)]
struct ErrorBody {
    success: bool,
    error: &'static str,
    message: String,
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.code.status();
        let body = ErrorBody {
            success: false,
            error: self.code.as_str(),
            message: self.message,
        };

        let mut response = (status, Json(body)).into_response();
        if let Some(secs) = self.retry_after_s {
            if let Ok(value) = HeaderValue::from_str(&secs.to_string()) {
                response.headers_mut().insert(header::RETRY_AFTER, value);
            }
        }
        response
    }
}
