// src/api/types.rs
// Request/response DTOs for the call lifecycle HTTP surface.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Deserialize, Default)]
pub struct RawCaller {
    pub name: Option<String>,
    pub owner: Option<String>,
    pub instance: Option<String>,
    pub context: Option<String>,
}

#[derive(Debug, Clone, Deserialize, Default)]
pub struct InvokeRequest {
    pub message: Option<serde_json::Value>,
    pub conversation_id: Option<String>,
    pub caller: Option<RawCaller>,
    pub context: Option<serde_json::Value>,
    pub timeout_seconds: Option<serde_json::Value>,
}

#[derive(Debug, Clone, Serialize)]
pub struct InvokeResponse {
    pub success: bool,
    pub conversation_id: String,
    pub response: String,
    pub can_continue: bool,
    pub tokens_remaining: Option<i64>,
}

#[derive(Debug, Clone, Deserialize, Default)]
pub struct EndRequest {
    pub conversation_id: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct EndResponse {
    pub success: bool,
    pub conversation_id: String,
    pub status: &'static str,
    pub summary: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct PingResponse {
    pub pong: bool,
    pub timestamp: i64,
}

#[derive(Debug, Clone, Serialize)]
pub struct RateLimitsView {
    pub per_minute: u32,
    pub per_hour: u32,
    pub per_day: u32,
}

#[derive(Debug, Clone, Serialize)]
pub struct StatusResponse {
    pub a2a: bool,
    pub version: &'static str,
    pub capabilities: Vec<&'static str>,
    pub rate_limits: RateLimitsView,
}
