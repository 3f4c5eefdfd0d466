// src/config/server.rs
// Server bind configuration, rate-limit defaults, and collaboration-cache bounds.

use serde::{Deserialize, Serialize};

use super::helpers::{env_opt, env_parsed_or};

/// Candidate ports tried in order when `PORT` / argv[1] is not set.
pub const PORT_FALLBACKS: [u16; 5] = [80, 3001, 8080, 8443, 9001];

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    /// Explicit port from `PORT` or argv[1]; `None` means try `PORT_FALLBACKS` in order.
    pub port: Option<u16>,
    pub host: String,
}

impl ServerConfig {
    pub fn from_env() -> Self {
        let port = std::env::args()
            .nth(1)
            .and_then(|v| v.parse().ok())
            .or_else(|| env_opt("PORT").and_then(|v| v.parse().ok()));

        Self {
            port,
            host: env_opt("A2A_HOST").unwrap_or_else(|| "0.0.0.0".to_string()),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RateLimitConfig {
    pub per_minute: u32,
    pub per_hour: u32,
    pub per_day: u32,
}

impl RateLimitConfig {
    pub fn from_env() -> Self {
        Self {
            per_minute: env_parsed_or("A2A_RATE_LIMIT_PER_MINUTE", 10),
            per_hour: env_parsed_or("A2A_RATE_LIMIT_PER_HOUR", 100),
            per_day: env_parsed_or("A2A_RATE_LIMIT_PER_DAY", 1000),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CollabMode {
    Adaptive,
    DeepDive,
}

impl CollabMode {
    fn from_env_str(v: &str) -> Self {
        match v {
            "deep_dive" | "deep-dive" => CollabMode::DeepDive,
            _ => CollabMode::Adaptive,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CollabConfig {
    pub mode: CollabMode,
    pub state_ttl_ms: i64,
    pub max_sessions: usize,
}

impl CollabConfig {
    pub fn from_env() -> Self {
        Self {
            mode: env_opt("A2A_COLLAB_MODE")
                .map(|v| CollabMode::from_env_str(&v))
                .unwrap_or(CollabMode::Adaptive),
            state_ttl_ms: env_parsed_or("A2A_COLLAB_STATE_TTL_MS", 6 * 60 * 60 * 1000),
            max_sessions: env_parsed_or("A2A_COLLAB_MAX_SESSIONS", 500),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    pub level: String,
}

impl LoggingConfig {
    pub fn from_env() -> Self {
        Self {
            level: env_opt("A2A_LOG_LEVEL").unwrap_or_else(|| "info".to_string()),
        }
    }
}
