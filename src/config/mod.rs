// src/config/mod.rs
// Central configuration for the a2a runtime.

pub mod helpers;
pub mod server;

use lazy_static::lazy_static;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

use helpers::env_opt;
pub use server::{CollabConfig, CollabMode, LoggingConfig, RateLimitConfig, ServerConfig};

lazy_static! {
    pub static ref CONFIG: A2aConfig = A2aConfig::from_env();
}

/// Main configuration structure - composes all domain configs.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct A2aConfig {
    pub server: ServerConfig,
    pub rate_limit: RateLimitConfig,
    pub collab: CollabConfig,
    pub logging: LoggingConfig,

    /// Directory holding `a2a.json`, `a2a-conversations.db`, `a2a-config.json`,
    /// `a2a-disclosure.json`. Created with mode 0700 on first use.
    pub config_dir: PathBuf,
    /// Value `x-admin-token` must match for non-loopback admin requests.
    pub admin_token: Option<String>,
}

impl A2aConfig {
    pub fn from_env() -> Self {
        dotenvy::dotenv().ok();

        let config_dir = env_opt("A2A_CONFIG_DIR")
            .or_else(|| env_opt("OPENCLAW_CONFIG_DIR"))
            .map(PathBuf::from)
            .unwrap_or_else(|| {
                dirs::home_dir()
                    .unwrap_or_else(|| PathBuf::from("."))
                    .join(".config")
                    .join("openclaw")
            });

        Self {
            server: ServerConfig::from_env(),
            rate_limit: RateLimitConfig::from_env(),
            collab: CollabConfig::from_env(),
            logging: LoggingConfig::from_env(),
            config_dir,
            admin_token: env_opt("A2A_ADMIN_TOKEN"),
        }
    }

    pub fn credential_store_path(&self) -> PathBuf {
        self.config_dir.join("a2a.json")
    }

    pub fn conversation_db_path(&self) -> PathBuf {
        self.config_dir.join("a2a-conversations.db")
    }

    pub fn tier_config_path(&self) -> PathBuf {
        self.config_dir.join("a2a-config.json")
    }

    pub fn disclosure_manifest_path(&self) -> PathBuf {
        self.config_dir.join("a2a-disclosure.json")
    }

    /// Creates the config directory if missing and locks it to owner-only
    /// access. Best-effort: a failure here surfaces later as a file-open
    /// error in whichever store touches the directory first.
    pub fn ensure_config_dir(&self) -> std::io::Result<()> {
        std::fs::create_dir_all(&self.config_dir)?;

        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            std::fs::set_permissions(&self.config_dir, std::fs::Permissions::from_mode(0o700))?;
        }

        Ok(())
    }
}

impl Default for A2aConfig {
    fn default() -> Self {
        Self::from_env()
    }
}
