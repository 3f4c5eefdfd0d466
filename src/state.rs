// src/state.rs
// Application state shared across every HTTP handler.

use anyhow::Result;
use std::sync::Arc;
use tracing::info;

use crate::collab::CollaborationEngine;
use crate::config::CONFIG;
use crate::conversation::ConversationStore;
use crate::credential::CredentialStore;
use crate::external::{EchoReplyProducer, NoopSummarizer, NullOwnerNotifier, OwnerNotifier, ReplyProducer, Summarizer};
use crate::logging::{LogStore, Logger};
use crate::ratelimit::{RateLimiter, RateLimits};
use crate::watchdog::{ActivityTracker, IdleWatchdog, WatchdogConfig};

/// Application state shared across handlers.
#[derive(Clone)]
pub struct AppState {
    pub credentials: Arc<CredentialStore>,
    pub conversations: Arc<ConversationStore>,
    pub collab: Arc<CollaborationEngine>,
    pub rate_limiter: Arc<RateLimiter>,
    pub logger: Logger,
    pub watchdog: Arc<IdleWatchdog>,
    pub activity: Arc<ActivityTracker>,
    pub reply_producer: Arc<dyn ReplyProducer>,
    pub summarizer: Arc<dyn Summarizer>,
    pub owner_notifier: Arc<dyn OwnerNotifier>,
}

impl AppState {
    /// Opens the credential and conversation stores at the paths from
    /// [`CONFIG`] and wires up every other service around them.
    pub async fn new() -> Result<Self> {
        CONFIG.ensure_config_dir()?;

        info!("Opening credential store at {:?}", CONFIG.credential_store_path());
        let credentials = Arc::new(CredentialStore::open(&CONFIG.credential_store_path())?);

        info!("Opening conversation store");
        let conversations = Arc::new(ConversationStore::open(&CONFIG.conversation_db_path()).await?);

        info!("Initializing log store");
        let log_store = Arc::new(LogStore::new(conversations.pool().clone()));
        let logger = Logger::new(log_store);

        info!("Initializing collaboration engine (mode={:?})", CONFIG.collab.mode);
        let collab = Arc::new(CollaborationEngine::new(
            CONFIG.collab.mode,
            CONFIG.collab.state_ttl_ms,
            CONFIG.collab.max_sessions,
        ));

        info!("Initializing rate limiter");
        let rate_limiter = Arc::new(RateLimiter::new(RateLimits {
            per_minute: CONFIG.rate_limit.per_minute,
            per_hour: CONFIG.rate_limit.per_hour,
            per_day: CONFIG.rate_limit.per_day,
        }));

        let watchdog = Arc::new(IdleWatchdog::new());
        let activity = Arc::new(ActivityTracker::new());

        let reply_producer: Arc<dyn ReplyProducer> = Arc::new(EchoReplyProducer);
        let summarizer: Arc<dyn Summarizer> = Arc::new(NoopSummarizer);
        let owner_notifier: Arc<dyn OwnerNotifier> = Arc::new(NullOwnerNotifier);

        watchdog
            .start(
                WatchdogConfig::default(),
                conversations.clone(),
                summarizer.clone(),
                owner_notifier.clone(),
                activity.clone(),
                logger.clone(),
            )
            .await;

        info!("Application state initialized");

        Ok(Self {
            credentials,
            conversations,
            collab,
            rate_limiter,
            logger,
            watchdog,
            activity,
            reply_producer,
            summarizer,
            owner_notifier,
        })
    }
}
