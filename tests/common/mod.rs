// Shared harness for the HTTP integration tests: builds an [`AppState`]
// backed by temporary on-disk credential and conversation stores, with
// swappable reply producer / summarizer collaborators.

use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::sync::Arc;

use a2a_runtime::collab::CollaborationEngine;
use a2a_runtime::config::CollabMode;
use a2a_runtime::conversation::ConversationStore;
use a2a_runtime::credential::{CreateTokenRequest, CreatedToken, CredentialStore, Tier};
use a2a_runtime::external::{EchoReplyProducer, NoopSummarizer, NullOwnerNotifier, ReplyProducer, Summarizer};
use a2a_runtime::logging::{LogStore, Logger};
use a2a_runtime::ratelimit::{RateLimiter, RateLimits};
use a2a_runtime::watchdog::{ActivityTracker, IdleWatchdog};
use a2a_runtime::AppState;
use axum::Router;
use tempfile::TempDir;

pub struct Harness {
    pub _dir: TempDir,
    pub credentials: Arc<CredentialStore>,
    pub state: AppState,
}

pub async fn build(reply_producer: Arc<dyn ReplyProducer>, summarizer: Arc<dyn Summarizer>) -> Harness {
    let dir = tempfile::tempdir().unwrap();

    let conversations = Arc::new(
        ConversationStore::open(&dir.path().join("conversations.db"))
            .await
            .unwrap(),
    );
    let log_store = Arc::new(LogStore::new(conversations.pool().clone()));
    let logger = Logger::new(log_store);
    let credentials = Arc::new(CredentialStore::open(&dir.path().join("a2a.json")).unwrap());
    let collab = Arc::new(CollaborationEngine::new(CollabMode::Adaptive, 6 * 60 * 60 * 1000, 500));
    let rate_limiter = Arc::new(RateLimiter::new(RateLimits {
        per_minute: 10,
        per_hour: 100,
        per_day: 1000,
    }));

    let state = AppState {
        credentials: credentials.clone(),
        conversations,
        collab,
        rate_limiter,
        logger,
        watchdog: Arc::new(IdleWatchdog::new()),
        activity: Arc::new(ActivityTracker::new()),
        reply_producer,
        summarizer,
        owner_notifier: Arc::new(NullOwnerNotifier),
    };

    Harness {
        _dir: dir,
        credentials,
        state,
    }
}

pub async fn default_harness() -> Harness {
    build(Arc::new(EchoReplyProducer), Arc::new(NoopSummarizer)).await
}

pub fn router(state: AppState) -> Router {
    a2a_runtime::api::http::create_router(state)
}

pub fn issue_token(credentials: &CredentialStore, tier: Tier, max_calls: Option<i64>) -> CreatedToken {
    credentials
        .create_token(CreateTokenRequest {
            name: "Golda".into(),
            owner: "me".into(),
            expires: "never".into(),
            tier,
            max_calls,
            ..Default::default()
        })
        .unwrap()
}

pub fn loopback_addr() -> SocketAddr {
    SocketAddr::new(IpAddr::V4(Ipv4Addr::LOCALHOST), 4100)
}

pub fn remote_addr() -> SocketAddr {
    SocketAddr::new(IpAddr::V4(Ipv4Addr::new(203, 0, 113, 7)), 4100)
}
