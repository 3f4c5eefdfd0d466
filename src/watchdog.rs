// src/watchdog.rs
// Sweeps active conversations for the owner-side safety ceiling: any
// conversation running past `max_duration` or sitting idle past
// `idle_timeout` gets concluded and the owner notified, even if the caller
// never sends an `/end`.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use parking_lot::RwLock;
use tokio::task::JoinHandle;
use tokio::time;

use crate::conversation::ConversationStore;
use crate::external::{OwnerEvent, OwnerNotifier, Summarizer};
use crate::logging::{LogFields, LogWrite, Logger};

#[derive(Debug, Clone, Copy)]
pub struct WatchdogConfig {
    pub sweep_interval: Duration,
    pub idle_timeout: Duration,
    pub max_duration: Duration,
}

impl Default for WatchdogConfig {
    fn default() -> Self {
        Self {
            sweep_interval: Duration::from_secs(10),
            idle_timeout: Duration::from_secs(60),
            max_duration: Duration::from_secs(300),
        }
    }
}

#[derive(Debug, Clone)]
struct Activity {
    start_time: chrono::DateTime<Utc>,
    last_activity: chrono::DateTime<Utc>,
    caller: Option<String>,
}

/// In-memory record of in-flight conversations: `start_time` is set once on
/// first activity, `last_activity` bumped on every subsequent call. The
/// sweep loop walks a snapshot of this map rather than the conversation
/// store, matching the spec's "walks the in-memory activity map" design.
#[derive(Default)]
pub struct ActivityTracker {
    inner: RwLock<HashMap<String, Activity>>,
}

impl ActivityTracker {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(&self, conversation_id: &str, caller: Option<&str>) {
        let now = Utc::now();
        let mut inner = self.inner.write();
        match inner.get_mut(conversation_id) {
            Some(activity) => {
                activity.last_activity = now;
                if caller.is_some() {
                    activity.caller = caller.map(str::to_string);
                }
            }
            None => {
                inner.insert(
                    conversation_id.to_string(),
                    Activity {
                        start_time: now,
                        last_activity: now,
                        caller: caller.map(str::to_string),
                    },
                );
            }
        }
    }

    pub fn forget(&self, conversation_id: &str) {
        self.inner.write().remove(conversation_id);
    }

    fn caller_of(&self, conversation_id: &str) -> Option<String> {
        self.inner.read().get(conversation_id).and_then(|a| a.caller.clone())
    }

    /// Snapshot of `(conversation_id, start_time, last_activity)` taken
    /// without holding the lock across any `.await`.
    fn snapshot(&self) -> Vec<(String, chrono::DateTime<Utc>, chrono::DateTime<Utc>)> {
        self.inner
            .read()
            .iter()
            .map(|(id, a)| (id.clone(), a.start_time, a.last_activity))
            .collect()
    }
}

/// Periodic sweeper that concludes conversations exceeding the idle or
/// max-duration ceiling. One sweep task per running server; `shutdown()`
/// aborts it.
pub struct IdleWatchdog {
    handle: tokio::sync::Mutex<Option<JoinHandle<()>>>,
}

impl IdleWatchdog {
    pub fn new() -> Self {
        Self {
            handle: tokio::sync::Mutex::new(None),
        }
    }

    /// Spawns the sweep loop. Calling `start` twice without an intervening
    /// `shutdown` is a no-op; the first handle keeps running.
    pub async fn start(
        &self,
        config: WatchdogConfig,
        store: Arc<ConversationStore>,
        summarizer: Arc<dyn Summarizer>,
        notifier: Arc<dyn OwnerNotifier>,
        activity: Arc<ActivityTracker>,
        logger: Logger,
    ) {
        let mut slot = self.handle.lock().await;
        if slot.is_some() {
            return;
        }

        tracing::info!(
            interval_s = config.sweep_interval.as_secs(),
            idle_timeout_s = config.idle_timeout.as_secs(),
            max_duration_s = config.max_duration.as_secs(),
            "idle watchdog started"
        );

        let watchdog_logger = logger.child(LogFields {
            component: Some("watchdog".to_string()),
            ..Default::default()
        });

        let handle = tokio::spawn(async move {
            let mut ticker = time::interval(config.sweep_interval);
            ticker.set_missed_tick_behavior(time::MissedTickBehavior::Skip);

            loop {
                ticker.tick().await;
                if let Err(e) = sweep_once(
                    &config,
                    &store,
                    summarizer.as_ref(),
                    notifier.as_ref(),
                    &activity,
                    &watchdog_logger,
                )
                .await
                {
                    tracing::error!(error = %e, "idle watchdog sweep failed");
                }
            }
        });

        *slot = Some(handle);
    }

    pub async fn shutdown(&self) {
        if let Some(handle) = self.handle.lock().await.take() {
            handle.abort();
            tracing::info!("idle watchdog stopped");
        }
    }
}

impl Default for IdleWatchdog {
    fn default() -> Self {
        Self::new()
    }
}

async fn sweep_once(
    config: &WatchdogConfig,
    store: &ConversationStore,
    summarizer: &dyn Summarizer,
    notifier: &dyn OwnerNotifier,
    activity: &ActivityTracker,
    logger: &Logger,
) -> anyhow::Result<()> {
    let now = Utc::now();

    for (conversation_id, start_time, last_activity) in activity.snapshot() {
        let age = now.signed_duration_since(start_time);
        let idle = now.signed_duration_since(last_activity);

        let reason = if age.num_seconds() >= config.max_duration.as_secs() as i64 {
            Some("max_duration")
        } else if idle.num_seconds() >= config.idle_timeout.as_secs() as i64 {
            Some("idle_timeout")
        } else {
            None
        };

        let Some(reason) = reason else { continue };

        let owner_context = serde_json::json!({ "reason": reason });
        match store
            .conclude_conversation(&conversation_id, Some(summarizer), Some(&owner_context))
            .await
        {
            Ok(true) => {
                let conversation_logger = logger.child(LogFields {
                    conversation_id: Some(conversation_id.clone()),
                    ..Default::default()
                });
                conversation_logger
                    .log(
                        crate::logging::LogLevel::Info,
                        LogWrite {
                            event: "watchdog_concluded".to_string(),
                            message: format!("watchdog concluded conversation ({reason})"),
                            error_code: Some(reason.to_string()),
                            ..Default::default()
                        },
                    )
                    .await;
                let detail = serde_json::json!({
                    "reason": reason,
                    "caller": activity.caller_of(&conversation_id),
                });
                if let Err(e) = notifier
                    .notify(OwnerEvent {
                        kind: "conversation_concluded",
                        conversation_id: conversation_id.clone(),
                        detail,
                    })
                    .await
                {
                    tracing::warn!(conversation_id = %conversation_id, error = %e, "owner notification failed");
                }
                activity.forget(&conversation_id);
            }
            Ok(false) => {
                activity.forget(&conversation_id);
            }
            Err(e) => {
                tracing::error!(conversation_id = %conversation_id, error = %e, "watchdog failed to conclude conversation");
            }
        }
    }

    Ok(())
}
