// src/external.rs
// Pluggable seams for collaborators this crate does not implement: the reply
// producer (the runtime adapter that actually talks to the agent), the
// summarizer, and the owner-notification transport. The core only ever sees
// these traits.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::conversation::Message;

/// Caller metadata forwarded to the reply producer, already sanitised by the
/// call lifecycle service (see `http::invoke::sanitise_caller`).
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SanitisedCaller {
    pub name: Option<String>,
    pub owner: Option<String>,
    pub instance: Option<String>,
    pub context: Option<String>,
}

#[derive(Debug, thiserror::Error)]
pub enum ReplyProducerError {
    #[error("reply producer timed out")]
    Timeout,
    #[error("reply producer failed: {0}")]
    Failed(String),
}

/// Produces the outbound text for one turn. The returned string may end with
/// a trailing `<collab_state>{...}</collab_state>` block; the call lifecycle
/// service strips and applies it before the text reaches the caller.
#[async_trait]
pub trait ReplyProducer: Send + Sync {
    async fn reply(
        &self,
        conversation_id: &str,
        inbound_message: &str,
        caller: &SanitisedCaller,
        context: Option<&serde_json::Value>,
        timeout: Duration,
    ) -> Result<String, ReplyProducerError>;
}

/// Structured, owner-facing summary produced on conclusion. Every field is
/// optional; a summarizer that throws is treated as "no summary" by the
/// conversation store, not as a fatal error.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ConversationSummary {
    pub summary: Option<String>,
    #[serde(rename = "ownerSummary")]
    pub owner_summary: Option<String>,
    pub relevance: Option<f64>,
    #[serde(rename = "goalsTouched")]
    pub goals_touched: Option<Vec<String>>,
    #[serde(rename = "ownerActionItems")]
    pub owner_action_items: Option<Vec<String>>,
    #[serde(rename = "callerActionItems")]
    pub caller_action_items: Option<Vec<String>>,
    #[serde(rename = "jointActionItems")]
    pub joint_action_items: Option<Vec<String>>,
    #[serde(rename = "collaborationOpportunity")]
    pub collaboration_opportunity: Option<serde_json::Value>,
    #[serde(rename = "followUp")]
    pub follow_up: Option<String>,
    pub notes: Option<String>,
}

#[async_trait]
pub trait Summarizer: Send + Sync {
    async fn summarize(
        &self,
        messages: &[Message],
        owner_context: Option<&serde_json::Value>,
    ) -> anyhow::Result<ConversationSummary>;
}

/// An event dispatched to the owner out-of-band (push notification, log
/// digest, Telegram message, ...). Dispatch is fire-and-forget: failures are
/// logged by the caller and never surfaced to the HTTP response.
#[derive(Debug, Clone, Serialize)]
pub struct OwnerEvent {
    pub kind: &'static str,
    pub conversation_id: String,
    pub detail: serde_json::Value,
}

#[async_trait]
pub trait OwnerNotifier: Send + Sync {
    async fn notify(&self, event: OwnerEvent) -> anyhow::Result<()>;
}

/// Default notifier used when no real transport is configured: logs the
/// event at debug level through tracing and returns. Telegram and other
/// transports live outside this crate.
pub struct NullOwnerNotifier;

#[async_trait]
impl OwnerNotifier for NullOwnerNotifier {
    async fn notify(&self, event: OwnerEvent) -> anyhow::Result<()> {
        tracing::debug!(kind = event.kind, conversation_id = %event.conversation_id, "owner notification dropped (no transport configured)");
        Ok(())
    }
}

/// Echoes the inbound message back, used as the default reply producer when
/// none is configured and by the test suite.
pub struct EchoReplyProducer;

#[async_trait]
impl ReplyProducer for EchoReplyProducer {
    async fn reply(
        &self,
        _conversation_id: &str,
        inbound_message: &str,
        _caller: &SanitisedCaller,
        _context: Option<&serde_json::Value>,
        _timeout: Duration,
    ) -> Result<String, ReplyProducerError> {
        Ok(format!("echo: {inbound_message}"))
    }
}

/// Summarizer that always reports "no summary available", used as the
/// default when no real summarizer is configured.
pub struct NoopSummarizer;

#[async_trait]
impl Summarizer for NoopSummarizer {
    async fn summarize(
        &self,
        _messages: &[Message],
        _owner_context: Option<&serde_json::Value>,
    ) -> anyhow::Result<ConversationSummary> {
        Ok(ConversationSummary::default())
    }
}
