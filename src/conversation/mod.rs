// src/conversation/mod.rs
// Data model for conversations, messages, and collaboration state, plus the
// durable store that persists them.

pub mod store;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

pub use store::ConversationStore;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Direction {
    Inbound,
    Outbound,
}

impl Direction {
    pub fn as_str(self) -> &'static str {
        match self {
            Direction::Inbound => "inbound",
            Direction::Outbound => "outbound",
        }
    }

    pub fn from_str(s: &str) -> Self {
        match s {
            "outbound" => Direction::Outbound,
            _ => Direction::Inbound,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MessageRole {
    User,
    Assistant,
}

impl MessageRole {
    pub fn as_str(self) -> &'static str {
        match self {
            MessageRole::User => "user",
            MessageRole::Assistant => "assistant",
        }
    }

    pub fn from_str(s: &str) -> Self {
        match s {
            "assistant" => MessageRole::Assistant,
            _ => MessageRole::User,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConversationStatus {
    Active,
    Concluded,
    Timeout,
}

impl ConversationStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            ConversationStatus::Active => "active",
            ConversationStatus::Concluded => "concluded",
            ConversationStatus::Timeout => "timeout",
        }
    }

    pub fn from_str(s: &str) -> Self {
        match s {
            "concluded" => ConversationStatus::Concluded,
            "timeout" => ConversationStatus::Timeout,
            _ => ConversationStatus::Active,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CollabPhase {
    Handshake,
    Explore,
    DeepDive,
    Synthesize,
    Close,
}

impl CollabPhase {
    pub fn as_str(self) -> &'static str {
        match self {
            CollabPhase::Handshake => "handshake",
            CollabPhase::Explore => "explore",
            CollabPhase::DeepDive => "deep_dive",
            CollabPhase::Synthesize => "synthesize",
            CollabPhase::Close => "close",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "handshake" => Some(CollabPhase::Handshake),
            "explore" => Some(CollabPhase::Explore),
            "deep_dive" => Some(CollabPhase::DeepDive),
            "synthesize" => Some(CollabPhase::Synthesize),
            "close" => Some(CollabPhase::Close),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Message {
    pub id: String,
    pub conversation_id: String,
    pub direction: Direction,
    pub role: MessageRole,
    pub content: String,
    pub timestamp: DateTime<Utc>,
    pub compressed: bool,
    pub metadata: Option<serde_json::Value>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct NewMessage {
    pub direction: Direction,
    pub role: MessageRole,
    pub content: String,
    pub metadata: Option<serde_json::Value>,
}

impl Default for Direction {
    fn default() -> Self {
        Direction::Inbound
    }
}

impl Default for MessageRole {
    fn default() -> Self {
        MessageRole::User
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Conversation {
    pub id: String,
    pub contact_id: Option<String>,
    pub contact_name: Option<String>,
    pub token_id: Option<String>,
    pub direction: Direction,
    pub started_at: DateTime<Utc>,
    pub last_message_at: DateTime<Utc>,
    pub ended_at: Option<DateTime<Utc>>,
    pub message_count: i64,
    pub status: ConversationStatus,

    pub summary: Option<String>,
    pub owner_summary: Option<String>,
    pub owner_relevance: Option<f64>,
    pub owner_goals_touched: Vec<String>,
    pub owner_action_items: Vec<String>,
    pub caller_action_items: Vec<String>,
    pub joint_action_items: Vec<String>,
    pub collaboration_opportunity: Option<serde_json::Value>,
    pub owner_follow_up: Option<String>,
    pub owner_notes: Option<String>,

    pub messages: Option<Vec<Message>>,
}

/// Per-conversation adaptive progress tracker. Created on the first turn,
/// mutated only by the collaboration state engine, persisted on every
/// update, evicted from the in-memory cache by LRU + TTL.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CollaborationState {
    pub phase: CollabPhase,
    pub turn_count: i64,
    pub overlap_score: f64,
    pub active_threads: Vec<String>,
    pub candidate_collaborations: Vec<String>,
    pub open_questions: Vec<String>,
    pub close_signal: bool,
    pub confidence: f64,
    pub updated_at: DateTime<Utc>,
}

impl Default for CollaborationState {
    fn default() -> Self {
        Self {
            phase: CollabPhase::Handshake,
            turn_count: 0,
            overlap_score: 0.0,
            active_threads: Vec::new(),
            candidate_collaborations: Vec::new(),
            open_questions: Vec::new(),
            close_signal: false,
            confidence: 0.0,
            updated_at: Utc::now(),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct ConversationContext {
    pub id: String,
    pub contact: Option<String>,
    pub summary: Option<String>,
    pub owner_context: Option<serde_json::Value>,
    pub recent_messages: Vec<Message>,
    pub message_count: i64,
    pub started_at: DateTime<Utc>,
    pub ended_at: Option<DateTime<Utc>>,
    pub status: ConversationStatus,
}

#[derive(Debug, Clone, Default)]
pub struct StartConversationRequest {
    pub id: Option<String>,
    pub contact_id: Option<String>,
    pub contact_name: Option<String>,
    pub token_id: Option<String>,
    pub direction: Direction,
}

#[derive(Debug, Clone, Serialize)]
pub struct StartConversationResult {
    pub id: String,
    pub resumed: bool,
}

#[derive(Debug, Clone, Default)]
pub struct GetConversationOptions {
    pub include_messages: bool,
    pub message_limit: i64,
}

#[derive(Debug, Clone, Default)]
pub struct ListConversationsOptions {
    pub contact_id: Option<String>,
    pub status: Option<ConversationStatus>,
    pub limit: i64,
    pub include_messages: bool,
}
