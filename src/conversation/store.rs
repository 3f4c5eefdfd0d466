// src/conversation/store.rs
// Durable SQLite-backed store for conversations, messages, collaboration
// state, and (via `logging`) the trace log. Schema managed by idempotent
// `CREATE TABLE IF NOT EXISTS` DDL; missing columns trigger a
// backup-and-recreate rather than an in-place migration (prototype-mode
// schema evolution, preserved deliberately).

use anyhow::{Context, Result};
use base64::{engine::general_purpose::STANDARD, Engine as _};
use chrono::{DateTime, TimeZone, Utc};
use flate2::read::GzDecoder;
use flate2::write::GzEncoder;
use flate2::Compression;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};
use sqlx::{Row, SqlitePool};
use std::io::{Read, Write};
use std::path::{Path, PathBuf};
use std::str::FromStr;
use uuid::Uuid;

use super::{
    CollabPhase, CollaborationState, Conversation, ConversationContext, ConversationStatus,
    Direction, GetConversationOptions, ListConversationsOptions, Message, MessageRole, NewMessage,
    StartConversationRequest, StartConversationResult,
};
use crate::external::{ConversationSummary, Summarizer};

/// Columns whose presence is the canonical probe for "schema is current".
/// If any is missing the database file is renamed aside and recreated.
const SCHEMA_PROBE_COLUMNS: [&str; 3] = [
    "joint_action_items",
    "collaboration_opportunity",
    "collab_phase",
];

const SCHEMA_DDL: &str = r#"
CREATE TABLE IF NOT EXISTS conversations (
    id TEXT PRIMARY KEY,
    contact_id TEXT,
    contact_name TEXT,
    token_id TEXT,
    direction TEXT NOT NULL,
    started_at INTEGER NOT NULL,
    last_message_at INTEGER NOT NULL,
    ended_at INTEGER,
    message_count INTEGER NOT NULL DEFAULT 0,
    status TEXT NOT NULL DEFAULT 'active',

    phase TEXT NOT NULL DEFAULT 'handshake',
    collab_phase TEXT NOT NULL DEFAULT 'handshake',
    turn_count INTEGER NOT NULL DEFAULT 0,
    overlap_score REAL NOT NULL DEFAULT 0.0,
    active_threads TEXT NOT NULL DEFAULT '[]',
    candidate_collaborations TEXT NOT NULL DEFAULT '[]',
    open_questions TEXT NOT NULL DEFAULT '[]',
    close_signal INTEGER NOT NULL DEFAULT 0,
    confidence REAL NOT NULL DEFAULT 0.0,
    collab_updated_at INTEGER,

    summary TEXT,
    owner_summary TEXT,
    owner_relevance REAL,
    owner_goals_touched TEXT NOT NULL DEFAULT '[]',
    owner_action_items TEXT NOT NULL DEFAULT '[]',
    caller_action_items TEXT NOT NULL DEFAULT '[]',
    joint_action_items TEXT NOT NULL DEFAULT '[]',
    collaboration_opportunity TEXT,
    owner_follow_up TEXT,
    owner_notes TEXT
);

CREATE TABLE IF NOT EXISTS messages (
    id TEXT PRIMARY KEY,
    conversation_id TEXT NOT NULL,
    direction TEXT NOT NULL,
    role TEXT NOT NULL,
    content TEXT NOT NULL,
    timestamp INTEGER NOT NULL,
    compressed INTEGER NOT NULL DEFAULT 0,
    metadata TEXT
);

CREATE INDEX IF NOT EXISTS idx_messages_conversation_order
    ON messages (conversation_id, timestamp ASC, id ASC);

CREATE TABLE IF NOT EXISTS log_entries (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    timestamp INTEGER NOT NULL,
    level TEXT NOT NULL,
    component TEXT NOT NULL,
    event TEXT NOT NULL,
    message TEXT NOT NULL,
    trace_id TEXT,
    conversation_id TEXT,
    token_id TEXT,
    request_id TEXT,
    status_code INTEGER,
    error_code TEXT,
    hint TEXT,
    data TEXT,
    error_stack TEXT
);

CREATE INDEX IF NOT EXISTS idx_log_entries_trace ON log_entries (trace_id, id ASC);
CREATE INDEX IF NOT EXISTS idx_log_entries_conversation ON log_entries (conversation_id);
"#;

pub struct ConversationStore {
    pool: SqlitePool,
}

impl ConversationStore {
    /// Opens (creating if absent) the conversation database at `path`,
    /// applying the schema probe described above before returning.
    pub async fn open(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).ok();
        }

        probe_and_backup_if_stale(path).await?;

        let pool = connect(path).await?;
        sqlx::query(SCHEMA_DDL)
            .execute(&pool)
            .await
            .context("applying conversation store schema")?;
        set_file_mode(path);

        Ok(Self { pool })
    }

    #[cfg(test)]
    pub async fn open_in_memory() -> Result<Self> {
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect("sqlite::memory:")
            .await?;
        sqlx::query(SCHEMA_DDL).execute(&pool).await?;
        Ok(Self { pool })
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    pub async fn start_conversation(
        &self,
        req: StartConversationRequest,
    ) -> Result<StartConversationResult> {
        let now = Utc::now();
        let id = req.id.unwrap_or_else(new_conversation_id);

        let existing = sqlx::query("SELECT status FROM conversations WHERE id = ?1")
            .bind(&id)
            .fetch_optional(&self.pool)
            .await?;

        if let Some(row) = existing {
            let status: String = row.get("status");
            sqlx::query(
                "UPDATE conversations SET status = 'active', last_message_at = ?2 WHERE id = ?1",
            )
            .bind(&id)
            .bind(now.timestamp())
            .execute(&self.pool)
            .await?;
            return Ok(StartConversationResult {
                id,
                resumed: status == "active",
            });
        }

        sqlx::query(
            "INSERT INTO conversations
                (id, contact_id, contact_name, token_id, direction, started_at, last_message_at, status)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?6, 'active')",
        )
        .bind(&id)
        .bind(&req.contact_id)
        .bind(&req.contact_name)
        .bind(&req.token_id)
        .bind(req.direction.as_str())
        .bind(now.timestamp())
        .execute(&self.pool)
        .await
        .context("inserting new conversation")?;

        Ok(StartConversationResult { id, resumed: false })
    }

    pub async fn add_message(&self, conversation_id: &str, msg: NewMessage) -> Result<Message> {
        let mut tx = self.pool.begin().await?;
        let now = Utc::now();
        let id = format!("msg_{}", Uuid::new_v4().simple());
        let metadata_json = msg
            .metadata
            .as_ref()
            .map(|v| serde_json::to_string(v))
            .transpose()?;

        sqlx::query(
            "INSERT INTO messages (id, conversation_id, direction, role, content, timestamp, compressed, metadata)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, 0, ?7)",
        )
        .bind(&id)
        .bind(conversation_id)
        .bind(msg.direction.as_str())
        .bind(msg.role.as_str())
        .bind(&msg.content)
        .bind(now.timestamp())
        .bind(&metadata_json)
        .execute(&mut *tx)
        .await
        .context("inserting message")?;

        sqlx::query(
            "UPDATE conversations SET message_count = message_count + 1, last_message_at = ?2 WHERE id = ?1",
        )
        .bind(conversation_id)
        .bind(now.timestamp())
        .execute(&mut *tx)
        .await
        .context("bumping conversation message_count")?;

        tx.commit().await?;

        Ok(Message {
            id,
            conversation_id: conversation_id.to_string(),
            direction: msg.direction,
            role: msg.role,
            content: msg.content,
            timestamp: now,
            compressed: false,
            metadata: msg.metadata,
        })
    }

    pub async fn get_conversation(
        &self,
        id: &str,
        opts: GetConversationOptions,
    ) -> Result<Option<Conversation>> {
        let row = sqlx::query("SELECT * FROM conversations WHERE id = ?1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        let Some(row) = row else {
            return Ok(None);
        };

        let mut conv = conversation_from_row(&row)?;
        if opts.include_messages {
            conv.messages = Some(
                self.recent_messages(id, opts.message_limit.max(1))
                    .await?,
            );
        }
        Ok(Some(conv))
    }

    pub async fn list_conversations(
        &self,
        opts: ListConversationsOptions,
    ) -> Result<Vec<Conversation>> {
        let limit = if opts.limit > 0 { opts.limit } else { 50 };

        let mut query = String::from("SELECT * FROM conversations WHERE 1 = 1");
        if opts.contact_id.is_some() {
            query.push_str(" AND contact_id = ?1");
        }
        if opts.status.is_some() {
            query.push_str(" AND status = ?2");
        }
        query.push_str(" ORDER BY last_message_at DESC LIMIT ?3");

        let mut q = sqlx::query(&query);
        if let Some(contact_id) = &opts.contact_id {
            q = q.bind(contact_id);
        }
        if let Some(status) = opts.status {
            q = q.bind(status.as_str());
        }
        q = q.bind(limit);

        let rows = q.fetch_all(&self.pool).await?;
        let mut out = Vec::with_capacity(rows.len());
        for row in rows {
            let mut conv = conversation_from_row(&row)?;
            if opts.include_messages {
                conv.messages = Some(self.recent_messages(&conv.id, 50).await?);
            }
            out.push(conv);
        }
        Ok(out)
    }

    /// Concludes a conversation, optionally invoking a summarizer first.
    /// Idempotent: concluding an already-concluded conversation is a no-op
    /// returning `Ok(true)`.
    pub async fn conclude_conversation(
        &self,
        id: &str,
        summarizer: Option<&dyn Summarizer>,
        owner_context: Option<&serde_json::Value>,
    ) -> Result<bool> {
        let Some(conv) = self
            .get_conversation(
                id,
                GetConversationOptions {
                    include_messages: true,
                    message_limit: 1000,
                },
            )
            .await?
        else {
            return Ok(false);
        };

        if conv.status != ConversationStatus::Active {
            return Ok(true);
        }

        let messages = conv.messages.unwrap_or_default();
        let summary = if let (Some(summarizer), false) = (summarizer, messages.is_empty()) {
            match summarizer.summarize(&messages, owner_context).await {
                Ok(summary) => Some(summary),
                Err(e) => {
                    tracing::error!(conversation_id = %id, error = %e, "summarizer failed; concluding without summary");
                    None
                }
            }
        } else {
            None
        };

        self.write_conclusion(id, summary).await?;
        Ok(true)
    }

    async fn write_conclusion(&self, id: &str, summary: Option<ConversationSummary>) -> Result<()> {
        let now = Utc::now().timestamp();
        let s = summary.unwrap_or_default();

        sqlx::query(
            "UPDATE conversations SET
                status = 'concluded',
                ended_at = ?2,
                summary = ?3,
                owner_summary = ?4,
                owner_relevance = ?5,
                owner_goals_touched = ?6,
                owner_action_items = ?7,
                caller_action_items = ?8,
                joint_action_items = ?9,
                collaboration_opportunity = ?10,
                owner_follow_up = ?11,
                owner_notes = ?12
             WHERE id = ?1",
        )
        .bind(id)
        .bind(now)
        .bind(&s.summary)
        .bind(&s.owner_summary)
        .bind(s.relevance)
        .bind(serde_json::to_string(&s.goals_touched.unwrap_or_default())?)
        .bind(serde_json::to_string(&s.owner_action_items.unwrap_or_default())?)
        .bind(serde_json::to_string(&s.caller_action_items.unwrap_or_default())?)
        .bind(serde_json::to_string(&s.joint_action_items.unwrap_or_default())?)
        .bind(s.collaboration_opportunity.map(|v| v.to_string()))
        .bind(&s.follow_up)
        .bind(&s.notes)
        .execute(&self.pool)
        .await
        .context("writing conversation conclusion")?;

        Ok(())
    }

    pub async fn timeout_conversation(&self, id: &str) -> Result<()> {
        sqlx::query("UPDATE conversations SET status = 'timeout', ended_at = ?2 WHERE id = ?1")
            .bind(id)
            .bind(Utc::now().timestamp())
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    pub async fn get_active_conversations(&self, idle_threshold_ms: i64) -> Result<Vec<Conversation>> {
        let cutoff = Utc::now().timestamp() - idle_threshold_ms / 1000;
        let rows = sqlx::query(
            "SELECT * FROM conversations WHERE status = 'active' AND last_message_at < ?1",
        )
        .bind(cutoff)
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(conversation_from_row).collect()
    }

    /// All conversations currently `active`, regardless of recency. The idle
    /// watchdog uses this to evaluate both the idle-timeout and the
    /// max-duration ceiling against `started_at`/`last_message_at` itself.
    pub async fn list_active_conversations(&self) -> Result<Vec<Conversation>> {
        let rows = sqlx::query("SELECT * FROM conversations WHERE status = 'active'")
            .fetch_all(&self.pool)
            .await?;
        rows.iter().map(conversation_from_row).collect()
    }

    /// Replaces the content of messages older than `older_than_days` with a
    /// gzip+base64 compressed form, marking `compressed = 1`. Reads
    /// transparently decompress (`recent_messages`), so callers never see
    /// the difference.
    pub async fn compress_old_messages(&self, older_than_days: i64) -> Result<u64> {
        let cutoff = Utc::now().timestamp() - older_than_days * 86400;
        let rows = sqlx::query(
            "SELECT id, content FROM messages WHERE timestamp < ?1 AND compressed = 0",
        )
        .bind(cutoff)
        .fetch_all(&self.pool)
        .await?;

        let mut compressed_count = 0u64;
        for row in rows {
            let id: String = row.get("id");
            let content: String = row.get("content");
            let compressed = compress_text(&content)?;

            sqlx::query("UPDATE messages SET content = ?2, compressed = 1 WHERE id = ?1")
                .bind(&id)
                .bind(&compressed)
                .execute(&self.pool)
                .await?;
            compressed_count += 1;
        }

        Ok(compressed_count)
    }

    pub async fn save_collab_state(&self, conversation_id: &str, state: &CollaborationState) -> Result<()> {
        sqlx::query(
            "UPDATE conversations SET
                phase = ?2, collab_phase = ?2, turn_count = ?3, overlap_score = ?4,
                active_threads = ?5, candidate_collaborations = ?6, open_questions = ?7,
                close_signal = ?8, confidence = ?9, collab_updated_at = ?10
             WHERE id = ?1",
        )
        .bind(conversation_id)
        .bind(state.phase.as_str())
        .bind(state.turn_count)
        .bind(state.overlap_score)
        .bind(serde_json::to_string(&state.active_threads)?)
        .bind(serde_json::to_string(&state.candidate_collaborations)?)
        .bind(serde_json::to_string(&state.open_questions)?)
        .bind(state.close_signal)
        .bind(state.confidence)
        .bind(state.updated_at.timestamp())
        .execute(&self.pool)
        .await
        .context("persisting collaboration state")?;
        Ok(())
    }

    pub async fn load_collab_state(&self, conversation_id: &str) -> Result<Option<CollaborationState>> {
        let row = sqlx::query(
            "SELECT collab_phase, turn_count, overlap_score, active_threads,
                    candidate_collaborations, open_questions, close_signal, confidence,
                    collab_updated_at
             FROM conversations WHERE id = ?1",
        )
        .bind(conversation_id)
        .fetch_optional(&self.pool)
        .await?;

        let Some(row) = row else { return Ok(None) };

        let phase_str: String = row.get("collab_phase");
        let updated_at: Option<i64> = row.get("collab_updated_at");

        Ok(Some(CollaborationState {
            phase: CollabPhase::parse(&phase_str).unwrap_or(CollabPhase::Handshake),
            turn_count: row.get("turn_count"),
            overlap_score: row.get("overlap_score"),
            active_threads: parse_json_list(row.get("active_threads")),
            candidate_collaborations: parse_json_list(row.get("candidate_collaborations")),
            open_questions: parse_json_list(row.get("open_questions")),
            close_signal: row.get("close_signal"),
            confidence: row.get("confidence"),
            updated_at: updated_at
                .and_then(|t| Utc.timestamp_opt(t, 0).single())
                .unwrap_or_else(Utc::now),
        }))
    }

    pub async fn get_conversation_context(
        &self,
        conversation_id: &str,
        recent_n: i64,
    ) -> Result<Option<ConversationContext>> {
        let Some(conv) = self
            .get_conversation(conversation_id, GetConversationOptions::default())
            .await?
        else {
            return Ok(None);
        };
        let recent_messages = self.recent_messages(conversation_id, recent_n.max(1)).await?;

        Ok(Some(ConversationContext {
            id: conv.id,
            contact: conv.contact_name,
            summary: conv.summary,
            owner_context: None,
            recent_messages,
            message_count: conv.message_count,
            started_at: conv.started_at,
            ended_at: conv.ended_at,
            status: conv.status,
        }))
    }

    async fn recent_messages(&self, conversation_id: &str, limit: i64) -> Result<Vec<Message>> {
        let rows = sqlx::query(
            "SELECT * FROM (
                SELECT * FROM messages WHERE conversation_id = ?1
                ORDER BY timestamp DESC, id DESC LIMIT ?2
             ) ORDER BY timestamp ASC, id ASC",
        )
        .bind(conversation_id)
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(message_from_row).collect()
    }
}

fn new_conversation_id() -> String {
    format!(
        "conv_{}_{}",
        Utc::now().timestamp_millis(),
        hex_random(6)
    )
}

fn hex_random(n_bytes: usize) -> String {
    use rand::RngCore;
    let mut bytes = vec![0u8; n_bytes];
    rand::rng().fill_bytes(&mut bytes);
    bytes.iter().map(|b| format!("{:02x}", b)).collect()
}

fn parse_json_list(raw: String) -> Vec<String> {
    serde_json::from_str(&raw).unwrap_or_default()
}

fn conversation_from_row(row: &sqlx::sqlite::SqliteRow) -> Result<Conversation> {
    let started_at: i64 = row.get("started_at");
    let last_message_at: i64 = row.get("last_message_at");
    let ended_at: Option<i64> = row.get("ended_at");

    Ok(Conversation {
        id: row.get("id"),
        contact_id: row.get("contact_id"),
        contact_name: row.get("contact_name"),
        token_id: row.get("token_id"),
        direction: Direction::from_str(&row.get::<String, _>("direction")),
        started_at: from_epoch(started_at),
        last_message_at: from_epoch(last_message_at),
        ended_at: ended_at.map(from_epoch),
        message_count: row.get("message_count"),
        status: ConversationStatus::from_str(&row.get::<String, _>("status")),
        summary: row.get("summary"),
        owner_summary: row.get("owner_summary"),
        owner_relevance: row.get("owner_relevance"),
        owner_goals_touched: parse_json_list(row.get("owner_goals_touched")),
        owner_action_items: parse_json_list(row.get("owner_action_items")),
        caller_action_items: parse_json_list(row.get("caller_action_items")),
        joint_action_items: parse_json_list(row.get("joint_action_items")),
        collaboration_opportunity: row
            .get::<Option<String>, _>("collaboration_opportunity")
            .and_then(|s| serde_json::from_str(&s).ok()),
        owner_follow_up: row.get("owner_follow_up"),
        owner_notes: row.get("owner_notes"),
        messages: None,
    })
}

fn message_from_row(row: &sqlx::sqlite::SqliteRow) -> Result<Message> {
    let timestamp: i64 = row.get("timestamp");
    let compressed: bool = row.get("compressed");
    let raw_content: String = row.get("content");
    let content = if compressed {
        decompress_text(&raw_content)?
    } else {
        raw_content
    };

    Ok(Message {
        id: row.get("id"),
        conversation_id: row.get("conversation_id"),
        direction: Direction::from_str(&row.get::<String, _>("direction")),
        role: MessageRole::from_str(&row.get::<String, _>("role")),
        content,
        timestamp: from_epoch(timestamp),
        compressed,
        metadata: row
            .get::<Option<String>, _>("metadata")
            .and_then(|s| serde_json::from_str(&s).ok()),
    })
}

fn from_epoch(secs: i64) -> DateTime<Utc> {
    Utc.timestamp_opt(secs, 0).single().unwrap_or_else(Utc::now)
}

fn compress_text(text: &str) -> Result<String> {
    let mut encoder = GzEncoder::new(Vec::new(), Compression::default());
    encoder.write_all(text.as_bytes())?;
    let bytes = encoder.finish()?;
    Ok(STANDARD.encode(bytes))
}

fn decompress_text(encoded: &str) -> Result<String> {
    let bytes = STANDARD.decode(encoded)?;
    let mut decoder = GzDecoder::new(bytes.as_slice());
    let mut out = String::new();
    decoder.read_to_string(&mut out)?;
    Ok(out)
}

async fn connect(path: &Path) -> Result<SqlitePool> {
    let options = SqliteConnectOptions::from_str(&format!("sqlite://{}", path.display()))?
        .create_if_missing(true);
    SqlitePoolOptions::new()
        .max_connections(1)
        .connect_with(options)
        .await
        .context("opening conversation store database")
}

/// Renames `path` aside with a timestamp suffix and lets the caller recreate
/// it empty, if the existing schema is missing any of the probe columns.
/// A missing file is not "stale"; it is simply created fresh by `connect`.
async fn probe_and_backup_if_stale(path: &Path) -> Result<()> {
    if !path.exists() {
        return Ok(());
    }

    let pool = connect(path).await?;
    let row = sqlx::query("PRAGMA table_info(conversations)")
        .fetch_all(&pool)
        .await;
    pool.close().await;

    let columns: Vec<String> = match row {
        Ok(rows) => rows.iter().map(|r| r.get::<String, _>("name")).collect(),
        Err(_) => Vec::new(),
    };

    let missing = columns.is_empty()
        || SCHEMA_PROBE_COLUMNS
            .iter()
            .any(|probe| !columns.iter().any(|c| c == probe));

    if missing {
        let backup: PathBuf = {
            let ts = Utc::now().timestamp();
            let mut p = path.to_path_buf();
            let file_name = p
                .file_name()
                .and_then(|n| n.to_str())
                .unwrap_or("a2a-conversations.db")
                .to_string();
            p.set_file_name(format!("{file_name}.bak.{ts}"));
            p
        };
        tracing::error!(
            path = %path.display(),
            backup = %backup.display(),
            "conversation store schema stale (missing canonical columns); backing up and recreating"
        );
        std::fs::rename(path, &backup).context("backing up stale conversation store")?;
    }

    Ok(())
}

#[cfg(unix)]
fn set_file_mode(path: &Path) {
    use std::os::unix::fs::PermissionsExt;
    if let Ok(metadata) = std::fs::metadata(path) {
        let mut perms = metadata.permissions();
        perms.set_mode(0o600);
        let _ = std::fs::set_permissions(path, perms);
    }
}

#[cfg(not(unix))]
fn set_file_mode(_path: &Path) {}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::conversation::NewMessage;

    async fn store() -> ConversationStore {
        ConversationStore::open_in_memory().await.unwrap()
    }

    #[tokio::test]
    async fn start_conversation_creates_then_resumes() {
        let store = store().await;
        let r1 = store
            .start_conversation(StartConversationRequest {
                direction: Direction::Inbound,
                ..Default::default()
            })
            .await
            .unwrap();
        assert!(!r1.resumed);

        let r2 = store
            .start_conversation(StartConversationRequest {
                id: Some(r1.id.clone()),
                direction: Direction::Inbound,
                ..Default::default()
            })
            .await
            .unwrap();
        assert_eq!(r2.id, r1.id);
        assert!(r2.resumed);
    }

    #[tokio::test]
    async fn add_message_bumps_count_and_orders_by_timestamp() {
        let store = store().await;
        let conv = store
            .start_conversation(StartConversationRequest::default())
            .await
            .unwrap();

        store
            .add_message(
                &conv.id,
                NewMessage {
                    direction: Direction::Inbound,
                    role: MessageRole::User,
                    content: "hi".to_string(),
                    metadata: None,
                },
            )
            .await
            .unwrap();
        store
            .add_message(
                &conv.id,
                NewMessage {
                    direction: Direction::Outbound,
                    role: MessageRole::Assistant,
                    content: "hello".to_string(),
                    metadata: None,
                },
            )
            .await
            .unwrap();

        let fetched = store
            .get_conversation(
                &conv.id,
                GetConversationOptions {
                    include_messages: true,
                    message_limit: 10,
                },
            )
            .await
            .unwrap()
            .unwrap();

        assert_eq!(fetched.message_count, 2);
        let msgs = fetched.messages.unwrap();
        assert_eq!(msgs.len(), 2);
        assert_eq!(msgs[0].content, "hi");
        assert_eq!(msgs[1].content, "hello");
    }

    #[tokio::test]
    async fn conclude_is_idempotent_and_survives_summarizer_absence() {
        let store = store().await;
        let conv = store
            .start_conversation(StartConversationRequest::default())
            .await
            .unwrap();

        let concluded = store.conclude_conversation(&conv.id, None, None).await.unwrap();
        assert!(concluded);
        let fetched = store
            .get_conversation(&conv.id, GetConversationOptions::default())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(fetched.status, ConversationStatus::Concluded);
        assert!(fetched.ended_at.is_some());

        let again = store.conclude_conversation(&conv.id, None, None).await.unwrap();
        assert!(again);
    }

    #[tokio::test]
    async fn collab_state_round_trips() {
        let store = store().await;
        let conv = store
            .start_conversation(StartConversationRequest::default())
            .await
            .unwrap();

        let mut state = CollaborationState::default();
        state.phase = CollabPhase::Explore;
        state.turn_count = 3;
        state.overlap_score = 0.42;
        state.active_threads = vec!["a".to_string(), "b".to_string()];

        store.save_collab_state(&conv.id, &state).await.unwrap();
        let loaded = store.load_collab_state(&conv.id).await.unwrap().unwrap();

        assert_eq!(loaded.phase, CollabPhase::Explore);
        assert_eq!(loaded.turn_count, 3);
        assert_eq!(loaded.overlap_score, 0.42);
        assert_eq!(loaded.active_threads, vec!["a", "b"]);
    }

    #[test]
    fn gzip_round_trips() {
        let original = "hello world, this will be compressed";
        let compressed = compress_text(original).unwrap();
        assert_ne!(compressed, original);
        assert_eq!(decompress_text(&compressed).unwrap(), original);
    }

    #[tokio::test]
    async fn compress_old_messages_is_transparent_on_read() {
        let store = store().await;
        let conv = store
            .start_conversation(StartConversationRequest::default())
            .await
            .unwrap();

        let msg = store
            .add_message(
                &conv.id,
                NewMessage {
                    direction: Direction::Inbound,
                    role: MessageRole::User,
                    content: "this message is old enough to be compressed".to_string(),
                    metadata: None,
                },
            )
            .await
            .unwrap();

        // Back-date the message past the compression cutoff directly; the
        // store itself never back-dates timestamps.
        let ancient = Utc::now().timestamp() - 30 * 86400;
        sqlx::query("UPDATE messages SET timestamp = ?2 WHERE id = ?1")
            .bind(&msg.id)
            .bind(ancient)
            .execute(&store.pool)
            .await
            .unwrap();

        let compressed_count = store.compress_old_messages(7).await.unwrap();
        assert_eq!(compressed_count, 1);

        let row: (String, bool) = sqlx::query_as("SELECT content, compressed FROM messages WHERE id = ?1")
            .bind(&msg.id)
            .fetch_one(&store.pool)
            .await
            .unwrap();
        assert!(row.1, "message should be marked compressed");
        assert_ne!(row.0, "this message is old enough to be compressed");

        let fetched = store
            .get_conversation(
                &conv.id,
                GetConversationOptions {
                    include_messages: true,
                    message_limit: 10,
                },
            )
            .await
            .unwrap()
            .unwrap();
        let messages = fetched.messages.unwrap();
        assert_eq!(messages[0].content, "this message is old enough to be compressed");
        assert!(messages[0].compressed);
    }
}
