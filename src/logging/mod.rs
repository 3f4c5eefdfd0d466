// src/logging/mod.rs
// Structured, durable log sink queried by the dashboard by trace,
// conversation, token, and error code. Storage is authoritative; the
// optional `tracing` mirror exists for local development (`RUST_LOG`).

use chrono::{DateTime, TimeZone, Utc};
use serde::Serialize;
use sqlx::{Row, SqlitePool};
use std::sync::Arc;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    Trace,
    Debug,
    Info,
    Warn,
    Error,
}

impl LogLevel {
    pub fn as_str(self) -> &'static str {
        match self {
            LogLevel::Trace => "trace",
            LogLevel::Debug => "debug",
            LogLevel::Info => "info",
            LogLevel::Warn => "warn",
            LogLevel::Error => "error",
        }
    }

    pub fn parse(s: &str) -> Self {
        match s {
            "trace" => LogLevel::Trace,
            "debug" => LogLevel::Debug,
            "warn" => LogLevel::Warn,
            "error" => LogLevel::Error,
            _ => LogLevel::Info,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct LogEntry {
    pub id: i64,
    pub timestamp: DateTime<Utc>,
    pub level: LogLevel,
    pub component: String,
    pub event: String,
    pub message: String,
    pub trace_id: Option<String>,
    pub conversation_id: Option<String>,
    pub token_id: Option<String>,
    pub request_id: Option<String>,
    pub status_code: Option<i32>,
    pub error_code: Option<String>,
    pub hint: Option<String>,
    pub data: Option<serde_json::Value>,
    pub error_stack: Option<String>,
}

/// The mutable fields a [`Logger`] writes on every entry; a `child()` logger
/// merges its own fields over the parent's, never the other way around.
#[derive(Debug, Clone, Default)]
pub struct LogFields {
    pub component: Option<String>,
    pub trace_id: Option<String>,
    pub conversation_id: Option<String>,
    pub token_id: Option<String>,
    pub request_id: Option<String>,
}

impl LogFields {
    fn merge(&self, child: &LogFields) -> LogFields {
        LogFields {
            component: child.component.clone().or_else(|| self.component.clone()),
            trace_id: child.trace_id.clone().or_else(|| self.trace_id.clone()),
            conversation_id: child
                .conversation_id
                .clone()
                .or_else(|| self.conversation_id.clone()),
            token_id: child.token_id.clone().or_else(|| self.token_id.clone()),
            request_id: child.request_id.clone().or_else(|| self.request_id.clone()),
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct LogWrite {
    pub event: String,
    pub message: String,
    pub status_code: Option<i32>,
    pub error_code: Option<String>,
    pub hint: Option<String>,
    pub data: Option<serde_json::Value>,
    pub error_stack: Option<String>,
}

#[derive(Debug, Clone, Default)]
pub struct LogQuery {
    pub limit: i64,
    pub level: Option<LogLevel>,
    pub component: Option<String>,
    pub event: Option<String>,
    pub error_code: Option<String>,
    pub status_code: Option<i32>,
    pub trace_id: Option<String>,
    pub conversation_id: Option<String>,
    pub token_id: Option<String>,
    pub search: Option<String>,
    pub from: Option<DateTime<Utc>>,
    pub to: Option<DateTime<Utc>>,
    pub sort_desc: bool,
}

#[derive(Debug, Clone, Serialize, Default)]
pub struct LogStats {
    pub total: i64,
    pub by_level: Vec<(String, i64)>,
}

/// Durable log sink; owns the `log_entries` table shared with the
/// conversation database.
pub struct LogStore {
    pool: SqlitePool,
}

impl LogStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    async fn insert(&self, level: LogLevel, fields: &LogFields, write: &LogWrite) -> anyhow::Result<i64> {
        let now = Utc::now().timestamp();
        let data_json = write.data.as_ref().map(|v| v.to_string());

        let result = sqlx::query(
            "INSERT INTO log_entries
                (timestamp, level, component, event, message, trace_id, conversation_id,
                 token_id, request_id, status_code, error_code, hint, data, error_stack)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14)",
        )
        .bind(now)
        .bind(level.as_str())
        .bind(fields.component.as_deref().unwrap_or("a2a"))
        .bind(&write.event)
        .bind(&write.message)
        .bind(&fields.trace_id)
        .bind(&fields.conversation_id)
        .bind(&fields.token_id)
        .bind(&fields.request_id)
        .bind(write.status_code)
        .bind(&write.error_code)
        .bind(&write.hint)
        .bind(&data_json)
        .bind(&write.error_stack)
        .execute(&self.pool)
        .await?;

        Ok(result.last_insert_rowid())
    }

    pub async fn list(&self, q: LogQuery) -> anyhow::Result<Vec<LogEntry>> {
        let mut sql = String::from("SELECT * FROM log_entries WHERE 1 = 1");
        if q.level.is_some() {
            sql.push_str(" AND level = ?");
        }
        if q.component.is_some() {
            sql.push_str(" AND component = ?");
        }
        if q.event.is_some() {
            sql.push_str(" AND event = ?");
        }
        if q.error_code.is_some() {
            sql.push_str(" AND error_code = ?");
        }
        if q.status_code.is_some() {
            sql.push_str(" AND status_code = ?");
        }
        if q.trace_id.is_some() {
            sql.push_str(" AND trace_id = ?");
        }
        if q.conversation_id.is_some() {
            sql.push_str(" AND conversation_id = ?");
        }
        if q.token_id.is_some() {
            sql.push_str(" AND token_id = ?");
        }
        if q.search.is_some() {
            sql.push_str(" AND message LIKE ?");
        }
        if q.from.is_some() {
            sql.push_str(" AND timestamp >= ?");
        }
        if q.to.is_some() {
            sql.push_str(" AND timestamp <= ?");
        }
        sql.push_str(if q.sort_desc {
            " ORDER BY id DESC LIMIT ?"
        } else {
            " ORDER BY id ASC LIMIT ?"
        });

        let mut query = sqlx::query(&sql);
        if let Some(level) = q.level {
            query = query.bind(level.as_str().to_string());
        }
        if let Some(v) = &q.component {
            query = query.bind(v.clone());
        }
        if let Some(v) = &q.event {
            query = query.bind(v.clone());
        }
        if let Some(v) = &q.error_code {
            query = query.bind(v.clone());
        }
        if let Some(v) = q.status_code {
            query = query.bind(v);
        }
        if let Some(v) = &q.trace_id {
            query = query.bind(v.clone());
        }
        if let Some(v) = &q.conversation_id {
            query = query.bind(v.clone());
        }
        if let Some(v) = &q.token_id {
            query = query.bind(v.clone());
        }
        if let Some(v) = &q.search {
            query = query.bind(format!("%{v}%"));
        }
        if let Some(v) = q.from {
            query = query.bind(v.timestamp());
        }
        if let Some(v) = q.to {
            query = query.bind(v.timestamp());
        }
        let limit = if q.limit > 0 { q.limit } else { 100 };
        query = query.bind(limit);

        let rows = query.fetch_all(&self.pool).await?;
        rows.iter().map(log_entry_from_row).collect()
    }

    pub async fn get_trace(&self, trace_id: &str, limit: i64) -> anyhow::Result<Vec<LogEntry>> {
        let limit = if limit > 0 { limit } else { 500 };
        let rows = sqlx::query(
            "SELECT * FROM log_entries WHERE trace_id = ?1 ORDER BY id ASC LIMIT ?2",
        )
        .bind(trace_id)
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;
        rows.iter().map(log_entry_from_row).collect()
    }

    pub async fn stats(
        &self,
        from: Option<DateTime<Utc>>,
        to: Option<DateTime<Utc>>,
    ) -> anyhow::Result<LogStats> {
        let mut sql = String::from("SELECT level, COUNT(*) as n FROM log_entries WHERE 1 = 1");
        if from.is_some() {
            sql.push_str(" AND timestamp >= ?1");
        }
        if to.is_some() {
            sql.push_str(" AND timestamp <= ?2");
        }
        sql.push_str(" GROUP BY level");

        let mut query = sqlx::query(&sql);
        if let Some(v) = from {
            query = query.bind(v.timestamp());
        }
        if let Some(v) = to {
            query = query.bind(v.timestamp());
        }
        let rows = query.fetch_all(&self.pool).await?;

        let mut total = 0i64;
        let mut by_level = Vec::new();
        for row in rows {
            let level: String = row.get("level");
            let n: i64 = row.get("n");
            total += n;
            by_level.push((level, n));
        }

        Ok(LogStats { total, by_level })
    }
}

fn log_entry_from_row(row: &sqlx::sqlite::SqliteRow) -> anyhow::Result<LogEntry> {
    let timestamp: i64 = row.get("timestamp");
    Ok(LogEntry {
        id: row.get("id"),
        timestamp: Utc.timestamp_opt(timestamp, 0).single().unwrap_or_else(Utc::now),
        level: LogLevel::parse(&row.get::<String, _>("level")),
        component: row.get("component"),
        event: row.get("event"),
        message: row.get("message"),
        trace_id: row.get("trace_id"),
        conversation_id: row.get("conversation_id"),
        token_id: row.get("token_id"),
        request_id: row.get("request_id"),
        status_code: row.get("status_code"),
        error_code: row.get("error_code"),
        hint: row.get("hint"),
        data: row
            .get::<Option<String>, _>("data")
            .and_then(|s| serde_json::from_str(&s).ok()),
        error_stack: row.get("error_stack"),
    })
}

/// A handle bound to a set of ambient fields (trace id, conversation id,
/// ...). Every write merges those fields in; `child()` layers more fields on
/// without mutating the parent, mirroring `tracing`'s span hierarchy but
/// landing every entry as its own durable row.
#[derive(Clone)]
pub struct Logger {
    store: Arc<LogStore>,
    fields: LogFields,
    min_level: LogLevel,
}

impl Logger {
    pub fn new(store: Arc<LogStore>) -> Self {
        Self {
            store,
            fields: LogFields {
                component: Some("a2a".to_string()),
                ..Default::default()
            },
            min_level: LogLevel::parse(&crate::config::CONFIG.logging.level),
        }
    }

    pub fn child(&self, fields: LogFields) -> Logger {
        Logger {
            store: self.store.clone(),
            fields: self.fields.merge(&fields),
            min_level: self.min_level,
        }
    }

    /// Mirrors to `tracing` unconditionally (useful for local `RUST_LOG`
    /// debugging) but only persists entries at or above `A2A_LOG_LEVEL`.
    pub async fn log(&self, level: LogLevel, write: LogWrite) {
        match level {
            LogLevel::Trace => tracing::trace!(event = %write.event, "{}", write.message),
            LogLevel::Debug => tracing::debug!(event = %write.event, "{}", write.message),
            LogLevel::Info => tracing::info!(event = %write.event, "{}", write.message),
            LogLevel::Warn => tracing::warn!(event = %write.event, "{}", write.message),
            LogLevel::Error => tracing::error!(event = %write.event, "{}", write.message),
        }

        if level < self.min_level {
            return;
        }

        if let Err(e) = self.store.insert(level, &self.fields, &write).await {
            tracing::error!(error = %e, "failed to persist log entry");
        }
    }

    pub async fn info(&self, event: &str, message: &str) {
        self.log(
            LogLevel::Info,
            LogWrite {
                event: event.to_string(),
                message: message.to_string(),
                ..Default::default()
            },
        )
        .await;
    }

    pub async fn warn(&self, event: &str, message: &str) {
        self.log(
            LogLevel::Warn,
            LogWrite {
                event: event.to_string(),
                message: message.to_string(),
                ..Default::default()
            },
        )
        .await;
    }

    pub async fn error(&self, event: &str, message: &str, error_code: Option<&str>, hint: Option<&str>) {
        self.log(
            LogLevel::Error,
            LogWrite {
                event: event.to_string(),
                message: message.to_string(),
                error_code: error_code.map(str::to_string),
                hint: hint.map(str::to_string),
                ..Default::default()
            },
        )
        .await;
    }
}
