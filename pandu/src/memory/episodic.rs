//! Episodic memory: a per-user timeline of conversation events, summarized
//! into a short context block for the system prompt.

use std::path::Path;
use std::time::{SystemTime, UNIX_EPOCH};

use chrono::{TimeZone, Utc};
use rusqlite::params;

use super::StoreError;

fn now_millis() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as i64)
        .unwrap_or(0)
}

fn truncate_chars(s: &str, max: usize) -> String {
    s.chars().take(max).collect()
}

pub struct EpisodicStore {
    db_path: std::path::PathBuf,
}

impl EpisodicStore {
    pub fn new(path: impl AsRef<Path>) -> Result<Self, StoreError> {
        let db_path = path.as_ref().to_path_buf();
        let conn =
            rusqlite::Connection::open(&db_path).map_err(|e| StoreError::Storage(e.to_string()))?;
        conn.execute(
            r#"
            CREATE TABLE IF NOT EXISTS episodic_events (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                user_id TEXT NOT NULL,
                title TEXT NOT NULL,
                summary TEXT NOT NULL,
                occurred_at INTEGER NOT NULL
            )
            "#,
            [],
        )
        .map_err(|e| StoreError::Storage(e.to_string()))?;
        Ok(Self { db_path })
    }

    /// Derives one event from a conversation turn and saves it.
    pub async fn extract_and_save_event(
        &self,
        user_id: &str,
        user_message: &str,
        ai_response: &str,
    ) -> Result<(), StoreError> {
        let title = truncate_chars(user_message.trim(), 80);
        if title.is_empty() {
            return Ok(());
        }
        let summary = truncate_chars(ai_response.trim(), 160);
        self.save_event(user_id, &title, &summary).await
    }

    pub async fn save_event(
        &self,
        user_id: &str,
        title: &str,
        summary: &str,
    ) -> Result<(), StoreError> {
        let db_path = self.db_path.clone();
        let user_id = user_id.to_string();
        let title = title.to_string();
        let summary = summary.to_string();
        tokio::task::spawn_blocking(move || {
            let conn = rusqlite::Connection::open(&db_path)
                .map_err(|e| StoreError::Storage(e.to_string()))?;
            conn.execute(
                "INSERT INTO episodic_events (user_id, title, summary, occurred_at)
                 VALUES (?1, ?2, ?3, ?4)",
                params![user_id, title, summary, now_millis()],
            )
            .map_err(|e| StoreError::Storage(e.to_string()))?;
            Ok(())
        })
        .await
        .map_err(|e| StoreError::Storage(e.to_string()))?
    }

    /// Recent timeline as a short bullet list, newest first. Empty string
    /// when there is no history.
    pub async fn context_summary(&self, user_id: &str, limit: usize) -> Result<String, StoreError> {
        let db_path = self.db_path.clone();
        let user_id = user_id.to_string();
        tokio::task::spawn_blocking(move || {
            let conn = rusqlite::Connection::open(&db_path)
                .map_err(|e| StoreError::Storage(e.to_string()))?;
            let mut stmt = conn
                .prepare(
                    "SELECT title, occurred_at FROM episodic_events
                     WHERE user_id = ?1 ORDER BY occurred_at DESC, id DESC LIMIT ?2",
                )
                .map_err(|e| StoreError::Storage(e.to_string()))?;
            let rows = stmt
                .query_map(params![user_id, limit as i64], |row| {
                    Ok((row.get::<_, String>(0)?, row.get::<_, i64>(1)?))
                })
                .map_err(|e| StoreError::Storage(e.to_string()))?;

            let mut lines = Vec::new();
            for row in rows {
                let (title, at) = row.map_err(|e| StoreError::Storage(e.to_string()))?;
                let date = Utc
                    .timestamp_millis_opt(at)
                    .single()
                    .map(|dt| dt.format("%Y-%m-%d").to_string())
                    .unwrap_or_default();
                lines.push(format!("- {title} ({date})"));
            }
            Ok::<String, StoreError>(lines.join("\n"))
        })
        .await
        .map_err(|e| StoreError::Storage(e.to_string()))?
    }
}
