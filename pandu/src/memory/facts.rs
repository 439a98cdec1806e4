//! Per-user fact store (SQLite). Facts dedup by content per user; counters
//! track conversation volume.

use std::path::Path;
use std::time::{SystemTime, UNIX_EPOCH};

use rusqlite::params;

use super::StoreError;

fn now_millis() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as i64)
        .unwrap_or(0)
}

/// SQLite-backed per-user facts and counters.
pub struct FactStore {
    db_path: std::path::PathBuf,
}

impl FactStore {
    pub fn new(path: impl AsRef<Path>) -> Result<Self, StoreError> {
        let db_path = path.as_ref().to_path_buf();
        let conn =
            rusqlite::Connection::open(&db_path).map_err(|e| StoreError::Storage(e.to_string()))?;
        conn.execute_batch(
            r#"
            CREATE TABLE IF NOT EXISTS user_facts (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                user_id TEXT NOT NULL,
                content TEXT NOT NULL,
                fact_type TEXT NOT NULL DEFAULT 'general',
                confidence REAL NOT NULL DEFAULT 0.8,
                source TEXT NOT NULL DEFAULT 'user',
                created_at INTEGER NOT NULL,
                UNIQUE(user_id, content)
            );
            CREATE TABLE IF NOT EXISTS user_counters (
                user_id TEXT NOT NULL,
                name TEXT NOT NULL,
                value INTEGER NOT NULL DEFAULT 0,
                PRIMARY KEY (user_id, name)
            );
            "#,
        )
        .map_err(|e| StoreError::Storage(e.to_string()))?;
        Ok(Self { db_path })
    }

    /// Inserts one fact; returns false when the user already has it.
    pub async fn add_fact(
        &self,
        user_id: &str,
        content: &str,
        fact_type: &str,
        confidence: f32,
        source: &str,
    ) -> Result<bool, StoreError> {
        let db_path = self.db_path.clone();
        let user_id = user_id.to_string();
        let content = content.trim().to_string();
        let fact_type = fact_type.to_string();
        let source = source.to_string();
        tokio::task::spawn_blocking(move || {
            let conn = rusqlite::Connection::open(&db_path)
                .map_err(|e| StoreError::Storage(e.to_string()))?;
            let changed = conn
                .execute(
                    "INSERT OR IGNORE INTO user_facts (user_id, content, fact_type, confidence, source, created_at)
                     VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
                    params![user_id, content, fact_type, confidence, source, now_millis()],
                )
                .map_err(|e| StoreError::Storage(e.to_string()))?;
            Ok::<bool, StoreError>(changed > 0)
        })
        .await
        .map_err(|e| StoreError::Storage(e.to_string()))?
    }

    /// Most recent facts first.
    pub async fn facts(&self, user_id: &str, limit: usize) -> Result<Vec<String>, StoreError> {
        let db_path = self.db_path.clone();
        let user_id = user_id.to_string();
        tokio::task::spawn_blocking(move || {
            let conn = rusqlite::Connection::open(&db_path)
                .map_err(|e| StoreError::Storage(e.to_string()))?;
            let mut stmt = conn
                .prepare(
                    "SELECT content FROM user_facts WHERE user_id = ?1
                     ORDER BY created_at DESC, id DESC LIMIT ?2",
                )
                .map_err(|e| StoreError::Storage(e.to_string()))?;
            let rows = stmt
                .query_map(params![user_id, limit as i64], |row| row.get::<_, String>(0))
                .map_err(|e| StoreError::Storage(e.to_string()))?;
            rows.collect::<Result<Vec<_>, _>>()
                .map_err(|e| StoreError::Storage(e.to_string()))
        })
        .await
        .map_err(|e| StoreError::Storage(e.to_string()))?
    }

    pub async fn increment_counter(&self, user_id: &str, name: &str) -> Result<i64, StoreError> {
        let db_path = self.db_path.clone();
        let user_id = user_id.to_string();
        let name = name.to_string();
        tokio::task::spawn_blocking(move || {
            let conn = rusqlite::Connection::open(&db_path)
                .map_err(|e| StoreError::Storage(e.to_string()))?;
            conn.execute(
                "INSERT INTO user_counters (user_id, name, value) VALUES (?1, ?2, 1)
                 ON CONFLICT(user_id, name) DO UPDATE SET value = value + 1",
                params![user_id, name],
            )
            .map_err(|e| StoreError::Storage(e.to_string()))?;
            conn.query_row(
                "SELECT value FROM user_counters WHERE user_id = ?1 AND name = ?2",
                params![user_id, name],
                |row| row.get(0),
            )
            .map_err(|e| StoreError::Storage(e.to_string()))
        })
        .await
        .map_err(|e| StoreError::Storage(e.to_string()))?
    }
}
