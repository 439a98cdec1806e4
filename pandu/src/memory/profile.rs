//! Profile and conversation store: the composite read that assembles a
//! user's profile plus their latest conversation in one query.
//!
//! The core only reads these tables at query time; the writers exist for
//! seeding and upstream services.

use std::path::Path;
use std::time::{SystemTime, UNIX_EPOCH};

use rusqlite::{params, OptionalExtension};
use serde::{Deserialize, Serialize};

use crate::message::Message;

use super::StoreError;

/// Profile row as consumed by the prompt builder.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct UserProfile {
    pub id: String,
    pub name: Option<String>,
    pub role: Option<String>,
    pub department: Option<String>,
    pub language_pref: Option<String>,
    pub notes: Option<String>,
    pub email: Option<String>,
}

fn now_millis() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as i64)
        .unwrap_or(0)
}

pub struct ProfileStore {
    db_path: std::path::PathBuf,
}

impl ProfileStore {
    pub fn new(path: impl AsRef<Path>) -> Result<Self, StoreError> {
        let db_path = path.as_ref().to_path_buf();
        let conn =
            rusqlite::Connection::open(&db_path).map_err(|e| StoreError::Storage(e.to_string()))?;
        conn.execute_batch(
            r#"
            CREATE TABLE IF NOT EXISTS user_profiles (
                id TEXT PRIMARY KEY,
                email TEXT UNIQUE,
                full_name TEXT,
                role TEXT,
                department TEXT,
                language_pref TEXT,
                notes TEXT
            );
            CREATE TABLE IF NOT EXISTS conversations (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                user_id TEXT NOT NULL,
                session_id TEXT,
                messages TEXT NOT NULL,
                created_at INTEGER NOT NULL
            );
            CREATE INDEX IF NOT EXISTS idx_conversations_user
                ON conversations (user_id, created_at DESC);
            "#,
        )
        .map_err(|e| StoreError::Storage(e.to_string()))?;
        Ok(Self { db_path })
    }

    pub async fn upsert_profile(&self, profile: UserProfile) -> Result<(), StoreError> {
        let db_path = self.db_path.clone();
        tokio::task::spawn_blocking(move || {
            let conn = rusqlite::Connection::open(&db_path)
                .map_err(|e| StoreError::Storage(e.to_string()))?;
            conn.execute(
                "INSERT OR REPLACE INTO user_profiles
                 (id, email, full_name, role, department, language_pref, notes)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
                params![
                    profile.id,
                    profile.email,
                    profile.name,
                    profile.role,
                    profile.department,
                    profile.language_pref,
                    profile.notes
                ],
            )
            .map_err(|e| StoreError::Storage(e.to_string()))?;
            Ok(())
        })
        .await
        .map_err(|e| StoreError::Storage(e.to_string()))?
    }

    pub async fn append_conversation(
        &self,
        user_id: &str,
        session_id: Option<&str>,
        messages: &[Message],
    ) -> Result<(), StoreError> {
        let db_path = self.db_path.clone();
        let user_id = user_id.to_string();
        let session_id = session_id.map(str::to_string);
        let payload = serde_json::to_string(messages)?;
        tokio::task::spawn_blocking(move || {
            let conn = rusqlite::Connection::open(&db_path)
                .map_err(|e| StoreError::Storage(e.to_string()))?;
            conn.execute(
                "INSERT INTO conversations (user_id, session_id, messages, created_at)
                 VALUES (?1, ?2, ?3, ?4)",
                params![user_id, session_id, payload, now_millis()],
            )
            .map_err(|e| StoreError::Storage(e.to_string()))?;
            Ok(())
        })
        .await
        .map_err(|e| StoreError::Storage(e.to_string()))?
    }

    /// One composite query: the profile plus the latest conversation
    /// (optionally filtered to one session). Never one query per message.
    /// Returns the last `history_limit` messages of that conversation.
    pub async fn fetch_profile_and_history(
        &self,
        user_id: &str,
        session_id: Option<&str>,
        history_limit: usize,
    ) -> Result<Option<(UserProfile, Vec<Message>)>, StoreError> {
        let db_path = self.db_path.clone();
        let user_id = user_id.to_string();
        let session_id = session_id.map(str::to_string);
        tokio::task::spawn_blocking(move || {
            let conn = rusqlite::Connection::open(&db_path)
                .map_err(|e| StoreError::Storage(e.to_string()))?;
            let row = conn
                .query_row(
                    r#"
                    SELECT p.id, p.email, p.full_name, p.role, p.department,
                           p.language_pref, p.notes,
                           (
                               SELECT c.messages FROM conversations c
                               WHERE (c.user_id = p.id OR c.user_id = p.email)
                                 AND (?2 IS NULL OR c.session_id = ?2)
                               ORDER BY c.created_at DESC, c.id DESC
                               LIMIT 1
                           ) AS latest_messages
                    FROM user_profiles p
                    WHERE p.id = ?1 OR p.email = ?1
                    "#,
                    params![user_id, session_id],
                    |row| {
                        Ok((
                            UserProfile {
                                id: row.get(0)?,
                                email: row.get(1)?,
                                name: row.get(2)?,
                                role: row.get(3)?,
                                department: row.get(4)?,
                                language_pref: row.get(5)?,
                                notes: row.get(6)?,
                            },
                            row.get::<_, Option<String>>(7)?,
                        ))
                    },
                )
                .optional()
                .map_err(|e| StoreError::Storage(e.to_string()))?;

            let Some((profile, raw_messages)) = row else {
                return Ok(None);
            };

            let mut history: Vec<Message> = raw_messages
                .as_deref()
                .map(serde_json::from_str)
                .transpose()?
                .unwrap_or_default();
            if history.len() > history_limit {
                history = history.split_off(history.len() - history_limit);
            }
            Ok(Some((profile, history)))
        })
        .await
        .map_err(|e| StoreError::Storage(e.to_string()))?
    }
}
