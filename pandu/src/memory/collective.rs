//! Collective memory: knowledge shared across users.
//!
//! A fact becomes collective once enough distinct users contribute or
//! confirm it. Every write runs inside one immediate transaction so
//! contribution counting, promotion and confidence updates are atomic
//! against concurrent contributors. Invariants held after every write:
//!
//! - `content_hash` is unique (sha256 of the lowercased, trimmed content);
//! - `source_count` equals the count of distinct users with a
//!   `contribute`/`confirm` row;
//! - `is_promoted == (source_count >= promotion_threshold)`;
//! - confidence is recomputed from contribution rows, never stored deltas;
//! - a fact whose confidence falls below the removal threshold is deleted.

use std::path::Path;
use std::time::{SystemTime, UNIX_EPOCH};

use rusqlite::{params, Connection, OptionalExtension, TransactionBehavior};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use tracing::info;

use super::StoreError;

fn now_millis() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as i64)
        .unwrap_or(0)
}

/// A shared fact with its provenance counters.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct CollectiveMemory {
    pub id: i64,
    pub content: String,
    pub category: String,
    pub confidence: f64,
    pub source_count: u32,
    pub is_promoted: bool,
    pub first_learned_at: i64,
    pub last_confirmed_at: i64,
    pub metadata: serde_json::Value,
}

/// Result of one `add_contribution` call.
#[derive(Clone, Debug, PartialEq)]
pub enum ContributionOutcome {
    Created {
        memory_id: i64,
    },
    Confirmed {
        memory_id: i64,
        source_count: u32,
        is_promoted: bool,
    },
    AlreadyContributed {
        memory_id: i64,
        is_promoted: bool,
    },
}

/// Result of one `refute_fact` call.
#[derive(Clone, Debug, PartialEq)]
pub enum RefutationOutcome {
    NotFound,
    Refuted { confidence: f64, is_promoted: bool },
    Removed,
}

pub struct CollectiveMemoryService {
    db_path: std::path::PathBuf,
    promotion_threshold: u32,
    removal_threshold: f64,
}

/// Content dedup key: sha256 over the lowercased, trimmed content.
pub fn content_hash(content: &str) -> String {
    let normalized = content.to_lowercase();
    let digest = Sha256::digest(normalized.trim().as_bytes());
    format!("{digest:x}")
}

impl CollectiveMemoryService {
    pub fn new(
        path: impl AsRef<Path>,
        promotion_threshold: u32,
        removal_threshold: f64,
    ) -> Result<Self, StoreError> {
        let db_path = path.as_ref().to_path_buf();
        let conn = Connection::open(&db_path).map_err(|e| StoreError::Storage(e.to_string()))?;
        conn.execute_batch(
            r#"
            CREATE TABLE IF NOT EXISTS collective_memories (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                content TEXT NOT NULL,
                content_hash TEXT NOT NULL UNIQUE,
                category TEXT NOT NULL DEFAULT 'general',
                confidence REAL NOT NULL DEFAULT 1.0,
                source_count INTEGER NOT NULL DEFAULT 1,
                is_promoted INTEGER NOT NULL DEFAULT 0,
                first_learned_at INTEGER NOT NULL,
                last_confirmed_at INTEGER NOT NULL,
                metadata TEXT NOT NULL DEFAULT '{}'
            );
            CREATE TABLE IF NOT EXISTS collective_memory_sources (
                memory_id INTEGER NOT NULL,
                user_id TEXT NOT NULL,
                conversation_id TEXT,
                action TEXT NOT NULL CHECK (action IN ('contribute', 'confirm', 'refute')),
                contributed_at INTEGER NOT NULL,
                UNIQUE(memory_id, user_id, action)
            );
            "#,
        )
        .map_err(|e| StoreError::Storage(e.to_string()))?;
        Ok(Self {
            db_path,
            promotion_threshold,
            removal_threshold,
        })
    }

}

/// Opens a connection with a busy timeout so concurrent immediate
/// transactions queue instead of failing with `SQLITE_BUSY`.
fn open_queued(path: &std::path::Path) -> Result<Connection, StoreError> {
    let conn = Connection::open(path).map_err(|e| StoreError::Storage(e.to_string()))?;
    conn.busy_timeout(std::time::Duration::from_secs(5))
        .map_err(|e| StoreError::Storage(e.to_string()))?;
    Ok(conn)
}

impl CollectiveMemoryService {

    fn distinct_supporters(conn: &Connection, memory_id: i64) -> Result<u32, StoreError> {
        conn.query_row(
            "SELECT COUNT(DISTINCT user_id) FROM collective_memory_sources
             WHERE memory_id = ?1 AND action IN ('contribute', 'confirm')",
            params![memory_id],
            |row| row.get::<_, i64>(0),
        )
        .map(|n| n as u32)
        .map_err(|e| StoreError::Storage(e.to_string()))
    }

    /// Confidence from contribution rows: supporters / (supporters +
    /// refuters); 1.0 while unrefuted.
    fn recompute_confidence(conn: &Connection, memory_id: i64) -> Result<f64, StoreError> {
        let supporters = Self::distinct_supporters(conn, memory_id)? as f64;
        let refuters: i64 = conn
            .query_row(
                "SELECT COUNT(DISTINCT user_id) FROM collective_memory_sources
                 WHERE memory_id = ?1 AND action = 'refute'",
                params![memory_id],
                |row| row.get(0),
            )
            .map_err(|e| StoreError::Storage(e.to_string()))?;
        if refuters == 0 {
            return Ok(1.0);
        }
        Ok(supporters / (supporters + refuters as f64))
    }

    /// Adds a new fact or confirms an existing one for this user. A user
    /// contributing the same content twice changes nothing.
    pub async fn add_contribution(
        &self,
        user_id: &str,
        content: &str,
        category: &str,
        metadata: serde_json::Value,
    ) -> Result<ContributionOutcome, StoreError> {
        let db_path = self.db_path.clone();
        let promotion_threshold = self.promotion_threshold;
        let user_id = user_id.to_string();
        let content = content.to_string();
        let category = category.to_string();
        let hash = content_hash(&content);

        tokio::task::spawn_blocking(move || {
            let mut conn = open_queued(&db_path)?;
            let tx = conn
                .transaction_with_behavior(TransactionBehavior::Immediate)
                .map_err(|e| StoreError::Storage(e.to_string()))?;
            let now = now_millis();

            let existing: Option<(i64, bool)> = tx
                .query_row(
                    "SELECT id, is_promoted FROM collective_memories WHERE content_hash = ?1",
                    params![hash],
                    |row| Ok((row.get(0)?, row.get::<_, i64>(1)? != 0)),
                )
                .optional()
                .map_err(|e| StoreError::Storage(e.to_string()))?;

            let outcome = match existing {
                Some((memory_id, was_promoted)) => {
                    let already: Option<i64> = tx
                        .query_row(
                            "SELECT rowid FROM collective_memory_sources
                             WHERE memory_id = ?1 AND user_id = ?2
                               AND action IN ('contribute', 'confirm')",
                            params![memory_id, user_id],
                            |row| row.get(0),
                        )
                        .optional()
                        .map_err(|e| StoreError::Storage(e.to_string()))?;

                    if already.is_some() {
                        ContributionOutcome::AlreadyContributed {
                            memory_id,
                            is_promoted: was_promoted,
                        }
                    } else {
                        tx.execute(
                            "INSERT INTO collective_memory_sources
                             (memory_id, user_id, action, contributed_at)
                             VALUES (?1, ?2, 'confirm', ?3)",
                            params![memory_id, user_id, now],
                        )
                        .map_err(|e| StoreError::Storage(e.to_string()))?;

                        let source_count = Self::distinct_supporters(&tx, memory_id)?;
                        let confidence = Self::recompute_confidence(&tx, memory_id)?;
                        let is_promoted = source_count >= promotion_threshold;
                        tx.execute(
                            "UPDATE collective_memories
                             SET source_count = ?2, is_promoted = ?3, confidence = ?4,
                                 last_confirmed_at = ?5
                             WHERE id = ?1",
                            params![memory_id, source_count, is_promoted, confidence, now],
                        )
                        .map_err(|e| StoreError::Storage(e.to_string()))?;

                        if is_promoted && !was_promoted {
                            info!(memory_id, source_count, "collective fact promoted");
                        }
                        ContributionOutcome::Confirmed {
                            memory_id,
                            source_count,
                            is_promoted,
                        }
                    }
                }
                None => {
                    tx.execute(
                        "INSERT INTO collective_memories
                         (content, content_hash, category, metadata, source_count,
                          is_promoted, first_learned_at, last_confirmed_at)
                         VALUES (?1, ?2, ?3, ?4, 1, ?5, ?6, ?6)",
                        params![
                            content,
                            hash,
                            category,
                            metadata.to_string(),
                            promotion_threshold <= 1,
                            now
                        ],
                    )
                    .map_err(|e| StoreError::Storage(e.to_string()))?;
                    let memory_id = tx.last_insert_rowid();
                    tx.execute(
                        "INSERT INTO collective_memory_sources
                         (memory_id, user_id, action, contributed_at)
                         VALUES (?1, ?2, 'contribute', ?3)",
                        params![memory_id, user_id, now],
                    )
                    .map_err(|e| StoreError::Storage(e.to_string()))?;
                    ContributionOutcome::Created { memory_id }
                }
            };

            tx.commit().map_err(|e| StoreError::Storage(e.to_string()))?;
            Ok(outcome)
        })
        .await
        .map_err(|e| StoreError::Storage(e.to_string()))?
    }

    /// Records a refutation (idempotent per user) and recomputes confidence;
    /// deletes the fact when confidence drops below the removal threshold.
    pub async fn refute_fact(
        &self,
        user_id: &str,
        memory_id: i64,
    ) -> Result<RefutationOutcome, StoreError> {
        let db_path = self.db_path.clone();
        let promotion_threshold = self.promotion_threshold;
        let removal_threshold = self.removal_threshold;
        let user_id = user_id.to_string();

        tokio::task::spawn_blocking(move || {
            let mut conn = open_queued(&db_path)?;
            let tx = conn
                .transaction_with_behavior(TransactionBehavior::Immediate)
                .map_err(|e| StoreError::Storage(e.to_string()))?;

            let exists: Option<i64> = tx
                .query_row(
                    "SELECT id FROM collective_memories WHERE id = ?1",
                    params![memory_id],
                    |row| row.get(0),
                )
                .optional()
                .map_err(|e| StoreError::Storage(e.to_string()))?;
            if exists.is_none() {
                return Ok(RefutationOutcome::NotFound);
            }

            tx.execute(
                "INSERT OR IGNORE INTO collective_memory_sources
                 (memory_id, user_id, action, contributed_at)
                 VALUES (?1, ?2, 'refute', ?3)",
                params![memory_id, user_id, now_millis()],
            )
            .map_err(|e| StoreError::Storage(e.to_string()))?;

            let confidence = Self::recompute_confidence(&tx, memory_id)?;
            if confidence < removal_threshold {
                tx.execute(
                    "DELETE FROM collective_memories WHERE id = ?1",
                    params![memory_id],
                )
                .map_err(|e| StoreError::Storage(e.to_string()))?;
                tx.execute(
                    "DELETE FROM collective_memory_sources WHERE memory_id = ?1",
                    params![memory_id],
                )
                .map_err(|e| StoreError::Storage(e.to_string()))?;
                tx.commit().map_err(|e| StoreError::Storage(e.to_string()))?;
                info!(memory_id, confidence, "collective fact removed (low confidence)");
                return Ok(RefutationOutcome::Removed);
            }

            let source_count = Self::distinct_supporters(&tx, memory_id)?;
            let is_promoted = source_count >= promotion_threshold;
            tx.execute(
                "UPDATE collective_memories SET confidence = ?2, source_count = ?3,
                 is_promoted = ?4 WHERE id = ?1",
                params![memory_id, confidence, source_count, is_promoted],
            )
            .map_err(|e| StoreError::Storage(e.to_string()))?;
            tx.commit().map_err(|e| StoreError::Storage(e.to_string()))?;
            Ok(RefutationOutcome::Refuted {
                confidence,
                is_promoted,
            })
        })
        .await
        .map_err(|e| StoreError::Storage(e.to_string()))?
    }

    /// Promoted facts for prompt context, best first.
    pub async fn get_collective_context(
        &self,
        category: Option<&str>,
        limit: usize,
    ) -> Result<Vec<String>, StoreError> {
        let db_path = self.db_path.clone();
        let category = category.map(str::to_string);
        tokio::task::spawn_blocking(move || {
            let conn = open_queued(&db_path)?;
            let mut out = Vec::new();
            match category {
                Some(cat) => {
                    let mut stmt = conn
                        .prepare(
                            "SELECT content FROM collective_memories
                             WHERE is_promoted = 1 AND category = ?1
                             ORDER BY confidence DESC, source_count DESC LIMIT ?2",
                        )
                        .map_err(|e| StoreError::Storage(e.to_string()))?;
                    let rows = stmt
                        .query_map(params![cat, limit as i64], |row| row.get::<_, String>(0))
                        .map_err(|e| StoreError::Storage(e.to_string()))?;
                    for row in rows {
                        out.push(row.map_err(|e| StoreError::Storage(e.to_string()))?);
                    }
                }
                None => {
                    let mut stmt = conn
                        .prepare(
                            "SELECT content FROM collective_memories
                             WHERE is_promoted = 1
                             ORDER BY confidence DESC, source_count DESC LIMIT ?1",
                        )
                        .map_err(|e| StoreError::Storage(e.to_string()))?;
                    let rows = stmt
                        .query_map(params![limit as i64], |row| row.get::<_, String>(0))
                        .map_err(|e| StoreError::Storage(e.to_string()))?;
                    for row in rows {
                        out.push(row.map_err(|e| StoreError::Storage(e.to_string()))?);
                    }
                }
            }
            Ok(out)
        })
        .await
        .map_err(|e| StoreError::Storage(e.to_string()))?
    }

    /// Fetches one fact with counters, for diagnostics and tests.
    pub async fn get_fact(&self, memory_id: i64) -> Result<Option<CollectiveMemory>, StoreError> {
        let db_path = self.db_path.clone();
        tokio::task::spawn_blocking(move || {
            let conn = open_queued(&db_path)?;
            conn.query_row(
                "SELECT id, content, category, confidence, source_count, is_promoted,
                        first_learned_at, last_confirmed_at, metadata
                 FROM collective_memories WHERE id = ?1",
                params![memory_id],
                |row| {
                    Ok(CollectiveMemory {
                        id: row.get(0)?,
                        content: row.get(1)?,
                        category: row.get(2)?,
                        confidence: row.get(3)?,
                        source_count: row.get::<_, i64>(4)? as u32,
                        is_promoted: row.get::<_, i64>(5)? != 0,
                        first_learned_at: row.get(6)?,
                        last_confirmed_at: row.get(7)?,
                        metadata: serde_json::from_str(&row.get::<_, String>(8)?)
                            .unwrap_or(serde_json::Value::Null),
                    })
                },
            )
            .optional()
            .map_err(|e| StoreError::Storage(e.to_string()))
        })
        .await
        .map_err(|e| StoreError::Storage(e.to_string()))?
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    const FACT: &str = "KITAS extension requires a sponsor letter";

    fn service() -> (CollectiveMemoryService, tempfile::TempDir) {
        let dir = tempfile::tempdir().unwrap();
        let svc =
            CollectiveMemoryService::new(dir.path().join("collective.db"), 3, 0.2).unwrap();
        (svc, dir)
    }

    #[tokio::test]
    async fn three_distinct_users_promote_a_fact() {
        let (svc, _dir) = service();
        let ContributionOutcome::Created { memory_id } = svc
            .add_contribution("a@x.com", FACT, "process", json!({}))
            .await
            .unwrap()
        else {
            panic!("expected created");
        };

        svc.add_contribution("b@x.com", FACT, "process", json!({}))
            .await
            .unwrap();
        let third = svc
            .add_contribution("c@x.com", FACT, "process", json!({}))
            .await
            .unwrap();
        assert_eq!(
            third,
            ContributionOutcome::Confirmed {
                memory_id,
                source_count: 3,
                is_promoted: true,
            }
        );

        let fact = svc.get_fact(memory_id).await.unwrap().unwrap();
        assert_eq!(fact.source_count, 3);
        assert!(fact.is_promoted);
        assert_eq!(fact.confidence, 1.0);

        // A fourth distinct user keeps counting.
        let fourth = svc
            .add_contribution("d@x.com", FACT, "process", json!({}))
            .await
            .unwrap();
        assert!(matches!(
            fourth,
            ContributionOutcome::Confirmed { source_count: 4, .. }
        ));
    }

    #[tokio::test]
    async fn same_user_twice_increments_at_most_once() {
        let (svc, _dir) = service();
        let ContributionOutcome::Created { memory_id } = svc
            .add_contribution("a@x.com", FACT, "process", json!({}))
            .await
            .unwrap()
        else {
            panic!("expected created");
        };
        let again = svc
            .add_contribution("a@x.com", FACT, "process", json!({}))
            .await
            .unwrap();
        assert_eq!(
            again,
            ContributionOutcome::AlreadyContributed {
                memory_id,
                is_promoted: false,
            }
        );
        let fact = svc.get_fact(memory_id).await.unwrap().unwrap();
        assert_eq!(fact.source_count, 1);
    }

    #[tokio::test]
    async fn content_hash_normalizes_case_and_whitespace() {
        let (svc, _dir) = service();
        svc.add_contribution("a@x.com", FACT, "process", json!({}))
            .await
            .unwrap();
        let confirm = svc
            .add_contribution("b@x.com", "  KITAS EXTENSION requires a sponsor letter  ", "process", json!({}))
            .await
            .unwrap();
        assert!(matches!(confirm, ContributionOutcome::Confirmed { .. }));
    }

    #[tokio::test]
    async fn refutes_lower_confidence_then_remove() {
        let (svc, _dir) = service();
        let ContributionOutcome::Created { memory_id } = svc
            .add_contribution("a@x.com", FACT, "process", json!({}))
            .await
            .unwrap()
        else {
            panic!("expected created");
        };

        // One supporter, three refuters: confidence 1/4 = 0.25, still alive.
        for user in ["r1", "r2", "r3"] {
            let out = svc.refute_fact(user, memory_id).await.unwrap();
            assert!(!matches!(out, RefutationOutcome::NotFound));
        }
        let fact = svc.get_fact(memory_id).await.unwrap().unwrap();
        assert!((fact.confidence - 0.25).abs() < 1e-9);

        // Fourth refuter: 1/5 = 0.2 is not below 0.2; fifth pushes it under.
        svc.refute_fact("r4", memory_id).await.unwrap();
        let out = svc.refute_fact("r5", memory_id).await.unwrap();
        assert_eq!(out, RefutationOutcome::Removed);
        assert!(svc.get_fact(memory_id).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn refute_is_idempotent_per_user() {
        let (svc, _dir) = service();
        let ContributionOutcome::Created { memory_id } = svc
            .add_contribution("a@x.com", FACT, "process", json!({}))
            .await
            .unwrap()
        else {
            panic!("expected created");
        };
        let first = svc.refute_fact("r1", memory_id).await.unwrap();
        let second = svc.refute_fact("r1", memory_id).await.unwrap();
        assert_eq!(first, second);
    }

    #[tokio::test]
    async fn refuting_missing_fact_is_not_found() {
        let (svc, _dir) = service();
        assert_eq!(
            svc.refute_fact("r1", 999).await.unwrap(),
            RefutationOutcome::NotFound
        );
    }

    #[tokio::test]
    async fn collective_context_returns_promoted_only_ordered() {
        let (svc, _dir) = service();
        for user in ["a", "b", "c"] {
            svc.add_contribution(user, FACT, "process", json!({}))
                .await
                .unwrap();
        }
        // Second fact never promoted.
        svc.add_contribution("a", "NPWP registration takes two weeks", "process", json!({}))
            .await
            .unwrap();

        let ctx = svc.get_collective_context(None, 10).await.unwrap();
        assert_eq!(ctx, vec![FACT.to_string()]);

        let none = svc.get_collective_context(Some("pricing"), 10).await.unwrap();
        assert!(none.is_empty());
    }

    #[tokio::test]
    async fn concurrent_contributions_count_distinct_users_exactly() {
        let (svc, _dir) = service();
        let svc = std::sync::Arc::new(svc);
        let mut handles = Vec::new();
        for i in 0..6 {
            let svc = std::sync::Arc::clone(&svc);
            handles.push(tokio::spawn(async move {
                svc.add_contribution(&format!("user{i}@x.com"), FACT, "process", json!({}))
                    .await
            }));
        }
        for h in handles {
            h.await.unwrap().unwrap();
        }
        let ctx = svc.get_collective_context(None, 10).await.unwrap();
        assert_eq!(ctx.len(), 1);
        // source_count equals the number of distinct contributors.
        let fact = svc.get_fact(1).await.unwrap().unwrap();
        assert_eq!(fact.source_count, 6);
        assert!(fact.is_promoted);
    }
}
