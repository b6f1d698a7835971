use std::sync::Arc;

use chrono::Utc;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::db::ConnectionManager;
use crate::embedding::{EmbeddingMode, EmbeddingService};
use crate::error::{DhakiraError, Result};
use crate::search::vector_literal;

/// Default similarity floor for recall results.
pub const DEFAULT_RECALL_MIN_SCORE: f64 = 0.3;

const SECTION_SEPARATOR: &str = "\n\n---\n\n";

/// A single recalled memory with its similarity score.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MemoryRecallResult {
    pub memory_id: String,
    pub text: String,
    pub importance: f64,
    pub category: String,
    pub score: f64,
}

/// Long-term semantic memory plus the day-bucketed journal.
///
/// Performs no in-process caching — every call goes to the database, with
/// concurrency bounded only by the connection pool.
pub struct MemoryStore {
    cm: ConnectionManager,
    agent_id: String,
    embedding: Option<Arc<EmbeddingService>>,
    recall_min_score: f64,
}

impl MemoryStore {
    pub fn new(
        cm: ConnectionManager,
        agent_id: impl Into<String>,
        embedding: Option<Arc<EmbeddingService>>,
    ) -> Self {
        Self {
            cm,
            agent_id: agent_id.into(),
            embedding,
            recall_min_score: DEFAULT_RECALL_MIN_SCORE,
        }
    }

    pub fn with_recall_min_score(mut self, min_score: f64) -> Self {
        self.recall_min_score = min_score;
        self
    }

    fn in_database_model(&self) -> Option<String> {
        self.embedding
            .as_deref()
            .filter(|svc| svc.mode() == EmbeddingMode::InDatabase)
            .map(|svc| svc.model_name().to_string())
    }

    /// Store a new memory and return its generated id.
    ///
    /// In-database mode computes the embedding inline in the insert; API
    /// mode embeds first and degrades to a vector-less row if the embedding
    /// backend fails; with no embedding service the row is stored without
    /// a vector unconditionally.
    pub async fn remember(
        &self,
        text: &str,
        importance: f64,
        category: &str,
    ) -> Result<String> {
        let memory_id = short_id();
        let agent_id = self.agent_id.clone();
        let text_owned = text.to_string();
        let category_owned = category.to_string();

        if let Some(model) = self.in_database_model() {
            // Text is bound twice: once as content, once as embedding input.
            let id = memory_id.clone();
            self.cm
                .with_conn(move |conn| {
                    let sql = format!(
                        "INSERT INTO PICO_MEMORIES (memory_id, agent_id, content, embedding, importance, category)
                         VALUES (:1, :2, :3, VECTOR_EMBEDDING({model} USING :4 AS DATA), :5, :6)"
                    );
                    conn.execute(
                        &sql,
                        &[&id, &agent_id, &text_owned, &text_owned, &importance, &category_owned],
                    )?;
                    Ok(())
                })
                .await
                .map_err(|e| DhakiraError::Storage(format!("failed to remember: {e}")))?;
        } else if let Some(svc) = self.embedding.as_deref() {
            match svc.embed_text(text).await {
                Ok(embedding) => {
                    let vec_str = vector_literal(&embedding);
                    let id = memory_id.clone();
                    self.cm
                        .with_conn(move |conn| {
                            conn.execute(
                                "INSERT INTO PICO_MEMORIES (memory_id, agent_id, content, embedding, importance, category)
                                 VALUES (:1, :2, :3, TO_VECTOR(:4), :5, :6)",
                                &[&id, &agent_id, &text_owned, &vec_str, &importance, &category_owned],
                            )?;
                            Ok(())
                        })
                        .await
                        .map_err(|e| DhakiraError::Storage(format!("failed to remember: {e}")))?;
                }
                Err(e) => {
                    tracing::warn!("embedding failed, storing without vector: {e}");
                    let id = memory_id.clone();
                    self.cm
                        .with_conn(move |conn| {
                            conn.execute(
                                "INSERT INTO PICO_MEMORIES (memory_id, agent_id, content, importance, category)
                                 VALUES (:1, :2, :3, :4, :5)",
                                &[&id, &agent_id, &text_owned, &importance, &category_owned],
                            )?;
                            Ok(())
                        })
                        .await
                        .map_err(|e| DhakiraError::Storage(format!("failed to remember: {e}")))?;
                }
            }
        } else {
            let id = memory_id.clone();
            self.cm
                .with_conn(move |conn| {
                    conn.execute(
                        "INSERT INTO PICO_MEMORIES (memory_id, agent_id, content, importance, category)
                         VALUES (:1, :2, :3, :4, :5)",
                        &[&id, &agent_id, &text_owned, &importance, &category_owned],
                    )?;
                    Ok(())
                })
                .await
                .map_err(|e| DhakiraError::Storage(format!("failed to remember: {e}")))?;
        }

        tracing::info!(
            "memory stored: {memory_id} (importance {importance}, category {category:?})"
        );
        Ok(memory_id)
    }

    /// Semantic similarity search over the agent's memories.
    ///
    /// Results are ordered by ascending cosine distance, converted to
    /// `score = 1 - distance`, and dropped below the minimum score. Every
    /// returned memory gets its access timestamp and counter bumped
    /// (best-effort).
    pub async fn recall(&self, query: &str, max_results: usize) -> Result<Vec<MemoryRecallResult>> {
        let Some(svc) = self.embedding.as_deref() else {
            return Err(DhakiraError::Embedding(
                "embedding service not available".into(),
            ));
        };

        let agent_id = self.agent_id.clone();
        let max = max_results as i64;
        let min_score = self.recall_min_score;

        let rows = if let Some(model) = self.in_database_model() {
            let query_owned = query.to_string();
            self.cm
                .with_conn(move |conn| {
                    let sql = format!(
                        "SELECT memory_id, content, importance, category,
                                VECTOR_DISTANCE(embedding, VECTOR_EMBEDDING({model} USING :1 AS DATA), COSINE) AS distance
                         FROM PICO_MEMORIES
                         WHERE agent_id = :2 AND embedding IS NOT NULL
                         ORDER BY distance ASC
                         FETCH FIRST :3 ROWS ONLY"
                    );
                    collect_recall_rows(conn, &sql, &[&query_owned, &agent_id, &max], min_score)
                })
                .await
                .map_err(|e| DhakiraError::Storage(format!("recall query failed: {e}")))?
        } else {
            let query_vec = svc
                .embed_text(query)
                .await
                .map_err(|e| DhakiraError::Embedding(format!("failed to embed query: {e}")))?;
            let vec_str = vector_literal(&query_vec);
            self.cm
                .with_conn(move |conn| {
                    collect_recall_rows(
                        conn,
                        "SELECT memory_id, content, importance, category,
                                VECTOR_DISTANCE(embedding, TO_VECTOR(:1), COSINE) AS distance
                         FROM PICO_MEMORIES
                         WHERE agent_id = :2 AND embedding IS NOT NULL
                         ORDER BY distance ASC
                         FETCH FIRST :3 ROWS ONLY",
                        &[&vec_str, &agent_id, &max],
                        min_score,
                    )
                })
                .await
                .map_err(|e| DhakiraError::Storage(format!("recall query failed: {e}")))?
        };

        if !rows.is_empty() {
            let ids: Vec<String> = rows.iter().map(|r| r.memory_id.clone()).collect();
            self.bump_access(ids).await;
        }

        Ok(rows)
    }

    /// Update access timestamp and counter for recalled memories.
    /// Errors here are not surfaced to the recall caller.
    async fn bump_access(&self, memory_ids: Vec<String>) {
        let outcome = self
            .cm
            .with_conn(move |conn| {
                for id in &memory_ids {
                    let _ = conn.execute(
                        "UPDATE PICO_MEMORIES
                         SET accessed_at = CURRENT_TIMESTAMP, access_count = access_count + 1
                         WHERE memory_id = :1",
                        &[id],
                    );
                }
                Ok(())
            })
            .await;

        if let Err(e) = outcome {
            tracing::debug!("failed to update access timestamps: {e}");
        }
    }

    /// Delete a memory by id. Zero affected rows is a distinct not-found
    /// error.
    pub async fn forget(&self, memory_id: &str) -> Result<()> {
        let id = memory_id.to_string();
        let agent_id = self.agent_id.clone();
        let affected = self
            .cm
            .with_conn(move |conn| {
                let stmt = conn.execute(
                    "DELETE FROM PICO_MEMORIES WHERE memory_id = :1 AND agent_id = :2",
                    &[&id, &agent_id],
                )?;
                Ok(stmt.row_count()?)
            })
            .await
            .map_err(|e| DhakiraError::Storage(format!("forget failed: {e}")))?;

        if affected == 0 {
            return Err(DhakiraError::NotFound(format!(
                "memory {memory_id} not found"
            )));
        }
        Ok(())
    }

    /// All long-term memories joined with a visible separator, most
    /// important and most recent first.
    pub async fn read_long_term(&self) -> String {
        let agent_id = self.agent_id.clone();
        let contents = self
            .cm
            .with_conn(move |conn| {
                let rows = conn.query_as::<Option<String>>(
                    "SELECT content FROM PICO_MEMORIES WHERE agent_id = :1
                     ORDER BY importance DESC, created_at DESC",
                    &[&agent_id],
                )?;
                let mut parts = Vec::new();
                for row in rows {
                    if let Ok(Some(content)) = row {
                        parts.push(content);
                    }
                }
                Ok(parts)
            })
            .await;

        match contents {
            Ok(parts) => parts.join(SECTION_SEPARATOR),
            Err(e) => {
                tracing::warn!("failed to read long-term memories: {e}");
                String::new()
            }
        }
    }

    /// Sugar for [`remember`](Self::remember) with fixed importance and
    /// category.
    pub async fn write_long_term(&self, content: &str) -> Result<()> {
        self.remember(content, 0.7, "long_term").await.map(|_| ())
    }

    /// Today's journal note, or empty if none exists yet.
    pub async fn read_today(&self) -> String {
        let agent_id = self.agent_id.clone();
        let result = self
            .cm
            .with_conn(move |conn| {
                let content: Option<String> = conn.query_row_as(
                    "SELECT content FROM PICO_DAILY_NOTES
                     WHERE agent_id = :1 AND note_date = TRUNC(SYSDATE)
                     ORDER BY updated_at DESC
                     FETCH FIRST 1 ROW ONLY",
                    &[&agent_id],
                )?;
                Ok(content)
            })
            .await;

        match result {
            Ok(Some(content)) => content,
            _ => String::new(),
        }
    }

    /// Append to today's note, creating it with a dated header when absent.
    /// In-database mode re-embeds the full note text on every change.
    pub async fn append_today(&self, content: &str) -> Result<()> {
        let existing = self.read_today().await;
        let agent_id = self.agent_id.clone();
        let model = self.in_database_model();

        if existing.is_empty() {
            let header = format!("# {}\n\n", Utc::now().format("%Y-%m-%d"));
            let full_content = header + content;
            let note_id = short_id();

            return self
                .cm
                .with_conn(move |conn| {
                    if let Some(model) = model {
                        let sql = format!(
                            "INSERT INTO PICO_DAILY_NOTES (note_id, agent_id, note_date, content, embedding)
                             VALUES (:1, :2, TRUNC(SYSDATE), :3, VECTOR_EMBEDDING({model} USING :4 AS DATA))"
                        );
                        conn.execute(&sql, &[&note_id, &agent_id, &full_content, &full_content])?;
                    } else {
                        conn.execute(
                            "INSERT INTO PICO_DAILY_NOTES (note_id, agent_id, note_date, content)
                             VALUES (:1, :2, TRUNC(SYSDATE), :3)",
                            &[&note_id, &agent_id, &full_content],
                        )?;
                    }
                    Ok(())
                })
                .await
                .map_err(|e| DhakiraError::Storage(format!("failed to write daily note: {e}")));
        }

        let new_content = format!("{existing}\n{content}");
        self.cm
            .with_conn(move |conn| {
                if let Some(model) = model {
                    let sql = format!(
                        "UPDATE PICO_DAILY_NOTES
                         SET content = :1, embedding = VECTOR_EMBEDDING({model} USING :2 AS DATA),
                             updated_at = CURRENT_TIMESTAMP
                         WHERE agent_id = :3 AND note_date = TRUNC(SYSDATE)"
                    );
                    conn.execute(&sql, &[&new_content, &new_content, &agent_id])?;
                } else {
                    conn.execute(
                        "UPDATE PICO_DAILY_NOTES
                         SET content = :1, updated_at = CURRENT_TIMESTAMP
                         WHERE agent_id = :2 AND note_date = TRUNC(SYSDATE)",
                        &[&new_content, &agent_id],
                    )?;
                }
                Ok(())
            })
            .await
            .map_err(|e| DhakiraError::Storage(format!("failed to write daily note: {e}")))
    }

    /// Notes from the trailing `days` days, most recent first.
    pub async fn get_recent_daily_notes(&self, days: i64) -> String {
        let agent_id = self.agent_id.clone();
        let notes = self
            .cm
            .with_conn(move |conn| {
                let rows = conn.query_as::<Option<String>>(
                    "SELECT content FROM PICO_DAILY_NOTES
                     WHERE agent_id = :1 AND note_date >= TRUNC(SYSDATE) - :2
                     ORDER BY note_date DESC",
                    &[&agent_id, &days],
                )?;
                let mut notes = Vec::new();
                for row in rows {
                    if let Ok(Some(content)) = row {
                        notes.push(content);
                    }
                }
                Ok(notes)
            })
            .await;

        match notes {
            Ok(notes) => notes.join(SECTION_SEPARATOR),
            Err(_) => String::new(),
        }
    }

    /// One formatted block combining long-term memories and the last three
    /// days of notes; empty when there is nothing to show.
    pub async fn get_memory_context(&self) -> String {
        let mut parts = Vec::new();

        let long_term = self.read_long_term().await;
        if !long_term.is_empty() {
            parts.push(format!("## Long-term Memory\n\n{long_term}"));
        }

        let recent_notes = self.get_recent_daily_notes(3).await;
        if !recent_notes.is_empty() {
            parts.push(format!("## Recent Daily Notes\n\n{recent_notes}"));
        }

        if parts.is_empty() {
            return String::new();
        }

        format!("# Memory\n\n{}", parts.join(SECTION_SEPARATOR))
    }
}

/// Scan recall rows, convert distance to similarity, and apply the floor.
/// Runs inside `with_conn`, so it must stay synchronous.
fn collect_recall_rows(
    conn: &oracle::Connection,
    sql: &str,
    params: &[&dyn oracle::sql_type::ToSql],
    min_score: f64,
) -> Result<Vec<MemoryRecallResult>> {
    let rows =
        conn.query_as::<(String, Option<String>, f64, Option<String>, f64)>(sql, params)?;

    let mut results = Vec::new();
    for row in rows {
        let Ok((memory_id, content, importance, category, distance)) = row else {
            continue;
        };
        let score = 1.0 - distance;
        if score < min_score {
            continue;
        }
        results.push(MemoryRecallResult {
            memory_id,
            text: content.unwrap_or_default(),
            importance,
            category: category.unwrap_or_default(),
            score,
        });
    }
    Ok(results)
}

/// Short random id: the first 8 hex chars of a v4 UUID.
fn short_id() -> String {
    Uuid::new_v4().simple().to_string()[..8].to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_short_id_shape() {
        let id = short_id();
        assert_eq!(id.len(), 8);
        assert!(id.chars().all(|c| c.is_ascii_hexdigit()));
    }

    #[test]
    fn test_short_ids_are_random() {
        assert_ne!(short_id(), short_id());
    }

    #[test]
    fn test_recall_result_serde() {
        let result = MemoryRecallResult {
            memory_id: "ab12cd34".to_string(),
            text: "User likes Go".to_string(),
            importance: 0.8,
            category: "preference".to_string(),
            score: 0.92,
        };
        let json = serde_json::to_value(&result).unwrap();
        assert_eq!(json["memory_id"], "ab12cd34");
        assert_eq!(json["score"], 0.92);
        let back: MemoryRecallResult = serde_json::from_value(json).unwrap();
        assert_eq!(back, result);
    }

    #[test]
    fn test_section_separator() {
        assert_eq!(SECTION_SEPARATOR, "\n\n---\n\n");
    }
}
