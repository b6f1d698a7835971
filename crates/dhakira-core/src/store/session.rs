use std::collections::HashMap;
use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};

use chrono::{DateTime, NaiveDateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::db::ConnectionManager;
use crate::error::{DhakiraError, Result};

/// One role-tagged message in a conversation history.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Message {
    pub role: String,
    pub content: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool_call_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool_calls: Option<serde_json::Value>,
}

impl Message {
    pub fn new(role: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            role: role.into(),
            content: content.into(),
            tool_call_id: None,
            tool_calls: None,
        }
    }
}

/// A cached conversation: ordered messages plus a free-text summary.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Session {
    pub key: String,
    pub messages: Vec<Message>,
    #[serde(default)]
    pub summary: String,
    pub created: DateTime<Utc>,
    pub updated: DateTime<Utc>,
}

impl Session {
    fn new(key: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            key: key.into(),
            messages: Vec::new(),
            summary: String::new(),
            created: now,
            updated: now,
        }
    }
}

/// Write-through cache of conversation histories, persisted on explicit
/// [`save`](Self::save).
///
/// The cache is owned by the store and guarded by one reader/writer lock;
/// guards are never held across database I/O.
pub struct SessionStore {
    cm: ConnectionManager,
    agent_id: String,
    sessions: RwLock<HashMap<String, Session>>,
}

impl SessionStore {
    /// Construct the store and preload every session for the agent.
    /// Load failures degrade to an empty cache rather than failing.
    pub async fn new(cm: ConnectionManager, agent_id: impl Into<String>) -> Self {
        let store = Self {
            cm,
            agent_id: agent_id.into(),
            sessions: RwLock::new(HashMap::new()),
        };
        store.load_all().await;
        store
    }

    // A poisoned lock only means some writer panicked mid-update; the map
    // itself is still structurally sound, so recover the guard.
    fn read_cache(&self) -> RwLockReadGuard<'_, HashMap<String, Session>> {
        self.sessions.read().unwrap_or_else(|e| e.into_inner())
    }

    fn write_cache(&self) -> RwLockWriteGuard<'_, HashMap<String, Session>> {
        self.sessions.write().unwrap_or_else(|e| e.into_inner())
    }

    /// Return a snapshot of the session, creating an empty one if absent.
    pub fn get_or_create(&self, key: &str) -> Session {
        let mut cache = self.write_cache();
        cache
            .entry(key.to_string())
            .or_insert_with(|| Session::new(key))
            .clone()
    }

    /// Append a simple role/content message.
    pub fn add_message(&self, key: &str, role: &str, content: &str) {
        self.add_full_message(key, Message::new(role, content));
    }

    /// Append a complete message (including tool calls), auto-creating the
    /// session if absent.
    pub fn add_full_message(&self, key: &str, message: Message) {
        let mut cache = self.write_cache();
        let session = cache
            .entry(key.to_string())
            .or_insert_with(|| Session::new(key));
        session.messages.push(message);
        session.updated = Utc::now();
    }

    /// Return an independent copy of the message history. Mutating the
    /// returned vector never affects the cached session.
    pub fn get_history(&self, key: &str) -> Vec<Message> {
        self.read_cache()
            .get(key)
            .map(|s| s.messages.clone())
            .unwrap_or_default()
    }

    pub fn get_summary(&self, key: &str) -> String {
        self.read_cache()
            .get(key)
            .map(|s| s.summary.clone())
            .unwrap_or_default()
    }

    pub fn set_summary(&self, key: &str, summary: &str) {
        if let Some(session) = self.write_cache().get_mut(key) {
            session.summary = summary.to_string();
            session.updated = Utc::now();
        }
    }

    /// Keep only the most recent `keep_last` messages; 0 clears the
    /// history entirely. A no-op when the history is already short enough.
    pub fn truncate_history(&self, key: &str, keep_last: usize) {
        if let Some(session) = self.write_cache().get_mut(key) {
            truncate_messages(&mut session.messages, keep_last);
            session.updated = Utc::now();
        }
    }

    /// Replace the session's full message history. No-op if the session is
    /// not cached.
    pub fn set_history(&self, key: &str, history: Vec<Message>) {
        if let Some(session) = self.write_cache().get_mut(key) {
            session.messages = history;
            session.updated = Utc::now();
        }
    }

    /// Persist the session via MERGE upsert. Not an error if the key has no
    /// cached session.
    ///
    /// The message list and summary are snapshotted under the read lock,
    /// which is released before the blocking write: a concurrent append may
    /// make the written snapshot slightly stale, but it is always a valid
    /// prior state, never a torn one.
    pub async fn save(&self, key: &str) -> Result<()> {
        let (messages_json, summary) = {
            let cache = self.read_cache();
            let Some(session) = cache.get(key) else {
                return Ok(());
            };
            (serde_json::to_string(&session.messages)?, session.summary.clone())
        };

        let key = key.to_string();
        let agent_id = self.agent_id.clone();
        self.cm
            .with_conn(move |conn| {
                conn.execute(
                    "MERGE INTO PICO_SESSIONS s
                     USING (SELECT :1 AS session_key FROM DUAL) src
                     ON (s.session_key = src.session_key)
                     WHEN MATCHED THEN
                         UPDATE SET messages = :2, summary = :3, updated_at = CURRENT_TIMESTAMP
                     WHEN NOT MATCHED THEN
                         INSERT (session_key, agent_id, messages, summary)
                         VALUES (:4, :5, :6, :7)",
                    &[
                        &key,
                        &messages_json,
                        &summary,
                        &key,
                        &agent_id,
                        &messages_json,
                        &summary,
                    ],
                )?;
                Ok(())
            })
            .await
            .map_err(|e| DhakiraError::Storage(format!("session save failed: {e}")))
    }

    /// Preload all of the agent's sessions into the cache. A row whose
    /// history fails to parse is loaded with an empty history.
    async fn load_all(&self) {
        let agent_id = self.agent_id.clone();
        let loaded = self
            .cm
            .with_conn(move |conn| {
                let rows = conn.query_as::<(
                    String,
                    Option<String>,
                    Option<String>,
                    Option<NaiveDateTime>,
                    Option<NaiveDateTime>,
                )>(
                    "SELECT session_key, messages, summary, created_at, updated_at
                     FROM PICO_SESSIONS WHERE agent_id = :1",
                    &[&agent_id],
                )?;

                let mut sessions = HashMap::new();
                for row in rows {
                    let Ok((key, messages, summary, created, updated)) = row else {
                        continue;
                    };

                    let parsed = messages
                        .as_deref()
                        .filter(|m| !m.is_empty())
                        .and_then(|m| serde_json::from_str::<Vec<Message>>(m).ok())
                        .unwrap_or_default();

                    let now = Utc::now();
                    sessions.insert(
                        key.clone(),
                        Session {
                            key,
                            messages: parsed,
                            summary: summary.unwrap_or_default(),
                            created: created.map(|t| t.and_utc()).unwrap_or(now),
                            updated: updated.map(|t| t.and_utc()).unwrap_or(now),
                        },
                    );
                }
                Ok(sessions)
            })
            .await;

        match loaded {
            Ok(sessions) => {
                let count = sessions.len();
                *self.write_cache() = sessions;
                if count > 0 {
                    tracing::info!("oracle: loaded {count} sessions");
                }
            }
            Err(e) => {
                tracing::warn!("oracle: failed to load sessions: {e}");
            }
        }
    }
}

fn truncate_messages(messages: &mut Vec<Message>, keep_last: usize) {
    if keep_last == 0 {
        messages.clear();
    } else if messages.len() > keep_last {
        let excess = messages.len() - keep_last;
        messages.drain(..excess);
    }
}
