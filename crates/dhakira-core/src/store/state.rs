use std::collections::HashMap;
use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};

use chrono::{DateTime, NaiveDateTime, Utc};

use crate::db::ConnectionManager;
use crate::error::{DhakiraError, Result};

const KEY_LAST_CHANNEL: &str = "last_channel";
const KEY_LAST_CHAT_ID: &str = "last_chat_id";

/// Scalar key/value agent state: write-through on set, cache-aside on get.
pub struct StateStore {
    cm: ConnectionManager,
    agent_id: String,
    cache: RwLock<HashMap<String, String>>,
}

impl StateStore {
    /// Construct the store and preload all state rows for the agent.
    /// Preload failures leave the cache empty; reads then fall back to
    /// per-key queries.
    pub async fn new(cm: ConnectionManager, agent_id: impl Into<String>) -> Self {
        let store = Self {
            cm,
            agent_id: agent_id.into(),
            cache: RwLock::new(HashMap::new()),
        };
        store.load_all().await;
        store
    }

    fn read_cache(&self) -> RwLockReadGuard<'_, HashMap<String, String>> {
        self.cache.read().unwrap_or_else(|e| e.into_inner())
    }

    fn write_cache(&self) -> RwLockWriteGuard<'_, HashMap<String, String>> {
        self.cache.write().unwrap_or_else(|e| e.into_inner())
    }

    /// Upsert a key/value pair. The cache is updated only after the durable
    /// write succeeds.
    pub async fn set(&self, key: &str, value: &str) -> Result<()> {
        let key_owned = key.to_string();
        let value_owned = value.to_string();
        let agent_id = self.agent_id.clone();

        self.cm
            .with_conn(move |conn| {
                conn.execute(
                    "MERGE INTO PICO_STATE s
                     USING (SELECT :1 AS state_key, :2 AS agent_id FROM DUAL) src
                     ON (s.state_key = src.state_key AND s.agent_id = src.agent_id)
                     WHEN MATCHED THEN
                         UPDATE SET state_value = :3, updated_at = CURRENT_TIMESTAMP
                     WHEN NOT MATCHED THEN
                         INSERT (state_key, agent_id, state_value) VALUES (:4, :5, :6)",
                    &[
                        &key_owned,
                        &agent_id,
                        &value_owned,
                        &key_owned,
                        &agent_id,
                        &value_owned,
                    ],
                )?;
                Ok(())
            })
            .await
            .map_err(|e| DhakiraError::Storage(format!("state set failed: {e}")))?;

        self.write_cache().insert(key.to_string(), value.to_string());
        Ok(())
    }

    /// Read a value: cache hit first, then a single-row fallback query that
    /// populates the cache. Absence is the empty string, not an error.
    pub async fn get(&self, key: &str) -> String {
        if let Some(v) = self.read_cache().get(key) {
            return v.clone();
        }

        let key_owned = key.to_string();
        let agent_id = self.agent_id.clone();
        let fetched = self
            .cm
            .with_conn(move |conn| {
                let value: Option<String> = conn.query_row_as(
                    "SELECT state_value FROM PICO_STATE WHERE state_key = :1 AND agent_id = :2",
                    &[&key_owned, &agent_id],
                )?;
                Ok(value)
            })
            .await;

        match fetched {
            Ok(Some(value)) => {
                self.write_cache().insert(key.to_string(), value.clone());
                value
            }
            _ => String::new(),
        }
    }

    pub async fn set_last_channel(&self, channel: &str) -> Result<()> {
        self.set(KEY_LAST_CHANNEL, channel).await
    }

    pub async fn get_last_channel(&self) -> String {
        self.get(KEY_LAST_CHANNEL).await
    }

    pub async fn set_last_chat_id(&self, chat_id: &str) -> Result<()> {
        self.set(KEY_LAST_CHAT_ID, chat_id).await
    }

    pub async fn get_last_chat_id(&self) -> String {
        self.get(KEY_LAST_CHAT_ID).await
    }

    /// Most recent update time across all of the agent's state rows.
    pub async fn get_timestamp(&self) -> Option<DateTime<Utc>> {
        let agent_id = self.agent_id.clone();
        let result = self
            .cm
            .with_conn(move |conn| {
                let ts: Option<NaiveDateTime> = conn.query_row_as(
                    "SELECT MAX(updated_at) FROM PICO_STATE WHERE agent_id = :1",
                    &[&agent_id],
                )?;
                Ok(ts)
            })
            .await;

        match result {
            Ok(ts) => ts.map(|t| t.and_utc()),
            Err(_) => None,
        }
    }

    async fn load_all(&self) {
        let agent_id = self.agent_id.clone();
        let loaded = self
            .cm
            .with_conn(move |conn| {
                let rows = conn.query_as::<(String, Option<String>)>(
                    "SELECT state_key, state_value FROM PICO_STATE WHERE agent_id = :1",
                    &[&agent_id],
                )?;

                let mut cache = HashMap::new();
                for row in rows {
                    if let Ok((key, Some(value))) = row {
                        cache.insert(key, value);
                    }
                }
                Ok(cache)
            })
            .await;

        match loaded {
            Ok(cache) => {
                *self.write_cache() = cache;
            }
            Err(e) => {
                tracing::warn!("oracle: failed to load state: {e}");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_well_known_keys() {
        assert_eq!(KEY_LAST_CHANNEL, "last_channel");
        assert_eq!(KEY_LAST_CHAT_ID, "last_chat_id");
    }
}
