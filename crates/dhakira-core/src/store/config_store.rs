use crate::db::ConnectionManager;
use crate::error::{DhakiraError, Result};

/// Key under which the full serialized configuration blob lives.
const FULL_CONFIG_KEY: &str = "full_config";

/// Keyed upsert store for configuration text.
pub struct ConfigStore {
    cm: ConnectionManager,
    agent_id: String,
}

impl ConfigStore {
    pub fn new(cm: ConnectionManager, agent_id: impl Into<String>) -> Self {
        Self {
            cm,
            agent_id: agent_id.into(),
        }
    }

    /// Read a single config value; a missing key is the empty string.
    pub async fn get_config_value(&self, key: &str) -> Result<String> {
        let key_owned = key.to_string();
        let agent_id = self.agent_id.clone();
        let result = self
            .cm
            .with_conn(move |conn| {
                let value: Option<String> = conn.query_row_as(
                    "SELECT config_value FROM PICO_CONFIG WHERE config_key = :1 AND agent_id = :2",
                    &[&key_owned, &agent_id],
                )?;
                Ok(value)
            })
            .await;

        match result {
            Ok(value) => Ok(value.unwrap_or_default()),
            Err(e) if e.is_no_rows() => Ok(String::new()),
            Err(e) => Err(DhakiraError::Storage(format!("config get failed: {e}"))),
        }
    }

    /// Upsert a config value.
    pub async fn set_config_value(&self, key: &str, value: &str) -> Result<()> {
        let key_owned = key.to_string();
        let value_owned = value.to_string();
        let agent_id = self.agent_id.clone();
        self.cm
            .with_conn(move |conn| {
                conn.execute(
                    "MERGE INTO PICO_CONFIG c
                     USING (SELECT :1 AS config_key FROM DUAL) src
                     ON (c.config_key = src.config_key)
                     WHEN MATCHED THEN
                         UPDATE SET config_value = :2, updated_at = CURRENT_TIMESTAMP
                     WHEN NOT MATCHED THEN
                         INSERT (config_key, agent_id, config_value) VALUES (:3, :4, :5)",
                    &[&key_owned, &value_owned, &key_owned, &agent_id, &value_owned],
                )?;
                Ok(())
            })
            .await
            .map_err(|e| DhakiraError::Storage(format!("config set failed: {e}")))
    }

    /// The full serialized configuration blob.
    pub async fn load_config(&self) -> Result<String> {
        self.get_config_value(FULL_CONFIG_KEY).await
    }

    pub async fn save_config(&self, config_json: &str) -> Result<()> {
        self.set_config_value(FULL_CONFIG_KEY, config_json).await
    }
}
