use std::collections::HashMap;
use std::path::Path;

use crate::db::ConnectionManager;
use crate::error::{DhakiraError, Result};

/// Well-known prompt files seeded from the agent workspace.
const BOOTSTRAP_FILES: &[&str] = &["IDENTITY.md", "SOUL.md", "USER.md", "AGENT.md", "AGENTS.md"];

/// Keyed upsert store for system prompt text.
pub struct PromptStore {
    cm: ConnectionManager,
    agent_id: String,
}

impl PromptStore {
    pub fn new(cm: ConnectionManager, agent_id: impl Into<String>) -> Self {
        Self {
            cm,
            agent_id: agent_id.into(),
        }
    }

    /// Load a named prompt; a missing prompt is the empty string.
    pub async fn load_prompt(&self, name: &str) -> Result<String> {
        let name_owned = name.to_string();
        let agent_id = self.agent_id.clone();
        let result = self
            .cm
            .with_conn(move |conn| {
                let content: Option<String> = conn.query_row_as(
                    "SELECT content FROM PICO_PROMPTS WHERE prompt_name = :1 AND agent_id = :2",
                    &[&name_owned, &agent_id],
                )?;
                Ok(content)
            })
            .await;

        match result {
            Ok(content) => Ok(content.unwrap_or_default()),
            Err(e) if e.is_no_rows() => Ok(String::new()),
            Err(e) => Err(DhakiraError::Storage(format!(
                "failed to load prompt {name}: {e}"
            ))),
        }
    }

    /// Upsert a prompt by name.
    pub async fn save_prompt(&self, name: &str, content: &str) -> Result<()> {
        let name_owned = name.to_string();
        let content_owned = content.to_string();
        let agent_id = self.agent_id.clone();
        self.cm
            .with_conn(move |conn| {
                conn.execute(
                    "MERGE INTO PICO_PROMPTS p
                     USING (SELECT :1 AS prompt_name, :2 AS agent_id FROM DUAL) src
                     ON (p.prompt_name = src.prompt_name AND p.agent_id = src.agent_id)
                     WHEN MATCHED THEN
                         UPDATE SET content = :3, updated_at = CURRENT_TIMESTAMP
                     WHEN NOT MATCHED THEN
                         INSERT (prompt_name, agent_id, content) VALUES (:4, :5, :6)",
                    &[
                        &name_owned,
                        &agent_id,
                        &content_owned,
                        &name_owned,
                        &agent_id,
                        &content_owned,
                    ],
                )?;
                Ok(())
            })
            .await
            .map_err(|e| DhakiraError::Storage(format!("failed to save prompt {name}: {e}")))
    }

    /// All prompts for the agent as a name → content map. Failures return
    /// an empty map.
    pub async fn load_bootstrap_files(&self) -> HashMap<String, String> {
        let agent_id = self.agent_id.clone();
        let result = self
            .cm
            .with_conn(move |conn| {
                let rows = conn.query_as::<(String, Option<String>)>(
                    "SELECT prompt_name, content FROM PICO_PROMPTS WHERE agent_id = :1",
                    &[&agent_id],
                )?;
                let mut map = HashMap::new();
                for row in rows {
                    if let Ok((name, Some(content))) = row {
                        map.insert(name, content);
                    }
                }
                Ok(map)
            })
            .await;

        result.unwrap_or_default()
    }

    /// Seed the well-known prompt set from workspace markdown files.
    /// Files that do not exist are skipped silently; returns the number
    /// seeded.
    pub async fn seed_from_workspace(&self, workspace: &Path) -> Result<usize> {
        let mut seeded = 0;
        for filename in BOOTSTRAP_FILES {
            let path = workspace.join(filename);
            let Ok(data) = std::fs::read_to_string(&path) else {
                continue;
            };

            let prompt_name = filename.trim_end_matches(".md");
            if let Err(e) = self.save_prompt(prompt_name, &data).await {
                tracing::warn!("failed to seed prompt {filename}: {e}");
                continue;
            }
            seeded += 1;
        }

        if seeded > 0 {
            tracing::info!("seeded {seeded} prompts from workspace");
        }
        Ok(seeded)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bootstrap_file_set() {
        assert_eq!(
            BOOTSTRAP_FILES,
            &["IDENTITY.md", "SOUL.md", "USER.md", "AGENT.md", "AGENTS.md"]
        );
    }

    #[test]
    fn test_prompt_name_strips_extension() {
        assert_eq!("IDENTITY.md".trim_end_matches(".md"), "IDENTITY");
        assert_eq!("AGENTS.md".trim_end_matches(".md"), "AGENTS");
    }
}
