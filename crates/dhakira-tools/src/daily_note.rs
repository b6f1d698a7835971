use std::future::Future;
use std::sync::Arc;

use schemars::JsonSchema;
use serde::Deserialize;

use dhakira_core::store::MemoryStore;
use dhakira_core::Result;

use crate::{truncate_preview, Tool, ToolFuture, ToolResult};

/// What the daily-note tool needs from a memory backend.
pub trait DailyNoteWriter: Send + Sync {
    fn append_today(&self, content: &str) -> impl Future<Output = Result<()>> + Send;
}

impl DailyNoteWriter for MemoryStore {
    async fn append_today(&self, content: &str) -> Result<()> {
        MemoryStore::append_today(self, content).await
    }
}

/// Arguments for the `write_daily_note` tool.
#[derive(Debug, Deserialize, JsonSchema)]
pub struct DailyNoteRequest {
    /// The note content to append to today's daily journal
    pub content: String,
}

/// Appends a note to today's journal.
pub struct WriteDailyNoteTool<S> {
    store: Arc<S>,
}

impl<S> WriteDailyNoteTool<S> {
    pub fn new(store: Arc<S>) -> Self {
        Self { store }
    }
}

impl<S: DailyNoteWriter> Tool for WriteDailyNoteTool<S> {
    fn name(&self) -> &str {
        "write_daily_note"
    }

    fn description(&self) -> &str {
        "Append a note to today's daily journal. Use this to record events, \
         tasks completed, observations, or anything worth noting for today. \
         Notes are stored persistently and included in future context."
    }

    fn parameters(&self) -> serde_json::Value {
        serde_json::to_value(schemars::schema_for!(DailyNoteRequest)).unwrap_or_default()
    }

    fn execute(&self, args: serde_json::Value) -> ToolFuture<'_> {
        Box::pin(async move {
            let req: DailyNoteRequest = match serde_json::from_value(args) {
                Ok(req) => req,
                Err(e) => return ToolResult::error(format!("invalid daily note arguments: {e}")),
            };
            if req.content.is_empty() {
                return ToolResult::error("content parameter is required");
            }

            match self.store.append_today(&req.content).await {
                Ok(()) => ToolResult::ok(format!(
                    "Daily note written: {}",
                    truncate_preview(&req.content, 100)
                )),
                Err(e) => ToolResult::error(format!("Failed to write daily note: {e}")),
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use dhakira_core::DhakiraError;
    use std::sync::Mutex;

    struct StubJournal {
        lines: Mutex<Vec<String>>,
        fail: bool,
    }

    impl StubJournal {
        fn new(fail: bool) -> Arc<Self> {
            Arc::new(Self {
                lines: Mutex::new(Vec::new()),
                fail,
            })
        }
    }

    impl DailyNoteWriter for StubJournal {
        async fn append_today(&self, content: &str) -> Result<()> {
            if self.fail {
                return Err(DhakiraError::Storage("daily note write failed".into()));
            }
            self.lines.lock().unwrap().push(content.to_string());
            Ok(())
        }
    }

    #[tokio::test]
    async fn test_write_daily_note() {
        let store = StubJournal::new(false);
        let tool = WriteDailyNoteTool::new(store.clone());
        let result = tool
            .execute(serde_json::json!({"content": "shipped the release"}))
            .await;

        assert!(!result.is_error);
        assert!(result.text.contains("shipped the release"));
        assert_eq!(store.lines.lock().unwrap().as_slice(), ["shipped the release"]);
    }

    #[tokio::test]
    async fn test_missing_content_is_error() {
        let tool = WriteDailyNoteTool::new(StubJournal::new(false));
        let result = tool.execute(serde_json::json!({})).await;
        assert!(result.is_error);
    }

    #[tokio::test]
    async fn test_store_failure_is_short_message() {
        let tool = WriteDailyNoteTool::new(StubJournal::new(true));
        let result = tool.execute(serde_json::json!({"content": "x"})).await;
        assert!(result.is_error);
        assert!(result.text.starts_with("Failed to write daily note:"));
    }

    #[test]
    fn test_parameters_schema() {
        let tool = WriteDailyNoteTool::new(StubJournal::new(false));
        let schema = tool.parameters();
        let required = schema["required"].as_array().expect("required array");
        assert!(required.iter().any(|v| v == "content"));
    }
}
