use std::fmt::Write as _;
use std::future::Future;
use std::sync::Arc;

use schemars::JsonSchema;
use serde::Deserialize;

use dhakira_core::store::{MemoryRecallResult, MemoryStore};
use dhakira_core::Result;

use crate::{Tool, ToolFuture, ToolResult};

const DEFAULT_MAX_RESULTS: usize = 5;

/// What the recall tool needs from a memory backend.
pub trait Recaller: Send + Sync {
    fn recall(
        &self,
        query: &str,
        max_results: usize,
    ) -> impl Future<Output = Result<Vec<MemoryRecallResult>>> + Send;
}

impl Recaller for MemoryStore {
    async fn recall(&self, query: &str, max_results: usize) -> Result<Vec<MemoryRecallResult>> {
        MemoryStore::recall(self, query, max_results).await
    }
}

/// Arguments for the `recall` tool.
#[derive(Debug, Deserialize, JsonSchema)]
pub struct RecallRequest {
    /// Search query describing what to recall
    pub query: String,
    /// Maximum number of results to return (default: 5)
    #[serde(default)]
    pub max_results: Option<u32>,
}

impl RecallRequest {
    fn effective_max_results(&self) -> usize {
        match self.max_results {
            Some(n) if n > 0 => n as usize,
            _ => DEFAULT_MAX_RESULTS,
        }
    }
}

/// Searches long-term memory by semantic similarity.
pub struct RecallTool<S> {
    store: Arc<S>,
}

impl<S> RecallTool<S> {
    pub fn new(store: Arc<S>) -> Self {
        Self { store }
    }
}

impl<S: Recaller> Tool for RecallTool<S> {
    fn name(&self) -> &str {
        "recall"
    }

    fn description(&self) -> &str {
        "Search long-term memory using semantic similarity. Use this to find \
         previously remembered information by describing what you're looking for."
    }

    fn parameters(&self) -> serde_json::Value {
        serde_json::to_value(schemars::schema_for!(RecallRequest)).unwrap_or_default()
    }

    fn execute(&self, args: serde_json::Value) -> ToolFuture<'_> {
        Box::pin(async move {
            let req: RecallRequest = match serde_json::from_value(args) {
                Ok(req) => req,
                Err(e) => return ToolResult::error(format!("invalid recall arguments: {e}")),
            };
            if req.query.is_empty() {
                return ToolResult::error("query parameter is required");
            }

            let results = match self.store.recall(&req.query, req.effective_max_results()).await
            {
                Ok(results) => results,
                Err(e) => return ToolResult::error(format!("Recall failed: {e}")),
            };

            if results.is_empty() {
                return ToolResult::ok(format!("No matching memories found for: {}", req.query));
            }

            ToolResult::ok(render_results(&results))
        })
    }
}

fn render_results(results: &[MemoryRecallResult]) -> String {
    let mut out = format!("Found {} matching memories:\n\n", results.len());
    for (i, r) in results.iter().enumerate() {
        let _ = write!(out, "{}. [{:.0}% match] (ID: {}", i + 1, r.score * 100.0, r.memory_id);
        if !r.category.is_empty() {
            let _ = write!(out, ", category: {}", r.category);
        }
        let _ = writeln!(out, ", importance: {:.1})", r.importance);
        let _ = writeln!(out, "   {}\n", r.text);
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    struct StubRecall {
        results: Vec<MemoryRecallResult>,
    }

    impl Recaller for StubRecall {
        async fn recall(&self, _query: &str, max_results: usize) -> Result<Vec<MemoryRecallResult>> {
            Ok(self.results.iter().take(max_results).cloned().collect())
        }
    }

    fn sample() -> MemoryRecallResult {
        MemoryRecallResult {
            memory_id: "ab12cd34".to_string(),
            text: "User likes Go".to_string(),
            importance: 0.8,
            category: "preference".to_string(),
            score: 0.92,
        }
    }

    #[tokio::test]
    async fn test_recall_renders_results() {
        let tool = RecallTool::new(Arc::new(StubRecall {
            results: vec![sample()],
        }));
        let result = tool.execute(serde_json::json!({"query": "Go"})).await;

        assert!(!result.is_error);
        assert!(result.text.contains("Found 1 matching memories"));
        assert!(result.text.contains("[92% match]"));
        assert!(result.text.contains("ID: ab12cd34"));
        assert!(result.text.contains("category: preference"));
        assert!(result.text.contains("importance: 0.8"));
        assert!(result.text.contains("User likes Go"));
    }

    #[tokio::test]
    async fn test_recall_omits_empty_category() {
        let mut r = sample();
        r.category = String::new();
        let tool = RecallTool::new(Arc::new(StubRecall { results: vec![r] }));
        let result = tool.execute(serde_json::json!({"query": "Go"})).await;
        assert!(!result.text.contains("category:"));
    }

    #[tokio::test]
    async fn test_recall_no_results() {
        let tool = RecallTool::new(Arc::new(StubRecall { results: vec![] }));
        let result = tool.execute(serde_json::json!({"query": "nothing"})).await;
        assert!(!result.is_error);
        assert_eq!(result.text, "No matching memories found for: nothing");
    }

    #[tokio::test]
    async fn test_recall_missing_query_is_error() {
        let tool = RecallTool::new(Arc::new(StubRecall { results: vec![] }));
        let result = tool.execute(serde_json::json!({})).await;
        assert!(result.is_error);
    }

    #[tokio::test]
    async fn test_recall_max_results_cap() {
        let tool = RecallTool::new(Arc::new(StubRecall {
            results: vec![sample(), sample(), sample()],
        }));
        let result = tool
            .execute(serde_json::json!({"query": "Go", "max_results": 2}))
            .await;
        assert!(result.text.contains("Found 2 matching memories"));
    }

    #[test]
    fn test_default_max_results() {
        let req = RecallRequest {
            query: "q".to_string(),
            max_results: None,
        };
        assert_eq!(req.effective_max_results(), DEFAULT_MAX_RESULTS);

        let zero = RecallRequest {
            query: "q".to_string(),
            max_results: Some(0),
        };
        assert_eq!(zero.effective_max_results(), DEFAULT_MAX_RESULTS);
    }

    #[test]
    fn test_parameters_schema() {
        let tool = RecallTool::new(Arc::new(StubRecall { results: vec![] }));
        let schema = tool.parameters();
        let required = schema["required"].as_array().expect("required array");
        assert!(required.iter().any(|v| v == "query"));
    }
}
