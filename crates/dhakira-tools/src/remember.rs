use std::future::Future;
use std::sync::Arc;

use schemars::JsonSchema;
use serde::Deserialize;

use dhakira_core::store::MemoryStore;
use dhakira_core::Result;

use crate::{truncate_preview, Tool, ToolFuture, ToolResult};

const DEFAULT_IMPORTANCE: f64 = 0.7;

/// What the remember tool needs from a memory backend.
pub trait Rememberer: Send + Sync {
    fn remember(
        &self,
        text: &str,
        importance: f64,
        category: &str,
    ) -> impl Future<Output = Result<String>> + Send;
}

impl Rememberer for MemoryStore {
    async fn remember(&self, text: &str, importance: f64, category: &str) -> Result<String> {
        MemoryStore::remember(self, text, importance, category).await
    }
}

/// Arguments for the `remember` tool.
#[derive(Debug, Deserialize, JsonSchema)]
pub struct RememberRequest {
    /// The text content to remember
    pub text: String,
    /// Importance score from 0.0 to 1.0 (default: 0.7)
    #[serde(default)]
    pub importance: Option<f64>,
    /// Optional category for organizing memories (e.g. "preference", "fact", "context")
    #[serde(default)]
    pub category: Option<String>,
}

impl RememberRequest {
    /// Out-of-range importance silently falls back to the default.
    fn effective_importance(&self) -> f64 {
        match self.importance {
            Some(v) if (0.0..=1.0).contains(&v) => v,
            _ => DEFAULT_IMPORTANCE,
        }
    }
}

/// Stores a piece of information in long-term memory with a vector
/// embedding for later semantic recall.
pub struct RememberTool<S> {
    store: Arc<S>,
}

impl<S> RememberTool<S> {
    pub fn new(store: Arc<S>) -> Self {
        Self { store }
    }
}

impl<S: Rememberer> Tool for RememberTool<S> {
    fn name(&self) -> &str {
        "remember"
    }

    fn description(&self) -> &str {
        "Store a piece of information in long-term memory with vector embedding \
         for later semantic recall. Use this to remember facts, preferences, or \
         important context."
    }

    fn parameters(&self) -> serde_json::Value {
        serde_json::to_value(schemars::schema_for!(RememberRequest)).unwrap_or_default()
    }

    fn execute(&self, args: serde_json::Value) -> ToolFuture<'_> {
        Box::pin(async move {
            let req: RememberRequest = match serde_json::from_value(args) {
                Ok(req) => req,
                Err(e) => return ToolResult::error(format!("invalid remember arguments: {e}")),
            };
            if req.text.is_empty() {
                return ToolResult::error("text parameter is required");
            }

            let importance = req.effective_importance();
            let category = req.category.clone().unwrap_or_default();

            match self.store.remember(&req.text, importance, &category).await {
                Ok(memory_id) => ToolResult::ok(format!(
                    "Remembered (ID: {memory_id}, importance: {importance:.1}, category: {category}): {}",
                    truncate_preview(&req.text, 100)
                )),
                Err(e) => ToolResult::error(format!("Failed to remember: {e}")),
            }
        })
    }
}
