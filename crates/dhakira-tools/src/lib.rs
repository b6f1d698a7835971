//! Agent-facing tool adapters over the Dhakira stores.
//!
//! Each tool decodes its arguments once at the boundary into a typed,
//! schema-described request struct, calls a narrow store trait, and renders
//! a short human-readable result. Backend errors never leak raw internals
//! past their wrapped messages.

mod daily_note;
mod recall;
mod remember;

pub use daily_note::{DailyNoteWriter, WriteDailyNoteTool};
pub use recall::{Recaller, RecallTool};
pub use remember::{RememberTool, Rememberer};

use std::future::Future;
use std::pin::Pin;

/// Boxed future returned by [`Tool::execute`] — keeps the trait
/// dyn-compatible so an agent loop can hold `Vec<Box<dyn Tool>>`.
pub type ToolFuture<'a> = Pin<Box<dyn Future<Output = ToolResult> + Send + 'a>>;

/// Outcome of a tool invocation, rendered for the model.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ToolResult {
    pub text: String,
    pub is_error: bool,
}

impl ToolResult {
    pub fn ok(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            is_error: false,
        }
    }

    pub fn error(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            is_error: true,
        }
    }
}

/// A callable tool: name, description, JSON-schema parameters, execution.
pub trait Tool: Send + Sync {
    fn name(&self) -> &str;
    fn description(&self) -> &str;
    fn parameters(&self) -> serde_json::Value;
    fn execute(&self, args: serde_json::Value) -> ToolFuture<'_>;
}

/// Shorten `s` to at most `max_chars` characters for result previews.
pub(crate) fn truncate_preview(s: &str, max_chars: usize) -> String {
    if s.chars().count() <= max_chars {
        s.to_string()
    } else {
        let head: String = s.chars().take(max_chars).collect();
        format!("{head}...")
    }
}
