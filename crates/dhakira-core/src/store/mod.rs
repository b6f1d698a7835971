mod config_store;
mod memory;
mod prompt;
mod session;
mod state;

pub use config_store::ConfigStore;
pub use memory::{MemoryRecallResult, MemoryStore, DEFAULT_RECALL_MIN_SCORE};
pub use prompt::PromptStore;
pub use session::{Message, Session, SessionStore};
pub use state::StateStore;

use std::sync::Arc;

use crate::config::DhakiraConfig;
use crate::db::{self, ConnectionManager};
use crate::embedding::EmbeddingService;
use crate::error::Result;

/// Base memory surface the agent loop depends on. Implementations may be
/// backed by anything; [`MemoryStore`] is the Oracle-backed one.
pub trait MemoryCapability: Send + Sync {
    fn read_long_term(&self) -> impl std::future::Future<Output = String> + Send;

    fn write_long_term(&self, content: &str)
        -> impl std::future::Future<Output = Result<()>> + Send;

    fn read_today(&self) -> impl std::future::Future<Output = String> + Send;

    fn append_today(&self, content: &str)
        -> impl std::future::Future<Output = Result<()>> + Send;

    fn get_recent_daily_notes(&self, days: i64)
        -> impl std::future::Future<Output = String> + Send;

    fn get_memory_context(&self) -> impl std::future::Future<Output = String> + Send;
}

/// Extended memory surface with embedding-backed semantic operations.
pub trait SemanticMemory: MemoryCapability {
    fn remember(
        &self,
        text: &str,
        importance: f64,
        category: &str,
    ) -> impl std::future::Future<Output = Result<String>> + Send;

    fn recall(
        &self,
        query: &str,
        max_results: usize,
    ) -> impl std::future::Future<Output = Result<Vec<MemoryRecallResult>>> + Send;

    fn forget(&self, memory_id: &str) -> impl std::future::Future<Output = Result<()>> + Send;
}

/// Conversation-history surface.
pub trait SessionCapability: Send + Sync {
    fn add_message(&self, key: &str, role: &str, content: &str);
    fn add_full_message(&self, key: &str, message: Message);
    fn get_history(&self, key: &str) -> Vec<Message>;
    fn get_summary(&self, key: &str) -> String;
    fn set_summary(&self, key: &str, summary: &str);
    fn truncate_history(&self, key: &str, keep_last: usize);
    fn save(&self, key: &str) -> impl std::future::Future<Output = Result<()>> + Send;
}

/// Scalar runtime-state surface.
pub trait StateCapability: Send + Sync {
    fn set_last_channel(&self, channel: &str)
        -> impl std::future::Future<Output = Result<()>> + Send;
    fn get_last_channel(&self) -> impl std::future::Future<Output = String> + Send;
    fn set_last_chat_id(&self, chat_id: &str)
        -> impl std::future::Future<Output = Result<()>> + Send;
    fn get_last_chat_id(&self) -> impl std::future::Future<Output = String> + Send;
}

impl MemoryCapability for MemoryStore {
    async fn read_long_term(&self) -> String {
        MemoryStore::read_long_term(self).await
    }

    async fn write_long_term(&self, content: &str) -> Result<()> {
        MemoryStore::write_long_term(self, content).await
    }

    async fn read_today(&self) -> String {
        MemoryStore::read_today(self).await
    }

    async fn append_today(&self, content: &str) -> Result<()> {
        MemoryStore::append_today(self, content).await
    }

    async fn get_recent_daily_notes(&self, days: i64) -> String {
        MemoryStore::get_recent_daily_notes(self, days).await
    }

    async fn get_memory_context(&self) -> String {
        MemoryStore::get_memory_context(self).await
    }
}

impl SemanticMemory for MemoryStore {
    async fn remember(&self, text: &str, importance: f64, category: &str) -> Result<String> {
        MemoryStore::remember(self, text, importance, category).await
    }

    async fn recall(&self, query: &str, max_results: usize) -> Result<Vec<MemoryRecallResult>> {
        MemoryStore::recall(self, query, max_results).await
    }

    async fn forget(&self, memory_id: &str) -> Result<()> {
        MemoryStore::forget(self, memory_id).await
    }
}

impl SessionCapability for SessionStore {
    fn add_message(&self, key: &str, role: &str, content: &str) {
        SessionStore::add_message(self, key, role, content);
    }

    fn add_full_message(&self, key: &str, message: Message) {
        SessionStore::add_full_message(self, key, message);
    }

    fn get_history(&self, key: &str) -> Vec<Message> {
        SessionStore::get_history(self, key)
    }

    fn get_summary(&self, key: &str) -> String {
        SessionStore::get_summary(self, key)
    }

    fn set_summary(&self, key: &str, summary: &str) {
        SessionStore::set_summary(self, key, summary);
    }

    fn truncate_history(&self, key: &str, keep_last: usize) {
        SessionStore::truncate_history(self, key, keep_last);
    }

    async fn save(&self, key: &str) -> Result<()> {
        SessionStore::save(self, key).await
    }
}

impl StateCapability for StateStore {
    async fn set_last_channel(&self, channel: &str) -> Result<()> {
        StateStore::set_last_channel(self, channel).await
    }

    async fn get_last_channel(&self) -> String {
        StateStore::get_last_channel(self).await
    }

    async fn set_last_chat_id(&self, chat_id: &str) -> Result<()> {
        StateStore::set_last_chat_id(self, chat_id).await
    }

    async fn get_last_chat_id(&self) -> String {
        StateStore::get_last_chat_id(self).await
    }
}

/// Every store wired over one shared connection manager — the full
/// persistence surface handed to the agent loop.
pub struct AgentStores {
    pub connection: ConnectionManager,
    pub embedding: Option<Arc<EmbeddingService>>,
    pub memory: MemoryStore,
    pub session: SessionStore,
    pub state: StateStore,
    pub prompt: PromptStore,
    pub config: ConfigStore,
}

impl AgentStores {
    /// Connect, optionally provision the schema, build the embedding
    /// service from config, and construct all stores.
    pub async fn initialize(cfg: &DhakiraConfig, provision_schema: bool) -> Result<Self> {
        let connection = ConnectionManager::connect(&cfg.database).await?;

        if provision_schema {
            db::init_schema(&connection).await?;
        }

        let embedding =
            EmbeddingService::from_config(connection.clone(), &cfg.embedding)?.map(Arc::new);

        let memory = MemoryStore::new(connection.clone(), &cfg.agent_id, embedding.clone())
            .with_recall_min_score(cfg.memory.recall_min_score);
        let session = SessionStore::new(connection.clone(), &cfg.agent_id).await;
        let state = StateStore::new(connection.clone(), &cfg.agent_id).await;
        let prompt = PromptStore::new(connection.clone(), &cfg.agent_id);
        let config = ConfigStore::new(connection.clone(), &cfg.agent_id);

        Ok(Self {
            connection,
            embedding,
            memory,
            session,
            state,
            prompt,
            config,
        })
    }
}
