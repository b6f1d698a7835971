use crate::error::{DhakiraError, Result};
use config::{Config, File};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DhakiraConfig {
    /// Identifier partitioning every table row; all queries are scoped to it.
    #[serde(default = "default_agent_id")]
    pub agent_id: String,
    #[serde(default)]
    pub database: DatabaseConfig,
    #[serde(default)]
    pub embedding: EmbeddingConfig,
    #[serde(default)]
    pub memory: MemoryConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    /// Deployment mode: `"local"` (plain EZConnect) or `"autonomous"`
    /// (Oracle Autonomous Database — DSN passthrough or wallet mTLS).
    #[serde(default = "default_db_mode")]
    pub mode: String,
    #[serde(default = "default_db_host")]
    pub host: String,
    #[serde(default = "default_db_port")]
    pub port: u16,
    #[serde(default = "default_db_service")]
    pub service: String,
    #[serde(default = "default_db_user")]
    pub user: String,
    #[serde(default)]
    pub password: String,
    /// Full connect descriptor. Under autonomous mode it is used verbatim
    /// (wallet-less TLS).
    #[serde(default)]
    pub dsn: Option<String>,
    /// Wallet directory for autonomous mutual TLS.
    #[serde(default)]
    pub wallet_path: Option<String>,
    #[serde(default = "default_pool_max_open")]
    pub pool_max_open: u32,
    #[serde(default = "default_pool_max_idle")]
    pub pool_max_idle: u32,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            mode: default_db_mode(),
            host: default_db_host(),
            port: default_db_port(),
            service: default_db_service(),
            user: default_db_user(),
            password: String::new(),
            dsn: None,
            wallet_path: None,
            pool_max_open: default_pool_max_open(),
            pool_max_idle: default_pool_max_idle(),
        }
    }
}

impl DatabaseConfig {
    pub fn is_autonomous(&self) -> bool {
        self.mode == "autonomous"
    }

    pub fn uses_wallet(&self) -> bool {
        self.wallet_path.as_deref().is_some_and(|p| !p.is_empty())
    }

    /// A populated DSN implies wallet-less TLS passthrough.
    pub fn uses_tls(&self) -> bool {
        self.dsn.as_deref().is_some_and(|d| !d.is_empty())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EmbeddingConfig {
    /// Embedding backend: `"onnx"` (in-database model), `"api"`
    /// (OpenAI-compatible endpoint), or `"none"`. The choice is explicit —
    /// the service constructor rejects incomplete configurations rather
    /// than inferring a mode from whichever fields happen to be set.
    #[serde(default = "default_embedding_provider")]
    pub provider: String,
    /// In-database ONNX model name, evaluated by `VECTOR_EMBEDDING()`.
    #[serde(default = "default_onnx_model")]
    pub onnx_model: String,
    #[serde(default)]
    pub api_base: Option<String>,
    #[serde(default)]
    pub api_key: Option<String>,
    #[serde(default = "default_api_model")]
    pub api_model: String,
    /// Environment variable consulted when `api_key` is unset.
    #[serde(default)]
    pub env_var: Option<String>,
    /// Input longer than this is truncated before embedding.
    #[serde(default = "default_max_input_chars")]
    pub max_input_chars: usize,
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            provider: default_embedding_provider(),
            onnx_model: default_onnx_model(),
            api_base: None,
            api_key: None,
            api_model: default_api_model(),
            env_var: None,
            max_input_chars: default_max_input_chars(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MemoryConfig {
    /// Recall results scoring below this similarity are discarded.
    #[serde(default = "default_recall_min_score")]
    pub recall_min_score: f64,
}

impl Default for MemoryConfig {
    fn default() -> Self {
        Self {
            recall_min_score: default_recall_min_score(),
        }
    }
}

// -- Defaults --

fn default_agent_id() -> String {
    "default".to_string()
}
fn default_db_mode() -> String {
    "local".to_string()
}
fn default_db_host() -> String {
    "localhost".to_string()
}
fn default_db_port() -> u16 {
    1521
}
fn default_db_service() -> String {
    "FREEPDB1".to_string()
}
fn default_db_user() -> String {
    "dhakira".to_string()
}
fn default_pool_max_open() -> u32 {
    8
}
fn default_pool_max_idle() -> u32 {
    2
}
fn default_embedding_provider() -> String {
    "onnx".to_string()
}
fn default_onnx_model() -> String {
    "ALL_MINILM_L12_V2".to_string()
}
fn default_api_model() -> String {
    "text-embedding-3-small".to_string()
}
fn default_max_input_chars() -> usize {
    512
}
fn default_recall_min_score() -> f64 {
    0.3
}

/// Valid database deployment modes.
pub const VALID_DB_MODES: &[&str] = &["local", "autonomous"];

/// Valid embedding provider names.
pub const VALID_EMBEDDING_PROVIDERS: &[&str] = &["onnx", "api", "none"];

impl DhakiraConfig {
    /// Load configuration with three-layer TOML merge:
    /// 1. ~/.config/dhakira/config.toml (global)
    /// 2. .dhakira/config.toml (project)
    /// 3. .dhakira/config.local.toml (local, gitignored)
    pub fn load(project_dir: Option<&Path>) -> Result<Self> {
        let mut builder = Config::builder();

        if let Some(global_path) = global_config_path() {
            if global_path.exists() {
                builder = builder.add_source(File::from(global_path).required(false));
            }
        }

        if let Some(dir) = project_dir {
            let project_config = dir.join(".dhakira").join("config.toml");
            if project_config.exists() {
                builder = builder.add_source(File::from(project_config).required(false));
            }

            let local_config = dir.join(".dhakira").join("config.local.toml");
            if local_config.exists() {
                builder = builder.add_source(File::from(local_config).required(false));
            }
        }

        let config = builder
            .build()
            .map_err(|e| DhakiraError::Config(e.to_string()))?;

        let mut cfg: Self = config
            .try_deserialize()
            .map_err(|e| DhakiraError::Config(e.to_string()))?;

        cfg.validate();
        Ok(cfg)
    }

    /// Load with defaults only (no files).
    pub fn default_config() -> Self {
        Self {
            agent_id: default_agent_id(),
            database: DatabaseConfig::default(),
            embedding: EmbeddingConfig::default(),
            memory: MemoryConfig::default(),
        }
    }

    /// Validate config values, clamping out-of-range values and logging
    /// warnings. This is lenient — it fixes values rather than rejecting
    /// the config; hard requirements (e.g. an API key for the api
    /// provider) are enforced at service construction.
    pub fn validate(&mut self) -> Vec<String> {
        let mut warnings = Vec::new();

        if !VALID_DB_MODES.contains(&self.database.mode.as_str()) {
            warnings.push(format!(
                "unknown database mode '{}', valid: {}",
                self.database.mode,
                VALID_DB_MODES.join(", ")
            ));
        }

        if !VALID_EMBEDDING_PROVIDERS.contains(&self.embedding.provider.as_str()) {
            warnings.push(format!(
                "unknown embedding provider '{}', valid: {}",
                self.embedding.provider,
                VALID_EMBEDDING_PROVIDERS.join(", ")
            ));
        }

        if self.memory.recall_min_score < 0.0 || self.memory.recall_min_score > 1.0 {
            warnings.push(format!(
                "memory.recall_min_score = {} out of range [0.0, 1.0], clamping",
                self.memory.recall_min_score
            ));
            self.memory.recall_min_score = self.memory.recall_min_score.clamp(0.0, 1.0);
        }

        if self.embedding.max_input_chars == 0 {
            warnings.push("embedding.max_input_chars = 0, setting to 512".to_string());
            self.embedding.max_input_chars = 512;
        }

        if self.database.pool_max_open == 0 {
            warnings.push("database.pool_max_open = 0, setting to 1".to_string());
            self.database.pool_max_open = 1;
        }
        if self.database.pool_max_idle > self.database.pool_max_open {
            warnings.push(format!(
                "database.pool_max_idle ({}) > pool_max_open ({}), lowering",
                self.database.pool_max_idle, self.database.pool_max_open
            ));
            self.database.pool_max_idle = self.database.pool_max_open;
        }

        if self.agent_id.is_empty() {
            warnings.push("agent_id is empty, using 'default'".to_string());
            self.agent_id = default_agent_id();
        }

        for w in &warnings {
            tracing::warn!("config: {}", w);
        }

        warnings
    }
}

fn global_config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|p| p.join("dhakira").join("config.toml"))
}

/// Resolve the embedding API key: config field first, then environment.
pub fn resolve_api_key(cfg: &EmbeddingConfig) -> Result<String> {
    if let Some(ref key) = cfg.api_key {
        if !key.is_empty() {
            return Ok(key.clone());
        }
    }

    let env_var_name = cfg.env_var.as_deref().unwrap_or("DHAKIRA_EMBEDDING_API_KEY");

    std::env::var(env_var_name).map_err(|_| {
        DhakiraError::Config(format!(
            "api embedding provider requires an API key \
             (set embedding.api_key or {env_var_name})"
        ))
    })
}
