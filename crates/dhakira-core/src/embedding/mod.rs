//! Text-to-vector embedding behind a single call, with two mutually
//! exclusive backends chosen at construction:
//!
//! - in-database: Oracle evaluates `VECTOR_EMBEDDING()` with a loaded ONNX
//!   model, so the vector never leaves the database
//! - api: an external OpenAI-compatible `/embeddings` endpoint
//!
//! Both produce vectors consumable by the same similarity-search SQL.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::config::{self, EmbeddingConfig};
use crate::db::ConnectionManager;
use crate::error::{DhakiraError, Result};
use crate::search::parse_vector_literal;

/// Output dimensionality of the default in-database model
/// (ALL_MINILM_L12_V2).
pub const DEFAULT_ONNX_DIMS: usize = 384;

const API_TIMEOUT: Duration = Duration::from_secs(30);
const DEFAULT_API_BASE: &str = "https://api.openai.com/v1";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EmbeddingMode {
    InDatabase,
    Api,
}

impl std::fmt::Display for EmbeddingMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::InDatabase => write!(f, "onnx"),
            Self::Api => write!(f, "api"),
        }
    }
}

enum Backend {
    InDatabase {
        model: String,
    },
    Api {
        client: reqwest::Client,
        base_url: String,
        api_key: String,
        model: String,
    },
}

/// Validated backend selection, resolved from config before any I/O.
pub(crate) enum BackendChoice {
    InDatabase { model: String },
    Api { base_url: String, api_key: String, model: String },
    None,
}

pub(crate) fn resolve_backend(cfg: &EmbeddingConfig) -> Result<BackendChoice> {
    match cfg.provider.as_str() {
        "none" => Ok(BackendChoice::None),
        "onnx" => {
            if cfg.onnx_model.is_empty() {
                return Err(DhakiraError::Config(
                    "onnx embedding provider requires embedding.onnx_model".into(),
                ));
            }
            Ok(BackendChoice::InDatabase {
                model: cfg.onnx_model.clone(),
            })
        }
        "api" => {
            let api_key = config::resolve_api_key(cfg)?;
            if cfg.api_model.is_empty() {
                return Err(DhakiraError::Config(
                    "api embedding provider requires embedding.api_model".into(),
                ));
            }
            let base_url = cfg
                .api_base
                .clone()
                .filter(|b| !b.is_empty())
                .unwrap_or_else(|| DEFAULT_API_BASE.to_string());
            Ok(BackendChoice::Api {
                base_url,
                api_key,
                model: cfg.api_model.clone(),
            })
        }
        other => Err(DhakiraError::Config(format!(
            "unknown embedding provider: '{other}' (expected 'onnx', 'api', or 'none')"
        ))),
    }
}

/// Converts text to a fixed-dimensionality vector, hiding the backend.
pub struct EmbeddingService {
    cm: ConnectionManager,
    backend: Backend,
    /// Known dimensionality; 0 under API mode until the first successful
    /// call detects it.
    dims: AtomicUsize,
    max_input_chars: usize,
}

impl std::fmt::Debug for EmbeddingService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EmbeddingService")
            .field("mode", &self.mode().to_string())
            .field("model", &self.model_name())
            .finish()
    }
}

#[derive(Serialize)]
struct EmbeddingRequest<'a> {
    model: &'a str,
    input: &'a str,
}

#[derive(Deserialize)]
struct EmbeddingResponse {
    data: Vec<EmbeddingData>,
}

#[derive(Deserialize)]
struct EmbeddingData {
    embedding: Vec<f32>,
}

impl EmbeddingService {
    /// In-database mode: `VECTOR_EMBEDDING(model USING :text AS DATA)`.
    pub fn in_database(cm: ConnectionManager, model: impl Into<String>) -> Self {
        Self {
            cm,
            backend: Backend::InDatabase {
                model: model.into(),
            },
            dims: AtomicUsize::new(DEFAULT_ONNX_DIMS),
            max_input_chars: 512,
        }
    }

    /// API mode: POST `{base_url}/embeddings`, OpenAI-compatible body.
    /// Dimensionality is detected on the first successful call.
    pub fn api(
        cm: ConnectionManager,
        base_url: impl Into<String>,
        api_key: impl Into<String>,
        model: impl Into<String>,
    ) -> Result<Self> {
        let client = reqwest::Client::builder().timeout(API_TIMEOUT).build()?;
        Ok(Self {
            cm,
            backend: Backend::Api {
                client,
                base_url: base_url.into(),
                api_key: api_key.into(),
                model: model.into(),
            },
            dims: AtomicUsize::new(0),
            max_input_chars: 512,
        })
    }

    /// Build from config. `Ok(None)` means embeddings are disabled
    /// (`provider = "none"`); incomplete or unknown configurations are
    /// rejected here rather than inferred from populated fields.
    pub fn from_config(cm: ConnectionManager, cfg: &EmbeddingConfig) -> Result<Option<Self>> {
        let service = match resolve_backend(cfg)? {
            BackendChoice::None => return Ok(None),
            BackendChoice::InDatabase { model } => Self::in_database(cm, model),
            BackendChoice::Api {
                base_url,
                api_key,
                model,
            } => Self::api(cm, base_url, api_key, model)?,
        };
        Ok(Some(service.with_max_input_chars(cfg.max_input_chars)))
    }

    pub fn with_max_input_chars(mut self, max_input_chars: usize) -> Self {
        self.max_input_chars = max_input_chars.max(1);
        self
    }

    /// Generate an embedding vector for `text`.
    ///
    /// Empty input returns a zero vector of the known (or default)
    /// dimensionality without touching the backend; oversized input is
    /// truncated to `max_input_chars` first.
    pub async fn embed_text(&self, text: &str) -> Result<Vec<f32>> {
        if text.is_empty() {
            let dims = match self.dims.load(Ordering::Relaxed) {
                0 => DEFAULT_ONNX_DIMS,
                d => d,
            };
            return Ok(vec![0.0; dims]);
        }

        let text = truncate_chars(text, self.max_input_chars);

        match &self.backend {
            Backend::InDatabase { model } => self.embed_in_database(model.clone(), text).await,
            Backend::Api {
                client,
                base_url,
                api_key,
                model,
            } => {
                self.embed_via_api(client, base_url, api_key, model, &text)
                    .await
            }
        }
    }

    async fn embed_in_database(&self, model: String, text: String) -> Result<Vec<f32>> {
        let literal = self
            .cm
            .with_conn(move |conn| {
                let sql = format!(
                    "SELECT FROM_VECTOR(VECTOR_EMBEDDING({model} USING :1 AS DATA) RETURNING CLOB) FROM DUAL"
                );
                let value: String = conn.query_row_as(&sql, &[&text])?;
                Ok(value)
            })
            .await
            .map_err(|e| DhakiraError::Embedding(format!("VECTOR_EMBEDDING failed: {e}")))?;

        parse_vector_literal(&literal)
    }

    async fn embed_via_api(
        &self,
        client: &reqwest::Client,
        base_url: &str,
        api_key: &str,
        model: &str,
        text: &str,
    ) -> Result<Vec<f32>> {
        let url = format!("{base_url}/embeddings");
        let response = client
            .post(&url)
            .bearer_auth(api_key)
            .json(&EmbeddingRequest { model, input: text })
            .send()
            .await
            .map_err(|e| DhakiraError::Embedding(format!("embedding API call failed: {e}")))?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response
                .text()
                .await
                .unwrap_or_else(|_| "unknown error".into());
            return Err(DhakiraError::Embedding(format!(
                "embedding API returned {status}: {body}"
            )));
        }

        let parsed: EmbeddingResponse = response
            .json()
            .await
            .map_err(|e| DhakiraError::Embedding(format!("failed to parse embedding response: {e}")))?;

        let embedding = parsed
            .data
            .into_iter()
            .next()
            .map(|d| d.embedding)
            .filter(|e| !e.is_empty())
            .ok_or_else(|| DhakiraError::Embedding("embedding API returned empty result".into()))?;

        if self.dims.load(Ordering::Relaxed) == 0 {
            self.dims.store(embedding.len(), Ordering::Relaxed);
            tracing::info!(
                "embedding dimensions detected: {} (model {model})",
                embedding.len()
            );
        }

        Ok(embedding)
    }

    /// Embed several texts sequentially, failing fast on the first error.
    pub async fn embed_texts(&self, texts: &[&str]) -> Result<Vec<Vec<f32>>> {
        let mut results = Vec::with_capacity(texts.len());
        for text in texts {
            results.push(self.embed_text(text).await?);
        }
        Ok(results)
    }

    /// Whether the ONNX model is loaded in the database. Always `true`
    /// under API mode — no in-database model is involved.
    pub async fn check_onnx_loaded(&self) -> Result<bool> {
        let model = match &self.backend {
            Backend::Api { .. } => return Ok(true),
            Backend::InDatabase { model } => model.clone(),
        };

        self.cm
            .with_conn(move |conn| {
                let count: i64 = conn.query_row_as(
                    "SELECT COUNT(*) FROM USER_MINING_MODELS WHERE MODEL_NAME = :1",
                    &[&model],
                )?;
                Ok(count > 0)
            })
            .await
            .map_err(|e| DhakiraError::Embedding(format!("failed to check ONNX model: {e}")))
    }

    /// Load the ONNX model into the database via `DBMS_VECTOR`. No-op
    /// under API mode.
    pub async fn load_onnx_model(&self, onnx_dir: &str, onnx_file: &str) -> Result<()> {
        let model = match &self.backend {
            Backend::Api { .. } => return Ok(()),
            Backend::InDatabase { model } => model.clone(),
        };

        let plsql = format!(
            "BEGIN
                DBMS_VECTOR.LOAD_ONNX_MODEL(
                    directory  => '{onnx_dir}',
                    file_name  => '{onnx_file}',
                    model_name => '{model}'
                );
            END;"
        );

        self.cm
            .with_conn(move |conn| {
                conn.execute(&plsql, &[])?;
                Ok(())
            })
            .await
            .map_err(|e| DhakiraError::Embedding(format!("failed to load ONNX model: {e}")))?;

        tracing::info!("ONNX model loaded: {} ({onnx_dir}/{onnx_file})", self.model_name());
        Ok(())
    }

    /// Smoke check: embed a fixed probe string and report success.
    pub async fn test_embedding(&self) -> bool {
        self.embed_text("test").await.is_ok()
    }

    /// Known dimensionality; 0 under API mode before the first call.
    pub fn dims(&self) -> usize {
        self.dims.load(Ordering::Relaxed)
    }

    pub fn model_name(&self) -> &str {
        match &self.backend {
            Backend::InDatabase { model } => model,
            Backend::Api { model, .. } => model,
        }
    }

    pub fn mode(&self) -> EmbeddingMode {
        match &self.backend {
            Backend::InDatabase { .. } => EmbeddingMode::InDatabase,
            Backend::Api { .. } => EmbeddingMode::Api,
        }
    }
}

fn truncate_chars(text: &str, max_chars: usize) -> String {
    if text.chars().count() <= max_chars {
        text.to_string()
    } else {
        text.chars().take(max_chars).collect()
    }
}
