use thiserror::Error;

#[derive(Debug, Error)]
pub enum DhakiraError {
    #[error("Storage error: {0}")]
    Storage(String),

    #[error("Database error: {0}")]
    Database(#[from] oracle::Error),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Embedding error: {0}")]
    Embedding(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Not found: {0}")]
    NotFound(String),
}

impl DhakiraError {
    /// Returns `true` when the underlying database error carries the given
    /// ORA error code.
    pub fn is_ora(&self, code: i32) -> bool {
        match self {
            Self::Database(e) => e.db_error().map(|d| d.code()) == Some(code),
            _ => false,
        }
    }

    /// Returns `true` for the driver's no-rows condition, which the stores
    /// map to neutral empty values rather than surfacing.
    pub fn is_no_rows(&self) -> bool {
        matches!(
            self,
            Self::Database(e) if matches!(e.kind(), oracle::ErrorKind::NoDataFound)
        )
    }
}

pub type Result<T> = std::result::Result<T, DhakiraError>;
