use thiserror::Error;

/// Application-wide error types for partscout.
#[derive(Error, Debug)]
pub enum AppError {
    /// The rendering session died and must be replaced.
    #[error("Session invalid: {0}")]
    SessionInvalid(String),

    /// A page could not be fetched within the retry budget.
    #[error("Failed to fetch {url} after {attempts} attempts: {reason}")]
    FetchFailed {
        url: String,
        attempts: u32,
        reason: String,
    },

    /// Creating or closing a rendering session failed.
    #[error("Session error: {0}")]
    SessionError(String),

    /// A single record could not be extracted from a document.
    #[error("Parse error: {0}")]
    ParseError(String),

    /// A per-model task exceeded its wall-clock budget.
    #[error("Model {model_number} timed out after {secs} seconds")]
    TaskTimeout { model_number: String, secs: u64 },

    /// A per-model task ended abnormally (panic or abort).
    #[error("Task failed: {0}")]
    TaskFailed(String),

    /// Database operation failed.
    #[error("Database error: {0}")]
    DatabaseError(String),

    /// The incoming snapshot is much smaller than the stored partition.
    #[error("Refusing to replace partition: {incoming} incoming models vs {existing} stored")]
    ShrinkGuard { existing: i64, incoming: usize },

    /// Invalid or missing configuration.
    #[error("Configuration error: {0}")]
    ConfigError(String),

    /// JSON serialization/deserialization failed.
    #[error("Serialization error: {0}")]
    SerializationError(#[from] serde_json::Error),

    /// The run was cancelled before completion.
    #[error("Crawl cancelled")]
    Cancelled,

    /// Generic error.
    #[error("{0}")]
    Generic(String),
}

impl AppError {
    /// Returns true if this error is transient and worth retrying.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            AppError::SessionInvalid(_) | AppError::FetchFailed { .. }
        )
    }

    /// Returns true if this error aborts the whole run rather than one model.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            AppError::DatabaseError(_)
                | AppError::ShrinkGuard { .. }
                | AppError::ConfigError(_)
                | AppError::Cancelled
        )
    }
}
