use thiserror::Error;

#[derive(Debug, Error)]
pub enum RiskServiceError {
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Redis error: {0}")]
    Redis(#[from] redis::RedisError),

    #[error("HTTP request error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Post not found: {0}")]
    PostNotFound(String),

    #[error("Alert not found: {0}")]
    AlertNotFound(String),

    #[error("Media not found: {0}")]
    MediaNotFound(String),

    #[error("Source already running: {0}")]
    SourceAlreadyRunning(String),

    #[error("Inference error: {0}")]
    Inference(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl RiskServiceError {
    /// Terminal failures are never retried by the analysis worker.
    pub fn is_terminal(&self) -> bool {
        matches!(self, RiskServiceError::PostNotFound(_))
    }
}

pub type Result<T> = std::result::Result<T, RiskServiceError>;
