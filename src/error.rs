use std::time::Duration;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, ProcessingError>;

#[derive(Error, Debug)]
pub enum ProcessingError {
    #[error("File I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Configuration source error: {0}")]
    ConfigSource(#[from] config::ConfigError),

    #[error("Validation error: {0}")]
    Validation(#[from] validator::ValidationErrors),

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Invalid data format: {0}")]
    InvalidFormat(String),

    #[error("Thread pool error: {0}")]
    ThreadPool(#[from] rayon::ThreadPoolBuildError),

    #[error("Ingestion run cancelled")]
    Cancelled,

    #[error("Operation timed out after {0:?}")]
    Timeout(Duration),

    #[error("Async task error: {0}")]
    TaskJoin(#[from] tokio::task::JoinError),
}

impl ProcessingError {
    /// Whether the failure is worth retrying by the caller. Store and
    /// timeout failures are transient; everything else needs a fix first.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            ProcessingError::Database(_) | ProcessingError::Timeout(_) | ProcessingError::Io(_)
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_retryable_classification() {
        assert!(ProcessingError::Timeout(Duration::from_secs(5)).is_retryable());
        assert!(ProcessingError::Database(sqlx::Error::PoolTimedOut).is_retryable());
        assert!(!ProcessingError::Cancelled.is_retryable());
        assert!(!ProcessingError::InvalidInput("page".to_string()).is_retryable());
    }

    #[test]
    fn test_error_display() {
        let err = ProcessingError::Timeout(Duration::from_secs(30));
        assert_eq!(err.to_string(), "Operation timed out after 30s");

        let err = ProcessingError::Timeout(Duration::from_millis(250));
        assert_eq!(err.to_string(), "Operation timed out after 250ms");
    }
}
