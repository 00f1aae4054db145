use thiserror::Error;

/// Malformed input rejected before any write.
///
/// Never retried: the caller must fix the input.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("invalid {field}: {message}")]
pub struct ValidationError {
    /// Name of the offending field (e.g. `"embedding"`, `"user_id"`).
    pub field: &'static str,
    pub message: String,
}

impl ValidationError {
    pub fn new(field: &'static str, message: impl Into<String>) -> Self {
        Self {
            field,
            message: message.into(),
        }
    }
}

/// Errors from embedding providers.
#[derive(Debug, Clone, Error)]
pub enum EmbeddingError {
    #[error("embedding provider error: {message}")]
    Provider { message: String },

    #[error("embedding provider rate limited")]
    RateLimited,

    #[error("embedding provider overloaded: {0}")]
    Overloaded(String),

    #[error("embedding provider authentication failed")]
    AuthenticationFailed,

    #[error("malformed embedding response: {0}")]
    Malformed(String),

    #[error("embedding timed out after {0}ms")]
    Timeout(u64),
}

/// Errors from the vector index / record storage engine.
#[derive(Debug, Clone, Error)]
pub enum IndexError {
    #[error("index connection error: {0}")]
    Connection(String),

    #[error("index operation timed out after {0}ms")]
    Timeout(u64),

    #[error("index query error: {0}")]
    Query(String),
}

/// Errors from the summarization provider used for reflections.
#[derive(Debug, Clone, Error)]
pub enum SummarizeError {
    #[error("summarization provider error: {message}")]
    Provider { message: String },

    #[error("summarization provider rate limited")]
    RateLimited,

    #[error("summarization provider authentication failed")]
    AuthenticationFailed,

    #[error("summarization returned no text")]
    Empty,

    #[error("summarization timed out after {0}ms")]
    Timeout(u64),
}

/// Errors from the live conversation transport.
#[derive(Debug, Clone, Error)]
pub enum TransportError {
    #[error("live transport closed")]
    Closed,

    #[error("live transport send failed: {0}")]
    Send(String),
}

/// Errors surfaced by memory store operations that are allowed to fail.
#[derive(Debug, Clone, Error)]
pub enum MemoryError {
    #[error(transparent)]
    Validation(#[from] ValidationError),

    #[error(transparent)]
    Embedding(#[from] EmbeddingError),

    #[error(transparent)]
    Index(#[from] IndexError),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validation_error_display() {
        let err = ValidationError::new("context", "cannot be empty");
        assert_eq!(err.to_string(), "invalid context: cannot be empty");
    }

    #[test]
    fn test_memory_error_is_transparent() {
        let err: MemoryError = IndexError::Query("bad filter".to_string()).into();
        assert_eq!(err.to_string(), "index query error: bad filter");

        let err: MemoryError = ValidationError::new("embedding", "NaN at index 3").into();
        assert!(matches!(err, MemoryError::Validation(_)));
    }

    #[test]
    fn test_embedding_timeout_display() {
        let err = EmbeddingError::Timeout(1500);
        assert_eq!(err.to_string(), "embedding timed out after 1500ms");
    }
}
