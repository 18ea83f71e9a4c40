//! Event store error types

use thiserror::Error;

/// Errors that can occur in the event log
#[derive(Error, Debug)]
pub enum EventStoreError {
    /// SQLite operation failed
    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    /// Property bag could not be (de)serialized
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// I/O operation failed (creating the data directory)
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Event rejected before it reached the log
    #[error("Invalid event: {0}")]
    InvalidEvent(String),

    /// Connection mutex was poisoned by a panicking writer
    #[error("Lock error: {0}")]
    Lock(String),

    /// Blocking database task panicked or was cancelled
    #[error("Task error: {0}")]
    Task(String),
}

/// Result type alias for event store operations
pub type EventStoreResult<T> = Result<T, EventStoreError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = EventStoreError::InvalidEvent("empty type".to_string());
        assert_eq!(err.to_string(), "Invalid event: empty type");
    }

    #[test]
    fn test_json_error_conversion() {
        let json_err = serde_json::from_str::<serde_json::Value>("{").unwrap_err();
        let err: EventStoreError = json_err.into();
        assert!(matches!(err, EventStoreError::Serialization(_)));
    }
}
