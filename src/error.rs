use thiserror::Error;

/// Main error type for the BOL ingestion pipeline
#[derive(Error, Debug)]
pub enum BolError {
    /// Database-related errors (the only fatal class during processing)
    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    /// File system I/O errors
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Configuration errors
    #[error("Configuration error: {0}")]
    Config(String),

    /// Upload rejected before any record was created
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// OCR backend errors (absorbed into document state by the invoker)
    #[error("OCR error: {0}")]
    Ocr(String),

    /// Referenced document/appointment/facility does not exist
    #[error("Not found: {0}")]
    NotFound(String),

    /// Tenant isolation violation on a linking request
    #[error("Forbidden: {0}")]
    Forbidden(String),

    /// Processing status attempted to move backwards or out of a terminal state
    #[error("Illegal status transition: {0}")]
    StatusTransition(String),

    /// JSON (de)serialization of persisted field maps
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Convenient Result type using BolError
pub type Result<T> = std::result::Result<T, BolError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = BolError::InvalidInput("mime type text/html not allowed".to_string());
        assert!(err.to_string().contains("Invalid input"));
        assert!(err.to_string().contains("text/html"));
    }

    #[test]
    fn test_error_from_rusqlite() {
        let rusqlite_err = rusqlite::Error::InvalidQuery;
        let bol_err: BolError = rusqlite_err.into();
        assert!(matches!(bol_err, BolError::Database(_)));
    }

    #[test]
    fn test_forbidden_distinct_from_not_found() {
        let forbidden = BolError::Forbidden("tenant mismatch".to_string());
        let not_found = BolError::NotFound("appointment abc".to_string());
        assert!(matches!(forbidden, BolError::Forbidden(_)));
        assert!(matches!(not_found, BolError::NotFound(_)));
        assert_ne!(forbidden.to_string(), not_found.to_string());
    }
}
