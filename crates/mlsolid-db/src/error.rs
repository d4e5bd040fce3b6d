//! Storage-specific error types and conversions
//!
//! This module provides error types for metadata and object store
//! operations, including connection errors, command errors and decoding
//! errors for stored records.

use thiserror::Error;

/// Result type alias for storage operations
pub type DbResult<T> = Result<T, DbError>;

/// Storage-specific errors
#[derive(Debug, Error)]
pub enum DbError {
    /// Store connection error
    #[error("Store connection error: {0}")]
    Connection(String),

    /// Command failed on the store
    #[error("Command error: {0}")]
    Command(String),

    /// Optimistic transaction gave up after the retry budget
    #[error("Transaction retries exhausted after {attempts} attempts on {keys:?}")]
    RetriesExhausted { attempts: usize, keys: Vec<String> },

    /// Record not found
    #[error("Not found: {0}")]
    NotFound(String),

    /// Record already exists
    #[error("Already exists: {0}")]
    AlreadyExists(String),

    /// Stored record could not be decoded
    #[error("Invalid data format: {0}")]
    InvalidData(String),

    /// Reply did not have the shape the command implies
    #[error("Unexpected reply: {0}")]
    Protocol(String),

    /// Serialization/deserialization error
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// Object store I/O error
    #[error("Object store error: {0}")]
    ObjectStore(String),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// Domain error from core crate
    #[error("Domain error: {0}")]
    Domain(#[from] mlsolid_core::SolidError),
}

impl DbError {
    /// Check if this error is a not-found error
    pub fn is_not_found(&self) -> bool {
        matches!(self, DbError::NotFound(_))
            || matches!(self, DbError::Domain(e) if e.is_not_found())
    }

    /// Check if this is a duplicate/already exists error
    pub fn is_already_exists(&self) -> bool {
        matches!(
            self,
            DbError::AlreadyExists(_) | DbError::Domain(mlsolid_core::SolidError::AlreadyInUse(_))
        )
    }

    /// Check if the optimistic transaction ran out of retries
    pub fn is_retries_exhausted(&self) -> bool {
        matches!(self, DbError::RetriesExhausted { .. })
    }

    /// Check if this is a transient error that could be retried
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            DbError::Connection(_) | DbError::RetriesExhausted { .. }
        )
    }
}

/// Convert Redis errors to our error type
impl From<redis::RedisError> for DbError {
    fn from(err: redis::RedisError) -> Self {
        if err.is_io_error() || err.is_connection_refusal() || err.is_connection_dropped() {
            DbError::Connection(err.to_string())
        } else if err.kind() == redis::ErrorKind::TypeError {
            DbError::Protocol(err.to_string())
        } else {
            DbError::Command(err.to_string())
        }
    }
}

/// Convert serde_json errors
impl From<serde_json::Error> for DbError {
    fn from(err: serde_json::Error) -> Self {
        DbError::Serialization(format!("{}", err))
    }
}

/// Convert URL parse errors
impl From<url::ParseError> for DbError {
    fn from(err: url::ParseError) -> Self {
        DbError::Configuration(format!("Invalid URL: {}", err))
    }
}

impl From<std::io::Error> for DbError {
    fn from(err: std::io::Error) -> Self {
        if err.kind() == std::io::ErrorKind::NotFound {
            DbError::NotFound(format!("object: {}", err))
        } else {
            DbError::ObjectStore(err.to_string())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mlsolid_core::SolidError;

    #[test]
    fn test_error_classification() {
        let not_found = DbError::NotFound("run:linreg".to_string());
        assert!(not_found.is_not_found());
        assert!(!not_found.is_already_exists());

        let domain = DbError::from(SolidError::NotFound("tag".to_string()));
        assert!(domain.is_not_found());

        let exhausted = DbError::RetriesExhausted {
            attempts: 10,
            keys: vec!["info:registry:r".to_string()],
        };
        assert!(exhausted.is_retries_exhausted());
        assert!(exhausted.is_transient());

        let io = DbError::from(std::io::Error::new(std::io::ErrorKind::NotFound, "gone"));
        assert!(io.is_not_found());
    }

    #[test]
    fn test_type_errors_are_protocol_errors() {
        let err = DbError::from(redis::RedisError::from((redis::ErrorKind::TypeError, "bad reply")));
        assert!(matches!(err, DbError::Protocol(_)));
        assert!(!err.is_transient());
    }

    #[test]
    fn test_error_display() {
        let err = DbError::NotFound("run:linreg".to_string());
        assert_eq!(err.to_string(), "Not found: run:linreg");

        let err = DbError::RetriesExhausted {
            attempts: 3,
            keys: vec!["a".to_string()],
        };
        assert_eq!(
            err.to_string(),
            "Transaction retries exhausted after 3 attempts on [\"a\"]"
        );
    }
}
