//! Service-layer error types
//!
//! This module defines error types specific to the service layer, mapping
//! domain and storage errors to a small set of classified kinds that a
//! transport maps onto its own status codes.

use mlsolid_core::SolidError;
use mlsolid_db::DbError;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Result type alias for service operations
pub type ServiceResult<T> = std::result::Result<T, ServiceError>;

/// Classification of a service failure
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    NotFound,
    AlreadyInUse,
    InvalidInput,
    BadRequest,
    Internal,
    NotInitialized,
}

/// Service-layer error types
#[derive(Error, Debug)]
pub enum ServiceError {
    /// Run, experiment, artifact, registry, tag or version not found
    #[error("Not found: {0}")]
    NotFound(String),

    /// Duplicate run id or registry name
    #[error("Already in use: {0}")]
    AlreadyInUse(String),

    /// Invalid input
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// Malformed request
    #[error("Bad request: {0}")]
    BadRequest(String),

    /// Capability used before it was configured
    #[error("Not initialized: {0}")]
    NotInitialized(String),

    /// Some items of a batch failed; the rest were committed
    #[error("Partial failure ({} failed: {}): {message}", failed.len(), failed.join(", "))]
    PartialFailure { failed: Vec<String>, message: String },

    /// Optimistic transaction kept conflicting
    #[error("Retries exhausted: {0}")]
    RetriesExhausted(String),

    /// Store communication error
    #[error("Storage error: {0}")]
    Storage(String),

    /// Internal service error
    #[error("Internal error: {0}")]
    Internal(String),
}

impl ServiceError {
    /// Classify the error
    pub fn kind(&self) -> ErrorKind {
        match self {
            ServiceError::NotFound(_) => ErrorKind::NotFound,
            ServiceError::AlreadyInUse(_) => ErrorKind::AlreadyInUse,
            ServiceError::InvalidInput(_) => ErrorKind::InvalidInput,
            ServiceError::BadRequest(_) => ErrorKind::BadRequest,
            ServiceError::NotInitialized(_) => ErrorKind::NotInitialized,
            ServiceError::PartialFailure { .. }
            | ServiceError::RetriesExhausted(_)
            | ServiceError::Storage(_)
            | ServiceError::Internal(_) => ErrorKind::Internal,
        }
    }

    pub fn is_not_found(&self) -> bool {
        self.kind() == ErrorKind::NotFound
    }
}

impl From<SolidError> for ServiceError {
    fn from(err: SolidError) -> Self {
        match err {
            SolidError::NotFound(msg) => ServiceError::NotFound(msg),
            SolidError::AlreadyInUse(msg) => ServiceError::AlreadyInUse(msg),
            SolidError::InvalidInput(msg) => ServiceError::InvalidInput(msg),
            SolidError::BadRequest(msg) => ServiceError::BadRequest(msg),
            SolidError::Internal(msg) => ServiceError::Internal(msg),
            SolidError::NotInitialized(msg) => ServiceError::NotInitialized(msg),
        }
    }
}

impl From<DbError> for ServiceError {
    fn from(err: DbError) -> Self {
        match err {
            DbError::NotFound(msg) => ServiceError::NotFound(msg),
            DbError::AlreadyExists(msg) => ServiceError::AlreadyInUse(msg),
            DbError::InvalidData(msg) => ServiceError::Internal(format!("corrupt record: {}", msg)),
            DbError::Protocol(msg) => ServiceError::Internal(msg),
            DbError::RetriesExhausted { .. } => ServiceError::RetriesExhausted(err.to_string()),
            DbError::Connection(msg) => ServiceError::Storage(msg),
            DbError::Command(msg) => ServiceError::Storage(msg),
            DbError::ObjectStore(msg) => ServiceError::Storage(msg),
            DbError::Serialization(msg) => ServiceError::Internal(msg),
            DbError::Configuration(msg) => ServiceError::Internal(msg),
            DbError::Domain(err) => ServiceError::from(err),
        }
    }
}

impl From<serde_json::Error> for ServiceError {
    fn from(err: serde_json::Error) -> Self {
        ServiceError::Internal(format!("Serialization error: {}", err))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_service_error_from_domain_error() {
        let err: ServiceError = SolidError::AlreadyInUse("run <a>".to_string()).into();
        assert_eq!(err.kind(), ErrorKind::AlreadyInUse);
    }

    #[test]
    fn test_service_error_from_db_error() {
        let err: ServiceError = DbError::NotFound("run <a>".to_string()).into();
        assert!(err.is_not_found());

        let err: ServiceError = DbError::AlreadyExists("registry <r>".to_string()).into();
        assert_eq!(err.kind(), ErrorKind::AlreadyInUse);

        let err: ServiceError = DbError::RetriesExhausted {
            attempts: 10,
            keys: vec![],
        }
        .into();
        assert_eq!(err.kind(), ErrorKind::Internal);

        let err: ServiceError = DbError::Domain(SolidError::NotFound("tag".to_string())).into();
        assert!(err.is_not_found());
    }

    #[test]
    fn test_storage_corruption_is_internal() {
        let err: ServiceError = DbError::InvalidData("run hash is missing Timestamp".to_string()).into();
        assert_eq!(err.kind(), ErrorKind::Internal);
        assert_eq!(err.to_string(), "Internal error: corrupt record: run hash is missing Timestamp");

        let err: ServiceError = DbError::Protocol("expected hash reply, got Done".to_string()).into();
        assert_eq!(err.kind(), ErrorKind::Internal);

        // Caller mistakes still surface as invalid input
        let err: ServiceError = DbError::Domain(SolidError::InvalidInput("metric type".to_string())).into();
        assert_eq!(err.kind(), ErrorKind::InvalidInput);
    }

    #[test]
    fn test_partial_failure_display() {
        let err = ServiceError::PartialFailure {
            failed: vec!["a.log".to_string(), "b.log".to_string()],
            message: "upload failed".to_string(),
        };
        assert_eq!(err.kind(), ErrorKind::Internal);
        assert_eq!(
            err.to_string(),
            "Partial failure (2 failed: a.log, b.log): upload failed"
        );
    }
}
