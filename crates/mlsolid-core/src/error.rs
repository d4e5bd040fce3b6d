//! Error types for mlsolid domain operations

use thiserror::Error;

/// Result type alias for domain operations
pub type Result<T> = std::result::Result<T, SolidError>;

/// Main error type for domain operations
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SolidError {
    /// Run, experiment, artifact, registry, tag or version absent
    #[error("not found: {0}")]
    NotFound(String),

    /// Duplicate run id or registry name
    #[error("already in use: {0}")]
    AlreadyInUse(String),

    /// Value does not fit the target it is applied to
    #[error("invalid input: {0}")]
    InvalidInput(String),

    /// Malformed request (empty required field, unknown content type)
    #[error("bad request: {0}")]
    BadRequest(String),

    /// Generic internal error
    #[error("internal error: {0}")]
    Internal(String),

    /// Capability used before it was configured
    #[error("not initialized: {0}")]
    NotInitialized(String),
}

impl SolidError {
    /// Check if this error is a not-found error
    pub fn is_not_found(&self) -> bool {
        matches!(self, SolidError::NotFound(_))
    }
}

impl From<serde_json::Error> for SolidError {
    fn from(err: serde_json::Error) -> Self {
        SolidError::Internal(format!("serialization error: {}", err))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = SolidError::NotFound("run <linreg>".to_string());
        assert_eq!(err.to_string(), "not found: run <linreg>");
        assert!(err.is_not_found());

        let err = SolidError::AlreadyInUse("registry".to_string());
        assert!(!err.is_not_found());
    }
}
