// Error types for the execution engine

use thiserror::Error;
use uuid::Uuid;

/// Result type alias for engine operations
pub type Result<T> = std::result::Result<T, EngineError>;

/// Errors raised by the engine and translated into the REST error envelope
#[derive(Debug, Error)]
pub enum EngineError {
    /// Identifier fails the slug grammar
    #[error("Invalid identifier: {0}")]
    InvalidIdentifier(String),

    /// Referenced package or sub-package could not be found
    #[error("Package not found: {0}")]
    PackageNotFound(String),

    /// Package document is invalid at deploy time
    #[error("Package registration error: {0}")]
    PackageRegistration(String),

    /// Package I/O types are inconsistent
    #[error("Package type error: {0}")]
    PackageType(String),

    /// Runtime failure while executing a package
    #[error("Package execution error: {0}")]
    PackageExecution(String),

    /// Process does not exist
    #[error("Process not found: {0}")]
    ProcessNotFound(String),

    /// Process exists but the caller may not see it
    #[error("Process not accessible: {0}")]
    ProcessNotAccessible(String),

    /// Duplicate process id without overwrite
    #[error("Process registration error: {0}")]
    ProcessRegistration(String),

    /// Job does not exist
    #[error("Job not found: {0}")]
    JobNotFound(Uuid),

    /// Provider does not exist
    #[error("Service not found: {0}")]
    ServiceNotFound(String),

    /// Provider exists but the caller may not see it
    #[error("Service not accessible: {0}")]
    ServiceNotAccessible(String),

    /// Remote provider could not be reached after retries
    #[error("Communication failure: {0}")]
    CommunicationFailure(String),

    /// Internal error
    #[error("Internal error: {0}")]
    Internal(#[from] anyhow::Error),
}

impl EngineError {
    /// Create a package registration error
    pub fn registration(msg: impl Into<String>) -> Self {
        EngineError::PackageRegistration(msg.into())
    }

    /// Create a package type error
    pub fn package_type(msg: impl Into<String>) -> Self {
        EngineError::PackageType(msg.into())
    }

    /// Create a package execution error
    pub fn execution(msg: impl Into<String>) -> Self {
        EngineError::PackageExecution(msg.into())
    }

    /// Create a communication failure error
    pub fn communication(msg: impl Into<String>) -> Self {
        EngineError::CommunicationFailure(msg.into())
    }

    /// Machine-readable error code used in the REST error envelope and in
    /// job exception records
    pub fn code(&self) -> &'static str {
        match self {
            EngineError::InvalidIdentifier(_) => "InvalidIdentifier",
            EngineError::PackageNotFound(_) => "PackageNotFound",
            EngineError::PackageRegistration(_) => "PackageRegistrationError",
            EngineError::PackageType(_) => "PackageTypeError",
            EngineError::PackageExecution(_) => "PackageExecutionError",
            EngineError::ProcessNotFound(_) => "ProcessNotFound",
            EngineError::ProcessNotAccessible(_) => "ProcessNotAccessible",
            EngineError::ProcessRegistration(_) => "ProcessRegistrationError",
            EngineError::JobNotFound(_) => "JobNotFound",
            EngineError::ServiceNotFound(_) => "ServiceNotFound",
            EngineError::ServiceNotAccessible(_) => "ServiceNotAccessible",
            EngineError::CommunicationFailure(_) => "CommunicationFailure",
            EngineError::Internal(_) => "InternalServerError",
        }
    }

    /// HTTP status the REST layer maps this error onto
    pub fn http_status(&self) -> u16 {
        match self {
            EngineError::InvalidIdentifier(_) => 400,
            EngineError::PackageNotFound(_) => 404,
            EngineError::PackageRegistration(_) => 422,
            EngineError::PackageType(_) => 422,
            // execution failures surface through the job record, not HTTP
            EngineError::PackageExecution(_) => 200,
            EngineError::ProcessNotFound(_) => 404,
            EngineError::ProcessNotAccessible(_) => 403,
            EngineError::ProcessRegistration(_) => 409,
            EngineError::JobNotFound(_) => 404,
            EngineError::ServiceNotFound(_) => 404,
            EngineError::ServiceNotAccessible(_) => 403,
            EngineError::CommunicationFailure(_) => 503,
            EngineError::Internal(_) => 500,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_codes_map_to_http_statuses() {
        assert_eq!(EngineError::InvalidIdentifier("x".into()).http_status(), 400);
        assert_eq!(EngineError::registration("bad").http_status(), 422);
        assert_eq!(EngineError::package_type("bad").http_status(), 422);
        assert_eq!(
            EngineError::ProcessRegistration("dup".into()).http_status(),
            409
        );
        assert_eq!(EngineError::ProcessNotAccessible("p".into()).http_status(), 403);
    }

    #[test]
    fn test_error_code_strings() {
        assert_eq!(
            EngineError::PackageNotFound("ref".into()).code(),
            "PackageNotFound"
        );
        assert_eq!(
            EngineError::communication("down").code(),
            "CommunicationFailure"
        );
    }
}
