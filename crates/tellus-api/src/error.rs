// Canonical REST error envelope
//
// Handlers raise EngineError; this layer translates each into
// `{code, description, detail?}` with the taxonomy's HTTP status. Anything
// uncaught becomes a 500 with a generic description; the trace is logged,
// never returned.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Serialize;
use serde_json::Value;
use tellus_core::EngineError;
use utoipa::ToSchema;

/// Error body returned by every REST endpoint
#[derive(Debug, Serialize, ToSchema)]
pub struct ErrorEnvelope {
    pub code: String,
    pub description: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub detail: Option<Value>,
}

/// Wrapper turning engine errors into REST responses
pub struct ApiError {
    status: StatusCode,
    envelope: ErrorEnvelope,
}

pub type ApiResult<T> = Result<T, ApiError>;

impl ApiError {
    pub fn new(status: StatusCode, code: impl Into<String>, description: impl Into<String>) -> Self {
        Self {
            status,
            envelope: ErrorEnvelope {
                code: code.into(),
                description: description.into(),
                detail: None,
            },
        }
    }

    pub fn bad_request(description: impl Into<String>) -> Self {
        Self::new(StatusCode::BAD_REQUEST, "InvalidParameterValue", description)
    }

    pub fn not_found(description: impl Into<String>) -> Self {
        Self::new(StatusCode::NOT_FOUND, "NotFound", description)
    }
}

impl From<EngineError> for ApiError {
    fn from(error: EngineError) -> Self {
        if let EngineError::Internal(trace) = &error {
            tracing::error!(error = ?trace, "Unhandled engine error");
            return Self::new(
                StatusCode::INTERNAL_SERVER_ERROR,
                "InternalServerError",
                "internal server error",
            );
        }
        let status = StatusCode::from_u16(error.http_status())
            .unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
        Self {
            status,
            envelope: ErrorEnvelope {
                code: error.code().to_string(),
                description: error.to_string(),
                detail: None,
            },
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (self.status, Json(self.envelope)).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_engine_error_mapping() {
        let err: ApiError = EngineError::ProcessNotFound("proc-a".into()).into();
        assert_eq!(err.status, StatusCode::NOT_FOUND);
        assert_eq!(err.envelope.code, "ProcessNotFound");

        let err: ApiError = EngineError::registration("bad package").into();
        assert_eq!(err.status, StatusCode::UNPROCESSABLE_ENTITY);

        let err: ApiError = EngineError::ProcessRegistration("dup".into()).into();
        assert_eq!(err.status, StatusCode::CONFLICT);
    }

    #[test]
    fn test_internal_errors_hide_trace() {
        let err: ApiError = EngineError::Internal(anyhow::anyhow!("secret detail")).into();
        assert_eq!(err.status, StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(err.envelope.description, "internal server error");
    }
}
