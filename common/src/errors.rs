//! Unified error type for the service.
//!
//! Every fallible operation returns [`AppResult`]. Errors convert into an
//! HTTP response carrying the standard [`ApiResponse`] error envelope.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use thiserror::Error;

use crate::response::ApiResponse;

/// Result alias used across all crates.
pub type AppResult<T> = Result<T, AppError>;

/// Application error.
#[derive(Debug, Error)]
pub enum AppError {
    /// Request payload failed validation.
    #[error("validation error: {0}")]
    Validation(String),

    /// Missing or malformed configuration.
    #[error("configuration error: {0}")]
    Configuration(String),

    /// The remote model service could not be reached or rejected the request.
    #[error("external service error: {0}")]
    ExternalService(String),

    /// The remote model answered with a body we could not interpret.
    #[error("invalid model response: {0}")]
    LlmResponse(String),

    /// Opening a database connection failed.
    #[error("database connection error: {0}")]
    DatabaseConnection(String),

    /// A statement failed while executing.
    #[error("database query error: {0}")]
    DatabaseQuery(String),

    /// Statement rejected by the configured allow-list.
    #[error("statement not allowed: {0}")]
    UnsafeSql(String),

    #[error("internal error: {0}")]
    Internal(String),
}

impl AppError {
    /// Machine-readable error code sent to clients.
    pub fn code(&self) -> &'static str {
        match self {
            AppError::Validation(_) => "VALIDATION_ERROR",
            AppError::Configuration(_) => "CONFIGURATION_ERROR",
            AppError::ExternalService(_) => "EXTERNAL_SERVICE_ERROR",
            AppError::LlmResponse(_) => "LLM_RESPONSE_ERROR",
            AppError::DatabaseConnection(_) => "DATABASE_CONNECTION_ERROR",
            AppError::DatabaseQuery(_) => "DATABASE_QUERY_ERROR",
            AppError::UnsafeSql(_) => "UNSAFE_SQL",
            AppError::Internal(_) => "INTERNAL_ERROR",
        }
    }

    /// HTTP status code for this error.
    pub fn status_code(&self) -> StatusCode {
        match self {
            AppError::Validation(_) | AppError::UnsafeSql(_) => StatusCode::BAD_REQUEST,
            AppError::ExternalService(_) | AppError::LlmResponse(_) => StatusCode::BAD_GATEWAY,
            AppError::DatabaseConnection(_) => StatusCode::SERVICE_UNAVAILABLE,
            AppError::Configuration(_) | AppError::DatabaseQuery(_) | AppError::Internal(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        if status.is_server_error() {
            tracing::error!(code = self.code(), error = %self, "request failed");
        } else {
            tracing::warn!(code = self.code(), error = %self, "request rejected");
        }
        let body = ApiResponse::err(self.code(), self.to_string());
        (status, Json(body)).into_response()
    }
}

impl From<validator::ValidationErrors> for AppError {
    fn from(errors: validator::ValidationErrors) -> Self {
        AppError::Validation(errors.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_codes() {
        assert_eq!(
            AppError::Validation("x".into()).status_code(),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            AppError::ExternalService("x".into()).status_code(),
            StatusCode::BAD_GATEWAY
        );
        assert_eq!(
            AppError::Configuration("x".into()).status_code(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }

    #[tokio::test]
    async fn test_into_response_uses_envelope() {
        let response = AppError::LlmResponse("no choices".into()).into_response();
        assert_eq!(response.status(), StatusCode::BAD_GATEWAY);

        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        let json: serde_json::Value = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(json["success"], false);
        assert_eq!(json["error"]["code"], "LLM_RESPONSE_ERROR");
        assert!(json["error"]["message"]
            .as_str()
            .unwrap()
            .contains("no choices"));
    }
}
