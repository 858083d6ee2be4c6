//! Error types for the Kiln server

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use kiln_core::{CoreError, ErrorKind};
use serde_json::json;
use thiserror::Error;
use tracing::{error, warn};

/// Server error types
#[derive(Error, Debug)]
pub enum ServerError {
    #[error("Core engine error: {0}")]
    Core(#[from] CoreError),

    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    #[error("Request body too large: {0}")]
    PayloadTooLarge(String),

    #[error("Request exceeded the {0:.1}s deadline")]
    Timeout(f64),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Internal server error: {0}")]
    Internal(String),
}

/// Result type for server operations
pub type ServerResult<T> = Result<T, ServerError>;

impl ServerError {
    /// HTTP status, error kind and stable code for the response body
    pub fn classify(&self) -> (StatusCode, &'static str, &'static str) {
        match self {
            ServerError::Core(core_err) => (
                Self::status_for_kind(core_err.kind()),
                core_err.kind().as_str(),
                core_err.code(),
            ),
            ServerError::InvalidRequest(_) => (
                StatusCode::BAD_REQUEST,
                ErrorKind::InvalidParameter.as_str(),
                "INVALID_REQUEST_BODY",
            ),
            ServerError::PayloadTooLarge(_) => (
                StatusCode::PAYLOAD_TOO_LARGE,
                ErrorKind::InvalidParameter.as_str(),
                "INVALID_BODY_TOO_LARGE",
            ),
            ServerError::Timeout(_) => (
                StatusCode::GATEWAY_TIMEOUT,
                ErrorKind::Cancelled.as_str(),
                "REQUEST_TIMEOUT",
            ),
            ServerError::Config(_) => (
                StatusCode::INTERNAL_SERVER_ERROR,
                ErrorKind::Configuration.as_str(),
                "CONFIG_SERVER",
            ),
            ServerError::Io(_) => (
                StatusCode::INTERNAL_SERVER_ERROR,
                ErrorKind::Internal.as_str(),
                "IO_SERVER",
            ),
            ServerError::Internal(_) => (
                StatusCode::INTERNAL_SERVER_ERROR,
                ErrorKind::Internal.as_str(),
                "INTERNAL_SERVER",
            ),
        }
    }

    fn status_for_kind(kind: ErrorKind) -> StatusCode {
        match kind {
            ErrorKind::InvalidParameter | ErrorKind::TokenizationError => StatusCode::BAD_REQUEST,
            ErrorKind::Cancelled => StatusCode::GATEWAY_TIMEOUT,
            ErrorKind::DegenerateDistribution
            | ErrorKind::ExecutionError
            | ErrorKind::Configuration
            | ErrorKind::Internal => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Message without the context/suggestion trailer core errors carry
    fn public_message(&self) -> String {
        match self {
            ServerError::Core(core_err) => core_err.message().to_string(),
            other => other.to_string(),
        }
    }
}

impl IntoResponse for ServerError {
    fn into_response(self) -> Response {
        let (status, kind, code) = self.classify();

        if status.is_server_error() {
            error!(kind, code, error = %self, "Request failed");
        } else {
            warn!(kind, code, error = %self, "Request rejected");
        }

        let body = Json(json!({
            "error": {
                "kind": kind,
                "code": code,
                "message": self.public_message(),
                "status": status.as_u16(),
            }
        }));
        (status, body).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn invalid_temperature() -> CoreError {
        CoreError::invalid_parameter(
            "INVALID_TEMPERATURE",
            "temperature must be positive",
            "test",
            "",
            "temperature",
            "0",
            "> 0",
        )
    }

    #[test]
    fn test_core_kinds_map_to_status() {
        let cases = [
            (invalid_temperature(), StatusCode::BAD_REQUEST),
            (
                CoreError::tokenizer("TOKENIZER_EMPTY_ENCODING", "empty", "test", ""),
                StatusCode::BAD_REQUEST,
            ),
            (
                CoreError::degenerate("DEGENERATE_ALL_MASKED", "no mass", "test"),
                StatusCode::INTERNAL_SERVER_ERROR,
            ),
            (
                CoreError::execution("EXECUTION_FAILED", "boom", "test", ""),
                StatusCode::INTERNAL_SERVER_ERROR,
            ),
            (
                CoreError::Cancelled {
                    code: "GENERATION_CANCELLED",
                    message: "cancelled".to_string(),
                    tokens_generated: 2,
                },
                StatusCode::GATEWAY_TIMEOUT,
            ),
        ];

        for (err, expected) in cases {
            let (status, kind, code) = ServerError::from(err).classify();
            assert_eq!(status, expected, "{kind} {code}");
        }
    }

    #[tokio::test]
    async fn test_error_body_shape() {
        let response = ServerError::from(invalid_temperature()).into_response();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);

        let body = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        let json: serde_json::Value = serde_json::from_slice(&body).unwrap();
        assert_eq!(json["error"]["kind"], "invalid_parameter");
        assert_eq!(json["error"]["code"], "INVALID_TEMPERATURE");
        assert_eq!(json["error"]["message"], "temperature must be positive");
        assert_eq!(json["error"]["status"], 400);
    }

    #[test]
    fn test_timeout_is_gateway_timeout() {
        let (status, kind, _) = ServerError::Timeout(2.0).classify();
        assert_eq!(status, StatusCode::GATEWAY_TIMEOUT);
        assert_eq!(kind, "cancelled");
    }
}
