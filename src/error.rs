//! Error types for the Ferry server

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use thiserror::Error;

use crate::platform::ClientError;

/// Application-wide result type
pub type Result<T> = std::result::Result<T, GatewayError>;

/// Gateway error taxonomy
#[derive(Error, Debug)]
pub enum GatewayError {
    /// Transport to the platform is unreachable
    #[error("Connection error: {0}")]
    Connection(String),

    /// Handshake operation invoked out of phase
    #[error("Invalid state: {0}")]
    InvalidState(String),

    /// Wrong login code or second factor
    #[error("Credential rejected: {0}")]
    Credential(String),

    /// Transfer attempted before authorization
    #[error("Platform client not authorized. Visit /auth to authorize.")]
    NotReady,

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Bad request: {0}")]
    BadRequest(String),

    /// Failure inside the transfer pipeline
    #[error("Transfer failed: {0}")]
    Transfer(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl GatewayError {
    pub fn status_code(&self) -> StatusCode {
        match self {
            Self::Connection(_) => StatusCode::SERVICE_UNAVAILABLE,
            Self::InvalidState(_) => StatusCode::BAD_REQUEST,
            Self::Credential(_) => StatusCode::UNAUTHORIZED,
            Self::NotReady => StatusCode::SERVICE_UNAVAILABLE,
            Self::NotFound(_) => StatusCode::NOT_FOUND,
            Self::BadRequest(_) => StatusCode::BAD_REQUEST,
            Self::Transfer(_) => StatusCode::INTERNAL_SERVER_ERROR,
            Self::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    fn kind(&self) -> &'static str {
        match self {
            Self::Connection(_) => "connection_error",
            Self::InvalidState(_) => "invalid_state",
            Self::Credential(_) => "credential_error",
            Self::NotReady => "not_ready",
            Self::NotFound(_) => "not_found",
            Self::BadRequest(_) => "bad_request",
            Self::Transfer(_) => "transfer_error",
            Self::Internal(_) => "internal_error",
        }
    }
}

/// Client failures outside the pipeline: transport problems become
/// connection errors, lookups become not-found, everything else is internal.
impl From<ClientError> for GatewayError {
    fn from(err: ClientError) -> Self {
        match err {
            ClientError::Transport(msg) => GatewayError::Connection(msg),
            ClientError::Unauthorized => GatewayError::NotReady,
            ClientError::NotFound(what) => GatewayError::NotFound(what),
            ClientError::InvalidCode | ClientError::CodeExpired | ClientError::InvalidPassword => {
                GatewayError::Credential(err.to_string())
            }
            ClientError::Rejected(_) | ClientError::Io(_) => GatewayError::Internal(err.to_string()),
        }
    }
}

/// Error response body
#[derive(Serialize)]
struct ErrorResponse {
    error: &'static str,
    message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    details: Option<String>,
}

impl IntoResponse for GatewayError {
    fn into_response(self) -> Response {
        let status = self.status_code();

        if status.is_server_error() {
            tracing::error!(error = %self, "Request failed");
        } else {
            tracing::debug!(error = %self, "Request rejected");
        }

        let message = match &self {
            Self::Internal(_) => "An internal error occurred".to_string(),
            other => other.to_string(),
        };

        let body = Json(ErrorResponse {
            error: self.kind(),
            message,
            details: if cfg!(debug_assertions) {
                Some(self.to_string())
            } else {
                None
            },
        });

        (status, body).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_codes() {
        assert_eq!(GatewayError::NotReady.status_code(), StatusCode::SERVICE_UNAVAILABLE);
        assert_eq!(
            GatewayError::InvalidState("x".into()).status_code(),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            GatewayError::NotFound("x".into()).status_code(),
            StatusCode::NOT_FOUND
        );
        assert_eq!(
            GatewayError::Transfer("x".into()).status_code(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
        assert_eq!(
            GatewayError::Credential("x".into()).status_code(),
            StatusCode::UNAUTHORIZED
        );
    }

    #[test]
    fn test_client_error_mapping() {
        assert!(matches!(
            GatewayError::from(ClientError::Transport("down".into())),
            GatewayError::Connection(_)
        ));
        assert!(matches!(
            GatewayError::from(ClientError::Unauthorized),
            GatewayError::NotReady
        ));
        assert!(matches!(
            GatewayError::from(ClientError::InvalidCode),
            GatewayError::Credential(_)
        ));
    }

    #[test]
    fn test_response_status() {
        let response = GatewayError::NotFound("message 7".into()).into_response();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }
}
