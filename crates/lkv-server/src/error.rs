use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde_json::json;
use thiserror::Error;

use lkv_gateway::{ErrorKind, GatewayError};

#[derive(Debug, Error)]
pub enum ServerError {
    /// Missing or malformed request input.
    #[error("{0}")]
    BadRequest(String),

    #[error("{0}")]
    NotFound(String),

    /// A gateway call failed. `action` reads like "get value".
    #[error("Failed to {action}: {source}")]
    Gateway {
        action: &'static str,
        #[source]
        source: GatewayError,
    },

    #[error("configuration error: {0}")]
    Config(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("internal error: {0}")]
    Internal(String),
}

impl ServerError {
    pub fn gateway(action: &'static str) -> impl FnOnce(GatewayError) -> Self {
        move |source| Self::Gateway { action, source }
    }

    pub fn status(&self) -> StatusCode {
        match self {
            Self::BadRequest(_) => StatusCode::BAD_REQUEST,
            Self::NotFound(_) => StatusCode::NOT_FOUND,
            Self::Gateway { source, .. } if source.kind() == ErrorKind::InvalidRequest => {
                StatusCode::BAD_REQUEST
            }
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for ServerError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status.is_server_error() {
            match &self {
                Self::Gateway { source, .. } => {
                    tracing::error!(kind = %source.kind(), error = %self, "request failed");
                }
                _ => tracing::error!(error = %self, "request failed"),
            }
        }
        let message = match &self {
            // Only gateway failures carry a caller-facing cause.
            Self::Config(_) | Self::Io(_) | Self::Internal(_) => "Internal server error".to_string(),
            other => other.to_string(),
        };
        (status, Json(json!({ "error": message }))).into_response()
    }
}

pub type ServerResult<T> = Result<T, ServerError>;
