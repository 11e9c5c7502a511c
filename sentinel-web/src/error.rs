//! Request-level error taxonomy and its HTTP mapping

use crate::access::Denial;
use crate::actions::exec::ExecError;
use crate::store::{Resource, StoreError};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde_json::json;
use tracing::{debug, error};

#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    #[error("{0}")]
    Unauthorized(String),
    #[error("{0}")]
    Forbidden(String),
    #[error("{0}")]
    Validation(String),
    #[error("{0}")]
    NotFound(String),
    /// Subprocess timeout or spawn failure
    #[error("{0}")]
    ExternalCommand(String),
    /// Top-level JSON that could not be parsed or produced
    #[error("{0}")]
    Serialization(String),
    #[error("{0}")]
    Io(#[from] std::io::Error),
}

impl ApiError {
    pub fn status(&self) -> StatusCode {
        match self {
            Self::Unauthorized(_) => StatusCode::UNAUTHORIZED,
            Self::Forbidden(_) => StatusCode::FORBIDDEN,
            Self::Validation(_) => StatusCode::BAD_REQUEST,
            Self::NotFound(_) => StatusCode::NOT_FOUND,
            Self::ExternalCommand(_) | Self::Serialization(_) | Self::Io(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    pub fn not_found(msg: impl Into<String>) -> Self {
        Self::NotFound(msg.into())
    }

    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }

    fn log(&self) {
        match self {
            Self::ExternalCommand(msg) => error!(msg = %msg, "external command failed"),
            Self::Serialization(msg) => error!(msg = %msg, "serialization error"),
            Self::Io(e) => error!(error = %e, "io error"),
            Self::Validation(msg) => debug!(msg = %msg, "validation failed"),
            Self::Unauthorized(_) | Self::Forbidden(_) | Self::NotFound(_) => {}
        }
    }

    /// Renders as `{"ok": false, "error": ...}`, the shape used by action routes.
    pub fn into_action_response(self) -> Response {
        self.log();
        let body = json!({ "ok": false, "error": self.to_string() });
        (self.status(), Json(body)).into_response()
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        self.log();
        let body = json!({ "error": self.to_string() });
        (self.status(), Json(body)).into_response()
    }
}

impl From<Denial> for ApiError {
    fn from(denial: Denial) -> Self {
        match denial {
            Denial::BadToken => Self::Unauthorized(denial.message().into()),
            Denial::NonLocal => Self::Forbidden(denial.message().into()),
        }
    }
}

impl From<StoreError> for ApiError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::NotFound(Resource::Status) => Self::NotFound("no status data yet".into()),
            StoreError::NotFound(Resource::Config) => Self::NotFound("config file not found".into()),
            StoreError::NotFound(resource) => Self::NotFound(format!("{resource} not found")),
            StoreError::Io(e) => Self::Io(e),
            StoreError::Json(e) => Self::Serialization(e.to_string()),
        }
    }
}

impl From<ExecError> for ApiError {
    fn from(err: ExecError) -> Self {
        Self::ExternalCommand(err.to_string())
    }
}

/// Wrapper so action handlers render failures with the `ok: false` envelope.
#[derive(Debug)]
pub struct ActionError(pub ApiError);

impl IntoResponse for ActionError {
    fn into_response(self) -> Response {
        self.0.into_action_response()
    }
}
