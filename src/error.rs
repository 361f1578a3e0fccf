//! Error types for claude-proxy
//!
//! Errors raised before any response bytes are committed. They render as
//! canonical error JSON; once a stream has started the same conditions travel
//! as an `error` event instead.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use thiserror::Error;

use crate::canonical::{error_kind_for_status, AggregateError, ErrorDetail};
use crate::proxy::UpstreamError;
use crate::routing::{Provider, ResolveError};
use crate::translate::TranslationError;

/// Application-level errors
#[derive(Debug, Error)]
pub enum AppError {
    #[error("{0}")]
    UnknownProvider(#[from] ResolveError),

    #[error("{0}")]
    BadRequest(String),

    #[error("No credentials configured for {provider}. Set {hint}")]
    MissingCredential {
        provider: Provider,
        hint: &'static str,
    },

    #[error("{0}")]
    UpstreamTransport(String),

    #[error("{message}")]
    UpstreamStatus { status: u16, message: String },

    #[error("{0}")]
    UpstreamProtocol(String),

    #[error("Internal error: {0}")]
    Internal(#[from] anyhow::Error),
}

impl AppError {
    pub fn status_code(&self) -> StatusCode {
        match self {
            AppError::UnknownProvider(_) | AppError::BadRequest(_) => StatusCode::BAD_REQUEST,
            AppError::MissingCredential { provider, .. } if provider.is_passthrough() => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
            AppError::MissingCredential { .. } => StatusCode::UNAUTHORIZED,
            AppError::UpstreamTransport(_) | AppError::UpstreamProtocol(_) => {
                StatusCode::BAD_GATEWAY
            }
            AppError::UpstreamStatus { status, .. } => {
                StatusCode::from_u16(*status).unwrap_or(StatusCode::BAD_GATEWAY)
            }
            AppError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Canonical `error.type`
    pub fn kind(&self) -> &'static str {
        match self {
            AppError::UnknownProvider(_) | AppError::BadRequest(_) => "invalid_request_error",
            AppError::MissingCredential { provider, .. } if provider.is_passthrough() => {
                "api_error"
            }
            AppError::MissingCredential { .. } => "authentication_error",
            AppError::UpstreamStatus { status, .. } => error_kind_for_status(*status),
            AppError::UpstreamTransport(_)
            | AppError::UpstreamProtocol(_)
            | AppError::Internal(_) => "api_error",
        }
    }

    /// Short label for the rejection metric
    pub fn reason(&self) -> &'static str {
        match self {
            AppError::UnknownProvider(_) => "unknown_provider",
            AppError::BadRequest(_) => "bad_request",
            AppError::MissingCredential { .. } => "missing_credential",
            AppError::UpstreamTransport(_) => "upstream_transport",
            AppError::UpstreamStatus { .. } => "upstream_status",
            AppError::UpstreamProtocol(_) => "upstream_protocol",
            AppError::Internal(_) => "internal",
        }
    }
}

impl From<UpstreamError> for AppError {
    fn from(error: UpstreamError) -> Self {
        match error {
            UpstreamError::Status { status, message } => AppError::UpstreamStatus { status, message },
            other => AppError::UpstreamTransport(other.to_string()),
        }
    }
}

/// An `error` event seen while aggregating a non-streaming response
impl From<ErrorDetail> for AppError {
    fn from(detail: ErrorDetail) -> Self {
        match detail.status {
            Some(status) => AppError::UpstreamStatus {
                status,
                message: detail.message,
            },
            None => AppError::UpstreamProtocol(detail.message),
        }
    }
}

impl From<AggregateError> for AppError {
    fn from(error: AggregateError) -> Self {
        match error {
            AggregateError::Upstream(detail) => detail.into(),
            other => AppError::UpstreamProtocol(other.to_string()),
        }
    }
}

/// Failures while building the upstream request
impl From<TranslationError> for AppError {
    fn from(error: TranslationError) -> Self {
        match error {
            TranslationError::InvalidRequest(message) => AppError::BadRequest(message),
            other => AppError::Internal(other.into()),
        }
    }
}

/// Canonical error response body
#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    #[serde(rename = "type")]
    pub kind: &'static str,
    pub error: ErrorBody,
}

#[derive(Debug, Serialize)]
pub struct ErrorBody {
    #[serde(rename = "type")]
    pub kind: &'static str,
    pub message: String,
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        let message = match &self {
            // Bootstrap details stay in the logs
            AppError::Internal(error) => {
                tracing::error!(error = %error, "Internal error");
                "Internal server error".to_string()
            }
            other => other.to_string(),
        };

        let body = ErrorResponse {
            kind: "error",
            error: ErrorBody {
                kind: self.kind(),
                message,
            },
        };

        (status, Json(body)).into_response()
    }
}

/// Result type alias for convenience
pub type AppResult<T> = Result<T, AppError>;
