//! HTTP errors for the upgrade endpoint
//!
//! Everything that can go wrong before the socket is upgraded ends up here
//! and is answered with a JSON body.

use crate::connection::ResumeError;
use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use chat_common::AppError;
use serde::Serialize;
use thiserror::Error;
use tracing::error;

/// API error type for consistent error responses
#[derive(Debug, Error)]
pub enum ApiError {
    #[error("{0}")]
    App(#[from] AppError),

    #[error("{0}")]
    Resume(#[from] ResumeError),

    #[error("Missing authorization header")]
    MissingAuth,

    #[error("Invalid or expired access token")]
    InvalidToken,

    #[error("Invalid {0} header: {1}")]
    InvalidHeader(&'static str, String),
}

impl ApiError {
    /// Get HTTP status code for this error
    #[must_use]
    pub fn status_code(&self) -> StatusCode {
        match self {
            Self::App(e) => StatusCode::from_u16(e.status_code())
                .unwrap_or(StatusCode::INTERNAL_SERVER_ERROR),
            Self::Resume(_) | Self::InvalidHeader(..) => StatusCode::BAD_REQUEST,
            Self::MissingAuth | Self::InvalidToken => StatusCode::UNAUTHORIZED,
        }
    }

    /// Get error code for API responses
    #[must_use]
    pub fn error_code(&self) -> &'static str {
        match self {
            Self::App(e) => e.error_code(),
            Self::Resume(e) => e.code(),
            Self::MissingAuth => "MISSING_AUTHORIZATION",
            Self::InvalidToken => "INVALID_TOKEN",
            Self::InvalidHeader(..) => "INVALID_HEADER",
        }
    }

    pub fn invalid_header(name: &'static str, reason: impl Into<String>) -> Self {
        Self::InvalidHeader(name, reason.into())
    }
}

/// Error response body
#[derive(Debug, Serialize)]
pub struct ErrorBody {
    pub error: ErrorDetail,
}

#[derive(Debug, Serialize)]
pub struct ErrorDetail {
    pub code: String,
    pub message: String,
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status_code();

        if status.is_server_error() {
            error!(error = ?self, "Server error occurred");
        }

        let body = ErrorBody {
            error: ErrorDetail {
                code: self.error_code().to_string(),
                message: self.to_string(),
            },
        };

        (status, Json(body)).into_response()
    }
}
