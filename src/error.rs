//! Unified application error model and mapping helpers.
//! This module provides a common error enum used across the HTTP surface and
//! the collaborator clients, along with mappers to HTTP responses.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::{Deserialize, Serialize};
use std::fmt::{Display, Formatter};

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum AppError {
    /// Collaborator unreachable or timed out.
    Network { code: String, message: String },
    /// Bad credentials or an expired session.
    Unauthorized { code: String, message: String },
    /// Local input rejected before any network call.
    Validation { code: String, message: String },
    NotFound { code: String, message: String },
    /// Anything else; logged with full detail, shown generically.
    Unknown { code: String, message: String },
}

impl AppError {
    pub fn code_str(&self) -> &str {
        match self {
            AppError::Network { code, .. }
            | AppError::Unauthorized { code, .. }
            | AppError::Validation { code, .. }
            | AppError::NotFound { code, .. }
            | AppError::Unknown { code, .. } => code.as_str(),
        }
    }

    pub fn message(&self) -> &str {
        match self {
            AppError::Network { message, .. }
            | AppError::Unauthorized { message, .. }
            | AppError::Validation { message, .. }
            | AppError::NotFound { message, .. }
            | AppError::Unknown { message, .. } => message.as_str(),
        }
    }

    pub fn network<C: Into<String>, M: Into<String>>(code: C, msg: M) -> Self {
        AppError::Network { code: code.into(), message: msg.into() }
    }
    pub fn unauthorized<C: Into<String>, M: Into<String>>(code: C, msg: M) -> Self {
        AppError::Unauthorized { code: code.into(), message: msg.into() }
    }
    pub fn validation<C: Into<String>, M: Into<String>>(code: C, msg: M) -> Self {
        AppError::Validation { code: code.into(), message: msg.into() }
    }
    pub fn not_found<C: Into<String>, M: Into<String>>(code: C, msg: M) -> Self {
        AppError::NotFound { code: code.into(), message: msg.into() }
    }
    pub fn unknown<C: Into<String>, M: Into<String>>(code: C, msg: M) -> Self {
        AppError::Unknown { code: code.into(), message: msg.into() }
    }

    /// Map to HTTP status code.
    pub fn http_status(&self) -> StatusCode {
        match self {
            AppError::Network { .. } => StatusCode::SERVICE_UNAVAILABLE,
            AppError::Unauthorized { .. } => StatusCode::UNAUTHORIZED,
            AppError::Validation { .. } => StatusCode::BAD_REQUEST,
            AppError::NotFound { .. } => StatusCode::NOT_FOUND,
            AppError::Unknown { .. } => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Classify a collaborator response status. Bodies are not trusted to
    /// carry a stable shape, so only the status line is consulted.
    pub fn from_status(status: StatusCode, context: &str) -> Self {
        match status {
            StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => {
                AppError::unauthorized("unauthorized", format!("{context}: HTTP {status}"))
            }
            StatusCode::NOT_FOUND => {
                AppError::not_found("not_found", format!("{context}: HTTP {status}"))
            }
            s if s.is_server_error() => {
                AppError::network("backend_unavailable", format!("{context}: HTTP {s}"))
            }
            s => AppError::unknown("backend_error", format!("{context}: HTTP {s}")),
        }
    }
}

impl Display for AppError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.code_str(), self.message())
    }
}

impl std::error::Error for AppError {}

pub type AppResult<T> = Result<T, AppError>;

impl From<anyhow::Error> for AppError {
    fn from(err: anyhow::Error) -> Self {
        AppError::Unknown { code: "internal_error".into(), message: err.to_string() }
    }
}

impl From<reqwest::Error> for AppError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() || err.is_connect() {
            return AppError::network("backend_unreachable", err.to_string());
        }
        match err.status() {
            Some(s) => AppError::from_status(s, "collaborator request failed"),
            None => AppError::unknown("request_error", err.to_string()),
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.http_status();
        let body = Json(serde_json::json!({
            "status": "error",
            "code": self.code_str(),
            "message": self.message(),
        }));
        (status, body).into_response()
    }
}
