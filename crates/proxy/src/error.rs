//! Error responses for the two HTTP surfaces.
//!
//! [`ApiError`] renders the OpenAI `{error:{message,type,code}}` shape used by
//! the chat and model routes. [`DeviceError`] renders the
//! `{success:false, message}` shape used by the device flow routes.

use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use ghgate_types::GateError;
use serde_json::json;

/// Wrapper around [`GateError`] for OpenAI-compatible routes.
#[derive(Debug)]
pub struct ApiError(pub GateError);

impl ApiError {
    /// Returns `(status, error_type, error_code)` for the wrapped error.
    fn classify(&self) -> (StatusCode, &'static str, &'static str) {
        match &self.0 {
            GateError::Auth(_) | GateError::Denied { .. } => (
                StatusCode::UNAUTHORIZED,
                "authentication_error",
                "invalid_api_key",
            ),
            GateError::NotFound(_) => (
                StatusCode::UNAUTHORIZED,
                "authentication_error",
                "credential_not_found",
            ),
            GateError::BadRequest(_) | GateError::Serialization(_) => (
                StatusCode::BAD_REQUEST,
                "invalid_request_error",
                "invalid_request",
            ),
            GateError::Upstream { status, .. } => classify_upstream(*status),
            GateError::Http(_) => (StatusCode::BAD_GATEWAY, "server_error", "upstream_error"),
            GateError::Storage(_) | GateError::Config(_) | GateError::Internal(_) => (
                StatusCode::INTERNAL_SERVER_ERROR,
                "server_error",
                "internal_error",
            ),
        }
    }
}

fn classify_upstream(status: u16) -> (StatusCode, &'static str, &'static str) {
    match status {
        429 => (
            StatusCode::TOO_MANY_REQUESTS,
            "rate_limit_error",
            "rate_limit_exceeded",
        ),
        401 => (
            StatusCode::UNAUTHORIZED,
            "authentication_error",
            "invalid_api_key",
        ),
        403 => (
            StatusCode::FORBIDDEN,
            "permission_error",
            "insufficient_quota",
        ),
        _ => (StatusCode::BAD_GATEWAY, "server_error", "upstream_error"),
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, error_type, error_code) = self.classify();
        if status.is_server_error() {
            tracing::error!(error = %self.0, "request failed");
        }
        (
            status,
            Json(json!({
                "error": {
                    "message": self.0.to_string(),
                    "type": error_type,
                    "code": error_code,
                }
            })),
        )
            .into_response()
    }
}

impl From<GateError> for ApiError {
    fn from(e: GateError) -> Self {
        Self(e)
    }
}

/// Wrapper around [`GateError`] for the device flow routes.
#[derive(Debug)]
pub struct DeviceError(pub GateError);

impl DeviceError {
    fn status(&self) -> StatusCode {
        match &self.0 {
            GateError::NotFound(_) => StatusCode::NOT_FOUND,
            GateError::BadRequest(_) | GateError::Denied { .. } => StatusCode::BAD_REQUEST,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for DeviceError {
    fn into_response(self) -> Response {
        let status = self.status();
        let body = match &self.0 {
            GateError::Denied { code, description } => json!({
                "success": false,
                "status": code,
                "message": description.clone().unwrap_or_else(|| self.0.to_string()),
            }),
            other => json!({
                "success": false,
                "message": other.to_string(),
            }),
        };
        if status.is_server_error() {
            tracing::error!(error = %self.0, "device flow request failed");
        }
        (status, Json(body)).into_response()
    }
}

impl From<GateError> for DeviceError {
    fn from(e: GateError) -> Self {
        Self(e)
    }
}
