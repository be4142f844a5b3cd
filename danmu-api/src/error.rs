//! HTTP error envelope.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use std::fmt;

/// Result type for HTTP handlers
pub type AppResult<T> = Result<T, AppError>;

/// Application error carried to the response envelope.
#[derive(Debug)]
pub struct AppError {
    pub status: StatusCode,
    pub message: String,
}

impl AppError {
    pub fn new(status: StatusCode, message: impl Into<String>) -> Self {
        Self {
            status,
            message: message.into(),
        }
    }

    pub fn bad_request(message: impl Into<String>) -> Self {
        Self::new(StatusCode::BAD_REQUEST, message)
    }

    pub fn unauthorized(message: impl Into<String>) -> Self {
        Self::new(StatusCode::UNAUTHORIZED, message)
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        Self::new(StatusCode::NOT_FOUND, message)
    }

    pub fn internal(message: impl Into<String>) -> Self {
        Self::new(StatusCode::INTERNAL_SERVER_ERROR, message)
    }
}

impl fmt::Display for AppError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.status, self.message)
    }
}

impl std::error::Error for AppError {}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let body = Json(json!({
            "errorCode": self.status.as_u16(),
            "success": false,
            "errorMessage": self.message,
        }));
        (self.status, body).into_response()
    }
}

impl From<danmu_core::Error> for AppError {
    fn from(err: danmu_core::Error) -> Self {
        use danmu_core::Error;
        match err {
            Error::NotFound(msg) => Self::not_found(msg),
            Error::InvalidInput(msg) => Self::bad_request(msg),
            Error::Upstream(msg) => {
                tracing::warn!("Upstream error: {}", msg);
                Self::internal("Upstream error")
            }
            other => {
                tracing::error!("Internal error: {}", other);
                Self::internal("Internal server error")
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_mapping() {
        let err: AppError = danmu_core::Error::NotFound("gone".into()).into();
        assert_eq!(err.status, StatusCode::NOT_FOUND);

        let err: AppError = danmu_core::Error::InvalidInput("bad".into()).into();
        assert_eq!(err.status, StatusCode::BAD_REQUEST);
    }
}
