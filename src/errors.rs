use crate::services::{
    backend::BackendError, download::DownloadError, generation::GenerationError,
    image_generator::UpstreamError, retention::RetentionError,
};
use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde_json::json;
use std::fmt;

/// Error returned to HTTP clients as `{"error": message}` with `status`.
#[derive(Debug)]
pub struct AppError {
    pub status: StatusCode,
    pub message: String,
}

impl AppError {
    /// Create a new AppError with a specific status and message.
    pub fn new(status: StatusCode, msg: impl Into<String>) -> Self {
        Self {
            status,
            message: msg.into(),
        }
    }

    /// Shortcut for a 500 Internal Server Error
    pub fn internal(msg: impl Into<String>) -> Self {
        Self::new(StatusCode::INTERNAL_SERVER_ERROR, msg)
    }

    /// Shortcut for 400 Bad Request
    pub fn bad_request(msg: impl Into<String>) -> Self {
        Self::new(StatusCode::BAD_REQUEST, msg)
    }

    /// Shortcut for 404 Not Found
    pub fn not_found(msg: impl Into<String>) -> Self {
        Self::new(StatusCode::NOT_FOUND, msg)
    }

    /// Status copied from an upstream response; 502 when it is not a valid
    /// error status.
    fn upstream(status: u16, msg: impl Into<String>) -> Self {
        let status = StatusCode::from_u16(status)
            .ok()
            .filter(|s| s.is_client_error() || s.is_server_error())
            .unwrap_or(StatusCode::BAD_GATEWAY);
        Self::new(status, msg)
    }
}

impl fmt::Display for AppError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.message)
    }
}

impl std::error::Error for AppError {}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        if self.status.is_server_error() {
            tracing::error!("{} {}", self.status, self.message);
        }
        (self.status, Json(json!({ "error": self.message }))).into_response()
    }
}

impl From<anyhow::Error> for AppError {
    fn from(err: anyhow::Error) -> Self {
        AppError::internal(err.to_string())
    }
}

impl From<BackendError> for AppError {
    fn from(err: BackendError) -> Self {
        AppError::internal(err.to_string())
    }
}

impl From<RetentionError> for AppError {
    fn from(err: RetentionError) -> Self {
        AppError::internal(err.to_string())
    }
}

impl From<DownloadError> for AppError {
    fn from(err: DownloadError) -> Self {
        match err {
            DownloadError::Status { status } => AppError::upstream(status, err.to_string()),
            DownloadError::Http(_) => AppError::internal(err.to_string()),
        }
    }
}

impl From<GenerationError> for AppError {
    fn from(err: GenerationError) -> Self {
        match err {
            GenerationError::MissingPrompt | GenerationError::UnknownStyle(_) => {
                AppError::bad_request(err.to_string())
            }
            GenerationError::Upstream(UpstreamError::Api { status, .. }) => {
                AppError::upstream(status, err.to_string())
            }
            GenerationError::Download(inner) => inner.into(),
            GenerationError::MissingApiKey
            | GenerationError::Upstream(_)
            | GenerationError::Upload(_) => AppError::internal(err.to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn generation_errors_map_to_statuses() {
        let cases = [
            (GenerationError::MissingPrompt, StatusCode::BAD_REQUEST),
            (GenerationError::MissingApiKey, StatusCode::INTERNAL_SERVER_ERROR),
            (
                GenerationError::Upstream(UpstreamError::Api {
                    status: 429,
                    message: "slow down".into(),
                }),
                StatusCode::TOO_MANY_REQUESTS,
            ),
            (
                GenerationError::Download(DownloadError::Status { status: 403 }),
                StatusCode::FORBIDDEN,
            ),
            (GenerationError::Upstream(UpstreamError::Empty), StatusCode::INTERNAL_SERVER_ERROR),
        ];
        for (err, expected) in cases {
            assert_eq!(AppError::from(err).status, expected);
        }
    }

    #[test]
    fn upstream_success_status_becomes_bad_gateway() {
        assert_eq!(AppError::upstream(200, "odd").status, StatusCode::BAD_GATEWAY);
    }
}
