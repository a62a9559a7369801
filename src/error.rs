use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
};

use crate::api::response;

#[derive(Debug, thiserror::Error)]
pub enum AppError {
    #[error("Missing required parameter: {0}")]
    MissingParam(String),

    #[error("{0}")]
    InvalidParam(String),

    #[error("Unknown endpoint: {0}")]
    UnknownEndpoint(String),

    #[error("Resource not found: {0}")]
    NotFound(String),

    #[error("Method not allowed")]
    MethodNotAllowed,

    #[error("Unauthorized")]
    Unauthorized,

    #[error("Endpoint already exists: {0}")]
    Conflict(String),

    #[error("Invalid endpoint definition: {0}")]
    InvalidDefinition(String),

    #[error("Failed to fetch data: {0}")]
    FetchError(String),

    #[error("Upstream returned HTTP {status} for {url}")]
    Upstream { status: u16, url: String },

    #[error("Blocked by bot protection at {0}")]
    Blocked(String),

    #[error("Browser error: {0}")]
    BrowserError(String),

    #[error("Error parsing content: {0}")]
    ParseError(String),

    #[error("Request timed out")]
    Timeout,

    #[error("Failed after {attempts} attempts, please try again later")]
    RetriesExhausted {
        attempts: u32,
        #[source]
        last: Box<AppError>,
    },

    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("Storage error: {0}")]
    Io(#[from] std::io::Error),
}

impl AppError {
    /// Whether another attempt could plausibly succeed.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            AppError::FetchError(_)
                | AppError::Upstream { .. }
                | AppError::Blocked(_)
                | AppError::BrowserError(_)
                | AppError::ParseError(_)
                | AppError::Timeout
        )
    }

    pub fn status(&self) -> StatusCode {
        match self {
            AppError::MissingParam(_)
            | AppError::InvalidParam(_)
            | AppError::InvalidDefinition(_) => StatusCode::BAD_REQUEST,
            AppError::Unauthorized => StatusCode::UNAUTHORIZED,
            AppError::UnknownEndpoint(_) | AppError::NotFound(_) => StatusCode::NOT_FOUND,
            AppError::MethodNotAllowed => StatusCode::METHOD_NOT_ALLOWED,
            AppError::Conflict(_) => StatusCode::CONFLICT,
            AppError::ParseError(_) => StatusCode::UNPROCESSABLE_ENTITY,
            AppError::FetchError(_) | AppError::Upstream { .. } | AppError::BrowserError(_) => {
                StatusCode::BAD_GATEWAY
            }
            AppError::Blocked(_) => StatusCode::SERVICE_UNAVAILABLE,
            AppError::Timeout => StatusCode::GATEWAY_TIMEOUT,
            AppError::RetriesExhausted { .. } | AppError::ConfigError(_) | AppError::Io(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status.is_server_error() {
            tracing::error!(error = %self, status = status.as_u16(), "request failed");
        } else {
            tracing::debug!(error = %self, status = status.as_u16(), "request rejected");
        }
        response::error(status, self.to_string()).into_response()
    }
}

impl From<reqwest::Error> for AppError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            AppError::Timeout
        } else {
            AppError::FetchError(err.to_string())
        }
    }
}

pub type Result<T> = std::result::Result<T, AppError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn input_errors_are_not_retried() {
        assert!(!AppError::MissingParam("url".into()).is_retryable());
        assert!(!AppError::InvalidParam("bad".into()).is_retryable());
        assert!(!AppError::NotFound("gone".into()).is_retryable());
    }

    #[test]
    fn transient_errors_are_retried() {
        assert!(AppError::Timeout.is_retryable());
        assert!(AppError::Blocked("x".into()).is_retryable());
        assert!(
            AppError::Upstream {
                status: 503,
                url: "x".into()
            }
            .is_retryable()
        );
        assert!(AppError::ParseError("no button".into()).is_retryable());
    }

    #[test]
    fn exhausted_maps_to_500_with_fallback_message() {
        let err = AppError::RetriesExhausted {
            attempts: 3,
            last: Box::new(AppError::Timeout),
        };
        assert_eq!(err.status(), StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(err.to_string(), "Failed after 3 attempts, please try again later");
    }
}
