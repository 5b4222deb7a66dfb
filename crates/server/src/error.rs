use axum::http::header::RETRY_AFTER;
use axum::http::{HeaderValue, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::Json;
use bgrelay::{ErrorKind, PipelineError};
use serde::{Deserialize, Serialize};

pub type ServerResult<T> = Result<T, ServerError>;

/// Every failure a handler can return. This is the only place errors become
/// HTTP statuses.
#[derive(Debug, thiserror::Error)]
pub enum ServerError {
    #[error(transparent)]
    Pipeline(#[from] PipelineError),

    #[error("bad request: {0}")]
    BadRequest(String),

    #[error("payload too large: max {0}MB allowed")]
    PayloadTooLarge(usize),

    #[error("method not allowed")]
    MethodNotAllowed,

    #[error("not found")]
    NotFound,

    #[error("service unavailable: {0}")]
    Unavailable(String),

    #[error("internal server error: {0}")]
    Internal(String),
}

/// JSON body of every error response.
#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub error: String,
    pub code: String,
}

const GENERIC_INTERNAL: &str = "internal server error";

impl ServerError {
    /// Get HTTP status code for this error
    pub fn status_code(&self) -> StatusCode {
        match self {
            ServerError::Pipeline(err) => match err.kind() {
                ErrorKind::Input => StatusCode::BAD_REQUEST,
                ErrorKind::PayloadTooLarge => StatusCode::PAYLOAD_TOO_LARGE,
                ErrorKind::AuthRequired => StatusCode::UNAUTHORIZED,
                ErrorKind::AuthInvalid => StatusCode::FORBIDDEN,
                ErrorKind::RateLimited => StatusCode::TOO_MANY_REQUESTS,
                ErrorKind::NotFound => StatusCode::NOT_FOUND,
                ErrorKind::Processing | ErrorKind::Internal => StatusCode::INTERNAL_SERVER_ERROR,
            },
            ServerError::BadRequest(_) => StatusCode::BAD_REQUEST,
            ServerError::PayloadTooLarge(_) => StatusCode::PAYLOAD_TOO_LARGE,
            ServerError::MethodNotAllowed => StatusCode::METHOD_NOT_ALLOWED,
            ServerError::NotFound => StatusCode::NOT_FOUND,
            ServerError::Unavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
            ServerError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Get error code string, e.g. `UNSUPPORTED_EXTENSION`
    pub fn error_code(&self) -> String {
        match self {
            ServerError::Pipeline(err) => err.reason_code().to_ascii_uppercase(),
            ServerError::BadRequest(_) => "BAD_REQUEST".into(),
            ServerError::PayloadTooLarge(_) => "PAYLOAD_TOO_LARGE".into(),
            ServerError::MethodNotAllowed => "METHOD_NOT_ALLOWED".into(),
            ServerError::NotFound => "NOT_FOUND".into(),
            ServerError::Unavailable(_) => "SERVICE_UNAVAILABLE".into(),
            ServerError::Internal(_) => "INTERNAL_ERROR".into(),
        }
    }

    /// Message shown to the caller. Internal failures stay in the logs.
    fn public_message(&self) -> String {
        match self {
            ServerError::Pipeline(err) if err.kind() == ErrorKind::Internal => {
                GENERIC_INTERNAL.to_string()
            }
            ServerError::Internal(_) => GENERIC_INTERNAL.to_string(),
            other => other.to_string(),
        }
    }
}

impl IntoResponse for ServerError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        if status.is_server_error() {
            tracing::error!(status = %status, error = %self, "request_failed");
        }

        let retry_after = match &self {
            ServerError::Pipeline(err) => err.retry_after_secs(),
            _ => None,
        };
        let body = Json(ErrorResponse {
            error: self.public_message(),
            code: self.error_code(),
        });

        let mut response = (status, body).into_response();
        if let Some(secs) = retry_after {
            response
                .headers_mut()
                .insert(RETRY_AFTER, HeaderValue::from(secs));
        }
        response
    }
}

impl From<tokio::task::JoinError> for ServerError {
    fn from(err: tokio::task::JoinError) -> Self {
        ServerError::Internal(format!("worker task failed: {err}"))
    }
}
