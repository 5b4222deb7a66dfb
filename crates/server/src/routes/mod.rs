//! API route handlers
//!
//! - `health`: liveness, readiness, and metrics
//! - `remove`: single and batch background removal
//! - `download`: fetching a processed image by id

pub mod download;
pub mod health;
pub mod remove;

use crate::error::ServerError;
use axum::response::Html;

/// Upload page served at `GET /`. No authentication.
pub async fn index_page() -> Html<&'static str> {
    Html(include_str!("../../assets/index.html"))
}

/// 404 Not Found handler
pub async fn not_found() -> ServerError {
    ServerError::NotFound
}

/// 405 handler for known paths hit with the wrong method
pub async fn method_not_allowed() -> ServerError {
    ServerError::MethodNotAllowed
}
