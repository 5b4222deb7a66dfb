use crate::error::ServerError;
use crate::metrics::record_http_response;
use crate::state::ServerState;
use axum::extract::{ConnectInfo, Query, Request, State};
use axum::http::header::{
    AUTHORIZATION, CACHE_CONTROL, CONTENT_SECURITY_POLICY, PRAGMA, STRICT_TRANSPORT_SECURITY,
    X_CONTENT_TYPE_OPTIONS, X_FRAME_OPTIONS,
};
use axum::http::{HeaderName, HeaderValue};
use axum::middleware::Next;
use axum::response::Response;
use bgrelay::{CallerContext, RateClass};
use serde::Deserialize;
use std::net::SocketAddr;
use std::sync::Arc;

pub const X_API_KEY: HeaderName = HeaderName::from_static("x-api-key");
pub const X_REQUEST_ID: HeaderName = HeaderName::from_static("x-request-id");

/// Id of the current request, available to handlers as an extension.
#[derive(Debug, Clone)]
pub struct RequestId(pub String);

#[derive(Deserialize)]
struct ApiKeyQuery {
    api_key: Option<String>,
}

/// API key from `X-API-Key`, `Authorization: Bearer`, or the `api_key` query
/// parameter, in that order.
fn extract_api_key(request: &Request) -> Option<String> {
    // A header that isn't valid UTF-8 still counts as a presented key.
    let from_header = request
        .headers()
        .get(X_API_KEY)
        .or_else(|| request.headers().get(AUTHORIZATION))
        .map(|v| String::from_utf8_lossy(v.as_bytes()).into_owned())
        .map(|s| {
            // Handle "Bearer <token>" format
            s.strip_prefix("Bearer ").map(str::to_string).unwrap_or(s)
        });
    from_header.or_else(|| {
        Query::<ApiKeyQuery>::try_from_uri(request.uri())
            .ok()
            .and_then(|Query(q)| q.api_key)
    })
}

/// Runs the pipeline's gate chain (API key, then rate limit) for one route
/// class. Registered with `route_layer`, so it runs before any body
/// extractor touches the upload.
pub async fn gate(
    State((state, class)): State<(Arc<ServerState>, RateClass)>,
    request: Request,
    next: Next,
) -> Result<Response, ServerError> {
    let ctx = CallerContext {
        api_key: extract_api_key(&request),
        remote_addr: request
            .extensions()
            .get::<ConnectInfo<SocketAddr>>()
            .map(|ConnectInfo(addr)| *addr),
        class,
    };

    state.pipeline.admit(&ctx)?;
    Ok(next.run(request).await)
}

/// Request ID injection middleware
///
/// Uses the caller's `X-Request-ID` when sent, otherwise a fresh UUID. A
/// handler that already set the header (the single-image endpoint sets the
/// artifact id) keeps its value.
pub async fn request_id(mut request: Request, next: Next) -> Response {
    let request_id = request
        .headers()
        .get(X_REQUEST_ID)
        .and_then(|v| v.to_str().ok())
        .map(|s| s.to_string())
        .unwrap_or_else(|| uuid::Uuid::new_v4().to_string());

    request
        .extensions_mut()
        .insert(RequestId(request_id.clone()));

    let mut response = next.run(request).await;

    if !response.headers().contains_key(X_REQUEST_ID) {
        if let Ok(value) = HeaderValue::from_str(&request_id) {
            response.headers_mut().insert(X_REQUEST_ID, value);
        }
    }

    response
}

/// Logging middleware
pub async fn log_requests(request: Request, next: Next) -> Response {
    let method = request.method().clone();
    let path = request.uri().path().to_string();
    let start = std::time::Instant::now();

    let request_id = request
        .extensions()
        .get::<RequestId>()
        .map(|id| id.0.clone())
        .unwrap_or_default();

    let response = next.run(request).await;
    let duration = start.elapsed();
    let status = response.status();
    record_http_response(status.as_u16());

    // Query strings may carry `api_key`, so only the path is logged.
    tracing::info!(
        method = %method,
        path = %path,
        status = status.as_u16(),
        duration_ms = duration.as_millis() as u64,
        request_id = %request_id,
        "request_completed"
    );

    response
}

const CONTENT_SECURITY_POLICY_VALUE: &str = "default-src 'self'; img-src 'self' data: blob:; \
     style-src 'self' 'unsafe-inline'; script-src 'self' 'unsafe-inline'; \
     frame-ancestors 'none'";

/// Security headers on every response, errors included.
pub async fn security_headers(request: Request, next: Next) -> Response {
    let mut response = next.run(request).await;
    let headers = response.headers_mut();
    let fixed: [(HeaderName, &'static str); 6] = [
        (X_CONTENT_TYPE_OPTIONS, "nosniff"),
        (X_FRAME_OPTIONS, "DENY"),
        (
            STRICT_TRANSPORT_SECURITY,
            "max-age=31536000; includeSubDomains",
        ),
        (CONTENT_SECURITY_POLICY, CONTENT_SECURITY_POLICY_VALUE),
        (CACHE_CONTROL, "no-store, no-cache, must-revalidate, max-age=0"),
        (PRAGMA, "no-cache"),
    ];
    for (name, value) in fixed {
        headers.insert(name, HeaderValue::from_static(value));
    }
    response
}
