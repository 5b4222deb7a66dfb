use crate::error::{ServerError, ServerResult};
use crate::state::ServerState;
use axum::extract::State;
use axum::http::header::CONTENT_TYPE;
use axum::response::IntoResponse;
use axum::Json;
use serde_json::json;
use std::sync::Arc;
use std::time::SystemTime;

/// Global server start time for uptime calculation
static SERVER_START_TIME: once_cell::sync::Lazy<SystemTime> =
    once_cell::sync::Lazy::new(SystemTime::now);

/// Pins the start time; called once before the listener binds.
pub fn mark_started() {
    once_cell::sync::Lazy::force(&SERVER_START_TIME);
}

fn uptime_seconds() -> u64 {
    SERVER_START_TIME
        .elapsed()
        .map(|d| d.as_secs())
        .unwrap_or(0)
}

/// Liveness probe: `{"status":"ok"}` while the process is up
pub async fn health_check() -> impl IntoResponse {
    Json(json!({ "status": "ok" }))
}

/// Readiness probe: storage must be writable
pub async fn readiness_check(
    State(state): State<Arc<ServerState>>,
) -> ServerResult<impl IntoResponse> {
    let pipeline = state.pipeline.clone();
    tokio::task::spawn_blocking(move || pipeline.check_ready())
        .await?
        .map_err(|err| {
            tracing::warn!(error = %err, "readiness_check_failed");
            ServerError::Unavailable("storage is not writable".into())
        })?;

    Ok(Json(json!({
        "status": "ready",
        "service": "bgrelay-server",
        "timestamp": chrono::Utc::now().to_rfc3339(),
        "uptime_seconds": uptime_seconds(),
        "components": {
            "storage": "ready",
            "remover": state.pipeline.remover_name(),
        }
    })))
}

/// Prometheus text exposition
pub async fn metrics(State(state): State<Arc<ServerState>>) -> ServerResult<impl IntoResponse> {
    let handle = state.prometheus.as_ref().ok_or(ServerError::NotFound)?;
    Ok((
        [(CONTENT_TYPE, "text/plain; version=0.0.4")],
        handle.render(),
    ))
}
