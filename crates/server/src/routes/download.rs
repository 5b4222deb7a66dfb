use crate::error::ServerResult;
use crate::routes::remove::attachment;
use crate::state::ServerState;
use axum::extract::{Path, State};
use axum::http::header::{CONTENT_DISPOSITION, CONTENT_TYPE};
use axum::response::{IntoResponse, Response};
use bgrelay::download_name;
use std::sync::Arc;

fn mime_for(extension: &str) -> &'static str {
    match extension {
        "png" => "image/png",
        "jpg" | "jpeg" => "image/jpeg",
        "webp" => "image/webp",
        _ => "application/octet-stream",
    }
}

/// Fetch a processed image
///
/// GET /download/{id}
pub async fn download(
    State(state): State<Arc<ServerState>>,
    Path(id): Path<String>,
) -> ServerResult<Response> {
    let pipeline = state.pipeline.clone();
    let fetched = tokio::task::spawn_blocking(move || pipeline.fetch(&id)).await??;

    Ok((
        [
            (CONTENT_TYPE, mime_for(&fetched.extension).to_string()),
            (CONTENT_DISPOSITION, attachment(&download_name(&fetched.id))),
        ],
        fetched.bytes,
    )
        .into_response())
}
