use crate::error::{ServerError, ServerResult};
use crate::middleware::X_REQUEST_ID;
use crate::state::ServerState;
use axum::extract::multipart::{Field, MultipartError};
use axum::extract::{Multipart, State};
use axum::http::header::{CONTENT_DISPOSITION, CONTENT_TYPE};
use axum::http::{HeaderName, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::Json;
use bgrelay::{BatchReport, PipelineError, ProcessedImage, Upload};
use std::sync::Arc;

pub const X_SOURCE_FORMAT: HeaderName = HeaderName::from_static("x-source-format");

/// Attachment disposition for a processed image.
pub(crate) fn attachment(name: &str) -> String {
    format!("attachment; filename=\"{name}\"")
}

fn multipart_error(state: &ServerState, err: MultipartError) -> ServerError {
    if err.status() == StatusCode::PAYLOAD_TOO_LARGE {
        ServerError::PayloadTooLarge(state.config.max_body_size_mb)
    } else {
        ServerError::BadRequest(err.body_text())
    }
}

async fn read_upload(state: &ServerState, field: Field<'_>) -> ServerResult<Upload> {
    let filename = field.file_name().unwrap_or_default().to_string();
    let bytes = field
        .bytes()
        .await
        .map_err(|err| multipart_error(state, err))?;
    Ok(Upload::new(filename, bytes))
}

/// Process a single image
///
/// POST /remove-background, multipart field `file`
pub async fn remove_background(
    State(state): State<Arc<ServerState>>,
    mut multipart: Multipart,
) -> ServerResult<Response> {
    let mut upload = None;
    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|err| multipart_error(&state, err))?
    {
        if field.name() == Some("file") {
            upload = Some(read_upload(&state, field).await?);
            break;
        }
    }
    let upload = upload.ok_or(PipelineError::NoFiles)?;

    let permit = state
        .removal_slots
        .clone()
        .acquire_owned()
        .await
        .map_err(|_| ServerError::Unavailable("removal slots closed".into()))?;
    let pipeline = state.pipeline.clone();
    let processed = tokio::task::spawn_blocking(move || {
        let _permit = permit;
        pipeline.process_single(&upload)
    })
    .await??;

    Ok(image_response(processed))
}

fn image_response(processed: ProcessedImage) -> Response {
    let disposition = attachment(&processed.download_name());
    (
        StatusCode::OK,
        [
            (CONTENT_TYPE, "image/png".to_string()),
            (X_REQUEST_ID, processed.id.to_string()),
            (CONTENT_DISPOSITION, disposition),
            (X_SOURCE_FORMAT, processed.source_format.name().to_string()),
        ],
        processed.png,
    )
        .into_response()
}

/// Process up to `max_batch_files` images
///
/// POST /batch-remove, multipart field `files[]` (or `files`)
pub async fn batch_remove(
    State(state): State<Arc<ServerState>>,
    mut multipart: Multipart,
) -> ServerResult<Json<BatchReport>> {
    let mut uploads = Vec::new();
    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|err| multipart_error(&state, err))?
    {
        if matches!(field.name(), Some("files[]") | Some("files")) {
            let upload = read_upload(&state, field).await?;
            // Browsers send one nameless, empty part when nothing was selected.
            if upload.filename.is_empty() && upload.bytes.is_empty() {
                continue;
            }
            uploads.push(upload);
        }
    }
    state.pipeline.check_batch_size(uploads.len())?;

    let permit = state
        .removal_slots
        .clone()
        .acquire_owned()
        .await
        .map_err(|_| ServerError::Unavailable("removal slots closed".into()))?;
    let pipeline = state.pipeline.clone();
    let report = tokio::task::spawn_blocking(move || {
        let _permit = permit;
        pipeline.process_batch(&uploads)
    })
    .await??;

    Ok(Json(report))
}
