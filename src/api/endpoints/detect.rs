//! `POST /detect` — runs door detection on every uploaded file.
//!
//! Files of one request run on the blocking pool, at most
//! `max_concurrent_files` at a time, and are reported in upload order. A
//! failing file does not fail the request.

use axum::extract::multipart::MultipartRejection;
use axum::extract::{Multipart, State};
use axum::Json;
use futures_util::stream::{self, StreamExt};

use crate::api::error::ApiError;
use crate::api::types::{ApiContext, DetectResponse, FileReport};
use crate::pipeline::{detect_file, ProcessingError, PipelineError, UploadedFile};

/// Multipart field names accepted as uploads.
const FILE_FIELDS: [&str; 2] = ["files", "file"];

/// Filename used when a part carries none.
const UNKNOWN_FILENAME: &str = "unknown";

pub async fn detect(
    State(ctx): State<ApiContext>,
    multipart: Result<Multipart, MultipartRejection>,
) -> Result<Json<DetectResponse>, ApiError> {
    let mut multipart = multipart?;
    let files = read_uploads(&mut multipart).await?;
    if files.is_empty() {
        return Err(ApiError::NoFiles);
    }

    tracing::info!(count = files.len(), "Detection request received");

    // First request pays for the model load; keep it off the async workers
    let slot = ctx.model.clone();
    let detector = tokio::task::spawn_blocking(move || slot.get()).await?;

    // `buffered` keeps upload order and only starts a worker when a slot frees up
    let images: Vec<FileReport> = stream::iter(files)
        .map(|file| {
            let renderer = ctx.renderer.clone();
            let detector = detector.clone();
            let config = ctx.pipeline.clone();
            let filename = file.filename.clone();
            async move {
                let joined = tokio::task::spawn_blocking(move || {
                    let outcome =
                        detect_file(&file, renderer.as_ref(), detector.as_deref(), &config);
                    FileReport::from_outcome(&file.filename, outcome)
                })
                .await;
                joined.unwrap_or_else(|e| {
                    tracing::error!(%filename, error = %e, "Detection worker failed");
                    FileReport::failed(&ProcessingError::Unexpected {
                        filename,
                        source: PipelineError::Worker(e.to_string()),
                    })
                })
            }
        })
        .buffered(ctx.max_concurrent_files.max(1))
        .collect()
        .await;

    Ok(Json(DetectResponse { images }))
}

/// Collect file parts in upload order, skipping unrelated fields.
async fn read_uploads(multipart: &mut Multipart) -> Result<Vec<UploadedFile>, ApiError> {
    let mut files = Vec::new();
    while let Some(field) = multipart.next_field().await? {
        let is_file = field.name().is_some_and(|name| FILE_FIELDS.contains(&name));
        if !is_file {
            continue;
        }
        let filename = field
            .file_name()
            .filter(|name| !name.is_empty())
            .unwrap_or(UNKNOWN_FILENAME)
            .to_string();
        let content = field.bytes().await?;
        tracing::debug!(%filename, bytes = content.len(), "Received upload");
        files.push(UploadedFile::new(filename, content.to_vec()));
    }
    Ok(files)
}
