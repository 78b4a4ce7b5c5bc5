//! Document upload handler

use axum::{
    extract::{Multipart, Path, State},
    http::StatusCode,
    Json,
};
use paperlens_common::errors::{AppError, Result};
use paperlens_ingestion::{AddFilesOutcome, UploadedFile};
use uuid::Uuid;

use crate::AppState;

/// Queue every PDF part of a multipart body on the active project.
///
/// Non-PDF parts are counted as rejected. Analysis runs in the background;
/// poll the project snapshot for progress.
pub async fn upload_files(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    mut multipart: Multipart,
) -> Result<(StatusCode, Json<AddFilesOutcome>)> {
    let mut files = Vec::new();

    while let Some(field) = multipart.next_field().await.map_err(|e| AppError::Validation {
        message: format!("Invalid multipart body: {}", e),
        field: None,
    })? {
        let Some(file_name) = field.file_name().map(str::to_string) else {
            continue;
        };
        let content_type = field.content_type().map(str::to_string);
        let bytes = field.bytes().await.map_err(|e| AppError::Validation {
            message: format!("Failed to read {}: {}", file_name, e),
            field: Some(file_name.clone()),
        })?;
        files.push(UploadedFile::new(file_name, content_type, bytes.to_vec()));
    }

    let received = files.len();
    let outcome = state.queue.add_files(id, files).await?;
    tracing::info!(
        project_id = %id,
        received,
        accepted = outcome.accepted.len(),
        rejected = outcome.rejected,
        "Upload received"
    );

    Ok((StatusCode::ACCEPTED, Json(outcome)))
}
