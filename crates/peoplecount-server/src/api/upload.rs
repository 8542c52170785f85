use std::sync::Arc;

use axum::{
    extract::{
        multipart::{MultipartError, MultipartRejection},
        Multipart, State,
    },
    Extension, Json,
};
use serde::Serialize;

use crate::middleware::RequestId;
use crate::pipeline::{self, Upload};

use super::{map_pipeline_error, map_rejection, ApiError, AppState};

/// Multipart part carrying the image.
const FILE_FIELD: &str = "file";

#[derive(Debug, Serialize)]
pub(super) struct UploadResponse {
    pub image_url: Option<String>,
    pub count: u32,
}

/// POST /upload: detect persons in an uploaded image and store the result.
pub(super) async fn upload_image(
    State(state): State<AppState>,
    Extension(req_id): Extension<RequestId>,
    multipart: Result<Multipart, MultipartRejection>,
) -> Result<Json<UploadResponse>, ApiError> {
    let rid = &req_id.0;
    let mut multipart = multipart.map_err(|e| map_rejection(rid, e.status(), e.body_text()))?;
    let upload = read_file_part(&mut multipart, rid).await?;

    let outcome = pipeline::handle_upload(
        &state.pool,
        Arc::clone(&state.detector),
        &state.media,
        upload,
    )
    .await
    .map_err(|e| map_pipeline_error(rid, e))?;
    tracing::debug!(request_id = %rid, result_id = ?outcome.id, count = outcome.count, "upload handled");

    Ok(Json(UploadResponse {
        image_url: outcome.image_url,
        count: outcome.count,
    }))
}

/// Reads the `file` part, skipping any other form fields.
async fn read_file_part(multipart: &mut Multipart, rid: &str) -> Result<Upload, ApiError> {
    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| map_multipart_error(rid, &e))?
    {
        if field.name() != Some(FILE_FIELD) {
            continue;
        }

        let file_name = field.file_name().map(ToOwned::to_owned);
        let content_type = field.content_type().map(ToOwned::to_owned);
        let bytes = field
            .bytes()
            .await
            .map_err(|e| map_multipart_error(rid, &e))?;

        return Ok(Upload {
            file_name,
            content_type,
            bytes,
        });
    }

    Err(ApiError::new(
        rid,
        "validation_error",
        format!("multipart field '{FILE_FIELD}' is required"),
    ))
}

fn map_multipart_error(rid: &str, error: &MultipartError) -> ApiError {
    tracing::warn!(error = %error.body_text(), "malformed multipart body");
    map_rejection(rid, error.status(), error.body_text())
}
