//! Upload lifecycle: validate, stage, detect, store.

use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use axum::body::Bytes;
use peoplecount_core::{public_image_url, AppConfig};
use peoplecount_db::{remove_image_best_effort, DbError};
use peoplecount_detector::{DetectError, Detection, Detector};
use sqlx::SqlitePool;
use thiserror::Error;

/// Where uploads are staged and annotated images are published.
#[derive(Debug, Clone)]
pub struct MediaConfig {
    pub static_dir: PathBuf,
    pub static_url_prefix: String,
    pub upload_dir: PathBuf,
}

impl MediaConfig {
    #[must_use]
    pub fn from_app_config(config: &AppConfig) -> Self {
        Self {
            static_dir: config.static_dir.clone(),
            static_url_prefix: config.static_url_prefix.clone(),
            upload_dir: config.upload_dir.clone(),
        }
    }
}

/// A single uploaded file as received from the client.
#[derive(Debug)]
pub struct Upload {
    pub file_name: Option<String>,
    pub content_type: Option<String>,
    pub bytes: Bytes,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UploadOutcome {
    /// Stored record id; `None` when nothing was detected.
    pub id: Option<i64>,
    pub image_url: Option<String>,
    pub count: u32,
}

#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("{0}")]
    Validation(String),

    #[error("Detection failed: {0}")]
    Detection(#[from] DetectError),

    #[error("could not stage upload: {0}")]
    Staging(#[source] std::io::Error),

    #[error("annotated image path is not valid UTF-8: {}", .0.display())]
    NonUtf8Path(PathBuf),

    #[error(transparent)]
    Db(#[from] DbError),

    #[error("detection task failed: {0}")]
    Task(#[from] tokio::task::JoinError),
}

/// Runs one upload through detection and stores the outcome.
///
/// The staged copy of the upload is removed on every exit path. A record is
/// written only when the detector produced an annotated image; zero
/// detections return `count == 0` with no URL and no record.
///
/// # Errors
///
/// - [`PipelineError::Validation`] if the upload is not declared as an image.
/// - [`PipelineError::Detection`] if the detector rejects the image.
/// - [`PipelineError::Db`] if the record cannot be stored; the annotated
///   image is removed in that case.
/// - [`PipelineError::Staging`] / [`PipelineError::Task`] on local I/O or
///   worker failures.
pub async fn handle_upload(
    pool: &SqlitePool,
    detector: Arc<dyn Detector>,
    media: &MediaConfig,
    upload: Upload,
) -> Result<UploadOutcome, PipelineError> {
    validate_image_upload(&upload)?;

    let upload_dir = media.upload_dir.clone();
    let bytes = upload.bytes;
    let detection = tokio::task::spawn_blocking(move || {
        stage_and_detect(detector.as_ref(), &upload_dir, &bytes)
    })
    .await??;

    let Some(annotated) = detection.annotated else {
        tracing::info!(
            file_name = upload.file_name.as_deref().unwrap_or(""),
            "no persons detected; nothing stored"
        );
        return Ok(UploadOutcome {
            id: None,
            image_url: None,
            count: detection.count,
        });
    };

    let Some(image_path) = annotated.to_str() else {
        remove_image_best_effort(&annotated).await;
        return Err(PipelineError::NonUtf8Path(annotated));
    };

    let row = match peoplecount_db::create_detection_result(pool, detection.count, image_path).await
    {
        Ok(row) => row,
        Err(e) => {
            remove_image_best_effort(&annotated).await;
            return Err(e.into());
        }
    };

    tracing::info!(
        result_id = row.id,
        count = detection.count,
        image_path = %row.image_path,
        "detection result stored"
    );

    Ok(UploadOutcome {
        id: Some(row.id),
        image_url: public_image_url(&media.static_url_prefix, &row.image_path),
        count: detection.count,
    })
}

fn validate_image_upload(upload: &Upload) -> Result<(), PipelineError> {
    let is_image = upload
        .content_type
        .as_deref()
        .is_some_and(|ct| ct.trim().to_ascii_lowercase().starts_with("image/"));
    if is_image {
        Ok(())
    } else {
        Err(PipelineError::Validation(
            "Invalid image file type".to_string(),
        ))
    }
}

/// Writes `bytes` to a temporary file in `upload_dir` and runs the detector on it.
///
/// The temporary file is deleted when this returns, including when the
/// detector fails or panics.
fn stage_and_detect(
    detector: &dyn Detector,
    upload_dir: &Path,
    bytes: &[u8],
) -> Result<Detection, PipelineError> {
    std::fs::create_dir_all(upload_dir).map_err(PipelineError::Staging)?;
    let mut staged = tempfile::Builder::new()
        .prefix("upload-")
        .tempfile_in(upload_dir)
        .map_err(PipelineError::Staging)?;
    staged
        .write_all(bytes)
        .and_then(|()| staged.flush())
        .map_err(PipelineError::Staging)?;

    let result = detector.detect(staged.path());

    if let Err(e) = staged.close() {
        tracing::warn!(error = %e, "failed to remove staged upload");
    }

    Ok(result?)
}

#[cfg(test)]
#[path = "pipeline_test.rs"]
mod tests;
