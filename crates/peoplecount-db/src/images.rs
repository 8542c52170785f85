//! Annotated-image files owned by `detection_results` rows.

use std::io::ErrorKind;
use std::path::Path;

use sqlx::SqlitePool;

use crate::{delete_detection_result, DbError, DetectionResultRow};

/// Deletes a result row, then removes its image file best-effort.
///
/// The row is authoritative: once it is gone the call succeeds, whether or not
/// the file could be removed.
///
/// # Errors
///
/// Returns [`DbError::NotFound`] if `id` does not exist, or [`DbError::Sqlx`]
/// if the delete fails. No file is touched in either case.
pub async fn delete_detection_result_and_image(
    pool: &SqlitePool,
    id: i64,
) -> Result<DetectionResultRow, DbError> {
    let row = delete_detection_result(pool, id).await?;
    tracing::info!(result_id = row.id, "detection result deleted");
    remove_image_best_effort(Path::new(&row.image_path)).await;
    Ok(row)
}

/// Removes an image file, logging instead of failing.
///
/// An already-missing file is logged at debug; any other error at warn.
pub async fn remove_image_best_effort(path: &Path) {
    match tokio::fs::remove_file(path).await {
        Ok(()) => tracing::debug!(path = %path.display(), "image file removed"),
        Err(e) if e.kind() == ErrorKind::NotFound => {
            tracing::debug!(path = %path.display(), "image file already absent");
        }
        Err(e) => {
            tracing::warn!(path = %path.display(), error = %e, "failed to remove image file");
        }
    }
}
