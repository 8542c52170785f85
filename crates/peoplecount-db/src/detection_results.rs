//! Database operations for the `detection_results` table.

use chrono::{DateTime, Utc};
use sqlx::SqlitePool;

use crate::DbError;

// ---------------------------------------------------------------------------
// Row type
// ---------------------------------------------------------------------------

/// A row from the `detection_results` table.
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct DetectionResultRow {
    pub id: i64,
    pub created_at: DateTime<Utc>,
    pub count: i64,
    pub image_path: String,
}

// ---------------------------------------------------------------------------
// Queries
// ---------------------------------------------------------------------------

/// Inserts a detection outcome and returns the stored row.
///
/// `created_at` is assigned by the database.
///
/// # Errors
///
/// Returns [`DbError::Sqlx`] if the insert fails.
pub async fn create_detection_result(
    pool: &SqlitePool,
    count: u32,
    image_path: &str,
) -> Result<DetectionResultRow, DbError> {
    let row = sqlx::query_as::<_, DetectionResultRow>(
        "INSERT INTO detection_results (count, image_path) \
         VALUES (?1, ?2) \
         RETURNING id, created_at, count, image_path",
    )
    .bind(i64::from(count))
    .bind(image_path)
    .fetch_one(pool)
    .await?;

    Ok(row)
}

/// Returns every stored result, newest first.
///
/// Rows created within the same millisecond are ordered by `id DESC`.
///
/// # Errors
///
/// Returns [`DbError::Sqlx`] if the query fails.
pub async fn list_detection_results(pool: &SqlitePool) -> Result<Vec<DetectionResultRow>, DbError> {
    let rows = sqlx::query_as::<_, DetectionResultRow>(
        "SELECT id, created_at, count, image_path \
         FROM detection_results \
         ORDER BY created_at DESC, id DESC",
    )
    .fetch_all(pool)
    .await?;

    Ok(rows)
}

/// Fetches a single result by `id`.
///
/// # Errors
///
/// Returns [`DbError::NotFound`] if no row exists with the given `id`, or
/// [`DbError::Sqlx`] if the query fails.
pub async fn get_detection_result(pool: &SqlitePool, id: i64) -> Result<DetectionResultRow, DbError> {
    sqlx::query_as::<_, DetectionResultRow>(
        "SELECT id, created_at, count, image_path \
         FROM detection_results \
         WHERE id = ?1",
    )
    .bind(id)
    .fetch_optional(pool)
    .await?
    .ok_or(DbError::NotFound)
}

/// Deletes a result and returns the removed row so the caller can clean up
/// its image file.
///
/// # Errors
///
/// Returns [`DbError::NotFound`] if no row exists with the given `id` (the
/// table is left unchanged), or [`DbError::Sqlx`] if the delete fails.
pub async fn delete_detection_result(
    pool: &SqlitePool,
    id: i64,
) -> Result<DetectionResultRow, DbError> {
    sqlx::query_as::<_, DetectionResultRow>(
        "DELETE FROM detection_results \
         WHERE id = ?1 \
         RETURNING id, created_at, count, image_path",
    )
    .bind(id)
    .fetch_optional(pool)
    .await?
    .ok_or(DbError::NotFound)
}
