use axum::{
    extract::{rejection::PathRejection, Path, State},
    http::StatusCode,
    Extension, Json,
};
use chrono::{DateTime, Utc};
use peoplecount_core::public_image_url;
use serde::Serialize;

use crate::middleware::RequestId;

use super::{map_db_error, map_rejection, ApiError, AppState};

#[derive(Debug, Serialize)]
pub(super) struct DetectionResultItem {
    pub id: i64,
    pub timestamp: DateTime<Utc>,
    pub count: i64,
    pub image_url: Option<String>,
}

/// GET /results: every stored result, newest first.
pub(super) async fn list_results(
    State(state): State<AppState>,
    Extension(req_id): Extension<RequestId>,
) -> Result<Json<Vec<DetectionResultItem>>, ApiError> {
    let rows = peoplecount_db::list_detection_results(&state.pool)
        .await
        .map_err(|e| map_db_error(req_id.0.clone(), &e))?;

    let prefix = &state.media.static_url_prefix;
    let items = rows
        .into_iter()
        .map(|row| DetectionResultItem {
            image_url: public_image_url(prefix, &row.image_path),
            id: row.id,
            timestamp: row.created_at,
            count: row.count,
        })
        .collect();

    Ok(Json(items))
}

/// DELETE /results/{id}
pub(super) async fn delete_result(
    State(state): State<AppState>,
    Extension(req_id): Extension<RequestId>,
    id: Result<Path<i64>, PathRejection>,
) -> Result<StatusCode, ApiError> {
    let Path(id) = id.map_err(|e| map_rejection(&req_id.0, e.status(), e.body_text()))?;
    peoplecount_db::delete_detection_result_and_image(&state.pool, id)
        .await
        .map_err(|e| map_db_error(req_id.0.clone(), &e))?;
    Ok(StatusCode::NO_CONTENT)
}
