mod results;
mod upload;

use std::sync::Arc;

use axum::{
    extract::{DefaultBodyLimit, Request, State},
    http::{header, HeaderName, Method, StatusCode},
    response::IntoResponse,
    routing::{delete, get, post},
    Json, Router,
};
use chrono::{DateTime, Utc};
use peoplecount_detector::Detector;
use serde::Serialize;
use sqlx::SqlitePool;
use tower::ServiceBuilder;
use tower_http::{cors::CorsLayer, services::ServeDir, trace::TraceLayer};

use crate::middleware::{request_id, RequestId, REQUEST_ID_HEADER};
use crate::pipeline::{MediaConfig, PipelineError};

#[derive(Clone)]
pub struct AppState {
    pub pool: SqlitePool,
    pub detector: Arc<dyn Detector>,
    pub media: Arc<MediaConfig>,
}

#[derive(Debug, Serialize)]
pub struct ResponseMeta {
    pub request_id: String,
    pub timestamp: DateTime<Utc>,
}

#[derive(Debug, Serialize)]
pub struct ApiError {
    pub error: ErrorBody,
    pub meta: ResponseMeta,
}

#[derive(Debug, Serialize)]
pub struct ErrorBody {
    pub code: String,
    pub message: String,
}

#[derive(Debug, Serialize, PartialEq, Eq)]
struct HealthData {
    status: &'static str,
    database: &'static str,
}

impl ResponseMeta {
    pub(super) fn new(request_id: String) -> Self {
        Self {
            request_id,
            timestamp: Utc::now(),
        }
    }
}

impl ApiError {
    pub fn new(
        request_id: impl Into<String>,
        code: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        Self {
            error: ErrorBody {
                code: code.into(),
                message: message.into(),
            },
            meta: ResponseMeta::new(request_id.into()),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> axum::response::Response {
        let status = match self.error.code.as_str() {
            "not_found" => StatusCode::NOT_FOUND,
            "bad_request" | "validation_error" => StatusCode::BAD_REQUEST,
            "payload_too_large" => StatusCode::PAYLOAD_TOO_LARGE,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        };
        (status, Json(self)).into_response()
    }
}

pub(super) fn map_db_error(request_id: String, error: &peoplecount_db::DbError) -> ApiError {
    if matches!(error, peoplecount_db::DbError::NotFound) {
        return ApiError::new(request_id, "not_found", "Result not found");
    }
    tracing::error!(error = %error, "database query failed");
    ApiError::new(request_id, "internal_error", "database query failed")
}

pub(super) fn map_pipeline_error(request_id: &str, error: PipelineError) -> ApiError {
    match error {
        PipelineError::Validation(message) => {
            ApiError::new(request_id, "validation_error", message)
        }
        PipelineError::Detection(ref e) => {
            tracing::error!(error = %e, "detection failed");
            ApiError::new(request_id, "detection_failed", error.to_string())
        }
        PipelineError::Db(ref e) => map_db_error(request_id.to_owned(), e),
        PipelineError::Staging(_) | PipelineError::NonUtf8Path(_) | PipelineError::Task(_) => {
            tracing::error!(error = %error, "upload processing failed");
            ApiError::new(request_id, "internal_error", "upload processing failed")
        }
    }
}

/// Converts an axum extractor rejection into the JSON error envelope.
pub(super) fn map_rejection(request_id: &str, status: StatusCode, message: String) -> ApiError {
    let code = if status == StatusCode::PAYLOAD_TOO_LARGE {
        "payload_too_large"
    } else if status.is_client_error() {
        "validation_error"
    } else {
        tracing::error!(%status, message = %message, "request extraction failed");
        "internal_error"
    };
    ApiError::new(request_id, code, message)
}

fn build_cors() -> CorsLayer {
    CorsLayer::new()
        .allow_origin(tower_http::cors::Any)
        .allow_methods([Method::GET, Method::POST, Method::DELETE])
        .allow_headers([
            header::CONTENT_TYPE,
            HeaderName::from_static(REQUEST_ID_HEADER),
        ])
        .expose_headers([HeaderName::from_static(REQUEST_ID_HEADER)])
}

/// Request span carrying the id assigned by [`request_id`], which runs first.
fn request_span(req: &Request) -> tracing::Span {
    let id = req
        .extensions()
        .get::<RequestId>()
        .map_or("", |id| id.0.as_str());
    tracing::info_span!(
        "http_request",
        method = %req.method(),
        uri = %req.uri(),
        request_id = %id,
    )
}

pub fn build_app(state: AppState, max_upload_bytes: usize) -> Router {
    let static_files = ServeDir::new(&state.media.static_dir);
    let static_prefix = state.media.static_url_prefix.clone();

    Router::new()
        .route("/", get(root))
        .route("/health", get(health))
        .route("/upload", post(upload::upload_image))
        .route("/results", get(results::list_results))
        .route("/results/{id}", delete(results::delete_result))
        .nest_service(&static_prefix, static_files)
        .layer(DefaultBodyLimit::max(max_upload_bytes))
        .layer(
            ServiceBuilder::new()
                .layer(axum::middleware::from_fn(request_id))
                .layer(TraceLayer::new_for_http().make_span_with(request_span))
                .layer(build_cors()),
        )
        .with_state(state)
}

async fn root() -> impl IntoResponse {
    Json(serde_json::json!({ "Hello": "World" }))
}

async fn health(State(state): State<AppState>) -> impl IntoResponse {
    match peoplecount_db::health_check(&state.pool).await {
        Ok(()) => (
            StatusCode::OK,
            Json(HealthData {
                status: "ok",
                database: "ok",
            }),
        ),
        Err(e) => {
            tracing::warn!(error = %e, "health check: database unavailable");
            (
                StatusCode::SERVICE_UNAVAILABLE,
                Json(HealthData {
                    status: "degraded",
                    database: "unavailable",
                }),
            )
        }
    }
}

#[cfg(test)]
#[path = "api_test.rs"]
mod tests;
