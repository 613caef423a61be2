//! Shared handler plumbing: error responses and liveness endpoints.

use axum::{
    http::{header, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use tracing::warn;

use tiler_common::TilerError;

/// Handler-level error wrapper; serializes as the service's JSON error body
/// with the status from the error taxonomy.
pub struct ApiError(pub TilerError);

impl From<TilerError> for ApiError {
    fn from(err: TilerError) -> Self {
        ApiError(err)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = StatusCode::from_u16(self.0.http_status_code())
            .unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
        if status.is_server_error() {
            warn!(error = %self.0, "request failed");
        }
        (status, Json(json!({ "errorMessage": self.0.to_string() }))).into_response()
    }
}

pub async fn health_handler() -> Response {
    Json(json!({ "status": "ok" })).into_response()
}

pub async fn favicon_handler() -> Response {
    Response::builder()
        .status(StatusCode::OK)
        .header(header::CONTENT_TYPE, "image/x-icon")
        .body(axum::body::Body::empty())
        .unwrap_or_else(|_| StatusCode::OK.into_response())
}
