//! Point-query handler.

use std::sync::Arc;

use axum::{
    extract::{Extension, Query},
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use tracing::instrument;

use render_pipeline::bands;
use tiler_common::TilerError;

use crate::handlers::common::ApiError;
use crate::params;
use crate::pipeline;
use crate::state::AppState;

#[derive(Serialize)]
struct PointDoc {
    coordinates: [f64; 2],
    values: Vec<f64>,
}

fn coordinate(pairs: &[(String, String)], key: &str) -> Result<f64, TilerError> {
    params::find(pairs, key)
        .ok_or_else(|| TilerError::MissingParameter(key.into()))?
        .parse()
        .map_err(|_| TilerError::InvalidParameter {
            param: key.into(),
            message: "not a coordinate".into(),
        })
}

/// `GET /point?url=&lon=&lat=&indexes=` — band values at a WGS84 point.
#[instrument(skip(state, pairs))]
pub async fn point_handler(
    Extension(state): Extension<Arc<AppState>>,
    Query(pairs): Query<Vec<(String, String)>>,
) -> Result<Response, ApiError> {
    let url = params::require_url(&pairs)?;
    let lon = coordinate(&pairs, "lon")?;
    let lat = coordinate(&pairs, "lat")?;
    let indexes = params::find(&pairs, "indexes")
        .map(bands::parse_indexes)
        .transpose()?;

    let values = pipeline::sample_point(state, url, lon, lat, indexes).await?;
    Ok(Json(PointDoc {
        coordinates: [lon, lat],
        values,
    })
    .into_response())
}
