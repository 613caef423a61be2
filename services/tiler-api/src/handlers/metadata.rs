//! Dataset introspection: `/bounds` and `/metadata`.

use std::collections::BTreeMap;
use std::sync::Arc;

use axum::{
    extract::{Extension, Query},
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use tracing::instrument;

use render_pipeline::stats::BandStatistics;

use crate::handlers::common::ApiError;
use crate::params;
use crate::pipeline;
use crate::state::AppState;

#[derive(Serialize)]
struct BoundsDoc {
    url: String,
    bounds: [f64; 4],
}

/// `GET /bounds?url=` — WGS84 dataset bounds, metadata only.
#[instrument(skip(state, pairs))]
pub async fn bounds_handler(
    Extension(state): Extension<Arc<AppState>>,
    Query(pairs): Query<Vec<(String, String)>>,
) -> Result<Response, ApiError> {
    let url = params::require_url(&pairs)?;
    let info = pipeline::dataset_info(state, url.clone()).await?;
    Ok(Json(BoundsDoc {
        url,
        bounds: info.wgs84_bounds.to_array(),
    })
    .into_response())
}

#[derive(Serialize)]
struct MetadataDoc {
    address: String,
    bounds: [f64; 4],
    band_descriptions: Vec<(usize, String)>,
    statistics: BTreeMap<usize, BandStatistics>,
}

/// `GET /metadata?url=&pmin=&pmax=&nodata=&indexes=&max_size=&histogram_bins=&histogram_range=`
#[instrument(skip(state, pairs))]
pub async fn metadata_handler(
    Extension(state): Extension<Arc<AppState>>,
    Query(pairs): Query<Vec<(String, String)>>,
) -> Result<Response, ApiError> {
    let url = params::require_url(&pairs)?;
    let metadata_params = params::metadata_params(&pairs)?;
    let (info, statistics) = pipeline::dataset_statistics(state, url, metadata_params).await?;

    Ok(Json(MetadataDoc {
        address: info.address.clone(),
        bounds: info.wgs84_bounds.to_array(),
        band_descriptions: info.band_descriptions,
        statistics,
    })
    .into_response())
}
