//! XYZ tile rendering handler.

use std::sync::Arc;

use axum::{
    extract::{Extension, Path, Query},
    http::header,
    response::Response,
};
use tracing::instrument;

use tiler_common::TileCoord;

use crate::handlers::common::ApiError;
use crate::params;
use crate::pipeline;
use crate::state::AppState;

/// `GET /{z}/{x}/{y}[@{scale}x][.{ext}]`
#[instrument(skip(state, pairs))]
pub async fn tile_handler(
    Extension(state): Extension<Arc<AppState>>,
    Path((z, x, y_segment)): Path<(u32, u32, String)>,
    Query(pairs): Query<Vec<(String, String)>>,
) -> Result<Response, ApiError> {
    let (y, scale, format) = params::parse_y_segment(&y_segment)?;
    let url = params::require_url(&pairs)?;
    let options = params::render_options(&pairs, format)?;

    let coord = TileCoord { z, x, y };
    let tile = pipeline::render_tile(state, url, coord, scale, options).await?;

    Response::builder()
        .header(header::CONTENT_TYPE, tile.format.content_type())
        .header(header::CACHE_CONTROL, "public, max-age=3600")
        .body(tile.bytes.into())
        .map_err(|e| ApiError(tiler_common::TilerError::Internal(e.to_string())))
}
