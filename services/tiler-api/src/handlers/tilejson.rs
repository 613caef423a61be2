//! TileJSON document assembly.

use std::sync::Arc;

use axum::{
    extract::{Extension, Query},
    http::HeaderMap,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use tracing::instrument;

use render_pipeline::encode::Format;
use tiler_common::{DatasetInfo, TilerError, TilerResult};

use crate::handlers::common::ApiError;
use crate::params::{self, MAX_TILE_SCALE};
use crate::pipeline;
use crate::state::AppState;

#[derive(Serialize)]
struct TileJsonDoc {
    tilejson: &'static str,
    name: String,
    version: &'static str,
    scheme: &'static str,
    tiles: Vec<String>,
    minzoom: u32,
    maxzoom: u32,
    bounds: [f64; 4],
    center: [f64; 3],
}

/// Base URL for generated documents: the configured public URL, or the
/// request's Host header.
pub fn base_url(state: &AppState, headers: &HeaderMap) -> String {
    if let Some(public) = &state.public_url {
        return public.trim_end_matches('/').to_string();
    }
    let host = headers
        .get("host")
        .and_then(|v| v.to_str().ok())
        .unwrap_or("localhost");
    format!("http://{}", host)
}

/// Caller query params minus the template controls, re-encoded for the tile
/// URL so tile requests reproduce the same rendering.
pub fn forwarded_query(pairs: &[(String, String)]) -> String {
    let forwarded = pairs
        .iter()
        .filter(|(k, _)| k != "tile_format" && k != "tile_scale");
    url::form_urlencoded::Serializer::new(String::new())
        .extend_pairs(forwarded.map(|(k, v)| (k.as_str(), v.as_str())))
        .finish()
}

/// The `{z}/{x}/{y}` tile URL template for a request's parameters.
pub fn tile_template(
    base: &str,
    pairs: &[(String, String)],
) -> TilerResult<String> {
    // No tile_format means no extension, leaving per-tile mask-based
    // format auto-selection in play.
    let format = params::find(pairs, "tile_format")
        .map(Format::from_ext)
        .transpose()?;
    let scale: usize = match params::find(pairs, "tile_scale") {
        Some(raw) => raw.parse().ok().filter(|s| (1..=MAX_TILE_SCALE).contains(s)).ok_or_else(
            || TilerError::InvalidParameter {
                param: "tile_scale".into(),
                message: format!("'{}' is not a scale between 1 and {}", raw, MAX_TILE_SCALE),
            },
        )?,
        None => 1,
    };

    let scale_part = if scale > 1 {
        format!("@{}x", scale)
    } else {
        String::new()
    };
    let ext_part = match format {
        Some(f) => format!(".{}", f.ext()),
        None => String::new(),
    };
    Ok(format!(
        "{}/{{z}}/{{x}}/{{y}}{}{}?{}",
        base,
        scale_part,
        ext_part,
        forwarded_query(pairs)
    ))
}

/// Zoom range derived from the dataset's footprint and resolution in the
/// Mercator grid.
pub fn dataset_zoom_range(info: &DatasetInfo) -> (u32, u32) {
    let extent = raster_source::mercator_extent(info);
    let resolution = extent.width() / info.width as f64;
    tiler_common::tile::zoom_range(&extent, resolution)
}

/// `GET /tilejson.json?url=&tile_format=&tile_scale=&...`
#[instrument(skip(state, headers, pairs))]
pub async fn tilejson_handler(
    Extension(state): Extension<Arc<AppState>>,
    headers: HeaderMap,
    Query(pairs): Query<Vec<(String, String)>>,
) -> Result<Response, ApiError> {
    let url = params::require_url(&pairs)?;
    let template = tile_template(&base_url(&state, &headers), &pairs)?;
    let info = pipeline::dataset_info(state, url.clone()).await?;

    let (minzoom, maxzoom) = dataset_zoom_range(&info);
    let bounds = info.wgs84_bounds.to_array();
    let (center_lon, center_lat) = info.wgs84_bounds.center();

    let name = url.rsplit('/').next().unwrap_or(&url).to_string();
    Ok(Json(TileJsonDoc {
        tilejson: "2.1.0",
        name,
        version: "1.0.0",
        scheme: "xyz",
        tiles: vec![template],
        minzoom,
        maxzoom,
        bounds,
        center: [center_lon, center_lat, minzoom as f64],
    })
    .into_response())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pairs(items: &[(&str, &str)]) -> Vec<(String, String)> {
        items
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[test]
    fn test_template_forwards_rendering_params() {
        let p = pairs(&[
            ("url", "http://x/y.tif"),
            ("rescale", "0,1000"),
            ("tile_format", "webp"),
            ("tile_scale", "2"),
        ]);
        let template = tile_template("http://tiler", &p).unwrap();
        assert!(template.starts_with("http://tiler/{z}/{x}/{y}@2x.webp?"));
        assert!(template.contains("rescale=0%2C1000"));
        assert!(template.contains("url=http%3A%2F%2Fx%2Fy.tif"));
        assert!(!template.contains("tile_format"));
        assert!(!template.contains("tile_scale"));
    }

    #[test]
    fn test_template_without_format_has_no_extension() {
        let p = pairs(&[("url", "x")]);
        let template = tile_template("http://tiler", &p).unwrap();
        assert!(template.starts_with("http://tiler/{z}/{x}/{y}?"));
    }

    #[test]
    fn test_template_rejects_bad_controls() {
        assert!(tile_template("b", &pairs(&[("tile_format", "gif")])).is_err());
        assert!(tile_template("b", &pairs(&[("tile_scale", "9")])).is_err());
    }
}
