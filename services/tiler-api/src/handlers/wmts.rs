//! WMTS 1.0.0 GetCapabilities wrapping the XYZ tile endpoint.

use std::sync::Arc;

use axum::{
    extract::{Extension, Query},
    http::{header, HeaderMap},
    response::{IntoResponse, Response},
};
use tracing::instrument;

use render_pipeline::encode::Format;

use crate::handlers::common::ApiError;
use crate::handlers::tilejson::{base_url, dataset_zoom_range, forwarded_query};
use crate::params;
use crate::pipeline;
use crate::state::AppState;

/// Scale denominator of the Mercator grid at z0 (0.28mm/px convention).
const SCALE_DENOMINATOR_Z0: f64 = 559_082_264.028_717_8;

fn xml_escape(raw: &str) -> String {
    raw.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
}

fn tile_matrices(minzoom: u32, maxzoom: u32) -> String {
    (minzoom..=maxzoom)
        .map(|z| {
            let matrix_size = 2_u64.pow(z);
            format!(
                r#"<TileMatrix>
  <ows:Identifier>{z}</ows:Identifier>
  <ScaleDenominator>{scale}</ScaleDenominator>
  <TopLeftCorner>-20037508.342789244 20037508.342789244</TopLeftCorner>
  <TileWidth>256</TileWidth>
  <TileHeight>256</TileHeight>
  <MatrixWidth>{matrix_size}</MatrixWidth>
  <MatrixHeight>{matrix_size}</MatrixHeight>
</TileMatrix>"#,
                z = z,
                scale = SCALE_DENOMINATOR_Z0 / 2_f64.powi(z as i32),
                matrix_size = matrix_size,
            )
        })
        .collect::<Vec<_>>()
        .join("\n")
}

/// `GET /wmts?url=&tile_format=&title=&...`
#[instrument(skip(state, headers, pairs))]
pub async fn wmts_handler(
    Extension(state): Extension<Arc<AppState>>,
    headers: HeaderMap,
    Query(pairs): Query<Vec<(String, String)>>,
) -> Result<Response, ApiError> {
    let url = params::require_url(&pairs)?;

    let format = match params::find(&pairs, "tile_format") {
        Some(ext) => Format::from_ext(ext)?,
        None => Format::Png,
    };
    let title = params::find(&pairs, "title").unwrap_or("Raster tiles").to_string();

    // SERVICE/REQUEST belong to the capabilities call, not the tiles.
    let tile_pairs: Vec<(String, String)> = pairs
        .iter()
        .filter(|(k, _)| {
            let k = k.to_ascii_lowercase();
            k != "service" && k != "request" && k != "title"
        })
        .cloned()
        .collect();
    let query = xml_escape(&forwarded_query(&tile_pairs));

    let base = base_url(&state, &headers);
    let info = pipeline::dataset_info(state, url).await?;
    let (minzoom, maxzoom) = dataset_zoom_range(&info);
    let b = info.wgs84_bounds;

    let xml = format!(
        r#"<?xml version="1.0" encoding="UTF-8"?>
<Capabilities xmlns="http://www.opengis.net/wmts/1.0"
    xmlns:ows="http://www.opengis.net/ows/1.1"
    xmlns:xlink="http://www.w3.org/1999/xlink"
    version="1.0.0">
  <ows:ServiceIdentification>
    <ows:Title>{title}</ows:Title>
    <ows:ServiceType>OGC WMTS</ows:ServiceType>
    <ows:ServiceTypeVersion>1.0.0</ows:ServiceTypeVersion>
  </ows:ServiceIdentification>
  <Contents>
    <Layer>
      <ows:Title>{title}</ows:Title>
      <ows:Identifier>cogeo</ows:Identifier>
      <ows:WGS84BoundingBox crs="urn:ogc:def:crs:OGC:2:84">
        <ows:LowerCorner>{min_x} {min_y}</ows:LowerCorner>
        <ows:UpperCorner>{max_x} {max_y}</ows:UpperCorner>
      </ows:WGS84BoundingBox>
      <Style isDefault="true"><ows:Identifier>default</ows:Identifier></Style>
      <Format>{content_type}</Format>
      <TileMatrixSetLink><TileMatrixSet>GoogleMapsCompatible</TileMatrixSet></TileMatrixSetLink>
      <ResourceURL format="{content_type}" resourceType="tile"
          template="{base}/{{TileMatrix}}/{{TileCol}}/{{TileRow}}.{ext}?{query}"/>
    </Layer>
    <TileMatrixSet>
      <ows:Identifier>GoogleMapsCompatible</ows:Identifier>
      <ows:SupportedCRS>urn:ogc:def:crs:EPSG::3857</ows:SupportedCRS>
{matrices}
    </TileMatrixSet>
  </Contents>
  <ServiceMetadataURL xlink:href="{base}/wmts?{query}"/>
</Capabilities>"#,
        title = xml_escape(&title),
        min_x = b.min_x,
        min_y = b.min_y,
        max_x = b.max_x,
        max_y = b.max_y,
        content_type = format.content_type(),
        ext = format.ext(),
        base = base,
        query = query,
        matrices = tile_matrices(minzoom, maxzoom),
    );

    Response::builder()
        .header(header::CONTENT_TYPE, "application/xml")
        .body(xml.into())
        .map_err(|e| ApiError(tiler_common::TilerError::Internal(e.to_string())))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_xml_escape() {
        assert_eq!(xml_escape("a=1&b=\"x\""), "a=1&amp;b=&quot;x&quot;");
    }

    #[test]
    fn test_tile_matrices_span_zooms() {
        let xml = tile_matrices(0, 2);
        assert_eq!(xml.matches("<TileMatrix>").count(), 3);
        assert!(xml.contains("<MatrixWidth>4</MatrixWidth>"));
    }
}
