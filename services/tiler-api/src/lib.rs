//! COG tile server.
//!
//! Stateless HTTP service rendering web map tiles on demand from remote
//! Cloud-Optimized GeoTIFFs.

pub mod handlers;
pub mod params;
pub mod pipeline;
pub mod state;

use std::sync::Arc;

use axum::{extract::Extension, routing::get, Router};
use tower_http::{compression::CompressionLayer, cors::CorsLayer, trace::TraceLayer};

use state::AppState;

/// Build the service router.
pub fn app(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/tilejson.json", get(handlers::tilejson_handler))
        .route("/bounds", get(handlers::bounds_handler))
        .route("/metadata", get(handlers::metadata_handler))
        .route("/point", get(handlers::point_handler))
        .route("/wmts", get(handlers::wmts_handler))
        .route("/docs", get(handlers::docs_handler))
        .route("/health", get(handlers::health_handler))
        .route("/favicon.ico", get(handlers::favicon_handler))
        .route("/:z/:x/:y", get(handlers::tile_handler))
        .layer(Extension(state))
        .layer(TraceLayer::new_for_http())
        .layer(CompressionLayer::new())
        .layer(CorsLayer::permissive())
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::to_bytes;
    use axum::http::{Request, StatusCode};
    use ndarray::Array3;
    use raster_source::MemorySource;
    use tiler_common::{BoundingBox, DataType};
    use tower::ServiceExt;

    fn test_app() -> Router {
        let state = AppState::with_opener(Some("http://tiler.test".into()), |url| {
            match url {
                "mem://rgb" => Ok(Arc::new(MemorySource::rgb(256, 128))),
                "mem://gradient" => Ok(Arc::new(MemorySource::gradient(256, 128, 1000.0))),
                "mem://holes" => {
                    let mut data = Array3::from_elem((1, 64, 64), 50.0);
                    for x in 0..32 {
                        data[[0, 0, x]] = -9999.0;
                    }
                    Ok(Arc::new(MemorySource::new(
                        data,
                        BoundingBox::new(-180.0, -85.0511, 180.0, 85.0511),
                        DataType::Int16,
                        Some(-9999.0),
                    )))
                }
                "mem://local" => Ok(Arc::new(MemorySource::new(
                    Array3::from_elem((1, 32, 32), 7.0),
                    BoundingBox::new(0.0, 0.0, 10.0, 10.0),
                    DataType::UInt8,
                    None,
                ))),
                other => Err(tiler_common::TilerError::SourceUnreachable(other.into())),
            }
        });
        app(Arc::new(state))
    }

    async fn get_response(uri: &str) -> (StatusCode, Option<String>, Vec<u8>) {
        let response = test_app()
            .oneshot(Request::get(uri).body(axum::body::Body::empty()).unwrap())
            .await
            .unwrap();
        let status = response.status();
        let content_type = response
            .headers()
            .get("content-type")
            .and_then(|v| v.to_str().ok())
            .map(str::to_string);
        let body = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        (status, content_type, body.to_vec())
    }

    fn json(body: &[u8]) -> serde_json::Value {
        serde_json::from_slice(body).unwrap()
    }

    #[tokio::test]
    async fn test_health() {
        let (status, _, body) = get_response("/health").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(json(&body)["status"], "ok");
    }

    #[tokio::test]
    async fn test_tile_renders_jpeg_when_opaque() {
        let (status, content_type, body) = get_response("/0/0/0?url=mem://rgb").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(content_type.as_deref(), Some("image/jpeg"));
        assert!(!body.is_empty());
    }

    #[tokio::test]
    async fn test_tile_explicit_png_with_scale() {
        let (status, content_type, body) =
            get_response("/1/0/0@2x.png?url=mem://gradient&rescale=0,1000").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(content_type.as_deref(), Some("image/png"));

        let decoded = image::load_from_memory(&body).unwrap();
        assert_eq!(decoded.width(), 512);
        assert_eq!(decoded.height(), 512);
    }

    #[tokio::test]
    async fn test_tile_nodata_hole_selects_png() {
        let (status, content_type, _) = get_response("/0/0/0?url=mem://holes").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(content_type.as_deref(), Some("image/png"));
    }

    #[tokio::test]
    async fn test_tile_colormap_on_opaque_source_selects_png() {
        // The RGBA colormap output needs alpha even with no masked pixels.
        let (status, content_type, body) =
            get_response("/0/0/0?url=mem://gradient&rescale=0,1000&color_map=viridis").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(content_type.as_deref(), Some("image/png"));
        assert!(!body.is_empty());
    }

    #[tokio::test]
    async fn test_tile_missing_url_is_400() {
        let (status, _, body) = get_response("/0/0/0").await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert!(json(&body)["errorMessage"].as_str().unwrap().contains("url"));
    }

    #[tokio::test]
    async fn test_indexes_and_expr_conflict_is_400() {
        let (status, _, body) =
            get_response("/0/0/0?url=mem://rgb&indexes=1&expr=b1").await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert!(json(&body)["errorMessage"]
            .as_str()
            .unwrap()
            .contains("mutually exclusive"));
    }

    #[tokio::test]
    async fn test_tile_outside_extent_is_404() {
        // mem://local covers [0,0,10,10]; this z4 tile is far south-west
        let (status, _, body) = get_response("/4/1/12?url=mem://local").await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert!(json(&body)["errorMessage"].is_string());
    }

    #[tokio::test]
    async fn test_tile_outside_grid_is_400() {
        // x = 9 does not exist at z = 2
        let (status, _, _) = get_response("/2/9/0?url=mem://rgb").await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_unreachable_source_is_502() {
        let (status, _, _) = get_response("/0/0/0?url=mem://nope").await;
        assert_eq!(status, StatusCode::BAD_GATEWAY);
    }

    #[tokio::test]
    async fn test_bounds() {
        let (status, _, body) = get_response("/bounds?url=mem://rgb").await;
        assert_eq!(status, StatusCode::OK);
        let doc = json(&body);
        assert_eq!(doc["url"], "mem://rgb");
        assert_eq!(doc["bounds"][0], -180.0);
    }

    #[tokio::test]
    async fn test_metadata_statistics() {
        let (status, _, body) =
            get_response("/metadata?url=mem://gradient&histogram_bins=10&pmin=5&pmax=95").await;
        assert_eq!(status, StatusCode::OK);
        let doc = json(&body);
        let band = &doc["statistics"]["1"];
        let counts: u64 = band["histogram"][0]
            .as_array()
            .unwrap()
            .iter()
            .map(|v| v.as_u64().unwrap())
            .sum();
        assert!(counts > 0);
        assert_eq!(band["histogram"][0].as_array().unwrap().len(), 10);
        assert!(band["pc"][1].as_f64().unwrap() <= 1000.0);
    }

    #[tokio::test]
    async fn test_point() {
        let (status, _, body) = get_response("/point?url=mem://gradient&lon=90&lat=0").await;
        assert_eq!(status, StatusCode::OK);
        let doc = json(&body);
        assert_eq!(doc["coordinates"][0], 90.0);
        assert!(doc["values"][0].as_f64().unwrap() > 500.0);
    }

    #[tokio::test]
    async fn test_point_outside_bounds_is_400() {
        let (status, _, _) = get_response("/point?url=mem://gradient&lon=90&lat=89.9").await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_tilejson_forwards_params() {
        let (status, _, body) =
            get_response("/tilejson.json?url=mem://rgb&rescale=0,255&tile_format=jpg").await;
        assert_eq!(status, StatusCode::OK);
        let doc = json(&body);
        assert_eq!(doc["tilejson"], "2.1.0");
        let template = doc["tiles"][0].as_str().unwrap();
        assert!(template.starts_with("http://tiler.test/{z}/{x}/{y}.jpg?"));
        assert!(template.contains("rescale="));
        assert!(!template.contains("tile_format"));
    }

    #[tokio::test]
    async fn test_wmts_document() {
        let (status, content_type, body) = get_response("/wmts?url=mem://rgb").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(content_type.as_deref(), Some("application/xml"));
        let xml = String::from_utf8(body).unwrap();
        assert!(xml.contains("<Capabilities"));
        assert!(xml.contains("GoogleMapsCompatible"));
        assert!(xml.contains("url=mem%3A%2F%2Frgb"));
    }

    #[tokio::test]
    async fn test_docs_and_favicon() {
        let (status, content_type, _) = get_response("/docs").await;
        assert_eq!(status, StatusCode::OK);
        assert!(content_type.unwrap().starts_with("text/html"));

        let (status, _, body) = get_response("/favicon.ico").await;
        assert_eq!(status, StatusCode::OK);
        assert!(body.is_empty());
    }
}
