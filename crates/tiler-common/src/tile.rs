//! Web Mercator tile grid math.
//!
//! Implements the standard XYZ tile scheme (WebMercatorQuad): 256px tiles,
//! zoom `z` splits the world into `2^z x 2^z` tiles.

use crate::BoundingBox;
use serde::{Deserialize, Serialize};
use std::f64::consts::PI;

/// Half the earth's circumference in Web Mercator meters.
pub const WEB_MERCATOR_EXTENT: f64 = 20_037_508.342_789_244;

/// Base tile size in pixels.
pub const TILE_SIZE: usize = 256;

/// A tile coordinate (z/x/y).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TileCoord {
    /// Zoom level
    pub z: u32,
    /// Column (x)
    pub x: u32,
    /// Row (y), counted from the north
    pub y: u32,
}

impl TileCoord {
    pub fn new(z: u32, x: u32, y: u32) -> Self {
        Self { z, x, y }
    }

    /// Bounding box of this tile in Web Mercator (EPSG:3857) meters.
    pub fn mercator_bounds(&self) -> BoundingBox {
        let n = 2_u32.pow(self.z) as f64;
        let span = 2.0 * WEB_MERCATOR_EXTENT / n;

        let min_x = -WEB_MERCATOR_EXTENT + self.x as f64 * span;
        let max_y = WEB_MERCATOR_EXTENT - self.y as f64 * span;

        BoundingBox::new(min_x, max_y - span, min_x + span, max_y)
    }

    /// Whether x/y lie inside the grid at this zoom level.
    pub fn is_valid(&self) -> bool {
        let n = 2_u64.pow(self.z.min(32));
        (self.x as u64) < n && (self.y as u64) < n
    }
}

/// Ground resolution of the tile grid at a zoom level, meters per pixel.
pub fn resolution_at_zoom(z: u32) -> f64 {
    2.0 * WEB_MERCATOR_EXTENT / (TILE_SIZE as f64 * 2_f64.powi(z as i32))
}

/// Convert Web Mercator X (meters) to longitude (degrees).
pub fn mercator_x_to_lon(x: f64) -> f64 {
    x * 180.0 / WEB_MERCATOR_EXTENT
}

/// Convert Web Mercator Y (meters) to latitude (degrees).
pub fn mercator_y_to_lat(y: f64) -> f64 {
    let y_rad = y * PI / WEB_MERCATOR_EXTENT;
    (2.0 * y_rad.exp().atan() - PI / 2.0).to_degrees()
}

/// Convert longitude (degrees) to Web Mercator X (meters).
pub fn lon_to_mercator_x(lon: f64) -> f64 {
    lon * WEB_MERCATOR_EXTENT / 180.0
}

/// Convert latitude (degrees) to Web Mercator Y (meters).
///
/// Latitudes beyond the Web Mercator limit (~85.05°) are clamped.
pub fn lat_to_mercator_y(lat: f64) -> f64 {
    let lat = lat.clamp(-85.051_128_779_806_6, 85.051_128_779_806_6);
    let y_rad = (PI / 4.0 + lat.to_radians() / 2.0).tan().ln();
    y_rad * WEB_MERCATOR_EXTENT / PI
}

/// Derive the natural zoom range for a dataset.
///
/// `mercator_bounds` is the dataset extent in EPSG:3857 and `native_resolution`
/// its ground resolution in Mercator meters per pixel. `minzoom` is the last
/// zoom at which the dataset still fits a single tile; `maxzoom` is the first
/// zoom whose grid resolution reaches the native resolution.
pub fn zoom_range(mercator_bounds: &BoundingBox, native_resolution: f64) -> (u32, u32) {
    let world = 2.0 * WEB_MERCATOR_EXTENT;

    let size = mercator_bounds.width().max(mercator_bounds.height()).max(1e-9);
    let minzoom = (world / size).log2().floor().max(0.0) as u32;

    let maxzoom = if native_resolution > 0.0 {
        (world / (TILE_SIZE as f64 * native_resolution))
            .log2()
            .ceil()
            .max(0.0) as u32
    } else {
        minzoom
    };

    let minzoom = minzoom.min(24);
    let maxzoom = maxzoom.clamp(minzoom, 24);
    (minzoom, maxzoom)
}
