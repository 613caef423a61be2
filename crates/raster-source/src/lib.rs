//! Remote raster access for the tile-rendering pipeline.
//!
//! The pipeline depends on the [`RasterSource`] trait only. The production
//! implementation is [`CogSource`], a partial-read Cloud-Optimized GeoTIFF
//! reader over HTTP range requests or local files; [`MemorySource`] backs
//! tests with synthetic rasters.

pub mod cog;
pub mod memory;
pub mod projection;
pub mod range_reader;

use std::sync::Arc;

use tiler_common::tile::{lat_to_mercator_y, lon_to_mercator_x, TILE_SIZE};
use tiler_common::{BoundingBox, DatasetInfo, RasterWindow, TileCoord, TilerError, TilerResult};

pub use cog::CogSource;
pub use memory::MemorySource;

/// A raster dataset opened for one request.
///
/// Implementations expose windowed reads resampled into the Web Mercator
/// tile grid, plus decimated whole-dataset reads for statistics.
pub trait RasterSource: Send + Sync {
    /// Dataset metadata, available without pixel reads.
    fn info(&self) -> &DatasetInfo;

    /// Read a window covering `bounds` (EPSG:3857 meters) resampled to
    /// `width` x `height` pixels. Pixels outside the dataset extent are
    /// masked invalid.
    fn read_mercator_window(
        &self,
        bounds: &BoundingBox,
        width: usize,
        height: usize,
    ) -> TilerResult<RasterWindow>;

    /// Read the whole dataset at a decimation chosen so the larger output
    /// dimension does not exceed `max_size`.
    fn read_full(&self, max_size: usize) -> TilerResult<RasterWindow>;

    /// Sample all data bands at a WGS84 coordinate.
    fn sample_wgs84(&self, lon: f64, lat: f64) -> TilerResult<Vec<f64>>;
}

/// Dataset extent in Web Mercator, derived from the WGS84 bounds.
pub fn mercator_extent(info: &DatasetInfo) -> BoundingBox {
    let b = &info.wgs84_bounds;
    BoundingBox::new(
        lon_to_mercator_x(b.min_x),
        lat_to_mercator_y(b.min_y),
        lon_to_mercator_x(b.max_x),
        lat_to_mercator_y(b.max_y),
    )
}

/// Read one XYZ tile: output is always `(tile_size * scale)` square.
///
/// Fails with `TileOutOfBounds` when the tile footprint does not intersect
/// the dataset extent.
pub fn read_tile(
    source: &dyn RasterSource,
    coord: TileCoord,
    scale: usize,
) -> TilerResult<RasterWindow> {
    if !coord.is_valid() {
        return Err(TilerError::InvalidParameter {
            param: "tile".into(),
            message: format!("{}/{}/{} outside the tile grid", coord.z, coord.x, coord.y),
        });
    }

    let bounds = coord.mercator_bounds();
    if !bounds.intersects(&mercator_extent(source.info())) {
        return Err(TilerError::TileOutOfBounds {
            z: coord.z,
            x: coord.x,
            y: coord.y,
        });
    }

    let size = TILE_SIZE * scale;
    source.read_mercator_window(&bounds, size, size)
}

/// Open a dataset by URL or local path.
pub fn open_url(url: &str) -> TilerResult<Arc<dyn RasterSource>> {
    Ok(Arc::new(CogSource::open(url)?))
}
