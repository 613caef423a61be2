//! Raster windows and dataset metadata.

use crate::BoundingBox;
use ndarray::{Array2, Array3};
use serde::Serialize;

/// Pixel data type of the source raster, detected from TIFF tags.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum DataType {
    UInt8,
    UInt16,
    UInt32,
    Int8,
    Int16,
    Int32,
    Float32,
    Float64,
}

impl DataType {
    /// Whether the type is floating point (nodata comparisons use a
    /// tolerance, NaN is representable).
    pub fn is_float(&self) -> bool {
        matches!(self, DataType::Float32 | DataType::Float64)
    }
}

/// A windowed read result: pixel data plus validity mask.
///
/// `data` has shape (bands, height, width). `mask` has shape
/// (height, width); `true` marks a valid pixel. Owned exclusively by the
/// request that produced it.
#[derive(Debug, Clone)]
pub struct RasterWindow {
    pub data: Array3<f64>,
    pub dtype: DataType,
    pub mask: Array2<bool>,
    pub bounds: BoundingBox,
}

impl RasterWindow {
    pub fn bands(&self) -> usize {
        self.data.dim().0
    }

    pub fn height(&self) -> usize {
        self.data.dim().1
    }

    pub fn width(&self) -> usize {
        self.data.dim().2
    }

    /// True when every pixel is valid.
    pub fn fully_valid(&self) -> bool {
        self.mask.iter().all(|&v| v)
    }

    /// Count of valid pixels.
    pub fn valid_count(&self) -> usize {
        self.mask.iter().filter(|&&v| v).count()
    }
}

/// Static dataset metadata, produced by the raster adapter without pixel
/// reads.
#[derive(Debug, Clone)]
pub struct DatasetInfo {
    /// Source URL or path the dataset was opened from.
    pub address: String,
    /// EPSG code of the native CRS.
    pub epsg: u32,
    /// Extent in the native CRS.
    pub native_bounds: BoundingBox,
    /// Extent in WGS84 (lon/lat degrees).
    pub wgs84_bounds: BoundingBox,
    /// Full-resolution raster size in pixels.
    pub width: usize,
    pub height: usize,
    /// Number of data bands (alpha excluded).
    pub band_count: usize,
    /// Band descriptions, 1-based ids with names.
    pub band_descriptions: Vec<(usize, String)>,
    pub dtype: DataType,
    /// Nodata value declared by the dataset, if any.
    pub nodata: Option<f64>,
    /// Ground resolution in native CRS units per pixel at full resolution.
    pub native_resolution: f64,
    /// Resolutions of the overview levels, coarsest last, same units.
    pub overview_resolutions: Vec<f64>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::{Array2, Array3};

    fn window(mask: Array2<bool>) -> RasterWindow {
        let (h, w) = mask.dim();
        RasterWindow {
            data: Array3::zeros((1, h, w)),
            dtype: DataType::UInt8,
            mask,
            bounds: BoundingBox::new(0.0, 0.0, 1.0, 1.0),
        }
    }

    #[test]
    fn test_validity_helpers() {
        let all = window(Array2::from_elem((2, 2), true));
        assert!(all.fully_valid());
        assert_eq!(all.valid_count(), 4);

        let mut mask = Array2::from_elem((2, 2), true);
        mask[[0, 1]] = false;
        let partial = window(mask);
        assert!(!partial.fully_valid());
        assert_eq!(partial.valid_count(), 3);
    }

    #[test]
    fn test_dtype_floatness() {
        assert!(DataType::Float32.is_float());
        assert!(!DataType::UInt16.is_float());
    }
}
