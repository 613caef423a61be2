//! In-memory raster source backing pipeline and handler tests.

use ndarray::{Array2, Array3};

use tiler_common::tile::{mercator_x_to_lon, mercator_y_to_lat};
use tiler_common::{BoundingBox, DataType, DatasetInfo, RasterWindow, TilerError, TilerResult};

use crate::RasterSource;

/// A synthetic raster gridded in EPSG:4326, held entirely in memory.
pub struct MemorySource {
    data: Array3<f64>,
    info: DatasetInfo,
}

impl MemorySource {
    /// Wrap a `(bands, height, width)` array covering `wgs84_bounds`.
    pub fn new(
        data: Array3<f64>,
        wgs84_bounds: BoundingBox,
        dtype: DataType,
        nodata: Option<f64>,
    ) -> Self {
        let (bands, height, width) = data.dim();
        let native_resolution = wgs84_bounds.width() / width as f64;
        let info = DatasetInfo {
            address: "memory://test".to_string(),
            epsg: 4326,
            native_bounds: wgs84_bounds,
            wgs84_bounds,
            width,
            height,
            band_count: bands,
            band_descriptions: (1..=bands).map(|i| (i, format!("band_{}", i))).collect(),
            dtype,
            nodata,
            native_resolution,
            overview_resolutions: Vec::new(),
        };
        Self { data, info }
    }

    /// A single-band gradient raster spanning the whole world, values
    /// increasing left to right from 0 to `max`.
    pub fn gradient(width: usize, height: usize, max: f64) -> Self {
        let data = Array3::from_shape_fn((1, height, width), |(_, _, x)| {
            max * x as f64 / (width - 1).max(1) as f64
        });
        Self::new(
            data,
            BoundingBox::new(-180.0, -85.0511, 180.0, 85.0511),
            DataType::Float64,
            None,
        )
    }

    /// A three-band uint8-valued raster spanning the whole world.
    pub fn rgb(width: usize, height: usize) -> Self {
        let data = Array3::from_shape_fn((3, height, width), |(b, y, x)| {
            ((b * 50 + x + y) % 256) as f64
        });
        Self::new(
            data,
            BoundingBox::new(-180.0, -85.0511, 180.0, 85.0511),
            DataType::UInt8,
            None,
        )
    }

    fn pixel_at(&self, lon: f64, lat: f64) -> Option<(usize, usize)> {
        let b = &self.info.wgs84_bounds;
        if !b.contains_point(lon, lat) {
            return None;
        }
        let px = ((lon - b.min_x) / b.width() * self.info.width as f64) as usize;
        let py = ((b.max_y - lat) / b.height() * self.info.height as f64) as usize;
        Some((
            px.min(self.info.width - 1),
            py.min(self.info.height - 1),
        ))
    }

    fn is_valid(&self, values: &[f64]) -> bool {
        match self.info.nodata {
            Some(nd) if nd.is_nan() => !values.iter().any(|v| v.is_nan()),
            Some(nd) => !values.iter().any(|v| *v == nd),
            None => true,
        }
    }
}

impl RasterSource for MemorySource {
    fn info(&self) -> &DatasetInfo {
        &self.info
    }

    fn read_mercator_window(
        &self,
        bounds: &BoundingBox,
        width: usize,
        height: usize,
    ) -> TilerResult<RasterWindow> {
        let bands = self.info.band_count;
        let mut data = Array3::<f64>::zeros((bands, height, width));
        let mut mask = Array2::<bool>::from_elem((height, width), false);

        let res_x = bounds.width() / width as f64;
        let res_y = bounds.height() / height as f64;
        for out_y in 0..height {
            let lat = mercator_y_to_lat(bounds.max_y - (out_y as f64 + 0.5) * res_y);
            for out_x in 0..width {
                let lon = mercator_x_to_lon(bounds.min_x + (out_x as f64 + 0.5) * res_x);
                let Some((px, py)) = self.pixel_at(lon, lat) else {
                    continue;
                };
                let values: Vec<f64> = (0..bands).map(|b| self.data[[b, py, px]]).collect();
                mask[[out_y, out_x]] = self.is_valid(&values);
                for (b, v) in values.into_iter().enumerate() {
                    data[[b, out_y, out_x]] = v;
                }
            }
        }

        Ok(RasterWindow {
            data,
            dtype: self.info.dtype,
            mask,
            bounds: *bounds,
        })
    }

    fn read_full(&self, max_size: usize) -> TilerResult<RasterWindow> {
        let max_dim = self.info.width.max(self.info.height).max(1);
        let f = (max_size.max(1) as f64 / max_dim as f64).min(1.0);
        let out_w = ((self.info.width as f64 * f).round() as usize).max(1);
        let out_h = ((self.info.height as f64 * f).round() as usize).max(1);

        let bands = self.info.band_count;
        let mut data = Array3::<f64>::zeros((bands, out_h, out_w));
        let mut mask = Array2::<bool>::from_elem((out_h, out_w), false);
        for out_y in 0..out_h {
            let py = (out_y * self.info.height / out_h).min(self.info.height - 1);
            for out_x in 0..out_w {
                let px = (out_x * self.info.width / out_w).min(self.info.width - 1);
                let values: Vec<f64> = (0..bands).map(|b| self.data[[b, py, px]]).collect();
                mask[[out_y, out_x]] = self.is_valid(&values);
                for (b, v) in values.into_iter().enumerate() {
                    data[[b, out_y, out_x]] = v;
                }
            }
        }

        Ok(RasterWindow {
            data,
            dtype: self.info.dtype,
            mask,
            bounds: self.info.native_bounds,
        })
    }

    fn sample_wgs84(&self, lon: f64, lat: f64) -> TilerResult<Vec<f64>> {
        let (px, py) = self.pixel_at(lon, lat).ok_or(TilerError::PointOutOfBounds)?;
        Ok((0..self.info.band_count)
            .map(|b| self.data[[b, py, px]])
            .collect())
    }
}
