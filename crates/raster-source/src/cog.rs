//! Partial-read Cloud-Optimized GeoTIFF source.
//!
//! Opening a dataset reads only the IFD headers: raster geometry, data
//! type, the geotransform (ModelPixelScale + ModelTiepoint), GDAL nodata,
//! the GeoKey CRS code and the overview pyramid. Pixel reads then decode
//! only the chunks under the requested window, fetched as byte ranges.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use ndarray::{Array2, Array3};
use tiff::decoder::{Decoder, DecodingResult, Limits};
use tiff::tags::Tag;
use tracing::{debug, warn};

use tiler_common::{BoundingBox, DataType, DatasetInfo, RasterWindow, TilerError, TilerResult};

use crate::projection::CrsTransform;
use crate::range_reader::{create_range_reader, BlockCache, RangeCursor, RangeReader};
use crate::RasterSource;

const TAG_SAMPLE_FORMAT: u16 = 339;
const TAG_EXTRA_SAMPLES: u16 = 338;
const TAG_GEO_KEY_DIRECTORY: u16 = 34735;
const TAG_GDAL_NODATA: u16 = 42113;

const GEO_KEY_GEOGRAPHIC_TYPE: u16 = 2048;
const GEO_KEY_PROJECTED_CRS: u16 = 3072;

const SAMPLE_FORMAT_UINT: u32 = 1;
const SAMPLE_FORMAT_INT: u32 = 2;
const SAMPLE_FORMAT_FLOAT: u32 = 3;

/// One resolution level of the pyramid (the base image is level 0).
#[derive(Debug, Clone)]
struct Level {
    width: usize,
    height: usize,
    /// Ratio of base width to this level's width.
    scale: f64,
}

/// A COG opened for one request.
pub struct CogSource {
    reader: Arc<dyn RangeReader>,
    cache: BlockCache,
    info: DatasetInfo,
    levels: Vec<Level>,
    /// Samples per pixel including any alpha sample.
    samples_per_pixel: usize,
    /// Index of the alpha sample, if the file carries one.
    alpha_band: Option<usize>,
    /// Geotransform: world x of the left edge, world y of the top edge,
    /// pixel size at the base level.
    origin_x: f64,
    origin_y: f64,
    pixel_size_x: f64,
    pixel_size_y: f64,
}

impl CogSource {
    /// Open a dataset by URL or local path, reading metadata only.
    pub fn open(url: &str) -> TilerResult<Self> {
        let reader = create_range_reader(url)?;
        let cache: BlockCache = Arc::new(Mutex::new(HashMap::new()));

        let mut decoder = Decoder::new(RangeCursor::new(Arc::clone(&reader), Arc::clone(&cache)))
            .map_err(|e| TilerError::UnsupportedFormat(format!("{}: {}", url, e)))?
            .with_limits(Limits::unlimited());

        let (width_u32, height_u32) = decoder
            .dimensions()
            .map_err(|e| TilerError::UnsupportedFormat(format!("{}: {}", url, e)))?;
        let width = width_u32 as usize;
        let height = height_u32 as usize;

        let samples_per_pixel = decoder
            .get_tag_u32(Tag::SamplesPerPixel)
            .unwrap_or(1)
            .max(1) as usize;

        let bits_per_sample = decoder
            .get_tag_u32_vec(Tag::BitsPerSample)
            .ok()
            .and_then(|v| v.first().copied())
            .unwrap_or(8);
        let sample_format = decoder
            .get_tag_u32_vec(Tag::from_u16_exhaustive(TAG_SAMPLE_FORMAT))
            .ok()
            .and_then(|v| v.first().copied())
            .unwrap_or(SAMPLE_FORMAT_UINT);
        let dtype = detect_dtype(sample_format, bits_per_sample)
            .ok_or_else(|| {
                TilerError::UnsupportedFormat(format!(
                    "{}: sample format {} / {} bits",
                    url, sample_format, bits_per_sample
                ))
            })?;

        // An ExtraSamples entry marks the trailing sample as alpha.
        let has_alpha = decoder
            .get_tag_u32_vec(Tag::from_u16_exhaustive(TAG_EXTRA_SAMPLES))
            .map(|v| !v.is_empty())
            .unwrap_or(false)
            || samples_per_pixel == 4;
        let alpha_band = if has_alpha && samples_per_pixel > 1 {
            Some(samples_per_pixel - 1)
        } else {
            None
        };
        let band_count = samples_per_pixel - alpha_band.map(|_| 1).unwrap_or(0);

        let pixel_scale = decoder
            .get_tag_f64_vec(Tag::ModelPixelScaleTag)
            .map_err(|_| {
                TilerError::UnsupportedFormat(format!("{}: missing ModelPixelScale", url))
            })?;
        let tiepoint = decoder
            .get_tag_f64_vec(Tag::ModelTiepointTag)
            .map_err(|_| TilerError::UnsupportedFormat(format!("{}: missing ModelTiepoint", url)))?;
        if pixel_scale.len() < 2 || tiepoint.len() < 6 {
            return Err(TilerError::UnsupportedFormat(format!(
                "{}: malformed geotransform",
                url
            )));
        }
        let pixel_size_x = pixel_scale[0];
        let pixel_size_y = pixel_scale[1];
        let origin_x = tiepoint[3] - tiepoint[0] * pixel_size_x;
        let origin_y = tiepoint[4] + tiepoint[1] * pixel_size_y;

        let native_bounds = BoundingBox::new(
            origin_x,
            origin_y - height as f64 * pixel_size_y,
            origin_x + width as f64 * pixel_size_x,
            origin_y,
        );

        let epsg = decoder
            .get_tag_u32_vec(Tag::from_u16_exhaustive(TAG_GEO_KEY_DIRECTORY))
            .ok()
            .and_then(|keys| parse_geo_keys(&keys))
            .unwrap_or_else(|| {
                warn!(url, "no CRS GeoKey found, assuming EPSG:4326");
                4326
            });

        let nodata = decoder
            .get_tag_ascii_string(Tag::from_u16_exhaustive(TAG_GDAL_NODATA))
            .ok()
            .and_then(|s| parse_nodata(&s));

        let wgs84_bounds = CrsTransform::new(epsg, 4326)?.apply_bounds(&native_bounds)?;

        // Enumerate overview IFDs.
        let mut levels = vec![Level {
            width,
            height,
            scale: 1.0,
        }];
        while decoder.more_images() {
            decoder
                .next_image()
                .map_err(|e| TilerError::UnsupportedFormat(format!("{}: {}", url, e)))?;
            let (w, h) = decoder
                .dimensions()
                .map_err(|e| TilerError::UnsupportedFormat(format!("{}: {}", url, e)))?;
            levels.push(Level {
                width: w as usize,
                height: h as usize,
                scale: width as f64 / w as f64,
            });
        }

        let overview_resolutions = levels
            .iter()
            .skip(1)
            .map(|l| pixel_size_x * l.scale)
            .collect();

        debug!(
            url,
            width,
            height,
            bands = band_count,
            epsg,
            overviews = levels.len() - 1,
            "opened COG"
        );

        let info = DatasetInfo {
            address: url.to_string(),
            epsg,
            native_bounds,
            wgs84_bounds,
            width,
            height,
            band_count,
            band_descriptions: (1..=band_count).map(|i| (i, format!("band_{}", i))).collect(),
            dtype,
            nodata,
            native_resolution: pixel_size_x,
            overview_resolutions,
        };

        Ok(Self {
            reader,
            cache,
            info,
            levels,
            samples_per_pixel,
            alpha_band,
            origin_x,
            origin_y,
            pixel_size_x,
            pixel_size_y,
        })
    }

    fn select_level(&self, target_resolution: f64) -> usize {
        let resolutions: Vec<f64> = self
            .levels
            .iter()
            .map(|l| self.pixel_size_x * l.scale)
            .collect();
        pick_level(&resolutions, target_resolution)
    }

    fn decoder_at_level(&self, level: usize) -> TilerResult<Decoder<RangeCursor>> {
        let cursor = RangeCursor::new(Arc::clone(&self.reader), Arc::clone(&self.cache));
        let mut decoder = Decoder::new(cursor)
            .map_err(|e| TilerError::Internal(format!("reopen: {}", e)))?
            .with_limits(Limits::unlimited());
        for _ in 0..level {
            decoder
                .next_image()
                .map_err(|e| TilerError::Internal(format!("overview seek: {}", e)))?;
        }
        Ok(decoder)
    }

    /// Decode the chunks intersecting a pixel rect of one level and sample
    /// nearest-neighbour through `for_each_output`, which maps output
    /// pixels to level pixel coordinates.
    fn sample_level<F>(
        &self,
        level_idx: usize,
        out_width: usize,
        out_height: usize,
        mut level_pixel_for: F,
    ) -> TilerResult<(Array3<f64>, Array2<bool>)>
    where
        F: FnMut(usize, usize) -> TilerResult<Option<(f64, f64)>>,
    {
        let level = &self.levels[level_idx];
        let mut decoder = self.decoder_at_level(level_idx)?;
        let (chunk_w_u32, chunk_h_u32) = decoder.chunk_dimensions();
        let chunk_w = chunk_w_u32.max(1) as usize;
        let chunk_h = chunk_h_u32.max(1) as usize;
        let chunks_across = level.width.div_ceil(chunk_w);
        let chunks_down = level.height.div_ceil(chunk_h);

        let spp = self.samples_per_pixel;
        let bands = self.info.band_count;

        let mut data = Array3::<f64>::zeros((bands, out_height, out_width));
        let mut mask = Array2::<bool>::from_elem((out_height, out_width), false);

        // Chunks decoded on first touch; request-scoped.
        let mut chunks: HashMap<usize, Option<(Vec<f64>, usize)>> = HashMap::new();

        for out_y in 0..out_height {
            for out_x in 0..out_width {
                let Some((px_f, py_f)) = level_pixel_for(out_x, out_y)? else {
                    continue;
                };
                if px_f < 0.0 || py_f < 0.0 {
                    continue;
                }
                let px = px_f as usize;
                let py = py_f as usize;
                if px >= level.width || py >= level.height {
                    continue;
                }

                let chunk_col = px / chunk_w;
                let chunk_row = py / chunk_h;
                let chunk_idx = chunk_row * chunks_across + chunk_col;
                if chunk_row >= chunks_down {
                    continue;
                }

                let entry = match chunks.entry(chunk_idx) {
                    std::collections::hash_map::Entry::Occupied(e) => e.into_mut(),
                    std::collections::hash_map::Entry::Vacant(e) => {
                        let (dw, _dh) = decoder.chunk_data_dimensions(chunk_idx as u32);
                        let decoded = decoder
                            .read_chunk(chunk_idx as u32)
                            .map_err(|err| {
                                TilerError::Internal(format!("chunk {}: {}", chunk_idx, err))
                            })
                            .map(decode_to_f64)?;
                        e.insert(Some((decoded, dw as usize)))
                    }
                };
                let Some((chunk_data, data_w)) = entry.as_ref() else {
                    continue;
                };

                let local_x = px % chunk_w;
                let local_y = py % chunk_h;
                if local_x >= *data_w {
                    continue;
                }
                let base = (local_y * data_w + local_x) * spp;
                if base + spp > chunk_data.len() {
                    continue;
                }

                let mut valid = true;
                if let Some(alpha) = self.alpha_band {
                    valid = chunk_data[base + alpha] > 0.0;
                }
                for b in 0..bands {
                    data[[b, out_y, out_x]] = chunk_data[base + b];
                }
                mask[[out_y, out_x]] = valid;
            }
        }

        Ok((data, mask))
    }

    /// World coordinate (native CRS) to base-level pixel.
    fn world_to_pixel(&self, x: f64, y: f64, level_scale: f64) -> (f64, f64) {
        let px = (x - self.origin_x) / (self.pixel_size_x * level_scale);
        let py = (self.origin_y - y) / (self.pixel_size_y * level_scale);
        (px, py)
    }
}

impl RasterSource for CogSource {
    fn info(&self) -> &DatasetInfo {
        &self.info
    }

    fn read_mercator_window(
        &self,
        bounds: &BoundingBox,
        width: usize,
        height: usize,
    ) -> TilerResult<RasterWindow> {
        let transform = CrsTransform::new(3857, self.info.epsg)?;
        let native_window = transform.apply_bounds(bounds)?;

        let target_res = (native_window.width() / width as f64)
            .max(native_window.height() / height as f64);
        let level_idx = self.select_level(target_res);
        let level_scale = self.levels[level_idx].scale;

        let res_x = bounds.width() / width as f64;
        let res_y = bounds.height() / height as f64;

        let (data, mask) = self.sample_level(level_idx, width, height, |out_x, out_y| {
            let merc_x = bounds.min_x + (out_x as f64 + 0.5) * res_x;
            let merc_y = bounds.max_y - (out_y as f64 + 0.5) * res_y;
            let (wx, wy) = transform.apply(merc_x, merc_y)?;
            Ok(Some(self.world_to_pixel(wx, wy, level_scale)))
        })?;

        Ok(RasterWindow {
            data,
            dtype: self.info.dtype,
            mask,
            bounds: native_window,
        })
    }

    fn read_full(&self, max_size: usize) -> TilerResult<RasterWindow> {
        let max_size = max_size.max(1);

        // Finest level that already fits; otherwise decimate the coarsest.
        let mut level_idx = self.levels.len() - 1;
        for (idx, level) in self.levels.iter().enumerate() {
            if level.width.max(level.height) <= max_size {
                level_idx = idx;
                break;
            }
        }
        let level = self.levels[level_idx].clone();

        let max_dim = level.width.max(level.height);
        let f = (max_size as f64 / max_dim as f64).min(1.0);
        let out_w = ((level.width as f64 * f).round() as usize).max(1);
        let out_h = ((level.height as f64 * f).round() as usize).max(1);

        let sx = level.width as f64 / out_w as f64;
        let sy = level.height as f64 / out_h as f64;
        let (data, mask) = self.sample_level(level_idx, out_w, out_h, |out_x, out_y| {
            Ok(Some(((out_x as f64 + 0.5) * sx, (out_y as f64 + 0.5) * sy)))
        })?;

        Ok(RasterWindow {
            data,
            dtype: self.info.dtype,
            mask,
            bounds: self.info.native_bounds,
        })
    }

    fn sample_wgs84(&self, lon: f64, lat: f64) -> TilerResult<Vec<f64>> {
        let (x, y) = CrsTransform::new(4326, self.info.epsg)?.apply(lon, lat)?;
        if !self.info.native_bounds.contains_point(x, y) {
            return Err(TilerError::PointOutOfBounds);
        }

        let (px, py) = self.world_to_pixel(x, y, 1.0);
        let (data, mask) = self.sample_level(0, 1, 1, |_, _| Ok(Some((px, py))))?;
        if !mask[[0, 0]] {
            return Err(TilerError::PointOutOfBounds);
        }
        Ok((0..self.info.band_count).map(|b| data[[b, 0, 0]]).collect())
    }
}

/// Pick the pyramid level for a target resolution: the lowest-resolution
/// level that is still at least as fine as the target. The base image
/// (index 0) is used when the target outresolves every level.
fn pick_level(level_resolutions: &[f64], target_resolution: f64) -> usize {
    let mut best = 0;
    for (idx, &res) in level_resolutions.iter().enumerate() {
        if res <= target_resolution + 1e-12 {
            best = idx;
        }
    }
    best
}

fn detect_dtype(sample_format: u32, bits: u32) -> Option<DataType> {
    match (sample_format, bits) {
        (SAMPLE_FORMAT_UINT, 8) => Some(DataType::UInt8),
        (SAMPLE_FORMAT_UINT, 16) => Some(DataType::UInt16),
        (SAMPLE_FORMAT_UINT, 32) => Some(DataType::UInt32),
        (SAMPLE_FORMAT_INT, 8) => Some(DataType::Int8),
        (SAMPLE_FORMAT_INT, 16) => Some(DataType::Int16),
        (SAMPLE_FORMAT_INT, 32) => Some(DataType::Int32),
        (SAMPLE_FORMAT_FLOAT, 32) => Some(DataType::Float32),
        (SAMPLE_FORMAT_FLOAT, 64) => Some(DataType::Float64),
        _ => None,
    }
}

/// Extract the CRS EPSG code from a GeoKeyDirectory: the projected CRS key
/// wins over the geographic one.
fn parse_geo_keys(keys: &[u32]) -> Option<u32> {
    let mut geographic = None;
    let mut projected = None;

    // Header is 4 shorts, then 4-short entries: key, location, count, value.
    for entry in keys[4.min(keys.len())..].chunks_exact(4) {
        let key = entry[0] as u16;
        let location = entry[1];
        let value = entry[3];
        if location != 0 {
            continue;
        }
        match key {
            GEO_KEY_PROJECTED_CRS if value != 32767 => projected = Some(value),
            GEO_KEY_GEOGRAPHIC_TYPE if value != 32767 => geographic = Some(value),
            _ => {}
        }
    }

    projected.or(geographic)
}

fn parse_nodata(s: &str) -> Option<f64> {
    let trimmed = s.trim().trim_end_matches('\0').trim();
    if trimmed.eq_ignore_ascii_case("nan") {
        return Some(f64::NAN);
    }
    trimmed.parse().ok()
}

fn decode_to_f64(result: DecodingResult) -> Vec<f64> {
    match result {
        DecodingResult::U8(data) => data.into_iter().map(f64::from).collect(),
        DecodingResult::U16(data) => data.into_iter().map(f64::from).collect(),
        DecodingResult::U32(data) => data.into_iter().map(f64::from).collect(),
        DecodingResult::U64(data) => data.into_iter().map(|v| v as f64).collect(),
        DecodingResult::I8(data) => data.into_iter().map(f64::from).collect(),
        DecodingResult::I16(data) => data.into_iter().map(f64::from).collect(),
        DecodingResult::I32(data) => data.into_iter().map(f64::from).collect(),
        DecodingResult::I64(data) => data.into_iter().map(|v| v as f64).collect(),
        DecodingResult::F32(data) => data.into_iter().map(f64::from).collect(),
        DecodingResult::F64(data) => data,
        _ => Vec::new(),
    }
}
