//! Coordinate transforms between the tile grid CRS and dataset CRSs.
//!
//! Web Mercator and WGS84 get closed-form fast paths; everything else goes
//! through proj4rs with proj strings from the crs-definitions database.

use proj4rs::proj::Proj;
use proj4rs::transform::transform;
use tiler_common::tile::{
    lat_to_mercator_y, lon_to_mercator_x, mercator_x_to_lon, mercator_y_to_lat,
};
use tiler_common::{BoundingBox, TilerError, TilerResult};

/// Get the PROJ4 string for an EPSG code.
pub fn proj_string(epsg: u32) -> Option<&'static str> {
    u16::try_from(epsg)
        .ok()
        .and_then(crs_definitions::from_code)
        .map(|def| def.proj4)
}

/// Whether an EPSG code is a geographic (lon/lat degrees) CRS.
pub fn is_geographic(epsg: u32) -> bool {
    match proj_string(epsg) {
        Some(s) => s.contains("+proj=longlat"),
        None => epsg == 4326,
    }
}

/// A transform from one CRS to another, chosen once per request.
pub enum CrsTransform {
    /// Same CRS on both sides.
    Identity,
    /// EPSG:3857 -> EPSG:4326
    MercToGeo,
    /// EPSG:4326 -> EPSG:3857
    GeoToMerc,
    /// General case via proj4rs.
    Proj {
        source: Proj,
        target: Proj,
        source_geographic: bool,
        target_geographic: bool,
    },
}

impl CrsTransform {
    pub fn new(source_epsg: u32, target_epsg: u32) -> TilerResult<Self> {
        match (source_epsg, target_epsg) {
            (s, t) if s == t => Ok(CrsTransform::Identity),
            (3857, 4326) => Ok(CrsTransform::MercToGeo),
            (4326, 3857) => Ok(CrsTransform::GeoToMerc),
            (s, t) => {
                let source_str = proj_string(s).ok_or_else(|| {
                    TilerError::UnsupportedFormat(format!("unsupported CRS EPSG:{}", s))
                })?;
                let target_str = proj_string(t).ok_or_else(|| {
                    TilerError::UnsupportedFormat(format!("unsupported CRS EPSG:{}", t))
                })?;
                let source = Proj::from_proj_string(source_str).map_err(|e| {
                    TilerError::Internal(format!("EPSG:{} projection: {:?}", s, e))
                })?;
                let target = Proj::from_proj_string(target_str).map_err(|e| {
                    TilerError::Internal(format!("EPSG:{} projection: {:?}", t, e))
                })?;
                Ok(CrsTransform::Proj {
                    source,
                    target,
                    source_geographic: is_geographic(s),
                    target_geographic: is_geographic(t),
                })
            }
        }
    }

    /// Transform a single coordinate.
    pub fn apply(&self, x: f64, y: f64) -> TilerResult<(f64, f64)> {
        match self {
            CrsTransform::Identity => Ok((x, y)),
            CrsTransform::MercToGeo => Ok((mercator_x_to_lon(x), mercator_y_to_lat(y))),
            CrsTransform::GeoToMerc => Ok((lon_to_mercator_x(x), lat_to_mercator_y(y))),
            CrsTransform::Proj {
                source,
                target,
                source_geographic,
                target_geographic,
            } => {
                let mut point = if *source_geographic {
                    (x.to_radians(), y.to_radians(), 0.0)
                } else {
                    (x, y, 0.0)
                };
                transform(source, target, &mut point)
                    .map_err(|e| TilerError::Internal(format!("transform failed: {:?}", e)))?;
                if *target_geographic {
                    Ok((point.0.to_degrees(), point.1.to_degrees()))
                } else {
                    Ok((point.0, point.1))
                }
            }
        }
    }

    /// Transform a bounding box by sampling its corners and edge midpoints.
    pub fn apply_bounds(&self, bounds: &BoundingBox) -> TilerResult<BoundingBox> {
        if matches!(self, CrsTransform::Identity) {
            return Ok(*bounds);
        }

        let (cx, cy) = bounds.center();
        let samples = [
            (bounds.min_x, bounds.min_y),
            (bounds.min_x, bounds.max_y),
            (bounds.max_x, bounds.min_y),
            (bounds.max_x, bounds.max_y),
            (cx, bounds.min_y),
            (cx, bounds.max_y),
            (bounds.min_x, cy),
            (bounds.max_x, cy),
        ];

        let mut min_x = f64::INFINITY;
        let mut min_y = f64::INFINITY;
        let mut max_x = f64::NEG_INFINITY;
        let mut max_y = f64::NEG_INFINITY;
        for (x, y) in samples {
            let (tx, ty) = self.apply(x, y)?;
            min_x = min_x.min(tx);
            min_y = min_y.min(ty);
            max_x = max_x.max(tx);
            max_y = max_y.max(ty);
        }

        Ok(BoundingBox::new(min_x, min_y, max_x, max_y))
    }
}
