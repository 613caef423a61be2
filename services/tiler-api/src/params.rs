//! Query-string and tile-path parameter parsing.

use render_pipeline::{bands, color, encode::Format, mask, RenderOptions};
use tiler_common::{TilerError, TilerResult};

pub const MAX_TILE_SCALE: usize = 4;

/// Look up a single query value by key.
pub fn find<'a>(pairs: &'a [(String, String)], key: &str) -> Option<&'a str> {
    pairs
        .iter()
        .find(|(k, _)| k == key)
        .map(|(_, v)| v.as_str())
}

/// The `url` parameter, required on every dataset endpoint.
pub fn require_url(pairs: &[(String, String)]) -> TilerResult<String> {
    find(pairs, "url")
        .filter(|v| !v.is_empty())
        .map(str::to_string)
        .ok_or_else(|| TilerError::MissingParameter("url".into()))
}

fn parse_typed<T: std::str::FromStr>(pairs: &[(String, String)], key: &str) -> TilerResult<Option<T>> {
    match find(pairs, key) {
        None => Ok(None),
        Some(raw) => raw.parse().map(Some).map_err(|_| TilerError::InvalidParameter {
            param: key.into(),
            message: format!("'{}' could not be parsed", raw),
        }),
    }
}

/// Rendering options for a tile request. `indexes` and `expr` exclusivity
/// is enforced in the pipeline.
pub fn render_options(
    pairs: &[(String, String)],
    format: Option<Format>,
) -> TilerResult<RenderOptions> {
    let indexes = find(pairs, "indexes")
        .map(bands::parse_indexes)
        .transpose()?;
    let nodata = find(pairs, "nodata").map(mask::parse_nodata).transpose()?;

    // Accepted for URL compatibility; the engine resamples nearest-only.
    if let Some(method) = find(pairs, "resampling_method").or_else(|| find(pairs, "resampling")) {
        if !matches!(method, "nearest" | "bilinear") {
            return Err(TilerError::InvalidParameter {
                param: "resampling_method".into(),
                message: format!("unsupported resampling '{}'", method),
            });
        }
    }

    let rescale_values: Vec<String> = pairs
        .iter()
        .filter(|(k, _)| k == "rescale")
        .map(|(_, v)| v.clone())
        .collect();
    let rescale = if rescale_values.is_empty() {
        None
    } else {
        Some(color::parse_rescale(&rescale_values)?)
    };

    Ok(RenderOptions {
        indexes,
        expression: find(pairs, "expr").map(str::to_string),
        nodata,
        rescale,
        color_formula: find(pairs, "color_formula").map(str::to_string),
        color_map: find(pairs, "color_map").map(str::to_string),
        format,
    })
}

/// Parse the final tile path segment, `{y}[@{scale}x][.{ext}]`.
pub fn parse_y_segment(segment: &str) -> TilerResult<(u32, usize, Option<Format>)> {
    let invalid = |message: String| TilerError::InvalidParameter {
        param: "y".into(),
        message,
    };

    let (rest, format) = match segment.split_once('.') {
        Some((rest, ext)) => (rest, Some(Format::from_ext(ext)?)),
        None => (segment, None),
    };

    let (y_raw, scale) = match rest.split_once('@') {
        Some((y_raw, scale_raw)) => {
            let scale: usize = scale_raw
                .strip_suffix('x')
                .and_then(|s| s.parse().ok())
                .ok_or_else(|| invalid(format!("malformed scale suffix '@{}'", scale_raw)))?;
            if scale == 0 || scale > MAX_TILE_SCALE {
                return Err(invalid(format!(
                    "scale must be between 1 and {}",
                    MAX_TILE_SCALE
                )));
            }
            (y_raw, scale)
        }
        None => (rest, 1),
    };

    let y = y_raw
        .parse()
        .map_err(|_| invalid(format!("'{}' is not a tile row", y_raw)))?;
    Ok((y, scale, format))
}

/// Statistics parameters for `/metadata`.
pub struct MetadataParams {
    pub percentiles: (f64, f64),
    pub nodata: Option<f64>,
    pub indexes: Option<Vec<usize>>,
    pub max_size: usize,
    pub histogram_bins: usize,
    pub histogram_range: Option<(f64, f64)>,
}

pub fn metadata_params(pairs: &[(String, String)]) -> TilerResult<MetadataParams> {
    let pmin = parse_typed(pairs, "pmin")?.unwrap_or(render_pipeline::stats::DEFAULT_PERCENTILES.0);
    let pmax = parse_typed(pairs, "pmax")?.unwrap_or(render_pipeline::stats::DEFAULT_PERCENTILES.1);

    let histogram_range = match find(pairs, "histogram_range") {
        None => None,
        Some(raw) => {
            let parts: Vec<&str> = raw.split(',').collect();
            let parsed: Option<(f64, f64)> = match parts.as_slice() {
                [lo, hi] => lo.trim().parse().ok().zip(hi.trim().parse().ok()),
                _ => None,
            };
            Some(parsed.ok_or_else(|| TilerError::InvalidParameter {
                param: "histogram_range".into(),
                message: format!("'{}' is not a min,max pair", raw),
            })?)
        }
    };

    Ok(MetadataParams {
        percentiles: (pmin, pmax),
        nodata: find(pairs, "nodata").map(mask::parse_nodata).transpose()?,
        indexes: find(pairs, "indexes").map(bands::parse_indexes).transpose()?,
        max_size: parse_typed(pairs, "max_size")?
            .unwrap_or(render_pipeline::stats::DEFAULT_MAX_SIZE),
        histogram_bins: parse_typed(pairs, "histogram_bins")?
            .unwrap_or(render_pipeline::stats::DEFAULT_HISTOGRAM_BINS),
        histogram_range,
    })
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
    fn test_y_segment_plain() {
        assert_eq!(parse_y_segment("5").unwrap(), (5, 1, None));
    }

    #[test]
    fn test_y_segment_full() {
        let (y, scale, format) = parse_y_segment("10@2x.png").unwrap();
        assert_eq!((y, scale), (10, 2));
        assert_eq!(format, Some(Format::Png));
    }

    #[test]
    fn test_y_segment_ext_only() {
        let (y, scale, format) = parse_y_segment("7.webp").unwrap();
        assert_eq!((y, scale), (7, 1));
        assert_eq!(format, Some(Format::WebP));
    }

    #[test]
    fn test_y_segment_rejects_bad_scale() {
        assert!(parse_y_segment("5@0x").is_err());
        assert!(parse_y_segment("5@9x").is_err());
        assert!(parse_y_segment("5@twox.png").is_err());
    }

    #[test]
    fn test_y_segment_rejects_unknown_ext() {
        assert!(parse_y_segment("5.gif").is_err());
    }

    #[test]
    fn test_url_required() {
        assert!(require_url(&pairs(&[("nodata", "0")])).is_err());
        assert_eq!(
            require_url(&pairs(&[("url", "http://x/y.tif")])).unwrap(),
            "http://x/y.tif"
        );
    }

    #[test]
    fn test_render_options_repeated_rescale() {
        let p = pairs(&[
            ("url", "x"),
            ("rescale", "0,100"),
            ("rescale", "0,50"),
            ("expr", "b1"),
        ]);
        let options = render_options(&p, None).unwrap();
        assert_eq!(options.rescale.unwrap(), vec![(0.0, 100.0), (0.0, 50.0)]);
        assert_eq!(options.expression.as_deref(), Some("b1"));
    }

    #[test]
    fn test_resampling_validation() {
        assert!(render_options(&pairs(&[("resampling_method", "nearest")]), None).is_ok());
        assert!(render_options(&pairs(&[("resampling_method", "cubic")]), None).is_err());
    }

    #[test]
    fn test_metadata_defaults() {
        let m = metadata_params(&pairs(&[("url", "x")])).unwrap();
        assert_eq!(m.percentiles, (2.0, 98.0));
        assert_eq!(m.histogram_bins, 20);
        assert_eq!(m.max_size, 1024);
    }

    #[test]
    fn test_metadata_overrides() {
        let m = metadata_params(&pairs(&[
            ("pmin", "5"),
            ("pmax", "95"),
            ("histogram_bins", "10"),
            ("histogram_range", "0,1000"),
        ]))
        .unwrap();
        assert_eq!(m.percentiles, (5.0, 95.0));
        assert_eq!(m.histogram_bins, 10);
        assert_eq!(m.histogram_range, Some((0.0, 1000.0)));
    }
}
