//! Color maps: named perceptual palettes and explicit class maps.

use std::collections::HashMap;

use ndarray::{Array2, Array3};
use serde_json::Value;

use tiler_common::{TilerError, TilerResult};

/// A resolved color map applied to a single-band u8 array.
pub enum ColorMap {
    /// 256-entry continuous palette indexed by pixel value.
    Palette(Box<[[u8; 4]; 256]>),
    /// Discrete class map; unmapped classes render fully transparent.
    Discrete(HashMap<u8, [u8; 4]>),
}

/// Anchor stops for the named palettes, interpolated to 256 entries.
const VIRIDIS: &[[u8; 3]] = &[
    [68, 1, 84],
    [72, 40, 120],
    [62, 74, 137],
    [49, 104, 142],
    [38, 130, 142],
    [31, 158, 137],
    [53, 183, 121],
    [109, 205, 89],
    [180, 222, 44],
    [253, 231, 37],
];

const PLASMA: &[[u8; 3]] = &[
    [13, 8, 135],
    [84, 2, 163],
    [139, 10, 165],
    [185, 50, 137],
    [219, 92, 104],
    [244, 136, 73],
    [254, 188, 43],
    [240, 249, 33],
];

const INFERNO: &[[u8; 3]] = &[
    [0, 0, 4],
    [40, 11, 84],
    [101, 21, 110],
    [159, 42, 99],
    [212, 72, 66],
    [245, 125, 21],
    [250, 193, 39],
    [252, 255, 164],
];

const MAGMA: &[[u8; 3]] = &[
    [0, 0, 4],
    [28, 16, 68],
    [79, 18, 123],
    [129, 37, 129],
    [181, 54, 122],
    [229, 80, 100],
    [251, 135, 97],
    [254, 194, 135],
    [252, 253, 191],
];

const GREYS: &[[u8; 3]] = &[[0, 0, 0], [255, 255, 255]];

fn interpolate_palette(stops: &[[u8; 3]]) -> Box<[[u8; 4]; 256]> {
    let mut palette = Box::new([[0u8, 0, 0, 255]; 256]);
    let segments = (stops.len() - 1) as f64;
    for (i, entry) in palette.iter_mut().enumerate() {
        let t = i as f64 / 255.0 * segments;
        let lo = (t as usize).min(stops.len() - 2);
        let frac = t - lo as f64;
        for c in 0..3 {
            let a = stops[lo][c] as f64;
            let b = stops[lo + 1][c] as f64;
            entry[c] = (a + (b - a) * frac).round() as u8;
        }
    }
    palette
}

fn parse_discrete(raw: &str) -> TilerResult<ColorMap> {
    let value: Value = serde_json::from_str(raw)
        .map_err(|e| TilerError::InvalidColorMap(format!("not valid JSON: {}", e)))?;
    let Value::Object(entries) = value else {
        return Err(TilerError::InvalidColorMap("expected a JSON object".into()));
    };

    let mut map = HashMap::new();
    for (key, rgba) in entries {
        let class: u8 = key.parse().map_err(|_| {
            TilerError::InvalidColorMap(format!("class '{}' is not a 0-255 integer", key))
        })?;
        let components: Vec<u8> = rgba
            .as_array()
            .map(|arr| {
                arr.iter()
                    .filter_map(|v| v.as_u64())
                    .filter(|v| *v <= 255)
                    .map(|v| v as u8)
                    .collect()
            })
            .unwrap_or_default();
        let [r, g, b, a] = components.as_slice() else {
            return Err(TilerError::InvalidColorMap(format!(
                "class {} must map to [r, g, b, a]",
                class
            )));
        };
        map.insert(class, [*r, *g, *b, *a]);
    }
    Ok(ColorMap::Discrete(map))
}

/// Resolve a `color_map` parameter: a JSON class map or a palette name.
pub fn parse_color_map(raw: &str) -> TilerResult<ColorMap> {
    let trimmed = raw.trim();
    if trimmed.starts_with('{') {
        return parse_discrete(trimmed);
    }
    let stops = match trimmed.to_ascii_lowercase().as_str() {
        "viridis" => VIRIDIS,
        "plasma" => PLASMA,
        "inferno" => INFERNO,
        "magma" => MAGMA,
        "greys" | "grays" => GREYS,
        other => {
            return Err(TilerError::InvalidColorMap(format!(
                "unknown color map '{}'",
                other
            )))
        }
    };
    Ok(ColorMap::Palette(interpolate_palette(stops)))
}

/// Apply a color map to a single-band array, producing RGBA. Classes absent
/// from a discrete map come out transparent and masked.
pub fn apply_color_map(
    data: &Array3<u8>,
    mask: &Array2<bool>,
    color_map: &ColorMap,
) -> TilerResult<(Array3<u8>, Array2<bool>)> {
    let (bands, height, width) = data.dim();
    if bands != 1 {
        return Err(TilerError::ColorMapBandMismatch(bands));
    }

    let mut out = Array3::<u8>::zeros((4, height, width));
    let mut out_mask = mask.clone();
    for y in 0..height {
        for x in 0..width {
            let rgba = match color_map {
                ColorMap::Palette(palette) => palette[data[[0, y, x]] as usize],
                ColorMap::Discrete(map) => match map.get(&data[[0, y, x]]) {
                    Some(rgba) => *rgba,
                    None => {
                        out_mask[[y, x]] = false;
                        [0, 0, 0, 0]
                    }
                },
            };
            for (c, v) in rgba.into_iter().enumerate() {
                out[[c, y, x]] = v;
            }
        }
    }
    Ok((out, out_mask))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_palette_endpoints() {
        let ColorMap::Palette(p) = parse_color_map("viridis").unwrap() else {
            panic!("expected palette");
        };
        assert_eq!(&p[0][..3], &[68, 1, 84]);
        assert_eq!(&p[255][..3], &[253, 231, 37]);
        assert_eq!(p[0][3], 255);
    }

    #[test]
    fn test_greys_ramp() {
        let ColorMap::Palette(p) = parse_color_map("greys").unwrap() else {
            panic!("expected palette");
        };
        assert_eq!(&p[0][..3], &[0, 0, 0]);
        assert_eq!(&p[128][..3], &[128, 128, 128]);
        assert_eq!(&p[255][..3], &[255, 255, 255]);
    }

    #[test]
    fn test_unknown_name() {
        assert!(matches!(
            parse_color_map("sunset"),
            Err(TilerError::InvalidColorMap(_))
        ));
    }

    #[test]
    fn test_discrete_classes() {
        let cmap = parse_color_map(r#"{"1":[255,0,0,255],"2":[0,255,0,255]}"#).unwrap();
        let data = Array3::from_shape_fn((1, 1, 3), |(_, _, x)| x as u8);
        let mask = Array2::from_elem((1, 3), true);
        let (out, out_mask) = apply_color_map(&data, &mask, &cmap).unwrap();

        // class 0 unmapped -> transparent and masked
        assert_eq!(out[[3, 0, 0]], 0);
        assert!(!out_mask[[0, 0]]);
        // class 1 -> opaque red
        assert_eq!(out[[0, 0, 1]], 255);
        assert_eq!(out[[3, 0, 1]], 255);
        assert!(out_mask[[0, 1]]);
        // class 2 -> opaque green
        assert_eq!(out[[1, 0, 2]], 255);
    }

    #[test]
    fn test_bad_json() {
        assert!(parse_color_map(r#"{"300":[1,2,3,4]}"#).is_err());
        assert!(parse_color_map(r#"{"1":[1,2,3]}"#).is_err());
        assert!(parse_color_map("{broken").is_err());
    }

    #[test]
    fn test_multiband_rejected() {
        let cmap = parse_color_map("viridis").unwrap();
        let data = Array3::zeros((3, 1, 1));
        let mask = Array2::from_elem((1, 1), true);
        assert!(matches!(
            apply_color_map(&data, &mask, &cmap),
            Err(TilerError::ColorMapBandMismatch(3))
        ));
    }
}
