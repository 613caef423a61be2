//! Color-correction formula DSL.
//!
//! A formula is a comma-separated chain of operations applied to an RGB
//! array, values normalized to 0..1 for the math:
//!
//! ```text
//! gamma rgb 1.8, sigmoidal rgb 6 0.5, saturation 1.2
//! ```
//!
//! `gamma` and `sigmoidal` take a band subset spelled with the letters
//! r, g and b; `saturation` applies to all three.

use ndarray::Array3;

use tiler_common::{TilerError, TilerResult};

#[derive(Debug, Clone, PartialEq)]
pub enum ColorOp {
    Gamma { bands: Vec<usize>, gamma: f64 },
    Sigmoidal { bands: Vec<usize>, contrast: f64, bias: f64 },
    Saturation { proportion: f64 },
}

fn parse_band_set(letters: &str) -> TilerResult<Vec<usize>> {
    let mut bands = Vec::new();
    for c in letters.chars() {
        let band = match c.to_ascii_lowercase() {
            'r' => 0,
            'g' => 1,
            'b' => 2,
            other => {
                return Err(TilerError::InvalidColorFormula(format!(
                    "unknown band letter '{}'",
                    other
                )))
            }
        };
        if !bands.contains(&band) {
            bands.push(band);
        }
    }
    if bands.is_empty() {
        return Err(TilerError::InvalidColorFormula("empty band set".into()));
    }
    Ok(bands)
}

fn parse_number(token: &str, op: &str) -> TilerResult<f64> {
    token.parse().map_err(|_| {
        TilerError::InvalidColorFormula(format!("'{}' is not a number in {}", token, op))
    })
}

/// Parse a formula string into its operation chain.
pub fn parse_color_formula(input: &str) -> TilerResult<Vec<ColorOp>> {
    let mut ops = Vec::new();
    for part in input.split(',') {
        let tokens: Vec<&str> = part.split_whitespace().collect();
        let op = match tokens.as_slice() {
            ["gamma", bands, g] => ColorOp::Gamma {
                bands: parse_band_set(bands)?,
                gamma: parse_number(g, "gamma")?,
            },
            ["sigmoidal", bands, contrast, bias] => ColorOp::Sigmoidal {
                bands: parse_band_set(bands)?,
                contrast: parse_number(contrast, "sigmoidal")?,
                bias: parse_number(bias, "sigmoidal")?,
            },
            ["saturation", prop] => ColorOp::Saturation {
                proportion: parse_number(prop, "saturation")?,
            },
            [] => continue,
            _ => {
                return Err(TilerError::InvalidColorFormula(format!(
                    "unrecognized operation '{}'",
                    part.trim()
                )))
            }
        };
        ops.push(op);
    }
    if ops.is_empty() {
        return Err(TilerError::InvalidColorFormula("empty formula".into()));
    }
    Ok(ops)
}

fn sigmoidal(v: f64, contrast: f64, bias: f64) -> f64 {
    if contrast == 0.0 {
        return v;
    }
    let sig = |x: f64| 1.0 / (1.0 + (contrast * (bias - x)).exp());
    let numerator = sig(v) - sig(0.0);
    let denominator = sig(1.0) - sig(0.0);
    numerator / denominator
}

/// Apply a parsed formula chain to a 3-band u8 array.
pub fn apply_color_formula(data: &Array3<u8>, ops: &[ColorOp]) -> TilerResult<Array3<u8>> {
    let (bands, height, width) = data.dim();
    if bands != 3 {
        return Err(TilerError::InvalidColorFormula(format!(
            "color formula needs 3 bands, got {}",
            bands
        )));
    }

    let mut work = data.mapv(|v| v as f64 / 255.0);
    for op in ops {
        match op {
            ColorOp::Gamma { bands, gamma } => {
                for &b in bands {
                    for v in work.index_axis_mut(ndarray::Axis(0), b).iter_mut() {
                        *v = v.max(0.0).powf(1.0 / gamma);
                    }
                }
            }
            ColorOp::Sigmoidal { bands, contrast, bias } => {
                for &b in bands {
                    for v in work.index_axis_mut(ndarray::Axis(0), b).iter_mut() {
                        *v = sigmoidal(*v, *contrast, *bias);
                    }
                }
            }
            ColorOp::Saturation { proportion } => {
                for y in 0..height {
                    for x in 0..width {
                        let r = work[[0, y, x]];
                        let g = work[[1, y, x]];
                        let b = work[[2, y, x]];
                        // Rec. 601 luma as the desaturation target.
                        let luma = 0.299 * r + 0.587 * g + 0.114 * b;
                        work[[0, y, x]] = luma + proportion * (r - luma);
                        work[[1, y, x]] = luma + proportion * (g - luma);
                        work[[2, y, x]] = luma + proportion * (b - luma);
                    }
                }
            }
        }
    }

    Ok(work.mapv(|v| (v * 255.0).round().clamp(0.0, 255.0) as u8))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn rgb(r: u8, g: u8, b: u8) -> Array3<u8> {
        Array3::from_shape_fn((3, 1, 1), |(band, _, _)| [r, g, b][band])
    }

    #[test]
    fn test_parse_chain() {
        let ops = parse_color_formula("gamma rg 1.8, saturation 1.2").unwrap();
        assert_eq!(ops.len(), 2);
        assert_eq!(
            ops[0],
            ColorOp::Gamma {
                bands: vec![0, 1],
                gamma: 1.8
            }
        );
    }

    #[test]
    fn test_parse_rejects_garbage() {
        assert!(parse_color_formula("brighten rgb 2").is_err());
        assert!(parse_color_formula("gamma xyz 2").is_err());
        assert!(parse_color_formula("gamma rgb").is_err());
        assert!(parse_color_formula("").is_err());
    }

    #[test]
    fn test_gamma_one_is_identity() {
        let input = rgb(10, 128, 250);
        let ops = parse_color_formula("gamma rgb 1.0").unwrap();
        assert_eq!(apply_color_formula(&input, &ops).unwrap(), input);
    }

    #[test]
    fn test_gamma_brightens_midtones() {
        let input = rgb(64, 64, 64);
        let ops = parse_color_formula("gamma rgb 2.0").unwrap();
        let out = apply_color_formula(&input, &ops).unwrap();
        assert!(out[[0, 0, 0]] > 64);
    }

    #[test]
    fn test_saturation_one_is_identity() {
        let input = rgb(200, 30, 90);
        let ops = parse_color_formula("saturation 1.0").unwrap();
        assert_eq!(apply_color_formula(&input, &ops).unwrap(), input);
    }

    #[test]
    fn test_saturation_zero_is_grayscale() {
        let input = rgb(200, 30, 90);
        let ops = parse_color_formula("saturation 0").unwrap();
        let out = apply_color_formula(&input, &ops).unwrap();
        assert_eq!(out[[0, 0, 0]], out[[1, 0, 0]]);
        assert_eq!(out[[1, 0, 0]], out[[2, 0, 0]]);
    }

    #[test]
    fn test_sigmoidal_preserves_extremes() {
        let input = rgb(0, 128, 255);
        let ops = parse_color_formula("sigmoidal rgb 10 0.5").unwrap();
        let out = apply_color_formula(&input, &ops).unwrap();
        assert_eq!(out[[0, 0, 0]], 0);
        assert_eq!(out[[2, 0, 0]], 255);
    }

    #[test]
    fn test_needs_three_bands() {
        let one_band = Array3::zeros((1, 1, 1));
        let ops = parse_color_formula("saturation 1.0").unwrap();
        assert!(apply_color_formula(&one_band, &ops).is_err());
    }
}
