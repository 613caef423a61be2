//! Nodata resolution and validity-mask propagation.

use ndarray::{Array2, Array3};

use tiler_common::{TilerError, TilerResult};

/// Effective nodata: request override wins over the dataset declaration.
pub fn resolve_nodata(request: Option<f64>, dataset: Option<f64>) -> Option<f64> {
    request.or(dataset)
}

/// Parse a request `nodata` value; `nan` is accepted.
pub fn parse_nodata(raw: &str) -> TilerResult<f64> {
    if raw.trim().eq_ignore_ascii_case("nan") {
        return Ok(f64::NAN);
    }
    raw.trim().parse().map_err(|_| TilerError::InvalidParameter {
        param: "nodata".into(),
        message: format!("'{}' is not a number", raw),
    })
}

fn matches_nodata(value: f64, nodata: f64, float_data: bool) -> bool {
    if nodata.is_nan() {
        return value.is_nan();
    }
    if float_data {
        (value - nodata).abs() <= 1e-6 * nodata.abs().max(1.0)
    } else {
        value == nodata
    }
}

/// Combine the dataset mask with nodata matching. A pixel is invalid when
/// the dataset already masks it, when any band equals the effective nodata,
/// or when any band is non-finite (expression fallout).
pub fn build_mask(
    data: &Array3<f64>,
    dataset_mask: &Array2<bool>,
    nodata: Option<f64>,
    float_data: bool,
) -> Array2<bool> {
    let (bands, height, width) = data.dim();
    Array2::from_shape_fn((height, width), |(y, x)| {
        if !dataset_mask[[y, x]] {
            return false;
        }
        for b in 0..bands {
            let v = data[[b, y, x]];
            if !v.is_finite() {
                return false;
            }
            if let Some(nd) = nodata {
                if matches_nodata(v, nd, float_data) {
                    return false;
                }
            }
        }
        true
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_precedence() {
        assert_eq!(resolve_nodata(Some(0.0), Some(-9999.0)), Some(0.0));
        assert_eq!(resolve_nodata(None, Some(-9999.0)), Some(-9999.0));
        assert_eq!(resolve_nodata(None, None), None);
    }

    #[test]
    fn test_parse_nodata_nan() {
        assert!(parse_nodata("NaN").unwrap().is_nan());
        assert_eq!(parse_nodata("-9999").unwrap(), -9999.0);
        assert!(parse_nodata("zero").is_err());
    }

    #[test]
    fn test_exact_match_for_integers() {
        let mut data = Array3::zeros((1, 1, 2));
        data[[0, 0, 0]] = -9999.0;
        data[[0, 0, 1]] = 42.0;
        let base = Array2::from_elem((1, 2), true);
        let mask = build_mask(&data, &base, Some(-9999.0), false);
        assert!(!mask[[0, 0]]);
        assert!(mask[[0, 1]]);
    }

    #[test]
    fn test_float_tolerance() {
        let mut data = Array3::zeros((1, 1, 1));
        data[[0, 0, 0]] = -9999.000001;
        let base = Array2::from_elem((1, 1), true);
        assert!(!build_mask(&data, &base, Some(-9999.0), true)[[0, 0]]);
        assert!(build_mask(&data, &base, Some(-9999.0), false)[[0, 0]]);
    }

    #[test]
    fn test_nan_pixels_masked_without_nodata() {
        let mut data = Array3::zeros((1, 1, 1));
        data[[0, 0, 0]] = f64::NAN;
        let base = Array2::from_elem((1, 1), true);
        assert!(!build_mask(&data, &base, None, true)[[0, 0]]);
    }

    #[test]
    fn test_dataset_mask_carried() {
        let data = Array3::zeros((1, 1, 2));
        let mut base = Array2::from_elem((1, 2), true);
        base[[0, 1]] = false;
        let mask = build_mask(&data, &base, None, false);
        assert!(mask[[0, 0]]);
        assert!(!mask[[0, 1]]);
    }
}
