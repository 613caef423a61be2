//! Numeric rescaling to the 0-255 display range.

use ndarray::Array3;

use tiler_common::{TilerError, TilerResult};

/// Parse `rescale` query values. Each value holds one or more `min,max`
/// pairs flattened into a comma list (`0,255,0,1000` is two pairs), and
/// the parameter may also be repeated once per band; both URL forms are
/// in the wild.
pub fn parse_rescale(raw: &[String]) -> TilerResult<Vec<(f64, f64)>> {
    let mut pairs = Vec::new();
    for value in raw {
        let bad = || TilerError::InvalidParameter {
            param: "rescale".into(),
            message: format!("'{}' is not a list of min,max pairs", value),
        };
        let numbers: Vec<f64> = value
            .split(',')
            .map(|part| part.trim().parse::<f64>())
            .collect::<Result<_, _>>()
            .map_err(|_| bad())?;
        if numbers.is_empty() || numbers.len() % 2 != 0 {
            return Err(bad());
        }
        for chunk in numbers.chunks(2) {
            if chunk[1] <= chunk[0] {
                return Err(bad());
            }
            pairs.push((chunk[0], chunk[1]));
        }
    }
    Ok(pairs)
}

fn clamp_u8(v: f64) -> u8 {
    if !v.is_finite() {
        return 0;
    }
    v.round().clamp(0.0, 255.0) as u8
}

/// Map pixel values to u8. With rescale ranges, each band is linearly
/// mapped from its (min,max) to 0..255 and clipped; a single pair is
/// broadcast over all bands. Without rescale, values are clamp-cast.
pub fn to_display(data: &Array3<f64>, rescale: Option<&[(f64, f64)]>) -> TilerResult<Array3<u8>> {
    let (bands, height, width) = data.dim();

    let ranges: Option<Vec<(f64, f64)>> = match rescale {
        None => None,
        Some([single]) => Some(vec![*single; bands]),
        Some(pairs) if pairs.len() == bands => Some(pairs.to_vec()),
        Some(pairs) => {
            return Err(TilerError::InvalidParameter {
                param: "rescale".into(),
                message: format!("{} ranges for {} bands", pairs.len(), bands),
            })
        }
    };

    Ok(Array3::from_shape_fn((bands, height, width), |(b, y, x)| {
        let v = data[[b, y, x]];
        match &ranges {
            Some(r) => {
                let (lo, hi) = r[b];
                clamp_u8((v - lo) / (hi - lo) * 255.0)
            }
            None => clamp_u8(v),
        }
    }))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rescale_linear() {
        let data = Array3::from_shape_fn((1, 1, 3), |(_, _, x)| [0.0, 500.0, 1000.0][x]);
        let out = to_display(&data, Some(&[(0.0, 1000.0)])).unwrap();
        assert_eq!(out[[0, 0, 0]], 0);
        assert_eq!(out[[0, 0, 1]], 128);
        assert_eq!(out[[0, 0, 2]], 255);
    }

    #[test]
    fn test_rescale_identity_on_byte_range() {
        let data = Array3::from_shape_fn((1, 1, 256), |(_, _, x)| x as f64);
        let out = to_display(&data, Some(&[(0.0, 255.0)])).unwrap();
        for x in 0..256 {
            assert_eq!(out[[0, 0, x]], x as u8);
        }
    }

    #[test]
    fn test_clipping() {
        let data = Array3::from_shape_fn((1, 1, 2), |(_, _, x)| [-50.0, 5000.0][x]);
        let out = to_display(&data, Some(&[(0.0, 1000.0)])).unwrap();
        assert_eq!(out[[0, 0, 0]], 0);
        assert_eq!(out[[0, 0, 1]], 255);
    }

    #[test]
    fn test_broadcast_single_pair() {
        let data = Array3::from_elem((3, 1, 1), 50.0);
        let out = to_display(&data, Some(&[(0.0, 100.0)])).unwrap();
        for b in 0..3 {
            assert_eq!(out[[b, 0, 0]], 128);
        }
    }

    #[test]
    fn test_pair_count_mismatch() {
        let data = Array3::zeros((3, 1, 1));
        assert!(to_display(&data, Some(&[(0.0, 1.0), (0.0, 1.0)])).is_err());
    }

    #[test]
    fn test_cast_without_rescale() {
        let data = Array3::from_shape_fn((1, 1, 3), |(_, _, x)| [-3.0, 12.4, 300.0][x]);
        let out = to_display(&data, None).unwrap();
        assert_eq!(out[[0, 0, 0]], 0);
        assert_eq!(out[[0, 0, 1]], 12);
        assert_eq!(out[[0, 0, 2]], 255);
    }

    #[test]
    fn test_parse_rescale() {
        assert_eq!(parse_rescale(&["0,255".into()]).unwrap(), vec![(0.0, 255.0)]);
        assert!(parse_rescale(&["0".into()]).is_err());
        assert!(parse_rescale(&["5,5".into()]).is_err());
    }

    #[test]
    fn test_parse_rescale_flattened_pairs() {
        assert_eq!(
            parse_rescale(&["0,255,0,1000".into()]).unwrap(),
            vec![(0.0, 255.0), (0.0, 1000.0)]
        );
        // Odd number of values cannot chunk into pairs.
        assert!(parse_rescale(&["0,255,0".into()]).is_err());
    }
}
