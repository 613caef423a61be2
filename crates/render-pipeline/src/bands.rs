//! Band selection and reordering.

use ndarray::{Array3, Axis};

use tiler_common::{TilerError, TilerResult};

/// Select and reorder bands by 1-based index.
pub fn select_bands(data: &Array3<f64>, indexes: &[usize]) -> TilerResult<Array3<f64>> {
    let count = data.dim().0;
    for &index in indexes {
        if index == 0 || index > count {
            return Err(TilerError::BandIndexOutOfRange { index, count });
        }
    }

    let views: Vec<_> = indexes
        .iter()
        .map(|&i| data.index_axis(Axis(0), i - 1))
        .collect();
    ndarray::stack(Axis(0), &views)
        .map_err(|e| TilerError::Internal(format!("band stack: {}", e)))
}

/// Parse a comma-separated 1-based index list, e.g. `"3,2,1"`.
pub fn parse_indexes(raw: &str) -> TilerResult<Vec<usize>> {
    raw.split(',')
        .map(|part| {
            part.trim().parse::<usize>().map_err(|_| TilerError::InvalidParameter {
                param: "indexes".into(),
                message: format!("'{}' is not a band index", part.trim()),
            })
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_select_reorders() {
        let data = Array3::from_shape_fn((3, 2, 2), |(b, _, _)| b as f64);
        let out = select_bands(&data, &[3, 1]).unwrap();
        assert_eq!(out.dim(), (2, 2, 2));
        assert_eq!(out[[0, 0, 0]], 2.0);
        assert_eq!(out[[1, 0, 0]], 0.0);
    }

    #[test]
    fn test_out_of_range() {
        let data = Array3::zeros((2, 1, 1));
        assert!(matches!(
            select_bands(&data, &[3]),
            Err(TilerError::BandIndexOutOfRange { index: 3, count: 2 })
        ));
        assert!(matches!(
            select_bands(&data, &[0]),
            Err(TilerError::BandIndexOutOfRange { .. })
        ));
    }

    #[test]
    fn test_parse_indexes() {
        assert_eq!(parse_indexes("1, 3,2").unwrap(), vec![1, 3, 2]);
        assert!(parse_indexes("1,x").is_err());
    }
}
