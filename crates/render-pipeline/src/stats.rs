//! Per-band statistics for the metadata endpoint.

use std::collections::BTreeMap;

use serde::Serialize;

use tiler_common::RasterWindow;

pub const DEFAULT_PERCENTILES: (f64, f64) = (2.0, 98.0);
pub const DEFAULT_HISTOGRAM_BINS: usize = 20;
pub const DEFAULT_MAX_SIZE: usize = 1024;

#[derive(Debug, Clone, Serialize)]
pub struct BandStatistics {
    /// Percentile rescale bounds `[pmin_value, pmax_value]`.
    pub pc: [f64; 2],
    pub min: f64,
    pub max: f64,
    pub std: f64,
    /// `[counts, bin_edges]`, bin_edges has `bins + 1` entries.
    pub histogram: (Vec<u64>, Vec<f64>),
}

/// Linear-interpolated percentile over a sorted slice.
fn percentile(sorted: &[f64], p: f64) -> f64 {
    if sorted.is_empty() {
        return 0.0;
    }
    let rank = (p / 100.0).clamp(0.0, 1.0) * (sorted.len() - 1) as f64;
    let lo = rank.floor() as usize;
    let hi = rank.ceil() as usize;
    if lo == hi {
        return sorted[lo];
    }
    let frac = rank - lo as f64;
    sorted[lo] + (sorted[hi] - sorted[lo]) * frac
}

fn histogram(values: &[f64], bins: usize, range: (f64, f64)) -> (Vec<u64>, Vec<f64>) {
    let bins = bins.max(1);
    let (lo, hi) = range;
    let span = hi - lo;
    let edges: Vec<f64> = (0..=bins)
        .map(|i| lo + span * i as f64 / bins as f64)
        .collect();

    let mut counts = vec![0u64; bins];
    if span > 0.0 {
        for &v in values {
            if v < lo || v > hi {
                continue;
            }
            // The upper bound falls into the last bin.
            let bin = (((v - lo) / span * bins as f64) as usize).min(bins - 1);
            counts[bin] += 1;
        }
    } else {
        counts[0] = values.iter().filter(|&&v| v == lo).count() as u64;
    }
    (counts, edges)
}

/// Statistics over the valid pixels of one band.
pub fn band_statistics(
    valid_values: &[f64],
    percentiles: (f64, f64),
    bins: usize,
    histogram_range: Option<(f64, f64)>,
) -> BandStatistics {
    if valid_values.is_empty() {
        let range = histogram_range.unwrap_or((0.0, 0.0));
        return BandStatistics {
            pc: [0.0, 0.0],
            min: 0.0,
            max: 0.0,
            std: 0.0,
            histogram: histogram(&[], bins, range),
        };
    }

    let mut sorted = valid_values.to_vec();
    sorted.sort_by(|a, b| a.total_cmp(b));
    let min = sorted[0];
    let max = sorted[sorted.len() - 1];

    let n = sorted.len() as f64;
    let mean = sorted.iter().sum::<f64>() / n;
    let variance = sorted.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / n;

    BandStatistics {
        pc: [
            percentile(&sorted, percentiles.0),
            percentile(&sorted, percentiles.1),
        ],
        min,
        max,
        std: variance.sqrt(),
        histogram: histogram(valid_values, bins, histogram_range.unwrap_or((min, max))),
    }
}

/// Statistics for every band of a window, keyed by 1-based band id. Masked
/// pixels are excluded throughout.
pub fn window_statistics(
    window: &RasterWindow,
    percentiles: (f64, f64),
    bins: usize,
    histogram_range: Option<(f64, f64)>,
) -> BTreeMap<usize, BandStatistics> {
    let mut out = BTreeMap::new();
    for band in 0..window.bands() {
        let values: Vec<f64> = (0..window.height())
            .flat_map(|y| (0..window.width()).map(move |x| (y, x)))
            .filter(|&(y, x)| window.mask[[y, x]])
            .map(|(y, x)| window.data[[band, y, x]])
            .filter(|v| v.is_finite())
            .collect();
        out.insert(
            band + 1,
            band_statistics(&values, percentiles, bins, histogram_range),
        );
    }
    out
}
