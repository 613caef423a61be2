//! Request-scoped pipeline orchestration.
//!
//! Raster I/O is blocking (range reads over `reqwest::blocking`), so every
//! dataset touch runs under `spawn_blocking`; handlers stay async-only.

use std::collections::BTreeMap;
use std::sync::Arc;

use tokio::task::spawn_blocking;
use tracing::instrument;

use raster_source::read_tile;
use render_pipeline::stats::{self, BandStatistics};
use render_pipeline::{mask, render, RenderOptions, RenderedTile};
use tiler_common::{DatasetInfo, TileCoord, TilerError, TilerResult};

use crate::params::MetadataParams;
use crate::state::AppState;

fn join<T>(result: Result<TilerResult<T>, tokio::task::JoinError>) -> TilerResult<T> {
    result.map_err(|e| TilerError::Internal(format!("worker task failed: {}", e)))?
}

/// Open, read and render one tile.
#[instrument(skip(state, options), fields(url = %url))]
pub async fn render_tile(
    state: Arc<AppState>,
    url: String,
    coord: TileCoord,
    scale: usize,
    options: RenderOptions,
) -> TilerResult<RenderedTile> {
    join(
        spawn_blocking(move || {
            let source = state.open(&url)?;
            let window = read_tile(source.as_ref(), coord, scale)?;
            render(&window, source.info().nodata, &options)
        })
        .await,
    )
}

/// Dataset metadata without pixel reads, for bounds/TileJSON/WMTS.
pub async fn dataset_info(state: Arc<AppState>, url: String) -> TilerResult<DatasetInfo> {
    join(spawn_blocking(move || Ok(state.open(&url)?.info().clone())).await)
}

/// Decimated whole-dataset read plus per-band statistics.
pub async fn dataset_statistics(
    state: Arc<AppState>,
    url: String,
    params: MetadataParams,
) -> TilerResult<(DatasetInfo, BTreeMap<usize, BandStatistics>)> {
    join(
        spawn_blocking(move || {
            let source = state.open(&url)?;
            let info = source.info().clone();
            let mut window = source.read_full(params.max_size)?;

            let nodata = mask::resolve_nodata(params.nodata, info.nodata);
            window.mask = mask::build_mask(&window.data, &window.mask, nodata, info.dtype.is_float());

            let band_ids: Vec<usize> = match &params.indexes {
                Some(indexes) => {
                    for &index in indexes {
                        if index == 0 || index > info.band_count {
                            return Err(TilerError::BandIndexOutOfRange {
                                index,
                                count: info.band_count,
                            });
                        }
                    }
                    indexes.clone()
                }
                None => (1..=info.band_count).collect(),
            };

            let all = stats::window_statistics(
                &window,
                params.percentiles,
                params.histogram_bins,
                params.histogram_range,
            );
            let selected = band_ids
                .into_iter()
                .filter_map(|id| all.get(&id).map(|s| (id, s.clone())))
                .collect();
            Ok((info, selected))
        })
        .await,
    )
}

/// Sample band values at a WGS84 coordinate.
pub async fn sample_point(
    state: Arc<AppState>,
    url: String,
    lon: f64,
    lat: f64,
    indexes: Option<Vec<usize>>,
) -> TilerResult<Vec<f64>> {
    join(
        spawn_blocking(move || {
            let source = state.open(&url)?;
            let values = source.sample_wgs84(lon, lat)?;
            match indexes {
                None => Ok(values),
                Some(indexes) => indexes
                    .into_iter()
                    .map(|index| {
                        values.get(index.wrapping_sub(1)).copied().ok_or(
                            TilerError::BandIndexOutOfRange {
                                index,
                                count: values.len(),
                            },
                        )
                    })
                    .collect(),
            }
        })
        .await,
    )
}
