//! Shared application state.

use std::sync::Arc;

use raster_source::RasterSource;
use tiler_common::TilerResult;

type Opener = dyn Fn(&str) -> TilerResult<Arc<dyn RasterSource>> + Send + Sync;

/// Request-independent service state: the public base URL for generated
/// documents and the dataset opener. The opener is swappable so handler
/// tests can serve synthetic rasters.
pub struct AppState {
    pub public_url: Option<String>,
    opener: Box<Opener>,
}

impl AppState {
    pub fn new(public_url: Option<String>) -> Self {
        Self {
            public_url,
            opener: Box::new(raster_source::open_url),
        }
    }

    pub fn with_opener(
        public_url: Option<String>,
        opener: impl Fn(&str) -> TilerResult<Arc<dyn RasterSource>> + Send + Sync + 'static,
    ) -> Self {
        Self {
            public_url,
            opener: Box::new(opener),
        }
    }

    pub fn open(&self, url: &str) -> TilerResult<Arc<dyn RasterSource>> {
        (self.opener)(url)
    }
}
