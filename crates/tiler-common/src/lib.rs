//! Shared types for the cog-tiler services.
//!
//! Leaf crate: bounding boxes, the Web Mercator tile grid, raster windows
//! and the error taxonomy. Everything here is request-scoped data with no
//! I/O of its own.

pub mod bbox;
pub mod error;
pub mod tile;
pub mod window;

pub use bbox::BoundingBox;
pub use error::{TilerError, TilerResult};
pub use tile::{TileCoord, WEB_MERCATOR_EXTENT};
pub use window::{DataType, DatasetInfo, RasterWindow};
