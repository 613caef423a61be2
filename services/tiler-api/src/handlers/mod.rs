//! HTTP handlers.

pub mod common;
pub mod docs;
pub mod metadata;
pub mod point;
pub mod tilejson;
pub mod tiles;
pub mod wmts;

pub use common::{favicon_handler, health_handler};
pub use docs::docs_handler;
pub use metadata::{bounds_handler, metadata_handler};
pub use point::point_handler;
pub use tilejson::tilejson_handler;
pub use tiles::tile_handler;
pub use wmts::wmts_handler;
