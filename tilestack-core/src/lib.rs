//! Core domain types for the tilestack engine.
//!
//! Tile addressing, geographic elements, stylesheets, tile stores, the
//! presence index and elevation sources live here. Orchestration
//! (ingestion, loading, lifecycle) is built on top in `tilestack-data`.

pub mod elevation;
mod element;
pub mod flat;
mod index;
mod quadkey;
mod registry;
pub mod store;
pub mod style;

#[cfg(any(test, feature = "test-support"))]
pub mod test_support;

pub use elevation::{
    ElevationError, ElevationProvider, ElevationSampler, ElevationType, FlatElevation,
    GridElevation, SrtmElevation, srtm_file_name,
};
pub use element::{Element, ElementError, ElementGeometry, GeometryKind, Tags, implies_area};
pub use index::TileIndex;
pub use quadkey::{
    LodRange, MAX_LATITUDE, MAX_LEVEL_OF_DETAIL, MIN_LATITUDE, QuadKey, QuadKeyError, TileCover,
    tiles_per_axis,
};
pub use registry::{RegistryError, StoreHandle, StoreRegistry};
pub use store::{
    DatabaseFingerprint, IndexSnapshotError, IndexSnapshotWriteError, MemoryTileStore,
    SqliteTileStore, StoreError, StoreKind, TileRecord, TileStore,
};
pub use style::{Style, StyleError, Stylesheet};
