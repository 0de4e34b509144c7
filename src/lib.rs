//! Facade crate for the tilestack tile engine.
//!
//! This crate re-exports the tile data model from `tilestack-core` and the
//! engine facade from `tilestack-data`, so applications depend on a single
//! crate.

#![forbid(unsafe_code)]

pub use tilestack_core::{
    Element, ElementGeometry, ElevationError, ElevationType, LodRange, QuadKey, QuadKeyError,
    RegistryError, StoreError, StoreKind, Stylesheet, Tags, TileRecord, TileStore,
};

pub use tilestack_data::{
    CancellationToken, DEFAULT_IN_MEMORY_STORE, DEFAULT_PERSISTENT_STORE, Engine, EngineConfig,
    EngineError, IngestProgress, IngestReport, IngestRequest, IngestTask, LoadEvent, LoadSink,
    LoadStream, LoadSummary, LoadedElement, Mesh, TileRequest,
};

#[cfg(feature = "test-support")]
pub use tilestack_core::test_support;
