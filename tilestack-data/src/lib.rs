//! Ingestion, loading and lifecycle for tilestack.
//!
//! [`Engine`] is the entry point: configure it on an index root, register
//! stores, ingest geodata files or single elements, then query tile
//! presence, sample elevation and load tiles into meshes and styled
//! elements. Long-running work has a `spawn_*` counterpart with progress
//! and cooperative cancellation.

mod config;
mod engine;
mod error;
mod ingest;
mod load;
mod mesh;
mod source;

pub use config::{DEFAULT_MAX_TILES_PER_ELEMENT, DEFAULT_TERRAIN_GRID_CELLS, EngineConfig};
pub use engine::{DEFAULT_IN_MEMORY_STORE, DEFAULT_PERSISTENT_STORE, Engine};
pub use error::EngineError;
pub use ingest::{
    IngestInput, IngestProgress, IngestReport, IngestRequest, IngestScope, IngestTask,
};
pub use load::{
    CollectingSink, LoadEvent, LoadSink, LoadStream, LoadSummary, LoadedElement, TileRequest,
};
pub use mesh::{
    BuilderKind, DEFAULT_BUILDING_HEIGHT, DEFAULT_COLOUR, DEFAULT_LEVEL_HEIGHT, Mesh,
    building_height,
};
pub use source::{
    OsmKind, SkippedElement, SourceBatch, SourceError, SourceFormat, decode_osm_id, read_source,
};
pub use tokio_util::sync::CancellationToken;
