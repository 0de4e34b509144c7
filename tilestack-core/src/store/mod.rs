//! Tile data containers.
//!
//! The [`TileStore`] trait is the seam between the engine and concrete
//! storage. Stores hold clipped [`Element`] records keyed by
//! `(QuadKey, element id)`; writing a record whose key already exists
//! replaces it.

mod memory;
mod snapshot;
mod sqlite;

use std::fmt;

use camino::Utf8PathBuf;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::{Element, QuadKey, QuadKeyError};

pub use memory::MemoryTileStore;
pub use snapshot::{
    DatabaseFingerprint, INDEX_SNAPSHOT_FILE, IndexSnapshotError, IndexSnapshotWriteError,
};
pub use sqlite::{SqliteTileStore, TILE_DATABASE_FILE};

/// Storage flavour of a registered store.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum StoreKind {
    /// Volatile store living in process memory.
    InMemory,
    /// Durable store backed by a directory on disk.
    Persistent,
}

impl fmt::Display for StoreKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::InMemory => "InMemory",
            Self::Persistent => "Persistent",
        })
    }
}

/// One element clipped to one tile.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TileRecord {
    /// Tile the record belongs to.
    pub quad_key: QuadKey,
    /// Element geometry restricted to the tile bounds.
    pub element: Element,
}

impl TileRecord {
    /// Pair an element with its tile.
    pub fn new(quad_key: QuadKey, element: Element) -> Self {
        Self { quad_key, element }
    }
}

/// Error raised by store implementations.
#[derive(Debug, Error)]
pub enum StoreError {
    /// Opening the SQLite database failed.
    #[error("failed to open SQLite database at {path}: {source}")]
    OpenDatabase {
        /// Location of the SQLite database on disk.
        path: Utf8PathBuf,
        /// Source error returned by `rusqlite`.
        #[source]
        source: rusqlite::Error,
    },
    /// Generic SQLite error while reading or writing records.
    #[error(transparent)]
    Database(#[from] rusqlite::Error),
    /// An element geometry could not be encoded.
    #[error("failed to encode geometry for element {id}: {source}")]
    Encode {
        /// Identifier of the element.
        id: u64,
        /// Encoder failure from `bincode`.
        #[source]
        source: bincode::Error,
    },
    /// A stored geometry could not be decoded.
    #[error("failed to decode geometry for element {id} in tile {quad_key}: {source}")]
    Decode {
        /// Tile holding the record.
        quad_key: QuadKey,
        /// Identifier of the element.
        id: u64,
        /// Decoder failure from `bincode`.
        #[source]
        source: bincode::Error,
    },
    /// Stored tags were not valid JSON.
    #[error("failed to handle tags for element {id}: {source}")]
    Tags {
        /// Identifier of the element.
        id: u64,
        /// JSON failure.
        #[source]
        source: serde_json::Error,
    },
    /// A stored tile address no longer validates.
    #[error(transparent)]
    QuadKey(#[from] QuadKeyError),
    /// Persisting the presence snapshot failed.
    #[error(transparent)]
    Snapshot(#[from] IndexSnapshotWriteError),
    /// A lock guarding the store was poisoned by a panicking thread.
    #[error("store lock poisoned")]
    Poisoned,
}

/// Read/write access to tile records.
///
/// Implementations are shared between threads: reads take `&self` and may
/// run concurrently, writes take `&mut self` so callers serialize them.
///
/// # Examples
/// ```
/// use geo::Coord;
/// use tilestack_core::{Element, MemoryTileStore, QuadKey, Tags, TileRecord, TileStore};
///
/// # fn main() -> Result<(), Box<dyn std::error::Error>> {
/// let mut store = MemoryTileStore::default();
/// let tile = QuadKey::new(0, 0, 1)?;
/// let element = Element::from_coordinates(1, vec![Coord { x: -90.0, y: 45.0 }], Tags::new())?;
/// store.put(&[TileRecord::new(tile, element)])?;
///
/// assert!(store.has_data(&tile)?);
/// assert_eq!(store.elements(&tile)?.len(), 1);
/// # Ok(())
/// # }
/// ```
pub trait TileStore: Send + Sync + fmt::Debug {
    /// Storage flavour.
    fn kind(&self) -> StoreKind;

    /// Insert or replace records, keyed by `(quad key, element id)`.
    ///
    /// Either every record is written or none is.
    fn put(&mut self, records: &[TileRecord]) -> Result<(), StoreError>;

    /// Whether any record exists for `quad_key`.
    fn has_data(&self, quad_key: &QuadKey) -> Result<bool, StoreError>;

    /// Records stored for `quad_key`, ordered by element id.
    fn elements(&self, quad_key: &QuadKey) -> Result<Vec<Element>, StoreError>;

    /// Every tile holding at least one record, in ascending order.
    fn quad_keys(&self) -> Result<Vec<QuadKey>, StoreError>;

    /// Persist buffered state. In-memory stores have nothing to do.
    fn flush(&mut self) -> Result<(), StoreError> {
        Ok(())
    }
}
