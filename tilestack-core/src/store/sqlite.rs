//! SQLite-backed persistent store.

use std::collections::BTreeSet;
use std::fmt;
use std::sync::{Mutex, MutexGuard};

use camino::{Utf8Path, Utf8PathBuf};
use log::{debug, warn};
use rusqlite::{Connection, params};

use crate::{Element, ElementGeometry, QuadKey, Tags};

use super::snapshot::{
    DatabaseFingerprint, INDEX_SNAPSHOT_FILE, IndexSnapshotError, load_index_snapshot,
    write_index_snapshot,
};
use super::{StoreError, StoreKind, TileRecord, TileStore};

/// File name of the SQLite database inside a persistent store directory.
pub const TILE_DATABASE_FILE: &str = "tiles.db";

const SCHEMA: &str = "
    CREATE TABLE IF NOT EXISTS tile_elements (
        lod INTEGER NOT NULL,
        tile_x INTEGER NOT NULL,
        tile_y INTEGER NOT NULL,
        element_id INTEGER NOT NULL,
        geometry BLOB NOT NULL,
        tags TEXT NOT NULL,
        PRIMARY KEY (lod, tile_x, tile_y, element_id)
    );
";

/// Persistent [`TileStore`] writing `tiles.db` and `tiles.idx` into an
/// existing directory.
///
/// Each `put` runs in one transaction. The set of populated tiles is kept in
/// memory, seeded from the snapshot when its fingerprint matches the database
/// and from a table scan otherwise. Records committed after the last flush
/// therefore stay visible even when the store is dropped without flushing.
pub struct SqliteTileStore {
    directory: Utf8PathBuf,
    connection: Mutex<Connection>,
    populated: BTreeSet<QuadKey>,
    dirty: bool,
}

impl fmt::Debug for SqliteTileStore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SqliteTileStore")
            .field("directory", &self.directory)
            .field("tiles", &self.populated.len())
            .finish_non_exhaustive()
    }
}

impl SqliteTileStore {
    /// Open or create the store files inside `directory`.
    ///
    /// The directory itself must already exist.
    pub fn open(directory: &Utf8Path) -> Result<Self, StoreError> {
        let database_path = directory.join(TILE_DATABASE_FILE);
        let connection =
            Connection::open(&database_path).map_err(|source| StoreError::OpenDatabase {
                path: database_path.clone(),
                source,
            })?;
        connection.execute_batch(SCHEMA)?;

        let snapshot_path = directory.join(INDEX_SNAPSHOT_FILE);
        let current = fingerprint(&connection)?;
        let (populated, dirty) = match load_index_snapshot(&snapshot_path, current) {
            Ok(entries) => (entries.into_iter().collect(), false),
            Err(err) => {
                match &err {
                    IndexSnapshotError::Io { .. }
                        if !tilestack_fs::file_is_file(&snapshot_path).unwrap_or(false) => {}
                    IndexSnapshotError::Stale { .. } => debug!("{err}"),
                    _ => warn!("ignoring tile index snapshot: {err}"),
                }
                debug!("rebuilding tile presence from {database_path}");
                // Rewrite the snapshot on the next flush.
                (scan_populated(&connection)?, true)
            }
        };

        Ok(Self {
            directory: directory.to_path_buf(),
            connection: Mutex::new(connection),
            populated,
            dirty,
        })
    }

    /// Directory holding the store files.
    pub fn directory(&self) -> &Utf8Path {
        &self.directory
    }

    fn connection(&self) -> Result<MutexGuard<'_, Connection>, StoreError> {
        self.connection.lock().map_err(|_| StoreError::Poisoned)
    }
}

impl TileStore for SqliteTileStore {
    fn kind(&self) -> StoreKind {
        StoreKind::Persistent
    }

    fn put(&mut self, records: &[TileRecord]) -> Result<(), StoreError> {
        if records.is_empty() {
            return Ok(());
        }
        let encoded = records
            .iter()
            .map(encode_record)
            .collect::<Result<Vec<_>, _>>()?;

        {
            let connection = self
                .connection
                .get_mut()
                .map_err(|_| StoreError::Poisoned)?;
            let transaction = connection.transaction()?;
            {
                let mut statement = transaction.prepare(
                    "INSERT OR REPLACE INTO tile_elements \
                     (lod, tile_x, tile_y, element_id, geometry, tags) \
                     VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
                )?;
                for (record, (geometry, tags)) in records.iter().zip(&encoded) {
                    let quad_key = record.quad_key;
                    statement.execute(params![
                        quad_key.lod(),
                        quad_key.tile_x(),
                        quad_key.tile_y(),
                        record.element.id.cast_signed(),
                        geometry,
                        tags,
                    ])?;
                }
            }
            transaction.commit()?;
        }

        self.populated
            .extend(records.iter().map(|record| record.quad_key));
        self.dirty = true;
        Ok(())
    }

    fn has_data(&self, quad_key: &QuadKey) -> Result<bool, StoreError> {
        Ok(self.populated.contains(quad_key))
    }

    fn elements(&self, quad_key: &QuadKey) -> Result<Vec<Element>, StoreError> {
        let connection = self.connection()?;
        let mut statement = connection.prepare(
            "SELECT element_id, geometry, tags FROM tile_elements \
             WHERE lod = ?1 AND tile_x = ?2 AND tile_y = ?3",
        )?;
        let mut rows = statement.query(params![
            quad_key.lod(),
            quad_key.tile_x(),
            quad_key.tile_y()
        ])?;

        let mut elements = Vec::new();
        while let Some(row) = rows.next()? {
            let id = row.get::<_, i64>(0)?.cast_unsigned();
            let geometry_bytes: Vec<u8> = row.get(1)?;
            let tags_json: String = row.get(2)?;
            let geometry: ElementGeometry =
                bincode::deserialize(&geometry_bytes).map_err(|source| StoreError::Decode {
                    quad_key: *quad_key,
                    id,
                    source,
                })?;
            let tags: Tags = serde_json::from_str(&tags_json)
                .map_err(|source| StoreError::Tags { id, source })?;
            elements.push(Element::new(id, geometry, tags));
        }
        elements.sort_unstable_by_key(|element| element.id);
        Ok(elements)
    }

    fn quad_keys(&self) -> Result<Vec<QuadKey>, StoreError> {
        Ok(self.populated.iter().copied().collect())
    }

    fn flush(&mut self) -> Result<(), StoreError> {
        if !self.dirty {
            return Ok(());
        }
        let snapshot_path = self.directory.join(INDEX_SNAPSHOT_FILE);
        let taken_at = fingerprint(&*self.connection()?)?;
        let entries: Vec<_> = self.populated.iter().copied().collect();
        write_index_snapshot(&snapshot_path, taken_at, &entries)?;
        self.dirty = false;
        debug!("flushed {} tile(s) to {snapshot_path}", entries.len());
        Ok(())
    }
}

fn encode_record(record: &TileRecord) -> Result<(Vec<u8>, String), StoreError> {
    let id = record.element.id;
    let geometry = bincode::serialize(&record.element.geometry)
        .map_err(|source| StoreError::Encode { id, source })?;
    let tags = serde_json::to_string(&record.element.tags)
        .map_err(|source| StoreError::Tags { id, source })?;
    Ok((geometry, tags))
}

fn fingerprint(connection: &Connection) -> Result<DatabaseFingerprint, StoreError> {
    let (rows, last_rowid) = connection.query_row(
        "SELECT COUNT(*), COALESCE(MAX(rowid), 0) FROM tile_elements",
        [],
        |row| Ok((row.get::<_, i64>(0)?, row.get::<_, i64>(1)?)),
    )?;
    Ok(DatabaseFingerprint {
        rows: rows.cast_unsigned(),
        last_rowid,
    })
}

fn scan_populated(connection: &Connection) -> Result<BTreeSet<QuadKey>, StoreError> {
    let mut statement =
        connection.prepare("SELECT DISTINCT lod, tile_x, tile_y FROM tile_elements")?;
    let mut rows = statement.query([])?;
    let mut populated = BTreeSet::new();
    while let Some(row) = rows.next()? {
        let lod: u8 = row.get(0)?;
        let tile_x: u32 = row.get(1)?;
        let tile_y: u32 = row.get(2)?;
        populated.insert(QuadKey::new(tile_x, tile_y, lod)?);
    }
    Ok(populated)
}
