//! Persisted tile presence snapshot.
//!
//! A persistent store writes the set of tiles it holds next to its database
//! so reopening it can seed the tile index without scanning every row. The
//! header records a [`DatabaseFingerprint`] taken when the snapshot was
//! written; a snapshot whose fingerprint no longer matches the database is
//! stale and must not be trusted.

use std::fs::{self, File};

use bincode::{deserialize_from, serialize_into};
use camino::{Utf8Path, Utf8PathBuf};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::QuadKey;

/// File name of the snapshot inside a persistent store directory.
pub const INDEX_SNAPSHOT_FILE: &str = "tiles.idx";

pub(crate) const INDEX_SNAPSHOT_MAGIC: [u8; 4] = *b"TSQI";

/// Version 2 added the database fingerprint to the header.
pub(crate) const INDEX_SNAPSHOT_VERSION: u16 = 2;

/// Shape of the record table when a snapshot was taken.
///
/// Records are only ever inserted or replaced, so any write that adds a tile
/// raises `rows` and `last_rowid`. Replacing a record in place changes
/// neither, and also cannot change which tiles are populated.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DatabaseFingerprint {
    /// Number of stored records.
    pub rows: u64,
    /// Largest SQLite rowid in the record table, or 0 when empty.
    pub last_rowid: i64,
}

#[derive(Debug, Serialize, Deserialize)]
struct SnapshotHeader {
    magic: [u8; 4],
    version: u16,
    fingerprint: DatabaseFingerprint,
}

/// Error emitted when loading a presence snapshot.
#[derive(Debug, Error)]
pub enum IndexSnapshotError {
    /// The snapshot could not be read from disk.
    #[error("failed to read tile index snapshot from {path}: {source}")]
    Io {
        /// Location of the snapshot.
        path: Utf8PathBuf,
        /// Underlying I/O error.
        #[source]
        source: std::io::Error,
    },
    /// The header or tile list could not be decoded.
    #[error("failed to decode tile index snapshot from {path}: {source}")]
    Decode {
        /// Location of the snapshot.
        path: Utf8PathBuf,
        /// Decoder error returned by `bincode`.
        #[source]
        source: bincode::Error,
    },
    /// The file is not a tile presence snapshot.
    #[error("{path} is not a tile index snapshot (magic {found:?})")]
    InvalidMagic {
        /// Location of the snapshot.
        path: Utf8PathBuf,
        /// Leading bytes read from the file.
        found: [u8; 4],
    },
    /// The snapshot was written by an incompatible format version.
    #[error("unsupported tile index snapshot version {found}; supported version is {supported}")]
    UnsupportedVersion {
        /// Version present in the file header.
        found: u16,
        /// Version supported by this binary.
        supported: u16,
    },
    /// The database changed after the snapshot was written.
    #[error(
        "tile index snapshot is stale: taken at {recorded:?}, database is now at {current:?}"
    )]
    Stale {
        /// Fingerprint stored in the snapshot header.
        recorded: DatabaseFingerprint,
        /// Fingerprint of the database being opened.
        current: DatabaseFingerprint,
    },
}

/// Error emitted when writing a presence snapshot.
#[derive(Debug, Error)]
pub enum IndexSnapshotWriteError {
    /// Writing or renaming the snapshot file failed.
    #[error("failed to write tile index snapshot to {path}: {source}")]
    Io {
        /// Destination path.
        path: Utf8PathBuf,
        /// Underlying I/O error.
        #[source]
        source: std::io::Error,
    },
    /// The tile list could not be encoded.
    #[error("failed to encode tile index snapshot for {path}: {source}")]
    Encode {
        /// Destination path.
        path: Utf8PathBuf,
        /// Encoder failure from `bincode`.
        #[source]
        source: bincode::Error,
    },
}

/// Write `tiles` with `fingerprint` to `path`.
///
/// The snapshot is written beside `path` and renamed over it, so readers see
/// either the previous snapshot or the new one.
pub(crate) fn write_index_snapshot(
    path: &Utf8Path,
    fingerprint: DatabaseFingerprint,
    tiles: &[QuadKey],
) -> Result<(), IndexSnapshotWriteError> {
    let staging = path.with_extension("idx.tmp");
    let io_error = |source| IndexSnapshotWriteError::Io {
        path: path.to_path_buf(),
        source,
    };
    let encode_error = |source| IndexSnapshotWriteError::Encode {
        path: path.to_path_buf(),
        source,
    };

    let mut file = File::create(&staging).map_err(io_error)?;
    let header = SnapshotHeader {
        magic: INDEX_SNAPSHOT_MAGIC,
        version: INDEX_SNAPSHOT_VERSION,
        fingerprint,
    };
    serialize_into(&mut file, &header).map_err(encode_error)?;
    serialize_into(&mut file, tiles).map_err(encode_error)?;
    file.sync_all().map_err(io_error)?;
    drop(file);
    fs::rename(&staging, path).map_err(io_error)
}

/// Load the tiles listed in the snapshot at `path`.
///
/// Fails with [`IndexSnapshotError::Stale`] unless the snapshot was taken
/// at `current`.
pub(crate) fn load_index_snapshot(
    path: &Utf8Path,
    current: DatabaseFingerprint,
) -> Result<Vec<QuadKey>, IndexSnapshotError> {
    let mut file = tilestack_fs::open_utf8_file(path).map_err(|source| IndexSnapshotError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    let decode_error = |source| IndexSnapshotError::Decode {
        path: path.to_path_buf(),
        source,
    };

    let header: SnapshotHeader = deserialize_from(&mut file).map_err(decode_error)?;
    if header.magic != INDEX_SNAPSHOT_MAGIC {
        return Err(IndexSnapshotError::InvalidMagic {
            path: path.to_path_buf(),
            found: header.magic,
        });
    }
    if header.version != INDEX_SNAPSHOT_VERSION {
        return Err(IndexSnapshotError::UnsupportedVersion {
            found: header.version,
            supported: INDEX_SNAPSHOT_VERSION,
        });
    }
    if header.fingerprint != current {
        return Err(IndexSnapshotError::Stale {
            recorded: header.fingerprint,
            current,
        });
    }
    deserialize_from(&mut file).map_err(decode_error)
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::{fixture, rstest};
    use tempfile::TempDir;

    const TAKEN_AT: DatabaseFingerprint = DatabaseFingerprint {
        rows: 2,
        last_rowid: 2,
    };

    #[fixture]
    fn snapshot_path() -> (TempDir, Utf8PathBuf) {
        let dir = TempDir::new().expect("create temp dir");
        let path = Utf8PathBuf::from_path_buf(dir.path().join(INDEX_SNAPSHOT_FILE))
            .expect("utf-8 temp path");
        (dir, path)
    }

    fn tiles() -> Vec<QuadKey> {
        vec![
            QuadKey::new(1, 2, 3).expect("tile"),
            QuadKey::new(17_600, 10_746, 15).expect("tile"),
        ]
    }

    fn write_header(path: &Utf8Path, header: &SnapshotHeader) {
        let mut file = File::create(path).expect("create snapshot");
        serialize_into(&mut file, header).expect("write header");
        serialize_into(&mut file, &tiles()).expect("write tiles");
    }

    #[rstest]
    fn current_snapshots_list_their_tiles(snapshot_path: (TempDir, Utf8PathBuf)) {
        let (_dir, path) = snapshot_path;
        write_index_snapshot(&path, TAKEN_AT, &tiles()).expect("write snapshot");
        assert_eq!(
            load_index_snapshot(&path, TAKEN_AT).expect("load snapshot"),
            tiles()
        );
        assert!(!path.with_extension("idx.tmp").exists());
    }

    #[rstest]
    #[case::new_rows(DatabaseFingerprint { rows: 3, last_rowid: 3 })]
    #[case::reused_count(DatabaseFingerprint { rows: 2, last_rowid: 5 })]
    fn snapshots_behind_the_database_are_stale(
        snapshot_path: (TempDir, Utf8PathBuf),
        #[case] current: DatabaseFingerprint,
    ) {
        let (_dir, path) = snapshot_path;
        write_index_snapshot(&path, TAKEN_AT, &tiles()).expect("write snapshot");
        let err = load_index_snapshot(&path, current).expect_err("stale snapshot");
        assert!(matches!(
            err,
            IndexSnapshotError::Stale { recorded, current: now }
                if recorded == TAKEN_AT && now == current
        ));
    }

    #[rstest]
    fn missing_snapshot_is_an_io_error() {
        let err = load_index_snapshot(Utf8Path::new("/non-existent/tiles.idx"), TAKEN_AT)
            .expect_err("missing file");
        assert!(matches!(err, IndexSnapshotError::Io { .. }));
    }

    #[rstest]
    fn foreign_files_are_rejected(snapshot_path: (TempDir, Utf8PathBuf)) {
        let (_dir, path) = snapshot_path;
        let header = SnapshotHeader {
            magic: *b"WSPI",
            version: INDEX_SNAPSHOT_VERSION,
            fingerprint: TAKEN_AT,
        };
        write_header(&path, &header);
        let err = load_index_snapshot(&path, TAKEN_AT).expect_err("bad magic");
        assert!(matches!(
            err,
            IndexSnapshotError::InvalidMagic { found, .. } if &found == b"WSPI"
        ));
    }

    #[rstest]
    fn version_one_snapshots_are_rejected(snapshot_path: (TempDir, Utf8PathBuf)) {
        let (_dir, path) = snapshot_path;
        let header = SnapshotHeader {
            magic: INDEX_SNAPSHOT_MAGIC,
            version: 1,
            fingerprint: TAKEN_AT,
        };
        write_header(&path, &header);
        let err = load_index_snapshot(&path, TAKEN_AT).expect_err("old version");
        assert!(matches!(
            err,
            IndexSnapshotError::UnsupportedVersion { found: 1, supported }
                if supported == INDEX_SNAPSHOT_VERSION
        ));
    }

    #[rstest]
    fn truncated_files_fail_to_decode(snapshot_path: (TempDir, Utf8PathBuf)) {
        let (_dir, path) = snapshot_path;
        fs::write(&path, INDEX_SNAPSHOT_MAGIC).expect("write magic only");
        let err = load_index_snapshot(&path, TAKEN_AT).expect_err("decode failure");
        assert!(matches!(err, IndexSnapshotError::Decode { .. }));
    }
}
