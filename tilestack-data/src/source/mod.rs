//! Geodata readers.
//!
//! The reader is picked from the file extension: `.pbf` for OpenStreetMap
//! PBF extracts, `.json` and `.geojson` for GeoJSON. A reader either returns
//! every element it could build, listing the ones it had to skip, or fails
//! for the whole file.

mod geojson;
mod pbf;

use std::io;

use camino::{Utf8Path, Utf8PathBuf};
use log::warn;
use serde::Serialize;
use thiserror::Error;
use tilestack_core::{Element, ElementError};

pub use pbf::{OsmKind, decode_osm_id};

/// Errors raised while reading a geodata file.
#[derive(Debug, Error)]
pub enum SourceError {
    /// The file could not be read.
    #[error("failed to read geodata {path}: {source}")]
    Io {
        /// Location of the source.
        path: Utf8PathBuf,
        /// Underlying I/O error.
        #[source]
        source: io::Error,
    },
    /// The PBF reader could not be created.
    #[error("failed to open OSM PBF file {path}")]
    Open {
        /// Location of the source.
        path: Utf8PathBuf,
        /// Reader error.
        #[source]
        source: osmpbf::Error,
    },
    /// PBF blocks could not be decoded.
    #[error("failed to decode OSM PBF data in {path}")]
    Decode {
        /// Location of the source.
        path: Utf8PathBuf,
        /// Decoder error.
        #[source]
        source: osmpbf::Error,
    },
    /// The file is not valid JSON.
    #[error("failed to parse GeoJSON {path}")]
    Json {
        /// Location of the source.
        path: Utf8PathBuf,
        /// Parser error.
        #[source]
        source: serde_json::Error,
    },
    /// The file parsed but does not have the expected structure.
    #[error("malformed geodata {path}: {message}")]
    Malformed {
        /// Location of the source.
        path: Utf8PathBuf,
        /// Description of the problem.
        message: String,
    },
    /// No reader handles the file extension.
    #[error("unsupported geodata format {path}")]
    UnsupportedFormat {
        /// Location of the source.
        path: Utf8PathBuf,
    },
}

impl SourceError {
    /// File the error refers to.
    pub fn path(&self) -> &Utf8Path {
        match self {
            Self::Io { path, .. }
            | Self::Open { path, .. }
            | Self::Decode { path, .. }
            | Self::Json { path, .. }
            | Self::Malformed { path, .. }
            | Self::UnsupportedFormat { path } => path,
        }
    }
}

/// An element left out of an ingestion, with the reason.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SkippedElement {
    /// Element id, when the source provided a usable one.
    pub id: Option<u64>,
    /// Why the element was skipped.
    pub reason: String,
}

/// Elements read from one source.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SourceBatch {
    /// Elements ready for ingestion, ordered by id.
    pub elements: Vec<Element>,
    /// Elements the reader could not build.
    pub skipped: Vec<SkippedElement>,
}

impl SourceBatch {
    fn accept(&mut self, id: u64, element: Result<Element, ElementError>) {
        match element {
            Ok(element) => self.elements.push(element),
            Err(err) => self.skip(Some(id), err.to_string()),
        }
    }

    fn skip(&mut self, id: Option<u64>, reason: String) {
        match id {
            Some(id) => warn!("Skipped element {id}: {reason}"),
            None => warn!("Skipped element without id: {reason}"),
        }
        self.skipped.push(SkippedElement { id, reason });
    }
}

/// Supported geodata encodings.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SourceFormat {
    /// OpenStreetMap PBF.
    Pbf,
    /// GeoJSON `Feature` or `FeatureCollection`.
    GeoJson,
}

impl SourceFormat {
    /// Format implied by the extension of `path`.
    pub fn from_path(path: &Utf8Path) -> Result<Self, SourceError> {
        match path.extension().map(str::to_ascii_lowercase).as_deref() {
            Some("pbf") => Ok(Self::Pbf),
            Some("json" | "geojson") => Ok(Self::GeoJson),
            _ => Err(SourceError::UnsupportedFormat {
                path: path.to_path_buf(),
            }),
        }
    }
}

/// Read every element from the geodata file at `path`.
///
/// # Examples
/// ```no_run
/// use camino::Utf8Path;
/// use tilestack_data::read_source;
///
/// # fn main() -> Result<(), tilestack_data::SourceError> {
/// let batch = read_source(Utf8Path::new("berlin.osm.pbf"))?;
/// println!("{} elements, {} skipped", batch.elements.len(), batch.skipped.len());
/// # Ok(())
/// # }
/// ```
pub fn read_source(path: &Utf8Path) -> Result<SourceBatch, SourceError> {
    let format = SourceFormat::from_path(path)?;
    match tilestack_fs::file_is_file(path) {
        Ok(true) => {}
        Ok(false) => {
            return Err(SourceError::Io {
                path: path.to_path_buf(),
                source: io::Error::new(io::ErrorKind::NotFound, "no such file"),
            });
        }
        Err(source) => {
            return Err(SourceError::Io {
                path: path.to_path_buf(),
                source,
            });
        }
    }
    match format {
        SourceFormat::Pbf => pbf::read_pbf(path),
        SourceFormat::GeoJson => geojson::read_geojson(path),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;
    use tempfile::TempDir;

    fn temp_root() -> (TempDir, Utf8PathBuf) {
        let dir = TempDir::new().expect("create temp dir");
        let root = Utf8PathBuf::from_path_buf(dir.path().to_path_buf()).expect("utf-8 temp path");
        (dir, root)
    }

    #[rstest]
    #[case("city.osm.pbf", SourceFormat::Pbf)]
    #[case("city.geojson", SourceFormat::GeoJson)]
    #[case("CITY.JSON", SourceFormat::GeoJson)]
    fn formats_follow_extensions(#[case] name: &str, #[case] expected: SourceFormat) {
        assert_eq!(
            SourceFormat::from_path(Utf8Path::new(name)).expect("known"),
            expected
        );
    }

    #[rstest]
    #[case("city.osm")]
    #[case("city")]
    fn unknown_extensions_are_rejected(#[case] name: &str) {
        let err = SourceFormat::from_path(Utf8Path::new(name)).expect_err("unsupported");
        assert!(matches!(err, SourceError::UnsupportedFormat { .. }));
    }

    #[rstest]
    fn missing_files_are_io_errors() {
        let (_dir, root) = temp_root();
        let err = read_source(&root.join("absent.geojson")).expect_err("missing");
        match err {
            SourceError::Io { source, .. } => assert_eq!(source.kind(), io::ErrorKind::NotFound),
            other => panic!("expected an I/O error, got {other:?}"),
        }
    }

    #[rstest]
    fn junk_pbf_data_fails_to_decode() {
        let (_dir, root) = temp_root();
        let path = root.join("junk.osm.pbf");
        std::fs::write(&path, b"\x00\x00\x00\x0cnot a pbf file at all").expect("write junk");
        let err = read_source(&path).expect_err("junk data");
        assert!(
            matches!(err, SourceError::Open { .. } | SourceError::Decode { .. }),
            "unexpected error: {err:?}"
        );
        assert_eq!(err.path(), path.as_path());
    }
}
