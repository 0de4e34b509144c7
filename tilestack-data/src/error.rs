//! Engine-level error type.

use std::io;

use camino::Utf8PathBuf;
use thiserror::Error;
use tilestack_core::{
    ElementError, ElevationError, QuadKey, QuadKeyError, RegistryError, StoreError, StyleError,
};

use crate::source::SourceError;

/// Errors returned by [`Engine`](crate::Engine) operations.
#[derive(Debug, Error)]
pub enum EngineError {
    /// The index root is unusable.
    #[error("invalid index root {path}: {reason}")]
    Configuration {
        /// Rejected index root.
        path: Utf8PathBuf,
        /// What is wrong with it.
        reason: String,
    },
    /// The engine has not been configured, or has been shut down.
    #[error("engine is not configured")]
    NotConfigured,
    /// A store with the same key is already registered.
    #[error("store '{key}' is already registered")]
    DuplicateKey {
        /// Conflicting key.
        key: String,
    },
    /// A persistent store directory does not exist.
    #[error("directory {path} does not exist")]
    PathNotFound {
        /// Missing directory.
        path: Utf8PathBuf,
    },
    /// No store is registered under the key.
    #[error("no store is registered as '{key}'")]
    UnknownStore {
        /// Requested key.
        key: String,
    },
    /// A file could not be read.
    #[error("failed to read {path}: {source}")]
    Io {
        /// File being read.
        path: Utf8PathBuf,
        /// Underlying I/O error.
        #[source]
        source: io::Error,
    },
    /// Geodata or stylesheet text is malformed.
    #[error("failed to parse {path}: {message}")]
    Parse {
        /// File being parsed.
        path: Utf8PathBuf,
        /// Description of the problem.
        message: String,
    },
    /// The stylesheet could not be read.
    #[error("failed to load stylesheet {path}")]
    Style {
        /// Location of the stylesheet.
        path: Utf8PathBuf,
        /// Stylesheet error.
        #[source]
        source: StyleError,
    },
    /// An inline element is invalid.
    #[error(transparent)]
    InvalidElement(#[from] ElementError),
    /// A tile address or level range is invalid.
    #[error(transparent)]
    InvalidTile(#[from] QuadKeyError),
    /// An elevation query named a coordinate outside its tile.
    #[error("coordinate (lat {lat}, lon {lon}) lies outside tile {quad_key}")]
    OutOfBounds {
        /// Tile named by the query.
        quad_key: QuadKey,
        /// Requested latitude.
        lat: f64,
        /// Requested longitude.
        lon: f64,
    },
    /// An elevation source failed.
    #[error(transparent)]
    Elevation(ElevationError),
    /// A store failed while reading or writing.
    #[error("store '{key}' failed")]
    Store {
        /// Key of the failing store.
        key: String,
        /// Store error.
        #[source]
        source: StoreError,
    },
    /// The caller cancelled the operation.
    #[error("operation cancelled")]
    Cancelled,
    /// A background worker stopped before reporting a result.
    #[error("background worker failed")]
    Worker(#[source] tokio::task::JoinError),
}

impl EngineError {
    pub(crate) fn from_style(path: &camino::Utf8Path, err: StyleError) -> Self {
        match err {
            StyleError::Parse { line, message } => Self::Parse {
                path: path.to_path_buf(),
                message: format!("line {line}: {message}"),
            },
            source @ StyleError::Io { .. } => Self::Style {
                path: path.to_path_buf(),
                source,
            },
        }
    }
}

impl From<RegistryError> for EngineError {
    fn from(err: RegistryError) -> Self {
        match err {
            RegistryError::DuplicateKey { key } => Self::DuplicateKey { key },
            RegistryError::PathNotFound { path } => Self::PathNotFound { path },
            RegistryError::UnknownStore { key } => Self::UnknownStore { key },
            RegistryError::Io { path, source } => Self::Io { path, source },
            RegistryError::Store { key, source } => Self::Store { key, source },
        }
    }
}

impl From<ElevationError> for EngineError {
    fn from(err: ElevationError) -> Self {
        match err {
            ElevationError::OutOfBounds { quad_key, lat, lon } => {
                Self::OutOfBounds { quad_key, lat, lon }
            }
            other => Self::Elevation(other),
        }
    }
}

impl From<SourceError> for EngineError {
    fn from(err: SourceError) -> Self {
        match err {
            SourceError::Io { path, source } => Self::Io { path, source },
            other => Self::Parse {
                path: other.path().to_path_buf(),
                message: error_chain(&other),
            },
        }
    }
}

fn error_chain(err: &dyn std::error::Error) -> String {
    let mut message = err.to_string();
    let mut source = err.source();
    while let Some(cause) = source {
        message.push_str(": ");
        message.push_str(&cause.to_string());
        source = cause.source();
    }
    message
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    fn stylesheet_syntax_errors_are_parse_errors() {
        let err = EngineError::from_style(
            camino::Utf8Path::new("style.mapcss"),
            StyleError::Parse {
                line: 3,
                message: "expected '{'".to_owned(),
            },
        );
        match err {
            EngineError::Parse { path, message } => {
                assert_eq!(path, "style.mapcss");
                assert!(message.starts_with("line 3"));
            }
            other => panic!("expected a parse error, got {other:?}"),
        }
    }

    #[rstest]
    fn unreadable_stylesheets_are_style_errors() {
        let err = EngineError::from_style(
            camino::Utf8Path::new("style.mapcss"),
            StyleError::Io {
                path: "style.mapcss".into(),
                source: io::Error::from(io::ErrorKind::NotFound),
            },
        );
        assert!(matches!(err, EngineError::Style { .. }));
    }

    #[rstest]
    fn elevation_bounds_errors_keep_their_kind() {
        let quad_key = QuadKey::new(0, 0, 1).expect("tile");
        let err = EngineError::from(ElevationError::OutOfBounds {
            quad_key,
            lat: -10.0,
            lon: 10.0,
        });
        assert!(matches!(err, EngineError::OutOfBounds { .. }));
    }

    #[rstest]
    fn unsupported_sources_are_parse_errors() {
        let err = EngineError::from(SourceError::UnsupportedFormat {
            path: "data.osm".into(),
        });
        match err {
            EngineError::Parse { path, message } => {
                assert_eq!(path, "data.osm");
                assert!(message.contains("unsupported"));
            }
            other => panic!("expected a parse error, got {other:?}"),
        }
    }
}
