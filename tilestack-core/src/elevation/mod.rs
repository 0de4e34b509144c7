//! Elevation sources and the bounds-checked sampler.

mod grid;
mod srtm;

use std::io;
use std::sync::Arc;

use camino::{Utf8Path, Utf8PathBuf};
use geo::Coord;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::QuadKey;

pub use grid::GridElevation;
pub use srtm::{SrtmElevation, srtm_file_name};

/// Errors raised while sampling elevation.
#[derive(Debug, Error)]
pub enum ElevationError {
    /// The coordinate lies outside the tile the query names.
    #[error("coordinate (lat {lat}, lon {lon}) lies outside tile {quad_key}")]
    OutOfBounds {
        /// Tile named by the query.
        quad_key: QuadKey,
        /// Requested latitude.
        lat: f64,
        /// Requested longitude.
        lon: f64,
    },
    /// The boundary id does not name an elevation source.
    #[error("unknown elevation source id {id}")]
    UnknownType {
        /// Rejected id.
        id: i32,
    },
    /// An elevation file could not be read.
    #[error("failed to read elevation data {path}: {source}")]
    Io {
        /// File being read.
        path: Utf8PathBuf,
        /// Underlying I/O error.
        #[source]
        source: io::Error,
    },
    /// An elevation file had unexpected contents.
    #[error("malformed elevation data {path}: {message}")]
    Malformed {
        /// File being read.
        path: Utf8PathBuf,
        /// Description of the problem.
        message: String,
    },
}

/// Selectable elevation source.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ElevationType {
    /// Sea level everywhere.
    #[default]
    Flat,
    /// SRTM `.hgt` tiles.
    Srtm,
    /// Per-quadkey height grids.
    Grid,
}

impl ElevationType {
    /// Numeric id used across the binding boundary.
    pub const fn id(self) -> i32 {
        match self {
            Self::Flat => 0,
            Self::Srtm => 1,
            Self::Grid => 2,
        }
    }
}

impl TryFrom<i32> for ElevationType {
    type Error = ElevationError;

    fn try_from(id: i32) -> Result<Self, Self::Error> {
        match id {
            0 => Ok(Self::Flat),
            1 => Ok(Self::Srtm),
            2 => Ok(Self::Grid),
            _ => Err(ElevationError::UnknownType { id }),
        }
    }
}

/// Source of terrain heights in metres.
///
/// Implementations are read-only and shared between threads.
pub trait ElevationProvider: Send + Sync {
    /// Height at `coordinate`, using `quad_key` as context.
    ///
    /// Callers are responsible for bounds checks; providers sample whatever
    /// coordinate they receive.
    fn elevation(&self, quad_key: &QuadKey, coordinate: Coord<f64>) -> Result<f64, ElevationError>;
}

/// Provider that reports sea level everywhere.
#[derive(Debug, Clone, Copy, Default)]
pub struct FlatElevation;

impl ElevationProvider for FlatElevation {
    fn elevation(&self, _: &QuadKey, _: Coord<f64>) -> Result<f64, ElevationError> {
        Ok(0.0)
    }
}

/// Dispatches elevation queries to the source selected per call.
///
/// Data lives under one root directory: `srtm/` for `.hgt` tiles and
/// `grid/{lod}/{x}_{y}.ele` for height grids.
#[derive(Debug, Clone)]
pub struct ElevationSampler {
    flat: FlatElevation,
    srtm: Arc<SrtmElevation>,
    grid: Arc<GridElevation>,
}

impl ElevationSampler {
    /// Sampler reading data below `root`.
    pub fn new(root: &Utf8Path) -> Self {
        Self {
            flat: FlatElevation,
            srtm: Arc::new(SrtmElevation::new(root.join("srtm"))),
            grid: Arc::new(GridElevation::new(root.join("grid"))),
        }
    }

    /// Provider for `elevation_type`, without bounds checks.
    pub fn provider(&self, elevation_type: ElevationType) -> &dyn ElevationProvider {
        match elevation_type {
            ElevationType::Flat => &self.flat,
            ElevationType::Srtm => self.srtm.as_ref(),
            ElevationType::Grid => self.grid.as_ref(),
        }
    }

    /// Height at `coordinate`, which must lie inside `quad_key`.
    pub fn sample(
        &self,
        quad_key: &QuadKey,
        elevation_type: ElevationType,
        coordinate: Coord<f64>,
    ) -> Result<f64, ElevationError> {
        if !quad_key.contains(coordinate) {
            return Err(ElevationError::OutOfBounds {
                quad_key: *quad_key,
                lat: coordinate.y,
                lon: coordinate.x,
            });
        }
        self.provider(elevation_type).elevation(quad_key, coordinate)
    }
}

/// Bilinear interpolation over a `rows × cols` lattice.
///
/// `row` and `col` are fractional lattice positions; they are clamped to the
/// lattice.
pub(crate) fn bilinear(
    rows: usize,
    cols: usize,
    row: f64,
    col: f64,
    value: impl Fn(usize, usize) -> Option<f64>,
) -> f64 {
    let (row0, row1, row_t) = lattice_span(row, rows);
    let (col0, col1, col_t) = lattice_span(col, cols);
    let corners = [
        (value(row0, col0), (1.0 - row_t) * (1.0 - col_t)),
        (value(row0, col1), (1.0 - row_t) * col_t),
        (value(row1, col0), row_t * (1.0 - col_t)),
        (value(row1, col1), row_t * col_t),
    ];

    // Missing samples are left out and the remaining weights renormalised.
    let (sum, weight) = corners
        .iter()
        .filter_map(|(sample, weight)| sample.map(|height| (height * weight, *weight)))
        .fold((0.0, 0.0), |(sum, total), (part, weight)| {
            (sum + part, total + weight)
        });
    if weight > f64::EPSILON {
        sum / weight
    } else {
        corners
            .iter()
            .find_map(|(sample, _)| *sample)
            .unwrap_or(0.0)
    }
}

fn lattice_span(position: f64, len: usize) -> (usize, usize, f64) {
    let last = len.saturating_sub(1);
    let clamped = position.clamp(0.0, last as f64);
    // Clamped to the lattice, so the cast cannot truncate.
    let lower = clamped.floor() as usize;
    let upper = (lower + 1).min(last);
    let fraction = clamped - lower as f64;
    (lower, upper, fraction)
}
