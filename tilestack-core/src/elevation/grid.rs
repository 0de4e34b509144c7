//! Per-quadkey height grids.
//!
//! A grid file `{lod}/{x}_{y}.ele` holds `rows cols` followed by
//! `rows × cols` heights in metres, whitespace separated. Row 0 lies on the
//! tile's northern edge and the last row on its southern edge.

use std::collections::HashMap;
use std::io;
use std::sync::{Arc, Mutex, PoisonError};

use camino::{Utf8Path, Utf8PathBuf};
use geo::Coord;

use super::{ElevationError, ElevationProvider, bilinear};
use crate::QuadKey;

#[derive(Debug, PartialEq)]
struct HeightGrid {
    rows: usize,
    cols: usize,
    heights: Vec<f64>,
}

impl HeightGrid {
    fn parse(path: &Utf8Path, text: &str) -> Result<Self, ElevationError> {
        let malformed = |message: String| ElevationError::Malformed {
            path: path.to_path_buf(),
            message,
        };
        let mut tokens = text.split_whitespace();
        let mut dimension = |name: &str| -> Result<usize, ElevationError> {
            let token = tokens
                .next()
                .ok_or_else(|| malformed(format!("missing {name}")))?;
            match token.parse::<usize>() {
                Ok(value) if value > 0 => Ok(value),
                _ => Err(malformed(format!("invalid {name} '{token}'"))),
            }
        };
        let rows = dimension("row count")?;
        let cols = dimension("column count")?;
        let expected = rows
            .checked_mul(cols)
            .ok_or_else(|| malformed(format!("{rows}x{cols} grid is too large")))?;

        let heights = tokens
            .map(|token| {
                token
                    .parse::<f64>()
                    .map_err(|_| malformed(format!("invalid height '{token}'")))
            })
            .collect::<Result<Vec<_>, _>>()?;
        if heights.len() != expected {
            return Err(malformed(format!(
                "expected {expected} heights for a {rows}x{cols} grid, found {}",
                heights.len()
            )));
        }
        Ok(Self {
            rows,
            cols,
            heights,
        })
    }

    fn elevation(&self, quad_key: &QuadKey, coordinate: Coord<f64>) -> f64 {
        let bounds = quad_key.bounds();
        let row_span = (self.rows - 1) as f64;
        let col_span = (self.cols - 1) as f64;
        let row = (bounds.max().y - coordinate.y) / bounds.height() * row_span;
        let col = (coordinate.x - bounds.min().x) / bounds.width() * col_span;
        bilinear(self.rows, self.cols, row, col, |r, c| {
            self.heights.get(r * self.cols + c).copied()
        })
    }
}

/// Provider reading height grids stored per quadkey.
///
/// Grids are cached after the first read. Tiles without a grid file sample
/// as sea level.
#[derive(Debug)]
pub struct GridElevation {
    directory: Utf8PathBuf,
    grids: Mutex<HashMap<QuadKey, Option<Arc<HeightGrid>>>>,
}

impl GridElevation {
    /// Provider reading from `directory`.
    pub fn new(directory: Utf8PathBuf) -> Self {
        Self {
            directory,
            grids: Mutex::new(HashMap::new()),
        }
    }

    /// Location of the grid file for `quad_key`.
    pub fn grid_path(&self, quad_key: &QuadKey) -> Utf8PathBuf {
        self.directory
            .join(quad_key.lod().to_string())
            .join(format!("{}_{}.ele", quad_key.tile_x(), quad_key.tile_y()))
    }

    fn grid(&self, quad_key: &QuadKey) -> Result<Option<Arc<HeightGrid>>, ElevationError> {
        if let Some(cached) = self
            .grids
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(quad_key)
        {
            return Ok(cached.clone());
        }

        let path = self.grid_path(quad_key);
        let loaded = match tilestack_fs::read_to_string(&path) {
            Ok(text) => Some(Arc::new(HeightGrid::parse(&path, &text)?)),
            Err(err) if err.kind() == io::ErrorKind::NotFound => None,
            Err(source) => return Err(ElevationError::Io { path, source }),
        };
        self.grids
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(*quad_key, loaded.clone());
        Ok(loaded)
    }
}

impl ElevationProvider for GridElevation {
    fn elevation(&self, quad_key: &QuadKey, coordinate: Coord<f64>) -> Result<f64, ElevationError> {
        Ok(self
            .grid(quad_key)?
            .map_or(0.0, |grid| grid.elevation(quad_key, coordinate)))
    }
}
