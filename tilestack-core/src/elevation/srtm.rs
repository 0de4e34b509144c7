//! SRTM `.hgt` elevation tiles.
//!
//! Each file covers one degree square named after its south-west corner
//! (`N35E138.hgt`). Samples are big-endian `i16` metres in rows from north
//! to south; SRTM1 files hold 3601 × 3601 samples and SRTM3 files
//! 1201 × 1201. The value `-32768` marks a void.

use std::collections::HashMap;
use std::io;
use std::sync::{Arc, Mutex, PoisonError};

use camino::{Utf8Path, Utf8PathBuf};
use geo::Coord;
use log::debug;

use super::{ElevationError, ElevationProvider, bilinear};
use crate::QuadKey;

/// Marker for samples without data.
const VOID_SAMPLE: i16 = -32768;

const SRTM1_SIZE: usize = 3601;
const SRTM3_SIZE: usize = 1201;

/// Name of the `.hgt` file covering the degree square at `(lat, lon)`.
///
/// # Examples
/// ```
/// use tilestack_core::srtm_file_name;
///
/// assert_eq!(srtm_file_name(35.5, 138.7), "N35E138.hgt");
/// assert_eq!(srtm_file_name(-12.1, -77.0), "S13W077.hgt");
/// ```
pub fn srtm_file_name(lat: f64, lon: f64) -> String {
    let (lat_floor, lon_floor) = cell_of(lat, lon);
    let north_south = if lat_floor >= 0 { 'N' } else { 'S' };
    let east_west = if lon_floor >= 0 { 'E' } else { 'W' };
    format!(
        "{north_south}{:02}{east_west}{:03}.hgt",
        lat_floor.unsigned_abs(),
        lon_floor.unsigned_abs()
    )
}

fn cell_of(lat: f64, lon: f64) -> (i32, i32) {
    // Degrees fit comfortably in i32 once floored.
    (lat.floor() as i32, lon.floor() as i32)
}

#[derive(Debug)]
struct SrtmTile {
    size: usize,
    samples: Vec<i16>,
}

impl SrtmTile {
    fn parse(path: &Utf8Path, bytes: &[u8]) -> Result<Self, ElevationError> {
        let size = match bytes.len() {
            len if len == SRTM1_SIZE * SRTM1_SIZE * 2 => SRTM1_SIZE,
            len if len == SRTM3_SIZE * SRTM3_SIZE * 2 => SRTM3_SIZE,
            len => {
                return Err(ElevationError::Malformed {
                    path: path.to_path_buf(),
                    message: format!("{len} bytes is neither an SRTM1 nor an SRTM3 tile"),
                });
            }
        };
        let samples = bytes
            .chunks_exact(2)
            .map(|pair| i16::from_be_bytes([pair[0], pair[1]]))
            .collect();
        Ok(Self { size, samples })
    }

    fn sample(&self, row: usize, col: usize) -> Option<f64> {
        let value = *self.samples.get(row * self.size + col)?;
        (value != VOID_SAMPLE).then(|| f64::from(value))
    }

    fn elevation(&self, lat: f64, lon: f64, lat_floor: i32, lon_floor: i32) -> f64 {
        let span = (self.size - 1) as f64;
        let row = (f64::from(lat_floor) + 1.0 - lat) * span;
        let col = (lon - f64::from(lon_floor)) * span;
        bilinear(self.size, self.size, row, col, |r, c| self.sample(r, c))
    }
}

/// Provider reading `.hgt` files from one directory.
///
/// Tiles are loaded on first use and cached, including the fact that a file
/// is missing. Missing files sample as sea level.
#[derive(Debug)]
pub struct SrtmElevation {
    directory: Utf8PathBuf,
    tiles: Mutex<HashMap<(i32, i32), Option<Arc<SrtmTile>>>>,
}

impl SrtmElevation {
    /// Provider reading from `directory`.
    pub fn new(directory: Utf8PathBuf) -> Self {
        Self {
            directory,
            tiles: Mutex::new(HashMap::new()),
        }
    }

    fn tile(&self, lat: f64, lon: f64) -> Result<Option<Arc<SrtmTile>>, ElevationError> {
        let cell = cell_of(lat, lon);
        if let Some(cached) = self
            .tiles
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&cell)
        {
            return Ok(cached.clone());
        }

        let path = self.directory.join(srtm_file_name(lat, lon));
        let loaded = match tilestack_fs::read_bytes(&path) {
            Ok(bytes) => Some(Arc::new(SrtmTile::parse(&path, &bytes)?)),
            Err(err) if err.kind() == io::ErrorKind::NotFound => {
                debug!("no SRTM tile at {path}; sampling sea level");
                None
            }
            Err(source) => return Err(ElevationError::Io { path, source }),
        };
        self.tiles
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(cell, loaded.clone());
        Ok(loaded)
    }
}

impl ElevationProvider for SrtmElevation {
    fn elevation(&self, _: &QuadKey, coordinate: Coord<f64>) -> Result<f64, ElevationError> {
        let Coord { x: lon, y: lat } = coordinate;
        let Some(tile) = self.tile(lat, lon)? else {
            return Ok(0.0);
        };
        let (lat_floor, lon_floor) = cell_of(lat, lon);
        Ok(tile.elevation(lat, lon, lat_floor, lon_floor))
    }
}
