//! Quadtree tile addressing.
//!
//! Tiles follow the Web-Mercator slippy-map scheme: level `n` splits the
//! world into `2^n × 2^n` tiles with tile `(0, 0)` at the north-west corner.
//! Coordinates are WGS84 with `x = longitude` and `y = latitude`.

use std::f64::consts::PI;
use std::fmt;
use std::ops::RangeInclusive;

use geo::{Coord, Rect};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Finest level of detail accepted by the engine.
pub const MAX_LEVEL_OF_DETAIL: u8 = 20;

/// Northern limit of the Web-Mercator projection in degrees.
pub const MAX_LATITUDE: f64 = 85.051_128_779_806_59;

/// Southern limit of the Web-Mercator projection in degrees.
pub const MIN_LATITUDE: f64 = -MAX_LATITUDE;

/// Errors raised when constructing tile addresses.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum QuadKeyError {
    /// The level of detail exceeds [`MAX_LEVEL_OF_DETAIL`].
    #[error("level of detail {lod} exceeds the supported maximum {MAX_LEVEL_OF_DETAIL}")]
    InvalidLevelOfDetail {
        /// Rejected level.
        lod: u8,
    },
    /// The tile column or row does not exist at the requested level.
    #[error("tile ({tile_x}, {tile_y}) does not exist at level of detail {lod}")]
    TileOutOfRange {
        /// Requested column.
        tile_x: u32,
        /// Requested row.
        tile_y: u32,
        /// Requested level.
        lod: u8,
    },
    /// A level-of-detail range had its bounds reversed.
    #[error("level of detail range [{minimum}, {maximum}] is empty")]
    InvalidLodRange {
        /// Lower bound supplied by the caller.
        minimum: u8,
        /// Upper bound supplied by the caller.
        maximum: u8,
    },
}

/// Address of one tile in the quadtree.
///
/// Ordering compares the level of detail first, then the column, then the
/// row, so sorted collections group tiles by level.
///
/// # Examples
/// ```
/// use geo::Coord;
/// use tilestack_core::QuadKey;
///
/// # fn main() -> Result<(), tilestack_core::QuadKeyError> {
/// let berlin = QuadKey::from_coordinate(Coord { x: 13.4050, y: 52.5200 }, 15)?;
/// assert!(berlin.contains(Coord { x: 13.4050, y: 52.5200 }));
/// assert_eq!(berlin.lod(), 15);
/// # Ok(())
/// # }
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct QuadKey {
    lod: u8,
    tile_x: u32,
    tile_y: u32,
}

impl QuadKey {
    /// Validate and construct a tile address.
    pub fn new(tile_x: u32, tile_y: u32, lod: u8) -> Result<Self, QuadKeyError> {
        if lod > MAX_LEVEL_OF_DETAIL {
            return Err(QuadKeyError::InvalidLevelOfDetail { lod });
        }
        let per_axis = tiles_per_axis(lod);
        if tile_x >= per_axis || tile_y >= per_axis {
            return Err(QuadKeyError::TileOutOfRange {
                tile_x,
                tile_y,
                lod,
            });
        }
        Ok(Self {
            lod,
            tile_x,
            tile_y,
        })
    }

    /// Tile column.
    pub const fn tile_x(&self) -> u32 {
        self.tile_x
    }

    /// Tile row, counted from the north.
    pub const fn tile_y(&self) -> u32 {
        self.tile_y
    }

    /// Level of detail.
    pub const fn lod(&self) -> u8 {
        self.lod
    }

    /// Return the tile containing `coordinate` at `lod`.
    ///
    /// Latitudes beyond the Mercator limits are clamped to the outermost row
    /// and longitudes are clamped to `[-180, 180]`. Points on a shared edge
    /// belong to the tile to the east/south, except on the eastern and
    /// southern world edges.
    pub fn from_coordinate(coordinate: Coord<f64>, lod: u8) -> Result<Self, QuadKeyError> {
        if lod > MAX_LEVEL_OF_DETAIL {
            return Err(QuadKeyError::InvalidLevelOfDetail { lod });
        }
        Ok(Self {
            lod,
            tile_x: column_of(coordinate.x, lod),
            tile_y: row_of(coordinate.y, lod),
        })
    }

    /// Geographic bounds of the tile.
    pub fn bounds(&self) -> Rect<f64> {
        let west = longitude_of(self.tile_x, self.lod);
        let east = longitude_of(self.tile_x + 1, self.lod);
        let north = latitude_of(self.tile_y, self.lod);
        let south = latitude_of(self.tile_y + 1, self.lod);
        Rect::new(Coord { x: west, y: south }, Coord { x: east, y: north })
    }

    /// Whether `coordinate` lies inside the tile bounds, edges included.
    pub fn contains(&self, coordinate: Coord<f64>) -> bool {
        let bounds = self.bounds();
        (bounds.min().x..=bounds.max().x).contains(&coordinate.x)
            && (bounds.min().y..=bounds.max().y).contains(&coordinate.y)
    }

    /// The tile one level up that covers this one.
    pub fn parent(&self) -> Option<Self> {
        Some(Self {
            lod: self.lod.checked_sub(1)?,
            tile_x: self.tile_x / 2,
            tile_y: self.tile_y / 2,
        })
    }

    /// The four tiles one level down, in north-west, north-east, south-west,
    /// south-east order.
    pub fn children(&self) -> Option<[Self; 4]> {
        if self.lod >= MAX_LEVEL_OF_DETAIL {
            return None;
        }
        let lod = self.lod + 1;
        let x = self.tile_x * 2;
        let y = self.tile_y * 2;
        Some([
            Self { lod, tile_x: x, tile_y: y },
            Self { lod, tile_x: x + 1, tile_y: y },
            Self { lod, tile_x: x, tile_y: y + 1 },
            Self { lod, tile_x: x + 1, tile_y: y + 1 },
        ])
    }

    /// Tiles at `lod` intersecting `bbox`.
    ///
    /// The iterator visits rows north to south and columns west to east.
    pub fn covering(bbox: &Rect<f64>, lod: u8) -> Result<TileCover, QuadKeyError> {
        let north_west = Self::from_coordinate(
            Coord {
                x: bbox.min().x,
                y: bbox.max().y,
            },
            lod,
        )?;
        let south_east = Self::from_coordinate(
            Coord {
                x: bbox.max().x,
                y: bbox.min().y,
            },
            lod,
        )?;
        Ok(TileCover {
            lod,
            columns: north_west.tile_x..=south_east.tile_x,
            rows: north_west.tile_y..=south_east.tile_y,
            next: Some((north_west.tile_x, north_west.tile_y)),
        })
    }

    /// Bing-style quadkey string, one base-4 digit per level.
    pub fn to_quadkey_string(&self) -> String {
        (1..=self.lod)
            .rev()
            .map(|level| {
                let mask = 1_u32 << (level - 1);
                let mut digit = b'0';
                if self.tile_x & mask != 0 {
                    digit += 1;
                }
                if self.tile_y & mask != 0 {
                    digit += 2;
                }
                char::from(digit)
            })
            .collect()
    }
}

impl fmt::Display for QuadKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}/{}", self.lod, self.tile_x, self.tile_y)
    }
}

/// Iterator over the tiles covering a bounding box.
#[derive(Debug, Clone)]
pub struct TileCover {
    lod: u8,
    columns: RangeInclusive<u32>,
    rows: RangeInclusive<u32>,
    next: Option<(u32, u32)>,
}

impl TileCover {
    /// Number of tiles the iterator yields in total.
    pub fn tile_count(&self) -> u64 {
        let width = u64::from(self.columns.end() - self.columns.start()) + 1;
        let height = u64::from(self.rows.end() - self.rows.start()) + 1;
        width * height
    }
}

impl Iterator for TileCover {
    type Item = QuadKey;

    fn next(&mut self) -> Option<Self::Item> {
        let (x, y) = self.next?;
        self.next = if x < *self.columns.end() {
            Some((x + 1, y))
        } else if y < *self.rows.end() {
            Some((*self.columns.start(), y + 1))
        } else {
            None
        };
        Some(QuadKey {
            lod: self.lod,
            tile_x: x,
            tile_y: y,
        })
    }
}

/// Closed, inclusive range of levels of detail.
///
/// # Examples
/// ```
/// use tilestack_core::LodRange;
///
/// # fn main() -> Result<(), tilestack_core::QuadKeyError> {
/// let range = LodRange::new(14, 16)?;
/// assert_eq!(range.levels().collect::<Vec<_>>(), vec![14, 15, 16]);
/// assert!(LodRange::new(16, 14).is_err());
/// # Ok(())
/// # }
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct LodRange {
    minimum: u8,
    maximum: u8,
}

impl LodRange {
    /// Validate and construct a range.
    pub fn new(minimum: u8, maximum: u8) -> Result<Self, QuadKeyError> {
        if maximum > MAX_LEVEL_OF_DETAIL {
            return Err(QuadKeyError::InvalidLevelOfDetail { lod: maximum });
        }
        if minimum > maximum {
            return Err(QuadKeyError::InvalidLodRange { minimum, maximum });
        }
        Ok(Self { minimum, maximum })
    }

    /// Range holding a single level.
    pub fn single(lod: u8) -> Result<Self, QuadKeyError> {
        Self::new(lod, lod)
    }

    /// Lower bound.
    pub const fn minimum(&self) -> u8 {
        self.minimum
    }

    /// Upper bound.
    pub const fn maximum(&self) -> u8 {
        self.maximum
    }

    /// Whether `lod` lies inside the range.
    pub const fn contains(&self, lod: u8) -> bool {
        lod >= self.minimum && lod <= self.maximum
    }

    /// Iterate the levels from coarse to fine.
    pub fn levels(&self) -> RangeInclusive<u8> {
        self.minimum..=self.maximum
    }
}

/// Number of tiles along one axis at `lod`.
pub const fn tiles_per_axis(lod: u8) -> u32 {
    1_u32 << lod
}

fn column_of(longitude: f64, lod: u8) -> u32 {
    let per_axis = f64::from(tiles_per_axis(lod));
    let lon = longitude.clamp(-180.0, 180.0);
    let column = ((lon + 180.0) / 360.0 * per_axis).floor();
    clamp_index(column, lod)
}

fn row_of(latitude: f64, lod: u8) -> u32 {
    let per_axis = f64::from(tiles_per_axis(lod));
    let lat_rad = latitude.clamp(MIN_LATITUDE, MAX_LATITUDE).to_radians();
    let row = ((1.0 - lat_rad.tan().asinh() / PI) / 2.0 * per_axis).floor();
    clamp_index(row, lod)
}

fn clamp_index(value: f64, lod: u8) -> u32 {
    let last = tiles_per_axis(lod) - 1;
    if value <= 0.0 {
        0
    } else if value >= f64::from(last) {
        last
    } else {
        // Bounded by the branches above, so the cast cannot truncate.
        value as u32
    }
}

fn longitude_of(column: u32, lod: u8) -> f64 {
    f64::from(column) / f64::from(tiles_per_axis(lod)) * 360.0 - 180.0
}

fn latitude_of(row: u32, lod: u8) -> f64 {
    let y = f64::from(row) / f64::from(tiles_per_axis(lod));
    (PI * (1.0 - 2.0 * y)).sinh().atan().to_degrees()
}
