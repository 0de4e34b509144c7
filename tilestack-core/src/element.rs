//! Geographic features stored in tiles.

use std::collections::HashMap;

use geo::{
    BooleanOps, BoundingRect, Coord, Intersects, LineString, MultiLineString, MultiPolygon, Point,
    Polygon, Rect,
};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Free-form key/value annotations in the OpenStreetMap style.
pub type Tags = HashMap<String, String>;

/// Tag keys whose presence turns an open coordinate sequence into an area.
const AREA_KEYS: [&str; 5] = ["building", "landuse", "leisure", "natural", "amenity"];

/// Errors raised while building an [`Element`].
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ElementError {
    /// No coordinates were supplied.
    #[error("element {id} has no coordinates")]
    Empty {
        /// Identifier of the rejected element.
        id: u64,
    },
    /// A coordinate was not finite or lay outside WGS84 bounds.
    #[error("element {id} has an invalid coordinate (lat {lat}, lon {lon})")]
    InvalidCoordinate {
        /// Identifier of the rejected element.
        id: u64,
        /// Latitude as supplied.
        lat: f64,
        /// Longitude as supplied.
        lon: f64,
    },
    /// A flat vertex sequence had an odd number of values.
    #[error("element {id} has {len} vertex values; expected latitude/longitude pairs")]
    UnpairedVertex {
        /// Identifier of the rejected element.
        id: u64,
        /// Number of values received.
        len: usize,
    },
    /// A flat tag sequence had an odd number of values.
    #[error("element {id} has {len} tag values; expected key/value pairs")]
    UnpairedTag {
        /// Identifier of the rejected element.
        id: u64,
        /// Number of values received.
        len: usize,
    },
}

/// Broad geometry class used by style selectors.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum GeometryKind {
    /// A single position.
    Point,
    /// One or more open polylines.
    Line,
    /// One or more polygons, holes allowed.
    Area,
}

/// Structured geometry of an [`Element`].
///
/// Coordinates are WGS84 with `x = longitude` and `y = latitude`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum ElementGeometry {
    /// A single position.
    Point(Point<f64>),
    /// Polylines, e.g. a road segment.
    Line(MultiLineString<f64>),
    /// Polygons, e.g. a building footprint.
    Area(MultiPolygon<f64>),
}

impl ElementGeometry {
    /// Geometry class of this value.
    pub const fn kind(&self) -> GeometryKind {
        match self {
            Self::Point(_) => GeometryKind::Point,
            Self::Line(_) => GeometryKind::Line,
            Self::Area(_) => GeometryKind::Area,
        }
    }

    /// Axis-aligned bounds, or `None` for empty collections.
    pub fn bounding_rect(&self) -> Option<Rect<f64>> {
        match self {
            Self::Point(point) => Some(point.bounding_rect()),
            Self::Line(lines) => lines.bounding_rect(),
            Self::Area(polygons) => polygons.bounding_rect(),
        }
    }

    /// Restrict the geometry to `rect`.
    ///
    /// Returns `None` when nothing of the geometry lies inside the rectangle.
    /// Points on the rectangle boundary are kept.
    pub fn clip(&self, rect: &Rect<f64>) -> Option<Self> {
        match self {
            Self::Point(point) => rect.intersects(point).then_some(Self::Point(*point)),
            Self::Line(lines) => {
                let window = MultiPolygon::new(vec![rect.to_polygon()]);
                let clipped = window.clip(lines, false);
                let kept: Vec<_> = clipped
                    .into_iter()
                    .filter(|line| line.0.len() >= 2)
                    .collect();
                (!kept.is_empty()).then(|| Self::Line(MultiLineString::new(kept)))
            }
            Self::Area(polygons) => {
                let window = MultiPolygon::new(vec![rect.to_polygon()]);
                let clipped = polygons.intersection(&window);
                (!clipped.0.is_empty()).then_some(Self::Area(clipped))
            }
        }
    }
}

/// A single discrete geographic feature.
///
/// # Examples
/// ```
/// use geo::Coord;
/// use tilestack_core::{Element, GeometryKind, Tags};
///
/// # fn main() -> Result<(), tilestack_core::ElementError> {
/// let tags = Tags::from([("building".to_owned(), "yes".to_owned())]);
/// let footprint = vec![
///     Coord { x: 13.40, y: 52.52 },
///     Coord { x: 13.41, y: 52.52 },
///     Coord { x: 13.41, y: 52.53 },
///     Coord { x: 13.40, y: 52.53 },
/// ];
/// let element = Element::from_coordinates(1, footprint, tags)?;
/// assert_eq!(element.geometry.kind(), GeometryKind::Area);
/// # Ok(())
/// # }
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Element {
    /// Unique identifier within a store.
    pub id: u64,
    /// Structured geometry.
    pub geometry: ElementGeometry,
    /// Free-form annotations.
    pub tags: Tags,
}

impl Element {
    /// Construct an element from already structured geometry.
    pub fn new(id: u64, geometry: ElementGeometry, tags: Tags) -> Self {
        Self { id, geometry, tags }
    }

    /// Build an element from an ordered coordinate sequence.
    ///
    /// One coordinate becomes a point. A closed ring of at least four
    /// coordinates becomes an area, as does an open sequence of at least
    /// three coordinates whose tags imply an area (the ring is closed
    /// automatically). Anything else is a line.
    pub fn from_coordinates(
        id: u64,
        coordinates: Vec<Coord<f64>>,
        tags: Tags,
    ) -> Result<Self, ElementError> {
        if coordinates.is_empty() {
            return Err(ElementError::Empty { id });
        }
        for coordinate in &coordinates {
            validate_coordinate(id, *coordinate)?;
        }

        let closed = coordinates.len() >= 4 && coordinates.first() == coordinates.last();
        let geometry = if let [single] = coordinates.as_slice() {
            ElementGeometry::Point(Point(*single))
        } else if closed || (coordinates.len() >= 3 && implies_area(&tags)) {
            // `Polygon::new` closes open exteriors.
            let ring = LineString::new(coordinates);
            ElementGeometry::Area(MultiPolygon::new(vec![Polygon::new(ring, Vec::new())]))
        } else {
            ElementGeometry::Line(MultiLineString::new(vec![LineString::new(coordinates)]))
        };

        Ok(Self { id, geometry, tags })
    }

    /// Copy of this element with its geometry clipped to `rect`.
    pub fn clip_to(&self, rect: &Rect<f64>) -> Option<Self> {
        let geometry = self.geometry.clip(rect)?;
        Some(Self {
            id: self.id,
            geometry,
            tags: self.tags.clone(),
        })
    }

    /// Look up a tag value.
    pub fn tag(&self, key: &str) -> Option<&str> {
        self.tags.get(key).map(String::as_str)
    }
}

/// Whether `tags` mark an open way as an area.
pub fn implies_area(tags: &Tags) -> bool {
    if tags.get("area").is_some_and(|value| value == "no") {
        return false;
    }
    tags.get("area").is_some_and(|value| value == "yes")
        || AREA_KEYS.iter().any(|key| tags.contains_key(*key))
}

fn validate_coordinate(id: u64, coordinate: Coord<f64>) -> Result<(), ElementError> {
    let Coord { x: lon, y: lat } = coordinate;
    let valid = lon.is_finite()
        && lat.is_finite()
        && (-180.0..=180.0).contains(&lon)
        && (-90.0..=90.0).contains(&lat);
    if valid {
        Ok(())
    } else {
        Err(ElementError::InvalidCoordinate { id, lat, lon })
    }
}
