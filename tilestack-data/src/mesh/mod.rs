//! Renderable meshes built from stored elements.
//!
//! Vertices are `[longitude, latitude, metres]`; triangles index into the
//! vertex list three at a time, counter-clockwise seen from above. Each
//! vertex carries a packed `0xRRGGBB` colour.

mod building;
mod road;
mod terrain;

use geo::{Coord, TriangulateEarcut};
use log::debug;
use serde::Serialize;
use tilestack_core::{
    Element, ElementGeometry, ElevationError, ElevationProvider, QuadKey, Style,
};

pub use building::{DEFAULT_BUILDING_HEIGHT, DEFAULT_LEVEL_HEIGHT, building_height};
pub(crate) use terrain::TerrainGrid;

/// Colour used when a style has no `color` declaration.
pub const DEFAULT_COLOUR: u32 = 0x00cc_cccc;

/// Approximate metres per degree of latitude.
pub(crate) const METRES_PER_DEGREE: f64 = 111_320.0;

/// Triangle mesh ready for rendering.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct Mesh {
    /// Identifies what the mesh represents, e.g. `building:42`.
    pub name: String,
    /// Vertex positions.
    pub vertices: Vec<[f64; 3]>,
    /// Vertex indices, three per triangle.
    pub triangles: Vec<u32>,
    /// Per-vertex colours.
    pub colors: Vec<u32>,
}

impl Mesh {
    /// Empty mesh called `name`.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Self::default()
        }
    }

    /// Number of vertices.
    pub fn vertex_count(&self) -> usize {
        self.vertices.len()
    }

    /// Number of triangles.
    pub fn triangle_count(&self) -> usize {
        self.triangles.len() / 3
    }

    /// Whether the mesh has no triangles.
    pub fn is_empty(&self) -> bool {
        self.triangles.is_empty()
    }

    fn push_vertex(&mut self, coordinate: Coord<f64>, height: f64, colour: u32) -> u32 {
        // Tile meshes stay far below u32::MAX vertices.
        let index = u32::try_from(self.vertices.len()).unwrap_or(u32::MAX);
        self.vertices.push([coordinate.x, coordinate.y, height]);
        self.colors.push(colour);
        index
    }

    fn push_triangle(&mut self, a: u32, b: u32, c: u32) {
        self.triangles.extend([a, b, c]);
    }
}

/// Mesh generator named by a style's `builder` declaration.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BuilderKind {
    /// Areas draped on the terrain.
    Terrain,
    /// Footprints extruded to their height.
    Building,
    /// Lines widened into flat ribbons.
    Road,
}

impl BuilderKind {
    /// Builder requested by `style`, if any.
    pub fn from_style(style: &Style) -> Option<Self> {
        match style.get("builder")? {
            "terrain" => Some(Self::Terrain),
            "building" => Some(Self::Building),
            "road" => Some(Self::Road),
            "none" => None,
            other => {
                debug!("ignoring unknown builder '{other}'");
                None
            }
        }
    }
}

/// Elevation lookups for one tile.
#[derive(Clone, Copy)]
pub(crate) struct MeshContext<'a> {
    pub quad_key: &'a QuadKey,
    pub elevation: &'a dyn ElevationProvider,
}

impl MeshContext<'_> {
    fn height(&self, coordinate: Coord<f64>) -> Result<f64, ElevationError> {
        self.elevation.elevation(self.quad_key, coordinate)
    }
}

/// Build the mesh `style` asks for, or `None` when the element has no
/// visual representation.
pub(crate) fn element_mesh(
    context: MeshContext<'_>,
    element: &Element,
    style: &Style,
) -> Result<Option<Mesh>, ElevationError> {
    let Some(kind) = BuilderKind::from_style(style) else {
        return Ok(None);
    };
    let colour = style.colour("color").unwrap_or(DEFAULT_COLOUR);
    let mesh = match (kind, &element.geometry) {
        (BuilderKind::Terrain, ElementGeometry::Area(shape)) => {
            let mut mesh = Mesh::new(format!("terrain:{}", element.id));
            for polygon in shape {
                for triangle in polygon.earcut_triangles() {
                    let mut corners = [0; 3];
                    for (slot, corner) in corners.iter_mut().zip(triangle.to_array()) {
                        *slot = mesh.push_vertex(corner, context.height(corner)?, colour);
                    }
                    mesh.push_triangle(corners[0], corners[1], corners[2]);
                }
            }
            mesh
        }
        (BuilderKind::Building, ElementGeometry::Area(shape)) => building::extrude(
            context,
            element.id,
            shape,
            building_height(element, style),
            colour,
        )?,
        (BuilderKind::Road, ElementGeometry::Line(lines)) => {
            let width = style.number("width").unwrap_or(road::DEFAULT_ROAD_WIDTH);
            road::ribbon(context, element.id, lines.iter(), width, colour)?
        }
        (BuilderKind::Road, ElementGeometry::Area(shape)) => {
            let width = style.number("width").unwrap_or(road::DEFAULT_ROAD_WIDTH);
            road::ribbon(
                context,
                element.id,
                shape.iter().map(geo::Polygon::exterior),
                width,
                colour,
            )?
        }
        _ => return Ok(None),
    };
    Ok((!mesh.is_empty()).then_some(mesh))
}
