//! Tile loading: stored elements in, meshes and styled elements out.
//!
//! Cancellation is checked before any work, after reading the stores,
//! before each terrain row and before each element. Events already
//! delivered stay valid when a load later fails or is cancelled.

mod stream;

use camino::{Utf8Path, Utf8PathBuf};
use log::debug;
use serde::Serialize;
use tilestack_core::{
    Element, ElevationSampler, ElevationType, QuadKey, StoreRegistry, Style, Stylesheet,
};
use tokio_util::sync::CancellationToken;

use crate::EngineError;
use crate::mesh::{DEFAULT_COLOUR, Mesh, MeshContext, TerrainGrid, element_mesh};

pub use stream::{LoadEvent, LoadStream};

/// One tile to load.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TileRequest {
    /// Tile to load.
    pub quad_key: QuadKey,
    /// Stylesheet used to build meshes.
    pub style_path: Utf8PathBuf,
    /// Elevation source for terrain and draped geometry.
    pub elevation_type: ElevationType,
}

impl TileRequest {
    /// Request for `quad_key` styled by `style_path`, on flat terrain.
    pub fn new(quad_key: QuadKey, style_path: &Utf8Path) -> Self {
        Self {
            quad_key,
            style_path: style_path.to_path_buf(),
            elevation_type: ElevationType::default(),
        }
    }

    /// Use `elevation_type` for heights.
    #[must_use]
    pub const fn with_elevation(mut self, elevation_type: ElevationType) -> Self {
        self.elevation_type = elevation_type;
        self
    }
}

/// A stored element together with the style it resolved to.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LoadedElement {
    /// The element as clipped to the tile.
    pub element: Element,
    /// Declarations applying to it at the tile's level.
    pub style: Style,
}

/// Receives load output as it is produced.
pub trait LoadSink {
    /// A mesh is ready.
    fn on_mesh_built(&mut self, tag: u64, mesh: Mesh);

    /// A styled element was loaded.
    fn on_element_loaded(&mut self, tag: u64, element: LoadedElement);
}

/// Sink collecting everything into vectors.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CollectingSink {
    /// Meshes in emission order.
    pub meshes: Vec<Mesh>,
    /// Elements in emission order.
    pub elements: Vec<LoadedElement>,
}

impl LoadSink for CollectingSink {
    fn on_mesh_built(&mut self, _tag: u64, mesh: Mesh) {
        self.meshes.push(mesh);
    }

    fn on_element_loaded(&mut self, _tag: u64, element: LoadedElement) {
        self.elements.push(element);
    }
}

/// Totals for a completed load.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct LoadSummary {
    /// Caller-supplied correlation tag.
    pub tag: u64,
    /// Loaded tile.
    pub quad_key: QuadKey,
    /// Meshes emitted.
    pub meshes: usize,
    /// Elements emitted.
    pub elements: usize,
    /// Vertices across all meshes.
    pub vertices: usize,
    /// Triangles across all meshes.
    pub triangles: usize,
}

impl LoadSummary {
    fn new(tag: u64, quad_key: QuadKey) -> Self {
        Self {
            tag,
            quad_key,
            meshes: 0,
            elements: 0,
            vertices: 0,
            triangles: 0,
        }
    }

    fn emit_mesh(&mut self, sink: &mut dyn LoadSink, mesh: Mesh) {
        self.meshes += 1;
        self.vertices += mesh.vertex_count();
        self.triangles += mesh.triangle_count();
        sink.on_mesh_built(self.tag, mesh);
    }

    fn emit_element(&mut self, sink: &mut dyn LoadSink, element: LoadedElement) {
        self.elements += 1;
        sink.on_element_loaded(self.tag, element);
    }
}

fn checkpoint(cancel: &CancellationToken) -> Result<(), EngineError> {
    if cancel.is_cancelled() {
        Err(EngineError::Cancelled)
    } else {
        Ok(())
    }
}

/// Everything a load needs from the engine.
pub(crate) struct LoadContext<'a> {
    pub registry: &'a StoreRegistry,
    pub elevation: &'a ElevationSampler,
    pub terrain_grid_cells: u32,
}

/// Load one tile, streaming output into `sink`.
pub(crate) fn load_tile(
    context: &LoadContext<'_>,
    tag: u64,
    request: &TileRequest,
    cancel: &CancellationToken,
    sink: &mut dyn LoadSink,
) -> Result<LoadSummary, EngineError> {
    checkpoint(cancel)?;
    let quad_key = request.quad_key;
    let lod = quad_key.lod();
    let mut summary = LoadSummary::new(tag, quad_key);

    let elements = context.registry.elements_for(&quad_key)?;
    checkpoint(cancel)?;
    if elements.is_empty() {
        debug!("load {quad_key} (tag {tag}): no stored data");
        return Ok(summary);
    }

    let stylesheet = Stylesheet::from_path(&request.style_path)
        .map_err(|err| EngineError::from_style(&request.style_path, err))?;
    let mesh_context = MeshContext {
        quad_key: &quad_key,
        elevation: context.elevation.provider(request.elevation_type),
    };

    let canvas = stylesheet.canvas(lod);
    let cells = canvas
        .number("grid-cells")
        .filter(|cells| cells.is_finite() && *cells >= 1.0)
        .map_or(context.terrain_grid_cells, |cells| cells.min(256.0) as u32);
    let mut terrain = TerrainGrid::new(
        mesh_context,
        cells,
        canvas.colour("color").unwrap_or(DEFAULT_COLOUR),
    );
    while !terrain.is_complete() {
        checkpoint(cancel)?;
        terrain.build_row()?;
    }
    summary.emit_mesh(sink, terrain.finish());

    for element in elements {
        checkpoint(cancel)?;
        let Some(style) = stylesheet.style_for(&element, lod) else {
            continue;
        };
        let mesh = element_mesh(mesh_context, &element, &style)?;
        summary.emit_element(sink, LoadedElement { element, style });
        if let Some(mesh) = mesh {
            summary.emit_mesh(sink, mesh);
        }
    }

    debug!(
        "load {quad_key} (tag {tag}): {} meshes, {} elements",
        summary.meshes, summary.elements
    );
    Ok(summary)
}
