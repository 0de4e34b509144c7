//! Load command implementation for the tilestack CLI.

use std::io::Write;

use camino::Utf8PathBuf;
use clap::Parser;
use log::debug;
use ortho_config::{OrthoConfig, SubcmdConfigMerge};
use serde::{Deserialize, Serialize};
use tilestack_data::{CancellationToken, LoadSink, LoadedElement, Mesh, TileRequest};

use crate::{
    ARG_ELEVATION_TYPE, ARG_INDEX_ROOT, ARG_LOD, ARG_STYLE, ARG_TAG, ARG_TILE_X, ARG_TILE_Y,
    CliError, TileEnv, elevation_type, require_existing, required, tile_from_parts, with_engine,
    write_json,
};

pub(crate) const ENV_LOAD_INDEX_ROOT: &str = "TILESTACK_CMDS_LOAD_INDEX_ROOT";
pub(crate) const ENV_LOAD_STYLE: &str = "TILESTACK_CMDS_LOAD_STYLE";
const LOAD_TILE_ENV: TileEnv = TileEnv {
    tile_x: "TILESTACK_CMDS_LOAD_TILE_X",
    tile_y: "TILESTACK_CMDS_LOAD_TILE_Y",
    lod: "TILESTACK_CMDS_LOAD_LOD",
};

/// CLI arguments for the `load` subcommand.
#[derive(Debug, Clone, Parser, Deserialize, Serialize, OrthoConfig, Default)]
#[command(
    long_about = "Load one tile from every registered store, build its \
                 meshes and print a summary of what was produced.",
    about = "Build meshes and styled elements for a tile"
)]
#[ortho_config(prefix = "TILESTACK")]
pub(crate) struct LoadArgs {
    /// Directory the engine is configured on.
    #[arg(long = ARG_INDEX_ROOT, value_name = "dir")]
    #[serde(default)]
    pub(crate) index_root: Option<Utf8PathBuf>,
    /// MapCSS stylesheet used to build meshes.
    #[arg(long = ARG_STYLE, value_name = "path")]
    #[serde(default)]
    pub(crate) style: Option<Utf8PathBuf>,
    /// Tile column.
    #[arg(long = ARG_TILE_X, value_name = "column")]
    #[serde(default)]
    pub(crate) tile_x: Option<u32>,
    /// Tile row.
    #[arg(long = ARG_TILE_Y, value_name = "row")]
    #[serde(default)]
    pub(crate) tile_y: Option<u32>,
    /// Level of detail.
    #[arg(long = ARG_LOD, value_name = "level")]
    #[serde(default)]
    pub(crate) lod: Option<u8>,
    /// Elevation source id; defaults to flat.
    #[arg(long = ARG_ELEVATION_TYPE, value_name = "id")]
    #[serde(default)]
    pub(crate) elevation_type: Option<i32>,
    /// Correlation tag echoed in the summary.
    #[arg(long = ARG_TAG, value_name = "tag")]
    #[serde(default)]
    pub(crate) tag: Option<u64>,
}

/// Resolved `load` command configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct LoadConfig {
    pub(crate) index_root: Utf8PathBuf,
    pub(crate) tag: u64,
    pub(crate) request: TileRequest,
}

impl TryFrom<LoadArgs> for LoadConfig {
    type Error = CliError;

    fn try_from(args: LoadArgs) -> Result<Self, Self::Error> {
        let index_root = required(args.index_root, ARG_INDEX_ROOT, ENV_LOAD_INDEX_ROOT)?;
        let style = required(args.style, ARG_STYLE, ENV_LOAD_STYLE)?;
        let quad_key = tile_from_parts(args.tile_x, args.tile_y, args.lod, LOAD_TILE_ENV)?;
        let request = TileRequest::new(quad_key, &style)
            .with_elevation(elevation_type(args.elevation_type)?);
        Ok(Self {
            index_root,
            tag: args.tag.unwrap_or_default(),
            request,
        })
    }
}

/// Logs load output without keeping it.
struct TraceSink;

impl LoadSink for TraceSink {
    fn on_mesh_built(&mut self, tag: u64, mesh: Mesh) {
        debug!(
            "tag {tag}: mesh {} ({} vertices, {} triangles)",
            mesh.name,
            mesh.vertex_count(),
            mesh.triangle_count()
        );
    }

    fn on_element_loaded(&mut self, tag: u64, element: LoadedElement) {
        debug!("tag {tag}: element {}", element.element.id);
    }
}

pub(crate) fn run_load(args: LoadArgs, writer: &mut dyn Write) -> Result<(), CliError> {
    let merged = args.load_and_merge().map_err(CliError::Configuration)?;
    let config = LoadConfig::try_from(merged)?;
    require_existing(&config.request.style_path, ARG_STYLE)?;
    let summary = with_engine(&config.index_root, |engine| {
        engine.load(
            config.tag,
            &config.request,
            &CancellationToken::new(),
            &mut TraceSink,
        )
    })?;
    write_json(writer, &summary)
}
