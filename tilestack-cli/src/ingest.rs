//! Ingest command implementation for the tilestack CLI.

use std::io::Write;

use camino::Utf8PathBuf;
use clap::Parser;
use ortho_config::{OrthoConfig, SubcmdConfigMerge};
use serde::{Deserialize, Serialize};
use tilestack_core::{LodRange, QuadKey};
use tilestack_data::DEFAULT_PERSISTENT_STORE;

use crate::{
    ARG_DATA, ARG_INDEX_ROOT, ARG_LOD, ARG_LOD_MAX, ARG_LOD_MIN, ARG_STORE, ARG_STYLE, ARG_TILE_X,
    ARG_TILE_Y, CliError, TileEnv, require_existing, required, tile_from_parts, with_engine,
    write_json,
};

pub(crate) const ENV_INGEST_INDEX_ROOT: &str = "TILESTACK_CMDS_INGEST_INDEX_ROOT";
pub(crate) const ENV_INGEST_STYLE: &str = "TILESTACK_CMDS_INGEST_STYLE";
pub(crate) const ENV_INGEST_DATA: &str = "TILESTACK_CMDS_INGEST_DATA";
pub(crate) const ENV_INGEST_LOD_MIN: &str = "TILESTACK_CMDS_INGEST_LOD_MIN";
pub(crate) const ENV_INGEST_LOD_MAX: &str = "TILESTACK_CMDS_INGEST_LOD_MAX";
const INGEST_TILE_ENV: TileEnv = TileEnv {
    tile_x: "TILESTACK_CMDS_INGEST_TILE_X",
    tile_y: "TILESTACK_CMDS_INGEST_TILE_Y",
    lod: "TILESTACK_CMDS_INGEST_LOD",
};

/// CLI arguments for the `ingest` subcommand.
#[derive(Debug, Clone, Parser, Deserialize, Serialize, OrthoConfig, Default)]
#[command(
    long_about = "Tile a geodata file (OSM PBF or GeoJSON) into a store. \
                 Pass --lod-min and --lod-max to cover a range of levels, \
                 or --tile-x, --tile-y and --lod to write a single tile.",
    about = "Ingest a geodata file into a store"
)]
#[ortho_config(prefix = "TILESTACK")]
pub(crate) struct IngestArgs {
    /// Directory holding the default persistent store and elevation data.
    #[arg(long = ARG_INDEX_ROOT, value_name = "dir")]
    #[serde(default)]
    pub(crate) index_root: Option<Utf8PathBuf>,
    /// Target store key; defaults to the persistent store.
    #[arg(long = ARG_STORE, value_name = "key")]
    #[serde(default)]
    pub(crate) store: Option<String>,
    /// MapCSS stylesheet deciding what is stored at each level.
    #[arg(long = ARG_STYLE, value_name = "path")]
    #[serde(default)]
    pub(crate) style: Option<Utf8PathBuf>,
    /// Geodata file (`.pbf`, `.json` or `.geojson`).
    #[arg(long = ARG_DATA, value_name = "path")]
    #[serde(default)]
    pub(crate) data: Option<Utf8PathBuf>,
    /// Lowest level of detail to write.
    #[arg(long = ARG_LOD_MIN, value_name = "level")]
    #[serde(default)]
    pub(crate) lod_min: Option<u8>,
    /// Highest level of detail to write.
    #[arg(long = ARG_LOD_MAX, value_name = "level")]
    #[serde(default)]
    pub(crate) lod_max: Option<u8>,
    /// Tile column for single-tile ingestion.
    #[arg(long = ARG_TILE_X, value_name = "column")]
    #[serde(default)]
    pub(crate) tile_x: Option<u32>,
    /// Tile row for single-tile ingestion.
    #[arg(long = ARG_TILE_Y, value_name = "row")]
    #[serde(default)]
    pub(crate) tile_y: Option<u32>,
    /// Level of detail for single-tile ingestion.
    #[arg(long = ARG_LOD, value_name = "level")]
    #[serde(default)]
    pub(crate) lod: Option<u8>,
}

impl IngestArgs {
    pub(crate) fn into_config(self) -> Result<IngestConfig, CliError> {
        let merged = self.load_and_merge().map_err(CliError::Configuration)?;
        IngestConfig::try_from(merged)
    }
}

/// Tiles an ingestion may write.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum IngestTarget {
    /// Every covering tile at each level in the range.
    Range(LodRange),
    /// Exactly one tile.
    Tile(QuadKey),
}

/// Resolved `ingest` command configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct IngestConfig {
    pub(crate) index_root: Utf8PathBuf,
    pub(crate) store: String,
    pub(crate) style: Utf8PathBuf,
    pub(crate) data: Utf8PathBuf,
    pub(crate) target: IngestTarget,
}

impl IngestConfig {
    pub(crate) fn validate_sources(&self) -> Result<(), CliError> {
        require_existing(&self.style, ARG_STYLE)?;
        require_existing(&self.data, ARG_DATA)?;
        Ok(())
    }
}

impl TryFrom<IngestArgs> for IngestConfig {
    type Error = CliError;

    fn try_from(args: IngestArgs) -> Result<Self, Self::Error> {
        let index_root = required(args.index_root, ARG_INDEX_ROOT, ENV_INGEST_INDEX_ROOT)?;
        let style = required(args.style, ARG_STYLE, ENV_INGEST_STYLE)?;
        let data = required(args.data, ARG_DATA, ENV_INGEST_DATA)?;
        let store = args
            .store
            .unwrap_or_else(|| DEFAULT_PERSISTENT_STORE.to_owned());

        let single_tile = args.tile_x.is_some() || args.tile_y.is_some() || args.lod.is_some();
        let target = if single_tile {
            IngestTarget::Tile(tile_from_parts(
                args.tile_x,
                args.tile_y,
                args.lod,
                INGEST_TILE_ENV,
            )?)
        } else {
            let minimum = required(args.lod_min, ARG_LOD_MIN, ENV_INGEST_LOD_MIN)?;
            let maximum = required(args.lod_max, ARG_LOD_MAX, ENV_INGEST_LOD_MAX)?;
            IngestTarget::Range(LodRange::new(minimum, maximum)?)
        };

        Ok(Self {
            index_root,
            store,
            style,
            data,
            target,
        })
    }
}

pub(crate) fn resolve_ingest_config(args: IngestArgs) -> Result<IngestConfig, CliError> {
    let config = args.into_config()?;
    config.validate_sources()?;
    Ok(config)
}

pub(crate) fn run_ingest(args: IngestArgs, writer: &mut dyn Write) -> Result<(), CliError> {
    let config = resolve_ingest_config(args)?;
    let report = with_engine(&config.index_root, |engine| match config.target {
        IngestTarget::Range(lods) => {
            engine.add_range(&config.store, &config.style, &config.data, lods)
        }
        IngestTarget::Tile(quad_key) => {
            engine.add_quad_key(&config.store, &config.style, &config.data, quad_key)
        }
    })?;
    write_json(writer, &report)
}

#[cfg(test)]
pub(crate) fn config_from_layers_for_test(
    layers: Vec<ortho_config::MergeLayer<'static>>,
) -> Result<IngestConfig, CliError> {
    let merged = IngestArgs::merge_from_layers(layers).map_err(CliError::from)?;
    IngestConfig::try_from(merged)
}
