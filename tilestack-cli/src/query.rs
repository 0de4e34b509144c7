//! Read-only tile queries: presence and elevation.

use std::io::Write;

use camino::Utf8PathBuf;
use clap::Parser;
use geo::Coord;
use ortho_config::{OrthoConfig, SubcmdConfigMerge};
use serde::{Deserialize, Serialize};
use tilestack_core::{ElevationType, QuadKey};

use crate::{
    ARG_ELEVATION_TYPE, ARG_INDEX_ROOT, ARG_LAT, ARG_LOD, ARG_LON, ARG_TILE_X, ARG_TILE_Y,
    CliError, TileEnv, elevation_type, required, tile_from_parts, with_engine, write_line,
};

pub(crate) const ENV_EXISTS_INDEX_ROOT: &str = "TILESTACK_CMDS_EXISTS_INDEX_ROOT";
const EXISTS_TILE_ENV: TileEnv = TileEnv {
    tile_x: "TILESTACK_CMDS_EXISTS_TILE_X",
    tile_y: "TILESTACK_CMDS_EXISTS_TILE_Y",
    lod: "TILESTACK_CMDS_EXISTS_LOD",
};

pub(crate) const ENV_ELEVATION_INDEX_ROOT: &str = "TILESTACK_CMDS_ELEVATION_INDEX_ROOT";
pub(crate) const ENV_ELEVATION_LAT: &str = "TILESTACK_CMDS_ELEVATION_LAT";
pub(crate) const ENV_ELEVATION_LON: &str = "TILESTACK_CMDS_ELEVATION_LON";
const ELEVATION_TILE_ENV: TileEnv = TileEnv {
    tile_x: "TILESTACK_CMDS_ELEVATION_TILE_X",
    tile_y: "TILESTACK_CMDS_ELEVATION_TILE_Y",
    lod: "TILESTACK_CMDS_ELEVATION_LOD",
};

/// CLI arguments for the `exists` subcommand.
#[derive(Debug, Clone, Parser, Deserialize, Serialize, OrthoConfig, Default)]
#[command(about = "Report whether any store holds data for a tile")]
#[ortho_config(prefix = "TILESTACK")]
pub(crate) struct ExistsArgs {
    /// Directory the engine is configured on.
    #[arg(long = ARG_INDEX_ROOT, value_name = "dir")]
    #[serde(default)]
    pub(crate) index_root: Option<Utf8PathBuf>,
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
}

/// Resolved `exists` command configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct ExistsConfig {
    pub(crate) index_root: Utf8PathBuf,
    pub(crate) quad_key: QuadKey,
}

impl TryFrom<ExistsArgs> for ExistsConfig {
    type Error = CliError;

    fn try_from(args: ExistsArgs) -> Result<Self, Self::Error> {
        Ok(Self {
            index_root: required(args.index_root, ARG_INDEX_ROOT, ENV_EXISTS_INDEX_ROOT)?,
            quad_key: tile_from_parts(args.tile_x, args.tile_y, args.lod, EXISTS_TILE_ENV)?,
        })
    }
}

pub(crate) fn run_exists(args: ExistsArgs, writer: &mut dyn Write) -> Result<(), CliError> {
    let merged = args.load_and_merge().map_err(CliError::Configuration)?;
    let config = ExistsConfig::try_from(merged)?;
    let exists = with_engine(&config.index_root, |engine| engine.exists(&config.quad_key))?;
    write_line(writer, if exists { "true" } else { "false" })
}

/// CLI arguments for the `elevation` subcommand.
#[derive(Debug, Clone, Parser, Deserialize, Serialize, OrthoConfig, Default)]
#[command(
    long_about = "Sample terrain height at a coordinate inside a tile. \
                 Elevation types: 0 = flat, 1 = SRTM tiles under srtm/, \
                 2 = height grids under grid/.",
    about = "Sample terrain height inside a tile"
)]
#[ortho_config(prefix = "TILESTACK")]
pub(crate) struct ElevationArgs {
    /// Directory holding `srtm/` and `grid/` elevation data.
    #[arg(long = ARG_INDEX_ROOT, value_name = "dir")]
    #[serde(default)]
    pub(crate) index_root: Option<Utf8PathBuf>,
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
    /// Latitude in degrees.
    #[arg(long = ARG_LAT, value_name = "degrees", allow_negative_numbers = true)]
    #[serde(default)]
    pub(crate) lat: Option<f64>,
    /// Longitude in degrees.
    #[arg(long = ARG_LON, value_name = "degrees", allow_negative_numbers = true)]
    #[serde(default)]
    pub(crate) lon: Option<f64>,
    /// Elevation source id; defaults to flat.
    #[arg(long = ARG_ELEVATION_TYPE, value_name = "id")]
    #[serde(default)]
    pub(crate) elevation_type: Option<i32>,
}

/// Resolved `elevation` command configuration.
#[derive(Debug, Clone, PartialEq)]
pub(crate) struct ElevationConfig {
    pub(crate) index_root: Utf8PathBuf,
    pub(crate) quad_key: QuadKey,
    pub(crate) coordinate: Coord<f64>,
    pub(crate) elevation_type: ElevationType,
}

impl TryFrom<ElevationArgs> for ElevationConfig {
    type Error = CliError;

    fn try_from(args: ElevationArgs) -> Result<Self, Self::Error> {
        let index_root = required(args.index_root, ARG_INDEX_ROOT, ENV_ELEVATION_INDEX_ROOT)?;
        let quad_key = tile_from_parts(args.tile_x, args.tile_y, args.lod, ELEVATION_TILE_ENV)?;
        let lat = required(args.lat, ARG_LAT, ENV_ELEVATION_LAT)?;
        let lon = required(args.lon, ARG_LON, ENV_ELEVATION_LON)?;
        Ok(Self {
            index_root,
            quad_key,
            coordinate: Coord { x: lon, y: lat },
            elevation_type: elevation_type(args.elevation_type)?,
        })
    }
}

pub(crate) fn run_elevation(args: ElevationArgs, writer: &mut dyn Write) -> Result<(), CliError> {
    let merged = args.load_and_merge().map_err(CliError::Configuration)?;
    let config = ElevationConfig::try_from(merged)?;
    let height = with_engine(&config.index_root, |engine| {
        engine.elevation(&config.quad_key, config.elevation_type, config.coordinate)
    })?;
    write_line(writer, &height.to_string())
}
