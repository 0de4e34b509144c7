//! Command-line interface for tilestack's tile engine.
#![forbid(unsafe_code)]

use std::io::Write;

use camino::Utf8Path;
use clap::{Parser, Subcommand};
use serde::Serialize;
use tilestack_core::{ElevationType, QuadKey};
use tilestack_data::{Engine, EngineError};

mod error;
mod ingest;
mod load;
mod query;

pub use error::CliError;

use ingest::IngestArgs;
use load::LoadArgs;
use query::{ElevationArgs, ExistsArgs};

pub(crate) const ARG_INDEX_ROOT: &str = "index-root";
pub(crate) const ARG_STORE: &str = "store";
pub(crate) const ARG_STYLE: &str = "style";
pub(crate) const ARG_DATA: &str = "data";
pub(crate) const ARG_LOD_MIN: &str = "lod-min";
pub(crate) const ARG_LOD_MAX: &str = "lod-max";
pub(crate) const ARG_TILE_X: &str = "tile-x";
pub(crate) const ARG_TILE_Y: &str = "tile-y";
pub(crate) const ARG_LOD: &str = "lod";
pub(crate) const ARG_LAT: &str = "lat";
pub(crate) const ARG_LON: &str = "lon";
pub(crate) const ARG_ELEVATION_TYPE: &str = "elevation-type";
pub(crate) const ARG_TAG: &str = "tag";

/// Run the tilestack CLI with the current process arguments and environment.
pub fn run() -> Result<(), CliError> {
    let cli = Cli::try_parse().map_err(CliError::ArgumentParsing)?;
    let mut stdout = std::io::stdout().lock();
    dispatch(cli.command, &mut stdout)
}

fn dispatch(command: Command, writer: &mut dyn Write) -> Result<(), CliError> {
    match command {
        Command::Ingest(args) => ingest::run_ingest(args, writer),
        Command::Exists(args) => query::run_exists(args, writer),
        Command::Elevation(args) => query::run_elevation(args, writer),
        Command::Load(args) => load::run_load(args, writer),
    }
}

#[derive(Debug, Parser)]
#[command(
    name = "tilestack",
    about = "Ingest, query and load map tiles with the tilestack engine",
    version
)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Tile a geodata file into a store.
    Ingest(IngestArgs),
    /// Report whether any store holds data for a tile.
    Exists(ExistsArgs),
    /// Sample terrain height inside a tile.
    Elevation(ElevationArgs),
    /// Build meshes and styled elements for a tile.
    Load(LoadArgs),
}

/// Unwrap a merged option or name the flag and variable that supply it.
pub(crate) fn required<T>(
    value: Option<T>,
    field: &'static str,
    env: &'static str,
) -> Result<T, CliError> {
    value.ok_or(CliError::MissingArgument { field, env })
}

/// Environment variables naming the tile flags of one subcommand.
#[derive(Debug, Clone, Copy)]
pub(crate) struct TileEnv {
    pub(crate) tile_x: &'static str,
    pub(crate) tile_y: &'static str,
    pub(crate) lod: &'static str,
}

/// Resolve `--tile-x`, `--tile-y` and `--lod` into a validated tile.
pub(crate) fn tile_from_parts(
    tile_x: Option<u32>,
    tile_y: Option<u32>,
    lod: Option<u8>,
    env: TileEnv,
) -> Result<QuadKey, CliError> {
    let tile_x = required(tile_x, ARG_TILE_X, env.tile_x)?;
    let tile_y = required(tile_y, ARG_TILE_Y, env.tile_y)?;
    let lod = required(lod, ARG_LOD, env.lod)?;
    Ok(QuadKey::new(tile_x, tile_y, lod)?)
}

/// Elevation source for a boundary id, defaulting to flat terrain.
pub(crate) fn elevation_type(id: Option<i32>) -> Result<ElevationType, CliError> {
    id.map_or(Ok(ElevationType::Flat), |id| {
        ElevationType::try_from(id).map_err(|_| CliError::UnknownElevationType { id })
    })
}

/// Fail unless `path` names an existing regular file.
pub(crate) fn require_existing(path: &Utf8Path, field: &'static str) -> Result<(), CliError> {
    match tilestack_fs::file_is_file(path) {
        Ok(true) => Ok(()),
        Ok(false) => Err(CliError::SourcePathNotFile {
            field,
            path: path.to_path_buf(),
        }),
        Err(source) if source.kind() == std::io::ErrorKind::NotFound => {
            Err(CliError::MissingSourceFile {
                field,
                path: path.to_path_buf(),
            })
        }
        Err(source) => Err(CliError::InspectSourcePath {
            field,
            path: path.to_path_buf(),
            source,
        }),
    }
}

/// Configure an engine on `index_root`, run `operation` and shut the engine
/// down so persistent stores are flushed before the process exits.
pub(crate) fn with_engine<T>(
    index_root: &Utf8Path,
    operation: impl FnOnce(&Engine) -> Result<T, EngineError>,
) -> Result<T, CliError> {
    let engine = Engine::default();
    engine.configure(index_root)?;
    let outcome = operation(&engine);
    let shutdown = engine.shutdown();
    let value = outcome?;
    shutdown?;
    Ok(value)
}

pub(crate) fn write_json<T: Serialize>(writer: &mut dyn Write, value: &T) -> Result<(), CliError> {
    let payload = serde_json::to_string_pretty(value).map_err(CliError::SerialiseOutput)?;
    write_line(writer, &payload)
}

pub(crate) fn write_line(writer: &mut dyn Write, line: &str) -> Result<(), CliError> {
    writer
        .write_all(line.as_bytes())
        .map_err(CliError::WriteOutput)?;
    writer.write_all(b"\n").map_err(CliError::WriteOutput)?;
    Ok(())
}

#[cfg(test)]
mod tests;
