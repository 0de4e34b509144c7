//! Style-driven tiling of elements into stores.
//!
//! For every element and every level in scope, the stylesheet decides
//! whether the element is represented at all; represented elements are
//! clipped to each covering tile and written as one batch per element.

mod task;

use std::collections::BTreeSet;
use std::ops::RangeInclusive;

use camino::{Utf8Path, Utf8PathBuf};
use log::{debug, info, warn};
use serde::Serialize;
use tilestack_core::{Element, LodRange, QuadKey, StoreRegistry, Stylesheet, TileRecord};
use tokio_util::sync::CancellationToken;

use crate::EngineError;
use crate::source::{SkippedElement, SourceBatch, read_source};

pub use task::IngestTask;

/// Where the elements of an ingestion come from.
#[derive(Debug, Clone, PartialEq)]
pub enum IngestInput {
    /// A geodata file read with [`read_source`].
    File(Utf8PathBuf),
    /// A single element supplied by the caller.
    Element(Element),
}

/// Which tiles an ingestion may write.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IngestScope {
    /// Every tile covering an element at each level in the range.
    Range(LodRange),
    /// Exactly one tile.
    Tile(QuadKey),
}

impl IngestScope {
    fn levels(&self) -> RangeInclusive<u8> {
        match self {
            Self::Range(range) => range.levels(),
            Self::Tile(quad_key) => quad_key.lod()..=quad_key.lod(),
        }
    }
}

/// One ingestion call.
#[derive(Debug, Clone, PartialEq)]
pub struct IngestRequest {
    /// Key of the target store.
    pub store: String,
    /// Stylesheet deciding what is stored at each level.
    pub style_path: Utf8PathBuf,
    /// Element source.
    pub input: IngestInput,
    /// Tiles that may be written.
    pub scope: IngestScope,
}

impl IngestRequest {
    /// Ingest a whole file over a range of levels.
    pub fn range(store: &str, style_path: &Utf8Path, data_path: &Utf8Path, lods: LodRange) -> Self {
        Self {
            store: store.to_owned(),
            style_path: style_path.to_path_buf(),
            input: IngestInput::File(data_path.to_path_buf()),
            scope: IngestScope::Range(lods),
        }
    }

    /// Ingest only the part of a file that falls inside `quad_key`.
    pub fn quad_key(
        store: &str,
        style_path: &Utf8Path,
        data_path: &Utf8Path,
        quad_key: QuadKey,
    ) -> Self {
        Self {
            store: store.to_owned(),
            style_path: style_path.to_path_buf(),
            input: IngestInput::File(data_path.to_path_buf()),
            scope: IngestScope::Tile(quad_key),
        }
    }

    /// Ingest one caller-supplied element over a range of levels.
    pub fn element(store: &str, style_path: &Utf8Path, element: Element, lods: LodRange) -> Self {
        Self {
            store: store.to_owned(),
            style_path: style_path.to_path_buf(),
            input: IngestInput::Element(element),
            scope: IngestScope::Range(lods),
        }
    }
}

/// Elements processed so far in a running ingestion.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct IngestProgress {
    /// Elements handled, stored or not.
    pub processed: usize,
    /// Elements the source produced.
    pub total: usize,
}

impl IngestProgress {
    /// Completion in whole percent. An empty source counts as complete.
    pub fn percent(&self) -> u8 {
        if self.total == 0 {
            return 100;
        }
        let percent = self.processed.min(self.total) * 100 / self.total;
        u8::try_from(percent).unwrap_or(100)
    }

    /// Whether every element has been handled.
    pub const fn is_complete(&self) -> bool {
        self.processed >= self.total
    }
}

/// Outcome of a finished ingestion.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct IngestReport {
    /// Target store.
    pub store: String,
    /// Elements in the source, including skipped ones.
    pub elements_read: usize,
    /// Elements written at one or more levels.
    pub elements_stored: usize,
    /// Tile records written.
    pub records_written: usize,
    /// Distinct tiles that received records.
    pub tiles_touched: usize,
    /// Elements left out, with reasons.
    pub skipped: Vec<SkippedElement>,
}

/// Clip `element` into the tile records it produces within `scope`.
///
/// Levels without a matching style rule produce nothing. An element
/// covering more than `max_tiles` tiles at one level is rejected.
pub(crate) fn tile_records(
    element: &Element,
    stylesheet: &Stylesheet,
    scope: &IngestScope,
    max_tiles: u64,
) -> Result<Vec<TileRecord>, String> {
    let Some(bbox) = element.geometry.bounding_rect() else {
        return Ok(Vec::new());
    };
    let mut records = Vec::new();
    for lod in scope.levels() {
        if stylesheet.style_for(element, lod).is_none() {
            continue;
        }
        let tiles: Vec<QuadKey> = match scope {
            IngestScope::Tile(quad_key) => vec![*quad_key],
            IngestScope::Range(_) => {
                let cover = QuadKey::covering(&bbox, lod).map_err(|err| err.to_string())?;
                if cover.tile_count() > max_tiles {
                    return Err(format!(
                        "covers {} tiles at level {lod}; the limit is {max_tiles}",
                        cover.tile_count()
                    ));
                }
                cover.collect()
            }
        };
        records.extend(tiles.into_iter().filter_map(|quad_key| {
            element
                .clip_to(&quad_key.bounds())
                .map(|clipped| TileRecord::new(quad_key, clipped))
        }));
    }
    Ok(records)
}

/// Run `request` against `registry`, reporting progress per element.
pub(crate) fn run_ingest(
    registry: &StoreRegistry,
    max_tiles: u64,
    request: &IngestRequest,
    cancel: &CancellationToken,
    progress: &mut dyn FnMut(IngestProgress),
) -> Result<IngestReport, EngineError> {
    if cancel.is_cancelled() {
        return Err(EngineError::Cancelled);
    }
    // Fail on an unknown store before reading a potentially large source.
    registry.get(&request.store)?;

    let stylesheet = Stylesheet::from_path(&request.style_path)
        .map_err(|err| EngineError::from_style(&request.style_path, err))?;
    let batch = match &request.input {
        IngestInput::File(path) => {
            debug!("add data from {path} to '{}'", request.store);
            read_source(path)?
        }
        IngestInput::Element(element) => {
            debug!("add element {} to '{}'", element.id, request.store);
            SourceBatch {
                elements: vec![element.clone()],
                skipped: Vec::new(),
            }
        }
    };

    let total = batch.elements.len();
    let mut report = IngestReport {
        store: request.store.clone(),
        elements_read: total + batch.skipped.len(),
        skipped: batch.skipped,
        ..IngestReport::default()
    };
    let mut tiles = BTreeSet::new();
    progress(IngestProgress { processed: 0, total });

    for (index, element) in batch.elements.iter().enumerate() {
        if cancel.is_cancelled() {
            info!(
                "ingestion into '{}' cancelled after {index} of {total} elements",
                request.store
            );
            return Err(EngineError::Cancelled);
        }
        match tile_records(element, &stylesheet, &request.scope, max_tiles) {
            Ok(records) if records.is_empty() => {}
            Ok(records) => {
                registry.write_records(&request.store, &records)?;
                report.elements_stored += 1;
                report.records_written += records.len();
                tiles.extend(records.iter().map(|record| record.quad_key));
            }
            Err(reason) => {
                warn!("Skipped element {}: {reason}", element.id);
                report.skipped.push(SkippedElement {
                    id: Some(element.id),
                    reason,
                });
            }
        }
        progress(IngestProgress {
            processed: index + 1,
            total,
        });
    }

    report.tiles_touched = tiles.len();
    info!(
        "ingested {} of {} elements into '{}' ({} records across {} tiles, {} skipped)",
        report.elements_stored,
        report.elements_read,
        report.store,
        report.records_written,
        report.tiles_touched,
        report.skipped.len()
    );
    Ok(report)
}
