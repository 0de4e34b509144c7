//! Ring assembly for multipolygon relations.

use geo::{Contains, Coord, LineString, MultiPolygon, Polygon};
use log::warn;
use thiserror::Error;

/// Reasons a set of member ways cannot form closed rings.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub(super) enum RingError {
    #[error("ring starting at node {start} is not closed (ends at node {end})")]
    Open { start: i64, end: i64 },
    #[error("ring starting at node {start} has only {len} nodes")]
    Degenerate { start: i64, len: usize },
}

/// Join way node lists end to end until every chain closes.
///
/// Segments may be joined in either direction. Segments with fewer than two
/// nodes are ignored.
pub(super) fn assemble_rings(mut segments: Vec<Vec<i64>>) -> Result<Vec<Vec<i64>>, RingError> {
    segments.retain(|segment| segment.len() >= 2);
    let mut rings = Vec::new();
    while let Some(mut ring) = segments.pop() {
        loop {
            let (Some(&start), Some(&end)) = (ring.first(), ring.last()) else {
                break;
            };
            if start == end {
                break;
            }
            let Some(position) = segments
                .iter()
                .position(|segment| segment.first() == Some(&end) || segment.last() == Some(&end))
            else {
                return Err(RingError::Open { start, end });
            };
            let mut next = segments.swap_remove(position);
            if next.first() != Some(&end) {
                next.reverse();
            }
            ring.extend(next.into_iter().skip(1));
        }
        if ring.len() < 4 {
            let start = ring.first().copied().unwrap_or_default();
            return Err(RingError::Degenerate {
                start,
                len: ring.len(),
            });
        }
        rings.push(ring);
    }
    Ok(rings)
}

/// Pair each inner ring with the first outer ring containing it.
///
/// Inner rings outside every outer ring are dropped with a warning.
pub(super) fn nest_rings(
    relation: i64,
    outers: Vec<Vec<Coord<f64>>>,
    inners: Vec<Vec<Coord<f64>>>,
) -> MultiPolygon<f64> {
    let mut polygons: Vec<Polygon<f64>> = outers
        .into_iter()
        .map(|ring| Polygon::new(LineString::from(ring), Vec::new()))
        .collect();
    for inner in inners {
        let Some(&probe) = inner.first() else {
            continue;
        };
        match polygons
            .iter_mut()
            .find(|polygon| polygon.contains(&probe))
        {
            Some(polygon) => polygon.interiors_push(LineString::from(inner)),
            None => warn!("Dropped inner ring of relation {relation}: no enclosing outer ring"),
        }
    }
    MultiPolygon(polygons)
}
