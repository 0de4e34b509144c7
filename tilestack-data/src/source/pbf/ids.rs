use log::warn;

/// Top two bits encode element type: 00=node, 01=way, 10=relation. Remaining 62 bits carry the raw ID.
const WAY_ID_PREFIX: u64 = 1 << 62;
const RELATION_ID_PREFIX: u64 = 1 << 63;
const RAW_ID_MASK: u64 = (1 << 62) - 1;

/// OpenStreetMap primitive an element was read from.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum OsmKind {
    /// Tagged node.
    Node,
    /// Way, open or closed.
    Way,
    /// Multipolygon relation.
    Relation,
}

impl OsmKind {
    const fn prefix(self) -> u64 {
        match self {
            Self::Node => 0,
            Self::Way => WAY_ID_PREFIX,
            Self::Relation => RELATION_ID_PREFIX,
        }
    }
}

/// Element id for an OSM primitive, or `None` when the raw id does not fit.
pub(super) fn element_id(kind: OsmKind, raw_id: i64) -> Option<u64> {
    let Ok(raw) = u64::try_from(raw_id) else {
        warn!("Skipped OSM {kind:?} {raw_id}: negative identifiers are unsupported");
        return None;
    };
    if raw > RAW_ID_MASK {
        warn!("Skipped OSM {kind:?} {raw_id}: exceeds supported maximum {RAW_ID_MASK}");
        return None;
    }
    Some(kind.prefix() | raw)
}

/// Split an element id produced from an OSM source into kind and raw id.
///
/// # Examples
/// ```
/// use tilestack_data::{OsmKind, decode_osm_id};
///
/// assert_eq!(decode_osm_id(42), (OsmKind::Node, 42));
/// assert_eq!(decode_osm_id((1 << 62) | 7), (OsmKind::Way, 7));
/// ```
pub fn decode_osm_id(id: u64) -> (OsmKind, u64) {
    let kind = if id & RELATION_ID_PREFIX != 0 {
        OsmKind::Relation
    } else if id & WAY_ID_PREFIX != 0 {
        OsmKind::Way
    } else {
        OsmKind::Node
    };
    (kind, id & RAW_ID_MASK)
}
