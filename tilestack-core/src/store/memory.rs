//! Volatile store kept in process memory.

use std::collections::BTreeMap;

use crate::{Element, QuadKey};

use super::{StoreError, StoreKind, TileRecord, TileStore};

/// In-memory [`TileStore`].
///
/// Records are grouped per tile and keyed by element id, so iteration is
/// ordered without extra sorting.
#[derive(Debug, Default)]
pub struct MemoryTileStore {
    tiles: BTreeMap<QuadKey, BTreeMap<u64, Element>>,
}

impl MemoryTileStore {
    /// Create a store pre-populated with `records`.
    pub fn with_records<I>(records: I) -> Self
    where
        I: IntoIterator<Item = TileRecord>,
    {
        let mut store = Self::default();
        for record in records {
            store.insert(record);
        }
        store
    }

    /// Total number of stored records across all tiles.
    pub fn record_count(&self) -> usize {
        self.tiles.values().map(BTreeMap::len).sum()
    }

    fn insert(&mut self, record: TileRecord) {
        self.tiles
            .entry(record.quad_key)
            .or_default()
            .insert(record.element.id, record.element);
    }
}

impl TileStore for MemoryTileStore {
    fn kind(&self) -> StoreKind {
        StoreKind::InMemory
    }

    fn put(&mut self, records: &[TileRecord]) -> Result<(), StoreError> {
        for record in records {
            self.insert(record.clone());
        }
        Ok(())
    }

    fn has_data(&self, quad_key: &QuadKey) -> Result<bool, StoreError> {
        Ok(self
            .tiles
            .get(quad_key)
            .is_some_and(|elements| !elements.is_empty()))
    }

    fn elements(&self, quad_key: &QuadKey) -> Result<Vec<Element>, StoreError> {
        Ok(self
            .tiles
            .get(quad_key)
            .map(|elements| elements.values().cloned().collect())
            .unwrap_or_default())
    }

    fn quad_keys(&self) -> Result<Vec<QuadKey>, StoreError> {
        Ok(self.tiles.keys().copied().collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Tags;
    use geo::Coord;
    use rstest::rstest;

    fn record(id: u64, x: u32, name: &str) -> TileRecord {
        let tile = QuadKey::new(x, 0, 2).expect("tile");
        let tags = Tags::from([("name".to_owned(), name.to_owned())]);
        let element = Element::from_coordinates(id, vec![Coord { x: 0.0, y: 0.0 }], tags)
            .expect("element");
        TileRecord::new(tile, element)
    }

    #[rstest]
    fn rewriting_a_record_replaces_it() {
        let mut store = MemoryTileStore::default();
        store.put(&[record(1, 0, "old")]).expect("first write");
        store.put(&[record(1, 0, "new")]).expect("second write");

        assert_eq!(store.record_count(), 1);
        let tile = QuadKey::new(0, 0, 2).expect("tile");
        let elements = store.elements(&tile).expect("read");
        assert_eq!(elements[0].tag("name"), Some("new"));
    }

    #[rstest]
    fn elements_are_ordered_by_id() {
        let store = MemoryTileStore::with_records([record(9, 0, "b"), record(3, 0, "a")]);
        let tile = QuadKey::new(0, 0, 2).expect("tile");
        let ids: Vec<_> = store
            .elements(&tile)
            .expect("read")
            .iter()
            .map(|element| element.id)
            .collect();
        assert_eq!(ids, vec![3, 9]);
    }

    #[rstest]
    fn unknown_tiles_are_empty() {
        let store = MemoryTileStore::with_records([record(1, 0, "a")]);
        let other = QuadKey::new(1, 0, 2).expect("tile");
        assert!(!store.has_data(&other).expect("lookup"));
        assert!(store.elements(&other).expect("read").is_empty());
        assert_eq!(store.quad_keys().expect("keys").len(), 1);
    }
}
