//! Presence index answering "does any store hold this tile?".

use std::collections::{BTreeSet, HashMap};
use std::sync::{PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};

use crate::QuadKey;

/// Maps each populated tile to the keys of the stores holding it.
///
/// The index owns no tile data. It has its own reader/writer lock, so
/// existence checks never wait for a store write in progress; writers update
/// it once their store write has completed.
#[derive(Debug, Default)]
pub struct TileIndex {
    entries: RwLock<HashMap<QuadKey, BTreeSet<String>>>,
}

impl TileIndex {
    /// Whether any store holds `quad_key`.
    pub fn contains(&self, quad_key: &QuadKey) -> bool {
        self.read().contains_key(quad_key)
    }

    /// Keys of the stores holding `quad_key`, in ascending order.
    pub fn stores_for(&self, quad_key: &QuadKey) -> Vec<String> {
        self.read()
            .get(quad_key)
            .map(|stores| stores.iter().cloned().collect())
            .unwrap_or_default()
    }

    /// Mark `quad_keys` as present in `store_key`.
    pub fn record<I>(&self, store_key: &str, quad_keys: I)
    where
        I: IntoIterator<Item = QuadKey>,
    {
        let mut entries = self.write();
        for quad_key in quad_keys {
            entries
                .entry(quad_key)
                .or_default()
                .insert(store_key.to_owned());
        }
    }

    /// Forget every entry.
    pub fn clear(&self) {
        self.write().clear();
    }

    /// Number of populated tiles.
    pub fn len(&self) -> usize {
        self.read().len()
    }

    /// Whether no tile is populated.
    pub fn is_empty(&self) -> bool {
        self.read().is_empty()
    }

    // The map holds plain presence sets; a panic mid-update cannot leave it
    // inconsistent, so a poisoned lock is still usable.
    fn read(&self) -> RwLockReadGuard<'_, HashMap<QuadKey, BTreeSet<String>>> {
        self.entries.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> RwLockWriteGuard<'_, HashMap<QuadKey, BTreeSet<String>>> {
        self.entries.write().unwrap_or_else(PoisonError::into_inner)
    }
}
