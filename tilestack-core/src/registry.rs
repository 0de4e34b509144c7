//! Named store registry.
//!
//! Every store lives behind its own reader/writer lock, so writes into one
//! store never block reads or writes on another. The registry keeps the
//! [`TileIndex`] in step with completed writes.

use std::collections::BTreeMap;
use std::io;
use std::sync::{Arc, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};

use camino::{Utf8Path, Utf8PathBuf};
use log::debug;
use thiserror::Error;

use crate::store::{
    MemoryTileStore, SqliteTileStore, StoreError, StoreKind, TileRecord, TileStore,
};
use crate::{Element, QuadKey, TileIndex};

/// Errors raised by registry operations.
#[derive(Debug, Error)]
pub enum RegistryError {
    /// A store with the same key is already registered.
    #[error("store '{key}' is already registered")]
    DuplicateKey {
        /// Conflicting key.
        key: String,
    },
    /// The directory backing a persistent store does not exist.
    #[error("store directory {path} does not exist")]
    PathNotFound {
        /// Missing directory.
        path: Utf8PathBuf,
    },
    /// No store is registered under the key.
    #[error("no store is registered as '{key}'")]
    UnknownStore {
        /// Requested key.
        key: String,
    },
    /// Inspecting the store directory failed.
    #[error("failed to inspect store directory {path}: {source}")]
    Io {
        /// Inspected directory.
        path: Utf8PathBuf,
        /// Underlying I/O error.
        #[source]
        source: io::Error,
    },
    /// The store itself failed.
    #[error("store '{key}' failed: {source}")]
    Store {
        /// Key of the failing store.
        key: String,
        /// Store error.
        #[source]
        source: StoreError,
    },
}

/// A registered store and its metadata.
#[derive(Debug)]
pub struct StoreHandle {
    key: String,
    kind: StoreKind,
    path: Option<Utf8PathBuf>,
    store: RwLock<Box<dyn TileStore>>,
}

impl StoreHandle {
    /// Registry key.
    pub fn key(&self) -> &str {
        &self.key
    }

    /// Storage flavour.
    pub const fn kind(&self) -> StoreKind {
        self.kind
    }

    /// Backing directory for persistent stores.
    pub fn path(&self) -> Option<&Utf8Path> {
        self.path.as_deref()
    }

    /// Shared access for readers.
    pub fn read(&self) -> RwLockReadGuard<'_, Box<dyn TileStore>> {
        // Stores only mutate inside `put`, which is all-or-nothing.
        self.store.read().unwrap_or_else(PoisonError::into_inner)
    }

    /// Exclusive access for the single writer.
    pub fn write(&self) -> RwLockWriteGuard<'_, Box<dyn TileStore>> {
        self.store.write().unwrap_or_else(PoisonError::into_inner)
    }

    fn store_error(&self, source: StoreError) -> RegistryError {
        RegistryError::Store {
            key: self.key.clone(),
            source,
        }
    }
}

/// Registry of named stores plus the tile presence index.
///
/// # Examples
/// ```
/// use tilestack_core::{RegistryError, StoreRegistry};
///
/// let registry = StoreRegistry::default();
/// registry.register_in_memory("M").expect("first registration");
/// assert!(matches!(
///     registry.register_in_memory("M"),
///     Err(RegistryError::DuplicateKey { .. })
/// ));
/// ```
#[derive(Debug, Default)]
pub struct StoreRegistry {
    stores: RwLock<BTreeMap<String, Arc<StoreHandle>>>,
    index: TileIndex,
}

impl StoreRegistry {
    /// Register a volatile store under `key`.
    pub fn register_in_memory(&self, key: &str) -> Result<Arc<StoreHandle>, RegistryError> {
        self.register(key, Box::new(MemoryTileStore::default()), None)
    }

    /// Register a persistent store inside the existing directory `path`.
    ///
    /// The directory is never created. Tiles already present in the store
    /// are added to the index.
    pub fn register_persistent(
        &self,
        key: &str,
        path: &Utf8Path,
    ) -> Result<Arc<StoreHandle>, RegistryError> {
        if self.contains(key) {
            return Err(RegistryError::DuplicateKey { key: key.to_owned() });
        }
        let present = tilestack_fs::dir_exists(path).map_err(|source| RegistryError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        if !present {
            return Err(RegistryError::PathNotFound {
                path: path.to_path_buf(),
            });
        }
        let store = SqliteTileStore::open(path).map_err(|source| RegistryError::Store {
            key: key.to_owned(),
            source,
        })?;
        self.register(key, Box::new(store), Some(path.to_path_buf()))
    }

    /// Register an arbitrary store implementation under `key`.
    pub fn register(
        &self,
        key: &str,
        store: Box<dyn TileStore>,
        path: Option<Utf8PathBuf>,
    ) -> Result<Arc<StoreHandle>, RegistryError> {
        let existing = store.quad_keys().map_err(|source| RegistryError::Store {
            key: key.to_owned(),
            source,
        })?;
        let handle = Arc::new(StoreHandle {
            key: key.to_owned(),
            kind: store.kind(),
            path,
            store: RwLock::new(store),
        });

        {
            let mut stores = self.stores_mut();
            if stores.contains_key(key) {
                return Err(RegistryError::DuplicateKey { key: key.to_owned() });
            }
            stores.insert(key.to_owned(), Arc::clone(&handle));
        }
        self.index.record(key, existing);
        debug!("registered {} store '{key}'", handle.kind());
        Ok(handle)
    }

    /// Whether `key` is registered.
    pub fn contains(&self, key: &str) -> bool {
        self.stores().contains_key(key)
    }

    /// Look up a store.
    pub fn get(&self, key: &str) -> Result<Arc<StoreHandle>, RegistryError> {
        self.stores()
            .get(key)
            .cloned()
            .ok_or_else(|| RegistryError::UnknownStore { key: key.to_owned() })
    }

    /// All registered stores in key order.
    pub fn handles(&self) -> Vec<Arc<StoreHandle>> {
        self.stores().values().cloned().collect()
    }

    /// Number of registered stores.
    pub fn len(&self) -> usize {
        self.stores().len()
    }

    /// Whether no store is registered.
    pub fn is_empty(&self) -> bool {
        self.stores().is_empty()
    }

    /// Write `records` into the store `key` and publish them to the index.
    pub fn write_records(&self, key: &str, records: &[TileRecord]) -> Result<(), RegistryError> {
        let handle = self.get(key)?;
        {
            let mut store = handle.write();
            store
                .put(records)
                .map_err(|source| handle.store_error(source))?;
        }
        self.index
            .record(key, records.iter().map(|record| record.quad_key));
        Ok(())
    }

    /// Whether any registered store holds `quad_key`.
    pub fn exists(&self, quad_key: &QuadKey) -> bool {
        self.index.contains(quad_key)
    }

    /// Elements for `quad_key` from every store holding it, in store key
    /// order and then element id order.
    pub fn elements_for(&self, quad_key: &QuadKey) -> Result<Vec<Element>, RegistryError> {
        let mut elements = Vec::new();
        for key in self.index.stores_for(quad_key) {
            // A store removed since the index lookup simply contributes nothing.
            let Ok(handle) = self.get(&key) else {
                continue;
            };
            let store = handle.read();
            let found = store
                .elements(quad_key)
                .map_err(|source| handle.store_error(source))?;
            elements.extend(found);
        }
        Ok(elements)
    }

    /// Flush every store, stopping at the first failure.
    pub fn flush_all(&self) -> Result<(), RegistryError> {
        for handle in self.handles() {
            handle
                .write()
                .flush()
                .map_err(|source| handle.store_error(source))?;
        }
        Ok(())
    }

    /// Remove every store and index entry.
    pub fn clear(&self) {
        self.stores_mut().clear();
        self.index.clear();
    }

    /// The presence index.
    pub const fn index(&self) -> &TileIndex {
        &self.index
    }

    fn stores(&self) -> RwLockReadGuard<'_, BTreeMap<String, Arc<StoreHandle>>> {
        self.stores.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn stores_mut(&self) -> RwLockWriteGuard<'_, BTreeMap<String, Arc<StoreHandle>>> {
        self.stores.write().unwrap_or_else(PoisonError::into_inner)
    }
}
