//! Engine lifecycle and public operations.
//!
//! An [`Engine`] starts unconfigured. The first successful
//! [`Engine::configure`] fixes its index root and every later call is a
//! no-op. [`Engine::shutdown`] flushes and drops all stores and leaves the
//! engine in a terminal state where operations fail with
//! [`EngineError::NotConfigured`].

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use camino::{Utf8Path, Utf8PathBuf};
use geo::Coord;
use log::{debug, info};
use tilestack_core::{
    Element, ElevationSampler, ElevationType, LodRange, QuadKey, StoreRegistry,
    flat::element_from_flat,
};
use tilestack_fs::dir_exists;
use tokio_util::sync::CancellationToken;

use crate::ingest::{IngestProgress, IngestReport, IngestRequest, IngestTask, run_ingest};
use crate::load::{LoadContext, LoadSink, LoadStream, LoadSummary, TileRequest, load_tile};
use crate::{EngineConfig, EngineError};

/// Key of the in-memory store registered on configuration.
pub const DEFAULT_IN_MEMORY_STORE: &str = "InMemory";

/// Key of the persistent store registered on configuration, backed by the
/// index root.
pub const DEFAULT_PERSISTENT_STORE: &str = "Persistent";

struct EngineContext {
    index_root: Utf8PathBuf,
    registry: StoreRegistry,
    elevation: ElevationSampler,
}

enum Lifecycle {
    Unconfigured,
    Configured(Arc<EngineContext>),
    ShutDown,
}

/// Tile data store and ingestion engine.
///
/// `Engine` is `Send + Sync`; share it through an [`Arc`] to use the
/// `spawn_*` operations.
///
/// # Examples
/// ```no_run
/// use camino::Utf8Path;
/// use tilestack_data::{Engine, EngineConfig};
///
/// # fn main() -> Result<(), tilestack_data::EngineError> {
/// let engine = Engine::new(EngineConfig::default());
/// engine.configure(Utf8Path::new("/var/lib/tilestack"))?;
/// engine.register_in_memory_store("scratch")?;
/// engine.shutdown()?;
/// # Ok(())
/// # }
/// ```
pub struct Engine {
    config: EngineConfig,
    lifecycle: Mutex<Lifecycle>,
}

impl Default for Engine {
    fn default() -> Self {
        Self::new(EngineConfig::default())
    }
}

impl std::fmt::Debug for Engine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Engine")
            .field("config", &self.config)
            .field("index_root", &self.index_root())
            .finish_non_exhaustive()
    }
}

impl Engine {
    /// Unconfigured engine using `config`.
    pub const fn new(config: EngineConfig) -> Self {
        Self {
            config,
            lifecycle: Mutex::new(Lifecycle::Unconfigured),
        }
    }

    /// Settings this engine was created with.
    pub const fn config(&self) -> &EngineConfig {
        &self.config
    }

    fn lifecycle(&self) -> MutexGuard<'_, Lifecycle> {
        self.lifecycle.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn context(&self) -> Result<Arc<EngineContext>, EngineError> {
        match &*self.lifecycle() {
            Lifecycle::Configured(context) => Ok(Arc::clone(context)),
            Lifecycle::Unconfigured | Lifecycle::ShutDown => Err(EngineError::NotConfigured),
        }
    }

    /// Configure the engine on an existing `index_root` directory.
    ///
    /// Only the first successful call has an effect; later calls return
    /// `Ok(())` without validating their argument.
    ///
    /// # Errors
    /// Returns [`EngineError::Configuration`] when `index_root` is not an
    /// existing directory, or a registry error when a default store cannot
    /// be opened. The engine stays unconfigured in both cases.
    pub fn configure(&self, index_root: &Utf8Path) -> Result<(), EngineError> {
        let mut lifecycle = self.lifecycle();
        if !matches!(*lifecycle, Lifecycle::Unconfigured) {
            debug!("configure with {index_root} ignored: engine already configured");
            return Ok(());
        }
        debug!("configure with {index_root}");
        match dir_exists(index_root) {
            Ok(true) => {}
            Ok(false) => {
                return Err(EngineError::Configuration {
                    path: index_root.to_path_buf(),
                    reason: "not an existing directory".to_owned(),
                });
            }
            Err(err) => {
                return Err(EngineError::Configuration {
                    path: index_root.to_path_buf(),
                    reason: err.to_string(),
                });
            }
        }

        let registry = StoreRegistry::default();
        if self.config.register_default_stores {
            registry.register_in_memory(DEFAULT_IN_MEMORY_STORE)?;
            registry.register_persistent(DEFAULT_PERSISTENT_STORE, index_root)?;
        }
        *lifecycle = Lifecycle::Configured(Arc::new(EngineContext {
            index_root: index_root.to_path_buf(),
            registry,
            elevation: ElevationSampler::new(index_root),
        }));
        info!("engine configured on {index_root}");
        Ok(())
    }

    /// Whether [`Engine::configure`] has succeeded and the engine is not
    /// shut down.
    pub fn is_configured(&self) -> bool {
        matches!(*self.lifecycle(), Lifecycle::Configured(_))
    }

    /// Index root fixed by the first successful configuration.
    pub fn index_root(&self) -> Option<Utf8PathBuf> {
        match &*self.lifecycle() {
            Lifecycle::Configured(context) => Some(context.index_root.clone()),
            Lifecycle::Unconfigured | Lifecycle::ShutDown => None,
        }
    }

    /// Keys of every registered store, in key order.
    ///
    /// # Errors
    /// Returns [`EngineError::NotConfigured`] outside the configured state.
    pub fn store_keys(&self) -> Result<Vec<String>, EngineError> {
        let context = self.context()?;
        Ok(context
            .registry
            .handles()
            .iter()
            .map(|handle| handle.key().to_owned())
            .collect())
    }

    /// Register a volatile store under `key`.
    ///
    /// # Errors
    /// Returns [`EngineError::DuplicateKey`] when `key` is taken and
    /// [`EngineError::NotConfigured`] outside the configured state.
    pub fn register_in_memory_store(&self, key: &str) -> Result<(), EngineError> {
        let lifecycle = self.lifecycle();
        let Lifecycle::Configured(context) = &*lifecycle else {
            return Err(EngineError::NotConfigured);
        };
        context.registry.register_in_memory(key)?;
        Ok(())
    }

    /// Register a store persisted inside the existing directory `path`.
    ///
    /// # Errors
    /// Returns [`EngineError::PathNotFound`] when `path` is not a directory,
    /// [`EngineError::DuplicateKey`] when `key` is taken and
    /// [`EngineError::NotConfigured`] outside the configured state.
    pub fn register_persistent_store(&self, key: &str, path: &Utf8Path) -> Result<(), EngineError> {
        let lifecycle = self.lifecycle();
        let Lifecycle::Configured(context) = &*lifecycle else {
            return Err(EngineError::NotConfigured);
        };
        context.registry.register_persistent(key, path)?;
        Ok(())
    }

    /// Whether any registered store holds data for exactly `quad_key`.
    ///
    /// # Errors
    /// Returns [`EngineError::NotConfigured`] outside the configured state.
    pub fn exists(&self, quad_key: &QuadKey) -> Result<bool, EngineError> {
        Ok(self.context()?.registry.exists(quad_key))
    }

    /// Height in metres at `coordinate`, which must lie inside `quad_key`.
    ///
    /// # Errors
    /// Returns [`EngineError::OutOfBounds`] for coordinates outside the
    /// tile, [`EngineError::Elevation`] when the source data is unreadable
    /// and [`EngineError::NotConfigured`] outside the configured state.
    pub fn elevation(
        &self,
        quad_key: &QuadKey,
        elevation_type: ElevationType,
        coordinate: Coord<f64>,
    ) -> Result<f64, EngineError> {
        let context = self.context()?;
        Ok(context
            .elevation
            .sample(quad_key, elevation_type, coordinate)?)
    }

    /// Run `request` on the calling thread.
    ///
    /// `cancel` is checked before each element; `progress` is called once
    /// before the first element and after each one.
    ///
    /// # Errors
    /// Returns the first store, source or stylesheet error, or
    /// [`EngineError::Cancelled`]. Elements written before the error stay
    /// stored.
    pub fn ingest(
        &self,
        request: &IngestRequest,
        cancel: &CancellationToken,
        progress: &mut dyn FnMut(IngestProgress),
    ) -> Result<IngestReport, EngineError> {
        let context = self.context()?;
        run_ingest(
            &context.registry,
            self.config.max_tiles_per_element,
            request,
            cancel,
            progress,
        )
    }

    fn ingest_now(&self, request: &IngestRequest) -> Result<IngestReport, EngineError> {
        self.ingest(request, &CancellationToken::new(), &mut |_| {})
    }

    /// Tile every element of `data_path` at each level in `lods`.
    ///
    /// # Errors
    /// See [`Engine::ingest`].
    pub fn add_range(
        &self,
        store: &str,
        style_path: &Utf8Path,
        data_path: &Utf8Path,
        lods: LodRange,
    ) -> Result<IngestReport, EngineError> {
        self.ingest_now(&IngestRequest::range(store, style_path, data_path, lods))
    }

    /// Store only the parts of `data_path` that fall inside `quad_key`.
    ///
    /// # Errors
    /// See [`Engine::ingest`].
    pub fn add_quad_key(
        &self,
        store: &str,
        style_path: &Utf8Path,
        data_path: &Utf8Path,
        quad_key: QuadKey,
    ) -> Result<IngestReport, EngineError> {
        self.ingest_now(&IngestRequest::quad_key(
            store, style_path, data_path, quad_key,
        ))
    }

    /// Tile a single element at each level in `lods`.
    ///
    /// # Errors
    /// See [`Engine::ingest`].
    pub fn add_element(
        &self,
        store: &str,
        style_path: &Utf8Path,
        element: Element,
        lods: LodRange,
    ) -> Result<IngestReport, EngineError> {
        self.ingest_now(&IngestRequest::element(store, style_path, element, lods))
    }

    /// [`Engine::add_element`] taking interleaved `[lat, lon, ...]` vertices
    /// and `[key, value, ...]` tags.
    ///
    /// # Errors
    /// Returns [`EngineError::InvalidElement`] for malformed arrays, then
    /// anything [`Engine::ingest`] returns.
    pub fn add_flat_element(
        &self,
        store: &str,
        style_path: &Utf8Path,
        id: u64,
        vertices: &[f64],
        tags: &[String],
        lods: LodRange,
    ) -> Result<IngestReport, EngineError> {
        let element = element_from_flat(id, vertices, tags)?;
        self.add_element(store, style_path, element, lods)
    }

    /// Run `request` on the blocking pool. Must be called inside a Tokio
    /// runtime.
    pub fn spawn_ingest(self: &Arc<Self>, request: IngestRequest) -> IngestTask {
        let engine = Arc::clone(self);
        IngestTask::spawn(CancellationToken::new(), move |cancel, progress| {
            engine.ingest(&request, cancel, progress)
        })
    }

    /// Background [`Engine::add_range`].
    pub fn spawn_add_range(
        self: &Arc<Self>,
        store: &str,
        style_path: &Utf8Path,
        data_path: &Utf8Path,
        lods: LodRange,
    ) -> IngestTask {
        self.spawn_ingest(IngestRequest::range(store, style_path, data_path, lods))
    }

    /// Background [`Engine::add_quad_key`].
    pub fn spawn_add_quad_key(
        self: &Arc<Self>,
        store: &str,
        style_path: &Utf8Path,
        data_path: &Utf8Path,
        quad_key: QuadKey,
    ) -> IngestTask {
        self.spawn_ingest(IngestRequest::quad_key(
            store, style_path, data_path, quad_key,
        ))
    }

    /// Background [`Engine::add_element`].
    pub fn spawn_add_element(
        self: &Arc<Self>,
        store: &str,
        style_path: &Utf8Path,
        element: Element,
        lods: LodRange,
    ) -> IngestTask {
        self.spawn_ingest(IngestRequest::element(store, style_path, element, lods))
    }

    /// Load one tile on the calling thread, streaming output into `sink`.
    ///
    /// # Errors
    /// Returns [`EngineError::Cancelled`] when `cancel` fires before the
    /// load finishes, or the first store, stylesheet or elevation error.
    /// Output already handed to `sink` stays valid.
    pub fn load(
        &self,
        tag: u64,
        request: &TileRequest,
        cancel: &CancellationToken,
        sink: &mut dyn LoadSink,
    ) -> Result<LoadSummary, EngineError> {
        let context = self.context()?;
        let load_context = LoadContext {
            registry: &context.registry,
            elevation: &context.elevation,
            terrain_grid_cells: self.config.terrain_grid_cells,
        };
        load_tile(&load_context, tag, request, cancel, sink)
    }

    /// Load one tile on the blocking pool. Must be called inside a Tokio
    /// runtime.
    pub fn spawn_load(self: &Arc<Self>, tag: u64, request: TileRequest) -> LoadStream {
        let engine = Arc::clone(self);
        LoadStream::spawn(tag, CancellationToken::new(), move |cancel, sink| {
            engine.load(tag, &request, cancel, sink)
        })
    }

    /// Flush persistent stores, drop every store and stop the engine.
    ///
    /// Work already holding the engine context finishes against emptied
    /// stores. Calling this again is a no-op.
    ///
    /// # Errors
    /// Returns the first flush failure; the engine is shut down regardless.
    pub fn shutdown(&self) -> Result<(), EngineError> {
        let mut lifecycle = self.lifecycle();
        let previous = std::mem::replace(&mut *lifecycle, Lifecycle::ShutDown);
        let Lifecycle::Configured(context) = previous else {
            return Ok(());
        };
        let flushed = context.registry.flush_all();
        context.registry.clear();
        info!("engine on {} shut down", context.index_root);
        flushed.map_err(EngineError::from)
    }
}
