//! Engine tuning knobs.

use serde::{Deserialize, Serialize};

/// Terrain grid resolution used when the stylesheet canvas does not set
/// `grid-cells`.
pub const DEFAULT_TERRAIN_GRID_CELLS: u32 = 4;

/// Largest number of tiles a single element may cover at one level before
/// it is skipped.
pub const DEFAULT_MAX_TILES_PER_ELEMENT: u64 = 65_536;

/// Settings applied when an [`Engine`](crate::Engine) is created.
///
/// # Examples
/// ```
/// use tilestack_data::EngineConfig;
///
/// let config = EngineConfig::default().with_terrain_grid_cells(8);
/// assert_eq!(config.terrain_grid_cells, 8);
/// assert!(config.register_default_stores);
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Terrain cells per tile side when the canvas rule is silent.
    pub terrain_grid_cells: u32,
    /// Register the `InMemory` and `Persistent` stores on configure.
    pub register_default_stores: bool,
    /// Per-level tile limit for one element.
    pub max_tiles_per_element: u64,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            terrain_grid_cells: DEFAULT_TERRAIN_GRID_CELLS,
            register_default_stores: true,
            max_tiles_per_element: DEFAULT_MAX_TILES_PER_ELEMENT,
        }
    }
}

impl EngineConfig {
    /// Override the default terrain resolution. Zero is raised to one.
    #[must_use]
    pub fn with_terrain_grid_cells(mut self, cells: u32) -> Self {
        self.terrain_grid_cells = cells.max(1);
        self
    }

    /// Choose whether configure registers the default stores.
    #[must_use]
    pub const fn with_default_stores(mut self, register: bool) -> Self {
        self.register_default_stores = register;
        self
    }

    /// Override the per-level tile limit for one element.
    #[must_use]
    pub fn with_max_tiles_per_element(mut self, limit: u64) -> Self {
        self.max_tiles_per_element = limit.max(1);
        self
    }
}
