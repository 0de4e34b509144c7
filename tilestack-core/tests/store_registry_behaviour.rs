//! Behavioural tests for `StoreRegistry` using rstest-bdd.

use std::{cell::RefCell, fs, path::PathBuf};

use camino::Utf8PathBuf;
use geo::Coord;
use rstest::fixture;
use rstest_bdd_macros::{given, scenario, then, when};
use tempfile::TempDir;
use tilestack_core::{
    Element, QuadKey, RegistryError, SqliteTileStore, StoreRegistry, Tags, TileRecord, TileStore,
};

const BUILDING_CENTRE: Coord<f64> = Coord { x: 2.2945, y: 48.8584 };

/// Shared state for registry scenarios.
#[derive(Debug)]
struct RegistryWorld {
    temp_dir: TempDir,
    registry: RefCell<Option<StoreRegistry>>,
    outcome: RefCell<Option<Result<(), RegistryError>>>,
}

impl RegistryWorld {
    fn new() -> Self {
        Self {
            temp_dir: TempDir::new().expect("create temp dir"),
            registry: RefCell::new(None),
            outcome: RefCell::new(None),
        }
    }

    fn store_dir(&self) -> Utf8PathBuf {
        Utf8PathBuf::from_path_buf(self.temp_dir.path().to_path_buf()).expect("utf-8 temp path")
    }

    fn with_registry<T>(&self, action: impl FnOnce(&StoreRegistry) -> T) -> T {
        let borrowed = self.registry.borrow();
        let registry = borrowed
            .as_ref()
            .expect("registry should be created before use");
        action(registry)
    }

    fn record_outcome<T>(&self, outcome: Result<T, RegistryError>) {
        self.outcome.replace(Some(outcome.map(|_| ())));
    }

    fn expect_error(&self) -> RegistryError {
        self.outcome
            .take()
            .expect("an operation should have been attempted")
            .expect_err("the operation should have failed")
    }
}

#[fixture]
fn world() -> RegistryWorld {
    RegistryWorld::new()
}

fn building_tile() -> QuadKey {
    QuadKey::from_coordinate(BUILDING_CENTRE, 15).expect("valid tile")
}

fn building_record() -> TileRecord {
    let half = 0.0001;
    let ring = vec![
        Coord { x: BUILDING_CENTRE.x - half, y: BUILDING_CENTRE.y - half },
        Coord { x: BUILDING_CENTRE.x + half, y: BUILDING_CENTRE.y - half },
        Coord { x: BUILDING_CENTRE.x + half, y: BUILDING_CENTRE.y + half },
        Coord { x: BUILDING_CENTRE.x - half, y: BUILDING_CENTRE.y + half },
    ];
    let tags = Tags::from([("building".to_owned(), "yes".to_owned())]);
    let element = Element::from_coordinates(1, ring, tags).expect("valid building");
    TileRecord::new(building_tile(), element)
}

#[given("an empty store registry")]
fn empty_registry(world: &RegistryWorld) {
    world.registry.replace(Some(StoreRegistry::default()));
}

#[given("an in-memory store registered as M")]
fn in_memory_store(world: &RegistryWorld) {
    world.with_registry(|registry| {
        registry
            .register_in_memory("M")
            .expect("first registration succeeds");
    });
}

#[given("a persistent store directory holding a building record")]
fn persistent_directory(world: &RegistryWorld) {
    let mut store = SqliteTileStore::open(&world.store_dir()).expect("open store");
    store.put(&[building_record()]).expect("write record");
    store.flush().expect("flush store");
}

#[when("I register another in-memory store as M")]
fn register_duplicate(world: &RegistryWorld) {
    let outcome = world.with_registry(|registry| registry.register_in_memory("M"));
    world.record_outcome(outcome);
}

#[when("I register a persistent store in a missing directory")]
fn register_missing_directory(world: &RegistryWorld) {
    let missing = world.store_dir().join("absent");
    let outcome = world.with_registry(|registry| registry.register_persistent("P", &missing));
    world.record_outcome(outcome);
}

#[when("I register the persistent store directory")]
fn register_directory(world: &RegistryWorld) {
    let path = world.store_dir();
    let outcome = world.with_registry(|registry| registry.register_persistent("P", &path));
    world.record_outcome(outcome);
}

#[when("I write a building record into store M")]
fn write_building(world: &RegistryWorld) {
    let outcome = world.with_registry(|registry| registry.write_records("M", &[building_record()]));
    world.record_outcome(outcome);
}

#[then("registration fails with a duplicate key error")]
fn duplicate_key(world: &RegistryWorld) {
    let err = world.expect_error();
    assert!(
        matches!(err, RegistryError::DuplicateKey { ref key } if key == "M"),
        "unexpected error: {err:?}"
    );
}

#[then("registration fails with a path not found error")]
fn path_not_found(world: &RegistryWorld) {
    let err = world.expect_error();
    match err {
        RegistryError::PathNotFound { path } => {
            assert_eq!(path.file_name(), Some("absent"));
        }
        other => panic!("expected a path not found error, got {other:?}"),
    }
}

#[then("the building tile exists")]
fn building_exists(world: &RegistryWorld) {
    assert!(world.with_registry(|registry| registry.exists(&building_tile())));
}

#[then("the sibling tile does not exist")]
fn sibling_missing(world: &RegistryWorld) {
    let tile = building_tile();
    let sibling =
        QuadKey::new(tile.tile_x() ^ 1, tile.tile_y(), tile.lod()).expect("sibling tile");
    assert!(!world.with_registry(|registry| registry.exists(&sibling)));
}

#[scenario(path = "tests/features/store_registry.feature", index = 0)]
fn duplicate_store_key(world: RegistryWorld) {
    let _ = world;
}

#[scenario(path = "tests/features/store_registry.feature", index = 1)]
fn missing_store_directory(world: RegistryWorld) {
    let _ = world;
}

#[scenario(path = "tests/features/store_registry.feature", index = 2)]
fn written_tiles_exist(world: RegistryWorld) {
    let _ = world;
}

#[scenario(path = "tests/features/store_registry.feature", index = 3)]
fn reopened_store_seeds_index(world: RegistryWorld) {
    let _ = world;
}

#[test]
fn scenario_indices_follow_feature_order() {
    let feature = PathBuf::from(env!("CARGO_MANIFEST_DIR"))
        .join("tests/features/store_registry.feature");
    let contents = fs::read_to_string(&feature).unwrap_or_else(|err| {
        panic!("failed to read feature file {feature:?}: {err}");
    });
    let titles: Vec<&str> = contents
        .lines()
        .filter_map(|line| line.trim().strip_prefix("Scenario: "))
        .collect();
    assert_eq!(
        titles,
        [
            "rejecting a duplicate store key",
            "rejecting a persistent store in a missing directory",
            "reporting tiles written to a store",
            "seeding the index from a reopened persistent store",
        ]
    );
}

