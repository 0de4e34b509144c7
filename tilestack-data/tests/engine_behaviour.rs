//! Behavioural tests for the `Engine` facade.

use std::{cell::RefCell, fs, path::PathBuf};

use camino::{Utf8Path, Utf8PathBuf};
use rstest::fixture;
use rstest_bdd_macros::{given, scenario, then, when};
use tempfile::TempDir;
use tilestack_core::test_support::{
    SAMPLE_CENTRE, building, sample_tile, sibling_of, write_sample_stylesheet,
};
use tilestack_core::{ElevationType, LodRange, QuadKey};
use tilestack_data::{
    CancellationToken, CollectingSink, DEFAULT_IN_MEMORY_STORE, DEFAULT_PERSISTENT_STORE, Engine,
    EngineError, IngestReport, LoadSummary, TileRequest,
};

const SAMPLE_GEOJSON: &str = r#"{
  "type": "FeatureCollection",
  "features": [
    {
      "type": "Feature",
      "id": 10,
      "properties": { "building": "yes", "building:levels": 3 },
      "geometry": {
        "type": "Polygon",
        "coordinates": [[
          [13.41235, 52.52175], [13.41265, 52.52175],
          [13.41265, 52.52205], [13.41235, 52.52205], [13.41235, 52.52175]
        ]]
      }
    },
    {
      "type": "Feature",
      "id": 11,
      "properties": { "highway": "residential", "name": null },
      "geometry": {
        "type": "LineString",
        "coordinates": [[13.4121, 52.5219], [13.4129, 52.5219]]
      }
    }
  ]
}"#;

type LoadOutcome = (Result<LoadSummary, EngineError>, CollectingSink);

/// Shared state for engine scenarios.
struct EngineWorld {
    first: TempDir,
    second: TempDir,
    engine: Engine,
    style: RefCell<Option<Utf8PathBuf>>,
    data: RefCell<Option<Utf8PathBuf>>,
    reports: RefCell<Vec<IngestReport>>,
    heights: RefCell<Vec<f64>>,
    load: RefCell<Option<LoadOutcome>>,
}

impl EngineWorld {
    fn new() -> Self {
        Self {
            first: TempDir::new().expect("create first temp dir"),
            second: TempDir::new().expect("create second temp dir"),
            engine: Engine::default(),
            style: RefCell::new(None),
            data: RefCell::new(None),
            reports: RefCell::new(Vec::new()),
            heights: RefCell::new(Vec::new()),
            load: RefCell::new(None),
        }
    }

    fn root(dir: &TempDir) -> Utf8PathBuf {
        Utf8PathBuf::from_path_buf(dir.path().to_path_buf()).expect("utf-8 temp path")
    }

    fn style(&self) -> Utf8PathBuf {
        self.style
            .borrow()
            .clone()
            .expect("stylesheet should be written before use")
    }

    fn levels() -> LodRange {
        LodRange::new(14, 16).expect("valid level range")
    }

    fn load_tile(&self, quad_key: QuadKey, cancel: &CancellationToken) {
        let mut sink = CollectingSink::default();
        let request = TileRequest::new(quad_key, &self.style());
        let result = self.engine.load(1, &request, cancel, &mut sink);
        self.load.replace(Some((result, sink)));
    }

    fn expect_load(&self) -> LoadOutcome {
        self.load.take().expect("a load should have been attempted")
    }
}

#[fixture]
fn world() -> EngineWorld {
    EngineWorld::new()
}

#[given("an engine configured on the first directory")]
fn configured_on_first(world: &EngineWorld) {
    world
        .engine
        .configure(&EngineWorld::root(&world.first))
        .expect("configure on the first directory");
}

#[given("a configured engine with an in-memory store M")]
fn configured_with_store(world: &EngineWorld) {
    let root = EngineWorld::root(&world.first);
    world.engine.configure(&root).expect("configure");
    world
        .engine
        .register_in_memory_store("M")
        .expect("register store M");
    world.style.replace(Some(write_sample_stylesheet(&root)));
}

#[given("a GeoJSON file holding a building and a road")]
fn geojson_file(world: &EngineWorld) {
    let path = EngineWorld::root(&world.first).join("sample.geojson");
    fs::write(&path, SAMPLE_GEOJSON).expect("write GeoJSON fixture");
    world.data.replace(Some(path));
}

#[given("a height grid for the building tile at level 15")]
fn height_grid(world: &EngineWorld) {
    let tile = sample_tile(15);
    let dir = EngineWorld::root(&world.first)
        .join("grid")
        .join(tile.lod().to_string());
    fs::create_dir_all(&dir).expect("create grid directory");
    let path = dir.join(format!("{}_{}.ele", tile.tile_x(), tile.tile_y()));
    fs::write(&path, "2 2\n10 20\n30 40\n").expect("write height grid");
}

#[when("I configure the engine on the second directory")]
fn configure_second(world: &EngineWorld) {
    world
        .engine
        .configure(&EngineWorld::root(&world.second))
        .expect("second configuration is a no-op");
}

#[when("I add the sample building to M for levels 14 to 16")]
fn add_building(world: &EngineWorld) {
    let report = world
        .engine
        .add_element(
            "M",
            &world.style(),
            building(1, SAMPLE_CENTRE),
            EngineWorld::levels(),
        )
        .expect("ingest building");
    world.reports.borrow_mut().push(report);
}

#[when("I ingest the GeoJSON file into M for levels 14 to 16")]
fn ingest_geojson(world: &EngineWorld) {
    let data = world
        .data
        .borrow()
        .clone()
        .expect("GeoJSON file should be written first");
    let report = world
        .engine
        .add_range("M", &world.style(), &data, EngineWorld::levels())
        .expect("ingest GeoJSON");
    world.reports.borrow_mut().push(report);
}

#[when("I load the building tile at level 15 with a cancelled token")]
fn load_cancelled(world: &EngineWorld) {
    let cancel = CancellationToken::new();
    cancel.cancel();
    world.load_tile(sample_tile(15), &cancel);
}

#[when("I load the sibling of the building tile at level 15")]
fn load_sibling(world: &EngineWorld) {
    world.load_tile(sibling_of(&sample_tile(15)), &CancellationToken::new());
}

#[when("I sample the grid elevation at the sample centre")]
fn sample_elevation(world: &EngineWorld) {
    let height = world
        .engine
        .elevation(&sample_tile(15), ElevationType::Grid, SAMPLE_CENTRE)
        .expect("sample inside the tile");
    world.heights.borrow_mut().push(height);
}

#[then("the index root is the first directory")]
fn first_root(world: &EngineWorld) {
    assert_eq!(
        world.engine.index_root(),
        Some(EngineWorld::root(&world.first))
    );
}

#[then("the default stores are registered")]
fn default_stores(world: &EngineWorld) {
    assert_eq!(
        world.engine.store_keys().expect("configured"),
        [DEFAULT_IN_MEMORY_STORE, DEFAULT_PERSISTENT_STORE]
    );
}

#[then("the building tile at level 15 exists")]
fn building_exists(world: &EngineWorld) {
    assert!(world.engine.exists(&sample_tile(15)).expect("configured"));
}

#[then("its sibling at level 15 does not exist")]
fn sibling_missing(world: &EngineWorld) {
    let sibling = sibling_of(&sample_tile(15));
    assert!(!world.engine.exists(&sibling).expect("configured"));
}

#[then("both reports touch the same tiles")]
fn same_tiles(world: &EngineWorld) {
    let reports = world.reports.borrow();
    let [first, second] = reports.as_slice() else {
        panic!("expected two ingestion reports, got {}", reports.len());
    };
    assert_eq!(first.tiles_touched, 3, "one tile per level");
    assert_eq!(first.tiles_touched, second.tiles_touched);
    assert_eq!(first.records_written, second.records_written);
}

#[then("loading the building tile at level 15 yields one element")]
fn one_element(world: &EngineWorld) {
    world.load_tile(sample_tile(15), &CancellationToken::new());
    let (result, sink) = world.expect_load();
    let summary = result.expect("load succeeds");
    assert_eq!(summary.elements, 1);
    assert_eq!(sink.elements[0].element.id, 1);
}

#[then("the report lists 2 stored elements")]
fn two_stored(world: &EngineWorld) {
    let reports = world.reports.borrow();
    let report = reports.last().expect("an ingestion report");
    assert_eq!(report.elements_read, 2);
    assert_eq!(report.elements_stored, 2);
    assert!(report.skipped.is_empty(), "skipped: {:?}", report.skipped);
}

#[then("the load fails as cancelled")]
fn load_cancelled_result(world: &EngineWorld) {
    let (result, sink) = world.expect_load();
    assert!(
        matches!(result, Err(EngineError::Cancelled)),
        "unexpected result: {result:?}"
    );
    world.load.replace(Some((result, sink)));
}

#[then("no meshes or elements were emitted")]
fn nothing_emitted(world: &EngineWorld) {
    let (_, sink) = world.expect_load();
    assert!(sink.meshes.is_empty());
    assert!(sink.elements.is_empty());
}

#[then("both elevation samples are equal")]
fn equal_heights(world: &EngineWorld) {
    let heights = world.heights.borrow();
    let [before, after] = heights.as_slice() else {
        panic!("expected two samples, got {}", heights.len());
    };
    assert!(*before > 0.0, "grid data should be used, got {before}");
    assert!((before - after).abs() < f64::EPSILON);
}

#[then("the load succeeds with no meshes or elements")]
fn empty_load(world: &EngineWorld) {
    let (result, sink) = world.expect_load();
    let summary = result.expect("empty tiles load successfully");
    assert_eq!((summary.meshes, summary.elements), (0, 0));
    assert!(sink.meshes.is_empty() && sink.elements.is_empty());
}

#[scenario(path = "tests/features/engine.feature", index = 0)]
fn configuring_twice(world: EngineWorld) {
    let _ = world;
}

#[scenario(path = "tests/features/engine.feature", index = 1)]
fn storing_a_building(world: EngineWorld) {
    let _ = world;
}

#[scenario(path = "tests/features/engine.feature", index = 2)]
fn reingesting_is_idempotent(world: EngineWorld) {
    let _ = world;
}

#[scenario(path = "tests/features/engine.feature", index = 3)]
fn ingesting_geojson(world: EngineWorld) {
    let _ = world;
}

#[scenario(path = "tests/features/engine.feature", index = 4)]
fn cancelling_a_load(world: EngineWorld) {
    let _ = world;
}

#[scenario(path = "tests/features/engine.feature", index = 5)]
fn elevation_around_ingestion(world: EngineWorld) {
    let _ = world;
}

#[scenario(path = "tests/features/engine.feature", index = 6)]
fn loading_an_empty_tile(world: EngineWorld) {
    let _ = world;
}

#[test]
fn scenario_indices_follow_feature_order() {
    let feature =
        PathBuf::from(env!("CARGO_MANIFEST_DIR")).join("tests/features/engine.feature");
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
            "configuring twice keeps the first index root",
            "storing a building across a level range",
            "re-ingesting an element is idempotent",
            "ingesting a GeoJSON file over a level range",
            "cancelling a load before it starts",
            "sampling elevation around an ingestion",
            "loading a tile without data",
        ]
    );
}

#[test]
fn missing_data_files_are_io_errors() {
    let dir = TempDir::new().expect("create temp dir");
    let root = EngineWorld::root(&dir);
    let engine = Engine::default();
    engine.configure(&root).expect("configure");
    let style = write_sample_stylesheet(&root);
    let err = engine
        .add_range(
            DEFAULT_IN_MEMORY_STORE,
            &style,
            Utf8Path::new("/nonexistent/data.geojson"),
            EngineWorld::levels(),
        )
        .expect_err("data file is missing");
    assert!(matches!(err, EngineError::Io { .. }), "unexpected: {err:?}");
}
