//! Workspace fixtures shared by CLI unit and behaviour tests.

use super::*;
use camino::Utf8PathBuf;
use std::fs;
use tempfile::TempDir;
use tilestack_core::test_support::write_sample_stylesheet;

/// GeoJSON with one building and one road around the sample centre.
pub(super) const SAMPLE_GEOJSON: &str = r#"{
  "type": "FeatureCollection",
  "features": [
    {
      "type": "Feature",
      "id": 10,
      "properties": { "building": "yes" },
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
      "properties": { "highway": "residential" },
      "geometry": {
        "type": "LineString",
        "coordinates": [[13.4121, 52.5219], [13.4129, 52.5219]]
      }
    }
  ]
}"#;

/// Temporary index root holding a stylesheet and a GeoJSON dataset.
pub(super) struct Workspace {
    _dir: TempDir,
    pub(super) root: Utf8PathBuf,
    pub(super) style: Utf8PathBuf,
    pub(super) data: Utf8PathBuf,
}

impl Workspace {
    pub(super) fn new() -> Self {
        let dir = TempDir::new().expect("tempdir");
        let root = Utf8PathBuf::from_path_buf(dir.path().to_path_buf()).expect("utf-8 workspace");
        let style = write_sample_stylesheet(&root);
        let data = root.join("sample.geojson");
        fs::write(&data, SAMPLE_GEOJSON).expect("write GeoJSON dataset");
        Self {
            _dir: dir,
            root,
            style,
            data,
        }
    }
}

/// Parse `argv` and run the selected command, capturing its output.
pub(super) fn run_cli(argv: &[String]) -> (Result<(), CliError>, String) {
    let mut stdout = Vec::new();
    let outcome = Cli::try_parse_from(argv)
        .map_err(CliError::ArgumentParsing)
        .and_then(|cli| dispatch(cli.command, &mut stdout));
    let text = String::from_utf8(stdout).expect("CLI output is UTF-8");
    (outcome, text)
}
