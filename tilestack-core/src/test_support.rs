//! Fixtures shared by unit and behaviour tests across the workspace.

use camino::{Utf8Path, Utf8PathBuf};
use geo::Coord;

use crate::{Element, QuadKey, Tags};

/// Stylesheet covering every builder the loader knows about.
pub const SAMPLE_STYLESHEET: &str = "\
/* Terrain canvas */
canvas { color: #88aa66; grid-cells: 2 }

area[building] { builder: building; color: #c0a080; levels-height: 3 }
area|z16-[building][height] { builder: building }
way[highway] { builder: road; width: 6; color: #404040 }
way[highway=footway] { width: 2 }
area[landuse], area[natural] { builder: terrain; color: #66aa44 }
node[amenity] { builder: none }
";

/// Centre of the sample scene, near Berlin's Alexanderplatz.
pub const SAMPLE_CENTRE: Coord<f64> = Coord {
    x: 13.412_5,
    y: 52.521_9,
};

/// Write [`SAMPLE_STYLESHEET`] into `dir` and return its path.
///
/// # Panics
/// Panics if the file cannot be written; only tests call this helper.
pub fn write_sample_stylesheet(dir: &Utf8Path) -> Utf8PathBuf {
    let path = dir.join("sample.mapcss");
    std::fs::write(&path, SAMPLE_STYLESHEET).unwrap_or_else(|err| {
        panic!("failed to write sample stylesheet to {path}: {err}");
    });
    path
}

/// Build a tag map from string pairs.
pub fn tags(pairs: &[(&str, &str)]) -> Tags {
    pairs
        .iter()
        .map(|(key, value)| ((*key).to_owned(), (*value).to_owned()))
        .collect()
}

/// Square building of roughly 30 m per side centred on `centre`, as an
/// open four-point ring.
///
/// # Panics
/// Panics if `centre` is not a valid WGS84 coordinate.
pub fn building(id: u64, centre: Coord<f64>) -> Element {
    let half = 0.000_15;
    let ring = vec![
        Coord {
            x: centre.x - half,
            y: centre.y - half,
        },
        Coord {
            x: centre.x + half,
            y: centre.y - half,
        },
        Coord {
            x: centre.x + half,
            y: centre.y + half,
        },
        Coord {
            x: centre.x - half,
            y: centre.y + half,
        },
    ];
    Element::from_coordinates(id, ring, tags(&[("building", "yes")]))
        .unwrap_or_else(|err| panic!("invalid sample building: {err}"))
}

/// Short east-west road through `centre`.
///
/// # Panics
/// Panics if `centre` is not a valid WGS84 coordinate.
pub fn road(id: u64, centre: Coord<f64>) -> Element {
    let line = vec![
        Coord {
            x: centre.x - 0.000_4,
            y: centre.y,
        },
        Coord {
            x: centre.x + 0.000_4,
            y: centre.y,
        },
    ];
    Element::from_coordinates(id, line, tags(&[("highway", "residential")]))
        .unwrap_or_else(|err| panic!("invalid sample road: {err}"))
}

/// Point feature at `location`.
///
/// # Panics
/// Panics if `location` is not a valid WGS84 coordinate.
pub fn cafe(id: u64, location: Coord<f64>) -> Element {
    Element::from_coordinates(id, vec![location], tags(&[("amenity", "cafe")]))
        .unwrap_or_else(|err| panic!("invalid sample cafe: {err}"))
}

/// Tile containing [`SAMPLE_CENTRE`] at `lod`.
///
/// # Panics
/// Panics if `lod` exceeds the supported maximum.
pub fn sample_tile(lod: u8) -> QuadKey {
    QuadKey::from_coordinate(SAMPLE_CENTRE, lod)
        .unwrap_or_else(|err| panic!("invalid sample level: {err}"))
}

/// A tile at the same level that does not cover `quad_key`'s area.
///
/// # Panics
/// Panics if `quad_key` is at level 0, where no such tile exists.
pub fn sibling_of(quad_key: &QuadKey) -> QuadKey {
    let x = quad_key.tile_x() ^ 1;
    QuadKey::new(x, quad_key.tile_y(), quad_key.lod())
        .unwrap_or_else(|err| panic!("tile has no sibling: {err}"))
}
