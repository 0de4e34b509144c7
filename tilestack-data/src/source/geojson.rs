//! GeoJSON reader.
//!
//! Accepts a `Feature` or a `FeatureCollection`. Features need a numeric
//! `id`; their `properties` become tags, with non-string values rendered as
//! JSON text.

use camino::Utf8Path;
use geo::{Coord, LineString, MultiLineString, MultiPolygon, Point, Polygon};
use serde::Deserialize;
use serde_json::{Map, Value};
use tilestack_core::{Element, ElementGeometry, Tags};

use super::{SourceBatch, SourceError};

type Position = Vec<f64>;

#[derive(Debug, Deserialize)]
#[serde(tag = "type", content = "coordinates")]
enum Geometry {
    Point(Position),
    LineString(Vec<Position>),
    MultiLineString(Vec<Vec<Position>>),
    Polygon(Vec<Vec<Position>>),
    MultiPolygon(Vec<Vec<Vec<Position>>>),
}

#[derive(Debug, Deserialize)]
struct Feature {
    geometry: Option<Geometry>,
    #[serde(default)]
    properties: Option<Map<String, Value>>,
}

fn coordinate(position: &[f64]) -> Result<Coord<f64>, String> {
    let [lon, lat, ..] = position else {
        return Err(format!("position {position:?} needs longitude and latitude"));
    };
    let valid = lon.is_finite()
        && lat.is_finite()
        && (-180.0..=180.0).contains(lon)
        && (-90.0..=90.0).contains(lat);
    if !valid {
        return Err(format!("position ({lon}, {lat}) is outside WGS84 bounds"));
    }
    Ok(Coord { x: *lon, y: *lat })
}

fn line(positions: &[Position]) -> Result<LineString<f64>, String> {
    if positions.len() < 2 {
        return Err(format!("line has {} positions; at least 2 required", positions.len()));
    }
    positions
        .iter()
        .map(|position| coordinate(position))
        .collect::<Result<Vec<_>, _>>()
        .map(LineString::from)
}

fn ring(positions: &[Position]) -> Result<LineString<f64>, String> {
    let mut ring = line(positions)?;
    ring.close();
    if ring.0.len() < 4 {
        return Err(format!("ring has {} positions; at least 4 required", ring.0.len()));
    }
    Ok(ring)
}

fn polygon(rings: &[Vec<Position>]) -> Result<Polygon<f64>, String> {
    let Some((exterior, interiors)) = rings.split_first() else {
        return Err("polygon has no rings".to_owned());
    };
    let interiors = interiors
        .iter()
        .map(|positions| ring(positions))
        .collect::<Result<Vec<_>, _>>()?;
    Ok(Polygon::new(ring(exterior)?, interiors))
}

impl Geometry {
    fn into_element_geometry(self) -> Result<ElementGeometry, String> {
        Ok(match self {
            Self::Point(position) => ElementGeometry::Point(Point::from(coordinate(&position)?)),
            Self::LineString(positions) => {
                ElementGeometry::Line(MultiLineString::new(vec![line(&positions)?]))
            }
            Self::MultiLineString(lines) => ElementGeometry::Line(MultiLineString::new(
                lines
                    .iter()
                    .map(|positions| line(positions))
                    .collect::<Result<_, _>>()?,
            )),
            Self::Polygon(rings) => {
                ElementGeometry::Area(MultiPolygon::new(vec![polygon(&rings)?]))
            }
            Self::MultiPolygon(polygons) => ElementGeometry::Area(MultiPolygon::new(
                polygons
                    .iter()
                    .map(|rings| polygon(rings))
                    .collect::<Result<_, _>>()?,
            )),
        })
    }
}

fn feature_id(value: &Value) -> Option<u64> {
    match value.get("id")? {
        Value::Number(number) => number.as_u64(),
        Value::String(text) => text.parse().ok(),
        _ => None,
    }
}

fn properties_to_tags(properties: Map<String, Value>) -> Tags {
    properties
        .into_iter()
        .filter_map(|(key, value)| match value {
            Value::Null => None,
            Value::String(text) => Some((key, text)),
            other => Some((key, other.to_string())),
        })
        .collect()
}

fn element(id: u64, value: Value) -> Result<Element, String> {
    let feature: Feature = serde_json::from_value(value).map_err(|err| err.to_string())?;
    let geometry = feature
        .geometry
        .ok_or_else(|| "feature has no geometry".to_owned())?
        .into_element_geometry()?;
    let tags = feature.properties.map(properties_to_tags).unwrap_or_default();
    Ok(Element::new(id, geometry, tags))
}

fn features(path: &Utf8Path, document: Value) -> Result<Vec<Value>, SourceError> {
    let malformed = |message: &str| SourceError::Malformed {
        path: path.to_path_buf(),
        message: message.to_owned(),
    };
    match document.get("type").and_then(Value::as_str) {
        Some("FeatureCollection") => match document {
            Value::Object(mut object) => match object.remove("features") {
                Some(Value::Array(features)) => Ok(features),
                _ => Err(malformed("FeatureCollection without a features array")),
            },
            _ => Err(malformed("FeatureCollection is not an object")),
        },
        Some("Feature") => Ok(vec![document]),
        Some(other) => Err(malformed(&format!("unsupported GeoJSON type '{other}'"))),
        None => Err(malformed("document has no GeoJSON type")),
    }
}

/// Read every feature from a GeoJSON document.
pub(super) fn read_geojson(path: &Utf8Path) -> Result<SourceBatch, SourceError> {
    let text = tilestack_fs::read_to_string(path).map_err(|source| SourceError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    parse_geojson(path, &text)
}

fn parse_geojson(path: &Utf8Path, text: &str) -> Result<SourceBatch, SourceError> {
    let document: Value = serde_json::from_str(text).map_err(|source| SourceError::Json {
        path: path.to_path_buf(),
        source,
    })?;
    let mut batch = SourceBatch::default();
    for value in features(path, document)? {
        let Some(id) = feature_id(&value) else {
            batch.skip(None, "feature has no numeric id".to_owned());
            continue;
        };
        match element(id, value) {
            Ok(element) => batch.elements.push(element),
            Err(reason) => batch.skip(Some(id), reason),
        }
    }
    batch.elements.sort_by_key(|element| element.id);
    Ok(batch)
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;
    use tilestack_core::GeometryKind;

    fn parse(text: &str) -> Result<SourceBatch, SourceError> {
        parse_geojson(Utf8Path::new("test.geojson"), text)
    }

    #[rstest]
    fn feature_collections_yield_every_feature() {
        let batch = parse(
            r#"{
                "type": "FeatureCollection",
                "features": [
                    {"type": "Feature", "id": 2,
                     "geometry": {"type": "LineString", "coordinates": [[13.0, 52.0], [13.1, 52.0]]},
                     "properties": {"highway": "primary", "lanes": 2}},
                    {"type": "Feature", "id": 1,
                     "geometry": {"type": "Polygon", "coordinates": [[[13.0, 52.0], [13.1, 52.0], [13.1, 52.1], [13.0, 52.0]]]},
                     "properties": {"building": "yes", "name": null}}
                ]
            }"#,
        )
        .expect("valid document");

        assert!(batch.skipped.is_empty());
        let ids: Vec<u64> = batch.elements.iter().map(|element| element.id).collect();
        assert_eq!(ids, [1, 2]);
        assert_eq!(batch.elements[0].geometry.kind(), GeometryKind::Area);
        assert_eq!(batch.elements[0].tag("name"), None);
        assert_eq!(batch.elements[1].geometry.kind(), GeometryKind::Line);
        assert_eq!(batch.elements[1].tag("lanes"), Some("2"));
    }

    #[rstest]
    fn single_features_are_accepted() {
        let batch = parse(
            r#"{"type": "Feature", "id": "7",
                "geometry": {"type": "Point", "coordinates": [13.4, 52.5]},
                "properties": {"amenity": "cafe"}}"#,
        )
        .expect("valid feature");
        assert_eq!(batch.elements.len(), 1);
        assert_eq!(batch.elements[0].id, 7);
    }

    #[rstest]
    #[case(r#"{"type": "Feature", "geometry": {"type": "Point", "coordinates": [0, 0]}}"#, None)]
    #[case(
        r#"{"type": "Feature", "id": 3, "geometry": {"type": "Point", "coordinates": [500, 0]}}"#,
        Some(3)
    )]
    #[case(
        r#"{"type": "Feature", "id": 4, "geometry": {"type": "LineString", "coordinates": [[0, 0]]}}"#,
        Some(4)
    )]
    #[case(
        r#"{"type": "Feature", "id": 5, "geometry": {"type": "GeometryCollection", "geometries": []}}"#,
        Some(5)
    )]
    #[case(r#"{"type": "Feature", "id": 6, "geometry": null}"#, Some(6))]
    fn bad_features_are_skipped(#[case] text: &str, #[case] id: Option<u64>) {
        let batch = parse(text).expect("document still parses");
        assert!(batch.elements.is_empty());
        assert_eq!(batch.skipped.len(), 1);
        assert_eq!(batch.skipped[0].id, id);
    }

    #[rstest]
    #[case("{not json", "Json")]
    #[case(r#"{"type": "Topology"}"#, "Malformed")]
    #[case(r#"{"type": "FeatureCollection"}"#, "Malformed")]
    #[case("[]", "Malformed")]
    fn malformed_documents_fail(#[case] text: &str, #[case] variant: &str) {
        let err = parse(text).expect_err("malformed document");
        let actual = match err {
            SourceError::Json { .. } => "Json",
            SourceError::Malformed { .. } => "Malformed",
            other => panic!("unexpected error: {other:?}"),
        };
        assert_eq!(actual, variant);
    }

    #[rstest]
    fn open_polygon_rings_are_closed() {
        let batch = parse(
            r#"{"type": "Feature", "id": 9,
                "geometry": {"type": "Polygon", "coordinates": [[[0, 0], [1, 0], [1, 1]]]}}"#,
        )
        .expect("valid feature");
        let ElementGeometry::Area(shape) = &batch.elements[0].geometry else {
            panic!("expected an area");
        };
        let exterior = shape.0[0].exterior();
        assert_eq!(exterior.0.first(), exterior.0.last());
    }
}
