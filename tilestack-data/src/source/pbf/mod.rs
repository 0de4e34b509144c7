//! OpenStreetMap PBF reader.
//!
//! Tagged nodes become points, tagged ways become lines or areas and
//! `type=multipolygon` relations become areas with holes. Ways without tags
//! are kept only to resolve relation members.

mod ids;
mod rings;

use std::collections::HashMap;

use camino::Utf8Path;
use geo::Coord;
use log::{debug, warn};
use osmpbf::{Element as OsmElement, ElementReader, RelMemberType};
use tilestack_core::{Element, ElementGeometry, Tags};

use super::{SourceBatch, SourceError};
use rings::{assemble_rings, nest_rings};

pub use ids::{OsmKind, decode_osm_id};

#[derive(Debug)]
struct RawWay {
    refs: Vec<i64>,
    tags: Tags,
}

#[derive(Debug)]
struct RawRelation {
    id: i64,
    tags: Tags,
    outer: Vec<i64>,
    inner: Vec<i64>,
}

#[derive(Debug, Default)]
struct PbfAccumulator {
    nodes: HashMap<i64, Coord<f64>>,
    points: Vec<(i64, Coord<f64>, Tags)>,
    ways: HashMap<i64, RawWay>,
    relations: Vec<RawRelation>,
}

fn collect_tags<'a>(tags: impl IntoIterator<Item = (&'a str, &'a str)>) -> Tags {
    tags.into_iter()
        .map(|(key, value)| (key.to_owned(), value.to_owned()))
        .collect()
}

fn validated_coord(lon: f64, lat: f64) -> Option<Coord<f64>> {
    (lon.is_finite()
        && lat.is_finite()
        && (-180.0..=180.0).contains(&lon)
        && (-90.0..=90.0).contains(&lat))
    .then_some(Coord { x: lon, y: lat })
}

impl PbfAccumulator {
    fn process_element(&mut self, element: OsmElement<'_>) {
        match element {
            OsmElement::Node(node) => {
                self.process_node(node.id(), node.lon(), node.lat(), collect_tags(node.tags()));
            }
            OsmElement::DenseNode(node) => {
                self.process_node(node.id(), node.lon(), node.lat(), collect_tags(node.tags()));
            }
            OsmElement::Way(way) => {
                self.ways.insert(
                    way.id(),
                    RawWay {
                        refs: way.refs().collect(),
                        tags: collect_tags(way.tags()),
                    },
                );
            }
            OsmElement::Relation(relation) => {
                let mut tags = collect_tags(relation.tags());
                if tags.remove("type").as_deref() != Some("multipolygon") {
                    return;
                }
                let mut outer = Vec::new();
                let mut inner = Vec::new();
                for member in relation.members() {
                    if member.member_type != RelMemberType::Way {
                        continue;
                    }
                    match member.role() {
                        Ok("inner") => inner.push(member.member_id),
                        _ => outer.push(member.member_id),
                    }
                }
                self.relations.push(RawRelation {
                    id: relation.id(),
                    tags,
                    outer,
                    inner,
                });
            }
        }
    }

    fn process_node(&mut self, raw_id: i64, lon: f64, lat: f64, tags: Tags) {
        let Some(location) = validated_coord(lon, lat) else {
            warn!("Skipped OSM node {raw_id}: invalid coordinate ({lat}, {lon})");
            return;
        };
        self.nodes.insert(raw_id, location);
        if !tags.is_empty() {
            self.points.push((raw_id, location, tags));
        }
    }

    fn combine(mut self, other: Self) -> Self {
        self.nodes.extend(other.nodes);
        self.points.extend(other.points);
        self.ways.extend(other.ways);
        self.relations.extend(other.relations);
        self
    }

    fn into_batch(self) -> SourceBatch {
        let mut batch = SourceBatch::default();

        for (raw_id, location, tags) in &self.points {
            let Some(id) = ids::element_id(OsmKind::Node, *raw_id) else {
                continue;
            };
            batch.accept(id, Element::from_coordinates(id, vec![*location], tags.clone()));
        }

        for (raw_id, way) in &self.ways {
            if way.tags.is_empty() {
                continue;
            }
            let Some(id) = ids::element_id(OsmKind::Way, *raw_id) else {
                continue;
            };
            match self.coordinates(&way.refs) {
                Ok(coords) => {
                    batch.accept(id, Element::from_coordinates(id, coords, way.tags.clone()));
                }
                Err(missing) => {
                    batch.skip(Some(id), format!("way references unknown node {missing}"));
                }
            }
        }

        for relation in &self.relations {
            let Some(id) = ids::element_id(OsmKind::Relation, relation.id) else {
                continue;
            };
            match self.relation_geometry(relation) {
                Ok(geometry) => {
                    batch
                        .elements
                        .push(Element::new(id, geometry, relation.tags.clone()));
                }
                Err(reason) => batch.skip(Some(id), reason),
            }
        }

        batch.elements.sort_by_key(|element| element.id);
        batch.skipped.sort_by_key(|skipped| skipped.id);
        batch
    }

    fn coordinates(&self, refs: &[i64]) -> Result<Vec<Coord<f64>>, i64> {
        refs.iter()
            .map(|node| self.nodes.get(node).copied().ok_or(*node))
            .collect()
    }

    fn rings(&self, members: &[i64]) -> Result<Vec<Vec<Coord<f64>>>, String> {
        let segments = members
            .iter()
            .map(|way| {
                self.ways
                    .get(way)
                    .map(|raw| raw.refs.clone())
                    .ok_or_else(|| format!("relation references unknown way {way}"))
            })
            .collect::<Result<Vec<_>, _>>()?;
        assemble_rings(segments)
            .map_err(|err| err.to_string())?
            .iter()
            .map(|ring| {
                self.coordinates(ring)
                    .map_err(|missing| format!("ring references unknown node {missing}"))
            })
            .collect()
    }

    fn relation_geometry(&self, relation: &RawRelation) -> Result<ElementGeometry, String> {
        let outers = self.rings(&relation.outer)?;
        if outers.is_empty() {
            return Err("multipolygon has no outer ring".to_owned());
        }
        let inners = self.rings(&relation.inner)?;
        Ok(ElementGeometry::Area(nest_rings(relation.id, outers, inners)))
    }
}

/// Read every supported element from an OSM PBF file.
pub(super) fn read_pbf(path: &Utf8Path) -> Result<SourceBatch, SourceError> {
    let reader = ElementReader::from_path(path).map_err(|source| SourceError::Open {
        path: path.to_path_buf(),
        source,
    })?;
    let accumulator = reader
        .par_map_reduce(
            |element| {
                let mut accumulator = PbfAccumulator::default();
                accumulator.process_element(element);
                accumulator
            },
            PbfAccumulator::default,
            PbfAccumulator::combine,
        )
        .map_err(|source| SourceError::Decode {
            path: path.to_path_buf(),
            source,
        })?;
    debug!(
        "read {} nodes, {} ways and {} multipolygons from {path}",
        accumulator.nodes.len(),
        accumulator.ways.len(),
        accumulator.relations.len()
    );
    Ok(accumulator.into_batch())
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::{fixture, rstest};

    fn tags(pairs: &[(&str, &str)]) -> Tags {
        collect_tags(pairs.iter().copied())
    }

    #[fixture]
    fn accumulator() -> PbfAccumulator {
        let mut accumulator = PbfAccumulator::default();
        for (id, lon, lat) in [
            (1, 13.0, 52.0),
            (2, 13.001, 52.0),
            (3, 13.001, 52.001),
            (4, 13.0, 52.001),
        ] {
            accumulator.process_node(id, lon, lat, Tags::new());
        }
        accumulator
    }

    #[rstest]
    fn tagged_nodes_become_points(mut accumulator: PbfAccumulator) {
        accumulator.process_node(10, 13.0005, 52.0005, tags(&[("amenity", "cafe")]));
        let batch = accumulator.into_batch();
        assert_eq!(batch.elements.len(), 1);
        assert_eq!(batch.elements[0].id, 10);
        assert!(matches!(batch.elements[0].geometry, ElementGeometry::Point(_)));
    }

    #[rstest]
    fn invalid_node_coordinates_are_dropped(mut accumulator: PbfAccumulator) {
        accumulator.process_node(11, 200.0, 52.0, tags(&[("amenity", "cafe")]));
        assert!(!accumulator.nodes.contains_key(&11));
        assert!(accumulator.into_batch().elements.is_empty());
    }

    #[rstest]
    fn closed_building_ways_become_areas(mut accumulator: PbfAccumulator) {
        accumulator.ways.insert(
            7,
            RawWay {
                refs: vec![1, 2, 3, 4, 1],
                tags: tags(&[("building", "yes")]),
            },
        );
        let batch = accumulator.into_batch();
        let element = batch.elements.first().expect("way element");
        assert_eq!(decode_osm_id(element.id), (OsmKind::Way, 7));
        assert!(matches!(element.geometry, ElementGeometry::Area(_)));
    }

    #[rstest]
    fn ways_with_unknown_nodes_are_skipped(mut accumulator: PbfAccumulator) {
        accumulator.ways.insert(
            8,
            RawWay {
                refs: vec![1, 99],
                tags: tags(&[("highway", "service")]),
            },
        );
        let batch = accumulator.into_batch();
        assert!(batch.elements.is_empty());
        assert_eq!(batch.skipped.len(), 1);
        assert!(batch.skipped[0].reason.contains("99"));
    }

    #[rstest]
    fn multipolygons_join_member_ways(mut accumulator: PbfAccumulator) {
        accumulator.ways.insert(
            20,
            RawWay {
                refs: vec![1, 2, 3],
                tags: Tags::new(),
            },
        );
        accumulator.ways.insert(
            21,
            RawWay {
                refs: vec![3, 4, 1],
                tags: Tags::new(),
            },
        );
        accumulator.relations.push(RawRelation {
            id: 30,
            tags: tags(&[("landuse", "grass")]),
            outer: vec![20, 21],
            inner: Vec::new(),
        });
        let batch = accumulator.into_batch();
        assert_eq!(batch.elements.len(), 1);
        let element = &batch.elements[0];
        assert_eq!(decode_osm_id(element.id), (OsmKind::Relation, 30));
        let ElementGeometry::Area(shape) = &element.geometry else {
            panic!("expected an area, got {:?}", element.geometry);
        };
        assert_eq!(shape.0.len(), 1);
        assert_eq!(shape.0[0].exterior().0.len(), 5);
    }

    #[rstest]
    fn broken_multipolygons_are_skipped(mut accumulator: PbfAccumulator) {
        accumulator.ways.insert(
            20,
            RawWay {
                refs: vec![1, 2, 3],
                tags: Tags::new(),
            },
        );
        accumulator.relations.push(RawRelation {
            id: 31,
            tags: tags(&[("landuse", "grass")]),
            outer: vec![20],
            inner: Vec::new(),
        });
        let batch = accumulator.into_batch();
        assert!(batch.elements.is_empty());
        assert!(batch.skipped[0].reason.contains("not closed"));
    }
}
