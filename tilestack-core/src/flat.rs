//! Helpers for the flat-array convention used by foreign-function bindings.
//!
//! Bindings pass geometry as `[lat0, lon0, lat1, lon1, ...]` and tags as
//! `[key0, value0, key1, value1, ...]`. Everything past this module works on
//! structured [`Element`] values.

use geo::Coord;

use crate::{Element, ElementError, Tags};

/// Build an [`Element`] from interleaved vertices and tags.
///
/// # Examples
/// ```
/// use tilestack_core::{GeometryKind, flat::element_from_flat};
///
/// # fn main() -> Result<(), tilestack_core::ElementError> {
/// let element = element_from_flat(5, &[52.52, 13.40], &["amenity".into(), "cafe".into()])?;
/// assert_eq!(element.geometry.kind(), GeometryKind::Point);
/// assert_eq!(element.tag("amenity"), Some("cafe"));
/// # Ok(())
/// # }
/// ```
pub fn element_from_flat(
    id: u64,
    vertices: &[f64],
    tags: &[String],
) -> Result<Element, ElementError> {
    let coordinates = coordinates_from_flat(id, vertices)?;
    let tags = tags_from_flat(id, tags)?;
    Element::from_coordinates(id, coordinates, tags)
}

/// Decode `[lat, lon, ...]` into coordinates with `x = longitude`.
pub fn coordinates_from_flat(id: u64, vertices: &[f64]) -> Result<Vec<Coord<f64>>, ElementError> {
    let (pairs, remainder) = vertices.as_chunks::<2>();
    if !remainder.is_empty() {
        return Err(ElementError::UnpairedVertex {
            id,
            len: vertices.len(),
        });
    }
    Ok(pairs.iter().map(|&[lat, lon]| Coord { x: lon, y: lat }).collect())
}

/// Decode `[key, value, ...]` into a tag map. Later duplicates win.
pub fn tags_from_flat(id: u64, tags: &[String]) -> Result<Tags, ElementError> {
    let (pairs, remainder) = tags.as_chunks::<2>();
    if !remainder.is_empty() {
        return Err(ElementError::UnpairedTag {
            id,
            len: tags.len(),
        });
    }
    Ok(pairs
        .iter()
        .map(|[key, value]| (key.clone(), value.clone()))
        .collect())
}

/// Flatten an element's tags back into `[key, value, ...]`, sorted by key.
pub fn tags_to_flat(tags: &Tags) -> Vec<String> {
    let mut entries: Vec<_> = tags.iter().collect();
    entries.sort_unstable();
    entries
        .into_iter()
        .flat_map(|(key, value)| [key.clone(), value.clone()])
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::GeometryKind;
    use rstest::rstest;

    #[rstest]
    fn vertices_are_latitude_first() {
        let coordinates = coordinates_from_flat(1, &[10.0, 20.0, 11.0, 21.0]).expect("pairs");
        assert_eq!(
            coordinates,
            vec![Coord { x: 20.0, y: 10.0 }, Coord { x: 21.0, y: 11.0 }]
        );
    }

    #[rstest]
    fn odd_vertex_count_is_rejected() {
        let err = coordinates_from_flat(4, &[1.0, 2.0, 3.0]).expect_err("odd");
        assert_eq!(err, ElementError::UnpairedVertex { id: 4, len: 3 });
    }

    #[rstest]
    fn odd_tag_count_is_rejected() {
        let err = tags_from_flat(4, &["building".into()]).expect_err("odd");
        assert_eq!(err, ElementError::UnpairedTag { id: 4, len: 1 });
    }

    #[rstest]
    fn four_point_building_becomes_an_area() {
        let vertices = [52.0, 13.0, 52.0, 13.1, 52.1, 13.1, 52.1, 13.0];
        let element = element_from_flat(1, &vertices, &["building".into(), "yes".into()])
            .expect("element");
        assert_eq!(element.geometry.kind(), GeometryKind::Area);
    }

    #[rstest]
    fn tags_flatten_in_key_order() {
        let tags = tags_from_flat(1, &["b".into(), "2".into(), "a".into(), "1".into()])
            .expect("tags");
        assert_eq!(tags_to_flat(&tags), vec!["a", "1", "b", "2"]);
    }
}
