//! Extruded building footprints.

use geo::{LineString, MultiPolygon, TriangulateEarcut};
use tilestack_core::{Element, ElevationError, Style};

use super::{Mesh, MeshContext};

/// Height used when neither style nor tags give one.
pub const DEFAULT_BUILDING_HEIGHT: f64 = 10.0;

/// Storey height used with `building:levels` when the style has no
/// `levels-height`.
pub const DEFAULT_LEVEL_HEIGHT: f64 = 3.0;

fn metres(value: &str) -> Option<f64> {
    let value = value.trim();
    let number = value.strip_suffix('m').unwrap_or(value).trim();
    number
        .parse::<f64>()
        .ok()
        .filter(|height| height.is_finite() && *height > 0.0)
}

/// Building height in metres.
///
/// The style's `height` wins, then the `height` tag, then `building:levels`
/// times the style's `levels-height`.
///
/// # Examples
/// ```
/// use tilestack_core::{Element, Stylesheet, Tags};
/// use tilestack_data::building_height;
/// use geo::Coord;
///
/// let tags = Tags::from([
///     ("building".to_owned(), "yes".to_owned()),
///     ("building:levels".to_owned(), "4".to_owned()),
/// ]);
/// let ring = vec![
///     Coord { x: 0.0, y: 0.0 },
///     Coord { x: 0.001, y: 0.0 },
///     Coord { x: 0.001, y: 0.001 },
/// ];
/// let element = Element::from_coordinates(1, ring, tags).expect("valid");
/// let sheet: Stylesheet = "area[building] { levels-height: 3.5 }".parse().expect("valid");
/// let style = sheet.style_for(&element, 16).expect("styled");
/// assert_eq!(building_height(&element, &style), 14.0);
/// ```
pub fn building_height(element: &Element, style: &Style) -> f64 {
    if let Some(height) = style.number("height").filter(|height| *height > 0.0) {
        return height;
    }
    if let Some(height) = element.tag("height").and_then(metres) {
        return height;
    }
    let levels = element
        .tag("building:levels")
        .and_then(|levels| levels.trim().parse::<f64>().ok())
        .filter(|levels| levels.is_finite() && *levels > 0.0);
    levels.map_or(DEFAULT_BUILDING_HEIGHT, |levels| {
        levels * style.number("levels-height").unwrap_or(DEFAULT_LEVEL_HEIGHT)
    })
}

fn walls(mesh: &mut Mesh, ring: &LineString<f64>, base: f64, top: f64, colour: u32) {
    for edge in ring.lines() {
        let bottom_start = mesh.push_vertex(edge.start, base, colour);
        let bottom_end = mesh.push_vertex(edge.end, base, colour);
        let top_end = mesh.push_vertex(edge.end, top, colour);
        let top_start = mesh.push_vertex(edge.start, top, colour);
        mesh.push_triangle(bottom_start, bottom_end, top_end);
        mesh.push_triangle(bottom_start, top_end, top_start);
    }
}

/// Extrude every polygon of `shape` from its lowest ground point to
/// `height` metres above it.
pub(super) fn extrude(
    context: MeshContext<'_>,
    id: u64,
    shape: &MultiPolygon<f64>,
    height: f64,
    colour: u32,
) -> Result<Mesh, ElevationError> {
    let mut mesh = Mesh::new(format!("building:{id}"));
    for polygon in shape {
        let mut base = f64::INFINITY;
        for coordinate in polygon.exterior().coords() {
            base = base.min(context.height(*coordinate)?);
        }
        if !base.is_finite() {
            continue;
        }
        let top = base + height;

        walls(&mut mesh, polygon.exterior(), base, top, colour);
        for interior in polygon.interiors() {
            walls(&mut mesh, interior, base, top, colour);
        }
        for triangle in polygon.earcut_triangles() {
            let [a, b, c] = triangle.to_array();
            let a = mesh.push_vertex(a, top, colour);
            let b = mesh.push_vertex(b, top, colour);
            let c = mesh.push_vertex(c, top, colour);
            mesh.push_triangle(a, b, c);
        }
    }
    Ok(mesh)
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;
    use tilestack_core::test_support::{SAMPLE_CENTRE, building, sample_tile};
    use tilestack_core::{FlatElevation, Stylesheet};

    fn style_for(sheet: &str, element: &Element) -> Style {
        let sheet: Stylesheet = sheet.parse().expect("stylesheet");
        sheet.style_for(element, 16).unwrap_or_default()
    }

    #[rstest]
    #[case("area[building] { height: 25 }", &[], 25.0)]
    #[case("area[building] { }", &[("height", "12 m")], 12.0)]
    #[case("area[building] { levels-height: 4 }", &[("building:levels", "3")], 12.0)]
    #[case("area[building] { }", &[("building:levels", "2")], 6.0)]
    #[case("area[building] { }", &[("height", "tall")], DEFAULT_BUILDING_HEIGHT)]
    #[case("area[building] { }", &[], DEFAULT_BUILDING_HEIGHT)]
    fn heights_follow_precedence(
        #[case] sheet: &str,
        #[case] extra: &[(&str, &str)],
        #[case] expected: f64,
    ) {
        let mut element = building(1, SAMPLE_CENTRE);
        for (key, value) in extra {
            element.tags.insert((*key).to_owned(), (*value).to_owned());
        }
        let height = building_height(&element, &style_for(sheet, &element));
        assert!((height - expected).abs() < 1e-9, "{height} != {expected}");
    }

    #[rstest]
    fn box_footprints_get_four_walls_and_a_roof() {
        let element = building(1, SAMPLE_CENTRE);
        let tilestack_core::ElementGeometry::Area(shape) = &element.geometry else {
            panic!("sample building is an area");
        };
        let quad_key = sample_tile(16);
        let mesh = extrude(
            MeshContext {
                quad_key: &quad_key,
                elevation: &FlatElevation,
            },
            1,
            shape,
            8.0,
            0,
        )
        .expect("flat elevation never fails");
        // Four wall quads plus two roof triangles.
        assert_eq!(mesh.triangle_count(), 4 * 2 + 2);
        assert!(mesh.vertices.iter().all(|vertex| vertex[2] <= 8.0));
    }
}
