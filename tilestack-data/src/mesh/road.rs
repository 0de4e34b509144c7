//! Flat ribbons along polylines.

use geo::{Coord, LineString};
use tilestack_core::ElevationError;

use super::{METRES_PER_DEGREE, Mesh, MeshContext};

/// Ribbon width in metres when the style has no `width`.
pub(super) const DEFAULT_ROAD_WIDTH: f64 = 4.0;

/// Offset of `half_width` metres to the right of `tangent` at `latitude`,
/// in degrees.
fn right_offset(tangent: Coord<f64>, latitude: f64, half_width: f64) -> Coord<f64> {
    let length = tangent.x.hypot(tangent.y);
    if length <= f64::EPSILON {
        return Coord { x: 0.0, y: 0.0 };
    }
    let east = tangent.y / length * half_width;
    let north = -tangent.x / length * half_width;
    Coord {
        x: east / (METRES_PER_DEGREE * latitude.to_radians().cos().max(1e-6)),
        y: north / METRES_PER_DEGREE,
    }
}

/// Direction of travel at `index` in local metres, averaging the adjoining
/// segments at interior vertices.
fn tangent(points: &[Coord<f64>], index: usize) -> Coord<f64> {
    let metric = |from: Coord<f64>, to: Coord<f64>| {
        let scale = from.y.to_radians().cos();
        let x = (to.x - from.x) * scale;
        let y = to.y - from.y;
        let length = x.hypot(y);
        if length <= f64::EPSILON {
            Coord { x: 0.0, y: 0.0 }
        } else {
            Coord {
                x: x / length,
                y: y / length,
            }
        }
    };
    let incoming = index
        .checked_sub(1)
        .map(|previous| metric(points[previous], points[index]));
    let outgoing = points
        .get(index + 1)
        .map(|next| metric(points[index], *next));
    match (incoming, outgoing) {
        (Some(a), Some(b)) => a + b,
        (Some(a), None) => a,
        (None, Some(b)) => b,
        (None, None) => Coord { x: 0.0, y: 0.0 },
    }
}

/// Two vertices per polyline point, two triangles per segment.
pub(super) fn ribbon<'a>(
    context: MeshContext<'_>,
    id: u64,
    lines: impl IntoIterator<Item = &'a LineString<f64>>,
    width: f64,
    colour: u32,
) -> Result<Mesh, ElevationError> {
    let half_width = width.max(0.0) / 2.0;
    let mut mesh = Mesh::new(format!("road:{id}"));
    for line in lines {
        let points = &line.0;
        if points.len() < 2 {
            continue;
        }
        let mut previous: Option<(u32, u32)> = None;
        for (index, point) in points.iter().enumerate() {
            let offset = right_offset(tangent(points, index), point.y, half_width);
            let height = context.height(*point)?;
            let left = mesh.push_vertex(*point - offset, height, colour);
            let right = mesh.push_vertex(*point + offset, height, colour);
            if let Some((previous_left, previous_right)) = previous {
                mesh.push_triangle(previous_left, previous_right, left);
                mesh.push_triangle(previous_right, right, left);
            }
            previous = Some((left, right));
        }
    }
    Ok(mesh)
}
