use geo::Coord;
use tilestack_core::ElevationError;

use super::{Mesh, MeshContext};

/// Height-mapped grid over a whole tile, built one row at a time so callers
/// can stop between rows.
pub(crate) struct TerrainGrid<'a> {
    context: MeshContext<'a>,
    cells: u32,
    colour: u32,
    next_row: u32,
    mesh: Mesh,
}

impl<'a> TerrainGrid<'a> {
    pub(crate) fn new(context: MeshContext<'a>, cells: u32, colour: u32) -> Self {
        Self {
            context,
            cells: cells.max(1),
            colour,
            next_row: 0,
            mesh: Mesh::new("terrain"),
        }
    }

    /// Whether every vertex row has been built.
    pub(crate) fn is_complete(&self) -> bool {
        self.next_row > self.cells
    }

    /// Sample the next row of vertices, north to south, and stitch it to the
    /// previous one.
    pub(crate) fn build_row(&mut self) -> Result<(), ElevationError> {
        if self.is_complete() {
            return Ok(());
        }
        let bounds = self.context.quad_key.bounds();
        let row = self.next_row;
        let cells = f64::from(self.cells);
        let lat = bounds.max().y - bounds.height() * f64::from(row) / cells;
        let mut first = 0;
        for column in 0..=self.cells {
            let lon = bounds.min().x + bounds.width() * f64::from(column) / cells;
            let coordinate = Coord { x: lon, y: lat };
            let height = self.context.height(coordinate)?;
            let index = self.mesh.push_vertex(coordinate, height, self.colour);
            if column == 0 {
                first = index;
            }
        }
        if row > 0 {
            let stride = self.cells + 1;
            let above = first - stride;
            for column in 0..self.cells {
                let north_west = above + column;
                let south_west = first + column;
                self.mesh
                    .push_triangle(north_west, south_west, north_west + 1);
                self.mesh
                    .push_triangle(north_west + 1, south_west, south_west + 1);
            }
        }
        self.next_row += 1;
        Ok(())
    }

    pub(crate) fn finish(self) -> Mesh {
        self.mesh
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;
    use tilestack_core::{ElevationProvider, QuadKey};

    struct Slope;

    impl ElevationProvider for Slope {
        fn elevation(&self, _: &QuadKey, coordinate: Coord<f64>) -> Result<f64, ElevationError> {
            Ok(coordinate.y)
        }
    }

    #[rstest]
    #[case(1)]
    #[case(4)]
    fn grids_have_square_vertex_counts(#[case] cells: u32) {
        let quad_key = QuadKey::new(3, 5, 4).expect("tile");
        let mut grid = TerrainGrid::new(
            MeshContext {
                quad_key: &quad_key,
                elevation: &Slope,
            },
            cells,
            0,
        );
        while !grid.is_complete() {
            grid.build_row().expect("sample");
        }
        let mesh = grid.finish();
        let side = usize::try_from(cells).expect("small") + 1;
        assert_eq!(mesh.vertex_count(), side * side);
        assert_eq!(mesh.triangle_count(), (side - 1) * (side - 1) * 2);
        let bounds = quad_key.bounds();
        assert!((mesh.vertices[0][2] - bounds.max().y).abs() < 1e-9);
        assert!((mesh.vertices[side * side - 1][2] - bounds.min().y).abs() < 1e-9);
    }
}
