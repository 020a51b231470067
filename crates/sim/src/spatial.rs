//! Uniform grid for neighbour lookups.
//!
//! Rebuilt from scratch every tick: the flock moves continuously, so
//! incremental updates would touch almost every entry anyway.

use glam::Vec2;

use crate::boundary::Bounds;

/// Spatial hash over a fixed rectangle. Points outside it land in the
/// nearest border cell.
pub struct SpatialGrid {
    bounds: Bounds,
    cell_size: f32,
    cols: usize,
    rows: usize,
    cells: Vec<Vec<usize>>,
    positions: Vec<Vec2>,
}

impl SpatialGrid {
    /// `cell_size` is normally the perception radius so a query touches at
    /// most a 3x3 block.
    pub fn new(bounds: Bounds, cell_size: f32) -> Self {
        let cell_size = if cell_size.is_finite() && cell_size > 0.0 {
            cell_size
        } else {
            1.0
        };
        let cols = ((bounds.width() / cell_size).ceil() as usize).max(1);
        let rows = ((bounds.depth() / cell_size).ceil() as usize).max(1);
        Self {
            bounds,
            cell_size,
            cols,
            rows,
            cells: vec![Vec::with_capacity(8); cols * rows],
            positions: Vec::new(),
        }
    }

    #[inline]
    fn cell_coords(&self, p: Vec2) -> (usize, usize) {
        let gx = ((p.x - self.bounds.min_x) / self.cell_size).floor();
        let gz = ((p.y - self.bounds.min_z) / self.cell_size).floor();
        // NaN casts to 0, which is as good a cell as any for a point the
        // movement guard is about to reset.
        let gx = (gx.max(0.0) as usize).min(self.cols - 1);
        let gz = (gz.max(0.0) as usize).min(self.rows - 1);
        (gx, gz)
    }

    /// Replace the contents with `(index, position)` pairs.
    pub fn rebuild(&mut self, items: impl IntoIterator<Item = (usize, Vec2)>) {
        for cell in &mut self.cells {
            cell.clear();
        }
        self.positions.clear();

        for (index, position) in items {
            if self.positions.len() <= index {
                self.positions.resize(index + 1, Vec2::splat(f32::NAN));
            }
            self.positions[index] = position;
            let (gx, gz) = self.cell_coords(position);
            self.cells[gz * self.cols + gx].push(index);
        }
    }

    /// Indices within `radius` of `center`, ascending, written into `out`.
    ///
    /// `out` is cleared first. Sorting keeps neighbour order, and with it
    /// floating-point summation order, independent of cell layout.
    pub fn query(&self, center: Vec2, radius: f32, out: &mut Vec<usize>) {
        out.clear();
        if !(radius > 0.0) {
            return;
        }
        let r2 = radius * radius;
        let (min_gx, min_gz) = self.cell_coords(center - Vec2::splat(radius));
        let (max_gx, max_gz) = self.cell_coords(center + Vec2::splat(radius));

        for gz in min_gz..=max_gz {
            let row = gz * self.cols;
            for gx in min_gx..=max_gx {
                for &index in &self.cells[row + gx] {
                    if self.positions[index].distance_squared(center) <= r2 {
                        out.push(index);
                    }
                }
            }
        }
        out.sort_unstable();
    }

    pub fn len(&self) -> usize {
        self.cells.iter().map(Vec::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.cells.iter().all(Vec::is_empty)
    }
}

impl std::fmt::Debug for SpatialGrid {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SpatialGrid")
            .field("bounds", &self.bounds)
            .field("cols", &self.cols)
            .field("rows", &self.rows)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_query_returns_sorted_indices_in_radius() {
        let mut grid = SpatialGrid::new(Bounds::new(-50.0, -50.0, 50.0, 50.0), 6.0);
        grid.rebuild([
            (3, Vec2::new(1.0, 1.0)),
            (0, Vec2::new(-1.0, 0.0)),
            (1, Vec2::new(30.0, 30.0)),
            (2, Vec2::new(5.5, 0.0)),
        ]);
        assert_eq!(grid.len(), 4);

        let mut out = Vec::new();
        grid.query(Vec2::ZERO, 6.0, &mut out);
        assert_eq!(out, vec![0, 2, 3]);
    }

    #[test]
    fn test_points_outside_bounds_are_still_found() {
        let mut grid = SpatialGrid::new(Bounds::new(0.0, 0.0, 10.0, 10.0), 2.0);
        grid.rebuild([(0, Vec2::new(11.0, 5.0)), (1, Vec2::new(9.5, 5.0))]);

        let mut out = Vec::new();
        grid.query(Vec2::new(10.0, 5.0), 1.5, &mut out);
        assert_eq!(out, vec![0, 1]);
    }

    #[test]
    fn test_rebuild_clears_previous_contents() {
        let mut grid = SpatialGrid::new(Bounds::new(0.0, 0.0, 10.0, 10.0), 2.0);
        grid.rebuild([(0, Vec2::new(1.0, 1.0))]);
        grid.rebuild(std::iter::empty());
        assert!(grid.is_empty());
    }
}
