use bevy_ecs::prelude::Resource;
use glam::Vec2;
use std::collections::HashMap;

use crate::building::Building;

pub type CellKey = (i32, i32);

#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct GridMetrics {
    pub occupied_cells: usize,
    pub average_occupancy: f32,
    pub max_occupancy: usize,
}

/// Uniform planar grid bucketing building indices by the cell their centre falls in.
#[derive(Resource, Debug, Clone)]
pub struct SpatialGrid {
    cell: f32,
    cells: HashMap<CellKey, Vec<u32>>,
    len: usize,
    max_half_extent: f32,
}

impl SpatialGrid {
    pub fn new(cell: f32) -> Self {
        Self { cell: cell.max(1.0), cells: HashMap::new(), len: 0, max_half_extent: 0.0 }
    }

    pub fn cell_size(&self) -> f32 {
        self.cell
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Largest half footprint (x or z) of any indexed building.
    pub fn max_half_extent(&self) -> f32 {
        self.max_half_extent
    }

    pub fn clear(&mut self) {
        self.cells.clear();
        self.len = 0;
        self.max_half_extent = 0.0;
    }

    pub fn key(&self, p: Vec2) -> CellKey {
        ((p.x / self.cell).floor() as i32, (p.y / self.cell).floor() as i32)
    }

    pub fn rebuild(&mut self, buildings: &[Building]) {
        self.clear();
        for (index, building) in buildings.iter().enumerate() {
            let key = self.key(building.planar());
            self.cells.entry(key).or_default().push(index as u32);
            let half = building.half_footprint();
            self.max_half_extent = self.max_half_extent.max(half.x).max(half.y);
        }
        self.len = buildings.len();
    }

    pub fn cell(&self, key: CellKey) -> &[u32] {
        self.cells.get(&key).map(Vec::as_slice).unwrap_or(&[])
    }

    /// Appends every index in cells overlapping the square around `center`.
    ///
    /// The result is a superset of the indices within `radius`; callers filter exact distance.
    pub fn query_radius(&self, center: Vec2, radius: f32, out: &mut Vec<usize>) {
        if self.cells.is_empty() || !radius.is_finite() || radius < 0.0 {
            return;
        }
        let (kx0, ky0) = self.key(center - Vec2::splat(radius));
        let (kx1, ky1) = self.key(center + Vec2::splat(radius));
        let span = (kx1 - kx0 + 1) as i64 * (ky1 - ky0 + 1) as i64;
        if span > self.cells.len() as i64 {
            // Sparse walk is cheaper once the square covers more cells than are occupied.
            for (&(kx, ky), list) in self.cells.iter() {
                if kx >= kx0 && kx <= kx1 && ky >= ky0 && ky <= ky1 {
                    out.extend(list.iter().map(|&i| i as usize));
                }
            }
            return;
        }
        for ky in ky0..=ky1 {
            for kx in kx0..=kx1 {
                if let Some(list) = self.cells.get(&(kx, ky)) {
                    out.extend(list.iter().map(|&i| i as usize));
                }
            }
        }
    }

    pub fn metrics(&self) -> GridMetrics {
        let occupied_cells = self.cells.len();
        let max_occupancy = self.cells.values().map(Vec::len).max().unwrap_or(0);
        let average_occupancy =
            if occupied_cells == 0 { 0.0 } else { self.len as f32 / occupied_cells as f32 };
        GridMetrics { occupied_cells, average_occupancy, max_occupancy }
    }
}

impl Default for SpatialGrid {
    fn default() -> Self {
        Self::new(200.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use glam::Vec3;

    fn at(x: f32, z: f32) -> Building {
        Building::new(format!("b{x}_{z}"), x, z, Vec3::new(10.0, 20.0, 30.0))
    }

    #[test]
    fn negative_coordinates_floor_into_their_own_cells() {
        let grid = SpatialGrid::new(100.0);
        assert_eq!(grid.key(Vec2::new(-0.5, 0.5)), (-1, 0));
        assert_eq!(grid.key(Vec2::new(99.9, -100.0)), (0, -1));
    }

    #[test]
    fn query_returns_nearby_and_skips_distant() {
        let mut grid = SpatialGrid::new(100.0);
        grid.rebuild(&[at(10.0, 10.0), at(150.0, 20.0), at(900.0, 900.0)]);
        let mut out = Vec::new();
        grid.query_radius(Vec2::new(0.0, 0.0), 120.0, &mut out);
        out.sort_unstable();
        assert_eq!(out, vec![0, 1]);
        assert_eq!(grid.max_half_extent(), 15.0);
    }

    #[test]
    fn metrics_and_clear() {
        let mut grid = SpatialGrid::new(50.0);
        grid.rebuild(&[at(1.0, 1.0), at(2.0, 2.0), at(80.0, 1.0)]);
        let metrics = grid.metrics();
        assert_eq!(metrics.occupied_cells, 2);
        assert_eq!(metrics.max_occupancy, 2);
        assert!((metrics.average_occupancy - 1.5).abs() < 1e-6);
        grid.rebuild(&[]);
        assert!(grid.is_empty());
        let mut out = Vec::new();
        grid.query_radius(Vec2::ZERO, 1_000.0, &mut out);
        assert!(out.is_empty());
    }
}
