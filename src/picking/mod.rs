mod arbiter;
mod pointer;

pub use arbiter::*;
pub use pointer::*;

use glam::{Vec2, Vec3};

use crate::instancing::InstancedBuildings;
use crate::spatial::SpatialGrid;

const MAX_GRID_STEPS: usize = 4096;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Ray {
    pub origin: Vec3,
    pub dir: Vec3,
}

impl Ray {
    pub fn new(origin: Vec3, dir: Vec3) -> Option<Self> {
        if !origin.is_finite() || !dir.is_finite() || dir.length_squared() <= f32::EPSILON {
            return None;
        }
        Some(Self { origin, dir: dir.normalize() })
    }

    pub fn at(&self, t: f32) -> Vec3 {
        self.origin + self.dir * t
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Aabb {
    pub min: Vec3,
    pub max: Vec3,
}

impl Aabb {
    pub fn is_degenerate(&self) -> bool {
        self.max.y <= self.min.y || self.max.x <= self.min.x || self.max.z <= self.min.z
    }

    pub fn intersect(&self, ray: &Ray) -> Option<f32> {
        ray_aabb_intersection(ray.origin, ray.dir, self.min, self.max).map(|(t, _)| t)
    }
}

pub fn ray_aabb_intersection(origin: Vec3, dir: Vec3, min: Vec3, max: Vec3) -> Option<(f32, Vec3)> {
    let (t_enter, t_exit) = ray_aabb_span(origin, dir, min, max)?;
    let t_hit = if t_enter >= 0.0 { t_enter } else { t_exit };
    Some((t_hit, origin + dir * t_hit))
}

/// Parametric entry/exit of a ray through a box, clamped to `t >= 0`.
fn ray_aabb_span(origin: Vec3, dir: Vec3, min: Vec3, max: Vec3) -> Option<(f32, f32)> {
    let mut t_min: f32 = 0.0;
    let mut t_max: f32 = f32::INFINITY;
    let origin_arr = origin.to_array();
    let dir_arr = dir.to_array();
    let min_arr = min.to_array();
    let max_arr = max.to_array();
    for i in 0..3 {
        let o = origin_arr[i];
        let d = dir_arr[i];
        if d.abs() < 1e-6 {
            if o < min_arr[i] || o > max_arr[i] {
                return None;
            }
        } else {
            let inv_d = 1.0 / d;
            let mut t1 = (min_arr[i] - o) * inv_d;
            let mut t2 = (max_arr[i] - o) * inv_d;
            if t1 > t2 {
                std::mem::swap(&mut t1, &mut t2);
            }
            t_min = t_min.max(t1);
            t_max = t_max.min(t2);
            if t_min > t_max {
                return None;
            }
        }
    }
    if t_max < 0.0 {
        return None;
    }
    Some((t_min, t_max))
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HitSource {
    Instanced,
    Detailed,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PickHit {
    pub index: usize,
    pub distance: f32,
    pub source: HitSource,
}

impl PickHit {
    pub fn nearest(a: Option<PickHit>, b: Option<PickHit>) -> Option<PickHit> {
        match (a, b) {
            (Some(a), Some(b)) => Some(if b.distance < a.distance { b } else { a }),
            (a, b) => a.or(b),
        }
    }
}

/// Something a ray can be cast against to resolve a building.
pub trait PickTarget {
    fn raycast(&self, ray: &Ray) -> Option<PickHit>;
}

/// Casts against the far (instanced) buildings by walking grid cells under the ray.
///
/// The ray is first clipped to the instanced bounds, then the planar projection is walked cell
/// by cell. Each visited cell scans the ring of neighbours that may hold a building overlapping
/// it. The walk stops as soon as the next cell starts beyond the best hit.
pub fn raycast_instanced(ray: &Ray, instanced: &InstancedBuildings, grid: &SpatialGrid) -> Option<PickHit> {
    let bounds = instanced.bounds()?;
    let (t_enter, t_exit) = ray_aabb_span(ray.origin, ray.dir, bounds.min, bounds.max)?;
    let cell = grid.cell_size();
    let ring = (grid.max_half_extent() / cell).ceil() as i32;
    let start = ray.at(t_enter);
    let (mut kx, mut kz) = grid.key(Vec2::new(start.x, start.z));

    let axis = |origin: f32, dir: f32, k: i32| -> (i32, f32, f32) {
        if dir.abs() < 1e-9 {
            return (0, f32::INFINITY, f32::INFINITY);
        }
        let step = if dir > 0.0 { 1 } else { -1 };
        let boundary = (k + i32::from(dir > 0.0)) as f32 * cell;
        (step, (boundary - origin) / dir, cell / dir.abs())
    };
    let (step_x, mut next_x, delta_x) = axis(ray.origin.x, ray.dir.x, kx);
    let (step_z, mut next_z, delta_z) = axis(ray.origin.z, ray.dir.z, kz);

    let mut best: Option<PickHit> = None;
    let mut cell_enter = t_enter;
    // The walk is monotone per axis, so after a step only the leading strip of the
    // neighbourhood is unseen.
    let mut moved: Option<(i32, i32)> = None;
    for _ in 0..MAX_GRID_STEPS {
        if cell_enter > t_exit || best.is_some_and(|hit| cell_enter > hit.distance) {
            break;
        }
        match moved {
            None => {
                for dz in -ring..=ring {
                    for dx in -ring..=ring {
                        scan_cell(ray, instanced, grid, (kx + dx, kz + dz), &mut best);
                    }
                }
            }
            Some((sx, 0)) => {
                for dz in -ring..=ring {
                    scan_cell(ray, instanced, grid, (kx + sx * ring, kz + dz), &mut best);
                }
            }
            Some((_, sz)) => {
                for dx in -ring..=ring {
                    scan_cell(ray, instanced, grid, (kx + dx, kz + sz * ring), &mut best);
                }
            }
        }
        if next_x < next_z {
            kx += step_x;
            moved = Some((step_x, 0));
            cell_enter = next_x;
            next_x += delta_x;
        } else if next_z.is_finite() {
            kz += step_z;
            moved = Some((0, step_z));
            cell_enter = next_z;
            next_z += delta_z;
        } else {
            break;
        }
    }
    best
}

fn scan_cell(ray: &Ray, instanced: &InstancedBuildings, grid: &SpatialGrid, key: (i32, i32), best: &mut Option<PickHit>) {
    for &index in grid.cell(key) {
        let Some(instance) = instanced.get(index as usize) else {
            continue;
        };
        if !instance.far_visible() {
            continue;
        }
        let aabb = instance.aabb();
        if aabb.is_degenerate() {
            continue;
        }
        if let Some(t) = aabb.intersect(ray) {
            if best.map_or(true, |hit| t < hit.distance) {
                *best = Some(PickHit { index: index as usize, distance: t, source: HitSource::Instanced });
            }
        }
    }
}

/// Casts against individually rendered near buildings.
pub fn raycast_detailed(ray: &Ray, instanced: &InstancedBuildings, near: &[usize]) -> Option<PickHit> {
    let mut best: Option<PickHit> = None;
    for &index in near {
        let Some(instance) = instanced.get(index) else {
            continue;
        };
        let aabb = instance.aabb();
        if aabb.is_degenerate() {
            continue;
        }
        if let Some(t) = aabb.intersect(ray) {
            if best.map_or(true, |hit| t < hit.distance) {
                best = Some(PickHit { index, distance: t, source: HitSource::Detailed });
            }
        }
    }
    best
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::atlas::AtlasLayout;
    use crate::building::{Building, BuildingList};
    use crate::rise::RiseConfig;

    fn scene(buildings: Vec<Building>) -> (BuildingList, InstancedBuildings, SpatialGrid) {
        let list = BuildingList::new(buildings);
        let mut instanced = InstancedBuildings::new(RiseConfig::default());
        // Second initialization skips the wave so every box is at full height.
        let warmup = BuildingList::new(vec![Building::new("warmup", 0.0, 0.0, Vec3::ONE)]);
        instanced.initialize(&warmup, &AtlasLayout::default());
        instanced.initialize(&list, &AtlasLayout::default());
        let mut grid = SpatialGrid::new(50.0);
        grid.rebuild(list.as_slice());
        (list, instanced, grid)
    }

    fn brute_force(ray: &Ray, instanced: &InstancedBuildings) -> Option<(usize, f32)> {
        instanced
            .instances()
            .iter()
            .enumerate()
            .filter_map(|(i, inst)| inst.aabb().intersect(ray).map(|t| (i, t)))
            .min_by(|a, b| a.1.total_cmp(&b.1))
    }

    #[test]
    fn ray_aabb_hits_front_face() {
        let hit = ray_aabb_intersection(Vec3::new(0.0, 0.0, 5.0), Vec3::NEG_Z, Vec3::splat(-1.0), Vec3::ONE);
        let (t, point) = hit.expect("hit");
        assert!((t - 4.0).abs() < 1e-5);
        assert!((point.z - 1.0).abs() < 1e-5);
    }

    #[test]
    fn grid_walk_matches_brute_force_along_a_street() {
        let buildings: Vec<Building> = (0..40)
            .map(|i| {
                let x = (i % 10) as f32 * 30.0;
                let z = (i / 10) as f32 * 30.0;
                Building::new(format!("b{i}"), x, z, Vec3::new(20.0, 10.0 + i as f32, 20.0))
            })
            .collect();
        let (_, instanced, grid) = scene(buildings);
        let rays = [
            Ray::new(Vec3::new(-100.0, 30.0, 5.0), Vec3::new(1.0, -0.05, 0.0)),
            Ray::new(Vec3::new(135.0, 400.0, 45.0), Vec3::new(0.0, -1.0, 0.0)),
            Ray::new(Vec3::new(400.0, 80.0, 200.0), Vec3::new(-1.0, -0.2, -0.6)),
            Ray::new(Vec3::new(-50.0, 5.0, -50.0), Vec3::new(-1.0, 0.0, 0.0)),
        ];
        for ray in rays.iter().flatten() {
            let walked = raycast_instanced(ray, &instanced, &grid).map(|h| (h.index, h.distance));
            let brute = brute_force(ray, &instanced);
            match (walked, brute) {
                (Some(a), Some(b)) => {
                    assert!((a.1 - b.1).abs() < 1e-3, "{ray:?}: walked {a:?} brute {b:?}");
                }
                (a, b) => assert_eq!(a, b, "{ray:?}"),
            }
        }
    }

    #[test]
    fn wide_footprints_spanning_cells_match_brute_force() {
        use rand::rngs::StdRng;
        use rand::{Rng, SeedableRng};

        let mut rng = StdRng::seed_from_u64(17);
        let buildings: Vec<Building> = (0..120)
            .map(|i| {
                let size = Vec3::new(rng.gen_range(5.0..140.0), rng.gen_range(10.0..200.0), rng.gen_range(5.0..140.0));
                Building::new(format!("w{i}"), rng.gen_range(-600.0..600.0), rng.gen_range(-600.0..600.0), size)
            })
            .collect();
        let (_, instanced, grid) = scene(buildings);
        assert!(grid.max_half_extent() > grid.cell_size(), "neighbourhood ring must exceed zero");
        for _ in 0..300 {
            let origin = Vec3::new(rng.gen_range(-900.0..900.0), rng.gen_range(50.0..400.0), rng.gen_range(-900.0..900.0));
            let target = Vec3::new(rng.gen_range(-600.0..600.0), rng.gen_range(0.0..100.0), rng.gen_range(-600.0..600.0));
            let Some(ray) = Ray::new(origin, target - origin) else {
                continue;
            };
            let walked = raycast_instanced(&ray, &instanced, &grid).map(|h| h.distance);
            let brute = brute_force(&ray, &instanced).map(|(_, t)| t);
            match (walked, brute) {
                (Some(a), Some(b)) => assert!((a - b).abs() < 1e-3, "{ray:?}: walked {a} brute {b}"),
                (a, b) => assert_eq!(a.is_some(), b.is_some(), "{ray:?}"),
            }
        }
    }

    #[test]
    fn hidden_far_instances_are_skipped_but_detailed_hits_them() {
        let (_, mut instanced, grid) = scene(vec![Building::new("solo", 0.0, 0.0, Vec3::new(10.0, 50.0, 10.0))]);
        let ray = Ray::new(Vec3::new(0.0, 10.0, 100.0), Vec3::NEG_Z).expect("ray");
        assert_eq!(raycast_instanced(&ray, &instanced, &grid).map(|h| h.index), Some(0));
        instanced.set_far_visible(0, false);
        assert!(raycast_instanced(&ray, &instanced, &grid).is_none());
        let detailed = raycast_detailed(&ray, &instanced, &[0]).expect("detailed hit");
        assert_eq!(detailed.source, HitSource::Detailed);
    }

    #[test]
    fn empty_scene_resolves_to_no_target() {
        let (_, instanced, grid) = scene(Vec::new());
        let ray = Ray::new(Vec3::new(0.0, 10.0, 100.0), Vec3::NEG_Z).expect("ray");
        assert!(raycast_instanced(&ray, &instanced, &grid).is_none());
        assert!(raycast_detailed(&ray, &instanced, &[]).is_none());
    }
}
