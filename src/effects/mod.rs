//! Proximity-driven activation of expensive per-building cosmetics.
//!
//! Activation runs at a fixed cadence (faster in flight mode) around the camera, or around a
//! point extrapolated along the smoothed camera velocity while flying. A building newly enters
//! the active set inside `near_radius` and only leaves it beyond `far_radius`. The set is capped
//! at `max_active` closest buildings; focused buildings are always kept on top of the cap.

mod loadout;

pub use loadout::*;

use bevy_ecs::prelude::Resource;
use glam::Vec2;
use serde::Deserialize;

use crate::building::{BuildingList, FocusIndices};
use crate::spatial::SpatialGrid;

#[derive(Debug, Clone, Copy, PartialEq, Deserialize)]
pub struct EffectsConfig {
    #[serde(default = "EffectsConfig::default_near_radius")]
    pub near_radius: f32,
    #[serde(default = "EffectsConfig::default_far_radius")]
    pub far_radius: f32,
    #[serde(default = "EffectsConfig::default_max_active")]
    pub max_active: usize,
    #[serde(default = "EffectsConfig::default_interval")]
    pub interval: f32,
    #[serde(default = "EffectsConfig::default_flight_interval")]
    pub flight_interval: f32,
    /// Seconds of camera travel to predict while in flight mode.
    #[serde(default = "EffectsConfig::default_look_ahead")]
    pub look_ahead: f32,
    /// Weight of the newest velocity sample in the moving average.
    #[serde(default = "EffectsConfig::default_velocity_smoothing")]
    pub velocity_smoothing: f32,
    #[serde(default = "EffectsConfig::default_grid_cell")]
    pub grid_cell: f32,
}

impl EffectsConfig {
    const fn default_near_radius() -> f32 {
        400.0
    }

    const fn default_far_radius() -> f32 {
        480.0
    }

    const fn default_max_active() -> usize {
        24
    }

    const fn default_interval() -> f32 {
        0.5
    }

    const fn default_flight_interval() -> f32 {
        0.15
    }

    const fn default_look_ahead() -> f32 {
        1.2
    }

    const fn default_velocity_smoothing() -> f32 {
        0.3
    }

    const fn default_grid_cell() -> f32 {
        200.0
    }
}

impl Default for EffectsConfig {
    fn default() -> Self {
        Self {
            near_radius: Self::default_near_radius(),
            far_radius: Self::default_far_radius(),
            max_active: Self::default_max_active(),
            interval: Self::default_interval(),
            flight_interval: Self::default_flight_interval(),
            look_ahead: Self::default_look_ahead(),
            velocity_smoothing: Self::default_velocity_smoothing(),
            grid_cell: Self::default_grid_cell(),
        }
    }
}

#[derive(Debug, Clone, Copy)]
pub struct EffectsInput<'a> {
    pub now: f32,
    pub camera: Vec2,
    pub flight: bool,
    pub focus: &'a FocusIndices,
    pub list: &'a BuildingList,
    pub grid: &'a SpatialGrid,
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct EffectsChange {
    pub activated: Vec<usize>,
    pub deactivated: Vec<usize>,
}

impl EffectsChange {
    pub fn is_empty(&self) -> bool {
        self.activated.is_empty() && self.deactivated.is_empty()
    }
}

#[derive(Resource, Debug, Default)]
pub struct EffectsActivation {
    config: EffectsConfig,
    active: Vec<usize>,
    generation: u64,
    last_run: Option<f32>,
    last_sample: Option<(f32, Vec2)>,
    velocity: Vec2,
    candidates: Vec<usize>,
    ranked: Vec<(usize, f32)>,
    next: Vec<usize>,
}

impl EffectsActivation {
    pub fn new(config: EffectsConfig) -> Self {
        Self { config, ..Self::default() }
    }

    pub fn config(&self) -> EffectsConfig {
        self.config
    }

    /// Active indices, ascending.
    pub fn active(&self) -> &[usize] {
        &self.active
    }

    pub fn is_active(&self, index: usize) -> bool {
        self.active.binary_search(&index).is_ok()
    }

    pub fn velocity(&self) -> Vec2 {
        self.velocity
    }

    /// Adopts `list` and forgets the active set, returning the indices that were active.
    pub fn reset(&mut self, list: &BuildingList) -> Vec<usize> {
        self.generation = list.generation();
        self.last_run = None;
        std::mem::take(&mut self.active)
    }

    /// Feeds the camera position into the smoothed velocity estimate. Call once per frame.
    pub fn observe_camera(&mut self, now: f32, camera: Vec2) {
        if let Some((then, previous)) = self.last_sample {
            let dt = now - then;
            if dt > f32::EPSILON {
                let instant = (camera - previous) / dt;
                let alpha = self.config.velocity_smoothing.clamp(0.0, 1.0);
                self.velocity = self.velocity * (1.0 - alpha) + instant * alpha;
            }
        }
        self.last_sample = Some((now, camera));
    }

    /// Point the activation radius is centred on.
    pub fn query_point(&self, camera: Vec2, flight: bool) -> Vec2 {
        if flight {
            camera + self.velocity * self.config.look_ahead
        } else {
            camera
        }
    }

    fn interval(&self, flight: bool) -> f32 {
        if flight {
            self.config.flight_interval
        } else {
            self.config.interval
        }
    }

    /// Runs one activation cycle if due. Returns the diff only when the set changed.
    pub fn update(&mut self, input: EffectsInput<'_>) -> Option<EffectsChange> {
        let EffectsInput { now, camera, flight, focus, list, grid } = input;
        let mut change = EffectsChange::default();
        if list.generation() != self.generation {
            change.deactivated = self.reset(list);
        }
        let due = self.last_run.map_or(true, |last| now - last >= self.interval(flight));
        if !due {
            return None;
        }
        self.last_run = Some(now);

        let query = self.query_point(camera, flight);
        let near = self.config.near_radius;
        let far = self.config.far_radius.max(near);
        self.candidates.clear();
        grid.query_radius(query, far, &mut self.candidates);

        self.ranked.clear();
        for &index in &self.candidates {
            if focus.contains(index) {
                continue;
            }
            let Some(building) = list.get(index) else {
                continue;
            };
            if !building.has_effects() {
                continue;
            }
            let distance = building.planar().distance(query);
            let was_active = self.active.binary_search(&index).is_ok();
            if distance <= near || (was_active && distance <= far) {
                self.ranked.push((index, distance));
            }
        }
        if self.ranked.len() > self.config.max_active {
            self.ranked.sort_unstable_by(|a, b| a.1.total_cmp(&b.1).then(a.0.cmp(&b.0)));
            self.ranked.truncate(self.config.max_active);
        }

        self.next.clear();
        self.next.extend(self.ranked.iter().map(|(index, _)| *index));
        self.next.extend(focus.iter().filter(|&i| i < list.len()));
        self.next.sort_unstable();
        self.next.dedup();

        if self.next == self.active {
            return (!change.is_empty()).then_some(change);
        }
        for &index in &self.active {
            if self.next.binary_search(&index).is_err() {
                change.deactivated.push(index);
            }
        }
        for &index in &self.next {
            if self.active.binary_search(&index).is_err() {
                change.activated.push(index);
            }
        }
        std::mem::swap(&mut self.active, &mut self.next);
        tracing::debug!(
            active = self.active.len(),
            activated = change.activated.len(),
            deactivated = change.deactivated.len(),
            "effects set changed"
        );
        Some(change)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::building::Building;
    use glam::Vec3;

    fn effect_building(id: &str, x: f32) -> Building {
        let mut building = Building::new(id, x, 0.0, Vec3::splat(10.0));
        building.cosmetics.claimed = true;
        building
    }

    fn grid_for(list: &BuildingList) -> SpatialGrid {
        let mut grid = SpatialGrid::new(EffectsConfig::default().grid_cell);
        grid.rebuild(list.as_slice());
        grid
    }

    #[test]
    fn buildings_without_cosmetics_never_activate() {
        let list = BuildingList::new(vec![Building::new("plain", 10.0, 0.0, Vec3::splat(10.0))]);
        let grid = grid_for(&list);
        let mut effects = EffectsActivation::new(EffectsConfig::default());
        let focus = FocusIndices::default();
        let input = EffectsInput { now: 0.0, camera: Vec2::ZERO, flight: false, focus: &focus, list: &list, grid: &grid };
        assert!(effects.update(input).is_none());
        assert!(effects.active().is_empty());
    }

    #[test]
    fn unchanged_set_reports_nothing() {
        let list = BuildingList::new(vec![effect_building("a", 10.0)]);
        let grid = grid_for(&list);
        let mut effects = EffectsActivation::new(EffectsConfig { interval: 0.0, ..EffectsConfig::default() });
        let focus = FocusIndices::default();
        let input = |now| EffectsInput { now, camera: Vec2::ZERO, flight: false, focus: &focus, list: &list, grid: &grid };
        let change = effects.update(input(0.0)).expect("first activation");
        assert_eq!(change.activated, vec![0]);
        assert!(effects.update(input(1.0)).is_none());
    }

    #[test]
    fn flight_mode_looks_ahead_along_velocity() {
        let list = BuildingList::new(vec![effect_building("ahead", 1_000.0)]);
        let grid = grid_for(&list);
        let mut effects = EffectsActivation::new(EffectsConfig {
            velocity_smoothing: 1.0,
            look_ahead: 1.0,
            ..EffectsConfig::default()
        });
        effects.observe_camera(0.0, Vec2::ZERO);
        effects.observe_camera(1.0, Vec2::new(500.0, 0.0));
        assert_eq!(effects.velocity(), Vec2::new(500.0, 0.0));
        let focus = FocusIndices::default();
        let camera = Vec2::new(500.0, 0.0);
        let grounded = EffectsInput { now: 1.0, camera, flight: false, focus: &focus, list: &list, grid: &grid };
        assert!(effects.update(grounded).is_none());
        let flying = EffectsInput { now: 1.2, camera, flight: true, focus: &focus, list: &list, grid: &grid };
        assert_eq!(effects.update(flying).map(|c| c.activated), Some(vec![0]));
    }

    #[test]
    fn list_replacement_deactivates_old_indices() {
        let list = BuildingList::new(vec![effect_building("a", 10.0)]);
        let grid = grid_for(&list);
        let mut effects = EffectsActivation::new(EffectsConfig::default());
        let focus = FocusIndices::default();
        effects.update(EffectsInput { now: 0.0, camera: Vec2::ZERO, flight: false, focus: &focus, list: &list, grid: &grid });
        let empty = BuildingList::default();
        let empty_grid = grid_for(&empty);
        let change = effects
            .update(EffectsInput { now: 0.01, camera: Vec2::ZERO, flight: false, focus: &focus, list: &empty, grid: &empty_grid })
            .expect("change");
        assert_eq!(change.deactivated, vec![0]);
        assert!(effects.active().is_empty());
    }
}
