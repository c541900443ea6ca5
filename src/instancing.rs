//! CPU mirror of the instanced building draw.
//!
//! `InstancedBuildings` owns the per-instance attribute array that the GPU pass uploads. It is
//! populated once per building list, after which only the rise progress (while the grow-in wave
//! runs) and the far-visibility flag (when the LOD classifier moves a building) change. Writes
//! accumulate into a single dirty range so each frame uploads at most one contiguous slice.

use bevy_ecs::prelude::Resource;
use glam::Vec3;
use std::ops::Range;

use crate::atlas::AtlasLayout;
use crate::building::{BuildingList, FocusIndices};
use crate::picking::Aabb;
use crate::rise::{RiseConfig, RiseScheduler};

/// Value written to the focus uniform when a slot is empty.
pub const NO_FOCUS: i32 = -1;

#[repr(C)]
#[derive(Clone, Copy, Debug, Default, PartialEq, bytemuck::Pod, bytemuck::Zeroable)]
pub struct BuildingInstance {
    /// x, z, rise progress, far visibility (1 drawn by the instanced pass, 0 hidden).
    pub placement: [f32; 4],
    /// width, height, depth.
    pub size: [f32; 3],
    /// Building index in the list; compared against the focus uniform in the shader.
    pub index: u32,
    pub uv_front: [f32; 4],
    pub uv_side: [f32; 4],
    /// rgb + 1.0 when the building carries a custom colour.
    pub tint: [f32; 4],
}

impl BuildingInstance {
    pub fn rise(&self) -> f32 {
        self.placement[2]
    }

    pub fn far_visible(&self) -> bool {
        self.placement[3] > 0.5
    }

    /// World-space box at the current rise progress.
    pub fn aabb(&self) -> Aabb {
        let half_w = self.size[0] * 0.5;
        let half_d = self.size[2] * 0.5;
        let height = self.size[1] * self.rise();
        Aabb {
            min: Vec3::new(self.placement[0] - half_w, 0.0, self.placement[1] - half_d),
            max: Vec3::new(self.placement[0] + half_w, height, self.placement[1] + half_d),
        }
    }
}

#[repr(C)]
#[derive(Clone, Copy, Debug, PartialEq, Eq, bytemuck::Pod, bytemuck::Zeroable)]
pub struct FocusUniform {
    pub primary: i32,
    pub secondary: i32,
}

impl Default for FocusUniform {
    fn default() -> Self {
        Self { primary: NO_FOCUS, secondary: NO_FOCUS }
    }
}

impl FocusUniform {
    pub fn from_indices(focus: &FocusIndices) -> Self {
        let slot = |index: Option<usize>| index.map(|i| i as i32).unwrap_or(NO_FOCUS);
        Self { primary: slot(focus.primary), secondary: slot(focus.secondary) }
    }

    pub fn is_active(&self) -> bool {
        self.primary != NO_FOCUS || self.secondary != NO_FOCUS
    }

    pub fn is_dimmed(&self, index: u32) -> bool {
        self.is_active() && self.primary != index as i32 && self.secondary != index as i32
    }
}

#[derive(Resource)]
pub struct InstancedBuildings {
    instances: Vec<BuildingInstance>,
    bounds: Option<Aabb>,
    focus: FocusUniform,
    focus_dirty: bool,
    dirty: Option<Range<usize>>,
    far_visible: usize,
    generation: u64,
    has_animated: bool,
    rise: RiseScheduler,
}

impl Default for InstancedBuildings {
    fn default() -> Self {
        Self::new(RiseConfig::default())
    }
}

impl InstancedBuildings {
    pub fn new(rise: RiseConfig) -> Self {
        Self {
            instances: Vec::new(),
            bounds: None,
            focus: FocusUniform::default(),
            focus_dirty: true,
            dirty: None,
            far_visible: 0,
            generation: 0,
            has_animated: false,
            rise: RiseScheduler::new(rise),
        }
    }

    /// Rebuilds every per-instance attribute for `list`.
    ///
    /// The first non-empty initialization schedules the grow-in wave; any later one (reload,
    /// pagination) jumps every instance straight to full height.
    pub fn initialize(&mut self, list: &BuildingList, layout: &AtlasLayout) {
        let animate = !self.has_animated && !list.is_empty();
        let start_rise = if animate { 0.0 } else { 1.0 };
        self.instances.clear();
        self.instances.reserve(list.len());
        for (index, building) in list.iter().enumerate() {
            let (front, side) = layout.building_uvs(building);
            let tint = match building.custom_color {
                Some([r, g, b]) => [r, g, b, 1.0],
                None => [0.0, 0.0, 0.0, 0.0],
            };
            self.instances.push(BuildingInstance {
                placement: [building.x, building.z, start_rise, 1.0],
                size: [building.width, building.height, building.depth],
                index: index as u32,
                uv_front: front.to_array(),
                uv_side: side.to_array(),
                tint,
            });
        }
        self.bounds = conservative_bounds(&self.instances);
        self.far_visible = self.instances.len();
        self.generation = list.generation();
        self.dirty = (!self.instances.is_empty()).then(|| 0..self.instances.len());
        if animate {
            self.rise.schedule_wave(self.instances.len());
            self.has_animated = true;
        } else {
            self.rise.clear();
        }
        tracing::info!(
            count = self.instances.len(),
            generation = self.generation,
            animate,
            "initialized building instances"
        );
    }

    pub fn len(&self) -> usize {
        self.instances.len()
    }

    pub fn is_empty(&self) -> bool {
        self.instances.is_empty()
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn instances(&self) -> &[BuildingInstance] {
        &self.instances
    }

    pub fn get(&self, index: usize) -> Option<&BuildingInstance> {
        self.instances.get(index)
    }

    /// Box enclosing every instance at full height.
    pub fn bounds(&self) -> Option<Aabb> {
        self.bounds
    }

    /// Instanced draws issued this frame: one for a populated list, none for an empty one.
    pub fn draw_calls(&self) -> u32 {
        u32::from(!self.instances.is_empty())
    }

    pub fn focus(&self) -> FocusUniform {
        self.focus
    }

    pub fn set_focus(&mut self, focus: &FocusIndices) -> bool {
        let next = FocusUniform::from_indices(focus);
        if next == self.focus {
            return false;
        }
        self.focus = next;
        self.focus_dirty = true;
        true
    }

    pub fn take_focus_dirty(&mut self) -> Option<FocusUniform> {
        std::mem::take(&mut self.focus_dirty).then_some(self.focus)
    }

    pub fn set_far_visible(&mut self, index: usize, visible: bool) {
        let Some(instance) = self.instances.get_mut(index) else {
            return;
        };
        let flag = if visible { 1.0 } else { 0.0 };
        if instance.placement[3] != flag {
            instance.placement[3] = flag;
            if visible {
                self.far_visible += 1;
            } else {
                self.far_visible -= 1;
            }
            self.mark_dirty(index);
        }
    }

    pub fn far_count(&self) -> usize {
        self.far_visible
    }

    pub fn is_animating(&self) -> bool {
        self.rise.is_animating()
    }

    pub fn animating_count(&self) -> usize {
        self.rise.in_flight()
    }

    /// Advances the grow-in wave. Only in-flight instances are written.
    pub fn tick(&mut self, dt: f32, hold: bool) -> bool {
        let instances = &mut self.instances;
        let mut lo = usize::MAX;
        let mut hi = 0usize;
        let changed = self.rise.advance(dt, hold, |index, progress| {
            if let Some(instance) = instances.get_mut(index) {
                instance.placement[2] = progress;
                lo = lo.min(index);
                hi = hi.max(index + 1);
            }
        });
        if changed && lo < hi {
            self.mark_dirty_range(lo..hi);
        }
        changed
    }

    pub fn dirty_range(&self) -> Option<Range<usize>> {
        self.dirty.clone()
    }

    pub fn take_dirty(&mut self) -> Option<Range<usize>> {
        self.dirty.take()
    }

    /// Forces the next upload to cover the whole array, e.g. after a device reset.
    pub fn mark_all_dirty(&mut self) {
        self.dirty = (!self.instances.is_empty()).then(|| 0..self.instances.len());
        self.focus_dirty = true;
    }

    fn mark_dirty(&mut self, index: usize) {
        self.mark_dirty_range(index..index + 1);
    }

    fn mark_dirty_range(&mut self, range: Range<usize>) {
        self.dirty = Some(match self.dirty.take() {
            Some(existing) => existing.start.min(range.start)..existing.end.max(range.end),
            None => range,
        });
    }
}

fn conservative_bounds(instances: &[BuildingInstance]) -> Option<Aabb> {
    let mut iter = instances.iter();
    let first = iter.next()?;
    let mut bounds = full_height_box(first);
    for instance in iter {
        let b = full_height_box(instance);
        bounds.min = bounds.min.min(b.min);
        bounds.max = bounds.max.max(b.max);
    }
    Some(bounds)
}

fn full_height_box(instance: &BuildingInstance) -> Aabb {
    let mut aabb = instance.aabb();
    aabb.max.y = instance.size[1];
    aabb
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::building::Building;

    fn list(n: usize) -> BuildingList {
        BuildingList::new(
            (0..n)
                .map(|i| Building::new(format!("b{i}"), i as f32 * 20.0, 0.0, Vec3::new(10.0, 30.0 + i as f32, 8.0)))
                .collect(),
        )
    }

    fn rise_config() -> RiseConfig {
        RiseConfig { duration: 1.0, stagger: 0.01, max_stagger: 1.0 }
    }

    #[test]
    fn instance_layout_is_tightly_packed() {
        assert_eq!(std::mem::size_of::<BuildingInstance>(), 80);
        assert_eq!(std::mem::size_of::<FocusUniform>(), 8);
    }

    #[test]
    fn first_initialization_animates_and_reload_jumps_to_full_height() {
        let mut instanced = InstancedBuildings::new(rise_config());
        instanced.initialize(&list(4), &AtlasLayout::default());
        assert!(instanced.is_animating());
        assert!(instanced.instances().iter().all(|i| i.rise() == 0.0));

        instanced.initialize(&list(4), &AtlasLayout::default());
        assert!(!instanced.is_animating());
        assert!(instanced.instances().iter().all(|i| i.rise() == 1.0));
    }

    #[test]
    fn empty_first_list_does_not_consume_the_wave() {
        let mut instanced = InstancedBuildings::new(rise_config());
        instanced.initialize(&BuildingList::default(), &AtlasLayout::default());
        assert_eq!(instanced.draw_calls(), 0);
        assert!(instanced.bounds().is_none());
        assert!(instanced.take_dirty().is_none());
        instanced.initialize(&list(2), &AtlasLayout::default());
        assert!(instanced.is_animating());
        assert_eq!(instanced.draw_calls(), 1);
    }

    #[test]
    fn bounds_enclose_every_instance_at_full_height() {
        let mut instanced = InstancedBuildings::new(rise_config());
        instanced.initialize(&list(3), &AtlasLayout::default());
        let bounds = instanced.bounds().expect("bounds");
        assert_eq!(bounds.min, Vec3::new(-5.0, 0.0, -4.0));
        assert_eq!(bounds.max, Vec3::new(45.0, 32.0, 4.0));
    }

    #[test]
    fn tick_marks_only_in_flight_range_dirty() {
        let mut instanced = InstancedBuildings::new(RiseConfig { duration: 1.0, stagger: 0.5, max_stagger: 10.0 });
        instanced.initialize(&list(4), &AtlasLayout::default());
        instanced.take_dirty();
        assert!(instanced.tick(0.25, false));
        assert_eq!(instanced.take_dirty(), Some(0..1));
        assert!(!instanced.tick(0.25, true));
        assert!(instanced.take_dirty().is_none());
    }

    #[test]
    fn focus_changes_are_reported_once() {
        let mut instanced = InstancedBuildings::default();
        instanced.take_focus_dirty();
        let focus = FocusIndices { primary: Some(2), secondary: None };
        assert!(instanced.set_focus(&focus));
        assert!(!instanced.set_focus(&focus));
        assert_eq!(instanced.take_focus_dirty(), Some(FocusUniform { primary: 2, secondary: NO_FOCUS }));
        assert!(instanced.take_focus_dirty().is_none());
        assert!(instanced.focus().is_dimmed(5));
        assert!(!instanced.focus().is_dimmed(2));
    }

    #[test]
    fn far_visibility_toggle_tracks_dirty_span() {
        let mut instanced = InstancedBuildings::new(rise_config());
        instanced.initialize(&list(6), &AtlasLayout::default());
        instanced.take_dirty();
        instanced.set_far_visible(1, false);
        instanced.set_far_visible(4, false);
        instanced.set_far_visible(4, false);
        assert_eq!(instanced.take_dirty(), Some(1..5));
        assert_eq!(instanced.far_count(), 4);
    }

    #[test]
    fn far_count_follows_toggles_and_resets_on_initialize() {
        let mut instanced = InstancedBuildings::new(rise_config());
        instanced.initialize(&list(5), &AtlasLayout::default());
        assert_eq!(instanced.far_count(), 5);
        instanced.set_far_visible(0, false);
        instanced.set_far_visible(3, false);
        instanced.set_far_visible(3, true);
        instanced.set_far_visible(9, false);
        let scanned = instanced.instances().iter().filter(|i| i.far_visible()).count();
        assert_eq!(instanced.far_count(), scanned);
        assert_eq!(scanned, 4);
        instanced.initialize(&list(3), &AtlasLayout::default());
        assert_eq!(instanced.far_count(), 3);
    }

    #[test]
    fn unusable_atlas_layouts_initialize_flat() {
        for layout in [
            AtlasLayout { size: 64, bands: 64, cell: 4 },
            AtlasLayout { size: 64, bands: 6, cell: 0 },
            AtlasLayout { size: 2, bands: 1, cell: 4 },
        ] {
            let mut instanced = InstancedBuildings::new(rise_config());
            instanced.initialize(&list(3), &layout);
            assert_eq!(instanced.len(), 3);
            assert!(instanced.instances().iter().all(|i| i.uv_front[2] == 0.0 && i.uv_side[3] == 0.0));
        }
    }
}
