//! Frame-driven orchestration of the building core.
//!
//! `CityWorld` owns every derived structure (spatial grid, instance mirror, LOD partition,
//! effects set) as bevy_ecs resources and runs the per-frame systems on one thread. Cadenced
//! work compares the frame clock against a last-run stamp; nothing spawns timers. A list
//! replacement rebuilds all derived state synchronously before the next frame can observe it.

use bevy_ecs::prelude::{Res, ResMut, Resource, Schedule, World};
use bevy_ecs::schedule::{ExecutorKind, IntoSystemConfigs};
use glam::Vec2;
use winit::dpi::PhysicalSize;

use crate::atlas::AtlasLayout;
use crate::building::{Building, BuildingList, BuildingRef, FocusIndices};
use crate::camera3d::Camera3D;
use crate::config::AppConfig;
use crate::effects::{dispatch_change, EffectSink, EffectsActivation, EffectsChange, EffectsConfig, EffectsInput};
use crate::events::{CityEvent, EventBus};
use crate::instancing::InstancedBuildings;
use crate::lod::{DetailedBuildings, LodClassifier, LodConfig, LodLevel, LodTransition};
use crate::picking::{
    raycast_detailed, raycast_instanced, ForegroundClaim, ForegroundPicker, InputArbiter, PickHit, PickTarget,
    PickingConfig, PointerId, PointerPicker, PointerSample, Ray,
};
use crate::rise::RiseConfig;
use crate::spatial::SpatialGrid;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CitySettings {
    pub atlas: AtlasLayout,
    pub lod: LodConfig,
    pub effects: EffectsConfig,
    pub picking: PickingConfig,
    pub rise: RiseConfig,
}

impl Default for CitySettings {
    fn default() -> Self {
        Self {
            atlas: AtlasLayout::default(),
            lod: LodConfig::default(),
            effects: EffectsConfig::default(),
            picking: PickingConfig::default(),
            rise: RiseConfig::default(),
        }
    }
}

impl CitySettings {
    pub fn from_config(config: &AppConfig) -> Self {
        Self {
            atlas: config.atlas.layout(),
            lod: config.lod,
            effects: config.effects,
            picking: config.picking,
            rise: config.rise,
        }
    }
}

#[derive(Resource, Default)]
pub struct CityBuildings {
    pub list: BuildingList,
}

/// Per-frame inputs from collaborators.
#[derive(Resource, Debug, Clone, Copy, Default)]
pub struct FrameInputs {
    pub now: f32,
    pub dt: f32,
    pub camera: Vec2,
    pub focus: FocusIndices,
    pub hold: bool,
    pub flight: bool,
}

#[derive(Resource, Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FrameStats {
    /// Instanced draw plus one draw per near building.
    pub draw_calls: u32,
    pub far_instances: usize,
    pub near_buildings: usize,
    pub active_effects: usize,
    pub animating: usize,
}

#[derive(Resource, Default)]
struct PendingEffects(Vec<EffectsChange>);

#[derive(Resource, Default)]
struct PendingDetail(Vec<LodTransition>);

fn sys_classify_lod(
    inputs: Res<FrameInputs>,
    buildings: Res<CityBuildings>,
    grid: Res<SpatialGrid>,
    mut lod: ResMut<LodClassifier>,
    mut instanced: ResMut<InstancedBuildings>,
    mut pending: ResMut<PendingDetail>,
    mut events: ResMut<EventBus>,
) {
    let start = pending.0.len();
    if !lod.update(inputs.now, inputs.camera, &inputs.focus, &buildings.list, &grid, &mut pending.0) {
        return;
    }
    if pending.0.len() == start {
        return;
    }
    for transition in &pending.0[start..] {
        instanced.set_far_visible(transition.index, transition.level == LodLevel::Far);
    }
    let near = lod.near().len();
    events.push(CityEvent::LodChanged { near, far: lod.len() - near });
}

fn sys_activate_effects(
    inputs: Res<FrameInputs>,
    buildings: Res<CityBuildings>,
    grid: Res<SpatialGrid>,
    mut effects: ResMut<EffectsActivation>,
    mut pending: ResMut<PendingEffects>,
    mut events: ResMut<EventBus>,
) {
    effects.observe_camera(inputs.now, inputs.camera);
    let input = EffectsInput {
        now: inputs.now,
        camera: inputs.camera,
        flight: inputs.flight,
        focus: &inputs.focus,
        list: &buildings.list,
        grid: &grid,
    };
    if let Some(change) = effects.update(input) {
        events.push(CityEvent::EffectsChanged {
            activated: change.activated.len(),
            deactivated: change.deactivated.len(),
            active: effects.active().len(),
        });
        pending.0.push(change);
    }
}

fn sys_advance_rise(inputs: Res<FrameInputs>, mut instanced: ResMut<InstancedBuildings>, mut events: ResMut<EventBus>) {
    let was_animating = instanced.is_animating();
    instanced.tick(inputs.dt, inputs.hold);
    if was_animating && !instanced.is_animating() {
        events.push(CityEvent::RiseFinished);
    }
}

fn sys_collect_stats(
    instanced: Res<InstancedBuildings>,
    lod: Res<LodClassifier>,
    effects: Res<EffectsActivation>,
    mut stats: ResMut<FrameStats>,
) {
    let near_buildings = lod.near().len();
    *stats = FrameStats {
        draw_calls: instanced.draw_calls() + near_buildings as u32,
        far_instances: instanced.far_count(),
        near_buildings,
        active_effects: effects.active().len(),
        animating: instanced.animating_count(),
    };
}

/// Ray target over both render paths; the nearest hit wins.
struct CityTarget<'a> {
    instanced: &'a InstancedBuildings,
    grid: &'a SpatialGrid,
    near: &'a [usize],
}

impl PickTarget for CityTarget<'_> {
    fn raycast(&self, ray: &Ray) -> Option<PickHit> {
        PickHit::nearest(raycast_instanced(ray, self.instanced, self.grid), raycast_detailed(ray, self.instanced, self.near))
    }
}

pub struct CityWorld {
    world: World,
    schedule: Schedule,
    layout: AtlasLayout,
    arbiter: InputArbiter,
    picker: PointerPicker,
    pointer: Option<PointerId>,
    focus_ids: (Option<String>, Option<String>),
    clock: f32,
}

impl CityWorld {
    pub fn new(settings: CitySettings) -> Self {
        let mut world = World::new();
        world.insert_resource(CityBuildings::default());
        world.insert_resource(FrameInputs::default());
        world.insert_resource(SpatialGrid::new(settings.effects.grid_cell));
        world.insert_resource(InstancedBuildings::new(settings.rise));
        world.insert_resource(LodClassifier::new(settings.lod));
        world.insert_resource(EffectsActivation::new(settings.effects));
        world.insert_resource(EventBus::default());
        world.insert_resource(FrameStats::default());
        world.insert_resource(PendingEffects::default());
        world.insert_resource(PendingDetail::default());

        let mut schedule = Schedule::default();
        schedule.set_executor_kind(ExecutorKind::SingleThreaded);
        schedule.add_systems((sys_classify_lod, sys_activate_effects, sys_advance_rise, sys_collect_stats).chain());

        Self {
            world,
            schedule,
            layout: settings.atlas,
            arbiter: InputArbiter::new(),
            picker: PointerPicker::new(settings.picking),
            pointer: None,
            focus_ids: (None, None),
            clock: 0.0,
        }
    }

    /// Swaps in a new building list and rebuilds every derived structure before returning.
    pub fn replace_buildings(&mut self, list: BuildingList) {
        let layout = self.layout;
        {
            let mut grid = self.world.resource_mut::<SpatialGrid>();
            grid.rebuild(list.as_slice());
        }
        self.world.resource_mut::<InstancedBuildings>().initialize(&list, &layout);

        let hidden: Vec<LodTransition> = {
            let mut lod = self.world.resource_mut::<LodClassifier>();
            let hidden = lod.near().iter().map(|&index| LodTransition { index, level: LodLevel::Far }).collect();
            lod.reset(&list);
            hidden
        };
        {
            let mut pending = self.world.resource_mut::<PendingDetail>();
            pending.0.clear();
            pending.0.extend(hidden);
        }
        let deactivated = self.world.resource_mut::<EffectsActivation>().reset(&list);
        {
            let mut pending = self.world.resource_mut::<PendingEffects>();
            pending.0.clear();
            if !deactivated.is_empty() {
                pending.0.push(EffectsChange { activated: Vec::new(), deactivated });
            }
        }

        // A press that started on the old list must not resolve against the new one.
        self.picker.cancel();
        if self.picker.clear_hover() {
            self.push_event(CityEvent::HoverChanged { hovering: false });
        }

        let count = list.len();
        let generation = list.generation();
        self.world.resource_mut::<CityBuildings>().list = list;
        self.refresh_focus();
        self.push_event(CityEvent::BuildingsReplaced { count, generation });
        tracing::info!(count, generation, "building list replaced");
    }

    /// Sets up to two focused identifiers; unknown ids are kept and resolve after a reload.
    pub fn set_focus(&mut self, primary: Option<&str>, secondary: Option<&str>) {
        self.focus_ids = (primary.map(str::to_owned), secondary.map(str::to_owned));
        self.refresh_focus();
    }

    fn refresh_focus(&mut self) {
        let focus = FocusIndices::resolve(
            &self.world.resource::<CityBuildings>().list,
            self.focus_ids.0.as_deref(),
            self.focus_ids.1.as_deref(),
        );
        self.world.resource_mut::<FrameInputs>().focus = focus;
        self.world.resource_mut::<InstancedBuildings>().set_focus(&focus);
    }

    pub fn focus(&self) -> FocusIndices {
        self.world.resource::<FrameInputs>().focus
    }

    pub fn focus_ids(&self) -> (Option<&str>, Option<&str>) {
        (self.focus_ids.0.as_deref(), self.focus_ids.1.as_deref())
    }

    /// Runs one frame of LOD, effects and rise updates.
    pub fn frame(&mut self, dt: f32, camera: Vec2, hold: bool, flight: bool) {
        let dt = dt.max(0.0);
        self.clock += dt;
        {
            let mut inputs = self.world.resource_mut::<FrameInputs>();
            inputs.now = self.clock;
            inputs.dt = dt;
            inputs.camera = camera;
            inputs.hold = hold;
            inputs.flight = flight;
        }
        self.schedule.run(&mut self.world);
    }

    pub fn now(&self) -> f32 {
        self.clock
    }

    pub fn register_foreground(&mut self, picker: Box<dyn ForegroundPicker>) {
        self.arbiter.register(picker);
    }

    pub fn unregister_foreground(&mut self, name: &str) -> bool {
        self.arbiter.unregister(name)
    }

    /// Starts a press. Foreground pickers get first refusal; a claimed press never reaches
    /// the building picker.
    pub fn pointer_down(
        &mut self,
        sample: PointerSample,
        camera: &Camera3D,
        viewport: PhysicalSize<u32>,
    ) -> Option<ForegroundClaim> {
        let pointer = self.arbiter.begin_press();
        self.pointer = Some(pointer);
        let ray = camera.screen_ray(sample.position, viewport);
        let claim = self.arbiter.capture(pointer, ray.as_ref());
        if let Some(claim) = &claim {
            self.push_event(CityEvent::ForegroundClicked { name: claim.name.clone() });
        }
        let target = CityTarget {
            instanced: self.world.resource::<InstancedBuildings>(),
            grid: self.world.resource::<SpatialGrid>(),
            near: self.world.resource::<LodClassifier>().near(),
        };
        self.picker.pointer_down(&self.arbiter, pointer, sample, ray, &target);
        claim
    }

    pub fn pointer_move(&mut self, sample: PointerSample, camera: &Camera3D, viewport: PhysicalSize<u32>) {
        self.picker.pointer_move(sample);
        if !self.picker.wants_hover(&sample) {
            return;
        }
        let ray = camera.screen_ray(sample.position, viewport);
        let target = CityTarget {
            instanced: self.world.resource::<InstancedBuildings>(),
            grid: self.world.resource::<SpatialGrid>(),
            near: self.world.resource::<LodClassifier>().near(),
        };
        if let Some(hovering) = self.picker.hover(sample, ray, &target) {
            self.push_event(CityEvent::HoverChanged { hovering });
        }
    }

    /// Ends the press and returns the clicked building, if the press qualified as a click.
    pub fn pointer_up(&mut self, sample: PointerSample) -> Option<BuildingRef> {
        let hit = self.picker.pointer_up(&self.arbiter, sample);
        if let Some(pointer) = self.pointer.take() {
            self.arbiter.release(pointer);
        }
        let hit = hit?;
        let list = self.world.resource::<CityBuildings>().list.clone();
        let building = list.make_ref(hit.index)?;
        let record = list.resolve(building)?;
        tracing::debug!(index = hit.index, id = %record.id, distance = hit.distance, "building clicked");
        self.push_event(CityEvent::clicked(building, record));
        Some(building)
    }

    pub fn pointer_cancel(&mut self) {
        self.picker.cancel();
        if let Some(pointer) = self.pointer.take() {
            self.arbiter.release(pointer);
        }
    }

    pub fn pointer_left(&mut self) {
        self.pointer_cancel();
        if self.picker.clear_hover() {
            self.push_event(CityEvent::HoverChanged { hovering: false });
        }
    }

    pub fn hovering(&self) -> bool {
        self.picker.hovering()
    }

    /// Hands queued activation diffs to the effect owner.
    pub fn dispatch_effects(&mut self, sink: &mut dyn EffectSink) {
        let changes = std::mem::take(&mut self.world.resource_mut::<PendingEffects>().0);
        let list = &self.world.resource::<CityBuildings>().list;
        for change in &changes {
            dispatch_change(change, list, sink);
        }
    }

    /// Hands queued LOD transitions to the full-detail renderer.
    pub fn dispatch_detail(&mut self, sink: &mut dyn DetailedBuildings) {
        let transitions = std::mem::take(&mut self.world.resource_mut::<PendingDetail>().0);
        let list = &self.world.resource::<CityBuildings>().list;
        for transition in transitions {
            match (transition.level, list.get(transition.index)) {
                (LodLevel::Near, Some(building)) => sink.show(transition.index, building),
                (LodLevel::Near, None) => {}
                (LodLevel::Far, _) => sink.hide(transition.index),
            }
        }
    }

    pub fn buildings(&self) -> &BuildingList {
        &self.world.resource::<CityBuildings>().list
    }

    pub fn resolve(&self, building: BuildingRef) -> Option<&Building> {
        self.buildings().resolve(building)
    }

    pub fn instanced(&self) -> &InstancedBuildings {
        self.world.resource::<InstancedBuildings>()
    }

    /// Mutable access for the renderer to take dirty ranges after uploading.
    pub fn instanced_mut(&mut self) -> bevy_ecs::world::Mut<'_, InstancedBuildings> {
        self.world.resource_mut::<InstancedBuildings>()
    }

    pub fn grid(&self) -> &SpatialGrid {
        self.world.resource::<SpatialGrid>()
    }

    pub fn near(&self) -> &[usize] {
        self.world.resource::<LodClassifier>().near()
    }

    pub fn lod(&self) -> &LodClassifier {
        self.world.resource::<LodClassifier>()
    }

    pub fn active_effects(&self) -> &[usize] {
        self.world.resource::<EffectsActivation>().active()
    }

    pub fn stats(&self) -> FrameStats {
        *self.world.resource::<FrameStats>()
    }

    pub fn drain_events(&mut self) -> Vec<CityEvent> {
        self.world.resource_mut::<EventBus>().drain()
    }

    fn push_event(&mut self, event: CityEvent) {
        self.world.resource_mut::<EventBus>().push(event);
    }
}

impl Default for CityWorld {
    fn default() -> Self {
        Self::new(CitySettings::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use glam::Vec3;

    fn settings() -> CitySettings {
        CitySettings {
            lod: LodConfig { near_threshold: 400.0, interval: 0.0 },
            effects: EffectsConfig { interval: 0.0, ..EffectsConfig::default() },
            ..CitySettings::default()
        }
    }

    fn building(id: &str, x: f32) -> Building {
        Building::new(id, x, 0.0, Vec3::new(20.0, 60.0, 20.0))
    }

    #[test]
    fn empty_list_draws_nothing() {
        let mut city = CityWorld::new(settings());
        city.replace_buildings(BuildingList::default());
        city.frame(0.016, Vec2::ZERO, false, false);
        let stats = city.stats();
        assert_eq!(stats.draw_calls, 0);
        assert_eq!(stats.far_instances, 0);
        assert!(city.grid().is_empty());
    }

    #[test]
    fn frame_partitions_and_hides_near_instances() {
        let mut city = CityWorld::new(settings());
        city.replace_buildings(BuildingList::new(vec![
            building("a", 100.0),
            building("b", 500.0),
            building("c", 1_000.0),
        ]));
        city.frame(0.016, Vec2::ZERO, false, false);
        assert_eq!(city.near(), &[0]);
        assert!(!city.instanced().instances()[0].far_visible());
        assert!(city.instanced().instances()[1].far_visible());
        let stats = city.stats();
        assert_eq!(stats.near_buildings, 1);
        assert_eq!(stats.far_instances, 2);
        assert_eq!(stats.draw_calls, 2);
    }

    #[test]
    fn focus_survives_reload_by_identifier() {
        let mut city = CityWorld::new(settings());
        city.replace_buildings(BuildingList::new(vec![building("a", 0.0), building("B", 10.0)]));
        city.set_focus(Some("b"), None);
        assert_eq!(city.focus().primary, Some(1));
        city.replace_buildings(BuildingList::new(vec![building("b", 10.0), building("a", 0.0)]));
        assert_eq!(city.focus().primary, Some(0));
        assert_eq!(city.instanced().focus().primary, 0);
    }

    #[derive(Default)]
    struct DetailLog(Vec<(usize, bool)>);

    impl DetailedBuildings for DetailLog {
        fn show(&mut self, index: usize, _building: &Building) {
            self.0.push((index, true));
        }

        fn hide(&mut self, index: usize) {
            self.0.push((index, false));
        }
    }

    #[test]
    fn replacement_hides_previous_detail_buildings() {
        let mut city = CityWorld::new(settings());
        city.replace_buildings(BuildingList::new(vec![building("a", 10.0)]));
        city.frame(0.016, Vec2::ZERO, false, false);
        let mut detail = DetailLog::default();
        city.dispatch_detail(&mut detail);
        assert_eq!(detail.0, vec![(0, true)]);
        city.replace_buildings(BuildingList::new(vec![building("z", 5_000.0)]));
        detail.0.clear();
        city.dispatch_detail(&mut detail);
        assert_eq!(detail.0, vec![(0, false)]);
    }
}
