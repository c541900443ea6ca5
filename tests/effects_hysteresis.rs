use glam::{Vec2, Vec3};
use skyline::building::{Building, BuildingList, FocusIndices};
use skyline::effects::{
    dispatch_change, EffectKind, EffectSink, EffectZone, EffectsActivation, EffectsConfig, EffectsInput, Loadout,
};
use skyline::spatial::SpatialGrid;

fn claimed(id: &str, x: f32, z: f32) -> Building {
    let mut building = Building::new(id, x, z, Vec3::new(20.0, 60.0, 20.0));
    building.cosmetics.claimed = true;
    building
}

fn grid_for(list: &BuildingList) -> SpatialGrid {
    let mut grid = SpatialGrid::new(200.0);
    grid.rebuild(list.as_slice());
    grid
}

#[test]
fn hysteresis_keeps_effects_until_far_radius() {
    let list = BuildingList::new(vec![claimed("tower", 0.0, 0.0)]);
    let grid = grid_for(&list);
    let mut effects = EffectsActivation::new(EffectsConfig::default());
    let focus = FocusIndices::default();

    let mut active_per_cycle = Vec::new();
    for (cycle, distance) in [350.0f32, 440.0, 460.0, 500.0].into_iter().enumerate() {
        let input = EffectsInput {
            now: cycle as f32 * 0.5,
            camera: Vec2::new(distance, 0.0),
            flight: false,
            focus: &focus,
            list: &list,
            grid: &grid,
        };
        effects.update(input);
        active_per_cycle.push(effects.is_active(0));
    }
    assert_eq!(active_per_cycle, vec![true, true, true, false]);
}

#[test]
fn building_outside_near_radius_does_not_activate() {
    let list = BuildingList::new(vec![claimed("tower", 0.0, 0.0)]);
    let grid = grid_for(&list);
    let mut effects = EffectsActivation::new(EffectsConfig::default());
    let focus = FocusIndices::default();
    let input = EffectsInput { now: 0.0, camera: Vec2::new(440.0, 0.0), flight: false, focus: &focus, list: &list, grid: &grid };
    assert!(effects.update(input).is_none());
    assert!(!effects.is_active(0));
}

#[test]
fn cap_keeps_closest_and_focus_rides_on_top() {
    let mut buildings: Vec<Building> = (0..8).map(|i| claimed(&format!("n{i}"), 20.0 * (i + 1) as f32, 0.0)).collect();
    buildings.push(Building::new("focus-a", 5_000.0, 0.0, Vec3::splat(20.0)));
    buildings.push(claimed("focus-b", -6_000.0, 0.0));
    let list = BuildingList::new(buildings);
    let grid = grid_for(&list);
    let config = EffectsConfig { max_active: 4, ..EffectsConfig::default() };
    let mut effects = EffectsActivation::new(config);
    let focus = FocusIndices::resolve(&list, Some("focus-a"), Some("focus-b"));

    let input = EffectsInput { now: 0.0, camera: Vec2::ZERO, flight: false, focus: &focus, list: &list, grid: &grid };
    let change = effects.update(input).expect("initial activation");
    assert_eq!(effects.active(), &[0, 1, 2, 3, 8, 9]);
    assert_eq!(effects.active().len(), config.max_active + 2);
    assert!(change.deactivated.is_empty());
}

#[test]
fn cadence_skips_cycles_between_intervals() {
    let list = BuildingList::new(vec![claimed("a", 0.0, 0.0)]);
    let grid = grid_for(&list);
    let mut effects = EffectsActivation::new(EffectsConfig::default());
    let focus = FocusIndices::default();
    let at = |now: f32, x: f32| EffectsInput { now, camera: Vec2::new(x, 0.0), flight: false, focus: &focus, list: &list, grid: &grid };
    assert!(effects.update(at(0.0, 0.0)).is_some());
    // Too soon: the camera is far away but the set is not re-evaluated yet.
    assert!(effects.update(at(0.2, 5_000.0)).is_none());
    assert!(effects.is_active(0));
    let change = effects.update(at(0.5, 5_000.0)).expect("due cycle");
    assert_eq!(change.deactivated, vec![0]);
}

#[derive(Default)]
struct Recorder {
    calls: Vec<String>,
}

impl EffectSink for Recorder {
    fn activate(&mut self, index: usize, _building: &Building, loadout: &Loadout) {
        let kinds: Vec<String> = loadout.iter().map(|(_, e)| e.kind.to_string()).collect();
        self.calls.push(format!("+{index}:{}", kinds.join(",")));
    }

    fn deactivate(&mut self, index: usize) {
        self.calls.push(format!("-{index}"));
    }
}

#[test]
fn changes_dispatch_resolved_loadouts() {
    let mut crowned = claimed("crowned", 0.0, 0.0);
    crowned.cosmetics.owned_items = vec!["crown_gold".into()];
    let list = BuildingList::new(vec![crowned, claimed("plain", 30.0, 0.0)]);
    let grid = grid_for(&list);
    let mut effects = EffectsActivation::new(EffectsConfig::default());
    let focus = FocusIndices::default();
    let change = effects
        .update(EffectsInput { now: 0.0, camera: Vec2::ZERO, flight: false, focus: &focus, list: &list, grid: &grid })
        .expect("activation");
    let mut sink = Recorder::default();
    dispatch_change(&change, &list, &mut sink);
    assert_eq!(sink.calls.len(), 2);
    assert!(sink.calls[0].starts_with("+0:"));
    assert!(sink.calls[0].contains(&EffectKind::Crown.to_string()));

    let loadout = Loadout::resolve(list.get(0).expect("building"));
    assert_eq!(loadout.get(EffectZone::Crown).map(|e| e.kind), Some(EffectKind::Crown));
}
