use glam::{Vec2, Vec3};
use skyline::building::{Building, BuildingList};
use skyline::camera3d::Camera3D;
use skyline::city::{CitySettings, CityWorld};
use skyline::events::CityEvent;
use skyline::picking::{Aabb, ForegroundBox, PointerKind, PointerSample};
use winit::dpi::PhysicalSize;

const VIEWPORT: PhysicalSize<u32> = PhysicalSize { width: 800, height: 600 };

/// Twelve buildings along the x axis, 60 units apart, fully risen.
fn row_city() -> CityWorld {
    let mut city = CityWorld::new(CitySettings::default());
    let list = BuildingList::new(
        (0..12).map(|i| Building::new(format!("row-{i}"), i as f32 * 60.0, 0.0, Vec3::new(20.0, 60.0, 20.0))).collect(),
    );
    city.replace_buildings(list);
    for _ in 0..4 {
        city.frame(1.0, Vec2::new(420.0, 300.0), false, false);
    }
    assert!(!city.instanced().is_animating());
    city
}

fn camera() -> Camera3D {
    Camera3D::new(Vec3::new(420.0, 80.0, 300.0), Vec3::new(420.0, 30.0, 0.0), 60.0_f32.to_radians(), 1.0, 5_000.0)
}

fn screen_of_building_seven(camera: &Camera3D) -> Vec2 {
    camera.project_point(Vec3::new(420.0, 30.0, 10.0), VIEWPORT).expect("building 7 on screen")
}

fn sample(position: Vec2, time: f32) -> PointerSample {
    PointerSample::new(position, time, PointerKind::Mouse)
}

#[test]
fn quick_click_on_instance_seven_resolves_index_seven() {
    let mut city = row_city();
    let camera = camera();
    let at = screen_of_building_seven(&camera);
    let now = city.now();
    assert!(city.pointer_down(sample(at, now), &camera, VIEWPORT).is_none());
    let clicked = city.pointer_up(sample(at, now + 0.1)).expect("click resolves a building");
    assert_eq!(clicked.index, 7);
    assert_eq!(city.resolve(clicked).map(|b| b.id.as_str()), Some("row-7"));
    let events = city.drain_events();
    assert!(events.iter().any(|e| matches!(e, CityEvent::BuildingClicked { building, .. } if building.index == 7)));
}

#[test]
fn thirty_pixel_drag_is_not_a_click() {
    let mut city = row_city();
    let camera = camera();
    let at = screen_of_building_seven(&camera);
    let now = city.now();
    city.pointer_down(sample(at, now), &camera, VIEWPORT);
    let moved = at + Vec2::new(30.0, 0.0);
    city.pointer_move(sample(moved, now + 0.05), &camera, VIEWPORT);
    assert!(city.pointer_up(sample(moved, now + 0.1)).is_none());
}

#[test]
fn slow_press_is_not_a_click() {
    let mut city = row_city();
    let camera = camera();
    let at = screen_of_building_seven(&camera);
    let now = city.now();
    city.pointer_down(sample(at, now), &camera, VIEWPORT);
    assert!(city.pointer_up(sample(at, now + 0.5)).is_none());
}

#[test]
fn foreground_claim_blocks_building_click() {
    let mut city = row_city();
    let bounds = Aabb { min: Vec3::new(400.0, 0.0, 20.0), max: Vec3::new(440.0, 60.0, 40.0) };
    city.register_foreground(Box::new(ForegroundBox::new("banner", bounds, 5)));
    let camera = camera();
    let at = screen_of_building_seven(&camera);
    let now = city.now();
    let claim = city.pointer_down(sample(at, now), &camera, VIEWPORT).expect("banner claims the press");
    assert_eq!(claim.name, "banner");
    assert!(city.pointer_up(sample(at, now + 0.1)).is_none());

    // Once the banner is gone the same press reaches the building again.
    assert!(city.unregister_foreground("banner"));
    city.pointer_down(sample(at, now + 0.2), &camera, VIEWPORT);
    assert_eq!(city.pointer_up(sample(at, now + 0.3)).map(|b| b.index), Some(7));
}

#[test]
fn click_in_empty_sky_hits_nothing() {
    let mut city = row_city();
    let camera = camera();
    let now = city.now();
    let sky = Vec2::new(400.0, 5.0);
    city.pointer_down(sample(sky, now), &camera, VIEWPORT);
    assert!(city.pointer_up(sample(sky, now + 0.1)).is_none());
}

#[test]
fn press_across_list_replacement_is_dropped() {
    let mut city = row_city();
    let camera = camera();
    let at = screen_of_building_seven(&camera);
    let now = city.now();
    city.pointer_down(sample(at, now), &camera, VIEWPORT);
    city.replace_buildings(BuildingList::default());
    assert!(city.pointer_up(sample(at, now + 0.1)).is_none());
}
