use glam::{Vec2, Vec3};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use skyline::building::{Building, BuildingList, FocusIndices};
use skyline::city::{CitySettings, CityWorld};
use skyline::lod::{LodClassifier, LodConfig, LodLevel};
use skyline::spatial::SpatialGrid;

fn random_city(rng: &mut StdRng, count: usize) -> BuildingList {
    BuildingList::new(
        (0..count)
            .map(|i| {
                let x = rng.gen_range(-3_000.0f32..3_000.0);
                let z = rng.gen_range(-3_000.0f32..3_000.0);
                let size = Vec3::new(rng.gen_range(8.0f32..40.0), rng.gen_range(10.0f32..300.0), rng.gen_range(8.0f32..40.0));
                Building::new(format!("r{i}"), x, z, size)
            })
            .collect(),
    )
}

#[test]
fn near_and_far_partition_every_building() {
    let mut rng = StdRng::seed_from_u64(0x5eed);
    for round in 0..8 {
        let list = random_city(&mut rng, 500 + round * 100);
        let mut grid = SpatialGrid::new(rng.gen_range(50.0f32..400.0));
        grid.rebuild(list.as_slice());
        let config = LodConfig { near_threshold: 400.0, interval: 0.25 };
        let mut lod = LodClassifier::new(config);
        let camera = Vec2::new(rng.gen_range(-2_000.0f32..2_000.0), rng.gen_range(-2_000.0f32..2_000.0));
        let mut transitions = Vec::new();
        assert!(lod.update(0.0, camera, &FocusIndices::default(), &list, &grid, &mut transitions));

        let far: Vec<usize> = lod.far_indices().collect();
        assert_eq!(lod.near().len() + far.len(), list.len(), "round {round}: partition must cover the list");
        for &index in lod.near() {
            assert!(!far.contains(&index), "round {round}: {index} is both near and far");
        }
        let expected: Vec<usize> = list
            .iter()
            .enumerate()
            .filter(|(_, b)| b.planar().distance(camera) < config.near_threshold)
            .map(|(i, _)| i)
            .collect();
        assert_eq!(lod.near(), expected.as_slice(), "round {round}");
        assert_eq!(transitions.len(), expected.len());
        assert!(transitions.iter().all(|t| t.level == LodLevel::Near));
    }
}

#[test]
fn buildings_at_100_500_1000_split_one_near_two_far() {
    let mut city = CityWorld::new(CitySettings::default());
    let size = Vec3::new(20.0, 80.0, 20.0);
    city.replace_buildings(BuildingList::new(vec![
        Building::new("close", 100.0, 0.0, size),
        Building::new("mid", 0.0, 500.0, size),
        Building::new("distant", -1_000.0, 0.0, size),
    ]));
    city.frame(0.016, Vec2::ZERO, false, false);

    assert_eq!(city.near(), &[0]);
    let visible: Vec<bool> = city.instanced().instances().iter().map(|i| i.far_visible()).collect();
    assert_eq!(visible, vec![false, true, true]);
    let stats = city.stats();
    assert_eq!(stats.far_instances, 2);
    assert_eq!(stats.draw_calls, 2, "one instanced draw plus one detailed building");
}

#[test]
fn focused_building_is_near_wherever_it_is() {
    let mut city = CityWorld::new(CitySettings::default());
    let size = Vec3::new(20.0, 80.0, 20.0);
    city.replace_buildings(BuildingList::new(vec![
        Building::new("close", 100.0, 0.0, size),
        Building::new("distant", 5_000.0, 0.0, size),
    ]));
    city.set_focus(Some("DISTANT"), None);
    city.frame(0.016, Vec2::ZERO, false, false);
    assert_eq!(city.near(), &[0, 1]);
    assert_eq!(city.stats().far_instances, 0);
}

#[test]
fn camera_motion_moves_buildings_between_levels() {
    let mut city = CityWorld::new(CitySettings::default());
    let size = Vec3::new(20.0, 80.0, 20.0);
    city.replace_buildings(BuildingList::new(vec![Building::new("a", 0.0, 0.0, size), Building::new("b", 2_000.0, 0.0, size)]));
    city.frame(0.3, Vec2::ZERO, false, false);
    assert_eq!(city.near(), &[0]);
    city.frame(0.3, Vec2::new(2_000.0, 0.0), false, false);
    assert_eq!(city.near(), &[1]);
    assert!(city.instanced().instances()[0].far_visible());
    assert!(!city.instanced().instances()[1].far_visible());
}
