//! Deterministic demo city: square blocks separated by streets, filled with lots.
//!
//! Stands in for the real layout producer so the viewer has something to draw. The same
//! seed always yields the same list, ids included.

use glam::Vec3;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use crate::building::{Building, BuildingList};

const ITEM_POOL: &[&str] = &["crown_gold", "halo_white", "spotlight_blue", "beacon_red", "glow_violet", "neon_pink", "billboard_city"];

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BlockLayout {
    pub lot: f32,
    pub lots_per_block: u32,
    pub street: f32,
    /// Fraction of buildings carrying at least one cosmetic.
    pub cosmetic_rate: f64,
}

impl Default for BlockLayout {
    fn default() -> Self {
        Self { lot: 24.0, lots_per_block: 4, street: 18.0, cosmetic_rate: 0.08 }
    }
}

impl BlockLayout {
    fn block_span(&self) -> f32 {
        self.lot * self.lots_per_block as f32 + self.street
    }

    /// Centre of lot `slot` on a square grid centred at the origin.
    fn lot_center(&self, slot: usize, side: usize) -> (f32, f32) {
        let lots = self.lots_per_block.max(1) as usize;
        let (col, row) = (slot % side, slot / side);
        let block = |i: usize| (i / lots) as f32 * self.block_span() + (i % lots) as f32 * self.lot + self.lot * 0.5;
        let half = block(side.saturating_sub(1)) * 0.5;
        (block(col) - half, block(row) - half)
    }
}

pub fn generate(count: usize, seed: u64) -> BuildingList {
    generate_with(count, seed, BlockLayout::default())
}

pub fn generate_with(count: usize, seed: u64, layout: BlockLayout) -> BuildingList {
    let mut rng = StdRng::seed_from_u64(seed);
    let side = (count as f64).sqrt().ceil() as usize;
    let mut buildings = Vec::with_capacity(count);
    for slot in 0..count {
        let (x, z) = layout.lot_center(slot, side.max(1));
        let downtown = 1.0 - ((x * x + z * z).sqrt() / (side as f32 * layout.lot)).clamp(0.0, 1.0);
        let footprint = layout.lot * rng.gen_range(0.55f32..0.85);
        let height = rng.gen_range(12.0f32..40.0) + downtown.powi(2) * rng.gen_range(0.0f32..260.0);
        let mut building = Building::new(
            format!("lot-{seed}-{slot}"),
            x,
            z,
            Vec3::new(footprint, height, footprint * rng.gen_range(0.7f32..1.0)),
        );
        building.lit_density = rng.gen_range(0.0f32..1.0);
        if rng.gen_bool(0.1) {
            building.custom_color = Some([rng.gen_range(0.2f32..0.9), rng.gen_range(0.2f32..0.9), rng.gen_range(0.2f32..0.9)]);
        }
        if rng.gen_bool(layout.cosmetic_rate) {
            let cosmetics = &mut building.cosmetics;
            cosmetics.claimed = rng.gen_bool(0.7);
            if rng.gen_bool(0.4) {
                cosmetics.owned_items.push(ITEM_POOL[rng.gen_range(0..ITEM_POOL.len())].to_string());
            }
            if rng.gen_bool(0.2) {
                cosmetics.streak = rng.gen_range(3..60);
            }
            cosmetics.rabbit_completed = rng.gen_bool(0.05);
        }
        buildings.push(building);
    }
    BuildingList::new(buildings)
}
