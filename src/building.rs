use anyhow::{Context, Result};
use bitflags::bitflags;
use glam::{Vec2, Vec3};
use serde::Deserialize;
use std::collections::HashMap;
use std::fs;
use std::path::Path;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

static NEXT_GENERATION: AtomicU64 = AtomicU64::new(1);

bitflags! {
    /// Which cosmetic sources a building carries. A non-empty set means the building
    /// is eligible for effect activation.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct EffectSources: u8 {
        const CLAIMED = 1 << 0;
        const ITEMS = 1 << 1;
        const STREAK = 1 << 2;
        const RAID = 1 << 3;
        const RABBIT = 1 << 4;
    }
}

#[derive(Debug, Clone, PartialEq, Default, Deserialize)]
pub struct Cosmetics {
    #[serde(default)]
    pub claimed: bool,
    /// Owned item ids in equip order; later entries win within a zone.
    #[serde(default)]
    pub owned_items: Vec<String>,
    #[serde(default)]
    pub streak: u32,
    #[serde(default)]
    pub raid_tag: Option<String>,
    #[serde(default)]
    pub rabbit_completed: bool,
}

impl Cosmetics {
    pub fn sources(&self) -> EffectSources {
        let mut sources = EffectSources::empty();
        sources.set(EffectSources::CLAIMED, self.claimed);
        sources.set(EffectSources::ITEMS, !self.owned_items.is_empty());
        sources.set(EffectSources::STREAK, self.streak > 0);
        sources.set(EffectSources::RAID, self.raid_tag.as_deref().is_some_and(|tag| !tag.is_empty()));
        sources.set(EffectSources::RABBIT, self.rabbit_completed);
        sources
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct Building {
    pub id: String,
    pub x: f32,
    pub z: f32,
    pub width: f32,
    pub height: f32,
    pub depth: f32,
    /// Fraction of lit windows, 0..1.
    #[serde(default)]
    pub lit_density: f32,
    pub floors: u32,
    pub windows_front: u32,
    pub windows_side: u32,
    #[serde(default)]
    pub custom_color: Option<[f32; 3]>,
    #[serde(default)]
    pub cosmetics: Cosmetics,
}

impl Building {
    pub fn new(id: impl Into<String>, x: f32, z: f32, size: Vec3) -> Self {
        let floors = (size.y / 4.0).round().max(1.0) as u32;
        Self {
            id: id.into(),
            x,
            z,
            width: size.x,
            height: size.y,
            depth: size.z,
            lit_density: 0.5,
            floors,
            windows_front: (size.x / 3.0).round().max(1.0) as u32,
            windows_side: (size.z / 3.0).round().max(1.0) as u32,
            custom_color: None,
            cosmetics: Cosmetics::default(),
        }
    }

    pub fn planar(&self) -> Vec2 {
        Vec2::new(self.x, self.z)
    }

    pub fn half_footprint(&self) -> Vec2 {
        Vec2::new(self.width * 0.5, self.depth * 0.5)
    }

    pub fn effect_sources(&self) -> EffectSources {
        self.cosmetics.sources()
    }

    pub fn has_effects(&self) -> bool {
        !self.effect_sources().is_empty()
    }
}

/// Index into one specific [`BuildingList`] version.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct BuildingRef {
    pub index: usize,
    pub generation: u64,
}

/// Ordered, shared building list with a case-insensitive id lookup.
///
/// Every list gets a fresh generation when built; indices handed out as [`BuildingRef`]
/// are only honoured by the list that produced them.
#[derive(Debug, Clone)]
pub struct BuildingList {
    buildings: Arc<[Building]>,
    lookup: Arc<HashMap<String, usize>>,
    generation: u64,
}

impl Default for BuildingList {
    fn default() -> Self {
        Self::new(Vec::new())
    }
}

impl BuildingList {
    pub fn new(buildings: Vec<Building>) -> Self {
        let mut lookup = HashMap::with_capacity(buildings.len());
        for (index, building) in buildings.iter().enumerate() {
            let key = normalize_id(&building.id);
            if lookup.contains_key(&key) {
                tracing::warn!(id = %building.id, index, "duplicate building id; keeping first occurrence");
                continue;
            }
            lookup.insert(key, index);
        }
        Self {
            buildings: buildings.into(),
            lookup: Arc::new(lookup),
            generation: NEXT_GENERATION.fetch_add(1, Ordering::Relaxed),
        }
    }

    pub fn load_json(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let bytes =
            fs::read(path).with_context(|| format!("Failed to read building list {}", path.display()))?;
        let buildings: Vec<Building> = serde_json::from_slice(&bytes)
            .with_context(|| format!("Failed to parse building list {}", path.display()))?;
        Ok(Self::new(buildings))
    }

    pub fn len(&self) -> usize {
        self.buildings.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buildings.is_empty()
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn as_slice(&self) -> &[Building] {
        &self.buildings
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Building> {
        self.buildings.iter()
    }

    pub fn get(&self, index: usize) -> Option<&Building> {
        self.buildings.get(index)
    }

    pub fn index_of(&self, id: &str) -> Option<usize> {
        self.lookup.get(&normalize_id(id)).copied()
    }

    pub fn make_ref(&self, index: usize) -> Option<BuildingRef> {
        (index < self.len()).then_some(BuildingRef { index, generation: self.generation })
    }

    /// Returns `None` for refs minted by another list version.
    pub fn resolve(&self, building: BuildingRef) -> Option<&Building> {
        if building.generation != self.generation {
            tracing::warn!(
                stale = building.generation,
                current = self.generation,
                "rejected building ref from a replaced list"
            );
            return None;
        }
        self.buildings.get(building.index)
    }

    pub fn same_version(&self, other: &BuildingList) -> bool {
        self.generation == other.generation
    }
}

pub(crate) fn normalize_id(id: &str) -> String {
    id.to_lowercase()
}

/// Zero, one or two focused buildings resolved against the current list.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct FocusIndices {
    pub primary: Option<usize>,
    pub secondary: Option<usize>,
}

impl FocusIndices {
    pub fn resolve(list: &BuildingList, primary: Option<&str>, secondary: Option<&str>) -> Self {
        Self {
            primary: primary.and_then(|id| list.index_of(id)),
            secondary: secondary.and_then(|id| list.index_of(id)),
        }
    }

    pub fn is_active(&self) -> bool {
        self.primary.is_some() || self.secondary.is_some()
    }

    pub fn contains(&self, index: usize) -> bool {
        self.primary == Some(index) || self.secondary == Some(index)
    }

    pub fn iter(&self) -> impl Iterator<Item = usize> {
        let secondary = self.secondary.filter(|s| Some(*s) != self.primary);
        self.primary.into_iter().chain(secondary)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample(id: &str) -> Building {
        Building::new(id, 0.0, 0.0, Vec3::new(10.0, 40.0, 10.0))
    }

    #[test]
    fn lookup_is_case_insensitive() {
        let list = BuildingList::new(vec![sample("Octocat"), sample("torvalds")]);
        assert_eq!(list.index_of("octocat"), Some(0));
        assert_eq!(list.index_of("TORVALDS"), Some(1));
        assert_eq!(list.index_of("nobody"), None);
    }

    #[test]
    fn stale_refs_do_not_resolve_against_new_lists() {
        let first = BuildingList::new(vec![sample("a"), sample("b")]);
        let second = BuildingList::new(vec![sample("b"), sample("a")]);
        let stale = first.make_ref(1).expect("ref");
        assert_eq!(first.resolve(stale).map(|b| b.id.as_str()), Some("b"));
        assert!(second.resolve(stale).is_none());
        assert!(!first.same_version(&second));
    }

    #[test]
    fn effect_sources_follow_cosmetics() {
        let mut building = sample("a");
        assert!(!building.has_effects());
        building.cosmetics.streak = 3;
        building.cosmetics.raid_tag = Some(String::new());
        assert_eq!(building.effect_sources(), EffectSources::STREAK);
        building.cosmetics.owned_items.push("crown_gold".into());
        assert!(building.effect_sources().contains(EffectSources::ITEMS | EffectSources::STREAK));
    }

    #[test]
    fn focus_iter_deduplicates() {
        let focus = FocusIndices { primary: Some(3), secondary: Some(3) };
        assert_eq!(focus.iter().collect::<Vec<_>>(), vec![3]);
        assert!(focus.contains(3));
        assert!(!FocusIndices::default().is_active());
    }
}
