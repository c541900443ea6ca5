use std::fmt;

use crate::building::{Building, BuildingList};

use super::EffectsChange;

/// Where on a building an effect is mounted. One effect per zone.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EffectZone {
    Crown,
    Roof,
    Aura,
    Face,
}

impl EffectZone {
    pub const ALL: [EffectZone; 4] = [EffectZone::Crown, EffectZone::Roof, EffectZone::Aura, EffectZone::Face];

    fn slot(self) -> usize {
        match self {
            EffectZone::Crown => 0,
            EffectZone::Roof => 1,
            EffectZone::Aura => 2,
            EffectZone::Face => 3,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EffectKind {
    Crown,
    Halo,
    ClaimFlag,
    Spotlight,
    Beacon,
    Glow,
    StreakFlame,
    RabbitTrail,
    NeonTrim,
    RaidBanner,
    Billboard,
}

/// Item id prefix (text before the first `_`) to effect.
const ITEM_EFFECTS: &[(&str, EffectKind)] = &[
    ("crown", EffectKind::Crown),
    ("halo", EffectKind::Halo),
    ("flag", EffectKind::ClaimFlag),
    ("spotlight", EffectKind::Spotlight),
    ("beacon", EffectKind::Beacon),
    ("glow", EffectKind::Glow),
    ("flame", EffectKind::StreakFlame),
    ("neon", EffectKind::NeonTrim),
    ("billboard", EffectKind::Billboard),
];

impl EffectKind {
    pub fn zone(self) -> EffectZone {
        match self {
            EffectKind::Crown | EffectKind::Halo => EffectZone::Crown,
            EffectKind::ClaimFlag | EffectKind::Spotlight | EffectKind::Beacon => EffectZone::Roof,
            EffectKind::Glow | EffectKind::StreakFlame | EffectKind::RabbitTrail => EffectZone::Aura,
            EffectKind::NeonTrim | EffectKind::RaidBanner | EffectKind::Billboard => EffectZone::Face,
        }
    }

    /// Maps an owned item id to its effect; unknown items render nothing.
    pub fn from_item(id: &str) -> Option<Self> {
        let id = id.trim().to_ascii_lowercase();
        let prefix = id.split('_').next().unwrap_or_default();
        ITEM_EFFECTS.iter().find(|(key, _)| *key == prefix).map(|(_, kind)| *kind)
    }
}

impl fmt::Display for EffectKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            EffectKind::Crown => "crown",
            EffectKind::Halo => "halo",
            EffectKind::ClaimFlag => "claim-flag",
            EffectKind::Spotlight => "spotlight",
            EffectKind::Beacon => "beacon",
            EffectKind::Glow => "glow",
            EffectKind::StreakFlame => "streak-flame",
            EffectKind::RabbitTrail => "rabbit-trail",
            EffectKind::NeonTrim => "neon-trim",
            EffectKind::RaidBanner => "raid-banner",
            EffectKind::Billboard => "billboard",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct EquippedEffect {
    pub kind: EffectKind,
    /// Owning item id, `None` for effects granted by building flags.
    pub item: Option<String>,
    /// Effect strength; streak length for flames, 1 otherwise.
    pub level: u32,
}

/// The resolved effect per zone for one building.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Loadout {
    slots: [Option<EquippedEffect>; 4],
}

impl Loadout {
    /// Flag-granted effects are laid down first, then owned items in equip order, so a later
    /// item replaces anything earlier in the same zone.
    pub fn resolve(building: &Building) -> Self {
        let cosmetics = &building.cosmetics;
        let mut loadout = Self::default();
        if cosmetics.claimed {
            loadout.equip(EquippedEffect { kind: EffectKind::ClaimFlag, item: None, level: 1 });
        }
        if cosmetics.streak > 0 {
            loadout.equip(EquippedEffect { kind: EffectKind::StreakFlame, item: None, level: cosmetics.streak });
        }
        if cosmetics.raid_tag.as_deref().is_some_and(|tag| !tag.is_empty()) {
            loadout.equip(EquippedEffect { kind: EffectKind::RaidBanner, item: None, level: 1 });
        }
        if cosmetics.rabbit_completed {
            loadout.equip(EquippedEffect { kind: EffectKind::RabbitTrail, item: None, level: 1 });
        }
        for item in &cosmetics.owned_items {
            match EffectKind::from_item(item) {
                Some(kind) => loadout.equip(EquippedEffect { kind, item: Some(item.clone()), level: 1 }),
                None => tracing::debug!(item = %item, building = %building.id, "item has no effect"),
            }
        }
        loadout
    }

    pub fn equip(&mut self, effect: EquippedEffect) {
        let slot = effect.kind.zone().slot();
        self.slots[slot] = Some(effect);
    }

    pub fn get(&self, zone: EffectZone) -> Option<&EquippedEffect> {
        self.slots[zone.slot()].as_ref()
    }

    pub fn iter(&self) -> impl Iterator<Item = (EffectZone, &EquippedEffect)> {
        EffectZone::ALL.into_iter().filter_map(|zone| self.get(zone).map(|effect| (zone, effect)))
    }

    pub fn is_empty(&self) -> bool {
        self.slots.iter().all(Option::is_none)
    }

    pub fn len(&self) -> usize {
        self.slots.iter().filter(|slot| slot.is_some()).count()
    }
}

/// Collaborator that owns effect geometry and particles.
pub trait EffectSink {
    fn activate(&mut self, index: usize, building: &Building, loadout: &Loadout);
    fn deactivate(&mut self, index: usize);
}

/// Forwards one activation diff to `sink`. Deactivations go first so a sink with a fixed
/// budget never holds more than the new set.
pub fn dispatch_change(change: &EffectsChange, list: &BuildingList, sink: &mut dyn EffectSink) {
    for &index in &change.deactivated {
        sink.deactivate(index);
    }
    for &index in &change.activated {
        if let Some(building) = list.get(index) {
            sink.activate(index, building, &Loadout::resolve(building));
        }
    }
}
