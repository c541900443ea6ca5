use bevy_ecs::prelude::Resource;
use std::fmt;

use crate::building::{Building, BuildingRef};

#[derive(Debug, Clone)]
pub enum CityEvent {
    BuildingsReplaced { count: usize, generation: u64 },
    BuildingClicked { building: BuildingRef, record: Box<Building> },
    HoverChanged { hovering: bool },
    ForegroundClicked { name: String },
    EffectsChanged { activated: usize, deactivated: usize, active: usize },
    LodChanged { near: usize, far: usize },
    RiseFinished,
}

impl CityEvent {
    pub fn clicked(building: BuildingRef, record: &Building) -> Self {
        CityEvent::BuildingClicked { building, record: Box::new(record.clone()) }
    }
}

impl fmt::Display for CityEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CityEvent::BuildingsReplaced { count, generation } => {
                write!(f, "BuildingsReplaced count={count} generation={generation}")
            }
            CityEvent::BuildingClicked { building, record } => {
                write!(f, "BuildingClicked index={} id={}", building.index, record.id)
            }
            CityEvent::HoverChanged { hovering } => write!(f, "HoverChanged hovering={hovering}"),
            CityEvent::ForegroundClicked { name } => write!(f, "ForegroundClicked name={name}"),
            CityEvent::EffectsChanged { activated, deactivated, active } => {
                write!(f, "EffectsChanged +{activated} -{deactivated} active={active}")
            }
            CityEvent::LodChanged { near, far } => write!(f, "LodChanged near={near} far={far}"),
            CityEvent::RiseFinished => write!(f, "RiseFinished"),
        }
    }
}

#[derive(Default, Resource)]
pub struct EventBus {
    events: Vec<CityEvent>,
}

impl EventBus {
    pub fn push(&mut self, event: CityEvent) {
        self.events.push(event);
    }

    pub fn drain(&mut self) -> Vec<CityEvent> {
        self.events.drain(..).collect()
    }

    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }
}
