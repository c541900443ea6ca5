use bevy_ecs::prelude::Resource;
use glam::Vec2;
use serde::Deserialize;

use crate::building::{Building, BuildingList, FocusIndices};
use crate::spatial::SpatialGrid;

#[derive(Debug, Clone, Copy, PartialEq, Deserialize)]
pub struct LodConfig {
    #[serde(default = "LodConfig::default_near_threshold")]
    pub near_threshold: f32,
    /// Seconds between re-evaluations.
    #[serde(default = "LodConfig::default_interval")]
    pub interval: f32,
}

impl LodConfig {
    const fn default_near_threshold() -> f32 {
        400.0
    }

    const fn default_interval() -> f32 {
        0.25
    }
}

impl Default for LodConfig {
    fn default() -> Self {
        Self { near_threshold: Self::default_near_threshold(), interval: Self::default_interval() }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LodLevel {
    #[default]
    Far,
    Near,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LodTransition {
    pub index: usize,
    pub level: LodLevel,
}

/// Full-detail rendering path for Near buildings (labels, meshes, per-building effects).
pub trait DetailedBuildings {
    fn show(&mut self, index: usize, building: &Building);
    fn hide(&mut self, index: usize);
}

/// Splits the building list into near (individually rendered) and far (instanced) sets.
///
/// Every building holds exactly one level, so the two sets always partition the list.
#[derive(Resource, Debug, Default)]
pub struct LodClassifier {
    config: LodConfig,
    levels: Vec<LodLevel>,
    near: Vec<usize>,
    generation: u64,
    last_run: Option<f32>,
    candidates: Vec<usize>,
    next_near: Vec<usize>,
}

impl LodClassifier {
    pub fn new(config: LodConfig) -> Self {
        Self { config, ..Self::default() }
    }

    pub fn config(&self) -> LodConfig {
        self.config
    }

    pub fn level(&self, index: usize) -> LodLevel {
        self.levels.get(index).copied().unwrap_or_default()
    }

    /// Near indices, ascending.
    pub fn near(&self) -> &[usize] {
        &self.near
    }

    pub fn far_indices(&self) -> impl Iterator<Item = usize> + '_ {
        self.levels.iter().enumerate().filter(|(_, level)| **level == LodLevel::Far).map(|(i, _)| i)
    }

    pub fn len(&self) -> usize {
        self.levels.len()
    }

    pub fn is_empty(&self) -> bool {
        self.levels.is_empty()
    }

    /// Drops all state for the old list; every building of the new one starts Far.
    pub fn reset(&mut self, list: &BuildingList) {
        self.levels.clear();
        self.levels.resize(list.len(), LodLevel::Far);
        self.near.clear();
        self.generation = list.generation();
        self.last_run = None;
    }

    pub fn is_due(&self, now: f32, list: &BuildingList) -> bool {
        list.generation() != self.generation
            || self.last_run.map_or(true, |last| now - last >= self.config.interval)
    }

    /// Re-evaluates the partition if due. Level changes are appended to `transitions`.
    ///
    /// Returns true when an evaluation ran.
    pub fn update(
        &mut self,
        now: f32,
        camera: Vec2,
        focus: &FocusIndices,
        list: &BuildingList,
        grid: &SpatialGrid,
        transitions: &mut Vec<LodTransition>,
    ) -> bool {
        if !self.is_due(now, list) {
            return false;
        }
        if list.generation() != self.generation || self.levels.len() != list.len() {
            self.reset(list);
        }
        self.last_run = Some(now);

        let threshold = self.config.near_threshold;
        self.candidates.clear();
        grid.query_radius(camera, threshold, &mut self.candidates);
        self.next_near.clear();
        for &index in &self.candidates {
            if let Some(building) = list.get(index) {
                if building.planar().distance(camera) < threshold {
                    self.next_near.push(index);
                }
            }
        }
        self.next_near.extend(focus.iter().filter(|&i| i < list.len()));
        self.next_near.sort_unstable();
        self.next_near.dedup();

        for &index in &self.near {
            if self.next_near.binary_search(&index).is_err() {
                self.levels[index] = LodLevel::Far;
                transitions.push(LodTransition { index, level: LodLevel::Far });
            }
        }
        for &index in &self.next_near {
            if self.levels[index] != LodLevel::Near {
                self.levels[index] = LodLevel::Near;
                transitions.push(LodTransition { index, level: LodLevel::Near });
            }
        }
        std::mem::swap(&mut self.near, &mut self.next_near);
        tracing::debug!(near = self.near.len(), total = self.levels.len(), "lod re-evaluated");
        true
    }
}
