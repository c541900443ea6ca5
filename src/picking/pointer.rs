use glam::Vec2;
use serde::Deserialize;

use super::{InputArbiter, PickHit, PickTarget, PointerId, Ray};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PointerKind {
    #[default]
    Mouse,
    Touch,
    Pen,
}

impl PointerKind {
    pub fn supports_hover(self) -> bool {
        !matches!(self, PointerKind::Touch)
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PointerSample {
    /// Physical pixels.
    pub position: Vec2,
    /// Seconds on the frame clock.
    pub time: f32,
    pub kind: PointerKind,
}

impl PointerSample {
    pub fn new(position: Vec2, time: f32, kind: PointerKind) -> Self {
        Self { position, time, kind }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Deserialize)]
pub struct PickingConfig {
    #[serde(default = "PickingConfig::default_click_max_ms")]
    pub click_max_ms: f32,
    #[serde(default = "PickingConfig::default_click_max_px")]
    pub click_max_px: f32,
    #[serde(default = "PickingConfig::default_hover_interval_ms")]
    pub hover_interval_ms: f32,
}

impl PickingConfig {
    const fn default_click_max_ms() -> f32 {
        350.0
    }

    const fn default_click_max_px() -> f32 {
        6.0
    }

    const fn default_hover_interval_ms() -> f32 {
        66.0
    }
}

impl Default for PickingConfig {
    fn default() -> Self {
        Self {
            click_max_ms: Self::default_click_max_ms(),
            click_max_px: Self::default_click_max_px(),
            hover_interval_ms: Self::default_hover_interval_ms(),
        }
    }
}

#[derive(Debug, Clone, Copy)]
struct Press {
    pointer: PointerId,
    time: f32,
    last: Vec2,
    travelled: f32,
    hit: Option<PickHit>,
}

/// Bulk building picker: resolves presses into clicks and keeps the hover affordance.
#[derive(Debug, Default)]
pub struct PointerPicker {
    config: PickingConfig,
    press: Option<Press>,
    last_hover: Option<f32>,
    hovering: bool,
}

impl PointerPicker {
    pub fn new(config: PickingConfig) -> Self {
        Self { config, press: None, last_hover: None, hovering: false }
    }

    pub fn hovering(&self) -> bool {
        self.hovering
    }

    pub fn is_pressed(&self) -> bool {
        self.press.is_some()
    }

    pub fn pointer_down(
        &mut self,
        arbiter: &InputArbiter,
        pointer: PointerId,
        sample: PointerSample,
        ray: Option<Ray>,
        target: &dyn PickTarget,
    ) {
        if arbiter.is_consumed(pointer) {
            self.press = None;
            return;
        }
        let hit = ray.and_then(|ray| target.raycast(&ray));
        self.press = Some(Press { pointer, time: sample.time, last: sample.position, travelled: 0.0, hit });
    }

    /// Accumulates drag distance for an active press.
    pub fn pointer_move(&mut self, sample: PointerSample) {
        if let Some(press) = self.press.as_mut() {
            press.travelled += press.last.distance(sample.position);
            press.last = sample.position;
        }
    }

    /// True when a hover raycast should run for this sample.
    pub fn wants_hover(&self, sample: &PointerSample) -> bool {
        if !sample.kind.supports_hover() || self.press.is_some() {
            return false;
        }
        let interval = self.config.hover_interval_ms / 1000.0;
        self.last_hover.map_or(true, |last| sample.time - last >= interval)
    }

    /// Throttled hover update. Returns the new hover state when it changed.
    pub fn hover(&mut self, sample: PointerSample, ray: Option<Ray>, target: &dyn PickTarget) -> Option<bool> {
        if !self.wants_hover(&sample) {
            return None;
        }
        self.last_hover = Some(sample.time);
        let hovering = ray.and_then(|ray| target.raycast(&ray)).is_some();
        if hovering == self.hovering {
            return None;
        }
        self.hovering = hovering;
        Some(hovering)
    }

    /// Ends the press. A click fires only for a short press that barely moved.
    pub fn pointer_up(&mut self, arbiter: &InputArbiter, sample: PointerSample) -> Option<PickHit> {
        let press = self.press.take()?;
        if arbiter.is_consumed(press.pointer) {
            return None;
        }
        let travelled = press.travelled + press.last.distance(sample.position);
        let elapsed_ms = (sample.time - press.time) * 1000.0;
        if elapsed_ms > self.config.click_max_ms || travelled > self.config.click_max_px {
            tracing::trace!(elapsed_ms, travelled, "press treated as drag");
            return None;
        }
        press.hit
    }

    pub fn cancel(&mut self) {
        self.press = None;
    }

    /// Forgets hover state, e.g. after the pointer left the window.
    pub fn clear_hover(&mut self) -> bool {
        self.last_hover = None;
        std::mem::take(&mut self.hovering)
    }
}
