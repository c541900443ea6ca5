use glam::Vec2;
use serde::Deserialize;
use std::collections::{HashMap, HashSet};
use std::fs;
use std::path::Path;
use winit::event::{ElementState, MouseButton, MouseScrollDelta, TouchPhase, WindowEvent};
use winit::keyboard::{Key, NamedKey};

use crate::picking::{PointerKind, PointerSample};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PointerPhase {
    Down,
    Move,
    Up,
    Cancel,
    Left,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PointerInput {
    pub phase: PointerPhase,
    pub sample: PointerSample,
}

/// Viewer actions; one-shot actions are latched until taken, pan actions are held.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum InputAction {
    FocusToggle,
    CompareToggle,
    ThemeCycle,
    FlightToggle,
    Reload,
    PanForward,
    PanBackward,
    PanLeft,
    PanRight,
    Boost,
}

impl InputAction {
    fn is_held(self) -> bool {
        matches!(
            self,
            InputAction::PanForward
                | InputAction::PanBackward
                | InputAction::PanLeft
                | InputAction::PanRight
                | InputAction::Boost
        )
    }

    fn from_str(value: &str) -> Option<Self> {
        match value {
            "focus_toggle" => Some(Self::FocusToggle),
            "compare_toggle" => Some(Self::CompareToggle),
            "theme_cycle" => Some(Self::ThemeCycle),
            "flight_toggle" => Some(Self::FlightToggle),
            "reload" => Some(Self::Reload),
            "pan_forward" => Some(Self::PanForward),
            "pan_backward" => Some(Self::PanBackward),
            "pan_left" => Some(Self::PanLeft),
            "pan_right" => Some(Self::PanRight),
            "boost" => Some(Self::Boost),
            _ => None,
        }
    }
}

pub struct Input {
    bindings: InputBindings,
    pointer: Vec<PointerInput>,
    pressed: HashSet<InputAction>,
    held: HashSet<InputAction>,
    drag_delta: Vec2,
    wheel: f32,
    cursor: Option<Vec2>,
    left_down: bool,
    touch_id: Option<u64>,
}

impl Input {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_config(path: impl AsRef<Path>) -> Self {
        Self::with_bindings(InputBindings::load_or_default(path))
    }

    fn with_bindings(bindings: InputBindings) -> Self {
        Self {
            bindings,
            pointer: Vec::new(),
            pressed: HashSet::new(),
            held: HashSet::new(),
            drag_delta: Vec2::ZERO,
            wheel: 0.0,
            cursor: None,
            left_down: false,
            touch_id: None,
        }
    }

    /// Translates one window event; `now` is the frame clock in seconds.
    pub fn handle_window_event(&mut self, event: &WindowEvent, now: f32) {
        match event {
            WindowEvent::CursorMoved { position, .. } => {
                let position = Vec2::new(position.x as f32, position.y as f32);
                if self.left_down {
                    if let Some(previous) = self.cursor {
                        self.drag_delta += position - previous;
                    }
                }
                self.cursor = Some(position);
                self.push_pointer(PointerPhase::Move, position, now, PointerKind::Mouse);
            }
            WindowEvent::CursorLeft { .. } => {
                let position = self.cursor.take().unwrap_or_default();
                self.left_down = false;
                self.push_pointer(PointerPhase::Left, position, now, PointerKind::Mouse);
            }
            WindowEvent::MouseInput { state, button: MouseButton::Left, .. } => {
                let Some(position) = self.cursor else {
                    return;
                };
                self.left_down = *state == ElementState::Pressed;
                let phase = if self.left_down { PointerPhase::Down } else { PointerPhase::Up };
                self.push_pointer(phase, position, now, PointerKind::Mouse);
            }
            WindowEvent::MouseWheel { delta, .. } => {
                self.wheel += match delta {
                    MouseScrollDelta::LineDelta(_, y) => *y,
                    MouseScrollDelta::PixelDelta(p) => p.y as f32 / 40.0,
                };
            }
            WindowEvent::Touch(touch) => {
                let position = Vec2::new(touch.location.x as f32, touch.location.y as f32);
                // Multi-touch gestures are not tracked; only the first finger drives picking.
                if self.touch_id.is_some_and(|id| id != touch.id) {
                    return;
                }
                let phase = match touch.phase {
                    TouchPhase::Started => {
                        self.touch_id = Some(touch.id);
                        PointerPhase::Down
                    }
                    TouchPhase::Moved => {
                        if let Some(previous) = self.cursor {
                            self.drag_delta += position - previous;
                        }
                        PointerPhase::Move
                    }
                    TouchPhase::Ended => {
                        self.touch_id = None;
                        PointerPhase::Up
                    }
                    TouchPhase::Cancelled => {
                        self.touch_id = None;
                        PointerPhase::Cancel
                    }
                };
                self.cursor = Some(position);
                self.push_pointer(phase, position, now, PointerKind::Touch);
            }
            WindowEvent::KeyboardInput { event, .. } => {
                let pressed = event.state == ElementState::Pressed;
                if pressed && event.repeat {
                    return;
                }
                self.apply_key(&event.logical_key, pressed);
            }
            _ => {}
        }
    }

    fn push_pointer(&mut self, phase: PointerPhase, position: Vec2, now: f32, kind: PointerKind) {
        self.pointer.push(PointerInput { phase, sample: PointerSample::new(position, now, kind) });
    }

    fn apply_key(&mut self, key: &Key, pressed: bool) {
        let Some(binding) = KeyBinding::from_event_key(key) else {
            return;
        };
        let actions: Vec<_> = self.bindings.actions_for_key(&binding).collect();
        for action in actions {
            match (action.is_held(), pressed) {
                (true, true) => {
                    self.held.insert(action);
                }
                (true, false) => {
                    self.held.remove(&action);
                }
                (false, true) => {
                    self.pressed.insert(action);
                }
                (false, false) => {}
            }
        }
    }

    pub fn drain_pointer(&mut self) -> Vec<PointerInput> {
        std::mem::take(&mut self.pointer)
    }

    pub fn take_action(&mut self, action: InputAction) -> bool {
        self.pressed.remove(&action)
    }

    pub fn held(&self, action: InputAction) -> bool {
        self.held.contains(&action)
    }

    pub fn take_drag_delta(&mut self) -> Vec2 {
        std::mem::take(&mut self.drag_delta)
    }

    pub fn take_wheel(&mut self) -> Option<f32> {
        let wheel = std::mem::take(&mut self.wheel);
        (wheel.abs() > 0.0).then_some(wheel)
    }

    pub fn cursor_position(&self) -> Option<Vec2> {
        self.cursor
    }

    /// True while any pan key is held.
    pub fn panning(&self) -> bool {
        [InputAction::PanForward, InputAction::PanBackward, InputAction::PanLeft, InputAction::PanRight]
            .iter()
            .any(|action| self.held.contains(action))
    }
}

impl Default for Input {
    fn default() -> Self {
        Self::with_bindings(InputBindings::default())
    }
}

#[derive(Debug, Clone)]
struct InputBindings {
    key_to_actions: HashMap<KeyBinding, Vec<InputAction>>,
}

impl InputBindings {
    fn load_or_default(path: impl AsRef<Path>) -> Self {
        let path = path.as_ref();
        match fs::read_to_string(path) {
            Ok(contents) => match serde_json::from_str::<InputConfigFile>(&contents) {
                Ok(config) => Self::with_overrides(config.into_overrides(&path.display().to_string())),
                Err(err) => {
                    tracing::warn!("Failed to parse {}: {err}. Falling back to default bindings.", path.display());
                    Self::default()
                }
            },
            Err(err) => {
                tracing::debug!("No input bindings at {}: {err}. Using defaults.", path.display());
                Self::default()
            }
        }
    }

    fn with_overrides(overrides: HashMap<InputAction, Vec<KeyBinding>>) -> Self {
        let mut action_map = Self::default_action_map();
        for (action, keys) in overrides {
            if keys.is_empty() {
                continue;
            }
            action_map.insert(action, keys);
        }
        Self::from_action_map(action_map)
    }

    fn default_action_map() -> HashMap<InputAction, Vec<KeyBinding>> {
        use InputAction::*;
        let mut map = HashMap::new();
        map.insert(FocusToggle, vec![KeyBinding::character("f")]);
        map.insert(CompareToggle, vec![KeyBinding::character("c")]);
        map.insert(ThemeCycle, vec![KeyBinding::character("t")]);
        map.insert(FlightToggle, vec![KeyBinding::Named(NamedKeyCode::Space)]);
        map.insert(Reload, vec![KeyBinding::character("r")]);
        map.insert(PanForward, vec![KeyBinding::character("w"), KeyBinding::Named(NamedKeyCode::ArrowUp)]);
        map.insert(PanBackward, vec![KeyBinding::character("s"), KeyBinding::Named(NamedKeyCode::ArrowDown)]);
        map.insert(PanLeft, vec![KeyBinding::character("a"), KeyBinding::Named(NamedKeyCode::ArrowLeft)]);
        map.insert(PanRight, vec![KeyBinding::character("d"), KeyBinding::Named(NamedKeyCode::ArrowRight)]);
        map.insert(Boost, vec![KeyBinding::Named(NamedKeyCode::Shift)]);
        map
    }

    fn from_action_map(action_map: HashMap<InputAction, Vec<KeyBinding>>) -> Self {
        let mut key_to_actions: HashMap<KeyBinding, Vec<InputAction>> = HashMap::new();
        for (action, keys) in action_map {
            for key in keys {
                key_to_actions.entry(key).or_default().push(action);
            }
        }
        Self { key_to_actions }
    }

    fn actions_for_key(&self, key: &KeyBinding) -> impl Iterator<Item = InputAction> + '_ {
        self.key_to_actions.get(key).into_iter().flatten().copied()
    }
}

impl Default for InputBindings {
    fn default() -> Self {
        Self::from_action_map(Self::default_action_map())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
enum KeyBinding {
    Character(String),
    Named(NamedKeyCode),
}

impl KeyBinding {
    fn character(ch: &str) -> Self {
        Self::Character(ch.to_lowercase())
    }

    fn from_event_key(key: &Key) -> Option<Self> {
        match key {
            Key::Character(ch) if !ch.is_empty() => Some(Self::Character(ch.to_lowercase())),
            Key::Named(named) => NamedKeyCode::from_named_key(named).map(Self::Named),
            _ => None,
        }
    }

    fn from_config_value(raw: &str) -> Option<Self> {
        let normalized = raw.trim().to_lowercase();
        if let Some(named) = NamedKeyCode::from_str(&normalized) {
            return Some(Self::Named(named));
        }
        (normalized.chars().count() == 1).then_some(Self::Character(normalized))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
enum NamedKeyCode {
    Space,
    Shift,
    ArrowUp,
    ArrowDown,
    ArrowLeft,
    ArrowRight,
}

impl NamedKeyCode {
    fn from_named_key(key: &NamedKey) -> Option<Self> {
        match key {
            NamedKey::Space => Some(Self::Space),
            NamedKey::Shift => Some(Self::Shift),
            NamedKey::ArrowUp => Some(Self::ArrowUp),
            NamedKey::ArrowDown => Some(Self::ArrowDown),
            NamedKey::ArrowLeft => Some(Self::ArrowLeft),
            NamedKey::ArrowRight => Some(Self::ArrowRight),
            _ => None,
        }
    }

    fn from_str(value: &str) -> Option<Self> {
        match value {
            "space" => Some(Self::Space),
            "shift" | "left_shift" | "right_shift" => Some(Self::Shift),
            "up" | "arrow_up" => Some(Self::ArrowUp),
            "down" | "arrow_down" => Some(Self::ArrowDown),
            "left" | "arrow_left" => Some(Self::ArrowLeft),
            "right" | "arrow_right" => Some(Self::ArrowRight),
            _ => None,
        }
    }
}

#[derive(Debug, Deserialize)]
struct InputConfigFile {
    #[serde(default)]
    bindings: HashMap<String, Vec<String>>,
}

impl InputConfigFile {
    fn into_overrides(self, origin: &str) -> HashMap<InputAction, Vec<KeyBinding>> {
        let mut overrides = HashMap::new();
        for (action_name, keys) in self.bindings {
            let Some(action) = InputAction::from_str(&action_name.trim().to_lowercase()) else {
                tracing::warn!("{origin}: unknown action '{action_name}', ignoring.");
                continue;
            };
            let mut parsed = Vec::new();
            for key in keys {
                match KeyBinding::from_config_value(&key) {
                    Some(binding) => parsed.push(binding),
                    None => tracing::warn!("{origin}: unknown key '{key}' for action '{action_name}', ignoring."),
                }
            }
            if parsed.is_empty() {
                tracing::warn!("{origin}: action '{action_name}' has no valid keys, keeping defaults.");
                continue;
            }
            overrides.insert(action, parsed);
        }
        overrides
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_keys_latch_one_shot_actions() {
        let mut input = Input::new();
        input.apply_key(&Key::Character("F".into()), true);
        input.apply_key(&Key::Character("F".into()), false);
        assert!(input.take_action(InputAction::FocusToggle));
        assert!(!input.take_action(InputAction::FocusToggle));
    }

    #[test]
    fn pan_keys_are_held_until_release() {
        let mut input = Input::new();
        input.apply_key(&Key::Named(NamedKey::ArrowUp), true);
        assert!(input.held(InputAction::PanForward));
        assert!(input.panning());
        input.apply_key(&Key::Named(NamedKey::ArrowUp), false);
        assert!(!input.panning());
    }

    #[test]
    fn config_overrides_replace_default_keys() {
        let file: InputConfigFile =
            serde_json::from_str(r#"{ "bindings": { "reload": ["l"], "warp": ["x"] } }"#).expect("parse");
        let bindings = InputBindings::with_overrides(file.into_overrides("test"));
        let reload: Vec<_> = bindings.actions_for_key(&KeyBinding::character("l")).collect();
        assert_eq!(reload, vec![InputAction::Reload]);
        assert_eq!(bindings.actions_for_key(&KeyBinding::character("r")).count(), 0);
    }
}
