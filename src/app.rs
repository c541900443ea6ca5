//! Interactive viewer: orbit camera over the demo city with picking, focus and themes.

use anyhow::{Context, Result};
use glam::{Vec2, Vec3};
use winit::application::ApplicationHandler;
use winit::event::{ElementState, KeyEvent, WindowEvent};
use winit::event_loop::{ActiveEventLoop, EventLoop};
use winit::keyboard::{Key, NamedKey};

use crate::atlas::AtlasPalette;
use crate::building::{Building, BuildingList};
use crate::camera3d::{Camera3D, OrbitCamera};
use crate::city::{CitySettings, CityWorld};
use crate::config::{AppConfig, AppConfigOverrides};
use crate::effects::{EffectSink, Loadout};
use crate::input::{Input, InputAction, PointerPhase};
use crate::layout;
use crate::lod::DetailedBuildings;
use crate::renderer::{DeviceRecovery, Renderer};
use crate::time::Time;

const CONFIG_PATH: &str = "config/app.json";
const BINDINGS_PATH: &str = "config/input.json";
const THEMES: [&str; 3] = ["night", "dusk", "day"];
const FOV_Y: f32 = 0.9;
const NEAR_PLANE: f32 = 1.0;
const FAR_PLANE: f32 = 12_000.0;
const ORBIT_SPEED: f32 = 0.005;
const PAN_SPEED: f32 = 240.0;
const FLIGHT_SPEED: f32 = 320.0;

pub fn run() -> Result<()> {
    run_with_overrides(AppConfigOverrides::default())
}

pub fn run_with_overrides(overrides: AppConfigOverrides) -> Result<()> {
    let mut config = AppConfig::load_or_default(CONFIG_PATH);
    if !overrides.is_empty() {
        tracing::info!(fields = ?overrides.applied_fields(), "applying CLI overrides");
    }
    config.apply_overrides(&overrides);
    let event_loop = EventLoop::new().context("Failed to create winit event loop")?;
    let mut app = App::new(config)?;
    event_loop.run_app(&mut app).context("Event loop execution failed")?;
    Ok(())
}

/// Builds the building list the config asks for: a JSON city file or the seeded demo.
pub fn load_city(config: &AppConfig) -> Result<BuildingList> {
    match &config.demo.city {
        Some(path) => BuildingList::load_json(path),
        None => Ok(layout::generate(config.demo.buildings, config.demo.seed)),
    }
}

/// Stands in for the effect renderer: reports what would be spawned.
#[derive(Default)]
struct LoggingEffects {
    live: usize,
}

impl EffectSink for LoggingEffects {
    fn activate(&mut self, index: usize, building: &Building, loadout: &Loadout) {
        self.live += 1;
        let kinds: Vec<String> = loadout.iter().map(|(_, effect)| effect.kind.to_string()).collect();
        tracing::debug!(index, id = %building.id, effects = ?kinds, live = self.live, "effects on");
    }

    fn deactivate(&mut self, index: usize) {
        self.live = self.live.saturating_sub(1);
        tracing::debug!(index, live = self.live, "effects off");
    }
}

/// Stands in for the full-detail building renderer.
#[derive(Default)]
struct LoggingDetail {
    shown: usize,
}

impl DetailedBuildings for LoggingDetail {
    fn show(&mut self, index: usize, building: &Building) {
        self.shown += 1;
        tracing::trace!(index, id = %building.id, "detail on");
    }

    fn hide(&mut self, index: usize) {
        self.shown = self.shown.saturating_sub(1);
        tracing::trace!(index, "detail off");
    }
}

pub struct App {
    config: AppConfig,
    renderer: Renderer,
    city: CityWorld,
    input: Input,
    time: Time,
    orbit: OrbitCamera,
    effects: LoggingEffects,
    detail: LoggingDetail,
    theme: usize,
    flight: bool,
    ready: bool,
    last_clicked: Option<String>,
    should_close: bool,
    stats_timer: f32,
}

impl App {
    pub fn new(config: AppConfig) -> Result<Self> {
        let palette = config.atlas.palette();
        let theme = THEMES.iter().position(|name| AtlasPalette::named(name).as_ref() == Some(&palette)).unwrap_or(0);
        let renderer = Renderer::new(&config.window, config.render, config.atlas.layout(), palette);
        let mut city = CityWorld::new(CitySettings::from_config(&config));
        city.replace_buildings(load_city(&config)?);
        let orbit = Self::initial_orbit(&city);
        Ok(Self {
            renderer,
            city,
            input: Input::from_config(BINDINGS_PATH),
            time: Time::new(),
            orbit,
            effects: LoggingEffects::default(),
            detail: LoggingDetail::default(),
            theme,
            flight: false,
            ready: false,
            last_clicked: None,
            should_close: false,
            stats_timer: 0.0,
            config,
        })
    }

    fn initial_orbit(city: &CityWorld) -> OrbitCamera {
        let (target, radius) = match city.instanced().bounds() {
            Some(bounds) => {
                let center = (bounds.min + bounds.max) * 0.5;
                let extent = (bounds.max - bounds.min).length();
                (Vec3::new(center.x, 0.0, center.z), (extent * 0.35).clamp(200.0, 4_000.0))
            }
            None => (Vec3::ZERO, 600.0),
        };
        OrbitCamera::new(target, radius)
    }

    fn camera(&self) -> Camera3D {
        self.orbit.to_camera(FOV_Y, NEAR_PLANE, FAR_PLANE)
    }

    fn handle_actions(&mut self) {
        if self.input.take_action(InputAction::FocusToggle) {
            let (primary, secondary) = self.city.focus_ids();
            let (primary, secondary) = (primary.map(str::to_owned), secondary.map(str::to_owned));
            let next = toggle(primary.as_deref(), self.last_clicked.as_deref());
            self.city.set_focus(next, secondary.as_deref());
            tracing::info!(focus = ?next, "primary focus");
        }
        if self.input.take_action(InputAction::CompareToggle) {
            let (primary, secondary) = self.city.focus_ids();
            let (primary, secondary) = (primary.map(str::to_owned), secondary.map(str::to_owned));
            let next = toggle(secondary.as_deref(), self.last_clicked.as_deref());
            self.city.set_focus(primary.as_deref(), next);
            tracing::info!(compare = ?next, "secondary focus");
        }
        if self.input.take_action(InputAction::ThemeCycle) {
            self.theme = (self.theme + 1) % THEMES.len();
            let palette = AtlasPalette::named(THEMES[self.theme]).unwrap_or_default();
            if let Err(err) = self.renderer.set_palette(palette) {
                tracing::warn!("Theme switch failed: {err:?}");
            }
            tracing::info!(theme = THEMES[self.theme], "theme changed");
        }
        if self.input.take_action(InputAction::FlightToggle) {
            self.flight = !self.flight;
            tracing::info!(flight = self.flight, "flight mode");
        }
        if self.input.take_action(InputAction::Reload) {
            match load_city(&self.config) {
                Ok(list) => self.city.replace_buildings(list),
                Err(err) => tracing::warn!("Reload failed: {err:?}"),
            }
        }
    }

    fn update_camera(&mut self, dt: f32) {
        let drag = self.input.take_drag_delta();
        if drag != Vec2::ZERO {
            self.orbit.orbit(-drag * ORBIT_SPEED);
        }
        if let Some(wheel) = self.input.take_wheel() {
            self.orbit.zoom(0.9_f32.powf(wheel));
        }
        let boost = if self.input.held(InputAction::Boost) { 4.0 } else { 1.0 };
        let axis = |pos: InputAction, neg: InputAction| {
            f32::from(u8::from(self.input.held(pos))) - f32::from(u8::from(self.input.held(neg)))
        };
        let forward = axis(InputAction::PanForward, InputAction::PanBackward);
        let right = axis(InputAction::PanRight, InputAction::PanLeft);
        let step = PAN_SPEED * boost * dt * (self.orbit.radius / 600.0).max(0.25);
        if forward != 0.0 || right != 0.0 {
            self.orbit.pan(forward * step, right * step);
        }
        if self.flight {
            self.orbit.pan(FLIGHT_SPEED * boost * dt, 0.0);
        }
    }

    fn handle_pointer(&mut self) {
        let camera = self.camera();
        let viewport = self.renderer.size();
        for input in self.input.drain_pointer() {
            match input.phase {
                PointerPhase::Down => {
                    if let Some(claim) = self.city.pointer_down(input.sample, &camera, viewport) {
                        tracing::debug!(name = %claim.name, "press claimed by foreground");
                    }
                }
                PointerPhase::Move => self.city.pointer_move(input.sample, &camera, viewport),
                PointerPhase::Up => {
                    if let Some(clicked) = self.city.pointer_up(input.sample) {
                        if let Some(building) = self.city.resolve(clicked) {
                            tracing::info!(id = %building.id, index = clicked.index, "building clicked");
                            self.last_clicked = Some(building.id.clone());
                        }
                    }
                }
                PointerPhase::Cancel => self.city.pointer_cancel(),
                PointerPhase::Left => self.city.pointer_left(),
            }
        }
        if let Some(window) = self.renderer.window() {
            let icon = if self.city.hovering() { winit::window::CursorIcon::Pointer } else { winit::window::CursorIcon::Default };
            window.set_cursor(icon);
        }
    }

    fn frame(&mut self) -> Result<()> {
        self.time.tick();
        let dt = self.time.delta_seconds();
        self.handle_actions();
        self.update_camera(dt);
        self.handle_pointer();

        let camera = self.camera();
        // Hold the rise wave until the first frame has actually been presented.
        self.city.frame(dt, camera.planar(), !self.ready, self.flight);
        self.city.dispatch_detail(&mut self.detail);
        self.city.dispatch_effects(&mut self.effects);
        for event in self.city.drain_events() {
            tracing::debug!(%event, "city event");
        }

        if self.renderer.recover_if_lost(&mut self.city, dt) != DeviceRecovery::Healthy {
            return Ok(());
        }
        match self.renderer.render_frame(&camera, &mut self.city) {
            Ok(()) => self.ready = true,
            Err(err) => tracing::warn!("Frame skipped: {err:?}"),
        }

        self.stats_timer += dt;
        if self.stats_timer >= 1.0 {
            self.stats_timer = 0.0;
            let stats = self.city.stats();
            tracing::debug!(
                draw_calls = stats.draw_calls,
                far = stats.far_instances,
                near = stats.near_buildings,
                effects = stats.active_effects,
                animating = stats.animating,
                "frame stats"
            );
        }
        Ok(())
    }
}

/// Clears `current` when it already holds `candidate`, otherwise switches to `candidate`.
fn toggle<'a>(current: Option<&str>, candidate: Option<&'a str>) -> Option<&'a str> {
    match (current, candidate) {
        (Some(current), Some(candidate)) if current.eq_ignore_ascii_case(candidate) => None,
        (_, candidate) => candidate,
    }
}

impl ApplicationHandler for App {
    fn resumed(&mut self, event_loop: &ActiveEventLoop) {
        if let Err(err) = self.renderer.ensure_window(event_loop) {
            tracing::error!("Renderer initialization error: {err:?}");
            self.should_close = true;
            return;
        }
        self.city.instanced_mut().mark_all_dirty();
    }

    fn window_event(&mut self, _el: &ActiveEventLoop, _id: winit::window::WindowId, event: WindowEvent) {
        self.input.handle_window_event(&event, self.city.now());
        match &event {
            WindowEvent::CloseRequested => self.should_close = true,
            WindowEvent::Resized(size) => self.renderer.resize(*size),
            WindowEvent::KeyboardInput {
                event: KeyEvent { logical_key: Key::Named(NamedKey::Escape), state: ElementState::Pressed, .. },
                ..
            } => self.should_close = true,
            WindowEvent::RedrawRequested => {
                if let Err(err) = self.frame() {
                    tracing::error!("Frame error: {err:?}");
                    self.should_close = true;
                }
            }
            _ => {}
        }
    }

    fn about_to_wait(&mut self, event_loop: &ActiveEventLoop) {
        if self.should_close {
            event_loop.exit();
            return;
        }
        if let Some(window) = self.renderer.window() {
            window.request_redraw();
        }
    }
}
