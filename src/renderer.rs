//! GPU presentation of the city: one instanced draw for the far field plus a draw per
//! near building, depth tested, over a fog-coloured clear.

mod building_pass;
mod window_surface;

pub use building_pass::{
    choose_atlas_source, dither_keep, dither_threshold, shader_source, AtlasSource, DrawPlan, DITHER_BAYER,
};
pub use window_surface::{SurfaceFrame, WindowSurface};

use anyhow::{Context, Result};
use winit::dpi::PhysicalSize;
use winit::event_loop::ActiveEventLoop;
use winit::window::Window;

use crate::atlas::{AtlasLayout, AtlasPalette};
use crate::camera3d::Camera3D;
use crate::city::CityWorld;
use crate::config::{RenderConfig, WindowConfig};

use building_pass::BuildingPass;

pub const DEPTH_FORMAT: wgpu::TextureFormat = wgpu::TextureFormat::Depth32Float;

/// Result of one device-loss check at the top of a frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeviceRecovery {
    Healthy,
    Recovered,
    /// Still lost; the frame is skipped and recreation is retried later.
    Waiting,
}

/// Spacing between device recreation attempts while the driver stays unavailable.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct RecoveryBackoff {
    failures: u32,
    wait: f32,
}

impl RecoveryBackoff {
    const BASE_DELAY: f32 = 0.25;
    const MAX_DELAY: f32 = 4.0;

    /// Counts `dt` down and reports whether an attempt may run now.
    pub fn ready(&mut self, dt: f32) -> bool {
        self.wait = (self.wait - dt.max(0.0)).max(0.0);
        self.wait <= 0.0
    }

    pub fn record_failure(&mut self) {
        self.failures = self.failures.saturating_add(1);
        let exponent = self.failures.saturating_sub(1).min(8) as i32;
        self.wait = (Self::BASE_DELAY * 2f32.powi(exponent)).min(Self::MAX_DELAY);
    }

    pub fn reset(&mut self) {
        *self = Self::default();
    }

    pub fn failures(&self) -> u32 {
        self.failures
    }
}

pub struct Renderer {
    surface: WindowSurface,
    buildings: BuildingPass,
    palette: AtlasPalette,
    fog_color: [f32; 3],
    near_scratch: Vec<usize>,
    recovery: RecoveryBackoff,
}

impl Renderer {
    pub fn new(window_cfg: &WindowConfig, render_cfg: RenderConfig, layout: AtlasLayout, palette: AtlasPalette) -> Self {
        Self {
            surface: WindowSurface::new(window_cfg),
            buildings: BuildingPass::new(render_cfg, layout),
            palette,
            fog_color: render_cfg.fog_color,
            near_scratch: Vec::new(),
            recovery: RecoveryBackoff::default(),
        }
    }

    pub fn ensure_window(&mut self, event_loop: &ActiveEventLoop) -> Result<()> {
        if self.surface.ensure_window(event_loop)? {
            self.init_pass()?;
        }
        Ok(())
    }

    fn init_pass(&mut self) -> Result<()> {
        let format = self.surface.surface_format()?;
        let (device, queue) = self.surface.device_and_queue()?;
        self.buildings.init_pipeline(device, queue, format, &self.palette)
    }

    pub fn window(&self) -> Option<&Window> {
        self.surface.window()
    }

    pub fn size(&self) -> PhysicalSize<u32> {
        self.surface.size()
    }

    pub fn aspect_ratio(&self) -> f32 {
        self.surface.aspect_ratio()
    }

    pub fn resize(&mut self, size: PhysicalSize<u32>) {
        self.surface.resize(size);
    }

    pub fn palette(&self) -> &AtlasPalette {
        &self.palette
    }

    pub fn atlas_source(&self) -> Option<AtlasSource> {
        self.buildings.atlas_source()
    }

    /// Switches the window palette, regenerating the atlas once a device exists.
    pub fn set_palette(&mut self, palette: AtlasPalette) -> Result<()> {
        self.palette = palette;
        if let Ok((device, queue)) = self.surface.device_and_queue() {
            self.buildings.set_palette(device, queue, &self.palette)?;
        }
        Ok(())
    }

    pub fn is_device_lost(&self) -> bool {
        self.surface.is_device_lost()
    }

    /// Rebuilds every GPU resource after a device loss and re-uploads the instance mirror.
    ///
    /// A failed attempt leaves the device flagged as lost and is retried with backoff on later
    /// frames; it never surfaces as an error.
    pub fn recover_if_lost(&mut self, city: &mut CityWorld, dt: f32) -> DeviceRecovery {
        if !self.surface.is_device_lost() {
            return DeviceRecovery::Healthy;
        }
        if !self.recovery.ready(dt) {
            return DeviceRecovery::Waiting;
        }
        tracing::warn!(attempt = self.recovery.failures() + 1, "recovering from GPU device loss");
        self.buildings.release();
        match self.surface.recreate_device().and_then(|()| self.init_pass()) {
            Ok(()) => {
                self.recovery.reset();
                city.instanced_mut().mark_all_dirty();
                DeviceRecovery::Recovered
            }
            Err(err) => {
                self.surface.mark_device_lost();
                self.recovery.record_failure();
                tracing::warn!(failures = self.recovery.failures(), "GPU recovery failed: {err:?}");
                DeviceRecovery::Waiting
            }
        }
    }

    /// Uploads pending instance changes and draws one frame.
    pub fn render_frame(&mut self, camera: &Camera3D, city: &mut CityWorld) -> Result<()> {
        if self.surface.is_device_lost() {
            return Ok(());
        }
        let size = self.surface.size();
        if size.width == 0 || size.height == 0 {
            return Ok(());
        }
        self.near_scratch.clear();
        self.near_scratch.extend_from_slice(city.near());
        let aspect = self.surface.aspect_ratio();
        {
            let (device, queue) = self.surface.device_and_queue()?;
            let mut instanced = city.instanced_mut();
            self.buildings.sync_instances(device, queue, &mut instanced, &self.near_scratch)?;
            self.buildings.write_scene(
                queue,
                camera.view_matrix(),
                camera.projection_matrix(aspect),
                camera.position,
                self.palette.face_linear(),
            )?;
        }

        let frame = self.surface.acquire_surface_frame()?;
        let (device, queue) = self.surface.device_and_queue()?;
        let depth_view = self.surface.depth_view().context("Depth view missing for building pass")?;
        let mut encoder =
            device.create_command_encoder(&wgpu::CommandEncoderDescriptor { label: Some("City Encoder") });
        {
            let [r, g, b] = self.fog_color;
            let mut pass = encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
                label: Some("City Pass"),
                color_attachments: &[Some(wgpu::RenderPassColorAttachment {
                    view: frame.view(),
                    depth_slice: None,
                    resolve_target: None,
                    ops: wgpu::Operations {
                        load: wgpu::LoadOp::Clear(wgpu::Color {
                            r: f64::from(r).powf(2.2),
                            g: f64::from(g).powf(2.2),
                            b: f64::from(b).powf(2.2),
                            a: 1.0,
                        }),
                        store: wgpu::StoreOp::Store,
                    },
                })],
                depth_stencil_attachment: Some(wgpu::RenderPassDepthStencilAttachment {
                    view: depth_view,
                    depth_ops: Some(wgpu::Operations { load: wgpu::LoadOp::Clear(1.0), store: wgpu::StoreOp::Store }),
                    stencil_ops: None,
                }),
                occlusion_query_set: None,
                timestamp_writes: None,
            });
            self.buildings.encode_pass(&mut pass)?;
        }
        queue.submit(std::iter::once(encoder.finish()));
        if let Some(window) = self.surface.window() {
            window.pre_present_notify();
        }
        frame.present();
        Ok(())
    }

    pub fn draw_plan(&self) -> &DrawPlan {
        self.buildings.plan()
    }
}
