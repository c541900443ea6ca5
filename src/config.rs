use anyhow::{Context, Result};
use serde::Deserialize;
use std::fs;
use std::path::{Path, PathBuf};

use crate::atlas::{AtlasLayout, AtlasPalette};
use crate::effects::EffectsConfig;
use crate::lod::LodConfig;
use crate::picking::PickingConfig;
use crate::rise::RiseConfig;

#[derive(Debug, Clone, Deserialize)]
pub struct WindowConfig {
    pub title: String,
    pub width: u32,
    pub height: u32,
    pub vsync: bool,
    pub fullscreen: bool,
}

#[derive(Debug, Clone, Deserialize)]
pub struct AtlasConfig {
    #[serde(default = "AtlasConfig::default_size")]
    pub size: u32,
    #[serde(default = "AtlasConfig::default_bands")]
    pub bands: u32,
    #[serde(default = "AtlasConfig::default_cell")]
    pub cell: u32,
    /// Preset name; ignored when `palette` is set.
    #[serde(default = "AtlasConfig::default_theme")]
    pub theme: String,
    #[serde(default)]
    pub palette: Option<AtlasPalette>,
}

#[derive(Debug, Clone, Copy, PartialEq, Deserialize)]
pub struct RenderConfig {
    #[serde(default = "RenderConfig::default_fog_near")]
    pub fog_near: f32,
    #[serde(default = "RenderConfig::default_fog_far")]
    pub fog_far: f32,
    #[serde(default = "RenderConfig::default_fog_color")]
    pub fog_color: [f32; 3],
    #[serde(default = "RenderConfig::default_roof_color")]
    pub roof_color: [f32; 3],
    #[serde(default = "RenderConfig::default_emissive")]
    pub emissive: f32,
    /// Fraction of a dimmed building's fragments that survive the dither.
    #[serde(default = "RenderConfig::default_dim_opacity")]
    pub dim_opacity: f32,
    #[serde(default = "RenderConfig::default_dim_emissive")]
    pub dim_emissive: f32,
    #[serde(default = "RenderConfig::default_tint_distance")]
    pub tint_distance: f32,
    #[serde(default = "RenderConfig::default_tint_blend")]
    pub tint_blend: f32,
}

#[derive(Debug, Clone, Deserialize)]
pub struct DemoConfig {
    #[serde(default = "DemoConfig::default_buildings")]
    pub buildings: usize,
    #[serde(default = "DemoConfig::default_seed")]
    pub seed: u64,
    /// JSON building list to load instead of generating one.
    #[serde(default)]
    pub city: Option<PathBuf>,
}

#[derive(Debug, Clone, Deserialize, Default)]
pub struct AppConfig {
    #[serde(default)]
    pub window: WindowConfig,
    #[serde(default)]
    pub atlas: AtlasConfig,
    #[serde(default)]
    pub lod: LodConfig,
    #[serde(default)]
    pub effects: EffectsConfig,
    #[serde(default)]
    pub picking: PickingConfig,
    #[serde(default)]
    pub rise: RiseConfig,
    #[serde(default)]
    pub render: RenderConfig,
    #[serde(default)]
    pub demo: DemoConfig,
}

#[derive(Debug, Clone, Default)]
pub struct AppConfigOverrides {
    pub width: Option<u32>,
    pub height: Option<u32>,
    pub vsync: Option<bool>,
    pub buildings: Option<usize>,
    pub seed: Option<u64>,
    pub city: Option<PathBuf>,
}

impl Default for WindowConfig {
    fn default() -> Self {
        Self { title: "Skyline".to_string(), width: 1280, height: 720, vsync: true, fullscreen: false }
    }
}

impl AtlasConfig {
    const fn default_size() -> u32 {
        2048
    }

    const fn default_bands() -> u32 {
        6
    }

    const fn default_cell() -> u32 {
        4
    }

    fn default_theme() -> String {
        "night".to_string()
    }

    pub fn layout(&self) -> AtlasLayout {
        let layout = AtlasLayout { size: self.size, bands: self.bands, cell: self.cell };
        if !layout.is_valid() {
            tracing::warn!(?layout, "atlas layout cannot hold a row of cells per band; buildings render flat");
        }
        layout
    }

    pub fn palette(&self) -> AtlasPalette {
        if let Some(palette) = &self.palette {
            return palette.clone();
        }
        AtlasPalette::named(&self.theme).unwrap_or_else(|| {
            tracing::warn!(theme = %self.theme, "unknown atlas theme; using night");
            AtlasPalette::night()
        })
    }
}

impl Default for AtlasConfig {
    fn default() -> Self {
        Self {
            size: Self::default_size(),
            bands: Self::default_bands(),
            cell: Self::default_cell(),
            theme: Self::default_theme(),
            palette: None,
        }
    }
}

impl RenderConfig {
    const fn default_fog_near() -> f32 {
        600.0
    }

    const fn default_fog_far() -> f32 {
        4_000.0
    }

    const fn default_fog_color() -> [f32; 3] {
        [0.03, 0.04, 0.08]
    }

    const fn default_roof_color() -> [f32; 3] {
        [0.12, 0.13, 0.18]
    }

    const fn default_emissive() -> f32 {
        1.4
    }

    const fn default_dim_opacity() -> f32 {
        0.3
    }

    const fn default_dim_emissive() -> f32 {
        0.25
    }

    const fn default_tint_distance() -> f32 {
        0.12
    }

    const fn default_tint_blend() -> f32 {
        0.85
    }
}

impl Default for RenderConfig {
    fn default() -> Self {
        Self {
            fog_near: Self::default_fog_near(),
            fog_far: Self::default_fog_far(),
            fog_color: Self::default_fog_color(),
            roof_color: Self::default_roof_color(),
            emissive: Self::default_emissive(),
            dim_opacity: Self::default_dim_opacity(),
            dim_emissive: Self::default_dim_emissive(),
            tint_distance: Self::default_tint_distance(),
            tint_blend: Self::default_tint_blend(),
        }
    }
}

impl DemoConfig {
    const fn default_buildings() -> usize {
        20_000
    }

    const fn default_seed() -> u64 {
        7
    }
}

impl Default for DemoConfig {
    fn default() -> Self {
        Self { buildings: Self::default_buildings(), seed: Self::default_seed(), city: None }
    }
}

impl AppConfig {
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let bytes =
            fs::read(path).with_context(|| format!("Failed to read config file {}", path.display()))?;
        let cfg = serde_json::from_slice(&bytes)
            .with_context(|| format!("Failed to parse config file {}", path.display()))?;
        Ok(cfg)
    }

    pub fn load_or_default(path: impl AsRef<Path>) -> Self {
        match Self::load(path) {
            Ok(cfg) => cfg,
            Err(err) => {
                tracing::warn!("Config load error: {err:?}. Falling back to defaults.");
                Self::default()
            }
        }
    }

    pub fn apply_overrides(&mut self, overrides: &AppConfigOverrides) {
        if let Some(width) = overrides.width {
            self.window.width = width;
        }
        if let Some(height) = overrides.height {
            self.window.height = height;
        }
        if let Some(vsync) = overrides.vsync {
            self.window.vsync = vsync;
        }
        if let Some(buildings) = overrides.buildings {
            self.demo.buildings = buildings;
        }
        if let Some(seed) = overrides.seed {
            self.demo.seed = seed;
        }
        if let Some(city) = &overrides.city {
            self.demo.city = Some(city.clone());
        }
    }
}

impl AppConfigOverrides {
    pub fn is_empty(&self) -> bool {
        self.applied_fields().is_empty()
    }

    pub fn applied_fields(&self) -> Vec<&'static str> {
        let mut fields = Vec::new();
        if self.width.is_some() {
            fields.push("width");
        }
        if self.height.is_some() {
            fields.push("height");
        }
        if self.vsync.is_some() {
            fields.push("vsync");
        }
        if self.buildings.is_some() {
            fields.push("buildings");
        }
        if self.seed.is_some() {
            fields.push("seed");
        }
        if self.city.is_some() {
            fields.push("city");
        }
        fields
    }
}
