//! Shared window-pattern atlas.
//!
//! The atlas is a square RGBA8 image split into horizontal luminosity bands. Every band is a
//! grid of window cells lit with a per-cell seeded generator, so a building that samples the
//! same band at the same offset always sees the same windows. Buildings pick their band from
//! their lit density and their offset from a hash of their identifier.

use anyhow::{bail, Result};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::Deserialize;

use crate::building::{normalize_id, Building};

pub type Rgb8 = [u8; 3];

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct AtlasPalette {
    pub lit: Vec<Rgb8>,
    pub off: Rgb8,
    pub face: Rgb8,
}

impl Default for AtlasPalette {
    fn default() -> Self {
        Self::night()
    }
}

impl AtlasPalette {
    pub fn night() -> Self {
        Self { lit: vec![[255, 214, 140], [255, 236, 190], [170, 210, 255]], off: [22, 26, 38], face: [44, 48, 62] }
    }

    pub fn dusk() -> Self {
        Self { lit: vec![[255, 190, 120], [255, 160, 110]], off: [58, 46, 60], face: [92, 74, 88] }
    }

    pub fn day() -> Self {
        Self { lit: vec![[210, 228, 240], [190, 215, 235]], off: [120, 140, 160], face: [176, 178, 184] }
    }

    pub fn named(name: &str) -> Option<Self> {
        match name.to_ascii_lowercase().as_str() {
            "night" => Some(Self::night()),
            "dusk" => Some(Self::dusk()),
            "day" => Some(Self::day()),
            _ => None,
        }
    }

    pub fn face_linear(&self) -> [f32; 3] {
        self.face.map(|c| c as f32 / 255.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
pub struct AtlasLayout {
    pub size: u32,
    pub bands: u32,
    pub cell: u32,
}

impl Default for AtlasLayout {
    fn default() -> Self {
        Self { size: 2048, bands: 6, cell: 4 }
    }
}

/// Offset + scale of a rectangular atlas region in normalized UV space.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct UvRect {
    pub offset: [f32; 2],
    pub scale: [f32; 2],
}

impl UvRect {
    pub fn to_array(self) -> [f32; 4] {
        [self.offset[0], self.offset[1], self.scale[0], self.scale[1]]
    }
}

impl AtlasLayout {
    /// True when every band holds at least one row of framed cells.
    pub fn is_valid(&self) -> bool {
        self.cell >= 3
            && self.bands > 0
            && self.cell.checked_mul(self.bands).is_some_and(|needed| self.size >= needed)
    }

    pub fn columns(&self) -> u32 {
        self.size / self.cell.max(1)
    }

    pub fn rows_per_band(&self) -> u32 {
        self.columns() / self.bands.max(1)
    }

    pub fn band_height_px(&self) -> u32 {
        self.rows_per_band() * self.cell
    }

    pub fn band_for_density(&self, density: f32) -> u32 {
        let top = self.bands.saturating_sub(1) as f32;
        (density.clamp(0.0, 1.0) * top).round() as u32
    }

    /// Chance that a cell in `band` is lit. Band 0 is nearly dark, the top band nearly full.
    pub fn band_lit_probability(&self, band: u32) -> f32 {
        let top = self.bands.saturating_sub(1).max(1) as f32;
        0.04 + 0.9 * (band.min(self.bands.saturating_sub(1)) as f32 / top)
    }

    /// UV window for a `windows` x `floors` block starting at the hashed offset.
    /// An unusable layout yields a zero-scale rect, which samples as flat face colour.
    pub fn face_uv(&self, band: u32, hash: u32, windows: u32, floors: u32) -> UvRect {
        if !self.is_valid() {
            return UvRect::default();
        }
        let columns = self.columns();
        let rows = self.rows_per_band();
        let windows = windows.clamp(1, columns);
        let floors = floors.clamp(1, rows.max(1));
        let column_offset = hash % (columns - windows + 1);
        let row_offset = (hash / columns) % (rows - floors + 1);
        let size = self.size as f32;
        let cell = self.cell as f32;
        let band_top = (band * self.band_height_px()) as f32;
        UvRect {
            offset: [column_offset as f32 * cell / size, (band_top + row_offset as f32 * cell) / size],
            scale: [windows as f32 * cell / size, floors as f32 * cell / size],
        }
    }

    /// Front and side atlas windows for a building.
    pub fn building_uvs(&self, building: &Building) -> (UvRect, UvRect) {
        let hash = identifier_hash(&building.id);
        let band = self.band_for_density(building.lit_density);
        let front = self.face_uv(band, hash, building.windows_front, building.floors);
        let side = self.face_uv(band, hash.rotate_left(16), building.windows_side, building.floors);
        (front, side)
    }
}

/// Multiplicative string hash over the lower-cased identifier.
pub fn identifier_hash(id: &str) -> u32 {
    normalize_id(id).bytes().fold(0u32, |h, b| h.wrapping_mul(31).wrapping_add(b as u32))
}

fn cell_seed(band: u32, row: u32, column: u32) -> u64 {
    ((band as u64) << 32) | ((row as u64) << 16) | column as u64
}

pub struct WindowAtlas {
    layout: AtlasLayout,
    palette: AtlasPalette,
    pixels: Vec<u8>,
}

impl WindowAtlas {
    pub fn generate(layout: AtlasLayout, palette: &AtlasPalette) -> Result<Self> {
        if palette.lit.is_empty() {
            bail!("Atlas palette needs at least one lit window colour");
        }
        if !layout.is_valid() {
            bail!("Atlas layout {layout:?} cannot hold one row of cells per band");
        }
        let size = layout.size as usize;
        let mut pixels = vec![0u8; size * size * 4];
        for px in pixels.chunks_exact_mut(4) {
            px.copy_from_slice(&[palette.face[0], palette.face[1], palette.face[2], 255]);
        }
        let cell = layout.cell as usize;
        for band in 0..layout.bands {
            let lit_chance = layout.band_lit_probability(band);
            let band_top = (band * layout.band_height_px()) as usize;
            for row in 0..layout.rows_per_band() {
                for column in 0..layout.columns() {
                    let mut rng = StdRng::seed_from_u64(cell_seed(band, row, column));
                    let color = if rng.gen::<f32>() < lit_chance {
                        let base = palette.lit[rng.gen_range(0..palette.lit.len())];
                        let dim = rng.gen_range(0.75f32..=1.0);
                        base.map(|c| (c as f32 * dim).round() as u8)
                    } else {
                        palette.off
                    };
                    let x0 = column as usize * cell;
                    let y0 = band_top + row as usize * cell;
                    // 1px face-coloured frame on the left and top/bottom rows of the cell.
                    for y in (y0 + 1)..(y0 + cell - 1) {
                        for x in (x0 + 1)..(x0 + cell) {
                            let i = (y * size + x) * 4;
                            pixels[i..i + 3].copy_from_slice(&color);
                        }
                    }
                }
            }
        }
        tracing::debug!(size = layout.size, bands = layout.bands, "generated window atlas");
        Ok(Self { layout, palette: palette.clone(), pixels })
    }

    pub fn layout(&self) -> AtlasLayout {
        self.layout
    }

    pub fn palette(&self) -> &AtlasPalette {
        &self.palette
    }

    pub fn rgba(&self) -> &[u8] {
        &self.pixels
    }

    pub fn pixel(&self, x: u32, y: u32) -> [u8; 4] {
        let i = ((y * self.layout.size + x) * 4) as usize;
        [self.pixels[i], self.pixels[i + 1], self.pixels[i + 2], self.pixels[i + 3]]
    }

    /// Fraction of lit cells in a band, measured on the generated image.
    pub fn band_lit_fraction(&self, band: u32) -> f32 {
        let cell = self.layout.cell;
        let top = band * self.layout.band_height_px();
        let mut lit = 0usize;
        let mut total = 0usize;
        for row in 0..self.layout.rows_per_band() {
            for column in 0..self.layout.columns() {
                let px = self.pixel(column * cell + 1, top + row * cell + 1);
                if px[..3] != self.palette.off {
                    lit += 1;
                }
                total += 1;
            }
        }
        lit as f32 / total.max(1) as f32
    }
}
