use std::ops::Range;

use anyhow::{Context, Result};
use glam::Mat4;
use wgpu::util::DeviceExt;

use crate::atlas::{AtlasLayout, AtlasPalette, WindowAtlas};
use crate::config::RenderConfig;
use crate::instancing::{BuildingInstance, FocusUniform, InstancedBuildings};

use super::DEPTH_FORMAT;

/// 4x4 ordered-dither (Bayer) matrix, row-major.
pub const DITHER_BAYER: [u8; 16] = [0, 8, 2, 10, 12, 4, 14, 6, 3, 11, 1, 9, 15, 7, 13, 5];

const SHADER_TEMPLATE: &str = include_str!("../../assets/shaders/building_instanced.wgsl");
const DITHER_PLACEHOLDER: &str = "{{DITHER_TABLE}}";
const INSTANCE_SIZE: u64 = std::mem::size_of::<BuildingInstance>() as u64;

pub fn dither_threshold(x: u32, y: u32) -> f32 {
    (DITHER_BAYER[((y % 4) * 4 + x % 4) as usize] as f32 + 0.5) / 16.0
}

/// Whether a dimmed fragment at pixel (x, y) survives for the given opacity.
pub fn dither_keep(x: u32, y: u32, opacity: f32) -> bool {
    dither_threshold(x, y) < opacity
}

/// WGSL source with the dither table baked in from [`DITHER_BAYER`].
pub fn shader_source() -> String {
    let values: Vec<String> = (0..16u32).map(|i| format!("{:.5}", dither_threshold(i % 4, i / 4))).collect();
    let table = format!("array<f32, 16>({})", values.join(", "));
    SHADER_TEMPLATE.replace(DITHER_PLACEHOLDER, &table)
}

/// Draws for one frame: one instanced draw for every far building, one draw per near building.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct DrawPlan {
    pub instanced: Option<Range<u32>>,
    pub near: Vec<Range<u32>>,
}

impl DrawPlan {
    pub fn build(instance_count: usize, near_count: usize) -> Self {
        if instance_count == 0 {
            return Self::default();
        }
        let near = (0..near_count.min(instance_count) as u32).map(|i| i..i + 1).collect();
        Self { instanced: Some(0..instance_count as u32), near }
    }

    pub fn draw_calls(&self) -> usize {
        usize::from(self.instanced.is_some()) + self.near.len()
    }
}

/// Texture choice for the atlas binding.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AtlasSource {
    Generated,
    /// 1x1 face-colour texture; the shader skips sampling.
    Flat,
}

pub fn choose_atlas_source(layout: &AtlasLayout, max_dimension: u32) -> AtlasSource {
    if !layout.is_valid() || layout.size > max_dimension {
        AtlasSource::Flat
    } else {
        AtlasSource::Generated
    }
}

#[repr(C)]
#[derive(Clone, Copy, Debug, bytemuck::Pod, bytemuck::Zeroable)]
struct SceneUniform {
    view_proj: [[f32; 4]; 4],
    view: [[f32; 4]; 4],
    camera: [f32; 4],
    fog_color: [f32; 4],
    fog: [f32; 4],
    face: [f32; 4],
    roof: [f32; 4],
    dim: [f32; 4],
    focus: [i32; 4],
}

#[repr(C)]
#[derive(Clone, Copy, bytemuck::Pod, bytemuck::Zeroable)]
struct CubeVertex {
    position: [f32; 3],
    normal: [f32; 3],
    uv: [f32; 2],
}

/// Unit box with its base on y = 0; uv runs across each face with v = 0 at the top.
fn cube_geometry() -> (Vec<CubeVertex>, Vec<u16>) {
    let faces: [([f32; 3], [f32; 3], [f32; 3]); 5] = [
        // normal, right, up
        ([0.0, 0.0, 1.0], [1.0, 0.0, 0.0], [0.0, 1.0, 0.0]),
        ([0.0, 0.0, -1.0], [-1.0, 0.0, 0.0], [0.0, 1.0, 0.0]),
        ([1.0, 0.0, 0.0], [0.0, 0.0, -1.0], [0.0, 1.0, 0.0]),
        ([-1.0, 0.0, 0.0], [0.0, 0.0, 1.0], [0.0, 1.0, 0.0]),
        ([0.0, 1.0, 0.0], [1.0, 0.0, 0.0], [0.0, 0.0, -1.0]),
    ];
    let mut vertices = Vec::with_capacity(faces.len() * 4);
    let mut indices = Vec::with_capacity(faces.len() * 6);
    for (normal, right, up) in faces {
        let base = vertices.len() as u16;
        let center = [normal[0] * 0.5, 0.5 + normal[1] * 0.5, normal[2] * 0.5];
        for (u, v) in [(0.0f32, 1.0f32), (1.0, 1.0), (1.0, 0.0), (0.0, 0.0)] {
            let su = u - 0.5;
            let sv = 0.5 - v;
            let position = [
                center[0] + right[0] * su + up[0] * sv,
                center[1] + right[1] * su + up[1] * sv,
                center[2] + right[2] * su + up[2] * sv,
            ];
            vertices.push(CubeVertex { position, normal, uv: [u, v] });
        }
        indices.extend_from_slice(&[base, base + 1, base + 2, base, base + 2, base + 3]);
    }
    (vertices, indices)
}

struct AtlasBinding {
    texture: wgpu::Texture,
    bind_group: wgpu::BindGroup,
    source: AtlasSource,
    palette: AtlasPalette,
}

/// GPU side of the instanced building draw.
pub struct BuildingPass {
    settings: RenderConfig,
    layout: AtlasLayout,
    pipeline: Option<wgpu::RenderPipeline>,
    vertex_buffer: Option<wgpu::Buffer>,
    index_buffer: Option<wgpu::Buffer>,
    index_count: u32,
    scene_buf: Option<wgpu::Buffer>,
    scene_bg: Option<wgpu::BindGroup>,
    texture_bgl: Option<wgpu::BindGroupLayout>,
    sampler: Option<wgpu::Sampler>,
    atlas: Option<AtlasBinding>,
    instance_buffer: Option<wgpu::Buffer>,
    instance_capacity: usize,
    uploaded_generation: Option<u64>,
    near_buffer: Option<wgpu::Buffer>,
    near_capacity: usize,
    near_scratch: Vec<BuildingInstance>,
    focus: FocusUniform,
    plan: DrawPlan,
}

impl BuildingPass {
    pub fn new(settings: RenderConfig, layout: AtlasLayout) -> Self {
        Self {
            settings,
            layout,
            pipeline: None,
            vertex_buffer: None,
            index_buffer: None,
            index_count: 0,
            scene_buf: None,
            scene_bg: None,
            texture_bgl: None,
            sampler: None,
            atlas: None,
            instance_buffer: None,
            instance_capacity: 0,
            uploaded_generation: None,
            near_buffer: None,
            near_capacity: 0,
            near_scratch: Vec::new(),
            focus: FocusUniform::default(),
            plan: DrawPlan::default(),
        }
    }

    pub fn init_pipeline(
        &mut self,
        device: &wgpu::Device,
        queue: &wgpu::Queue,
        surface_format: wgpu::TextureFormat,
        palette: &AtlasPalette,
    ) -> Result<()> {
        let shader = device.create_shader_module(wgpu::ShaderModuleDescriptor {
            label: Some("Building Shader"),
            source: wgpu::ShaderSource::Wgsl(shader_source().into()),
        });

        let scene_bgl = device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            label: Some("Building Scene BGL"),
            entries: &[wgpu::BindGroupLayoutEntry {
                binding: 0,
                visibility: wgpu::ShaderStages::VERTEX | wgpu::ShaderStages::FRAGMENT,
                ty: wgpu::BindingType::Buffer {
                    ty: wgpu::BufferBindingType::Uniform,
                    has_dynamic_offset: false,
                    min_binding_size: None,
                },
                count: None,
            }],
        });
        let scene_buf = device.create_buffer(&wgpu::BufferDescriptor {
            label: Some("Building Scene Buffer"),
            size: std::mem::size_of::<SceneUniform>() as u64,
            usage: wgpu::BufferUsages::UNIFORM | wgpu::BufferUsages::COPY_DST,
            mapped_at_creation: false,
        });
        let scene_bg = device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some("Building Scene BG"),
            layout: &scene_bgl,
            entries: &[wgpu::BindGroupEntry { binding: 0, resource: scene_buf.as_entire_binding() }],
        });

        let texture_bgl = device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            label: Some("Building Atlas BGL"),
            entries: &[
                wgpu::BindGroupLayoutEntry {
                    binding: 0,
                    visibility: wgpu::ShaderStages::FRAGMENT,
                    ty: wgpu::BindingType::Texture {
                        multisampled: false,
                        view_dimension: wgpu::TextureViewDimension::D2,
                        sample_type: wgpu::TextureSampleType::Float { filterable: true },
                    },
                    count: None,
                },
                wgpu::BindGroupLayoutEntry {
                    binding: 1,
                    visibility: wgpu::ShaderStages::FRAGMENT,
                    ty: wgpu::BindingType::Sampler(wgpu::SamplerBindingType::Filtering),
                    count: None,
                },
            ],
        });
        let sampler = device.create_sampler(&wgpu::SamplerDescriptor {
            label: Some("Building Atlas Sampler"),
            address_mode_u: wgpu::AddressMode::ClampToEdge,
            address_mode_v: wgpu::AddressMode::ClampToEdge,
            mag_filter: wgpu::FilterMode::Nearest,
            min_filter: wgpu::FilterMode::Linear,
            ..Default::default()
        });

        let (vertices, indices) = cube_geometry();
        let vertex_buffer = device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
            label: Some("Building VB"),
            contents: bytemuck::cast_slice(&vertices),
            usage: wgpu::BufferUsages::VERTEX,
        });
        let index_buffer = device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
            label: Some("Building IB"),
            contents: bytemuck::cast_slice(&indices),
            usage: wgpu::BufferUsages::INDEX,
        });

        let pipeline_layout = device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
            label: Some("Building Pipeline Layout"),
            bind_group_layouts: &[&scene_bgl, &texture_bgl],
            push_constant_ranges: &[],
        });

        let pipeline = device.create_render_pipeline(&wgpu::RenderPipelineDescriptor {
            label: Some("Building Pipeline"),
            layout: Some(&pipeline_layout),
            vertex: wgpu::VertexState {
                module: &shader,
                entry_point: Some("vs_main"),
                buffers: &[
                    wgpu::VertexBufferLayout {
                        array_stride: std::mem::size_of::<CubeVertex>() as u64,
                        step_mode: wgpu::VertexStepMode::Vertex,
                        attributes: &[
                            wgpu::VertexAttribute {
                                shader_location: 0,
                                format: wgpu::VertexFormat::Float32x3,
                                offset: 0,
                            },
                            wgpu::VertexAttribute {
                                shader_location: 1,
                                format: wgpu::VertexFormat::Float32x3,
                                offset: 12,
                            },
                            wgpu::VertexAttribute {
                                shader_location: 2,
                                format: wgpu::VertexFormat::Float32x2,
                                offset: 24,
                            },
                        ],
                    },
                    wgpu::VertexBufferLayout {
                        array_stride: INSTANCE_SIZE,
                        step_mode: wgpu::VertexStepMode::Instance,
                        attributes: &[
                            wgpu::VertexAttribute {
                                shader_location: 3,
                                format: wgpu::VertexFormat::Float32x4,
                                offset: 0,
                            },
                            wgpu::VertexAttribute {
                                shader_location: 4,
                                format: wgpu::VertexFormat::Float32x3,
                                offset: 16,
                            },
                            wgpu::VertexAttribute {
                                shader_location: 5,
                                format: wgpu::VertexFormat::Uint32,
                                offset: 28,
                            },
                            wgpu::VertexAttribute {
                                shader_location: 6,
                                format: wgpu::VertexFormat::Float32x4,
                                offset: 32,
                            },
                            wgpu::VertexAttribute {
                                shader_location: 7,
                                format: wgpu::VertexFormat::Float32x4,
                                offset: 48,
                            },
                            wgpu::VertexAttribute {
                                shader_location: 8,
                                format: wgpu::VertexFormat::Float32x4,
                                offset: 64,
                            },
                        ],
                    },
                ],
                compilation_options: wgpu::PipelineCompilationOptions::default(),
            },
            fragment: Some(wgpu::FragmentState {
                module: &shader,
                entry_point: Some("fs_main"),
                targets: &[Some(wgpu::ColorTargetState {
                    format: surface_format,
                    // Dimming uses dithered discard, so the pass stays opaque.
                    blend: Some(wgpu::BlendState::REPLACE),
                    write_mask: wgpu::ColorWrites::ALL,
                })],
                compilation_options: wgpu::PipelineCompilationOptions::default(),
            }),
            primitive: wgpu::PrimitiveState {
                topology: wgpu::PrimitiveTopology::TriangleList,
                cull_mode: Some(wgpu::Face::Back),
                ..Default::default()
            },
            depth_stencil: Some(wgpu::DepthStencilState {
                format: DEPTH_FORMAT,
                depth_write_enabled: true,
                depth_compare: wgpu::CompareFunction::LessEqual,
                stencil: wgpu::StencilState::default(),
                bias: wgpu::DepthBiasState::default(),
            }),
            multisample: wgpu::MultisampleState::default(),
            multiview: None,
            cache: None,
        });

        self.pipeline = Some(pipeline);
        self.vertex_buffer = Some(vertex_buffer);
        self.index_buffer = Some(index_buffer);
        self.index_count = indices.len() as u32;
        self.scene_buf = Some(scene_buf);
        self.scene_bg = Some(scene_bg);
        self.texture_bgl = Some(texture_bgl);
        self.sampler = Some(sampler);
        self.atlas = None;
        self.instance_buffer = None;
        self.instance_capacity = 0;
        self.uploaded_generation = None;
        self.near_buffer = None;
        self.near_capacity = 0;
        self.upload_atlas(device, queue, palette)
    }

    pub fn atlas_source(&self) -> Option<AtlasSource> {
        self.atlas.as_ref().map(|atlas| atlas.source)
    }

    /// Regenerates the atlas when the palette differs from the bound one.
    pub fn set_palette(&mut self, device: &wgpu::Device, queue: &wgpu::Queue, palette: &AtlasPalette) -> Result<()> {
        if self.atlas.as_ref().is_some_and(|atlas| atlas.palette == *palette) {
            return Ok(());
        }
        self.upload_atlas(device, queue, palette)
    }

    fn upload_atlas(&mut self, device: &wgpu::Device, queue: &wgpu::Queue, palette: &AtlasPalette) -> Result<()> {
        let max_dimension = device.limits().max_texture_dimension_2d;
        let generated = match choose_atlas_source(&self.layout, max_dimension) {
            AtlasSource::Generated => match WindowAtlas::generate(self.layout, palette) {
                Ok(atlas) => Some(atlas),
                Err(err) => {
                    tracing::warn!("Window atlas generation failed: {err:?}. Using flat facades.");
                    None
                }
            },
            AtlasSource::Flat => {
                tracing::warn!(size = self.layout.size, max_dimension, "atlas exceeds device limits; using flat facades");
                None
            }
        };
        let flat = [palette.face[0], palette.face[1], palette.face[2], 255];
        let (size, rgba, source) = match &generated {
            Some(atlas) => (atlas.layout().size, atlas.rgba(), AtlasSource::Generated),
            None => (1, &flat[..], AtlasSource::Flat),
        };

        let texture = device.create_texture(&wgpu::TextureDescriptor {
            label: Some("Window Atlas"),
            size: wgpu::Extent3d { width: size, height: size, depth_or_array_layers: 1 },
            mip_level_count: 1,
            sample_count: 1,
            dimension: wgpu::TextureDimension::D2,
            format: wgpu::TextureFormat::Rgba8Unorm,
            usage: wgpu::TextureUsages::TEXTURE_BINDING | wgpu::TextureUsages::COPY_DST,
            view_formats: &[],
        });
        queue.write_texture(
            wgpu::TexelCopyTextureInfo {
                texture: &texture,
                mip_level: 0,
                origin: wgpu::Origin3d::ZERO,
                aspect: wgpu::TextureAspect::All,
            },
            rgba,
            wgpu::TexelCopyBufferLayout { offset: 0, bytes_per_row: Some(4 * size), rows_per_image: Some(size) },
            wgpu::Extent3d { width: size, height: size, depth_or_array_layers: 1 },
        );
        let view = texture.create_view(&wgpu::TextureViewDescriptor::default());
        let layout = self.texture_bgl.as_ref().context("Building atlas bind group layout missing")?;
        let sampler = self.sampler.as_ref().context("Building atlas sampler missing")?;
        let bind_group = device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some("Building Atlas BG"),
            layout,
            entries: &[
                wgpu::BindGroupEntry { binding: 0, resource: wgpu::BindingResource::TextureView(&view) },
                wgpu::BindGroupEntry { binding: 1, resource: wgpu::BindingResource::Sampler(sampler) },
            ],
        });
        if let Some(previous) = self.atlas.take() {
            previous.texture.destroy();
        }
        tracing::info!(size, ?source, "window atlas uploaded");
        self.atlas = Some(AtlasBinding { texture, bind_group, source, palette: palette.clone() });
        Ok(())
    }

    pub fn write_scene(&self, queue: &wgpu::Queue, view: Mat4, proj: Mat4, camera: glam::Vec3, face: [f32; 3]) -> Result<()> {
        let scene_buf = self.scene_buf.as_ref().context("Building scene buffer missing")?;
        let s = &self.settings;
        let atlas_enabled = matches!(self.atlas_source(), Some(AtlasSource::Generated));
        let uniform = SceneUniform {
            view_proj: (proj * view).to_cols_array_2d(),
            view: view.to_cols_array_2d(),
            camera: camera.extend(0.0).to_array(),
            fog_color: [s.fog_color[0], s.fog_color[1], s.fog_color[2], 1.0],
            fog: [s.fog_near, s.fog_far, s.emissive, s.dim_emissive],
            face: [face[0], face[1], face[2], s.tint_distance],
            roof: [s.roof_color[0], s.roof_color[1], s.roof_color[2], s.tint_blend],
            dim: [s.dim_opacity, if atlas_enabled { 1.0 } else { 0.0 }, 0.0, 0.0],
            focus: [self.focus.primary, self.focus.secondary, 0, 0],
        };
        queue.write_buffer(scene_buf, 0, bytemuck::bytes_of(&uniform));
        Ok(())
    }

    /// Uploads whatever changed in the CPU mirror and prepares this frame's draw plan.
    pub fn sync_instances(
        &mut self,
        device: &wgpu::Device,
        queue: &wgpu::Queue,
        instanced: &mut InstancedBuildings,
        near: &[usize],
    ) -> Result<()> {
        if let Some(focus) = instanced.take_focus_dirty() {
            self.focus = focus;
        }
        let dirty = instanced.take_dirty();
        let generation = instanced.generation();
        let instances = instanced.instances();
        let reallocated = Self::ensure_capacity(
            device,
            &mut self.instance_buffer,
            &mut self.instance_capacity,
            instances.len(),
            "Building Instance Buffer",
        );
        let full = reallocated || self.uploaded_generation != Some(generation);
        let buffer = self.instance_buffer.as_ref().context("Building instance buffer missing")?;
        if full {
            if !instances.is_empty() {
                queue.write_buffer(buffer, 0, bytemuck::cast_slice(instances));
            }
            self.uploaded_generation = Some(generation);
        } else if let Some(range) = dirty {
            let range = range.start.min(instances.len())..range.end.min(instances.len());
            if !range.is_empty() {
                queue.write_buffer(buffer, range.start as u64 * INSTANCE_SIZE, bytemuck::cast_slice(&instances[range]));
            }
        }

        self.near_scratch.clear();
        for &index in near {
            if let Some(instance) = instances.get(index) {
                let mut detailed = *instance;
                detailed.placement[3] = 1.0;
                self.near_scratch.push(detailed);
            }
        }
        Self::ensure_capacity(device, &mut self.near_buffer, &mut self.near_capacity, self.near_scratch.len(), "Building Near Buffer");
        if !self.near_scratch.is_empty() {
            let near_buffer = self.near_buffer.as_ref().context("Building near buffer missing")?;
            queue.write_buffer(near_buffer, 0, bytemuck::cast_slice(&self.near_scratch));
        }
        self.plan = DrawPlan::build(instances.len(), self.near_scratch.len());
        Ok(())
    }

    pub fn plan(&self) -> &DrawPlan {
        &self.plan
    }

    pub fn encode_pass(&self, pass: &mut wgpu::RenderPass<'_>) -> Result<()> {
        let Some(far) = self.plan.instanced.clone() else {
            return Ok(());
        };
        pass.set_pipeline(self.pipeline.as_ref().context("Building pipeline missing")?);
        pass.set_bind_group(0, self.scene_bg.as_ref().context("Building scene bind group missing")?, &[]);
        let atlas = self.atlas.as_ref().context("Building atlas missing")?;
        pass.set_bind_group(1, &atlas.bind_group, &[]);
        pass.set_vertex_buffer(0, self.vertex_buffer.as_ref().context("Building vertex buffer missing")?.slice(..));
        pass.set_index_buffer(
            self.index_buffer.as_ref().context("Building index buffer missing")?.slice(..),
            wgpu::IndexFormat::Uint16,
        );
        let instances = self.instance_buffer.as_ref().context("Building instance buffer missing")?;
        pass.set_vertex_buffer(1, instances.slice(..));
        pass.draw_indexed(0..self.index_count, 0, far);
        if !self.plan.near.is_empty() {
            let near = self.near_buffer.as_ref().context("Building near buffer missing")?;
            pass.set_vertex_buffer(1, near.slice(..));
            for range in &self.plan.near {
                pass.draw_indexed(0..self.index_count, 0, range.clone());
            }
        }
        Ok(())
    }

    /// Grows `buffer` by doubling from 256 instances. Returns true when it was reallocated.
    fn ensure_capacity(
        device: &wgpu::Device,
        buffer: &mut Option<wgpu::Buffer>,
        capacity: &mut usize,
        count: usize,
        label: &'static str,
    ) -> bool {
        let required = count.max(1);
        if *capacity >= required && buffer.is_some() {
            return false;
        }
        let mut new_cap = (*capacity).max(256);
        while new_cap < required {
            new_cap *= 2;
        }
        if let Some(old) = buffer.take() {
            old.destroy();
        }
        *buffer = Some(device.create_buffer(&wgpu::BufferDescriptor {
            label: Some(label),
            size: new_cap as u64 * INSTANCE_SIZE,
            usage: wgpu::BufferUsages::VERTEX | wgpu::BufferUsages::COPY_DST,
            mapped_at_creation: false,
        }));
        *capacity = new_cap;
        true
    }

    /// Frees GPU memory; the pass must be re-initialised before drawing again.
    pub fn release(&mut self) {
        if let Some(atlas) = self.atlas.take() {
            atlas.texture.destroy();
        }
        for buffer in [self.instance_buffer.take(), self.near_buffer.take()].into_iter().flatten() {
            buffer.destroy();
        }
        self.pipeline = None;
        self.vertex_buffer = None;
        self.index_buffer = None;
        self.scene_buf = None;
        self.scene_bg = None;
        self.instance_capacity = 0;
        self.near_capacity = 0;
        self.uploaded_generation = None;
        self.plan = DrawPlan::default();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn dither_keeps_fraction_matching_opacity() {
        let kept = |opacity: f32| (0..4).flat_map(|y| (0..4).map(move |x| (x, y))).filter(|&(x, y)| dither_keep(x, y, opacity)).count();
        assert_eq!(kept(0.0), 0);
        assert_eq!(kept(0.3), 5);
        assert_eq!(kept(0.5), 8);
        assert_eq!(kept(1.0), 16);
    }

    #[test]
    fn dither_mask_tiles_every_four_pixels() {
        for y in 0..4 {
            for x in 0..4 {
                assert_eq!(dither_keep(x, y, 0.3), dither_keep(x + 4, y + 8, 0.3));
            }
        }
        assert!(dither_keep(0, 0, 0.3));
        assert!(!dither_keep(1, 0, 0.3));
    }

    #[test]
    fn shader_source_embeds_dither_table() {
        let source = shader_source();
        assert!(!source.contains(DITHER_PLACEHOLDER));
        assert!(source.contains("array<f32, 16>(0.03125, 0.53125, 0.15625"));
    }

    #[test]
    fn empty_list_plans_no_draws() {
        let plan = DrawPlan::build(0, 3);
        assert_eq!(plan.draw_calls(), 0);
        assert!(plan.instanced.is_none());
        let plan = DrawPlan::build(100, 2);
        assert_eq!(plan.draw_calls(), 3);
        assert_eq!(plan.near, vec![0..1, 1..2]);
    }

    #[test]
    fn oversize_atlas_falls_back_to_flat() {
        let layout = AtlasLayout::default();
        assert_eq!(choose_atlas_source(&layout, 8192), AtlasSource::Generated);
        assert_eq!(choose_atlas_source(&layout, 1024), AtlasSource::Flat);
        let no_cells = AtlasLayout { cell: 0, ..layout };
        assert_eq!(choose_atlas_source(&no_cells, 8192), AtlasSource::Flat);
    }

    #[test]
    fn cube_has_five_faces_with_ground_base() {
        let (vertices, indices) = cube_geometry();
        assert_eq!(vertices.len(), 20);
        assert_eq!(indices.len(), 30);
        let min_y = vertices.iter().map(|v| v.position[1]).fold(f32::INFINITY, f32::min);
        let max_y = vertices.iter().map(|v| v.position[1]).fold(f32::NEG_INFINITY, f32::max);
        assert_eq!((min_y, max_y), (0.0, 1.0));
    }
}
