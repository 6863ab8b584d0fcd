//! The five render stages: visibility, shading, accumulate, copy and UI.
//!
//! Every stage binds the slot's frame constants at set 0, binding 0 and
//! keeps one bind group per frame slot so that a frame only ever touches
//! resources of its own slot, plus the accumulation target of the slot
//! rendered before it.

use anyhow::{Context, Result};
use orchestrator::TargetRole;
use wgpu::naga::ShaderStage;

use crate::compile::{ShaderCompiler, ShaderRequest};
use crate::hud::{clamp_scissor, UiDrawList, UiVertex};
use crate::lights::{LightBuffers, LightTextures};
use crate::scene::SceneGeometry;
use crate::tables::NoiseTable;
use crate::targets::{accumulation_source, RenderPassLayout, RenderTargets};
use crate::uniforms::ConstantBuffers;

const UI_VERTEX_CAPACITY: usize = 1024;
const UI_INDEX_CAPACITY: usize = UI_VERTEX_CAPACITY * 3 / 2;

fn uniform_entry(binding: u32) -> wgpu::BindGroupLayoutEntry {
    wgpu::BindGroupLayoutEntry {
        binding,
        visibility: wgpu::ShaderStages::VERTEX_FRAGMENT,
        ty: wgpu::BindingType::Buffer {
            ty: wgpu::BufferBindingType::Uniform,
            has_dynamic_offset: false,
            min_binding_size: None,
        },
        count: None,
    }
}

fn storage_entry(binding: u32) -> wgpu::BindGroupLayoutEntry {
    wgpu::BindGroupLayoutEntry {
        binding,
        visibility: wgpu::ShaderStages::FRAGMENT,
        ty: wgpu::BindingType::Buffer {
            ty: wgpu::BufferBindingType::Storage { read_only: true },
            has_dynamic_offset: false,
            min_binding_size: None,
        },
        count: None,
    }
}

fn texture_entry(
    binding: u32,
    sample_type: wgpu::TextureSampleType,
    view_dimension: wgpu::TextureViewDimension,
) -> wgpu::BindGroupLayoutEntry {
    wgpu::BindGroupLayoutEntry {
        binding,
        visibility: wgpu::ShaderStages::FRAGMENT,
        ty: wgpu::BindingType::Texture {
            sample_type,
            view_dimension,
            multisampled: false,
        },
        count: None,
    }
}

fn sampler_entry(binding: u32, kind: wgpu::SamplerBindingType) -> wgpu::BindGroupLayoutEntry {
    wgpu::BindGroupLayoutEntry {
        binding,
        visibility: wgpu::ShaderStages::FRAGMENT,
        ty: wgpu::BindingType::Sampler(kind),
        count: None,
    }
}

const UNFILTERABLE: wgpu::TextureSampleType = wgpu::TextureSampleType::Float { filterable: false };

fn point_sampler(device: &wgpu::Device) -> wgpu::Sampler {
    device.create_sampler(&wgpu::SamplerDescriptor {
        label: Some("point sampler"),
        mag_filter: wgpu::FilterMode::Nearest,
        min_filter: wgpu::FilterMode::Nearest,
        ..Default::default()
    })
}

fn linear_sampler(device: &wgpu::Device) -> wgpu::Sampler {
    device.create_sampler(&wgpu::SamplerDescriptor {
        label: Some("linear sampler"),
        address_mode_u: wgpu::AddressMode::ClampToEdge,
        address_mode_v: wgpu::AddressMode::ClampToEdge,
        mag_filter: wgpu::FilterMode::Linear,
        min_filter: wgpu::FilterMode::Linear,
        ..Default::default()
    })
}

/// Shared inputs for building a stage.
pub(crate) struct StageContext<'a> {
    pub device: &'a wgpu::Device,
    pub compiler: &'a ShaderCompiler,
    pub layout: &'a RenderPassLayout,
    pub constants: &'a ConstantBuffers,
    pub targets: &'a RenderTargets,
}

impl StageContext<'_> {
    fn module(&self, file: &str, stage: ShaderStage, defines: &[(String, String)]) -> Result<wgpu::ShaderModule> {
        self.compiler
            .compile(self.device, &ShaderRequest { file, stage, defines })
            .with_context(|| format!("failed to compile {file}"))
    }

    fn constants(&self, slot: usize) -> Result<wgpu::BindingResource<'_>> {
        let buffer = self
            .constants
            .buffers
            .get(slot)
            .with_context(|| format!("no constant buffer for slot {slot}"))?;
        Ok(buffer.as_entire_binding())
    }
}

struct FragmentPipeline<'a> {
    label: &'a str,
    vertex: &'a wgpu::ShaderModule,
    fragment: &'a wgpu::ShaderModule,
    bind_group_layout: &'a wgpu::BindGroupLayout,
    vertex_buffers: &'a [wgpu::VertexBufferLayout<'a>],
    target: wgpu::TextureFormat,
    blend: Option<wgpu::BlendState>,
    depth: Option<wgpu::DepthStencilState>,
}

fn create_pipeline(device: &wgpu::Device, desc: FragmentPipeline<'_>) -> wgpu::RenderPipeline {
    let pipeline_layout = device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
        label: Some(desc.label),
        bind_group_layouts: &[desc.bind_group_layout],
        push_constant_ranges: &[],
    });
    device.create_render_pipeline(&wgpu::RenderPipelineDescriptor {
        label: Some(desc.label),
        layout: Some(&pipeline_layout),
        vertex: wgpu::VertexState {
            module: desc.vertex,
            entry_point: Some("main"),
            buffers: desc.vertex_buffers,
            compilation_options: wgpu::PipelineCompilationOptions::default(),
        },
        primitive: wgpu::PrimitiveState {
            topology: wgpu::PrimitiveTopology::TriangleList,
            strip_index_format: None,
            front_face: wgpu::FrontFace::Ccw,
            cull_mode: None,
            polygon_mode: wgpu::PolygonMode::Fill,
            unclipped_depth: false,
            conservative: false,
        },
        depth_stencil: desc.depth,
        multisample: wgpu::MultisampleState::default(),
        fragment: Some(wgpu::FragmentState {
            module: desc.fragment,
            entry_point: Some("main"),
            targets: &[Some(wgpu::ColorTargetState {
                format: desc.target,
                blend: desc.blend,
                write_mask: wgpu::ColorWrites::ALL,
            })],
            compilation_options: wgpu::PipelineCompilationOptions::default(),
        }),
        multiview: None,
        cache: None,
    })
}

fn color_pass<'e>(
    encoder: &'e mut wgpu::CommandEncoder,
    label: &str,
    view: &wgpu::TextureView,
    load: wgpu::LoadOp<wgpu::Color>,
) -> wgpu::RenderPass<'e> {
    encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
        label: Some(label),
        color_attachments: &[Some(wgpu::RenderPassColorAttachment {
            view,
            depth_slice: None,
            resolve_target: None,
            ops: wgpu::Operations {
                load,
                store: wgpu::StoreOp::Store,
            },
        })],
        depth_stencil_attachment: None,
        occlusion_query_set: None,
        timestamp_writes: None,
    })
}

/// Rasterizes primitive identifiers into the visibility target.
pub(crate) struct GeometryStage {
    pipeline: wgpu::RenderPipeline,
    bind_groups: Vec<wgpu::BindGroup>,
}

impl GeometryStage {
    pub fn new(ctx: &StageContext<'_>) -> Result<Self> {
        let vertex = ctx.module("visibility.vert", ShaderStage::Vertex, &[])?;
        let fragment = ctx.module("visibility.frag", ShaderStage::Fragment, &[])?;
        let layout = ctx.device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            label: Some("visibility layout"),
            entries: &[uniform_entry(0)],
        });
        let attributes = wgpu::vertex_attr_array![0 => Float32x3];
        let pipeline = create_pipeline(
            ctx.device,
            FragmentPipeline {
                label: "visibility pipeline",
                vertex: &vertex,
                fragment: &fragment,
                bind_group_layout: &layout,
                vertex_buffers: &[wgpu::VertexBufferLayout {
                    array_stride: 12,
                    step_mode: wgpu::VertexStepMode::Vertex,
                    attributes: &attributes,
                }],
                target: ctx.layout.target_format(TargetRole::Visibility),
                blend: None,
                depth: Some(wgpu::DepthStencilState {
                    format: ctx.layout.target_format(TargetRole::Depth),
                    depth_write_enabled: true,
                    depth_compare: wgpu::CompareFunction::Less,
                    stencil: wgpu::StencilState::default(),
                    bias: wgpu::DepthBiasState::default(),
                }),
            },
        );
        let bind_groups = (0..ctx.targets.slot_count())
            .map(|slot| {
                Ok(ctx.device.create_bind_group(&wgpu::BindGroupDescriptor {
                    label: Some("visibility bind group"),
                    layout: &layout,
                    entries: &[wgpu::BindGroupEntry {
                        binding: 0,
                        resource: ctx.constants(slot)?,
                    }],
                }))
            })
            .collect::<Result<_>>()?;
        Ok(Self { pipeline, bind_groups })
    }

    pub fn encode(
        &self,
        encoder: &mut wgpu::CommandEncoder,
        targets: &RenderTargets,
        scene: &SceneGeometry,
        slot: usize,
    ) {
        let slot_targets = &targets.slots[slot];
        let mut pass = encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
            label: Some("visibility pass"),
            color_attachments: &[Some(wgpu::RenderPassColorAttachment {
                view: &slot_targets.visibility().view,
                depth_slice: None,
                resolve_target: None,
                ops: wgpu::Operations {
                    load: wgpu::LoadOp::Clear(wgpu::Color::TRANSPARENT),
                    store: wgpu::StoreOp::Store,
                },
            })],
            depth_stencil_attachment: Some(wgpu::RenderPassDepthStencilAttachment {
                view: &slot_targets.depth().view,
                depth_ops: Some(wgpu::Operations {
                    load: wgpu::LoadOp::Clear(1.0),
                    store: wgpu::StoreOp::Discard,
                }),
                stencil_ops: None,
            }),
            occlusion_query_set: None,
            timestamp_writes: None,
        });
        pass.set_pipeline(&self.pipeline);
        pass.set_bind_group(0, &self.bind_groups[slot], &[]);
        pass.set_vertex_buffer(0, scene.vertex_buffer.slice(..));
        pass.draw(0..scene.vertex_count, 0..1);
    }
}

/// Resources the shading stage reads besides the slot targets.
pub(crate) struct ShadingInputs<'a> {
    pub scene: &'a SceneGeometry,
    pub noise: &'a NoiseTable,
    pub light_buffers: &'a LightBuffers,
    pub light_textures: &'a LightTextures,
    pub defines: &'a [(String, String)],
}

/// Estimates one frame of direct lighting from the polygonal lights.
pub(crate) struct ShadingStage {
    pipeline: wgpu::RenderPipeline,
    bind_groups: Vec<wgpu::BindGroup>,
    _samplers: [wgpu::Sampler; 2],
}

impl ShadingStage {
    pub fn new(ctx: &StageContext<'_>, inputs: &ShadingInputs<'_>) -> Result<Self> {
        let vertex = ctx.module("fullscreen.vert", ShaderStage::Vertex, &[])?;
        let fragment = ctx.module("shading.frag", ShaderStage::Fragment, inputs.defines)?;
        let layout = ctx.device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            label: Some("shading layout"),
            entries: &[
                uniform_entry(0),
                texture_entry(1, wgpu::TextureSampleType::Uint, wgpu::TextureViewDimension::D2),
                sampler_entry(2, wgpu::SamplerBindingType::NonFiltering),
                storage_entry(3),
                storage_entry(4),
                storage_entry(5),
                texture_entry(
                    6,
                    wgpu::TextureSampleType::Float { filterable: true },
                    wgpu::TextureViewDimension::D2Array,
                ),
                texture_entry(
                    7,
                    wgpu::TextureSampleType::Float { filterable: true },
                    wgpu::TextureViewDimension::D2Array,
                ),
                sampler_entry(8, wgpu::SamplerBindingType::Filtering),
            ],
        });
        let pipeline = create_pipeline(
            ctx.device,
            FragmentPipeline {
                label: "shading pipeline",
                vertex: &vertex,
                fragment: &fragment,
                bind_group_layout: &layout,
                vertex_buffers: &[],
                target: ctx.layout.target_format(TargetRole::Shading),
                blend: None,
                depth: None,
            },
        );

        let point = point_sampler(ctx.device);
        let linear = linear_sampler(ctx.device);
        let bind_groups = ctx
            .targets
            .slots
            .iter()
            .enumerate()
            .map(|(slot, targets)| {
                Ok(ctx.device.create_bind_group(&wgpu::BindGroupDescriptor {
                    label: Some("shading bind group"),
                    layout: &layout,
                    entries: &[
                        wgpu::BindGroupEntry {
                            binding: 0,
                            resource: ctx.constants(slot)?,
                        },
                        wgpu::BindGroupEntry {
                            binding: 1,
                            resource: wgpu::BindingResource::TextureView(&targets.visibility().view),
                        },
                        wgpu::BindGroupEntry {
                            binding: 2,
                            resource: wgpu::BindingResource::Sampler(&point),
                        },
                        wgpu::BindGroupEntry {
                            binding: 3,
                            resource: inputs.scene.triangle_buffer.as_entire_binding(),
                        },
                        wgpu::BindGroupEntry {
                            binding: 4,
                            resource: inputs.light_buffers.headers.as_entire_binding(),
                        },
                        wgpu::BindGroupEntry {
                            binding: 5,
                            resource: inputs.light_buffers.vertices.as_entire_binding(),
                        },
                        wgpu::BindGroupEntry {
                            binding: 6,
                            resource: wgpu::BindingResource::TextureView(&inputs.noise.view),
                        },
                        wgpu::BindGroupEntry {
                            binding: 7,
                            resource: wgpu::BindingResource::TextureView(&inputs.light_textures.view),
                        },
                        wgpu::BindGroupEntry {
                            binding: 8,
                            resource: wgpu::BindingResource::Sampler(&linear),
                        },
                    ],
                }))
            })
            .collect::<Result<_>>()?;
        Ok(Self {
            pipeline,
            bind_groups,
            _samplers: [point, linear],
        })
    }

    pub fn encode(&self, encoder: &mut wgpu::CommandEncoder, targets: &RenderTargets, slot: usize) {
        let view = &targets.slots[slot].shading().view;
        let mut pass = color_pass(encoder, "shading pass", view, wgpu::LoadOp::Clear(wgpu::Color::BLACK));
        pass.set_pipeline(&self.pipeline);
        pass.set_bind_group(0, &self.bind_groups[slot], &[]);
        pass.draw(0..3, 0..1);
    }
}

/// Blends the frame's estimate into the running average.
pub(crate) struct AccumulateStage {
    pipeline: wgpu::RenderPipeline,
    /// Indexed by `image * slots + source`; `None` on the diagonal.
    bind_groups: Vec<Option<wgpu::BindGroup>>,
    slot_count: usize,
    _sampler: wgpu::Sampler,
}

impl AccumulateStage {
    pub fn new(ctx: &StageContext<'_>) -> Result<Self> {
        let vertex = ctx.module("fullscreen.vert", ShaderStage::Vertex, &[])?;
        let fragment = ctx.module("accumulate.frag", ShaderStage::Fragment, &[])?;
        let layout = ctx.device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            label: Some("accumulate layout"),
            entries: &[
                uniform_entry(0),
                texture_entry(1, UNFILTERABLE, wgpu::TextureViewDimension::D2),
                texture_entry(2, UNFILTERABLE, wgpu::TextureViewDimension::D2),
                sampler_entry(3, wgpu::SamplerBindingType::NonFiltering),
            ],
        });
        let pipeline = create_pipeline(
            ctx.device,
            FragmentPipeline {
                label: "accumulate pipeline",
                vertex: &vertex,
                fragment: &fragment,
                bind_group_layout: &layout,
                vertex_buffers: &[],
                target: ctx.layout.target_format(TargetRole::Accumulation),
                blend: None,
                depth: None,
            },
        );

        let sampler = point_sampler(ctx.device);
        let slot_count = ctx.targets.slot_count();
        let mut bind_groups = Vec::with_capacity(slot_count * slot_count);
        for image in 0..slot_count {
            for source in 0..slot_count {
                if image == source {
                    bind_groups.push(None);
                    continue;
                }
                let group = ctx.device.create_bind_group(&wgpu::BindGroupDescriptor {
                    label: Some("accumulate bind group"),
                    layout: &layout,
                    entries: &[
                        wgpu::BindGroupEntry {
                            binding: 0,
                            resource: ctx.constants(image)?,
                        },
                        wgpu::BindGroupEntry {
                            binding: 1,
                            resource: wgpu::BindingResource::TextureView(
                                &ctx.targets.slots[source].accumulation().view,
                            ),
                        },
                        wgpu::BindGroupEntry {
                            binding: 2,
                            resource: wgpu::BindingResource::TextureView(&ctx.targets.slots[image].shading().view),
                        },
                        wgpu::BindGroupEntry {
                            binding: 3,
                            resource: wgpu::BindingResource::Sampler(&sampler),
                        },
                    ],
                });
                bind_groups.push(Some(group));
            }
        }
        Ok(Self {
            pipeline,
            bind_groups,
            slot_count,
            _sampler: sampler,
        })
    }

    pub fn encode(
        &self,
        encoder: &mut wgpu::CommandEncoder,
        targets: &RenderTargets,
        image: usize,
        previous: usize,
    ) -> Result<()> {
        let source = accumulation_source(image, previous, self.slot_count);
        let group = self
            .bind_groups
            .get(image * self.slot_count + source)
            .and_then(Option::as_ref)
            .with_context(|| format!("no accumulate bind group for slot {image} reading {source}"))?;
        let view = &targets.slots[image].accumulation().view;
        let mut pass = color_pass(encoder, "accumulate pass", view, wgpu::LoadOp::Clear(wgpu::Color::BLACK));
        pass.set_pipeline(&self.pipeline);
        pass.set_bind_group(0, group, &[]);
        pass.draw(0..3, 0..1);
        Ok(())
    }
}

/// Tonemaps the average into the presentable image, or writes one byte
/// plane of it during HDR captures.
pub(crate) struct CopyStage {
    pipeline: wgpu::RenderPipeline,
    bind_groups: Vec<wgpu::BindGroup>,
    _sampler: wgpu::Sampler,
}

impl CopyStage {
    pub fn new(ctx: &StageContext<'_>) -> Result<Self> {
        let vertex = ctx.module("fullscreen.vert", ShaderStage::Vertex, &[])?;
        let fragment = ctx.module("copy.frag", ShaderStage::Fragment, &[])?;
        let layout = ctx.device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            label: Some("copy layout"),
            entries: &[
                uniform_entry(0),
                texture_entry(1, UNFILTERABLE, wgpu::TextureViewDimension::D2),
                sampler_entry(2, wgpu::SamplerBindingType::NonFiltering),
            ],
        });
        let pipeline = create_pipeline(
            ctx.device,
            FragmentPipeline {
                label: "copy pipeline",
                vertex: &vertex,
                fragment: &fragment,
                bind_group_layout: &layout,
                vertex_buffers: &[],
                target: ctx.layout.surface_format,
                blend: None,
                depth: None,
            },
        );
        let sampler = point_sampler(ctx.device);
        let bind_groups = ctx
            .targets
            .slots
            .iter()
            .enumerate()
            .map(|(slot, targets)| {
                Ok(ctx.device.create_bind_group(&wgpu::BindGroupDescriptor {
                    label: Some("copy bind group"),
                    layout: &layout,
                    entries: &[
                        wgpu::BindGroupEntry {
                            binding: 0,
                            resource: ctx.constants(slot)?,
                        },
                        wgpu::BindGroupEntry {
                            binding: 1,
                            resource: wgpu::BindingResource::TextureView(&targets.accumulation().view),
                        },
                        wgpu::BindGroupEntry {
                            binding: 2,
                            resource: wgpu::BindingResource::Sampler(&sampler),
                        },
                    ],
                }))
            })
            .collect::<Result<_>>()?;
        Ok(Self {
            pipeline,
            bind_groups,
            _sampler: sampler,
        })
    }

    pub fn encode(&self, encoder: &mut wgpu::CommandEncoder, surface: &wgpu::TextureView, slot: usize) {
        let mut pass = color_pass(encoder, "copy pass", surface, wgpu::LoadOp::Clear(wgpu::Color::BLACK));
        pass.set_pipeline(&self.pipeline);
        pass.set_bind_group(0, &self.bind_groups[slot], &[]);
        pass.draw(0..3, 0..1);
    }
}

struct UiSlot {
    bind_group: wgpu::BindGroup,
    vertices: wgpu::Buffer,
    indices: wgpu::Buffer,
}

/// Draws the HUD over the presentable image.
pub(crate) struct UiStage {
    pipeline: wgpu::RenderPipeline,
    slots: Vec<UiSlot>,
}

impl UiStage {
    pub fn new(ctx: &StageContext<'_>) -> Result<Self> {
        let vertex = ctx.module("ui.vert", ShaderStage::Vertex, &[])?;
        let fragment = ctx.module("ui.frag", ShaderStage::Fragment, &[])?;
        let layout = ctx.device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            label: Some("ui layout"),
            entries: &[uniform_entry(0)],
        });
        let attributes = wgpu::vertex_attr_array![0 => Float32x2, 1 => Float32x4];
        let pipeline = create_pipeline(
            ctx.device,
            FragmentPipeline {
                label: "ui pipeline",
                vertex: &vertex,
                fragment: &fragment,
                bind_group_layout: &layout,
                vertex_buffers: &[wgpu::VertexBufferLayout {
                    array_stride: std::mem::size_of::<UiVertex>() as u64,
                    step_mode: wgpu::VertexStepMode::Vertex,
                    attributes: &attributes,
                }],
                target: ctx.layout.surface_format,
                blend: Some(wgpu::BlendState::ALPHA_BLENDING),
                depth: None,
            },
        );
        let slots = (0..ctx.targets.slot_count())
            .map(|slot| {
                Ok(UiSlot {
                    bind_group: ctx.device.create_bind_group(&wgpu::BindGroupDescriptor {
                        label: Some("ui bind group"),
                        layout: &layout,
                        entries: &[wgpu::BindGroupEntry {
                            binding: 0,
                            resource: ctx.constants(slot)?,
                        }],
                    }),
                    vertices: ctx.device.create_buffer(&wgpu::BufferDescriptor {
                        label: Some("ui vertices"),
                        size: (UI_VERTEX_CAPACITY * std::mem::size_of::<UiVertex>()) as u64,
                        usage: wgpu::BufferUsages::VERTEX | wgpu::BufferUsages::COPY_DST,
                        mapped_at_creation: false,
                    }),
                    indices: ctx.device.create_buffer(&wgpu::BufferDescriptor {
                        label: Some("ui indices"),
                        size: (UI_INDEX_CAPACITY * std::mem::size_of::<u32>()) as u64,
                        usage: wgpu::BufferUsages::INDEX | wgpu::BufferUsages::COPY_DST,
                        mapped_at_creation: false,
                    }),
                })
            })
            .collect::<Result<_>>()?;
        Ok(Self { pipeline, slots })
    }

    pub fn encode(
        &self,
        encoder: &mut wgpu::CommandEncoder,
        queue: &wgpu::Queue,
        surface: &wgpu::TextureView,
        extent: (u32, u32),
        slot: usize,
        list: &UiDrawList,
    ) {
        if list.vertices.len() > UI_VERTEX_CAPACITY || list.indices.len() > UI_INDEX_CAPACITY {
            tracing::warn!(
                vertices = list.vertices.len(),
                indices = list.indices.len(),
                "ui draw list exceeds buffer capacity; skipping"
            );
            return;
        }
        if list.indices.is_empty() {
            return;
        }
        let buffers = &self.slots[slot];
        queue.write_buffer(&buffers.vertices, 0, bytemuck::cast_slice(&list.vertices));
        queue.write_buffer(&buffers.indices, 0, bytemuck::cast_slice(&list.indices));

        let mut pass = color_pass(encoder, "ui pass", surface, wgpu::LoadOp::Load);
        pass.set_pipeline(&self.pipeline);
        pass.set_bind_group(0, &buffers.bind_group, &[]);
        pass.set_vertex_buffer(0, buffers.vertices.slice(..));
        pass.set_index_buffer(buffers.indices.slice(..), wgpu::IndexFormat::Uint32);
        for command in &list.commands {
            let Some([x, y, width, height]) = clamp_scissor(command.scissor, extent.0, extent.1) else {
                continue;
            };
            pass.set_scissor_rect(x, y, width, height);
            pass.draw_indexed(command.indices.clone(), 0, 0..1);
        }
    }
}
