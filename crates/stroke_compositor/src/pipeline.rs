//! Render pipelines for dab stamping and tile compositing, plus the shared
//! dab uniform buffer. Composite pipelines are cached per master texture
//! format.

use std::collections::HashMap;

use static_assertions::const_assert_eq;

use crate::transforms::TransformMatrix4x4;

/// Uniform block layout shared with `dab_stamp.wgsl`.
#[repr(C)]
#[derive(Debug, Clone, Copy, bytemuck::Pod, bytemuck::Zeroable)]
pub(crate) struct DabUniformGpu {
    pub footprint_transform: TransformMatrix4x4,
    pub color: [f32; 4],
    pub density: f32,
    pub color_blend_strength: f32,
    pub concentration: f32,
    pub hardness: f32,
}

const_assert_eq!(std::mem::size_of::<DabUniformGpu>(), 96);

pub(crate) struct CompositorPipelines {
    dab_bind_group_layout: wgpu::BindGroupLayout,
    dab_pipeline: wgpu::RenderPipeline,
    dab_uniform_buffer: wgpu::Buffer,
    composite_bind_group_layout: wgpu::BindGroupLayout,
    composite_pipeline_layout: wgpu::PipelineLayout,
    composite_shader: wgpu::ShaderModule,
    composite_pipelines: HashMap<wgpu::TextureFormat, wgpu::RenderPipeline>,
}

fn texture_binding_entry(binding: u32) -> wgpu::BindGroupLayoutEntry {
    wgpu::BindGroupLayoutEntry {
        binding,
        visibility: wgpu::ShaderStages::FRAGMENT,
        ty: wgpu::BindingType::Texture {
            sample_type: wgpu::TextureSampleType::Float { filterable: false },
            view_dimension: wgpu::TextureViewDimension::D2,
            multisampled: false,
        },
        count: None,
    }
}

impl CompositorPipelines {
    pub(crate) fn new(device: &wgpu::Device, blend_format: wgpu::TextureFormat) -> Self {
        let dab_shader = device.create_shader_module(wgpu::ShaderModuleDescriptor {
            label: Some("stroke.dab_shader"),
            source: wgpu::ShaderSource::Wgsl(include_str!("dab_stamp.wgsl").into()),
        });
        let composite_shader = device.create_shader_module(wgpu::ShaderModuleDescriptor {
            label: Some("stroke.composite_shader"),
            source: wgpu::ShaderSource::Wgsl(include_str!("tile_composite.wgsl").into()),
        });

        let dab_bind_group_layout =
            device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
                label: Some("stroke.dab_bind_group_layout"),
                entries: &[
                    texture_binding_entry(0),
                    wgpu::BindGroupLayoutEntry {
                        binding: 1,
                        visibility: wgpu::ShaderStages::FRAGMENT,
                        ty: wgpu::BindingType::Buffer {
                            ty: wgpu::BufferBindingType::Uniform,
                            has_dynamic_offset: false,
                            min_binding_size: None,
                        },
                        count: None,
                    },
                ],
            });
        let composite_bind_group_layout =
            device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
                label: Some("stroke.composite_bind_group_layout"),
                entries: &[texture_binding_entry(0), texture_binding_entry(1)],
            });

        let dab_pipeline_layout =
            device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
                label: Some("stroke.dab_pipeline_layout"),
                bind_group_layouts: &[&dab_bind_group_layout],
                immediate_size: 0,
            });
        let composite_pipeline_layout =
            device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
                label: Some("stroke.composite_pipeline_layout"),
                bind_group_layouts: &[&composite_bind_group_layout],
                immediate_size: 0,
            });

        let dab_pipeline = create_fullscreen_pipeline(
            device,
            "stroke.dab_pipeline",
            &dab_pipeline_layout,
            &dab_shader,
            blend_format,
        );

        let dab_uniform_buffer = device.create_buffer(&wgpu::BufferDescriptor {
            label: Some("stroke.dab_uniform_buffer"),
            size: std::mem::size_of::<DabUniformGpu>() as u64,
            usage: wgpu::BufferUsages::UNIFORM | wgpu::BufferUsages::COPY_DST,
            mapped_at_creation: false,
        });

        Self {
            dab_bind_group_layout,
            dab_pipeline,
            dab_uniform_buffer,
            composite_bind_group_layout,
            composite_pipeline_layout,
            composite_shader,
            composite_pipelines: HashMap::new(),
        }
    }

    pub(crate) fn dab_pipeline(&self) -> &wgpu::RenderPipeline {
        &self.dab_pipeline
    }

    pub(crate) fn write_dab_uniform(&self, queue: &wgpu::Queue, uniform: &DabUniformGpu) {
        queue.write_buffer(&self.dab_uniform_buffer, 0, bytemuck::bytes_of(uniform));
    }

    pub(crate) fn dab_bind_group(
        &self,
        device: &wgpu::Device,
        accumulation_view: &wgpu::TextureView,
    ) -> wgpu::BindGroup {
        device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some("stroke.dab_bind_group"),
            layout: &self.dab_bind_group_layout,
            entries: &[
                wgpu::BindGroupEntry {
                    binding: 0,
                    resource: wgpu::BindingResource::TextureView(accumulation_view),
                },
                wgpu::BindGroupEntry {
                    binding: 1,
                    resource: self.dab_uniform_buffer.as_entire_binding(),
                },
            ],
        })
    }

    pub(crate) fn composite_bind_group(
        &self,
        device: &wgpu::Device,
        accumulation_view: &wgpu::TextureView,
        snapshot_view: &wgpu::TextureView,
    ) -> wgpu::BindGroup {
        device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some("stroke.composite_bind_group"),
            layout: &self.composite_bind_group_layout,
            entries: &[
                wgpu::BindGroupEntry {
                    binding: 0,
                    resource: wgpu::BindingResource::TextureView(accumulation_view),
                },
                wgpu::BindGroupEntry {
                    binding: 1,
                    resource: wgpu::BindingResource::TextureView(snapshot_view),
                },
            ],
        })
    }

    /// Returns the composite pipeline targeting `format`, building it on
    /// first use.
    pub(crate) fn composite_pipeline(
        &mut self,
        device: &wgpu::Device,
        format: wgpu::TextureFormat,
    ) -> &wgpu::RenderPipeline {
        self.composite_pipelines.entry(format).or_insert_with(|| {
            create_fullscreen_pipeline(
                device,
                "stroke.composite_pipeline",
                &self.composite_pipeline_layout,
                &self.composite_shader,
                format,
            )
        })
    }
}

fn create_fullscreen_pipeline(
    device: &wgpu::Device,
    label: &str,
    layout: &wgpu::PipelineLayout,
    shader: &wgpu::ShaderModule,
    format: wgpu::TextureFormat,
) -> wgpu::RenderPipeline {
    device.create_render_pipeline(&wgpu::RenderPipelineDescriptor {
        label: Some(label),
        layout: Some(layout),
        vertex: wgpu::VertexState {
            module: shader,
            entry_point: Some("vs_main"),
            compilation_options: Default::default(),
            buffers: &[],
        },
        fragment: Some(wgpu::FragmentState {
            module: shader,
            entry_point: Some("fs_main"),
            compilation_options: Default::default(),
            targets: &[Some(wgpu::ColorTargetState {
                format,
                blend: None,
                write_mask: wgpu::ColorWrites::ALL,
            })],
        }),
        primitive: wgpu::PrimitiveState::default(),
        depth_stencil: None,
        multisample: wgpu::MultisampleState::default(),
        multiview_mask: None,
        cache: None,
    })
}
