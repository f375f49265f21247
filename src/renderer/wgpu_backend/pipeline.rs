// src/renderer/wgpu_backend/pipeline.rs

use std::fmt::Write;

use crate::renderer::material::{ChannelFormat, InstanceLayout};
use crate::renderer::vertex::Vertex;

/// Everything [`WgpuBackend::create_program`](super::WgpuBackend::create_program)
/// needs to build a render pipeline for one vertex archetype.
#[derive(Debug, Clone)]
pub struct ProgramDescriptor {
    pub label: String,
    /// WGSL with `vs_main` and `fs_main` entry points.
    pub source: String,
    pub layout: InstanceLayout,
    /// Uniform blocks in group 0, one binding each in this order.
    pub uniform_blocks: Vec<String>,
    /// Name under which the texture-unit table is uploaded.
    pub unit_table_uniform: String,
    pub depth_write: bool,
    pub cull_back_faces: bool,
}

impl ProgramDescriptor {
    pub fn new(label: impl Into<String>, source: impl Into<String>, layout: InstanceLayout) -> Self {
        Self {
            label: label.into(),
            source: source.into(),
            layout,
            uniform_blocks: Vec::new(),
            unit_table_uniform: "u_textures".to_string(),
            depth_write: !layout.is_2d(),
            cull_back_faces: !layout.is_2d(),
        }
    }

    pub fn with_uniform_block(mut self, block: impl Into<String>) -> Self {
        self.uniform_blocks.push(block.into());
        self
    }

    pub fn with_unit_table_uniform(mut self, name: impl Into<String>) -> Self {
        self.unit_table_uniform = name.into();
        self
    }
}

fn vertex_format(format: ChannelFormat) -> wgpu::VertexFormat {
    match format {
        ChannelFormat::Float32 => wgpu::VertexFormat::Float32,
        ChannelFormat::Float32x2 => wgpu::VertexFormat::Float32x2,
        ChannelFormat::Float32x3 => wgpu::VertexFormat::Float32x3,
        ChannelFormat::Float32x4 | ChannelFormat::Mat4 => wgpu::VertexFormat::Float32x4,
        ChannelFormat::Uint32 => wgpu::VertexFormat::Uint32,
        ChannelFormat::Uint32x2 => wgpu::VertexFormat::Uint32x2,
        ChannelFormat::Unorm8x4 => wgpu::VertexFormat::Unorm8x4,
    }
}

/// Vertex buffer layouts of an [`InstanceLayout`], in the order the vertex
/// array binds its buffers: the static [`Vertex`] buffer first for 3D
/// layouts, then one buffer per channel slot. Shader locations are assigned
/// sequentially; a `Mat4` channel takes four.
pub(crate) struct StreamLayouts {
    layout: InstanceLayout,
    attributes: Vec<Vec<wgpu::VertexAttribute>>,
    strides: Vec<u64>,
}

impl StreamLayouts {
    pub(crate) fn new(layout: InstanceLayout) -> Self {
        let mut attributes = Vec::new();
        let mut strides = Vec::new();
        let mut location = 0;

        if !layout.is_2d() {
            attributes.push(Vertex::ATTRS.to_vec());
            strides.push(Vertex::STRIDE);
            location = Vertex::ATTRS.len() as u32;
        }

        for channel in layout.channels() {
            let columns = if channel.format == ChannelFormat::Mat4 { 4 } else { 1 };
            let format = vertex_format(channel.format);
            let attrs = (0..columns)
                .map(|column| wgpu::VertexAttribute {
                    format,
                    offset: column as u64 * format.size(),
                    shader_location: location + column,
                })
                .collect();
            location += columns;
            attributes.push(attrs);
            strides.push(channel.stride as u64);
        }

        Self {
            layout,
            attributes,
            strides,
        }
    }

    pub(crate) fn buffers(&self) -> Vec<wgpu::VertexBufferLayout<'_>> {
        let channel_step = if self.layout.is_2d() {
            wgpu::VertexStepMode::Vertex
        } else {
            wgpu::VertexStepMode::Instance
        };
        let has_static = !self.layout.is_2d();

        self.attributes
            .iter()
            .zip(&self.strides)
            .enumerate()
            .map(|(i, (attributes, &array_stride))| wgpu::VertexBufferLayout {
                array_stride,
                step_mode: if has_static && i == 0 {
                    wgpu::VertexStepMode::Vertex
                } else {
                    channel_step
                },
                attributes,
            })
            .collect()
    }
}

/// Group 0: one uniform buffer per attached block.
pub(crate) fn uniform_block_layout(device: &wgpu::Device, label: &str, blocks: usize) -> wgpu::BindGroupLayout {
    let entries: Vec<_> = (0..blocks as u32)
        .map(|binding| wgpu::BindGroupLayoutEntry {
            binding,
            visibility: wgpu::ShaderStages::VERTEX_FRAGMENT,
            ty: wgpu::BindingType::Buffer {
                ty: wgpu::BufferBindingType::Uniform,
                has_dynamic_offset: false,
                min_binding_size: None,
            },
            count: None,
        })
        .collect();
    device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
        label: Some(label),
        entries: &entries,
    })
}

/// Group 1: `units` 2D textures, one cube texture, the sampler and the
/// texture-unit table, at bindings `0..units`, `units`, `units + 1` and
/// `units + 2`.
pub(crate) fn texture_unit_layout(device: &wgpu::Device, units: u32) -> wgpu::BindGroupLayout {
    let texture = |binding, view_dimension| wgpu::BindGroupLayoutEntry {
        binding,
        visibility: wgpu::ShaderStages::FRAGMENT,
        ty: wgpu::BindingType::Texture {
            sample_type: wgpu::TextureSampleType::Float { filterable: true },
            view_dimension,
            multisampled: false,
        },
        count: None,
    };

    let mut entries: Vec<_> = (0..units)
        .map(|unit| texture(unit, wgpu::TextureViewDimension::D2))
        .collect();
    entries.push(texture(units, wgpu::TextureViewDimension::Cube));
    entries.push(wgpu::BindGroupLayoutEntry {
        binding: units + 1,
        visibility: wgpu::ShaderStages::FRAGMENT,
        ty: wgpu::BindingType::Sampler(wgpu::SamplerBindingType::Filtering),
        count: None,
    });
    entries.push(wgpu::BindGroupLayoutEntry {
        binding: units + 2,
        visibility: wgpu::ShaderStages::VERTEX_FRAGMENT,
        ty: wgpu::BindingType::Buffer {
            ty: wgpu::BufferBindingType::Uniform,
            has_dynamic_offset: false,
            min_binding_size: None,
        },
        count: None,
    });

    device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
        label: Some("Texture Unit Layout"),
        entries: &entries,
    })
}

/// Bytes of the unit-table uniform: `array<vec4<i32>, ceil(units / 4)>`.
pub(crate) fn unit_table_size(units: u32) -> u64 {
    units.div_ceil(4).max(1) as u64 * 16
}

/// Builder for batch pipelines with sensible defaults
pub(crate) struct PipelineBuilder<'a> {
    device: &'a wgpu::Device,
    label: Option<&'a str>,
    layout: &'a wgpu::PipelineLayout,
    shader: &'a wgpu::ShaderModule,
    vertex_buffers: Vec<wgpu::VertexBufferLayout<'a>>,
    color_targets: Vec<Option<wgpu::ColorTargetState>>,
    depth_stencil: Option<wgpu::DepthStencilState>,
    primitive: wgpu::PrimitiveState,
}

impl<'a> PipelineBuilder<'a> {
    pub(crate) fn new(
        device: &'a wgpu::Device,
        layout: &'a wgpu::PipelineLayout,
        shader: &'a wgpu::ShaderModule,
    ) -> Self {
        Self {
            device,
            label: None,
            layout,
            shader,
            vertex_buffers: Vec::new(),
            color_targets: Vec::new(),
            depth_stencil: None,
            primitive: wgpu::PrimitiveState {
                topology: wgpu::PrimitiveTopology::TriangleList,
                cull_mode: Some(wgpu::Face::Back),
                front_face: wgpu::FrontFace::Ccw,
                polygon_mode: wgpu::PolygonMode::Fill,
                ..Default::default()
            },
        }
    }

    pub(crate) fn with_label(mut self, label: &'a str) -> Self {
        self.label = Some(label);
        self
    }

    pub(crate) fn with_vertex_buffers(mut self, layouts: Vec<wgpu::VertexBufferLayout<'a>>) -> Self {
        self.vertex_buffers = layouts;
        self
    }

    pub(crate) fn with_color_target(mut self, format: wgpu::TextureFormat, blend: Option<wgpu::BlendState>) -> Self {
        self.color_targets.push(Some(wgpu::ColorTargetState {
            format,
            blend,
            write_mask: wgpu::ColorWrites::ALL,
        }));
        self
    }

    pub(crate) fn with_depth_stencil(
        mut self,
        format: wgpu::TextureFormat,
        depth_write: bool,
        depth_compare: wgpu::CompareFunction,
    ) -> Self {
        self.depth_stencil = Some(wgpu::DepthStencilState {
            format,
            depth_write_enabled: depth_write,
            depth_compare,
            stencil: wgpu::StencilState::default(),
            bias: wgpu::DepthBiasState::default(),
        });
        self
    }

    pub(crate) fn with_no_culling(mut self) -> Self {
        self.primitive.cull_mode = None;
        self
    }

    pub(crate) fn build(self) -> wgpu::RenderPipeline {
        self.device.create_render_pipeline(&wgpu::RenderPipelineDescriptor {
            label: self.label,
            layout: Some(self.layout),
            vertex: wgpu::VertexState {
                module: self.shader,
                entry_point: Some("vs_main"),
                buffers: &self.vertex_buffers,
                compilation_options: Default::default(),
            },
            fragment: Some(wgpu::FragmentState {
                module: self.shader,
                entry_point: Some("fs_main"),
                targets: &self.color_targets,
                compilation_options: Default::default(),
            }),
            primitive: self.primitive,
            depth_stencil: self.depth_stencil,
            multisample: wgpu::MultisampleState::default(),
            multiview: None,
            cache: None,
        })
    }
}

/// WGSL for the [`InstanceLayout::Quad`] archetype with `units` texture
/// bindings. Expects a `camera` uniform block holding `view_proj`.
///
/// The per-vertex unit is looked up through the unit table, then selects a
/// binding with a `switch`; sampling uses an explicit LOD because the branch
/// is not uniform.
pub fn quad_shader(units: u32) -> String {
    let units = units.max(1);
    let mut src = String::new();

    src.push_str(
        "struct Camera {\n    view_proj: mat4x4<f32>,\n}\n\
         @group(0) @binding(0) var<uniform> camera: Camera;\n\n",
    );
    for unit in 0..units {
        let _ = writeln!(src, "@group(1) @binding({unit}) var t{unit}: texture_2d<f32>;");
    }
    let _ = writeln!(src, "@group(1) @binding({}) var s: sampler;", units + 1);
    let _ = writeln!(
        src,
        "@group(1) @binding({}) var<uniform> unit_table: array<vec4<i32>, {}>;\n",
        units + 2,
        units.div_ceil(4)
    );

    src.push_str(
        "struct VsIn {\n\
         \x20   @location(0) position: vec3<f32>,\n\
         \x20   @location(1) uv: vec2<f32>,\n\
         \x20   @location(2) unit: u32,\n\
         \x20   @location(3) tint: vec4<f32>,\n\
         }\n\n\
         struct VsOut {\n\
         \x20   @builtin(position) clip: vec4<f32>,\n\
         \x20   @location(0) uv: vec2<f32>,\n\
         \x20   @location(1) @interpolate(flat) unit: u32,\n\
         \x20   @location(2) tint: vec4<f32>,\n\
         }\n\n\
         @vertex\n\
         fn vs_main(in: VsIn) -> VsOut {\n\
         \x20   var out: VsOut;\n\
         \x20   out.clip = camera.view_proj * vec4<f32>(in.position, 1.0);\n\
         \x20   out.uv = in.uv;\n\
         \x20   out.unit = u32(unit_table[in.unit / 4u][in.unit % 4u]);\n\
         \x20   out.tint = in.tint;\n\
         \x20   return out;\n\
         }\n\n\
         fn sample_unit(unit: u32, uv: vec2<f32>) -> vec4<f32> {\n\
         \x20   switch unit {\n",
    );
    for unit in 0..units {
        let _ = writeln!(
            src,
            "        case {unit}u: {{ return textureSampleLevel(t{unit}, s, uv, 0.0); }}"
        );
    }
    src.push_str(
        "        default: { return vec4<f32>(1.0, 0.0, 1.0, 1.0); }\n\
         \x20   }\n\
         }\n\n\
         @fragment\n\
         fn fs_main(in: VsOut) -> @location(0) vec4<f32> {\n\
         \x20   return sample_unit(in.unit, in.uv) * in.tint;\n\
         }\n",
    );
    src
}
