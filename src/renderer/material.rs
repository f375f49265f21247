// renderer/material.rs (batching resources)
use glam::Vec2;

use crate::asset::Handle;
use crate::renderer::backend::{BufferId, ShaderId, TextureId, VertexArrayId};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TextureKind {
    D2,
    Cube,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Texture {
    pub id: TextureId,
    pub kind: TextureKind,
    pub width: u32,
    pub height: u32,
}

impl Texture {
    pub fn new_2d(id: TextureId, width: u32, height: u32) -> Self {
        Self {
            id,
            kind: TextureKind::D2,
            width,
            height,
        }
    }

    pub fn new_cube(id: TextureId, size: u32) -> Self {
        Self {
            id,
            kind: TextureKind::Cube,
            width: size,
            height: size,
        }
    }
}

/// Rectangular region of an atlas texture, in UV space.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SubTexture {
    pub texture: Handle<Texture>,
    pub uv_min: Vec2,
    pub uv_max: Vec2,
}

impl SubTexture {
    pub fn new(texture: Handle<Texture>, uv_min: Vec2, uv_max: Vec2) -> Self {
        Self {
            texture,
            uv_min,
            uv_max,
        }
    }

    /// The whole texture.
    pub fn full(texture: Handle<Texture>) -> Self {
        Self::new(texture, Vec2::ZERO, Vec2::ONE)
    }

    /// Region given in texels of a `width` x `height` atlas.
    pub fn from_pixels(texture: Handle<Texture>, width: u32, height: u32, x: u32, y: u32, w: u32, h: u32) -> Self {
        let size = Vec2::new(width.max(1) as f32, height.max(1) as f32);
        let min = Vec2::new(x as f32, y as f32) / size;
        let max = Vec2::new((x + w) as f32, (y + h) as f32) / size;
        Self::new(texture, min, max)
    }

    /// `[u_min, v_min, u_max, v_max]`
    pub fn uv_rect(&self) -> [f32; 4] {
        [self.uv_min.x, self.uv_min.y, self.uv_max.x, self.uv_max.y]
    }

    /// UV at a corner of the unit quad (`corner` components in 0..=1).
    pub fn uv_at(&self, corner: Vec2) -> Vec2 {
        self.uv_min + (self.uv_max - self.uv_min) * corner
    }
}

/// Element type of one channel as the vertex shader reads it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChannelFormat {
    Float32,
    Float32x2,
    Float32x3,
    Float32x4,
    /// Four `Float32x4` columns.
    Mat4,
    Uint32,
    Uint32x2,
    /// Packed RGBA8 colour.
    Unorm8x4,
}

impl ChannelFormat {
    pub const fn size(self) -> usize {
        match self {
            ChannelFormat::Float32 | ChannelFormat::Uint32 | ChannelFormat::Unorm8x4 => 4,
            ChannelFormat::Float32x2 | ChannelFormat::Uint32x2 => 8,
            ChannelFormat::Float32x3 => 12,
            ChannelFormat::Float32x4 => 16,
            ChannelFormat::Mat4 => 64,
        }
    }
}

/// Per-batch data stream written by the instance generator.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Channel {
    pub name: &'static str,
    /// Stream slot in [`VertexArray::streams`].
    pub slot: usize,
    pub format: ChannelFormat,
    /// Bytes per element.
    pub stride: usize,
}

const fn channel(name: &'static str, slot: usize, format: ChannelFormat) -> Channel {
    Channel {
        name,
        slot,
        format,
        stride: format.size(),
    }
}

use ChannelFormat::*;

const QUAD_CHANNELS: [Channel; 4] = [
    channel("position", 0, Float32x3),
    channel("uv", 1, Float32x2),
    channel("unit", 2, Uint32),
    channel("tint", 3, Unorm8x4),
];

const MULTI_QUAD_CHANNELS: [Channel; 5] = [
    channel("position", 0, Float32x3),
    channel("uv0", 1, Float32x2),
    channel("uv1", 2, Float32x2),
    channel("units", 3, Uint32x2),
    channel("tint", 4, Unorm8x4),
];

const BASIC_CHANNELS: [Channel; 5] = [
    channel("model", 0, Mat4),
    channel("units", 1, Uint32x2),
    channel("tint", 2, Float32x4),
    channel("shininess", 3, Float32),
    channel("uv_rect", 4, Float32x4),
];

const SKYBOX_CHANNELS: [Channel; 2] = [channel("cube_unit", 0, Uint32), channel("tint", 1, Float32x4)];

const LIGHT_SOURCE_CHANNELS: [Channel; 2] = [channel("model", 0, Mat4), channel("tint", 1, Float32x4)];

const TERRAIN_CHANNELS: [Channel; 4] = [
    channel("model", 0, Mat4),
    channel("unit", 1, Uint32),
    channel("tint", 2, Float32x4),
    channel("uv_rect", 3, Float32x4),
];

/// Vertex archetype of a vertex array, fixed when the array is created.
///
/// Selects the instance-data strategy and therefore the per-stream layout the
/// shader expects. 2D layouts carry per-vertex data (four vertices per quad);
/// 3D layouts carry per-instance data.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum InstanceLayout {
    /// Single-textured quad.
    Quad,
    /// Quad sampling two sub-textures.
    MultiQuad,
    /// Lit mesh: model, two units, tint, shininess, UV rect.
    Basic,
    /// Cube-mapped sky: cube unit and tint.
    Skybox,
    /// Emissive mesh: model and tint.
    LightSource,
    /// Terrain patch: model, one unit, tint, UV rect.
    Terrain,
}

impl InstanceLayout {
    pub fn channels(self) -> &'static [Channel] {
        match self {
            InstanceLayout::Quad => &QUAD_CHANNELS,
            InstanceLayout::MultiQuad => &MULTI_QUAD_CHANNELS,
            InstanceLayout::Basic => &BASIC_CHANNELS,
            InstanceLayout::Skybox => &SKYBOX_CHANNELS,
            InstanceLayout::LightSource => &LIGHT_SOURCE_CHANNELS,
            InstanceLayout::Terrain => &TERRAIN_CHANNELS,
        }
    }

    pub fn is_2d(self) -> bool {
        matches!(self, InstanceLayout::Quad | InstanceLayout::MultiQuad)
    }

    /// Elements written per submission in every stream.
    pub fn elements_per_submission(self) -> usize {
        if self.is_2d() {
            4
        } else {
            1
        }
    }

    pub const ALL: [InstanceLayout; 6] = [
        InstanceLayout::Quad,
        InstanceLayout::MultiQuad,
        InstanceLayout::Basic,
        InstanceLayout::Skybox,
        InstanceLayout::LightSource,
        InstanceLayout::Terrain,
    ];

    /// Highest stream slot the layout writes to, plus one.
    pub fn stream_count(self) -> usize {
        self.channels().iter().map(|c| c.slot + 1).max().unwrap_or(0)
    }
}

/// Vertex array descriptor: which buffers the batching core writes to.
#[derive(Debug, Clone, PartialEq)]
pub struct VertexArray {
    pub name: String,
    pub id: VertexArrayId,
    pub layout: InstanceLayout,
    /// Shared static vertex storage (3D layouts).
    pub vertex_buffer: Option<BufferId>,
    pub index_buffer: BufferId,
    /// Per-batch streams, addressed positionally by [`Channel::slot`].
    pub streams: Vec<BufferId>,
    pub indirect_buffer: Option<BufferId>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Shader {
    pub name: String,
    pub program: ShaderId,
    /// Draw order importance; lower values draw first.
    pub order: u32,
    pub vertex_array: Handle<VertexArray>,
    pub uniform_blocks: Vec<String>,
}

impl Shader {
    pub fn new(name: impl Into<String>, program: ShaderId, order: u32, vertex_array: Handle<VertexArray>) -> Self {
        Self {
            name: name.into(),
            program,
            order,
            vertex_array,
            uniform_blocks: Vec::new(),
        }
    }

    pub fn with_uniform_block(mut self, block: impl Into<String>) -> Self {
        self.uniform_blocks.push(block.into());
        self
    }
}

/// Shader plus the textures it samples.
#[derive(Debug, Clone, PartialEq)]
pub struct Material {
    pub shader: Option<Handle<Shader>>,
    pub sub_textures: Vec<SubTexture>,
    pub cubemaps: Vec<Handle<Texture>>,
    pub shininess: f32,
}

impl Material {
    pub fn new(shader: Handle<Shader>) -> Self {
        Self {
            shader: Some(shader),
            sub_textures: Vec::new(),
            cubemaps: Vec::new(),
            shininess: 32.0,
        }
    }

    pub fn with_sub_texture(mut self, sub_texture: SubTexture) -> Self {
        self.sub_textures.push(sub_texture);
        self
    }

    pub fn with_texture(self, texture: Handle<Texture>) -> Self {
        self.with_sub_texture(SubTexture::full(texture))
    }

    pub fn with_cubemap(mut self, texture: Handle<Texture>) -> Self {
        self.cubemaps.push(texture);
        self
    }

    pub fn with_shininess(mut self, shininess: f32) -> Self {
        self.shininess = shininess;
        self
    }

    /// Texture units one submission of this material occupies.
    pub fn texture_count(&self) -> usize {
        self.sub_textures.len() + self.cubemaps.len()
    }
}

impl Default for Material {
    fn default() -> Self {
        Self {
            shader: None,
            sub_textures: Vec::new(),
            cubemaps: Vec::new(),
            shininess: 32.0,
        }
    }
}
