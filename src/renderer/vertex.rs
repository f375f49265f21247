//! Static mesh vertex shared by every 3D vertex buffer.
//!
//! Geometry residency counts in vertices; these helpers turn those counts
//! into the byte sizes and offsets the backend works in.

use bytemuck::{Pod, Zeroable};

#[repr(C)]
#[derive(Clone, Copy, Pod, Zeroable, Debug, Default, PartialEq)]
pub struct Vertex {
    pub pos: [f32; 3],
    pub normal: [f32; 3],
    pub uv: [f32; 2],
}

impl Vertex {
    /// Bytes per vertex in a shared vertex buffer.
    pub const STRIDE: u64 = std::mem::size_of::<Vertex>() as u64;

    /// Per-vertex attributes at shader locations 0..3. Instance channels
    /// continue after them.
    pub const ATTRS: [wgpu::VertexAttribute; 3] = wgpu::vertex_attr_array![
        0 => Float32x3,
        1 => Float32x3,
        2 => Float32x2
    ];

    pub const fn new(pos: [f32; 3], normal: [f32; 3], uv: [f32; 2]) -> Self {
        Self { pos, normal, uv }
    }

    /// Size of a vertex buffer holding `vertex_capacity` vertices.
    pub const fn buffer_size(vertex_capacity: u32) -> u64 {
        vertex_capacity as u64 * Self::STRIDE
    }

    /// Byte offset of vertex `first_vertex`, as placed by
    /// [`GeometryResidency`](super::GeometryResidency).
    pub const fn byte_offset(first_vertex: u32) -> u64 {
        first_vertex as u64 * Self::STRIDE
    }
}
