//! Narrow interface between the batching core and a graphics API.
//!
//! The renderer never touches GPU objects directly. It drives a
//! [`RenderBackend`] through opaque ids handed out by whatever created the
//! resources (see [`RecordingBackend`](super::RecordingBackend) and
//! [`WgpuBackend`](super::WgpuBackend)).

use crate::asset::Resources;

macro_rules! backend_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
        pub struct $name(pub u32);

        impl $name {
            pub fn index(self) -> usize {
                self.0 as usize
            }
        }
    };
}

backend_id!(
    /// GPU buffer (vertex, index, instance stream, indirect or uniform).
    BufferId
);
backend_id!(
    /// Linked shader program.
    ShaderId
);
backend_id!(
    /// Sampled texture (2D or cube).
    TextureId
);
backend_id!(
    /// Vertex array object: vertex/instance stream bindings plus an index buffer.
    VertexArrayId
);

#[derive(Debug, thiserror::Error)]
pub enum BackendError {
    #[error("unknown buffer {0:?}")]
    UnknownBuffer(BufferId),
    #[error("unknown shader program {0:?}")]
    UnknownProgram(ShaderId),
    #[error("unknown texture {0:?}")]
    UnknownTexture(TextureId),
    #[error("unknown vertex array {0:?}")]
    UnknownVertexArray(VertexArrayId),
    #[error("program {program:?} has no uniform named '{name}'")]
    UnknownUniform { program: ShaderId, name: String },
    #[error("no uniform block named '{0}' is registered")]
    UnknownUniformBlock(String),
    #[error("write of {len} bytes at offset {offset} overflows buffer {buffer:?} ({size} bytes)")]
    WriteOutOfRange {
        buffer: BufferId,
        offset: u64,
        len: usize,
        size: u64,
    },
    #[error("buffer copy at offset {offset} is not {alignment}-byte aligned")]
    Misaligned { offset: u64, alignment: u64 },
    #[error("texture unit {unit} exceeds the {max} available units")]
    UnitOutOfRange { unit: u32, max: u32 },
    #[error("no program is in use")]
    NoProgram,
    #[error("no vertex array is bound")]
    NoVertexArray,
    #[error("no indirect buffer is bound")]
    NoIndirectBuffer,
    #[error("draw issued outside of a frame")]
    NoActiveFrame,
    #[error("device error: {0}")]
    Device(String),
}

/// Graphics primitives the batching core consumes.
///
/// Calls arrive strictly in program order from a single render thread;
/// implementations may assume state set by one call is visible to the next.
pub trait RenderBackend {
    /// Byte-range edit of a GPU-resident buffer.
    fn write_buffer(&mut self, buffer: BufferId, byte_offset: u64, data: &[u8])
        -> Result<(), BackendError>;

    fn use_program(&mut self, program: ShaderId) -> Result<(), BackendError>;

    fn release_program(&mut self, program: ShaderId);

    /// Uploads an `int[]` uniform; used for the texture-unit table.
    fn set_int_array(&mut self, program: ShaderId, name: &str, values: &[i32])
        -> Result<(), BackendError>;

    /// Connects the named uniform block to `program`.
    fn attach_uniform_block(&mut self, program: ShaderId, block: &str) -> Result<(), BackendError>;

    fn bind_vertex_array(&mut self, vertex_array: VertexArrayId) -> Result<(), BackendError>;

    /// Makes `texture` sampleable through hardware unit `unit`.
    fn bind_texture(&mut self, texture: TextureId, unit: u32) -> Result<(), BackendError>;

    fn bind_indirect_buffer(&mut self, buffer: BufferId) -> Result<(), BackendError>;

    /// Whether `vertex_array` currently has an index buffer attached.
    fn index_buffer_bound(&self, vertex_array: VertexArrayId) -> bool;

    /// Indexed triangle draw of `index_count` indices from offset zero.
    fn draw_indexed(&mut self, index_count: u32) -> Result<(), BackendError>;

    /// Reads `command_count` indexed indirect commands from offset zero of the
    /// bound indirect buffer.
    fn multi_draw_indexed_indirect(&mut self, command_count: u32) -> Result<(), BackendError>;
}

/// Everything a renderer call needs from the outside world.
pub struct RenderCtx<'a> {
    pub resources: &'a Resources,
    pub backend: &'a mut dyn RenderBackend,
}

impl<'a> RenderCtx<'a> {
    #[inline]
    pub fn new(resources: &'a Resources, backend: &'a mut dyn RenderBackend) -> Self {
        Self { resources, backend }
    }
}
