use super::backend::{BackendError, RenderBackend};
use super::material::{InstanceLayout, Shader, VertexArray};
use crate::asset::Handle;

/// Reasons a single draw run is abandoned. The rest of the flush continues.
#[derive(Debug, thiserror::Error)]
pub enum DrawError {
    #[error("shader {0:?} is not loaded")]
    UnknownShader(Handle<Shader>),
    #[error("vertex array of shader '{0}' is not loaded")]
    UnknownVertexArray(String),
    #[error("vertex array '{vertex_array}' has {available} instance streams, layout needs slot {slot}")]
    MissingStream {
        vertex_array: String,
        slot: usize,
        available: usize,
    },
    #[error("vertex array '{0}' has no indirect buffer")]
    NoIndirectBuffer(String),
    #[error("vertex array '{0}' has no static vertex buffer")]
    NoVertexBuffer(String),
    #[error("index buffer of vertex array '{0}' is not bound")]
    IndexBufferUnbound(String),
    #[error("vertex array '{vertex_array}' uses {layout:?}, which this path cannot draw")]
    LayoutMismatch {
        vertex_array: String,
        layout: InstanceLayout,
    },
    #[error(transparent)]
    Backend(#[from] BackendError),
}

/// Binds everything a run needs before its draw call: program, unit table,
/// uniform blocks and vertex array.
///
/// Leaves the program in use; the caller releases it after drawing.
pub(crate) fn bind_run_state(
    backend: &mut dyn RenderBackend,
    shader: &Shader,
    vertex_array: &VertexArray,
    unit_table_uniform: &str,
    unit_table: &[i32],
) -> Result<(), DrawError> {
    backend.use_program(shader.program)?;

    let bound = bind_program_inputs(backend, shader, vertex_array, unit_table_uniform, unit_table);
    if bound.is_err() {
        backend.release_program(shader.program);
    }
    bound
}

fn bind_program_inputs(
    backend: &mut dyn RenderBackend,
    shader: &Shader,
    vertex_array: &VertexArray,
    unit_table_uniform: &str,
    unit_table: &[i32],
) -> Result<(), DrawError> {
    backend.set_int_array(shader.program, unit_table_uniform, unit_table)?;
    for block in &shader.uniform_blocks {
        backend.attach_uniform_block(shader.program, block)?;
    }

    backend.bind_vertex_array(vertex_array.id)?;
    if !backend.index_buffer_bound(vertex_array.id) {
        return Err(DrawError::IndexBufferUnbound(vertex_array.name.clone()));
    }
    Ok(())
}
