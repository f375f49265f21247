//! Residency of meshes inside shared vertex/index buffers.
//!
//! Each vertex buffer carries its own "next free vertex/index" counters and a
//! parallel list of indirect draw commands. A [`Geometry`] id is the index of
//! its command in that list.

use std::collections::HashMap;
use std::mem;

use bytemuck::{Pod, Zeroable};

use super::backend::{BackendError, BufferId, RenderCtx};
use super::material::VertexArray;
use crate::asset::Handle;

/// Indexed indirect draw arguments, laid out as the GPU reads them.
#[repr(C)]
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Pod, Zeroable)]
pub struct DrawCommand {
    pub index_count: u32,
    pub instance_count: u32,
    pub first_index: u32,
    pub base_vertex: i32,
    pub first_instance: u32,
}

impl DrawCommand {
    pub const SIZE: usize = mem::size_of::<DrawCommand>();

    fn for_geometry(geometry: &Geometry) -> Self {
        Self {
            index_count: geometry.index_count,
            instance_count: 0,
            first_index: geometry.first_index,
            base_vertex: geometry.first_vertex as i32,
            first_instance: 0,
        }
    }
}

/// A mesh placed inside a shared vertex buffer. Immutable once created.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Geometry {
    /// Index into the owning buffer's draw-command list.
    pub id: u32,
    pub vertex_count: u32,
    pub index_count: u32,
    pub first_vertex: u32,
    pub first_index: u32,
    pub vertex_buffer: BufferId,
}

#[derive(Debug, thiserror::Error)]
pub enum GeometryError {
    #[error("renderer is not initialised")]
    NotInitialised,
    #[error("geometry needs vertices and indices (got {vertices} vertices, {indices} indices)")]
    Empty { vertices: usize, indices: usize },
    #[error("vertex capacity exceeded: {next} + {requested} > {capacity}")]
    VertexCapacity {
        next: u32,
        requested: usize,
        capacity: u32,
    },
    #[error("index capacity exceeded: {next} + {requested} > {capacity}")]
    IndexCapacity {
        next: u32,
        requested: usize,
        capacity: u32,
    },
    #[error("vertex array {0:?} is not loaded")]
    MissingVertexArray(Handle<VertexArray>),
    #[error("vertex array '{0}' has no static vertex buffer")]
    NoVertexBuffer(String),
    #[error(transparent)]
    Backend(#[from] BackendError),
}

/// A range reserved by [`GeometryResidency::plan`] but not yet committed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Placement {
    pub vertex_buffer: BufferId,
    pub first_vertex: u32,
    pub first_index: u32,
    pub vertex_count: u32,
    pub index_count: u32,
}

#[derive(Debug, Default)]
struct BufferResidency {
    next_vertex: u32,
    next_index: u32,
    commands: Vec<DrawCommand>,
}

#[derive(Debug)]
pub struct GeometryResidency {
    vertex_capacity: u32,
    index_capacity: u32,
    buffers: HashMap<BufferId, BufferResidency>,
}

impl GeometryResidency {
    pub fn new(vertex_capacity: u32, index_capacity: u32) -> Self {
        Self {
            vertex_capacity,
            index_capacity,
            buffers: HashMap::new(),
        }
    }

    pub fn vertex_capacity(&self) -> u32 {
        self.vertex_capacity
    }

    pub fn index_capacity(&self) -> u32 {
        self.index_capacity
    }

    /// Checks that `vertex_count`/`index_count` fit into `buffer` and returns
    /// where they would go. Nothing is mutated.
    pub fn plan(
        &self,
        buffer: BufferId,
        vertex_count: usize,
        index_count: usize,
    ) -> Result<Placement, GeometryError> {
        if vertex_count == 0 || index_count == 0 {
            return Err(GeometryError::Empty {
                vertices: vertex_count,
                indices: index_count,
            });
        }

        let (next_vertex, next_index) = self
            .buffers
            .get(&buffer)
            .map(|b| (b.next_vertex, b.next_index))
            .unwrap_or((0, 0));

        if next_vertex as u64 + vertex_count as u64 > self.vertex_capacity as u64 {
            return Err(GeometryError::VertexCapacity {
                next: next_vertex,
                requested: vertex_count,
                capacity: self.vertex_capacity,
            });
        }
        if next_index as u64 + index_count as u64 > self.index_capacity as u64 {
            return Err(GeometryError::IndexCapacity {
                next: next_index,
                requested: index_count,
                capacity: self.index_capacity,
            });
        }

        Ok(Placement {
            vertex_buffer: buffer,
            first_vertex: next_vertex,
            first_index: next_index,
            vertex_count: vertex_count as u32,
            index_count: index_count as u32,
        })
    }

    /// Advances the counters past `placement` and registers its draw command.
    pub fn commit(&mut self, placement: Placement) -> Geometry {
        let residency = self.buffers.entry(placement.vertex_buffer).or_default();

        let geometry = Geometry {
            id: residency.commands.len() as u32,
            vertex_count: placement.vertex_count,
            index_count: placement.index_count,
            first_vertex: placement.first_vertex,
            first_index: placement.first_index,
            vertex_buffer: placement.vertex_buffer,
        };

        residency.next_vertex = placement.first_vertex + placement.vertex_count;
        residency.next_index = placement.first_index + placement.index_count;
        residency.commands.push(DrawCommand::for_geometry(&geometry));
        geometry
    }

    /// Uploads `vertices` and `indices` into the buffers of `vertex_array` and
    /// records the new geometry. Counters only move once both uploads succeed.
    pub fn add_geometry<V: Pod>(
        &mut self,
        ctx: &mut RenderCtx<'_>,
        vertex_array: Handle<VertexArray>,
        vertices: &[V],
        indices: &[u32],
    ) -> Result<Geometry, GeometryError> {
        let vao = ctx
            .resources
            .vertex_arrays
            .get(vertex_array)
            .ok_or(GeometryError::MissingVertexArray(vertex_array))?;
        let vertex_buffer = vao
            .vertex_buffer
            .ok_or_else(|| GeometryError::NoVertexBuffer(vao.name.clone()))?;

        let placement = self.plan(vertex_buffer, vertices.len(), indices.len())?;

        let stride = mem::size_of::<V>() as u64;
        ctx.backend.write_buffer(
            vertex_buffer,
            placement.first_vertex as u64 * stride,
            bytemuck::cast_slice(vertices),
        )?;
        ctx.backend.write_buffer(
            vao.index_buffer,
            placement.first_index as u64 * mem::size_of::<u32>() as u64,
            bytemuck::cast_slice(indices),
        )?;

        let geometry = self.commit(placement);
        log::debug!(
            "Geometry {} added to '{}': {} vertices at {}, {} indices at {}",
            geometry.id,
            vao.name,
            geometry.vertex_count,
            geometry.first_vertex,
            geometry.index_count,
            geometry.first_index
        );
        Ok(geometry)
    }

    pub fn commands(&self, buffer: BufferId) -> &[DrawCommand] {
        self.buffers
            .get(&buffer)
            .map(|b| b.commands.as_slice())
            .unwrap_or(&[])
    }

    pub fn commands_mut(&mut self, buffer: BufferId) -> Option<&mut [DrawCommand]> {
        self.buffers.get_mut(&buffer).map(|b| b.commands.as_mut_slice())
    }

    pub fn command_mut(&mut self, geometry: &Geometry) -> Option<&mut DrawCommand> {
        self.buffers
            .get_mut(&geometry.vertex_buffer)
            .and_then(|b| b.commands.get_mut(geometry.id as usize))
    }

    /// Zeroes instance counts and first instances of every command in `buffer`.
    pub fn reset_instances(&mut self, buffer: BufferId) {
        if let Some(commands) = self.commands_mut(buffer) {
            for command in commands {
                command.instance_count = 0;
                command.first_instance = 0;
            }
        }
    }

    /// Whether `geometry` is a live record of this tracker.
    pub fn contains(&self, geometry: &Geometry) -> bool {
        self.commands(geometry.vertex_buffer)
            .get(geometry.id as usize)
            .is_some_and(|c| {
                c.first_index == geometry.first_index && c.index_count == geometry.index_count
            })
    }

    pub fn next_vertex(&self, buffer: BufferId) -> u32 {
        self.buffers.get(&buffer).map_or(0, |b| b.next_vertex)
    }

    pub fn next_index(&self, buffer: BufferId) -> u32 {
        self.buffers.get(&buffer).map_or(0, |b| b.next_index)
    }

    /// Forgets every placement. Buffer contents are left as they are.
    pub fn reset(&mut self) {
        self.buffers.clear();
    }
}
