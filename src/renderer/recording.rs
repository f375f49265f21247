//! Headless backend that keeps buffer contents in CPU memory and logs every
//! command it receives.
//!
//! It validates ids, ranges and binding state the way a strict driver would,
//! which makes it the backend of choice for tests and for capturing a frame
//! for inspection.

use std::collections::HashMap;

use super::backend::{BackendError, BufferId, RenderBackend, ShaderId, TextureId, VertexArrayId};
use super::geometry::DrawCommand;

/// One call received by a [`RecordingBackend`], in arrival order.
#[derive(Debug, Clone, PartialEq)]
pub enum BackendCommand {
    WriteBuffer {
        buffer: BufferId,
        offset: u64,
        len: usize,
    },
    UseProgram(ShaderId),
    ReleaseProgram(ShaderId),
    SetIntArray {
        program: ShaderId,
        name: String,
        values: Vec<i32>,
    },
    AttachUniformBlock {
        program: ShaderId,
        block: String,
    },
    BindVertexArray(VertexArrayId),
    BindTexture {
        texture: TextureId,
        unit: u32,
    },
    BindIndirectBuffer(BufferId),
    DrawIndexed {
        index_count: u32,
    },
    /// `commands` is a snapshot of the indirect buffer as the GPU would read it.
    MultiDrawIndexedIndirect {
        command_count: u32,
        commands: Vec<DrawCommand>,
    },
}

#[derive(Default)]
struct RecordedProgram {
    uniforms: Vec<String>,
    int_arrays: HashMap<String, Vec<i32>>,
}

pub struct RecordingBackend {
    buffers: Vec<Vec<u8>>,
    programs: Vec<RecordedProgram>,
    texture_count: u32,
    vertex_arrays: Vec<Option<BufferId>>,
    uniform_blocks: Vec<String>,
    units: Vec<Option<TextureId>>,
    current_program: Option<ShaderId>,
    current_vertex_array: Option<VertexArrayId>,
    current_indirect: Option<BufferId>,
    commands: Vec<BackendCommand>,
}

impl RecordingBackend {
    pub fn new(texture_units: u32) -> Self {
        Self {
            buffers: Vec::new(),
            programs: Vec::new(),
            texture_count: 0,
            vertex_arrays: Vec::new(),
            uniform_blocks: Vec::new(),
            units: vec![None; texture_units as usize],
            current_program: None,
            current_vertex_array: None,
            current_indirect: None,
            commands: Vec::new(),
        }
    }

    pub fn create_buffer(&mut self, size: u64) -> BufferId {
        let id = BufferId(self.buffers.len() as u32);
        self.buffers.push(vec![0; size as usize]);
        id
    }

    /// Registers a program exposing the given `int[]` uniforms.
    pub fn create_program(&mut self, uniforms: &[&str]) -> ShaderId {
        let id = ShaderId(self.programs.len() as u32);
        self.programs.push(RecordedProgram {
            uniforms: uniforms.iter().map(|u| u.to_string()).collect(),
            int_arrays: HashMap::new(),
        });
        id
    }

    pub fn create_texture(&mut self) -> TextureId {
        let id = TextureId(self.texture_count);
        self.texture_count += 1;
        id
    }

    pub fn create_vertex_array(&mut self, index_buffer: Option<BufferId>) -> VertexArrayId {
        let id = VertexArrayId(self.vertex_arrays.len() as u32);
        self.vertex_arrays.push(index_buffer);
        id
    }

    pub fn register_uniform_block(&mut self, name: &str) {
        if !self.uniform_blocks.iter().any(|b| b == name) {
            self.uniform_blocks.push(name.to_string());
        }
    }

    pub fn commands(&self) -> &[BackendCommand] {
        &self.commands
    }

    pub fn clear_commands(&mut self) {
        self.commands.clear();
    }

    pub fn buffer_contents(&self, buffer: BufferId) -> Option<&[u8]> {
        self.buffers.get(buffer.index()).map(Vec::as_slice)
    }

    /// Last `int[]` upload for `name` on `program`.
    pub fn int_array(&self, program: ShaderId, name: &str) -> Option<&[i32]> {
        self.programs
            .get(program.index())
            .and_then(|p| p.int_arrays.get(name))
            .map(Vec::as_slice)
    }

    pub fn bound_texture(&self, unit: u32) -> Option<TextureId> {
        self.units.get(unit as usize).copied().flatten()
    }

    /// Index counts of every `draw_indexed` call, in order.
    pub fn indexed_draws(&self) -> Vec<u32> {
        self.commands
            .iter()
            .filter_map(|c| match c {
                BackendCommand::DrawIndexed { index_count } => Some(*index_count),
                _ => None,
            })
            .collect()
    }

    /// Snapshots of every multi-draw-indirect call, in order.
    pub fn indirect_draws(&self) -> Vec<&[DrawCommand]> {
        self.commands
            .iter()
            .filter_map(|c| match c {
                BackendCommand::MultiDrawIndexedIndirect { commands, .. } => {
                    Some(commands.as_slice())
                }
                _ => None,
            })
            .collect()
    }

    pub fn draw_call_count(&self) -> usize {
        self.commands
            .iter()
            .filter(|c| {
                matches!(
                    c,
                    BackendCommand::DrawIndexed { .. }
                        | BackendCommand::MultiDrawIndexedIndirect { .. }
                )
            })
            .count()
    }

    fn check_program(&self, program: ShaderId) -> Result<&RecordedProgram, BackendError> {
        self.programs
            .get(program.index())
            .ok_or(BackendError::UnknownProgram(program))
    }

    fn check_drawable(&self) -> Result<(), BackendError> {
        if self.current_program.is_none() {
            return Err(BackendError::NoProgram);
        }
        if self.current_vertex_array.is_none() {
            return Err(BackendError::NoVertexArray);
        }
        Ok(())
    }
}

impl RenderBackend for RecordingBackend {
    fn write_buffer(
        &mut self,
        buffer: BufferId,
        byte_offset: u64,
        data: &[u8],
    ) -> Result<(), BackendError> {
        let storage = self
            .buffers
            .get_mut(buffer.index())
            .ok_or(BackendError::UnknownBuffer(buffer))?;

        let size = storage.len() as u64;
        let end = byte_offset + data.len() as u64;
        if end > size {
            return Err(BackendError::WriteOutOfRange {
                buffer,
                offset: byte_offset,
                len: data.len(),
                size,
            });
        }

        storage[byte_offset as usize..end as usize].copy_from_slice(data);
        self.commands.push(BackendCommand::WriteBuffer {
            buffer,
            offset: byte_offset,
            len: data.len(),
        });
        Ok(())
    }

    fn use_program(&mut self, program: ShaderId) -> Result<(), BackendError> {
        self.check_program(program)?;
        self.current_program = Some(program);
        self.commands.push(BackendCommand::UseProgram(program));
        Ok(())
    }

    fn release_program(&mut self, program: ShaderId) {
        if self.current_program == Some(program) {
            self.current_program = None;
        }
        self.commands.push(BackendCommand::ReleaseProgram(program));
    }

    fn set_int_array(
        &mut self,
        program: ShaderId,
        name: &str,
        values: &[i32],
    ) -> Result<(), BackendError> {
        let recorded = self
            .programs
            .get_mut(program.index())
            .ok_or(BackendError::UnknownProgram(program))?;

        if !recorded.uniforms.iter().any(|u| u == name) {
            return Err(BackendError::UnknownUniform {
                program,
                name: name.to_string(),
            });
        }

        recorded.int_arrays.insert(name.to_string(), values.to_vec());
        self.commands.push(BackendCommand::SetIntArray {
            program,
            name: name.to_string(),
            values: values.to_vec(),
        });
        Ok(())
    }

    fn attach_uniform_block(&mut self, program: ShaderId, block: &str) -> Result<(), BackendError> {
        self.check_program(program)?;
        if !self.uniform_blocks.iter().any(|b| b == block) {
            return Err(BackendError::UnknownUniformBlock(block.to_string()));
        }
        self.commands.push(BackendCommand::AttachUniformBlock {
            program,
            block: block.to_string(),
        });
        Ok(())
    }

    fn bind_vertex_array(&mut self, vertex_array: VertexArrayId) -> Result<(), BackendError> {
        if vertex_array.index() >= self.vertex_arrays.len() {
            return Err(BackendError::UnknownVertexArray(vertex_array));
        }
        self.current_vertex_array = Some(vertex_array);
        self.commands.push(BackendCommand::BindVertexArray(vertex_array));
        Ok(())
    }

    fn bind_texture(&mut self, texture: TextureId, unit: u32) -> Result<(), BackendError> {
        if texture.0 >= self.texture_count {
            return Err(BackendError::UnknownTexture(texture));
        }
        let max = self.units.len() as u32;
        let slot = self
            .units
            .get_mut(unit as usize)
            .ok_or(BackendError::UnitOutOfRange { unit, max })?;
        *slot = Some(texture);
        self.commands.push(BackendCommand::BindTexture { texture, unit });
        Ok(())
    }

    fn bind_indirect_buffer(&mut self, buffer: BufferId) -> Result<(), BackendError> {
        if buffer.index() >= self.buffers.len() {
            return Err(BackendError::UnknownBuffer(buffer));
        }
        self.current_indirect = Some(buffer);
        self.commands.push(BackendCommand::BindIndirectBuffer(buffer));
        Ok(())
    }

    fn index_buffer_bound(&self, vertex_array: VertexArrayId) -> bool {
        self.vertex_arrays
            .get(vertex_array.index())
            .copied()
            .flatten()
            .is_some()
    }

    fn draw_indexed(&mut self, index_count: u32) -> Result<(), BackendError> {
        self.check_drawable()?;
        self.commands.push(BackendCommand::DrawIndexed { index_count });
        Ok(())
    }

    fn multi_draw_indexed_indirect(&mut self, command_count: u32) -> Result<(), BackendError> {
        self.check_drawable()?;
        let indirect = self.current_indirect.ok_or(BackendError::NoIndirectBuffer)?;
        let bytes = self
            .buffers
            .get(indirect.index())
            .ok_or(BackendError::UnknownBuffer(indirect))?;

        let stride = std::mem::size_of::<DrawCommand>();
        let needed = command_count as usize * stride;
        if needed > bytes.len() {
            return Err(BackendError::WriteOutOfRange {
                buffer: indirect,
                offset: 0,
                len: needed,
                size: bytes.len() as u64,
            });
        }

        // Buffer storage carries no alignment guarantee, so decode per command.
        let commands = bytes[..needed]
            .chunks_exact(stride)
            .map(bytemuck::pod_read_unaligned::<DrawCommand>)
            .collect();

        self.commands.push(BackendCommand::MultiDrawIndexedIndirect {
            command_count,
            commands,
        });
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn writes_land_in_buffer_storage() {
        let mut backend = RecordingBackend::new(4);
        let buffer = backend.create_buffer(8);
        backend.write_buffer(buffer, 4, &[1, 2, 3, 4]).unwrap();
        assert_eq!(backend.buffer_contents(buffer).unwrap(), &[0, 0, 0, 0, 1, 2, 3, 4]);
    }

    #[test]
    fn out_of_range_write_is_rejected_without_mutation() {
        let mut backend = RecordingBackend::new(4);
        let buffer = backend.create_buffer(4);
        let err = backend.write_buffer(buffer, 2, &[9, 9, 9]).unwrap_err();
        assert!(matches!(err, BackendError::WriteOutOfRange { .. }));
        assert_eq!(backend.buffer_contents(buffer).unwrap(), &[0, 0, 0, 0]);
        assert!(backend.commands().is_empty());
    }

    #[test]
    fn draw_requires_program_and_vertex_array() {
        let mut backend = RecordingBackend::new(4);
        assert!(matches!(backend.draw_indexed(6), Err(BackendError::NoProgram)));

        let program = backend.create_program(&[]);
        backend.use_program(program).unwrap();
        assert!(matches!(backend.draw_indexed(6), Err(BackendError::NoVertexArray)));

        let vao = backend.create_vertex_array(None);
        backend.bind_vertex_array(vao).unwrap();
        backend.draw_indexed(6).unwrap();
        assert_eq!(backend.indexed_draws(), vec![6]);
        assert!(!backend.index_buffer_bound(vao));
    }

    #[test]
    fn unknown_uniform_is_rejected() {
        let mut backend = RecordingBackend::new(4);
        let program = backend.create_program(&["u_textures"]);
        assert!(backend.set_int_array(program, "u_textures", &[0, 1]).is_ok());
        assert!(matches!(
            backend.set_int_array(program, "u_other", &[0]),
            Err(BackendError::UnknownUniform { .. })
        ));
        assert_eq!(backend.int_array(program, "u_textures"), Some(&[0, 1][..]));
    }
}
