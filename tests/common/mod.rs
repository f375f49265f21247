// Shared fixtures for the integration tests.
#![allow(dead_code)]

use glam::{Mat4, Vec3};
use wgpu_batcher::asset::{Handle, Resources};
use wgpu_batcher::renderer::{
    BufferId, InstanceLayout, RecordingBackend, Shader, Texture, VertexArray, Vertex,
};
use wgpu_batcher::RendererSettings;

pub const UNIT_TABLE: &str = "u_textures";
pub const INDIRECT_COMMANDS: u64 = 32;

pub fn settings(texture_units: u32) -> RendererSettings {
    RendererSettings {
        batch_capacity_2d: 64,
        batch_capacity_3d: 64,
        vertex_capacity: 1024,
        index_capacity: 4096,
        texture_units,
        reserved_texture_units: 0,
        unit_table_uniform: UNIT_TABLE.to_string(),
    }
}

pub struct Fixture {
    pub backend: RecordingBackend,
    pub resources: Resources,
    pub settings: RendererSettings,
}

impl Fixture {
    pub fn new(settings: RendererSettings) -> Self {
        let mut backend = RecordingBackend::new(settings.texture_units);
        backend.register_uniform_block("camera");
        Self {
            backend,
            resources: Resources::new(),
            settings,
        }
    }

    pub fn vertex_array(&mut self, name: &str, layout: InstanceLayout) -> Handle<VertexArray> {
        let settings = &self.settings;
        let (capacity, index_count) = if layout.is_2d() {
            (settings.batch_capacity_2d as u64, settings.quad_index_count())
        } else {
            (settings.batch_capacity_3d as u64, settings.index_capacity as u64)
        };
        let elements = capacity * layout.elements_per_submission() as u64;
        let vertex_bytes = Vertex::buffer_size(settings.vertex_capacity);

        let backend = &mut self.backend;
        let streams = layout
            .channels()
            .iter()
            .map(|c| backend.create_buffer(c.stride as u64 * elements))
            .collect();
        let index_buffer = backend.create_buffer(index_count * 4);
        let (vertex_buffer, indirect_buffer) = if layout.is_2d() {
            (None, None)
        } else {
            (
                Some(backend.create_buffer(vertex_bytes)),
                Some(backend.create_buffer(INDIRECT_COMMANDS * 20)),
            )
        };
        let id = backend.create_vertex_array(Some(index_buffer));

        self.resources.vertex_arrays.insert(VertexArray {
            name: name.to_string(),
            id,
            layout,
            vertex_buffer,
            index_buffer,
            streams,
            indirect_buffer,
        })
    }

    pub fn shader(&mut self, name: &str, order: u32, vertex_array: Handle<VertexArray>) -> Handle<Shader> {
        let program = self.backend.create_program(&[UNIT_TABLE]);
        self.resources
            .shaders
            .insert(Shader::new(name, program, order, vertex_array).with_uniform_block("camera"))
    }

    pub fn texture(&mut self) -> Handle<Texture> {
        let id = self.backend.create_texture();
        self.resources.textures.insert(Texture::new_2d(id, 16, 16))
    }

    pub fn cubemap(&mut self) -> Handle<Texture> {
        let id = self.backend.create_texture();
        self.resources.textures.insert(Texture::new_cube(id, 16))
    }

    pub fn stream(&self, vertex_array: Handle<VertexArray>, slot: usize) -> BufferId {
        self.resources.vertex_arrays.get(vertex_array).unwrap().streams[slot]
    }

    /// Stream contents decoded as `T`.
    pub fn stream_as<T: bytemuck::Pod>(&self, vertex_array: Handle<VertexArray>, slot: usize) -> Vec<T> {
        let bytes = self.backend.buffer_contents(self.stream(vertex_array, slot)).unwrap();
        bytemuck::pod_collect_to_vec(bytes)
    }
}

pub fn at(x: f32, y: f32, z: f32) -> Mat4 {
    Mat4::from_translation(Vec3::new(x, y, z))
}
