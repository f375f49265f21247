// renderer/batch.rs (submission entries and queues)
use glam::{Mat4, Vec4};

use super::geometry::Geometry;
use super::material::{Material, Shader, SubTexture, Texture, TextureKind, VertexArray};
use crate::asset::{Handle, Resources};

#[derive(Debug, thiserror::Error)]
pub enum SubmitError {
    #[error("renderer is not initialised")]
    NotInitialised,
    #[error("material has no shader")]
    MissingShader,
    #[error("shader {0:?} is not loaded")]
    UnknownShader(Handle<Shader>),
    #[error("vertex array {0:?} of shader '{1}' is not loaded")]
    UnknownVertexArray(Handle<VertexArray>, String),
    #[error("shader '{shader}' expects {expected} data, not this submission")]
    WrongDimension {
        shader: String,
        expected: &'static str,
    },
    #[error("sub-texture {index} references unloaded texture {texture:?}")]
    MissingTexture {
        index: usize,
        texture: Handle<Texture>,
    },
    #[error("cubemap {index} references unloaded texture {texture:?}")]
    MissingCubemap {
        index: usize,
        texture: Handle<Texture>,
    },
    #[error("cubemap {index} ({texture:?}) is not a cube texture")]
    NotACubemap {
        index: usize,
        texture: Handle<Texture>,
    },
    #[error("geometry has no vertices or indices")]
    EmptyGeometry,
    #[error("geometry {0} is not resident in this renderer")]
    UnknownGeometry(u32),
    #[error("geometry lives in {geometry:?} but shader '{shader}' draws from {expected:?}")]
    GeometryMismatch {
        shader: String,
        geometry: super::backend::BufferId,
        expected: Option<super::backend::BufferId>,
    },
    #[error("submission samples {needed} textures but only {available} units can be batched")]
    TooManyTextures { needed: usize, available: usize },
    #[error("batch queue is full after flushing")]
    QueueFull,
}

/// One queued 2D quad.
#[derive(Debug, Clone, PartialEq)]
pub struct Submission2D {
    pub shader: Handle<Shader>,
    pub sub_textures: Vec<SubTexture>,
    /// Unit per sub-texture, filled in at flush time.
    pub units: Vec<u32>,
    pub transform: Mat4,
    pub tint: Vec4,
}

impl Submission2D {
    /// Screen depth used as the secondary sort key.
    #[inline]
    pub fn depth(&self) -> f32 {
        self.transform.w_axis.z
    }

    pub fn texture_count(&self) -> usize {
        self.sub_textures.len()
    }
}

/// One queued 3D mesh instance.
#[derive(Debug, Clone, PartialEq)]
pub struct Submission3D {
    /// Diagnostic label.
    pub name: String,
    pub geometry: Geometry,
    pub shader: Handle<Shader>,
    pub sub_textures: Vec<SubTexture>,
    pub cubemaps: Vec<Handle<Texture>>,
    pub units: Vec<u32>,
    pub cube_units: Vec<u32>,
    pub shininess: f32,
    pub transform: Mat4,
    pub tint: Vec4,
}

impl Submission3D {
    pub fn texture_count(&self) -> usize {
        self.sub_textures.len() + self.cubemaps.len()
    }
}

/// Resolves the material's shader and checks every texture it references.
pub(crate) fn validate_material<'r>(
    resources: &'r Resources,
    material: &Material,
) -> Result<(Handle<Shader>, &'r Shader, &'r VertexArray), SubmitError> {
    let handle = material.shader.ok_or(SubmitError::MissingShader)?;
    let shader = resources
        .shaders
        .get(handle)
        .ok_or(SubmitError::UnknownShader(handle))?;
    let vertex_array = resources
        .vertex_arrays
        .get(shader.vertex_array)
        .ok_or_else(|| SubmitError::UnknownVertexArray(shader.vertex_array, shader.name.clone()))?;

    for (index, sub) in material.sub_textures.iter().enumerate() {
        if !resources.textures.contains(sub.texture) {
            return Err(SubmitError::MissingTexture {
                index,
                texture: sub.texture,
            });
        }
    }

    for (index, &texture) in material.cubemaps.iter().enumerate() {
        match resources.textures.get(texture) {
            None => return Err(SubmitError::MissingCubemap { index, texture }),
            Some(t) if t.kind != TextureKind::Cube => {
                return Err(SubmitError::NotACubemap { index, texture })
            }
            Some(_) => {}
        }
    }

    Ok((handle, shader, vertex_array))
}

pub(crate) fn new_submission_2d(
    resources: &Resources,
    material: &Material,
    transform: Mat4,
    tint: Vec4,
) -> Result<Submission2D, SubmitError> {
    let (shader, desc, vertex_array) = validate_material(resources, material)?;
    if !vertex_array.layout.is_2d() {
        return Err(SubmitError::WrongDimension {
            shader: desc.name.clone(),
            expected: "3D",
        });
    }

    Ok(Submission2D {
        shader,
        sub_textures: material.sub_textures.clone(),
        units: vec![0; material.sub_textures.len()],
        transform,
        tint,
    })
}

pub(crate) fn new_submission_3d(
    resources: &Resources,
    name: &str,
    geometry: Geometry,
    material: &Material,
    transform: Mat4,
    tint: Vec4,
) -> Result<Submission3D, SubmitError> {
    let (shader, desc, vertex_array) = validate_material(resources, material)?;
    if vertex_array.layout.is_2d() {
        return Err(SubmitError::WrongDimension {
            shader: desc.name.clone(),
            expected: "2D",
        });
    }
    if geometry.vertex_count == 0 || geometry.index_count == 0 {
        return Err(SubmitError::EmptyGeometry);
    }
    if vertex_array.vertex_buffer != Some(geometry.vertex_buffer) {
        return Err(SubmitError::GeometryMismatch {
            shader: desc.name.clone(),
            geometry: geometry.vertex_buffer,
            expected: vertex_array.vertex_buffer,
        });
    }

    Ok(Submission3D {
        name: name.to_string(),
        geometry,
        shader,
        sub_textures: material.sub_textures.clone(),
        cubemaps: material.cubemaps.clone(),
        units: vec![0; material.sub_textures.len()],
        cube_units: vec![0; material.cubemaps.len()],
        shininess: material.shininess,
        transform,
        tint,
    })
}

/// Capacity-bounded list of submissions, emptied by every flush.
#[derive(Debug)]
pub struct BatchQueue<T> {
    entries: Vec<T>,
    capacity: usize,
}

impl<T> BatchQueue<T> {
    pub fn new(capacity: usize) -> Self {
        Self {
            entries: Vec::with_capacity(capacity),
            capacity,
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn is_full(&self) -> bool {
        self.entries.len() >= self.capacity
    }

    /// Appends `entry`, handing it back when the queue is full.
    pub fn push(&mut self, entry: T) -> Result<(), T> {
        if self.is_full() {
            return Err(entry);
        }
        self.entries.push(entry);
        Ok(())
    }

    pub fn entries(&self) -> &[T] {
        &self.entries
    }

    /// Moves the entries out, leaving the queue empty with its allocation.
    pub(crate) fn take(&mut self) -> Vec<T> {
        std::mem::take(&mut self.entries)
    }

    /// Returns a drained vector's allocation to the queue.
    pub(crate) fn restore(&mut self, mut entries: Vec<T>) {
        entries.clear();
        if entries.capacity() > self.entries.capacity() {
            self.entries = entries;
        }
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }
}
