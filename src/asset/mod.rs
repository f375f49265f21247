pub mod cache;
pub mod handle;

pub use cache::AssetCache;
pub use handle::Handle;

use crate::renderer::{Shader, Texture, VertexArray};

/// Resource descriptors the renderer resolves handles against.
///
/// The GPU objects themselves live in the backend; these records only carry
/// the backend ids plus the metadata batching needs (draw order, layouts,
/// buffer slots).
#[derive(Default)]
pub struct Resources {
    pub shaders: AssetCache<Shader>,
    pub textures: AssetCache<Texture>,
    pub vertex_arrays: AssetCache<VertexArray>,
}

impl Resources {
    pub fn new() -> Self {
        Self::default()
    }
}
