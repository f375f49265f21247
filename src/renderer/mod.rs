pub mod backend;
pub mod batch;
pub mod batches;
pub mod draw;
pub mod geometry;
pub mod instances;
pub mod material;
pub mod primitives;
pub mod recording;
pub mod renderer;
pub mod renderer_2d;
pub mod renderer_3d;
pub mod text;
pub mod texture_units;
pub mod vertex;
pub mod wgpu_backend;

pub use backend::{BackendError, BufferId, RenderBackend, RenderCtx, ShaderId, TextureId, VertexArrayId};
pub use batch::{BatchQueue, Submission2D, Submission3D, SubmitError};
pub use draw::DrawError;
pub use geometry::{DrawCommand, Geometry, GeometryError, GeometryResidency};
pub use instances::InstanceWriter;
pub use material::{Channel, ChannelFormat, InstanceLayout, Material, Shader, SubTexture, Texture, TextureKind, VertexArray};
pub use recording::{BackendCommand, RecordingBackend};
pub use renderer::{Renderer, RendererStats};
pub use renderer_2d::Renderer2D;
pub use renderer_3d::Renderer3D;
pub use text::{Font, FontAtlas, FontError, Glyph};
pub use texture_units::{TextureUnitAllocator, TextureUnitError, UnitLookup};
pub use vertex::Vertex;
pub use wgpu_backend::{quad_shader, BufferUsage, ProgramDescriptor, WgpuBackend};
