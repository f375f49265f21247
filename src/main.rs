use std::error::Error;

use glam::{Mat4, Quat, Vec3, Vec4};
use wgpu_batcher::asset::{Handle, Resources};
use wgpu_batcher::renderer::{
    primitives, FontAtlas, InstanceLayout, Material, RecordingBackend, RenderCtx, Shader, SubTexture, Texture,
    VertexArray, Vertex,
};
use wgpu_batcher::{Renderer, RendererSettings};

const SETTINGS_PATH: &str = "batcher.json";
const FRAMES: usize = 3;

/// Allocates recording buffers for every stream of `layout` and registers the
/// vertex array.
fn vertex_array(
    backend: &mut RecordingBackend,
    resources: &mut Resources,
    name: &str,
    layout: InstanceLayout,
    settings: &RendererSettings,
) -> Handle<VertexArray> {
    let (capacity, index_count) = if layout.is_2d() {
        (settings.batch_capacity_2d as u64, settings.quad_index_count())
    } else {
        (settings.batch_capacity_3d as u64, settings.index_capacity as u64)
    };
    let elements = capacity * layout.elements_per_submission() as u64;

    let streams = layout
        .channels()
        .iter()
        .map(|c| backend.create_buffer(c.stride as u64 * elements))
        .collect();
    let index_buffer = backend.create_buffer(index_count * 4);
    let (vertex_buffer, indirect_buffer) = if layout.is_2d() {
        (None, None)
    } else {
        let vertices = backend.create_buffer(Vertex::buffer_size(settings.vertex_capacity));
        // one command per resident geometry; the demo places a handful
        let indirect = backend.create_buffer(64 * 20);
        (Some(vertices), Some(indirect))
    };

    resources.vertex_arrays.insert(VertexArray {
        name: name.to_string(),
        id: backend.create_vertex_array(Some(index_buffer)),
        layout,
        vertex_buffer,
        index_buffer,
        streams,
        indirect_buffer,
    })
}

fn shader(
    backend: &mut RecordingBackend,
    resources: &mut Resources,
    settings: &RendererSettings,
    name: &str,
    order: u32,
    vertex_array: Handle<VertexArray>,
) -> Handle<Shader> {
    let program = backend.create_program(&[settings.unit_table_uniform.as_str()]);
    resources
        .shaders
        .insert(Shader::new(name, program, order, vertex_array).with_uniform_block("camera"))
}

fn run() -> Result<(), Box<dyn Error>> {
    let settings = RendererSettings::load_from_path(SETTINGS_PATH);
    let mut backend = RecordingBackend::new(settings.texture_units);
    let mut resources = Resources::new();
    backend.register_uniform_block("camera");

    let sprites_vao = vertex_array(&mut backend, &mut resources, "sprites", InstanceLayout::Quad, &settings);
    let meshes_vao = vertex_array(&mut backend, &mut resources, "meshes", InstanceLayout::Basic, &settings);
    let sprites = shader(&mut backend, &mut resources, &settings, "sprites", 1, sprites_vao);
    let meshes = shader(&mut backend, &mut resources, &settings, "meshes", 0, meshes_vao);

    let textures: Vec<Handle<Texture>> = (0..3)
        .map(|_| resources.textures.insert(Texture::new_2d(backend.create_texture(), 64, 64)))
        .collect();

    // A font path on the command line adds a line of text to the 2D pass.
    let font = match std::env::args().nth(1) {
        Some(path) => {
            let bytes = std::fs::read(&path)?;
            let atlas = FontAtlas::from_bytes(&bytes, 32.0, ' ', '~', 512)?;
            log::info!("Rasterised {} glyphs into a {}x{} atlas", atlas.glyphs.len(), atlas.width, atlas.height);
            let texture = resources
                .textures
                .insert(Texture::new_2d(backend.create_texture(), atlas.width, atlas.height));
            Some(atlas.font(texture))
        }
        None => None,
    };

    let mut renderer = Renderer::new(settings);

    let (cube_vertices, cube_indices) = primitives::cube();
    let (quad_vertices, quad_indices) = primitives::quad();
    let (cube, quad) = {
        let mut ctx = RenderCtx::new(&resources, &mut backend);
        let cube = renderer.add_geometry(&mut ctx, meshes_vao, &cube_vertices, &cube_indices)?;
        let quad = renderer.add_geometry(&mut ctx, meshes_vao, &quad_vertices, &quad_indices)?;
        (cube, quad)
    };

    let mesh_material = Material::new(meshes)
        .with_texture(textures[0])
        .with_texture(textures[1])
        .with_shininess(16.0);

    for frame in 0..FRAMES {
        backend.clear_commands();
        let mut ctx = RenderCtx::new(&resources, &mut backend);
        renderer.begin();

        for i in 0..8 {
            let angle = (frame * 8 + i) as f32 * 0.3;
            let transform = Mat4::from_rotation_translation(
                Quat::from_rotation_y(angle),
                Vec3::new(i as f32 * 3.0 - 12.0, 0.0, -10.0),
            );
            let geometry = if i % 3 == 0 { quad } else { cube };
            renderer.submit_3d(&mut ctx, "prop", geometry, &mesh_material, transform, Vec4::ONE)?;
        }

        for i in 0..24 {
            let texture = textures[i % textures.len()];
            let material = Material::new(sprites).with_sub_texture(SubTexture::full(texture));
            let transform = Mat4::from_scale_rotation_translation(
                Vec3::splat(32.0),
                Quat::IDENTITY,
                Vec3::new((i % 6) as f32 * 40.0, (i / 6) as f32 * 40.0, (i % 4) as f32 * 0.1),
            );
            renderer.submit_2d(&mut ctx, &material, transform, Vec4::new(1.0, 1.0, 1.0, 0.8))?;
        }

        if let Some(font) = &font {
            renderer.submit_text(
                &mut ctx,
                "batched text",
                font,
                &Material::new(sprites),
                Vec3::new(16.0, 300.0, 0.5),
                1.0,
                Vec4::ONE,
            )?;
        }

        renderer.end(&mut ctx);
        log::info!("Frame {}: {:?}", frame, renderer.last_frame_stats());
    }

    for (i, commands) in backend.indirect_draws().iter().enumerate() {
        log::info!("Multi-draw {} of last frame: {:?}", i, commands);
    }
    log::info!("Indexed draws of last frame: {:?}", backend.indexed_draws());
    Ok(())
}

fn main() {
    wgpu_batcher::init_logging();
    if let Err(err) = run() {
        log::error!("Demo failed: {}", err);
        std::process::exit(1);
    }
}
