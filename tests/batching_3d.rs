mod common;

use common::{at, settings, Fixture};
use glam::Vec4;
use wgpu_batcher::renderer::{
    primitives, BackendCommand, Geometry, GeometryError, InstanceLayout, Material, RenderCtx, SubmitError, Vertex,
};
use wgpu_batcher::Renderer;

fn vertex_buffer(fx: &Fixture, vao: wgpu_batcher::asset::Handle<wgpu_batcher::renderer::VertexArray>) -> wgpu_batcher::renderer::BufferId {
    fx.resources.vertex_arrays.get(vao).unwrap().vertex_buffer.unwrap()
}

#[test]
fn instances_of_one_geometry_are_contiguous() {
    let mut fx = Fixture::new(settings(16));
    let vao = fx.vertex_array("meshes", InstanceLayout::Basic);
    let shader = fx.shader("meshes", 0, vao);
    let texture = fx.texture();
    let material = Material::new(shader).with_texture(texture);
    let (cube_vertices, cube_indices) = primitives::cube();
    let (quad_vertices, quad_indices) = primitives::quad();

    let mut renderer = Renderer::new(fx.settings.clone());
    {
        let mut ctx = RenderCtx::new(&fx.resources, &mut fx.backend);
        let cube = renderer.add_geometry(&mut ctx, vao, &cube_vertices, &cube_indices).unwrap();
        let quad = renderer.add_geometry(&mut ctx, vao, &quad_vertices, &quad_indices).unwrap();

        renderer.begin();
        for (geometry, x) in [(quad, 100.0), (cube, 0.0), (quad, 101.0), (cube, 1.0), (cube, 2.0)] {
            renderer
                .submit_3d(&mut ctx, "prop", geometry, &material, at(x, 0.0, 0.0), Vec4::ONE)
                .unwrap();
        }
        renderer.end(&mut ctx);
    }

    let draws = fx.backend.indirect_draws();
    assert_eq!(draws.len(), 1);
    let commands = draws[0];
    assert_eq!(commands.len(), 2);
    assert_eq!((commands[0].instance_count, commands[0].first_instance), (3, 0));
    assert_eq!((commands[1].instance_count, commands[1].first_instance), (2, 3));
    assert_eq!(commands[1].first_index, 36);
    assert_eq!(commands[1].base_vertex, 24);

    // Models follow the sorted order: every cube, then every quad.
    let models: Vec<[f32; 16]> = fx.stream_as(vao, 0);
    let xs: Vec<f32> = models[..5].iter().map(|m| m[12]).collect();
    assert_eq!(xs, vec![0.0, 1.0, 2.0, 100.0, 101.0]);

    let stats = renderer.last_frame_stats();
    assert_eq!(stats.multi_draw_calls, 1);
    assert_eq!(stats.instances, 5);

    // Counts are cleared once the run is drawn.
    let vbo = vertex_buffer(&fx, vao);
    let residency = renderer.renderer_3d().unwrap().residency();
    assert!(residency
        .commands(vbo)
        .iter()
        .all(|c| c.instance_count == 0 && c.first_instance == 0));
}

#[test]
fn full_queue_flushes_and_accepts_the_instance() {
    let mut config = settings(16);
    config.batch_capacity_3d = 2;
    let mut fx = Fixture::new(config);
    let vao = fx.vertex_array("meshes", InstanceLayout::Basic);
    let shader = fx.shader("meshes", 0, vao);
    let material = Material::new(shader);
    let (vertices, indices) = primitives::cube();

    let mut renderer = Renderer::new(fx.settings.clone());
    {
        let mut ctx = RenderCtx::new(&fx.resources, &mut fx.backend);
        let cube = renderer.add_geometry(&mut ctx, vao, &vertices, &indices).unwrap();
        renderer.begin();
        for x in 0..3 {
            renderer
                .submit_3d(&mut ctx, "crate", cube, &material, at(x as f32, 0.0, 0.0), Vec4::ONE)
                .unwrap();
        }
        renderer.end(&mut ctx);
    }

    let draws: Vec<Vec<(u32, u32)>> = fx
        .backend
        .indirect_draws()
        .iter()
        .map(|commands| commands.iter().map(|c| (c.instance_count, c.first_instance)).collect())
        .collect();
    assert_eq!(draws, vec![vec![(2, 0)], vec![(1, 0)]]);

    let stats = renderer.last_frame_stats();
    assert_eq!(stats.submissions, 3);
    assert_eq!(stats.dropped, 0);
    assert_eq!(stats.multi_draw_calls, 2);
}

#[test]
fn each_shader_run_draws_only_its_own_instances() {
    let mut fx = Fixture::new(settings(16));
    let vao = fx.vertex_array("meshes", InstanceLayout::Basic);
    let opaque = fx.shader("opaque", 0, vao);
    let glass = fx.shader("glass", 1, vao);
    let (vertices, indices) = primitives::cube();

    let mut renderer = Renderer::new(fx.settings.clone());
    {
        let mut ctx = RenderCtx::new(&fx.resources, &mut fx.backend);
        let cube = renderer.add_geometry(&mut ctx, vao, &vertices, &indices).unwrap();

        renderer.begin();
        for shader in [glass, opaque, opaque] {
            renderer
                .submit_3d(&mut ctx, "cube", cube, &Material::new(shader), at(0.0, 0.0, 0.0), Vec4::ONE)
                .unwrap();
        }
        renderer.end(&mut ctx);
    }

    let draws = fx.backend.indirect_draws();
    assert_eq!(draws.len(), 2);
    assert_eq!((draws[0][0].instance_count, draws[0][0].first_instance), (2, 0));
    assert_eq!((draws[1][0].instance_count, draws[1][0].first_instance), (1, 0));
}

#[test]
fn geometry_is_uploaded_after_previous_meshes() {
    let mut fx = Fixture::new(settings(16));
    let vao = fx.vertex_array("meshes", InstanceLayout::Basic);
    let (cube_vertices, cube_indices) = primitives::cube();
    let (quad_vertices, quad_indices) = primitives::quad();

    let mut renderer = Renderer::new(fx.settings.clone());
    let quad = {
        let mut ctx = RenderCtx::new(&fx.resources, &mut fx.backend);
        renderer.add_geometry(&mut ctx, vao, &cube_vertices, &cube_indices).unwrap();
        renderer.add_geometry(&mut ctx, vao, &quad_vertices, &quad_indices).unwrap()
    };
    assert_eq!((quad.id, quad.first_vertex, quad.first_index), (1, 24, 36));

    let vao_desc = fx.resources.vertex_arrays.get(vao).unwrap();
    let vertex_bytes = fx.backend.buffer_contents(vao_desc.vertex_buffer.unwrap()).unwrap();
    let start = Vertex::byte_offset(quad.first_vertex) as usize;
    let end = Vertex::byte_offset(quad.first_vertex + quad.vertex_count) as usize;
    let placed: Vec<Vertex> = bytemuck::pod_collect_to_vec(&vertex_bytes[start..end]);
    assert_eq!(placed, quad_vertices);

    let index_bytes = fx.backend.buffer_contents(vao_desc.index_buffer).unwrap();
    let placed: Vec<u32> = bytemuck::pod_collect_to_vec(&index_bytes[36 * 4..42 * 4]);
    assert_eq!(placed, quad_indices);
}

#[test]
fn geometry_over_capacity_is_rejected_without_side_effects() {
    let mut config = settings(16);
    config.vertex_capacity = 30;
    let mut fx = Fixture::new(config);
    let vao = fx.vertex_array("meshes", InstanceLayout::Basic);
    let (cube_vertices, cube_indices) = primitives::cube();
    let (quad_vertices, quad_indices) = primitives::quad();

    let mut renderer = Renderer::new(fx.settings.clone());
    let mut ctx = RenderCtx::new(&fx.resources, &mut fx.backend);
    renderer.add_geometry(&mut ctx, vao, &cube_vertices, &cube_indices).unwrap();

    let err = renderer.add_geometry(&mut ctx, vao, &cube_vertices, &cube_indices);
    assert!(matches!(
        err,
        Err(GeometryError::VertexCapacity {
            next: 24,
            requested: 24,
            capacity: 30
        })
    ));

    let quad = renderer.add_geometry(&mut ctx, vao, &quad_vertices, &quad_indices).unwrap();
    assert_eq!((quad.id, quad.first_vertex), (1, 24));
}

#[test]
fn foreign_geometry_is_rejected() {
    let mut fx = Fixture::new(settings(16));
    let meshes = fx.vertex_array("meshes", InstanceLayout::Basic);
    let lamps = fx.vertex_array("lamps", InstanceLayout::LightSource);
    let shader = fx.shader("meshes", 0, meshes);
    let (vertices, indices) = primitives::cube();

    let mut renderer = Renderer::new(fx.settings.clone());
    let vbo = vertex_buffer(&fx, meshes);
    let mut ctx = RenderCtx::new(&fx.resources, &mut fx.backend);
    let lamp = renderer.add_geometry(&mut ctx, lamps, &vertices, &indices).unwrap();
    renderer.begin();

    let err = renderer.submit_3d(&mut ctx, "lamp", lamp, &Material::new(shader), at(0.0, 0.0, 0.0), Vec4::ONE);
    assert!(matches!(err, Err(SubmitError::GeometryMismatch { .. })));

    let unplaced = Geometry {
        id: 5,
        vertex_count: 24,
        index_count: 36,
        first_vertex: 0,
        first_index: 0,
        vertex_buffer: vbo,
    };
    let err = renderer.submit_3d(&mut ctx, "ghost", unplaced, &Material::new(shader), at(0.0, 0.0, 0.0), Vec4::ONE);
    assert!(matches!(err, Err(SubmitError::UnknownGeometry(5))));

    renderer.end(&mut ctx);
    assert_eq!(renderer.last_frame_stats().dropped, 2);
    assert_eq!(renderer.last_frame_stats().draw_calls, 0);
}

#[test]
fn skybox_samples_its_cubemap_unit() {
    let mut fx = Fixture::new(settings(16));
    let vao = fx.vertex_array("sky", InstanceLayout::Skybox);
    let shader = fx.shader("sky", 0, vao);
    let cubemap = fx.cubemap();
    let cube_id = fx.resources.textures.get(cubemap).unwrap().id;
    let (vertices, indices) = primitives::cube();

    let mut renderer = Renderer::new(fx.settings.clone());
    {
        let mut ctx = RenderCtx::new(&fx.resources, &mut fx.backend);
        let cube = renderer.add_geometry(&mut ctx, vao, &vertices, &indices).unwrap();
        renderer.begin();
        renderer
            .submit_3d(&mut ctx, "sky", cube, &Material::new(shader).with_cubemap(cubemap), at(0.0, 0.0, 0.0), Vec4::ONE)
            .unwrap();
        renderer.end(&mut ctx);
    }

    assert!(fx
        .backend
        .commands()
        .contains(&BackendCommand::BindTexture { texture: cube_id, unit: 0 }));
    let units: Vec<u32> = fx.stream_as(vao, 0);
    assert_eq!(units[0], 0);
    let tints: Vec<[f32; 4]> = fx.stream_as(vao, 1);
    assert_eq!(tints[0], [1.0; 4]);
}

#[test]
fn meshes_are_drawn_before_quads() {
    let mut fx = Fixture::new(settings(16));
    let meshes = fx.vertex_array("meshes", InstanceLayout::Basic);
    let sprites = fx.vertex_array("sprites", InstanceLayout::Quad);
    let mesh_shader = fx.shader("meshes", 5, meshes);
    let sprite_shader = fx.shader("sprites", 0, sprites);
    let texture = fx.texture();
    let (vertices, indices) = primitives::cube();

    let mut renderer = Renderer::new(fx.settings.clone());
    {
        let mut ctx = RenderCtx::new(&fx.resources, &mut fx.backend);
        let cube = renderer.add_geometry(&mut ctx, meshes, &vertices, &indices).unwrap();
        renderer.begin();
        renderer
            .submit_2d(&mut ctx, &Material::new(sprite_shader).with_texture(texture), at(0.0, 0.0, 0.0), Vec4::ONE)
            .unwrap();
        renderer
            .submit_3d(&mut ctx, "cube", cube, &Material::new(mesh_shader), at(0.0, 0.0, 0.0), Vec4::ONE)
            .unwrap();
        renderer.end(&mut ctx);
    }

    let commands = fx.backend.commands();
    let multi = commands
        .iter()
        .position(|c| matches!(c, BackendCommand::MultiDrawIndexedIndirect { .. }))
        .unwrap();
    let indexed = commands
        .iter()
        .position(|c| matches!(c, BackendCommand::DrawIndexed { .. }))
        .unwrap();
    assert!(multi < indexed);
    assert_eq!(renderer.last_frame_stats().draw_calls, 2);
}
