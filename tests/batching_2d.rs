mod common;

use common::{at, settings, Fixture};
use glam::{Vec2, Vec3, Vec4};
use wgpu_batcher::renderer::{
    BackendCommand, Font, Glyph, InstanceLayout, Material, RenderCtx, SubTexture, SubmitError,
};
use wgpu_batcher::Renderer;

#[test]
fn five_quads_share_one_draw() {
    let mut fx = Fixture::new(settings(16));
    let vao = fx.vertex_array("sprites", InstanceLayout::Quad);
    let shader = fx.shader("sprites", 0, vao);
    let texture = fx.texture();
    let material = Material::new(shader).with_texture(texture);

    let mut renderer = Renderer::new(fx.settings.clone());
    {
        let mut ctx = RenderCtx::new(&fx.resources, &mut fx.backend);
        renderer.begin();
        for i in 0..5 {
            renderer
                .submit_2d(&mut ctx, &material, at(i as f32 * 10.0, 0.0, 0.0), Vec4::ONE)
                .unwrap();
        }
        renderer.end(&mut ctx);
    }

    assert_eq!(fx.backend.indexed_draws(), vec![30]);
    let stats = renderer.last_frame_stats();
    assert_eq!(stats.submissions, 5);
    assert_eq!(stats.draw_calls, 1);
    assert_eq!(stats.instances, 5);
    assert_eq!(stats.texture_binds, 1);

    // Corner positions follow the transform; four vertices per quad.
    let positions: Vec<[f32; 3]> = fx.stream_as(vao, 0);
    assert_eq!(positions[0], [0.0, 0.0, 0.0]);
    assert_eq!(positions[2], [1.0, 1.0, 0.0]);
    assert_eq!(positions[4 * 4], [40.0, 0.0, 0.0]);
}

#[test]
fn draw_sequence_binds_state_before_drawing() {
    let mut fx = Fixture::new(settings(4));
    let vao = fx.vertex_array("sprites", InstanceLayout::Quad);
    let shader = fx.shader("sprites", 0, vao);
    let texture = fx.texture();
    let material = Material::new(shader).with_texture(texture);
    let program = fx.resources.shaders.get(shader).unwrap().program;

    let mut renderer = Renderer::new(fx.settings.clone());
    {
        let mut ctx = RenderCtx::new(&fx.resources, &mut fx.backend);
        renderer.begin();
        renderer.submit_2d(&mut ctx, &material, at(0.0, 0.0, 0.0), Vec4::ONE).unwrap();
        renderer.end(&mut ctx);
    }

    let commands: Vec<&BackendCommand> = fx
        .backend
        .commands()
        .iter()
        .filter(|c| !matches!(c, BackendCommand::WriteBuffer { .. }))
        .collect();
    assert!(matches!(commands[0], BackendCommand::BindTexture { unit: 0, .. }));
    assert_eq!(*commands[1], BackendCommand::UseProgram(program));
    assert!(matches!(
        commands[2],
        BackendCommand::SetIntArray { values, .. } if values == &vec![0, 1, 2, 3]
    ));
    assert!(matches!(commands[3], BackendCommand::AttachUniformBlock { block, .. } if block == "camera"));
    assert!(matches!(commands[4], BackendCommand::BindVertexArray(_)));
    assert_eq!(*commands[5], BackendCommand::DrawIndexed { index_count: 6 });
    assert_eq!(*commands[6], BackendCommand::ReleaseProgram(program));
}

#[test]
fn shader_importance_orders_and_groups_runs() {
    let mut fx = Fixture::new(settings(16));
    let vao = fx.vertex_array("sprites", InstanceLayout::Quad);
    let background = fx.shader("background", 0, vao);
    let overlay = fx.shader("overlay", 1, vao);
    let texture = fx.texture();
    let overlay_program = fx.resources.shaders.get(overlay).unwrap().program;
    let background_program = fx.resources.shaders.get(background).unwrap().program;

    let mut renderer = Renderer::new(fx.settings.clone());
    {
        let mut ctx = RenderCtx::new(&fx.resources, &mut fx.backend);
        renderer.begin();
        for shader in [overlay, background, overlay, background, overlay] {
            let material = Material::new(shader).with_texture(texture);
            renderer.submit_2d(&mut ctx, &material, at(0.0, 0.0, 0.0), Vec4::ONE).unwrap();
        }
        renderer.end(&mut ctx);
    }

    assert_eq!(fx.backend.indexed_draws(), vec![12, 18]);
    let programs: Vec<_> = fx
        .backend
        .commands()
        .iter()
        .filter_map(|c| match c {
            BackendCommand::UseProgram(p) => Some(*p),
            _ => None,
        })
        .collect();
    assert_eq!(programs, vec![background_program, overlay_program]);
}

#[test]
fn quads_are_drawn_back_to_front_by_depth() {
    let mut fx = Fixture::new(settings(16));
    let vao = fx.vertex_array("sprites", InstanceLayout::Quad);
    let shader = fx.shader("sprites", 0, vao);
    let texture = fx.texture();
    let material = Material::new(shader).with_texture(texture);

    let mut renderer = Renderer::new(fx.settings.clone());
    {
        let mut ctx = RenderCtx::new(&fx.resources, &mut fx.backend);
        renderer.begin();
        for z in [0.5, 0.1, 0.3] {
            renderer.submit_2d(&mut ctx, &material, at(0.0, 0.0, z), Vec4::ONE).unwrap();
        }
        renderer.end(&mut ctx);
    }

    let positions: Vec<[f32; 3]> = fx.stream_as(vao, 0);
    let depths: Vec<f32> = (0..3).map(|quad| positions[quad * 4][2]).collect();
    assert_eq!(depths, vec![0.1, 0.3, 0.5]);
}

#[test]
fn running_out_of_units_splits_the_run() {
    let mut fx = Fixture::new(settings(4));
    let vao = fx.vertex_array("sprites", InstanceLayout::Quad);
    let shader = fx.shader("sprites", 0, vao);
    let textures: Vec<_> = (0..6).map(|_| fx.texture()).collect();

    let mut renderer = Renderer::new(fx.settings.clone());
    {
        let mut ctx = RenderCtx::new(&fx.resources, &mut fx.backend);
        renderer.begin();
        for &texture in &textures {
            let material = Material::new(shader).with_texture(texture);
            renderer.submit_2d(&mut ctx, &material, at(0.0, 0.0, 0.0), Vec4::ONE).unwrap();
        }
        renderer.end(&mut ctx);
    }

    assert_eq!(fx.backend.indexed_draws(), vec![24, 12]);
    assert_eq!(renderer.last_frame_stats().texture_binds, 6);

    // The second run reuses units from zero.
    let units: Vec<u32> = fx.stream_as(vao, 2);
    assert_eq!(&units[..8], &[0, 0, 0, 0, 1, 1, 1, 1]);
}

#[test]
fn full_queue_flushes_and_accepts_the_submission() {
    let mut config = settings(16);
    config.batch_capacity_2d = 4;
    let mut fx = Fixture::new(config);
    let vao = fx.vertex_array("sprites", InstanceLayout::Quad);
    let shader = fx.shader("sprites", 0, vao);
    let texture = fx.texture();
    let material = Material::new(shader).with_texture(texture);

    let mut renderer = Renderer::new(fx.settings.clone());
    {
        let mut ctx = RenderCtx::new(&fx.resources, &mut fx.backend);
        renderer.begin();
        for _ in 0..6 {
            renderer.submit_2d(&mut ctx, &material, at(0.0, 0.0, 0.0), Vec4::ONE).unwrap();
        }
        renderer.end(&mut ctx);
    }

    assert_eq!(fx.backend.indexed_draws(), vec![24, 12]);
    assert_eq!(renderer.last_frame_stats().submissions, 6);
    assert_eq!(renderer.last_frame_stats().dropped, 0);
}

#[test]
fn invalid_submissions_are_dropped_and_counted() {
    let mut fx = Fixture::new(settings(16));
    let vao = fx.vertex_array("sprites", InstanceLayout::Quad);
    let shader = fx.shader("sprites", 0, vao);
    let texture = fx.texture();

    let mut renderer = Renderer::new(fx.settings.clone());
    {
        let mut ctx = RenderCtx::new(&fx.resources, &mut fx.backend);
        renderer.begin();

        let err = renderer.submit_2d(&mut ctx, &Material::default(), at(0.0, 0.0, 0.0), Vec4::ONE);
        assert!(matches!(err, Err(SubmitError::MissingShader)));

        let dangling = Material::new(shader).with_texture(wgpu_batcher::asset::Handle::new(999));
        let err = renderer.submit_2d(&mut ctx, &dangling, at(0.0, 0.0, 0.0), Vec4::ONE);
        assert!(matches!(err, Err(SubmitError::MissingTexture { index: 0, .. })));

        let valid = Material::new(shader).with_texture(texture);
        renderer.submit_2d(&mut ctx, &valid, at(0.0, 0.0, 0.0), Vec4::ONE).unwrap();
        renderer.end(&mut ctx);
    }

    assert_eq!(fx.backend.indexed_draws(), vec![6]);
    let stats = renderer.last_frame_stats();
    assert_eq!(stats.dropped, 2);
    assert_eq!(stats.submissions, 1);
}

#[test]
fn sub_texture_uvs_reach_the_uv_stream() {
    let mut fx = Fixture::new(settings(16));
    let vao = fx.vertex_array("sprites", InstanceLayout::Quad);
    let shader = fx.shader("sprites", 0, vao);
    let texture = fx.texture();
    let sub = SubTexture::new(texture, Vec2::new(0.25, 0.5), Vec2::new(0.5, 1.0));
    let material = Material::new(shader).with_sub_texture(sub);

    let mut renderer = Renderer::new(fx.settings.clone());
    {
        let mut ctx = RenderCtx::new(&fx.resources, &mut fx.backend);
        renderer.begin();
        renderer.submit_2d(&mut ctx, &material, at(0.0, 0.0, 0.0), Vec4::ONE).unwrap();
        renderer.end(&mut ctx);
    }

    let uvs: Vec<[f32; 2]> = fx.stream_as(vao, 1);
    assert_eq!(&uvs[..4], &[[0.25, 0.5], [0.5, 0.5], [0.5, 1.0], [0.25, 1.0]]);
}

fn test_font(atlas: wgpu_batcher::asset::Handle<wgpu_batcher::renderer::Texture>) -> Font {
    let glyph = |advance| Glyph {
        size: Vec2::new(8.0, 10.0),
        bearing: Vec2::new(1.0, 9.0),
        advance,
        uv_min: Vec2::ZERO,
        uv_max: Vec2::splat(0.5),
    };
    let space = Glyph {
        size: Vec2::ZERO,
        bearing: Vec2::ZERO,
        advance: 5.0,
        uv_min: Vec2::ZERO,
        uv_max: Vec2::ZERO,
    };
    Font {
        atlas,
        first_glyph: ' ',
        last_glyph: 'b',
        // ' ', '!'..'`' placeholders, 'a', 'b'
        glyphs: std::iter::once(space)
            .chain((0..64).map(|_| glyph(9.0)))
            .chain([glyph(10.0), glyph(12.0)])
            .collect(),
        line_height: 20.0,
    }
}

#[test]
fn text_submits_one_quad_per_visible_glyph() {
    let mut fx = Fixture::new(settings(16));
    let vao = fx.vertex_array("text", InstanceLayout::Quad);
    let shader = fx.shader("text", 0, vao);
    let atlas = fx.texture();
    let font = test_font(atlas);
    assert_eq!(font.glyph('a').map(|g| g.advance), Some(10.0));

    let mut renderer = Renderer::new(fx.settings.clone());
    let submitted = {
        let mut ctx = RenderCtx::new(&fx.resources, &mut fx.backend);
        renderer.begin();
        let submitted = renderer
            .submit_text(
                &mut ctx,
                "ab a\nb",
                &font,
                &Material::new(shader),
                Vec3::new(100.0, 200.0, 0.0),
                1.0,
                Vec4::ONE,
            )
            .unwrap();
        renderer.end(&mut ctx);
        submitted
    };

    assert_eq!(submitted, 4);
    assert_eq!(fx.backend.indexed_draws(), vec![24]);

    // First corner of each glyph: pen x + bearing, baseline - descent.
    let positions: Vec<[f32; 3]> = fx.stream_as(vao, 0);
    let origins: Vec<[f32; 2]> = (0..4).map(|q| [positions[q * 4][0], positions[q * 4][1]]).collect();
    assert_eq!(
        origins,
        vec![[101.0, 199.0], [111.0, 199.0], [128.0, 199.0], [101.0, 179.0]]
    );
}

#[test]
fn characters_outside_the_font_advance_without_drawing() {
    let mut fx = Fixture::new(settings(16));
    let vao = fx.vertex_array("text", InstanceLayout::Quad);
    let shader = fx.shader("text", 0, vao);
    let atlas = fx.texture();
    let glyph = |advance| Glyph {
        size: Vec2::new(8.0, 10.0),
        bearing: Vec2::new(0.0, 9.0),
        advance,
        uv_min: Vec2::ZERO,
        uv_max: Vec2::ONE,
    };
    let font = Font {
        atlas,
        first_glyph: 'a',
        last_glyph: 'b',
        glyphs: vec![glyph(10.0), glyph(12.0)],
        line_height: 20.0,
    };

    let mut renderer = Renderer::new(fx.settings.clone());
    let submitted = {
        let mut ctx = RenderCtx::new(&fx.resources, &mut fx.backend);
        renderer.begin();
        let submitted = renderer
            .submit_text(&mut ctx, "~a~b~a", &font, &Material::new(shader), Vec3::ZERO, 1.0, Vec4::ONE)
            .unwrap();
        renderer.end(&mut ctx);
        submitted
    };

    // A leading unknown character has no advance to reuse; later ones reuse
    // the advance of the glyph before them.
    assert_eq!(submitted, 3);
    let positions: Vec<[f32; 3]> = fx.stream_as(vao, 0);
    let xs: Vec<f32> = (0..3).map(|q| positions[q * 4][0]).collect();
    assert_eq!(xs, vec![0.0, 20.0, 44.0]);
}
