mod common;

use common::{at, settings, Fixture};
use glam::Vec4;
use wgpu_batcher::renderer::{primitives, BackendCommand, InstanceLayout, Material, RenderCtx, SubmitError};
use wgpu_batcher::Renderer;

#[test]
fn reserved_texture_is_bound_once_per_flush() {
    let mut config = settings(4);
    config.reserved_texture_units = 1;
    let mut fx = Fixture::new(config);
    let vao = fx.vertex_array("sprites", InstanceLayout::Quad);
    let shader = fx.shader("sprites", 0, vao);
    let shadow_map = fx.texture();
    let sprite = fx.texture();
    let shadow_id = fx.resources.textures.get(shadow_map).unwrap().id;

    let mut renderer = Renderer::new(fx.settings.clone());
    renderer
        .renderer_2d_mut()
        .unwrap()
        .texture_units_mut()
        .set_reserved_unit(0, shadow_id)
        .unwrap();

    {
        let mut ctx = RenderCtx::new(&fx.resources, &mut fx.backend);
        renderer.begin();
        for texture in [shadow_map, sprite] {
            renderer
                .submit_2d(&mut ctx, &Material::new(shader).with_texture(texture), at(0.0, 0.0, 0.0), Vec4::ONE)
                .unwrap();
        }
        renderer.end(&mut ctx);
    }

    let binds: Vec<_> = fx
        .backend
        .commands()
        .iter()
        .filter_map(|c| match c {
            BackendCommand::BindTexture { texture, unit } => Some((*texture, *unit)),
            _ => None,
        })
        .collect();
    let sprite_id = fx.resources.textures.get(sprite).unwrap().id;
    // The reserved unit is bound up front; the quad using it never rebinds it.
    assert_eq!(binds, vec![(shadow_id, 0), (sprite_id, 1)]);
    assert_eq!(fx.backend.bound_texture(0), Some(shadow_id));
    assert_eq!(renderer.last_frame_stats().texture_binds, 2);

    let units: Vec<u32> = fx.stream_as(vao, 2);
    assert_eq!(&units[..8], &[0, 0, 0, 0, 1, 1, 1, 1]);
}

#[test]
fn oversized_material_is_rejected_at_submit() {
    let mut fx = Fixture::new(settings(2));
    let vao = fx.vertex_array("meshes", InstanceLayout::Basic);
    let shader = fx.shader("meshes", 0, vao);
    let textures: Vec<_> = (0..3).map(|_| fx.texture()).collect();
    let material = textures
        .iter()
        .fold(Material::new(shader), |m, &t| m.with_texture(t));

    let mut renderer = Renderer::new(fx.settings.clone());
    let (vertices, indices) = primitives::cube();
    let mut ctx = RenderCtx::new(&fx.resources, &mut fx.backend);
    let cube = renderer.add_geometry(&mut ctx, vao, &vertices, &indices).unwrap();
    renderer.begin();
    let err = renderer.submit_3d(&mut ctx, "cube", cube, &material, at(0.0, 0.0, 0.0), Vec4::ONE);
    assert!(matches!(
        err,
        Err(SubmitError::TooManyTextures { needed: 3, available: 2 })
    ));
}
