// src/renderer/wgpu_backend/textures.rs

use crate::renderer::backend::BackendError;
use crate::renderer::material::TextureKind;

pub(crate) const TEXTURE_FORMAT: wgpu::TextureFormat = wgpu::TextureFormat::Rgba8Unorm;

pub(crate) struct GpuTexture {
    pub(crate) kind: TextureKind,
    pub(crate) width: u32,
    pub(crate) height: u32,
    // Keeps the allocation alive alongside its view.
    #[allow(dead_code)]
    pub(crate) texture: wgpu::Texture,
    pub(crate) view: wgpu::TextureView,
}

fn check_len(width: u32, height: u32, layers: u32, len: usize) -> Result<(), BackendError> {
    let expected = width as usize * height as usize * layers as usize * 4;
    if len != expected {
        return Err(BackendError::Device(format!(
            "expected {expected} bytes of RGBA8 for {width}x{height}x{layers}, got {len}"
        )));
    }
    Ok(())
}

fn upload_layer(queue: &wgpu::Queue, texture: &wgpu::Texture, layer: u32, width: u32, height: u32, data: &[u8]) {
    queue.write_texture(
        wgpu::TexelCopyTextureInfo {
            texture,
            mip_level: 0,
            origin: wgpu::Origin3d {
                x: 0,
                y: 0,
                z: layer,
            },
            aspect: wgpu::TextureAspect::All,
        },
        data,
        wgpu::TexelCopyBufferLayout {
            offset: 0,
            bytes_per_row: Some(4 * width),
            rows_per_image: Some(height),
        },
        wgpu::Extent3d {
            width,
            height,
            depth_or_array_layers: 1,
        },
    );
}

/// Sampled 2D texture from tightly packed RGBA8 rows.
pub(crate) fn create_rgba8(
    device: &wgpu::Device,
    queue: &wgpu::Queue,
    label: &str,
    width: u32,
    height: u32,
    pixels: &[u8],
) -> Result<GpuTexture, BackendError> {
    if width == 0 || height == 0 {
        return Err(BackendError::Device(format!("texture '{label}' has zero size")));
    }
    check_len(width, height, 1, pixels.len())?;

    let texture = device.create_texture(&wgpu::TextureDescriptor {
        label: Some(label),
        size: wgpu::Extent3d {
            width,
            height,
            depth_or_array_layers: 1,
        },
        mip_level_count: 1,
        sample_count: 1,
        dimension: wgpu::TextureDimension::D2,
        format: TEXTURE_FORMAT,
        usage: wgpu::TextureUsages::TEXTURE_BINDING | wgpu::TextureUsages::COPY_DST,
        view_formats: &[],
    });
    upload_layer(queue, &texture, 0, width, height, pixels);
    let view = texture.create_view(&wgpu::TextureViewDescriptor::default());

    Ok(GpuTexture {
        kind: TextureKind::D2,
        width,
        height,
        texture,
        view,
    })
}

/// Cube texture from six square RGBA8 faces in +X, -X, +Y, -Y, +Z, -Z order.
pub(crate) fn create_cube(
    device: &wgpu::Device,
    queue: &wgpu::Queue,
    label: &str,
    size: u32,
    faces: [&[u8]; 6],
) -> Result<GpuTexture, BackendError> {
    if size == 0 {
        return Err(BackendError::Device(format!("cubemap '{label}' has zero size")));
    }
    for face in faces {
        check_len(size, size, 1, face.len())?;
    }

    let texture = device.create_texture(&wgpu::TextureDescriptor {
        label: Some(label),
        size: wgpu::Extent3d {
            width: size,
            height: size,
            depth_or_array_layers: 6,
        },
        mip_level_count: 1,
        sample_count: 1,
        dimension: wgpu::TextureDimension::D2,
        format: TEXTURE_FORMAT,
        usage: wgpu::TextureUsages::TEXTURE_BINDING | wgpu::TextureUsages::COPY_DST,
        view_formats: &[],
    });
    for (layer, face) in faces.iter().enumerate() {
        upload_layer(queue, &texture, layer as u32, size, size, face);
    }
    let view = texture.create_view(&wgpu::TextureViewDescriptor {
        label: Some(label),
        dimension: Some(wgpu::TextureViewDimension::Cube),
        array_layer_count: Some(6),
        ..Default::default()
    });

    Ok(GpuTexture {
        kind: TextureKind::Cube,
        width: size,
        height: size,
        texture,
        view,
    })
}

/// 1x1 white 2D texture and cube bound to units nothing else occupies.
pub(crate) fn create_fallbacks(device: &wgpu::Device, queue: &wgpu::Queue) -> Result<(GpuTexture, GpuTexture), BackendError> {
    const WHITE: [u8; 4] = [255; 4];
    let white: &[u8] = &WHITE;
    let flat = create_rgba8(device, queue, "Fallback Texture", 1, 1, white)?;
    let cube = create_cube(device, queue, "Fallback Cubemap", 1, [white; 6])?;
    Ok((flat, cube))
}

pub(crate) fn create_sampler(device: &wgpu::Device) -> wgpu::Sampler {
    device.create_sampler(&wgpu::SamplerDescriptor {
        label: Some("Batch Sampler"),
        address_mode_u: wgpu::AddressMode::ClampToEdge,
        address_mode_v: wgpu::AddressMode::ClampToEdge,
        address_mode_w: wgpu::AddressMode::ClampToEdge,
        mag_filter: wgpu::FilterMode::Linear,
        min_filter: wgpu::FilterMode::Linear,
        mipmap_filter: wgpu::FilterMode::Nearest,
        ..Default::default()
    })
}
