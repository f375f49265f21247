//! Instance-data generation.
//!
//! Turns a run of same-shader submissions into one packed byte array per
//! channel of the vertex array's [`InstanceLayout`] and uploads each array to
//! the stream buffer at the channel's slot. 2D layouts emit four vertices per
//! quad, 3D layouts one element per instance.

use bytemuck::Pod;
use glam::{Mat4, Vec2, Vec4};

use super::backend::RenderBackend;
use super::batch::{Submission2D, Submission3D};
use super::draw::DrawError;
use super::material::{InstanceLayout, SubTexture, VertexArray};
use crate::asset::Handle;

/// Corners of the unit quad in vertex order. Local positions and UV weights
/// are both taken from these.
pub const QUAD_CORNERS: [Vec2; 4] = [
    Vec2::new(0.0, 0.0),
    Vec2::new(1.0, 0.0),
    Vec2::new(1.0, 1.0),
    Vec2::new(0.0, 1.0),
];

/// Indices of quad `i` in the shared 2D index pattern.
pub fn quad_indices(i: u32) -> [u32; 6] {
    let base = 4 * i;
    [base, base + 1, base + 2, base + 2, base + 3, base]
}

/// RGBA tint packed as `r | g << 8 | b << 16 | a << 24`.
pub fn pack_tint(tint: Vec4) -> u32 {
    let [r, g, b, a] = tint
        .clamp(Vec4::ZERO, Vec4::ONE)
        .to_array()
        .map(|c| (c * 255.0).round() as u32);
    r | (g << 8) | (b << 16) | (a << 24)
}

/// UV bounds used when a submission carries fewer sub-textures than its
/// layout samples. The handle is never resolved.
const FULL_UV: SubTexture = SubTexture {
    texture: Handle::new(u32::MAX),
    uv_min: Vec2::ZERO,
    uv_max: Vec2::ONE,
};

/// Scratch storage reused across runs.
#[derive(Debug, Default)]
pub struct InstanceWriter {
    channels: Vec<Vec<u8>>,
    layout: Option<InstanceLayout>,
    elements: usize,
}

impl InstanceWriter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Packed bytes of `slot` from the last generation.
    pub fn channel(&self, slot: usize) -> &[u8] {
        self.channels.get(slot).map_or(&[], Vec::as_slice)
    }

    /// Elements written per channel by the last generation.
    pub fn element_count(&self) -> usize {
        self.elements
    }

    fn reset(&mut self, layout: InstanceLayout, submissions: usize) {
        let streams = layout.stream_count();
        self.channels.resize_with(streams, Vec::new);
        let per_element = layout.elements_per_submission() * submissions;
        for (channel, desc) in self.channels.iter_mut().zip(layout.channels()) {
            channel.clear();
            channel.reserve(desc.stride * per_element);
        }
        self.layout = Some(layout);
        self.elements = per_element;
    }

    fn push<T: Pod>(&mut self, slot: usize, value: &T) {
        self.channels[slot].extend_from_slice(bytemuck::bytes_of(value));
    }

    /// Builds per-vertex quad data for `entries`.
    pub fn generate_2d(
        &mut self,
        layout: InstanceLayout,
        entries: &[Submission2D],
    ) -> Result<(), DrawError> {
        match layout {
            InstanceLayout::Quad => {
                self.reset(layout, entries.len());
                for entry in entries {
                    let sub = entry.sub_textures.first().unwrap_or(&FULL_UV);
                    let unit = entry.units.first().copied().unwrap_or(0);
                    let tint = pack_tint(entry.tint);
                    for corner in QUAD_CORNERS {
                        self.push(0, &corner_position(&entry.transform, corner));
                        self.push(1, &sub.uv_at(corner).to_array());
                        self.push(2, &unit);
                        self.push(3, &tint);
                    }
                }
            }
            InstanceLayout::MultiQuad => {
                self.reset(layout, entries.len());
                for entry in entries {
                    let sub0 = entry.sub_textures.first().unwrap_or(&FULL_UV);
                    let sub1 = entry.sub_textures.get(1).unwrap_or(sub0);
                    let units = [
                        entry.units.first().copied().unwrap_or(0),
                        entry.units.get(1).copied().unwrap_or(0),
                    ];
                    let tint = pack_tint(entry.tint);
                    for corner in QUAD_CORNERS {
                        self.push(0, &corner_position(&entry.transform, corner));
                        self.push(1, &sub0.uv_at(corner).to_array());
                        self.push(2, &sub1.uv_at(corner).to_array());
                        self.push(3, &units);
                        self.push(4, &tint);
                    }
                }
            }
            other => return Err(mismatch(other)),
        }
        Ok(())
    }

    /// Builds per-instance data for `entries` in the order given.
    pub fn generate_3d(
        &mut self,
        layout: InstanceLayout,
        entries: &[Submission3D],
    ) -> Result<(), DrawError> {
        if layout.is_2d() {
            return Err(mismatch(layout));
        }

        self.reset(layout, entries.len());
        for entry in entries {
            let model = entry.transform.to_cols_array_2d();
            let tint = entry.tint.to_array();
            let uv_rect = entry.sub_textures.first().unwrap_or(&FULL_UV).uv_rect();
            let unit = |i: usize| entry.units.get(i).copied().unwrap_or(0);

            match layout {
                InstanceLayout::Basic => {
                    self.push(0, &model);
                    self.push(1, &[unit(0), unit(1)]);
                    self.push(2, &tint);
                    self.push(3, &entry.shininess);
                    self.push(4, &uv_rect);
                }
                InstanceLayout::Skybox => {
                    self.push(0, &entry.cube_units.first().copied().unwrap_or(0));
                    self.push(1, &tint);
                }
                InstanceLayout::LightSource => {
                    self.push(0, &model);
                    self.push(1, &tint);
                }
                InstanceLayout::Terrain => {
                    self.push(0, &model);
                    self.push(1, &unit(0));
                    self.push(2, &tint);
                    self.push(3, &uv_rect);
                }
                InstanceLayout::Quad | InstanceLayout::MultiQuad => return Err(mismatch(layout)),
            }
        }
        Ok(())
    }

    /// Writes every generated channel to offset zero of its stream buffer.
    /// Returns the number of bytes uploaded.
    pub fn upload(
        &self,
        backend: &mut dyn RenderBackend,
        vertex_array: &VertexArray,
    ) -> Result<usize, DrawError> {
        let Some(layout) = self.layout else {
            return Ok(0);
        };
        if layout != vertex_array.layout {
            return Err(DrawError::LayoutMismatch {
                vertex_array: vertex_array.name.clone(),
                layout: vertex_array.layout,
            });
        }

        let mut written = 0;
        for desc in layout.channels() {
            let stream = vertex_array
                .streams
                .get(desc.slot)
                .copied()
                .ok_or_else(|| DrawError::MissingStream {
                    vertex_array: vertex_array.name.clone(),
                    slot: desc.slot,
                    available: vertex_array.streams.len(),
                })?;
            let bytes = self.channel(desc.slot);
            if bytes.is_empty() {
                continue;
            }
            backend.write_buffer(stream, 0, bytes)?;
            written += bytes.len();
        }
        Ok(written)
    }
}

fn corner_position(transform: &Mat4, corner: Vec2) -> [f32; 3] {
    transform.transform_point3(corner.extend(0.0)).to_array()
}

fn mismatch(layout: InstanceLayout) -> DrawError {
    DrawError::LayoutMismatch {
        vertex_array: format!("{layout:?}"),
        layout,
    }
}
