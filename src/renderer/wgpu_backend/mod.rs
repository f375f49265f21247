//! wgpu implementation of [`RenderBackend`].
//!
//! Resources are created through inherent methods and addressed by the same
//! opaque ids the batching core uses. Buffer edits made inside a frame are
//! staged and recorded as buffer-to-buffer copies on the frame encoder, so
//! every draw sees exactly the bytes written before it. Each draw records its
//! own render pass that loads the target.
//!
//! Bind group 0 holds the program's uniform blocks in attach order. Bind
//! group 1 holds the texture units: `N` 2D textures, one cube texture, the
//! sampler and the unit table (see [`quad_shader`] for the matching WGSL).

mod pipeline;
mod textures;

use std::collections::HashMap;

use wgpu::util::DeviceExt;

use super::backend::{BackendError, BufferId, RenderBackend, ShaderId, TextureId, VertexArrayId};
use super::geometry::DrawCommand;
use super::material::TextureKind;
use pipeline::{texture_unit_layout, uniform_block_layout, unit_table_size, PipelineBuilder, StreamLayouts};
use textures::GpuTexture;

pub use pipeline::{quad_shader, ProgramDescriptor};

/// What a buffer created by [`WgpuBackend::create_buffer`] is bound as.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BufferUsage {
    Vertex,
    Index,
    Indirect,
    Uniform,
}

impl BufferUsage {
    fn usages(self) -> wgpu::BufferUsages {
        let usage = match self {
            BufferUsage::Vertex => wgpu::BufferUsages::VERTEX,
            BufferUsage::Index => wgpu::BufferUsages::INDEX,
            BufferUsage::Indirect => wgpu::BufferUsages::INDIRECT,
            BufferUsage::Uniform => wgpu::BufferUsages::UNIFORM,
        };
        usage | wgpu::BufferUsages::COPY_DST
    }
}

struct GpuBuffer {
    buffer: wgpu::Buffer,
    size: u64,
    /// CPU copy of indirect buffers, replayed as direct draws when the device
    /// cannot honour a non-zero first instance in indirect commands.
    shadow: Option<Vec<u8>>,
}

struct GpuProgram {
    label: String,
    pipeline: wgpu::RenderPipeline,
    block_layout: wgpu::BindGroupLayout,
    blocks: Vec<String>,
    attached: Vec<Option<BufferId>>,
    unit_table_uniform: String,
    unit_table: wgpu::Buffer,
}

struct GpuVertexArray {
    /// Static vertex buffer (if any) followed by the streams in slot order.
    buffers: Vec<BufferId>,
    index_buffer: Option<BufferId>,
}

struct Frame {
    encoder: wgpu::CommandEncoder,
    color: wgpu::TextureView,
    depth: Option<wgpu::TextureView>,
}

#[derive(Clone, Copy)]
enum DrawCall {
    Indexed(u32),
    Indirect(u32),
}

pub struct WgpuBackend {
    device: wgpu::Device,
    queue: wgpu::Queue,
    color_format: wgpu::TextureFormat,
    depth_format: Option<wgpu::TextureFormat>,
    indirect_first_instance: bool,
    buffers: Vec<GpuBuffer>,
    programs: Vec<GpuProgram>,
    textures: Vec<GpuTexture>,
    vertex_arrays: Vec<GpuVertexArray>,
    uniform_blocks: HashMap<String, BufferId>,
    unit_layout: wgpu::BindGroupLayout,
    sampler: wgpu::Sampler,
    fallback_2d: GpuTexture,
    fallback_cube: GpuTexture,
    units: Vec<Option<TextureId>>,
    cube: Option<TextureId>,
    frame: Option<Frame>,
    program: Option<ShaderId>,
    vertex_array: Option<VertexArrayId>,
    indirect: Option<BufferId>,
}

fn lookup(buffers: &[GpuBuffer], id: BufferId) -> Result<&GpuBuffer, BackendError> {
    buffers.get(id.index()).ok_or(BackendError::UnknownBuffer(id))
}

fn bound_view(textures: &[GpuTexture], id: Option<TextureId>, kind: TextureKind) -> Option<&wgpu::TextureView> {
    id.and_then(|id| textures.get(id.index()))
        .filter(|t| t.kind == kind)
        .map(|t| &t.view)
}

/// Records `data` into `target` at `offset`: as a staged copy when a frame is
/// open, straight through the queue otherwise.
fn stage_write(
    device: &wgpu::Device,
    queue: &wgpu::Queue,
    frame: Option<&mut Frame>,
    target: &wgpu::Buffer,
    offset: u64,
    data: &[u8],
) {
    match frame {
        Some(frame) => {
            let staging = device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
                label: Some("Staging Buffer"),
                contents: data,
                usage: wgpu::BufferUsages::COPY_SRC,
            });
            frame
                .encoder
                .copy_buffer_to_buffer(&staging, 0, target, offset, data.len() as u64);
        }
        None => queue.write_buffer(target, offset, data),
    }
}

impl WgpuBackend {
    /// Wraps an existing device. `texture_units` is clamped so the units plus
    /// the cube binding fit the device's sampled-texture limit.
    pub fn new(
        device: wgpu::Device,
        queue: wgpu::Queue,
        color_format: wgpu::TextureFormat,
        depth_format: Option<wgpu::TextureFormat>,
        texture_units: u32,
    ) -> Result<Self, BackendError> {
        let max_units = device
            .limits()
            .max_sampled_textures_per_shader_stage
            .saturating_sub(1)
            .max(1);
        let units = texture_units.clamp(1, max_units);
        if units != texture_units {
            log::warn!(
                "Requested {} texture units, device allows {}; using {}",
                texture_units,
                max_units,
                units
            );
        }

        let indirect_first_instance = device
            .features()
            .contains(wgpu::Features::INDIRECT_FIRST_INSTANCE);
        if !indirect_first_instance {
            log::warn!("INDIRECT_FIRST_INSTANCE unavailable; multi-draws are replayed as direct draws");
        }

        let (fallback_2d, fallback_cube) = textures::create_fallbacks(&device, &queue)?;
        let unit_layout = texture_unit_layout(&device, units);
        let sampler = textures::create_sampler(&device);

        Ok(Self {
            device,
            queue,
            color_format,
            depth_format,
            indirect_first_instance,
            buffers: Vec::new(),
            programs: Vec::new(),
            textures: Vec::new(),
            vertex_arrays: Vec::new(),
            uniform_blocks: HashMap::new(),
            unit_layout,
            sampler,
            fallback_2d,
            fallback_cube,
            units: vec![None; units as usize],
            cube: None,
            frame: None,
            program: None,
            vertex_array: None,
            indirect: None,
        })
    }

    /// Acquires an adapter without a surface and renders into offscreen
    /// `Rgba8UnormSrgb` colour and `Depth32Float` depth targets.
    pub fn headless(texture_units: u32) -> Result<Self, BackendError> {
        pollster::block_on(Self::request_headless(texture_units))
    }

    async fn request_headless(texture_units: u32) -> Result<Self, BackendError> {
        let instance = wgpu::Instance::new(&wgpu::InstanceDescriptor {
            backends: wgpu::Backends::all(),
            ..Default::default()
        });

        let adapter = instance
            .request_adapter(&wgpu::RequestAdapterOptions {
                power_preference: wgpu::PowerPreference::HighPerformance,
                compatible_surface: None,
                force_fallback_adapter: false,
            })
            .await
            .map_err(|err| BackendError::Device(err.to_string()))?;
        log::info!("Using adapter: {:?}", adapter.get_info());

        let mut required_features = wgpu::Features::empty();
        if adapter
            .features()
            .contains(wgpu::Features::INDIRECT_FIRST_INSTANCE)
        {
            required_features |= wgpu::Features::INDIRECT_FIRST_INSTANCE;
        }

        let (device, queue) = adapter
            .request_device(&wgpu::DeviceDescriptor {
                label: Some("Batcher Device"),
                required_features,
                required_limits: adapter.limits(),
                experimental_features: wgpu::ExperimentalFeatures::disabled(),
                memory_hints: wgpu::MemoryHints::Performance,
                trace: wgpu::Trace::Off,
            })
            .await
            .map_err(|err| BackendError::Device(err.to_string()))?;

        Self::new(
            device,
            queue,
            wgpu::TextureFormat::Rgba8UnormSrgb,
            Some(wgpu::TextureFormat::Depth32Float),
            texture_units,
        )
    }

    pub fn device(&self) -> &wgpu::Device {
        &self.device
    }

    pub fn queue(&self) -> &wgpu::Queue {
        &self.queue
    }

    pub fn color_format(&self) -> wgpu::TextureFormat {
        self.color_format
    }

    pub fn depth_format(&self) -> Option<wgpu::TextureFormat> {
        self.depth_format
    }

    pub fn texture_units(&self) -> u32 {
        self.units.len() as u32
    }

    pub fn supports_indirect_first_instance(&self) -> bool {
        self.indirect_first_instance
    }

    pub fn create_buffer(&mut self, label: &str, size: u64, usage: BufferUsage) -> BufferId {
        let buffer = self.device.create_buffer(&wgpu::BufferDescriptor {
            label: Some(label),
            size: size.max(4).next_multiple_of(wgpu::COPY_BUFFER_ALIGNMENT),
            usage: usage.usages(),
            mapped_at_creation: false,
        });
        let shadow = (usage == BufferUsage::Indirect).then(|| vec![0; size as usize]);
        let id = BufferId(self.buffers.len() as u32);
        self.buffers.push(GpuBuffer {
            buffer,
            size,
            shadow,
        });
        id
    }

    /// Creates a uniform buffer programs can attach under `name`.
    pub fn register_uniform_block(&mut self, name: &str, size: u64) -> BufferId {
        let id = self.create_buffer(name, size, BufferUsage::Uniform);
        if self.uniform_blocks.insert(name.to_string(), id).is_some() {
            log::warn!("Uniform block '{}' re-registered", name);
        }
        id
    }

    fn push_texture(&mut self, texture: GpuTexture) -> TextureId {
        let id = TextureId(self.textures.len() as u32);
        self.textures.push(texture);
        id
    }

    pub fn create_texture_rgba8(
        &mut self,
        label: &str,
        width: u32,
        height: u32,
        pixels: &[u8],
    ) -> Result<TextureId, BackendError> {
        let texture = textures::create_rgba8(&self.device, &self.queue, label, width, height, pixels)?;
        Ok(self.push_texture(texture))
    }

    pub fn create_texture_from_image(
        &mut self,
        label: &str,
        image: &image::DynamicImage,
    ) -> Result<TextureId, BackendError> {
        let rgba = image.to_rgba8();
        let (width, height) = rgba.dimensions();
        self.create_texture_rgba8(label, width, height, rgba.as_raw())
    }

    /// Faces in +X, -X, +Y, -Y, +Z, -Z order, each `size` x `size` RGBA8.
    pub fn create_cubemap(&mut self, label: &str, size: u32, faces: [&[u8]; 6]) -> Result<TextureId, BackendError> {
        let texture = textures::create_cube(&self.device, &self.queue, label, size, faces)?;
        Ok(self.push_texture(texture))
    }

    pub fn texture_size(&self, texture: TextureId) -> Option<(u32, u32)> {
        self.textures
            .get(texture.index())
            .map(|t| (t.width, t.height))
    }

    /// Groups `vertex_buffer` (3D layouts) and `streams` in slot order with an
    /// index buffer. The order must match the program's [`InstanceLayout`].
    ///
    /// [`InstanceLayout`]: crate::renderer::InstanceLayout
    pub fn create_vertex_array(
        &mut self,
        vertex_buffer: Option<BufferId>,
        streams: &[BufferId],
        index_buffer: Option<BufferId>,
    ) -> Result<VertexArrayId, BackendError> {
        let buffers: Vec<BufferId> = vertex_buffer.into_iter().chain(streams.iter().copied()).collect();
        for &id in buffers.iter().chain(index_buffer.iter()) {
            lookup(&self.buffers, id)?;
        }

        let id = VertexArrayId(self.vertex_arrays.len() as u32);
        self.vertex_arrays.push(GpuVertexArray {
            buffers,
            index_buffer,
        });
        Ok(id)
    }

    pub fn create_program(&mut self, desc: &ProgramDescriptor) -> Result<ShaderId, BackendError> {
        for block in &desc.uniform_blocks {
            if !self.uniform_blocks.contains_key(block) {
                return Err(BackendError::UnknownUniformBlock(block.clone()));
            }
        }

        let shader = self.device.create_shader_module(wgpu::ShaderModuleDescriptor {
            label: Some(&desc.label),
            source: wgpu::ShaderSource::Wgsl(desc.source.as_str().into()),
        });
        let block_layout = uniform_block_layout(&self.device, &desc.label, desc.uniform_blocks.len());
        let layout = self.device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
            label: Some(&desc.label),
            bind_group_layouts: &[&block_layout, &self.unit_layout],
            push_constant_ranges: &[],
        });

        let streams = StreamLayouts::new(desc.layout);
        let mut builder = PipelineBuilder::new(&self.device, &layout, &shader)
            .with_label(&desc.label)
            .with_vertex_buffers(streams.buffers())
            .with_color_target(self.color_format, Some(wgpu::BlendState::ALPHA_BLENDING));
        if let Some(format) = self.depth_format {
            builder = builder.with_depth_stencil(format, desc.depth_write, wgpu::CompareFunction::LessEqual);
        }
        if !desc.cull_back_faces {
            builder = builder.with_no_culling();
        }
        let pipeline = builder.build();

        let unit_table = self.device.create_buffer(&wgpu::BufferDescriptor {
            label: Some(&desc.unit_table_uniform),
            size: unit_table_size(self.texture_units()),
            usage: wgpu::BufferUsages::UNIFORM | wgpu::BufferUsages::COPY_DST,
            mapped_at_creation: false,
        });

        let id = ShaderId(self.programs.len() as u32);
        log::debug!("Program '{}' created as {:?} for {:?}", desc.label, id, desc.layout);
        self.programs.push(GpuProgram {
            label: desc.label.clone(),
            pipeline,
            block_layout,
            blocks: desc.uniform_blocks.clone(),
            attached: vec![None; desc.uniform_blocks.len()],
            unit_table_uniform: desc.unit_table_uniform.clone(),
            unit_table,
        });
        Ok(id)
    }

    /// Offscreen colour target in the backend's colour format.
    pub fn create_color_target(&self, width: u32, height: u32) -> wgpu::Texture {
        self.device.create_texture(&wgpu::TextureDescriptor {
            label: Some("Color Target"),
            size: wgpu::Extent3d {
                width,
                height,
                depth_or_array_layers: 1,
            },
            mip_level_count: 1,
            sample_count: 1,
            dimension: wgpu::TextureDimension::D2,
            format: self.color_format,
            usage: wgpu::TextureUsages::RENDER_ATTACHMENT | wgpu::TextureUsages::COPY_SRC,
            view_formats: &[],
        })
    }

    /// Depth target matching the pipelines, if they test depth.
    pub fn create_depth_target(&self, width: u32, height: u32) -> Option<wgpu::Texture> {
        let format = self.depth_format?;
        Some(self.device.create_texture(&wgpu::TextureDescriptor {
            label: Some("Depth Target"),
            size: wgpu::Extent3d {
                width,
                height,
                depth_or_array_layers: 1,
            },
            mip_level_count: 1,
            sample_count: 1,
            dimension: wgpu::TextureDimension::D2,
            format,
            usage: wgpu::TextureUsages::RENDER_ATTACHMENT,
            view_formats: &[],
        }))
    }

    /// Opens a frame drawing into `color` (and `depth` when pipelines test
    /// depth). With `clear`, both targets are cleared first.
    pub fn begin_frame(
        &mut self,
        color: wgpu::TextureView,
        depth: Option<wgpu::TextureView>,
        clear: Option<wgpu::Color>,
    ) -> Result<(), BackendError> {
        if self.frame.is_some() {
            return Err(BackendError::Device("a frame is already open".into()));
        }
        if depth.is_some() != self.depth_format.is_some() {
            return Err(BackendError::Device(format!(
                "pipelines expect depth format {:?}",
                self.depth_format
            )));
        }

        let mut encoder = self
            .device
            .create_command_encoder(&wgpu::CommandEncoderDescriptor {
                label: Some("Batch Frame Encoder"),
            });

        if let Some(color_value) = clear {
            encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
                label: Some("Clear Pass"),
                color_attachments: &[Some(wgpu::RenderPassColorAttachment {
                    view: &color,
                    resolve_target: None,
                    depth_slice: None,
                    ops: wgpu::Operations {
                        load: wgpu::LoadOp::Clear(color_value),
                        store: wgpu::StoreOp::Store,
                    },
                })],
                depth_stencil_attachment: depth.as_ref().map(|view| wgpu::RenderPassDepthStencilAttachment {
                    view,
                    depth_ops: Some(wgpu::Operations {
                        load: wgpu::LoadOp::Clear(1.0),
                        store: wgpu::StoreOp::Store,
                    }),
                    stencil_ops: None,
                }),
                timestamp_writes: None,
                occlusion_query_set: None,
            });
        }

        self.frame = Some(Frame {
            encoder,
            color,
            depth,
        });
        Ok(())
    }

    /// Submits everything recorded since [`begin_frame`](Self::begin_frame).
    pub fn end_frame(&mut self) -> Result<wgpu::SubmissionIndex, BackendError> {
        let frame = self.frame.take().ok_or(BackendError::NoActiveFrame)?;
        self.program = None;
        self.vertex_array = None;
        self.indirect = None;
        Ok(self.queue.submit(std::iter::once(frame.encoder.finish())))
    }

    fn block_group(&self, program: &GpuProgram) -> Result<wgpu::BindGroup, BackendError> {
        let mut entries = Vec::with_capacity(program.blocks.len());
        for (binding, (name, attached)) in program.blocks.iter().zip(&program.attached).enumerate() {
            let id = attached.ok_or_else(|| BackendError::UnknownUniformBlock(name.clone()))?;
            entries.push(wgpu::BindGroupEntry {
                binding: binding as u32,
                resource: lookup(&self.buffers, id)?.buffer.as_entire_binding(),
            });
        }
        Ok(self.device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some(&program.label),
            layout: &program.block_layout,
            entries: &entries,
        }))
    }

    fn unit_group(&self, program: &GpuProgram) -> wgpu::BindGroup {
        let units = self.units.len() as u32;
        let mut entries: Vec<_> = self
            .units
            .iter()
            .enumerate()
            .map(|(unit, &bound)| wgpu::BindGroupEntry {
                binding: unit as u32,
                resource: wgpu::BindingResource::TextureView(
                    bound_view(&self.textures, bound, TextureKind::D2).unwrap_or(&self.fallback_2d.view),
                ),
            })
            .collect();
        entries.push(wgpu::BindGroupEntry {
            binding: units,
            resource: wgpu::BindingResource::TextureView(
                bound_view(&self.textures, self.cube, TextureKind::Cube).unwrap_or(&self.fallback_cube.view),
            ),
        });
        entries.push(wgpu::BindGroupEntry {
            binding: units + 1,
            resource: wgpu::BindingResource::Sampler(&self.sampler),
        });
        entries.push(wgpu::BindGroupEntry {
            binding: units + 2,
            resource: program.unit_table.as_entire_binding(),
        });

        self.device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some("Texture Units"),
            layout: &self.unit_layout,
            entries: &entries,
        })
    }

    fn draw(&mut self, call: DrawCall) -> Result<(), BackendError> {
        if self.frame.is_none() {
            return Err(BackendError::NoActiveFrame);
        }
        let program_id = self.program.ok_or(BackendError::NoProgram)?;
        let vao_id = self.vertex_array.ok_or(BackendError::NoVertexArray)?;
        let program = self
            .programs
            .get(program_id.index())
            .ok_or(BackendError::UnknownProgram(program_id))?;
        let vertex_array = self
            .vertex_arrays
            .get(vao_id.index())
            .ok_or(BackendError::UnknownVertexArray(vao_id))?;
        let index_buffer = vertex_array
            .index_buffer
            .ok_or_else(|| BackendError::Device(format!("{vao_id:?} has no index buffer")))?;
        let indirect = match call {
            DrawCall::Indexed(_) => None,
            DrawCall::Indirect(count) => {
                let id = self.indirect.ok_or(BackendError::NoIndirectBuffer)?;
                let buffer = lookup(&self.buffers, id)?;
                let needed = count as u64 * DrawCommand::SIZE as u64;
                if needed > buffer.size {
                    return Err(BackendError::WriteOutOfRange {
                        buffer: id,
                        offset: 0,
                        len: needed as usize,
                        size: buffer.size,
                    });
                }
                Some(buffer)
            }
        };

        let blocks = self.block_group(program)?;
        let units = self.unit_group(program);

        let Some(frame) = self.frame.as_mut() else {
            return Err(BackendError::NoActiveFrame);
        };
        let mut pass = frame.encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
            label: Some(&program.label),
            color_attachments: &[Some(wgpu::RenderPassColorAttachment {
                view: &frame.color,
                resolve_target: None,
                depth_slice: None,
                ops: wgpu::Operations {
                    load: wgpu::LoadOp::Load,
                    store: wgpu::StoreOp::Store,
                },
            })],
            depth_stencil_attachment: frame.depth.as_ref().map(|view| wgpu::RenderPassDepthStencilAttachment {
                view,
                depth_ops: Some(wgpu::Operations {
                    load: wgpu::LoadOp::Load,
                    store: wgpu::StoreOp::Store,
                }),
                stencil_ops: None,
            }),
            timestamp_writes: None,
            occlusion_query_set: None,
        });

        pass.set_pipeline(&program.pipeline);
        pass.set_bind_group(0, &blocks, &[]);
        pass.set_bind_group(1, &units, &[]);
        for (slot, &id) in vertex_array.buffers.iter().enumerate() {
            pass.set_vertex_buffer(slot as u32, lookup(&self.buffers, id)?.buffer.slice(..));
        }
        pass.set_index_buffer(
            lookup(&self.buffers, index_buffer)?.buffer.slice(..),
            wgpu::IndexFormat::Uint32,
        );

        match (call, indirect) {
            (DrawCall::Indexed(count), _) => pass.draw_indexed(0..count, 0, 0..1),
            (DrawCall::Indirect(count), Some(buffer)) if self.indirect_first_instance => {
                pass.multi_draw_indexed_indirect(&buffer.buffer, 0, count);
            }
            (DrawCall::Indirect(count), Some(buffer)) => {
                let bytes = buffer.shadow.as_deref().unwrap_or(&[]);
                let len = (count as usize * DrawCommand::SIZE).min(bytes.len());
                let commands: Vec<DrawCommand> = bytemuck::pod_collect_to_vec(&bytes[..len]);
                for c in commands.iter().filter(|c| c.instance_count > 0) {
                    pass.draw_indexed(
                        c.first_index..c.first_index + c.index_count,
                        c.base_vertex,
                        c.first_instance..c.first_instance + c.instance_count,
                    );
                }
            }
            (DrawCall::Indirect(_), None) => return Err(BackendError::NoIndirectBuffer),
        }
        Ok(())
    }
}

impl RenderBackend for WgpuBackend {
    fn write_buffer(&mut self, buffer: BufferId, byte_offset: u64, data: &[u8]) -> Result<(), BackendError> {
        let target = self
            .buffers
            .get_mut(buffer.index())
            .ok_or(BackendError::UnknownBuffer(buffer))?;
        let end = byte_offset + data.len() as u64;
        if end > target.size {
            return Err(BackendError::WriteOutOfRange {
                buffer,
                offset: byte_offset,
                len: data.len(),
                size: target.size,
            });
        }
        let alignment = wgpu::COPY_BUFFER_ALIGNMENT;
        if byte_offset % alignment != 0 || data.len() as u64 % alignment != 0 {
            return Err(BackendError::Misaligned {
                offset: byte_offset,
                alignment,
            });
        }
        if data.is_empty() {
            return Ok(());
        }

        if let Some(shadow) = &mut target.shadow {
            shadow[byte_offset as usize..end as usize].copy_from_slice(data);
        }
        stage_write(
            &self.device,
            &self.queue,
            self.frame.as_mut(),
            &target.buffer,
            byte_offset,
            data,
        );
        Ok(())
    }

    fn use_program(&mut self, program: ShaderId) -> Result<(), BackendError> {
        if program.index() >= self.programs.len() {
            return Err(BackendError::UnknownProgram(program));
        }
        self.program = Some(program);
        Ok(())
    }

    fn release_program(&mut self, program: ShaderId) {
        if self.program == Some(program) {
            self.program = None;
        }
    }

    fn set_int_array(&mut self, program: ShaderId, name: &str, values: &[i32]) -> Result<(), BackendError> {
        let gpu = self
            .programs
            .get(program.index())
            .ok_or(BackendError::UnknownProgram(program))?;
        if gpu.unit_table_uniform != name {
            return Err(BackendError::UnknownUniform {
                program,
                name: name.to_string(),
            });
        }

        let units = self.units.len();
        if values.len() > units {
            log::warn!(
                "'{}' holds {} entries, truncating {} values",
                name,
                units,
                values.len()
            );
        }
        let mut table = vec![0i32; units.div_ceil(4).max(1) * 4];
        for (slot, &value) in table.iter_mut().zip(values) {
            *slot = value;
        }

        stage_write(
            &self.device,
            &self.queue,
            self.frame.as_mut(),
            &gpu.unit_table,
            0,
            bytemuck::cast_slice(&table),
        );
        Ok(())
    }

    fn attach_uniform_block(&mut self, program: ShaderId, block: &str) -> Result<(), BackendError> {
        let buffer = *self
            .uniform_blocks
            .get(block)
            .ok_or_else(|| BackendError::UnknownUniformBlock(block.to_string()))?;
        let gpu = self
            .programs
            .get_mut(program.index())
            .ok_or(BackendError::UnknownProgram(program))?;
        let slot = gpu
            .blocks
            .iter()
            .position(|b| b == block)
            .ok_or_else(|| BackendError::UnknownUniform {
                program,
                name: block.to_string(),
            })?;
        gpu.attached[slot] = Some(buffer);
        Ok(())
    }

    fn bind_vertex_array(&mut self, vertex_array: VertexArrayId) -> Result<(), BackendError> {
        if vertex_array.index() >= self.vertex_arrays.len() {
            return Err(BackendError::UnknownVertexArray(vertex_array));
        }
        self.vertex_array = Some(vertex_array);
        Ok(())
    }

    fn bind_texture(&mut self, texture: TextureId, unit: u32) -> Result<(), BackendError> {
        let max = self.units.len() as u32;
        if unit >= max {
            return Err(BackendError::UnitOutOfRange { unit, max });
        }
        let kind = self
            .textures
            .get(texture.index())
            .map(|t| t.kind)
            .ok_or(BackendError::UnknownTexture(texture))?;
        // Cube textures share the single cube binding whatever their unit.
        if kind == TextureKind::Cube {
            self.cube = Some(texture);
        }
        self.units[unit as usize] = Some(texture);
        Ok(())
    }

    fn bind_indirect_buffer(&mut self, buffer: BufferId) -> Result<(), BackendError> {
        if lookup(&self.buffers, buffer)?.shadow.is_none() {
            return Err(BackendError::Device(format!("{buffer:?} was not created as an indirect buffer")));
        }
        self.indirect = Some(buffer);
        Ok(())
    }

    fn index_buffer_bound(&self, vertex_array: VertexArrayId) -> bool {
        self.vertex_arrays
            .get(vertex_array.index())
            .is_some_and(|v| v.index_buffer.is_some())
    }

    fn draw_indexed(&mut self, index_count: u32) -> Result<(), BackendError> {
        self.draw(DrawCall::Indexed(index_count))
    }

    fn multi_draw_indexed_indirect(&mut self, command_count: u32) -> Result<(), BackendError> {
        self.draw(DrawCall::Indirect(command_count))
    }
}
