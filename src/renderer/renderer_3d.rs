// renderer/renderer_3d.rs (instanced mesh batching)
use bytemuck::Pod;
use glam::{Mat4, Vec4};

use super::backend::{RenderBackend, RenderCtx};
use super::batch::{new_submission_3d, BatchQueue, Submission3D, SubmitError};
use super::batches::{shader_runs, sort_3d};
use super::draw::{bind_run_state, DrawError};
use super::geometry::{Geometry, GeometryError, GeometryResidency};
use super::instances::InstanceWriter;
use super::material::{Material, VertexArray};
use super::renderer::RendererStats;
use super::texture_units::TextureUnitAllocator;
use crate::asset::{Handle, Resources};
use crate::settings::RendererSettings;

/// Batches mesh instances and draws each same-shader run with one
/// multi-draw-indirect call over the draw commands of its vertex buffer.
pub struct Renderer3D {
    queue: BatchQueue<Submission3D>,
    units: TextureUnitAllocator,
    residency: GeometryResidency,
    writer: InstanceWriter,
    unit_table_uniform: String,
    unit_table: Vec<i32>,
    stats: RendererStats,
}

impl Renderer3D {
    pub fn new(settings: &RendererSettings) -> Self {
        let units = TextureUnitAllocator::new(
            settings.texture_units as usize,
            settings.reserved_texture_units as usize,
        );
        Self {
            queue: BatchQueue::new(settings.batch_capacity_3d as usize),
            unit_table: units.unit_table(),
            units,
            residency: GeometryResidency::new(settings.vertex_capacity, settings.index_capacity),
            writer: InstanceWriter::new(),
            unit_table_uniform: settings.unit_table_uniform.clone(),
            stats: RendererStats::default(),
        }
    }

    pub fn begin(&mut self) {
        if !self.queue.is_empty() {
            log::warn!(
                "3D batch began with {} unflushed submissions; discarding them",
                self.queue.len()
            );
            self.queue.clear();
        }
        self.units.clear(false);
        self.stats = RendererStats::default();
    }

    /// Uploads a mesh into the static vertex buffer of `vertex_array`.
    ///
    /// Rejected meshes leave every counter untouched.
    pub fn add_geometry<V: Pod>(
        &mut self,
        ctx: &mut RenderCtx<'_>,
        vertex_array: Handle<VertexArray>,
        vertices: &[V],
        indices: &[u32],
    ) -> Result<Geometry, GeometryError> {
        self.residency
            .add_geometry(ctx, vertex_array, vertices, indices)
            .inspect_err(|err| log::error!("Geometry rejected: {}", err))
    }

    /// Queues one mesh instance. A full queue is flushed first.
    pub fn submit(
        &mut self,
        ctx: &mut RenderCtx<'_>,
        name: &str,
        geometry: Geometry,
        material: &Material,
        transform: Mat4,
        tint: Vec4,
    ) -> Result<(), SubmitError> {
        let submission = match self.prepare(ctx.resources, name, geometry, material, transform, tint) {
            Ok(submission) => submission,
            Err(err) => {
                log::warn!("3D submission '{}' dropped: {}", name, err);
                self.stats.dropped += 1;
                return Err(err);
            }
        };

        if let Err(submission) = self.queue.push(submission) {
            self.flush(ctx);
            if self.queue.push(submission).is_err() {
                log::error!("3D batch queue is full right after a flush");
                self.stats.dropped += 1;
                return Err(SubmitError::QueueFull);
            }
        }

        self.stats.submissions += 1;
        Ok(())
    }

    fn prepare(
        &self,
        resources: &Resources,
        name: &str,
        geometry: Geometry,
        material: &Material,
        transform: Mat4,
        tint: Vec4,
    ) -> Result<Submission3D, SubmitError> {
        let submission = new_submission_3d(resources, name, geometry, material, transform, tint)?;
        if !self.residency.contains(&geometry) {
            return Err(SubmitError::UnknownGeometry(geometry.id));
        }
        let available = self.units.capacity() - self.units.reserved();
        if submission.texture_count() > available {
            return Err(SubmitError::TooManyTextures {
                needed: submission.texture_count(),
                available,
            });
        }
        Ok(submission)
    }

    pub fn end(&mut self, ctx: &mut RenderCtx<'_>) {
        self.flush(ctx);
    }

    /// Sorts the queue and walks it run by run, counting instances into the
    /// draw commands of each geometry. Instance ranges are contiguous per run.
    pub fn flush(&mut self, ctx: &mut RenderCtx<'_>) {
        if self.queue.is_empty() {
            return;
        }

        let resources = ctx.resources;
        let mut entries = self.queue.take();
        sort_3d(&mut entries, resources);
        log::debug!(
            "Flushing {} mesh instances in {} shader runs",
            entries.len(),
            shader_runs(&entries, |e| e.shader).len()
        );
        match self.units.bind_reserved(ctx.backend) {
            Ok(bound) => self.stats.texture_binds += bound,
            Err(err) => log::error!("Failed to bind reserved texture units: {}", err),
        }

        let mut run_start = 0;
        let mut running = 0u32;
        for i in 0..entries.len() {
            if i > run_start {
                let shader_changed = entries[i].shader != entries[run_start].shader;
                let out_of_units = self.units.remaining_units() < entries[i].texture_count();
                if shader_changed || out_of_units {
                    self.draw_run(ctx, &entries[run_start..i]);
                    self.units.clear(false);
                    run_start = i;
                    running = 0;
                }
            }

            self.assign_units(ctx.backend, resources, &mut entries[i]);

            let geometry = entries[i].geometry;
            match self.residency.command_mut(&geometry) {
                Some(command) => {
                    if command.instance_count == 0 {
                        command.first_instance = running;
                    }
                    command.instance_count += 1;
                    running += 1;
                }
                None => log::error!(
                    "No draw command for geometry {} of '{}'",
                    geometry.id,
                    entries[i].name
                ),
            }
        }

        self.draw_run(ctx, &entries[run_start..]);
        self.units.clear(false);
        self.queue.restore(entries);
    }

    fn assign_units(
        &mut self,
        backend: &mut dyn RenderBackend,
        resources: &Resources,
        entry: &mut Submission3D,
    ) {
        let textures = entry
            .sub_textures
            .iter()
            .map(|sub| sub.texture)
            .zip(entry.units.iter_mut())
            .chain(entry.cubemaps.iter().copied().zip(entry.cube_units.iter_mut()));

        for (handle, unit) in textures {
            let Some(texture) = resources.textures.get(handle) else {
                log::error!("Texture {:?} vanished before flush", handle);
                continue;
            };
            let lookup = self.units.get_unit(texture.id);
            *unit = lookup.unit();
            if lookup.needs_bind() {
                match self.units.bind_to_unit(backend, texture.id) {
                    Ok(_) => self.stats.texture_binds += 1,
                    Err(err) => log::error!("Failed to bind {:?}: {}", texture.id, err),
                }
            }
        }
    }

    fn draw_run(&mut self, ctx: &mut RenderCtx<'_>, run: &[Submission3D]) {
        let Some(first) = run.first() else {
            return;
        };
        self.stats.flush_runs += 1;
        match self.try_draw_run(ctx, run) {
            Ok(()) => {
                self.stats.draw_calls += 1;
                self.stats.multi_draw_calls += 1;
                self.stats.instances += run.len() as u32;
            }
            Err(err) => log::error!(
                "3D draw of {} instances (first '{}') aborted: {}",
                run.len(),
                first.name,
                err
            ),
        }
        // Every run rebuilds its own instance counts.
        self.residency.reset_instances(first.geometry.vertex_buffer);
    }

    fn try_draw_run(&mut self, ctx: &mut RenderCtx<'_>, run: &[Submission3D]) -> Result<(), DrawError> {
        let resources = ctx.resources;
        let handle = run[0].shader;
        let shader = resources
            .shaders
            .get(handle)
            .ok_or(DrawError::UnknownShader(handle))?;
        let vertex_array = resources
            .vertex_arrays
            .get(shader.vertex_array)
            .ok_or_else(|| DrawError::UnknownVertexArray(shader.name.clone()))?;
        let vertex_buffer = vertex_array
            .vertex_buffer
            .ok_or_else(|| DrawError::NoVertexBuffer(vertex_array.name.clone()))?;
        let indirect = vertex_array
            .indirect_buffer
            .ok_or_else(|| DrawError::NoIndirectBuffer(vertex_array.name.clone()))?;

        self.writer.generate_3d(vertex_array.layout, run)?;
        self.writer.upload(ctx.backend, vertex_array)?;

        let commands = self.residency.commands(vertex_buffer);
        ctx.backend
            .write_buffer(indirect, 0, bytemuck::cast_slice(commands))?;

        bind_run_state(
            ctx.backend,
            shader,
            vertex_array,
            &self.unit_table_uniform,
            &self.unit_table,
        )?;
        let drawn = ctx
            .backend
            .bind_indirect_buffer(indirect)
            .and_then(|()| ctx.backend.multi_draw_indexed_indirect(commands.len() as u32));
        ctx.backend.release_program(shader.program);
        drawn?;
        Ok(())
    }

    pub fn queued(&self) -> usize {
        self.queue.len()
    }

    pub fn residency(&self) -> &GeometryResidency {
        &self.residency
    }

    pub fn texture_units(&self) -> &TextureUnitAllocator {
        &self.units
    }

    pub fn texture_units_mut(&mut self) -> &mut TextureUnitAllocator {
        &mut self.units
    }

    pub fn set_texture_units(&mut self, units: TextureUnitAllocator) {
        self.unit_table = units.unit_table();
        self.units = units;
    }

    pub fn stats(&self) -> RendererStats {
        self.stats
    }

    /// Drops all queued work and every geometry placement.
    pub(crate) fn reset(&mut self) {
        self.queue.clear();
        self.units.clear(true);
        self.residency.reset();
        self.stats = RendererStats::default();
    }
}
