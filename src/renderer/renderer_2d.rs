// renderer/renderer_2d.rs (quad batching)
use std::collections::HashSet;

use glam::{Mat4, Vec2, Vec3, Vec4};

use super::backend::{BufferId, RenderBackend, RenderCtx};
use super::batch::{new_submission_2d, BatchQueue, Submission2D, SubmitError};
use super::batches::{shader_runs, sort_2d};
use super::draw::{bind_run_state, DrawError};
use super::instances::{quad_indices, InstanceWriter};
use super::material::{Material, SubTexture, VertexArray};
use super::renderer::RendererStats;
use super::text::Font;
use super::texture_units::TextureUnitAllocator;
use crate::asset::Resources;
use crate::settings::RendererSettings;

/// Batches textured quads and draws each same-shader run with one indexed
/// draw of `quads * 6` indices.
pub struct Renderer2D {
    queue: BatchQueue<Submission2D>,
    units: TextureUnitAllocator,
    writer: InstanceWriter,
    prefilled: HashSet<BufferId>,
    unit_table_uniform: String,
    unit_table: Vec<i32>,
    stats: RendererStats,
}

impl Renderer2D {
    pub fn new(settings: &RendererSettings) -> Self {
        let units = TextureUnitAllocator::new(
            settings.texture_units as usize,
            settings.reserved_texture_units as usize,
        );
        Self {
            queue: BatchQueue::new(settings.batch_capacity_2d as usize),
            unit_table: units.unit_table(),
            units,
            writer: InstanceWriter::new(),
            prefilled: HashSet::new(),
            unit_table_uniform: settings.unit_table_uniform.clone(),
            stats: RendererStats::default(),
        }
    }

    pub fn begin(&mut self) {
        if !self.queue.is_empty() {
            log::warn!(
                "2D batch began with {} unflushed quads; discarding them",
                self.queue.len()
            );
            self.queue.clear();
        }
        self.units.clear(false);
        self.stats = RendererStats::default();
    }

    /// Queues one quad. A full queue is flushed first.
    pub fn submit(
        &mut self,
        ctx: &mut RenderCtx<'_>,
        material: &Material,
        transform: Mat4,
        tint: Vec4,
    ) -> Result<(), SubmitError> {
        let submission = match self.prepare(ctx.resources, material, transform, tint) {
            Ok(submission) => submission,
            Err(err) => {
                log::warn!("2D submission dropped: {}", err);
                self.stats.dropped += 1;
                return Err(err);
            }
        };

        if let Err(submission) = self.queue.push(submission) {
            self.flush(ctx);
            if self.queue.push(submission).is_err() {
                log::error!("2D batch queue is full right after a flush");
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
        material: &Material,
        transform: Mat4,
        tint: Vec4,
    ) -> Result<Submission2D, SubmitError> {
        let submission = new_submission_2d(resources, material, transform, tint)?;
        let available = self.units.capacity() - self.units.reserved();
        if submission.texture_count() > available {
            return Err(SubmitError::TooManyTextures {
                needed: submission.texture_count(),
                available,
            });
        }
        Ok(submission)
    }

    /// Lays `text` out along a baseline starting at `origin` and submits one
    /// quad per visible glyph.
    ///
    /// `material` supplies the shader; its first sub-texture is replaced by
    /// each glyph's atlas region. Characters outside the font's range are not
    /// drawn but still advance by the last advance seen. `\n` returns to
    /// `origin.x` one line lower. Returns the number of glyphs submitted.
    #[allow(clippy::too_many_arguments)]
    pub fn submit_text(
        &mut self,
        ctx: &mut RenderCtx<'_>,
        text: &str,
        font: &Font,
        material: &Material,
        origin: Vec3,
        scale: f32,
        tint: Vec4,
    ) -> Result<usize, SubmitError> {
        let mut glyph_material = material.clone();
        glyph_material.sub_textures.clear();
        glyph_material.sub_textures.push(SubTexture::full(font.atlas));

        let mut cursor = origin.truncate();
        let mut advance = 0.0;
        let mut submitted = 0;

        for c in text.chars() {
            if c == '\n' {
                cursor = Vec2::new(origin.x, cursor.y - font.line_height * scale);
                continue;
            }

            if let Some(glyph) = font.glyph(c) {
                advance = glyph.advance;
                if glyph.is_visible() {
                    glyph_material.sub_textures[0] = font.sub_texture(glyph);
                    let position = Vec3::new(
                        cursor.x + glyph.bearing.x * scale,
                        cursor.y - (glyph.size.y - glyph.bearing.y) * scale,
                        origin.z,
                    );
                    let model = Mat4::from_translation(position)
                        * Mat4::from_scale((glyph.size * scale).extend(1.0));
                    self.submit(ctx, &glyph_material, model, tint)?;
                    submitted += 1;
                }
            }
            cursor.x += advance * scale;
        }

        Ok(submitted)
    }

    pub fn end(&mut self, ctx: &mut RenderCtx<'_>) {
        self.flush(ctx);
    }

    /// Sorts the queue, then draws it run by run. A run ends on a shader
    /// change or when the next quad needs more texture units than remain.
    pub fn flush(&mut self, ctx: &mut RenderCtx<'_>) {
        if self.queue.is_empty() {
            return;
        }

        let resources = ctx.resources;
        let mut entries = self.queue.take();
        sort_2d(&mut entries, resources);
        log::debug!(
            "Flushing {} quads in {} shader runs",
            entries.len(),
            shader_runs(&entries, |e| e.shader).len()
        );
        match self.units.bind_reserved(ctx.backend) {
            Ok(bound) => self.stats.texture_binds += bound,
            Err(err) => log::error!("Failed to bind reserved texture units: {}", err),
        }

        let mut run_start = 0;
        for i in 0..entries.len() {
            if i > run_start {
                let shader_changed = entries[i].shader != entries[run_start].shader;
                let out_of_units = self.units.remaining_units() < entries[i].texture_count();
                if shader_changed || out_of_units {
                    self.draw_run(ctx, &entries[run_start..i]);
                    self.units.clear(false);
                    run_start = i;
                }
            }
            self.assign_units(ctx.backend, resources, &mut entries[i]);
        }

        self.draw_run(ctx, &entries[run_start..]);
        self.units.clear(false);
        self.queue.restore(entries);
    }

    fn assign_units(
        &mut self,
        backend: &mut dyn RenderBackend,
        resources: &Resources,
        entry: &mut Submission2D,
    ) {
        for (sub, unit) in entry.sub_textures.iter().zip(entry.units.iter_mut()) {
            let Some(texture) = resources.textures.get(sub.texture) else {
                log::error!("Texture {:?} vanished before flush", sub.texture);
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

    fn draw_run(&mut self, ctx: &mut RenderCtx<'_>, run: &[Submission2D]) {
        if run.is_empty() {
            return;
        }
        self.stats.flush_runs += 1;
        match self.try_draw_run(ctx, run) {
            Ok(()) => {
                self.stats.draw_calls += 1;
                self.stats.instances += run.len() as u32;
            }
            Err(err) => log::error!("2D draw of {} quads aborted: {}", run.len(), err),
        }
    }

    fn try_draw_run(&mut self, ctx: &mut RenderCtx<'_>, run: &[Submission2D]) -> Result<(), DrawError> {
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

        self.writer.generate_2d(vertex_array.layout, run)?;
        self.writer.upload(ctx.backend, vertex_array)?;
        self.prefill_indices(ctx.backend, vertex_array)?;

        bind_run_state(
            ctx.backend,
            shader,
            vertex_array,
            &self.unit_table_uniform,
            &self.unit_table,
        )?;
        let drawn = ctx.backend.draw_indexed(run.len() as u32 * 6);
        ctx.backend.release_program(shader.program);
        drawn?;
        Ok(())
    }

    /// Uploads the quad index pattern for the whole batch capacity the first
    /// time `vertex_array`'s index buffer is drawn from.
    fn prefill_indices(
        &mut self,
        backend: &mut dyn RenderBackend,
        vertex_array: &VertexArray,
    ) -> Result<(), DrawError> {
        if self.prefilled.contains(&vertex_array.index_buffer) {
            return Ok(());
        }

        let indices: Vec<u32> = (0..self.queue.capacity() as u32)
            .flat_map(quad_indices)
            .collect();
        backend.write_buffer(vertex_array.index_buffer, 0, bytemuck::cast_slice(&indices))?;
        self.prefilled.insert(vertex_array.index_buffer);
        log::debug!(
            "Pre-filled {} quad indices into '{}'",
            indices.len(),
            vertex_array.name
        );
        Ok(())
    }

    pub fn queued(&self) -> usize {
        self.queue.len()
    }

    pub fn texture_units(&self) -> &TextureUnitAllocator {
        &self.units
    }

    pub fn texture_units_mut(&mut self) -> &mut TextureUnitAllocator {
        &mut self.units
    }

    /// Replaces the allocator. Pending quads keep their queue position.
    pub fn set_texture_units(&mut self, units: TextureUnitAllocator) {
        self.unit_table = units.unit_table();
        self.units = units;
    }

    pub fn stats(&self) -> RendererStats {
        self.stats
    }

    /// Forgets which index buffers hold the quad pattern.
    pub(crate) fn reset(&mut self) {
        self.queue.clear();
        self.units.clear(true);
        self.prefilled.clear();
        self.stats = RendererStats::default();
    }
}
