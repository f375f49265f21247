// renderer/renderer.rs
use bytemuck::Pod;
use glam::{Mat4, Vec3, Vec4};

use super::backend::RenderCtx;
use super::batch::SubmitError;
use super::geometry::{Geometry, GeometryError};
use super::material::{Material, VertexArray};
use super::renderer_2d::Renderer2D;
use super::renderer_3d::Renderer3D;
use super::text::Font;
use super::texture_units::TextureUnitAllocator;
use crate::asset::Handle;
use crate::settings::RendererSettings;

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct RendererStats {
    pub submissions: u32,
    pub dropped: u32,
    pub flush_runs: u32,
    pub draw_calls: u32,
    pub multi_draw_calls: u32,
    pub instances: u32,
    pub texture_binds: u32,
}

impl RendererStats {
    pub fn merged(self, other: RendererStats) -> RendererStats {
        RendererStats {
            submissions: self.submissions + other.submissions,
            dropped: self.dropped + other.dropped,
            flush_runs: self.flush_runs + other.flush_runs,
            draw_calls: self.draw_calls + other.draw_calls,
            multi_draw_calls: self.multi_draw_calls + other.multi_draw_calls,
            instances: self.instances + other.instances,
            texture_binds: self.texture_binds + other.texture_binds,
        }
    }
}

/// Owns the 2D and 3D batch paths and their shared configuration.
///
/// Nothing is global: each renderer carries its own queues, texture-unit rings
/// and geometry residency, so several can coexist.
pub struct Renderer {
    settings: RendererSettings,
    state: Option<Paths>,
    stats: RendererStats,
}

struct Paths {
    two_d: Renderer2D,
    three_d: Renderer3D,
}

impl Renderer {
    /// Creates an initialised renderer.
    pub fn new(settings: RendererSettings) -> Self {
        let mut renderer = Self {
            settings: RendererSettings::default(),
            state: None,
            stats: RendererStats::default(),
        };
        renderer.initialise(settings);
        renderer
    }

    /// (Re)creates both batch paths with `settings`. Any previous queues and
    /// geometry placements are discarded.
    pub fn initialise(&mut self, settings: RendererSettings) {
        let settings = settings.validate();
        log::info!(
            "Renderer initialised: {} quads / {} instances per batch, {} texture units ({} reserved)",
            settings.batch_capacity_2d,
            settings.batch_capacity_3d,
            settings.texture_units,
            settings.reserved_texture_units
        );
        self.state = Some(Paths {
            two_d: Renderer2D::new(&settings),
            three_d: Renderer3D::new(&settings),
        });
        self.settings = settings;
        self.stats = RendererStats::default();
    }

    /// Releases all batching state. Submissions fail until the next
    /// [`initialise`](Self::initialise).
    pub fn destroy(&mut self) {
        if let Some(mut paths) = self.state.take() {
            paths.two_d.reset();
            paths.three_d.reset();
            log::info!("Renderer destroyed");
        }
    }

    pub fn is_initialised(&self) -> bool {
        self.state.is_some()
    }

    pub fn settings(&self) -> &RendererSettings {
        &self.settings
    }

    pub fn begin(&mut self) {
        if let Some(paths) = &mut self.state {
            paths.two_d.begin();
            paths.three_d.begin();
        }
    }

    /// Flushes whatever is still queued: 3D first, then 2D on top.
    pub fn end(&mut self, ctx: &mut RenderCtx<'_>) {
        let Some(paths) = &mut self.state else {
            return;
        };
        paths.three_d.end(ctx);
        paths.two_d.end(ctx);
        self.stats = paths.three_d.stats().merged(paths.two_d.stats());
        log::debug!("Frame stats: {:?}", self.stats);
    }

    pub fn submit_2d(
        &mut self,
        ctx: &mut RenderCtx<'_>,
        material: &Material,
        transform: Mat4,
        tint: Vec4,
    ) -> Result<(), SubmitError> {
        self.paths()?.two_d.submit(ctx, material, transform, tint)
    }

    pub fn submit_3d(
        &mut self,
        ctx: &mut RenderCtx<'_>,
        name: &str,
        geometry: Geometry,
        material: &Material,
        transform: Mat4,
        tint: Vec4,
    ) -> Result<(), SubmitError> {
        self.paths()?
            .three_d
            .submit(ctx, name, geometry, material, transform, tint)
    }

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
        self.paths()?
            .two_d
            .submit_text(ctx, text, font, material, origin, scale, tint)
    }

    pub fn add_geometry<V: Pod>(
        &mut self,
        ctx: &mut RenderCtx<'_>,
        vertex_array: Handle<VertexArray>,
        vertices: &[V],
        indices: &[u32],
    ) -> Result<Geometry, GeometryError> {
        match &mut self.state {
            Some(paths) => paths
                .three_d
                .add_geometry(ctx, vertex_array, vertices, indices),
            None => Err(GeometryError::NotInitialised),
        }
    }

    /// Installs `units` as the texture-unit ring of both paths.
    pub fn set_texture_units(&mut self, units: TextureUnitAllocator) -> Result<(), SubmitError> {
        let paths = self.paths()?;
        paths.three_d.set_texture_units(units.clone());
        paths.two_d.set_texture_units(units);
        Ok(())
    }

    pub fn renderer_2d(&self) -> Option<&Renderer2D> {
        self.state.as_ref().map(|p| &p.two_d)
    }

    pub fn renderer_2d_mut(&mut self) -> Option<&mut Renderer2D> {
        self.state.as_mut().map(|p| &mut p.two_d)
    }

    pub fn renderer_3d(&self) -> Option<&Renderer3D> {
        self.state.as_ref().map(|p| &p.three_d)
    }

    pub fn renderer_3d_mut(&mut self) -> Option<&mut Renderer3D> {
        self.state.as_mut().map(|p| &mut p.three_d)
    }

    /// Counters of the last completed frame (`begin()` .. `end()`).
    pub fn last_frame_stats(&self) -> RendererStats {
        self.stats
    }

    fn paths(&mut self) -> Result<&mut Paths, SubmitError> {
        self.state.as_mut().ok_or(SubmitError::NotInitialised)
    }
}
