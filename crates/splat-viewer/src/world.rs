//! Session state: the camera, the active Gaussian set, the sort context and
//! the renderer, plus the per-frame update order that keeps them in step.

use crate::{
    camera::{Camera, MouseButton},
    data::{GaussianSet, RenderMode},
    error::ViewerError,
    renderer::SplatRenderer,
    sort::SortContext,
};
use glam::{Mat4, Vec3};
use std::path::{Path, PathBuf};

/// Multiplier applied to keyboard translation before it reaches the camera.
pub const DEFAULT_TIME_SCALE: f32 = 1000.0;

/// Start-up knobs for a [`World`].
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct WorldOptions {
    pub width: u32,
    pub height: u32,
    pub max_sh_degree: u32,
    pub auto_sort: bool,
    pub render_mode: RenderMode,
    pub scale_modifier: f32,
}

impl Default for WorldOptions {
    fn default() -> Self {
        Self {
            width: 1280,
            height: 720,
            max_sh_degree: 3,
            auto_sort: true,
            render_mode: RenderMode::default(),
            scale_modifier: 1.0,
        }
    }
}

pub struct World<R: SplatRenderer> {
    camera: Camera,
    gaussians: GaussianSet,
    renderer: R,
    sorter: SortContext,
    model: Mat4,
    source: Option<PathBuf>,

    pub time_scale: f32,
    auto_sort: bool,
    scale_modifier: f32,
    render_mode: RenderMode,
    max_sh_degree: u32,
}

impl<R: SplatRenderer> World<R> {
    /// Binds the synthetic axis set and brings the renderer to a drawable
    /// state.
    pub fn new(renderer: R, sorter: SortContext, options: WorldOptions) -> Result<Self, ViewerError> {
        let mut world = Self {
            camera: Camera::new(options.width, options.height),
            gaussians: GaussianSet::naive_set(),
            renderer,
            sorter,
            model: Mat4::IDENTITY,
            source: None,
            time_scale: DEFAULT_TIME_SCALE,
            auto_sort: options.auto_sort,
            scale_modifier: options.scale_modifier,
            render_mode: options.render_mode,
            max_sh_degree: options.max_sh_degree,
        };

        world.renderer.set_model_matrix(&world.model)?;
        world.renderer.set_scale_modifier(world.scale_modifier)?;
        world.renderer.set_render_mode(world.render_mode)?;
        world.renderer.update_gaussian_data(&world.gaussians)?;
        world.sorter.invalidate();
        world.update_camera_pose_lazy()?;
        world.update_camera_intrin_lazy()?;
        world.sort_and_update()?;

        log::info!("world ready with {} gaussians", world.num_gaussians());
        Ok(world)
    }

    // --- Gaussian set ---

    /// Replaces the active set with the contents of a 3DGS PLY file. On any
    /// failure the previous set, its GPU buffers and its order stay bound.
    pub fn load_ply<P: AsRef<Path>>(&mut self, path: P) -> Result<(), ViewerError> {
        let path = path.as_ref();
        let set = GaussianSet::load_from_file(path, self.max_sh_degree)?;
        self.set_gaussians(set)?;
        self.source = Some(path.to_path_buf());

        log::info!(
            "loaded {} gaussians (sh_dim {}) from {}",
            self.gaussians.len(),
            self.gaussians.sh_dim(),
            path.display()
        );
        Ok(())
    }

    /// Uploads `set` and its order, then makes it the active set. If the
    /// order upload fails the previous set is put back on the renderer.
    pub fn set_gaussians(&mut self, set: GaussianSet) -> Result<(), ViewerError> {
        self.renderer.update_gaussian_data(&set)?;

        self.sorter.invalidate();
        let view = self.camera.get_view_matrix() * self.model;
        let order = self.sorter.sort(set.positions(), &view);
        if let Err(err) = self.renderer.upload_order(order) {
            self.rebind_active_set();
            return Err(err);
        }

        self.gaussians = set;
        Ok(())
    }

    fn rebind_active_set(&mut self) {
        self.sorter.invalidate();
        let restored = self
            .renderer
            .update_gaussian_data(&self.gaussians)
            .and_then(|()| self.sort_and_update());
        if let Err(err) = restored {
            log::error!("failed to restore the previous gaussian set: {err}");
        }
    }

    /// Appends `other` to the active set. Widths must match.
    pub fn append_gaussians(&mut self, other: &GaussianSet) -> Result<(), ViewerError> {
        let mut merged = self.gaussians.clone();
        merged.append(other)?;
        self.set_gaussians(merged)
    }

    pub fn reset_to_naive(&mut self) -> Result<(), ViewerError> {
        self.set_gaussians(GaussianSet::naive_set())?;
        self.source = None;
        Ok(())
    }

    #[inline]
    pub fn num_gaussians(&self) -> usize {
        self.gaussians.len()
    }

    #[inline]
    pub fn gaussians(&self) -> &GaussianSet {
        &self.gaussians
    }

    /// File the active set came from, if any.
    pub fn source(&self) -> Option<&Path> {
        self.source.as_deref()
    }

    #[inline]
    pub fn max_sh_degree(&self) -> u32 {
        self.max_sh_degree
    }

    // --- Camera input ---

    pub fn process_translation(&mut self, dx: f32, dy: f32) {
        self.camera
            .process_translation(dx * self.time_scale, dy * self.time_scale);
    }

    pub fn process_scroll(&mut self, yoffset: f32) {
        self.camera.process_scroll(yoffset);
    }

    pub fn process_mouse(&mut self, xpos: f64, ypos: f64) {
        self.camera.process_mouse(xpos, ypos);
    }

    pub fn set_mouse_button(&mut self, button: MouseButton, pressed: bool) {
        self.camera.set_mouse_button(button, pressed);
    }

    pub fn process_roll(&mut self, d: f32) {
        self.camera.process_roll(d);
    }

    pub fn flip_ground(&mut self) {
        self.camera.flip_ground();
    }

    #[inline]
    pub fn camera(&self) -> &Camera {
        &self.camera
    }

    #[inline]
    pub fn camera_mut(&mut self) -> &mut Camera {
        &mut self.camera
    }

    // --- Model transform ---

    /// Moves the whole set by `delta` in world space.
    pub fn translate_model(&mut self, delta: Vec3) -> Result<(), ViewerError> {
        self.model = Mat4::from_translation(delta) * self.model;
        self.renderer.set_model_matrix(&self.model)
    }

    #[inline]
    pub fn model_matrix(&self) -> Mat4 {
        self.model
    }

    // --- Render settings ---

    pub fn set_scale_modifier(&mut self, modifier: f32) -> Result<(), ViewerError> {
        self.scale_modifier = modifier;
        self.renderer.set_scale_modifier(modifier)
    }

    #[inline]
    pub fn scale_modifier(&self) -> f32 {
        self.scale_modifier
    }

    pub fn set_render_mode(&mut self, mode: RenderMode) -> Result<(), ViewerError> {
        self.render_mode = mode;
        self.renderer.set_render_mode(mode)
    }

    #[inline]
    pub fn render_mode(&self) -> RenderMode {
        self.render_mode
    }

    /// Returns true when the order may now be stale and a sort is due.
    pub fn set_auto_sort(&mut self, on: bool) -> bool {
        let due = on && !self.auto_sort;
        self.auto_sort = on;
        due
    }

    #[inline]
    pub fn auto_sort(&self) -> bool {
        self.auto_sort
    }

    pub fn sort_backend(&self) -> &'static str {
        self.sorter.backend_name()
    }

    // --- Frame ---

    pub fn update_camera_pose_lazy(&mut self) -> Result<(), ViewerError> {
        if self.camera.is_pose_dirty() {
            self.renderer.update_camera_pose(&self.camera)?;
            self.camera.mark_pose_clean();
        }
        Ok(())
    }

    pub fn update_camera_intrin_lazy(&mut self) -> Result<(), ViewerError> {
        if self.camera.is_intrinsic_dirty() {
            self.renderer.update_camera_intrin(&self.camera)?;
            self.camera.mark_intrinsic_clean();
        }
        Ok(())
    }

    /// Sorts under `view * model` and uploads the order.
    pub fn sort_and_update(&mut self) -> Result<(), ViewerError> {
        let view = self.camera.get_view_matrix() * self.model;
        self.renderer
            .sort_and_update(&mut self.sorter, &self.gaussians, &view)
    }

    /// Pose upload, intrinsic upload, then the auto-sort, in that order.
    pub fn process_frame(&mut self) -> Result<(), ViewerError> {
        self.update_camera_pose_lazy()?;
        self.update_camera_intrin_lazy()?;
        if self.auto_sort {
            self.sort_and_update()?;
        }
        Ok(())
    }

    /// Ignores zero-sized (minimised) windows.
    pub fn resize(&mut self, width: u32, height: u32) -> Result<(), ViewerError> {
        if width == 0 || height == 0 {
            return Ok(());
        }
        self.camera.update_resolution(width, height);
        self.renderer.set_render_resolution(width, height)
    }

    pub fn draw(&mut self, target: &R::Target) -> Result<(), ViewerError> {
        self.renderer.draw(target)
    }

    #[inline]
    pub fn renderer(&self) -> &R {
        &self.renderer
    }

    #[inline]
    pub fn renderer_mut(&mut self) -> &mut R {
        &mut self.renderer
    }
}
