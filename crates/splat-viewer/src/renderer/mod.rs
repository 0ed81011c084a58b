//! Renderer seam and its wgpu implementation. The renderer owns every GPU
//! handle; the rest of the viewer talks to it through [`SplatRenderer`].

pub mod context;
pub mod pipelines;
pub mod state;

use self::{
    context::GfxContext,
    pipelines::splat::SplatPipeline,
    state::{FrameReadiness, RendererState},
};
use crate::{
    camera::Camera,
    data::{
        types::{RenderMode, SplatUniforms},
        GaussianSet,
    },
    error::ViewerError,
    sort::SortContext,
};
use glam::Mat4;
use std::sync::Arc;
use wgpu::util::DeviceExt;
use winit::window::Window;

/// Operations the session drives each frame. Every call either fully
/// applies or leaves the previously bound state in place.
pub trait SplatRenderer {
    /// Whatever `draw` renders into.
    type Target: ?Sized;

    /// Replaces the bound Gaussian rows with `set.flatten()` and updates the
    /// SH width. Any previously uploaded order is considered stale.
    fn update_gaussian_data(&mut self, set: &GaussianSet) -> Result<(), ViewerError>;

    /// Uploads a back-to-front permutation of the bound set.
    fn upload_order(&mut self, order: &[u32]) -> Result<(), ViewerError>;

    /// Sorts `set` under `view` and uploads the result. Skips both when the
    /// context's cached order is still valid for this set and view.
    fn sort_and_update(
        &mut self,
        sorter: &mut SortContext,
        set: &GaussianSet,
        view: &Mat4,
    ) -> Result<(), ViewerError> {
        if sorter.is_current(view) && sorter.order().len() == set.len() {
            return Ok(());
        }
        let order = sorter.sort(set.positions(), view);
        self.upload_order(order)
    }

    fn update_camera_pose(&mut self, camera: &Camera) -> Result<(), ViewerError>;
    fn update_camera_intrin(&mut self, camera: &Camera) -> Result<(), ViewerError>;
    fn set_scale_modifier(&mut self, modifier: f32) -> Result<(), ViewerError>;
    fn set_render_mode(&mut self, mode: RenderMode) -> Result<(), ViewerError>;
    fn set_model_matrix(&mut self, model: &Mat4) -> Result<(), ViewerError>;
    fn set_render_resolution(&mut self, width: u32, height: u32) -> Result<(), ViewerError>;

    /// One instanced quad draw over the current order. A no-op until data,
    /// a matching order and both camera blocks are in place.
    fn draw(&mut self, target: &Self::Target) -> Result<(), ViewerError>;
}

/// Smallest storage allocation; zero-sized bindings are invalid.
const MIN_STORAGE_BYTES: u64 = 16;

/// A storage buffer together with its allocated size.
struct StorageBuffer {
    buffer: wgpu::Buffer,
    capacity: u64,
}

impl StorageBuffer {
    fn new(device: &wgpu::Device, label: &str) -> Self {
        let buffer = device.create_buffer(&wgpu::BufferDescriptor {
            label: Some(label),
            size: MIN_STORAGE_BYTES,
            usage: wgpu::BufferUsages::STORAGE | wgpu::BufferUsages::COPY_DST,
            mapped_at_creation: false,
        });
        Self {
            buffer,
            capacity: MIN_STORAGE_BYTES,
        }
    }

    /// Allocates a replacement when `bytes` does not fit. Returns `None` when
    /// the current buffer can be reused. Never touches `self`, so a failed
    /// allocation leaves the bound buffer intact.
    fn grow(&self, device: &wgpu::Device, bytes: u64, label: &str) -> Result<Option<StorageBuffer>, ViewerError> {
        let needed = bytes.max(MIN_STORAGE_BYTES);
        if needed <= self.capacity {
            return Ok(None);
        }

        let limit = u64::from(device.limits().max_storage_buffer_binding_size);
        if needed > limit {
            return Err(ViewerError::Resource(format!(
                "{label}: {needed} bytes exceeds the device storage binding limit of {limit}"
            )));
        }

        device.push_error_scope(wgpu::ErrorFilter::OutOfMemory);
        let buffer = device.create_buffer(&wgpu::BufferDescriptor {
            label: Some(label),
            size: needed,
            usage: wgpu::BufferUsages::STORAGE | wgpu::BufferUsages::COPY_DST,
            mapped_at_creation: false,
        });
        if let Some(err) = pollster::block_on(device.pop_error_scope()) {
            return Err(ViewerError::Resource(format!("{label}: {err}")));
        }

        log::debug!("{label}: grew storage buffer to {needed} bytes");
        Ok(Some(StorageBuffer {
            buffer,
            capacity: needed,
        }))
    }
}

/// wgpu-backed splat renderer.
pub struct GpuRenderer {
    pub gfx: GfxContext,
    pipeline: SplatPipeline,
    gaussians: StorageBuffer,
    order: StorageBuffer,
    uniform_buf: wgpu::Buffer,
    bind_group: wgpu::BindGroup,
    uniforms: SplatUniforms,
    uniforms_dirty: bool,
    readiness: FrameReadiness,
    pub clear_color: wgpu::Color,
}

impl GpuRenderer {
    pub async fn new(window: Arc<Window>, vsync: bool) -> anyhow::Result<Self> {
        let gfx = GfxContext::new(window, vsync).await?;
        Ok(Self::with_context(gfx)?)
    }

    /// Builds the pipeline and empty buffers on an existing context.
    pub fn with_context(gfx: GfxContext) -> Result<Self, ViewerError> {
        let device = &gfx.device;
        let pipeline = SplatPipeline::new(device, gfx.config.format)?;

        let uniforms = SplatUniforms::default();
        let uniform_buf = device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
            label: Some("Splat Uniforms"),
            contents: bytemuck::bytes_of(&uniforms),
            usage: wgpu::BufferUsages::UNIFORM | wgpu::BufferUsages::COPY_DST,
        });

        let gaussians = StorageBuffer::new(device, "Gaussian Storage");
        let order = StorageBuffer::new(device, "Order Storage");
        let bind_group = pipeline.bind_group(device, &gaussians.buffer, &order.buffer, &uniform_buf);

        Ok(Self {
            gfx,
            pipeline,
            gaussians,
            order,
            uniform_buf,
            bind_group,
            uniforms,
            uniforms_dirty: false,
            readiness: FrameReadiness::ready(),
            clear_color: wgpu::Color::BLACK,
        })
    }

    #[inline]
    pub fn state(&self) -> RendererState {
        self.readiness.state()
    }

    #[inline]
    pub fn uniforms(&self) -> &SplatUniforms {
        &self.uniforms
    }

    #[inline]
    pub fn surface_format(&self) -> wgpu::TextureFormat {
        self.gfx.config.format
    }

    fn rebind(&mut self) {
        self.bind_group = self.pipeline.bind_group(
            &self.gfx.device,
            &self.gaussians.buffer,
            &self.order.buffer,
            &self.uniform_buf,
        );
    }

    fn flush_uniforms(&mut self) {
        if self.uniforms_dirty {
            self.gfx
                .queue
                .write_buffer(&self.uniform_buf, 0, bytemuck::bytes_of(&self.uniforms));
            self.uniforms_dirty = false;
        }
    }
}

fn count_u32(n: usize) -> Result<u32, ViewerError> {
    u32::try_from(n).map_err(|_| ViewerError::Resource(format!("{n} instances exceed the u32 draw range")))
}

impl SplatRenderer for GpuRenderer {
    type Target = wgpu::TextureView;

    fn update_gaussian_data(&mut self, set: &GaussianSet) -> Result<(), ViewerError> {
        let count = count_u32(set.len())?;
        let flat = set.flatten();
        let data_bytes = (flat.len() * std::mem::size_of::<f32>()) as u64;
        let order_bytes = (set.len() * std::mem::size_of::<u32>()) as u64;

        // Allocate both before replacing either.
        let device = &self.gfx.device;
        let new_data = self.gaussians.grow(device, data_bytes, "Gaussian Storage")?;
        let new_order = self.order.grow(device, order_bytes, "Order Storage")?;

        let grew = new_data.is_some() || new_order.is_some();
        if let Some(buf) = new_data {
            self.gaussians = buf;
        }
        if let Some(buf) = new_order {
            self.order = buf;
        }
        if grew {
            self.rebind();
        }

        if !flat.is_empty() {
            self.gfx
                .queue
                .write_buffer(&self.gaussians.buffer, 0, bytemuck::cast_slice(&flat));
        }

        self.uniforms.sh_dim = set.sh_dim() as i32;
        self.uniforms_dirty = true;
        self.readiness.bind_gaussians(count);

        log::debug!(
            "bound {} gaussians ({} floats per row, {} bytes)",
            count,
            set.row_width(),
            data_bytes
        );
        Ok(())
    }

    fn upload_order(&mut self, order: &[u32]) -> Result<(), ViewerError> {
        let count = count_u32(order.len())?;
        let bytes = std::mem::size_of_val(order) as u64;
        if let Some(buf) = self.order.grow(&self.gfx.device, bytes, "Order Storage")? {
            self.order = buf;
            self.rebind();
        }

        if !order.is_empty() {
            self.gfx
                .queue
                .write_buffer(&self.order.buffer, 0, bytemuck::cast_slice(order));
        }
        self.readiness.bind_order(count);
        Ok(())
    }

    fn update_camera_pose(&mut self, camera: &Camera) -> Result<(), ViewerError> {
        self.uniforms.set_pose(camera.get_view_matrix(), camera.position);
        self.uniforms_dirty = true;
        self.readiness.pose = true;
        Ok(())
    }

    fn update_camera_intrin(&mut self, camera: &Camera) -> Result<(), ViewerError> {
        self.uniforms
            .set_intrinsics(camera.get_project_matrix(), camera.get_focal_params());
        self.uniforms_dirty = true;
        self.readiness.intrinsics = true;
        Ok(())
    }

    fn set_scale_modifier(&mut self, modifier: f32) -> Result<(), ViewerError> {
        self.uniforms.scale_modifier = modifier;
        self.uniforms_dirty = true;
        Ok(())
    }

    fn set_render_mode(&mut self, mode: RenderMode) -> Result<(), ViewerError> {
        self.uniforms.render_mod = mode.shader_id();
        self.uniforms_dirty = true;
        Ok(())
    }

    fn set_model_matrix(&mut self, model: &Mat4) -> Result<(), ViewerError> {
        self.uniforms.model_matrix = model.to_cols_array_2d();
        self.uniforms_dirty = true;
        Ok(())
    }

    fn set_render_resolution(&mut self, width: u32, height: u32) -> Result<(), ViewerError> {
        self.gfx.resize(winit::dpi::PhysicalSize::new(width, height));
        Ok(())
    }

    fn draw(&mut self, target: &wgpu::TextureView) -> Result<(), ViewerError> {
        self.flush_uniforms();

        let instances = self.readiness.instance_count();
        if !self.readiness.is_drawable() {
            log::trace!("skipping draw in state {:?}", self.readiness.state());
        }

        let mut encoder = self
            .gfx
            .device
            .create_command_encoder(&wgpu::CommandEncoderDescriptor {
                label: Some("Splat Encoder"),
            });

        {
            let mut pass = encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
                label: Some("Splat Pass"),
                color_attachments: &[Some(wgpu::RenderPassColorAttachment {
                    view: target,
                    resolve_target: None,
                    ops: wgpu::Operations {
                        load: wgpu::LoadOp::Clear(self.clear_color),
                        store: wgpu::StoreOp::Store,
                    },
                })],
                depth_stencil_attachment: None,
                timestamp_writes: None,
                occlusion_query_set: None,
            });

            if instances > 0 {
                self.pipeline.draw(&mut pass, &self.bind_group, instances);
            }
        }

        self.gfx.queue.submit(std::iter::once(encoder.finish()));
        Ok(())
    }
}
