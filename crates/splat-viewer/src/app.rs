use crate::{
    config::Config,
    input::InputController,
    renderer::GpuRenderer,
    sort::SortContext,
    ui::{self, PanelView, UiState},
    world::World,
};
use anyhow::Result;
use std::{sync::Arc, time::Instant};
use winit::{event::WindowEvent, window::Window};

pub struct App {
    pub world: World<GpuRenderer>,
    pub input: InputController,
    pub egui_ctx: egui::Context,
    pub egui_state: egui_winit::State,
    pub egui_renderer: egui_wgpu::Renderer,
    pub ui_state: UiState,
    last_frame: Instant,
}

impl App {
    pub async fn new(window: Arc<Window>, config: &Config) -> Result<Self> {
        let renderer = GpuRenderer::new(window.clone(), config.vsync).await?;
        let size = renderer.gfx.size;
        let format = renderer.surface_format();

        let sorter = SortContext::with_kind(config.sort_backend);
        let mut world = World::new(
            renderer,
            sorter,
            config.world_options(size.width.max(1), size.height.max(1)),
        )?;
        log::info!("Depth sort backend: {}", world.sort_backend());

        let mut ui_state = UiState::default();
        if let Some(path) = &config.ply {
            ui_state.path_input = path.display().to_string();
            // A bad file on the command line still opens the viewer.
            if let Err(err) = world.load_ply(path) {
                log::error!("Failed to load {}: {}", path.display(), err);
                ui_state.last_error = Some(err.to_string());
            }
        }

        let egui_ctx = egui::Context::default();
        let egui_state = egui_winit::State::new(
            egui_ctx.clone(),
            egui_ctx.viewport_id(),
            &*window,
            None,
            None,
        );
        let egui_renderer = egui_wgpu::Renderer::new(&world.renderer().gfx.device, format, None, 1);

        Ok(Self {
            world,
            input: InputController::new(),
            egui_ctx,
            egui_state,
            egui_renderer,
            ui_state,
            last_frame: Instant::now(),
        })
    }

    pub fn resize(&mut self, new_size: winit::dpi::PhysicalSize<u32>) {
        if let Err(err) = self.world.resize(new_size.width, new_size.height) {
            log::error!("Resize failed: {}", err);
        }
    }

    /// Returns true when the event was consumed by the UI or the viewer.
    pub fn handle_event(&mut self, window: &Window, event: &WindowEvent) -> bool {
        let response = self.egui_state.on_window_event(window, event);
        if response.consumed {
            return true;
        }

        match event {
            WindowEvent::Resized(physical_size) => {
                self.resize(*physical_size);
                false
            }
            WindowEvent::Focused(false) => {
                self.input.release_all();
                false
            }
            _ => match self.input.handle_event(event, &mut self.world) {
                Ok(consumed) => consumed,
                Err(err) => {
                    log::error!("Input handling failed: {}", err);
                    false
                }
            },
        }
    }

    pub fn render(&mut self, window: &Window) -> Result<(), wgpu::SurfaceError> {
        let now = Instant::now();
        let dt = now.duration_since(self.last_frame).as_secs_f32();
        self.last_frame = now;
        self.ui_state.frame_ms = dt * 1000.0;

        self.input.update(&mut self.world, dt);
        if let Err(err) = self.world.process_frame() {
            log::error!("Frame update failed: {}", err);
        }

        let frame = self.world.renderer().gfx.surface.get_current_texture()?;
        let swap_view = frame
            .texture
            .create_view(&wgpu::TextureViewDescriptor::default());

        if let Err(err) = self.world.draw(&swap_view) {
            log::error!("Draw failed: {}", err);
        }

        // --- UI overlay ---
        let egui_input = self.egui_state.take_egui_input(window);
        self.egui_ctx.begin_frame(egui_input);
        let view = PanelView::of(&self.world);
        let actions = ui::draw_panel(&self.egui_ctx, &mut self.ui_state, &view);
        let egui_output = self.egui_ctx.end_frame();

        self.egui_state
            .handle_platform_output(window, egui_output.platform_output.clone());

        let shapes = self
            .egui_ctx
            .tessellate(egui_output.shapes, self.egui_ctx.pixels_per_point());

        let gfx = &self.world.renderer().gfx;
        let screen_descriptor = egui_wgpu::ScreenDescriptor {
            size_in_pixels: [gfx.config.width, gfx.config.height],
            pixels_per_point: self.egui_ctx.pixels_per_point(),
        };

        let mut encoder = gfx
            .device
            .create_command_encoder(&wgpu::CommandEncoderDescriptor {
                label: Some("UI Encoder"),
            });

        for (id, delta) in &egui_output.textures_delta.set {
            self.egui_renderer
                .update_texture(&gfx.device, &gfx.queue, *id, delta);
        }

        self.egui_renderer.update_buffers(
            &gfx.device,
            &gfx.queue,
            &mut encoder,
            &shapes,
            &screen_descriptor,
        );

        {
            let mut render_pass = encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
                label: Some("EGUI Pass"),
                color_attachments: &[Some(wgpu::RenderPassColorAttachment {
                    view: &swap_view,
                    resolve_target: None,
                    ops: wgpu::Operations {
                        load: wgpu::LoadOp::Load,
                        store: wgpu::StoreOp::Store,
                    },
                })],
                depth_stencil_attachment: None,
                timestamp_writes: None,
                occlusion_query_set: None,
            });

            self.egui_renderer
                .render(&mut render_pass, &shapes, &screen_descriptor);
        }

        for id in &egui_output.textures_delta.free {
            self.egui_renderer.free_texture(id);
        }

        gfx.queue.submit(std::iter::once(encoder.finish()));
        frame.present();

        // Panel actions land after the frame so the next one reflects them.
        for action in actions {
            if let Err(err) = ui::apply_action(&mut self.world, &mut self.ui_state, action) {
                log::error!("UI action failed: {}", err);
            }
        }

        Ok(())
    }
}
