//! egui side panel. Drawing only collects [`UiAction`]s; they are applied to
//! the world afterwards so the panel never holds a mutable borrow of it.

use crate::{data::RenderMode, error::ViewerError, renderer::SplatRenderer, world::World};
use std::path::PathBuf;

#[derive(Debug, Clone, PartialEq)]
pub enum UiAction {
    LoadPly(PathBuf),
    ResetScene,
    SortNow,
    FlipGround,
    SetAutoSort(bool),
    SetRenderMode(RenderMode),
    SetScaleModifier(f32),
}

/// Panel state that lives across frames.
#[derive(Debug, Default)]
pub struct UiState {
    pub path_input: String,
    pub last_error: Option<String>,
    pub frame_ms: f32,
}

/// Read-only snapshot of the world for one panel frame.
#[derive(Debug, Clone)]
pub struct PanelView {
    pub gaussians: usize,
    pub sh_dim: usize,
    pub source: Option<String>,
    pub sort_backend: &'static str,
    pub auto_sort: bool,
    pub render_mode: RenderMode,
    pub scale_modifier: f32,
}

impl PanelView {
    pub fn of<R: SplatRenderer>(world: &World<R>) -> Self {
        Self {
            gaussians: world.num_gaussians(),
            sh_dim: world.gaussians().sh_dim(),
            source: world.source().map(|p| p.display().to_string()),
            sort_backend: world.sort_backend(),
            auto_sort: world.auto_sort(),
            render_mode: world.render_mode(),
            scale_modifier: world.scale_modifier(),
        }
    }
}

pub fn draw_panel(ctx: &egui::Context, state: &mut UiState, view: &PanelView) -> Vec<UiAction> {
    let mut actions = Vec::new();

    egui::SidePanel::left("controls").resizable(false).show(ctx, |ui| {
        ui.heading("Splat Viewer");
        ui.label(format!("{:.2} ms / frame", state.frame_ms));
        ui.label(format!("Gaussians: {}", view.gaussians));
        ui.label(format!("SH floats per splat: {}", view.sh_dim));
        ui.label(format!(
            "Source: {}",
            view.source.as_deref().unwrap_or("axis markers")
        ));
        ui.separator();

        ui.label("PLY path");
        ui.text_edit_singleline(&mut state.path_input);
        ui.horizontal(|ui| {
            if ui.button("Load").clicked() && !state.path_input.trim().is_empty() {
                actions.push(UiAction::LoadPly(PathBuf::from(state.path_input.trim())));
            }
            if ui.button("Reset").clicked() {
                actions.push(UiAction::ResetScene);
            }
        });
        if let Some(err) = &state.last_error {
            ui.colored_label(egui::Color32::LIGHT_RED, err.as_str());
        }
        ui.separator();

        let mut mode = view.render_mode;
        egui::ComboBox::from_label("Render mode")
            .selected_text(mode.label())
            .show_ui(ui, |ui| {
                for m in RenderMode::ALL {
                    ui.selectable_value(&mut mode, m, m.label());
                }
            });
        if mode != view.render_mode {
            actions.push(UiAction::SetRenderMode(mode));
        }

        let mut scale = view.scale_modifier;
        if ui
            .add(egui::Slider::new(&mut scale, 0.1..=10.0).text("Scale modifier"))
            .changed()
        {
            actions.push(UiAction::SetScaleModifier(scale));
        }
        ui.separator();

        ui.label(format!("Sort backend: {}", view.sort_backend));
        let mut auto_sort = view.auto_sort;
        if ui.checkbox(&mut auto_sort, "Auto sort").changed() {
            actions.push(UiAction::SetAutoSort(auto_sort));
        }
        if ui.button("Sort now").clicked() {
            actions.push(UiAction::SortNow);
        }
        if ui.button("Flip ground").clicked() {
            actions.push(UiAction::FlipGround);
        }
    });

    actions
}

/// Applies one panel action. Load failures are recorded in `state` and
/// leave the world as it was.
pub fn apply_action<R: SplatRenderer>(
    world: &mut World<R>,
    state: &mut UiState,
    action: UiAction,
) -> Result<(), ViewerError> {
    match action {
        UiAction::LoadPly(path) => match world.load_ply(&path) {
            Ok(()) => state.last_error = None,
            Err(err @ ViewerError::Format(_)) => {
                log::warn!("failed to load {}: {err}", path.display());
                state.last_error = Some(err.to_string());
            }
            Err(err) => return Err(err),
        },
        UiAction::ResetScene => {
            world.reset_to_naive()?;
            state.last_error = None;
        }
        UiAction::SortNow => world.sort_and_update()?,
        UiAction::FlipGround => world.flip_ground(),
        UiAction::SetAutoSort(on) => {
            if world.set_auto_sort(on) {
                world.sort_and_update()?;
            }
        }
        UiAction::SetRenderMode(mode) => world.set_render_mode(mode)?,
        UiAction::SetScaleModifier(f) => world.set_scale_modifier(f)?,
    }
    Ok(())
}
