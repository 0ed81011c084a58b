use crate::{data::RenderMode, sort::SortBackendKind, world::WorldOptions};
use clap::Parser;
use std::path::PathBuf;

/// `splat-viewer` - An interactive 3D Gaussian Splatting viewer.
///
/// Opens a window showing either a 3DGS point cloud loaded from a PLY file or,
/// without one, four small axis-marker splats.
#[derive(Parser, Debug, Clone)]
#[command(version, about, long_about = None)]
pub struct Config {
    /// The 3DGS `.ply` file to open at startup.
    #[arg(env = "SPLAT_PLY_PATH")]
    pub ply: Option<PathBuf>,

    /// Initial window width in logical pixels.
    #[arg(long, env = "SPLAT_WIDTH", default_value_t = 1280)]
    pub width: u32,

    /// Initial window height in logical pixels.
    #[arg(long, env = "SPLAT_HEIGHT", default_value_t = 720)]
    pub height: u32,

    /// Depth sort implementation.
    ///
    /// `auto` uses the parallel sort when more than one worker thread is
    /// available.
    #[arg(long, value_enum, env = "SPLAT_SORT_BACKEND", default_value_t = SortBackendKind::Auto)]
    pub sort_backend: SortBackendKind,

    /// Highest spherical-harmonics degree expected in loaded files.
    ///
    /// Files must carry exactly `3 * (d + 1)^2 - 3` `f_rest_*` properties.
    #[arg(long, env = "SPLAT_SH_DEGREE", default_value_t = 3, value_parser = clap::value_parser!(u32).range(0..=3))]
    pub sh_degree: u32,

    /// Only re-sort when asked to from the UI.
    #[arg(long, default_value_t = false)]
    pub no_auto_sort: bool,

    /// Initial render mode.
    #[arg(long, value_enum, default_value_t = RenderMode::Sh3)]
    pub render_mode: RenderMode,

    /// Multiplier applied to every Gaussian's scale.
    #[arg(long, default_value_t = 1.0)]
    pub scale_modifier: f32,

    /// Present with vertical sync.
    #[arg(long, env = "SPLAT_VSYNC", default_value_t = true, action = clap::ArgAction::Set)]
    pub vsync: bool,
}

impl Config {
    pub fn world_options(&self, width: u32, height: u32) -> WorldOptions {
        WorldOptions {
            width,
            height,
            max_sh_degree: self.sh_degree,
            auto_sort: !self.no_auto_sort,
            render_mode: self.render_mode,
            scale_modifier: self.scale_modifier,
        }
    }
}
