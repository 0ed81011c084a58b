//! Core data types for the splat viewer, focused on GPU data representation.

use glam::{Mat4, Vec3};

/// Floats per Gaussian before the colour block: position 3 + rotation 4 +
/// scale 3 + opacity 1.
pub const BASE_FLOATS: usize = 11;

pub const POS_OFFSET: usize = 0;
pub const ROT_OFFSET: usize = 3;
pub const SCALE_OFFSET: usize = 7;
pub const OPACITY_OFFSET: usize = 10;
pub const SH_OFFSET: usize = 11;

/// Visualisation selector. The discriminant is what the shader sees as
/// `render_mod`; non-negative values cap the SH degree used for colour.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, clap::ValueEnum)]
#[repr(i32)]
pub enum RenderMode {
    GaussianBall = -4,
    FlatBall = -3,
    Billboard = -2,
    Depth = -1,
    Sh0 = 0,
    Sh1 = 1,
    Sh2 = 2,
    #[default]
    Sh3 = 3,
}

impl RenderMode {
    pub const ALL: [RenderMode; 8] = [
        RenderMode::GaussianBall,
        RenderMode::FlatBall,
        RenderMode::Billboard,
        RenderMode::Depth,
        RenderMode::Sh0,
        RenderMode::Sh1,
        RenderMode::Sh2,
        RenderMode::Sh3,
    ];

    #[inline]
    pub fn shader_id(self) -> i32 {
        self as i32
    }

    pub fn label(self) -> &'static str {
        match self {
            RenderMode::GaussianBall => "Gaussian Ball",
            RenderMode::FlatBall => "Flat Ball",
            RenderMode::Billboard => "Billboard",
            RenderMode::Depth => "Depth",
            RenderMode::Sh0 => "SH:0",
            RenderMode::Sh1 => "SH:0~1",
            RenderMode::Sh2 => "SH:0~2",
            RenderMode::Sh3 => "SH:0~3",
        }
    }
}

/// Uniform block consumed by `splat.wgsl`, respecting std140/WGSL layout.
/// Matrices are column-major.
#[repr(C)]
#[derive(Clone, Copy, Debug, PartialEq, bytemuck::Pod, bytemuck::Zeroable)]
pub struct SplatUniforms {
    pub view_matrix: [[f32; 4]; 4],       // 0
    pub projection_matrix: [[f32; 4]; 4], // 64
    pub model_matrix: [[f32; 4]; 4],      // 128
    pub cam_pos: [f32; 3],                // 192
    pub sh_dim: i32,                      // 204
    pub hfovxy_focal: [f32; 3],           // 208
    pub scale_modifier: f32,              // 220
    pub render_mod: i32,                  // 224
    pub _pad: [i32; 3],                   // 228 -> 240
}

// Compile-time safety check: buffer size must match the WGSL struct size.
const _: [(); 240] = [(); core::mem::size_of::<SplatUniforms>()];

impl Default for SplatUniforms {
    fn default() -> Self {
        Self {
            view_matrix: Mat4::IDENTITY.to_cols_array_2d(),
            projection_matrix: Mat4::IDENTITY.to_cols_array_2d(),
            model_matrix: Mat4::IDENTITY.to_cols_array_2d(),
            cam_pos: [0.0; 3],
            sh_dim: 3,
            hfovxy_focal: [1.0, 1.0, 1.0],
            scale_modifier: 1.0,
            render_mod: RenderMode::default().shader_id(),
            _pad: [0; 3],
        }
    }
}

impl SplatUniforms {
    pub fn set_pose(&mut self, view: Mat4, cam_pos: Vec3) {
        self.view_matrix = view.to_cols_array_2d();
        self.cam_pos = cam_pos.to_array();
    }

    pub fn set_intrinsics(&mut self, projection: Mat4, hfovxy_focal: Vec3) {
        self.projection_matrix = projection.to_cols_array_2d();
        self.hfovxy_focal = hfovxy_focal.to_array();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::mem::offset_of;

    #[test]
    fn uniform_offsets_match_wgsl() {
        assert_eq!(offset_of!(SplatUniforms, projection_matrix), 64);
        assert_eq!(offset_of!(SplatUniforms, model_matrix), 128);
        assert_eq!(offset_of!(SplatUniforms, cam_pos), 192);
        assert_eq!(offset_of!(SplatUniforms, sh_dim), 204);
        assert_eq!(offset_of!(SplatUniforms, hfovxy_focal), 208);
        assert_eq!(offset_of!(SplatUniforms, scale_modifier), 220);
        assert_eq!(offset_of!(SplatUniforms, render_mod), 224);
    }

    #[test]
    fn render_mode_ids() {
        assert_eq!(RenderMode::default(), RenderMode::Sh3);
        let ids: Vec<i32> = RenderMode::ALL.iter().map(|m| m.shader_id()).collect();
        assert_eq!(ids, vec![-4, -3, -2, -1, 0, 1, 2, 3]);
    }

    #[test]
    fn pose_and_intrinsics_are_written_column_major() {
        let mut u = SplatUniforms::default();
        let view = Mat4::from_translation(Vec3::new(1.0, 2.0, 3.0));
        u.set_pose(view, Vec3::new(4.0, 5.0, 6.0));
        assert_eq!(u.view_matrix[3], [1.0, 2.0, 3.0, 1.0]);
        assert_eq!(u.cam_pos, [4.0, 5.0, 6.0]);

        u.set_intrinsics(Mat4::IDENTITY, Vec3::new(0.5, 0.25, 800.0));
        assert_eq!(u.hfovxy_focal, [0.5, 0.25, 800.0]);
    }
}
