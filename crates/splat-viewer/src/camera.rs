use crate::error::ViewerError;
use glam::{Mat3, Mat4, Vec3};
use std::f32::consts::{FRAC_PI_2, PI};

/// Forward direction used when `target - position` collapses to zero.
pub const FALLBACK_FORWARD: Vec3 = Vec3::NEG_Z;

const EPSILON: f32 = 1e-6;

/// Orbit pitch stays one degree short of the poles so the view direction
/// never lines up with `up`.
const MAX_PITCH: f32 = 89.0 * PI / 180.0;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MouseButton {
    Left,
    Right,
}

/// Input gains. Defaults match the classic 3DGS viewer feel.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Sensitivity {
    pub rotation: f32,
    pub translation: f32,
    pub zoom: f32,
    pub roll: f32,
}

impl Default for Sensitivity {
    fn default() -> Self {
        Self {
            rotation: 0.02,
            translation: 0.01,
            zoom: 0.08,
            roll: 0.03,
        }
    }
}

/// Orbit/fly camera. Pose and intrinsics are only mutated through the
/// `process_*` family; downstream GPU state is refreshed lazily through the
/// two dirty flags.
#[derive(Debug, Clone)]
pub struct Camera {
    // --- Pose ---
    pub position: Vec3,
    pub target: Vec3,
    pub up: Vec3,
    /// Orbit angles around `target`, expressed in the up-corrected frame.
    yaw: f32,
    pitch: f32,

    // --- Intrinsics ---
    /// Vertical field of view (radians).
    fovy: f32,
    pub znear: f32,
    pub zfar: f32,
    width: u32,
    height: u32,

    // --- Lazy GPU update flags ---
    dirty_pose: bool,
    dirty_intrinsic: bool,

    // --- Mouse state ---
    last_x: f64,
    last_y: f64,
    first_mouse: bool,
    left_pressed: bool,
    right_pressed: bool,

    pub sensitivity: Sensitivity,
    /// Distance used by [`Camera::update_target_distance`].
    pub target_dist: f32,
}

impl Camera {
    pub fn new(width: u32, height: u32) -> Self {
        let mut camera = Self {
            position: Vec3::new(0.0, 0.0, 3.0),
            target: Vec3::ZERO,
            // 3DGS captures are usually Y-down (COLMAP convention).
            up: Vec3::new(0.0, -1.0, 0.0),
            yaw: -FRAC_PI_2,
            pitch: 0.0,
            fovy: FRAC_PI_2,
            znear: 0.01,
            zfar: 100.0,
            width: width.max(1),
            height: height.max(1),
            dirty_pose: true,
            dirty_intrinsic: true,
            last_x: f64::from(width) / 2.0,
            last_y: f64::from(height) / 2.0,
            first_mouse: true,
            left_pressed: false,
            right_pressed: false,
            sensitivity: Sensitivity::default(),
            target_dist: 3.0,
        };

        camera.sync_orbit_angles();
        camera
    }

    /// Replaces the whole pose. Rejects a pose with no viewing direction or
    /// no usable up vector.
    pub fn set_pose(&mut self, position: Vec3, target: Vec3, up: Vec3) -> Result<(), ViewerError> {
        let Some(forward) = (target - position).try_normalize() else {
            return Err(ViewerError::DegenerateInput("camera position equals target"));
        };
        let Some(up) = up.try_normalize() else {
            return Err(ViewerError::DegenerateInput("camera up vector has zero length"));
        };
        if forward.cross(up).length_squared() < EPSILON {
            return Err(ViewerError::DegenerateInput("camera up is parallel to the view direction"));
        }

        self.position = position;
        self.target = target;
        self.up = up;
        self.sync_orbit_angles();
        self.dirty_pose = true;
        Ok(())
    }

    #[inline]
    pub fn fovy(&self) -> f32 {
        self.fovy
    }

    pub fn set_fovy(&mut self, fovy: f32) {
        self.fovy = fovy.clamp(0.01, PI - 0.01);
        self.dirty_intrinsic = true;
    }

    #[inline]
    pub fn resolution(&self) -> (u32, u32) {
        (self.width, self.height)
    }

    #[inline]
    pub fn aspect(&self) -> f32 {
        self.width as f32 / self.height as f32
    }

    pub fn update_resolution(&mut self, width: u32, height: u32) {
        self.width = width.max(1);
        self.height = height.max(1);
        self.dirty_intrinsic = true;
    }

    // --- Dirty flags ---

    #[inline]
    pub fn is_pose_dirty(&self) -> bool {
        self.dirty_pose
    }

    #[inline]
    pub fn is_intrinsic_dirty(&self) -> bool {
        self.dirty_intrinsic
    }

    #[inline]
    pub fn mark_pose_clean(&mut self) {
        self.dirty_pose = false;
    }

    #[inline]
    pub fn mark_intrinsic_clean(&mut self) {
        self.dirty_intrinsic = false;
    }

    // --- Derived matrices ---

    /// Right-handed look-at from `position` toward `target`.
    pub fn get_view_matrix(&self) -> Mat4 {
        Mat4::look_at_rh(self.position, self.target, self.up)
    }

    /// Perspective projection with a [0, 1] depth range.
    pub fn get_project_matrix(&self) -> Mat4 {
        Mat4::perspective_rh(self.fovy, self.aspect(), self.znear, self.zfar)
    }

    /// `(tan(fovx/2), tan(fovy/2), focal_px)` used to size splat footprints.
    pub fn get_focal_params(&self) -> Vec3 {
        let htany = (self.fovy / 2.0).tan();
        let htanx = htany * self.aspect();
        let focal = self.width as f32 / (2.0 * htanx);
        Vec3::new(htanx, htany, focal)
    }

    // --- Input processing ---

    /// Unit direction from `position` to `target`.
    pub fn forward(&self) -> Vec3 {
        (self.target - self.position)
            .try_normalize()
            .unwrap_or(FALLBACK_FORWARD)
    }

    /// Screen-right direction of the current view.
    pub fn right(&self) -> Vec3 {
        self.forward()
            .cross(self.up)
            .try_normalize()
            .unwrap_or(Vec3::X)
    }

    /// Fly along forward (`dy`) and right (`dx`). The combined direction is
    /// normalised, so one call moves exactly `translation` sensitivity.
    pub fn process_translation(&mut self, dx: f32, dy: f32) {
        let step = self.forward() * dy + self.right() * dx;
        let Some(step) = step.try_normalize() else {
            return;
        };

        let delta = step * self.sensitivity.translation;
        self.position += delta;
        self.target += delta;
        self.dirty_pose = true;
    }

    /// Dolly both `position` and `target` along forward.
    pub fn process_scroll(&mut self, yoffset: f32) {
        if yoffset == 0.0 {
            return;
        }

        let delta = self.forward() * yoffset * self.sensitivity.zoom;
        self.position += delta;
        self.target += delta;
        self.dirty_pose = true;
    }

    pub fn set_mouse_button(&mut self, button: MouseButton, pressed: bool) {
        match button {
            MouseButton::Left => self.left_pressed = pressed,
            MouseButton::Right => self.right_pressed = pressed,
        }
    }

    /// Left drag orbits around `target`, right drag pans.
    pub fn process_mouse(&mut self, xpos: f64, ypos: f64) {
        if self.first_mouse {
            self.last_x = xpos;
            self.last_y = ypos;
            self.first_mouse = false;
            return;
        }

        let xoffset = (xpos - self.last_x) as f32;
        let yoffset = (self.last_y - ypos) as f32;
        self.last_x = xpos;
        self.last_y = ypos;

        if xoffset == 0.0 && yoffset == 0.0 {
            return;
        }

        if self.left_pressed {
            self.yaw += xoffset * self.sensitivity.rotation;
            self.pitch = (self.pitch + yoffset * self.sensitivity.rotation).clamp(-MAX_PITCH, MAX_PITCH);

            let radius = (self.position - self.target).length();
            let front = self.up_basis() * orbit_direction(self.yaw, self.pitch);
            self.position = self.target - front * radius;
            self.dirty_pose = true;
        }

        if self.right_pressed {
            // Grab-the-scene panning: the scene follows the cursor.
            let front = self.forward();
            let right = self.up.cross(front).try_normalize().unwrap_or(Vec3::X);
            let cam_up = right.cross(front);

            let delta = (right * xoffset + cam_up * yoffset) * self.sensitivity.translation;
            self.position += delta;
            self.target += delta;
            self.dirty_pose = true;
        }
    }

    /// Tilts `up` toward the view-right axis.
    pub fn process_roll(&mut self, d: f32) {
        let right = (self.target - self.position).cross(self.up);
        let Some(right) = right.try_normalize() else {
            return;
        };

        let up = self.up + right * (d * self.sensitivity.roll);
        self.up = up.try_normalize().unwrap_or(self.up);
        self.sync_orbit_angles();
        self.dirty_pose = true;
    }

    pub fn flip_ground(&mut self) {
        self.up = -self.up;
        self.sync_orbit_angles();
        self.dirty_pose = true;
    }

    /// Moves `target` to sit `target_dist` ahead of the camera.
    pub fn update_target_distance(&mut self) {
        self.target = self.position + self.forward() * self.target_dist;
        self.dirty_pose = true;
    }

    /// Basis whose Y column is `up`; maps the canonical Y-up orbit frame
    /// onto a world with an arbitrary up vector.
    fn up_basis(&self) -> Mat3 {
        let z = Vec3::X.cross(self.up).try_normalize().unwrap_or(Vec3::Z);
        let x = self.up.cross(z);
        Mat3::from_cols(x, self.up, z)
    }

    /// Recovers yaw/pitch from the current pose so the next orbit step
    /// starts where the camera actually is.
    fn sync_orbit_angles(&mut self) {
        let Some(front) = (self.target - self.position).try_normalize() else {
            return;
        };

        let local = self.up_basis().transpose() * front;
        self.pitch = local.y.clamp(-1.0, 1.0).asin();
        self.yaw = local.z.atan2(local.x);
    }
}

#[inline]
fn orbit_direction(yaw: f32, pitch: f32) -> Vec3 {
    Vec3::new(yaw.cos() * pitch.cos(), pitch.sin(), yaw.sin() * pitch.cos())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn close(a: Vec3, b: Vec3) -> bool {
        (a - b).abs().max_element() < 1e-5
    }

    #[test]
    fn translation_moves_along_forward() {
        let mut cam = Camera::new(1280, 720);
        cam.mark_pose_clean();

        cam.process_translation(0.0, 1.0);

        let step = cam.sensitivity.translation;
        assert!(close(cam.position, Vec3::new(0.0, 0.0, 3.0 - step)));
        assert!(close(cam.target, Vec3::new(0.0, 0.0, -step)));
        assert!(cam.is_pose_dirty());
    }

    #[test]
    fn translation_is_normalised_and_right_is_screen_right() {
        let mut cam = Camera::new(1280, 720);
        cam.process_translation(250.0, 0.0);

        let moved = cam.position - Vec3::new(0.0, 0.0, 3.0);
        assert!((moved.length() - cam.sensitivity.translation).abs() < 1e-6);
        // With a Y-down up vector, screen right is world -X.
        assert!(moved.x < 0.0);
        assert!(close(cam.right(), Vec3::NEG_X));
    }

    #[test]
    fn zero_length_forward_uses_fallback() {
        let mut cam = Camera::new(800, 600);
        cam.target = cam.position;
        assert_eq!(cam.forward(), FALLBACK_FORWARD);

        cam.process_translation(0.0, 1.0);
        assert!(cam.position.is_finite());
        assert!(close(cam.position, Vec3::new(0.0, 0.0, 3.0 - cam.sensitivity.translation)));
    }

    #[test]
    fn zero_translation_is_a_no_op() {
        let mut cam = Camera::new(800, 600);
        cam.mark_pose_clean();
        cam.process_translation(0.0, 0.0);
        assert!(!cam.is_pose_dirty());
    }

    #[test]
    fn scroll_dollies_both_points() {
        let mut cam = Camera::new(800, 600);
        cam.process_scroll(2.0);
        let d = 2.0 * cam.sensitivity.zoom;
        assert!(close(cam.position, Vec3::new(0.0, 0.0, 3.0 - d)));
        assert!(close(cam.target, Vec3::new(0.0, 0.0, -d)));
    }

    #[test]
    fn first_mouse_only_latches() {
        let mut cam = Camera::new(1280, 720);
        cam.mark_pose_clean();
        cam.set_mouse_button(MouseButton::Left, true);

        cam.process_mouse(10.0, 700.0);
        assert!(!cam.is_pose_dirty());
        assert!(close(cam.position, Vec3::new(0.0, 0.0, 3.0)));

        cam.process_mouse(10.0, 700.0);
        assert!(!cam.is_pose_dirty());
    }

    #[test]
    fn orbit_keeps_radius_and_target() {
        let mut cam = Camera::new(1280, 720);
        cam.set_mouse_button(MouseButton::Left, true);
        cam.process_mouse(100.0, 100.0);
        cam.mark_pose_clean();

        cam.process_mouse(130.0, 90.0);
        assert!(cam.is_pose_dirty());
        assert!(close(cam.target, Vec3::ZERO));
        assert!((cam.position.length() - 3.0).abs() < 1e-4);
        assert!(!close(cam.position, Vec3::new(0.0, 0.0, 3.0)));
    }

    #[test]
    fn tiny_orbit_does_not_jump() {
        let mut cam = Camera::new(1280, 720);
        cam.set_mouse_button(MouseButton::Left, true);
        cam.process_mouse(100.0, 100.0);
        cam.process_mouse(100.001, 100.0);
        assert!((cam.position - Vec3::new(0.0, 0.0, 3.0)).length() < 1e-3);
    }

    #[test]
    fn pitch_is_clamped() {
        let mut cam = Camera::new(1280, 720);
        cam.set_mouse_button(MouseButton::Left, true);
        cam.process_mouse(0.0, 0.0);
        cam.process_mouse(0.0, -100_000.0);
        assert!(cam.pitch <= MAX_PITCH);
        assert!(cam.position.is_finite());
    }

    #[test]
    fn orbit_to_the_pole_keeps_view_finite() {
        let mut cam = Camera::new(1280, 720);
        cam.set_pose(Vec3::new(7.0, 7.0, 10.0), Vec3::splat(7.0), Vec3::NEG_Y)
            .unwrap();
        cam.set_mouse_button(MouseButton::Left, true);
        cam.process_mouse(0.0, 0.0);

        for y in [-100_000.0, 100_000.0] {
            cam.process_mouse(0.0, y);
            assert!((cam.position - cam.target).length() > 2.9);
            assert!(cam.get_view_matrix().is_finite(), "view at y = {y}");
            assert!(cam.forward().cross(cam.up).length() > 1e-3);
        }
    }

    #[test]
    fn pan_moves_position_and_target_together() {
        let mut cam = Camera::new(1280, 720);
        cam.set_mouse_button(MouseButton::Right, true);
        cam.process_mouse(0.0, 0.0);
        cam.process_mouse(10.0, 0.0);

        let offset = cam.position - cam.target;
        assert!(close(offset, Vec3::new(0.0, 0.0, 3.0)));
        assert!((cam.target.length() - 10.0 * cam.sensitivity.translation).abs() < 1e-5);
    }

    #[test]
    fn view_matrix_puts_target_on_negative_z() {
        let cam = Camera::new(1280, 720);
        let v = cam.get_view_matrix();
        let t = v.transform_point3(Vec3::ZERO);
        assert!(close(t, Vec3::new(0.0, 0.0, -3.0)));
    }

    #[test]
    fn focal_params_match_definition() {
        let cam = Camera::new(1280, 720);
        let f = cam.get_focal_params();
        let htany = (cam.fovy() / 2.0).tan();
        let aspect = 1280.0 / 720.0;
        assert!((f.y - htany).abs() < 1e-6);
        assert!((f.x - htany * aspect).abs() < 1e-5);
        assert!((f.z - 1280.0 / (2.0 * htany * aspect)).abs() < 1e-3);
        // Equivalent height-based form.
        assert!((f.z - 720.0 / (2.0 * htany)).abs() < 1e-3);
    }

    #[test]
    fn resolution_and_fov_mark_intrinsics() {
        let mut cam = Camera::new(0, 0);
        assert_eq!(cam.resolution(), (1, 1));
        cam.mark_intrinsic_clean();

        cam.update_resolution(640, 0);
        assert_eq!(cam.resolution(), (640, 1));
        assert!(cam.is_intrinsic_dirty());

        cam.mark_intrinsic_clean();
        cam.set_fovy(1.0);
        assert!(cam.is_intrinsic_dirty());
    }

    #[test]
    fn roll_and_flip_change_up() {
        let mut cam = Camera::new(800, 600);
        cam.flip_ground();
        assert!(close(cam.up, Vec3::Y));

        cam.process_roll(1.0);
        assert!((cam.up.length() - 1.0).abs() < 1e-5);
        assert!(!close(cam.up, Vec3::Y));
    }

    #[test]
    fn set_pose_rejects_degenerate_input() {
        let mut cam = Camera::new(800, 600);
        assert!(matches!(
            cam.set_pose(Vec3::ONE, Vec3::ONE, Vec3::Y),
            Err(ViewerError::DegenerateInput(_))
        ));
        assert!(matches!(
            cam.set_pose(Vec3::ZERO, Vec3::Y, Vec3::Y),
            Err(ViewerError::DegenerateInput(_))
        ));
        assert!(cam.set_pose(Vec3::new(0.0, 0.0, 5.0), Vec3::ZERO, Vec3::Y).is_ok());
        assert!(close(cam.position, Vec3::new(0.0, 0.0, 5.0)));
    }

    #[test]
    fn target_distance_is_restored() {
        let mut cam = Camera::new(800, 600);
        cam.process_scroll(10.0);
        cam.update_target_distance();
        assert!(((cam.target - cam.position).length() - cam.target_dist).abs() < 1e-5);
    }
}
