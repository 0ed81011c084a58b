//! Maps winit window events onto [`World`] input operations.

use crate::{camera::MouseButton, error::ViewerError, renderer::SplatRenderer, world::World};
use winit::{
    event::{ElementState, MouseButton as WinitButton, MouseScrollDelta, WindowEvent},
    keyboard::{KeyCode, PhysicalKey},
};

/// World-space distance one arrow/page key press moves the model.
pub const MODEL_STEP: f32 = 0.1;

/// Roll applied per second while Q or E is held.
const ROLL_RATE: f32 = 10.0;

/// Keys that act every frame while held.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
struct Held {
    forward: bool,
    back: bool,
    left: bool,
    right: bool,
    roll_left: bool,
    roll_right: bool,
}

#[derive(Debug, Default)]
pub struct InputController {
    held: Held,
}

impl InputController {
    pub fn new() -> Self {
        Self::default()
    }

    /// Forwards one window event. Returns whether the event was used.
    pub fn handle_event<R: SplatRenderer>(
        &mut self,
        event: &WindowEvent,
        world: &mut World<R>,
    ) -> Result<bool, ViewerError> {
        match event {
            WindowEvent::KeyboardInput { event, .. } => {
                let PhysicalKey::Code(code) = event.physical_key else {
                    return Ok(false);
                };
                self.key(code, event.state == ElementState::Pressed, event.repeat, world)
            }
            WindowEvent::MouseInput { button, state, .. } => {
                let button = match button {
                    WinitButton::Left => MouseButton::Left,
                    WinitButton::Right => MouseButton::Right,
                    _ => return Ok(false),
                };
                world.set_mouse_button(button, *state == ElementState::Pressed);
                Ok(true)
            }
            WindowEvent::CursorMoved { position, .. } => {
                world.process_mouse(position.x, position.y);
                Ok(true)
            }
            WindowEvent::MouseWheel { delta, .. } => {
                let scroll = match delta {
                    MouseScrollDelta::LineDelta(_, y) => *y,
                    MouseScrollDelta::PixelDelta(pos) => pos.y as f32 / 120.0,
                };
                world.process_scroll(scroll);
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    /// Held keys update movement state; arrow and page keys nudge the model
    /// once per press (repeats included).
    pub fn key<R: SplatRenderer>(
        &mut self,
        code: KeyCode,
        pressed: bool,
        repeat: bool,
        world: &mut World<R>,
    ) -> Result<bool, ViewerError> {
        let held = &mut self.held;
        let flag = match code {
            KeyCode::KeyW => Some(&mut held.forward),
            KeyCode::KeyS => Some(&mut held.back),
            KeyCode::KeyA => Some(&mut held.left),
            KeyCode::KeyD => Some(&mut held.right),
            KeyCode::KeyQ => Some(&mut held.roll_left),
            KeyCode::KeyE => Some(&mut held.roll_right),
            _ => None,
        };
        if let Some(flag) = flag {
            *flag = pressed;
            return Ok(true);
        }

        if !pressed {
            return Ok(false);
        }

        let camera = world.camera();
        let delta = match code {
            KeyCode::ArrowLeft => -camera.right(),
            KeyCode::ArrowRight => camera.right(),
            KeyCode::ArrowUp => camera.up,
            KeyCode::ArrowDown => -camera.up,
            KeyCode::PageUp => camera.forward(),
            KeyCode::PageDown => -camera.forward(),
            KeyCode::KeyF if !repeat => {
                world.flip_ground();
                return Ok(true);
            }
            _ => return Ok(false),
        };

        world.translate_model(delta * MODEL_STEP)?;
        Ok(true)
    }

    /// Applies held keys for a frame lasting `dt` seconds.
    pub fn update<R: SplatRenderer>(&self, world: &mut World<R>, dt: f32) {
        let axis = |pos: bool, neg: bool| (pos as i8 - neg as i8) as f32;
        let h = self.held;

        let dx = axis(h.right, h.left);
        let dy = axis(h.forward, h.back);
        if dx != 0.0 || dy != 0.0 {
            world.process_translation(dx * dt, dy * dt);
        }

        let roll = axis(h.roll_right, h.roll_left);
        if roll != 0.0 {
            world.process_roll(roll * ROLL_RATE * dt);
        }
    }

    /// Drops held keys, e.g. when the window loses focus.
    pub fn release_all(&mut self) {
        self.held = Held::default();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::world::tests::world;
    use glam::{Mat4, Vec3};

    #[test]
    fn held_w_moves_forward_each_frame() {
        let mut w = world();
        let mut input = InputController::new();
        let start = w.camera().position;

        assert!(input.key(KeyCode::KeyW, true, false, &mut w).unwrap());
        input.update(&mut w, 1.0 / 60.0);
        input.update(&mut w, 1.0 / 60.0);
        let step = w.camera().sensitivity.translation;
        assert!((w.camera().position - (start + Vec3::new(0.0, 0.0, -2.0 * step))).length() < 1e-5);

        input.key(KeyCode::KeyW, false, false, &mut w).unwrap();
        let stopped = w.camera().position;
        input.update(&mut w, 1.0 / 60.0);
        assert_eq!(w.camera().position, stopped);
    }

    #[test]
    fn opposite_keys_cancel() {
        let mut w = world();
        let mut input = InputController::new();
        let start = w.camera().position;
        input.key(KeyCode::KeyA, true, false, &mut w).unwrap();
        input.key(KeyCode::KeyD, true, false, &mut w).unwrap();
        input.update(&mut w, 0.1);
        assert_eq!(w.camera().position, start);
    }

    #[test]
    fn roll_tilts_up_vector() {
        let mut w = world();
        let mut input = InputController::new();
        let up = w.camera().up;
        input.key(KeyCode::KeyE, true, false, &mut w).unwrap();
        input.update(&mut w, 0.1);
        assert_ne!(w.camera().up, up);
        assert!((w.camera().up.length() - 1.0).abs() < 1e-5);

        input.release_all();
        let rolled = w.camera().up;
        input.update(&mut w, 0.1);
        assert_eq!(w.camera().up, rolled);
    }

    #[test]
    fn arrows_translate_the_model() {
        let mut w = world();
        let mut input = InputController::new();
        let right = w.camera().right();

        assert!(input.key(KeyCode::ArrowRight, true, false, &mut w).unwrap());
        assert!(input.key(KeyCode::ArrowRight, true, true, &mut w).unwrap());
        assert!(!input.key(KeyCode::ArrowRight, false, false, &mut w).unwrap());
        assert_eq!(w.model_matrix(), Mat4::from_translation(right * 2.0 * MODEL_STEP));
    }

    #[test]
    fn flip_ground_ignores_repeats() {
        let mut w = world();
        let mut input = InputController::new();
        let up = w.camera().up;
        input.key(KeyCode::KeyF, true, false, &mut w).unwrap();
        assert!(!input.key(KeyCode::KeyF, true, true, &mut w).unwrap());
        assert_eq!(w.camera().up, -up);
    }

    #[test]
    fn unmapped_keys_are_not_consumed() {
        let mut w = world();
        let mut input = InputController::new();
        assert!(!input.key(KeyCode::KeyZ, true, false, &mut w).unwrap());
    }
}
