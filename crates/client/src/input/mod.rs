// Keyboard input handling
use glam::Vec2;
use sim::DogInput;

/// Held movement keys plus edge detection for one-shot actions.
#[derive(Debug, Clone, Copy, Default)]
pub struct InputState {
    pub forward_pressed: bool,
    pub back_pressed: bool,
    pub left_pressed: bool,
    pub right_pressed: bool,
    pub sprint_pressed: bool,
    pub restart_pressed: bool,
    // Previous frame state for edge detection
    pub prev_restart_pressed: bool,
}

impl InputState {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a key transition. Returns `false` for keys we don't map.
    pub fn set_key(&mut self, key: &str, pressed: bool) -> bool {
        match key {
            "w" | "W" | "ArrowUp" => self.forward_pressed = pressed,
            "s" | "S" | "ArrowDown" => self.back_pressed = pressed,
            "a" | "A" | "ArrowLeft" => self.left_pressed = pressed,
            "d" | "D" | "ArrowRight" => self.right_pressed = pressed,
            "Shift" => self.sprint_pressed = pressed,
            "r" | "R" => self.restart_pressed = pressed,
            _ => return false,
        }
        true
    }

    /// Update previous frame state - call this once per frame
    pub fn update_previous_state(&mut self) {
        self.prev_restart_pressed = self.restart_pressed;
    }

    pub fn restart_just_pressed(&self) -> bool {
        self.restart_pressed && !self.prev_restart_pressed
    }

    /// Unit movement direction on the ground plane, or zero. Forward is
    /// toward the gate (+Z).
    pub fn direction(&self) -> Vec2 {
        let axis = |pos: bool, neg: bool| (pos as i8 - neg as i8) as f32;
        let raw = Vec2::new(
            axis(self.right_pressed, self.left_pressed),
            axis(self.forward_pressed, self.back_pressed),
        );
        raw.normalize_or_zero()
    }

    /// The intent fed to prediction and sent to the server.
    pub fn intent(&self) -> DogInput {
        DogInput {
            direction: self.direction(),
            sprint: self.sprint_pressed,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_diagonal_is_unit_length() {
        let mut input = InputState::new();
        input.set_key("w", true);
        input.set_key("d", true);
        let dir = input.direction();
        assert!((dir.length() - 1.0).abs() < 1e-6);
        assert!(dir.x > 0.0 && dir.y > 0.0);
    }

    #[test]
    fn test_opposite_keys_cancel() {
        let mut input = InputState::new();
        input.set_key("a", true);
        input.set_key("d", true);
        assert_eq!(input.direction(), Vec2::ZERO);
        assert!(!input.intent().is_moving());
    }

    #[test]
    fn test_restart_edge() {
        let mut input = InputState::new();
        assert!(!input.set_key("q", true));
        input.set_key("R", true);
        assert!(input.restart_just_pressed());
        input.update_previous_state();
        assert!(!input.restart_just_pressed());
    }
}
