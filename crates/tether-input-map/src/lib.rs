use bevy_math::{Quat, Vec2, Vec3};

/// Sticks report small non-zero values at rest; anything under this is no intent.
pub const STICK_DEADZONE: f32 = 0.15;

#[derive(Debug, Clone, Copy, Default)]
pub struct RawInputState {
    pub up: bool,
    pub down: bool,
    pub left: bool,
    pub right: bool,
    /// Analog stick, x right / y up. Wins over the digital keys when outside the deadzone.
    pub stick: Vec2,
}

impl RawInputState {
    /// Screen-space direction, x right / y up, not normalized.
    pub fn screen_axis(&self) -> Vec2 {
        if self.stick.length() > STICK_DEADZONE {
            return self.stick;
        }
        let axis = |positive: bool, negative: bool| f32::from(positive as u8) - f32::from(negative as u8);
        Vec2::new(axis(self.right, self.left), axis(self.up, self.down))
    }
}

/// Converts raw input into a world-space movement vector on the ground plane,
/// relative to a camera looking down -Z after `camera_yaw_rad` around +Y.
pub fn map_raw_input(raw: RawInputState, camera_yaw_rad: f32) -> Vec3 {
    let axis = raw.screen_axis();
    if axis == Vec2::ZERO {
        return Vec3::ZERO;
    }
    let local = Vec3::new(axis.x, 0.0, -axis.y);
    Quat::from_rotation_y(camera_yaw_rad) * local
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::f32::consts::FRAC_PI_2;

    #[test]
    fn no_keys_is_zero_intent() {
        assert_eq!(map_raw_input(RawInputState::default(), 1.0), Vec3::ZERO);
        let cancelled = RawInputState {
            up: true,
            down: true,
            ..Default::default()
        };
        assert_eq!(map_raw_input(cancelled, 0.0), Vec3::ZERO);
    }

    #[test]
    fn up_moves_away_from_camera() {
        let raw = RawInputState {
            up: true,
            ..Default::default()
        };
        assert!(map_raw_input(raw, 0.0).distance(Vec3::NEG_Z) < 1e-6);
        // camera turned a quarter to the left now looks down -X
        assert!(map_raw_input(raw, FRAC_PI_2).distance(Vec3::NEG_X) < 1e-6);
    }

    #[test]
    fn stick_inside_deadzone_falls_back_to_keys() {
        let raw = RawInputState {
            right: true,
            stick: Vec2::new(0.05, 0.05),
            ..Default::default()
        };
        assert_eq!(raw.screen_axis(), Vec2::X);

        let pushed = RawInputState {
            stick: Vec2::new(0.0, -0.8),
            ..raw
        };
        assert_eq!(pushed.screen_axis(), Vec2::new(0.0, -0.8));
    }
}
