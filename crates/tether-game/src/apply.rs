use bevy::prelude::*;
use tether_sim_core::MovementState;

/// Position changes below this are not pushed to the live transform.
pub const APPLY_POSITION_EPSILON_M: f32 = 0.01;
pub const APPLY_ROTATION_EPSILON_DEG: f32 = 0.1;

/// Pushes a simulation result onto a live transform. Sub-epsilon differences
/// are ignored so re-applying the same state is a no-op.
///
/// Returns whether the transform changed.
pub fn apply_movement_state(transform: &mut Transform, state: &MovementState) -> bool {
    let mut changed = false;
    if transform.translation.distance(state.position) > APPLY_POSITION_EPSILON_M {
        transform.translation = state.position;
        changed = true;
    }
    if transform.rotation.angle_between(state.rotation).to_degrees() > APPLY_ROTATION_EPSILON_DEG {
        transform.rotation = state.rotation;
        changed = true;
    }
    changed
}

/// Starting point for a pipeline that has no recorded state yet.
pub fn baseline_from_transform(transform: &Transform, tick: u64) -> MovementState {
    MovementState::baseline(tick, transform.translation, transform.rotation)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tiny_deltas_are_ignored() {
        let mut transform = Transform::from_xyz(1.0, 0.0, 0.0);
        let state = MovementState::baseline(1, Vec3::new(1.005, 0.0, 0.0), Quat::IDENTITY);
        assert!(!apply_movement_state(&mut transform, &state));
        assert_eq!(transform.translation, Vec3::new(1.0, 0.0, 0.0));
    }

    #[test]
    fn reapplying_is_a_no_op() {
        let mut transform = Transform::default();
        let state = MovementState::baseline(1, Vec3::new(0.0, 0.0, -3.0), Quat::from_rotation_y(1.2));
        assert!(apply_movement_state(&mut transform, &state));
        let after_first = transform;
        assert!(!apply_movement_state(&mut transform, &state));
        assert_eq!(transform, after_first);
    }
}
