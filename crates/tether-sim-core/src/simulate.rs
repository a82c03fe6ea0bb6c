use bevy_math::{Quat, Vec3};

use crate::speed::SpeedResolver;
use crate::state::{InputSample, MovementState};

/// Yaw-only orientation whose forward axis (-Z) points along `direction`.
///
/// Returns `None` when the direction has no horizontal component.
pub fn yaw_look_rotation(direction: Vec3) -> Option<Quat> {
    let flat = Vec3::new(direction.x, 0.0, direction.z);
    if flat.length_squared() <= f32::EPSILON {
        return None;
    }
    let yaw = (-flat.x).atan2(-flat.z);
    Some(Quat::from_rotation_y(yaw))
}

/// Advances `prior` by one tick of `input` at the given speed.
///
/// Shared verbatim by the server pipeline and client prediction. Classification
/// is carried through untouched; transitions belong to the action system.
pub fn simulate(input: &InputSample, prior: &MovementState, speed: f32, dt_s: f32) -> MovementState {
    if speed <= 0.0 || input.movement == Vec3::ZERO {
        return MovementState {
            tick: input.tick,
            velocity: Vec3::ZERO,
            ..*prior
        };
    }

    let direction = input.movement.normalize();
    let velocity = direction * speed;
    let position = prior.position + velocity * dt_s;
    let rotation = yaw_look_rotation(direction).unwrap_or(prior.rotation);

    MovementState {
        tick: input.tick,
        position,
        rotation,
        velocity,
        action: prior.action,
        anim: prior.anim,
    }
}

/// [`simulate`] with the speed looked up from the prior state's classification.
pub fn step(
    input: &InputSample,
    prior: &MovementState,
    resolver: &impl SpeedResolver,
    dt_s: f32,
) -> MovementState {
    let speed = resolver.resolve(prior.classification(), input.movement);
    simulate(input, prior, speed, dt_s)
}
