use bevy_math::{Quat, Vec3};
use serde::{Deserialize, Serialize};

use crate::classification::{ActionState, AnimState, Classification};

/// One tick of movement intent from the owning client.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct InputSample {
    pub tick: u64,
    /// World-space direction, not necessarily normalized. Zero means no intent.
    pub movement: Vec3,
}

impl InputSample {
    pub fn new(tick: u64, movement: Vec3) -> Self {
        Self { tick, movement }
    }

    pub fn has_intent(&self) -> bool {
        self.movement != Vec3::ZERO
    }
}

/// Simulation snapshot produced for one tick.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct MovementState {
    pub tick: u64,
    pub position: Vec3,
    pub rotation: Quat,
    pub velocity: Vec3,
    pub action: ActionState,
    pub anim: AnimState,
}

impl Default for MovementState {
    fn default() -> Self {
        Self {
            tick: 0,
            position: Vec3::ZERO,
            rotation: Quat::IDENTITY,
            velocity: Vec3::ZERO,
            action: ActionState::Idle,
            anim: AnimState::Idle,
        }
    }
}

impl MovementState {
    /// Baseline synthesized from a live transform when no history exists yet.
    pub fn baseline(tick: u64, position: Vec3, rotation: Quat) -> Self {
        Self {
            tick,
            position,
            rotation,
            ..Self::default()
        }
    }

    pub fn classification(&self) -> Classification {
        Classification::new(self.action, self.anim)
    }

    pub fn with_classification(mut self, classification: Classification) -> Self {
        self.action = classification.action;
        self.anim = classification.anim;
        self
    }

    pub fn position_error(&self, other: &MovementState) -> f32 {
        self.position.distance(other.position)
    }
}
