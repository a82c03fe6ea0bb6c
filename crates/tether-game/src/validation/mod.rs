//! Server-side move validation. Both validators only observe authoritative
//! positions; remediation goes through [`ForcedCorrection`].

pub mod curve;
pub mod speed;

pub use curve::{CurveMoveValidator, CurveReport, CurveSkip, CurveVerdict, ScriptedAnimEntry};
pub use speed::{SpeedReport, SpeedSample, SpeedSkip, SpeedSnapshotValidator, SpeedVerdict};

use bevy::prelude::*;
use tether_core::EntityId;
use tether_net::{CorrectionReason, ForcedCorrectionMessage};
use tether_sim_core::Classification;

/// Force fixed-idle and snap to a position. Applying it twice is a no-op.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ForcedCorrection {
    pub position: Vec3,
    pub reason: CorrectionReason,
}

impl ForcedCorrection {
    pub fn new(position: Vec3, reason: CorrectionReason) -> Self {
        Self { position, reason }
    }

    /// Returns whether anything changed.
    pub fn apply(&self, transform: &mut Transform, classification: &mut Classification) -> bool {
        let changed = transform.translation != self.position || *classification != Classification::fixed_idle();
        transform.translation = self.position;
        *classification = Classification::fixed_idle();
        changed
    }

    pub fn to_message(&self, entity_id: EntityId) -> ForcedCorrectionMessage {
        ForcedCorrectionMessage::fixed_idle_at(entity_id, self.position, self.reason)
    }
}
