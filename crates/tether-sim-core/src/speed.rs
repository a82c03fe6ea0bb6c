use bevy_math::Vec3;
use serde::{Deserialize, Serialize};

use crate::classification::{ActionState, AnimState, Classification};

/// Resolves the scalar speed permitted for one tick.
///
/// Implementations must be pure: prediction and authority call this with the
/// same arguments and must get the same answer.
pub trait SpeedResolver {
    fn resolve(&self, classification: Classification, movement: Vec3) -> f32;
}

impl<F> SpeedResolver for F
where
    F: Fn(Classification, Vec3) -> f32,
{
    fn resolve(&self, classification: Classification, movement: Vec3) -> f32 {
        self(classification, movement)
    }
}

/// Speed per locomotion family, scaled by a status multiplier (slows, hastes).
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SpeedTable {
    pub run_mps: f32,
    /// Speed while a skill allows moving (maintained/charging skills).
    pub skill_move_mps: f32,
    pub multiplier: f32,
}

impl Default for SpeedTable {
    fn default() -> Self {
        Self {
            run_mps: 5.0,
            skill_move_mps: 0.0,
            multiplier: 1.0,
        }
    }
}

impl SpeedTable {
    pub fn with_run_speed(run_mps: f32) -> Self {
        Self {
            run_mps,
            ..Self::default()
        }
    }

    pub fn base_speed(&self, classification: Classification) -> f32 {
        let locomotion_anim = matches!(
            classification.anim,
            AnimState::Idle | AnimState::IdleLowerBody | AnimState::Run
        );
        match classification.action {
            ActionState::Idle | ActionState::Move if locomotion_anim => self.run_mps,
            ActionState::FixedMove => self.run_mps,
            ActionState::SkillMaintain | ActionState::SkillReady => self.skill_move_mps,
            _ => 0.0,
        }
    }

    /// Speed the classification allows regardless of intent.
    pub fn permitted_speed(&self, classification: Classification) -> f32 {
        (self.base_speed(classification) * self.multiplier).max(0.0)
    }
}

impl SpeedResolver for SpeedTable {
    fn resolve(&self, classification: Classification, movement: Vec3) -> f32 {
        if movement == Vec3::ZERO {
            return 0.0;
        }
        self.permitted_speed(classification)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn locked_actions_resolve_to_zero() {
        let table = SpeedTable::default();
        let dir = Vec3::X;
        assert_eq!(table.resolve(Classification::fixed_idle(), dir), 0.0);
        assert_eq!(
            table.resolve(Classification::new(ActionState::Stun, AnimState::Stun), dir),
            0.0
        );
        assert_eq!(table.resolve(Classification::moving(), dir), 5.0);
    }

    #[test]
    fn multiplier_scales_and_never_goes_negative() {
        let slowed = SpeedTable {
            multiplier: 0.6,
            ..SpeedTable::default()
        };
        assert!((slowed.resolve(Classification::moving(), Vec3::Z) - 3.0).abs() < 1e-6);

        let broken = SpeedTable {
            multiplier: -2.0,
            ..SpeedTable::default()
        };
        assert_eq!(broken.resolve(Classification::moving(), Vec3::Z), 0.0);
    }

    #[test]
    fn closures_are_resolvers() {
        let fixed = |_: Classification, _: Vec3| 2.5_f32;
        assert_eq!(fixed.resolve(Classification::idle(), Vec3::X), 2.5);
    }
}
