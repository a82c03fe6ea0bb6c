use serde::{Deserialize, Serialize};

/// Semantic action an entity is performing. Owned by the action system; the
/// movement core only reads it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum ActionState {
    #[default]
    Idle,
    /// Idle imposed by the server (anti-cheat correction, cutscene); ignores movement intent.
    FixedIdle,
    Move,
    FixedMove,
    Dash,
    Jump,
    Attack,
    SkillReady,
    Skill,
    SkillMaintain,
    SkillCancel,
    SkillMoveStop,
    Stun,
    Stiffen,
    Knockdown,
    AirBorne,
    Die,
}

impl ActionState {
    /// Actions that strip control from the player until the server releases them.
    pub fn is_hard_control(self) -> bool {
        matches!(
            self,
            Self::Stun | Self::Stiffen | Self::Knockdown | Self::AirBorne
        )
    }

    pub fn is_idle_or_move(self) -> bool {
        matches!(self, Self::Idle | Self::Move)
    }
}

/// Animation state the animator has confirmed as playing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum AnimState {
    #[default]
    Idle,
    IdleLowerBody,
    Run,
    Dash,
    Jump,
    Attack,
    Skill,
    Stun,
    Stiffen,
    Knockdown,
    AirBorne,
    Die,
}

impl AnimState {
    /// Whether the animator is showing the clip family of `action`.
    pub fn plays(self, action: ActionState) -> bool {
        match action {
            ActionState::Idle | ActionState::FixedIdle => {
                matches!(self, Self::Idle | Self::IdleLowerBody)
            }
            ActionState::Move | ActionState::FixedMove => self == Self::Run,
            ActionState::Dash => self == Self::Dash,
            ActionState::Jump => self == Self::Jump,
            ActionState::Attack => self == Self::Attack,
            ActionState::SkillReady
            | ActionState::Skill
            | ActionState::SkillMaintain
            | ActionState::SkillCancel
            | ActionState::SkillMoveStop => self == Self::Skill,
            ActionState::Stun => self == Self::Stun,
            ActionState::Stiffen => self == Self::Stiffen,
            ActionState::Knockdown => self == Self::Knockdown,
            ActionState::AirBorne => self == Self::AirBorne,
            ActionState::Die => self == Self::Die,
        }
    }

    /// Default clip for an action when nothing more specific is known.
    pub fn for_action(action: ActionState) -> Self {
        match action {
            ActionState::Idle | ActionState::FixedIdle | ActionState::SkillMoveStop => Self::Idle,
            ActionState::Move | ActionState::FixedMove => Self::Run,
            ActionState::Dash => Self::Dash,
            ActionState::Jump => Self::Jump,
            ActionState::Attack => Self::Attack,
            ActionState::SkillReady
            | ActionState::Skill
            | ActionState::SkillMaintain
            | ActionState::SkillCancel => Self::Skill,
            ActionState::Stun => Self::Stun,
            ActionState::Stiffen => Self::Stiffen,
            ActionState::Knockdown => Self::Knockdown,
            ActionState::AirBorne => Self::AirBorne,
            ActionState::Die => Self::Die,
        }
    }
}

/// The (action, animation) pair read from the live entity every tick.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct Classification {
    pub action: ActionState,
    pub anim: AnimState,
}

impl Classification {
    pub const fn new(action: ActionState, anim: AnimState) -> Self {
        Self { action, anim }
    }

    pub fn idle() -> Self {
        Self::new(ActionState::Idle, AnimState::Idle)
    }

    pub fn moving() -> Self {
        Self::new(ActionState::Move, AnimState::Run)
    }

    pub fn fixed_idle() -> Self {
        Self::new(ActionState::FixedIdle, AnimState::Idle)
    }

    /// Classifications that replay is allowed to run through.
    pub fn is_replay_safe(self) -> bool {
        let anim_ok = matches!(
            self.anim,
            AnimState::Idle | AnimState::IdleLowerBody | AnimState::Run
        );
        let action_ok = matches!(
            self.action,
            ActionState::Idle | ActionState::FixedIdle | ActionState::Move
        );
        anim_ok && action_ok
    }

    /// Unconstrained locomotion: idle/move action while the animator shows idle or run.
    pub fn is_free_movement(self) -> bool {
        self.action.is_idle_or_move()
            && (self.anim.plays(ActionState::Idle) || self.anim.plays(ActionState::Move))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn replay_safe_set_matches_locomotion_only() {
        assert!(Classification::idle().is_replay_safe());
        assert!(Classification::fixed_idle().is_replay_safe());
        assert!(Classification::new(ActionState::Move, AnimState::IdleLowerBody).is_replay_safe());
        assert!(!Classification::new(ActionState::Dash, AnimState::Run).is_replay_safe());
        assert!(!Classification::new(ActionState::Move, AnimState::Dash).is_replay_safe());
        assert!(!Classification::new(ActionState::FixedMove, AnimState::Run).is_replay_safe());
    }

    #[test]
    fn fixed_idle_is_not_free_movement() {
        assert!(Classification::idle().is_free_movement());
        assert!(Classification::moving().is_free_movement());
        assert!(!Classification::fixed_idle().is_free_movement());
        assert!(!Classification::new(ActionState::Move, AnimState::Skill).is_free_movement());
    }
}
