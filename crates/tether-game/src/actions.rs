//! Action transition table.
//!
//! Transitions are pure: they return the next classification plus a list of
//! side effects for the caller to carry out.

use bevy::prelude::*;
use tether_sim_core::{yaw_look_rotation, ActionState, AnimState, Classification};
use thiserror::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ActionOrigin {
    /// Requested by the owning player; subject to control locks.
    Client,
    /// Issued by server logic (combat, revives, corrections).
    Server,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ActionRequest {
    pub action: ActionState,
    pub origin: ActionOrigin,
    pub direction: Vec3,
    pub rotation_lock: bool,
}

impl ActionRequest {
    pub fn client(action: ActionState) -> Self {
        Self {
            action,
            origin: ActionOrigin::Client,
            direction: Vec3::ZERO,
            rotation_lock: false,
        }
    }

    pub fn server(action: ActionState) -> Self {
        Self {
            origin: ActionOrigin::Server,
            ..Self::client(action)
        }
    }

    pub fn toward(mut self, direction: Vec3) -> Self {
        self.direction = direction;
        self
    }

    pub fn with_rotation_lock(mut self) -> Self {
        self.rotation_lock = true;
        self
    }
}

/// Entity-side flags the table reads besides the current classification.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Component)]
pub struct ActionContext {
    /// A skill that allows moving is charged or maintained.
    pub skill_move_active: bool,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ActionEffect {
    RefreshAutoRecovery,
    ResetCombo,
    ClearSkillOption,
    CancelSkill,
    Face(Quat),
    BeginDash { direction: Vec3 },
    CancelScriptedMove,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ActionTransition {
    pub classification: Classification,
    pub effects: Vec<ActionEffect>,
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum TransitionError {
    #[error("{requested:?} rejected: dead entities only accept server-issued actions")]
    Dead { requested: ActionState },
    #[error("{requested:?} rejected while under {current:?}")]
    HardControlled {
        current: ActionState,
        requested: ActionState,
    },
}

fn interrupts_combo(action: ActionState) -> bool {
    matches!(
        action,
        ActionState::Dash
            | ActionState::Stun
            | ActionState::Knockdown
            | ActionState::Die
            | ActionState::Jump
            | ActionState::Stiffen
            | ActionState::AirBorne
    )
}

fn needs_player_control(action: ActionState) -> bool {
    matches!(
        action,
        ActionState::Move | ActionState::Dash | ActionState::Attack | ActionState::Skill
    )
}

pub fn transition(
    current: Classification,
    request: &ActionRequest,
    context: ActionContext,
) -> Result<ActionTransition, TransitionError> {
    let from_client = request.origin == ActionOrigin::Client;
    if current.action == ActionState::Die && from_client {
        return Err(TransitionError::Dead {
            requested: request.action,
        });
    }
    if current.action.is_hard_control() && from_client && needs_player_control(request.action) {
        return Err(TransitionError::HardControlled {
            current: current.action,
            requested: request.action,
        });
    }

    let next = match request.action {
        ActionState::Idle | ActionState::FixedIdle if context.skill_move_active => ActionState::SkillMoveStop,
        other => other,
    };

    let mut effects = Vec::new();
    if !next.is_idle_or_move() {
        effects.push(ActionEffect::RefreshAutoRecovery);
    }
    if current.action == ActionState::Dash && next != ActionState::Dash {
        effects.push(ActionEffect::CancelScriptedMove);
    }
    if interrupts_combo(next) {
        effects.push(ActionEffect::ResetCombo);
        effects.push(ActionEffect::ClearSkillOption);
    }
    if next == ActionState::Die {
        effects.push(ActionEffect::CancelSkill);
    }
    if !request.rotation_lock
        && let Some(facing) = yaw_look_rotation(request.direction)
    {
        effects.push(ActionEffect::Face(facing));
    }
    if next == ActionState::Dash {
        effects.push(ActionEffect::BeginDash {
            direction: request.direction,
        });
    }

    Ok(ActionTransition {
        classification: Classification::new(next, AnimState::for_action(next)),
        effects,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn current(action: ActionState) -> Classification {
        Classification::new(action, AnimState::for_action(action))
    }

    #[test]
    fn dead_entities_only_accept_server_requests() {
        let dead = current(ActionState::Die);
        assert_eq!(
            transition(dead, &ActionRequest::client(ActionState::Idle), ActionContext::default()),
            Err(TransitionError::Dead {
                requested: ActionState::Idle
            })
        );
        let revived = transition(dead, &ActionRequest::server(ActionState::Idle), ActionContext::default())
            .expect("server revive");
        assert_eq!(revived.classification, Classification::idle());
    }

    #[test]
    fn hard_control_blocks_client_movement_but_not_server() {
        let stunned = current(ActionState::Stun);
        for action in [ActionState::Move, ActionState::Dash, ActionState::Attack, ActionState::Skill] {
            assert!(matches!(
                transition(stunned, &ActionRequest::client(action), ActionContext::default()),
                Err(TransitionError::HardControlled { .. })
            ));
        }
        assert!(transition(stunned, &ActionRequest::client(ActionState::Idle), ActionContext::default()).is_ok());
        assert!(transition(stunned, &ActionRequest::server(ActionState::Knockdown), ActionContext::default()).is_ok());
    }

    #[test]
    fn idle_during_skill_move_becomes_skill_move_stop() {
        let context = ActionContext {
            skill_move_active: true,
        };
        let result = transition(
            current(ActionState::SkillMaintain),
            &ActionRequest::client(ActionState::Idle),
            context,
        )
        .expect("allowed");
        assert_eq!(result.classification.action, ActionState::SkillMoveStop);
        assert!(result.effects.contains(&ActionEffect::RefreshAutoRecovery));
    }

    #[test]
    fn dash_resets_combo_faces_and_starts_scripted_move() {
        let result = transition(
            Classification::moving(),
            &ActionRequest::client(ActionState::Dash).toward(Vec3::X),
            ActionContext::default(),
        )
        .expect("allowed");
        assert_eq!(result.classification, current(ActionState::Dash));
        assert!(result.effects.contains(&ActionEffect::ResetCombo));
        assert!(result.effects.contains(&ActionEffect::ClearSkillOption));
        assert!(result.effects.contains(&ActionEffect::BeginDash { direction: Vec3::X }));
        assert!(result.effects.iter().any(|e| matches!(e, ActionEffect::Face(_))));
        assert!(!result.effects.contains(&ActionEffect::CancelSkill));
    }

    #[test]
    fn rotation_lock_keeps_facing_and_die_cancels_skill() {
        let result = transition(
            current(ActionState::Skill),
            &ActionRequest::server(ActionState::Die).toward(Vec3::Z).with_rotation_lock(),
            ActionContext::default(),
        )
        .expect("allowed");
        assert!(!result.effects.iter().any(|e| matches!(e, ActionEffect::Face(_))));
        assert!(result.effects.contains(&ActionEffect::CancelSkill));
    }

    #[test]
    fn plain_move_has_no_effects() {
        let result = transition(
            Classification::idle(),
            &ActionRequest::client(ActionState::Move).with_rotation_lock(),
            ActionContext::default(),
        )
        .expect("allowed");
        assert_eq!(result.classification, Classification::moving());
        assert!(result.effects.is_empty());
    }
}
