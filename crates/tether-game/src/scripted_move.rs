use std::sync::Arc;

use bevy::prelude::*;
use tether_sim_core::AnimState;

use crate::curve::DisplacementCurve;

const MIN_SECTION: f32 = 0.0001;

/// Dash tuning shared by every mover.
#[derive(Debug, Clone, Copy, PartialEq, Resource)]
pub struct DashSettings {
    pub speed_mps: f32,
    pub range_m: f32,
    /// Fraction of the animation before the body starts moving.
    pub start_offset: f32,
    /// Fraction of the animation after the body stops moving.
    pub end_offset: f32,
}

impl Default for DashSettings {
    fn default() -> Self {
        Self {
            speed_mps: 15.0,
            range_m: 5.0,
            start_offset: 0.1,
            end_offset: 0.2,
        }
    }
}

impl DashSettings {
    /// Full animation length, padded around the moving section by the offsets.
    pub fn animation_duration_s(&self) -> f32 {
        let move_duration = self.range_m / self.speed_mps.max(MIN_SECTION);
        let section = (1.0 - self.start_offset.clamp(0.0, 1.0) - self.end_offset.clamp(0.0, 1.0)).max(MIN_SECTION);
        move_duration / section
    }
}

#[derive(Debug, Clone)]
enum ScriptedPath {
    Linear {
        direction: Vec3,
        distance: f32,
        move_start_s: f32,
        move_end_s: f32,
    },
    Curve {
        curve: Arc<dyn DisplacementCurve>,
        rotation: Quat,
        join_offset: Vec3,
    },
}

/// Where a scripted move put the entity this tick.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ScriptedStep {
    pub position: Option<Vec3>,
    pub finished: bool,
}

/// Movement driven by an action rather than input, advanced once per tick.
#[derive(Debug, Clone, Component)]
pub struct ScriptedMove {
    anim: AnimState,
    origin: Vec3,
    path: ScriptedPath,
    elapsed_s: f32,
    duration_s: f32,
}

impl ScriptedMove {
    /// Straight dash along `direction`. `late_join_s` skips time already spent
    /// when the move is started from a resync.
    pub fn dash(origin: Vec3, direction: Vec3, settings: &DashSettings, late_join_s: f32) -> Self {
        let duration_s = settings.animation_duration_s();
        let start_offset = settings.start_offset.clamp(0.0, 1.0);
        let end_offset = settings.end_offset.clamp(0.0, 1.0);
        Self {
            anim: AnimState::Dash,
            origin,
            path: ScriptedPath::Linear {
                direction: direction.normalize_or_zero(),
                distance: settings.range_m,
                move_start_s: duration_s * start_offset,
                move_end_s: duration_s * (1.0 - end_offset),
            },
            elapsed_s: late_join_s.max(0.0),
            duration_s,
        }
    }

    /// Follows `curve` from `start_s`, relative to the curve's value there and
    /// rotated into world space by `rotation`.
    pub fn along_curve(
        anim: AnimState,
        origin: Vec3,
        rotation: Quat,
        curve: Arc<dyn DisplacementCurve>,
        start_s: f32,
    ) -> Self {
        let duration_s = curve.duration();
        let elapsed_s = start_s.clamp(0.0, duration_s.max(0.0));
        let join_offset = curve.offset_at(elapsed_s);
        Self {
            anim,
            origin,
            path: ScriptedPath::Curve {
                curve,
                rotation,
                join_offset,
            },
            elapsed_s,
            duration_s,
        }
    }

    pub fn anim(&self) -> AnimState {
        self.anim
    }

    pub fn duration_s(&self) -> f32 {
        self.duration_s
    }

    pub fn elapsed_s(&self) -> f32 {
        self.elapsed_s
    }

    pub fn is_finished(&self) -> bool {
        self.elapsed_s >= self.duration_s
    }

    /// Progress through the clip, for animators joining mid-move.
    pub fn normalized_time(&self) -> f32 {
        if self.duration_s > 0.0 {
            (self.elapsed_s / self.duration_s).clamp(0.0, 1.0)
        } else {
            1.0
        }
    }

    pub fn advance(&mut self, dt_s: f32) -> ScriptedStep {
        self.elapsed_s = (self.elapsed_s + dt_s).min(self.duration_s.max(0.0));
        let position = match &self.path {
            ScriptedPath::Linear {
                direction,
                distance,
                move_start_s,
                move_end_s,
            } => (self.elapsed_s >= *move_start_s).then(|| {
                let section = (move_end_s - move_start_s).max(MIN_SECTION);
                let progress = ((self.elapsed_s - move_start_s) / section).clamp(0.0, 1.0);
                self.origin + *direction * (distance * progress)
            }),
            ScriptedPath::Curve {
                curve,
                rotation,
                join_offset,
            } => Some(self.origin + *rotation * (curve.offset_at(self.elapsed_s) - *join_offset)),
        };
        ScriptedStep {
            position,
            finished: self.is_finished(),
        }
    }
}
