use std::collections::HashMap;
use std::sync::Arc;

use bevy::prelude::*;
use tether_sim_core::AnimState;

use crate::curve::DisplacementCurve;

pub const MIN_CURVE_DURATION_S: f64 = 0.1;
pub const MIN_CURVE_DISTANCE_M: f32 = 0.1;

// Joins far from the clip start, or very short clips, usually mean a resync
// fast-forwarded the animation.
const FAST_PLAYBACK_START_NT: f32 = 0.01;
const FAST_PLAYBACK_DURATION_S: f64 = 0.5;
const FAST_PLAYBACK_MIN_DISTANCE_M: f32 = 1.0;

const BASE_TOLERANCE_M: f32 = 2.5;
const LATE_JOIN_START_NT: f32 = 0.001;
const LATE_JOIN_TOLERANCE_RATIO: f32 = 0.15;
const SHORT_CLIP_DURATION_S: f64 = 1.0;
const SHORT_CLIP_TOLERANCE_RATIO: f32 = 0.1;
const PROPORTIONAL_TOLERANCE_RATIO: f32 = 0.05;
pub const MIN_TOLERANCE_M: f32 = 2.0;
pub const MAX_TOLERANCE_M: f32 = 5.0;
/// The time-accurate check is stricter than the end-position check.
pub const CURRENT_POSITION_TOLERANCE_SCALE: f32 = 0.8;

/// Animator report for a scripted clip that just started playing.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ScriptedAnimEntry {
    pub anim: AnimState,
    /// Playback position at entry; above zero when joining mid-clip.
    pub normalized_time: f32,
    pub looping: bool,
}

impl ScriptedAnimEntry {
    pub fn from_start(anim: AnimState) -> Self {
        Self {
            anim,
            normalized_time: 0.0,
            looping: false,
        }
    }
}

#[derive(Debug, Clone)]
struct CurveWindow {
    start_time: f64,
    start_position: Vec3,
    start_rotation: Quat,
    curve: Arc<dyn DisplacementCurve>,
    start_normalized_time: f32,
    curve_start_offset: Vec3,
    looping: bool,
}

impl CurveWindow {
    fn world(&self, offset: Vec3) -> Vec3 {
        self.start_position + self.start_rotation * (offset - self.curve_start_offset)
    }

    fn expected_end_position(&self) -> Vec3 {
        self.world(self.curve.offset_at(self.curve.duration()))
    }

    fn expected_position_at(&self, now: f64) -> Vec3 {
        let length = self.curve.duration();
        let elapsed = (now - self.start_time) as f32;
        let normalized = self.start_normalized_time + elapsed / length;
        let offset = if self.looping {
            // completed loops keep whatever net displacement one cycle has
            let cycles = normalized.floor();
            let per_cycle = self.curve.offset_at(length) - self.curve.offset_at(0.0);
            per_cycle * cycles + self.curve.offset_at((normalized - cycles) * length)
        } else {
            self.curve.offset_at(normalized.clamp(0.0, 1.0) * length)
        };
        self.world(offset)
    }
}

/// Tolerance for one finished clip, in `[MIN_TOLERANCE_M, MAX_TOLERANCE_M]`.
pub fn dynamic_tolerance(total_move_distance: f32, start_normalized_time: f32, duration_s: f64) -> f32 {
    let late_join = if start_normalized_time > LATE_JOIN_START_NT {
        total_move_distance * LATE_JOIN_TOLERANCE_RATIO
    } else {
        0.0
    };
    let short_clip = if duration_s < SHORT_CLIP_DURATION_S {
        total_move_distance * SHORT_CLIP_TOLERANCE_RATIO
    } else {
        0.0
    };
    (BASE_TOLERANCE_M + late_join + short_clip + total_move_distance * PROPORTIONAL_TOLERANCE_RATIO)
        .clamp(MIN_TOLERANCE_M, MAX_TOLERANCE_M)
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CurveReport {
    pub anim: AnimState,
    pub duration_s: f64,
    pub start_position: Vec3,
    pub current_position: Vec3,
    pub expected_end: Vec3,
    pub expected_now: Vec3,
    pub end_distance: f32,
    pub current_distance: f32,
    pub total_move_distance: f32,
    pub tolerance: f32,
    pub start_normalized_time: f32,
    pub curve_start_offset: Vec3,
    pub fast_playback: bool,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum CurveSkip {
    TooShort { duration_s: f64 },
    FastPlaybackShortMove { distance: f32, start_normalized_time: f32, duration_s: f64 },
    MoveTooSmall { distance: f32 },
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum CurveVerdict {
    /// No window was open for the animation (no curve, or never entered).
    NotTracked,
    Skipped(CurveSkip),
    Passed(CurveReport),
    Failed(CurveReport),
}

impl CurveVerdict {
    /// Where a failed entity gets snapped to.
    pub fn correction_target(&self) -> Option<Vec3> {
        match self {
            Self::Failed(report) => Some(report.expected_end),
            _ => None,
        }
    }
}

/// Compares scripted-animation displacement against its curve, one open
/// window per animation state.
#[derive(Debug, Clone, Default, Component)]
pub struct CurveMoveValidator {
    windows: HashMap<AnimState, CurveWindow>,
}

impl CurveMoveValidator {
    /// Opens a window for `entry.anim`. Without a usable curve the animation is
    /// not validated and `false` is returned.
    pub fn on_enter(
        &mut self,
        entry: ScriptedAnimEntry,
        curve: Option<Arc<dyn DisplacementCurve>>,
        now: f64,
        position: Vec3,
        rotation: Quat,
    ) -> bool {
        let Some(curve) = curve else {
            return false;
        };
        let length = curve.duration();
        if !length.is_finite() || length <= 0.0 {
            return false;
        }
        let start_normalized_time = entry.normalized_time.rem_euclid(1.0);
        let curve_start_offset = curve.offset_at(start_normalized_time * length);
        self.windows.insert(
            entry.anim,
            CurveWindow {
                start_time: now,
                start_position: position,
                start_rotation: rotation,
                curve,
                start_normalized_time,
                curve_start_offset,
                looping: entry.looping,
            },
        );
        true
    }

    pub fn is_tracking(&self, anim: AnimState) -> bool {
        self.windows.contains_key(&anim)
    }

    /// Closes the window for `anim` and scores where the entity ended up.
    pub fn on_exit(&mut self, anim: AnimState, now: f64, position: Vec3) -> CurveVerdict {
        let Some(window) = self.windows.remove(&anim) else {
            return CurveVerdict::NotTracked;
        };

        let duration_s = now - window.start_time;
        let total_move_distance = window.start_position.distance(position);
        if duration_s < MIN_CURVE_DURATION_S {
            return CurveVerdict::Skipped(CurveSkip::TooShort { duration_s });
        }
        let fast_playback =
            window.start_normalized_time > FAST_PLAYBACK_START_NT || duration_s < FAST_PLAYBACK_DURATION_S;
        if fast_playback && total_move_distance < FAST_PLAYBACK_MIN_DISTANCE_M {
            return CurveVerdict::Skipped(CurveSkip::FastPlaybackShortMove {
                distance: total_move_distance,
                start_normalized_time: window.start_normalized_time,
                duration_s,
            });
        }
        if total_move_distance < MIN_CURVE_DISTANCE_M {
            return CurveVerdict::Skipped(CurveSkip::MoveTooSmall {
                distance: total_move_distance,
            });
        }

        let tolerance = dynamic_tolerance(total_move_distance, window.start_normalized_time, duration_s);
        let expected_end = window.expected_end_position();
        let expected_now = window.expected_position_at(now);
        let end_distance = position.distance(expected_end);
        let current_distance = position.distance(expected_now);

        let report = CurveReport {
            anim,
            duration_s,
            start_position: window.start_position,
            current_position: position,
            expected_end,
            expected_now,
            end_distance,
            current_distance,
            total_move_distance,
            tolerance,
            start_normalized_time: window.start_normalized_time,
            curve_start_offset: window.curve_start_offset,
            fast_playback,
        };
        if end_distance <= tolerance || current_distance <= tolerance * CURRENT_POSITION_TOLERANCE_SCALE {
            CurveVerdict::Passed(report)
        } else {
            CurveVerdict::Failed(report)
        }
    }
}
