//! Server-authoritative movement with client-side prediction, as bevy systems.
//!
//! The plain types ([`ServerInputPipeline`], [`PredictionEngine`], the
//! validators) hold all the logic and can be driven directly; the
//! [`TetherMovementPlugin`] wires them to a fixed tick clock and to
//! transport-agnostic inbound/outbound messages.

pub mod actions;
pub mod apply;
pub mod authority;
pub mod curve;
pub mod plugin;
pub mod prediction;
pub mod ring_buffer;
pub mod scripted_move;
pub mod speed_history;
pub mod tick;
pub mod validation;

pub use actions::{transition, ActionContext, ActionEffect, ActionOrigin, ActionRequest, ActionTransition, TransitionError};
pub use apply::apply_movement_state;
pub use authority::{InputDisposition, ServerInputPipeline};
pub use curve::{keyframe_curve, linear_curve, CurveLibrary, DisplacementCurve, MoverSetupError};
pub use plugin::*;
pub use prediction::{ClientHistory, HistoryEntry, PredictionEngine, ReconcileOutcome, ReconcilePhase};
pub use ring_buffer::StateRingBuffer;
pub use scripted_move::{DashSettings, ScriptedMove, ScriptedStep};
pub use speed_history::SpeedHistory;
pub use tick::{run_mover_tick, AuthorityParts, MoverTick, TickContext, TickReport};
pub use validation::{
    CurveMoveValidator, CurveVerdict, ForcedCorrection, ScriptedAnimEntry, SpeedSnapshotValidator, SpeedVerdict,
};
