use bevy::prelude::*;
use tether_core::EntityId;
use tether_net::{AuthorityStateMessage, ClientInputMessage, CorrectionReason};
use tether_sim_core::{AnimState, Classification, InputSample, SpeedTable, TickPhase, TickRoles};

use crate::authority::{InputDisposition, ServerInputPipeline};
use crate::prediction::PredictionEngine;
use crate::scripted_move::ScriptedMove;
use crate::speed_history::SpeedHistory;
use crate::validation::{ForcedCorrection, SpeedSample, SpeedSnapshotValidator, SpeedVerdict};

#[derive(Debug, Clone, Copy)]
pub struct TickContext {
    pub tick: u64,
    /// Simulation time at the end of this tick.
    pub now_s: f64,
    pub dt_s: f32,
    pub enforce_speed_validation: bool,
}

/// Authority-only state of a mover.
pub struct AuthorityParts<'a> {
    pub pipeline: &'a mut ServerInputPipeline,
    pub speed_history: &'a mut SpeedHistory,
    pub speed_validator: &'a mut SpeedSnapshotValidator,
    pub scripted: Option<&'a mut ScriptedMove>,
}

/// Borrowed view of one moving entity for a single tick.
pub struct MoverTick<'a> {
    pub id: EntityId,
    pub transform: &'a mut Transform,
    pub classification: &'a mut Classification,
    pub velocity: &'a mut Vec3,
    pub speed: &'a SpeedTable,
    /// Present when this peer supplies the entity's input.
    pub intent: Option<Vec3>,
    pub authority: Option<AuthorityParts<'a>>,
    pub prediction: Option<&'a mut PredictionEngine>,
}

impl MoverTick<'_> {
    pub fn roles(&self) -> TickRoles {
        TickRoles {
            authority: self.authority.is_some(),
            controlling: self.intent.is_some(),
        }
    }
}

#[derive(Debug, Default)]
pub struct TickReport {
    pub sent_input: Option<ClientInputMessage>,
    pub broadcast: Option<AuthorityStateMessage>,
    pub correction: Option<ForcedCorrection>,
    pub scripted_finished: Option<AnimState>,
    pub inputs_processed: usize,
    pub stale_inputs: usize,
    pub predicted: bool,
    pub speed_verdict: Option<SpeedVerdict>,
}

/// Runs one tick for one entity: server input, then prediction, then broadcast,
/// each only when this peer holds the matching role.
pub fn run_mover_tick(ctx: &TickContext, mut mover: MoverTick<'_>) -> TickReport {
    let roles = mover.roles();
    let mut report = TickReport::default();
    for phase in roles.phases() {
        match phase {
            TickPhase::ServerInput => server_input(ctx, &mut mover, &mut report),
            TickPhase::ClientPrediction => client_input(ctx, &mut mover, roles, &mut report),
            TickPhase::ServerBroadcast => {
                if let Some(authority) = mover.authority.as_ref() {
                    report.broadcast = authority.pipeline.latest_state().map(|state| AuthorityStateMessage {
                        entity_id: mover.id,
                        state: *state,
                    });
                }
            }
        }
    }
    report
}

fn server_input(ctx: &TickContext, mover: &mut MoverTick<'_>, report: &mut TickReport) {
    let Some(authority) = mover.authority.as_mut() else {
        return;
    };

    authority
        .speed_history
        .record(ctx.now_s, mover.speed.permitted_speed(*mover.classification));
    let sample_at = |history: &SpeedHistory, position: Vec3| SpeedSample {
        time: ctx.now_s,
        speed: history.speed_at(ctx.now_s),
        position,
    };

    let edge_sample = sample_at(&*authority.speed_history, mover.transform.translation);
    if let Some(verdict) = authority
        .speed_validator
        .update(mover.classification.is_free_movement(), edge_sample)
    {
        if let SpeedVerdict::Failed(details) = &verdict {
            error!(entity = %mover.id, tick = ctx.tick, report = ?details, "speed validation failed");
            let start = authority.speed_validator.window_start();
            match start {
                Some(position) if ctx.enforce_speed_validation => {
                    let correction = ForcedCorrection::new(position, CorrectionReason::SpeedBound);
                    correction.apply(mover.transform, mover.classification);
                    authority.pipeline.rebase(mover.transform, *mover.classification);
                    report.correction = Some(correction);
                }
                _ => warn!(entity = %mover.id, "speed correction suppressed; enforcement disabled"),
            }
        }
        report.speed_verdict = Some(verdict);
    }

    let produced =
        authority
            .pipeline
            .process_pending(mover.transform, *mover.classification, mover.speed, ctx.dt_s);
    for state in &produced {
        authority
            .speed_validator
            .record_step(sample_at(&*authority.speed_history, state.position));
    }
    if let Some(last) = produced.last() {
        *mover.velocity = last.velocity;
    }
    report.inputs_processed = produced.len();

    if let Some(scripted) = authority.scripted.as_deref_mut()
        && !scripted.is_finished()
    {
        let step = scripted.advance(ctx.dt_s);
        if let Some(position) = step.position {
            mover.transform.translation = position;
        }
        if step.finished {
            *mover.classification = Classification::idle();
            report.scripted_finished = Some(scripted.anim());
        }
        authority.pipeline.rebase(mover.transform, *mover.classification);
    }
}

fn client_input(ctx: &TickContext, mover: &mut MoverTick<'_>, roles: TickRoles, report: &mut TickReport) {
    let Some(direction) = mover.intent else {
        return;
    };
    let input = InputSample::new(ctx.tick, direction);

    if let Some(authority) = mover.authority.as_mut() {
        // host: the authoritative path consumes the input next tick
        if let InputDisposition::Stale { .. } = authority.pipeline.submit(input) {
            report.stale_inputs += 1;
        }
        return;
    }

    report.sent_input = Some(ClientInputMessage {
        entity_id: mover.id,
        input,
    });
    if !roles.predicts() {
        return;
    }
    if let Some(engine) = mover.prediction.as_deref_mut()
        && let Some(state) = engine.predict(input, mover.transform, *mover.classification, mover.speed, ctx.dt_s)
    {
        *mover.velocity = state.velocity;
        report.predicted = true;
    }
}
