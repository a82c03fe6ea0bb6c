use std::collections::HashMap;

use bevy::prelude::*;
use tether_core::{EntityId, MovementConfig};
use tether_input_map::{map_raw_input, RawInputState};
use tether_net::{AuthorityStateMessage, ClientInputMessage, CorrectionReason, ForcedCorrectionMessage};
use tether_sim_core::{AnimState, Classification, FixedTickScheduler, MovementState, SpeedTable};

use crate::actions::{transition, ActionContext, ActionEffect, ActionRequest};
use crate::apply::apply_movement_state;
use crate::authority::{InputDisposition, ServerInputPipeline};
use crate::curve::{CurveLibrary, MoverSetupError};
use crate::prediction::{PredictionEngine, ReconcileOutcome};
use crate::scripted_move::{DashSettings, ScriptedMove};
use crate::speed_history::SpeedHistory;
use crate::tick::{run_mover_tick, AuthorityParts, MoverTick, TickContext};
use crate::validation::{CurveMoveValidator, CurveVerdict, ForcedCorrection, ScriptedAnimEntry, SpeedSnapshotValidator};

// ===== Components =====

#[derive(Debug, Clone, Copy, PartialEq, Eq, Component)]
pub struct NetEntity(pub EntityId);

/// Action/animation pair the action system maintains for this entity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Component)]
pub struct LiveClassification(pub Classification);

#[derive(Debug, Clone, Copy, PartialEq, Default, Component)]
pub struct MoverSpeed(pub SpeedTable);

/// Last simulated velocity; drives locomotion animation on every peer.
#[derive(Debug, Clone, Copy, PartialEq, Default, Component, Reflect)]
#[reflect(Component)]
pub struct ReplicatedVelocity(pub Vec3);

/// World-space movement intent of an entity this peer controls.
#[derive(Debug, Clone, Copy, PartialEq, Default, Component, Reflect)]
#[reflect(Component)]
pub struct MovementIntent(pub Vec3);

// ===== Resources =====

#[derive(Debug, Clone, Resource)]
pub struct MovementSettings(pub MovementConfig);

#[derive(Debug, Clone, Resource)]
pub struct TickClock(pub FixedTickScheduler);

/// Local device state; when present it feeds every controlled entity's intent.
#[derive(Debug, Clone, Copy, Default, Resource)]
pub struct LocalInput {
    pub raw: RawInputState,
    pub camera_yaw_rad: f32,
}

#[derive(Debug, Clone, Copy, Default, Resource, Reflect)]
#[reflect(Resource)]
pub struct MovementStats {
    pub ticks: u64,
    pub inputs_processed: u64,
    pub stale_inputs: u64,
    pub predictions: u64,
    pub reconciliations_confirmed: u64,
    pub reconciliations_corrected: u64,
    pub replayed_inputs: u64,
    pub missing_history: u64,
    pub stale_states: u64,
    pub validator_failures: u64,
    pub corrections_issued: u64,
    pub corrections_received: u64,
    pub last_position_error: f32,
}

// ===== Messages =====

/// Input that arrived from a remote owner.
#[derive(Message, Debug, Clone)]
pub struct InboundInput(pub ClientInputMessage);

#[derive(Message, Debug, Clone)]
pub struct OutboundInput(pub ClientInputMessage);

#[derive(Message, Debug, Clone)]
pub struct InboundAuthorityState(pub AuthorityStateMessage);

#[derive(Message, Debug, Clone)]
pub struct OutboundAuthorityState(pub AuthorityStateMessage);

#[derive(Message, Debug, Clone)]
pub struct InboundCorrection(pub ForcedCorrectionMessage);

#[derive(Message, Debug, Clone)]
pub struct OutboundCorrection(pub ForcedCorrectionMessage);

#[derive(Message, Debug, Clone)]
pub struct ActionRequested {
    pub entity: Entity,
    pub request: ActionRequest,
}

/// Effects of an accepted action that belong to other gameplay systems
/// (combo, skills, auto-recovery).
#[derive(Message, Debug, Clone)]
pub struct ActionEffectApplied {
    pub entity: Entity,
    pub effect: ActionEffect,
}

#[derive(Message, Debug, Clone)]
pub struct AnimationEntered {
    pub entity: Entity,
    pub entry: ScriptedAnimEntry,
}

/// A clip stopped playing. Carries the tick time and position at which it
/// ended, which can be earlier than the end of the frame.
#[derive(Message, Debug, Clone)]
pub struct AnimationExited {
    pub entity: Entity,
    pub anim: AnimState,
    pub at_s: f64,
    pub position: Vec3,
}

// ===== Entity construction =====

/// Server-owned mover. Fails when a declared scripted animation has no curve.
pub fn authority_mover(
    id: EntityId,
    config: &MovementConfig,
    speed: SpeedTable,
    curves: &CurveLibrary,
    scripted_anims: &[AnimState],
) -> Result<impl Bundle, MoverSetupError> {
    curves.require(scripted_anims)?;
    Ok((
        NetEntity(id),
        LiveClassification::default(),
        MoverSpeed(speed),
        ReplicatedVelocity::default(),
        ActionContext::default(),
        ServerInputPipeline::new(id, config.server_buffer_ticks, config.drain_order),
        SpeedHistory::default(),
        SpeedSnapshotValidator::default(),
        CurveMoveValidator::default(),
    ))
}

/// The local player's replica on a pure client.
pub fn predicted_mover(id: EntityId, config: &MovementConfig, speed: SpeedTable) -> impl Bundle {
    (
        NetEntity(id),
        LiveClassification::default(),
        MoverSpeed(speed),
        ReplicatedVelocity::default(),
        ActionContext::default(),
        MovementIntent::default(),
        PredictionEngine::new(id, config.client_history_ticks, config.misprediction_threshold_m),
    )
}

/// Someone else's entity; snaps to every authoritative state.
pub fn remote_mover(id: EntityId) -> impl Bundle {
    (NetEntity(id), LiveClassification::default(), ReplicatedVelocity::default())
}

// ===== Plugin =====

pub struct TetherMovementPlugin {
    pub config: MovementConfig,
}

impl Plugin for TetherMovementPlugin {
    fn build(&self, app: &mut App) {
        app.insert_resource(MovementSettings(self.config.clone()))
            .insert_resource(TickClock(FixedTickScheduler::with_duration(
                self.config.tick_duration_s(),
            )))
            .init_resource::<CurveLibrary>()
            .init_resource::<DashSettings>()
            .init_resource::<MovementStats>()
            .register_type::<ReplicatedVelocity>()
            .register_type::<MovementIntent>()
            .register_type::<MovementStats>()
            .add_message::<InboundInput>()
            .add_message::<OutboundInput>()
            .add_message::<InboundAuthorityState>()
            .add_message::<OutboundAuthorityState>()
            .add_message::<InboundCorrection>()
            .add_message::<OutboundCorrection>()
            .add_message::<ActionRequested>()
            .add_message::<ActionEffectApplied>()
            .add_message::<AnimationEntered>()
            .add_message::<AnimationExited>();

        app.add_systems(
            Update,
            (
                sample_local_input,
                route_inbound_inputs,
                apply_action_requests,
                open_curve_windows,
                run_movement_ticks,
                close_curve_windows,
                receive_authority_states,
                receive_corrections,
            )
                .chain(),
        );
    }
}

// ===== Systems =====

fn sample_local_input(local: Option<Res<LocalInput>>, mut intents: Query<&mut MovementIntent>) {
    let Some(local) = local else {
        return;
    };
    let direction = map_raw_input(local.raw, local.camera_yaw_rad);
    for mut intent in &mut intents {
        intent.0 = direction;
    }
}

fn route_inbound_inputs(
    mut inbound: MessageReader<InboundInput>,
    mut pipelines: Query<&mut ServerInputPipeline>,
    mut stats: ResMut<MovementStats>,
) {
    if inbound.is_empty() {
        return;
    }
    let mut by_id: HashMap<EntityId, Mut<ServerInputPipeline>> = pipelines
        .iter_mut()
        .map(|pipeline| (pipeline.entity_id(), pipeline))
        .collect();
    for InboundInput(message) in inbound.read() {
        let Some(pipeline) = by_id.get_mut(&message.entity_id) else {
            debug!(entity = %message.entity_id, "input for unknown entity");
            continue;
        };
        if let InputDisposition::Stale { .. } = pipeline.submit(message.input) {
            stats.stale_inputs += 1;
        }
    }
}

fn apply_action_requests(
    mut requests: MessageReader<ActionRequested>,
    clock: Res<TickClock>,
    dash: Res<DashSettings>,
    mut movers: Query<(&mut Transform, &mut LiveClassification, Option<&ActionContext>)>,
    mut commands: Commands,
    mut applied: MessageWriter<ActionEffectApplied>,
    mut entered: MessageWriter<AnimationEntered>,
    mut exited: MessageWriter<AnimationExited>,
) {
    for ActionRequested { entity, request } in requests.read() {
        let Ok((mut transform, mut live, context)) = movers.get_mut(*entity) else {
            continue;
        };
        let outcome = match transition(live.0, request, context.copied().unwrap_or_default()) {
            Ok(outcome) => outcome,
            Err(err) => {
                debug!(?entity, %err, "action request rejected");
                continue;
            }
        };

        let previous = live.0;
        live.0 = outcome.classification;
        // a dash requested mid-dash restarts the clip without changing it
        let restarts_clip = outcome
            .effects
            .iter()
            .any(|effect| matches!(effect, ActionEffect::BeginDash { .. }));
        for effect in outcome.effects {
            match effect {
                ActionEffect::Face(rotation) => transform.rotation = rotation,
                ActionEffect::BeginDash { direction } => {
                    let direction = if direction.length_squared() > f32::EPSILON {
                        direction
                    } else {
                        transform.rotation * Vec3::NEG_Z
                    };
                    commands
                        .entity(*entity)
                        .insert(ScriptedMove::dash(transform.translation, direction, &dash, 0.0));
                }
                ActionEffect::CancelScriptedMove => {
                    commands.entity(*entity).remove::<ScriptedMove>();
                }
                other => {
                    applied.write(ActionEffectApplied {
                        entity: *entity,
                        effect: other,
                    });
                }
            }
        }
        if previous.anim != live.0.anim {
            exited.write(AnimationExited {
                entity: *entity,
                anim: previous.anim,
                at_s: clock.0.elapsed_s(),
                position: transform.translation,
            });
        }
        if previous.anim != live.0.anim || restarts_clip {
            entered.write(AnimationEntered {
                entity: *entity,
                entry: ScriptedAnimEntry::from_start(live.0.anim),
            });
        }
    }
}

/// Opens a validation window for every entered clip with a curve. On the
/// authority, a clip that nothing else is moving is driven along its curve.
fn open_curve_windows(
    mut entered: MessageReader<AnimationEntered>,
    clock: Res<TickClock>,
    library: Res<CurveLibrary>,
    mut validators: Query<(
        &Transform,
        &mut CurveMoveValidator,
        Option<&ScriptedMove>,
        Has<ServerInputPipeline>,
    )>,
    mut commands: Commands,
) {
    let now = clock.0.elapsed_s();
    for AnimationEntered { entity, entry } in entered.read() {
        let Ok((transform, mut validator, scripted, authoritative)) = validators.get_mut(*entity) else {
            continue;
        };
        let Some(curve) = library.get(entry.anim) else {
            continue;
        };
        let tracked = validator.on_enter(
            *entry,
            Some(curve.clone()),
            now,
            transform.translation,
            transform.rotation,
        );
        let already_driven = scripted.is_some_and(|scripted| scripted.anim() == entry.anim && !scripted.is_finished());
        if !tracked || !authoritative || already_driven {
            continue;
        }
        let start_s = entry.normalized_time.rem_euclid(1.0) * curve.duration();
        debug!(?entity, anim = ?entry.anim, start_s, "starting curve-driven move");
        commands.entity(*entity).insert(ScriptedMove::along_curve(
            entry.anim,
            transform.translation,
            transform.rotation,
            curve,
            start_s,
        ));
    }
}

#[allow(clippy::type_complexity)]
fn run_movement_ticks(
    time: Res<Time>,
    settings: Res<MovementSettings>,
    mut clock: ResMut<TickClock>,
    mut stats: ResMut<MovementStats>,
    mut movers: Query<(
        Entity,
        &NetEntity,
        &mut Transform,
        &mut LiveClassification,
        &mut ReplicatedVelocity,
        &MoverSpeed,
        Option<&MovementIntent>,
        Option<&mut PredictionEngine>,
        Option<(&mut ServerInputPipeline, &mut SpeedHistory, &mut SpeedSnapshotValidator)>,
        Option<&mut ScriptedMove>,
    )>,
    mut commands: Commands,
    mut sent_inputs: MessageWriter<OutboundInput>,
    mut broadcasts: MessageWriter<OutboundAuthorityState>,
    mut corrections: MessageWriter<OutboundCorrection>,
    mut exited: MessageWriter<AnimationExited>,
) {
    let ticks = clock.0.advance(time.delta_secs_f64());
    let tick_duration_s = clock.0.tick_duration_s();
    for tick in ticks {
        let ctx = TickContext {
            tick,
            now_s: tick as f64 * tick_duration_s,
            dt_s: tick_duration_s as f32,
            enforce_speed_validation: settings.0.enforce_speed_validation,
        };
        stats.ticks += 1;

        for (entity, net, mut transform, mut live, mut velocity, speed, intent, mut prediction, mut authority, mut scripted) in
            &mut movers
        {
            let report = run_mover_tick(
                &ctx,
                MoverTick {
                    id: net.0,
                    transform: &mut transform,
                    classification: &mut live.0,
                    velocity: &mut velocity.0,
                    speed: &speed.0,
                    intent: intent.map(|intent| intent.0),
                    authority: authority.as_mut().map(|(pipeline, history, validator)| AuthorityParts {
                        pipeline: &mut **pipeline,
                        speed_history: &mut **history,
                        speed_validator: &mut **validator,
                        scripted: scripted.as_deref_mut(),
                    }),
                    prediction: prediction.as_deref_mut(),
                },
            );

            stats.inputs_processed += report.inputs_processed as u64;
            stats.stale_inputs += report.stale_inputs as u64;
            stats.predictions += u64::from(report.predicted);
            if let Some(verdict) = &report.speed_verdict
                && verdict.is_failure()
            {
                stats.validator_failures += 1;
            }
            if let Some(message) = report.sent_input {
                sent_inputs.write(OutboundInput(message));
            }
            if let Some(correction) = report.correction {
                stats.corrections_issued += 1;
                commands.entity(entity).remove::<ScriptedMove>();
                corrections.write(OutboundCorrection(correction.to_message(net.0)));
            }
            if let Some(anim) = report.scripted_finished {
                commands.entity(entity).remove::<ScriptedMove>();
                exited.write(AnimationExited {
                    entity,
                    anim,
                    at_s: ctx.now_s,
                    position: transform.translation,
                });
            }
            if let Some(message) = report.broadcast {
                broadcasts.write(OutboundAuthorityState(message));
            }
        }
    }
}

#[allow(clippy::type_complexity)]
fn close_curve_windows(
    mut exited: MessageReader<AnimationExited>,
    settings: Res<MovementSettings>,
    mut stats: ResMut<MovementStats>,
    mut validators: Query<(
        &NetEntity,
        &mut Transform,
        &mut LiveClassification,
        &mut CurveMoveValidator,
        Option<&mut ServerInputPipeline>,
    )>,
    mut commands: Commands,
    mut corrections: MessageWriter<OutboundCorrection>,
) {
    for AnimationExited {
        entity,
        anim,
        at_s,
        position,
    } in exited.read()
    {
        let Ok((net, mut transform, mut live, mut validator, pipeline)) = validators.get_mut(*entity) else {
            continue;
        };
        let verdict = validator.on_exit(*anim, *at_s, *position);
        let CurveVerdict::Failed(report) = verdict else {
            continue;
        };
        stats.validator_failures += 1;
        error!(entity = %net.0, ?report, "curve displacement validation failed");
        if !settings.0.enforce_curve_validation {
            warn!(entity = %net.0, "curve correction suppressed; enforcement disabled");
            continue;
        }

        let correction = ForcedCorrection::new(report.expected_end, CorrectionReason::CurveDisplacement);
        correction.apply(&mut transform, &mut live.0);
        if let Some(mut pipeline) = pipeline {
            pipeline.rebase(&transform, live.0);
        }
        commands.entity(*entity).remove::<ScriptedMove>();
        stats.corrections_issued += 1;
        corrections.write(OutboundCorrection(correction.to_message(net.0)));
    }
}

#[allow(clippy::type_complexity)]
fn receive_authority_states(
    mut inbound: MessageReader<InboundAuthorityState>,
    clock: Res<TickClock>,
    mut stats: ResMut<MovementStats>,
    mut movers: Query<
        (
            &NetEntity,
            &mut Transform,
            &mut ReplicatedVelocity,
            Option<&MoverSpeed>,
            Option<&mut PredictionEngine>,
        ),
        Without<ServerInputPipeline>,
    >,
) {
    let mut newest: HashMap<EntityId, MovementState> = HashMap::new();
    for InboundAuthorityState(message) in inbound.read() {
        let slot = newest.entry(message.entity_id).or_insert(message.state);
        if message.state.tick > slot.tick {
            *slot = message.state;
        }
    }
    if newest.is_empty() {
        return;
    }

    let dt_s = clock.0.tick_duration_s() as f32;
    for (net, mut transform, mut velocity, speed, prediction) in &mut movers {
        let Some(state) = newest.remove(&net.0) else {
            continue;
        };
        let Some(mut engine) = prediction else {
            apply_movement_state(&mut transform, &state);
            velocity.0 = state.velocity;
            continue;
        };

        let speed = speed.map(|speed| speed.0).unwrap_or_default();
        match engine.reconcile(&state, &mut transform, &speed, dt_s) {
            ReconcileOutcome::Confirmed { position_error, .. } => {
                stats.reconciliations_confirmed += 1;
                stats.last_position_error = position_error;
            }
            ReconcileOutcome::Corrected {
                position_error,
                replayed,
                final_state,
                ..
            } => {
                stats.reconciliations_corrected += 1;
                stats.replayed_inputs += replayed as u64;
                stats.last_position_error = position_error;
                velocity.0 = final_state.velocity;
            }
            ReconcileOutcome::MissingHistory { .. } => stats.missing_history += 1,
            ReconcileOutcome::Stale { .. } | ReconcileOutcome::Busy { .. } => stats.stale_states += 1,
        }
    }
}

fn receive_corrections(
    mut inbound: MessageReader<InboundCorrection>,
    mut stats: ResMut<MovementStats>,
    mut movers: Query<
        (
            &NetEntity,
            &mut Transform,
            &mut LiveClassification,
            Option<&mut PredictionEngine>,
        ),
        Without<ServerInputPipeline>,
    >,
) {
    for InboundCorrection(message) in inbound.read() {
        for (net, mut transform, mut live, prediction) in &mut movers {
            if net.0 != message.entity_id {
                continue;
            }
            let correction = ForcedCorrection::new(message.position, message.reason);
            if let Some(mut engine) = prediction {
                engine.apply_correction(message.position, &mut transform);
            }
            correction.apply(&mut transform, &mut live.0);
            stats.corrections_received += 1;
        }
    }
}
