//! Owner-side prediction and reconciliation.
//!
//! Flow per tick:
//! 1. Sample input, send it to the authority, simulate it locally, record both
//! 2. When an authoritative state for tick T arrives, compare it with the
//!    prediction recorded for T
//! 3. On mismatch, rebase on the authoritative state and replay every
//!    recorded input after T
//! 4. Drop everything at or before T

use std::collections::VecDeque;

use bevy::prelude::*;
use tether_core::EntityId;
use tether_sim_core::{step, Classification, InputSample, MovementState, SpeedResolver};

use crate::apply::{apply_movement_state, baseline_from_transform};

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct HistoryEntry {
    pub input: InputSample,
    pub state: MovementState,
}

/// Inputs and the states predicted from them, tick-ascending.
///
/// Storing both in one entry keeps them index-aligned by construction.
#[derive(Debug, Clone)]
pub struct ClientHistory {
    entries: VecDeque<HistoryEntry>,
    max_size: usize,
}

impl ClientHistory {
    pub fn new(max_size: usize) -> Self {
        Self {
            entries: VecDeque::with_capacity(max_size.min(256)),
            max_size: max_size.max(1),
        }
    }

    /// Appends a prediction. Out-of-order ticks are refused.
    pub fn push(&mut self, input: InputSample, state: MovementState) -> bool {
        if self.entries.back().is_some_and(|last| last.input.tick >= input.tick) {
            return false;
        }
        self.entries.push_back(HistoryEntry { input, state });
        while self.entries.len() > self.max_size {
            self.entries.pop_front();
        }
        true
    }

    pub fn index_of(&self, tick: u64) -> Option<usize> {
        self.entries
            .binary_search_by_key(&tick, |entry| entry.input.tick)
            .ok()
    }

    pub fn evict_through(&mut self, tick: u64) {
        while self.entries.front().is_some_and(|entry| entry.input.tick <= tick) {
            self.entries.pop_front();
        }
    }

    pub fn last_state(&self) -> Option<&MovementState> {
        self.entries.back().map(|entry| &entry.state)
    }

    pub fn iter(&self) -> impl Iterator<Item = &HistoryEntry> {
        self.entries.iter()
    }

    pub fn get(&self, index: usize) -> Option<&HistoryEntry> {
        self.entries.get(index)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ReconcilePhase {
    #[default]
    Normal,
    Reconciling,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ReconcileOutcome {
    /// Prediction at the tick agreed with the authority.
    Confirmed { tick: u64, position_error: f32 },
    /// Rebased on the authoritative state and replayed the newer inputs.
    Corrected {
        tick: u64,
        position_error: f32,
        replayed: usize,
        final_state: MovementState,
    },
    /// Nothing recorded for the tick; left untouched.
    MissingHistory { tick: u64 },
    /// Not newer than the last reconciled tick.
    Stale { tick: u64, last_reconciled_tick: u64 },
    /// Arrived while another reconciliation was running.
    Busy { tick: u64 },
}

/// Prediction state of the entity this peer controls.
#[derive(Debug, Component)]
pub struct PredictionEngine {
    entity_id: EntityId,
    history: ClientHistory,
    phase: ReconcilePhase,
    last_reconciled_tick: u64,
    threshold_m: f32,
}

impl PredictionEngine {
    pub fn new(entity_id: EntityId, history_capacity: usize, threshold_m: f32) -> Self {
        Self {
            entity_id,
            history: ClientHistory::new(history_capacity),
            phase: ReconcilePhase::Normal,
            last_reconciled_tick: 0,
            threshold_m,
        }
    }

    pub fn history(&self) -> &ClientHistory {
        &self.history
    }

    pub fn phase(&self) -> ReconcilePhase {
        self.phase
    }

    pub fn last_reconciled_tick(&self) -> u64 {
        self.last_reconciled_tick
    }

    /// Simulates `input` on top of the last prediction and applies it at once.
    ///
    /// Returns `None` when prediction is suspended by a running reconciliation.
    pub fn predict(
        &mut self,
        input: InputSample,
        transform: &mut Transform,
        classification: Classification,
        resolver: &impl SpeedResolver,
        dt_s: f32,
    ) -> Option<MovementState> {
        if self.phase == ReconcilePhase::Reconciling {
            return None;
        }

        let prior = self
            .history
            .last_state()
            .copied()
            .unwrap_or_else(|| baseline_from_transform(transform, input.tick.saturating_sub(1)))
            .with_classification(classification);
        let next = step(&input, &prior, resolver, dt_s);

        apply_movement_state(transform, &next);
        if !self.history.push(input, next) {
            debug!(entity = %self.entity_id, tick = input.tick, "prediction tick out of order, not recorded");
        }
        Some(next)
    }

    /// Checks the prediction for `authoritative.tick` and replays on mismatch.
    pub fn reconcile(
        &mut self,
        authoritative: &MovementState,
        transform: &mut Transform,
        resolver: &impl SpeedResolver,
        dt_s: f32,
    ) -> ReconcileOutcome {
        let tick = authoritative.tick;
        if self.phase == ReconcilePhase::Reconciling {
            return ReconcileOutcome::Busy { tick };
        }
        if self.last_reconciled_tick > 0 && tick <= self.last_reconciled_tick {
            return ReconcileOutcome::Stale {
                tick,
                last_reconciled_tick: self.last_reconciled_tick,
            };
        }

        self.phase = ReconcilePhase::Reconciling;
        let outcome = self.reconcile_at(authoritative, transform, resolver, dt_s);
        self.phase = ReconcilePhase::Normal;
        outcome
    }

    fn reconcile_at(
        &mut self,
        authoritative: &MovementState,
        transform: &mut Transform,
        resolver: &impl SpeedResolver,
        dt_s: f32,
    ) -> ReconcileOutcome {
        let tick = authoritative.tick;
        let Some(index) = self.history.index_of(tick) else {
            debug!(
                entity = %self.entity_id,
                tick,
                history_len = self.history.len(),
                "no prediction recorded for authoritative tick"
            );
            return ReconcileOutcome::MissingHistory { tick };
        };

        let predicted = self.history.entries[index].state;
        let position_error = predicted.position_error(authoritative);
        let classification_differs = predicted.classification() != authoritative.classification();
        let replay_safe =
            predicted.classification().is_replay_safe() && authoritative.classification().is_replay_safe();

        let outcome = if position_error > self.threshold_m || classification_differs || !replay_safe {
            let mut base = *authoritative;
            let mut replayed = 0;
            for entry in self.history.entries.iter_mut().skip(index + 1) {
                base = step(&entry.input, &base, resolver, dt_s);
                entry.state = base;
                replayed += 1;
            }
            apply_movement_state(transform, &base);
            debug!(
                entity = %self.entity_id,
                tick,
                position_error,
                classification_differs,
                replay_safe,
                replayed,
                "mispredicted; replayed from authoritative state"
            );
            ReconcileOutcome::Corrected {
                tick,
                position_error,
                replayed,
                final_state: base,
            }
        } else {
            ReconcileOutcome::Confirmed { tick, position_error }
        };

        self.history.evict_through(tick);
        self.last_reconciled_tick = tick;
        outcome
    }

    /// Server-forced correction: snap and forget every in-flight prediction.
    pub fn apply_correction(&mut self, position: Vec3, transform: &mut Transform) {
        transform.translation = position;
        self.history.clear();
        self.phase = ReconcilePhase::Normal;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tether_sim_core::SpeedTable;

    fn sample_state(tick: u64) -> MovementState {
        MovementState::baseline(tick, Vec3::new(tick as f32, 0.0, 0.0), Quat::IDENTITY)
    }

    #[test]
    fn history_caps_and_refuses_out_of_order() {
        let mut history = ClientHistory::new(3);
        for tick in 1..=5 {
            assert!(history.push(InputSample::new(tick, Vec3::X), sample_state(tick)));
        }
        assert_eq!(history.len(), 3);
        assert_eq!(history.iter().next().map(|e| e.input.tick), Some(3));
        assert!(!history.push(InputSample::new(4, Vec3::X), sample_state(4)));
        assert_eq!(history.index_of(5), Some(2));
        assert_eq!(history.index_of(1), None);
    }

    #[test]
    fn evict_through_keeps_newer_entries() {
        let mut history = ClientHistory::new(10);
        for tick in 1..=6 {
            history.push(InputSample::new(tick, Vec3::X), sample_state(tick));
        }
        history.evict_through(4);
        let ticks: Vec<u64> = history.iter().map(|e| e.input.tick).collect();
        assert_eq!(ticks, vec![5, 6]);
    }

    #[test]
    fn stale_authoritative_state_is_ignored() {
        let mut engine = PredictionEngine::new(EntityId::new_v4(), 64, 0.01);
        let mut transform = Transform::default();
        let table = SpeedTable::default();
        for tick in 1..=4 {
            engine.predict(InputSample::new(tick, Vec3::X), &mut transform, Classification::moving(), &table, 0.1);
        }
        let at_three = engine.history().get(2).map(|e| e.state).expect("tick 3");
        assert!(matches!(
            engine.reconcile(&at_three, &mut transform, &table, 0.1),
            ReconcileOutcome::Confirmed { tick: 3, .. }
        ));

        let at_two = MovementState::baseline(2, Vec3::ZERO, Quat::IDENTITY);
        assert_eq!(
            engine.reconcile(&at_two, &mut transform, &table, 0.1),
            ReconcileOutcome::Stale {
                tick: 2,
                last_reconciled_tick: 3
            }
        );
    }

    #[test]
    fn running_reconciliation_blocks_reentry_and_prediction() {
        let mut engine = PredictionEngine::new(EntityId::new_v4(), 64, 0.01);
        let mut transform = Transform::default();
        let table = SpeedTable::default();
        engine.phase = ReconcilePhase::Reconciling;

        let arrival = MovementState::baseline(1, Vec3::ZERO, Quat::IDENTITY);
        assert_eq!(
            engine.reconcile(&arrival, &mut transform, &table, 0.1),
            ReconcileOutcome::Busy { tick: 1 }
        );
        assert!(engine
            .predict(InputSample::new(1, Vec3::X), &mut transform, Classification::moving(), &table, 0.1)
            .is_none());
        assert!(engine.history().is_empty());
    }

    #[test]
    fn correction_clears_history() {
        let mut engine = PredictionEngine::new(EntityId::new_v4(), 64, 0.01);
        let mut transform = Transform::default();
        engine.predict(
            InputSample::new(1, Vec3::X),
            &mut transform,
            Classification::moving(),
            &SpeedTable::default(),
            0.1,
        );
        engine.apply_correction(Vec3::new(-3.0, 0.0, 0.0), &mut transform);
        assert!(engine.history().is_empty());
        assert_eq!(transform.translation, Vec3::new(-3.0, 0.0, 0.0));
    }
}
