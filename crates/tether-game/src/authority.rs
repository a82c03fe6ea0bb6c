use std::collections::VecDeque;

use bevy::prelude::*;
use tether_core::{DrainOrder, EntityId};
use tether_sim_core::{step, Classification, InputSample, MovementState, SpeedResolver};

use crate::apply::{apply_movement_state, baseline_from_transform};
use crate::ring_buffer::StateRingBuffer;

/// What the pipeline did with a submitted input.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InputDisposition {
    Queued,
    /// At or behind the last processed tick; dropped.
    Stale { last_processed_tick: u64 },
}

/// Server-side input queue and authoritative history for one entity.
///
/// This is the only code path that moves an authoritative entity.
#[derive(Debug, Component)]
pub struct ServerInputPipeline {
    entity_id: EntityId,
    queue: VecDeque<InputSample>,
    states: StateRingBuffer,
    last_processed_tick: u64,
    drain_order: DrainOrder,
}

impl ServerInputPipeline {
    pub fn new(entity_id: EntityId, capacity: usize, drain_order: DrainOrder) -> Self {
        Self {
            entity_id,
            queue: VecDeque::new(),
            states: StateRingBuffer::new(capacity),
            last_processed_tick: 0,
            drain_order,
        }
    }

    pub fn entity_id(&self) -> EntityId {
        self.entity_id
    }

    pub fn last_processed_tick(&self) -> u64 {
        self.last_processed_tick
    }

    pub fn pending(&self) -> usize {
        self.queue.len()
    }

    pub fn states(&self) -> &StateRingBuffer {
        &self.states
    }

    pub fn submit(&mut self, input: InputSample) -> InputDisposition {
        if input.tick <= self.last_processed_tick {
            debug!(
                entity = %self.entity_id,
                tick = input.tick,
                last_processed_tick = self.last_processed_tick,
                "dropping stale input"
            );
            return InputDisposition::Stale {
                last_processed_tick: self.last_processed_tick,
            };
        }
        self.queue.push_back(input);
        InputDisposition::Queued
    }

    /// Drains everything queued, simulating each input against the previous
    /// authoritative state and applying it to `transform`.
    ///
    /// `classification` is the live classification the action system reports
    /// for this tick. Returns the states produced, in processing order.
    pub fn process_pending(
        &mut self,
        transform: &mut Transform,
        classification: Classification,
        resolver: &impl SpeedResolver,
        dt_s: f32,
    ) -> Vec<MovementState> {
        let mut batch: Vec<InputSample> = self.queue.drain(..).collect();
        if self.drain_order == DrainOrder::Tick {
            batch.sort_by_key(|input| input.tick);
        }

        let mut produced = Vec::with_capacity(batch.len());
        for input in batch {
            // duplicates, or a later tick already processed in this drain
            if input.tick <= self.last_processed_tick {
                debug!(
                    entity = %self.entity_id,
                    tick = input.tick,
                    last_processed_tick = self.last_processed_tick,
                    "skipping input overtaken during drain"
                );
                continue;
            }

            let prior = self
                .latest_state()
                .copied()
                .unwrap_or_else(|| baseline_from_transform(transform, input.tick.saturating_sub(1)))
                .with_classification(classification);
            let next = step(&input, &prior, resolver, dt_s);

            apply_movement_state(transform, &next);
            self.states.insert(next);
            self.last_processed_tick = input.tick;
            produced.push(next);
        }
        produced
    }

    /// Re-records the last processed tick from the live transform after
    /// something other than input moved the entity (scripted moves, forced
    /// corrections), so the next input continues from where it really is.
    pub fn rebase(&mut self, transform: &Transform, classification: Classification) {
        if self.last_processed_tick == 0 {
            return;
        }
        let state = MovementState::baseline(self.last_processed_tick, transform.translation, transform.rotation)
            .with_classification(classification);
        self.states.insert(state);
    }

    /// Most recently processed authoritative state; what gets broadcast.
    pub fn latest_state(&self) -> Option<&MovementState> {
        if self.last_processed_tick == 0 {
            return None;
        }
        self.states.get(self.last_processed_tick)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tether_sim_core::SpeedTable;

    const DT: f32 = 0.1;

    fn pipeline(order: DrainOrder) -> ServerInputPipeline {
        ServerInputPipeline::new(EntityId::new_v4(), 16, order)
    }

    #[test]
    fn stale_and_duplicate_inputs_are_rejected_after_processing() {
        let mut pipeline = pipeline(DrainOrder::Tick);
        let mut transform = Transform::default();
        assert_eq!(pipeline.submit(InputSample::new(1, Vec3::X)), InputDisposition::Queued);
        pipeline.process_pending(&mut transform, Classification::moving(), &SpeedTable::default(), DT);

        assert_eq!(
            pipeline.submit(InputSample::new(1, Vec3::X)),
            InputDisposition::Stale { last_processed_tick: 1 }
        );
        assert_eq!(pipeline.pending(), 0);
    }

    #[test]
    fn tick_order_sorts_reordered_batch() {
        let mut pipeline = pipeline(DrainOrder::Tick);
        let mut transform = Transform::default();
        pipeline.submit(InputSample::new(2, Vec3::X));
        pipeline.submit(InputSample::new(1, Vec3::NEG_Z));

        let produced =
            pipeline.process_pending(&mut transform, Classification::moving(), &SpeedTable::default(), DT);

        assert_eq!(produced.iter().map(|s| s.tick).collect::<Vec<_>>(), vec![1, 2]);
        assert_eq!(pipeline.last_processed_tick(), 2);
        let expected = Vec3::new(0.5, 0.0, -0.5);
        assert!(transform.translation.distance(expected) < 1e-5);
    }

    #[test]
    fn arrival_order_skips_overtaken_ticks() {
        let mut pipeline = pipeline(DrainOrder::Arrival);
        let mut transform = Transform::default();
        pipeline.submit(InputSample::new(2, Vec3::X));
        pipeline.submit(InputSample::new(1, Vec3::NEG_Z));

        let produced =
            pipeline.process_pending(&mut transform, Classification::moving(), &SpeedTable::default(), DT);

        assert_eq!(produced.len(), 1);
        assert_eq!(produced[0].tick, 2);
        assert!(transform.translation.distance(Vec3::new(0.5, 0.0, 0.0)) < 1e-5);
    }

    #[test]
    fn first_input_starts_from_live_transform() {
        let mut pipeline = pipeline(DrainOrder::Tick);
        let mut transform = Transform::from_xyz(10.0, 0.0, 0.0);
        pipeline.submit(InputSample::new(7, Vec3::X));
        pipeline.process_pending(&mut transform, Classification::moving(), &SpeedTable::default(), DT);

        let latest = pipeline.latest_state().copied().expect("processed");
        assert_eq!(latest.tick, 7);
        assert!((latest.position.x - 10.5).abs() < 1e-5);
        assert_eq!(pipeline.states().get(7), Some(&latest));
    }

    #[test]
    fn rebase_continues_from_moved_transform() {
        let mut pipeline = pipeline(DrainOrder::Tick);
        let mut transform = Transform::default();
        pipeline.submit(InputSample::new(1, Vec3::X));
        pipeline.process_pending(&mut transform, Classification::moving(), &SpeedTable::default(), DT);

        transform.translation = Vec3::new(0.0, 0.0, -6.0);
        pipeline.rebase(&transform, Classification::idle());
        pipeline.submit(InputSample::new(2, Vec3::ZERO));
        pipeline.process_pending(&mut transform, Classification::idle(), &SpeedTable::default(), DT);

        assert_eq!(transform.translation, Vec3::new(0.0, 0.0, -6.0));
        assert_eq!(pipeline.latest_state().map(|s| s.position), Some(Vec3::new(0.0, 0.0, -6.0)));
    }
}
