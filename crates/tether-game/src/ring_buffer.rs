use tether_sim_core::MovementState;

/// Fixed arena of authoritative states indexed by `tick % capacity`.
///
/// Writes are destructive: tick `k + capacity` replaces tick `k`. Capacity must
/// exceed the largest round trip (in ticks) the server tolerates, which
/// `MovementConfig::validate` enforces before one of these is built.
#[derive(Debug, Clone)]
pub struct StateRingBuffer {
    slots: Vec<Option<MovementState>>,
}

impl StateRingBuffer {
    pub fn new(capacity: usize) -> Self {
        Self {
            slots: vec![None; capacity.max(1)],
        }
    }

    pub fn capacity(&self) -> usize {
        self.slots.len()
    }

    fn slot_index(&self, tick: u64) -> usize {
        (tick % self.slots.len() as u64) as usize
    }

    pub fn insert(&mut self, state: MovementState) {
        let index = self.slot_index(state.tick);
        self.slots[index] = Some(state);
    }

    /// State recorded for exactly `tick`, if its slot has not been reused since.
    pub fn get(&self, tick: u64) -> Option<&MovementState> {
        self.slot(tick).filter(|state| state.tick == tick)
    }

    /// Whatever currently occupies the slot `tick` maps to.
    pub fn slot(&self, tick: u64) -> Option<&MovementState> {
        self.slots[self.slot_index(tick)].as_ref()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bevy::prelude::*;

    fn state_at(tick: u64, x: f32) -> MovementState {
        MovementState::baseline(tick, Vec3::new(x, 0.0, 0.0), Quat::IDENTITY)
    }

    #[test]
    fn wraparound_lands_in_same_slot_and_overwrites() {
        let mut ring = StateRingBuffer::new(8);
        ring.insert(state_at(3, 1.0));
        ring.insert(state_at(11, 2.0));

        assert_eq!(ring.slot(3).map(|s| s.tick), Some(11));
        assert_eq!(ring.get(11).map(|s| s.position.x), Some(2.0));
        assert!(ring.get(3).is_none());
    }

    #[test]
    fn untouched_slots_are_empty() {
        let ring = StateRingBuffer::new(4);
        assert!(ring.get(0).is_none());
        assert!(ring.slot(2).is_none());
        assert_eq!(ring.capacity(), 4);
    }
}
