use std::ops::RangeInclusive;

/// Which halves of the netcode this process runs for an entity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct TickRoles {
    pub authority: bool,
    pub controlling: bool,
}

impl TickRoles {
    pub const SERVER: Self = Self {
        authority: true,
        controlling: false,
    };
    pub const CLIENT: Self = Self {
        authority: false,
        controlling: true,
    };
    pub const HOST: Self = Self {
        authority: true,
        controlling: true,
    };

    /// Host processes skip prediction: the authoritative result is already applied.
    pub fn predicts(self) -> bool {
        self.controlling && !self.authority
    }

    /// Work to run inside one tick, in execution order.
    pub fn phases(self) -> impl Iterator<Item = TickPhase> {
        [
            (self.authority, TickPhase::ServerInput),
            (self.controlling, TickPhase::ClientPrediction),
            (self.authority, TickPhase::ServerBroadcast),
        ]
        .into_iter()
        .filter_map(|(active, phase)| active.then_some(phase))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TickPhase {
    ServerInput,
    ClientPrediction,
    ServerBroadcast,
}

/// Turns wall-clock frame deltas into a gap-free sequence of fixed ticks.
///
/// Never runs ahead of real time; catches up with several ticks in one frame
/// when behind and never skips a tick number.
#[derive(Debug, Clone)]
pub struct FixedTickScheduler {
    tick_duration_s: f64,
    accumulated_s: f64,
    current_tick: u64,
}

impl FixedTickScheduler {
    pub fn new(tick_hz: u16) -> Self {
        Self::with_duration(1.0 / f64::from(tick_hz.max(1)))
    }

    pub fn with_duration(tick_duration_s: f64) -> Self {
        Self {
            tick_duration_s,
            accumulated_s: 0.0,
            current_tick: 0,
        }
    }

    pub fn tick_duration_s(&self) -> f64 {
        self.tick_duration_s
    }

    pub fn current_tick(&self) -> u64 {
        self.current_tick
    }

    /// Simulation time at the end of the current tick.
    pub fn elapsed_s(&self) -> f64 {
        self.current_tick as f64 * self.tick_duration_s
    }

    /// Accumulates `delta_s` and returns the tick numbers that became due.
    /// The range is empty when no tick is due.
    pub fn advance(&mut self, delta_s: f64) -> RangeInclusive<u64> {
        if delta_s.is_finite() && delta_s > 0.0 {
            self.accumulated_s += delta_s;
        }
        let first = self.current_tick + 1;
        while self.accumulated_s >= self.tick_duration_s {
            self.accumulated_s -= self.tick_duration_s;
            self.current_tick += 1;
        }
        // first > current_tick yields an empty range
        first..=self.current_tick
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn small_deltas_accumulate_into_one_tick() {
        let mut scheduler = FixedTickScheduler::with_duration(0.25);
        assert!(scheduler.advance(0.1).is_empty());
        assert!(scheduler.advance(0.1).is_empty());
        assert_eq!(scheduler.advance(0.1), 1..=1);
        // 0.05 carried over: 0.2 more completes the second tick
        assert!(scheduler.advance(0.19).is_empty());
        assert_eq!(scheduler.advance(0.02), 2..=2);
    }

    #[test]
    fn long_frame_catches_up_without_skipping() {
        let mut scheduler = FixedTickScheduler::with_duration(0.25);
        assert_eq!(scheduler.advance(1.0), 1..=4);
        assert_eq!(scheduler.advance(0.5), 5..=6);
        assert_eq!(scheduler.current_tick(), 6);
        assert!((scheduler.elapsed_s() - 1.5).abs() < 1e-9);
    }

    #[test]
    fn invalid_deltas_are_ignored() {
        let mut scheduler = FixedTickScheduler::with_duration(0.25);
        assert!(scheduler.advance(-1.0).is_empty());
        assert!(scheduler.advance(f64::NAN).is_empty());
        assert_eq!(scheduler.current_tick(), 0);
    }

    #[test]
    fn phases_follow_fixed_order() {
        let host = TickRoles::HOST.phases().collect::<Vec<_>>();
        assert_eq!(
            host,
            vec![
                TickPhase::ServerInput,
                TickPhase::ClientPrediction,
                TickPhase::ServerBroadcast
            ]
        );
        assert_eq!(
            TickRoles::CLIENT.phases().collect::<Vec<_>>(),
            vec![TickPhase::ClientPrediction]
        );
        assert!(!TickRoles::HOST.predicts());
        assert!(TickRoles::CLIENT.predicts());
    }
}
