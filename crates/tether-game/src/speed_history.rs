use std::collections::VecDeque;

use bevy::prelude::*;

pub const SPEED_HISTORY_RETENTION_S: f64 = 60.0;

/// Time-ordered log of the speed an entity was allowed to move at.
#[derive(Debug, Clone, Component)]
pub struct SpeedHistory {
    entries: VecDeque<(f64, f32)>,
    retention_s: f64,
}

impl Default for SpeedHistory {
    fn default() -> Self {
        Self::with_retention(SPEED_HISTORY_RETENTION_S)
    }
}

impl SpeedHistory {
    pub fn with_retention(retention_s: f64) -> Self {
        Self {
            entries: VecDeque::new(),
            retention_s,
        }
    }

    /// Records `speed` at `now`. A second write at the same time replaces the first.
    pub fn record(&mut self, now: f64, speed: f32) {
        match self.entries.back_mut() {
            Some(last) if last.0 == now => last.1 = speed,
            _ => self.entries.push_back((now, speed)),
        }
        while self
            .entries
            .front()
            .is_some_and(|(time, _)| now - time > self.retention_s)
        {
            self.entries.pop_front();
        }
    }

    /// Speed in effect at `time`: the latest entry at or before it, the oldest
    /// retained entry when `time` predates the log, zero when empty.
    pub fn speed_at(&self, time: f64) -> f32 {
        self.entries
            .iter()
            .rev()
            .find(|(at, _)| *at <= time)
            .or_else(|| self.entries.front())
            .map_or(0.0, |(_, speed)| *speed)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
