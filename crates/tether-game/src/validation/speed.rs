use bevy::prelude::*;

pub const SPEED_TOLERANCE_RATIO: f32 = 1.05;
pub const SPEED_SLACK_M: f32 = 1.5;
pub const MIN_VALIDATED_DISPLACEMENT_M: f32 = 0.1;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SpeedSample {
    pub time: f64,
    /// Speed the entity was permitted to move at, from its speed history.
    pub speed: f32,
    pub position: Vec3,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SegmentReport {
    pub duration_s: f32,
    pub distance: f32,
    pub implied_speed: f32,
    pub permitted_speed: f32,
}

#[derive(Debug, Clone, PartialEq)]
pub struct SpeedReport {
    pub snapshot_count: usize,
    pub total_time_s: f32,
    pub moved_distance: f32,
    pub max_distance: f32,
    pub allowed_distance: f32,
    pub average_speed: f32,
    pub min_speed: f32,
    pub max_speed: f32,
    pub actual_average_speed: f32,
    pub start: Vec3,
    pub end: Vec3,
    pub segments: Vec<SegmentReport>,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum SpeedSkip {
    TooFewSnapshots { count: usize },
    DisplacementTooSmall { distance: f32 },
}

#[derive(Debug, Clone, PartialEq)]
pub enum SpeedVerdict {
    Skipped(SpeedSkip),
    Passed(SpeedReport),
    Failed(SpeedReport),
}

impl SpeedVerdict {
    pub fn is_failure(&self) -> bool {
        matches!(self, Self::Failed(_))
    }
}

/// Upper bound on the distance covered, summing `prior.speed * dt` per segment.
pub fn max_distance(samples: &[SpeedSample]) -> f32 {
    samples
        .windows(2)
        .map(|pair| pair[0].speed * (pair[1].time - pair[0].time) as f32)
        .sum()
}

pub fn allowed_distance(max_distance: f32) -> f32 {
    max_distance * SPEED_TOLERANCE_RATIO + SPEED_SLACK_M
}

/// Scores one free-movement window. The window passes when the straight-line
/// displacement stays within [`allowed_distance`].
pub fn validate_samples(samples: &[SpeedSample]) -> SpeedVerdict {
    let (Some(first), Some(last)) = (samples.first(), samples.last()) else {
        return SpeedVerdict::Skipped(SpeedSkip::TooFewSnapshots { count: 0 });
    };
    if samples.len() < 2 {
        return SpeedVerdict::Skipped(SpeedSkip::TooFewSnapshots { count: samples.len() });
    }
    let moved_distance = first.position.distance(last.position);
    if moved_distance < MIN_VALIDATED_DISPLACEMENT_M {
        return SpeedVerdict::Skipped(SpeedSkip::DisplacementTooSmall {
            distance: moved_distance,
        });
    }

    let report = report(samples, moved_distance);
    if report.moved_distance > report.allowed_distance {
        SpeedVerdict::Failed(report)
    } else {
        SpeedVerdict::Passed(report)
    }
}

fn report(samples: &[SpeedSample], moved_distance: f32) -> SpeedReport {
    let first = samples[0];
    let last = samples[samples.len() - 1];
    let total_time_s = (last.time - first.time) as f32;
    let max_distance = max_distance(samples);

    let speeds = samples.iter().map(|s| s.speed);
    let min_speed = speeds.clone().fold(f32::INFINITY, f32::min);
    let max_speed = speeds.clone().fold(f32::NEG_INFINITY, f32::max);
    let average_speed = speeds.sum::<f32>() / samples.len() as f32;

    let segments = samples
        .windows(2)
        .map(|pair| {
            let duration_s = (pair[1].time - pair[0].time) as f32;
            let distance = pair[0].position.distance(pair[1].position);
            SegmentReport {
                duration_s,
                distance,
                implied_speed: if duration_s > 0.0 { distance / duration_s } else { 0.0 },
                permitted_speed: pair[0].speed,
            }
        })
        .collect();

    SpeedReport {
        snapshot_count: samples.len(),
        total_time_s,
        moved_distance,
        max_distance,
        allowed_distance: allowed_distance(max_distance),
        average_speed,
        min_speed,
        max_speed,
        actual_average_speed: if total_time_s > 0.0 {
            moved_distance / total_time_s
        } else {
            0.0
        },
        start: first.position,
        end: last.position,
        segments,
    }
}

/// Watches an authoritative entity's free-movement phases and scores each one
/// when it ends.
#[derive(Debug, Clone, Default, Component)]
pub struct SpeedSnapshotValidator {
    active: bool,
    samples: Vec<SpeedSample>,
}

impl SpeedSnapshotValidator {
    pub fn is_active(&self) -> bool {
        self.active
    }

    pub fn samples(&self) -> &[SpeedSample] {
        &self.samples
    }

    /// Feeds this tick's free-movement flag. A rising edge starts a new window
    /// seeded with `sample`; a falling edge closes it with `sample` and scores it.
    pub fn update(&mut self, free_movement: bool, sample: SpeedSample) -> Option<SpeedVerdict> {
        match (self.active, free_movement) {
            (false, true) => {
                self.active = true;
                self.samples.clear();
                self.samples.push(sample);
                None
            }
            (true, false) => {
                self.active = false;
                self.samples.push(sample);
                Some(validate_samples(&self.samples))
            }
            _ => None,
        }
    }

    /// Appends a per-step sample while a window is open.
    pub fn record_step(&mut self, sample: SpeedSample) {
        if self.active {
            self.samples.push(sample);
        }
    }

    /// First position of the window, where a failed window is rolled back to.
    pub fn window_start(&self) -> Option<Vec3> {
        self.samples.first().map(|s| s.position)
    }
}
