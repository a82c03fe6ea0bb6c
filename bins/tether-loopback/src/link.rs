use std::env;

use anyhow::{Context, Result};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use tether_net::ChannelClass;

/// Shape of the simulated network between the two apps.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LinkProfile {
    pub latency_ms: u64,
    pub jitter_ms: u64,
    /// Drop probability for the unreliable channels.
    pub loss: f64,
    pub seed: u64,
}

impl Default for LinkProfile {
    fn default() -> Self {
        Self {
            latency_ms: 60,
            jitter_ms: 20,
            loss: 0.05,
            seed: 7,
        }
    }
}

impl LinkProfile {
    pub fn perfect() -> Self {
        Self {
            latency_ms: 0,
            jitter_ms: 0,
            loss: 0.0,
            seed: 0,
        }
    }

    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let defaults = Self::default();
        let parse = |key: &str| -> Result<Option<f64>> {
            match lookup(key).filter(|raw| !raw.trim().is_empty()) {
                Some(raw) => raw
                    .trim()
                    .parse::<f64>()
                    .map(Some)
                    .with_context(|| format!("{key} has unparseable value {raw:?}")),
                None => Ok(None),
            }
        };

        let profile = Self {
            latency_ms: parse("TETHER_LOOPBACK_LATENCY_MS")?.map_or(defaults.latency_ms, |v| v as u64),
            jitter_ms: parse("TETHER_LOOPBACK_JITTER_MS")?.map_or(defaults.jitter_ms, |v| v as u64),
            loss: parse("TETHER_LOOPBACK_LOSS")?.unwrap_or(defaults.loss),
            seed: parse("TETHER_LOOPBACK_SEED")?.map_or(defaults.seed, |v| v as u64),
        };
        anyhow::ensure!(
            (0.0..1.0).contains(&profile.loss),
            "TETHER_LOOPBACK_LOSS must be in [0, 1), got {}",
            profile.loss
        );
        Ok(profile)
    }
}

struct InFlight {
    deliver_at_ms: u64,
    seq: u64,
    bytes: Vec<u8>,
}

/// One direction of a lossy, jittered datagram link.
///
/// Jitter reorders packets; loss only hits [`ChannelClass::Input`] and
/// [`ChannelClass::Authority`].
pub struct LossyLink {
    profile: LinkProfile,
    rng: StdRng,
    in_flight: Vec<InFlight>,
    next_seq: u64,
    pub sent: u64,
    pub dropped: u64,
}

impl LossyLink {
    pub fn new(profile: LinkProfile, stream: u64) -> Self {
        Self {
            profile,
            rng: StdRng::seed_from_u64(profile.seed ^ stream),
            in_flight: Vec::new(),
            next_seq: 0,
            sent: 0,
            dropped: 0,
        }
    }

    pub fn next_seq(&mut self) -> u64 {
        self.next_seq += 1;
        self.next_seq
    }

    pub fn send(&mut self, now_ms: u64, channel: ChannelClass, bytes: Vec<u8>) {
        self.sent += 1;
        let reliable = channel == ChannelClass::Correction;
        if !reliable && self.profile.loss > 0.0 && self.rng.random_bool(self.profile.loss) {
            self.dropped += 1;
            return;
        }
        let jitter = if self.profile.jitter_ms > 0 {
            self.rng.random_range(0..=self.profile.jitter_ms)
        } else {
            0
        };
        self.in_flight.push(InFlight {
            deliver_at_ms: now_ms + self.profile.latency_ms + jitter,
            seq: self.sent,
            bytes,
        });
    }

    /// Everything due by `now_ms`, in delivery order.
    pub fn deliver(&mut self, now_ms: u64) -> Vec<Vec<u8>> {
        let (mut due, pending): (Vec<_>, Vec<_>) = self
            .in_flight
            .drain(..)
            .partition(|packet| packet.deliver_at_ms <= now_ms);
        self.in_flight = pending;
        due.sort_by_key(|packet| (packet.deliver_at_ms, packet.seq));
        due.into_iter().map(|packet| packet.bytes).collect()
    }

    pub fn in_flight(&self) -> usize {
        self.in_flight.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn perfect_link_delivers_immediately_in_order() {
        let mut link = LossyLink::new(LinkProfile::perfect(), 1);
        link.send(10, ChannelClass::Input, vec![1]);
        link.send(10, ChannelClass::Input, vec![2]);
        assert_eq!(link.deliver(10), vec![vec![1], vec![2]]);
        assert_eq!(link.in_flight(), 0);
    }

    #[test]
    fn latency_holds_packets_back() {
        let profile = LinkProfile {
            latency_ms: 50,
            jitter_ms: 0,
            loss: 0.0,
            seed: 3,
        };
        let mut link = LossyLink::new(profile, 1);
        link.send(0, ChannelClass::Authority, vec![9]);
        assert!(link.deliver(49).is_empty());
        assert_eq!(link.deliver(50), vec![vec![9]]);
    }

    #[test]
    fn corrections_survive_heavy_loss() {
        let profile = LinkProfile {
            latency_ms: 0,
            jitter_ms: 0,
            loss: 0.9,
            seed: 11,
        };
        let mut link = LossyLink::new(profile, 1);
        for i in 0..50 {
            link.send(0, ChannelClass::Correction, vec![i]);
            link.send(0, ChannelClass::Input, vec![i]);
        }
        let delivered = link.deliver(0);
        assert!(delivered.len() >= 50);
        assert!(link.dropped > 0);
        assert_eq!(link.dropped as usize + delivered.len(), 100);
    }

    #[test]
    fn profile_rejects_certain_loss() {
        let err = LinkProfile::from_lookup(|key| (key == "TETHER_LOOPBACK_LOSS").then(|| "1.0".to_string()))
            .expect_err("loss of 1 never delivers");
        assert!(err.to_string().contains("TETHER_LOOPBACK_LOSS"));
        let profile = LinkProfile::from_lookup(|_| None).expect("defaults");
        assert_eq!(profile, LinkProfile::default());
    }
}
