use serde::{Deserialize, Serialize};

pub mod config;

pub use config::{ConfigError, DrainOrder, InspectConfig, MovementConfig};

pub const PROTOCOL_VERSION: u16 = 1;
pub const SIM_TICK_HZ: u16 = 60;

/// Slots in the server's authoritative state ring. Must exceed the worst
/// round trip (in ticks) the deployment tolerates, see [`MovementConfig::validate`].
pub const SERVER_STATE_BUFFER_TICKS: usize = 1024;
pub const DEFAULT_MAX_RTT_TICKS: u32 = 240;
pub const CLIENT_HISTORY_TICKS: usize = 1024;
pub const MISPREDICTION_THRESHOLD_M: f32 = 0.01;

/// Network-wide identity of a moving entity, shared by the authority and every observer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct EntityId(pub uuid::Uuid);

impl EntityId {
    pub fn new_v4() -> Self {
        Self(uuid::Uuid::new_v4())
    }

    pub fn is_nil(self) -> bool {
        self.0.is_nil()
    }
}

impl std::fmt::Display for EntityId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0.simple())
    }
}
