use bevy_math::Vec3;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use tether_core::{EntityId, PROTOCOL_VERSION};
use tether_sim_core::{ActionState, InputSample, MovementState};

#[cfg(feature = "lightyear_protocol")]
pub mod lightyear_protocol;

#[cfg(feature = "lightyear_protocol")]
pub use lightyear_protocol::{
    AuthorityChannel, CorrectionChannel, InputChannel, register_lightyear_protocol,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ChannelClass {
    /// Client → server, unordered and lossy.
    Input,
    /// Server → observers, unordered and lossy.
    Authority,
    /// Server → observers, reliable.
    Correction,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NetEnvelope<T> {
    pub protocol_version: u16,
    pub channel: ChannelClass,
    pub seq: u64,
    pub tick: u64,
    pub payload: T,
}

impl<T> NetEnvelope<T> {
    pub fn new(channel: ChannelClass, seq: u64, tick: u64, payload: T) -> Self {
        Self {
            protocol_version: PROTOCOL_VERSION,
            channel,
            seq,
            tick,
            payload,
        }
    }
}

pub fn encode_envelope_json<T: Serialize>(envelope: &NetEnvelope<T>) -> serde_json::Result<Vec<u8>> {
    serde_json::to_vec(envelope)
}

pub fn decode_envelope_json<T: DeserializeOwned>(bytes: &[u8]) -> serde_json::Result<NetEnvelope<T>> {
    serde_json::from_slice(bytes)
}

/// Owning client sends one of these per tick.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ClientInputMessage {
    pub entity_id: EntityId,
    pub input: InputSample,
}

/// Authoritative state broadcast to every observer of an entity.
/// Owners reconcile against it, everyone else snaps to it.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct AuthorityStateMessage {
    pub entity_id: EntityId,
    pub state: MovementState,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub enum CorrectionReason {
    SpeedBound,
    CurveDisplacement,
}

/// Server-forced action + position. Receivers must treat repeats as no-ops.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ForcedCorrectionMessage {
    pub entity_id: EntityId,
    pub position: Vec3,
    pub action: ActionState,
    pub reason: CorrectionReason,
}

impl ForcedCorrectionMessage {
    pub fn fixed_idle_at(entity_id: EntityId, position: Vec3, reason: CorrectionReason) -> Self {
        Self {
            entity_id,
            position,
            action: ActionState::FixedIdle,
            reason,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "kind", content = "payload", rename_all = "snake_case")]
pub enum WireMessage {
    ClientInput(ClientInputMessage),
    AuthorityState(AuthorityStateMessage),
    ForcedCorrection(ForcedCorrectionMessage),
}

impl WireMessage {
    pub fn channel(&self) -> ChannelClass {
        match self {
            Self::ClientInput(_) => ChannelClass::Input,
            Self::AuthorityState(_) => ChannelClass::Authority,
            Self::ForcedCorrection(_) => ChannelClass::Correction,
        }
    }

    pub fn entity_id(&self) -> EntityId {
        match self {
            Self::ClientInput(msg) => msg.entity_id,
            Self::AuthorityState(msg) => msg.entity_id,
            Self::ForcedCorrection(msg) => msg.entity_id,
        }
    }
}

pub fn encode_wire_message(message: &WireMessage) -> serde_json::Result<Vec<u8>> {
    serde_json::to_vec(message)
}

pub fn decode_wire_message(bytes: &[u8]) -> serde_json::Result<WireMessage> {
    serde_json::from_slice(bytes)
}
