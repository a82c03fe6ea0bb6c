use std::env;
use std::net::{IpAddr, Ipv4Addr};
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::{
    CLIENT_HISTORY_TICKS, DEFAULT_MAX_RTT_TICKS, MISPREDICTION_THRESHOLD_M,
    SERVER_STATE_BUFFER_TICKS, SIM_TICK_HZ,
};

#[derive(Debug, Clone, PartialEq, Error)]
pub enum ConfigError {
    #[error("{key} has unparseable value {value:?}")]
    Unparseable { key: String, value: String },
    #[error("tick rate must be greater than zero")]
    ZeroTickRate,
    #[error(
        "server state buffer ({capacity} ticks) must exceed the max round trip ({max_rtt_ticks} ticks)"
    )]
    ServerBufferTooSmall { capacity: usize, max_rtt_ticks: u32 },
    #[error(
        "client history ({capacity} entries) must cover the max round trip ({max_rtt_ticks} ticks)"
    )]
    ClientHistoryTooSmall { capacity: usize, max_rtt_ticks: u32 },
    #[error("misprediction threshold must be a positive finite distance, got {0}")]
    InvalidThreshold(f32),
    #[error("remote inspection only binds loopback addresses, got {0}")]
    NonLoopbackInspect(IpAddr),
    #[error("remote inspection requires an auth token of at least 16 characters")]
    InspectTokenTooShort,
    #[error("remote inspection is enabled but no auth token is configured")]
    InspectTokenMissing,
}

/// Order in which the server drains inputs that queued up during one tick.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum DrainOrder {
    /// Sort the drained batch by input tick before applying it.
    #[default]
    Tick,
    /// Apply inputs exactly as they arrived.
    Arrival,
}

impl FromStr for DrainOrder {
    type Err = ();

    fn from_str(raw: &str) -> Result<Self, Self::Err> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "tick" => Ok(Self::Tick),
            "arrival" => Ok(Self::Arrival),
            _ => Err(()),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MovementConfig {
    pub tick_hz: u16,
    pub server_buffer_ticks: usize,
    pub max_rtt_ticks: u32,
    pub client_history_ticks: usize,
    pub misprediction_threshold_m: f32,
    pub drain_order: DrainOrder,
    /// Both validators always score; these gate the corrective action.
    pub enforce_speed_validation: bool,
    pub enforce_curve_validation: bool,
}

impl Default for MovementConfig {
    fn default() -> Self {
        Self {
            tick_hz: SIM_TICK_HZ,
            server_buffer_ticks: SERVER_STATE_BUFFER_TICKS,
            max_rtt_ticks: DEFAULT_MAX_RTT_TICKS,
            client_history_ticks: CLIENT_HISTORY_TICKS,
            misprediction_threshold_m: MISPREDICTION_THRESHOLD_M,
            drain_order: DrainOrder::Tick,
            enforce_speed_validation: false,
            enforce_curve_validation: false,
        }
    }
}

impl MovementConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Builds the config from an arbitrary key source. Missing or blank keys
    /// keep their defaults; present but malformed keys are rejected.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let defaults = Self::default();
        let config = Self {
            tick_hz: parse_key(&lookup, "TETHER_TICK_HZ")?.unwrap_or(defaults.tick_hz),
            server_buffer_ticks: parse_key(&lookup, "TETHER_SERVER_BUFFER_TICKS")?
                .unwrap_or(defaults.server_buffer_ticks),
            max_rtt_ticks: parse_key(&lookup, "TETHER_MAX_RTT_TICKS")?
                .unwrap_or(defaults.max_rtt_ticks),
            client_history_ticks: parse_key(&lookup, "TETHER_CLIENT_HISTORY_TICKS")?
                .unwrap_or(defaults.client_history_ticks),
            misprediction_threshold_m: parse_key(&lookup, "TETHER_MISPREDICTION_THRESHOLD_M")?
                .unwrap_or(defaults.misprediction_threshold_m),
            drain_order: parse_key(&lookup, "TETHER_DRAIN_ORDER")?
                .unwrap_or(defaults.drain_order),
            enforce_speed_validation: parse_flag(&lookup, "TETHER_ENFORCE_SPEED_VALIDATION")?
                .unwrap_or(defaults.enforce_speed_validation),
            enforce_curve_validation: parse_flag(&lookup, "TETHER_ENFORCE_CURVE_VALIDATION")?
                .unwrap_or(defaults.enforce_curve_validation),
        };
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.tick_hz == 0 {
            return Err(ConfigError::ZeroTickRate);
        }
        if self.server_buffer_ticks <= self.max_rtt_ticks as usize {
            return Err(ConfigError::ServerBufferTooSmall {
                capacity: self.server_buffer_ticks,
                max_rtt_ticks: self.max_rtt_ticks,
            });
        }
        if self.client_history_ticks < self.max_rtt_ticks as usize {
            return Err(ConfigError::ClientHistoryTooSmall {
                capacity: self.client_history_ticks,
                max_rtt_ticks: self.max_rtt_ticks,
            });
        }
        let threshold = self.misprediction_threshold_m;
        if !threshold.is_finite() || threshold <= 0.0 {
            return Err(ConfigError::InvalidThreshold(threshold));
        }
        Ok(())
    }

    pub fn tick_duration_s(&self) -> f64 {
        1.0 / f64::from(self.tick_hz)
    }
}

/// Settings for the bevy_remote inspection endpoint of the binaries.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InspectConfig {
    pub enabled: bool,
    pub bind_addr: IpAddr,
    pub port: u16,
    pub auth_token: Option<String>,
}

impl InspectConfig {
    pub fn from_env(service: &str, default_port: u16) -> Result<Self, ConfigError> {
        Self::from_lookup(service, default_port, |key| env::var(key).ok())
    }

    /// Service-scoped keys (`TETHER_<SERVICE>_INSPECT_*`) win over the shared
    /// `TETHER_INSPECT_*` keys.
    pub fn from_lookup(
        service: &str,
        default_port: u16,
        lookup: impl Fn(&str) -> Option<String>,
    ) -> Result<Self, ConfigError> {
        let service = service.to_ascii_uppercase();
        let scoped = |suffix: &str| -> Option<(String, String)> {
            [
                format!("TETHER_{service}_INSPECT_{suffix}"),
                format!("TETHER_INSPECT_{suffix}"),
            ]
            .into_iter()
            .find_map(|key| non_blank(&lookup, &key).map(|value| (key, value)))
        };

        let enabled = match scoped("ENABLED") {
            Some((key, raw)) => parse_bool(&raw).ok_or(ConfigError::Unparseable { key, value: raw })?,
            None => false,
        };
        let bind_addr = match scoped("BIND_ADDR") {
            Some((key, raw)) => raw
                .parse::<IpAddr>()
                .map_err(|_| ConfigError::Unparseable { key, value: raw })?,
            None => IpAddr::V4(Ipv4Addr::LOCALHOST),
        };
        let port = match scoped("PORT") {
            Some((key, raw)) => raw
                .parse::<u16>()
                .map_err(|_| ConfigError::Unparseable { key, value: raw })?,
            None => default_port,
        };
        let auth_token = scoped("AUTH_TOKEN").map(|(_, value)| value);

        let config = Self {
            enabled,
            bind_addr,
            port,
            auth_token,
        };
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if !self.enabled {
            return Ok(());
        }
        if !self.bind_addr.is_loopback() {
            return Err(ConfigError::NonLoopbackInspect(self.bind_addr));
        }
        match self.auth_token.as_deref() {
            Some(token) if token.len() >= 16 => Ok(()),
            Some(_) => Err(ConfigError::InspectTokenTooShort),
            None => Err(ConfigError::InspectTokenMissing),
        }
    }
}

fn non_blank(lookup: &impl Fn(&str) -> Option<String>, key: &str) -> Option<String> {
    lookup(key).filter(|value| !value.trim().is_empty())
}

fn parse_key<T: FromStr>(
    lookup: &impl Fn(&str) -> Option<String>,
    key: &str,
) -> Result<Option<T>, ConfigError> {
    let Some(raw) = non_blank(lookup, key) else {
        return Ok(None);
    };
    raw.trim()
        .parse::<T>()
        .map(Some)
        .map_err(|_| ConfigError::Unparseable {
            key: key.to_string(),
            value: raw,
        })
}

fn parse_flag(
    lookup: &impl Fn(&str) -> Option<String>,
    key: &str,
) -> Result<Option<bool>, ConfigError> {
    let Some(raw) = non_blank(lookup, key) else {
        return Ok(None);
    };
    parse_bool(&raw)
        .map(Some)
        .ok_or_else(|| ConfigError::Unparseable {
            key: key.to_string(),
            value: raw,
        })
}

fn parse_bool(raw: &str) -> Option<bool> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}
