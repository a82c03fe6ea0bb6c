mod link;

use std::env;
use std::time::Duration;

use anyhow::{Context, Result};
use bevy::ecs::message::{Message, Messages};
use bevy::log::LogPlugin;
use bevy::prelude::*;
use bevy::time::TimeUpdateStrategy;
use bevy_remote::RemotePlugin;
use bevy_remote::http::RemoteHttpPlugin;
use tether_core::{EntityId, InspectConfig, MovementConfig};
use tether_game::{
    authority_mover, predicted_mover, CurveLibrary, InboundAuthorityState, InboundCorrection, InboundInput,
    LocalInput, MovementStats, OutboundAuthorityState, OutboundCorrection, OutboundInput, TetherMovementPlugin,
    TickClock,
};
use tether_input_map::RawInputState;
use tether_net::{decode_envelope_json, encode_envelope_json, NetEnvelope, WireMessage};
use tether_sim_core::SpeedTable;

use crate::link::{LinkProfile, LossyLink};

#[derive(Debug, Resource, Clone)]
#[allow(dead_code)]
struct BrpAuthToken(String);

/// Knobs of one loopback run that are not part of the movement config.
#[derive(Debug, Clone, Copy, PartialEq)]
struct RunOptions {
    duration_s: f64,
    frame_ms: u64,
    /// Speed multiplier only the server applies; anything but 1.0 forces corrections.
    server_speed_multiplier: f32,
}

impl Default for RunOptions {
    fn default() -> Self {
        Self {
            duration_s: 10.0,
            frame_ms: 16,
            server_speed_multiplier: 1.0,
        }
    }
}

impl RunOptions {
    fn from_env() -> Result<Self> {
        let defaults = Self::default();
        let read = |key: &str| -> Result<Option<f64>> {
            match env::var(key).ok().filter(|raw| !raw.trim().is_empty()) {
                Some(raw) => raw
                    .trim()
                    .parse::<f64>()
                    .map(Some)
                    .with_context(|| format!("{key} has unparseable value {raw:?}")),
                None => Ok(None),
            }
        };
        let options = Self {
            duration_s: read("TETHER_LOOPBACK_DURATION_S")?.unwrap_or(defaults.duration_s),
            frame_ms: read("TETHER_LOOPBACK_FRAME_MS")?.map_or(defaults.frame_ms, |v| v as u64),
            server_speed_multiplier: read("TETHER_LOOPBACK_SERVER_SLOW")?
                .map_or(defaults.server_speed_multiplier, |v| v as f32),
        };
        anyhow::ensure!(options.frame_ms > 0, "TETHER_LOOPBACK_FRAME_MS must be positive");
        Ok(options)
    }
}

fn main() {
    let movement = match MovementConfig::from_env() {
        Ok(cfg) => cfg,
        Err(err) => {
            eprintln!("invalid movement config: {err}");
            std::process::exit(2);
        }
    };
    let remote_cfg = match InspectConfig::from_env("LOOPBACK", 15714) {
        Ok(cfg) => cfg,
        Err(err) => {
            eprintln!("invalid LOOPBACK BRP config: {err}");
            std::process::exit(2);
        }
    };
    let (profile, options) = match LinkProfile::from_env().and_then(|p| Ok((p, RunOptions::from_env()?))) {
        Ok(pair) => pair,
        Err(err) => {
            eprintln!("invalid loopback config: {err:#}");
            std::process::exit(2);
        }
    };

    let mut loopback = match Loopback::new(movement, profile, options) {
        Ok(loopback) => loopback,
        Err(err) => {
            eprintln!("failed to start loopback: {err:#}");
            std::process::exit(1);
        }
    };
    loopback.server.add_plugins(LogPlugin::default());
    configure_remote(&mut loopback.server, &remote_cfg);

    loopback.run();
    println!("{}", loopback.summary());
}

fn configure_remote(app: &mut App, cfg: &InspectConfig) {
    if !cfg.enabled {
        return;
    }

    app.add_plugins(RemotePlugin::default());
    app.add_plugins(
        RemoteHttpPlugin::default()
            .with_address(cfg.bind_addr)
            .with_port(cfg.port),
    );
    if let Some(token) = cfg.auth_token.clone() {
        app.insert_resource(BrpAuthToken(token));
    }
}

/// A server app and one predicting client app joined by a pair of [`LossyLink`]s.
struct Loopback {
    server: App,
    client: App,
    server_entity: Entity,
    client_entity: Entity,
    uplink: LossyLink,
    downlink: LossyLink,
    options: RunOptions,
    now_ms: u64,
    undecodable: u64,
}

impl Loopback {
    fn new(movement: MovementConfig, profile: LinkProfile, options: RunOptions) -> Result<Self> {
        let id = EntityId::new_v4();
        let frame = Duration::from_millis(options.frame_ms);

        let mut server = App::new();
        server
            .add_plugins(MinimalPlugins)
            .insert_resource(TimeUpdateStrategy::ManualDuration(frame))
            .add_plugins(TetherMovementPlugin {
                config: movement.clone(),
            });
        let server_speed = SpeedTable {
            multiplier: options.server_speed_multiplier,
            ..SpeedTable::default()
        };
        let bundle = authority_mover(id, &movement, server_speed, &CurveLibrary::default(), &[])
            .context("spawning the authoritative mover")?;
        let server_entity = server.world_mut().spawn((Transform::default(), bundle)).id();

        let mut client = App::new();
        client
            .add_plugins(MinimalPlugins)
            .insert_resource(TimeUpdateStrategy::ManualDuration(frame))
            .insert_resource(LocalInput::default())
            .add_plugins(TetherMovementPlugin {
                config: movement.clone(),
            });
        let client_entity = client
            .world_mut()
            .spawn((Transform::default(), predicted_mover(id, &movement, SpeedTable::default())))
            .id();

        Ok(Self {
            server,
            client,
            server_entity,
            client_entity,
            uplink: LossyLink::new(profile, 1),
            downlink: LossyLink::new(profile, 2),
            options,
            now_ms: 0,
            undecodable: 0,
        })
    }

    fn run(&mut self) {
        let frames = (self.options.duration_s * 1000.0 / self.options.frame_ms as f64).ceil() as u64;
        for _ in 0..frames {
            self.step();
        }
        // Let the link drain with the stick released.
        self.client.insert_resource(LocalInput::default());
        for _ in 0..(1000 / self.options.frame_ms).max(1) {
            self.step();
        }
    }

    fn step(&mut self) {
        self.now_ms += self.options.frame_ms;
        let raw = scripted_stick(self.now_ms, self.options.duration_s);
        if let Some(mut local) = self.client.world_mut().get_resource_mut::<LocalInput>() {
            local.raw = raw;
        }

        self.client.update();
        let tick = current_tick(&self.client);
        for OutboundInput(message) in drain::<OutboundInput>(&mut self.client) {
            send(&mut self.uplink, self.now_ms, tick, WireMessage::ClientInput(message));
        }
        for message in self.receive_uplink() {
            if let WireMessage::ClientInput(input) = message {
                self.server.world_mut().write_message(InboundInput(input));
            }
        }

        self.server.update();
        let tick = current_tick(&self.server);
        for OutboundAuthorityState(message) in drain::<OutboundAuthorityState>(&mut self.server) {
            send(&mut self.downlink, self.now_ms, tick, WireMessage::AuthorityState(message));
        }
        for OutboundCorrection(message) in drain::<OutboundCorrection>(&mut self.server) {
            send(&mut self.downlink, self.now_ms, tick, WireMessage::ForcedCorrection(message));
        }
        for message in self.receive_downlink() {
            match message {
                WireMessage::AuthorityState(state) => {
                    self.client.world_mut().write_message(InboundAuthorityState(state));
                }
                WireMessage::ForcedCorrection(correction) => {
                    self.client.world_mut().write_message(InboundCorrection(correction));
                }
                WireMessage::ClientInput(_) => {}
            }
        }
    }

    fn receive_uplink(&mut self) -> Vec<WireMessage> {
        let packets = self.uplink.deliver(self.now_ms);
        self.decode_all(packets)
    }

    fn receive_downlink(&mut self) -> Vec<WireMessage> {
        let packets = self.downlink.deliver(self.now_ms);
        self.decode_all(packets)
    }

    fn decode_all(&mut self, packets: Vec<Vec<u8>>) -> Vec<WireMessage> {
        let mut messages = Vec::with_capacity(packets.len());
        for bytes in packets {
            match decode_envelope_json::<WireMessage>(&bytes) {
                Ok(envelope) if envelope.protocol_version == tether_core::PROTOCOL_VERSION => {
                    messages.push(envelope.payload);
                }
                Ok(envelope) => {
                    warn!(version = envelope.protocol_version, "dropping packet from another protocol version");
                    self.undecodable += 1;
                }
                Err(err) => {
                    warn!(%err, "dropping undecodable packet");
                    self.undecodable += 1;
                }
            }
        }
        messages
    }

    fn position_error(&self) -> f32 {
        let server = self.server.world().get::<Transform>(self.server_entity);
        let client = self.client.world().get::<Transform>(self.client_entity);
        match (server, client) {
            (Some(server), Some(client)) => server.translation.distance(client.translation),
            _ => f32::NAN,
        }
    }

    fn summary(&self) -> String {
        let server = *self.server.world().resource::<MovementStats>();
        let client = *self.client.world().resource::<MovementStats>();
        format!(
            "tether-loopback: {server_ticks} server ticks, {processed} inputs processed ({stale} stale)\n\
             uplink {up_sent} sent / {up_dropped} dropped, downlink {down_sent} sent / {down_dropped} dropped, {bad} undecodable\n\
             client: {predictions} predictions, {confirmed} confirmed, {corrected} corrected ({replayed} replayed), \
             {missing} missing history, {stale_states} stale states\n\
             server: {failures} validator failures, {issued} corrections issued; client received {received}\n\
             final position error {error:.4} m",
            server_ticks = server.ticks,
            processed = server.inputs_processed,
            stale = server.stale_inputs,
            up_sent = self.uplink.sent,
            up_dropped = self.uplink.dropped,
            down_sent = self.downlink.sent,
            down_dropped = self.downlink.dropped,
            bad = self.undecodable,
            predictions = client.predictions,
            confirmed = client.reconciliations_confirmed,
            corrected = client.reconciliations_corrected,
            replayed = client.replayed_inputs,
            missing = client.missing_history,
            stale_states = client.stale_states,
            failures = server.validator_failures,
            issued = server.corrections_issued,
            received = client.corrections_received,
            error = self.position_error(),
        )
    }
}

fn send(link: &mut LossyLink, now_ms: u64, tick: u64, message: WireMessage) {
    let seq = link.next_seq();
    let envelope = NetEnvelope::new(message.channel(), seq, tick, message);
    match encode_envelope_json(&envelope) {
        Ok(bytes) => link.send(now_ms, envelope.channel, bytes),
        Err(err) => error!(%err, "failed to encode outbound packet"),
    }
}

/// Walks a square: right, up, left, down, a quarter of the run each.
fn scripted_stick(now_ms: u64, duration_s: f64) -> RawInputState {
    let quarter_ms = ((duration_s * 1000.0) / 4.0).max(1.0) as u64;
    let mut raw = RawInputState::default();
    match (now_ms / quarter_ms) % 4 {
        0 => raw.right = true,
        1 => raw.up = true,
        2 => raw.left = true,
        _ => raw.down = true,
    }
    raw
}

fn current_tick(app: &App) -> u64 {
    app.world().resource::<TickClock>().0.current_tick()
}

fn drain<M: Message>(app: &mut App) -> Vec<M> {
    app.world_mut().resource_mut::<Messages<M>>().drain().collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::net::{IpAddr, Ipv4Addr};

    #[test]
    fn remote_endpoint_registers_when_enabled() {
        let cfg = InspectConfig {
            enabled: true,
            bind_addr: IpAddr::V4(Ipv4Addr::LOCALHOST),
            port: 15714,
            auth_token: Some("0123456789abcdef".to_string()),
        };
        let mut app = App::new();
        app.add_plugins(MinimalPlugins);
        configure_remote(&mut app, &cfg);

        assert!(
            app.world()
                .contains_resource::<bevy_remote::http::HostPort>()
        );
        assert!(app.world().contains_resource::<BrpAuthToken>());
    }

    #[test]
    fn perfect_link_run_ends_converged() {
        let options = RunOptions {
            duration_s: 2.0,
            frame_ms: 20,
            server_speed_multiplier: 1.0,
        };
        let mut loopback = Loopback::new(MovementConfig::default(), LinkProfile::perfect(), options).expect("no curves required");
        loopback.run();

        let client = *loopback.client.world().resource::<MovementStats>();
        assert!(client.predictions > 60, "{client:?}");
        assert_eq!(client.reconciliations_corrected, 0, "{client:?}");
        assert_eq!(loopback.undecodable, 0);
        assert!(loopback.position_error() < 1e-3, "error {}", loopback.position_error());
    }

    #[test]
    fn lossy_link_with_server_slow_still_converges_once_idle() {
        let options = RunOptions {
            duration_s: 3.0,
            frame_ms: 16,
            server_speed_multiplier: 0.6,
        };
        let mut loopback = Loopback::new(MovementConfig::default(), LinkProfile::default(), options).expect("no curves required");
        loopback.run();

        let client = *loopback.client.world().resource::<MovementStats>();
        assert!(client.reconciliations_corrected > 0, "{client:?}");
        assert!(loopback.uplink.dropped + loopback.downlink.dropped > 0);
        assert!(loopback.position_error() < 0.05, "error {}", loopback.position_error());
        assert!(loopback.summary().contains("final position error"));
    }
}
