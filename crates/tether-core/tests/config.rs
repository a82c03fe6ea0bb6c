use std::collections::HashMap;
use std::net::{IpAddr, Ipv4Addr};

use tether_core::{ConfigError, DrainOrder, InspectConfig, MovementConfig};

fn lookup_from(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
    let map = pairs
        .iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect::<HashMap<_, _>>();
    move |key| map.get(key).cloned()
}

#[test]
fn empty_environment_yields_defaults() {
    let cfg = MovementConfig::from_lookup(lookup_from(&[])).expect("defaults are valid");
    assert_eq!(cfg, MovementConfig::default());
    assert_eq!(cfg.drain_order, DrainOrder::Tick);
    assert!(!cfg.enforce_speed_validation);
    assert!(!cfg.enforce_curve_validation);
}

#[test]
fn overrides_are_parsed() {
    let cfg = MovementConfig::from_lookup(lookup_from(&[
        ("TETHER_TICK_HZ", "30"),
        ("TETHER_DRAIN_ORDER", "Arrival"),
        ("TETHER_ENFORCE_SPEED_VALIDATION", "on"),
        ("TETHER_MISPREDICTION_THRESHOLD_M", "0.05"),
    ]))
    .expect("overrides are valid");
    assert_eq!(cfg.tick_hz, 30);
    assert_eq!(cfg.drain_order, DrainOrder::Arrival);
    assert!(cfg.enforce_speed_validation);
    assert!((cfg.tick_duration_s() - 1.0 / 30.0).abs() < 1e-12);
}

#[test]
fn malformed_value_is_rejected_not_defaulted() {
    let err = MovementConfig::from_lookup(lookup_from(&[("TETHER_TICK_HZ", "fast")]))
        .expect_err("garbage must be rejected");
    assert!(matches!(err, ConfigError::Unparseable { ref key, .. } if key == "TETHER_TICK_HZ"));
}

#[test]
fn ring_must_exceed_round_trip() {
    let cfg = MovementConfig {
        server_buffer_ticks: 240,
        max_rtt_ticks: 240,
        ..MovementConfig::default()
    };
    assert_eq!(
        cfg.validate(),
        Err(ConfigError::ServerBufferTooSmall {
            capacity: 240,
            max_rtt_ticks: 240
        })
    );
}

#[test]
fn client_history_must_cover_round_trip() {
    let cfg = MovementConfig {
        client_history_ticks: 10,
        ..MovementConfig::default()
    };
    assert!(matches!(
        cfg.validate(),
        Err(ConfigError::ClientHistoryTooSmall { .. })
    ));
}

#[test]
fn non_positive_threshold_is_rejected() {
    let cfg = MovementConfig {
        misprediction_threshold_m: 0.0,
        ..MovementConfig::default()
    };
    assert!(matches!(cfg.validate(), Err(ConfigError::InvalidThreshold(_))));
}

#[test]
fn inspect_disabled_by_default_can_omit_token() {
    let cfg = InspectConfig::from_lookup("loopback", 15714, lookup_from(&[])).expect("valid");
    assert!(!cfg.enabled);
    assert_eq!(cfg.port, 15714);
    assert_eq!(cfg.bind_addr, IpAddr::V4(Ipv4Addr::LOCALHOST));
}

#[test]
fn inspect_service_key_wins_over_shared_key() {
    let cfg = InspectConfig::from_lookup(
        "loopback",
        15714,
        lookup_from(&[
            ("TETHER_INSPECT_PORT", "1000"),
            ("TETHER_LOOPBACK_INSPECT_PORT", "2000"),
        ]),
    )
    .expect("valid");
    assert_eq!(cfg.port, 2000);
}

#[test]
fn inspect_enabled_requires_long_token() {
    let cfg = InspectConfig {
        enabled: true,
        bind_addr: IpAddr::V4(Ipv4Addr::LOCALHOST),
        port: 15714,
        auth_token: Some("short".to_string()),
    };
    assert_eq!(cfg.validate(), Err(ConfigError::InspectTokenTooShort));
}

#[test]
fn inspect_rejects_non_loopback_bind() {
    let cfg = InspectConfig {
        enabled: true,
        bind_addr: IpAddr::V4(Ipv4Addr::new(10, 0, 0, 8)),
        port: 15714,
        auth_token: Some("0123456789abcdef".to_string()),
    };
    assert!(matches!(
        cfg.validate(),
        Err(ConfigError::NonLoopbackInspect(_))
    ));
}
