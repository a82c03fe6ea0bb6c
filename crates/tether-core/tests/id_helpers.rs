use tether_core::{
    EntityId, MISPREDICTION_THRESHOLD_M, PROTOCOL_VERSION, SERVER_STATE_BUFFER_TICKS, SIM_TICK_HZ,
};

#[test]
fn entity_id_new_v4_is_not_nil() {
    let id = EntityId::new_v4();
    assert!(!id.is_nil());
}

#[test]
fn entity_id_new_v4_is_unique() {
    let a = EntityId::new_v4();
    let b = EntityId::new_v4();
    assert_ne!(a, b);
}

#[test]
fn entity_id_displays_without_hyphens() {
    let id = EntityId(uuid::Uuid::nil());
    assert_eq!(id.to_string(), "0".repeat(32));
}

#[test]
fn baseline_constants_match_design_defaults() {
    assert_eq!(PROTOCOL_VERSION, 1);
    assert_eq!(SIM_TICK_HZ, 60);
    assert_eq!(SERVER_STATE_BUFFER_TICKS, 1024);
    assert!((MISPREDICTION_THRESHOLD_M - 0.01).abs() < f32::EPSILON);
}
