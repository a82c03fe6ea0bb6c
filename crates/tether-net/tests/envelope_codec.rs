use bevy_math::{Quat, Vec3};
use tether_core::{EntityId, PROTOCOL_VERSION};
use tether_net::{
    AuthorityStateMessage, ChannelClass, ClientInputMessage, CorrectionReason,
    ForcedCorrectionMessage, NetEnvelope, WireMessage, decode_envelope_json, decode_wire_message,
    encode_envelope_json, encode_wire_message,
};
use tether_sim_core::{ActionState, AnimState, InputSample, MovementState};

#[test]
fn input_envelope_preserves_tick_and_movement() {
    let entity_id = EntityId::new_v4();
    let envelope = NetEnvelope::new(
        ChannelClass::Input,
        3,
        17,
        ClientInputMessage {
            entity_id,
            input: InputSample::new(17, Vec3::new(0.5, 0.0, -0.25)),
        },
    );

    let bytes = encode_envelope_json(&envelope).expect("encode should succeed");
    let decoded: NetEnvelope<ClientInputMessage> =
        decode_envelope_json(&bytes).expect("decode should succeed");

    assert_eq!(decoded.protocol_version, PROTOCOL_VERSION);
    assert_eq!(decoded.channel, ChannelClass::Input);
    assert_eq!(decoded.payload, envelope.payload);
}

#[test]
fn authority_state_carries_classification() {
    let state = MovementState {
        tick: 99,
        position: Vec3::new(1.0, 2.0, 3.0),
        rotation: Quat::from_rotation_y(0.5),
        velocity: Vec3::X * 5.0,
        action: ActionState::Move,
        anim: AnimState::Run,
    };
    let message = WireMessage::AuthorityState(AuthorityStateMessage {
        entity_id: EntityId::new_v4(),
        state,
    });

    let decoded = decode_wire_message(&encode_wire_message(&message).expect("encode"))
        .expect("decode");
    assert_eq!(decoded, message);
    assert_eq!(decoded.channel(), ChannelClass::Authority);
}

#[test]
fn wire_messages_are_tagged_by_kind() {
    let message = WireMessage::ForcedCorrection(ForcedCorrectionMessage::fixed_idle_at(
        EntityId::new_v4(),
        Vec3::ZERO,
        CorrectionReason::SpeedBound,
    ));
    let json: serde_json::Value =
        serde_json::from_slice(&encode_wire_message(&message).expect("encode")).expect("json");
    assert_eq!(json["kind"], "forced_correction");
    assert_eq!(json["payload"]["action"], "FixedIdle");
    assert_eq!(message.channel(), ChannelClass::Correction);
}
