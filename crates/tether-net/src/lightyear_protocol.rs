use bevy::prelude::App;
use core::time::Duration;
use lightyear::prelude::{
    AppChannelExt, AppMessageExt, ChannelMode, ChannelSettings, NetworkDirection, ReliableSettings,
};

use crate::{AuthorityStateMessage, ClientInputMessage, ForcedCorrectionMessage};

#[derive(Debug)]
pub struct InputChannel;
#[derive(Debug)]
pub struct AuthorityChannel;
#[derive(Debug)]
pub struct CorrectionChannel;

/// Registers the movement messages and their channels.
///
/// Inputs and authority states are superseded every tick, so losing one is
/// cheaper than waiting for a resend. Corrections must land.
pub fn register_lightyear_protocol(app: &mut App) {
    app.register_message::<ClientInputMessage>()
        .add_direction(NetworkDirection::ClientToServer);
    app.register_message::<AuthorityStateMessage>()
        .add_direction(NetworkDirection::ServerToClient);
    app.register_message::<ForcedCorrectionMessage>()
        .add_direction(NetworkDirection::ServerToClient);

    app.add_channel::<InputChannel>(ChannelSettings {
        mode: ChannelMode::UnorderedUnreliable,
        send_frequency: Duration::default(),
        priority: 10.0,
    })
    .add_direction(NetworkDirection::ClientToServer);
    app.add_channel::<AuthorityChannel>(ChannelSettings {
        mode: ChannelMode::UnorderedUnreliable,
        send_frequency: Duration::default(),
        priority: 10.0,
    })
    .add_direction(NetworkDirection::ServerToClient);
    app.add_channel::<CorrectionChannel>(ChannelSettings {
        mode: ChannelMode::UnorderedReliable(ReliableSettings::default()),
        send_frequency: Duration::default(),
        priority: 8.0,
    })
    .add_direction(NetworkDirection::ServerToClient);
}
