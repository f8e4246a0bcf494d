//! Dialing and logging into backend servers.
//!
//! The backend side of a player is driven here from TCP connect up to the
//! moment the backend reaches the Configuration (1.20.2+) or Play state,
//! with the selected identity-forwarding scheme applied along the way.
//! Everything after that is bridging, owned by the session.

use crate::{
    config::ForwardingMode,
    connection::{is_network_error, Connection},
    context::ProxyContext,
    forward,
    protocol::{
        codec::CompressionThreshold,
        packet::{
            client::{
                handshake::{Handshake, NextState},
                login::{LoginPluginResponse, LoginStart},
            },
            client, server, side, state, Component,
        },
        ProtocolVersion,
    },
    session::Player,
};
use anyhow::anyhow;

/// A backend connection that has completed login. On 1.20.2+ the backend
/// sits in the Configuration state waiting to stream registry data; on
/// older versions it proceeds straight to Play.
pub enum BackendHandle {
    Config(Connection<side::Client, state::Configuration>),
    Play(Connection<side::Client, state::Play>),
}

#[derive(Debug, thiserror::Error)]
pub enum BackendError {
    /// Connect refused, reset, or timed out: the candidate walk continues.
    #[error("backend unreachable: {0}")]
    Unreachable(#[source] anyhow::Error),
    /// The backend refused the login. Carries the kick reason.
    #[error("backend rejected login: {}", .0.text())]
    Kicked(Component),
    /// The backend requested online-mode encryption, which a proxied
    /// backend must never do.
    #[error("backend requested encryption; backends behind the proxy must be offline-mode")]
    OnlineModeBackend,
    #[error("backend protocol error: {0}")]
    Protocol(#[source] anyhow::Error),
}

fn classify(error: anyhow::Error) -> BackendError {
    if is_network_error(&error) {
        BackendError::Unreachable(error)
    } else {
        BackendError::Protocol(error)
    }
}

/// Connects to `server_name` and drives its login to completion on behalf
/// of `player`.
pub async fn connect(
    ctx: &ProxyContext,
    server_name: &str,
    player: &Player,
) -> Result<BackendHandle, BackendError> {
    let entry = ctx
        .router
        .server(server_name)
        .ok_or_else(|| BackendError::Unreachable(anyhow!("no such server '{server_name}'")))?;
    let mode = ctx.config.forwarding_mode_for(server_name);

    let mut connection: Connection<side::Client, state::Handshake> = Connection::connect(
        &entry.address,
        ctx.config.connect_timeout(),
        ctx.registry.clone(),
    )
    .await
    .map_err(BackendError::Unreachable)?;
    connection.set_version(player.version);

    let result = tokio::time::timeout(
        ctx.config.state_timeout(),
        drive_login(ctx, connection, mode, player, &entry.address),
    )
    .await;
    match result {
        Ok(outcome) => outcome,
        Err(elapsed) => Err(BackendError::Unreachable(elapsed.into())),
    }
}

async fn drive_login(
    ctx: &ProxyContext,
    connection: Connection<side::Client, state::Handshake>,
    mode: ForwardingMode,
    player: &Player,
    address: &str,
) -> Result<BackendHandle, BackendError> {
    let server_port = address
        .rsplit(':')
        .next()
        .and_then(|port| port.parse().ok())
        .unwrap_or(25565);

    let server_address = match mode {
        ForwardingMode::Legacy => forward::legacy_handshake_address(
            &player.raw_vhost,
            player.remote_addr.ip(),
            &player.profile,
            None,
        ),
        ForwardingMode::BungeeGuard => forward::legacy_handshake_address(
            &player.raw_vhost,
            player.remote_addr.ip(),
            &player.profile,
            Some(&ctx.config.forwarding.secret),
        ),
        ForwardingMode::None | ForwardingMode::Modern => player.raw_vhost.clone(),
    };

    connection
        .send_packet(&client::handshake::Packet::Handshake(Handshake {
            protocol_version: player.version.wire(),
            server_address,
            server_port,
            next_state: NextState::Login,
        }))
        .await
        .map_err(classify)?;

    let mut connection = connection.switch_state::<state::Login>();
    connection
        .send_packet(&client::login::Packet::LoginStart(LoginStart {
            name: player.profile.name.clone(),
            uuid: Some(player.profile.uuid),
            key: player.key.clone(),
        }))
        .await
        .map_err(classify)?;

    loop {
        let packet = connection.recv_packet().await.map_err(classify)?;
        match packet {
            server::login::Packet::Disconnect(disconnect) => {
                return Err(BackendError::Kicked(disconnect.reason));
            }
            server::login::Packet::EncryptionRequest(_) => {
                return Err(BackendError::OnlineModeBackend);
            }
            server::login::Packet::SetCompression(compression) => {
                if compression.threshold >= 0 {
                    connection
                        .enable_compression(CompressionThreshold::new(compression.threshold as usize));
                }
            }
            server::login::Packet::LoginPluginRequest(request) => {
                let response = answer_plugin_request(ctx, mode, player, &request);
                connection
                    .send_packet(&client::login::Packet::LoginPluginResponse(response))
                    .await
                    .map_err(classify)?;
            }
            server::login::Packet::LoginSuccess(_) => break,
        }
    }

    if player.version >= ProtocolVersion::V1_20_2 {
        connection
            .send_packet(&client::login::Packet::LoginAcknowledged)
            .await
            .map_err(classify)?;
        Ok(BackendHandle::Config(connection.switch_state()))
    } else {
        Ok(BackendHandle::Play(connection.switch_state()))
    }
}

fn answer_plugin_request(
    ctx: &ProxyContext,
    mode: ForwardingMode,
    player: &Player,
    request: &server::login::LoginPluginRequest,
) -> LoginPluginResponse {
    if mode == ForwardingMode::Modern && request.channel == forward::MODERN_CHANNEL {
        let version = forward::choose_modern_version(&request.data, player.key.as_ref());
        let data = forward::build_modern_response(
            ctx.config.forwarding.secret.as_bytes(),
            version,
            player.remote_addr.ip(),
            &player.profile,
            player.key.as_ref(),
        );
        LoginPluginResponse {
            message_id: request.message_id,
            successful: true,
            data,
        }
    } else {
        // unknown negotiation; tell the backend we cannot help
        LoginPluginResponse {
            message_id: request.message_id,
            successful: false,
            data: Vec::new(),
        }
    }
}
