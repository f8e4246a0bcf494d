//! Bridged play and the live server switch.
//!
//! Once login completes the session enters this module and never leaves:
//! it alternates between Configuration and Play bridging, absorbs backend
//! kicks and deaths, and re-attaches replacement backends without the
//! client ever losing its socket.

use crate::{
    backend::{self, BackendError, BackendHandle},
    bridge::{Bridge, BridgeError, Endpoint, Intercept, Verdict},
    connection::Connection,
    context::{ProxyContext, SwitchOutcome, SwitchRequest},
    error::ProxyError,
    events::{KickDecision, PreConnectDecision},
    protocol::{
        packet::{
            client,
            common::{ClientSettings, PluginMessage},
            server,
            server::play::{JoinGame, Respawn},
            side, state, Component,
        },
        ProtocolVersion,
    },
    session::{choose_and_connect, Player},
};
use anyhow::bail;
use std::{
    collections::{BTreeSet, VecDeque},
    sync::Arc,
};
use tokio::{
    sync::{mpsc, oneshot},
    time::timeout,
};

/// How many backend packets may pile up while waiting for its JoinGame.
const JOIN_BUFFER_LIMIT: usize = 256;
/// Upper bound on outstanding keep-alive ids tracked per backend.
const KEEPALIVE_WINDOW: usize = 64;

/// The client connection as the session hands it over: already in the
/// Configuration state on 1.20.2+, directly in Play before that.
pub enum ClientHandle {
    Config(Connection<side::Server, state::Configuration>),
    Play(Connection<side::Server, state::Play>),
}

/// Session-scoped bridging state that survives backend churn.
struct SessionState {
    version: ProtocolVersion,
    /// Latest client settings, replayed into fresh backends.
    settings: Option<ClientSettings>,
    /// Plugin channels the client registered, replayed likewise.
    channels: BTreeSet<String>,
    /// Keep-alive ids the current backend has in flight. Responses that
    /// match nothing here belong to a dead backend and are dropped.
    pending_keepalives: VecDeque<i64>,
    enforce_signing: bool,
    has_key: bool,
}

impl SessionState {
    fn new(ctx: &ProxyContext, player: &Player) -> Self {
        SessionState {
            version: player.version,
            settings: None,
            channels: BTreeSet::new(),
            pending_keepalives: VecDeque::new(),
            enforce_signing: ctx.config.advanced.force_key_authentication,
            has_key: player.key.is_some(),
        }
    }

    fn register_channels(&mut self, payload: &[u8]) {
        for channel in payload.split(|&b| b == 0) {
            if channel.is_empty() {
                continue;
            }
            if let Ok(name) = std::str::from_utf8(channel) {
                self.channels.insert(name.to_owned());
            }
        }
    }

    fn registration_message(&self) -> Option<PluginMessage> {
        if self.channels.is_empty() {
            return None;
        }
        let channel = if self.version >= ProtocolVersion::V1_13 {
            "minecraft:register"
        } else {
            "REGISTER"
        };
        let data = self
            .channels
            .iter()
            .map(String::as_bytes)
            .collect::<Vec<_>>()
            .join(&0u8);
        Some(PluginMessage {
            channel: channel.to_owned(),
            data,
        })
    }

    fn chat_requires_key(&self) -> bool {
        self.enforce_signing
            && !self.has_key
            && (ProtocolVersion::V1_19..ProtocolVersion::V1_19_3).contains(&self.version)
    }
}

enum ConfigBreak {
    /// The client acknowledged the end of configuration.
    Finished,
    Kicked(Component),
}

struct ConfigIntercept<'a> {
    state: &'a mut SessionState,
}

impl Intercept<state::Configuration> for ConfigIntercept<'_> {
    type Break = ConfigBreak;

    fn client_packet(
        &mut self,
        packet: &mut client::configuration::Packet,
    ) -> Verdict<ConfigBreak> {
        match packet {
            client::configuration::Packet::ClientSettings(settings) => {
                self.state.settings = Some(settings.clone());
                Verdict::Forward
            }
            client::configuration::Packet::PluginMessage(message) => {
                if message.is_channel_registration() {
                    self.state.register_channels(&message.data);
                }
                Verdict::Forward
            }
            client::configuration::Packet::FinishConfiguration => {
                Verdict::BreakAfterForward(ConfigBreak::Finished)
            }
            _ => Verdict::Forward,
        }
    }

    fn server_packet(
        &mut self,
        packet: &mut server::configuration::Packet,
    ) -> Verdict<ConfigBreak> {
        match packet {
            server::configuration::Packet::Disconnect(disconnect) => {
                Verdict::Break(ConfigBreak::Kicked(disconnect.reason.clone()))
            }
            _ => Verdict::Forward,
        }
    }
}

enum PlayBreak {
    BackendKicked(Component),
    /// The backend started a configuration re-entry and the client
    /// acknowledged it; both sides move back to the Configuration state.
    Reconfigure,
    ChatWithoutKey,
    /// A caller asked for a voluntary switch while both sides are alive.
    SwitchRequested(SwitchRequest),
}

struct PlayIntercept<'a> {
    state: &'a mut SessionState,
}

impl Intercept<state::Play> for PlayIntercept<'_> {
    type Break = PlayBreak;

    fn client_packet(&mut self, packet: &mut client::play::Packet) -> Verdict<PlayBreak> {
        match packet {
            client::play::Packet::KeepAlive(keep_alive) => {
                // answers for a previous backend's pings must not reach
                // the current one
                match self
                    .state
                    .pending_keepalives
                    .iter()
                    .position(|&id| id == keep_alive.id)
                {
                    Some(position) => {
                        self.state.pending_keepalives.drain(..=position);
                        Verdict::Forward
                    }
                    None => Verdict::Discard,
                }
            }
            client::play::Packet::ClientSettings(settings) => {
                self.state.settings = Some(settings.clone());
                Verdict::Forward
            }
            client::play::Packet::PluginMessage(message) => {
                if message.is_channel_registration() {
                    self.state.register_channels(&message.data);
                }
                Verdict::Forward
            }
            client::play::Packet::ChatMessage(_) | client::play::Packet::ChatCommand(_) => {
                if self.state.chat_requires_key() {
                    Verdict::Break(PlayBreak::ChatWithoutKey)
                } else {
                    Verdict::Forward
                }
            }
            client::play::Packet::AcknowledgeConfiguration => {
                Verdict::BreakAfterForward(PlayBreak::Reconfigure)
            }
            client::play::Packet::Opaque(_) => Verdict::Forward,
        }
    }

    fn server_packet(&mut self, packet: &mut server::play::Packet) -> Verdict<PlayBreak> {
        match packet {
            server::play::Packet::KeepAlive(keep_alive) => {
                self.state.pending_keepalives.push_back(keep_alive.id);
                if self.state.pending_keepalives.len() > KEEPALIVE_WINDOW {
                    self.state.pending_keepalives.pop_front();
                }
                Verdict::Forward
            }
            server::play::Packet::Disconnect(disconnect) => {
                Verdict::Break(PlayBreak::BackendKicked(disconnect.reason.clone()))
            }
            _ => Verdict::Forward,
        }
    }

    fn switch_request(&mut self, request: SwitchRequest) -> Option<PlayBreak> {
        Some(PlayBreak::SwitchRequested(request))
    }
}

enum Phase {
    Config(
        Connection<side::Server, state::Configuration>,
        Connection<side::Client, state::Configuration>,
    ),
    Play(
        Connection<side::Server, state::Play>,
        Connection<side::Client, state::Play>,
    ),
}

/// Drives a logged-in player until the session ends.
///
/// The session is reachable for voluntary switches through
/// [`ProxyContext::request_switch`] for as long as it runs.
pub async fn run(
    ctx: &Arc<ProxyContext>,
    player: Player,
    server_name: String,
    client: ClientHandle,
    backend: BackendHandle,
) -> anyhow::Result<()> {
    let (requests_tx, mut requests_rx) = mpsc::unbounded_channel();
    ctx.register_session(player.profile.uuid, requests_tx.clone())
        .await;
    let result = drive(ctx, &player, server_name, client, backend, &mut requests_rx).await;
    ctx.unregister_session(player.profile.uuid, &requests_tx)
        .await;
    result
}

async fn drive(
    ctx: &Arc<ProxyContext>,
    player: &Player,
    mut server_name: String,
    client: ClientHandle,
    backend: BackendHandle,
    requests: &mut mpsc::UnboundedReceiver<SwitchRequest>,
) -> anyhow::Result<()> {
    let mut state = SessionState::new(ctx, player);
    let mut on_server: Option<String> = None;
    let write_timeout = ctx.config.write_timeout();

    let mut phase = match (client, backend) {
        (ClientHandle::Config(client), BackendHandle::Config(backend)) => {
            Phase::Config(client, backend)
        }
        (ClientHandle::Play(client), BackendHandle::Play(backend)) => {
            // pre-1.20.2: the very first JoinGame is forwarded untouched
            if let Err(error) = attach_play(ctx, &client, &backend, &mut state, true).await {
                kick_play(
                    &client,
                    Component::plain("Connection to the server was lost"),
                )
                .await;
                return Err(error);
            }
            join_server(ctx, &mut on_server, &server_name).await;
            Phase::Play(client, backend)
        }
        _ => bail!("client and backend arrived in different protocol states"),
    };

    loop {
        match phase {
            Phase::Config(client, backend) => {
                let mut bridge = Bridge::new(client, backend, write_timeout);
                // switch requests stay queued until the session is back
                // in Play; a mid-configuration player has no world to be
                // switched out of
                let outcome = bridge
                    .run(&mut ConfigIntercept { state: &mut state }, None)
                    .await;
                let (client, backend) = bridge.into_parts();

                match outcome {
                    Ok(ConfigBreak::Finished) => {
                        join_server(ctx, &mut on_server, &server_name).await;
                        phase = Phase::Play(client.switch_state(), backend.switch_state());
                    }
                    Ok(ConfigBreak::Kicked(reason)) => {
                        drop(backend);
                        leave_server(ctx, &mut on_server).await;
                        match resolve_kick(ctx, player, &server_name, Some(&reason), false) {
                            KickDecision::Disconnect => {
                                kick_config(&client, reason).await;
                                return Ok(());
                            }
                            decision => {
                                match reconnect(ctx, player, &server_name, decision).await {
                                    Ok((name, BackendHandle::Config(new_backend))) => {
                                        server_name = name;
                                        phase = Phase::Config(client, new_backend);
                                    }
                                    Ok((_, BackendHandle::Play(_))) => {
                                        bail!("replacement backend skipped configuration")
                                    }
                                    Err(last_reason) => {
                                        kick_config(
                                            &client,
                                            last_reason.unwrap_or_else(|| {
                                                ProxyError::NoAvailableServers.kick_component()
                                            }),
                                        )
                                        .await;
                                        return Ok(());
                                    }
                                }
                            }
                        }
                    }
                    Err(BridgeError {
                        endpoint: Endpoint::Client,
                        source,
                    }) => {
                        leave_server(ctx, &mut on_server).await;
                        return Err(source);
                    }
                    Err(BridgeError {
                        endpoint: Endpoint::Backend,
                        source,
                    }) => {
                        drop(backend);
                        leave_server(ctx, &mut on_server).await;
                        ctx.mark_reachable(&server_name, false).await;
                        tracing::warn!(
                            server = %server_name,
                            player = %player.profile.name,
                            "backend lost during configuration: {source:#}"
                        );
                        match reconnect(ctx, player, &server_name, KickDecision::Fallback).await
                        {
                            Ok((name, BackendHandle::Config(new_backend))) => {
                                server_name = name;
                                phase = Phase::Config(client, new_backend);
                            }
                            Ok((_, BackendHandle::Play(_))) => {
                                bail!("replacement backend skipped configuration")
                            }
                            Err(last_reason) => {
                                kick_config(
                                    &client,
                                    last_reason.unwrap_or_else(|| {
                                        ProxyError::NoAvailableServers.kick_component()
                                    }),
                                )
                                .await;
                                return Ok(());
                            }
                        }
                    }
                }
            }

            Phase::Play(client, backend) => {
                let mut bridge = Bridge::new(client, backend, write_timeout);
                let outcome = bridge
                    .run(&mut PlayIntercept { state: &mut state }, Some(&mut *requests))
                    .await;
                let (client, backend) = bridge.into_parts();

                match outcome {
                    Ok(PlayBreak::Reconfigure) => {
                        phase = Phase::Config(client.switch_state(), backend.switch_state());
                    }
                    Ok(PlayBreak::SwitchRequested(request)) => {
                        phase = voluntary_switch(
                            ctx,
                            player,
                            &mut state,
                            &mut server_name,
                            &mut on_server,
                            client,
                            backend,
                            request,
                        )
                        .await?;
                    }
                    Ok(PlayBreak::ChatWithoutKey) => {
                        leave_server(ctx, &mut on_server).await;
                        kick_play(
                            &client,
                            Component::plain("Signed chat is required on this proxy."),
                        )
                        .await;
                        return Ok(());
                    }
                    Ok(PlayBreak::BackendKicked(reason)) => {
                        drop(backend);
                        leave_server(ctx, &mut on_server).await;
                        let decision =
                            resolve_kick(ctx, player, &server_name, Some(&reason), true);
                        match decision {
                            KickDecision::Disconnect => {
                                kick_play(&client, reason).await;
                                return Ok(());
                            }
                            decision => {
                                phase = match failover(
                                    ctx,
                                    player,
                                    &mut state,
                                    &mut server_name,
                                    &mut on_server,
                                    client,
                                    decision,
                                    Some(reason),
                                )
                                .await?
                                {
                                    Some(next) => next,
                                    None => return Ok(()),
                                };
                            }
                        }
                    }
                    Err(BridgeError {
                        endpoint: Endpoint::Client,
                        source,
                    }) => {
                        leave_server(ctx, &mut on_server).await;
                        return Err(source);
                    }
                    Err(BridgeError {
                        endpoint: Endpoint::Backend,
                        source,
                    }) => {
                        drop(backend);
                        leave_server(ctx, &mut on_server).await;
                        ctx.mark_reachable(&server_name, false).await;
                        tracing::warn!(
                            server = %server_name,
                            player = %player.profile.name,
                            "backend lost during play: {source:#}"
                        );
                        if !ctx
                            .config
                            .advanced
                            .failover_on_unexpected_server_disconnect
                        {
                            kick_play(
                                &client,
                                Component::plain("Connection to the server was lost"),
                            )
                            .await;
                            return Ok(());
                        }
                        phase = match failover(
                            ctx,
                            player,
                            &mut state,
                            &mut server_name,
                            &mut on_server,
                            client,
                            KickDecision::Fallback,
                            None,
                        )
                        .await?
                        {
                            Some(next) => next,
                            None => return Ok(()),
                        };
                    }
                }
            }
        }
    }
}

fn resolve_kick(
    ctx: &ProxyContext,
    player: &Player,
    server: &str,
    reason: Option<&Component>,
    during_play: bool,
) -> KickDecision {
    ctx.events
        .kicked_from_server(&player.profile, server, reason, during_play)
}

/// Finds a replacement backend per the kick decision.
async fn reconnect(
    ctx: &ProxyContext,
    player: &Player,
    dead_server: &str,
    decision: KickDecision,
) -> Result<(String, BackendHandle), Option<Component>> {
    match decision {
        KickDecision::Disconnect => unreachable!("handled by callers"),
        KickDecision::Reroute(target) => match backend::connect(ctx, &target, player).await {
            Ok(handle) => {
                ctx.mark_reachable(&target, true).await;
                Ok((target, handle))
            }
            Err(BackendError::Kicked(reason)) => Err(Some(reason)),
            Err(error) => {
                tracing::warn!(
                    server = %target,
                    player = %player.profile.name,
                    "reroute target failed: {error:#}"
                );
                Err(None)
            }
        },
        KickDecision::Fallback => choose_and_connect(ctx, player, Some(dead_server)).await,
    }
}

fn respond(ack: Option<oneshot::Sender<SwitchOutcome>>, outcome: SwitchOutcome) {
    if let Some(ack) = ack {
        ack.send(outcome).ok();
    }
}

/// A caller-initiated switch: the old backend is still healthy, so any
/// failure before the handoff leaves the player exactly where it was and
/// reports the switch as failed through the request's ack channel.
#[allow(clippy::too_many_arguments)]
async fn voluntary_switch(
    ctx: &Arc<ProxyContext>,
    player: &Player,
    state: &mut SessionState,
    server_name: &mut String,
    on_server: &mut Option<String>,
    client: Connection<side::Server, state::Play>,
    old_backend: Connection<side::Client, state::Play>,
    request: SwitchRequest,
) -> anyhow::Result<Phase> {
    let SwitchRequest { target, ack } = request;

    if target == *server_name {
        respond(
            ack,
            SwitchOutcome::Failed(format!("already connected to {target}")),
        );
        return Ok(Phase::Play(client, old_backend));
    }

    let target = match ctx.events.server_pre_connect(&player.profile, &target) {
        PreConnectDecision::Allow => target,
        PreConnectDecision::Deny(reason) => {
            respond(ack, SwitchOutcome::Failed(reason.text()));
            return Ok(Phase::Play(client, old_backend));
        }
        PreConnectDecision::Reroute(other) => other,
    };

    // the old backend stays attached while the replacement logs in; its
    // traffic simply queues until the outcome is known
    let handle = match backend::connect(ctx, &target, player).await {
        Ok(handle) => {
            ctx.mark_reachable(&target, true).await;
            handle
        }
        Err(error) => {
            tracing::warn!(
                server = %target,
                player = %player.profile.name,
                "switch target refused the player: {error:#}"
            );
            if matches!(error, BackendError::Unreachable(_)) {
                ctx.mark_reachable(&target, false).await;
            }
            respond(ack, SwitchOutcome::Failed(error.to_string()));
            return Ok(Phase::Play(client, old_backend));
        }
    };
    *server_name = target;

    match handle {
        BackendHandle::Play(new_backend) => {
            if let Err(error) = attach_play(ctx, &client, &new_backend, state, false).await {
                let error = ProxyError::SwitchAborted(error);
                respond(ack, SwitchOutcome::Failed(error.to_string()));
                kick_play(&client, error.kick_component()).await;
                return Err(error.into());
            }
            old_backend.shutdown().await;
            drop(old_backend);
            join_server(ctx, on_server, server_name).await;
            respond(ack, SwitchOutcome::Completed);
            Ok(Phase::Play(client, new_backend))
        }
        BackendHandle::Config(new_backend) => {
            // 1.20.2+: the client re-enters the configuration state for
            // the new backend's registries
            let client = match reenter_configuration(ctx, client, state).await {
                Ok(client) => client,
                Err(error) => {
                    respond(
                        ack,
                        SwitchOutcome::Failed("configuration re-entry failed".to_owned()),
                    );
                    return Err(error);
                }
            };
            old_backend.shutdown().await;
            drop(old_backend);
            respond(ack, SwitchOutcome::Completed);
            Ok(Phase::Config(client, new_backend))
        }
    }
}

/// Attaches a replacement backend to a client that is already in Play.
/// Returns the next phase, or `None` when the session ended (client was
/// kicked after every option failed).
#[allow(clippy::too_many_arguments)]
async fn failover(
    ctx: &Arc<ProxyContext>,
    player: &Player,
    state: &mut SessionState,
    server_name: &mut String,
    on_server: &mut Option<String>,
    client: Connection<side::Server, state::Play>,
    decision: KickDecision,
    original_reason: Option<Component>,
) -> anyhow::Result<Option<Phase>> {
    let (name, handle) = match reconnect(ctx, player, server_name, decision).await {
        Ok(connected) => connected,
        Err(last_reason) => {
            // the kick that started all this is still the most useful
            // thing to show when nobody else produced a reason
            kick_play(
                &client,
                last_reason
                    .or(original_reason)
                    .unwrap_or_else(|| ProxyError::NoAvailableServers.kick_component()),
            )
            .await;
            return Ok(None);
        }
    };
    *server_name = name;

    match handle {
        BackendHandle::Play(new_backend) => {
            if let Err(error) = attach_play(ctx, &client, &new_backend, state, false).await {
                let error = ProxyError::SwitchAborted(error);
                kick_play(&client, error.kick_component()).await;
                return Err(error.into());
            }
            join_server(ctx, on_server, server_name).await;
            Ok(Some(Phase::Play(client, new_backend)))
        }
        BackendHandle::Config(new_backend) => {
            // 1.20.2+: pull the client back into the configuration state
            // so the new backend can stream its registries
            let client = reenter_configuration(ctx, client, state).await?;
            Ok(Some(Phase::Config(client, new_backend)))
        }
    }
}

/// Waits for the new backend's JoinGame, then replays just enough state
/// for the client to believe the world merely changed.
async fn attach_play(
    ctx: &ProxyContext,
    client: &Connection<side::Server, state::Play>,
    backend: &Connection<side::Client, state::Play>,
    state: &mut SessionState,
    first_join: bool,
) -> anyhow::Result<()> {
    let deadline = ctx.config.state_timeout();
    let mut buffered = Vec::new();

    let join: JoinGame = loop {
        let packet = match timeout(deadline, backend.recv_packet()).await {
            Ok(packet) => packet?,
            Err(_) => return Err(ProxyError::Timeout("backend join").into()),
        };
        match packet {
            server::play::Packet::JoinGame(join) => break join,
            server::play::Packet::Disconnect(disconnect) => {
                bail!("backend disconnected before join: {}", disconnect.reason.text());
            }
            other => {
                if buffered.len() >= JOIN_BUFFER_LIMIT {
                    bail!("backend sent {JOIN_BUFFER_LIMIT} packets before JoinGame");
                }
                buffered.push(other);
            }
        }
    };

    if first_join {
        client
            .send_packet(&server::play::Packet::JoinGame(join.clone()))
            .await?;
    } else if state.version >= ProtocolVersion::V1_16 {
        // same-dimension respawn with a different world forces the client
        // to throw its world state away, then the second one lands it
        client
            .send_packet(&server::play::Packet::Respawn(Respawn::from_join_game(
                &join,
                state.version,
                true,
            )))
            .await?;
        client
            .send_packet(&server::play::Packet::Respawn(Respawn::from_join_game(
                &join,
                state.version,
                false,
            )))
            .await?;
    } else {
        let mut throwaway = join.clone();
        throwaway.dimension = join.flipped_dimension();
        client
            .send_packet(&server::play::Packet::JoinGame(throwaway))
            .await?;
        client
            .send_packet(&server::play::Packet::Respawn(Respawn::from_join_game(
                &join,
                state.version,
                false,
            )))
            .await?;
    }

    for packet in buffered {
        client.send_packet(&packet).await?;
    }

    if !first_join {
        if let Some(settings) = &state.settings {
            backend
                .send_packet(&client::play::Packet::ClientSettings(settings.clone()))
                .await?;
        }
        if let Some(registration) = state.registration_message() {
            backend
                .send_packet(&client::play::Packet::PluginMessage(registration))
                .await?;
        }
    }

    state.pending_keepalives.clear();
    Ok(())
}

/// Sends StartConfiguration and waits for the client's acknowledgement,
/// discarding in-flight play traffic that no longer has a destination.
async fn reenter_configuration(
    ctx: &ProxyContext,
    client: Connection<side::Server, state::Play>,
    state: &mut SessionState,
) -> anyhow::Result<Connection<side::Server, state::Configuration>> {
    client
        .send_packet(&server::play::Packet::StartConfiguration)
        .await?;

    let deadline = ctx.config.state_timeout();
    loop {
        let packet = match timeout(deadline, client.recv_packet()).await {
            Ok(packet) => packet?,
            Err(_) => return Err(ProxyError::Timeout("configuration re-entry").into()),
        };
        match packet {
            client::play::Packet::AcknowledgeConfiguration => break,
            other => {
                tracing::trace!("dropping {} during configuration re-entry", other.as_ref());
            }
        }
    }

    state.pending_keepalives.clear();
    Ok(client.switch_state())
}

async fn kick_play(client: &Connection<side::Server, state::Play>, reason: Component) {
    client
        .send_packet(&server::play::Packet::Disconnect(server::play::Disconnect {
            reason,
        }))
        .await
        .ok();
    client.shutdown().await;
}

async fn kick_config(
    client: &Connection<side::Server, state::Configuration>,
    reason: Component,
) {
    client
        .send_packet(&server::configuration::Packet::Disconnect(
            server::configuration::Disconnect { reason },
        ))
        .await
        .ok();
    client.shutdown().await;
}

async fn join_server(ctx: &ProxyContext, on_server: &mut Option<String>, name: &str) {
    if on_server.as_deref() == Some(name) {
        return;
    }
    if let Some(previous) = on_server.take() {
        ctx.player_left(&previous).await;
    }
    ctx.player_joined(name).await;
    *on_server = Some(name.to_owned());
    tracing::info!(server = %name, "player attached to backend");
}

async fn leave_server(ctx: &ProxyContext, on_server: &mut Option<String>) {
    if let Some(server) = on_server.take() {
        ctx.player_left(&server).await;
    }
}
