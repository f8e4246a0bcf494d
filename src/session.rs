//! The client-side session state machine.
//!
//! One task owns both sockets of one player for the whole session. The
//! stages here take the connection from TCP accept through Handshake,
//! Status or Login, and hand a fully authenticated player over to the
//! switch module, which owns bridging and backend churn from then on.

use crate::{
    auth::{self, AuthError, GameProfile},
    backend::{self, BackendError, BackendHandle},
    connection::Connection,
    context::ProxyContext,
    crypto,
    error::ProxyError,
    events::{PreConnectDecision, PreLoginDecision},
    protocol::{
        codec::{CompressionThreshold, EncryptionKey},
        packet::{
            client,
            client::handshake::{Handshake, NextState},
            client::login::PlayerKey,
            server,
            server::login::{EncryptionRequest, LoginSuccess, SetCompression},
            side, state, Component,
        },
        ProtocolVersion,
    },
    router::Router,
    switch,
};
use anyhow::{anyhow, bail, Context as _};
use rsa::{pkcs8::DecodePublicKey, Pkcs1v15Sign, RsaPublicKey};
use sha2::{Digest as _, Sha256};
use std::{net::SocketAddr, sync::Arc};
use tokio::{net::TcpStream, time::timeout};

/// Everything later stages need to know about an authenticated player.
#[derive(Debug, Clone)]
pub struct Player {
    pub profile: GameProfile,
    pub version: ProtocolVersion,
    /// The hostname exactly as dialed (used in backend handshakes).
    pub raw_vhost: String,
    /// Normalized hostname (the router key).
    pub vhost: String,
    pub remote_addr: SocketAddr,
    pub key: Option<PlayerKey>,
    /// Arrived via a 1.20.5+ transfer rather than a direct join.
    pub transferred: bool,
}

/// Entry point for one accepted socket. Never panics; everything is
/// logged against the peer address.
pub async fn handle_connection(ctx: Arc<ProxyContext>, stream: TcpStream) {
    let peer = stream
        .peer_addr()
        .map(|addr| addr.to_string())
        .unwrap_or_else(|_| "<unknown>".to_owned());
    if let Err(error) = run(ctx, stream).await {
        tracing::info!(%peer, "connection lost: {error:#}");
    }
}

async fn run(ctx: Arc<ProxyContext>, stream: TcpStream) -> anyhow::Result<()> {
    let client: Connection<side::Server, state::Handshake> =
        Connection::new(stream, ctx.registry.clone())?;
    let remote_addr = client.peer_addr();

    let handshake = match timeout(ctx.config.state_timeout(), client.recv_packet()).await {
        Ok(result) => {
            let client::handshake::Packet::Handshake(handshake) = result?;
            handshake
        }
        Err(_) => return Err(ProxyError::Timeout("handshake").into()),
    };

    let vhost = Router::clean_vhost(&handshake.server_address);
    tracing::debug!(
        %remote_addr,
        protocol = handshake.protocol_version,
        vhost = %vhost,
        next = ?handshake.next_state,
        "handshake received"
    );

    match handshake.next_state {
        NextState::Status => {
            let stage = StatusStage {
                client: client.switch_state(),
                vhost,
                requested_protocol: handshake.protocol_version,
            };
            stage.run(&ctx).await
        }
        NextState::Login | NextState::Transfer => {
            let mut client = client;
            let version = match ProtocolVersion::from_wire(handshake.protocol_version) {
                Some(version) => version,
                None => {
                    // encode the refusal at the newest revision we speak;
                    // the login disconnect layout is stable enough to land
                    client.set_version(ProtocolVersion::MAXIMUM);
                    let client = client.switch_state::<state::Login>();
                    kick_login(
                        &client,
                        Component::plain(format!(
                            "Unsupported client version (protocol {})",
                            handshake.protocol_version
                        )),
                    )
                    .await;
                    return Ok(());
                }
            };
            client.set_version(version);

            let stage = LoginStage {
                client: client.switch_state(),
                version,
                remote_addr,
                raw_vhost: handshake.server_address,
                vhost,
                transferred: handshake.next_state == NextState::Transfer,
            };
            stage.run(&ctx).await
        }
    }
}

async fn kick_login(client: &Connection<side::Server, state::Login>, reason: Component) {
    client
        .send_packet(&server::login::Packet::Disconnect(
            server::login::Disconnect { reason },
        ))
        .await
        .ok();
    client.shutdown().await;
}

struct StatusStage {
    client: Connection<side::Server, state::Status>,
    vhost: String,
    requested_protocol: i32,
}

impl StatusStage {
    async fn run(self, ctx: &ProxyContext) -> anyhow::Result<()> {
        let deadline = ctx.config.state_timeout();
        loop {
            let packet = match timeout(deadline, self.client.recv_packet()).await {
                Ok(packet) => packet?,
                Err(_) => return Err(ProxyError::Timeout("status").into()),
            };
            match packet {
                client::status::Packet::StatusRequest => {
                    let json = self.response_json(ctx).await;
                    self.client
                        .send_packet(&server::status::Packet::StatusResponse(
                            server::status::StatusResponse { json },
                        ))
                        .await?;
                }
                client::status::Packet::Ping(ping) => {
                    self.client
                        .send_packet(&server::status::Packet::Pong(server::status::Pong {
                            payload: ping.payload,
                        }))
                        .await?;
                    self.client.shutdown().await;
                    return Ok(());
                }
            }
        }
    }

    async fn response_json(&self, ctx: &ProxyContext) -> String {
        if ctx.config.ping_passthrough == crate::config::PingPassthrough::All {
            if let Some(json) = self.passthrough(ctx).await {
                return json;
            }
        }
        self.synthesize(ctx).await
    }

    /// Relays the status request to the server this vhost would land on.
    async fn passthrough(&self, ctx: &ProxyContext) -> Option<String> {
        let status = ctx.status_snapshot().await;
        let candidates = ctx.router.candidates(&self.vhost, &status);
        let target = candidates.first()?;
        let entry = ctx.router.server(target)?;

        let result: anyhow::Result<String> = async {
            let mut connection: Connection<side::Client, state::Handshake> =
                Connection::connect(
                    &entry.address,
                    ctx.config.connect_timeout(),
                    ctx.registry.clone(),
                )
                .await?;
            connection.set_version(
                ProtocolVersion::from_wire(self.requested_protocol)
                    .unwrap_or(ProtocolVersion::MAXIMUM),
            );
            let port = entry
                .address
                .rsplit(':')
                .next()
                .and_then(|p| p.parse().ok())
                .unwrap_or(25565);
            connection
                .send_packet(&client::handshake::Packet::Handshake(Handshake {
                    protocol_version: self.requested_protocol,
                    server_address: self.vhost.clone(),
                    server_port: port,
                    next_state: NextState::Status,
                }))
                .await?;
            let connection = connection.switch_state::<state::Status>();
            connection
                .send_packet(&client::status::Packet::StatusRequest)
                .await?;
            match timeout(ctx.config.state_timeout(), connection.recv_packet()).await?? {
                server::status::Packet::StatusResponse(response) => Ok(response.json),
                other => bail!("expected status response, got {}", other.as_ref()),
            }
        }
        .await;

        match result {
            Ok(json) => Some(json),
            Err(error) => {
                tracing::debug!(server = %target, "ping passthrough failed: {error:#}");
                None
            }
        }
    }

    async fn synthesize(&self, ctx: &ProxyContext) -> String {
        // echo a known client protocol so the client shows "compatible";
        // unknown clients see the newest supported revision
        let (name, protocol) = match ProtocolVersion::from_wire(self.requested_protocol) {
            Some(version) => (version.name(), version.wire()),
            None => (
                ProtocolVersion::MAXIMUM.name(),
                ProtocolVersion::MAXIMUM.wire(),
            ),
        };
        serde_json::json!({
            "version": { "name": name, "protocol": protocol },
            "players": {
                "max": ctx.config.show_max_players,
                "online": ctx.total_players().await,
                "sample": [],
            },
            "description": { "text": ctx.config.motd },
        })
        .to_string()
    }
}

struct LoginStage {
    client: Connection<side::Server, state::Login>,
    version: ProtocolVersion,
    remote_addr: SocketAddr,
    raw_vhost: String,
    vhost: String,
    transferred: bool,
}

impl LoginStage {
    /// Closes the connection with the taxonomy's kick text, then returns
    /// the error for the session log.
    async fn fail(&self, error: ProxyError) -> anyhow::Error {
        kick_login(&self.client, error.kick_component()).await;
        error.into()
    }

    async fn run(mut self, ctx: &Arc<ProxyContext>) -> anyhow::Result<()> {
        let deadline = ctx.config.state_timeout();

        let start = match timeout(deadline, self.client.recv_packet()).await {
            Ok(packet) => match packet? {
                client::login::Packet::LoginStart(start) => start,
                other => {
                    return Err(self
                        .fail(ProxyError::protocol(anyhow!(
                            "expected LoginStart, got {}",
                            other.as_ref()
                        )))
                        .await)
                }
            },
            Err(_) => return Err(self.fail(ProxyError::Timeout("login")).await),
        };

        match ctx.events.pre_login(&start.name, self.remote_addr) {
            PreLoginDecision::Allow => {}
            PreLoginDecision::Deny(reason) => {
                kick_login(&self.client, reason).await;
                return Ok(());
            }
        }

        // 1.19–1.19.2 clients must present a signing key when the proxy
        // enforces key authentication in online mode.
        let key_window =
            (ProtocolVersion::V1_19..ProtocolVersion::V1_19_3).contains(&self.version);
        if key_window
            && ctx.config.online_mode
            && ctx.config.advanced.force_key_authentication
            && start.key.is_none()
        {
            kick_login(
                &self.client,
                Component::plain("A valid chat signing key is required to log in."),
            )
            .await;
            return Ok(());
        }

        let profile = if ctx.config.online_mode {
            match self.authenticate_online(ctx, &start).await {
                Ok(profile) => profile,
                Err(error) => {
                    tracing::warn!(
                        name = %start.name,
                        peer = %self.remote_addr,
                        "online login failed: {error:#}"
                    );
                    kick_login(&self.client, ProxyError::crypto(error).kick_component()).await;
                    return Ok(());
                }
            }
        } else {
            GameProfile::offline(&start.name)
        };

        let profile = ctx.events.game_profile_request(profile);

        // compression goes live only after the SetCompression packet has
        // been written, never for 1.7 clients, never when disabled
        let threshold = ctx.config.advanced.compression_threshold;
        if threshold >= 0 && self.version >= ProtocolVersion::V1_8 {
            self.client
                .send_packet(&server::login::Packet::SetCompression(SetCompression {
                    threshold,
                }))
                .await?;
            self.client
                .enable_compression(CompressionThreshold::new(threshold as usize));
        }

        self.client
            .send_packet(&server::login::Packet::LoginSuccess(LoginSuccess {
                uuid: profile.uuid,
                username: profile.name.clone(),
                properties: profile.properties.clone(),
            }))
            .await?;

        tracing::info!(
            name = %profile.name,
            uuid = %profile.uuid,
            peer = %self.remote_addr,
            version = %self.version,
            "player logged in"
        );

        if self.version >= ProtocolVersion::V1_20_2 {
            match timeout(deadline, self.client.recv_packet()).await {
                Ok(packet) => match packet? {
                    client::login::Packet::LoginAcknowledged => {}
                    other => {
                        return Err(self
                            .fail(ProxyError::protocol(anyhow!(
                                "expected LoginAcknowledged, got {}",
                                other.as_ref()
                            )))
                            .await)
                    }
                },
                Err(_) => {
                    return Err(self.fail(ProxyError::Timeout("login acknowledge")).await)
                }
            }
        }

        let player = Player {
            profile,
            version: self.version,
            raw_vhost: self.raw_vhost,
            vhost: self.vhost,
            remote_addr: self.remote_addr,
            key: start.key,
            transferred: self.transferred,
        };

        let (server_name, handle) = match choose_and_connect(ctx, &player, None).await {
            Ok(connected) => connected,
            Err(last_reason) => {
                let reason = last_reason
                    .unwrap_or_else(|| ProxyError::NoAvailableServers.kick_component());
                kick_login(&self.client, reason).await;
                return Ok(());
            }
        };

        let client = self.client;
        match handle {
            BackendHandle::Config(backend_conn) => {
                switch::run(
                    ctx,
                    player,
                    server_name,
                    switch::ClientHandle::Config(client.switch_state()),
                    BackendHandle::Config(backend_conn),
                )
                .await
            }
            BackendHandle::Play(backend_conn) => {
                switch::run(
                    ctx,
                    player,
                    server_name,
                    switch::ClientHandle::Play(client.switch_state()),
                    BackendHandle::Play(backend_conn),
                )
                .await
            }
        }
    }

    async fn authenticate_online(
        &mut self,
        ctx: &ProxyContext,
        start: &client::login::LoginStart,
    ) -> anyhow::Result<GameProfile> {
        let token = crypto::generate_verify_token();
        self.client
            .send_packet(&server::login::Packet::EncryptionRequest(
                EncryptionRequest {
                    server_id: String::new(),
                    public_key: ctx.keypair.public_key_der().to_vec(),
                    verify_token: token.to_vec(),
                    should_authenticate: true,
                },
            ))
            .await?;

        let response = match timeout(ctx.config.state_timeout(), self.client.recv_packet()).await
        {
            Ok(packet) => match packet? {
                client::login::Packet::EncryptionResponse(response) => response,
                other => bail!("expected EncryptionResponse, got {}", other.as_ref()),
            },
            Err(_) => return Err(ProxyError::Timeout("encryption").into()),
        };

        let shared_secret = ctx.keypair.decrypt(&response.shared_secret)?;
        let secret: [u8; 16] = shared_secret
            .as_slice()
            .try_into()
            .map_err(|_| anyhow!("shared secret must be 16 bytes"))?;

        match &response.salt_signature {
            None => {
                let echoed = ctx.keypair.decrypt(&response.verify_token)?;
                if !crypto::constant_time_eq(&echoed, &token) {
                    bail!("verify token mismatch");
                }
            }
            Some((salt, signature)) => {
                // 1.19–1.19.2 signed alternative: the client signs
                // token || salt with its session key
                let key = start
                    .key
                    .as_ref()
                    .context("salted signature without a published key")?;
                let public_key = RsaPublicKey::from_public_key_der(&key.public_key)
                    .context("malformed player public key")?;
                let mut signed = token.to_vec();
                signed.extend_from_slice(&salt.to_be_bytes());
                let digest = Sha256::digest(&signed);
                public_key
                    .verify(Pkcs1v15Sign::new::<Sha256>(), &digest, signature)
                    .context("bad login signature")?;
            }
        }

        // the cipher covers everything after the response that carried it
        self.client.enable_encryption(EncryptionKey::new(secret));

        let hash = auth::server_hash("", &secret, ctx.keypair.public_key_der());
        match ctx
            .authenticator
            .authenticate(&start.name, &hash, Some(self.remote_addr.ip()))
            .await
        {
            Ok(profile) => Ok(profile),
            Err(AuthError::Unauthorized) => bail!("session servers rejected the login"),
            Err(AuthError::Unavailable(error)) => {
                Err(error.context("session servers unavailable"))
            }
        }
    }
}

/// Walks the candidate list, returning the first backend that accepts the
/// player. `skip_until_after` implements failover's "start after the dead
/// candidate" rule. On total failure, carries the last backend-supplied
/// kick reason if any.
pub async fn choose_and_connect(
    ctx: &ProxyContext,
    player: &Player,
    skip_until_after: Option<&str>,
) -> Result<(String, BackendHandle), Option<Component>> {
    let status = ctx.status_snapshot().await;
    let mut candidates = ctx.router.candidates(&player.vhost, &status);
    match skip_until_after {
        None => {
            candidates = ctx
                .events
                .player_choose_initial_server(&player.profile, candidates);
        }
        Some(dead) => {
            if let Some(position) = candidates.iter().position(|name| name == dead) {
                candidates.drain(..=position);
            }
        }
    }

    let mut last_reason = None;
    for candidate in candidates {
        let target = match ctx.events.server_pre_connect(&player.profile, &candidate) {
            PreConnectDecision::Allow => candidate,
            PreConnectDecision::Deny(reason) => {
                last_reason = Some(reason);
                continue;
            }
            PreConnectDecision::Reroute(other) => other,
        };

        match backend::connect(ctx, &target, player).await {
            Ok(handle) => {
                ctx.mark_reachable(&target, true).await;
                return Ok((target, handle));
            }
            Err(BackendError::Unreachable(error)) => {
                tracing::warn!(
                    server = %target,
                    player = %player.profile.name,
                    "backend unreachable: {error:#}"
                );
                ctx.mark_reachable(&target, false).await;
            }
            Err(BackendError::Kicked(reason)) => {
                tracing::warn!(
                    server = %target,
                    player = %player.profile.name,
                    "backend rejected login: {}",
                    reason.text()
                );
                last_reason = Some(reason);
            }
            Err(error) => {
                tracing::warn!(
                    server = %target,
                    player = %player.profile.name,
                    "backend connection failed: {error:#}"
                );
            }
        }
    }

    Err(last_reason)
}
