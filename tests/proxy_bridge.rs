//! Full offline-mode session over real sockets: a fake backend accepts
//! the proxied login, the client ends up bridged in Play, keep-alives
//! flow both ways, and a backend kick reaches the client verbatim once
//! no fallback candidate remains.

use minecraft_relay::{
    auth::{offline_uuid, UnavailableAuthenticator},
    config::ProxyConfig,
    connection::Connection,
    context::{ProxyContext, SwitchOutcome},
    events::NullEventSink,
    listener::Listener,
    protocol::{
        codec::CompressionThreshold,
        packet::{
            client,
            client::handshake::{Handshake, NextState},
            common::{ClientSettings, KeepAlive},
            server,
            server::login::LoginSuccess,
            server::play::{Dimension, JoinGame},
            side, state, Component,
        },
        registry::PacketRegistry,
        ProtocolVersion,
    },
};
use std::{sync::Arc, time::Duration};
use tokio::{net::TcpListener as TokioListener, net::TcpStream, time::timeout};

const VERSION: ProtocolVersion = ProtocolVersion::V1_12_2;

fn registry() -> Arc<PacketRegistry> {
    Arc::new(PacketRegistry::build().unwrap())
}

/// Minimal offline backend: accepts the proxy's login, pushes the player
/// into Play, exchanges one keep-alive, then kicks.
async fn fake_backend(listener: TokioListener) {
    let (stream, _) = listener.accept().await.unwrap();
    let mut connection: Connection<side::Server, state::Handshake> =
        Connection::new(stream, registry()).unwrap();

    let client::handshake::Packet::Handshake(handshake) = connection.recv_packet().await.unwrap();
    assert_eq!(handshake.next_state, NextState::Login);
    assert_eq!(handshake.protocol_version, VERSION.wire());
    connection.set_version(VERSION);

    let connection = connection.switch_state::<state::Login>();
    let start = match connection.recv_packet().await.unwrap() {
        client::login::Packet::LoginStart(start) => start,
        other => panic!("expected LoginStart, got {}", other.as_ref()),
    };
    assert_eq!(start.name, "Notch");

    connection
        .send_packet(&server::login::Packet::LoginSuccess(LoginSuccess {
            uuid: offline_uuid(&start.name),
            username: start.name.clone(),
            properties: vec![],
        }))
        .await
        .unwrap();

    let connection = connection.switch_state::<state::Play>();
    connection
        .send_packet(&server::play::Packet::JoinGame(JoinGame {
            entity_id: 1,
            gamemode: 0,
            dimension: Dimension::Legacy(0),
            difficulty: 1,
            max_players: 20,
            level_type: Some("default".to_owned()),
            ..JoinGame::default()
        }))
        .await
        .unwrap();

    connection
        .send_packet(&server::play::Packet::KeepAlive(KeepAlive { id: 77 }))
        .await
        .unwrap();
    match connection.recv_packet().await.unwrap() {
        client::play::Packet::KeepAlive(keep_alive) => assert_eq!(keep_alive.id, 77),
        other => panic!("expected the keep-alive response, got {}", other.as_ref()),
    }

    connection
        .send_packet(&server::play::Packet::Disconnect(
            server::play::Disconnect {
                reason: Component::plain("maintenance"),
            },
        ))
        .await
        .unwrap();
}

/// Backend that sends its JoinGame and immediately drops the socket,
/// simulating a crash mid-play.
async fn dying_backend(listener: TokioListener) {
    let (stream, _) = listener.accept().await.unwrap();
    let mut connection: Connection<side::Server, state::Handshake> =
        Connection::new(stream, registry()).unwrap();
    let client::handshake::Packet::Handshake(handshake) = connection.recv_packet().await.unwrap();
    connection.set_version(ProtocolVersion::from_wire(handshake.protocol_version).unwrap());

    let connection = connection.switch_state::<state::Login>();
    let start = match connection.recv_packet().await.unwrap() {
        client::login::Packet::LoginStart(start) => start,
        other => panic!("expected LoginStart, got {}", other.as_ref()),
    };
    connection
        .send_packet(&server::login::Packet::LoginSuccess(LoginSuccess {
            uuid: offline_uuid(&start.name),
            username: start.name,
            properties: vec![],
        }))
        .await
        .unwrap();

    let connection = connection.switch_state::<state::Play>();
    connection
        .send_packet(&server::play::Packet::JoinGame(JoinGame {
            entity_id: 1,
            gamemode: 0,
            dimension: Dimension::Legacy(0),
            difficulty: 1,
            max_players: 20,
            level_type: Some("default".to_owned()),
            ..JoinGame::default()
        }))
        .await
        .unwrap();
    // socket dropped here: the proxy must fail the player over
}

/// Replacement backend: accepts the switched player and waits for one
/// forwarded chat message to prove the bridge is live.
async fn rescue_backend(listener: TokioListener) {
    let (stream, _) = listener.accept().await.unwrap();
    let mut connection: Connection<side::Server, state::Handshake> =
        Connection::new(stream, registry()).unwrap();
    let client::handshake::Packet::Handshake(handshake) = connection.recv_packet().await.unwrap();
    connection.set_version(ProtocolVersion::from_wire(handshake.protocol_version).unwrap());

    let connection = connection.switch_state::<state::Login>();
    let start = match connection.recv_packet().await.unwrap() {
        client::login::Packet::LoginStart(start) => start,
        other => panic!("expected LoginStart, got {}", other.as_ref()),
    };
    connection
        .send_packet(&server::login::Packet::LoginSuccess(LoginSuccess {
            uuid: offline_uuid(&start.name),
            username: start.name,
            properties: vec![],
        }))
        .await
        .unwrap();

    let connection = connection.switch_state::<state::Play>();
    connection
        .send_packet(&server::play::Packet::JoinGame(JoinGame {
            entity_id: 2,
            gamemode: 0,
            dimension: Dimension::Legacy(0),
            difficulty: 1,
            max_players: 20,
            level_type: Some("default".to_owned()),
            ..JoinGame::default()
        }))
        .await
        .unwrap();

    match connection.recv_packet().await.unwrap() {
        client::play::Packet::ChatMessage(body) => {
            let mut expected = Vec::new();
            minecraft_relay::protocol::Encoder::new(&mut expected).write_string("hello");
            assert_eq!(body, expected);
        }
        other => panic!("expected the forwarded chat, got {}", other.as_ref()),
    }
}

fn test_settings() -> ClientSettings {
    ClientSettings {
        locale: "en_US".to_owned(),
        view_distance: 10,
        chat_visibility: 0,
        chat_colors: true,
        difficulty: 0,
        skin_parts: 0x7f,
        main_hand: 1,
        chat_filtering_enabled: false,
        client_listing_allowed: false,
        tail: Vec::new(),
    }
}

/// Backend that stays perfectly healthy: it serves the player, proves the
/// bridge is live with a keep-alive exchange, then waits to be closed by
/// the proxy when the player is switched away.
async fn holding_backend(listener: TokioListener) {
    let (stream, _) = listener.accept().await.unwrap();
    let mut connection: Connection<side::Server, state::Handshake> =
        Connection::new(stream, registry()).unwrap();
    let client::handshake::Packet::Handshake(handshake) = connection.recv_packet().await.unwrap();
    connection.set_version(ProtocolVersion::from_wire(handshake.protocol_version).unwrap());

    let connection = connection.switch_state::<state::Login>();
    let start = match connection.recv_packet().await.unwrap() {
        client::login::Packet::LoginStart(start) => start,
        other => panic!("expected LoginStart, got {}", other.as_ref()),
    };
    connection
        .send_packet(&server::login::Packet::LoginSuccess(LoginSuccess {
            uuid: offline_uuid(&start.name),
            username: start.name,
            properties: vec![],
        }))
        .await
        .unwrap();

    let connection = connection.switch_state::<state::Play>();
    connection
        .send_packet(&server::play::Packet::JoinGame(JoinGame {
            entity_id: 1,
            gamemode: 0,
            dimension: Dimension::Legacy(0),
            difficulty: 1,
            max_players: 20,
            level_type: Some("default".to_owned()),
            ..JoinGame::default()
        }))
        .await
        .unwrap();

    match connection.recv_packet().await.unwrap() {
        client::play::Packet::ClientSettings(settings) => {
            assert_eq!(settings.locale, "en_US");
        }
        other => panic!("expected ClientSettings, got {}", other.as_ref()),
    }

    connection
        .send_packet(&server::play::Packet::KeepAlive(KeepAlive { id: 5 }))
        .await
        .unwrap();

    // nothing else is owed to this backend; the proxy closes the socket
    // once the player has been moved
    while connection.recv_packet().await.is_ok() {}
}

/// Backend receiving the voluntarily switched player: after its JoinGame
/// it must see the cached client settings replayed by the proxy.
async fn switch_target_backend(listener: TokioListener) {
    let (stream, _) = listener.accept().await.unwrap();
    let mut connection: Connection<side::Server, state::Handshake> =
        Connection::new(stream, registry()).unwrap();
    let client::handshake::Packet::Handshake(handshake) = connection.recv_packet().await.unwrap();
    connection.set_version(ProtocolVersion::from_wire(handshake.protocol_version).unwrap());

    let connection = connection.switch_state::<state::Login>();
    let start = match connection.recv_packet().await.unwrap() {
        client::login::Packet::LoginStart(start) => start,
        other => panic!("expected LoginStart, got {}", other.as_ref()),
    };
    assert_eq!(start.name, "Notch");
    connection
        .send_packet(&server::login::Packet::LoginSuccess(LoginSuccess {
            uuid: offline_uuid(&start.name),
            username: start.name,
            properties: vec![],
        }))
        .await
        .unwrap();

    let connection = connection.switch_state::<state::Play>();
    connection
        .send_packet(&server::play::Packet::JoinGame(JoinGame {
            entity_id: 3,
            gamemode: 0,
            dimension: Dimension::Legacy(0),
            difficulty: 1,
            max_players: 20,
            level_type: Some("default".to_owned()),
            ..JoinGame::default()
        }))
        .await
        .unwrap();

    match connection.recv_packet().await.unwrap() {
        client::play::Packet::ClientSettings(settings) => {
            assert_eq!(settings, test_settings());
        }
        other => panic!("expected the replayed settings, got {}", other.as_ref()),
    }
}

#[tokio::test]
async fn requested_switch_moves_player_off_healthy_backend() {
    let holding_listener = TokioListener::bind("127.0.0.1:0").await.unwrap();
    let holding_addr = holding_listener.local_addr().unwrap();
    let holding_task = tokio::spawn(holding_backend(holding_listener));

    let target_listener = TokioListener::bind("127.0.0.1:0").await.unwrap();
    let target_addr = target_listener.local_addr().unwrap();
    let target_task = tokio::spawn(switch_target_backend(target_listener));

    let config = ProxyConfig::from_toml(&format!(
        r#"
        bind = "127.0.0.1:0"
        online-mode = false
        try = ["lobby"]

        [servers.lobby]
        address = "127.0.0.1:{}"
        [servers.fallback]
        address = "127.0.0.1:{}"
        "#,
        holding_addr.port(),
        target_addr.port()
    ))
    .unwrap();
    let ctx = ProxyContext::new(
        config,
        Arc::new(NullEventSink),
        Arc::new(UnavailableAuthenticator),
    )
    .unwrap();
    let listener = Listener::bind(ctx.clone()).unwrap();
    let proxy_addr = listener.local_addr();
    tokio::spawn(async move { listener.serve().await });

    let run = async {
        let stream = TcpStream::connect(proxy_addr).await.unwrap();
        let mut connection: Connection<side::Client, state::Handshake> =
            Connection::new(stream, registry()).unwrap();
        connection
            .send_packet(&client::handshake::Packet::Handshake(Handshake {
                protocol_version: VERSION.wire(),
                server_address: "play.example.com".to_owned(),
                server_port: proxy_addr.port(),
                next_state: NextState::Login,
            }))
            .await
            .unwrap();
        connection.set_version(VERSION);

        let mut connection = connection.switch_state::<state::Login>();
        connection
            .send_packet(&client::login::Packet::LoginStart(
                client::login::LoginStart {
                    name: "Notch".to_owned(),
                    uuid: None,
                    key: None,
                },
            ))
            .await
            .unwrap();
        loop {
            match connection.recv_packet().await.unwrap() {
                server::login::Packet::SetCompression(compression) => {
                    connection.enable_compression(CompressionThreshold::new(
                        compression.threshold as usize,
                    ));
                }
                server::login::Packet::LoginSuccess(_) => break,
                other => panic!("unexpected login packet {}", other.as_ref()),
            }
        }
        let connection = connection.switch_state::<state::Play>();

        match connection.recv_packet().await.unwrap() {
            server::play::Packet::JoinGame(join) => assert_eq!(join.entity_id, 1),
            other => panic!("expected JoinGame, got {}", other.as_ref()),
        }

        // settings go to the first backend and are cached by the proxy
        connection
            .send_packet(&client::play::Packet::ClientSettings(test_settings()))
            .await
            .unwrap();
        // the keep-alive round trip proves the settings were delivered
        match connection.recv_packet().await.unwrap() {
            server::play::Packet::KeepAlive(keep_alive) => {
                assert_eq!(keep_alive.id, 5);
                connection
                    .send_packet(&client::play::Packet::KeepAlive(KeepAlive { id: 5 }))
                    .await
                    .unwrap();
            }
            other => panic!("expected KeepAlive, got {}", other.as_ref()),
        }

        // both backends are healthy; ask the proxy to move the player
        let outcome = ctx
            .request_switch(offline_uuid("Notch"), "fallback")
            .await
            .expect("session is registered")
            .await
            .unwrap();
        assert_eq!(outcome, SwitchOutcome::Completed);

        // no disconnect, just the dimension-refresh sequence
        match connection.recv_packet().await.unwrap() {
            server::play::Packet::JoinGame(join) => {
                assert_eq!(join.entity_id, 3);
                assert_eq!(join.dimension, Dimension::Legacy(-1));
            }
            other => panic!("expected the throwaway JoinGame, got {}", other.as_ref()),
        }
        match connection.recv_packet().await.unwrap() {
            server::play::Packet::Respawn(respawn) => {
                assert_eq!(&respawn.body[..4], 0i32.to_be_bytes().as_slice());
            }
            other => panic!("expected Respawn, got {}", other.as_ref()),
        }

        // a switch to the server the player is already on is refused
        let outcome = ctx
            .request_switch(offline_uuid("Notch"), "fallback")
            .await
            .expect("session is registered")
            .await
            .unwrap();
        assert!(matches!(outcome, SwitchOutcome::Failed(_)));
    };
    timeout(Duration::from_secs(15), run).await.unwrap();

    timeout(Duration::from_secs(5), holding_task)
        .await
        .unwrap()
        .unwrap();
    timeout(Duration::from_secs(5), target_task)
        .await
        .unwrap()
        .unwrap();
}

#[tokio::test]
async fn failover_switch_is_transparent() {
    let dying_listener = TokioListener::bind("127.0.0.1:0").await.unwrap();
    let dying_addr = dying_listener.local_addr().unwrap();
    tokio::spawn(dying_backend(dying_listener));

    let rescue_listener = TokioListener::bind("127.0.0.1:0").await.unwrap();
    let rescue_addr = rescue_listener.local_addr().unwrap();
    let rescue_task = tokio::spawn(rescue_backend(rescue_listener));

    let config = ProxyConfig::from_toml(&format!(
        r#"
        bind = "127.0.0.1:0"
        online-mode = false
        try = ["lobby", "fallback"]

        [servers.lobby]
        address = "127.0.0.1:{}"
        [servers.fallback]
        address = "127.0.0.1:{}"
        "#,
        dying_addr.port(),
        rescue_addr.port()
    ))
    .unwrap();
    let ctx = ProxyContext::new(
        config,
        Arc::new(NullEventSink),
        Arc::new(UnavailableAuthenticator),
    )
    .unwrap();
    let listener = Listener::bind(ctx).unwrap();
    let proxy_addr = listener.local_addr();
    tokio::spawn(async move { listener.serve().await });

    let run = async {
        let stream = TcpStream::connect(proxy_addr).await.unwrap();
        let mut connection: Connection<side::Client, state::Handshake> =
            Connection::new(stream, registry()).unwrap();
        connection
            .send_packet(&client::handshake::Packet::Handshake(Handshake {
                protocol_version: VERSION.wire(),
                server_address: "play.example.com".to_owned(),
                server_port: proxy_addr.port(),
                next_state: NextState::Login,
            }))
            .await
            .unwrap();
        connection.set_version(VERSION);

        let mut connection = connection.switch_state::<state::Login>();
        connection
            .send_packet(&client::login::Packet::LoginStart(
                client::login::LoginStart {
                    name: "Notch".to_owned(),
                    uuid: None,
                    key: None,
                },
            ))
            .await
            .unwrap();
        loop {
            match connection.recv_packet().await.unwrap() {
                server::login::Packet::SetCompression(compression) => {
                    connection.enable_compression(CompressionThreshold::new(
                        compression.threshold as usize,
                    ));
                }
                server::login::Packet::LoginSuccess(_) => break,
                other => panic!("unexpected login packet {}", other.as_ref()),
            }
        }
        let connection = connection.switch_state::<state::Play>();

        // world of the first backend
        match connection.recv_packet().await.unwrap() {
            server::play::Packet::JoinGame(join) => {
                assert_eq!(join.entity_id, 1);
                assert_eq!(join.dimension, Dimension::Legacy(0));
            }
            other => panic!("expected JoinGame, got {}", other.as_ref()),
        }

        // the first backend dies; the dimension-refresh sequence arrives
        // instead of any disconnect: a throwaway-dimension JoinGame...
        match connection.recv_packet().await.unwrap() {
            server::play::Packet::JoinGame(join) => {
                assert_eq!(join.entity_id, 2);
                assert_eq!(join.dimension, Dimension::Legacy(-1));
            }
            other => panic!("expected the throwaway JoinGame, got {}", other.as_ref()),
        }
        // ...then a Respawn into the real dimension
        match connection.recv_packet().await.unwrap() {
            server::play::Packet::Respawn(respawn) => {
                assert_eq!(&respawn.body[..4], 0i32.to_be_bytes().as_slice());
            }
            other => panic!("expected Respawn, got {}", other.as_ref()),
        }

        // gameplay continues against the replacement backend
        let mut chat = Vec::new();
        minecraft_relay::protocol::Encoder::new(&mut chat).write_string("hello");
        connection
            .send_packet(&client::play::Packet::ChatMessage(chat))
            .await
            .unwrap();
    };
    timeout(Duration::from_secs(15), run).await.unwrap();

    timeout(Duration::from_secs(5), rescue_task)
        .await
        .unwrap()
        .unwrap();
}

#[tokio::test]
async fn offline_login_bridges_to_backend() {
    let backend_listener = TokioListener::bind("127.0.0.1:0").await.unwrap();
    let backend_addr = backend_listener.local_addr().unwrap();
    let backend_task = tokio::spawn(fake_backend(backend_listener));

    let config = ProxyConfig::from_toml(&format!(
        r#"
        bind = "127.0.0.1:0"
        online-mode = false
        try = ["lobby"]

        [servers.lobby]
        address = "127.0.0.1:{}"
        "#,
        backend_addr.port()
    ))
    .unwrap();
    let ctx = ProxyContext::new(
        config,
        Arc::new(NullEventSink),
        Arc::new(UnavailableAuthenticator),
    )
    .unwrap();
    let listener = Listener::bind(ctx).unwrap();
    let proxy_addr = listener.local_addr();
    tokio::spawn(async move { listener.serve().await });

    let run = async {
        let stream = TcpStream::connect(proxy_addr).await.unwrap();
        let mut connection: Connection<side::Client, state::Handshake> =
            Connection::new(stream, registry()).unwrap();
        connection
            .send_packet(&client::handshake::Packet::Handshake(Handshake {
                protocol_version: VERSION.wire(),
                server_address: "play.example.com".to_owned(),
                server_port: proxy_addr.port(),
                next_state: NextState::Login,
            }))
            .await
            .unwrap();
        connection.set_version(VERSION);

        let mut connection = connection.switch_state::<state::Login>();
        connection
            .send_packet(&client::login::Packet::LoginStart(
                client::login::LoginStart {
                    name: "Notch".to_owned(),
                    uuid: None,
                    key: None,
                },
            ))
            .await
            .unwrap();

        // the proxy enables compression before announcing login success
        let success = loop {
            match connection.recv_packet().await.unwrap() {
                server::login::Packet::SetCompression(compression) => {
                    assert!(compression.threshold >= 0);
                    connection.enable_compression(CompressionThreshold::new(
                        compression.threshold as usize,
                    ));
                }
                server::login::Packet::LoginSuccess(success) => break success,
                other => panic!("unexpected login packet {}", other.as_ref()),
            }
        };
        assert_eq!(success.username, "Notch");
        assert_eq!(success.uuid, offline_uuid("Notch"));
        assert_eq!(success.uuid.get_version_num(), 3);

        let connection = connection.switch_state::<state::Play>();

        match connection.recv_packet().await.unwrap() {
            server::play::Packet::JoinGame(join) => {
                assert_eq!(join.entity_id, 1);
                assert_eq!(join.dimension, Dimension::Legacy(0));
            }
            other => panic!("expected JoinGame, got {}", other.as_ref()),
        }

        match connection.recv_packet().await.unwrap() {
            server::play::Packet::KeepAlive(keep_alive) => {
                assert_eq!(keep_alive.id, 77);
                connection
                    .send_packet(&client::play::Packet::KeepAlive(KeepAlive { id: 77 }))
                    .await
                    .unwrap();
            }
            other => panic!("expected KeepAlive, got {}", other.as_ref()),
        }

        // the backend kick is surfaced because no fallback remains
        match connection.recv_packet().await.unwrap() {
            server::play::Packet::Disconnect(disconnect) => {
                assert_eq!(disconnect.reason.text(), "maintenance");
            }
            other => panic!("expected Disconnect, got {}", other.as_ref()),
        }
    };
    timeout(Duration::from_secs(15), run).await.unwrap();

    timeout(Duration::from_secs(5), backend_task)
        .await
        .unwrap()
        .unwrap();
}
