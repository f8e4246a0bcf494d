//! End-to-end status handling over real sockets: handshake, status
//! request, ping, pong — no backend involved.

use minecraft_relay::{
    auth::UnavailableAuthenticator,
    config::ProxyConfig,
    connection::Connection,
    context::ProxyContext,
    events::NullEventSink,
    listener::Listener,
    protocol::{
        packet::{
            client,
            client::handshake::{Handshake, NextState},
            server, side, state,
        },
        registry::PacketRegistry,
        ProtocolVersion,
    },
};
use std::{sync::Arc, time::Duration};
use tokio::{io::AsyncReadExt, io::AsyncWriteExt, net::TcpStream, time::timeout};

fn test_context() -> Arc<ProxyContext> {
    let config = ProxyConfig::from_toml(
        r#"
        bind = "127.0.0.1:0"
        motd = "integration test"
        show-max-players = 17
        online-mode = false
        "#,
    )
    .unwrap();
    ProxyContext::new(
        config,
        Arc::new(NullEventSink),
        Arc::new(UnavailableAuthenticator),
    )
    .unwrap()
}

#[tokio::test]
async fn status_and_ping_round_trip() {
    let ctx = test_context();
    let listener = Listener::bind(ctx).unwrap();
    let addr = listener.local_addr();
    tokio::spawn(async move { listener.serve().await });

    let run = async {
        let stream = TcpStream::connect(addr).await.unwrap();
        let registry = Arc::new(PacketRegistry::build().unwrap());
        let mut connection: Connection<side::Client, state::Handshake> =
            Connection::new(stream, registry).unwrap();

        connection
            .send_packet(&client::handshake::Packet::Handshake(Handshake {
                protocol_version: ProtocolVersion::V1_20_3.wire(),
                server_address: "localhost".to_owned(),
                server_port: addr.port(),
                next_state: NextState::Status,
            }))
            .await
            .unwrap();
        connection.set_version(ProtocolVersion::V1_20_3);
        let connection = connection.switch_state::<state::Status>();

        connection
            .send_packet(&client::status::Packet::StatusRequest)
            .await
            .unwrap();
        let json = match connection.recv_packet().await.unwrap() {
            server::status::Packet::StatusResponse(response) => response.json,
            other => panic!("expected status response, got {}", other.as_ref()),
        };
        let value: serde_json::Value = serde_json::from_str(&json).unwrap();
        assert_eq!(value["description"]["text"], "integration test");
        assert_eq!(value["players"]["max"], 17);
        assert_eq!(value["players"]["online"], 0);
        // the proxy echoes a protocol it knows the client speaks
        assert_eq!(value["version"]["protocol"], ProtocolVersion::V1_20_3.wire());

        connection
            .send_packet(&client::status::Packet::Ping(client::status::Ping {
                payload: 0x1122_3344_5566_7788,
            }))
            .await
            .unwrap();
        match connection.recv_packet().await.unwrap() {
            server::status::Packet::Pong(pong) => {
                assert_eq!(pong.payload, 0x1122_3344_5566_7788)
            }
            other => panic!("expected pong, got {}", other.as_ref()),
        }
    };
    timeout(Duration::from_secs(10), run).await.unwrap();
}

#[tokio::test]
async fn legacy_ping_answered_before_framing() {
    let ctx = test_context();
    let listener = Listener::bind(ctx).unwrap();
    let addr = listener.local_addr();
    tokio::spawn(async move { listener.serve().await });

    let run = async {
        let mut stream = TcpStream::connect(addr).await.unwrap();
        stream.write_all(&[0xFE, 0x01]).await.unwrap();

        let mut response = Vec::new();
        stream.read_to_end(&mut response).await.unwrap();
        assert_eq!(response[0], 0xFF, "legacy status must use the kick opcode");

        let length = u16::from_be_bytes([response[1], response[2]]) as usize;
        let units: Vec<u16> = response[3..]
            .chunks_exact(2)
            .map(|pair| u16::from_be_bytes([pair[0], pair[1]]))
            .collect();
        assert_eq!(units.len(), length);
        let text = String::from_utf16(&units).unwrap();
        assert!(text.starts_with("\u{a7}1\0"));
        assert!(text.contains("integration test"));
    };
    timeout(Duration::from_secs(10), run).await.unwrap();
}

#[tokio::test]
async fn unknown_protocol_login_is_refused() {
    let ctx = test_context();
    let listener = Listener::bind(ctx).unwrap();
    let addr = listener.local_addr();
    tokio::spawn(async move { listener.serve().await });

    let run = async {
        let stream = TcpStream::connect(addr).await.unwrap();
        let registry = Arc::new(PacketRegistry::build().unwrap());
        let mut connection: Connection<side::Client, state::Handshake> =
            Connection::new(stream, registry).unwrap();
        connection
            .send_packet(&client::handshake::Packet::Handshake(Handshake {
                protocol_version: 9999,
                server_address: "localhost".to_owned(),
                server_port: addr.port(),
                next_state: NextState::Login,
            }))
            .await
            .unwrap();
        connection.set_version(ProtocolVersion::MAXIMUM);
        let connection = connection.switch_state::<state::Login>();

        match connection.recv_packet().await.unwrap() {
            server::login::Packet::Disconnect(disconnect) => {
                assert!(disconnect.reason.text().contains("Unsupported"));
            }
            other => panic!("expected a disconnect, got {}", other.as_ref()),
        }
    };
    timeout(Duration::from_secs(10), run).await.unwrap();
}
