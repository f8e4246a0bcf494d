//! Enumerates the packet types the proxy interprets, per state and side.
//!
//! Full parsing of packets is _not_ implemented. Only the fields required
//! to drive the session state machines, identity forwarding, and server
//! switching are decoded. Gameplay packets the proxy has no interest in are
//! carried as opaque id + byte-buffer pairs, which makes round-trip
//! re-framing lossless by construction.

use super::{
    decoder::{self, Decoder},
    encoder::Encoder,
    nbt,
    registry::{Direction, PacketKind, PacketRegistry, State},
    version::ProtocolVersion,
};
use anyhow::anyhow;
use std::fmt::Debug;

pub mod client;
pub mod common;
pub mod server;

/// A packet left uninterpreted: its id and undecoded body.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawPacket {
    pub id: i32,
    pub body: Vec<u8>,
}

/// One side's set of packets for one protocol state.
///
/// `decode` consumes a whole frame payload (id prefix included);
/// `encode` produces one.
pub trait PacketSet: Sized + Send + Debug + AsRef<str> + 'static {
    const STATE: State;
    const DIRECTION: Direction;

    fn decode(
        decoder: &mut Decoder,
        version: ProtocolVersion,
        registry: &PacketRegistry,
    ) -> decoder::Result<Self>;

    fn encode(
        &self,
        encoder: &mut Encoder,
        version: ProtocolVersion,
        registry: &PacketRegistry,
    ) -> anyhow::Result<()>;
}

/// Reads the frame's id varint and resolves it against the registry.
pub(crate) fn decode_id(
    decoder: &mut Decoder,
    state: State,
    direction: Direction,
    version: ProtocolVersion,
    registry: &PacketRegistry,
) -> decoder::Result<(i32, Option<PacketKind>)> {
    let id = decoder.read_var_int()?;
    Ok((id, registry.packet_kind(state, direction, version, id)))
}

/// Writes the id a kind maps to. A miss here is a table bug or a packet
/// sent in a state/version where it does not exist; both are fatal.
pub(crate) fn encode_id(
    encoder: &mut Encoder,
    state: State,
    direction: Direction,
    version: ProtocolVersion,
    registry: &PacketRegistry,
    kind: PacketKind,
) -> anyhow::Result<()> {
    let id = registry
        .packet_id(state, direction, version, kind)
        .ok_or_else(|| {
            anyhow!(
                "no id for {}/{}/{} at {version}",
                state.as_ref(),
                direction.as_ref(),
                kind.as_ref()
            )
        })?;
    encoder.write_var_int(id);
    Ok(())
}

pub(crate) fn unexpected(
    state: State,
    direction: Direction,
    version: ProtocolVersion,
    id: i32,
) -> decoder::DecodeError {
    decoder::DecodeError::Other(anyhow!(
        "unexpected packet id {id:#04x} in {}/{} at {version}",
        state.as_ref(),
        direction.as_ref(),
    ))
}

/// Type encoding for a side (client or server).
pub trait Side: Send + Sync + 'static + Copy + Clone {
    type SendPacket<State: ProtocolState>: PacketSet;
    type RecvPacket<State: ProtocolState>: PacketSet;
}

pub mod side {
    use super::*;

    /// The proxy acting as the server: talking to a player's client.
    #[derive(Debug, Copy, Clone)]
    pub struct Server;
    impl Side for Server {
        type SendPacket<State: ProtocolState> = State::ServerPacket;
        type RecvPacket<State: ProtocolState> = State::ClientPacket;
    }

    /// The proxy acting as a client: talking to a backend server.
    #[derive(Debug, Copy, Clone)]
    pub struct Client;
    impl Side for Client {
        type SendPacket<State: ProtocolState> = State::ClientPacket;
        type RecvPacket<State: ProtocolState> = State::ServerPacket;
    }
}

/// Type encoding for a protocol state.
pub trait ProtocolState: Send + Sync + 'static {
    const STATE: State;
    /// Packet type sent by the server in this state.
    type ServerPacket: PacketSet;
    /// Packet type sent by the client in this state.
    type ClientPacket: PacketSet;
}

pub mod state {
    use super::*;

    #[derive(Debug, Copy, Clone)]
    pub struct Handshake;
    impl ProtocolState for Handshake {
        const STATE: State = State::Handshake;
        type ServerPacket = EmptyPacket;
        type ClientPacket = client::handshake::Packet;
    }

    /// Nothing is ever sent in this direction/state combination.
    #[derive(Debug, Clone)]
    pub struct EmptyPacket;

    impl AsRef<str> for EmptyPacket {
        fn as_ref(&self) -> &str {
            ""
        }
    }

    impl PacketSet for EmptyPacket {
        const STATE: State = State::Handshake;
        const DIRECTION: Direction = Direction::ClientBound;

        fn decode(
            decoder: &mut Decoder,
            version: ProtocolVersion,
            _registry: &PacketRegistry,
        ) -> decoder::Result<Self> {
            let id = decoder.read_var_int()?;
            Err(unexpected(Self::STATE, Self::DIRECTION, version, id))
        }

        fn encode(
            &self,
            _encoder: &mut Encoder,
            _version: ProtocolVersion,
            _registry: &PacketRegistry,
        ) -> anyhow::Result<()> {
            Err(anyhow!("nothing can be sent clientbound during handshake"))
        }
    }

    #[derive(Debug, Copy, Clone)]
    pub struct Status;
    impl ProtocolState for Status {
        const STATE: State = State::Status;
        type ServerPacket = server::status::Packet;
        type ClientPacket = client::status::Packet;
    }

    #[derive(Debug, Copy, Clone)]
    pub struct Login;
    impl ProtocolState for Login {
        const STATE: State = State::Login;
        type ServerPacket = server::login::Packet;
        type ClientPacket = client::login::Packet;
    }

    #[derive(Debug, Copy, Clone)]
    pub struct Configuration;
    impl ProtocolState for Configuration {
        const STATE: State = State::Config;
        type ServerPacket = server::configuration::Packet;
        type ClientPacket = client::configuration::Packet;
    }

    #[derive(Debug, Copy, Clone)]
    pub struct Play;
    impl ProtocolState for Play {
        const STATE: State = State::Play;
        type ServerPacket = server::play::Packet;
        type ClientPacket = client::play::Packet;
    }
}

/// A chat component as the proxy carries it: either passed through in the
/// representation the wire used, or a plain message the proxy itself wrote.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Component {
    /// Proxy-authored plain text.
    Plain(String),
    /// A JSON component observed on the wire (pre-1.20.3 chat encoding).
    Json(String),
    /// A raw NBT component observed on the wire (1.20.3+ chat encoding).
    Nbt(Vec<u8>),
}

impl Component {
    pub fn plain(text: impl Into<String>) -> Self {
        Component::Plain(text.into())
    }

    /// Best-effort human-readable text, for logs and kick-reason surfacing.
    pub fn text(&self) -> String {
        match self {
            Component::Plain(text) => text.clone(),
            Component::Json(json) => serde_json::from_str::<serde_json::Value>(json)
                .ok()
                .and_then(|value| {
                    value
                        .get("text")
                        .and_then(|t| t.as_str())
                        .map(str::to_owned)
                        .or_else(|| value.as_str().map(str::to_owned))
                })
                .unwrap_or_else(|| json.clone()),
            Component::Nbt(raw) => nbt::parse_string_component(raw)
                .unwrap_or_else(|| "(unrepresentable component)".to_owned()),
        }
    }

    fn to_json(&self) -> String {
        match self {
            Component::Plain(text) => {
                serde_json::json!({ "text": text }).to_string()
            }
            Component::Json(json) => json.clone(),
            Component::Nbt(raw) => {
                let text = nbt::parse_string_component(raw)
                    .unwrap_or_else(|| "(unrepresentable component)".to_owned());
                serde_json::json!({ "text": text }).to_string()
            }
        }
    }

    /// Decodes a component in the chat encoding of `version`
    /// (JSON string before 1.20.3, NBT after).
    pub fn decode_chat(
        decoder: &mut Decoder,
        version: ProtocolVersion,
    ) -> decoder::Result<Self> {
        if version >= ProtocolVersion::V1_20_3 {
            let raw = nbt::read_raw(decoder, version)?;
            Ok(Component::Nbt(raw.to_vec()))
        } else {
            Ok(Component::Json(decoder.read_string()?.to_owned()))
        }
    }

    /// Encodes in the chat encoding of `version`.
    pub fn encode_chat(&self, encoder: &mut Encoder, version: ProtocolVersion) {
        if version >= ProtocolVersion::V1_20_3 {
            match self {
                Component::Nbt(raw) => encoder.write_slice(raw),
                other => nbt::write_string_component(encoder, &other.text()),
            }
        } else {
            encoder.write_string(&self.to_json());
        }
    }

    /// Encodes as a JSON string regardless of version. The Login state
    /// kept the JSON encoding even after Play switched to NBT.
    pub fn encode_json(&self, encoder: &mut Encoder) {
        encoder.write_string(&self.to_json());
    }

    /// Decodes the JSON-string encoding (Login state disconnects).
    pub fn decode_json(decoder: &mut Decoder) -> decoder::Result<Self> {
        Ok(Component::Json(decoder.read_string()?.to_owned()))
    }
}
