//! The packet-id registry.
//!
//! Packet numbering in the Minecraft protocol is a function of the
//! connection state, the direction, and the negotiated protocol version.
//! Each logical packet the proxy interprets is declared once below as a
//! list of `(first version, id)` pairs; an entry applies from its version
//! until the next entry supersedes it. The registry resolves the full
//! `(state, direction, version, id) <-> kind` relation at startup and
//! rejects tables where two packets collide on an id.
//!
//! Ids that resolve to no kind are *not* errors during forwarding: those
//! packets travel as opaque payloads.

use super::version::ProtocolVersion;
use std::collections::HashMap;

use ProtocolVersion::*;

/// Connection protocol state, as the registry keys it.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, strum::AsRefStr)]
pub enum State {
    Handshake,
    Status,
    Login,
    Config,
    Play,
}

/// Direction a packet travels.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, strum::AsRefStr)]
pub enum Direction {
    ClientBound,
    ServerBound,
}

/// Every logical packet the proxy decodes. Anything else is opaque.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, strum::AsRefStr)]
pub enum PacketKind {
    Handshake,
    StatusRequest,
    StatusResponse,
    StatusPing,
    StatusPong,
    LoginStart,
    EncryptionRequest,
    EncryptionResponse,
    LoginSuccess,
    SetCompression,
    LoginPluginRequest,
    LoginPluginResponse,
    LoginAcknowledged,
    LoginDisconnect,
    ClientSettings,
    PluginMessage,
    FinishConfiguration,
    KeepAlive,
    Disconnect,
    JoinGame,
    Respawn,
    ChatMessage,
    ChatCommand,
    StartConfiguration,
    AcknowledgeConfiguration,
}

struct Mapping {
    state: State,
    direction: Direction,
    kind: PacketKind,
    /// `(first version using it, id)`, ascending by version.
    ids: &'static [(ProtocolVersion, i32)],
}

const fn map(
    state: State,
    direction: Direction,
    kind: PacketKind,
    ids: &'static [(ProtocolVersion, i32)],
) -> Mapping {
    Mapping {
        state,
        direction,
        kind,
        ids,
    }
}

use Direction::{ClientBound, ServerBound};
use PacketKind as K;
use State::{Config, Handshake as HandshakeState, Login, Play, Status};

#[rustfmt::skip]
static TABLE: &[Mapping] = &[
    map(HandshakeState, ServerBound, K::Handshake, &[(V1_7_2, 0x00)]),

    map(Status, ServerBound, K::StatusRequest, &[(V1_7_2, 0x00)]),
    map(Status, ServerBound, K::StatusPing,    &[(V1_7_2, 0x01)]),
    map(Status, ClientBound, K::StatusResponse, &[(V1_7_2, 0x00)]),
    map(Status, ClientBound, K::StatusPong,     &[(V1_7_2, 0x01)]),

    map(Login, ServerBound, K::LoginStart,          &[(V1_7_2, 0x00)]),
    map(Login, ServerBound, K::EncryptionResponse,  &[(V1_7_2, 0x01)]),
    map(Login, ServerBound, K::LoginPluginResponse, &[(V1_13, 0x02)]),
    map(Login, ServerBound, K::LoginAcknowledged,   &[(V1_20_2, 0x03)]),
    map(Login, ClientBound, K::LoginDisconnect,     &[(V1_7_2, 0x00)]),
    map(Login, ClientBound, K::EncryptionRequest,   &[(V1_7_2, 0x01)]),
    map(Login, ClientBound, K::LoginSuccess,        &[(V1_7_2, 0x02)]),
    map(Login, ClientBound, K::SetCompression,      &[(V1_8, 0x03)]),
    map(Login, ClientBound, K::LoginPluginRequest,  &[(V1_13, 0x04)]),

    map(Config, ServerBound, K::ClientSettings,      &[(V1_20_2, 0x00)]),
    map(Config, ServerBound, K::PluginMessage,       &[(V1_20_2, 0x01), (V1_20_5, 0x02)]),
    map(Config, ServerBound, K::FinishConfiguration, &[(V1_20_2, 0x02), (V1_20_5, 0x03)]),
    map(Config, ServerBound, K::KeepAlive,           &[(V1_20_2, 0x03), (V1_20_5, 0x04)]),
    map(Config, ClientBound, K::PluginMessage,       &[(V1_20_2, 0x00), (V1_20_5, 0x01)]),
    map(Config, ClientBound, K::Disconnect,          &[(V1_20_2, 0x01), (V1_20_5, 0x02)]),
    map(Config, ClientBound, K::FinishConfiguration, &[(V1_20_2, 0x02), (V1_20_5, 0x03)]),
    map(Config, ClientBound, K::KeepAlive,           &[(V1_20_2, 0x03), (V1_20_5, 0x04)]),

    map(Play, ClientBound, K::KeepAlive, &[
        (V1_7_2, 0x00), (V1_9, 0x1F), (V1_13, 0x21), (V1_14, 0x20), (V1_15, 0x21),
        (V1_16, 0x20), (V1_16_2, 0x1F), (V1_17, 0x21), (V1_19, 0x1E), (V1_19_1, 0x20),
        (V1_19_3, 0x1F), (V1_19_4, 0x23), (V1_20_2, 0x24), (V1_20_5, 0x26), (V1_21_2, 0x27),
    ]),
    map(Play, ClientBound, K::JoinGame, &[
        (V1_7_2, 0x01), (V1_9, 0x23), (V1_13, 0x25), (V1_15, 0x26), (V1_16, 0x25),
        (V1_16_2, 0x24), (V1_17, 0x26), (V1_19, 0x23), (V1_19_1, 0x25), (V1_19_3, 0x24),
        (V1_19_4, 0x28), (V1_20_2, 0x29), (V1_20_5, 0x2B), (V1_21_2, 0x2C),
    ]),
    map(Play, ClientBound, K::Respawn, &[
        (V1_7_2, 0x07), (V1_9, 0x33), (V1_12, 0x34), (V1_12_1, 0x35), (V1_13, 0x38),
        (V1_14, 0x3A), (V1_15, 0x3B), (V1_16, 0x3A), (V1_16_2, 0x39), (V1_17, 0x3D),
        (V1_19, 0x3B), (V1_19_1, 0x3E), (V1_19_3, 0x3D), (V1_19_4, 0x41), (V1_20_2, 0x43),
        (V1_20_3, 0x45), (V1_20_5, 0x47), (V1_21_2, 0x4C),
    ]),
    map(Play, ClientBound, K::Disconnect, &[
        (V1_7_2, 0x40), (V1_9, 0x1A), (V1_13, 0x1B), (V1_14, 0x1A), (V1_15, 0x1B),
        (V1_16, 0x1A), (V1_16_2, 0x19), (V1_17, 0x1A), (V1_19, 0x17), (V1_19_1, 0x19),
        (V1_19_3, 0x17), (V1_19_4, 0x1A), (V1_20_2, 0x1B), (V1_20_5, 0x1D),
    ]),
    map(Play, ClientBound, K::PluginMessage, &[
        (V1_7_2, 0x3F), (V1_9, 0x18), (V1_13, 0x19), (V1_14, 0x18), (V1_15, 0x19),
        (V1_16, 0x18), (V1_16_2, 0x17), (V1_17, 0x18), (V1_19, 0x15), (V1_19_1, 0x16),
        (V1_19_3, 0x15), (V1_19_4, 0x17), (V1_20_2, 0x18), (V1_20_5, 0x19),
    ]),
    map(Play, ClientBound, K::StartConfiguration, &[
        (V1_20_2, 0x65), (V1_20_3, 0x67), (V1_20_5, 0x69), (V1_21_2, 0x70),
    ]),

    map(Play, ServerBound, K::KeepAlive, &[
        (V1_7_2, 0x00), (V1_9, 0x0B), (V1_12, 0x0C), (V1_12_1, 0x0B), (V1_13, 0x0E),
        (V1_14, 0x0F), (V1_16, 0x10), (V1_17, 0x0F), (V1_19, 0x11), (V1_19_1, 0x12),
        (V1_19_3, 0x11), (V1_19_4, 0x12), (V1_20_2, 0x14), (V1_20_3, 0x15), (V1_20_5, 0x18),
        (V1_21_2, 0x1A),
    ]),
    map(Play, ServerBound, K::PluginMessage, &[
        (V1_7_2, 0x17), (V1_9, 0x09), (V1_12, 0x0A), (V1_12_1, 0x09), (V1_13, 0x0A),
        (V1_14, 0x0B), (V1_17, 0x0A), (V1_19, 0x0C), (V1_19_1, 0x0D), (V1_19_3, 0x0C),
        (V1_19_4, 0x0D), (V1_20_2, 0x0F), (V1_20_3, 0x10), (V1_20_5, 0x12), (V1_21_2, 0x14),
    ]),
    map(Play, ServerBound, K::ClientSettings, &[
        (V1_7_2, 0x15), (V1_9, 0x04), (V1_12, 0x05), (V1_12_1, 0x04), (V1_14, 0x05),
        (V1_19, 0x07), (V1_19_1, 0x08), (V1_19_3, 0x07), (V1_19_4, 0x08), (V1_20_2, 0x09),
        (V1_20_5, 0x0A), (V1_21_2, 0x0C),
    ]),
    map(Play, ServerBound, K::ChatMessage, &[
        (V1_7_2, 0x01), (V1_9, 0x02), (V1_12, 0x03), (V1_12_1, 0x02), (V1_14, 0x03),
        (V1_19, 0x04), (V1_19_1, 0x05), (V1_20_5, 0x06), (V1_21_2, 0x07),
    ]),
    map(Play, ServerBound, K::ChatCommand, &[
        (V1_19, 0x03), (V1_19_1, 0x04), (V1_21_2, 0x05),
    ]),
    map(Play, ServerBound, K::AcknowledgeConfiguration, &[
        (V1_20_2, 0x0B), (V1_20_5, 0x0C), (V1_21_2, 0x0E),
    ]),
];

/// Table validation failure. Aborts startup.
#[derive(Debug, thiserror::Error)]
pub enum RegistryError {
    #[error(
        "{state:?}/{direction:?} id {id:#04x} at {version} claimed by both \
         {first:?} and {second:?}"
    )]
    AmbiguousId {
        state: State,
        direction: Direction,
        version: ProtocolVersion,
        id: i32,
        first: PacketKind,
        second: PacketKind,
    },
    #[error("{kind:?} mapping list is not ascending by version")]
    NonMonotonicMapping { kind: PacketKind },
}

type Key = (State, Direction, ProtocolVersion);

/// Resolved id relation for the whole version ladder.
pub struct PacketRegistry {
    by_id: HashMap<Key, HashMap<i32, PacketKind>>,
    by_kind: HashMap<Key, HashMap<PacketKind, i32>>,
}

impl PacketRegistry {
    /// Resolves the static table, verifying no two kinds overlap on an id
    /// for any `(state, direction, version)`.
    pub fn build() -> Result<Self, RegistryError> {
        let mut by_id: HashMap<Key, HashMap<i32, PacketKind>> = HashMap::new();
        let mut by_kind: HashMap<Key, HashMap<PacketKind, i32>> = HashMap::new();

        for mapping in TABLE {
            for pair in mapping.ids.windows(2) {
                if pair[0].0 >= pair[1].0 {
                    return Err(RegistryError::NonMonotonicMapping { kind: mapping.kind });
                }
            }

            for &version in ProtocolVersion::ALL {
                let Some(id) = resolve(mapping.ids, version) else {
                    continue;
                };
                let key = (mapping.state, mapping.direction, version);
                if let Some(&first) = by_id.entry(key).or_default().get(&id) {
                    return Err(RegistryError::AmbiguousId {
                        state: mapping.state,
                        direction: mapping.direction,
                        version,
                        id,
                        first,
                        second: mapping.kind,
                    });
                }
                by_id.get_mut(&key).unwrap().insert(id, mapping.kind);
                by_kind.entry(key).or_default().insert(mapping.kind, id);
            }
        }

        Ok(Self { by_id, by_kind })
    }

    /// Looks up the kind an inbound id decodes as.
    pub fn packet_kind(
        &self,
        state: State,
        direction: Direction,
        version: ProtocolVersion,
        id: i32,
    ) -> Option<PacketKind> {
        self.by_id
            .get(&(state, direction, version))?
            .get(&id)
            .copied()
    }

    /// Looks up the id a kind encodes to.
    pub fn packet_id(
        &self,
        state: State,
        direction: Direction,
        version: ProtocolVersion,
        kind: PacketKind,
    ) -> Option<i32> {
        self.by_kind
            .get(&(state, direction, version))?
            .get(&kind)
            .copied()
    }

    /// Whether the id carries a packet the proxy interprets.
    pub fn is_known(
        &self,
        state: State,
        direction: Direction,
        version: ProtocolVersion,
        id: i32,
    ) -> bool {
        self.packet_kind(state, direction, version, id).is_some()
    }
}

/// Picks the id applying at `version`: the last entry at or before it.
fn resolve(ids: &[(ProtocolVersion, i32)], version: ProtocolVersion) -> Option<i32> {
    ids.iter()
        .rev()
        .find(|(since, _)| *since <= version)
        .map(|&(_, id)| id)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn table_validates() {
        PacketRegistry::build().unwrap();
    }

    #[test]
    fn handshake_is_universal() {
        let registry = PacketRegistry::build().unwrap();
        for &version in ProtocolVersion::ALL {
            assert_eq!(
                registry.packet_kind(State::Handshake, ServerBound, version, 0x00),
                Some(K::Handshake)
            );
        }
    }

    #[test]
    fn version_dependent_ids() {
        let registry = PacketRegistry::build().unwrap();
        // Keep-alive moved around over the years.
        let cases = [
            (V1_8, 0x00),
            (V1_12_2, 0x1F),
            (V1_19_4, 0x23),
            (V1_20_2, 0x24),
        ];
        for (version, id) in cases {
            assert_eq!(
                registry.packet_id(State::Play, ClientBound, version, K::KeepAlive),
                Some(id),
                "keep-alive id at {version}"
            );
            assert_eq!(
                registry.packet_kind(State::Play, ClientBound, version, id),
                Some(K::KeepAlive)
            );
        }
    }

    #[test]
    fn absent_before_introduction() {
        let registry = PacketRegistry::build().unwrap();
        assert_eq!(
            registry.packet_id(State::Login, ClientBound, V1_7_2, K::SetCompression),
            None
        );
        assert_eq!(
            registry.packet_id(State::Login, ServerBound, V1_20, K::LoginAcknowledged),
            None
        );
        assert!(!registry.is_known(State::Config, ClientBound, V1_19_4, 0x00));
    }

    #[test]
    fn forwarding_ids_are_unknown_not_errors() {
        let registry = PacketRegistry::build().unwrap();
        // 0x42 clientbound in Play is some gameplay packet we never decode.
        assert!(!registry.is_known(State::Play, ClientBound, V1_20_2, 0x42));
    }
}
