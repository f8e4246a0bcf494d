use crate::protocol::{
    decoder::{self, DecodeError, Decoder},
    encoder::Encoder,
    packet::{decode_id, encode_id, unexpected, PacketSet},
    registry::{Direction, PacketKind, PacketRegistry, State},
    version::ProtocolVersion,
};
use anyhow::anyhow;

#[derive(Debug, Clone, strum::AsRefStr)]
pub enum Packet {
    Handshake(Handshake),
}

/// The first framed packet of every connection. Its layout has never
/// changed, which is the only reason version negotiation works at all.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Handshake {
    pub protocol_version: i32,
    pub server_address: String,
    pub server_port: u16,
    pub next_state: NextState,
}

#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub enum NextState {
    Status,
    Login,
    /// 1.20.5+ server-initiated transfer; handled as Login with a flag.
    Transfer,
}

impl NextState {
    fn from_wire(value: i32) -> decoder::Result<Self> {
        match value {
            1 => Ok(NextState::Status),
            2 => Ok(NextState::Login),
            3 => Ok(NextState::Transfer),
            other => Err(DecodeError::Other(anyhow!(
                "invalid handshake next-state {other}"
            ))),
        }
    }

    fn to_wire(self) -> i32 {
        match self {
            NextState::Status => 1,
            NextState::Login => 2,
            NextState::Transfer => 3,
        }
    }
}

impl PacketSet for Packet {
    const STATE: State = State::Handshake;
    const DIRECTION: Direction = Direction::ServerBound;

    fn decode(
        decoder: &mut Decoder,
        version: ProtocolVersion,
        registry: &PacketRegistry,
    ) -> decoder::Result<Self> {
        let (id, kind) = decode_id(decoder, Self::STATE, Self::DIRECTION, version, registry)?;
        match kind {
            Some(PacketKind::Handshake) => Ok(Packet::Handshake(Handshake {
                protocol_version: decoder.read_var_int()?,
                server_address: decoder.read_string_capped(255)?.to_owned(),
                server_port: decoder.read_u16()?,
                next_state: NextState::from_wire(decoder.read_var_int()?)?,
            })),
            _ => Err(unexpected(Self::STATE, Self::DIRECTION, version, id)),
        }
    }

    fn encode(
        &self,
        encoder: &mut Encoder,
        version: ProtocolVersion,
        registry: &PacketRegistry,
    ) -> anyhow::Result<()> {
        let Packet::Handshake(handshake) = self;
        encode_id(
            encoder,
            Self::STATE,
            Self::DIRECTION,
            version,
            registry,
            PacketKind::Handshake,
        )?;
        encoder.write_var_int(handshake.protocol_version);
        encoder.write_string(&handshake.server_address);
        encoder.write_u16(handshake.server_port);
        encoder.write_var_int(handshake.next_state.to_wire());
        Ok(())
    }
}
