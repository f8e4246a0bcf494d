use crate::protocol::{
    decoder::{self, Decoder},
    encoder::Encoder,
    packet::{decode_id, encode_id, unexpected, PacketSet},
    registry::{Direction, PacketKind, PacketRegistry, State},
    version::ProtocolVersion,
};

#[derive(Debug, Clone, strum::AsRefStr)]
pub enum Packet {
    StatusResponse(StatusResponse),
    Pong(Pong),
}

/// The status JSON, either synthesized by the proxy or passed through
/// verbatim from a backend in ping-passthrough mode.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StatusResponse {
    pub json: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Pong {
    pub payload: i64,
}

impl PacketSet for Packet {
    const STATE: State = State::Status;
    const DIRECTION: Direction = Direction::ClientBound;

    fn decode(
        decoder: &mut Decoder,
        version: ProtocolVersion,
        registry: &PacketRegistry,
    ) -> decoder::Result<Self> {
        let (id, kind) = decode_id(decoder, Self::STATE, Self::DIRECTION, version, registry)?;
        match kind {
            Some(PacketKind::StatusResponse) => Ok(Packet::StatusResponse(StatusResponse {
                json: decoder.read_string()?.to_owned(),
            })),
            Some(PacketKind::StatusPong) => Ok(Packet::Pong(Pong {
                payload: decoder.read_i64()?,
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
        match self {
            Packet::StatusResponse(response) => {
                encode_id(
                    encoder,
                    Self::STATE,
                    Self::DIRECTION,
                    version,
                    registry,
                    PacketKind::StatusResponse,
                )?;
                encoder.write_string(&response.json);
                Ok(())
            }
            Packet::Pong(pong) => {
                encode_id(
                    encoder,
                    Self::STATE,
                    Self::DIRECTION,
                    version,
                    registry,
                    PacketKind::StatusPong,
                )?;
                encoder.write_i64(pong.payload);
                Ok(())
            }
        }
    }
}
