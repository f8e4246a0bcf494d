use crate::protocol::{
    decoder::{self, Decoder},
    encoder::Encoder,
    packet::{decode_id, encode_id, unexpected, PacketSet},
    registry::{Direction, PacketKind, PacketRegistry, State},
    version::ProtocolVersion,
};

#[derive(Debug, Clone, strum::AsRefStr)]
pub enum Packet {
    StatusRequest,
    Ping(Ping),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Ping {
    pub payload: i64,
}

impl PacketSet for Packet {
    const STATE: State = State::Status;
    const DIRECTION: Direction = Direction::ServerBound;

    fn decode(
        decoder: &mut Decoder,
        version: ProtocolVersion,
        registry: &PacketRegistry,
    ) -> decoder::Result<Self> {
        let (id, kind) = decode_id(decoder, Self::STATE, Self::DIRECTION, version, registry)?;
        match kind {
            Some(PacketKind::StatusRequest) => Ok(Packet::StatusRequest),
            Some(PacketKind::StatusPing) => Ok(Packet::Ping(Ping {
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
            Packet::StatusRequest => encode_id(
                encoder,
                Self::STATE,
                Self::DIRECTION,
                version,
                registry,
                PacketKind::StatusRequest,
            ),
            Packet::Ping(ping) => {
                encode_id(
                    encoder,
                    Self::STATE,
                    Self::DIRECTION,
                    version,
                    registry,
                    PacketKind::StatusPing,
                )?;
                encoder.write_i64(ping.payload);
                Ok(())
            }
        }
    }
}
