use crate::protocol::{
    decoder::{self, Decoder},
    encoder::Encoder,
    packet::{
        common::{ClientSettings, KeepAlive, PluginMessage},
        decode_id, encode_id, PacketSet, RawPacket,
    },
    registry::{Direction, PacketKind, PacketRegistry, State},
    version::ProtocolVersion,
};

#[derive(Debug, Clone, strum::AsRefStr)]
pub enum Packet {
    ClientSettings(ClientSettings),
    PluginMessage(PluginMessage),
    FinishConfiguration,
    KeepAlive(KeepAlive),
    /// Anything else the configuration state grows; forwarded as-is.
    Opaque(RawPacket),
}

impl PacketSet for Packet {
    const STATE: State = State::Config;
    const DIRECTION: Direction = Direction::ServerBound;

    fn decode(
        decoder: &mut Decoder,
        version: ProtocolVersion,
        registry: &PacketRegistry,
    ) -> decoder::Result<Self> {
        let (id, kind) = decode_id(decoder, Self::STATE, Self::DIRECTION, version, registry)?;
        match kind {
            Some(PacketKind::ClientSettings) => Ok(Packet::ClientSettings(
                ClientSettings::decode_body(decoder, version)?,
            )),
            Some(PacketKind::PluginMessage) => Ok(Packet::PluginMessage(
                PluginMessage::decode_body(decoder, version)?,
            )),
            Some(PacketKind::FinishConfiguration) => Ok(Packet::FinishConfiguration),
            Some(PacketKind::KeepAlive) => {
                Ok(Packet::KeepAlive(KeepAlive::decode_body(decoder, version)?))
            }
            _ => Ok(Packet::Opaque(RawPacket {
                id,
                body: decoder.consume_remaining().to_vec(),
            })),
        }
    }

    fn encode(
        &self,
        encoder: &mut Encoder,
        version: ProtocolVersion,
        registry: &PacketRegistry,
    ) -> anyhow::Result<()> {
        match self {
            Packet::ClientSettings(settings) => {
                encode_id(
                    encoder,
                    Self::STATE,
                    Self::DIRECTION,
                    version,
                    registry,
                    PacketKind::ClientSettings,
                )?;
                settings.encode_body(encoder, version);
            }
            Packet::PluginMessage(message) => {
                encode_id(
                    encoder,
                    Self::STATE,
                    Self::DIRECTION,
                    version,
                    registry,
                    PacketKind::PluginMessage,
                )?;
                message.encode_body(encoder, version);
            }
            Packet::FinishConfiguration => {
                encode_id(
                    encoder,
                    Self::STATE,
                    Self::DIRECTION,
                    version,
                    registry,
                    PacketKind::FinishConfiguration,
                )?;
            }
            Packet::KeepAlive(keep_alive) => {
                encode_id(
                    encoder,
                    Self::STATE,
                    Self::DIRECTION,
                    version,
                    registry,
                    PacketKind::KeepAlive,
                )?;
                keep_alive.encode_body(encoder, version);
            }
            Packet::Opaque(raw) => {
                encoder.write_var_int(raw.id);
                encoder.write_slice(&raw.body);
            }
        }
        Ok(())
    }
}
