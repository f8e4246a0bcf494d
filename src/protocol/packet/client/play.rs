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
    KeepAlive(KeepAlive),
    PluginMessage(PluginMessage),
    ClientSettings(ClientSettings),
    /// Captured only so signing enforcement can gate it; body untouched.
    ChatMessage(Vec<u8>),
    ChatCommand(Vec<u8>),
    AcknowledgeConfiguration,
    Opaque(RawPacket),
}

impl PacketSet for Packet {
    const STATE: State = State::Play;
    const DIRECTION: Direction = Direction::ServerBound;

    fn decode(
        decoder: &mut Decoder,
        version: ProtocolVersion,
        registry: &PacketRegistry,
    ) -> decoder::Result<Self> {
        let (id, kind) = decode_id(decoder, Self::STATE, Self::DIRECTION, version, registry)?;
        match kind {
            Some(PacketKind::KeepAlive) => {
                Ok(Packet::KeepAlive(KeepAlive::decode_body(decoder, version)?))
            }
            Some(PacketKind::PluginMessage) => Ok(Packet::PluginMessage(
                PluginMessage::decode_body(decoder, version)?,
            )),
            Some(PacketKind::ClientSettings) => Ok(Packet::ClientSettings(
                ClientSettings::decode_body(decoder, version)?,
            )),
            Some(PacketKind::ChatMessage) => {
                Ok(Packet::ChatMessage(decoder.consume_remaining().to_vec()))
            }
            Some(PacketKind::ChatCommand) => {
                Ok(Packet::ChatCommand(decoder.consume_remaining().to_vec()))
            }
            Some(PacketKind::AcknowledgeConfiguration) => Ok(Packet::AcknowledgeConfiguration),
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
            Packet::ChatMessage(body) => {
                encode_id(
                    encoder,
                    Self::STATE,
                    Self::DIRECTION,
                    version,
                    registry,
                    PacketKind::ChatMessage,
                )?;
                encoder.write_slice(body);
            }
            Packet::ChatCommand(body) => {
                encode_id(
                    encoder,
                    Self::STATE,
                    Self::DIRECTION,
                    version,
                    registry,
                    PacketKind::ChatCommand,
                )?;
                encoder.write_slice(body);
            }
            Packet::AcknowledgeConfiguration => {
                encode_id(
                    encoder,
                    Self::STATE,
                    Self::DIRECTION,
                    version,
                    registry,
                    PacketKind::AcknowledgeConfiguration,
                )?;
            }
            Packet::Opaque(raw) => {
                encoder.write_var_int(raw.id);
                encoder.write_slice(&raw.body);
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn opaque_round_trip_is_lossless() {
        let registry = PacketRegistry::build().unwrap();
        let raw = RawPacket {
            id: 0x2A,
            body: vec![0xDE, 0xAD, 0xBE, 0xEF],
        };
        let mut buf = Vec::new();
        Packet::Opaque(raw.clone())
            .encode(&mut Encoder::new(&mut buf), ProtocolVersion::V1_20_2, &registry)
            .unwrap();
        let mut decoder = Decoder::new(&buf);
        match Packet::decode(&mut decoder, ProtocolVersion::V1_20_2, &registry).unwrap() {
            Packet::Opaque(decoded) => assert_eq!(decoded, raw),
            other => panic!("0x2a serverbound should be opaque, got {other:?}"),
        }
    }

    #[test]
    fn settings_intercepted_in_play() {
        let registry = PacketRegistry::build().unwrap();
        let settings = ClientSettings {
            locale: "en_US".to_owned(),
            view_distance: 12,
            chat_visibility: 0,
            chat_colors: true,
            difficulty: 0,
            skin_parts: 0x7f,
            main_hand: 1,
            chat_filtering_enabled: false,
            client_listing_allowed: true,
            tail: Vec::new(),
        };
        let mut buf = Vec::new();
        Packet::ClientSettings(settings.clone())
            .encode(&mut Encoder::new(&mut buf), ProtocolVersion::V1_20_2, &registry)
            .unwrap();
        let mut decoder = Decoder::new(&buf);
        match Packet::decode(&mut decoder, ProtocolVersion::V1_20_2, &registry).unwrap() {
            Packet::ClientSettings(decoded) => assert_eq!(decoded, settings),
            other => panic!("wrong packet {other:?}"),
        }
    }
}
