use crate::protocol::{
    decoder::{self, Decoder},
    encoder::Encoder,
    packet::{decode_id, encode_id, unexpected, Component, PacketSet},
    registry::{Direction, PacketKind, PacketRegistry, State},
    version::ProtocolVersion,
};
use uuid::Uuid;

#[derive(Debug, Clone, strum::AsRefStr)]
pub enum Packet {
    Disconnect(Disconnect),
    EncryptionRequest(EncryptionRequest),
    LoginSuccess(LoginSuccess),
    SetCompression(SetCompression),
    LoginPluginRequest(LoginPluginRequest),
}

/// Login-state disconnects kept the JSON encoding even after Play moved
/// to NBT components.
#[derive(Debug, Clone)]
pub struct Disconnect {
    pub reason: Component,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EncryptionRequest {
    pub server_id: String,
    pub public_key: Vec<u8>,
    pub verify_token: Vec<u8>,
    /// 1.20.5+: whether the client should hit the session servers.
    pub should_authenticate: bool,
}

/// A signed profile property (skin textures and the like). Serialized to
/// JSON for the legacy forwarding payload.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct ProfileProperty {
    pub name: String,
    pub value: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub signature: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoginSuccess {
    pub uuid: Uuid,
    pub username: String,
    pub properties: Vec<ProfileProperty>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SetCompression {
    pub threshold: i32,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoginPluginRequest {
    pub message_id: i32,
    pub channel: String,
    pub data: Vec<u8>,
}

const KEY_CAP: usize = 4096;

fn read_prefixed<'a>(
    decoder: &mut Decoder<'a>,
    version: ProtocolVersion,
) -> decoder::Result<&'a [u8]> {
    if version < ProtocolVersion::V1_8 {
        let length = decoder.read_u16()? as usize;
        if length > KEY_CAP {
            return Err(decoder::DecodeError::ArrayTooLong);
        }
        decoder.consume_slice(length)
    } else {
        decoder.read_byte_array(KEY_CAP)
    }
}

fn write_prefixed(encoder: &mut Encoder, version: ProtocolVersion, data: &[u8]) {
    if version < ProtocolVersion::V1_8 {
        encoder.write_u16(data.len() as u16);
        encoder.write_slice(data);
    } else {
        encoder.write_byte_array(data);
    }
}

impl LoginSuccess {
    fn decode_body(decoder: &mut Decoder, version: ProtocolVersion) -> decoder::Result<Self> {
        let uuid = if version >= ProtocolVersion::V1_16 {
            decoder.read_uuid()?
        } else {
            let text = decoder.read_string_capped(36)?;
            Uuid::parse_str(text).map_err(|e| decoder::DecodeError::Other(e.into()))?
        };
        let username = decoder.read_string_capped(16)?.to_owned();

        let mut properties = Vec::new();
        if version >= ProtocolVersion::V1_19 {
            let count = decoder.read_var_int()?;
            for _ in 0..count {
                let name = decoder.read_string()?.to_owned();
                let value = decoder.read_string()?.to_owned();
                let signature = if decoder.read_bool()? {
                    Some(decoder.read_string()?.to_owned())
                } else {
                    None
                };
                properties.push(ProfileProperty {
                    name,
                    value,
                    signature,
                });
            }
        }

        // 1.20.5/1.21's strict-error-handling flag, dropped again in
        // 1.21.2. Read and discarded; re-encode writes the default.
        if (ProtocolVersion::V1_20_5..ProtocolVersion::V1_21_2).contains(&version) {
            decoder.read_bool()?;
        }

        Ok(LoginSuccess {
            uuid,
            username,
            properties,
        })
    }

    fn encode_body(&self, encoder: &mut Encoder, version: ProtocolVersion) {
        if version >= ProtocolVersion::V1_16 {
            encoder.write_uuid(self.uuid);
        } else {
            encoder.write_string(&self.uuid.hyphenated().to_string());
        }
        encoder.write_string(&self.username);

        if version >= ProtocolVersion::V1_19 {
            encoder.write_var_int(self.properties.len() as i32);
            for property in &self.properties {
                encoder.write_string(&property.name);
                encoder.write_string(&property.value);
                match &property.signature {
                    Some(signature) => {
                        encoder.write_bool(true);
                        encoder.write_string(signature);
                    }
                    None => encoder.write_bool(false),
                }
            }
        }

        if (ProtocolVersion::V1_20_5..ProtocolVersion::V1_21_2).contains(&version) {
            encoder.write_bool(true);
        }
    }
}

impl PacketSet for Packet {
    const STATE: State = State::Login;
    const DIRECTION: Direction = Direction::ClientBound;

    fn decode(
        decoder: &mut Decoder,
        version: ProtocolVersion,
        registry: &PacketRegistry,
    ) -> decoder::Result<Self> {
        let (id, kind) = decode_id(decoder, Self::STATE, Self::DIRECTION, version, registry)?;
        match kind {
            Some(PacketKind::LoginDisconnect) => Ok(Packet::Disconnect(Disconnect {
                reason: Component::decode_json(decoder)?,
            })),
            Some(PacketKind::EncryptionRequest) => {
                let server_id = decoder.read_string_capped(20)?.to_owned();
                let public_key = read_prefixed(decoder, version)?.to_vec();
                let verify_token = read_prefixed(decoder, version)?.to_vec();
                let should_authenticate = if version >= ProtocolVersion::V1_20_5 {
                    decoder.read_bool()?
                } else {
                    true
                };
                Ok(Packet::EncryptionRequest(EncryptionRequest {
                    server_id,
                    public_key,
                    verify_token,
                    should_authenticate,
                }))
            }
            Some(PacketKind::LoginSuccess) => Ok(Packet::LoginSuccess(
                LoginSuccess::decode_body(decoder, version)?,
            )),
            Some(PacketKind::SetCompression) => Ok(Packet::SetCompression(SetCompression {
                threshold: decoder.read_var_int()?,
            })),
            Some(PacketKind::LoginPluginRequest) => {
                Ok(Packet::LoginPluginRequest(LoginPluginRequest {
                    message_id: decoder.read_var_int()?,
                    channel: decoder.read_string()?.to_owned(),
                    data: decoder.consume_remaining().to_vec(),
                }))
            }
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
            Packet::Disconnect(disconnect) => {
                encode_id(
                    encoder,
                    Self::STATE,
                    Self::DIRECTION,
                    version,
                    registry,
                    PacketKind::LoginDisconnect,
                )?;
                disconnect.reason.encode_json(encoder);
            }
            Packet::EncryptionRequest(request) => {
                encode_id(
                    encoder,
                    Self::STATE,
                    Self::DIRECTION,
                    version,
                    registry,
                    PacketKind::EncryptionRequest,
                )?;
                encoder.write_string(&request.server_id);
                write_prefixed(encoder, version, &request.public_key);
                write_prefixed(encoder, version, &request.verify_token);
                if version >= ProtocolVersion::V1_20_5 {
                    encoder.write_bool(request.should_authenticate);
                }
            }
            Packet::LoginSuccess(success) => {
                encode_id(
                    encoder,
                    Self::STATE,
                    Self::DIRECTION,
                    version,
                    registry,
                    PacketKind::LoginSuccess,
                )?;
                success.encode_body(encoder, version);
            }
            Packet::SetCompression(compression) => {
                encode_id(
                    encoder,
                    Self::STATE,
                    Self::DIRECTION,
                    version,
                    registry,
                    PacketKind::SetCompression,
                )?;
                encoder.write_var_int(compression.threshold);
            }
            Packet::LoginPluginRequest(request) => {
                encode_id(
                    encoder,
                    Self::STATE,
                    Self::DIRECTION,
                    version,
                    registry,
                    PacketKind::LoginPluginRequest,
                )?;
                encoder.write_var_int(request.message_id);
                encoder.write_string(&request.channel);
                encoder.write_slice(&request.data);
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn round_trip(packet: &Packet, version: ProtocolVersion) -> Packet {
        let registry = PacketRegistry::build().unwrap();
        let mut buf = Vec::new();
        packet
            .encode(&mut Encoder::new(&mut buf), version, &registry)
            .unwrap();
        let mut decoder = Decoder::new(&buf);
        let decoded = Packet::decode(&mut decoder, version, &registry).unwrap();
        assert!(decoder.is_finished());
        decoded
    }

    #[test]
    fn login_success_string_uuid_before_1_16() {
        let success = LoginSuccess {
            uuid: Uuid::parse_str("069a79f4-44e9-4726-a5be-fca90e38aaf5").unwrap(),
            username: "Notch".to_owned(),
            properties: vec![],
        };
        for version in [
            ProtocolVersion::V1_7_6,
            ProtocolVersion::V1_8,
            ProtocolVersion::V1_15_2,
        ] {
            match round_trip(&Packet::LoginSuccess(success.clone()), version) {
                Packet::LoginSuccess(decoded) => assert_eq!(decoded, success),
                other => panic!("wrong packet {other:?}"),
            }
        }
    }

    #[test]
    fn login_success_with_properties() {
        let success = LoginSuccess {
            uuid: Uuid::parse_str("069a79f4-44e9-4726-a5be-fca90e38aaf5").unwrap(),
            username: "Notch".to_owned(),
            properties: vec![ProfileProperty {
                name: "textures".to_owned(),
                value: "ZXlK...".to_owned(),
                signature: Some("sig".to_owned()),
            }],
        };
        for version in [
            ProtocolVersion::V1_19,
            ProtocolVersion::V1_20_2,
            ProtocolVersion::V1_20_5,
            ProtocolVersion::V1_21_2,
        ] {
            match round_trip(&Packet::LoginSuccess(success.clone()), version) {
                Packet::LoginSuccess(decoded) => assert_eq!(decoded, success),
                other => panic!("wrong packet {other:?}"),
            }
        }
    }

    #[test]
    fn encryption_request_round_trip() {
        let request = EncryptionRequest {
            server_id: String::new(),
            public_key: vec![0x30, 0x82, 0x01, 0x22],
            verify_token: vec![1, 2, 3, 4],
            should_authenticate: true,
        };
        for version in [
            ProtocolVersion::V1_7_2,
            ProtocolVersion::V1_8,
            ProtocolVersion::V1_19_4,
            ProtocolVersion::V1_20_5,
        ] {
            match round_trip(&Packet::EncryptionRequest(request.clone()), version) {
                Packet::EncryptionRequest(decoded) => assert_eq!(decoded, request),
                other => panic!("wrong packet {other:?}"),
            }
        }
    }

    #[test]
    fn set_compression_absent_on_1_7() {
        let registry = PacketRegistry::build().unwrap();
        let mut buf = Vec::new();
        let result = Packet::SetCompression(SetCompression { threshold: 256 }).encode(
            &mut Encoder::new(&mut buf),
            ProtocolVersion::V1_7_6,
            &registry,
        );
        assert!(result.is_err());
    }
}
