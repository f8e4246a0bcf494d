use crate::protocol::{
    decoder::{self, Decoder},
    encoder::Encoder,
    packet::{decode_id, encode_id, unexpected, PacketSet},
    registry::{Direction, PacketKind, PacketRegistry, State},
    version::ProtocolVersion,
};
use uuid::Uuid;

#[derive(Debug, Clone, strum::AsRefStr)]
pub enum Packet {
    LoginStart(LoginStart),
    EncryptionResponse(EncryptionResponse),
    LoginPluginResponse(LoginPluginResponse),
    LoginAcknowledged,
}

/// The chat-signing key 1.19–1.19.2 clients attach to login.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlayerKey {
    pub expires_at: i64,
    pub public_key: Vec<u8>,
    pub signature: Vec<u8>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoginStart {
    pub name: String,
    pub uuid: Option<Uuid>,
    pub key: Option<PlayerKey>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EncryptionResponse {
    pub shared_secret: Vec<u8>,
    /// Empty when the 1.19–1.19.2 salt/signature alternative was taken.
    pub verify_token: Vec<u8>,
    pub salt_signature: Option<(i64, Vec<u8>)>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoginPluginResponse {
    pub message_id: i32,
    pub successful: bool,
    pub data: Vec<u8>,
}

const KEY_CAP: usize = 4096;
const SECRET_CAP: usize = 256;

fn read_prefixed<'a>(
    decoder: &mut Decoder<'a>,
    version: ProtocolVersion,
    cap: usize,
) -> decoder::Result<&'a [u8]> {
    // 1.7 length-prefixed arrays with a short; varint from 1.8 on.
    if version < ProtocolVersion::V1_8 {
        let length = decoder.read_u16()? as usize;
        if length > cap {
            return Err(decoder::DecodeError::ArrayTooLong);
        }
        decoder.consume_slice(length)
    } else {
        decoder.read_byte_array(cap)
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

impl LoginStart {
    fn decode_body(decoder: &mut Decoder, version: ProtocolVersion) -> decoder::Result<Self> {
        let name = decoder.read_string_capped(16)?.to_owned();

        let key = if (ProtocolVersion::V1_19..ProtocolVersion::V1_19_3).contains(&version) {
            if decoder.read_bool()? {
                Some(PlayerKey {
                    expires_at: decoder.read_i64()?,
                    public_key: decoder.read_byte_array(KEY_CAP)?.to_vec(),
                    signature: decoder.read_byte_array(KEY_CAP)?.to_vec(),
                })
            } else {
                None
            }
        } else {
            None
        };

        let uuid = if version >= ProtocolVersion::V1_20_2 {
            Some(decoder.read_uuid()?)
        } else if version >= ProtocolVersion::V1_19_1 {
            if decoder.read_bool()? {
                Some(decoder.read_uuid()?)
            } else {
                None
            }
        } else {
            None
        };

        Ok(LoginStart { name, uuid, key })
    }

    fn encode_body(&self, encoder: &mut Encoder, version: ProtocolVersion) {
        encoder.write_string(&self.name);

        if (ProtocolVersion::V1_19..ProtocolVersion::V1_19_3).contains(&version) {
            match &self.key {
                Some(key) => {
                    encoder.write_bool(true);
                    encoder.write_i64(key.expires_at);
                    encoder.write_byte_array(&key.public_key);
                    encoder.write_byte_array(&key.signature);
                }
                None => encoder.write_bool(false),
            }
        }

        if version >= ProtocolVersion::V1_20_2 {
            encoder.write_uuid(self.uuid.unwrap_or_else(Uuid::nil));
        } else if version >= ProtocolVersion::V1_19_1 {
            match self.uuid {
                Some(uuid) => {
                    encoder.write_bool(true);
                    encoder.write_uuid(uuid);
                }
                None => encoder.write_bool(false),
            }
        }
    }
}

impl PacketSet for Packet {
    const STATE: State = State::Login;
    const DIRECTION: Direction = Direction::ServerBound;

    fn decode(
        decoder: &mut Decoder,
        version: ProtocolVersion,
        registry: &PacketRegistry,
    ) -> decoder::Result<Self> {
        let (id, kind) = decode_id(decoder, Self::STATE, Self::DIRECTION, version, registry)?;
        match kind {
            Some(PacketKind::LoginStart) => Ok(Packet::LoginStart(LoginStart::decode_body(
                decoder, version,
            )?)),
            Some(PacketKind::EncryptionResponse) => {
                let shared_secret = read_prefixed(decoder, version, SECRET_CAP)?.to_vec();
                let (verify_token, salt_signature) =
                    if (ProtocolVersion::V1_19..ProtocolVersion::V1_19_3).contains(&version) {
                        if decoder.read_bool()? {
                            (read_prefixed(decoder, version, SECRET_CAP)?.to_vec(), None)
                        } else {
                            let salt = decoder.read_i64()?;
                            let signature = decoder.read_byte_array(KEY_CAP)?.to_vec();
                            (Vec::new(), Some((salt, signature)))
                        }
                    } else {
                        (read_prefixed(decoder, version, SECRET_CAP)?.to_vec(), None)
                    };
                Ok(Packet::EncryptionResponse(EncryptionResponse {
                    shared_secret,
                    verify_token,
                    salt_signature,
                }))
            }
            Some(PacketKind::LoginPluginResponse) => {
                Ok(Packet::LoginPluginResponse(LoginPluginResponse {
                    message_id: decoder.read_var_int()?,
                    successful: decoder.read_bool()?,
                    data: decoder.consume_remaining().to_vec(),
                }))
            }
            Some(PacketKind::LoginAcknowledged) => Ok(Packet::LoginAcknowledged),
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
            Packet::LoginStart(start) => {
                encode_id(
                    encoder,
                    Self::STATE,
                    Self::DIRECTION,
                    version,
                    registry,
                    PacketKind::LoginStart,
                )?;
                start.encode_body(encoder, version);
            }
            Packet::EncryptionResponse(response) => {
                encode_id(
                    encoder,
                    Self::STATE,
                    Self::DIRECTION,
                    version,
                    registry,
                    PacketKind::EncryptionResponse,
                )?;
                write_prefixed(encoder, version, &response.shared_secret);
                if (ProtocolVersion::V1_19..ProtocolVersion::V1_19_3).contains(&version) {
                    match &response.salt_signature {
                        Some((salt, signature)) => {
                            encoder.write_bool(false);
                            encoder.write_i64(*salt);
                            encoder.write_byte_array(signature);
                        }
                        None => {
                            encoder.write_bool(true);
                            write_prefixed(encoder, version, &response.verify_token);
                        }
                    }
                } else {
                    write_prefixed(encoder, version, &response.verify_token);
                }
            }
            Packet::LoginPluginResponse(response) => {
                encode_id(
                    encoder,
                    Self::STATE,
                    Self::DIRECTION,
                    version,
                    registry,
                    PacketKind::LoginPluginResponse,
                )?;
                encoder.write_var_int(response.message_id);
                encoder.write_bool(response.successful);
                encoder.write_slice(&response.data);
            }
            Packet::LoginAcknowledged => {
                encode_id(
                    encoder,
                    Self::STATE,
                    Self::DIRECTION,
                    version,
                    registry,
                    PacketKind::LoginAcknowledged,
                )?;
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
    fn login_start_shapes_per_era() {
        let bare = LoginStart {
            name: "Notch".to_owned(),
            uuid: None,
            key: None,
        };
        for version in [
            ProtocolVersion::V1_7_2,
            ProtocolVersion::V1_8,
            ProtocolVersion::V1_12_2,
            ProtocolVersion::V1_18_2,
        ] {
            match round_trip(&Packet::LoginStart(bare.clone()), version) {
                Packet::LoginStart(decoded) => assert_eq!(decoded, bare),
                other => panic!("wrong packet {other:?}"),
            }
        }

        let with_uuid = LoginStart {
            name: "Notch".to_owned(),
            uuid: Some(Uuid::parse_str("069a79f4-44e9-4726-a5be-fca90e38aaf5").unwrap()),
            key: None,
        };
        for version in [
            ProtocolVersion::V1_19_1,
            ProtocolVersion::V1_19_3,
            ProtocolVersion::V1_20_2,
            ProtocolVersion::V1_21,
        ] {
            match round_trip(&Packet::LoginStart(with_uuid.clone()), version) {
                Packet::LoginStart(decoded) => assert_eq!(decoded, with_uuid),
                other => panic!("wrong packet {other:?}"),
            }
        }
    }

    #[test]
    fn login_start_carries_signing_key_on_1_19() {
        let with_key = LoginStart {
            name: "Notch".to_owned(),
            uuid: Some(Uuid::nil()),
            key: Some(PlayerKey {
                expires_at: 1_700_000_000,
                public_key: vec![1, 2, 3],
                signature: vec![4, 5, 6],
            }),
        };
        match round_trip(&Packet::LoginStart(with_key.clone()), ProtocolVersion::V1_19_1) {
            Packet::LoginStart(decoded) => assert_eq!(decoded, with_key),
            other => panic!("wrong packet {other:?}"),
        }
    }

    #[test]
    fn encryption_response_legacy_short_arrays() {
        let response = EncryptionResponse {
            shared_secret: vec![0xAA; 128],
            verify_token: vec![0xBB; 128],
            salt_signature: None,
        };
        // 1.7 used short prefixes: the wire must be 2 bytes per prefix.
        let registry = PacketRegistry::build().unwrap();
        let mut buf = Vec::new();
        Packet::EncryptionResponse(response.clone())
            .encode(&mut Encoder::new(&mut buf), ProtocolVersion::V1_7_2, &registry)
            .unwrap();
        assert_eq!(buf.len(), 1 + 2 + 128 + 2 + 128);

        match round_trip(
            &Packet::EncryptionResponse(response.clone()),
            ProtocolVersion::V1_7_2,
        ) {
            Packet::EncryptionResponse(decoded) => assert_eq!(decoded, response),
            other => panic!("wrong packet {other:?}"),
        }
    }

    #[test]
    fn encryption_response_salt_signature_variant() {
        let response = EncryptionResponse {
            shared_secret: vec![0xAA; 128],
            verify_token: Vec::new(),
            salt_signature: Some((42, vec![9, 9, 9])),
        };
        match round_trip(
            &Packet::EncryptionResponse(response.clone()),
            ProtocolVersion::V1_19,
        ) {
            Packet::EncryptionResponse(decoded) => assert_eq!(decoded, response),
            other => panic!("wrong packet {other:?}"),
        }
    }
}
