//! Packet bodies that appear in more than one state.

use crate::protocol::{
    decoder::{self, Decoder},
    encoder::Encoder,
    version::ProtocolVersion,
};

/// A custom-payload message. The proxy inspects only channel-registration
/// traffic; everything else rides through untouched.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PluginMessage {
    pub channel: String,
    pub data: Vec<u8>,
}

impl PluginMessage {
    pub fn decode_body(decoder: &mut Decoder, version: ProtocolVersion) -> decoder::Result<Self> {
        let channel = decoder.read_string_capped(256)?.to_owned();
        // 1.7 framed the payload with a short prefix; later versions let it
        // run to the end of the packet.
        let data = if version < ProtocolVersion::V1_8 {
            let length = decoder.read_i16()?;
            if length < 0 {
                return Err(decoder::DecodeError::NegativeLength);
            }
            decoder.consume_slice(length as usize)?.to_vec()
        } else {
            decoder.consume_remaining().to_vec()
        };
        Ok(PluginMessage { channel, data })
    }

    pub fn encode_body(&self, encoder: &mut Encoder, version: ProtocolVersion) {
        encoder.write_string(&self.channel);
        if version < ProtocolVersion::V1_8 {
            encoder.write_i16(self.data.len() as i16);
        }
        encoder.write_slice(&self.data);
    }

    /// Whether this message registers plugin channels (either the legacy
    /// or the namespaced registration channel).
    pub fn is_channel_registration(&self) -> bool {
        self.channel == "REGISTER" || self.channel == "minecraft:register"
    }
}

/// Client settings, cached on the session and replayed into a freshly
/// attached backend during a server switch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClientSettings {
    pub locale: String,
    pub view_distance: i8,
    pub chat_visibility: i32,
    pub chat_colors: bool,
    /// 1.7 only.
    pub difficulty: u8,
    pub skin_parts: u8,
    /// 1.9+.
    pub main_hand: i32,
    /// 1.17+. Carried through unchanged.
    pub chat_filtering_enabled: bool,
    /// 1.18+.
    pub client_listing_allowed: bool,
    /// Fields newer than the proxy understands (1.21.2 particle status
    /// and whatever comes next), echoed verbatim.
    pub tail: Vec<u8>,
}

impl ClientSettings {
    pub fn decode_body(decoder: &mut Decoder, version: ProtocolVersion) -> decoder::Result<Self> {
        let locale = decoder.read_string_capped(16)?.to_owned();
        let view_distance = decoder.read_i8()?;
        let chat_visibility = decoder.read_var_int()?;
        let chat_colors = decoder.read_bool()?;

        let difficulty = if version <= ProtocolVersion::V1_7_6 {
            decoder.read_u8()?
        } else {
            0
        };

        let skin_parts = decoder.read_u8()?;

        let mut main_hand = 1;
        let mut chat_filtering_enabled = false;
        let mut client_listing_allowed = false;
        if version >= ProtocolVersion::V1_9 {
            main_hand = decoder.read_var_int()?;
            if version >= ProtocolVersion::V1_17 {
                chat_filtering_enabled = decoder.read_bool()?;
                if version >= ProtocolVersion::V1_18 {
                    client_listing_allowed = decoder.read_bool()?;
                }
            }
        }

        Ok(ClientSettings {
            locale,
            view_distance,
            chat_visibility,
            chat_colors,
            difficulty,
            skin_parts,
            main_hand,
            chat_filtering_enabled,
            client_listing_allowed,
            tail: decoder.consume_remaining().to_vec(),
        })
    }

    pub fn encode_body(&self, encoder: &mut Encoder, version: ProtocolVersion) {
        encoder.write_string(&self.locale);
        encoder.write_i8(self.view_distance);
        encoder.write_var_int(self.chat_visibility);
        encoder.write_bool(self.chat_colors);

        if version <= ProtocolVersion::V1_7_6 {
            encoder.write_u8(self.difficulty);
        }

        encoder.write_u8(self.skin_parts);

        if version >= ProtocolVersion::V1_9 {
            encoder.write_var_int(self.main_hand);
            if version >= ProtocolVersion::V1_17 {
                encoder.write_bool(self.chat_filtering_enabled);
                if version >= ProtocolVersion::V1_18 {
                    encoder.write_bool(self.client_listing_allowed);
                }
            }
        }

        encoder.write_slice(&self.tail);
    }
}

/// Keep-alive, both directions. The id changed width twice.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct KeepAlive {
    pub id: i64,
}

impl KeepAlive {
    pub fn decode_body(decoder: &mut Decoder, version: ProtocolVersion) -> decoder::Result<Self> {
        let id = if version >= ProtocolVersion::V1_12_2 {
            decoder.read_i64()?
        } else if version >= ProtocolVersion::V1_8 {
            i64::from(decoder.read_var_int()?)
        } else {
            i64::from(decoder.read_i32()?)
        };
        Ok(KeepAlive { id })
    }

    pub fn encode_body(&self, encoder: &mut Encoder, version: ProtocolVersion) {
        if version >= ProtocolVersion::V1_12_2 {
            encoder.write_i64(self.id);
        } else if version >= ProtocolVersion::V1_8 {
            encoder.write_var_int(self.id as i32);
        } else {
            encoder.write_i32(self.id as i32);
        }
    }
}
