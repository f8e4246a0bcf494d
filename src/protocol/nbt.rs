//! Raw NBT handling.
//!
//! The proxy never needs the structure of an NBT payload, only its extent:
//! dimension registries and 1.16.2+ dimension descriptors are captured as
//! opaque byte ranges and echoed back on re-encode. The one thing written
//! from scratch is a string-tag chat component (1.20.3+ disconnect reasons).

use super::{
    decoder::{DecodeError, Decoder, Result},
    encoder::Encoder,
    version::ProtocolVersion,
};

const TAG_END: u8 = 0;
const TAG_BYTE: u8 = 1;
const TAG_SHORT: u8 = 2;
const TAG_INT: u8 = 3;
const TAG_LONG: u8 = 4;
const TAG_FLOAT: u8 = 5;
const TAG_DOUBLE: u8 = 6;
const TAG_BYTE_ARRAY: u8 = 7;
const TAG_STRING: u8 = 8;
const TAG_LIST: u8 = 9;
const TAG_COMPOUND: u8 = 10;
const TAG_INT_ARRAY: u8 = 11;
const TAG_LONG_ARRAY: u8 = 12;

/// Reads a complete NBT document and returns its raw bytes.
///
/// Since 1.20.2 the network variant drops the root tag's name; earlier
/// versions carry a full named root.
pub fn read_raw<'a>(decoder: &mut Decoder<'a>, version: ProtocolVersion) -> Result<&'a [u8]> {
    let start = decoder.buffer();

    let tag = decoder.read_u8()?;
    if tag == TAG_END {
        // Empty document (used for "no value" slots).
        return Ok(&start[..1]);
    }
    if version < ProtocolVersion::V1_20_2 {
        skip_name(decoder)?;
    }
    skip_payload(decoder, tag, 0)?;

    let consumed = start.len() - decoder.remaining();
    Ok(&start[..consumed])
}

fn skip_name(decoder: &mut Decoder) -> Result<()> {
    let length = decoder.read_u16()? as usize;
    decoder.consume_slice(length)?;
    Ok(())
}

fn skip_payload(decoder: &mut Decoder, tag: u8, depth: usize) -> Result<()> {
    // Bound nesting so a malicious blob cannot blow the stack.
    if depth > 128 {
        return Err(DecodeError::BadNbtTag(tag));
    }
    match tag {
        TAG_BYTE => {
            decoder.read_u8()?;
        }
        TAG_SHORT => {
            decoder.read_i16()?;
        }
        TAG_INT | TAG_FLOAT => {
            decoder.read_i32()?;
        }
        TAG_LONG | TAG_DOUBLE => {
            decoder.read_i64()?;
        }
        TAG_BYTE_ARRAY => {
            let length = read_array_length(decoder)?;
            decoder.consume_slice(length)?;
        }
        TAG_STRING => {
            skip_name(decoder)?;
        }
        TAG_LIST => {
            let element = decoder.read_u8()?;
            let count = read_array_length(decoder)?;
            if element == TAG_END && count > 0 {
                return Err(DecodeError::BadNbtTag(element));
            }
            for _ in 0..count {
                skip_payload(decoder, element, depth + 1)?;
            }
        }
        TAG_COMPOUND => loop {
            let child = decoder.read_u8()?;
            if child == TAG_END {
                break;
            }
            skip_name(decoder)?;
            skip_payload(decoder, child, depth + 1)?;
        },
        TAG_INT_ARRAY => {
            let length = read_array_length(decoder)?;
            decoder.consume_slice(length.checked_mul(4).ok_or(DecodeError::ArrayTooLong)?)?;
        }
        TAG_LONG_ARRAY => {
            let length = read_array_length(decoder)?;
            decoder.consume_slice(length.checked_mul(8).ok_or(DecodeError::ArrayTooLong)?)?;
        }
        other => return Err(DecodeError::BadNbtTag(other)),
    }
    Ok(())
}

fn read_array_length(decoder: &mut Decoder) -> Result<usize> {
    let length = decoder.read_i32()?;
    if length < 0 {
        return Err(DecodeError::NegativeLength);
    }
    Ok(length as usize)
}

/// Writes `text` as a network-NBT string tag. Valid as a chat component
/// root on 1.20.3+, where disconnect reasons stopped being JSON strings.
pub fn write_string_component(encoder: &mut Encoder, text: &str) {
    encoder.write_u8(TAG_STRING);
    let bytes = text.as_bytes();
    encoder.write_u16(bytes.len().try_into().unwrap_or(u16::MAX));
    encoder.write_slice(&bytes[..bytes.len().min(u16::MAX as usize)]);
}

/// Extracts the text of a string-tag component, if that is what the
/// document is. Compound components come back as `None`.
pub fn parse_string_component(raw: &[u8]) -> Option<String> {
    let mut decoder = Decoder::new(raw);
    if decoder.read_u8().ok()? != TAG_STRING {
        return None;
    }
    let length = decoder.read_u16().ok()? as usize;
    let bytes = decoder.consume_slice(length).ok()?;
    String::from_utf8(bytes.to_vec()).ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn named_compound() -> Vec<u8> {
        // {"": {"dim": 1i32, "name": "overworld", "ids": [I; 1, 2]}}
        let mut buf = Vec::new();
        buf.push(TAG_COMPOUND);
        buf.extend_from_slice(&0u16.to_be_bytes());
        buf.push(TAG_INT);
        buf.extend_from_slice(&3u16.to_be_bytes());
        buf.extend_from_slice(b"dim");
        buf.extend_from_slice(&1i32.to_be_bytes());
        buf.push(TAG_STRING);
        buf.extend_from_slice(&4u16.to_be_bytes());
        buf.extend_from_slice(b"name");
        buf.extend_from_slice(&9u16.to_be_bytes());
        buf.extend_from_slice(b"overworld");
        buf.push(TAG_INT_ARRAY);
        buf.extend_from_slice(&3u16.to_be_bytes());
        buf.extend_from_slice(b"ids");
        buf.extend_from_slice(&2i32.to_be_bytes());
        buf.extend_from_slice(&1i32.to_be_bytes());
        buf.extend_from_slice(&2i32.to_be_bytes());
        buf.push(TAG_END);
        buf
    }

    #[test]
    fn captures_whole_named_document() {
        let mut doc = named_compound();
        doc.extend_from_slice(&[0xAA, 0xBB]); // trailing packet data
        let mut decoder = Decoder::new(&doc);
        let raw = read_raw(&mut decoder, ProtocolVersion::V1_16_2).unwrap();
        assert_eq!(raw.len(), doc.len() - 2);
        assert_eq!(decoder.remaining(), 2);
    }

    #[test]
    fn nameless_root_on_modern_versions() {
        // Same document minus the root name.
        let named = named_compound();
        let mut doc = vec![TAG_COMPOUND];
        doc.extend_from_slice(&named[3..]);
        let mut decoder = Decoder::new(&doc);
        let raw = read_raw(&mut decoder, ProtocolVersion::V1_20_3).unwrap();
        assert_eq!(raw.len(), doc.len());
    }

    #[test]
    fn string_component_round_trip() {
        let mut buf = Vec::new();
        write_string_component(&mut Encoder::new(&mut buf), "Server closed");
        assert_eq!(parse_string_component(&buf).as_deref(), Some("Server closed"));

        let mut decoder = Decoder::new(&buf);
        let raw = read_raw(&mut decoder, ProtocolVersion::V1_20_3).unwrap();
        assert_eq!(raw.len(), buf.len());
    }

    #[test]
    fn bad_tag_rejected() {
        let doc = [42u8, 0, 0];
        let mut decoder = Decoder::new(&doc);
        assert!(matches!(
            read_raw(&mut decoder, ProtocolVersion::V1_20_3),
            Err(DecodeError::BadNbtTag(42))
        ));
    }
}
