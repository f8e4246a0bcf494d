use std::{backtrace::Backtrace, convert::Infallible, fmt, num::TryFromIntError, str::Utf8Error};
use uuid::Uuid;

/// Wraps `std::backtrace::Backtrace` under a different type name so
/// `thiserror`'s derive does not recognize it as a backtrace field (which
/// would require the unstable `error_generic_member_access` feature).
#[derive(Debug)]
pub struct CapturedBacktrace(Backtrace);

impl CapturedBacktrace {
    pub fn capture() -> Self {
        Self(Backtrace::capture())
    }
}

impl fmt::Display for CapturedBacktrace {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(&self.0, f)
    }
}

/// An error while decoding packets.
#[derive(Debug, thiserror::Error)]
pub enum DecodeError {
    #[error("need at least {0} more bytes at {1}")]
    EndOfStream(usize, CapturedBacktrace),
    #[error("invalid boolean pattern {0} - expected either 0 or 1")]
    InvalidBool(u8),
    #[error("varint / varlong is too long")]
    VarIntTooLong,
    #[error("string exceeds max allowed length ({length} > {cap})")]
    StringTooLong { length: usize, cap: usize },
    #[error("byte array exceeds max allowed length")]
    ArrayTooLong,
    #[error("negative length prefix")]
    NegativeLength,
    #[error("malformed NBT tag {0:#04x}")]
    BadNbtTag(u8),
    #[error(transparent)]
    Utf8(#[from] Utf8Error),
    #[error(transparent)]
    IntConversion(#[from] TryFromIntError),
    /// Special variant so integer conversions in generic code work.
    /// Cannot occur.
    #[error(transparent)]
    Infallible(#[from] Infallible),
    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

pub type Result<T, E = DecodeError> = std::result::Result<T, E>;

pub const MAX_STRING_LENGTH: usize = 32767;

/// A raw decoder for a Minecraft bitstream.
#[derive(Debug)]
pub struct Decoder<'a> {
    buffer: &'a [u8],
}

impl<'a> Decoder<'a> {
    /// Creates a decoder from the buffer it will read from.
    pub fn new(buffer: &'a [u8]) -> Self {
        Self { buffer }
    }

    /// Gets the remaining buffer.
    pub fn buffer(&self) -> &'a [u8] {
        self.buffer
    }

    /// Returns if there is no data left in the buffer.
    pub fn is_finished(&self) -> bool {
        self.buffer.is_empty()
    }

    /// Number of unread bytes.
    pub fn remaining(&self) -> usize {
        self.buffer.len()
    }

    /// Consumes `n` bytes from the buffer, returning them as a slice.
    pub fn consume_slice(&mut self, n: usize) -> Result<&'a [u8]> {
        if n <= self.buffer.len() {
            let (data, buffer) = self.buffer.split_at(n);
            self.buffer = buffer;
            Ok(data)
        } else {
            Err(DecodeError::EndOfStream(n, CapturedBacktrace::capture()))
        }
    }

    /// Consumes the rest of the buffer.
    pub fn consume_remaining(&mut self) -> &'a [u8] {
        let data = self.buffer;
        self.buffer = &[];
        data
    }

    /// Consumes `N` bytes into an array.
    pub fn consume<const N: usize>(&mut self) -> Result<[u8; N]> {
        let data = self.consume_slice(N)?;
        Ok(<[u8; N]>::try_from(data).unwrap())
    }

    /// Reads an unsigned byte from the stream.
    pub fn read_u8(&mut self) -> Result<u8> {
        self.consume::<1>().map(|[x]| x)
    }

    /// Reads a signed byte from the stream.
    pub fn read_i8(&mut self) -> Result<i8> {
        self.consume().map(i8::from_be_bytes)
    }

    /// Reads an unsigned short from the stream.
    pub fn read_u16(&mut self) -> Result<u16> {
        self.consume().map(u16::from_be_bytes)
    }

    /// Reads a signed short from the stream.
    pub fn read_i16(&mut self) -> Result<i16> {
        self.consume().map(i16::from_be_bytes)
    }

    /// Reads a signed int from the stream.
    pub fn read_i32(&mut self) -> Result<i32> {
        self.consume().map(i32::from_be_bytes)
    }

    /// Reads a signed long from the stream.
    pub fn read_i64(&mut self) -> Result<i64> {
        self.consume().map(i64::from_be_bytes)
    }

    /// Reads a float from the stream.
    pub fn read_f32(&mut self) -> Result<f32> {
        self.consume().map(f32::from_be_bytes)
    }

    /// Reads a double from the stream.
    pub fn read_f64(&mut self) -> Result<f64> {
        self.consume().map(f64::from_be_bytes)
    }

    /// Reads a boolean from the stream.
    pub fn read_bool(&mut self) -> Result<bool> {
        let x = self.read_u8()?;
        match x {
            0 => Ok(false),
            1 => Ok(true),
            _ => Err(DecodeError::InvalidBool(x)),
        }
    }

    /// Reads a VarInt from the stream.
    pub fn read_var_int(&mut self) -> Result<i32> {
        self.read_var_int_with_size().map(|(x, _)| x)
    }

    /// Reads a VarInt from the stream, additionally
    /// returning the number of bytes read.
    pub fn read_var_int_with_size(&mut self) -> Result<(i32, usize)> {
        let mut num_read = 0;
        let mut result = 0;

        loop {
            let read = self.read_u8()?;
            let value = i32::from(read & 0b0111_1111);
            result |= value.overflowing_shl(7 * num_read).0;

            num_read += 1;

            if num_read > 5 {
                return Err(DecodeError::VarIntTooLong);
            }
            if read & 0b1000_0000 == 0 {
                break;
            }
        }
        Ok((result, num_read as usize))
    }

    /// Reads a VarLong from the stream.
    pub fn read_var_long(&mut self) -> Result<i64> {
        let mut num_read = 0;
        let mut result = 0;

        loop {
            let read = self.read_u8()?;
            let value = i64::from(read & 0b0111_1111);
            result |= value.overflowing_shl(7 * num_read).0;

            num_read += 1;

            if num_read > 10 {
                return Err(DecodeError::VarIntTooLong);
            }
            if read & 0b1000_0000 == 0 {
                break;
            }
        }
        Ok(result)
    }

    /// Reads a string from the stream, enforcing the protocol-wide cap.
    pub fn read_string(&mut self) -> Result<&'a str> {
        self.read_string_capped(MAX_STRING_LENGTH)
    }

    /// Reads a string from the stream with an explicit length cap
    /// (in UTF-16 code units, as the protocol counts them).
    pub fn read_string_capped(&mut self, cap: usize) -> Result<&'a str> {
        let length = self.read_var_int()?;
        if length < 0 {
            return Err(DecodeError::NegativeLength);
        }
        let length = length as usize;

        // 4 bytes per code unit is the worst case for the UTF-8 bytes the
        // wire actually carries.
        if length > cap * 4 {
            return Err(DecodeError::StringTooLong { length, cap });
        }

        let bytes = std::str::from_utf8(self.consume_slice(length)?)?;
        Ok(bytes)
    }

    /// Reads a VarInt-prefixed byte array.
    pub fn read_byte_array(&mut self, cap: usize) -> Result<&'a [u8]> {
        let length = self.read_var_int()?;
        if length < 0 {
            return Err(DecodeError::NegativeLength);
        }
        let length = length as usize;
        if length > cap {
            return Err(DecodeError::ArrayTooLong);
        }
        self.consume_slice(length)
    }

    /// Reads a 128-bit UUID from the stream.
    pub fn read_uuid(&mut self) -> Result<Uuid> {
        let bytes = self.consume::<16>()?;
        Ok(Uuid::from_bytes(bytes))
    }
}

/// A type that can be read from a [`Decoder`].
pub trait Decode: Sized {
    fn decode(decoder: &mut Decoder) -> Result<Self>;
}

impl Decode for u8 {
    fn decode(decoder: &mut Decoder) -> Result<Self> {
        decoder.read_u8()
    }
}

impl Decode for i8 {
    fn decode(decoder: &mut Decoder) -> Result<Self> {
        decoder.read_i8()
    }
}

impl Decode for u16 {
    fn decode(decoder: &mut Decoder) -> Result<Self> {
        decoder.read_u16()
    }
}

impl Decode for i16 {
    fn decode(decoder: &mut Decoder) -> Result<Self> {
        decoder.read_i16()
    }
}

impl Decode for i32 {
    fn decode(decoder: &mut Decoder) -> Result<Self> {
        decoder.read_i32()
    }
}

impl Decode for i64 {
    fn decode(decoder: &mut Decoder) -> Result<Self> {
        decoder.read_i64()
    }
}

impl Decode for f32 {
    fn decode(decoder: &mut Decoder) -> Result<Self> {
        decoder.read_f32()
    }
}

impl Decode for f64 {
    fn decode(decoder: &mut Decoder) -> Result<Self> {
        decoder.read_f64()
    }
}

impl Decode for bool {
    fn decode(decoder: &mut Decoder) -> Result<Self> {
        decoder.read_bool()
    }
}

impl Decode for String {
    fn decode(decoder: &mut Decoder) -> Result<Self> {
        decoder.read_string().map(str::to_owned)
    }
}

impl Decode for Uuid {
    fn decode(decoder: &mut Decoder) -> Result<Self> {
        decoder.read_uuid()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::encoder::Encoder;

    #[test]
    fn var_int_known_values() {
        // (value, wire bytes) pairs from the protocol documentation.
        let cases: &[(i32, &[u8])] = &[
            (0, &[0x00]),
            (1, &[0x01]),
            (127, &[0x7f]),
            (128, &[0x80, 0x01]),
            (255, &[0xff, 0x01]),
            (2097151, &[0xff, 0xff, 0x7f]),
            (2147483647, &[0xff, 0xff, 0xff, 0xff, 0x07]),
            (-1, &[0xff, 0xff, 0xff, 0xff, 0x0f]),
            (-2147483648, &[0x80, 0x80, 0x80, 0x80, 0x08]),
        ];
        for &(value, bytes) in cases {
            let mut decoder = Decoder::new(bytes);
            assert_eq!(decoder.read_var_int().unwrap(), value);
            assert!(decoder.is_finished());

            let mut buf = Vec::new();
            Encoder::new(&mut buf).write_var_int(value);
            assert_eq!(buf, bytes);
        }
    }

    #[test]
    fn overlong_var_int_rejected() {
        let mut decoder = Decoder::new(&[0x80, 0x80, 0x80, 0x80, 0x80, 0x01]);
        assert!(matches!(
            decoder.read_var_int(),
            Err(DecodeError::VarIntTooLong)
        ));
    }

    #[test]
    fn string_cap_enforced() {
        let mut buf = Vec::new();
        Encoder::new(&mut buf).write_string("abcdefghijklmnopqrstuvwxyz");
        let mut decoder = Decoder::new(&buf);
        assert!(matches!(
            decoder.read_string_capped(4),
            Err(DecodeError::StringTooLong { .. })
        ));
    }

    #[test]
    fn uuid_round_trip() {
        let id = Uuid::parse_str("069a79f4-44e9-4726-a5be-fca90e38aaf5").unwrap();
        let mut buf = Vec::new();
        Encoder::new(&mut buf).write_uuid(id);
        let mut decoder = Decoder::new(&buf);
        assert_eq!(decoder.read_uuid().unwrap(), id);
    }

    #[test]
    fn truncated_read_reports_end_of_stream() {
        let mut decoder = Decoder::new(&[0x00, 0x01]);
        assert!(matches!(
            decoder.read_i64(),
            Err(DecodeError::EndOfStream(8, _))
        ));
    }
}
