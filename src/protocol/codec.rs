//! Frame layer for the vanilla TCP transport.
//! Supports zlib threshold compression and AES/CFB8 encryption.
//!
//! The codec deals in whole frames: byte payloads already stripped of the
//! length prefix and, when compression is on, inflated. Packet-id handling
//! lives a layer above.

use super::{
    decoder::{DecodeError, Decoder},
    encoder::{var_int_size, Encoder},
    MAX_PACKET_SIZE,
};
use aes::{cipher::generic_array::GenericArray, Aes128};
use cfb8::cipher::{BlockDecryptMut, BlockEncryptMut, KeyIvInit};
use flate2::Compression;
use std::{
    io::{Read, Write},
    slice,
};

/// Most traffic crossing the proxy is re-framed, not produced, so time
/// spent compressing harder is wasted.
const COMPRESSION_LEVEL: Compression = Compression::fast();

/// An error in the framing, compression, or cipher layer. All of these are
/// fatal to the connection that observed them.
#[derive(Debug, thiserror::Error)]
pub enum CodecError {
    #[error("frame of {0} bytes exceeds the {MAX_PACKET_SIZE} byte limit")]
    FrameTooLarge(usize),
    #[error("uncompressed frame of {length} bytes at or above threshold {threshold}")]
    BadlyCompressed { length: usize, threshold: usize },
    #[error("claimed uncompressed length {claimed} does not match inflated length {actual}")]
    CompressedLengthMismatch { claimed: usize, actual: usize },
    #[error(transparent)]
    Decode(#[from] DecodeError),
    #[error("zlib: {0}")]
    Zlib(#[from] std::io::Error),
}

pub type Result<T, E = CodecError> = std::result::Result<T, E>;

/// Key used for encryption. Mojang's scheme uses the shared secret as both
/// key and IV.
#[derive(Copy, Clone)]
pub struct EncryptionKey([u8; 16]);

impl EncryptionKey {
    pub fn new(bytes: [u8; 16]) -> Self {
        Self(bytes)
    }
}

impl std::fmt::Debug for EncryptionKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("EncryptionKey(..)")
    }
}

/// Threshold in bytes where a frame will be compressed.
#[derive(Copy, Clone, Debug)]
pub struct CompressionThreshold(usize);

impl CompressionThreshold {
    pub fn new(threshold: usize) -> Self {
        Self(threshold)
    }

    pub fn get(self) -> usize {
        self.0
    }
}

/// Codec state for one direction of one socket.
pub struct FrameCodec {
    /// Buffered incoming bytes, already decrypted.
    read_buffer: Vec<u8>,
    encryption_state: Option<EncryptionState>,
    compression_state: Option<CompressionState>,
}

impl FrameCodec {
    pub fn new() -> Self {
        Self {
            read_buffer: Vec::new(),
            encryption_state: None,
            compression_state: None,
        }
    }

    /// Enables the stream cipher. Once on, it is never removed.
    pub fn enable_encryption(&mut self, key: EncryptionKey) {
        assert!(
            self.encryption_state.is_none(),
            "called enable_encryption() multiple times"
        );
        self.encryption_state = Some(EncryptionState {
            encryptor: cfb8::Encryptor::new(&key.0.into(), &key.0.into()),
            decryptor: cfb8::Decryptor::new(&key.0.into(), &key.0.into()),
        });
    }

    /// Enables threshold compression. Only legal once per connection side.
    pub fn enable_compression(&mut self, threshold: CompressionThreshold) {
        assert!(
            self.compression_state.is_none(),
            "called enable_compression() multiple times"
        );
        self.compression_state = Some(CompressionState { threshold });
    }

    pub fn is_encrypted(&self) -> bool {
        self.encryption_state.is_some()
    }

    /// Encodes a frame payload to wire bytes: length prefix, optional
    /// compression envelope, optional encryption.
    pub fn encode_frame(&mut self, payload: &[u8]) -> Result<Vec<u8>> {
        if payload.len() > MAX_PACKET_SIZE {
            return Err(CodecError::FrameTooLarge(payload.len()));
        }

        let mut wire_buf = match &self.compression_state {
            Some(CompressionState { threshold }) => {
                let (data_length, body) = if payload.len() >= threshold.get() {
                    let mut encoder = flate2::write::ZlibEncoder::new(Vec::new(), COMPRESSION_LEVEL);
                    encoder.write_all(payload)?;
                    (payload.len() as i32, encoder.finish()?)
                } else {
                    // below threshold: sent raw, marked by a zero claim
                    (0, payload.to_vec())
                };
                let mut buf = Vec::with_capacity(body.len() + 8);
                let mut encoder = Encoder::new(&mut buf);
                encoder.write_var_int(var_int_size(data_length) as i32 + body.len() as i32);
                encoder.write_var_int(data_length);
                encoder.write_slice(&body);
                buf
            }
            None => {
                let mut buf = Vec::with_capacity(payload.len() + 5);
                let mut encoder = Encoder::new(&mut buf);
                encoder.write_var_int(payload.len() as i32);
                encoder.write_slice(payload);
                buf
            }
        };

        if let Some(EncryptionState { encryptor, .. }) = &mut self.encryption_state {
            for x in &mut wire_buf {
                let block = slice::from_mut(x);
                encryptor.encrypt_block_mut(GenericArray::from_mut_slice(block));
            }
        }

        Ok(wire_buf)
    }

    /// Gives wire data to the internal read buffer.
    ///
    /// `data` is decrypted in-place; its contents after this call are
    /// unspecified. Call `decode_frame` in a loop afterwards.
    pub fn give_data(&mut self, data: &mut [u8]) {
        if let Some(EncryptionState { decryptor, .. }) = &mut self.encryption_state {
            for byte in data.iter_mut() {
                let block = slice::from_mut(byte);
                decryptor.decrypt_block_mut(GenericArray::from_mut_slice(block));
            }
        }

        self.read_buffer.extend_from_slice(data);
    }

    /// Attempts to decode one frame payload.
    ///
    /// * If not enough data is available, returns `Ok(None)`.
    /// * If a frame was read, returns `Ok(Some(payload))`. More frames may
    ///   be available.
    /// * If an error occurs, returns `Err(e)`, invalidating the stream.
    pub fn decode_frame(&mut self) -> Result<Option<Vec<u8>>> {
        let mut decoder = Decoder::new(&self.read_buffer);
        let (length, prefix_size) = match decoder.read_var_int_with_size() {
            Ok(x) => x,
            // a partial length prefix is just "wait for more"
            Err(DecodeError::EndOfStream(_, _)) => return Ok(None),
            Err(e) => return Err(e.into()),
        };
        let length = usize::try_from(length).map_err(DecodeError::from)?;

        if length > MAX_PACKET_SIZE {
            return Err(CodecError::FrameTooLarge(length));
        }
        let frame = match decoder.consume_slice(length) {
            Ok(x) => x,
            Err(DecodeError::EndOfStream(_, _)) => return Ok(None),
            Err(e) => return Err(e.into()),
        };

        let payload = match &self.compression_state {
            Some(CompressionState { threshold }) => {
                let mut decoder = Decoder::new(frame);
                let claimed = decoder.read_var_int().map_err(CodecError::from)?;
                let claimed = usize::try_from(claimed).map_err(DecodeError::from)?;
                if claimed == 0 {
                    let raw = decoder.buffer();
                    if raw.len() >= threshold.get() {
                        return Err(CodecError::BadlyCompressed {
                            length: raw.len(),
                            threshold: threshold.get(),
                        });
                    }
                    raw.to_vec()
                } else {
                    if claimed < threshold.get() || claimed > MAX_PACKET_SIZE {
                        return Err(CodecError::BadlyCompressed {
                            length: claimed,
                            threshold: threshold.get(),
                        });
                    }
                    let mut buf = Vec::with_capacity(claimed);
                    flate2::read::ZlibDecoder::new(decoder.buffer())
                        .take(MAX_PACKET_SIZE as u64)
                        .read_to_end(&mut buf)?;
                    if buf.len() != claimed {
                        return Err(CodecError::CompressedLengthMismatch {
                            claimed,
                            actual: buf.len(),
                        });
                    }
                    buf
                }
            }
            None => frame.to_vec(),
        };

        self.read_buffer.drain(..prefix_size + length);
        Ok(Some(payload))
    }
}

impl Default for FrameCodec {
    fn default() -> Self {
        Self::new()
    }
}

struct EncryptionState {
    encryptor: cfb8::Encryptor<Aes128>,
    decryptor: cfb8::Decryptor<Aes128>,
}

struct CompressionState {
    threshold: CompressionThreshold,
}
