//! Implements the Minecraft wire protocol across all supported revisions.

pub mod codec;
pub mod decoder;
pub mod encoder;
pub mod nbt;
pub mod packet;
pub mod registry;
pub mod version;

pub use decoder::{Decode, DecodeError, Decoder};
pub use encoder::{Encode, Encoder};
pub use version::ProtocolVersion;

/// Limit on a single frame, either direction. Matches the write buffer
/// high-water mark so one frame can always be flushed.
pub const MAX_PACKET_SIZE: usize = 2 * 1024 * 1024;
