//! Player identity: game profiles, offline UUIDs, the Mojang join hash,
//! and the session-authenticator boundary.
//!
//! The HTTPS session client itself lives outside the core; the proxy only
//! defines the call it makes and what comes back.

use crate::protocol::packet::server::login::ProfileProperty;
use async_trait::async_trait;
use md5::{Digest as _, Md5};
use sha1::Sha1;
use std::net::IpAddr;
use uuid::Uuid;

/// The authenticated (or synthesized) identity of a player.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GameProfile {
    pub uuid: Uuid,
    pub name: String,
    pub properties: Vec<ProfileProperty>,
}

impl GameProfile {
    /// Builds the offline-mode profile for `name`: the Java-compatible
    /// UUIDv3 of `OfflinePlayer:<name>`, no properties.
    pub fn offline(name: &str) -> GameProfile {
        GameProfile {
            uuid: offline_uuid(name),
            name: name.to_owned(),
            properties: Vec::new(),
        }
    }
}

/// `UUID.nameUUIDFromBytes("OfflinePlayer:<name>")`: an MD5 with the
/// version nibble forced to 3 and the variant bits to IETF (10xx).
pub fn offline_uuid(name: &str) -> Uuid {
    let mut hasher = Md5::new();
    hasher.update(b"OfflinePlayer:");
    hasher.update(name.as_bytes());
    let mut bytes: [u8; 16] = hasher.finalize().into();
    bytes[6] = (bytes[6] & 0x0f) | 0x30;
    bytes[8] = (bytes[8] & 0x3f) | 0x80;
    Uuid::from_bytes(bytes)
}

/// The hash a client presents to the session servers when joining:
/// `sha1(server_id || shared_secret || public_key_der)` rendered as Java's
/// signed two's-complement hex string.
pub fn server_hash(server_id: &str, shared_secret: &[u8], public_key_der: &[u8]) -> String {
    let mut hasher = Sha1::new();
    hasher.update(server_id.as_bytes());
    hasher.update(shared_secret);
    hasher.update(public_key_der);
    minecraft_hex_digest(&hasher.finalize())
}

/// Java's `new BigInteger(digest).toString(16)`: negative when the high
/// bit is set, rendered as `-` plus the two's complement magnitude, with
/// leading zeroes dropped.
fn minecraft_hex_digest(digest: &[u8]) -> String {
    let negative = digest[0] & 0x80 != 0;
    let mut magnitude = digest.to_vec();
    if negative {
        // two's complement of the whole array
        let mut carry = true;
        for byte in magnitude.iter_mut().rev() {
            *byte = !*byte;
            if carry {
                let (sum, overflow) = byte.overflowing_add(1);
                *byte = sum;
                carry = overflow;
            }
        }
    }
    let hex: String = magnitude.iter().map(|b| format!("{b:02x}")).collect();
    let hex = hex.trim_start_matches('0');
    let hex = if hex.is_empty() { "0" } else { hex };
    if negative {
        format!("-{hex}")
    } else {
        hex.to_owned()
    }
}

#[derive(Debug, thiserror::Error)]
pub enum AuthError {
    /// The session servers did not know about this join.
    #[error("client is not authenticated with the session servers")]
    Unauthorized,
    #[error("session servers unavailable: {0}")]
    Unavailable(#[source] anyhow::Error),
}

/// The session-authentication call, implemented externally over HTTPS.
#[async_trait]
pub trait SessionAuthenticator: Send + Sync {
    async fn authenticate(
        &self,
        name: &str,
        server_hash: &str,
        ip: Option<IpAddr>,
    ) -> Result<GameProfile, AuthError>;
}

/// Placeholder wired in when no real session client is configured. Every
/// online-mode login fails closed.
pub struct UnavailableAuthenticator;

#[async_trait]
impl SessionAuthenticator for UnavailableAuthenticator {
    async fn authenticate(
        &self,
        _name: &str,
        _server_hash: &str,
        _ip: Option<IpAddr>,
    ) -> Result<GameProfile, AuthError> {
        Err(AuthError::Unavailable(anyhow::anyhow!(
            "no session authenticator configured"
        )))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn offline_uuid_is_version_3_variant_ietf() {
        let uuid = offline_uuid("Notch");
        assert_eq!(uuid.get_version_num(), 3);
        // IETF variant: top bits of byte 8 are 10
        assert_eq!(uuid.as_bytes()[8] & 0xc0, 0x80);
    }

    #[test]
    fn offline_uuid_is_deterministic_and_name_sensitive() {
        assert_eq!(offline_uuid("Notch"), offline_uuid("Notch"));
        assert_ne!(offline_uuid("Notch"), offline_uuid("notch"));
    }

    #[test]
    fn offline_uuid_matches_java_construction() {
        // recompute by hand to pin the bit-twiddling
        let mut hasher = Md5::new();
        hasher.update(b"OfflinePlayer:Notch");
        let raw: [u8; 16] = hasher.finalize().into();
        let uuid = offline_uuid("Notch");
        // all bytes equal except the forced version/variant bits
        for (i, (a, b)) in raw.iter().zip(uuid.as_bytes()).enumerate() {
            match i {
                6 => assert_eq!(*b, (a & 0x0f) | 0x30),
                8 => assert_eq!(*b, (a & 0x3f) | 0x80),
                _ => assert_eq!(a, b),
            }
        }
    }

    #[test]
    fn hex_digest_matches_published_vectors() {
        // The well-known test vectors for the join-hash encoding.
        let cases = [
            ("Notch", "4ed1f46bbe04bc756bcb17c0c7ce3e4632f06a48"),
            ("jeb_", "-7c9d5b0044c130109a5d7b5fb5c317c02b4e28c1"),
            ("simon", "88e16a1019277b15d58faf0541e11910eb756f6"),
        ];
        for (input, expected) in cases {
            let mut hasher = Sha1::new();
            hasher.update(input.as_bytes());
            assert_eq!(minecraft_hex_digest(&hasher.finalize()), expected);
        }
    }

    #[test]
    fn server_hash_concatenates_all_parts() {
        let a = server_hash("", b"secret", b"key");
        let b = server_hash("", b"secretk", b"ey");
        // same byte stream, same hash: the parts are raw-concatenated
        assert_eq!(a, b);
        assert_ne!(server_hash("", b"secret", b"key"), server_hash("", b"other", b"key"));
    }
}
