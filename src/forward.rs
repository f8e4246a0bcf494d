//! Identity forwarding to backends.
//!
//! Three schemes, selected per server: LEGACY smuggles the identity
//! through the handshake hostname, BUNGEEGUARD adds an authenticating
//! token property on top, and MODERN answers the backend's login plugin
//! request with an HMAC-signed payload.

use crate::{
    auth::GameProfile,
    protocol::{
        packet::client::login::PlayerKey, packet::server::login::ProfileProperty, Encoder,
    },
};
use hmac::{Hmac, Mac};
use sha2::Sha256;
use std::net::IpAddr;

type HmacSha256 = Hmac<Sha256>;

/// The login-plugin channel modern forwarding negotiates on.
pub const MODERN_CHANNEL: &str = "velocity:player_info";

/// Property name carrying the shared secret under BungeeGuard.
pub const BUNGEE_GUARD_PROPERTY: &str = "bungeeguard-token";

/// Default modern forwarding payload revision.
pub const MODERN_DEFAULT: i32 = 1;
/// Revision adding the signed chat key.
pub const MODERN_WITH_KEY: i32 = 2;

/// Builds the rewritten handshake `server_address` for LEGACY forwarding:
/// `hostname\0client_ip\0undashed_uuid\0properties_json`.
///
/// `guard_token`, when present, is appended to the property list as the
/// BungeeGuard authentication token.
pub fn legacy_handshake_address(
    vhost: &str,
    client_ip: IpAddr,
    profile: &GameProfile,
    guard_token: Option<&str>,
) -> String {
    let mut properties = profile.properties.clone();
    if let Some(token) = guard_token {
        properties.push(ProfileProperty {
            name: BUNGEE_GUARD_PROPERTY.to_owned(),
            value: token.to_owned(),
            signature: None,
        });
    }
    let properties_json =
        serde_json::to_string(&properties).expect("profile properties always serialize");

    format!(
        "{vhost}\0{client_ip}\0{}\0{properties_json}",
        profile.uuid.simple()
    )
}

/// Picks the payload revision to answer a `velocity:player_info` request
/// with: the backend's requested revision, capped by what we can satisfy.
pub fn choose_modern_version(request_data: &[u8], key: Option<&PlayerKey>) -> i32 {
    let requested = request_data
        .first()
        .copied()
        .map(i32::from)
        .unwrap_or(MODERN_DEFAULT);
    let supported = if key.is_some() {
        MODERN_WITH_KEY
    } else {
        MODERN_DEFAULT
    };
    requested.clamp(MODERN_DEFAULT, supported)
}

/// Builds the MODERN forwarding response body: a 32-byte HMAC-SHA256 of
/// the payload, keyed with the forwarding secret, followed by the payload
/// itself.
pub fn build_modern_response(
    secret: &[u8],
    version: i32,
    client_ip: IpAddr,
    profile: &GameProfile,
    key: Option<&PlayerKey>,
) -> Vec<u8> {
    let mut payload = Vec::new();
    let encoder = &mut Encoder::new(&mut payload);
    encoder.write_var_int(version);
    encoder.write_string(&client_ip.to_string());
    encoder.write_uuid(profile.uuid);
    encoder.write_string(&profile.name);
    encoder.write_var_int(profile.properties.len() as i32);
    for property in &profile.properties {
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
    if version >= MODERN_WITH_KEY {
        let key = key.expect("revision with key chosen without one");
        encoder.write_i64(key.expires_at);
        encoder.write_byte_array(&key.public_key);
        encoder.write_byte_array(&key.signature);
    }

    let mut mac = HmacSha256::new_from_slice(secret).expect("HMAC accepts any key length");
    mac.update(&payload);
    let signature = mac.finalize().into_bytes();

    let mut response = Vec::with_capacity(signature.len() + payload.len());
    response.extend_from_slice(&signature);
    response.extend_from_slice(&payload);
    response
}

/// Validates a MODERN response the way a backend does: first 32 bytes are
/// the MAC, the rest is the payload it must sign.
pub fn verify_modern_response(secret: &[u8], response: &[u8]) -> bool {
    if response.len() < 32 {
        return false;
    }
    let (signature, payload) = response.split_at(32);
    let mut mac = HmacSha256::new_from_slice(secret).expect("HMAC accepts any key length");
    mac.update(payload);
    mac.verify_slice(signature).is_ok()
}
