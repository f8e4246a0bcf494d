//! The event-bus boundary.
//!
//! The proxy core does not implement an event bus; it calls one. Each hook
//! is a synchronous request/response from the core's perspective — however
//! the consumer dispatches it internally. The default implementations
//! allow everything, so a bare proxy runs without any bus at all.

use crate::auth::GameProfile;
use crate::protocol::packet::Component;
use std::net::SocketAddr;

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum ListenerKind {
    Minecraft,
}

/// Outcome of the pre-login gate.
#[derive(Debug, Clone)]
pub enum PreLoginDecision {
    Allow,
    Deny(Component),
}

/// Outcome of the backend-connect gate.
#[derive(Debug, Clone)]
pub enum PreConnectDecision {
    Allow,
    Deny(Component),
    /// Connect to this server instead.
    Reroute(String),
}

/// What to do with a player a backend kicked.
#[derive(Debug, Clone)]
pub enum KickDecision {
    /// Pass the kick on; the player is disconnected.
    Disconnect,
    /// Move the player to this server.
    Reroute(String),
    /// Walk the remaining try-order candidates.
    Fallback,
}

pub trait EventSink: Send + Sync {
    fn listener_bound(&self, _addr: SocketAddr, _kind: ListenerKind) {}

    fn listener_closed(&self, _addr: SocketAddr, _kind: ListenerKind) {}

    fn pre_login(&self, _name: &str, _addr: SocketAddr) -> PreLoginDecision {
        PreLoginDecision::Allow
    }

    /// Last chance to rewrite the profile before `LoginSuccess` goes out.
    fn game_profile_request(&self, profile: GameProfile) -> GameProfile {
        profile
    }

    fn server_pre_connect(&self, _profile: &GameProfile, _target: &str) -> PreConnectDecision {
        PreConnectDecision::Allow
    }

    /// Lets a handler reorder or replace the initial-server candidates.
    fn player_choose_initial_server(
        &self,
        _profile: &GameProfile,
        candidates: Vec<String>,
    ) -> Vec<String> {
        candidates
    }

    fn kicked_from_server(
        &self,
        _profile: &GameProfile,
        _server: &str,
        _reason: Option<&Component>,
        during_play: bool,
    ) -> KickDecision {
        if during_play {
            KickDecision::Fallback
        } else {
            KickDecision::Disconnect
        }
    }
}

/// The do-nothing bus used when no consumer is attached.
pub struct NullEventSink;

impl EventSink for NullEventSink {}
