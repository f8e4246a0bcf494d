//! The error taxonomy for connection handling.
//!
//! Recoverable network faults on a backend feed the failover path; every
//! other variant is terminal for the connection that observed it. The kick
//! component a client sees is derived here so session code never formats
//! user-facing text inline.

use crate::protocol::{codec::CodecError, packet::Component, DecodeError};

#[derive(Debug, thiserror::Error)]
pub enum ProxyError {
    /// Malformed or out-of-place packets: overlong varints, oversized
    /// frames, unknown ids in strict states, unexpected packets.
    #[error("protocol violation: {0}")]
    Protocol(#[source] anyhow::Error),

    /// Bad verify token, session server rejection.
    #[error("login failed: {0}")]
    Crypto(#[source] anyhow::Error),

    #[error("network: {0}")]
    Network(#[from] std::io::Error),

    #[error("timed out during {0}")]
    Timeout(&'static str),

    #[error("no available servers")]
    NoAvailableServers,

    /// A plugin-denied event, carrying the reason the handler supplied.
    #[error("denied: {}", .0.text())]
    Denied(Component),

    /// The new backend died after the point of no return of a switch.
    #[error("server switch aborted: {0}")]
    SwitchAborted(#[source] anyhow::Error),
}

impl ProxyError {
    pub fn protocol(error: impl Into<anyhow::Error>) -> Self {
        ProxyError::Protocol(error.into())
    }

    pub fn crypto(error: impl Into<anyhow::Error>) -> Self {
        ProxyError::Crypto(error.into())
    }

    /// The chat-formatted reason shown to the player, when one can still
    /// be delivered. Crypto details are deliberately not echoed back.
    pub fn kick_component(&self) -> Component {
        match self {
            ProxyError::Protocol(error) => Component::plain(format!("Invalid packet: {error}")),
            ProxyError::Crypto(_) => Component::plain("Bad login"),
            ProxyError::Network(_) | ProxyError::SwitchAborted(_) => {
                Component::plain("Connection to the server was lost")
            }
            ProxyError::Timeout(state) => Component::plain(format!("Timed out during {state}")),
            ProxyError::NoAvailableServers => {
                Component::plain("Unable to connect you to a server. Please try again later.")
            }
            ProxyError::Denied(reason) => reason.clone(),
        }
    }
}

impl From<DecodeError> for ProxyError {
    fn from(error: DecodeError) -> Self {
        ProxyError::Protocol(error.into())
    }
}

impl From<CodecError> for ProxyError {
    fn from(error: CodecError) -> Self {
        ProxyError::Protocol(error.into())
    }
}

pub type Result<T, E = ProxyError> = std::result::Result<T, E>;
