//! A transparent proxy for Minecraft: Java Edition.
//!
//! The proxy terminates the Minecraft wire protocol with each player,
//! logs them in (optionally against the session servers), establishes a
//! matching connection to one of the configured backend servers, and
//! relays gameplay traffic between the two. Players can be handed from
//! one backend to another mid-session without their client ever seeing a
//! socket close.
//!
//! # Connection lifecycle
//! A session starts in the Handshake state and follows the client's
//! declared intent into Status (answered locally or passed through) or
//! Login. After login the proxy consults the router — forced hosts first,
//! then the configured try order — and drives the chosen backend through
//! its own handshake and login, injecting the player's identity according
//! to the forwarding scheme (legacy BungeeCord hostnames, BungeeGuard
//! tokens, or HMAC-signed modern forwarding). From then on the session
//! bridges the two sockets, interpreting only the handful of packets the
//! proxy must see: keep-alives, client settings, plugin channel
//! registrations, disconnects, and the configuration re-entry dance of
//! 1.20.2+. Everything else is re-framed and forwarded verbatim.
//!
//! Backend failures during play feed the same router walk, and a
//! replacement backend is attached behind a dimension-refresh sequence
//! the client interprets as an ordinary world change.

pub mod auth;
pub mod backend;
pub mod bridge;
pub mod config;
pub mod connection;
pub mod context;
pub mod crypto;
pub mod error;
pub mod events;
pub mod forward;
pub mod listener;
pub mod protocol;
pub mod router;
pub mod session;
pub mod switch;
