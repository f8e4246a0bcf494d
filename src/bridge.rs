//! Bidirectional packet forwarding between a player and a backend.
//!
//! Packets are received on one side, offered to the interceptor, and
//! written to the other side before the next packet of that direction is
//! read. That inline write is what gives FIFO ordering and natural
//! backpressure: a slow receiver stalls the paired reader, and a stall
//! longer than the write timeout kills the connection.

use crate::{
    connection::Connection,
    context::SwitchRequest,
    protocol::packet::{side, ProtocolState},
};
use std::{future, time::Duration};
use tokio::{select, sync::mpsc, time::timeout};

/// Interceptor ruling on one packet.
#[derive(Debug)]
pub enum Verdict<B> {
    Forward,
    /// Swallow the packet; the other side never sees it.
    Discard,
    /// Forward the packet, then stop bridging.
    BreakAfterForward(B),
    /// Stop bridging without forwarding.
    Break(B),
}

/// Which endpoint of a bridge failed. Backend failures feed failover;
/// client failures end the session.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum Endpoint {
    Client,
    Backend,
}

#[derive(Debug, thiserror::Error)]
#[error("{endpoint:?} endpoint failed")]
pub struct BridgeError {
    pub endpoint: Endpoint,
    #[source]
    pub source: anyhow::Error,
}

/// Per-state packet inspection driven by [`Bridge::run`]. One object sees
/// both directions, so session state (settings cache, keep-alive queue)
/// lives in the interceptor without borrow gymnastics.
pub trait Intercept<State: ProtocolState> {
    type Break;

    fn client_packet(&mut self, packet: &mut State::ClientPacket) -> Verdict<Self::Break>;

    fn server_packet(&mut self, packet: &mut State::ServerPacket) -> Verdict<Self::Break>;

    /// A proxy-initiated switch request arrived while both endpoints are
    /// healthy. `None` drops the request on the floor; states that can
    /// honor it break out to the switch machinery.
    fn switch_request(&mut self, request: SwitchRequest) -> Option<Self::Break> {
        let _ = request;
        None
    }
}

/// Couples a player connection and a backend connection in one state.
pub struct Bridge<State: ProtocolState> {
    client: Connection<side::Server, State>,
    backend: Connection<side::Client, State>,
    write_timeout: Duration,
}

impl<State: ProtocolState> Bridge<State> {
    pub fn new(
        client: Connection<side::Server, State>,
        backend: Connection<side::Client, State>,
        write_timeout: Duration,
    ) -> Self {
        Self {
            client,
            backend,
            write_timeout,
        }
    }

    /// Forwards packets both ways until the interceptor breaks or an
    /// endpoint fails. `switch_requests`, when present, feeds the third
    /// arm: a caller-initiated server switch that interrupts bridging
    /// without either endpoint having failed.
    pub async fn run<I>(
        &mut self,
        interceptor: &mut I,
        mut switch_requests: Option<&mut mpsc::UnboundedReceiver<SwitchRequest>>,
    ) -> Result<I::Break, BridgeError>
    where
        I: Intercept<State>,
    {
        loop {
            select! {
                request = next_switch_request(&mut switch_requests) => {
                    if let Some(value) = interceptor.switch_request(request) {
                        return Ok(value);
                    }
                }
                client_packet = self.client.recv_packet() => {
                    let mut packet = client_packet.map_err(|source| BridgeError {
                        endpoint: Endpoint::Client,
                        source,
                    })?;
                    match interceptor.client_packet(&mut packet) {
                        Verdict::Discard => {}
                        Verdict::Break(value) => return Ok(value),
                        verdict @ (Verdict::Forward | Verdict::BreakAfterForward(_)) => {
                            timeout(self.write_timeout, self.backend.send_packet(&packet))
                                .await
                                .map_err(anyhow::Error::from)
                                .and_then(|result| result)
                                .map_err(|source| BridgeError {
                                    endpoint: Endpoint::Backend,
                                    source,
                                })?;
                            if let Verdict::BreakAfterForward(value) = verdict {
                                return Ok(value);
                            }
                        }
                    }
                }
                backend_packet = self.backend.recv_packet() => {
                    let mut packet = backend_packet.map_err(|source| BridgeError {
                        endpoint: Endpoint::Backend,
                        source,
                    })?;
                    match interceptor.server_packet(&mut packet) {
                        Verdict::Discard => {}
                        Verdict::Break(value) => return Ok(value),
                        verdict @ (Verdict::Forward | Verdict::BreakAfterForward(_)) => {
                            timeout(self.write_timeout, self.client.send_packet(&packet))
                                .await
                                .map_err(anyhow::Error::from)
                                .and_then(|result| result)
                                .map_err(|source| BridgeError {
                                    endpoint: Endpoint::Client,
                                    source,
                                })?;
                            if let Verdict::BreakAfterForward(value) = verdict {
                                return Ok(value);
                            }
                        }
                    }
                }
            }
        }
    }

    pub fn into_parts(
        self,
    ) -> (
        Connection<side::Server, State>,
        Connection<side::Client, State>,
    ) {
        (self.client, self.backend)
    }
}

/// Pends forever when the session carries no request channel (or the
/// sender side is gone), keeping the select arm inert. Cancellation-safe:
/// an unbounded `recv` drops no message when abandoned.
async fn next_switch_request(
    requests: &mut Option<&mut mpsc::UnboundedReceiver<SwitchRequest>>,
) -> SwitchRequest {
    match requests {
        Some(receiver) => match receiver.recv().await {
            Some(request) => request,
            None => future::pending().await,
        },
        None => future::pending().await,
    }
}
