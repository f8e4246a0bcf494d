//! The public TCP endpoint.
//!
//! Binds with the socket options Minecraft servers conventionally use
//! (TCP_NODELAY, IP_TOS 0x18, optionally TCP_FASTOPEN) and spawns one
//! session task per accepted connection. Legacy 0xFE pings are answered
//! here, before any framed packet is read.

use crate::{context::ProxyContext, events::ListenerKind, session};
use anyhow::Context as _;
use socket2::{Domain, Protocol, Socket, Type};
use std::{net::SocketAddr, sync::Arc};
use tokio::{
    io::AsyncWriteExt,
    net::{TcpListener, TcpStream},
};

pub struct Listener {
    listener: TcpListener,
    addr: SocketAddr,
    ctx: Arc<ProxyContext>,
}

impl Listener {
    pub fn bind(ctx: Arc<ProxyContext>) -> anyhow::Result<Self> {
        let addr: SocketAddr = ctx
            .config
            .bind
            .parse()
            .with_context(|| format!("invalid bind address {:?}", ctx.config.bind))?;

        let domain = if addr.is_ipv4() {
            Domain::IPV4
        } else {
            Domain::IPV6
        };
        let socket = Socket::new(domain, Type::STREAM, Some(Protocol::TCP))?;
        socket.set_reuse_address(true)?;
        socket.set_nonblocking(true)?;
        // lowdelay+throughput TOS; not all stacks accept it
        socket.set_tos(0x18).ok();
        #[cfg(target_os = "linux")]
        if ctx.config.advanced.tcp_fast_open {
            use std::os::fd::AsRawFd;
            let queue: libc::c_int = 3;
            let rc = unsafe {
                libc::setsockopt(
                    socket.as_raw_fd(),
                    libc::IPPROTO_TCP,
                    libc::TCP_FASTOPEN,
                    &queue as *const _ as *const libc::c_void,
                    std::mem::size_of_val(&queue) as libc::socklen_t,
                )
            };
            if rc != 0 {
                tracing::warn!("TCP_FASTOPEN not available on this system");
            }
        }
        socket.bind(&addr.into())?;
        socket.listen(1024)?;

        let listener = TcpListener::from_std(socket.into())?;
        // the configured port may be 0; report what the OS picked
        let addr = listener.local_addr()?;
        ctx.events.listener_bound(addr, ListenerKind::Minecraft);
        tracing::info!(%addr, "listening");

        Ok(Listener {
            listener,
            addr,
            ctx,
        })
    }

    pub fn local_addr(&self) -> SocketAddr {
        self.addr
    }

    /// Accepts forever. Cancel (e.g. via `select!` with a shutdown
    /// signal) to stop; `close` announces the teardown afterwards.
    pub async fn serve(&self) {
        loop {
            let (stream, peer) = match self.listener.accept().await {
                Ok(accepted) => accepted,
                Err(error) => {
                    tracing::warn!("failed to accept connection: {error}");
                    continue;
                }
            };
            tracing::debug!(%peer, "accepted connection");

            socket2::SockRef::from(&stream).set_tos(0x18).ok();

            let ctx = self.ctx.clone();
            tokio::spawn(async move {
                match peek_legacy_ping(&stream).await {
                    Ok(true) => answer_legacy_ping(ctx, stream).await,
                    Ok(false) => session::handle_connection(ctx, stream).await,
                    Err(error) => tracing::debug!(%peer, "dropped before handshake: {error}"),
                }
            });
        }
    }

    pub fn close(&self) {
        self.ctx
            .events
            .listener_closed(self.addr, ListenerKind::Minecraft);
        tracing::info!(addr = %self.addr, "listener closed");
    }
}

/// A first byte of 0xFE is the pre-Netty server list ping; anything else
/// is a framed packet.
async fn peek_legacy_ping(stream: &TcpStream) -> std::io::Result<bool> {
    let mut first = [0u8; 1];
    let n = stream.peek(&mut first).await?;
    Ok(n == 1 && first[0] == 0xFE)
}

/// Responds with the 0xFF "kick" status of the 1.4–1.6 ping protocol:
/// `§1\0<protocol>\0<version>\0<motd>\0<online>\0<max>` in UTF-16BE.
async fn answer_legacy_ping(ctx: Arc<ProxyContext>, mut stream: TcpStream) {
    let online = ctx.total_players().await;
    let payload = format!(
        "\u{a7}1\0{}\0{}\0{}\0{}\0{}",
        crate::protocol::ProtocolVersion::MAXIMUM.wire(),
        crate::protocol::ProtocolVersion::MAXIMUM.name(),
        ctx.config.motd,
        online,
        ctx.config.show_max_players,
    );

    let units: Vec<u16> = payload.encode_utf16().collect();
    let mut response = Vec::with_capacity(3 + units.len() * 2);
    response.push(0xFF);
    response.extend_from_slice(&(units.len() as u16).to_be_bytes());
    for unit in units {
        response.extend_from_slice(&unit.to_be_bytes());
    }

    if let Err(error) = stream.write_all(&response).await {
        tracing::debug!("failed to answer legacy ping: {error}");
    }
    stream.shutdown().await.ok();
}
