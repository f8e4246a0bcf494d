//! Per-socket packet I/O.
//!
//! A [`Connection`] owns one TCP socket plus the codec state for each
//! direction, typed by which side of the proxy it is and which protocol
//! state it is in. State transitions consume the connection, so packets
//! can never be encoded against the wrong state's id table.

use crate::protocol::{
    codec::{CompressionThreshold, EncryptionKey, FrameCodec},
    packet::{self, PacketSet, ProtocolState},
    registry::PacketRegistry,
    Decoder, Encoder, ProtocolVersion,
};
use anyhow::{bail, Context};
use std::{marker::PhantomData, net::SocketAddr, sync::Arc, time::Duration};
use tokio::{
    io::{AsyncReadExt, AsyncWriteExt},
    net::{
        tcp::{OwnedReadHalf, OwnedWriteHalf},
        TcpStream,
    },
    sync::Mutex,
    time::timeout,
};

/// Packet I/O over vanilla TCP.
pub struct Connection<Side: packet::Side, State: ProtocolState> {
    send_stream: Mutex<OwnedWriteHalf>,
    recv_stream: Mutex<OwnedReadHalf>,
    send_codec: Mutex<FrameCodec>,
    recv_codec: Mutex<FrameCodec>,
    registry: Arc<PacketRegistry>,
    version: ProtocolVersion,
    peer: SocketAddr,
    _marker: PhantomData<(Side, State)>,
}

impl<Side, State> Connection<Side, State>
where
    Side: packet::Side,
    State: ProtocolState,
{
    pub fn new(stream: TcpStream, registry: Arc<PacketRegistry>) -> anyhow::Result<Self> {
        stream.set_nodelay(true)?;
        let peer = stream.peer_addr()?;
        let (recv_stream, send_stream) = stream.into_split();
        Ok(Self {
            send_stream: Mutex::new(send_stream),
            recv_stream: Mutex::new(recv_stream),
            send_codec: Mutex::new(FrameCodec::new()),
            recv_codec: Mutex::new(FrameCodec::new()),
            registry,
            // the handshake layout is identical at every revision, so any
            // version decodes it; the real one is set right afterwards
            version: ProtocolVersion::MINIMUM,
            peer,
            _marker: PhantomData,
        })
    }

    /// Dials a backend with a connect timeout.
    pub async fn connect(
        addr: &str,
        connect_timeout: Duration,
        registry: Arc<PacketRegistry>,
    ) -> anyhow::Result<Self> {
        let stream = timeout(connect_timeout, TcpStream::connect(addr))
            .await
            .with_context(|| format!("connecting to {addr} timed out"))??;
        Self::new(stream, registry)
    }

    pub fn peer_addr(&self) -> SocketAddr {
        self.peer
    }

    pub fn version(&self) -> ProtocolVersion {
        self.version
    }

    pub fn registry(&self) -> &Arc<PacketRegistry> {
        &self.registry
    }

    /// Fixes the negotiated protocol version. Happens exactly once, at the
    /// Handshake transition.
    pub fn set_version(&mut self, version: ProtocolVersion) {
        self.version = version;
    }

    pub fn enable_compression(&mut self, threshold: CompressionThreshold) {
        self.send_codec.get_mut().enable_compression(threshold);
        self.recv_codec.get_mut().enable_compression(threshold);
    }

    pub fn enable_encryption(&mut self, key: EncryptionKey) {
        self.send_codec.get_mut().enable_encryption(key);
        self.recv_codec.get_mut().enable_encryption(key);
    }

    pub fn switch_state<NewState: ProtocolState>(self) -> Connection<Side, NewState> {
        Connection {
            send_stream: self.send_stream,
            recv_stream: self.recv_stream,
            send_codec: self.send_codec,
            recv_codec: self.recv_codec,
            registry: self.registry,
            version: self.version,
            peer: self.peer,
            _marker: PhantomData,
        }
    }

    pub async fn send_packet(&self, packet: &Side::SendPacket<State>) -> anyhow::Result<()> {
        let mut payload = Vec::new();
        packet.encode(&mut Encoder::new(&mut payload), self.version, &self.registry)?;

        let wire = {
            let mut codec = self.send_codec.lock().await;
            codec.encode_frame(&payload)?
        };
        let mut stream = self.send_stream.lock().await;
        stream.write_all(&wire).await?;
        Ok(())
    }

    /// Receives the next packet.
    ///
    /// Cancellation-safe: both the codec and stream locks are taken before
    /// any byte is consumed, so a cancelled future drops no packet. This
    /// is required so callers can drive `recv_packet` inside `select!`.
    pub async fn recv_packet(&self) -> anyhow::Result<Side::RecvPacket<State>> {
        let mut buffer = [0u8; 4096];
        loop {
            let mut codec = self.recv_codec.lock().await;
            let mut stream = self.recv_stream.lock().await;

            if let Some(frame) = codec.decode_frame()? {
                let mut decoder = Decoder::new(&frame);
                let packet =
                    Side::RecvPacket::<State>::decode(&mut decoder, self.version, &self.registry)?;
                return Ok(packet);
            }

            let bytes_read = stream.read(&mut buffer).await?;
            if bytes_read == 0 {
                bail!(ConnectionClosed);
            }
            codec.give_data(&mut buffer[..bytes_read]);
        }
    }

    /// Flushes and shuts down the write half. Further sends fail.
    pub async fn shutdown(&self) {
        let mut stream = self.send_stream.lock().await;
        stream.shutdown().await.ok();
    }
}

/// Marker error for a cleanly closed peer (EOF).
#[derive(Debug, thiserror::Error)]
#[error("connection closed by peer")]
pub struct ConnectionClosed;

/// Whether an error is a transport-level fault (closed socket, reset,
/// timeout) rather than a protocol violation. Transport faults on a
/// backend feed the failover path.
pub fn is_network_error(error: &anyhow::Error) -> bool {
    error.downcast_ref::<ConnectionClosed>().is_some()
        || error.downcast_ref::<std::io::Error>().is_some()
        || error
            .downcast_ref::<tokio::time::error::Elapsed>()
            .is_some()
}
