//! Peer connection module
//!
//! Drives one peer socket: connect, handshake, framed message loop, request
//! pacing and teardown. All download-level decisions go through
//! [`PeerHost`], so a connection never touches shared state directly.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use async_trait::async_trait;
use tokio::io::AsyncReadExt;
use tokio::net::TcpStream;
use tokio::time::timeout;
use tracing::{debug, error, info, trace, warn};

use crate::error::TorrentError;
use crate::peer::dispatch::{dispatch, ConnectionState, Effect};
use crate::peer::state::PeerPhase;
use crate::protocol::{build_request, write_frame, BlockRequest, Handshake, MessageFramer, PieceBlock};

/// What a connection may do at its next decision point
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HostState {
    /// Downloading: requests may be issued
    Active,
    /// Paused: keep the socket, issue nothing
    Paused,
    /// Cancelled, finished or failed: close
    Closed,
}

/// The download side of a peer connection
#[async_trait]
pub trait PeerHost: Send + Sync {
    /// Current gate for this download
    async fn state(&self) -> HostState;

    /// Register a connected peer. Returns false if the download is gone.
    async fn peer_connected(&self, slot: usize, addr: SocketAddr) -> bool;

    /// Atomically claim the next needed block of `piece`
    async fn claim_block(&self, piece: u32) -> Option<BlockRequest>;

    /// Store a received block. Returns true once the whole download is complete.
    async fn deliver(&self, slot: usize, block: PieceBlock) -> Result<bool>;

    /// Unregister a peer and return its unanswered requests to the pool
    async fn peer_closed(&self, slot: usize, outstanding: Vec<BlockRequest>);
}

/// Connection tunables
#[derive(Debug, Clone, Copy)]
pub struct ConnectionConfig {
    pub connect_timeout: Duration,
    pub idle_timeout: Duration,
}

impl Default for ConnectionConfig {
    fn default() -> Self {
        Self {
            connect_timeout: Duration::from_secs(10),
            idle_timeout: Duration::from_secs(10),
        }
    }
}

/// One peer connection bound to a download
pub struct PeerConnection<H: PeerHost> {
    addr: SocketAddr,
    slot: usize,
    info_hash: [u8; 20],
    peer_id: [u8; 20],
    config: ConnectionConfig,
    host: Arc<H>,
    state: ConnectionState,
}

impl<H: PeerHost> PeerConnection<H> {
    pub fn new(
        addr: SocketAddr,
        slot: usize,
        info_hash: [u8; 20],
        peer_id: [u8; 20],
        config: ConnectionConfig,
        host: Arc<H>,
    ) -> Self {
        Self {
            addr,
            slot,
            info_hash,
            peer_id,
            config,
            host,
            state: ConnectionState::default(),
        }
    }

    /// Run the connection to completion. Failures are logged and absorbed.
    pub async fn run(mut self) {
        let stream = match self.connect().await {
            Ok(stream) => stream,
            Err(e) => {
                debug!("Peer {} unreachable: {}", self.addr, e);
                self.host.peer_closed(self.slot, Vec::new()).await;
                return;
            }
        };

        if let Err(e) = self.session(stream).await {
            debug!("Peer {} closed: {}", self.addr, e);
        }

        self.state.phase = PeerPhase::Closed;
        let outstanding = std::mem::take(&mut self.state.outstanding);
        self.host.peer_closed(self.slot, outstanding).await;
    }

    async fn connect(&mut self) -> Result<TcpStream> {
        self.state.phase = PeerPhase::Connecting;
        trace!("Connecting to peer: {}", self.addr);

        let stream = timeout(self.config.connect_timeout, TcpStream::connect(self.addr))
            .await
            .map_err(|e| {
                warn!("Connection timeout to {}", self.addr);
                TorrentError::network_error_full("Connection timeout", self.addr.to_string(), e.to_string())
            })?
            .map_err(|e| {
                TorrentError::network_error_full("Failed to connect", self.addr.to_string(), e.to_string())
            })?;
        Ok(stream)
    }

    async fn session(&mut self, mut stream: TcpStream) -> Result<()> {
        if self.host.state().await == HostState::Closed || !self.host.peer_connected(self.slot, self.addr).await {
            debug!("Download gone before peer {} registered", self.addr);
            return Ok(());
        }
        info!("Connected to peer {}", self.addr);

        let handshake = Handshake::new(self.info_hash, self.peer_id);
        write_frame(&mut stream, &handshake.serialize()).await.map_err(|e| {
            TorrentError::peer_error_full("Failed to send handshake", self.addr.to_string(), e.to_string())
        })?;
        self.state = ConnectionState::handshaking();

        let mut framer = MessageFramer::new();
        let mut buf = vec![0u8; 32 * 1024];

        loop {
            let n = match timeout(self.config.idle_timeout, stream.read(&mut buf)).await {
                Ok(Ok(0)) => {
                    debug!("Peer {} closed the connection", self.addr);
                    return Ok(());
                }
                Ok(Ok(n)) => n,
                Ok(Err(e)) => {
                    return Err(TorrentError::peer_error_full("Read failed", self.addr.to_string(), e.to_string()).into());
                }
                Err(_) => match self.host.state().await {
                    HostState::Paused => continue,
                    _ => {
                        return Err(TorrentError::peer_error_with_peer("Peer timeout", self.addr.to_string()).into());
                    }
                },
            };

            framer.extend(&buf[..n]);
            while let Some(frame) = framer.next_frame().map_err(|e| {
                warn!("Dropping peer {}: {}", self.addr, e);
                e
            })? {
                if self.host.state().await == HostState::Closed {
                    debug!("Download no longer active, dropping peer {}", self.addr);
                    return Ok(());
                }

                for effect in dispatch(&mut self.state, &frame, &self.info_hash) {
                    if !self.apply(&mut stream, effect).await? {
                        return Ok(());
                    }
                }
            }
        }
    }

    /// Perform one effect. Returns false when the connection should close.
    async fn apply(&mut self, stream: &mut TcpStream, effect: Effect) -> Result<bool> {
        match effect {
            Effect::Send(message) => {
                self.send(stream, &message.serialize()).await?;
                Ok(true)
            }
            Effect::RequestNext => {
                self.request_cycle(stream).await?;
                Ok(true)
            }
            Effect::Deliver(block) => {
                let done = self.host.deliver(self.slot, block).await.map_err(|e| {
                    error!("Failed to store block from {}: {}", self.addr, e);
                    e
                })?;
                if done {
                    info!("Download complete, closing peer {}", self.addr);
                    return Ok(false);
                }
                self.request_cycle(stream).await?;
                Ok(true)
            }
            Effect::Close => Ok(false),
        }
    }

    /// Send at most one block request for the oldest queued piece with work left
    async fn request_cycle(&mut self, stream: &mut TcpStream) -> Result<()> {
        if self.state.is_choked() {
            return Ok(());
        }
        if self.host.state().await != HostState::Active {
            trace!("Not requesting from {}: download not active", self.addr);
            return Ok(());
        }

        while let Some(piece) = self.state.queue.peek() {
            if let Some(request) = self.host.claim_block(piece).await {
                debug!(
                    "Requesting piece {} begin {} ({} bytes) from {}",
                    request.index, request.begin, request.length, self.addr
                );
                self.state.track(request);
                self.send(stream, &build_request(request)).await?;
                return Ok(());
            }
            self.state.queue.deque();
        }
        Ok(())
    }

    async fn send(&self, stream: &mut TcpStream, frame: &[u8]) -> Result<()> {
        write_frame(stream, frame).await.map_err(|e| {
            TorrentError::peer_error_full("Failed to send message", self.addr.to_string(), e.to_string()).into()
        })
    }
}

impl<H: PeerHost> std::fmt::Debug for PeerConnection<H> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PeerConnection")
            .field("addr", &self.addr)
            .field("slot", &self.slot)
            .field("phase", &self.state.phase)
            .finish()
    }
}
