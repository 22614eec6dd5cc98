//! Peer state module
//!
//! Defines the per-download peer record and connection lifecycle phases.

use std::net::SocketAddr;
use std::time::{Duration, Instant};

use serde::Serialize;

/// Lifecycle of one peer connection
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PeerPhase {
    /// Opening the socket
    #[default]
    Connecting,
    /// Handshake sent, waiting for the reply
    Handshaking,
    /// Interested sent; requesting is gated by the choke flag
    Interested,
    /// Socket torn down
    Closed,
}

impl PeerPhase {
    /// Check if the connection is past the handshake
    pub fn is_established(&self) -> bool {
        matches!(self, PeerPhase::Interested)
    }
}

/// One-second tumbling window speed estimate.
///
/// Bytes accumulate until a full second has elapsed since the previous
/// boundary, at which point the window's rate becomes the reported speed.
/// Within a window the previous speed is held.
#[derive(Debug, Clone, Default)]
pub struct SpeedWindow {
    last_update: Option<Instant>,
    bytes_this_window: u64,
    speed: f64,
}

impl SpeedWindow {
    const WINDOW: Duration = Duration::from_secs(1);

    /// Account `bytes` received at `now` and return the current speed in bytes/s
    pub fn record(&mut self, bytes: u64, now: Instant) -> f64 {
        let Some(last) = self.last_update else {
            self.last_update = Some(now);
            self.bytes_this_window = bytes;
            self.speed = 0.0;
            return self.speed;
        };

        let elapsed = now.saturating_duration_since(last);
        if elapsed >= Self::WINDOW {
            self.speed = self.bytes_this_window as f64 / elapsed.as_secs_f64();
            self.last_update = Some(now);
            self.bytes_this_window = bytes;
        } else {
            self.bytes_this_window += bytes;
        }
        self.speed
    }

    /// Last reported speed in bytes/s
    pub fn speed(&self) -> f64 {
        self.speed
    }
}

/// A peer attached to one download
#[derive(Debug, Clone)]
pub struct Peer {
    /// Connection slot, unique within the download
    pub slot: usize,
    /// Peer address
    pub addr: SocketAddr,
    /// Whether the socket connected
    pub connected: bool,
    /// Download speed estimate
    pub speed: SpeedWindow,
}

impl Peer {
    /// Create a peer record for a freshly connected socket
    pub fn connected(slot: usize, addr: SocketAddr) -> Self {
        Self {
            slot,
            addr,
            connected: true,
            speed: SpeedWindow::default(),
        }
    }

    /// Current speed estimate in bytes/s
    pub fn download_speed(&self) -> f64 {
        self.speed.speed()
    }

    /// Serializable view of this peer
    pub fn snapshot(&self) -> PeerSnapshot {
        PeerSnapshot {
            ip: self.addr.ip().to_string(),
            port: self.addr.port(),
            connected: self.connected,
            download_speed: self.download_speed(),
        }
    }
}

/// Peer entry of a progress snapshot
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PeerSnapshot {
    pub ip: String,
    pub port: u16,
    pub connected: bool,
    pub download_speed: f64,
}
