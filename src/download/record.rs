//! Download record
//!
//! The mutable state of one logical download and the serializable views
//! derived from it.

use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Instant;

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::peer::{Peer, PeerSnapshot};
use crate::storage::{OutputFile, PieceTracker};
use crate::torrent::TorrentInfo;

/// Lifecycle of a download
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum DownloadStatus {
    Starting,
    Downloading,
    Paused,
    Completed,
    Cancelled,
    Error,
}

impl DownloadStatus {
    /// Completed, cancelled and error admit no further transitions
    pub fn is_terminal(&self) -> bool {
        matches!(self, DownloadStatus::Completed | DownloadStatus::Cancelled | DownloadStatus::Error)
    }
}

impl fmt::Display for DownloadStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            DownloadStatus::Starting => "starting",
            DownloadStatus::Downloading => "downloading",
            DownloadStatus::Paused => "paused",
            DownloadStatus::Completed => "completed",
            DownloadStatus::Cancelled => "cancelled",
            DownloadStatus::Error => "error",
        };
        f.write_str(s)
    }
}

/// Progress notification payload
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ProgressSnapshot {
    pub id: String,
    pub status: DownloadStatus,
    /// Percentage, 0 to 100
    pub progress: f64,
    pub download_speed: f64,
    pub connected_peers: usize,
    pub total_peers: usize,
    pub downloaded_bytes: u64,
    pub total_bytes: u64,
    /// Seconds remaining; `None` while the aggregate speed is zero
    pub eta: Option<u64>,
    pub peers: Vec<PeerSnapshot>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Entry of the active-download listing
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DownloadSummary {
    pub id: String,
    pub name: String,
    pub status: DownloadStatus,
    pub progress: f64,
    pub download_speed: f64,
    pub connected_peers: usize,
    pub total_peers: usize,
}

/// Immutable record of a completed download
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct HistoryEntry {
    pub id: String,
    pub name: String,
    pub size: u64,
    pub start_time: DateTime<Utc>,
    pub completed_at: DateTime<Utc>,
    /// Elapsed milliseconds
    pub download_time: u64,
}

/// One logical download
#[derive(Debug)]
pub struct Download {
    pub id: String,
    pub info: Arc<TorrentInfo>,
    pub output_path: PathBuf,
    pub status: DownloadStatus,
    pub start_time: DateTime<Utc>,
    pub paused_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
    pub total_bytes: u64,
    pub downloaded_bytes: u64,
    pub progress: f64,
    pub download_speed: f64,
    pub eta: Option<u64>,
    pub connected_peers: usize,
    pub total_peers: usize,
    pub peers: Vec<Peer>,
    pub pieces: Option<PieceTracker>,
    pub file: Option<Arc<OutputFile>>,
    pub error: Option<String>,
}

impl Download {
    /// Fresh record in `starting`
    pub fn new(id: String, info: Arc<TorrentInfo>, output_path: PathBuf) -> Self {
        let total_bytes = info.total_size();
        Self {
            id,
            info,
            output_path,
            status: DownloadStatus::Starting,
            start_time: Utc::now(),
            paused_at: None,
            completed_at: None,
            total_bytes,
            downloaded_bytes: 0,
            progress: 0.0,
            download_speed: 0.0,
            eta: None,
            connected_peers: 0,
            total_peers: 0,
            peers: Vec::new(),
            pieces: None,
            file: None,
            error: None,
        }
    }

    /// Attach a connected peer
    pub fn add_peer(&mut self, peer: Peer) {
        if peer.connected {
            self.connected_peers += 1;
        }
        self.peers.push(peer);
    }

    /// Detach the peer in `slot`. Returns false if it was never attached.
    pub fn remove_peer(&mut self, slot: usize) -> bool {
        let Some(pos) = self.peers.iter().position(|p| p.slot == slot) else {
            return false;
        };
        let peer = self.peers.remove(pos);
        if peer.connected {
            self.connected_peers = self.connected_peers.saturating_sub(1);
        }
        true
    }

    /// Account a newly received block from `slot` and refresh derived figures
    pub fn record_block(&mut self, slot: usize, bytes: u64, now: Instant) {
        self.downloaded_bytes += bytes;
        if let Some(peer) = self.peers.iter_mut().find(|p| p.slot == slot) {
            peer.speed.record(bytes, now);
        }

        self.progress = if self.total_bytes == 0 {
            100.0
        } else {
            self.downloaded_bytes as f64 / self.total_bytes as f64 * 100.0
        };
        self.download_speed = self.aggregate_speed();
        self.eta = self.estimate_eta();
    }

    /// Sum of per-peer speeds
    pub fn aggregate_speed(&self) -> f64 {
        self.peers.iter().map(|p| p.download_speed()).sum()
    }

    /// Remaining seconds at the current aggregate speed
    pub fn estimate_eta(&self) -> Option<u64> {
        if self.download_speed <= 0.0 {
            return None;
        }
        let remaining = self.total_bytes.saturating_sub(self.downloaded_bytes) as f64;
        Some((remaining / self.download_speed).round() as u64)
    }

    /// Transition to `completed` and build the history entry
    pub fn complete(&mut self) -> HistoryEntry {
        let completed_at = Utc::now();
        self.status = DownloadStatus::Completed;
        self.progress = 100.0;
        self.completed_at = Some(completed_at);

        let elapsed = completed_at.signed_duration_since(self.start_time);
        HistoryEntry {
            id: self.id.clone(),
            name: self.info.name.clone(),
            size: self.total_bytes,
            start_time: self.start_time,
            completed_at,
            download_time: elapsed.num_milliseconds().max(0) as u64,
        }
    }

    pub fn snapshot(&self) -> ProgressSnapshot {
        ProgressSnapshot {
            id: self.id.clone(),
            status: self.status,
            progress: self.progress,
            download_speed: self.download_speed,
            connected_peers: self.connected_peers,
            total_peers: self.total_peers,
            downloaded_bytes: self.downloaded_bytes,
            total_bytes: self.total_bytes,
            eta: self.eta,
            peers: self.peers.iter().map(Peer::snapshot).collect(),
            error: self.error.clone(),
        }
    }

    pub fn summary(&self) -> DownloadSummary {
        DownloadSummary {
            id: self.id.clone(),
            name: self.info.name.clone(),
            status: self.status,
            progress: self.progress,
            download_speed: self.download_speed,
            connected_peers: self.connected_peers,
            total_peers: self.total_peers,
        }
    }
}
