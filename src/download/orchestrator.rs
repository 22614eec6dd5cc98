//! Download orchestrator
//!
//! Owns every logical download: resolves peers, opens the output file, fans
//! out to a bounded set of peer connections, aggregates progress and exposes
//! pause, resume and cancel.

use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, Instant};

use anyhow::Result;
use async_trait::async_trait;
use chrono::Utc;
use tokio::sync::{Mutex, RwLock};
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::download::progress::ProgressSink;
use crate::download::record::{Download, DownloadStatus, DownloadSummary, HistoryEntry, ProgressSnapshot};
use crate::download::registry::{DownloadHandle, DownloadRegistry};
use crate::peer::{ConnectionConfig, HostState, Peer, PeerConnection, PeerHost};
use crate::protocol::{BlockRequest, Handshake, PieceBlock};
use crate::storage::{OutputFile, PieceTracker};
use crate::torrent::TorrentInfo;
use crate::tracker::{PeerDiscovery, TrackerClient};

/// Engine tunables
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Settings {
    /// Peers connected per download; extra tracker peers are ignored
    pub max_peers: usize,
    pub connect_timeout: Duration,
    pub peer_idle_timeout: Duration,
    pub tracker_timeout: Duration,
    /// Port advertised to trackers
    pub port: u16,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            max_peers: 10,
            connect_timeout: Duration::from_secs(10),
            peer_idle_timeout: Duration::from_secs(10),
            tracker_timeout: Duration::from_secs(15),
            port: 6881,
        }
    }
}

impl Settings {
    pub fn connection_config(&self) -> ConnectionConfig {
        ConnectionConfig {
            connect_timeout: self.connect_timeout,
            idle_timeout: self.peer_idle_timeout,
        }
    }
}

struct Shared {
    registry: RwLock<DownloadRegistry>,
    discovery: Arc<dyn PeerDiscovery>,
    sink: Arc<dyn ProgressSink>,
    settings: Settings,
    peer_id: [u8; 20],
}

/// Entry point for starting and controlling downloads
#[derive(Clone)]
pub struct Downloader {
    shared: Arc<Shared>,
}

impl std::fmt::Debug for Downloader {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Downloader")
            .field("settings", &self.shared.settings)
            .field("peer_id", &hex::encode(self.shared.peer_id))
            .finish()
    }
}

impl Downloader {
    pub fn new(discovery: Arc<dyn PeerDiscovery>, sink: Arc<dyn ProgressSink>, settings: Settings) -> Self {
        Self {
            shared: Arc::new(Shared {
                registry: RwLock::new(DownloadRegistry::new()),
                discovery,
                sink,
                settings,
                peer_id: Handshake::generate_peer_id(),
            }),
        }
    }

    /// Downloader announcing through the real UDP/HTTP tracker client
    pub fn with_tracker(settings: Settings, sink: Arc<dyn ProgressSink>) -> Result<Self> {
        let tracker = TrackerClient::from_settings(&settings)?;
        Ok(Self::new(Arc::new(tracker), sink, settings))
    }

    /// Local peer id used in handshakes and announces
    pub fn peer_id(&self) -> [u8; 20] {
        self.shared.peer_id
    }

    pub fn settings(&self) -> &Settings {
        &self.shared.settings
    }

    /// Register a download and return its id. Progress continues in the background.
    pub async fn start_download(&self, info: TorrentInfo, output_path: impl Into<PathBuf>, id: Option<String>) -> String {
        let id = id.unwrap_or_else(|| Uuid::new_v4().to_string());
        let output_path = output_path.into();
        info!("Starting download {} ({}) -> {}", id, info.name, output_path.display());

        let download = Download::new(id.clone(), Arc::new(info), output_path);
        let snapshot = download.snapshot();
        let handle: DownloadHandle = Arc::new(Mutex::new(download));

        self.shared.registry.write().await.insert(id.clone(), handle.clone());
        self.shared.sink.publish(snapshot);

        let shared = self.shared.clone();
        tokio::spawn(run_download(shared, handle));
        id
    }

    /// `downloading` → `paused`. False for any other state or unknown id.
    pub async fn pause_download(&self, id: &str) -> bool {
        self.transition(id, DownloadStatus::Downloading, DownloadStatus::Paused).await
    }

    /// `paused` → `downloading`. False for any other state or unknown id.
    pub async fn resume_download(&self, id: &str) -> bool {
        self.transition(id, DownloadStatus::Paused, DownloadStatus::Downloading).await
    }

    async fn transition(&self, id: &str, from: DownloadStatus, to: DownloadStatus) -> bool {
        let Some(handle) = self.shared.registry.read().await.get(id) else {
            return false;
        };

        let mut download = handle.lock().await;
        if download.status != from {
            debug!("Ignoring {} for download {} in state {}", to, id, download.status);
            return false;
        }

        download.status = to;
        download.paused_at = (to == DownloadStatus::Paused).then(Utc::now);
        info!("Download {} is now {}", id, to);
        self.shared.sink.publish(download.snapshot());
        true
    }

    /// Cancel a non-terminal download: close its file and drop it from the active set
    pub async fn cancel_download(&self, id: &str) -> bool {
        let Some(handle) = self.shared.registry.read().await.get(id) else {
            return false;
        };

        let (file, snapshot) = {
            let mut download = handle.lock().await;
            if download.status.is_terminal() {
                debug!("Download {} already {}, not cancelling", id, download.status);
                return false;
            }
            download.status = DownloadStatus::Cancelled;
            (download.file.take(), download.snapshot())
        };

        self.shared.registry.write().await.remove(id);
        if let Some(file) = file {
            file.close().await;
        }

        info!("Download {} cancelled", id);
        self.shared.sink.publish(snapshot);
        true
    }

    /// Summaries of every resident download, including terminal ones
    pub async fn list_active_downloads(&self) -> Vec<DownloadSummary> {
        let handles = self.shared.registry.read().await.handles();
        let mut summaries = Vec::with_capacity(handles.len());
        for handle in handles {
            summaries.push(handle.lock().await.summary());
        }
        summaries
    }

    pub async fn get_history(&self) -> Vec<HistoryEntry> {
        self.shared.registry.read().await.history().to_vec()
    }

    /// Current snapshot of a resident download
    pub async fn snapshot(&self, id: &str) -> Option<ProgressSnapshot> {
        let handle = self.shared.registry.read().await.get(id)?;
        let snapshot = handle.lock().await.snapshot();
        Some(snapshot)
    }
}

async fn run_download(shared: Arc<Shared>, handle: DownloadHandle) {
    let (id, info, output_path) = {
        let download = handle.lock().await;
        (download.id.clone(), download.info.clone(), download.output_path.clone())
    };

    let peers = shared.discovery.get_peers(&info, shared.peer_id).await;
    if !shared.registry.read().await.contains(&id) {
        debug!("Download {} cancelled during peer discovery", id);
        return;
    }

    {
        let mut download = handle.lock().await;
        if download.status.is_terminal() {
            return;
        }
        download.total_peers = peers.len();
        download.status = DownloadStatus::Downloading;
        download.pieces = Some(PieceTracker::new(&info));
    }

    let file = match OutputFile::create(&output_path).await {
        Ok(file) => Arc::new(file),
        Err(e) => {
            error!("Download {} failed: {}", id, e);
            let mut download = handle.lock().await;
            if download.status != DownloadStatus::Cancelled {
                download.status = DownloadStatus::Error;
                download.error = Some(e.to_string());
                shared.sink.publish(download.snapshot());
            }
            return;
        }
    };

    let session = Arc::new(DownloadSession {
        id: id.clone(),
        shared: shared.clone(),
        handle: handle.clone(),
    });

    {
        let mut download = handle.lock().await;
        if download.status == DownloadStatus::Cancelled {
            drop(download);
            file.close().await;
            return;
        }
        download.file = Some(file);
        shared.sink.publish(download.snapshot());

        if download.pieces.as_ref().is_some_and(PieceTracker::is_done) {
            drop(download);
            session.finish().await;
            return;
        }
    }

    let config = shared.settings.connection_config();
    let selected: Vec<SocketAddr> = peers.into_iter().take(shared.settings.max_peers).collect();
    info!("Download {}: connecting to {} peers", id, selected.len());

    for (slot, addr) in selected.into_iter().enumerate() {
        let connection = PeerConnection::new(addr, slot, info.info_hash, shared.peer_id, config, session.clone());
        tokio::spawn(connection.run());
    }
}

/// The download as seen by its peer connections
struct DownloadSession {
    id: String,
    shared: Arc<Shared>,
    handle: DownloadHandle,
}

impl DownloadSession {
    /// Mark the download completed, close the file and record history
    async fn finish(&self) {
        let (entry, file, snapshot) = {
            let mut download = self.handle.lock().await;
            if download.status == DownloadStatus::Completed {
                return;
            }
            let entry = download.complete();
            (entry, download.file.take(), download.snapshot())
        };

        if let Some(file) = file {
            file.close().await;
        }
        self.shared.registry.write().await.push_history(entry);
        info!("Download {} completed!", self.id);
        self.shared.sink.publish(snapshot);
    }
}

#[async_trait]
impl PeerHost for DownloadSession {
    async fn state(&self) -> HostState {
        match self.handle.lock().await.status {
            DownloadStatus::Starting | DownloadStatus::Downloading => HostState::Active,
            DownloadStatus::Paused => HostState::Paused,
            _ => HostState::Closed,
        }
    }

    async fn peer_connected(&self, slot: usize, addr: SocketAddr) -> bool {
        let mut download = self.handle.lock().await;
        if download.status.is_terminal() {
            return false;
        }
        download.add_peer(Peer::connected(slot, addr));
        self.shared.sink.publish(download.snapshot());
        true
    }

    async fn claim_block(&self, piece: u32) -> Option<BlockRequest> {
        self.handle.lock().await.pieces.as_mut()?.claim_next_block(piece)
    }

    async fn deliver(&self, slot: usize, block: PieceBlock) -> Result<bool> {
        let request = block.as_request();

        let (file, offset) = {
            let download = self.handle.lock().await;
            match download.status {
                DownloadStatus::Completed => return Ok(true),
                DownloadStatus::Cancelled | DownloadStatus::Error => return Ok(false),
                _ => {}
            }
            let Some(pieces) = download.pieces.as_ref() else {
                return Ok(false);
            };
            if !pieces.fits(&request) {
                warn!(
                    "Download {}: rejecting block piece {} begin {} ({} bytes) outside the torrent layout",
                    self.id, request.index, request.begin, request.length
                );
                return Ok(false);
            }
            if pieces.is_received(&request) {
                return Ok(pieces.is_done());
            }
            let Some(file) = download.file.clone() else {
                return Ok(false);
            };
            (file, download.info.offset_of(block.index, block.begin))
        };

        if let Err(e) = file.write_block(offset, &block.block).await {
            if let Some(pieces) = self.handle.lock().await.pieces.as_mut() {
                pieces.release(&request);
            }
            return Err(e);
        }

        let done = {
            let mut download = self.handle.lock().await;
            if download.status.is_terminal() {
                return Ok(download.status == DownloadStatus::Completed);
            }
            let Some(pieces) = download.pieces.as_mut() else {
                return Ok(false);
            };
            if pieces.is_received(&request) {
                return Ok(pieces.is_done());
            }
            if pieces.add_received(&request) {
                debug!("Download {}: piece {} complete", self.id, block.index);
            }
            let done = pieces.is_done();

            download.record_block(slot, block.block.len() as u64, Instant::now());
            if !done {
                self.shared.sink.publish(download.snapshot());
            }
            done
        };

        if done {
            self.finish().await;
        }
        Ok(done)
    }

    async fn peer_closed(&self, slot: usize, outstanding: Vec<BlockRequest>) {
        let mut download = self.handle.lock().await;
        if let Some(pieces) = download.pieces.as_mut() {
            for request in &outstanding {
                pieces.release(request);
            }
        }
        if download.status == DownloadStatus::Cancelled {
            return;
        }
        if download.remove_peer(slot) {
            download.download_speed = download.aggregate_speed();
            download.eta = download.estimate_eta();
            warn!("Download {}: peer slot {} removed, {} connected", self.id, slot, download.connected_peers);
            self.shared.sink.publish(download.snapshot());
        }
    }
}
