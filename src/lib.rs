//! rust-torrent-client
//!
//! A BitTorrent download engine: peer wire protocol, UDP/HTTP tracker
//! discovery and a download orchestrator with pause, resume and cancel.

pub mod torrent;
pub mod protocol;
pub mod peer;
pub mod storage;
pub mod tracker;
pub mod download;
pub mod cli;
pub mod error;

pub use error::TorrentError;

pub use torrent::{TorrentParser, TorrentInfo, BLOCK_LEN};
pub use protocol::{Handshake, Message, MessageId, MessageFramer};
pub use peer::{PeerConnection, PeerHost, Peer, PeerSnapshot};
pub use storage::{OutputFile, PieceTracker};
pub use tracker::{PeerDiscovery, TrackerClient};
pub use download::{
    Downloader, Settings, DownloadStatus, ProgressSnapshot, DownloadSummary,
    HistoryEntry, ProgressSink, NullSink,
};
pub use cli::{CliArgs, Config, ProgressDisplay};
