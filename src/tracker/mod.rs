//! Tracker client
//!
//! Resolves a torrent's peer list over UDP or HTTP, selected by the announce
//! URL scheme. Every failure is absorbed into an empty peer list.

pub mod http;
pub mod udp;

use std::net::{Ipv4Addr, SocketAddr, SocketAddrV4};
use std::time::Duration;

use anyhow::Result;
use async_trait::async_trait;
use tracing::{debug, info, warn};
use url::Url;

use crate::download::Settings;
use crate::error::TorrentError;
use crate::torrent::TorrentInfo;

/// Source of peer addresses for a torrent
#[async_trait]
pub trait PeerDiscovery: Send + Sync {
    /// Resolve peers for `torrent`. Never fails; problems yield an empty list.
    async fn get_peers(&self, torrent: &TorrentInfo, peer_id: [u8; 20]) -> Vec<SocketAddr>;
}

/// Decode compact peers: 4-byte IPv4 plus 2-byte port, big-endian.
///
/// A trailing group shorter than 6 bytes is discarded.
pub fn parse_compact_peers(data: &[u8]) -> Vec<SocketAddr> {
    data.chunks_exact(6)
        .map(|chunk| {
            let ip = Ipv4Addr::new(chunk[0], chunk[1], chunk[2], chunk[3]);
            let port = u16::from_be_bytes([chunk[4], chunk[5]]);
            SocketAddr::V4(SocketAddrV4::new(ip, port))
        })
        .collect()
}

/// UDP/HTTP tracker client
#[derive(Debug, Clone)]
pub struct TrackerClient {
    http: reqwest::Client,
    timeout: Duration,
    port: u16,
}

impl TrackerClient {
    /// Build a client with the given round-trip timeout and advertised port
    pub fn new(timeout: Duration, port: u16) -> Result<Self> {
        let http = http::build_client(timeout)?;
        Ok(Self { http, timeout, port })
    }

    /// Build a client from engine settings
    pub fn from_settings(settings: &Settings) -> Result<Self> {
        Self::new(settings.tracker_timeout, settings.port)
    }

    /// Announce once and return the peers, propagating failures
    pub async fn announce(&self, torrent: &TorrentInfo, peer_id: [u8; 20]) -> Result<Vec<SocketAddr>> {
        let url = Url::parse(&torrent.announce).map_err(|e| {
            TorrentError::tracker_error_full("Invalid announce URL", torrent.announce.clone(), e.to_string())
        })?;
        let left = torrent.total_size();

        match url.scheme() {
            "udp" => udp::announce(&url, &torrent.info_hash, &peer_id, left, self.port, self.timeout).await,
            "http" | "https" => {
                http::announce(&self.http, &url, &torrent.info_hash, &peer_id, left, self.port).await
            }
            other => Err(TorrentError::tracker_error_full(
                "Unsupported tracker protocol",
                torrent.announce.clone(),
                other.to_string(),
            )
            .into()),
        }
    }
}

#[async_trait]
impl PeerDiscovery for TrackerClient {
    async fn get_peers(&self, torrent: &TorrentInfo, peer_id: [u8; 20]) -> Vec<SocketAddr> {
        info!("Contacting tracker: {}", torrent.announce);
        match self.announce(torrent, peer_id).await {
            Ok(peers) => {
                info!("Found {} peers from tracker", peers.len());
                peers
            }
            Err(e) => {
                warn!("Tracker announce failed: {}", e);
                debug!("Continuing with an empty peer list");
                Vec::new()
            }
        }
    }
}
