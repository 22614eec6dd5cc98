//! UDP tracker protocol
//!
//! Connectionless two-step exchange: a connect request obtains a connection
//! id, then an announce request returns compact peers. One timeout covers
//! the whole exchange and there is no retry.

use std::net::SocketAddr;
use std::time::Duration;

use anyhow::Result;
use tokio::net::{lookup_host, UdpSocket};
use tokio::time::timeout;
use tracing::{debug, info, trace, warn};
use url::Url;

use super::parse_compact_peers;
use crate::error::TorrentError;

/// Magic connection id for connect requests
pub const PROTOCOL_ID: u64 = 0x41727101980;
pub const ACTION_CONNECT: u32 = 0;
pub const ACTION_ANNOUNCE: u32 = 1;
/// Port used when the announce URL carries none
pub const DEFAULT_PORT: u16 = 80;

const CONNECT_REQUEST_LEN: usize = 16;
const ANNOUNCE_REQUEST_LEN: usize = 98;
const ANNOUNCE_HEADER_LEN: usize = 20;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ConnectResponse {
    pub action: u32,
    pub transaction_id: u32,
    pub connection_id: u64,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AnnounceResponse {
    pub action: u32,
    pub transaction_id: u32,
    pub leechers: u32,
    pub seeders: u32,
    pub peers: Vec<SocketAddr>,
}

/// Build the 16-byte connect request
pub fn build_connect_request(transaction_id: u32) -> [u8; CONNECT_REQUEST_LEN] {
    let mut buf = [0u8; CONNECT_REQUEST_LEN];
    buf[0..8].copy_from_slice(&PROTOCOL_ID.to_be_bytes());
    buf[8..12].copy_from_slice(&ACTION_CONNECT.to_be_bytes());
    buf[12..16].copy_from_slice(&transaction_id.to_be_bytes());
    buf
}

fn read_u32(buf: &[u8], at: usize) -> u32 {
    u32::from_be_bytes([buf[at], buf[at + 1], buf[at + 2], buf[at + 3]])
}

/// Action field of a tracker datagram
pub fn response_action(resp: &[u8]) -> Option<u32> {
    (resp.len() >= 4).then(|| read_u32(resp, 0))
}

pub fn parse_connect_response(resp: &[u8]) -> Result<ConnectResponse> {
    if resp.len() < 16 {
        return Err(TorrentError::tracker_error_with_url(
            format!("Connect response too short: {} bytes", resp.len()),
            "udp",
        )
        .into());
    }

    let mut connection_id = [0u8; 8];
    connection_id.copy_from_slice(&resp[8..16]);
    Ok(ConnectResponse {
        action: read_u32(resp, 0),
        transaction_id: read_u32(resp, 4),
        connection_id: u64::from_be_bytes(connection_id),
    })
}

/// Build the 98-byte announce request.
///
/// `left` is written in full 64-bit precision.
#[allow(clippy::too_many_arguments)]
pub fn build_announce_request(
    connection_id: u64,
    transaction_id: u32,
    info_hash: &[u8; 20],
    peer_id: &[u8; 20],
    left: u64,
    key: u32,
    port: u16,
) -> Vec<u8> {
    let mut buf = Vec::with_capacity(ANNOUNCE_REQUEST_LEN);
    buf.extend_from_slice(&connection_id.to_be_bytes());
    buf.extend_from_slice(&ACTION_ANNOUNCE.to_be_bytes());
    buf.extend_from_slice(&transaction_id.to_be_bytes());
    buf.extend_from_slice(info_hash);
    buf.extend_from_slice(peer_id);
    buf.extend_from_slice(&0u64.to_be_bytes()); // downloaded
    buf.extend_from_slice(&left.to_be_bytes());
    buf.extend_from_slice(&0u64.to_be_bytes()); // uploaded
    buf.extend_from_slice(&0u32.to_be_bytes()); // event
    buf.extend_from_slice(&0u32.to_be_bytes()); // ip
    buf.extend_from_slice(&key.to_be_bytes());
    buf.extend_from_slice(&(-1i32).to_be_bytes()); // num_want
    buf.extend_from_slice(&port.to_be_bytes());
    buf
}

pub fn parse_announce_response(resp: &[u8]) -> Result<AnnounceResponse> {
    if resp.len() < ANNOUNCE_HEADER_LEN {
        return Err(TorrentError::tracker_error_with_url(
            format!("Announce response too short: {} bytes", resp.len()),
            "udp",
        )
        .into());
    }

    Ok(AnnounceResponse {
        action: read_u32(resp, 0),
        transaction_id: read_u32(resp, 4),
        leechers: read_u32(resp, 8),
        seeders: read_u32(resp, 12),
        peers: parse_compact_peers(&resp[ANNOUNCE_HEADER_LEN..]),
    })
}

async fn resolve(url: &Url) -> Result<SocketAddr> {
    let host = url
        .host_str()
        .ok_or_else(|| TorrentError::tracker_error_with_url("Announce URL has no host", url.as_str()))?;
    let port = url.port().unwrap_or(DEFAULT_PORT);

    let mut addrs = lookup_host((host, port)).await.map_err(|e| {
        TorrentError::tracker_error_full("Failed to resolve tracker", url.as_str(), e.to_string())
    })?;
    addrs
        .next()
        .ok_or_else(|| TorrentError::tracker_error_with_url("Tracker host resolved to nothing", url.as_str()).into())
}

/// Run the connect/announce exchange and return the announced peers
pub async fn announce(
    url: &Url,
    info_hash: &[u8; 20],
    peer_id: &[u8; 20],
    left: u64,
    port: u16,
    limit: Duration,
) -> Result<Vec<SocketAddr>> {
    let result = timeout(limit, exchange(url, info_hash, peer_id, left, port)).await;
    match result {
        Ok(peers) => peers,
        Err(_) => {
            warn!("UDP tracker request timeout after {:?}", limit);
            Err(TorrentError::tracker_error_full("Timed out", url.as_str(), format!("{:?}", limit)).into())
        }
    }
}

async fn exchange(
    url: &Url,
    info_hash: &[u8; 20],
    peer_id: &[u8; 20],
    left: u64,
    port: u16,
) -> Result<Vec<SocketAddr>> {
    let addr = resolve(url).await?;
    let bind_addr = if addr.is_ipv4() { "0.0.0.0:0" } else { "[::]:0" };
    let socket = UdpSocket::bind(bind_addr).await?;
    socket.connect(addr).await?;
    debug!("UDP tracker socket connected to {}", addr);

    let connect_tid: u32 = rand::random();
    socket.send(&build_connect_request(connect_tid)).await?;

    let mut announce_tid = None;
    let mut buf = vec![0u8; 4096];
    loop {
        let n = socket.recv(&mut buf).await?;
        let resp = &buf[..n];
        trace!("UDP tracker datagram of {} bytes", n);

        match response_action(resp) {
            Some(ACTION_CONNECT) => {
                let conn = parse_connect_response(resp)?;
                if conn.transaction_id != connect_tid {
                    debug!("Ignoring connect response with foreign transaction id");
                    continue;
                }
                info!("Received connect response from tracker");

                let tid: u32 = rand::random();
                let request =
                    build_announce_request(conn.connection_id, tid, info_hash, peer_id, left, rand::random(), port);
                socket.send(&request).await?;
                announce_tid = Some(tid);
            }
            Some(ACTION_ANNOUNCE) => {
                let announce = parse_announce_response(resp)?;
                if announce_tid != Some(announce.transaction_id) {
                    debug!("Ignoring announce response with foreign transaction id");
                    continue;
                }
                info!(
                    "Received announce response: {} peers, {} seeders, {} leechers",
                    announce.peers.len(),
                    announce.seeders,
                    announce.leechers
                );
                return Ok(announce.peers);
            }
            other => debug!("Ignoring tracker datagram with action {:?}", other),
        }
    }
}
