//! HTTP tracker protocol
//!
//! A single GET announce with raw binary parameters percent-encoded byte by
//! byte. The bencoded reply carries compact peers.

use std::fmt::Write as _;
use std::net::{IpAddr, SocketAddr};
use std::time::Duration;

use anyhow::Result;
use serde_bencode::value::Value;
use tracing::{debug, info, warn};
use url::Url;

use super::parse_compact_peers;
use crate::error::TorrentError;

const USER_AGENT: &str = "BitTorrent/1.0";

/// Build the shared HTTP client. Tracker certificates are not validated.
pub fn build_client(timeout: Duration) -> Result<reqwest::Client> {
    let client = reqwest::Client::builder()
        .timeout(timeout)
        .user_agent(USER_AGENT)
        .danger_accept_invalid_certs(true)
        .build()
        .map_err(|e| TorrentError::config_error(format!("Failed to build HTTP client: {}", e)))?;
    Ok(client)
}

/// Encode every byte as `%XX`
pub fn percent_encode_bytes(bytes: &[u8]) -> String {
    let mut out = String::with_capacity(bytes.len() * 3);
    for byte in bytes {
        let _ = write!(out, "%{:02X}", byte);
    }
    out
}

/// Full announce URL with the query string appended.
///
/// `left` is written as the full 64-bit value; sizes of 4 GiB and above are
/// never truncated to their lower 32 bits.
pub fn build_announce_url(base: &Url, info_hash: &[u8; 20], peer_id: &[u8; 20], left: u64, port: u16) -> String {
    let separator = if base.query().is_some() { '&' } else { '?' };
    format!(
        "{}{}info_hash={}&peer_id={}&port={}&uploaded=0&downloaded=0&left={}&compact=1&event=started",
        base,
        separator,
        percent_encode_bytes(info_hash),
        percent_encode_bytes(peer_id),
        port,
        left
    )
}

/// Decode a bencoded announce reply into peers.
///
/// A `failure reason` yields an empty list.
pub fn parse_response(body: &[u8]) -> Result<Vec<SocketAddr>> {
    let value: Value = serde_bencode::from_bytes(body).map_err(TorrentError::from)?;
    let Value::Dict(dict) = value else {
        return Err(TorrentError::tracker_error("Tracker response is not a dictionary").into());
    };

    if let Some(Value::Bytes(reason)) = dict.get(b"failure reason".as_slice()) {
        warn!("Tracker error: {}", String::from_utf8_lossy(reason));
        return Ok(Vec::new());
    }

    let peers = match dict.get(b"peers".as_slice()) {
        Some(Value::Bytes(compact)) => parse_compact_peers(compact),
        Some(Value::List(entries)) => entries.iter().filter_map(dict_peer).collect(),
        _ => Vec::new(),
    };
    Ok(peers)
}

/// Non-compact peer entry: `{ip, port}`
fn dict_peer(entry: &Value) -> Option<SocketAddr> {
    let Value::Dict(peer) = entry else {
        return None;
    };
    let ip = match peer.get(b"ip".as_slice()) {
        Some(Value::Bytes(ip)) => String::from_utf8_lossy(ip).parse::<IpAddr>().ok()?,
        _ => return None,
    };
    let port = match peer.get(b"port".as_slice()) {
        Some(Value::Int(port)) => u16::try_from(*port).ok()?,
        _ => return None,
    };
    Some(SocketAddr::new(ip, port))
}

/// Announce to an HTTP(S) tracker
pub async fn announce(
    client: &reqwest::Client,
    url: &Url,
    info_hash: &[u8; 20],
    peer_id: &[u8; 20],
    left: u64,
    port: u16,
) -> Result<Vec<SocketAddr>> {
    let request_url = build_announce_url(url, info_hash, peer_id, left, port);
    info!("Making HTTP tracker request");
    debug!("Request URL: {}", request_url);

    let response = client
        .get(&request_url)
        .header(reqwest::header::CONNECTION, "close")
        .send()
        .await
        .map_err(TorrentError::from)?;
    let body = response.bytes().await.map_err(TorrentError::from)?;
    debug!("Tracker replied with {} bytes", body.len());

    let peers = parse_response(&body)?;
    info!("Found {} peers from HTTP tracker", peers.len());
    Ok(peers)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpListener;

    #[test]
    fn test_percent_encode_every_byte() {
        assert_eq!(percent_encode_bytes(&[0x00, 0x1A, 0xFF, b'a']), "%00%1A%FF%61");
    }

    #[test]
    fn test_announce_url_parameters() {
        let base = Url::parse("http://tracker.example.com/announce").unwrap();
        let url = build_announce_url(&base, &[0xAB; 20], &[0x01; 20], 5_000_000_000, 6881);

        assert!(url.starts_with("http://tracker.example.com/announce?info_hash=%AB%AB"));
        assert!(url.contains(&format!("peer_id={}", "%01".repeat(20))));
        assert!(url.contains("&port=6881&uploaded=0&downloaded=0&left=5000000000&compact=1&event=started"));
    }

    #[test]
    fn test_left_is_not_truncated_to_32_bits() {
        let base = Url::parse("http://tracker.example.com/announce").unwrap();

        // 4 GiB exactly would read as 0 if only the lower 32 bits were sent
        let url = build_announce_url(&base, &[0; 20], &[0; 20], 1 << 32, 6881);
        assert!(url.contains("&left=4294967296&"));

        let url = build_announce_url(&base, &[0; 20], &[0; 20], u64::MAX, 6881);
        assert!(url.contains("&left=18446744073709551615&"));
    }

    #[test]
    fn test_build_client() {
        assert!(build_client(Duration::from_secs(15)).is_ok());
    }

    #[test]
    fn test_announce_url_keeps_existing_query() {
        let base = Url::parse("http://tracker.example.com/announce?passkey=abc").unwrap();
        let url = build_announce_url(&base, &[0; 20], &[0; 20], 1, 6881);
        assert!(url.contains("passkey=abc&info_hash="));
    }

    #[test]
    fn test_parse_compact_response_drops_partial_group() {
        let mut body = b"d8:intervali1800e5:peers8:".to_vec();
        body.extend_from_slice(&[127, 0, 0, 1, 0x1A, 0xE1, 9, 9]);
        body.push(b'e');

        let peers = parse_response(&body).unwrap();
        assert_eq!(peers, vec!["127.0.0.1:6881".parse::<SocketAddr>().unwrap()]);
    }

    #[test]
    fn test_failure_reason_yields_empty_list() {
        let peers = parse_response(b"d14:failure reason9:not founde").unwrap();
        assert!(peers.is_empty());
    }

    #[test]
    fn test_dictionary_peers() {
        let body = b"d5:peersld2:ip8:10.0.0.14:porti51413eeee";
        let peers = parse_response(body).unwrap();
        assert_eq!(peers, vec!["10.0.0.1:51413".parse::<SocketAddr>().unwrap()]);
    }

    #[test]
    fn test_malformed_body_is_error() {
        assert!(parse_response(b"<html>").is_err());
        assert!(parse_response(b"i3e").is_err());
    }

    #[tokio::test]
    async fn test_announce_against_local_server() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();

        let server = tokio::spawn(async move {
            let (mut stream, _) = listener.accept().await.unwrap();
            let mut request: Vec<u8> = Vec::new();
            let mut buf = [0u8; 1024];
            while !request.windows(4).any(|w| w == b"\r\n\r\n") {
                let n = stream.read(&mut buf).await.unwrap();
                if n == 0 {
                    break;
                }
                request.extend_from_slice(&buf[..n]);
            }

            let mut body = b"d8:intervali900e5:peers6:".to_vec();
            body.extend_from_slice(&[192, 168, 1, 1, 0x1A, 0xE1]);
            body.push(b'e');
            let head = format!(
                "HTTP/1.1 200 OK\r\nContent-Length: {}\r\nConnection: close\r\n\r\n",
                body.len()
            );
            stream.write_all(head.as_bytes()).await.unwrap();
            stream.write_all(&body).await.unwrap();
            String::from_utf8_lossy(&request).to_string()
        });

        let client = reqwest::Client::builder().no_proxy().build().unwrap();
        let url = Url::parse(&format!("http://{}/announce", addr)).unwrap();
        let peers = announce(&client, &url, &[0x07; 20], &[0x02; 20], 4096, 6881).await.unwrap();
        assert_eq!(peers, vec!["192.168.1.1:6881".parse::<SocketAddr>().unwrap()]);

        let request = server.await.unwrap();
        assert!(request.starts_with("GET /announce?info_hash=%07%07"));
        assert!(request.contains("left=4096"));
    }
}
