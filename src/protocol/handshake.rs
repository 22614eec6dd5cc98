//! BitTorrent handshake protocol
//!
//! Handles the initial, uniquely-framed message exchanged on a new peer connection.

use bytes::{BufMut, BytesMut};
use anyhow::Result;
use tracing::{debug, error, info, trace, warn};

use crate::error::TorrentError;

/// BitTorrent protocol identifier string
pub const PROTOCOL_STRING: &str = "BitTorrent protocol";

/// Length of the protocol string
pub const PROTOCOL_LENGTH: u8 = 19;

/// Total length of a handshake with the standard protocol string
pub const HANDSHAKE_LEN: usize = 68;

/// Bytes in a handshake besides the protocol string itself
pub const HANDSHAKE_OVERHEAD: usize = 49;

/// BitTorrent handshake message
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Handshake {
    /// Reserved bytes, always zero on the handshakes we build
    pub reserved: [u8; 8],
    /// Torrent info hash
    pub info_hash: [u8; 20],
    /// Sender's peer ID
    pub peer_id: [u8; 20],
}

impl Handshake {
    /// Create a new handshake with info_hash and peer_id
    pub fn new(info_hash: [u8; 20], peer_id: [u8; 20]) -> Self {
        debug!("Creating new handshake for info_hash: {}", hex::encode(info_hash));
        Self {
            reserved: [0u8; 8],
            info_hash,
            peer_id,
        }
    }

    /// Generate a random peer ID with the "-RT0001-" client prefix
    pub fn generate_peer_id() -> [u8; 20] {
        let mut peer_id = [0u8; 20];
        peer_id[0..8].copy_from_slice(b"-RT0001-");
        peer_id[8..].copy_from_slice(&rand::random::<[u8; 12]>());
        info!("Generated new peer ID: {}", hex::encode(peer_id));
        peer_id
    }

    /// Serialize the handshake to its 68-byte wire form
    pub fn serialize(&self) -> Vec<u8> {
        trace!("Serializing handshake");
        let mut buf = BytesMut::with_capacity(HANDSHAKE_LEN);
        buf.put_u8(PROTOCOL_LENGTH);
        buf.put_slice(PROTOCOL_STRING.as_bytes());
        buf.put_slice(&self.reserved);
        buf.put_slice(&self.info_hash);
        buf.put_slice(&self.peer_id);
        buf.to_vec()
    }

    /// Check whether a complete frame is a handshake.
    ///
    /// True iff the frame length equals `frame[0] + 49` and the protocol
    /// name bytes match.
    pub fn is_handshake(frame: &[u8]) -> bool {
        if frame.len() < HANDSHAKE_LEN {
            return false;
        }
        frame.len() == frame[0] as usize + HANDSHAKE_OVERHEAD
            && &frame[1..20] == PROTOCOL_STRING.as_bytes()
    }

    /// Deserialize a handshake from bytes
    pub fn deserialize(data: &[u8]) -> Result<Self> {
        trace!("Deserializing handshake from {} bytes", data.len());

        if data.len() < HANDSHAKE_LEN {
            error!("Handshake data too short: expected {} bytes, got {}", HANDSHAKE_LEN, data.len());
            return Err(TorrentError::protocol_error_with_source(
                "Handshake data too short",
                format!("expected {} bytes, got {}", HANDSHAKE_LEN, data.len()),
            )
            .into());
        }

        let protocol_length = data[0];
        if protocol_length != PROTOCOL_LENGTH {
            error!("Invalid protocol length: expected {}, got {}", PROTOCOL_LENGTH, protocol_length);
            return Err(TorrentError::protocol_error_with_source(
                "Invalid protocol length",
                format!("expected {}, got {}", PROTOCOL_LENGTH, protocol_length),
            )
            .into());
        }

        if &data[1..20] != PROTOCOL_STRING.as_bytes() {
            error!("Invalid protocol string");
            return Err(TorrentError::protocol_error("Invalid protocol string").into());
        }

        let mut reserved = [0u8; 8];
        reserved.copy_from_slice(&data[20..28]);

        let mut info_hash = [0u8; 20];
        info_hash.copy_from_slice(&data[28..48]);

        let mut peer_id = [0u8; 20];
        peer_id.copy_from_slice(&data[48..68]);
        debug!("Handshake info_hash: {}, peer_id: {}", hex::encode(info_hash), hex::encode(peer_id));

        Ok(Self {
            reserved,
            info_hash,
            peer_id,
        })
    }

    /// Validate the handshake info_hash
    pub fn validate(&self, expected_info_hash: &[u8; 20]) -> bool {
        if self.info_hash != *expected_info_hash {
            warn!("Handshake validation failed: info hash mismatch");
            warn!("  Expected: {}", hex::encode(expected_info_hash));
            warn!("  Got:      {}", hex::encode(self.info_hash));
            return false;
        }
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_handshake_layout() {
        let handshake = Handshake::new([1u8; 20], [2u8; 20]);
        let serialized = handshake.serialize();

        assert_eq!(serialized.len(), HANDSHAKE_LEN);
        assert_eq!(serialized[0], 19);
        assert_eq!(&serialized[1..20], b"BitTorrent protocol");
        assert_eq!(&serialized[20..28], &[0u8; 8]);
        assert_eq!(&serialized[28..48], &[1u8; 20]);
        assert_eq!(&serialized[48..68], &[2u8; 20]);
    }

    #[test]
    fn test_is_handshake_and_recover_info_hash() {
        let info_hash = [9u8; 20];
        let serialized = Handshake::new(info_hash, [3u8; 20]).serialize();

        assert!(Handshake::is_handshake(&serialized));
        let parsed = Handshake::deserialize(&serialized).unwrap();
        assert_eq!(parsed.info_hash, info_hash);
        assert!(parsed.validate(&info_hash));
        assert!(!parsed.validate(&[0u8; 20]));
    }

    #[test]
    fn test_is_handshake_rejects_wrong_length() {
        let mut serialized = Handshake::new([1u8; 20], [2u8; 20]).serialize();
        serialized.push(0);
        assert!(!Handshake::is_handshake(&serialized));
        assert!(!Handshake::is_handshake(&[0, 0, 0, 1, 1]));
    }

    #[test]
    fn test_is_handshake_rejects_other_protocol() {
        let mut serialized = Handshake::new([1u8; 20], [2u8; 20]).serialize();
        serialized[1] = b'X';
        assert!(!Handshake::is_handshake(&serialized));
        assert!(Handshake::deserialize(&serialized).is_err());
    }

    #[test]
    fn test_generate_peer_id() {
        let peer_id = Handshake::generate_peer_id();
        assert_eq!(&peer_id[0..8], b"-RT0001-");
        assert_ne!(peer_id, Handshake::generate_peer_id());
    }
}
