//! Torrent file parser
//!
//! Decodes bencoded `.torrent` metadata into [`TorrentInfo`].

use std::collections::HashMap;
use std::path::Path;

use anyhow::Result;
use serde_bencode::value::Value;
use tracing::{debug, error, info, trace};

use crate::error::TorrentError;
use crate::torrent::info::{TorrentFile, TorrentInfo};

type Dict = HashMap<Vec<u8>, Value>;

/// Parser for .torrent files
pub struct TorrentParser;

impl TorrentParser {
    /// Parse a .torrent file from bytes
    pub fn parse_bytes(data: &[u8]) -> Result<TorrentInfo> {
        info!("Parsing torrent file from {} bytes", data.len());
        trace!("Torrent data (first 100 bytes): {:?}", &data[..data.len().min(100)]);

        let root: Value = serde_bencode::from_bytes(data).map_err(|e| {
            error!("Failed to decode torrent bencode: {}", e);
            TorrentError::from(e)
        })?;

        let root = match root {
            Value::Dict(d) => d,
            _ => return Err(TorrentError::parse_error("Root must be a dictionary").into()),
        };

        Self::convert_to_torrent_info(&root)
    }

    /// Parse a .torrent file from a file path
    pub fn parse_file(path: &Path) -> Result<TorrentInfo> {
        info!("Loading torrent file from: {}", path.display());

        let data = std::fs::read(path).map_err(|e| {
            error!("Failed to read torrent file '{}': {}", path.display(), e);
            TorrentError::storage_error_full("Failed to read torrent file", path.display().to_string(), e.to_string())
        })?;

        debug!("Read {} bytes from torrent file", data.len());
        Self::parse_bytes(&data)
    }

    fn convert_to_torrent_info(root: &Dict) -> Result<TorrentInfo> {
        let announce = match get_bytes(root, b"announce") {
            Some(bytes) => String::from_utf8_lossy(bytes).to_string(),
            None => first_tier_url(root)
                .ok_or_else(|| TorrentError::parse_error("Missing announce field"))?,
        };

        let info_value = root
            .get(b"info".as_slice())
            .ok_or_else(|| TorrentError::parse_error("Missing info dictionary"))?;
        let info_dict = match info_value {
            Value::Dict(d) => d,
            _ => return Err(TorrentError::parse_error("Info must be a dictionary").into()),
        };

        let name = get_bytes(info_dict, b"name")
            .map(|b| String::from_utf8_lossy(b).to_string())
            .ok_or_else(|| TorrentError::parse_error("Missing name field"))?;

        let piece_length = get_int(info_dict, b"piece length")
            .filter(|len| *len > 0)
            .ok_or_else(|| TorrentError::parse_error("Missing or invalid piece length"))? as u64;

        let pieces_bytes = get_bytes(info_dict, b"pieces")
            .ok_or_else(|| TorrentError::parse_error("Missing pieces field"))?;
        let pieces = TorrentInfo::parse_piece_hashes(pieces_bytes)?;

        let (length, files) = if let Some(len) = get_int(info_dict, b"length") {
            (Some(len.max(0) as u64), None)
        } else if let Some(Value::List(entries)) = info_dict.get(b"files".as_slice()) {
            let mut torrent_files = Vec::with_capacity(entries.len());
            for entry in entries {
                let Value::Dict(file_dict) = entry else {
                    return Err(TorrentError::parse_error("File entry must be a dictionary").into());
                };

                let file_len = get_int(file_dict, b"length")
                    .ok_or_else(|| TorrentError::parse_error("Missing file length"))?;

                let path = match file_dict.get(b"path".as_slice()) {
                    Some(Value::List(components)) => components
                        .iter()
                        .filter_map(|c| match c {
                            Value::Bytes(b) => Some(String::from_utf8_lossy(b).to_string()),
                            _ => None,
                        })
                        .collect(),
                    _ => return Err(TorrentError::parse_error("Missing file path").into()),
                };

                torrent_files.push(TorrentFile {
                    path,
                    length: file_len.max(0) as u64,
                });
            }
            (None, Some(torrent_files))
        } else {
            return Err(TorrentError::parse_error("Neither length nor files found in info dict").into());
        };

        let info_bytes = serde_bencode::to_bytes(info_value).map_err(TorrentError::from)?;
        let info_hash = TorrentInfo::generate_info_hash(&info_bytes);
        debug!("Computed info hash {}", hex::encode(info_hash));

        let torrent = TorrentInfo {
            announce,
            info_hash,
            piece_length,
            pieces,
            name,
            length,
            files,
        };

        if torrent.pieces.len() != torrent.piece_count() {
            return Err(TorrentError::parse_error_with_source(
                "Piece hash count does not match total size",
                format!("expected {}, got {}", torrent.piece_count(), torrent.pieces.len()),
            )
            .into());
        }

        info!("Successfully converted torrent info: {}", torrent.name);
        Ok(torrent)
    }
}

fn get_bytes<'a>(dict: &'a Dict, key: &[u8]) -> Option<&'a [u8]> {
    match dict.get(key) {
        Some(Value::Bytes(b)) => Some(b),
        _ => None,
    }
}

fn get_int(dict: &Dict, key: &[u8]) -> Option<i64> {
    match dict.get(key) {
        Some(Value::Int(i)) => Some(*i),
        _ => None,
    }
}

fn first_tier_url(root: &Dict) -> Option<String> {
    let Some(Value::List(tiers)) = root.get(b"announce-list".as_slice()) else {
        return None;
    };
    tiers.iter().find_map(|tier| match tier {
        Value::List(urls) => urls.iter().find_map(|u| match u {
            Value::Bytes(b) => Some(String::from_utf8_lossy(b).to_string()),
            _ => None,
        }),
        _ => None,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn info_dict_bytes() -> Vec<u8> {
        let mut info = Vec::new();
        info.extend_from_slice(b"d6:lengthi1024e4:name13:test-file.txt12:piece lengthi512e6:pieces40:");
        info.extend_from_slice(&[0xAB; 40]);
        info.push(b'e');
        info
    }

    fn torrent_bytes() -> Vec<u8> {
        let mut data = Vec::new();
        data.extend_from_slice(b"d8:announce39:udp://tracker.example.com:8080/announce4:info");
        data.extend_from_slice(&info_dict_bytes());
        data.push(b'e');
        data
    }

    #[test]
    fn test_parse_single_file() {
        let info = TorrentParser::parse_bytes(&torrent_bytes()).unwrap();
        assert_eq!(info.announce, "udp://tracker.example.com:8080/announce");
        assert_eq!(info.name, "test-file.txt");
        assert_eq!(info.total_size(), 1024);
        assert_eq!(info.piece_length, 512);
        assert_eq!(info.pieces.len(), 2);
        assert_eq!(info.piece_len(1), 512);
        assert!(!info.is_multi_file());
    }

    #[test]
    fn test_info_hash_matches_raw_info_dict() {
        let info = TorrentParser::parse_bytes(&torrent_bytes()).unwrap();
        let expected = TorrentInfo::generate_info_hash(&info_dict_bytes());
        assert_eq!(info.info_hash, expected);
    }

    #[test]
    fn test_parse_multi_file() {
        let mut info = Vec::new();
        info.extend_from_slice(b"d5:filesld6:lengthi300e4:pathl1:a5:b.txteed6:lengthi212e4:pathl5:c.bineee");
        info.extend_from_slice(b"4:name3:dir12:piece lengthi512e6:pieces20:");
        info.extend_from_slice(&[1u8; 20]);
        info.push(b'e');

        let mut data = Vec::new();
        data.extend_from_slice(b"d8:announce20:http://t.example/ann4:info");
        data.extend_from_slice(&info);
        data.push(b'e');

        let parsed = TorrentParser::parse_bytes(&data).unwrap();
        assert!(parsed.is_multi_file());
        assert_eq!(parsed.total_size(), 512);
        let files: Vec<_> = parsed.files_iter().collect();
        assert_eq!(files[0].path, vec!["a".to_string(), "b.txt".to_string()]);
        assert_eq!(files[1].length, 212);
    }

    #[test]
    fn test_announce_list_fallback() {
        let mut data = Vec::new();
        data.extend_from_slice(b"d13:announce-listll17:udp://backup:6969ee4:info");
        data.extend_from_slice(&info_dict_bytes());
        data.push(b'e');

        let parsed = TorrentParser::parse_bytes(&data).unwrap();
        assert_eq!(parsed.announce, "udp://backup:6969");
    }

    #[test]
    fn test_missing_info_is_error() {
        assert!(TorrentParser::parse_bytes(b"d8:announce3:urle").is_err());
    }

    #[test]
    fn test_root_not_dict_is_error() {
        assert!(TorrentParser::parse_bytes(b"i42e").is_err());
    }

    #[test]
    fn test_piece_count_mismatch_is_error() {
        let mut info = Vec::new();
        info.extend_from_slice(b"d6:lengthi2048e4:name1:x12:piece lengthi512e6:pieces20:");
        info.extend_from_slice(&[0u8; 20]);
        info.push(b'e');
        let mut data = b"d8:announce5:udp:x4:info".to_vec();
        data.extend_from_slice(&info);
        data.push(b'e');

        assert!(TorrentParser::parse_bytes(&data).is_err());
    }
}
