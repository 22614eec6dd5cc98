//! Torrent information structures
//!
//! Provides the read-only metadata accessor used by the download engine:
//! total size, content identifier and piece/block geometry.

use sha1::{Digest, Sha1};
use anyhow::Result;

/// Size of a wire-level block request in bytes
pub const BLOCK_LEN: u32 = 16 * 1024;

/// Represents a file in a multi-file torrent
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TorrentFile {
    /// File path components (e.g., ["folder", "subfolder", "file.txt"])
    pub path: Vec<String>,
    /// File size in bytes
    pub length: u64,
}

/// High-level torrent information
#[derive(Debug, Clone)]
pub struct TorrentInfo {
    /// Primary tracker announce URL
    pub announce: String,
    /// SHA1 hash of the encoded info dictionary
    pub info_hash: [u8; 20],
    /// Nominal size of each piece in bytes
    pub piece_length: u64,
    /// List of piece hashes (each is a 20-byte SHA1 hash)
    pub pieces: Vec<[u8; 20]>,
    /// Torrent name
    pub name: String,
    /// Single file size (None for multi-file torrents)
    pub length: Option<u64>,
    /// Files in multi-file torrents (None for single-file torrents)
    pub files: Option<Vec<TorrentFile>>,
}

impl TorrentInfo {
    /// Calculate total size of all files in torrent
    pub fn total_size(&self) -> u64 {
        if let Some(length) = self.length {
            length
        } else if let Some(files) = &self.files {
            files.iter().map(|f| f.length).sum()
        } else {
            0
        }
    }

    /// Number of pieces implied by the total size and nominal piece length
    pub fn piece_count(&self) -> usize {
        if self.piece_length == 0 {
            return 0;
        }
        self.total_size().div_ceil(self.piece_length) as usize
    }

    /// Length of the piece at `index`; the last piece may be short
    pub fn piece_len(&self, index: u32) -> u32 {
        let count = self.piece_count();
        if (index as usize) >= count {
            return 0;
        }

        if index as usize == count - 1 {
            let remainder = self.total_size() % self.piece_length;
            if remainder != 0 {
                return remainder as u32;
            }
        }

        self.piece_length as u32
    }

    /// Number of 16 KiB blocks in the piece at `index`
    pub fn blocks_per_piece(&self, index: u32) -> u32 {
        self.piece_len(index).div_ceil(BLOCK_LEN)
    }

    /// Length of block `block_index` of piece `index`; the last block of a piece may be short
    pub fn block_len(&self, index: u32, block_index: u32) -> u32 {
        let piece_len = self.piece_len(index);
        let begin = block_index.saturating_mul(BLOCK_LEN);
        if begin >= piece_len {
            return 0;
        }
        (piece_len - begin).min(BLOCK_LEN)
    }

    /// Absolute file offset of a byte inside a piece
    pub fn offset_of(&self, index: u32, begin: u32) -> u64 {
        index as u64 * self.piece_length + begin as u64
    }

    /// Get an iterator over all files in torrent
    pub fn files_iter(&self) -> impl Iterator<Item = TorrentFile> + '_ {
        let name = self.name.clone();
        let length = self.length.unwrap_or(0);

        if let Some(files) = &self.files {
            Box::new(files.iter().cloned()) as Box<dyn Iterator<Item = _> + '_>
        } else if self.length.is_some() {
            Box::new(std::iter::once(TorrentFile {
                path: vec![name],
                length,
            })) as Box<dyn Iterator<Item = _> + '_>
        } else {
            Box::new(std::iter::empty()) as Box<dyn Iterator<Item = _> + '_>
        }
    }

    /// Check if this is a multi-file torrent
    pub fn is_multi_file(&self) -> bool {
        self.files.is_some()
    }

    /// Get info hash as a hex string
    pub fn info_hash_hex(&self) -> String {
        hex::encode(self.info_hash)
    }

    /// Generate info hash from info dictionary bytes
    pub fn generate_info_hash(info_dict_bytes: &[u8]) -> [u8; 20] {
        let mut hasher = Sha1::new();
        hasher.update(info_dict_bytes);
        hasher.finalize().into()
    }

    /// Parse piece hashes from concatenated bytes in torrent file
    pub fn parse_piece_hashes(pieces_bytes: &[u8]) -> Result<Vec<[u8; 20]>> {
        if pieces_bytes.len() % 20 != 0 {
            return Err(anyhow::anyhow!(
                "Pieces field length must be a multiple of 20, got {}",
                pieces_bytes.len()
            ));
        }

        let mut pieces = Vec::with_capacity(pieces_bytes.len() / 20);
        for chunk in pieces_bytes.chunks_exact(20) {
            let mut hash = [0u8; 20];
            hash.copy_from_slice(chunk);
            pieces.push(hash);
        }

        Ok(pieces)
    }
}
