//! Torrent metadata module
//!
//! This module provides loading of `.torrent` files and the piece/block
//! geometry accessors used by the download engine.

pub mod parser;
pub mod info;

pub use parser::TorrentParser;
pub use info::{TorrentInfo, TorrentFile, BLOCK_LEN};
