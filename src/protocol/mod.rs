//! BitTorrent protocol module
//!
//! Implements the BitTorrent peer wire codec.

pub mod handshake;
pub mod message;
pub mod wire;

// Re-export main types
pub use handshake::{Handshake, HANDSHAKE_LEN, PROTOCOL_LENGTH, PROTOCOL_STRING};
pub use message::{
    bitfield_pieces, build_interested, build_request, BlockRequest, Message, MessageId, PieceBlock, RawMessage,
};
pub use wire::{write_frame, MessageFramer, MAX_FRAME_LEN};
