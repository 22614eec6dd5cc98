//! Wire framing utilities
//!
//! Peer messages arrive as an undifferentiated byte stream. [`MessageFramer`]
//! buffers incoming bytes and slices off complete frames: the first frame on a
//! connection uses the handshake length rule, every later one the 4-byte
//! length prefix. Frames longer than [`MAX_FRAME_LEN`] are rejected before
//! they are buffered in full.

use anyhow::Result;
use bytes::{Bytes, BytesMut};
use tokio::io::{AsyncWrite, AsyncWriteExt};
use tracing::trace;

use super::handshake::HANDSHAKE_OVERHEAD;
use crate::error::TorrentError;

/// Largest accepted frame, length prefix included. Covers a full block
/// message and the bitfield of a torrent with two million pieces.
pub const MAX_FRAME_LEN: usize = 256 * 1024;

/// Stream reassembler for peer connections
#[derive(Debug)]
pub struct MessageFramer {
    buf: BytesMut,
    awaiting_handshake: bool,
}

impl MessageFramer {
    /// Create a framer expecting a handshake as the first frame
    pub fn new() -> Self {
        Self {
            buf: BytesMut::with_capacity(64 * 1024),
            awaiting_handshake: true,
        }
    }

    /// Append freshly read bytes
    pub fn extend(&mut self, data: &[u8]) {
        self.buf.extend_from_slice(data);
    }

    /// Bytes buffered but not yet returned as a frame
    pub fn buffered(&self) -> usize {
        self.buf.len()
    }

    /// Length of the frame at the head of the buffer, if the header is available
    fn frame_len(&self) -> Option<usize> {
        if self.buf.len() < 4 {
            return None;
        }
        if self.awaiting_handshake {
            Some(self.buf[0] as usize + HANDSHAKE_OVERHEAD)
        } else {
            Some(u32::from_be_bytes([self.buf[0], self.buf[1], self.buf[2], self.buf[3]]) as usize + 4)
        }
    }

    /// Pop the next complete frame, or `None` until more bytes arrive.
    ///
    /// Fails as soon as a header announces a frame above [`MAX_FRAME_LEN`].
    pub fn next_frame(&mut self) -> Result<Option<Bytes>> {
        let Some(len) = self.frame_len() else {
            return Ok(None);
        };
        if len > MAX_FRAME_LEN {
            return Err(TorrentError::protocol_error_with_source(
                "Frame exceeds maximum length",
                format!("{} > {} bytes", len, MAX_FRAME_LEN),
            )
            .into());
        }
        if self.buf.len() < len {
            return Ok(None);
        }

        let frame = self.buf.split_to(len).freeze();
        self.awaiting_handshake = false;
        trace!("Framed {} bytes, {} still buffered", len, self.buf.len());
        Ok(Some(frame))
    }
}

impl Default for MessageFramer {
    fn default() -> Self {
        Self::new()
    }
}

/// Write one encoded frame and flush it
pub async fn write_frame<W: AsyncWrite + Unpin>(writer: &mut W, frame: &[u8]) -> Result<()> {
    writer.write_all(frame).await?;
    writer.flush().await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::{build_interested, Handshake, Message, PieceBlock};
    use crate::torrent::BLOCK_LEN;

    #[test]
    fn test_handshake_then_messages() {
        let mut framer = MessageFramer::new();
        let handshake = Handshake::new([1u8; 20], [2u8; 20]).serialize();
        let have = Message::Have { piece_index: 5 }.serialize();

        let mut stream = handshake.clone();
        stream.extend_from_slice(&build_interested());
        stream.extend_from_slice(&have);
        framer.extend(&stream);

        assert_eq!(framer.next_frame().unwrap().unwrap().as_ref(), handshake.as_slice());
        assert_eq!(framer.next_frame().unwrap().unwrap().as_ref(), build_interested().as_slice());
        assert_eq!(framer.next_frame().unwrap().unwrap().as_ref(), have.as_slice());
        assert!(framer.next_frame().unwrap().is_none());
        assert_eq!(framer.buffered(), 0);
    }

    #[test]
    fn test_partial_frames_wait_for_more_bytes() {
        let mut framer = MessageFramer::new();
        let handshake = Handshake::new([1u8; 20], [2u8; 20]).serialize();

        framer.extend(&handshake[..3]);
        assert!(framer.next_frame().unwrap().is_none());
        framer.extend(&handshake[3..40]);
        assert!(framer.next_frame().unwrap().is_none());
        framer.extend(&handshake[40..]);
        assert!(framer.next_frame().unwrap().is_some());

        let unchoke = Message::Unchoke.serialize();
        framer.extend(&unchoke[..4]);
        assert!(framer.next_frame().unwrap().is_none());
        framer.extend(&unchoke[4..]);
        assert_eq!(framer.next_frame().unwrap().unwrap().as_ref(), unchoke.as_slice());
    }

    #[test]
    fn test_keepalive_frame() {
        let mut framer = MessageFramer::new();
        framer.extend(&Handshake::new([0u8; 20], [0u8; 20]).serialize());
        framer.next_frame().unwrap();

        framer.extend(&[0, 0, 0, 0]);
        assert_eq!(framer.next_frame().unwrap().unwrap().len(), 4);
    }

    #[test]
    fn test_oversized_length_prefix_is_rejected() {
        let mut framer = MessageFramer::new();
        framer.extend(&Handshake::new([0u8; 20], [0u8; 20]).serialize());
        framer.next_frame().unwrap();

        framer.extend(&[0xFF, 0xFF, 0xFF, 0xF0, 7]);
        framer.extend(&[0u8; 1024]);
        assert!(framer.next_frame().is_err());
    }

    #[test]
    fn test_largest_block_message_fits() {
        let mut framer = MessageFramer::new();
        framer.extend(&Handshake::new([0u8; 20], [0u8; 20]).serialize());
        framer.next_frame().unwrap();

        let block = PieceBlock { index: 0, begin: 0, block: Bytes::from(vec![1u8; BLOCK_LEN as usize]) };
        let frame = Message::Piece(block).serialize();
        framer.extend(&frame);
        assert_eq!(framer.next_frame().unwrap().unwrap().len(), frame.len());
    }

    #[tokio::test]
    async fn test_write_frame() {
        let mut out = Vec::new();
        write_frame(&mut out, &build_interested()).await.unwrap();
        assert_eq!(out, vec![0, 0, 0, 1, 2]);
    }
}
