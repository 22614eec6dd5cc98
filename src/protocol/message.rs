//! BitTorrent protocol messages
//!
//! Encodes and decodes the length-prefixed messages exchanged after the handshake.

use bytes::{Buf, BufMut, Bytes, BytesMut};
use anyhow::Result;
use tracing::{debug, error, trace};

use crate::error::TorrentError;

/// BitTorrent message IDs
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum MessageId {
    Choke = 0,
    Unchoke = 1,
    Interested = 2,
    NotInterested = 3,
    Have = 4,
    Bitfield = 5,
    Request = 6,
    Piece = 7,
    Cancel = 8,
}

impl TryFrom<u8> for MessageId {
    type Error = anyhow::Error;

    fn try_from(value: u8) -> Result<Self> {
        match value {
            0 => Ok(MessageId::Choke),
            1 => Ok(MessageId::Unchoke),
            2 => Ok(MessageId::Interested),
            3 => Ok(MessageId::NotInterested),
            4 => Ok(MessageId::Have),
            5 => Ok(MessageId::Bitfield),
            6 => Ok(MessageId::Request),
            7 => Ok(MessageId::Piece),
            8 => Ok(MessageId::Cancel),
            _ => Err(TorrentError::protocol_error_with_source(
                "Invalid message ID",
                format!("value: {}", value),
            )
            .into()),
        }
    }
}

/// A block-level request: `length` bytes at `begin` within piece `index`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct BlockRequest {
    pub index: u32,
    pub begin: u32,
    pub length: u32,
}

impl BlockRequest {
    pub fn new(index: u32, begin: u32, length: u32) -> Self {
        Self { index, begin, length }
    }

    /// Decode the 12-byte payload of a request or cancel message
    pub fn from_payload(payload: &[u8]) -> Result<Self> {
        if payload.len() < 12 {
            return Err(TorrentError::protocol_error_with_source(
                "Request payload too short",
                format!("expected 12 bytes, got {}", payload.len()),
            )
            .into());
        }
        let mut buf = payload;
        Ok(Self {
            index: buf.get_u32(),
            begin: buf.get_u32(),
            length: buf.get_u32(),
        })
    }
}

/// A received block: the payload of a piece message
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PieceBlock {
    pub index: u32,
    pub begin: u32,
    pub block: Bytes,
}

impl PieceBlock {
    /// Extract `{index, begin, block}` from a piece message payload
    pub fn from_payload(payload: Bytes) -> Result<Self> {
        if payload.len() < 8 {
            error!("Piece payload too short: expected at least 8 bytes, got {}", payload.len());
            return Err(TorrentError::protocol_error_with_source(
                "Piece message too short",
                format!("expected at least 8 bytes, got {}", payload.len()),
            )
            .into());
        }
        let mut payload = payload;
        let index = payload.get_u32();
        let begin = payload.get_u32();
        Ok(Self { index, begin, block: payload })
    }

    /// The request this block answers
    pub fn as_request(&self) -> BlockRequest {
        BlockRequest::new(self.index, self.begin, self.block.len() as u32)
    }
}

/// A framed message split into id and payload, before interpretation.
///
/// `id` is `None` for a keep-alive (zero length prefix).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawMessage {
    pub id: Option<u8>,
    pub payload: Bytes,
}

impl RawMessage {
    /// Split a complete frame (4-byte big-endian length prefix included)
    pub fn parse(frame: &[u8]) -> Result<Self> {
        if frame.len() < 4 {
            return Err(TorrentError::protocol_error("Message frame shorter than its length prefix").into());
        }

        let length = u32::from_be_bytes([frame[0], frame[1], frame[2], frame[3]]) as usize;
        if length == 0 {
            return Ok(Self { id: None, payload: Bytes::new() });
        }

        if frame.len() < 4 + length {
            return Err(TorrentError::protocol_error_with_source(
                "Message frame truncated",
                format!("expected {} bytes, got {}", 4 + length, frame.len()),
            )
            .into());
        }

        Ok(Self {
            id: Some(frame[4]),
            payload: Bytes::copy_from_slice(&frame[5..4 + length]),
        })
    }
}

/// BitTorrent protocol message
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Message {
    KeepAlive,
    Choke,
    Unchoke,
    Interested,
    NotInterested,
    Have { piece_index: u32 },
    Bitfield { bitfield: Bytes },
    Request(BlockRequest),
    Piece(PieceBlock),
    Cancel(BlockRequest),
    /// A message id outside the known set; callers ignore it
    Unknown { id: u8 },
}

impl Message {
    /// Get the message ID (returns None for KeepAlive and unknown ids)
    pub fn message_id(&self) -> Option<MessageId> {
        match self {
            Message::Choke => Some(MessageId::Choke),
            Message::Unchoke => Some(MessageId::Unchoke),
            Message::Interested => Some(MessageId::Interested),
            Message::NotInterested => Some(MessageId::NotInterested),
            Message::Have { .. } => Some(MessageId::Have),
            Message::Bitfield { .. } => Some(MessageId::Bitfield),
            Message::Request(_) => Some(MessageId::Request),
            Message::Piece(_) => Some(MessageId::Piece),
            Message::Cancel(_) => Some(MessageId::Cancel),
            Message::KeepAlive | Message::Unknown { .. } => None,
        }
    }

    /// Get the message length (excluding the length prefix)
    pub fn length(&self) -> u32 {
        match self {
            Message::KeepAlive => 0,
            Message::Choke | Message::Unchoke | Message::Interested | Message::NotInterested => 1,
            Message::Have { .. } => 5,
            Message::Bitfield { bitfield } => 1 + bitfield.len() as u32,
            Message::Request(_) | Message::Cancel(_) => 13,
            Message::Piece(piece) => 9 + piece.block.len() as u32,
            Message::Unknown { .. } => 1,
        }
    }

    /// Serialize the message to bytes (including length prefix)
    pub fn serialize(&self) -> Vec<u8> {
        trace!("Serializing message: {:?}", self.message_id());
        let mut buf = BytesMut::with_capacity(4 + self.length() as usize);
        buf.put_u32(self.length());

        match self {
            Message::KeepAlive => {}
            Message::Choke => buf.put_u8(MessageId::Choke as u8),
            Message::Unchoke => buf.put_u8(MessageId::Unchoke as u8),
            Message::Interested => buf.put_u8(MessageId::Interested as u8),
            Message::NotInterested => buf.put_u8(MessageId::NotInterested as u8),
            Message::Have { piece_index } => {
                buf.put_u8(MessageId::Have as u8);
                buf.put_u32(*piece_index);
            }
            Message::Bitfield { bitfield } => {
                buf.put_u8(MessageId::Bitfield as u8);
                buf.put_slice(bitfield);
            }
            Message::Request(req) => {
                buf.put_u8(MessageId::Request as u8);
                buf.put_u32(req.index);
                buf.put_u32(req.begin);
                buf.put_u32(req.length);
            }
            Message::Piece(piece) => {
                buf.put_u8(MessageId::Piece as u8);
                buf.put_u32(piece.index);
                buf.put_u32(piece.begin);
                buf.put_slice(&piece.block);
            }
            Message::Cancel(req) => {
                buf.put_u8(MessageId::Cancel as u8);
                buf.put_u32(req.index);
                buf.put_u32(req.begin);
                buf.put_u32(req.length);
            }
            Message::Unknown { id } => buf.put_u8(*id),
        }

        buf.to_vec()
    }

    /// Deserialize a message from a complete frame (including length prefix)
    pub fn deserialize(frame: &[u8]) -> Result<Self> {
        let raw = RawMessage::parse(frame)?;
        Self::from_raw(raw)
    }

    /// Interpret a split frame
    pub fn from_raw(raw: RawMessage) -> Result<Self> {
        let Some(id) = raw.id else {
            trace!("Received KeepAlive message");
            return Ok(Message::KeepAlive);
        };

        let Ok(message_id) = MessageId::try_from(id) else {
            debug!("Ignoring message with unknown id {}", id);
            return Ok(Message::Unknown { id });
        };

        let mut payload = raw.payload;
        let message = match message_id {
            MessageId::Choke => Message::Choke,
            MessageId::Unchoke => Message::Unchoke,
            MessageId::Interested => Message::Interested,
            MessageId::NotInterested => Message::NotInterested,
            MessageId::Have => {
                if payload.len() < 4 {
                    return Err(TorrentError::protocol_error_with_source(
                        "Have message too short",
                        format!("expected 4 bytes, got {}", payload.len()),
                    )
                    .into());
                }
                Message::Have { piece_index: payload.get_u32() }
            }
            MessageId::Bitfield => Message::Bitfield { bitfield: payload },
            MessageId::Request => Message::Request(BlockRequest::from_payload(&payload)?),
            MessageId::Piece => Message::Piece(PieceBlock::from_payload(payload)?),
            MessageId::Cancel => Message::Cancel(BlockRequest::from_payload(&payload)?),
        };

        trace!("Decoded {:?} message", message_id);
        Ok(message)
    }
}

/// Build an `interested` message
pub fn build_interested() -> Vec<u8> {
    Message::Interested.serialize()
}

/// Build a `request` message for one block
pub fn build_request(request: BlockRequest) -> Vec<u8> {
    Message::Request(request).serialize()
}

/// Decode a bitfield payload into the set piece indices, most-significant bit first
pub fn bitfield_pieces(bitfield: &[u8]) -> Vec<u32> {
    let mut pieces = Vec::new();
    for (byte_index, byte) in bitfield.iter().enumerate() {
        for bit in 0..8u32 {
            if byte & (0x80 >> bit) != 0 {
                pieces.push(byte_index as u32 * 8 + bit);
            }
        }
    }
    pieces
}
