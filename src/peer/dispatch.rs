//! Message dispatch
//!
//! Pure transition function for one peer connection: a framed inbound
//! message updates the connection state and yields the side effects the
//! connection must perform. No socket is involved, so the state machine is
//! testable on its own.

use tracing::{debug, trace, warn};

use crate::peer::queue::RequestQueue;
use crate::peer::state::PeerPhase;
use crate::protocol::{bitfield_pieces, BlockRequest, Handshake, Message, PieceBlock, RawMessage};

/// Side effect requested by [`dispatch`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Effect {
    /// Write a message to the peer
    Send(Message),
    /// Run one request cycle
    RequestNext,
    /// Hand a received block to the download. The connection runs a request
    /// cycle afterwards unless the download has completed.
    Deliver(PieceBlock),
    /// Tear the connection down
    Close,
}

/// Mutable state of one peer connection
#[derive(Debug, Clone, Default)]
pub struct ConnectionState {
    pub phase: PeerPhase,
    pub queue: RequestQueue,
    /// Requests sent and not yet answered
    pub outstanding: Vec<BlockRequest>,
}

impl ConnectionState {
    /// State right after the outbound handshake was written
    pub fn handshaking() -> Self {
        Self {
            phase: PeerPhase::Handshaking,
            ..Self::default()
        }
    }

    pub fn is_choked(&self) -> bool {
        self.queue.choked
    }

    /// Note a request as sent
    pub fn track(&mut self, request: BlockRequest) {
        self.outstanding.push(request);
    }

    /// Drop the request answered by `block`. False if nothing matched.
    fn settle(&mut self, block: &PieceBlock) -> bool {
        let answered = block.as_request();
        match self.outstanding.iter().position(|r| *r == answered) {
            Some(pos) => {
                self.outstanding.swap_remove(pos);
                true
            }
            None => false,
        }
    }
}

/// Apply one complete inbound frame to `state`.
///
/// `info_hash` is only used to log a mismatching handshake reply.
pub fn dispatch(state: &mut ConnectionState, frame: &[u8], info_hash: &[u8; 20]) -> Vec<Effect> {
    if Handshake::is_handshake(frame) {
        if let Ok(reply) = Handshake::deserialize(frame) {
            if !reply.validate(info_hash) {
                warn!("Peer handshake carries a different info hash");
            }
        }
        state.phase = PeerPhase::Interested;
        return vec![Effect::Send(Message::Interested)];
    }

    let message = match RawMessage::parse(frame).and_then(Message::from_raw) {
        Ok(message) => message,
        Err(e) => {
            debug!("Ignoring malformed message: {}", e);
            return Vec::new();
        }
    };

    match message {
        Message::Choke => {
            debug!("Peer choked us, closing");
            state.queue.choked = true;
            state.phase = PeerPhase::Closed;
            vec![Effect::Close]
        }
        Message::Unchoke => {
            state.queue.choked = false;
            vec![Effect::RequestNext]
        }
        Message::Have { piece_index } => {
            let was_empty = state.queue.is_empty();
            state.queue.queue(piece_index);
            if was_empty {
                vec![Effect::RequestNext]
            } else {
                Vec::new()
            }
        }
        Message::Bitfield { bitfield } => {
            let was_empty = state.queue.is_empty();
            let pieces = bitfield_pieces(&bitfield);
            trace!("Bitfield announces {} pieces", pieces.len());
            for piece in pieces {
                state.queue.queue(piece);
            }
            if was_empty {
                vec![Effect::RequestNext]
            } else {
                Vec::new()
            }
        }
        Message::Piece(block) => {
            if !state.settle(&block) {
                warn!(
                    "Dropping unrequested block: piece {} begin {} ({} bytes)",
                    block.index,
                    block.begin,
                    block.block.len()
                );
                return Vec::new();
            }
            vec![Effect::Deliver(block)]
        }
        other => {
            trace!("No handler for {:?}", other.message_id());
            Vec::new()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bytes::Bytes;

    const HASH: [u8; 20] = [5u8; 20];

    fn established() -> ConnectionState {
        let mut state = ConnectionState::handshaking();
        dispatch(&mut state, &Handshake::new(HASH, [1u8; 20]).serialize(), &HASH);
        state
    }

    #[test]
    fn test_handshake_reply_sends_interested() {
        let mut state = ConnectionState::handshaking();
        let effects = dispatch(&mut state, &Handshake::new(HASH, [1u8; 20]).serialize(), &HASH);

        assert_eq!(effects, vec![Effect::Send(Message::Interested)]);
        assert_eq!(state.phase, PeerPhase::Interested);
        assert!(state.is_choked());
    }

    #[test]
    fn test_choke_closes() {
        let mut state = established();
        let effects = dispatch(&mut state, &Message::Choke.serialize(), &HASH);
        assert_eq!(effects, vec![Effect::Close]);
        assert_eq!(state.phase, PeerPhase::Closed);
    }

    #[test]
    fn test_unchoke_triggers_request() {
        let mut state = established();
        let effects = dispatch(&mut state, &Message::Unchoke.serialize(), &HASH);
        assert_eq!(effects, vec![Effect::RequestNext]);
        assert!(!state.is_choked());
    }

    #[test]
    fn test_have_requests_only_when_queue_was_empty() {
        let mut state = established();
        let first = dispatch(&mut state, &Message::Have { piece_index: 3 }.serialize(), &HASH);
        let second = dispatch(&mut state, &Message::Have { piece_index: 4 }.serialize(), &HASH);

        assert_eq!(first, vec![Effect::RequestNext]);
        assert!(second.is_empty());
        assert_eq!(state.queue.deque(), Some(3));
        assert_eq!(state.queue.deque(), Some(4));
    }

    #[test]
    fn test_bitfield_enqueues_msb_first() {
        let mut state = established();
        let frame = Message::Bitfield { bitfield: Bytes::from_static(&[0b1010_0000]) }.serialize();
        let effects = dispatch(&mut state, &frame, &HASH);

        assert_eq!(effects, vec![Effect::RequestNext]);
        assert_eq!(state.queue.deque(), Some(0));
        assert_eq!(state.queue.deque(), Some(2));
        assert!(state.queue.is_empty());
    }

    #[test]
    fn test_piece_delivers_and_settles_outstanding() {
        let mut state = established();
        state.track(BlockRequest::new(1, 0, 4));
        let block = PieceBlock { index: 1, begin: 0, block: Bytes::from_static(b"data") };

        let effects = dispatch(&mut state, &Message::Piece(block.clone()).serialize(), &HASH);
        assert_eq!(effects, vec![Effect::Deliver(block)]);
        assert!(state.outstanding.is_empty());
    }

    #[test]
    fn test_unknown_and_unhandled_ids_are_ignored() {
        let mut state = established();
        assert!(dispatch(&mut state, &[0, 0, 0, 1, 20], &HASH).is_empty());
        assert!(dispatch(&mut state, &Message::Interested.serialize(), &HASH).is_empty());
        assert!(dispatch(&mut state, &Message::KeepAlive.serialize(), &HASH).is_empty());
    }

    #[test]
    fn test_malformed_message_is_ignored() {
        let mut state = established();
        // Have with a two-byte payload
        assert!(dispatch(&mut state, &[0, 0, 0, 3, 4, 0, 1], &HASH).is_empty());
        assert!(state.queue.is_empty());
    }

    #[test]
    fn test_handshake_with_other_hash_still_proceeds() {
        let mut state = ConnectionState::handshaking();
        let effects = dispatch(&mut state, &Handshake::new([9u8; 20], [1u8; 20]).serialize(), &HASH);
        assert_eq!(effects, vec![Effect::Send(Message::Interested)]);
    }

    #[test]
    fn test_unrequested_piece_is_dropped() {
        let mut state = established();
        state.track(BlockRequest::new(1, 0, 4));

        // Wrong offset, wrong length and unknown piece are all ignored
        for block in [
            PieceBlock { index: 1, begin: 2, block: Bytes::from_static(b"da") },
            PieceBlock { index: 1, begin: 0, block: Bytes::from_static(b"d") },
            PieceBlock { index: 1_000_000, begin: 0, block: Bytes::from_static(b"EVIL") },
        ] {
            let effects = dispatch(&mut state, &Message::Piece(block).serialize(), &HASH);
            assert!(effects.is_empty());
        }
        assert_eq!(state.outstanding, vec![BlockRequest::new(1, 0, 4)]);
    }
}
