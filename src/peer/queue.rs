//! Per-connection request queue
//!
//! FIFO of piece indices announced by a peer through `have` or `bitfield`,
//! gated by the remote choke flag. Indices are expanded into block requests
//! lazily by the connection's request cycle.

use std::collections::VecDeque;

#[derive(Debug, Clone)]
pub struct RequestQueue {
    /// Remote side is choking us; blocks all requesting
    pub choked: bool,
    pieces: VecDeque<u32>,
}

impl RequestQueue {
    pub fn new() -> Self {
        Self {
            choked: true,
            pieces: VecDeque::new(),
        }
    }

    /// Append an announced piece index. Duplicates are allowed.
    pub fn queue(&mut self, piece_index: u32) {
        self.pieces.push_back(piece_index);
    }

    /// Pop the oldest announced index
    pub fn deque(&mut self) -> Option<u32> {
        self.pieces.pop_front()
    }

    /// Oldest announced index, left in place
    pub fn peek(&self) -> Option<u32> {
        self.pieces.front().copied()
    }

    pub fn len(&self) -> usize {
        self.pieces.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pieces.is_empty()
    }
}

impl Default for RequestQueue {
    fn default() -> Self {
        Self::new()
    }
}
