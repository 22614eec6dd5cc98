//! Piece tracker
//!
//! Tracks which blocks of each piece are received or in flight for one
//! download. A piece is complete once every block flag is set, no matter
//! which peer supplied which block.

use std::collections::HashSet;

use tracing::{debug, trace};

use crate::protocol::BlockRequest;
use crate::torrent::{TorrentInfo, BLOCK_LEN};

/// Per-download block bookkeeping
#[derive(Debug)]
pub struct PieceTracker {
    /// Received flags, one vector per piece sized by its block count
    received: Vec<Vec<bool>>,
    /// Blocks requested but not yet received, keyed by `(index, begin)`
    in_flight: HashSet<(u32, u32)>,
    /// Number of fully received pieces
    completed: usize,
    /// Block length per piece, used to synthesize requests
    block_lens: Vec<Vec<u32>>,
}

impl PieceTracker {
    /// Build an empty tracker sized from the torrent geometry
    pub fn new(info: &TorrentInfo) -> Self {
        let piece_count = info.piece_count();
        let mut received = Vec::with_capacity(piece_count);
        let mut block_lens = Vec::with_capacity(piece_count);

        for index in 0..piece_count as u32 {
            let blocks = info.blocks_per_piece(index);
            received.push(vec![false; blocks as usize]);
            block_lens.push((0..blocks).map(|b| info.block_len(index, b)).collect());
        }

        debug!("Piece tracker initialised with {} pieces", piece_count);
        Self {
            received,
            in_flight: HashSet::new(),
            completed: 0,
            block_lens,
        }
    }

    fn block_index(begin: u32) -> usize {
        (begin / BLOCK_LEN) as usize
    }

    fn flag(&self, index: u32, begin: u32) -> Option<bool> {
        self.received
            .get(index as usize)
            .and_then(|blocks| blocks.get(Self::block_index(begin)))
            .copied()
    }

    fn piece_complete(&self, index: u32) -> bool {
        self.received
            .get(index as usize)
            .map(|blocks| blocks.iter().all(|b| *b))
            .unwrap_or(true)
    }

    /// True if the block's piece is incomplete and the block is neither received nor in flight
    pub fn needed(&self, request: &BlockRequest) -> bool {
        if self.piece_complete(request.index) {
            return false;
        }
        match self.flag(request.index, request.begin) {
            Some(false) => !self.in_flight.contains(&(request.index, request.begin)),
            _ => false,
        }
    }

    /// True if `request` is exactly one block of the torrent: a known piece,
    /// a block-aligned offset and that block's length
    pub fn fits(&self, request: &BlockRequest) -> bool {
        if request.begin % BLOCK_LEN != 0 {
            return false;
        }
        self.block_lens
            .get(request.index as usize)
            .and_then(|lens| lens.get(Self::block_index(request.begin)))
            .is_some_and(|len| *len == request.length)
    }

    /// True if the block has already been received
    pub fn is_received(&self, request: &BlockRequest) -> bool {
        self.flag(request.index, request.begin).unwrap_or(false)
    }

    /// Mark a block as in flight
    pub fn add_requested(&mut self, request: &BlockRequest) {
        trace!("Block requested: piece {} begin {}", request.index, request.begin);
        self.in_flight.insert((request.index, request.begin));
    }

    /// Return an in-flight block to the needed pool, e.g. when its peer disconnects
    pub fn release(&mut self, request: &BlockRequest) {
        if self.in_flight.remove(&(request.index, request.begin)) {
            debug!("Released block: piece {} begin {}", request.index, request.begin);
        }
    }

    /// Record a received block.
    ///
    /// Returns true if this block made its piece complete. A duplicate
    /// arrival for an already received block is ignored and returns false, as
    /// is anything that does not [`fit`](Self::fits) the geometry.
    pub fn add_received(&mut self, request: &BlockRequest) -> bool {
        if !self.fits(request) {
            debug!(
                "Ignoring misshapen block: piece {} begin {} length {}",
                request.index, request.begin, request.length
            );
            return false;
        }
        self.in_flight.remove(&(request.index, request.begin));

        let block_index = Self::block_index(request.begin);
        let Some(blocks) = self.received.get_mut(request.index as usize) else {
            debug!("Ignoring block for unknown piece {}", request.index);
            return false;
        };
        let Some(flag) = blocks.get_mut(block_index) else {
            debug!("Ignoring block at out-of-range offset {} in piece {}", request.begin, request.index);
            return false;
        };
        if *flag {
            trace!("Duplicate block: piece {} begin {}", request.index, request.begin);
            return false;
        }

        *flag = true;
        if blocks.iter().all(|b| *b) {
            self.completed += 1;
            debug!("Piece {} complete ({}/{})", request.index, self.completed, self.received.len());
            return true;
        }
        false
    }

    /// True once every block of every piece has been received
    pub fn is_done(&self) -> bool {
        self.completed == self.received.len()
    }

    /// Number of fully received pieces
    pub fn completed_pieces(&self) -> usize {
        self.completed
    }

    /// Number of pieces tracked
    pub fn piece_count(&self) -> usize {
        self.received.len()
    }

    /// Atomically find the next needed block of `index` and mark it in flight.
    ///
    /// Returns `None` when the piece has nothing left to request.
    pub fn claim_next_block(&mut self, index: u32) -> Option<BlockRequest> {
        let lens = self.block_lens.get(index as usize)?;
        let request = lens
            .iter()
            .enumerate()
            .map(|(b, len)| BlockRequest::new(index, b as u32 * BLOCK_LEN, *len))
            .find(|req| self.needed(req))?;

        self.add_requested(&request);
        Some(request)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::torrent::info::tests::sample_info;

    #[test]
    fn test_needed_false_after_requested_and_received() {
        let info = sample_info(BLOCK_LEN as u64 * 2, BLOCK_LEN as u64 * 2);
        let mut tracker = PieceTracker::new(&info);
        let block = BlockRequest::new(0, 0, BLOCK_LEN);

        assert!(tracker.needed(&block));
        tracker.add_requested(&block);
        assert!(!tracker.needed(&block));

        assert!(!tracker.add_received(&block));
        assert!(!tracker.needed(&block));
    }

    #[test]
    fn test_piece_completes_on_last_block() {
        let info = sample_info(BLOCK_LEN as u64 * 2, BLOCK_LEN as u64 * 2);
        let mut tracker = PieceTracker::new(&info);

        assert!(!tracker.add_received(&BlockRequest::new(0, BLOCK_LEN, BLOCK_LEN)));
        assert!(tracker.add_received(&BlockRequest::new(0, 0, BLOCK_LEN)));
        assert!(tracker.is_done());
    }

    #[test]
    fn test_duplicate_receipt_ignored() {
        let info = sample_info(BLOCK_LEN as u64, BLOCK_LEN as u64);
        let mut tracker = PieceTracker::new(&info);
        let block = BlockRequest::new(0, 0, BLOCK_LEN);

        assert!(!tracker.is_received(&block));
        assert!(tracker.add_received(&block));
        assert!(tracker.is_received(&block));
        assert!(!tracker.add_received(&block));
        assert_eq!(tracker.completed_pieces(), 1);
    }

    #[test]
    fn test_done_regardless_of_order() {
        // Three pieces of two blocks, last piece a single short block
        let total = BLOCK_LEN as u64 * 4 + 100;
        let info = sample_info(total, BLOCK_LEN as u64 * 2);
        let mut tracker = PieceTracker::new(&info);
        assert_eq!(tracker.piece_count(), 3);

        let mut blocks = vec![
            BlockRequest::new(2, 0, 100),
            BlockRequest::new(1, BLOCK_LEN, BLOCK_LEN),
            BlockRequest::new(0, 0, BLOCK_LEN),
            BlockRequest::new(1, 0, BLOCK_LEN),
        ];
        for block in blocks.drain(..) {
            tracker.add_received(&block);
            assert!(!tracker.is_done());
        }
        tracker.add_received(&BlockRequest::new(0, BLOCK_LEN, BLOCK_LEN));
        assert!(tracker.is_done());
    }

    #[test]
    fn test_claim_next_block_uses_short_lengths() {
        let info = sample_info(BLOCK_LEN as u64 + 10, BLOCK_LEN as u64 * 2);
        let mut tracker = PieceTracker::new(&info);

        assert_eq!(tracker.claim_next_block(0), Some(BlockRequest::new(0, 0, BLOCK_LEN)));
        assert_eq!(tracker.claim_next_block(0), Some(BlockRequest::new(0, BLOCK_LEN, 10)));
        assert_eq!(tracker.claim_next_block(0), None);
        assert_eq!(tracker.claim_next_block(5), None);
    }

    #[test]
    fn test_claim_skips_received_blocks() {
        let info = sample_info(BLOCK_LEN as u64 * 2, BLOCK_LEN as u64 * 2);
        let mut tracker = PieceTracker::new(&info);
        tracker.add_received(&BlockRequest::new(0, 0, BLOCK_LEN));

        assert_eq!(tracker.claim_next_block(0), Some(BlockRequest::new(0, BLOCK_LEN, BLOCK_LEN)));
    }

    #[test]
    fn test_release_makes_block_needed_again() {
        let info = sample_info(BLOCK_LEN as u64, BLOCK_LEN as u64);
        let mut tracker = PieceTracker::new(&info);

        let claimed = tracker.claim_next_block(0).unwrap();
        assert!(tracker.claim_next_block(0).is_none());
        tracker.release(&claimed);
        assert_eq!(tracker.claim_next_block(0), Some(claimed));
    }

    #[test]
    fn test_out_of_range_blocks_are_not_needed() {
        let info = sample_info(BLOCK_LEN as u64, BLOCK_LEN as u64);
        let mut tracker = PieceTracker::new(&info);
        let bogus = BlockRequest::new(3, 0, BLOCK_LEN);

        assert!(!tracker.needed(&bogus));
        assert!(!tracker.add_received(&bogus));
        assert!(!tracker.add_received(&BlockRequest::new(0, BLOCK_LEN * 4, BLOCK_LEN)));
    }

    #[test]
    fn test_partial_or_misaligned_blocks_do_not_count() {
        // Three pieces of 20 bytes, the last one 10 bytes
        let info = sample_info(50, 20);
        let mut tracker = PieceTracker::new(&info);

        for index in 0..3 {
            let sliver = BlockRequest::new(index, 5, 1);
            assert!(!tracker.fits(&sliver));
            assert!(!tracker.add_received(&sliver));
        }
        assert!(!tracker.add_received(&BlockRequest::new(0, 0, 1)));
        assert!(!tracker.add_received(&BlockRequest::new(2, 0, 20)));
        assert!(!tracker.add_received(&BlockRequest::new(1_000_000, 0, 4)));
        assert_eq!(tracker.completed_pieces(), 0);
        assert!(!tracker.is_done());

        assert!(tracker.fits(&BlockRequest::new(2, 0, 10)));
        assert!(tracker.add_received(&BlockRequest::new(2, 0, 10)));
    }
}
