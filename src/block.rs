//! Block arithmetic and layout for `.DSK` archives.
//!
//! The engine's loader addresses every unit by block number; the block size
//! is fixed and must not be made configurable.

use std::collections::BTreeSet;

use crate::index::IndexEntry;

/// Alignment unit of the archive (0x800).
pub const BLOCK_SIZE: usize = 2048;

/// Byte offset of block `block_index`.
#[inline]
pub fn block_offset(block_index: u32) -> u64 {
    block_index as u64 * BLOCK_SIZE as u64
}

/// Number of whole blocks needed to hold `len` bytes.
#[inline]
pub fn blocks_for(len: usize) -> usize {
    len.div_ceil(BLOCK_SIZE)
}

/// Occupancy map of an index: which blocks start a unit, and how many bytes
/// each unit may occupy before it would run into the next one.
#[derive(Debug, Clone)]
pub struct BlockLayout {
    occupied:     BTreeSet<u32>,
    total_blocks: usize,
}

impl BlockLayout {
    pub fn new(entries: &[IndexEntry]) -> Self {
        let occupied: BTreeSet<u32> = entries.iter().map(|e| e.block_index).collect();
        let total_blocks = occupied.last().map_or(0, |&max| max as usize + 1);
        Self { occupied, total_blocks }
    }

    /// `max(block_index) + 1`, or 0 for an empty index.
    pub fn total_blocks(&self) -> usize {
        self.total_blocks
    }

    pub fn archive_len(&self) -> usize {
        self.total_blocks * BLOCK_SIZE
    }

    /// First occupied block strictly after `block_index`.
    pub fn next_occupied(&self, block_index: u32) -> Option<u32> {
        self.occupied.range(block_index.saturating_add(1)..).next().copied()
            .filter(|&b| b > block_index)
    }

    /// Bytes available to a unit starting at `block_index`.
    ///
    /// `None` means the unit sits in the last occupied block and is bounded
    /// only by the end of the archive buffer.
    pub fn capacity(&self, block_index: u32) -> Option<u64> {
        self.next_occupied(block_index)
            .map(|next| block_offset(next) - block_offset(block_index))
    }

    pub fn is_last(&self, block_index: u32) -> bool {
        self.next_occupied(block_index).is_none()
    }
}
