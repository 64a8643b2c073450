//! Fragment size classes and free-fragment list nodes.
//!
//! Objects no larger than half a block are served from power-of-two
//! fragments carved out of a single block. Each class keeps a heap-wide
//! doubly linked free list whose links are threaded through the payload
//! bytes of the free fragments themselves, as heap-relative offsets, so
//! the lists survive remapping at a different base.

/// log2 of the smallest fragment (16 bytes: room for the two list links).
pub(crate) const MIN_FRAG_LOG2: u32 = 4;

/// Bytes a free fragment spends on its list node (prev + next offset).
pub(crate) const NODE_SIZE: u64 = 16;

/// Fragment class (log2 of fragment size) serving `size` bytes, or `None`
/// when the request must take the whole-block path.
pub(crate) fn class_for(size: u64, block_log2: u32) -> Option<u8> {
    debug_assert!(size > 0);
    if size > (1u64 << block_log2) / 2 {
        return None;
    }
    let log2 = size.next_power_of_two().trailing_zeros().max(MIN_FRAG_LOG2);
    Some(log2 as u8)
}

/// Fragment size in bytes for a class.
#[inline]
pub(crate) fn class_size(class: u8) -> u64 {
    1u64 << class
}

/// Fragments per block for a class.
#[inline]
pub(crate) fn frags_per_block(class: u8, block_log2: u32) -> u16 {
    (1u64 << (block_log2 - class as u32)) as u16
}

/// Free-list node stored in the first bytes of a free fragment.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct FragNode {
    /// Heap-relative offset of the previous free fragment, or `u64::MAX`.
    pub prev: u64,
    /// Heap-relative offset of the next free fragment, or `u64::MAX`.
    pub next: u64,
}

impl FragNode {
    pub(crate) fn encode(self) -> [u8; NODE_SIZE as usize] {
        let mut e = [0u8; NODE_SIZE as usize];
        e[0..8].copy_from_slice(&self.prev.to_le_bytes());
        e[8..16].copy_from_slice(&self.next.to_le_bytes());
        e
    }

    pub(crate) fn decode(bytes: &[u8]) -> FragNode {
        FragNode {
            prev: u64::from_le_bytes(bytes[0..8].try_into().unwrap()),
            next: u64::from_le_bytes(bytes[8..16].try_into().unwrap()),
        }
    }
}
