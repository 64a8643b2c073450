//! Block-metadata table entries.
//!
//! One 16-byte entry per payload block, stored between the header and the
//! payload region. The on-file union-plus-tag layout of the ancestral
//! format is decoded into an exhaustive enum so no code path can read the
//! wrong arm.
//!
//! Free runs carry their length at both the head and the tail block
//! (boundary tags), which lets `free` find the head of the run that ends
//! immediately before a newly freed range in O(1). List links (prev/next
//! free run) are block indices and only meaningful at the head.

use crate::error::{CorruptionKind, Error, Result};

const KIND_FREE: u8 = 0;
const KIND_FREE_BODY: u8 = 1;
const KIND_LARGE: u8 = 2;
const KIND_LARGE_BODY: u8 = 3;
const KIND_FRAGMENTED: u8 = 4;

/// Decoded state of one block.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum BlockState {
    /// Head or tail of a free run. `prev`/`next` are free-list links,
    /// valid at the head only.
    Free { run: u32, prev: u32, next: u32 },
    /// Interior block of a free run.
    FreeBody,
    /// First block of a busy large allocation spanning `run` blocks.
    Large { run: u32 },
    /// Interior block of a busy large allocation.
    LargeBody,
    /// Block sliced into `1 << (block_log2 - class)` fragments of
    /// `1 << class` bytes; `free_count` of them are currently free.
    Fragmented { class: u8, free_count: u16 },
}

impl BlockState {
    pub(crate) fn encode(self) -> [u8; 16] {
        let mut e = [0u8; 16];
        match self {
            BlockState::Free { run, prev, next } => {
                e[0] = KIND_FREE;
                e[4..8].copy_from_slice(&run.to_le_bytes());
                e[8..12].copy_from_slice(&prev.to_le_bytes());
                e[12..16].copy_from_slice(&next.to_le_bytes());
            }
            BlockState::FreeBody => e[0] = KIND_FREE_BODY,
            BlockState::Large { run } => {
                e[0] = KIND_LARGE;
                e[4..8].copy_from_slice(&run.to_le_bytes());
            }
            BlockState::LargeBody => e[0] = KIND_LARGE_BODY,
            BlockState::Fragmented { class, free_count } => {
                e[0] = KIND_FRAGMENTED;
                e[1] = class;
                e[2..4].copy_from_slice(&free_count.to_le_bytes());
            }
        }
        e
    }

    pub(crate) fn decode(e: &[u8], index: u32) -> Result<BlockState> {
        let run = u32::from_le_bytes(e[4..8].try_into().unwrap());
        let prev = u32::from_le_bytes(e[8..12].try_into().unwrap());
        let next = u32::from_le_bytes(e[12..16].try_into().unwrap());
        match e[0] {
            KIND_FREE => Ok(BlockState::Free { run, prev, next }),
            KIND_FREE_BODY => Ok(BlockState::FreeBody),
            KIND_LARGE => Ok(BlockState::Large { run }),
            KIND_LARGE_BODY => Ok(BlockState::LargeBody),
            KIND_FRAGMENTED => Ok(BlockState::Fragmented {
                class: e[1],
                free_count: u16::from_le_bytes(e[2..4].try_into().unwrap()),
            }),
            _ => Err(Error::Corruption {
                kind: CorruptionKind::Metadata,
                offset: index as u64,
            }),
        }
    }

    /// Is this block available (any flavor of free)?
    pub(crate) fn is_free(&self) -> bool {
        matches!(self, BlockState::Free { .. } | BlockState::FreeBody)
    }
}
