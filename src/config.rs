//! Heap geometry and tuning configuration.

use crate::error::{Error, Result};
use crate::layout::AddressingMode;

/// Smallest permitted block size (256 bytes).
pub const MIN_BLOCK_LOG2: u32 = 8;
/// Largest permitted block size (16 MiB).
pub const MAX_BLOCK_LOG2: u32 = 24;
/// Default block size (4 KiB).
pub const DEFAULT_BLOCK_LOG2: u32 = 12;
/// Default maximum heap size in blocks (4096 blocks = 16 MiB at default
/// block size).
pub const DEFAULT_BLOCK_COUNT: u64 = 4096;
/// Default number of trailing free blocks required before `free`/`resize`
/// return storage to the backing file.
pub const DEFAULT_SHRINK_THRESHOLD: u32 = 16;

/// Geometry and tuning for a heap, fixed at creation time and recorded in
/// the backing-store header.
///
/// The block size is explicit, validated configuration rather than a
/// compile-time constant, so a heap file remains portable across builds
/// that agree on word width and endianness.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HeapConfig {
    /// log2 of the block size in bytes.
    pub block_size_log2: u32,
    /// Maximum number of payload blocks; bounds the reserved segment.
    pub block_count: u64,
    /// How addresses are handed to callers of this heap.
    pub addressing: AddressingMode,
    /// Trailing free-run length (in blocks) at which storage is returned
    /// to the backing file. Adjustable later per attached heap.
    pub shrink_threshold: u32,
}

impl Default for HeapConfig {
    fn default() -> Self {
        Self {
            block_size_log2: DEFAULT_BLOCK_LOG2,
            block_count: DEFAULT_BLOCK_COUNT,
            addressing: AddressingMode::Global,
            shrink_threshold: DEFAULT_SHRINK_THRESHOLD,
        }
    }
}

impl HeapConfig {
    /// Block size in bytes.
    #[inline]
    pub fn block_size(&self) -> u64 {
        1u64 << self.block_size_log2
    }

    /// Validate the configuration before a heap is created from it.
    pub fn validate(&self) -> Result<()> {
        if !(MIN_BLOCK_LOG2..=MAX_BLOCK_LOG2).contains(&self.block_size_log2) {
            return Err(Error::invalid(format!(
                "block_size_log2 {} out of range {MIN_BLOCK_LOG2}..={MAX_BLOCK_LOG2}",
                self.block_size_log2
            )));
        }
        if self.block_count == 0 {
            return Err(Error::invalid("block_count must be > 0"));
        }
        if self.block_count > u32::MAX as u64 - 1 {
            return Err(Error::invalid("block_count exceeds the index range"));
        }
        self.block_count
            .checked_mul(self.block_size())
            .ok_or_else(|| Error::invalid("heap capacity overflows"))?;
        Ok(())
    }
}
