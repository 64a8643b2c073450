//! Heap address arithmetic: offsets, block indices, and mode-aware
//! translation between heap-relative and process-local addresses.
//!
//! All internal bookkeeping (free-run links, fragment chains) is expressed
//! in block indices and heap-relative offsets, never raw pointers, so the
//! on-file structures stay valid no matter where a process maps the heap.
//! Raw pointers exist only at the API boundary, produced by the explicit
//! conversions in this module.

use crate::error::{Error, Result};

/// A heap-relative byte offset into the payload region.
///
/// Offset 0 is the first payload byte. A `HeapOffset` is deliberately not
/// convertible to a pointer; go through [`to_local`] with the attaching
/// process's base.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct HeapOffset(pub(crate) u64);

impl HeapOffset {
    /// Sentinel for "no offset" (empty free-list head, unused slot).
    pub const NIL: HeapOffset = HeapOffset(u64::MAX);

    /// The raw offset value.
    #[inline]
    pub fn get(self) -> u64 {
        self.0
    }

    #[inline]
    pub(crate) fn is_nil(self) -> bool {
        self.0 == u64::MAX
    }
}

impl std::fmt::Debug for HeapOffset {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if self.is_nil() {
            write!(f, "HeapOffset(NIL)")
        } else {
            write!(f, "HeapOffset({:#x})", self.0)
        }
    }
}

impl std::fmt::Display for HeapOffset {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:#x}", self.0)
    }
}

/// How object addresses are handed to callers of one heap.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum AddressingMode {
    /// Addresses are heap-relative offsets, valid in every process that
    /// attaches the heap regardless of its local base.
    #[default]
    Global,
    /// Addresses are absolute process-local values. Valid only for a
    /// process that mapped the heap at the same base as whoever produced
    /// them; used for single-attacher or same-base deployments.
    Local,
}

impl AddressingMode {
    pub(crate) fn encode(self) -> u32 {
        match self {
            AddressingMode::Global => 0,
            AddressingMode::Local => 1,
        }
    }

    pub(crate) fn decode(v: u32) -> Result<Self> {
        match v {
            0 => Ok(AddressingMode::Global),
            1 => Ok(AddressingMode::Local),
            other => Err(Error::invalid(format!("unknown addressing mode {other}"))),
        }
    }
}

/// An object address as seen by API callers.
///
/// In [`AddressingMode::Global`] this wraps a heap-relative offset; in
/// [`AddressingMode::Local`] it wraps an absolute address in the current
/// process. Either way it is an opaque token: hand it back to the heap
/// that produced it.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct HeapAddr(pub(crate) u64);

impl HeapAddr {
    /// The raw address value (offset or local address, per heap mode).
    #[inline]
    pub fn raw(self) -> u64 {
        self.0
    }

    /// Rebuild an address from its raw value, e.g. one received from
    /// another process over IPC. The value must have been produced by
    /// [`HeapAddr::raw`] on a heap with the same addressing mode.
    #[inline]
    pub fn from_raw(raw: u64) -> Self {
        HeapAddr(raw)
    }
}

impl std::fmt::Debug for HeapAddr {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "HeapAddr({:#x})", self.0)
    }
}

impl std::fmt::Display for HeapAddr {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:#x}", self.0)
    }
}

/// Convert a heap-relative offset to a process-local address.
#[inline]
pub fn to_local(base: usize, payload_start: u64, off: HeapOffset) -> u64 {
    base as u64 + payload_start + off.0
}

/// Convert a process-local address back to a heap-relative offset.
///
/// Returns an invalid-argument error when the address lies outside this
/// process's mapping of the payload region.
#[inline]
pub fn to_offset(base: usize, payload_start: u64, payload_len: u64, local: u64) -> Result<HeapOffset> {
    let start = base as u64 + payload_start;
    let off = local
        .checked_sub(start)
        .ok_or_else(|| Error::invalid(format!("address {local:#x} is below the payload region")))?;
    if off >= payload_len {
        return Err(Error::invalid(format!(
            "address {local:#x} is beyond the payload region"
        )));
    }
    Ok(HeapOffset(off))
}

/// Block index containing a payload offset.
#[inline]
pub(crate) fn block_of(off: u64, block_log2: u32) -> u32 {
    (off >> block_log2) as u32
}

/// Payload offset of a block's first byte.
#[inline]
pub(crate) fn block_start(index: u32, block_log2: u32) -> u64 {
    (index as u64) << block_log2
}

/// Round a size up to a whole number of blocks.
#[inline]
pub(crate) fn blockify(size: u64, block_log2: u32) -> u64 {
    let bs = 1u64 << block_log2;
    size.div_ceil(bs)
}

/// Round `v` up to the next multiple of `align` (a power of two).
#[inline]
pub(crate) fn round_up(v: u64, align: u64) -> u64 {
    debug_assert!(align.is_power_of_two());
    (v + align - 1) & !(align - 1)
}
