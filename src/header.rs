//! On-file heap header: fixed-offset parameter words at the start of the
//! backing store.
//!
//! The header is followed by the block-metadata table (16 bytes per
//! declared block) and then the payload region, whose file offset is
//! rounded up to the block size. The magic word is written in native byte
//! order and encodes the word width, so an attach from a foreign
//! architecture or word size reads a mismatching value and is refused
//! before any other field is trusted.

use crate::config::{HeapConfig, MAX_BLOCK_LOG2, MIN_BLOCK_LOG2};
use crate::error::{Error, Result};
use crate::layout::AddressingMode;

/// Total header size in bytes. The block table starts here.
pub(crate) const HEADER_SIZE: u64 = 512;

/// Size of one block-metadata table entry.
pub(crate) const BLOCK_ENTRY_SIZE: u64 = 16;

/// Number of fragment-class list heads reserved in the header. Classes
/// are indexed by log2 of the fragment size; 32 covers every legal block
/// size.
pub(crate) const FRAG_CLASSES: usize = 32;

/// Current backing-store format version.
pub(crate) const FORMAT_VERSION: u32 = 1;

const MAGIC_SEED: u64 = 0x5354_5241_4845_0000; // "STRAHE" + word-width tag

/// The magic value this build writes and expects.
pub(crate) fn native_magic() -> u64 {
    MAGIC_SEED | usize::BITS as u64
}

/// Field offsets within the header.
pub(crate) mod field {
    pub const MAGIC: usize = 0;
    pub const VERSION: usize = 8;
    pub const MODE: usize = 12;
    pub const BLOCK_LOG2: usize = 16;
    pub const SHRINK_THRESHOLD: usize = 20;
    pub const BLOCK_COUNT: usize = 24;
    pub const SEGMENT_SPAN: usize = 32;
    pub const PAYLOAD_START: usize = 40;
    pub const BRK: usize = 48;
    pub const FREE_HEAD: usize = 56;
    pub const ROVER: usize = 60;
    pub const OBJMAP_OFF: usize = 64;
    pub const OBJMAP_CAP: usize = 72;
    pub const ALIGN_OFF: usize = 80;
    pub const ALIGN_CAP: usize = 88;
    pub const FRAG_HEADS: usize = 96;
}

#[inline]
pub(crate) fn get_u32(bytes: &[u8], at: usize) -> u32 {
    u32::from_le_bytes(bytes[at..at + 4].try_into().unwrap())
}

#[inline]
pub(crate) fn put_u32(bytes: &mut [u8], at: usize, v: u32) {
    bytes[at..at + 4].copy_from_slice(&v.to_le_bytes());
}

#[inline]
pub(crate) fn get_u64(bytes: &[u8], at: usize) -> u64 {
    u64::from_le_bytes(bytes[at..at + 8].try_into().unwrap())
}

#[inline]
pub(crate) fn put_u64(bytes: &mut [u8], at: usize, v: u64) {
    bytes[at..at + 8].copy_from_slice(&v.to_le_bytes());
}

#[inline]
pub(crate) fn frag_head(bytes: &[u8], class: u8) -> u64 {
    get_u64(bytes, field::FRAG_HEADS + class as usize * 8)
}

#[inline]
pub(crate) fn set_frag_head(bytes: &mut [u8], class: u8, off: u64) {
    put_u64(bytes, field::FRAG_HEADS + class as usize * 8, off);
}

/// Immutable heap geometry, decoded once per operation from the header.
#[derive(Debug, Clone, Copy)]
pub(crate) struct Geometry {
    pub block_log2: u32,
    pub block_count: u64,
    /// File offset of the first payload byte.
    pub payload_start: u64,
    /// Total reserved span: payload_start + maximum payload size.
    pub segment_span: u64,
    pub mode: AddressingMode,
}

impl Geometry {
    #[inline]
    pub fn block_size(&self) -> u64 {
        1u64 << self.block_log2
    }

    /// File offset of block `index`'s table entry.
    #[inline]
    pub fn entry_off(&self, index: u32) -> usize {
        (HEADER_SIZE + index as u64 * BLOCK_ENTRY_SIZE) as usize
    }

    /// File range of payload bytes `[off, off + len)`.
    #[inline]
    pub fn payload_range(&self, off: u64, len: u64) -> std::ops::Range<usize> {
        let start = (self.payload_start + off) as usize;
        start..start + len as usize
    }
}

/// File offset where the payload region starts for a configuration.
pub(crate) fn payload_start_for(cfg: &HeapConfig) -> u64 {
    let table_end = HEADER_SIZE + cfg.block_count * BLOCK_ENTRY_SIZE;
    crate::layout::round_up(table_end, cfg.block_size())
}

/// Total reserved file span for a configuration.
pub(crate) fn segment_span_for(cfg: &HeapConfig) -> u64 {
    payload_start_for(cfg) + cfg.block_count * cfg.block_size()
}

/// Write a freshly initialized header for a new heap.
pub(crate) fn init(bytes: &mut [u8], cfg: &HeapConfig) {
    bytes[field::MAGIC..field::MAGIC + 8].copy_from_slice(&native_magic().to_ne_bytes());
    put_u32(bytes, field::VERSION, FORMAT_VERSION);
    put_u32(bytes, field::MODE, cfg.addressing.encode());
    put_u32(bytes, field::BLOCK_LOG2, cfg.block_size_log2);
    put_u32(bytes, field::SHRINK_THRESHOLD, cfg.shrink_threshold);
    put_u64(bytes, field::BLOCK_COUNT, cfg.block_count);
    put_u64(bytes, field::SEGMENT_SPAN, segment_span_for(cfg));
    put_u64(bytes, field::PAYLOAD_START, payload_start_for(cfg));
    put_u64(bytes, field::BRK, 0);
    put_u32(bytes, field::FREE_HEAD, u32::MAX);
    put_u32(bytes, field::ROVER, u32::MAX);
    put_u64(bytes, field::OBJMAP_OFF, u64::MAX);
    put_u64(bytes, field::OBJMAP_CAP, 0);
    put_u64(bytes, field::ALIGN_OFF, u64::MAX);
    put_u64(bytes, field::ALIGN_CAP, 0);
    for class in 0..FRAG_CLASSES as u8 {
        set_frag_head(bytes, class, u64::MAX);
    }
}

/// Validate a header read from an existing backing store and decode its
/// geometry. Refuses magic/version mismatches and malformed geometry.
pub(crate) fn validate(bytes: &[u8]) -> Result<Geometry> {
    if bytes.len() < HEADER_SIZE as usize {
        return Err(Error::invalid("backing store smaller than the heap header"));
    }
    let found = u64::from_ne_bytes(bytes[field::MAGIC..field::MAGIC + 8].try_into().unwrap());
    if found != native_magic() {
        return Err(Error::FormatMismatch {
            expected: native_magic(),
            found,
        });
    }
    let version = get_u32(bytes, field::VERSION);
    if version != FORMAT_VERSION {
        return Err(Error::invalid(format!(
            "unsupported backing-store format version {version}"
        )));
    }

    let block_log2 = get_u32(bytes, field::BLOCK_LOG2);
    if !(MIN_BLOCK_LOG2..=MAX_BLOCK_LOG2).contains(&block_log2) {
        return Err(Error::invalid(format!(
            "stored block_size_log2 {block_log2} out of range"
        )));
    }
    let block_count = get_u64(bytes, field::BLOCK_COUNT);
    if block_count == 0 || block_count > u32::MAX as u64 - 1 {
        return Err(Error::invalid("stored block count out of range"));
    }

    let mode = AddressingMode::decode(get_u32(bytes, field::MODE))?;
    let payload_start = get_u64(bytes, field::PAYLOAD_START);
    let segment_span = get_u64(bytes, field::SEGMENT_SPAN);

    let table_end = HEADER_SIZE + block_count * BLOCK_ENTRY_SIZE;
    if payload_start < table_end || segment_span != payload_start + (block_count << block_log2) {
        return Err(Error::invalid("stored heap geometry is inconsistent"));
    }

    let brk = get_u64(bytes, field::BRK);
    if brk > block_count << block_log2 || brk % (1 << block_log2) != 0 {
        return Err(Error::invalid("stored break is out of bounds"));
    }

    Ok(Geometry {
        block_log2,
        block_count,
        payload_start,
        segment_span,
        mode,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fresh_header(cfg: &HeapConfig) -> Vec<u8> {
        let mut bytes = vec![0u8; HEADER_SIZE as usize];
        init(&mut bytes, cfg);
        bytes
    }

    #[test]
    fn test_init_validate_round_trip() {
        let cfg = HeapConfig::default();
        let bytes = fresh_header(&cfg);

        let geo = validate(&bytes).unwrap();
        assert_eq!(geo.block_log2, cfg.block_size_log2);
        assert_eq!(geo.block_count, cfg.block_count);
        assert_eq!(geo.payload_start, payload_start_for(&cfg));
        assert_eq!(geo.segment_span, segment_span_for(&cfg));
        assert_eq!(geo.mode, AddressingMode::Global);
    }

    #[test]
    fn test_payload_start_is_block_aligned() {
        let cfg = HeapConfig::default();
        assert_eq!(payload_start_for(&cfg) % cfg.block_size(), 0);
    }

    #[test]
    fn test_rejects_bad_magic() {
        let cfg = HeapConfig::default();
        let mut bytes = fresh_header(&cfg);
        bytes[0] ^= 0xFF;

        match validate(&bytes) {
            Err(Error::FormatMismatch { expected, found }) => {
                assert_eq!(expected, native_magic());
                assert_ne!(found, expected);
            }
            other => panic!("expected FormatMismatch, got {other:?}"),
        }
    }

    #[test]
    fn test_rejects_byte_swapped_magic() {
        // A heap written by an opposite-endian build presents the magic
        // byte-swapped.
        let cfg = HeapConfig::default();
        let mut bytes = fresh_header(&cfg);
        let swapped = native_magic().swap_bytes();
        bytes[0..8].copy_from_slice(&swapped.to_ne_bytes());
        assert!(matches!(validate(&bytes), Err(Error::FormatMismatch { .. })));
    }

    #[test]
    fn test_rejects_bad_version() {
        let cfg = HeapConfig::default();
        let mut bytes = fresh_header(&cfg);
        put_u32(&mut bytes, field::VERSION, 99);
        assert!(validate(&bytes).is_err());
    }

    #[test]
    fn test_rejects_truncated_header() {
        assert!(validate(&[0u8; 64]).is_err());
    }

    #[test]
    fn test_frag_heads_start_nil() {
        let bytes = fresh_header(&HeapConfig::default());
        for class in 0..FRAG_CLASSES as u8 {
            assert_eq!(frag_head(&bytes, class), u64::MAX);
        }
    }
}
