//! Error types for stratum.

use thiserror::Error;

/// Result type alias using stratum's Error.
pub type Result<T> = std::result::Result<T, Error>;

/// Classification of heap corruption detected by the checked allocation
/// layer or by a consistency walk.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CorruptionKind {
    /// An allocation header carries the freed sentinel: the object was
    /// already released.
    DoubleFree,
    /// The hidden allocation header does not carry a live sentinel.
    HeaderCorrupted,
    /// The byte after the payload was overwritten.
    TailCorrupted,
    /// Block or fragment bookkeeping is internally inconsistent.
    Metadata,
}

impl std::fmt::Display for CorruptionKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CorruptionKind::DoubleFree => write!(f, "double free"),
            CorruptionKind::HeaderCorrupted => write!(f, "header corrupted"),
            CorruptionKind::TailCorrupted => write!(f, "tail corrupted"),
            CorruptionKind::Metadata => write!(f, "metadata inconsistent"),
        }
    }
}

/// Main error type for stratum operations.
///
/// Everything except [`Error::Corruption`] is recoverable at the call
/// site. Corruption is reported through the installed corruption handler
/// first (which by default aborts the process); if the handler returns,
/// the failing call surfaces this error and leaves the heap untouched.
#[derive(Error, Debug)]
pub enum Error {
    /// Zero size, unresolvable address, or otherwise malformed argument.
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    /// The backing store could not be grown to satisfy the request.
    #[error("out of memory: cannot obtain {requested} more bytes from the backing store")]
    OutOfMemory {
        /// Number of bytes the failed growth asked for.
        requested: u64,
    },

    /// An object with this name already exists in the heap.
    #[error("name conflict: object `{0}` already exists in this heap")]
    NameConflict(String),

    /// Operation on a descriptor not attached by this process, or an
    /// object lock field owned by another process.
    #[error("access denied: {0}")]
    AccessDenied(String),

    /// The backing store was written by an incompatible build
    /// (architecture, word width, endianness, or format version).
    #[error("format mismatch: backing store magic {found:#018x}, expected {expected:#018x}")]
    FormatMismatch {
        /// Magic value this build would have written.
        expected: u64,
        /// Magic value found in the file.
        found: u64,
    },

    /// Heap corruption detected. Fatal by design: the default handler
    /// reports and aborts rather than continuing on metadata that may be
    /// shared with other processes.
    #[error("heap corruption: {kind} at offset {offset:#x}")]
    Corruption {
        /// What kind of damage was found.
        kind: CorruptionKind,
        /// Heap-relative offset of the damaged object or block.
        offset: u64,
    },

    /// I/O error from the backing file.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// System call error (via rustix).
    #[error("system error: {0}")]
    System(#[from] rustix::io::Errno),
}

impl Error {
    pub(crate) fn invalid(msg: impl Into<String>) -> Self {
        Error::InvalidArgument(msg.into())
    }

    pub(crate) fn denied(msg: impl Into<String>) -> Self {
        Error::AccessDenied(msg.into())
    }
}
