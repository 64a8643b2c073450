//! # Stratum
//!
//! A persistent, multi-process shared-memory heap with named objects.
//!
//! A heap lives in a memory-mapped backing file that any number of
//! processes can attach, each at its own base address. Allocations are
//! registered in an in-heap object map, so a named object created by one
//! process can be resolved by another, or by the same program after a
//! restart. All internal bookkeeping is stored as offsets and indices,
//! never pointers, which is what makes the file relocatable.
//!
//! ## Features
//!
//! - **Persistent**: the heap *is* the file; detach and re-attach later
//! - **Multi-process**: block metadata, free lists, and the object map
//!   all live in the shared mapping
//! - **Named objects**: allocate under a name, look it up from anywhere
//! - **Elastic**: the backing file grows on demand and shrinks when a
//!   large trailing run frees up
//! - **Debuggable**: opt-in sentinel checking and operation tracing,
//!   composable per attachment
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use stratum::prelude::*;
//!
//! # fn main() -> stratum::Result<()> {
//! let table = HeapTable::new();
//! let heap = table.attach("/dev/shm/scratch.heap", AttachOptions::default())?;
//!
//! let addr = table.allocate(heap, 1024, "frame-buffer")?;
//! table.write(heap, addr, 0, b"hello")?;
//!
//! // Any attached process (or a later run) finds it by name.
//! let found = table.lookup(heap, "frame-buffer")?.expect("registered above");
//! assert_eq!(found, addr);
//!
//! table.detach(heap, false)?;
//! # Ok(())
//! # }
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]
#![deny(unsafe_op_in_unsafe_fn)]

mod block;
pub mod config;
mod engine;
pub mod error;
mod frag;
pub mod heap;
mod header;
pub mod layout;
mod objmap;
pub mod policy;
mod store;

/// Prelude for convenient imports
pub mod prelude {
    pub use crate::config::HeapConfig;
    pub use crate::error::{Error, Result};
    pub use crate::heap::{AttachOptions, HeapDesc, HeapStats, HeapTable};
    pub use crate::layout::{AddressingMode, HeapAddr};
    pub use crate::policy::DebugOptions;
}

pub use error::{Error, Result};
