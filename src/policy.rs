//! Composable allocation policy layers.
//!
//! Debugging aids wrap the raw engine as a stack of layers rather than by
//! swapping entry points: each layer transforms a request and delegates to
//! the rest of the stack, so checking and tracing compose in any order and
//! the plain path stays a straight call into the engine.
//!
//! - [`CheckedLayer`] brackets every allocation with a hidden header and
//!   tail sentinel, junk-fills fresh and freed memory, and classifies any
//!   sentinel damage it finds before reporting it.
//! - [`TraceLayer`] appends one line per operation to a destination chosen
//!   by the `STRATUM_TRACE` environment variable and can watch a single
//!   address, calling a breakpoint-friendly hook whenever it appears.

use crate::engine::Engine;
use crate::error::{CorruptionKind, Error, Result};
use crate::frag;
use crate::layout::{self, HeapOffset};
use std::fs::OpenOptions;
use std::io::{BufWriter, Write};
use std::panic::Location;

/// Environment variable naming the trace destination: a file path, or
/// `-`/`stderr` for standard error. Unset leaves tracing disabled even
/// when the layer is attached.
pub const TRACE_ENV: &str = "STRATUM_TRACE";

const CHECK_HEADER: u64 = 16;
const CHECK_TAIL: u64 = 1;
const CHECK_OVERHEAD: u64 = CHECK_HEADER + CHECK_TAIL;

const LIVE_MAGIC: u64 = 0xA110_CA7E_5EA1_ED00;
const FREED_MAGIC: u64 = 0xF8EE_D0F8_EED0_F8EE;
const TAIL_SENTINEL: u8 = 0xC3;

/// Byte pattern written over freshly allocated memory.
const ALLOC_JUNK: u8 = 0xA5;
/// Byte pattern written over freed memory.
const FREE_JUNK: u8 = 0x5F;

/// What the checking layer found wrong with an allocation's sentinels.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CorruptionReport {
    /// Classification of the damage.
    pub kind: CorruptionKind,
    /// Caller-visible offset of the damaged allocation.
    pub offset: u64,
}

/// Callback invoked with every corruption report before the operation
/// fails.
pub type CorruptionHandler = Box<dyn FnMut(&CorruptionReport) + Send>;

/// Per-heap debugging configuration, applied at attach time.
pub struct DebugOptions {
    /// Wrap allocations with sentinels and junk fills.
    pub checked: bool,
    /// Log every operation to the [`TRACE_ENV`] destination.
    pub traced: bool,
    /// Called when the checking layer detects corruption. The default
    /// handler logs the report and aborts the process; a replacement that
    /// returns turns the operation into an [`Error::Corruption`].
    pub corruption_handler: Option<CorruptionHandler>,
}

impl Default for DebugOptions {
    fn default() -> Self {
        Self {
            checked: false,
            traced: false,
            corruption_handler: None,
        }
    }
}

impl std::fmt::Debug for DebugOptions {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DebugOptions")
            .field("checked", &self.checked)
            .field("traced", &self.traced)
            .field("corruption_handler", &self.corruption_handler.is_some())
            .finish()
    }
}

/// One element of a heap's policy stack, outermost first.
pub(crate) enum Layer {
    Traced(TraceLayer),
    Checked(CheckedLayer),
}

pub(crate) fn build_stack(options: DebugOptions) -> Vec<Layer> {
    let mut layers = Vec::new();
    if options.traced {
        layers.push(Layer::Traced(TraceLayer::from_env()));
    }
    if options.checked {
        layers.push(Layer::Checked(CheckedLayer::new(
            options.corruption_handler,
        )));
    }
    layers
}

pub(crate) fn chain_alloc(
    layers: &mut [Layer],
    eng: &mut Engine<'_>,
    size: u64,
    source: &'static Location<'static>,
) -> Result<HeapOffset> {
    match layers.split_first_mut() {
        None => eng.alloc_raw(size),
        Some((Layer::Traced(t), rest)) => t.alloc(rest, eng, size, source),
        Some((Layer::Checked(c), rest)) => c.alloc(rest, eng, size, source),
    }
}

pub(crate) fn chain_free(
    layers: &mut [Layer],
    eng: &mut Engine<'_>,
    off: HeapOffset,
    source: &'static Location<'static>,
) -> Result<()> {
    match layers.split_first_mut() {
        None => eng.free_raw(off),
        Some((Layer::Traced(t), rest)) => t.free(rest, eng, off, source),
        Some((Layer::Checked(c), rest)) => c.free(rest, eng, off, source),
    }
}

pub(crate) fn chain_resize(
    layers: &mut [Layer],
    eng: &mut Engine<'_>,
    off: HeapOffset,
    new_size: u64,
    source: &'static Location<'static>,
) -> Result<HeapOffset> {
    match layers.split_first_mut() {
        None => eng.resize_raw(off, new_size),
        Some((Layer::Traced(t), rest)) => t.resize(rest, eng, off, new_size, source),
        Some((Layer::Checked(c), rest)) => c.resize(rest, eng, off, new_size, source),
    }
}

/// Set the address the trace layer watches, if one is attached.
pub(crate) fn set_watch(layers: &mut [Layer], addr: Option<u64>) -> bool {
    for layer in layers {
        if let Layer::Traced(t) = layer {
            t.watch = addr;
            return true;
        }
    }
    false
}

/// Called whenever a watched address flows through a traced operation.
/// Never inlined, so a debugger breakpoint on it fires for every hit.
#[inline(never)]
pub fn watch_hit(op: &'static str, addr: u64) {
    std::hint::black_box((op, addr));
}

// ----- checking layer -------------------------------------------------------

pub(crate) struct CheckedLayer {
    handler: Option<CorruptionHandler>,
}

impl CheckedLayer {
    fn new(handler: Option<CorruptionHandler>) -> Self {
        Self { handler }
    }

    fn report(&mut self, kind: CorruptionKind, offset: u64) -> Error {
        let report = CorruptionReport { kind, offset };
        match &mut self.handler {
            Some(handler) => handler(&report),
            None => {
                tracing::error!(kind = %kind, offset = format_args!("{offset:#x}"),
                    "heap corruption detected");
                std::process::abort();
            }
        }
        Error::Corruption { kind, offset }
    }

    fn alloc(
        &mut self,
        rest: &mut [Layer],
        eng: &mut Engine<'_>,
        size: u64,
        source: &'static Location<'static>,
    ) -> Result<HeapOffset> {
        let inner = chain_alloc(rest, eng, size + CHECK_OVERHEAD, source)?;
        let caller = inner.get() + CHECK_HEADER;

        let head = eng.payload_mut(inner.get(), CHECK_HEADER)?;
        head[0..8].copy_from_slice(&size.to_le_bytes());
        head[8..16].copy_from_slice(&LIVE_MAGIC.to_le_bytes());
        eng.fill(caller, size, ALLOC_JUNK)?;
        eng.payload_mut(caller + size, CHECK_TAIL)?[0] = TAIL_SENTINEL;

        Ok(HeapOffset(caller))
    }

    /// Validate the sentinels around a caller-visible offset, returning
    /// the stored payload size.
    fn validate(&mut self, eng: &Engine<'_>, caller: u64) -> Result<u64> {
        if caller < CHECK_HEADER {
            return Err(self.report(CorruptionKind::HeaderCorrupted, caller));
        }
        let head = eng.payload(caller - CHECK_HEADER, CHECK_HEADER)?;
        let size = u64::from_le_bytes(head[0..8].try_into().unwrap());
        let magic = u64::from_le_bytes(head[8..16].try_into().unwrap());

        if magic == FREED_MAGIC {
            return Err(self.report(CorruptionKind::DoubleFree, caller));
        }
        if magic != LIVE_MAGIC {
            return Err(self.report(CorruptionKind::HeaderCorrupted, caller));
        }
        match eng.payload(caller + size, CHECK_TAIL) {
            Ok(tail) if tail[0] == TAIL_SENTINEL => Ok(size),
            _ => Err(self.report(CorruptionKind::TailCorrupted, caller)),
        }
    }

    fn free(
        &mut self,
        rest: &mut [Layer],
        eng: &mut Engine<'_>,
        off: HeapOffset,
        source: &'static Location<'static>,
    ) -> Result<()> {
        let caller = off.get();
        let size = self.validate(eng, caller)?;

        let head = eng.payload_mut(caller - CHECK_HEADER, CHECK_HEADER)?;
        head[8..16].copy_from_slice(&FREED_MAGIC.to_le_bytes());
        eng.fill(caller, size, FREE_JUNK)?;

        chain_free(rest, eng, HeapOffset(caller - CHECK_HEADER), source)
    }

    fn resize(
        &mut self,
        rest: &mut [Layer],
        eng: &mut Engine<'_>,
        off: HeapOffset,
        new_size: u64,
        source: &'static Location<'static>,
    ) -> Result<HeapOffset> {
        let caller = off.get();
        let old_size = self.validate(eng, caller)?;

        let inner = HeapOffset(caller - CHECK_HEADER);
        let inner_size = new_size + CHECK_OVERHEAD;

        // The layer only delegates when the allocation's capacity stays
        // exactly what it is, so the inner resize cannot move or release
        // anything. Every other case relocates up here, where the old
        // region gets the freed marking before it goes back to the pool.
        let in_place = {
            let cap = eng.capacity_of(inner)?;
            let block_log2 = eng.geometry().block_log2;
            match frag::class_for(inner_size, block_log2) {
                Some(class) => frag::class_size(class) == cap,
                None => layout::blockify(inner_size, block_log2) << block_log2 == cap,
            }
        };

        if in_place {
            let new_inner = chain_resize(rest, eng, inner, inner_size, source)?;
            let new_caller = new_inner.get() + CHECK_HEADER;
            self.write_sentinels(eng, new_inner.get(), new_size)?;
            if new_size > old_size {
                eng.fill(new_caller + old_size, new_size - old_size, ALLOC_JUNK)?;
            }
            return Ok(HeapOffset(new_caller));
        }

        let new_inner = chain_alloc(rest, eng, inner_size, source)?;
        let new_caller = new_inner.get() + CHECK_HEADER;
        eng.copy(caller, new_caller, old_size.min(new_size))?;
        self.write_sentinels(eng, new_inner.get(), new_size)?;
        if new_size > old_size {
            eng.fill(new_caller + old_size, new_size - old_size, ALLOC_JUNK)?;
        }

        // Retire the old region the same way free does: freed marker,
        // junk fill, then release through the rest of the stack.
        let head = eng.payload_mut(inner.get(), CHECK_HEADER)?;
        head[8..16].copy_from_slice(&FREED_MAGIC.to_le_bytes());
        eng.fill(caller, old_size, FREE_JUNK)?;
        chain_free(rest, eng, inner, source)?;

        Ok(HeapOffset(new_caller))
    }

    fn write_sentinels(&self, eng: &mut Engine<'_>, inner: u64, size: u64) -> Result<()> {
        let head = eng.payload_mut(inner, CHECK_HEADER)?;
        head[0..8].copy_from_slice(&size.to_le_bytes());
        head[8..16].copy_from_slice(&LIVE_MAGIC.to_le_bytes());
        eng.payload_mut(inner + CHECK_HEADER + size, CHECK_TAIL)?[0] = TAIL_SENTINEL;
        Ok(())
    }
}

// ----- tracing layer --------------------------------------------------------

enum TraceDest {
    Disabled,
    Stderr,
    File(BufWriter<std::fs::File>),
}

pub(crate) struct TraceLayer {
    dest: TraceDest,
    watch: Option<u64>,
}

impl TraceLayer {
    fn from_env() -> Self {
        let dest = match std::env::var(TRACE_ENV) {
            Err(_) => TraceDest::Disabled,
            Ok(v) if v == "-" || v == "stderr" => TraceDest::Stderr,
            Ok(path) => match OpenOptions::new().create(true).append(true).open(&path) {
                Ok(file) => TraceDest::File(BufWriter::new(file)),
                Err(e) => {
                    tracing::warn!(path, error = %e,
                        "cannot open trace destination; tracing disabled");
                    TraceDest::Disabled
                }
            },
        };
        Self { dest, watch: None }
    }

    fn emit(&mut self, line: std::fmt::Arguments<'_>) {
        // A failed trace write never fails the operation it describes.
        match &mut self.dest {
            TraceDest::Disabled => {}
            TraceDest::Stderr => {
                let _ = writeln!(std::io::stderr().lock(), "{line}");
            }
            TraceDest::File(w) => {
                let _ = writeln!(w, "{line}");
                let _ = w.flush();
            }
        }
    }

    fn check_watch(&self, op: &'static str, addr: u64) {
        if self.watch == Some(addr) {
            watch_hit(op, addr);
        }
    }

    fn alloc(
        &mut self,
        rest: &mut [Layer],
        eng: &mut Engine<'_>,
        size: u64,
        source: &'static Location<'static>,
    ) -> Result<HeapOffset> {
        let result = chain_alloc(rest, eng, size, source);
        match &result {
            Ok(off) => {
                self.emit(format_args!("alloc({size}) = {off} @ {source}"));
                self.check_watch("alloc", off.get());
            }
            Err(e) => self.emit(format_args!("alloc({size}) failed: {e} @ {source}")),
        }
        result
    }

    fn free(
        &mut self,
        rest: &mut [Layer],
        eng: &mut Engine<'_>,
        off: HeapOffset,
        source: &'static Location<'static>,
    ) -> Result<()> {
        self.check_watch("free", off.get());
        let result = chain_free(rest, eng, off, source);
        match &result {
            Ok(()) => self.emit(format_args!("free({off}) @ {source}")),
            Err(e) => self.emit(format_args!("free({off}) failed: {e} @ {source}")),
        }
        result
    }

    fn resize(
        &mut self,
        rest: &mut [Layer],
        eng: &mut Engine<'_>,
        off: HeapOffset,
        new_size: u64,
        source: &'static Location<'static>,
    ) -> Result<HeapOffset> {
        self.check_watch("resize", off.get());
        let result = chain_resize(rest, eng, off, new_size, source);
        match &result {
            Ok(new_off) => {
                self.emit(format_args!(
                    "resize({off}, {new_size}) = {new_off} @ {source}"
                ));
                self.check_watch("resize", new_off.get());
            }
            Err(e) => self.emit(format_args!(
                "resize({off}, {new_size}) failed: {e} @ {source}"
            )),
        }
        result
    }
}
