//! The heap table and public facade.
//!
//! A [`HeapTable`] tracks every heap this process is attached to and hands
//! out integer descriptors. All operations are descriptor-first and
//! serialized by one coarse mutex per table; because the debug layers
//! compose around the engine instead of replacing its entry points, no
//! operation re-enters the table and the lock is never held recursively.
//!
//! Signal contract: operations on a `HeapTable` take a mutex and may touch
//! the filesystem, so they must not be called from a signal handler. The
//! table does not mask signals on the caller's behalf.

use crate::config::HeapConfig;
use crate::engine::Engine;
use crate::error::{Error, Result};
use crate::layout::{self, AddressingMode, HeapAddr, HeapOffset};
use crate::objmap::{self, ObjectEntry};
use crate::policy::{self, DebugOptions, Layer};
use std::panic::Location;
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use std::time::SystemTime;

/// Default number of heap slots in a new table.
pub const DEFAULT_TABLE_CAPACITY: usize = 16;

/// Descriptor for an attached heap, valid within the table that issued it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct HeapDesc(usize);

impl std::fmt::Display for HeapDesc {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "heap#{}", self.0)
    }
}

/// Options for [`HeapTable::attach`].
#[derive(Debug, Default)]
pub struct AttachOptions {
    /// Geometry used when the backing store does not exist yet and must
    /// be created. Ignored when attaching an existing store.
    pub config: HeapConfig,
    /// Delete the backing file when the last local attachment detaches.
    pub autodestruct: bool,
    /// Debug policy applied to this attachment.
    pub debug: DebugOptions,
}

/// Point-in-time usage summary for one heap.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HeapStats {
    /// Live registered objects.
    pub objects: u64,
    /// Sum of the live objects' requested sizes.
    pub object_bytes: u64,
    /// Bytes of payload currently committed to the backing file.
    pub committed_bytes: u64,
    /// Maximum payload this heap can ever commit.
    pub reserved_bytes: u64,
    /// Allocation block size fixed at heap creation.
    pub block_size: u64,
    /// This process's attachment count.
    pub attach_count: u32,
    /// Last time this process modified the heap.
    pub modified: SystemTime,
}

struct HeapSlot {
    store: crate::store::BackingStore,
    path: PathBuf,
    attach_count: u32,
    autodestruct: bool,
    layers: Vec<Layer>,
    modified: SystemTime,
}

impl HeapSlot {
    fn touch(&mut self) {
        self.modified = SystemTime::now();
    }
}

struct TableInner {
    slots: Vec<Option<HeapSlot>>,
}

impl TableInner {
    fn slot_mut(&mut self, h: HeapDesc) -> Result<&mut HeapSlot> {
        self.slots
            .get_mut(h.0)
            .and_then(Option::as_mut)
            .ok_or_else(|| Error::denied(format!("{h} is not attached")))
    }
}

/// Table of heaps attached by this process.
pub struct HeapTable {
    inner: Mutex<TableInner>,
}

impl Default for HeapTable {
    fn default() -> Self {
        Self::new()
    }
}

impl HeapTable {
    /// A table with the default slot capacity.
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_TABLE_CAPACITY)
    }

    /// A table that can hold up to `capacity` concurrent attachments.
    pub fn with_capacity(capacity: usize) -> Self {
        let mut slots = Vec::with_capacity(capacity);
        slots.resize_with(capacity, || None);
        Self {
            inner: Mutex::new(TableInner { slots }),
        }
    }

    /// Add room for `additional` more concurrent attachments.
    pub fn extend(&self, additional: usize) {
        let mut inner = self.lock();
        let new_len = inner.slots.len() + additional;
        inner.slots.resize_with(new_len, || None);
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, TableInner> {
        self.inner.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Attach the heap backed by `path`, creating it if the file does not
    /// exist. Attaching a path this process already has attached bumps
    /// its count and returns the existing descriptor; the first
    /// attachment's options (debug layers, autodestruct) stay in effect
    /// and `options` is ignored, with a warning logged when it differs.
    pub fn attach(&self, path: impl AsRef<Path>, options: AttachOptions) -> Result<HeapDesc> {
        let path = path.as_ref();
        let mut inner = self.lock();

        let canon = std::fs::canonicalize(path).unwrap_or_else(|_| path.to_path_buf());
        for (i, slot) in inner.slots.iter_mut().enumerate() {
            if let Some(slot) = slot {
                if slot.path == canon {
                    slot.attach_count += 1;
                    let checked = slot
                        .layers
                        .iter()
                        .any(|l| matches!(l, Layer::Checked(_)));
                    let traced = slot.layers.iter().any(|l| matches!(l, Layer::Traced(_)));
                    if options.autodestruct != slot.autodestruct
                        || options.debug.checked != checked
                        || options.debug.traced != traced
                    {
                        tracing::warn!(desc = i, path = %canon.display(),
                            "re-attach options differ from the original attachment and are ignored");
                    }
                    tracing::debug!(desc = i, path = %canon.display(), count = slot.attach_count,
                        "re-attached heap");
                    return Ok(HeapDesc(i));
                }
            }
        }

        let free = inner
            .slots
            .iter()
            .position(Option::is_none)
            .ok_or_else(|| Error::denied("heap table is full"))?;

        let (mut store, created) = match crate::store::BackingStore::open(path) {
            Ok(store) => (store, false),
            Err(Error::System(errno)) if errno == rustix::io::Errno::NOENT => {
                let mut store = crate::store::BackingStore::create(path, &options.config)?;
                objmap::bootstrap(&mut Engine::new(&mut store)?)?;
                (store, true)
            }
            Err(e) => return Err(e),
        };
        // Resolvable now that the file exists.
        let canon = std::fs::canonicalize(store.path()).unwrap_or_else(|_| canon);

        let geo = *Engine::new(&mut store)?.geometry();
        tracing::info!(desc = free, path = %canon.display(), created,
            block_size = geo.block_size(), blocks = geo.block_count,
            mode = ?geo.mode, "attached heap");

        inner.slots[free] = Some(HeapSlot {
            store,
            path: canon,
            attach_count: 1,
            autodestruct: options.autodestruct,
            layers: policy::build_stack(options.debug),
            modified: SystemTime::now(),
        });
        Ok(HeapDesc(free))
    }

    /// Drop one attachment; with `force`, drop them all. The last
    /// detachment syncs and unmaps the store, and deletes the backing
    /// file when the heap was attached with autodestruct.
    pub fn detach(&self, h: HeapDesc, force: bool) -> Result<()> {
        let mut inner = self.lock();
        let slot = inner.slot_mut(h)?;

        slot.attach_count = if force { 0 } else { slot.attach_count - 1 };
        if slot.attach_count > 0 {
            return Ok(());
        }

        let slot = inner.slots[h.0]
            .take()
            .ok_or_else(|| Error::denied(format!("{h} is not attached")))?;
        tracing::info!(desc = h.0, path = %slot.path.display(),
            autodestruct = slot.autodestruct, "detached heap");

        let path = slot.path.clone();
        let autodestruct = slot.autodestruct;
        drop(slot); // syncs and unmaps
        if autodestruct {
            std::fs::remove_file(&path)?;
        }
        Ok(())
    }

    // ----- allocation -----------------------------------------------------

    /// Allocate `size` bytes, registered under `name` (`""` for an
    /// anonymous object). A non-empty name that is already taken fails
    /// with [`Error::NameConflict`] and allocates nothing.
    #[track_caller]
    pub fn allocate(&self, h: HeapDesc, size: u64, name: &str) -> Result<HeapAddr> {
        let source = Location::caller();
        let mut inner = self.lock();
        let slot = inner.slot_mut(h)?;
        let HeapSlot { store, layers, .. } = slot;
        let mut eng = Engine::new(store)?;

        if !name.is_empty() {
            objmap::check_name(name)?;
            if objmap::find_by_name(&eng, name.as_bytes())?.is_some() {
                return Err(Error::NameConflict(name.to_string()));
            }
        }

        let off = policy::chain_alloc(layers, &mut eng, size, source)?;
        register(layers, &mut eng, off, size, name, source)?;
        let addr = addr_from_off(&eng, off);
        slot.touch();
        Ok(addr)
    }

    /// Allocate and zero-fill (calloc).
    #[track_caller]
    pub fn allocate_zeroed(&self, h: HeapDesc, size: u64, name: &str) -> Result<HeapAddr> {
        let source = Location::caller();
        let mut inner = self.lock();
        let slot = inner.slot_mut(h)?;
        let HeapSlot { store, layers, .. } = slot;
        let mut eng = Engine::new(store)?;

        if !name.is_empty() {
            objmap::check_name(name)?;
            if objmap::find_by_name(&eng, name.as_bytes())?.is_some() {
                return Err(Error::NameConflict(name.to_string()));
            }
        }

        let off = policy::chain_alloc(layers, &mut eng, size, source)?;
        eng.fill(off.get(), size, 0)?;
        register(layers, &mut eng, off, size, name, source)?;
        let addr = addr_from_off(&eng, off);
        slot.touch();
        Ok(addr)
    }

    /// Allocate with the returned address a multiple of `align` (a power
    /// of two no larger than the block size). Over-allocates and records
    /// the displacement so `free`/`resize` can find the true base.
    #[track_caller]
    pub fn allocate_aligned(
        &self,
        h: HeapDesc,
        size: u64,
        align: u64,
        name: &str,
    ) -> Result<HeapAddr> {
        let source = Location::caller();
        let mut inner = self.lock();
        let slot = inner.slot_mut(h)?;
        let HeapSlot { store, layers, .. } = slot;
        let mut eng = Engine::new(store)?;

        if !align.is_power_of_two() {
            return Err(Error::invalid("alignment must be a power of two"));
        }
        if align > eng.geometry().block_size() {
            return Err(Error::invalid(
                "alignment cannot exceed the heap block size",
            ));
        }
        if !name.is_empty() {
            objmap::check_name(name)?;
            if objmap::find_by_name(&eng, name.as_bytes())?.is_some() {
                return Err(Error::NameConflict(name.to_string()));
            }
        }

        // The payload region is block-aligned in every mapping, so offset
        // alignment carries over to the local address in all processes.
        let inner_off = policy::chain_alloc(layers, &mut eng, size + align, source)?;
        let aligned = HeapOffset(layout::round_up(inner_off.get(), align));
        if aligned != inner_off {
            objmap::align_insert(&mut eng, aligned.get(), inner_off.get(), align)?;
        }
        register(layers, &mut eng, aligned, size, name, source)?;
        let addr = addr_from_off(&eng, aligned);
        slot.touch();
        Ok(addr)
    }

    /// Allocate aligned to the system page size (valloc).
    #[track_caller]
    pub fn allocate_page_aligned(&self, h: HeapDesc, size: u64, name: &str) -> Result<HeapAddr> {
        self.allocate_aligned(h, size, rustix::param::page_size() as u64, name)
    }

    /// Release the object at `addr`. The address must be one this heap
    /// handed out and not yet freed.
    #[track_caller]
    pub fn free(&self, h: HeapDesc, addr: HeapAddr) -> Result<()> {
        let source = Location::caller();
        let mut inner = self.lock();
        let slot = inner.slot_mut(h)?;
        let HeapSlot { store, layers, .. } = slot;
        let mut eng = Engine::new(store)?;

        let off = off_from_addr(&eng, addr)?;
        check_unlocked(&eng, off.get(), "free")?;
        objmap::remove(&mut eng, off.get())?;
        let base = objmap::align_remove(&mut eng, off.get())?
            .map(HeapOffset)
            .unwrap_or(off);
        policy::chain_free(layers, &mut eng, base, source)?;
        slot.touch();
        Ok(())
    }

    /// Resize the object at `addr` to `new_size` bytes, preserving the
    /// leading `min(old, new)` bytes. May relocate; the registration
    /// (name, info, lock) follows the object to its new address.
    #[track_caller]
    pub fn resize(&self, h: HeapDesc, addr: HeapAddr, new_size: u64) -> Result<HeapAddr> {
        let source = Location::caller();
        let mut inner = self.lock();
        let slot = inner.slot_mut(h)?;
        let HeapSlot { store, layers, .. } = slot;
        let mut eng = Engine::new(store)?;

        let off = off_from_addr(&eng, addr)?;
        check_unlocked(&eng, off.get(), "resize")?;
        let entry = objmap::find_by_addr(&eng, off.get())?
            .ok_or_else(|| Error::invalid(format!("{addr} is not a live object")))?;

        let new_off = match objmap::align_find(&eng, off.get())? {
            None => policy::chain_resize(layers, &mut eng, off, new_size, source)?,
            Some((base, align)) => {
                // Aligned objects relocate by hand: the displacement can
                // change, so resize-in-place guarantees do not apply.
                let new_inner = policy::chain_alloc(layers, &mut eng, new_size + align, source)?;
                let new_aligned = HeapOffset(layout::round_up(new_inner.get(), align));
                eng.copy(off.get(), new_aligned.get(), entry.size.min(new_size))?;
                policy::chain_free(layers, &mut eng, HeapOffset(base), source)?;
                objmap::align_remove(&mut eng, off.get())?;
                if new_aligned != new_inner {
                    objmap::align_insert(&mut eng, new_aligned.get(), new_inner.get(), align)?;
                }
                new_aligned
            }
        };

        objmap::remove(&mut eng, off.get())?;
        objmap::insert(
            &mut eng,
            ObjectEntry {
                addr: new_off.get(),
                size: new_size,
                ..entry
            },
        )?;
        let addr = addr_from_off(&eng, new_off);
        slot.touch();
        Ok(addr)
    }

    // ----- object map -----------------------------------------------------

    /// Resolve a name registered in this heap, by any process.
    pub fn lookup(&self, h: HeapDesc, name: &str) -> Result<Option<HeapAddr>> {
        let mut inner = self.lock();
        let slot = inner.slot_mut(h)?;
        let eng = Engine::new(&mut slot.store)?;
        objmap::check_name(name)?;
        Ok(objmap::find_by_name(&eng, name.as_bytes())?
            .map(|entry| addr_from_off(&eng, HeapOffset(entry.addr))))
    }

    /// Requested size of the live object at `addr`.
    pub fn object_size(&self, h: HeapDesc, addr: HeapAddr) -> Result<u64> {
        let mut inner = self.lock();
        let slot = inner.slot_mut(h)?;
        let eng = Engine::new(&mut slot.store)?;
        Ok(live_entry(&eng, addr)?.size)
    }

    /// Attach a short descriptive string to the object at `addr`.
    pub fn set_info(&self, h: HeapDesc, addr: HeapAddr, info: &str) -> Result<()> {
        let mut inner = self.lock();
        let slot = inner.slot_mut(h)?;
        let mut eng = Engine::new(&mut slot.store)?;
        objmap::check_info(info)?;
        let mut entry = live_entry(&eng, addr)?;
        entry.info = info.as_bytes().to_vec();
        objmap::update(&mut eng, entry.addr, &entry)?;
        slot.touch();
        Ok(())
    }

    /// The descriptive string attached to the object at `addr`.
    pub fn info(&self, h: HeapDesc, addr: HeapAddr) -> Result<String> {
        let mut inner = self.lock();
        let slot = inner.slot_mut(h)?;
        let eng = Engine::new(&mut slot.store)?;
        let entry = live_entry(&eng, addr)?;
        Ok(String::from_utf8_lossy(&entry.info).into_owned())
    }

    /// Remove a name binding, leaving the object allocated but anonymous.
    pub fn unbind(&self, h: HeapDesc, name: &str) -> Result<()> {
        let mut inner = self.lock();
        let slot = inner.slot_mut(h)?;
        let mut eng = Engine::new(&mut slot.store)?;
        objmap::check_name(name)?;
        let mut entry = objmap::find_by_name(&eng, name.as_bytes())?
            .ok_or_else(|| Error::invalid(format!("no object named `{name}`")))?;
        entry.name.clear();
        objmap::update(&mut eng, entry.addr, &entry)?;
        slot.touch();
        Ok(())
    }

    /// Take the advisory per-object lock. Fails when another process
    /// holds it; re-locking by the holder is a no-op.
    pub fn lock_object(&self, h: HeapDesc, addr: HeapAddr) -> Result<()> {
        let mut inner = self.lock();
        let slot = inner.slot_mut(h)?;
        let mut eng = Engine::new(&mut slot.store)?;
        let mut entry = live_entry(&eng, addr)?;
        let me = own_pid();
        if entry.lock_pid != 0 && entry.lock_pid != me {
            return Err(Error::denied(format!(
                "object {addr} is locked by process {}",
                entry.lock_pid
            )));
        }
        entry.lock_pid = me;
        objmap::update(&mut eng, entry.addr, &entry)
    }

    /// Release the advisory per-object lock held by this process.
    pub fn unlock_object(&self, h: HeapDesc, addr: HeapAddr) -> Result<()> {
        let mut inner = self.lock();
        let slot = inner.slot_mut(h)?;
        let mut eng = Engine::new(&mut slot.store)?;
        let mut entry = live_entry(&eng, addr)?;
        let me = own_pid();
        if entry.lock_pid != 0 && entry.lock_pid != me {
            return Err(Error::denied(format!(
                "object {addr} is locked by process {}",
                entry.lock_pid
            )));
        }
        entry.lock_pid = 0;
        objmap::update(&mut eng, entry.addr, &entry)
    }

    // ----- data access ----------------------------------------------------

    /// Copy bytes out of an object, bounds-checked against its size.
    pub fn read(&self, h: HeapDesc, addr: HeapAddr, at: u64, buf: &mut [u8]) -> Result<()> {
        let mut inner = self.lock();
        let slot = inner.slot_mut(h)?;
        let eng = Engine::new(&mut slot.store)?;
        let entry = live_entry(&eng, addr)?;
        check_span(&entry, at, buf.len() as u64)?;
        buf.copy_from_slice(eng.payload(entry.addr + at, buf.len() as u64)?);
        Ok(())
    }

    /// Copy bytes into an object, bounds-checked against its size.
    pub fn write(&self, h: HeapDesc, addr: HeapAddr, at: u64, data: &[u8]) -> Result<()> {
        let mut inner = self.lock();
        let slot = inner.slot_mut(h)?;
        let mut eng = Engine::new(&mut slot.store)?;
        let entry = live_entry(&eng, addr)?;
        check_span(&entry, at, data.len() as u64)?;
        eng.payload_mut(entry.addr + at, data.len() as u64)?
            .copy_from_slice(data);
        slot.touch();
        Ok(())
    }

    /// Raw pointer to the object in this process's mapping. Valid until
    /// the object is freed or resized, or the heap detached; the heap
    /// does not track what the caller does with it.
    pub fn local_ptr(&self, h: HeapDesc, addr: HeapAddr) -> Result<*mut u8> {
        let mut inner = self.lock();
        let slot = inner.slot_mut(h)?;
        let eng = Engine::new(&mut slot.store)?;
        let entry = live_entry(&eng, addr)?;
        let local = layout::to_local(
            eng.base(),
            eng.geometry().payload_start,
            HeapOffset(entry.addr),
        );
        Ok(local as *mut u8)
    }

    // ----- maintenance ----------------------------------------------------

    /// Grow (`delta > 0`) or shrink (`delta < 0`) the committed payload,
    /// rounded to whole blocks. Returns the previous break.
    pub fn grow(&self, h: HeapDesc, delta: i64) -> Result<u64> {
        let mut inner = self.lock();
        let slot = inner.slot_mut(h)?;
        let old = Engine::new(&mut slot.store)?.grow_break(delta)?;
        slot.touch();
        Ok(old)
    }

    /// Flush the heap's committed bytes to its backing file.
    pub fn sync(&self, h: HeapDesc) -> Result<()> {
        let mut inner = self.lock();
        inner.slot_mut(h)?.store.sync()
    }

    /// Set the trailing-free-run length (in blocks) at which storage is
    /// returned to the backing file. Persisted in the heap header.
    pub fn set_shrink_threshold(&self, h: HeapDesc, blocks: u32) -> Result<()> {
        let mut inner = self.lock();
        let slot = inner.slot_mut(h)?;
        Engine::new(&mut slot.store)?.set_shrink_threshold(blocks);
        slot.touch();
        Ok(())
    }

    /// Watch an address: every traced operation that touches it calls
    /// [`policy::watch_hit`]. Requires the trace layer.
    pub fn set_watch(&self, h: HeapDesc, addr: Option<HeapAddr>) -> Result<()> {
        let mut inner = self.lock();
        let slot = inner.slot_mut(h)?;
        let HeapSlot { store, layers, .. } = slot;
        let eng = Engine::new(store)?;
        let off = match addr {
            Some(a) => Some(off_from_addr(&eng, a)?.get()),
            None => None,
        };
        if !policy::set_watch(layers, off) {
            return Err(Error::invalid(
                "watch requires the heap to be attached with tracing",
            ));
        }
        Ok(())
    }

    /// Usage summary for one heap.
    pub fn stats(&self, h: HeapDesc) -> Result<HeapStats> {
        let mut inner = self.lock();
        let slot = inner.slot_mut(h)?;
        let attach_count = slot.attach_count;
        let modified = slot.modified;
        let eng = Engine::new(&mut slot.store)?;
        let (objects, object_bytes) = objmap::census(&eng)?;
        let geo = eng.geometry();
        Ok(HeapStats {
            objects,
            object_bytes,
            committed_bytes: eng.brk(),
            reserved_bytes: geo.block_count << geo.block_log2,
            block_size: geo.block_size(),
            attach_count,
            modified,
        })
    }

    /// Full consistency walk over block metadata, fragment lists, and the
    /// object map.
    pub fn verify(&self, h: HeapDesc) -> Result<()> {
        let mut inner = self.lock();
        let slot = inner.slot_mut(h)?;
        let eng = Engine::new(&mut slot.store)?;
        eng.verify()?;
        objmap::verify(&eng)
    }
}

fn own_pid() -> u64 {
    rustix::process::getpid().as_raw_nonzero().get() as u64
}

fn addr_from_off(eng: &Engine<'_>, off: HeapOffset) -> HeapAddr {
    match eng.geometry().mode {
        AddressingMode::Global => HeapAddr(off.get()),
        AddressingMode::Local => HeapAddr(layout::to_local(
            eng.base(),
            eng.geometry().payload_start,
            off,
        )),
    }
}

fn off_from_addr(eng: &Engine<'_>, addr: HeapAddr) -> Result<HeapOffset> {
    match eng.geometry().mode {
        AddressingMode::Global => {
            if addr.0 >= eng.brk() {
                return Err(Error::invalid(format!(
                    "{addr} is outside the committed payload"
                )));
            }
            Ok(HeapOffset(addr.0))
        }
        AddressingMode::Local => layout::to_offset(
            eng.base(),
            eng.geometry().payload_start,
            eng.brk(),
            addr.0,
        ),
    }
}

fn live_entry(eng: &Engine<'_>, addr: HeapAddr) -> Result<ObjectEntry> {
    let off = off_from_addr(eng, addr)?;
    objmap::find_by_addr(eng, off.get())?
        .ok_or_else(|| Error::invalid(format!("{addr} is not a live object")))
}

fn check_unlocked(eng: &Engine<'_>, off: u64, op: &str) -> Result<()> {
    if let Some(entry) = objmap::find_by_addr(eng, off)? {
        let holder = entry.lock_pid;
        if holder != 0 && holder != own_pid() {
            return Err(Error::denied(format!(
                "cannot {op}: object at {off:#x} is locked by process {holder}"
            )));
        }
    }
    Ok(())
}

fn check_span(entry: &ObjectEntry, at: u64, len: u64) -> Result<()> {
    let end = at
        .checked_add(len)
        .ok_or_else(|| Error::invalid("object range overflows"))?;
    if end > entry.size {
        return Err(Error::invalid(format!(
            "range {at}+{len} exceeds the object's {} bytes",
            entry.size
        )));
    }
    Ok(())
}

/// Register an allocation in the object map, rolling the allocation back
/// if registration itself fails.
fn register(
    layers: &mut [Layer],
    eng: &mut Engine<'_>,
    off: HeapOffset,
    size: u64,
    name: &str,
    source: &'static Location<'static>,
) -> Result<()> {
    let entry = ObjectEntry {
        addr: off.get(),
        size,
        lock_pid: 0,
        name: name.as_bytes().to_vec(),
        info: Vec::new(),
    };
    if let Err(e) = objmap::insert(eng, entry) {
        let _ = policy::chain_free(layers, eng, off, source);
        return Err(e);
    }
    Ok(())
}
