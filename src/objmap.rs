//! The persistent object map: a name/address registry stored inside the
//! heap it describes.
//!
//! Every external allocation gets an entry; named entries additionally
//! support lookup, so an object created by one process can be found by
//! another (or by the same process after a restart) without exchanging
//! addresses. The map region is itself allocated from the heap with the
//! raw engine operations, so it never recurses into registration, and its
//! location is recorded in the header so it survives re-attachment and
//! relocation during growth.
//!
//! The alignment table lives beside it: aligned allocations over-allocate
//! and hand out an address inside the padded region, and the table maps
//! that caller-visible address back to the allocation base so `free` and
//! `resize` can find the real object.

use crate::engine::Engine;
use crate::error::{Error, Result};
use crate::header::field;

pub(crate) const ENTRY_SIZE: u64 = 160;
pub(crate) const NAME_MAX: usize = 63;
pub(crate) const INFO_MAX: usize = 63;

const INITIAL_CAP: u64 = 64;
const GROW_QUANTUM: u64 = 64;

const ALIGN_ENTRY_SIZE: u64 = 24;
const ALIGN_INITIAL_CAP: u64 = 16;
const ALIGN_GROW_QUANTUM: u64 = 16;

const NIL: u64 = u64::MAX;

/// One live registration. `addr` is always a heap-relative offset,
/// whatever addressing mode the heap hands out.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct ObjectEntry {
    pub addr: u64,
    pub size: u64,
    /// Process id holding the advisory lock, or 0.
    pub lock_pid: u64,
    /// Empty for anonymous allocations.
    pub name: Vec<u8>,
    pub info: Vec<u8>,
}

impl ObjectEntry {
    pub fn anonymous(addr: u64, size: u64) -> Self {
        Self {
            addr,
            size,
            lock_pid: 0,
            name: Vec::new(),
            info: Vec::new(),
        }
    }

    fn encode(&self) -> [u8; ENTRY_SIZE as usize] {
        let mut e = [0u8; ENTRY_SIZE as usize];
        e[0..8].copy_from_slice(&self.addr.to_le_bytes());
        e[8..16].copy_from_slice(&self.size.to_le_bytes());
        e[16..24].copy_from_slice(&self.lock_pid.to_le_bytes());
        e[24] = self.name.len() as u8;
        e[25..25 + self.name.len()].copy_from_slice(&self.name);
        e[88] = self.info.len() as u8;
        e[89..89 + self.info.len()].copy_from_slice(&self.info);
        e
    }

    fn decode(e: &[u8]) -> Self {
        let name_len = (e[24] as usize).min(NAME_MAX);
        let info_len = (e[88] as usize).min(INFO_MAX);
        Self {
            addr: u64::from_le_bytes(e[0..8].try_into().unwrap()),
            size: u64::from_le_bytes(e[8..16].try_into().unwrap()),
            lock_pid: u64::from_le_bytes(e[16..24].try_into().unwrap()),
            name: e[25..25 + name_len].to_vec(),
            info: e[89..89 + info_len].to_vec(),
        }
    }
}

pub(crate) fn check_name(name: &str) -> Result<()> {
    if name.len() > NAME_MAX {
        return Err(Error::invalid(format!(
            "object name longer than {NAME_MAX} bytes"
        )));
    }
    Ok(())
}

pub(crate) fn check_info(info: &str) -> Result<()> {
    if info.len() > INFO_MAX {
        return Err(Error::invalid(format!(
            "object info longer than {INFO_MAX} bytes"
        )));
    }
    Ok(())
}

/// Allocate and zero the initial map region of a fresh heap.
pub(crate) fn bootstrap(eng: &mut Engine<'_>) -> Result<()> {
    let off = eng.alloc_raw(INITIAL_CAP * ENTRY_SIZE)?;
    clear_slots(eng, off.get(), 0, INITIAL_CAP)?;
    eng.set_header_u64(field::OBJMAP_OFF, off.get());
    eng.set_header_u64(field::OBJMAP_CAP, INITIAL_CAP);
    Ok(())
}

fn region(eng: &Engine<'_>) -> (u64, u64) {
    (
        eng.header_u64(field::OBJMAP_OFF),
        eng.header_u64(field::OBJMAP_CAP),
    )
}

fn clear_slots(eng: &mut Engine<'_>, base: u64, from: u64, to: u64) -> Result<()> {
    for slot in from..to {
        let bytes = eng.payload_mut(base + slot * ENTRY_SIZE, ENTRY_SIZE)?;
        bytes.fill(0);
        bytes[0..8].copy_from_slice(&NIL.to_le_bytes());
    }
    Ok(())
}

fn read_slot(eng: &Engine<'_>, base: u64, slot: u64) -> Result<ObjectEntry> {
    Ok(ObjectEntry::decode(
        eng.payload(base + slot * ENTRY_SIZE, ENTRY_SIZE)?,
    ))
}

fn write_slot(eng: &mut Engine<'_>, base: u64, slot: u64, entry: &ObjectEntry) -> Result<()> {
    eng.payload_mut(base + slot * ENTRY_SIZE, ENTRY_SIZE)?
        .copy_from_slice(&entry.encode());
    Ok(())
}

fn slot_addr(eng: &Engine<'_>, base: u64, slot: u64) -> Result<u64> {
    let bytes = eng.payload(base + slot * ENTRY_SIZE, 8)?;
    Ok(u64::from_le_bytes(bytes.try_into().unwrap()))
}

/// Register an allocation. A non-empty name must be unique across the
/// heap; anonymous entries never conflict.
pub(crate) fn insert(eng: &mut Engine<'_>, entry: ObjectEntry) -> Result<()> {
    debug_assert_ne!(entry.addr, NIL);
    if !entry.name.is_empty() && find_by_name(eng, &entry.name)?.is_some() {
        return Err(Error::NameConflict(
            String::from_utf8_lossy(&entry.name).into_owned(),
        ));
    }

    let (base, cap) = region(eng);
    for slot in 0..cap {
        if slot_addr(eng, base, slot)? == NIL {
            return write_slot(eng, base, slot, &entry);
        }
    }

    // Full: grow the region by one quantum, relocating it if needed.
    let new_cap = cap + GROW_QUANTUM;
    let new_base = eng.resize_raw(crate::layout::HeapOffset(base), new_cap * ENTRY_SIZE)?;
    clear_slots(eng, new_base.get(), cap, new_cap)?;
    eng.set_header_u64(field::OBJMAP_OFF, new_base.get());
    eng.set_header_u64(field::OBJMAP_CAP, new_cap);
    write_slot(eng, new_base.get(), cap, &entry)
}

/// Remove and return the entry registered at `addr`.
pub(crate) fn remove(eng: &mut Engine<'_>, addr: u64) -> Result<ObjectEntry> {
    let (base, cap) = region(eng);
    for slot in 0..cap {
        if slot_addr(eng, base, slot)? == addr {
            let entry = read_slot(eng, base, slot)?;
            clear_slots(eng, base, slot, slot + 1)?;
            return Ok(entry);
        }
    }
    Err(Error::invalid(format!(
        "address {addr:#x} is not a registered object"
    )))
}

pub(crate) fn find_by_addr(eng: &Engine<'_>, addr: u64) -> Result<Option<ObjectEntry>> {
    let (base, cap) = region(eng);
    for slot in 0..cap {
        if slot_addr(eng, base, slot)? == addr {
            return Ok(Some(read_slot(eng, base, slot)?));
        }
    }
    Ok(None)
}

pub(crate) fn find_by_name(eng: &Engine<'_>, name: &[u8]) -> Result<Option<ObjectEntry>> {
    debug_assert!(!name.is_empty());
    let (base, cap) = region(eng);
    for slot in 0..cap {
        if slot_addr(eng, base, slot)? != NIL {
            let entry = read_slot(eng, base, slot)?;
            if entry.name == name {
                return Ok(Some(entry));
            }
        }
    }
    Ok(None)
}

/// Rewrite the entry currently registered at `addr`.
pub(crate) fn update(eng: &mut Engine<'_>, addr: u64, entry: &ObjectEntry) -> Result<()> {
    let (base, cap) = region(eng);
    for slot in 0..cap {
        if slot_addr(eng, base, slot)? == addr {
            return write_slot(eng, base, slot, entry);
        }
    }
    Err(Error::invalid(format!(
        "address {addr:#x} is not a registered object"
    )))
}

/// Live-entry census for heap statistics: (object count, payload bytes).
pub(crate) fn census(eng: &Engine<'_>) -> Result<(u64, u64)> {
    let (base, cap) = region(eng);
    let mut count = 0;
    let mut bytes = 0;
    for slot in 0..cap {
        if slot_addr(eng, base, slot)? != NIL {
            let entry = read_slot(eng, base, slot)?;
            count += 1;
            bytes += entry.size;
        }
    }
    Ok((count, bytes))
}

/// Check that no two live entries share an address or a non-empty name.
pub(crate) fn verify(eng: &Engine<'_>) -> Result<()> {
    let (base, cap) = region(eng);
    let mut seen: Vec<(u64, Vec<u8>)> = Vec::new();
    for slot in 0..cap {
        if slot_addr(eng, base, slot)? == NIL {
            continue;
        }
        let entry = read_slot(eng, base, slot)?;
        for (addr, name) in &seen {
            if *addr == entry.addr {
                return Err(Error::invalid(format!(
                    "object map registers {:#x} twice",
                    entry.addr
                )));
            }
            if !entry.name.is_empty() && *name == entry.name {
                return Err(Error::invalid(format!(
                    "object map registers name {:?} twice",
                    String::from_utf8_lossy(&entry.name)
                )));
            }
        }
        seen.push((entry.addr, entry.name));
    }
    Ok(())
}

// ----- alignment table ------------------------------------------------------

fn align_region(eng: &Engine<'_>) -> (u64, u64) {
    (
        eng.header_u64(field::ALIGN_OFF),
        eng.header_u64(field::ALIGN_CAP),
    )
}

fn clear_align_slots(eng: &mut Engine<'_>, base: u64, from: u64, to: u64) -> Result<()> {
    for slot in from..to {
        let bytes = eng.payload_mut(base + slot * ALIGN_ENTRY_SIZE, ALIGN_ENTRY_SIZE)?;
        bytes.fill(0);
        bytes[0..8].copy_from_slice(&NIL.to_le_bytes());
    }
    Ok(())
}

/// Record that the caller-visible address `caller` lives inside the
/// allocation based at `base` with the given alignment. The table is
/// created lazily on the first aligned allocation.
pub(crate) fn align_insert(eng: &mut Engine<'_>, caller: u64, base: u64, align: u64) -> Result<()> {
    let (mut region_base, mut cap) = align_region(eng);
    if region_base == NIL {
        let off = eng.alloc_raw(ALIGN_INITIAL_CAP * ALIGN_ENTRY_SIZE)?;
        clear_align_slots(eng, off.get(), 0, ALIGN_INITIAL_CAP)?;
        eng.set_header_u64(field::ALIGN_OFF, off.get());
        eng.set_header_u64(field::ALIGN_CAP, ALIGN_INITIAL_CAP);
        region_base = off.get();
        cap = ALIGN_INITIAL_CAP;
    }

    let slot = {
        let mut free = None;
        for slot in 0..cap {
            let bytes = eng.payload(region_base + slot * ALIGN_ENTRY_SIZE, 8)?;
            if u64::from_le_bytes(bytes.try_into().unwrap()) == NIL {
                free = Some(slot);
                break;
            }
        }
        match free {
            Some(slot) => slot,
            None => {
                let new_cap = cap + ALIGN_GROW_QUANTUM;
                let new_base = eng.resize_raw(
                    crate::layout::HeapOffset(region_base),
                    new_cap * ALIGN_ENTRY_SIZE,
                )?;
                clear_align_slots(eng, new_base.get(), cap, new_cap)?;
                eng.set_header_u64(field::ALIGN_OFF, new_base.get());
                eng.set_header_u64(field::ALIGN_CAP, new_cap);
                region_base = new_base.get();
                cap
            }
        }
    };

    let bytes = eng.payload_mut(region_base + slot * ALIGN_ENTRY_SIZE, ALIGN_ENTRY_SIZE)?;
    bytes[0..8].copy_from_slice(&caller.to_le_bytes());
    bytes[8..16].copy_from_slice(&base.to_le_bytes());
    bytes[16..24].copy_from_slice(&align.to_le_bytes());
    Ok(())
}

/// Look up an alignment record by caller-visible address.
pub(crate) fn align_find(eng: &Engine<'_>, caller: u64) -> Result<Option<(u64, u64)>> {
    let (base, cap) = align_region(eng);
    if base == NIL {
        return Ok(None);
    }
    for slot in 0..cap {
        let bytes = eng.payload(base + slot * ALIGN_ENTRY_SIZE, ALIGN_ENTRY_SIZE)?;
        if u64::from_le_bytes(bytes[0..8].try_into().unwrap()) == caller {
            return Ok(Some((
                u64::from_le_bytes(bytes[8..16].try_into().unwrap()),
                u64::from_le_bytes(bytes[16..24].try_into().unwrap()),
            )));
        }
    }
    Ok(None)
}

/// Drop an alignment record, returning the allocation base it mapped to.
pub(crate) fn align_remove(eng: &mut Engine<'_>, caller: u64) -> Result<Option<u64>> {
    let (base, cap) = align_region(eng);
    if base == NIL {
        return Ok(None);
    }
    for slot in 0..cap {
        let bytes = eng.payload(base + slot * ALIGN_ENTRY_SIZE, 16)?;
        if u64::from_le_bytes(bytes[0..8].try_into().unwrap()) == caller {
            let alloc_base = u64::from_le_bytes(bytes[8..16].try_into().unwrap());
            clear_align_slots(eng, base, slot, slot + 1)?;
            return Ok(Some(alloc_base));
        }
    }
    Ok(None)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::HeapConfig;
    use crate::store::BackingStore;
    use std::fs;
    use std::path::PathBuf;
    use std::sync::atomic::{AtomicU32, Ordering};

    static COUNTER: AtomicU32 = AtomicU32::new(0);

    fn temp_path(name: &str) -> PathBuf {
        std::env::temp_dir().join(format!(
            "stratum-objmap-{}-{}-{}",
            name,
            std::process::id(),
            COUNTER.fetch_add(1, Ordering::Relaxed)
        ))
    }

    struct Fixture {
        store: BackingStore,
        path: PathBuf,
    }

    impl Fixture {
        fn new(name: &str) -> Self {
            let path = temp_path(name);
            let cfg = HeapConfig {
                block_count: 512,
                ..Default::default()
            };
            let mut store = BackingStore::create(&path, &cfg).unwrap();
            bootstrap(&mut Engine::new(&mut store).unwrap()).unwrap();
            Self { store, path }
        }

        fn engine(&mut self) -> Engine<'_> {
            Engine::new(&mut self.store).unwrap()
        }
    }

    impl Drop for Fixture {
        fn drop(&mut self) {
            let _ = fs::remove_file(&self.path);
        }
    }

    fn named(addr: u64, size: u64, name: &str) -> ObjectEntry {
        ObjectEntry {
            addr,
            size,
            lock_pid: 0,
            name: name.as_bytes().to_vec(),
            info: Vec::new(),
        }
    }

    #[test]
    fn test_insert_find_remove() {
        let mut fx = Fixture::new("basic");
        let mut eng = fx.engine();

        insert(&mut eng, named(0x4000, 100, "config")).unwrap();
        insert(&mut eng, ObjectEntry::anonymous(0x8000, 32)).unwrap();

        let found = find_by_name(&eng, b"config").unwrap().unwrap();
        assert_eq!(found.addr, 0x4000);
        assert_eq!(found.size, 100);

        let anon = find_by_addr(&eng, 0x8000).unwrap().unwrap();
        assert!(anon.name.is_empty());

        let removed = remove(&mut eng, 0x4000).unwrap();
        assert_eq!(removed.name, b"config");
        assert!(find_by_name(&eng, b"config").unwrap().is_none());
        verify(&eng).unwrap();
    }

    #[test]
    fn test_duplicate_name_rejected() {
        let mut fx = Fixture::new("dup");
        let mut eng = fx.engine();

        insert(&mut eng, named(0x1000, 8, "shared")).unwrap();
        assert!(matches!(
            insert(&mut eng, named(0x2000, 8, "shared")),
            Err(Error::NameConflict(name)) if name == "shared"
        ));
        // The winner keeps its registration.
        assert_eq!(
            find_by_name(&eng, b"shared").unwrap().unwrap().addr,
            0x1000
        );
    }

    #[test]
    fn test_anonymous_entries_never_conflict() {
        let mut fx = Fixture::new("anon");
        let mut eng = fx.engine();
        insert(&mut eng, ObjectEntry::anonymous(0x1000, 8)).unwrap();
        insert(&mut eng, ObjectEntry::anonymous(0x2000, 8)).unwrap();
        verify(&eng).unwrap();
    }

    #[test]
    fn test_map_grows_past_initial_capacity() {
        let mut fx = Fixture::new("grow");
        let mut eng = fx.engine();

        for i in 0..(INITIAL_CAP + 10) {
            insert(
                &mut eng,
                named(0x10000 + i * 64, 64, &format!("obj-{i}")),
            )
            .unwrap();
        }

        // Entries registered before the growth survive the relocation.
        assert_eq!(find_by_name(&eng, b"obj-0").unwrap().unwrap().addr, 0x10000);
        let last = format!("obj-{}", INITIAL_CAP + 9);
        assert!(find_by_name(&eng, last.as_bytes()).unwrap().is_some());
        assert!(eng.header_u64(field::OBJMAP_CAP) > INITIAL_CAP);
        verify(&eng).unwrap();
        eng.verify().unwrap();
    }

    #[test]
    fn test_update_rewrites_in_place() {
        let mut fx = Fixture::new("update");
        let mut eng = fx.engine();

        insert(&mut eng, named(0x3000, 16, "row")).unwrap();
        let mut entry = find_by_addr(&eng, 0x3000).unwrap().unwrap();
        entry.info = b"v2".to_vec();
        entry.lock_pid = 42;
        update(&mut eng, 0x3000, &entry).unwrap();

        let back = find_by_addr(&eng, 0x3000).unwrap().unwrap();
        assert_eq!(back.info, b"v2");
        assert_eq!(back.lock_pid, 42);
    }

    #[test]
    fn test_census_counts_live_entries() {
        let mut fx = Fixture::new("census");
        let mut eng = fx.engine();

        insert(&mut eng, named(0x1000, 100, "a")).unwrap();
        insert(&mut eng, named(0x2000, 200, "b")).unwrap();
        insert(&mut eng, ObjectEntry::anonymous(0x3000, 50)).unwrap();
        remove(&mut eng, 0x2000).unwrap();

        assert_eq!(census(&eng).unwrap(), (2, 150));
    }

    #[test]
    fn test_align_records_round_trip() {
        let mut fx = Fixture::new("align");
        let mut eng = fx.engine();

        align_insert(&mut eng, 0x5040, 0x5000, 64).unwrap();
        assert_eq!(align_find(&eng, 0x5040).unwrap(), Some((0x5000, 64)));
        assert_eq!(align_find(&eng, 0x5000).unwrap(), None);

        assert_eq!(align_remove(&mut eng, 0x5040).unwrap(), Some(0x5000));
        assert_eq!(align_find(&eng, 0x5040).unwrap(), None);
    }

    #[test]
    fn test_name_length_limits() {
        assert!(check_name(&"x".repeat(NAME_MAX)).is_ok());
        assert!(check_name(&"x".repeat(NAME_MAX + 1)).is_err());
        assert!(check_info(&"y".repeat(INFO_MAX + 1)).is_err());
    }
}
