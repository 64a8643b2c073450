//! Memory-mapped backing store for a heap.
//!
//! The whole reserved segment is mapped once per attach, so the local base
//! never moves while a process stays attached: growing or shrinking the
//! heap only changes the file length underneath the mapping. Pages beyond
//! the current file length are part of the mapping but must not be touched
//! until a `commit` extends the file over them.

use crate::config::HeapConfig;
use crate::error::{Error, Result};
use crate::header;
use rustix::fd::OwnedFd;
use rustix::fs::{Mode, OFlags};
use rustix::mm::{MapFlags, MsyncFlags, ProtFlags};
use std::path::{Path, PathBuf};
use std::ptr::NonNull;

/// A heap's backing file, mapped shared into this process.
pub(crate) struct BackingStore {
    fd: OwnedFd,
    base: NonNull<u8>,
    /// Length of the mapping: the full reserved segment span.
    map_len: usize,
    /// Committed file length; bytes past this are unbacked.
    file_len: u64,
    path: PathBuf,
}

impl BackingStore {
    /// Create a new backing store and write a fresh header into it.
    ///
    /// Fails if the file already exists; attach-time races between
    /// creating processes resolve to one winner.
    pub fn create(path: &Path, cfg: &HeapConfig) -> Result<Self> {
        cfg.validate()?;

        let fd = rustix::fs::open(
            path,
            OFlags::RDWR | OFlags::CREATE | OFlags::EXCL,
            Mode::from_raw_mode(0o644),
        )?;

        let payload_start = header::payload_start_for(cfg);
        let span = header::segment_span_for(cfg);

        // Commit the header + block table region. The payload is grown
        // on demand.
        rustix::fs::ftruncate(&fd, payload_start)?;

        let base = map_shared(&fd, span as usize)?;
        let mut store = Self {
            fd,
            base,
            map_len: span as usize,
            file_len: payload_start,
            path: path.to_path_buf(),
        };
        header::init(store.bytes_mut(), cfg);
        Ok(store)
    }

    /// Open and map an existing backing store, validating its header.
    pub fn open(path: &Path) -> Result<Self> {
        let fd = rustix::fs::open(path, OFlags::RDWR, Mode::empty())?;

        let stat = rustix::fs::fstat(&fd)?;
        let file_len = stat.st_size as u64;
        if file_len < header::HEADER_SIZE {
            return Err(Error::invalid(format!(
                "{} is too small to hold a heap header",
                path.display()
            )));
        }

        // Peek at the header before committing to the full-span mapping.
        let prefix = map_shared(&fd, header::HEADER_SIZE as usize)?;
        let mut head = [0u8; header::HEADER_SIZE as usize];
        // SAFETY: prefix maps at least HEADER_SIZE readable bytes.
        unsafe {
            std::ptr::copy_nonoverlapping(prefix.as_ptr(), head.as_mut_ptr(), head.len());
            rustix::mm::munmap(prefix.as_ptr().cast(), header::HEADER_SIZE as usize)?;
        }
        let geo = header::validate(&head)?;

        if file_len < geo.payload_start || file_len > geo.segment_span {
            return Err(Error::invalid(format!(
                "{} has an implausible length for its declared geometry",
                path.display()
            )));
        }

        let base = map_shared(&fd, geo.segment_span as usize)?;
        Ok(Self {
            fd,
            base,
            map_len: geo.segment_span as usize,
            file_len,
            path: path.to_path_buf(),
        })
    }

    /// The full mapped span. Bytes past [`Self::file_len`] are unbacked
    /// and must not be read or written.
    #[inline]
    pub fn bytes(&self) -> &[u8] {
        // SAFETY: base maps map_len bytes for the life of self; &self
        // prevents a concurrent &mut [u8] from this handle.
        unsafe { std::slice::from_raw_parts(self.base.as_ptr(), self.map_len) }
    }

    /// Mutable view of the full mapped span.
    #[inline]
    pub fn bytes_mut(&mut self) -> &mut [u8] {
        // SAFETY: as above; &mut self guarantees exclusivity within this
        // process handle.
        unsafe { std::slice::from_raw_parts_mut(self.base.as_ptr(), self.map_len) }
    }

    /// This process's base address for the mapping.
    #[inline]
    pub fn base(&self) -> usize {
        self.base.as_ptr() as usize
    }

    /// Committed file length in bytes.
    #[inline]
    pub fn file_len(&self) -> u64 {
        self.file_len
    }

    #[inline]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Grow or shrink the committed file length. The mapping is untouched;
    /// newly committed pages read as zero.
    pub fn commit(&mut self, new_len: u64) -> Result<()> {
        if new_len as usize > self.map_len {
            return Err(Error::OutOfMemory {
                requested: new_len - self.map_len as u64,
            });
        }
        rustix::fs::ftruncate(&self.fd, new_len)?;
        self.file_len = new_len;
        Ok(())
    }

    /// Flush committed bytes to the backing file.
    pub fn sync(&self) -> Result<()> {
        // SAFETY: the range [base, file_len) is mapped and backed.
        unsafe {
            rustix::mm::msync(
                self.base.as_ptr().cast(),
                self.file_len as usize,
                MsyncFlags::SYNC,
            )?;
        }
        Ok(())
    }
}

impl Drop for BackingStore {
    fn drop(&mut self) {
        let _ = self.sync();
        // SAFETY: base/map_len describe the mapping created at attach.
        unsafe {
            let _ = rustix::mm::munmap(self.base.as_ptr().cast(), self.map_len);
        }
        // fd closes when OwnedFd drops.
    }
}

// SAFETY: the mapping is plain shared memory; the fd is kernel
// reference-counted and all mutation goes through &mut self.
unsafe impl Send for BackingStore {}
unsafe impl Sync for BackingStore {}

fn map_shared(fd: &OwnedFd, len: usize) -> Result<NonNull<u8>> {
    // SAFETY: mapping a file descriptor we own; len > 0.
    let ptr = unsafe {
        rustix::mm::mmap(
            std::ptr::null_mut(),
            len,
            ProtFlags::READ | ProtFlags::WRITE,
            MapFlags::SHARED,
            fd,
            0,
        )?
    };
    NonNull::new(ptr.cast::<u8>()).ok_or_else(|| Error::invalid("mmap returned null"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use std::path::PathBuf;
    use std::sync::atomic::{AtomicU32, Ordering};

    static COUNTER: AtomicU32 = AtomicU32::new(0);

    fn temp_path(name: &str) -> PathBuf {
        std::env::temp_dir().join(format!(
            "stratum-store-{}-{}-{}",
            name,
            std::process::id(),
            COUNTER.fetch_add(1, Ordering::Relaxed)
        ))
    }

    fn small_cfg() -> HeapConfig {
        HeapConfig {
            block_count: 64,
            ..Default::default()
        }
    }

    #[test]
    fn test_create_and_reopen() {
        let path = temp_path("create");
        let cfg = small_cfg();

        {
            let store = BackingStore::create(&path, &cfg).unwrap();
            assert_eq!(store.file_len(), header::payload_start_for(&cfg));
            header::validate(store.bytes()).unwrap();
        }

        {
            let store = BackingStore::open(&path).unwrap();
            let geo = header::validate(store.bytes()).unwrap();
            assert_eq!(geo.block_count, cfg.block_count);
        }

        fs::remove_file(&path).unwrap();
    }

    #[test]
    fn test_create_refuses_existing_file() {
        let path = temp_path("exists");
        let cfg = small_cfg();
        let _store = BackingStore::create(&path, &cfg).unwrap();
        assert!(BackingStore::create(&path, &cfg).is_err());
        fs::remove_file(&path).unwrap();
    }

    #[test]
    fn test_open_refuses_corrupted_magic() {
        let path = temp_path("magic");
        let cfg = small_cfg();
        drop(BackingStore::create(&path, &cfg).unwrap());

        // Stomp the first magic byte directly in the file.
        let mut raw = fs::read(&path).unwrap();
        raw[0] ^= 0xFF;
        fs::write(&path, &raw).unwrap();

        assert!(matches!(
            BackingStore::open(&path),
            Err(Error::FormatMismatch { .. })
        ));
        fs::remove_file(&path).unwrap();
    }

    #[test]
    fn test_open_refuses_truncated_file() {
        let path = temp_path("short");
        fs::write(&path, b"not a heap").unwrap();
        assert!(BackingStore::open(&path).is_err());
        fs::remove_file(&path).unwrap();
    }

    #[test]
    fn test_commit_extends_and_contracts() {
        let path = temp_path("commit");
        let cfg = small_cfg();
        let mut store = BackingStore::create(&path, &cfg).unwrap();
        let payload_start = header::payload_start_for(&cfg);

        store.commit(payload_start + 2 * cfg.block_size()).unwrap();
        assert_eq!(store.file_len(), payload_start + 2 * cfg.block_size());

        // Newly committed pages read as zero and accept writes.
        let start = payload_start as usize;
        assert!(store.bytes()[start..start + 64].iter().all(|&b| b == 0));
        store.bytes_mut()[start] = 0xAB;
        assert_eq!(store.bytes()[start], 0xAB);

        store.commit(payload_start).unwrap();
        assert_eq!(store.file_len(), payload_start);

        drop(store);
        fs::remove_file(&path).unwrap();
    }

    #[test]
    fn test_commit_rejects_beyond_reserved_span() {
        let path = temp_path("span");
        let cfg = small_cfg();
        let mut store = BackingStore::create(&path, &cfg).unwrap();
        let span = header::segment_span_for(&cfg);
        assert!(matches!(
            store.commit(span + 1),
            Err(Error::OutOfMemory { .. })
        ));
        drop(store);
        fs::remove_file(&path).unwrap();
    }

    #[test]
    fn test_payload_persists_across_attachments() {
        let path = temp_path("persist");
        let cfg = small_cfg();
        let payload_start = header::payload_start_for(&cfg) as usize;

        {
            let mut store = BackingStore::create(&path, &cfg).unwrap();
            store
                .commit(header::payload_start_for(&cfg) + cfg.block_size())
                .unwrap();
            store.bytes_mut()[payload_start..payload_start + 5].copy_from_slice(b"hello");
            store.sync().unwrap();
        }

        {
            let store = BackingStore::open(&path).unwrap();
            assert_eq!(&store.bytes()[payload_start..payload_start + 5], b"hello");
        }

        fs::remove_file(&path).unwrap();
    }
}
