//! The block/fragment allocation engine.
//!
//! All state the engine mutates lives inside the mapped backing store:
//! the header scalars (break, free-list head, rolling cursor, fragment
//! list heads), the block-metadata table, and the fragment links threaded
//! through free payload bytes. A process therefore sees exactly the state
//! its peers left behind, and every structure is index- or offset-based
//! so it survives attachment at a different base.
//!
//! Policy summary:
//! - requests up to half a block are served from power-of-two fragment
//!   classes, one block carved at a time;
//! - larger requests take whole block runs, found by next-fit search from
//!   a rolling cursor over an address-ordered free-run list;
//! - adjacent free runs are always coalesced, using boundary tags to find
//!   the preceding run in O(1);
//! - a trailing free run at or above the shrink threshold is returned to
//!   the backing file, and failure to do so is not an error.

use crate::block::BlockState;
use crate::error::{CorruptionKind, Error, Result};
use crate::frag::{self, FragNode};
use crate::header::{self, field, Geometry};
use crate::layout::{self, HeapOffset};
use crate::store::BackingStore;

const NIL32: u32 = u32::MAX;
const NIL64: u64 = u64::MAX;

/// One operation's view of a heap: the store plus its decoded geometry.
pub(crate) struct Engine<'a> {
    store: &'a mut BackingStore,
    geo: Geometry,
}

impl<'a> Engine<'a> {
    pub fn new(store: &'a mut BackingStore) -> Result<Self> {
        let geo = header::validate(store.bytes())?;
        Ok(Self { store, geo })
    }

    #[inline]
    pub fn geometry(&self) -> &Geometry {
        &self.geo
    }

    /// This process's base address for the underlying mapping.
    #[inline]
    pub fn base(&self) -> usize {
        self.store.base()
    }

    // ----- header scalar access -------------------------------------------

    #[inline]
    pub fn brk(&self) -> u64 {
        header::get_u64(self.store.bytes(), field::BRK)
    }

    fn set_brk(&mut self, v: u64) {
        header::put_u64(self.store.bytes_mut(), field::BRK, v);
    }

    /// Number of committed payload blocks.
    #[inline]
    pub fn committed(&self) -> u32 {
        (self.brk() >> self.geo.block_log2) as u32
    }

    fn free_head(&self) -> u32 {
        header::get_u32(self.store.bytes(), field::FREE_HEAD)
    }

    fn set_free_head(&mut self, v: u32) {
        header::put_u32(self.store.bytes_mut(), field::FREE_HEAD, v);
    }

    fn rover(&self) -> u32 {
        header::get_u32(self.store.bytes(), field::ROVER)
    }

    fn set_rover(&mut self, v: u32) {
        header::put_u32(self.store.bytes_mut(), field::ROVER, v);
    }

    pub fn shrink_threshold(&self) -> u32 {
        header::get_u32(self.store.bytes(), field::SHRINK_THRESHOLD)
    }

    pub fn set_shrink_threshold(&mut self, blocks: u32) {
        header::put_u32(self.store.bytes_mut(), field::SHRINK_THRESHOLD, blocks);
    }

    pub fn header_u64(&self, at: usize) -> u64 {
        header::get_u64(self.store.bytes(), at)
    }

    pub fn set_header_u64(&mut self, at: usize, v: u64) {
        header::put_u64(self.store.bytes_mut(), at, v);
    }

    fn frag_head(&self, class: u8) -> u64 {
        header::frag_head(self.store.bytes(), class)
    }

    fn set_frag_head(&mut self, class: u8, off: u64) {
        header::set_frag_head(self.store.bytes_mut(), class, off);
    }

    // ----- block table access ---------------------------------------------

    pub fn entry(&self, index: u32) -> Result<BlockState> {
        let at = self.geo.entry_off(index);
        BlockState::decode(&self.store.bytes()[at..at + 16], index)
    }

    fn set_entry(&mut self, index: u32, state: BlockState) {
        let at = self.geo.entry_off(index);
        self.store.bytes_mut()[at..at + 16].copy_from_slice(&state.encode());
    }

    fn free_links(&self, index: u32) -> Result<(u32, u32, u32)> {
        match self.entry(index)? {
            BlockState::Free { run, prev, next } => Ok((run, prev, next)),
            _ => Err(Error::Corruption {
                kind: CorruptionKind::Metadata,
                offset: index as u64,
            }),
        }
    }

    // ----- payload access -------------------------------------------------

    pub fn payload(&self, off: u64, len: u64) -> Result<&[u8]> {
        self.check_payload(off, len)?;
        Ok(&self.store.bytes()[self.geo.payload_range(off, len)])
    }

    pub fn payload_mut(&mut self, off: u64, len: u64) -> Result<&mut [u8]> {
        self.check_payload(off, len)?;
        let range = self.geo.payload_range(off, len);
        Ok(&mut self.store.bytes_mut()[range])
    }

    pub fn fill(&mut self, off: u64, len: u64, byte: u8) -> Result<()> {
        self.payload_mut(off, len)?.fill(byte);
        Ok(())
    }

    pub fn copy(&mut self, src: u64, dst: u64, len: u64) -> Result<()> {
        self.check_payload(src, len)?;
        self.check_payload(dst, len)?;
        let src_range = self.geo.payload_range(src, len);
        let dst_start = self.geo.payload_range(dst, 0).start;
        self.store.bytes_mut().copy_within(src_range, dst_start);
        Ok(())
    }

    fn check_payload(&self, off: u64, len: u64) -> Result<()> {
        let end = off
            .checked_add(len)
            .ok_or_else(|| Error::invalid("payload range overflows"))?;
        if end > self.brk() {
            return Err(Error::invalid(format!(
                "payload range {off:#x}+{len:#x} is beyond the committed break"
            )));
        }
        Ok(())
    }

    fn frag_node(&self, off: u64) -> Result<FragNode> {
        Ok(FragNode::decode(self.payload(off, frag::NODE_SIZE)?))
    }

    fn set_frag_node(&mut self, off: u64, node: FragNode) -> Result<()> {
        self.payload_mut(off, frag::NODE_SIZE)?
            .copy_from_slice(&node.encode());
        Ok(())
    }

    // ----- free-run list --------------------------------------------------

    /// Write a complete free run (head, bodies, tail) and splice it into
    /// the address-ordered free list. The caller has already coalesced.
    fn install_free_run(&mut self, index: u32, run: u32) -> Result<()> {
        debug_assert!(run >= 1);
        for body in index + 1..index + run {
            self.set_entry(body, BlockState::FreeBody);
        }
        if run > 1 {
            self.set_entry(
                index + run - 1,
                BlockState::Free {
                    run,
                    prev: NIL32,
                    next: NIL32,
                },
            );
        }

        // Address-ordered insert.
        let mut prev = NIL32;
        let mut cur = self.free_head();
        while cur != NIL32 && cur < index {
            prev = cur;
            cur = self.free_links(cur)?.2;
        }
        self.set_entry(index, BlockState::Free { run, prev, next: cur });
        if prev == NIL32 {
            self.set_free_head(index);
        } else {
            let (p_run, p_prev, _) = self.free_links(prev)?;
            self.set_entry(
                prev,
                BlockState::Free {
                    run: p_run,
                    prev: p_prev,
                    next: index,
                },
            );
        }
        if cur != NIL32 {
            let (n_run, _, n_next) = self.free_links(cur)?;
            self.set_entry(
                cur,
                BlockState::Free {
                    run: n_run,
                    prev: index,
                    next: n_next,
                },
            );
        }
        Ok(())
    }

    /// Remove a run's head from the free list. Entries are left for the
    /// caller to overwrite.
    fn unlink_free_run(&mut self, index: u32) -> Result<()> {
        let (_, prev, next) = self.free_links(index)?;
        if prev == NIL32 {
            self.set_free_head(next);
        } else {
            let (p_run, p_prev, _) = self.free_links(prev)?;
            self.set_entry(
                prev,
                BlockState::Free {
                    run: p_run,
                    prev: p_prev,
                    next,
                },
            );
        }
        if next != NIL32 {
            let (n_run, _, n_next) = self.free_links(next)?;
            self.set_entry(
                next,
                BlockState::Free {
                    run: n_run,
                    prev,
                    next: n_next,
                },
            );
        }
        if self.rover() == index {
            self.set_rover(next);
        }
        Ok(())
    }

    /// Next-fit search for a run of at least `want` blocks, starting from
    /// the rolling cursor and wrapping once around the list.
    fn find_run(&self, want: u32) -> Result<Option<u32>> {
        let head = self.free_head();
        if head == NIL32 {
            return Ok(None);
        }
        let rover = self.rover();
        let start = if rover != NIL32 { rover } else { head };

        let mut idx = start;
        loop {
            let (run, _, next) = self.free_links(idx)?;
            if run >= want {
                return Ok(Some(idx));
            }
            let next = if next == NIL32 { head } else { next };
            if next == start {
                return Ok(None);
            }
            idx = next;
        }
    }

    /// The free run whose last block is the last committed block, if any.
    fn trailing_free_run(&self) -> Result<Option<(u32, u32)>> {
        let committed = self.committed();
        if committed == 0 {
            return Ok(None);
        }
        match self.entry(committed - 1)? {
            BlockState::Free { run, .. } => Ok(Some((committed - run, run))),
            _ => Ok(None),
        }
    }

    // ----- heap growth and shrink -----------------------------------------

    /// Extend the committed payload by `nblocks`, coalescing the new space
    /// with a trailing free run.
    fn grow_heap(&mut self, nblocks: u64) -> Result<()> {
        let committed = self.committed() as u64;
        if committed + nblocks > self.geo.block_count {
            return Err(Error::OutOfMemory {
                requested: nblocks << self.geo.block_log2,
            });
        }
        let trailing = self.trailing_free_run()?;
        let new_brk = (committed + nblocks) << self.geo.block_log2;
        self.store.commit(self.geo.payload_start + new_brk)?;
        self.set_brk(new_brk);

        match trailing {
            Some((head, run)) => {
                self.unlink_free_run(head)?;
                self.install_free_run(head, run + nblocks as u32)?;
            }
            None => self.install_free_run(committed as u32, nblocks as u32)?,
        }
        Ok(())
    }

    /// Contract the committed payload by `nblocks`, which must currently
    /// form the tail of a trailing free run.
    fn shrink_heap(&mut self, nblocks: u64) -> Result<()> {
        let committed = self.committed() as u64;
        let (head, run) = self.trailing_free_run()?.ok_or_else(|| {
            Error::invalid("cannot shrink: trailing blocks are busy")
        })?;
        if (run as u64) < nblocks {
            return Err(Error::invalid("cannot shrink: trailing free run too short"));
        }

        self.unlink_free_run(head)?;
        let new_brk = (committed - nblocks) << self.geo.block_log2;
        if let Err(e) = self.store.commit(self.geo.payload_start + new_brk) {
            // The run stays free and usable even if the file could not be
            // contracted.
            self.install_free_run(head, run)?;
            return Err(e);
        }
        self.set_brk(new_brk);
        if run as u64 > nblocks {
            self.install_free_run(head, run - nblocks as u32)?;
        }
        Ok(())
    }

    /// Return an over-threshold trailing free run to the backing file.
    /// Failure is demoted to a warning; the run stays on the free list.
    fn trim(&mut self) {
        let threshold = self.shrink_threshold();
        if threshold == 0 {
            return;
        }
        let trailing = match self.trailing_free_run() {
            Ok(Some(t)) => t,
            _ => return,
        };
        let (_, run) = trailing;
        if run < threshold {
            return;
        }
        if let Err(e) = self.shrink_heap(run as u64) {
            tracing::warn!(
                path = %self.store.path().display(),
                blocks = run,
                error = %e,
                "failed to return trailing free space to the backing store"
            );
        }
    }

    /// The classic per-heap break operation: positive `delta` commits more
    /// payload (new space joins the free list), negative `delta` returns
    /// trailing free space. Returns the old break.
    pub fn grow_break(&mut self, delta: i64) -> Result<u64> {
        let old = self.brk();
        if delta > 0 {
            let nblocks = layout::blockify(delta as u64, self.geo.block_log2);
            self.grow_heap(nblocks)?;
        } else if delta < 0 {
            let nblocks = layout::blockify(delta.unsigned_abs(), self.geo.block_log2);
            self.shrink_heap(nblocks)?;
        }
        Ok(old)
    }

    // ----- block allocation -----------------------------------------------

    /// Allocate a run of `want` blocks, growing the heap if no free run is
    /// large enough. The run is marked busy/large.
    fn alloc_blocks(&mut self, want: u64) -> Result<u32> {
        if want == 0 || want > self.geo.block_count {
            return Err(Error::OutOfMemory {
                requested: want << self.geo.block_log2,
            });
        }
        let want = want as u32;

        let index = match self.find_run(want)? {
            Some(index) => index,
            None => {
                // Grow only by the deficit: a trailing free run counts
                // toward the request once the new space coalesces with it.
                let short = match self.trailing_free_run()? {
                    Some((_, run)) => want - run.min(want - 1),
                    None => want,
                };
                self.grow_heap(short as u64)?;
                self.find_run(want)?.ok_or(Error::OutOfMemory {
                    requested: (want as u64) << self.geo.block_log2,
                })?
            }
        };

        let (run, _, next) = self.free_links(index)?;
        self.unlink_free_run(index)?;

        self.set_entry(index, BlockState::Large { run: want });
        for body in index + 1..index + want {
            self.set_entry(body, BlockState::LargeBody);
        }

        if run > want {
            let rest = index + want;
            self.install_free_run(rest, run - want)?;
            self.set_rover(rest);
        } else {
            self.set_rover(next);
        }
        Ok(index)
    }

    /// Free a busy run and coalesce with free neighbors on both sides.
    fn free_blocks(&mut self, index: u32, run: u32) -> Result<()> {
        let committed = self.committed();
        let mut lo = index;
        let mut total = run;

        if index > 0 {
            if let BlockState::Free { run: before, .. } = self.entry(index - 1)? {
                // Boundary tag on the tail block of the preceding run.
                let head = index - before;
                self.unlink_free_run(head)?;
                lo = head;
                total += before;
            }
        }
        let after = index + run;
        if after < committed {
            if let BlockState::Free { run: following, .. } = self.entry(after)? {
                self.unlink_free_run(after)?;
                total += following;
            }
        }

        self.install_free_run(lo, total)?;
        self.trim();
        Ok(())
    }

    // ----- fragment allocation --------------------------------------------

    fn frag_alloc(&mut self, class: u8) -> Result<u64> {
        let head = self.frag_head(class);
        if head != NIL64 {
            // O(1) pop from the class free list.
            let node = self.frag_node(head)?;
            self.set_frag_head(class, node.next);
            if node.next != NIL64 {
                let mut next = self.frag_node(node.next)?;
                next.prev = NIL64;
                self.set_frag_node(node.next, next)?;
            }

            let index = layout::block_of(head, self.geo.block_log2);
            match self.entry(index)? {
                BlockState::Fragmented { class: c, free_count } if c == class && free_count > 0 => {
                    self.set_entry(
                        index,
                        BlockState::Fragmented {
                            class,
                            free_count: free_count - 1,
                        },
                    );
                }
                _ => {
                    return Err(Error::Corruption {
                        kind: CorruptionKind::Metadata,
                        offset: head,
                    })
                }
            }
            return Ok(head);
        }

        // Carve a fresh block into fragments; keep the first, chain the
        // rest onto the (empty) class list.
        let index = self.alloc_blocks(1)?;
        let per = frag::frags_per_block(class, self.geo.block_log2);
        self.set_entry(
            index,
            BlockState::Fragmented {
                class,
                free_count: per - 1,
            },
        );

        let base = layout::block_start(index, self.geo.block_log2);
        let fsize = frag::class_size(class);
        for k in 1..per as u64 {
            let off = base + k * fsize;
            let prev = if k == 1 { NIL64 } else { off - fsize };
            let next = if k == per as u64 - 1 { NIL64 } else { off + fsize };
            self.set_frag_node(off, FragNode { prev, next })?;
        }
        self.set_frag_head(class, base + fsize);
        Ok(base)
    }

    fn frag_unlink(&mut self, class: u8, off: u64) -> Result<()> {
        let node = self.frag_node(off)?;
        if node.prev == NIL64 {
            self.set_frag_head(class, node.next);
        } else {
            let mut prev = self.frag_node(node.prev)?;
            prev.next = node.next;
            self.set_frag_node(node.prev, prev)?;
        }
        if node.next != NIL64 {
            let mut next = self.frag_node(node.next)?;
            next.prev = node.prev;
            self.set_frag_node(node.next, next)?;
        }
        Ok(())
    }

    fn frag_free(&mut self, off: u64, index: u32, class: u8, free_count: u16) -> Result<()> {
        let per = frag::frags_per_block(class, self.geo.block_log2);

        // Push onto the class list.
        let head = self.frag_head(class);
        self.set_frag_node(off, FragNode { prev: NIL64, next: head })?;
        if head != NIL64 {
            let mut old = self.frag_node(head)?;
            old.prev = off;
            self.set_frag_node(head, old)?;
        }
        self.set_frag_head(class, off);

        let free_count = free_count + 1;
        if free_count < per {
            self.set_entry(index, BlockState::Fragmented { class, free_count });
            return Ok(());
        }

        // Every fragment of this block is free: pull them all off the
        // class list and promote the block back to a free run.
        let base = layout::block_start(index, self.geo.block_log2);
        let limit = base + self.geo.block_size();
        let mut cur = self.frag_head(class);
        while cur != NIL64 {
            let next = self.frag_node(cur)?.next;
            if cur >= base && cur < limit {
                self.frag_unlink(class, cur)?;
            }
            cur = next;
        }
        self.free_blocks(index, 1)
    }

    // ----- public raw operations ------------------------------------------

    /// Allocate `size` bytes, returning its heap-relative offset.
    pub fn alloc_raw(&mut self, size: u64) -> Result<HeapOffset> {
        if size == 0 {
            return Err(Error::invalid("allocation size must be > 0"));
        }
        let off = match frag::class_for(size, self.geo.block_log2) {
            Some(class) => self.frag_alloc(class)?,
            None => {
                let blocks = layout::blockify(size, self.geo.block_log2);
                let index = self.alloc_blocks(blocks)?;
                layout::block_start(index, self.geo.block_log2)
            }
        };
        Ok(HeapOffset(off))
    }

    /// Free the allocation at `off`. The offset must be the exact base of
    /// a live allocation.
    pub fn free_raw(&mut self, off: HeapOffset) -> Result<()> {
        let (index, state) = self.resolve_base(off)?;
        match state {
            BlockState::Large { run } => self.free_blocks(index, run),
            BlockState::Fragmented { class, free_count } => {
                self.frag_free(off.0, index, class, free_count)
            }
            _ => unreachable!("resolve_base only returns allocation bases"),
        }
    }

    /// Usable capacity of the allocation at `off`.
    pub fn capacity_of(&self, off: HeapOffset) -> Result<u64> {
        match self.resolve_base(off)?.1 {
            BlockState::Large { run } => Ok((run as u64) << self.geo.block_log2),
            BlockState::Fragmented { class, .. } => Ok(frag::class_size(class)),
            _ => unreachable!(),
        }
    }

    /// Resize the allocation at `off` to `new_size` bytes. Stays in place
    /// when the current fragment class or block run still fits (trailing
    /// blocks of a shrunk run are split off and freed); otherwise
    /// allocates, copies, and frees, returning the new offset.
    pub fn resize_raw(&mut self, off: HeapOffset, new_size: u64) -> Result<HeapOffset> {
        if new_size == 0 {
            return Err(Error::invalid("resize size must be > 0"));
        }
        let (index, state) = self.resolve_base(off)?;
        let new_class = frag::class_for(new_size, self.geo.block_log2);

        match state {
            BlockState::Fragmented { class, .. } if new_class == Some(class) => Ok(off),
            BlockState::Large { run } if new_class.is_none() => {
                let want = layout::blockify(new_size, self.geo.block_log2) as u32;
                if want == run {
                    return Ok(off);
                }
                if want < run {
                    // Shrink in place: split off and free the tail.
                    self.set_entry(index, BlockState::Large { run: want });
                    let tail = index + want;
                    self.set_entry(tail, BlockState::Large { run: run - want });
                    for body in tail + 1..index + run {
                        self.set_entry(body, BlockState::LargeBody);
                    }
                    self.free_blocks(tail, run - want)?;
                    return Ok(off);
                }
                self.relocate(off, new_size)
            }
            _ => self.relocate(off, new_size),
        }
    }

    fn relocate(&mut self, off: HeapOffset, new_size: u64) -> Result<HeapOffset> {
        let old_cap = self.capacity_of(off)?;
        let new_off = self.alloc_raw(new_size)?;
        let new_cap = self.capacity_of(new_off)?;
        self.copy(off.0, new_off.0, old_cap.min(new_cap))?;
        self.free_raw(off)?;
        Ok(new_off)
    }

    /// Resolve an offset to the block state of the allocation it heads.
    /// Anything other than the exact base of a busy allocation is an
    /// invalid-argument error.
    fn resolve_base(&self, off: HeapOffset) -> Result<(u32, BlockState)> {
        if off.is_nil() || off.0 >= self.brk() {
            return Err(Error::invalid(format!(
                "offset {off} is outside the committed payload"
            )));
        }
        let index = layout::block_of(off.0, self.geo.block_log2);
        let state = self.entry(index)?;
        match state {
            BlockState::Large { .. }
                if off.0 == layout::block_start(index, self.geo.block_log2) =>
            {
                Ok((index, state))
            }
            BlockState::Fragmented { class, .. }
                if off.0 % frag::class_size(class) == 0 =>
            {
                Ok((index, state))
            }
            _ => Err(Error::invalid(format!(
                "offset {off} is not the base of a live allocation"
            ))),
        }
    }

    // ----- consistency walk -----------------------------------------------

    /// Walk every structure and check the allocator's invariants: runs are
    /// well formed and never block-adjacent to another free run, boundary
    /// tags agree, and fragment counts partition their blocks.
    pub fn verify(&self) -> Result<()> {
        let committed = self.committed();
        let corrupt = |index: u32| Error::Corruption {
            kind: CorruptionKind::Metadata,
            offset: index as u64,
        };

        let mut index = 0u32;
        while index < committed {
            match self.entry(index)? {
                BlockState::Free { run, .. } => {
                    if run == 0 || index + run > committed {
                        return Err(corrupt(index));
                    }
                    // Boundary tag and bodies.
                    if run > 1 {
                        match self.entry(index + run - 1)? {
                            BlockState::Free { run: tag, .. } if tag == run => {}
                            _ => return Err(corrupt(index + run - 1)),
                        }
                        for body in index + 1..index + run - 1 {
                            if self.entry(body)? != BlockState::FreeBody {
                                return Err(corrupt(body));
                            }
                        }
                    }
                    // Never adjacent to another free block.
                    if index > 0 && self.entry(index - 1)?.is_free() {
                        return Err(corrupt(index));
                    }
                    if index + run < committed && self.entry(index + run)?.is_free() {
                        return Err(corrupt(index + run));
                    }
                    index += run;
                }
                BlockState::Large { run } => {
                    if run == 0 || index + run > committed {
                        return Err(corrupt(index));
                    }
                    for body in index + 1..index + run {
                        if self.entry(body)? != BlockState::LargeBody {
                            return Err(corrupt(body));
                        }
                    }
                    index += run;
                }
                BlockState::Fragmented { class, free_count } => {
                    let per = frag::frags_per_block(class, self.geo.block_log2);
                    if free_count >= per {
                        return Err(corrupt(index));
                    }
                    if self.count_free_frags(index, class)? != free_count {
                        return Err(corrupt(index));
                    }
                    index += 1;
                }
                BlockState::FreeBody | BlockState::LargeBody => return Err(corrupt(index)),
            }
        }

        self.verify_free_list()?;
        Ok(())
    }

    fn count_free_frags(&self, index: u32, class: u8) -> Result<u16> {
        let base = layout::block_start(index, self.geo.block_log2);
        let limit = base + self.geo.block_size();
        let mut count = 0u16;
        let mut cur = self.frag_head(class);
        let mut steps = 0u64;
        while cur != NIL64 {
            if cur >= base && cur < limit {
                count += 1;
            }
            cur = self.frag_node(cur)?.next;
            steps += 1;
            if steps > self.brk() / frag::class_size(class) + 1 {
                return Err(Error::Corruption {
                    kind: CorruptionKind::Metadata,
                    offset: base,
                });
            }
        }
        Ok(count)
    }

    fn verify_free_list(&self) -> Result<()> {
        let mut prev = NIL32;
        let mut cur = self.free_head();
        while cur != NIL32 {
            let (run, link_prev, next) = self.free_links(cur)?;
            if link_prev != prev || run == 0 {
                return Err(Error::Corruption {
                    kind: CorruptionKind::Metadata,
                    offset: cur as u64,
                });
            }
            if prev != NIL32 && cur <= prev {
                // The list must stay address-ordered.
                return Err(Error::Corruption {
                    kind: CorruptionKind::Metadata,
                    offset: cur as u64,
                });
            }
            prev = cur;
            cur = next;
        }
        Ok(())
    }
}
