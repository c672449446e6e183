//! # logalloc
//!
//! A log-structured, reference-counted region allocator. Objects are carved
//! out of a fixed-size arena in run-length order, walking forward from a
//! single "log head" cursor and wrapping back to the start of the arena
//! when the tail doesn't have room. Freed cells are never compacted eagerly
//! — they're reclaimed the next time the log head scans across them.
//!
//! This is the allocator `megaqueue` and `workerpool` carve their shared
//! buffers from; it is not a general-purpose `malloc` replacement.

#![allow(dead_code)]

mod header;
mod hugepage;
mod params;

pub use header::{CellHeader, HEADER_SIZE, REFCNT_OVERFLOW};
pub use hugepage::HugePageParams;
pub use params::{HeapParams, LogAllocParams};

use std::cell::Cell;
use std::ptr::NonNull;

use dataplane_core::env::env_get_bool;
use dataplane_core::refcount::IncResult;
use dataplane_core::{ddebug, dtrace};
use dataplane_error::{Error, Result};

const MAX_CELLS_PER_RUN: usize = 255;

fn round_up_pow2(value: usize) -> usize {
    value.next_power_of_two()
}

/// A single log-structured arena.
///
/// `alloc`, `prepare_region`, and `finalize_region` are home-thread
/// operations — `log_head` is plain (non-atomic) state, exactly as the
/// scan-and-stamp algorithm they implement assumes only one thread ever
/// drives the log head forward. `reference` and `free` only ever touch a
/// cell's atomic refcount and are safe to call from any thread holding a
/// valid pointer.
pub struct LogAlloc {
    region: NonNull<u8>,
    region_size: usize,
    cell_size: usize,
    total_cells: usize,
    log_head: Cell<usize>,
    params: Box<dyn LogAllocParams>,
}

// Safety: `region` is an owned allocation exclusive to this `LogAlloc`; the
// only state mutated from other threads is the atomic refcount inside each
// cell header, reached through `reference`/`free`.
unsafe impl Send for LogAlloc {}
unsafe impl Sync for LogAlloc {}

impl LogAlloc {
    /// Create a new arena of `nr_cells` cells, each able to hold at least
    /// `user_cell_size` payload bytes, backed by the process heap.
    pub fn new(user_cell_size: usize, nr_cells: usize) -> Result<Self> {
        Self::with_params(user_cell_size, nr_cells, Box::new(HeapParams::new()))
    }

    /// Like [`LogAlloc::new`], but backs the arena with [`HugePageParams`]
    /// instead of the plain heap when `DATAPLANE_LOGALLOC_HUGEPAGES` is set
    /// to a truthy value. Lets an operator opt an arena into huge pages
    /// without recompiling the caller.
    pub fn new_from_env(user_cell_size: usize, nr_cells: usize) -> Result<Self> {
        if env_get_bool("DATAPLANE_LOGALLOC_HUGEPAGES", false) {
            Self::with_params(user_cell_size, nr_cells, Box::new(HugePageParams::new()))
        } else {
            Self::new(user_cell_size, nr_cells)
        }
    }

    /// Create a new arena with a custom backing-store policy (e.g.
    /// [`HugePageParams`]).
    pub fn with_params(
        user_cell_size: usize,
        nr_cells: usize,
        params: Box<dyn LogAllocParams>,
    ) -> Result<Self> {
        if user_cell_size == 0 || nr_cells == 0 {
            return Err(Error::BadArgs("cell_size and nr_cells must be non-zero"));
        }

        let cell_size = round_up_pow2(user_cell_size + HEADER_SIZE);
        let region_size = cell_size
            .checked_mul(nr_cells)
            .ok_or(Error::BadArgs("region size overflows usize"))?;

        let region = params.alloc_region(region_size)?;

        ddebug!(
            "logalloc: new arena, {nr_cells} cells of {cell_size} bytes ({region_size} bytes total)"
        );

        let alloc = LogAlloc {
            region,
            region_size,
            cell_size,
            total_cells: nr_cells,
            log_head: Cell::new(0),
            params,
        };

        // The whole arena starts as a single free-to-end run.
        let head = unsafe { alloc.header_mut(0) };
        head.nr_cells = 0;
        head.refcnt.set(0);

        Ok(alloc)
    }

    pub fn cell_size(&self) -> usize {
        self.cell_size
    }

    pub fn total_cells(&self) -> usize {
        self.total_cells
    }

    #[inline]
    unsafe fn header_ptr(&self, idx: usize) -> *mut CellHeader {
        self.region.as_ptr().add(idx * self.cell_size) as *mut CellHeader
    }

    #[inline]
    unsafe fn header(&self, idx: usize) -> &CellHeader {
        &*self.header_ptr(idx)
    }

    #[inline]
    unsafe fn header_mut(&self, idx: usize) -> &mut CellHeader {
        &mut *self.header_ptr(idx)
    }

    #[inline]
    unsafe fn payload_ptr(&self, idx: usize) -> NonNull<u8> {
        NonNull::new_unchecked(self.region.as_ptr().add(idx * self.cell_size + HEADER_SIZE))
    }

    #[inline]
    unsafe fn header_from_payload(ptr: NonNull<u8>) -> &'static CellHeader {
        &*(ptr.as_ptr().sub(HEADER_SIZE) as *const CellHeader)
    }

    /// Allocate `size` bytes, returning a pointer to the payload immediately
    /// past the cell header.
    pub fn alloc(&self, size: usize) -> Result<NonNull<u8>> {
        if size == 0 {
            return Err(Error::BadArgs("alloc size must be non-zero"));
        }
        if size > self.params.max_alloc_bytes() {
            return Err(Error::BadArgs("alloc request exceeds this allocator's per-request limit"));
        }

        let req_cells = size.div_ceil(self.cell_size);
        if req_cells > MAX_CELLS_PER_RUN || req_cells > self.total_cells {
            return Err(Error::NoMem {
                requested_cells: req_cells as u32,
                available_cells: self.total_cells as u32,
            });
        }

        let log_head = self.log_head.get();

        // SAFETY: all indices derived below stay within `0..total_cells`.
        unsafe {
            if self.header(log_head).refcnt.get() != 0 {
                return Err(Error::NoMem {
                    requested_cells: req_cells as u32,
                    available_cells: 0,
                });
            }

            let working_log_head = if req_cells > self.total_cells - log_head {
                // Doesn't fit before the edge of the arena; wrap. The
                // remainder here is only rewritten if it isn't already a
                // free-to-end sentinel.
                let remainder_hdr = self.header_mut(log_head);
                if remainder_hdr.nr_cells != 0 {
                    let remainder = (self.total_cells - log_head).min(MAX_CELLS_PER_RUN);
                    remainder_hdr.nr_cells = remainder as u8;
                    remainder_hdr.refcnt.set(0);
                }
                0
            } else {
                log_head
            };

            let mut found = 0usize;
            let mut last_run_len = 0usize;
            let mut hit_sentinel = false;
            while found < req_cells {
                let chdr = self.header(working_log_head + found);
                if chdr.refcnt.get() != 0 {
                    break;
                }
                last_run_len = chdr.nr_cells as usize;
                if chdr.nr_cells == 0 {
                    found = self.total_cells - working_log_head;
                    hit_sentinel = true;
                    break;
                }
                found += chdr.nr_cells as usize;
            }

            if found < req_cells {
                return Err(Error::NoMem {
                    requested_cells: req_cells as u32,
                    available_cells: found as u32,
                });
            }

            let committed = self.header_mut(working_log_head);
            committed.nr_cells = req_cells as u8;
            committed.refcnt.set(1);

            let ptr = self.payload_ptr(working_log_head);
            self.log_head
                .set((working_log_head + req_cells) % self.total_cells);

            if !hit_sentinel && found > req_cells {
                let mut remaining = found - req_cells;
                let mut offset = req_cells;
                while remaining > 0 {
                    let run = remaining.min(MAX_CELLS_PER_RUN);
                    let chdr = self.header_mut(working_log_head + offset);
                    chdr.nr_cells = run as u8;
                    chdr.refcnt.set(0);
                    offset += run;
                    remaining -= run;
                }
            }

            dtrace!("logalloc: alloc {size} bytes -> {req_cells} cells at {working_log_head}");
            Ok(ptr)
        }
    }

    /// Increment the reference count of a live cell.
    pub fn reference(&self, ptr: NonNull<u8>) -> Result<()> {
        let header = unsafe { Self::header_from_payload(ptr) };
        match header.refcnt.inc_if_live() {
            IncResult::Incremented(_) => Ok(()),
            IncResult::Dead => Err(Error::Busy),
            IncResult::Overflow => {
                self.params.on_refcnt_overflow();
                Err(Error::Busy)
            }
        }
    }

    /// Release one reference to a cell. Does not move or compact memory —
    /// the cell is only reclaimed once `alloc` next scans across it.
    pub fn free(&self, ptr: NonNull<u8>) -> Result<()> {
        let header = unsafe { Self::header_from_payload(ptr) };
        match header.refcnt.dec_if_live() {
            Some(_) => Ok(()),
            None => Err(Error::Invalid("double free or invalid pointer")),
        }
    }

    /// Reserve up to `size_hint` bytes without committing them. The caller
    /// writes into the returned buffer and must follow up with
    /// [`LogAlloc::finalize_region`] before calling `alloc` or
    /// `prepare_region` again.
    pub fn prepare_region(&self, size_hint: usize) -> Result<(NonNull<u8>, usize)> {
        if size_hint == 0 {
            return Err(Error::BadArgs("size_hint must be non-zero"));
        }

        let nr_cells = size_hint.div_ceil(self.cell_size).min(MAX_CELLS_PER_RUN);
        let log_head = self.log_head.get();
        let avail_from_head = self.total_cells - log_head;

        // The tail doesn't have room — reconsider from the start of the
        // arena rather than failing outright, the way `alloc` does.
        let (virt_log_head, scan_limit) = if avail_from_head < nr_cells {
            (0, self.total_cells)
        } else {
            (log_head, avail_from_head)
        };

        unsafe {
            if self.header(virt_log_head).refcnt.get() != 0 {
                return Err(Error::NoMem {
                    requested_cells: nr_cells as u32,
                    available_cells: 0,
                });
            }

            let mut found = 0usize;
            let mut hit_sentinel = false;
            loop {
                let chdr = self.header(virt_log_head + found);
                if chdr.refcnt.get() != 0 {
                    break;
                }
                if chdr.nr_cells == 0 {
                    found += scan_limit - found;
                    hit_sentinel = true;
                    break;
                }
                found += chdr.nr_cells as usize;
                if found >= nr_cells {
                    break;
                }
            }

            if found < nr_cells {
                return Err(Error::NoMem {
                    requested_cells: nr_cells as u32,
                    available_cells: found as u32,
                });
            }

            self.log_head.set(virt_log_head);

            let committed = self.header_mut(virt_log_head);
            committed.nr_cells = nr_cells as u8;
            committed.refcnt.set(0);

            let remainder = found - nr_cells;
            if hit_sentinel {
                let sentinel = self.header_mut(virt_log_head + nr_cells);
                sentinel.nr_cells = 0;
                sentinel.refcnt.set(0);
            } else {
                let mut remaining = remainder;
                let mut offset = nr_cells;
                while remaining > 0 {
                    let run = remaining.min(MAX_CELLS_PER_RUN);
                    let chdr = self.header_mut(virt_log_head + offset);
                    chdr.nr_cells = run as u8;
                    chdr.refcnt.set(0);
                    offset += run;
                    remaining -= run;
                }
            }

            let ptr = self.payload_ptr(virt_log_head);
            let capacity_bytes = nr_cells * self.cell_size;
            ddebug!("logalloc: prepared {nr_cells} cells at {virt_log_head}");
            Ok((ptr, capacity_bytes))
        }
    }

    /// Commit a region reserved by [`LogAlloc::prepare_region`], marking
    /// only the first `used_bytes` of it as live.
    pub fn finalize_region(&self, used_bytes: usize) -> Result<()> {
        if used_bytes == 0 {
            return Err(Error::BadArgs("used_bytes must be non-zero"));
        }

        let used_cells = used_bytes.div_ceil(self.cell_size);
        let log_head = self.log_head.get();

        unsafe {
            let committed = self.header_mut(log_head);
            if used_cells > MAX_CELLS_PER_RUN || used_cells > committed.nr_cells as usize {
                return Err(Error::Invalid(
                    "finalize_region used_bytes exceeds the prepared reservation",
                ));
            }

            let reserved_cells = committed.nr_cells as usize;
            let new_log_head = (log_head + used_cells) % self.total_cells;

            // Unconditionally raised, including the exact-fit case.
            committed.nr_cells = used_cells as u8;
            committed.refcnt.set(1);
            self.log_head.set(new_log_head);

            if reserved_cells > used_cells {
                let remainder_cells = reserved_cells - used_cells;
                let remainder_hdr = self.header_mut(new_log_head);
                remainder_hdr.nr_cells = remainder_cells as u8;
                remainder_hdr.refcnt.set(0);
            }

            dtrace!("logalloc: finalized {used_cells} of {reserved_cells} reserved cells");
            Ok(())
        }
    }
}

impl Drop for LogAlloc {
    fn drop(&mut self) {
        unsafe {
            self.params.free_region(self.region, self.region_size);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn small_arena() -> LogAlloc {
        LogAlloc::new(64, 16).unwrap()
    }

    #[test]
    fn basic_alloc_reference_free_cycle() {
        let arena = small_arena();
        let ptr = arena.alloc(32).unwrap();
        arena.reference(ptr).unwrap();
        arena.free(ptr).unwrap();
        arena.free(ptr).unwrap();
        assert_eq!(arena.free(ptr), Err(Error::Invalid("double free or invalid pointer")));
    }

    #[test]
    fn alloc_rejects_oversized_request() {
        let arena = small_arena();
        let err = arena.alloc(64 * 1000).unwrap_err();
        assert!(matches!(err, Error::NoMem { .. }));
    }

    #[test]
    fn alloc_rejects_request_over_configured_cap() {
        let arena = LogAlloc::with_params(
            64,
            16,
            Box::new(HeapParams::with_max_alloc_bytes(32)),
        )
        .unwrap();
        let err = arena.alloc(64).unwrap_err();
        assert!(matches!(err, Error::BadArgs(_)));
        // a request within the cap still goes through.
        arena.alloc(16).unwrap();
    }

    #[test]
    fn reference_refuses_free_cell() {
        let arena = small_arena();
        let ptr = arena.alloc(16).unwrap();
        arena.free(ptr).unwrap();
        assert_eq!(arena.reference(ptr), Err(Error::Busy));
    }

    #[test]
    fn ring_streaming_recycles_freed_cells() {
        let arena = LogAlloc::new(32, 8).unwrap();
        let mut live = Vec::new();
        for i in 0..512 {
            let ptr = arena.alloc(16).expect("arena should recycle freed cells");
            if live.len() >= 4 {
                let old = live.remove(0);
                arena.free(old).unwrap();
            }
            live.push(ptr);
            let _ = i;
        }
    }

    #[test]
    fn prepare_then_finalize_exact_fit_commits_refcnt_one() {
        let arena = small_arena();
        let (ptr, capacity) = arena.prepare_region(40).unwrap();
        assert!(capacity >= 40);
        arena.finalize_region(capacity).unwrap();
        // exact-fit commit must still raise refcnt to 1 — a second
        // reference must succeed, and a free must succeed exactly once.
        arena.reference(ptr).unwrap();
        arena.free(ptr).unwrap();
        arena.free(ptr).unwrap();
    }

    #[test]
    fn prepare_then_finalize_partial_leaves_remainder_free() {
        let arena = LogAlloc::new(32, 8).unwrap();
        let (ptr, capacity) = arena.prepare_region(4 * 32).unwrap();
        arena.finalize_region(32).unwrap();
        arena.reference(ptr).unwrap();
        arena.free(ptr).unwrap();
        arena.free(ptr).unwrap();
        // the unused remainder of the reservation must be available to a
        // subsequent alloc, not leaked.
        let _ = arena.alloc(32 * (capacity / 32 - 1)).unwrap();
    }

    #[test]
    fn finalize_rejects_more_than_reserved() {
        let arena = small_arena();
        let (_ptr, capacity) = arena.prepare_region(32).unwrap();
        let err = arena.finalize_region(capacity + arena.cell_size()).unwrap_err();
        assert!(matches!(err, Error::Invalid(_)));
    }

    #[test]
    fn prepare_wraps_to_front_when_tail_is_too_small() {
        // Force the log head near the end of the arena, then request more
        // than fits before the edge — the allocator must retry from 0
        // instead of failing outright.
        let arena = LogAlloc::new(32, 4).unwrap();
        let a = arena.alloc(32).unwrap();
        let b = arena.alloc(32).unwrap();
        let c = arena.alloc(32).unwrap();
        arena.free(a).unwrap();
        arena.free(b).unwrap();
        arena.free(c).unwrap();
        // log head sits at cell 3 with one cell left before the edge;
        // request two cells' worth, forcing a wrap to cell 0.
        let wrapped = arena.alloc(64).unwrap();
        assert!(wrapped.as_ptr() >= arena.region.as_ptr());
    }

    #[test]
    fn new_from_env_defaults_to_heap_backing() {
        std::env::remove_var("DATAPLANE_LOGALLOC_HUGEPAGES");
        let arena = LogAlloc::new_from_env(64, 16).unwrap();
        let ptr = arena.alloc(32).unwrap();
        arena.free(ptr).unwrap();
    }
}
