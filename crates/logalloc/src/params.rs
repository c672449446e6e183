//! Pluggable backing-store behavior for a [`crate::LogAlloc`] region.
//!
//! Mirrors the C allocator's `struct logalloc_params` function-table —
//! "polymorphism via function table" reimagined as a capability trait, the
//! way the teacher's own allocators parameterize backing memory rather than
//! using inheritance.

use std::alloc::Layout;
use std::ptr::NonNull;

use dataplane_error::{Error, Result};

pub trait LogAllocParams: Send + Sync {
    /// Allocate a region of exactly `len` bytes, suitably aligned for the
    /// arena (cache-line aligned is always sufficient).
    fn alloc_region(&self, len: usize) -> Result<NonNull<u8>>;

    /// Release a region previously returned by `alloc_region`.
    ///
    /// # Safety
    ///
    /// `ptr`/`len` must be the exact pair returned by a matching
    /// `alloc_region` call.
    unsafe fn free_region(&self, ptr: NonNull<u8>, len: usize);

    /// Called when a cell's reference count would cross the overflow trap
    /// (255). The default policy aborts the process, matching the C
    /// allocator's documented behavior of treating this as a programming
    /// error rather than a recoverable condition.
    fn on_refcnt_overflow(&self) {
        panic!("logalloc: reference count overflow — too many live references to one cell");
    }

    /// The largest single allocation this region will service, in bytes.
    /// `LogAlloc::alloc` rejects anything larger up front with `BadArgs`.
    fn max_alloc_bytes(&self) -> usize {
        usize::MAX
    }
}

const ARENA_ALIGN: usize = 64;

/// Default backing store: the process heap, via `std::alloc`.
#[derive(Debug, Default)]
pub struct HeapParams {
    max_alloc_bytes: usize,
}

impl HeapParams {
    pub fn new() -> Self {
        HeapParams {
            max_alloc_bytes: usize::MAX,
        }
    }

    pub fn with_max_alloc_bytes(max_alloc_bytes: usize) -> Self {
        HeapParams { max_alloc_bytes }
    }

    fn layout(len: usize) -> Layout {
        Layout::from_size_align(len, ARENA_ALIGN).expect("region layout")
    }
}

impl LogAllocParams for HeapParams {
    fn alloc_region(&self, len: usize) -> Result<NonNull<u8>> {
        let layout = Self::layout(len);
        // Safety: layout has non-zero size as long as `len > 0`, which the
        // caller (`LogAlloc::new`) guarantees.
        let raw = unsafe { std::alloc::alloc_zeroed(layout) };
        NonNull::new(raw).ok_or(Error::NoMem {
            requested_cells: 0,
            available_cells: 0,
        })
    }

    unsafe fn free_region(&self, ptr: NonNull<u8>, len: usize) {
        std::alloc::dealloc(ptr.as_ptr(), Self::layout(len));
    }

    fn max_alloc_bytes(&self) -> usize {
        if self.max_alloc_bytes == 0 {
            usize::MAX
        } else {
            self.max_alloc_bytes
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn heap_params_round_trips() {
        let p = HeapParams::new();
        let region = p.alloc_region(4096).unwrap();
        unsafe {
            std::ptr::write_bytes(region.as_ptr(), 0xAA, 4096);
            p.free_region(region, 4096);
        }
    }
}
