//! Huge-page-backed arena, for regions that stay resident for the life of
//! the process (e.g. a `MegaQueue`'s backing `LogAlloc`).
//!
//! Grounded directly in the C allocator's huge-page backend: anonymous
//! `mmap` with `MAP_HUGETLB`, falling back to a normal anonymous mapping
//! when the kernel refuses the flag (`EINVAL` — no huge pages configured),
//! then `mlock` best-effort.

use std::ptr::NonNull;

use dataplane_error::{Error, Result};

use crate::params::LogAllocParams;

pub struct HugePageParams {
    max_alloc_bytes: usize,
}

impl HugePageParams {
    pub fn new() -> Self {
        HugePageParams {
            max_alloc_bytes: usize::MAX,
        }
    }
}

impl Default for HugePageParams {
    fn default() -> Self {
        Self::new()
    }
}

unsafe fn mmap_anon(len: usize, flags: libc::c_int) -> *mut libc::c_void {
    libc::mmap(
        std::ptr::null_mut(),
        len,
        libc::PROT_READ | libc::PROT_WRITE,
        libc::MAP_PRIVATE | libc::MAP_ANONYMOUS | flags,
        -1,
        0,
    )
}

impl LogAllocParams for HugePageParams {
    fn alloc_region(&self, len: usize) -> Result<NonNull<u8>> {
        let huge_flags = libc::MAP_HUGETLB | libc::MAP_NORESERVE | libc::MAP_POPULATE;
        let mut ptr = unsafe { mmap_anon(len, huge_flags) };

        if ptr == libc::MAP_FAILED {
            // Huge pages unavailable on this host — fall back to a normal
            // anonymous mapping rather than fail the allocation outright.
            ptr = unsafe { mmap_anon(len, libc::MAP_NORESERVE) };
        }

        if ptr == libc::MAP_FAILED {
            return Err(Error::NoMem {
                requested_cells: 0,
                available_cells: 0,
            });
        }

        unsafe {
            // Best effort; a failed mlock just means this region can be
            // swapped, which is survivable.
            libc::mlock(ptr, len);
        }

        Ok(NonNull::new(ptr as *mut u8).expect("mmap returned non-null on success"))
    }

    unsafe fn free_region(&self, ptr: NonNull<u8>, len: usize) {
        libc::munmap(ptr.as_ptr() as *mut libc::c_void, len);
    }

    fn max_alloc_bytes(&self) -> usize {
        self.max_alloc_bytes
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn falls_back_when_hugetlb_unavailable() {
        let p = HugePageParams::new();
        // A small odd-sized region will never satisfy MAP_HUGETLB's
        // alignment requirements, exercising the fallback path in CI.
        let region = p.alloc_region(4096).expect("fallback mmap must succeed");
        unsafe {
            std::ptr::write_bytes(region.as_ptr(), 0, 4096);
            p.free_region(region, 4096);
        }
    }
}
