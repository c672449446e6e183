//! # megaqueue
//!
//! A single-producer / single-consumer ring of fixed-size records over a
//! POSIX shared-memory segment, addressable by 64-bit monotonic cursors so
//! producer and consumer can live in different processes. A third cursor,
//! `delete`, lets a reclaimer trail the reader instead of forcing every
//! consumer to double as the sole reclaiming role.

#![allow(dead_code)]

mod header;

pub use header::{MegaQueueHeader, PAGE_SIZE};

use std::ffi::CString;
use std::os::unix::io::RawFd;
use std::ptr::NonNull;
use std::sync::atomic::Ordering;

use dataplane_core::{ddebug, dinfo};
use dataplane_error::{Error, Result};

/// `shm_open` semantics for [`MegaQueue::open`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OpenMode {
    /// Create a new segment; fails with `Exist` if one already exists.
    CreateExclusive,
    /// Open an existing segment; fails with `NotFound` if none exists.
    OpenExisting,
    /// Create the segment if missing, otherwise attach to the existing one.
    CreateOrOpen,
}

/// One end of a cross-process SPSC ring.
pub struct MegaQueue {
    mapping: NonNull<u8>,
    mapping_len: usize,
    fd: RawFd,
    shm_path: CString,
    object_size: usize,
    object_count: usize,
}

// Safety: the mapping is shared memory explicitly intended for concurrent
// cross-process access. Each cursor has exactly one writer by contract
// (producer owns `head`, reader owns `tail`, reclaimer owns `delete`); a
// `MegaQueue` handle may legitimately be handed to whichever thread plays
// one of those roles.
unsafe impl Send for MegaQueue {}
unsafe impl Sync for MegaQueue {}

fn shm_path_for(name: &str) -> Result<CString> {
    CString::new(format!("/megaqueue_{name}"))
        .map_err(|_| Error::BadArgs("segment name must not contain a NUL byte"))
}

fn errno_to_error(errno: i32) -> Error {
    match errno {
        libc::ENOENT => Error::NotFound,
        libc::EEXIST => Error::Exist,
        libc::ENOMEM | libc::ENOSPC => Error::NoMem {
            requested_cells: 0,
            available_cells: 0,
        },
        _ => Error::Invalid("unexpected OS error while opening shared memory segment"),
    }
}

impl MegaQueue {
    /// Open or create a named segment sized for `object_count` records of
    /// `object_size` bytes each.
    pub fn open(mode: OpenMode, name: &str, object_size: usize, object_count: usize) -> Result<Self> {
        if object_size == 0 || object_count == 0 {
            return Err(Error::BadArgs("object_size and object_count must be non-zero"));
        }

        let shm_path = shm_path_for(name)?;

        let oflags = match mode {
            OpenMode::CreateExclusive => libc::O_RDWR | libc::O_CREAT | libc::O_EXCL,
            OpenMode::OpenExisting => libc::O_RDWR,
            OpenMode::CreateOrOpen => libc::O_RDWR | libc::O_CREAT,
        };

        let fd = unsafe { libc::shm_open(shm_path.as_ptr(), oflags, 0o600) };
        if fd < 0 {
            return Err(errno_to_error(std::io::Error::last_os_error().raw_os_error().unwrap_or(0)));
        }

        let existing_size = Self::fstat_size(fd)?;
        let just_created = mode == OpenMode::CreateExclusive || existing_size == 0;

        let result = if just_created {
            Self::init_new(fd, shm_path, object_size, object_count)
        } else {
            Self::attach_existing(fd, shm_path, existing_size, object_size, object_count)
        };

        if result.is_err() {
            unsafe {
                libc::close(fd);
            }
        }
        result
    }

    fn fstat_size(fd: RawFd) -> Result<usize> {
        let mut st: libc::stat = unsafe { std::mem::zeroed() };
        if unsafe { libc::fstat(fd, &mut st) } != 0 {
            return Err(Error::Invalid("fstat failed on shared memory segment"));
        }
        Ok(st.st_size as usize)
    }

    fn init_new(fd: RawFd, shm_path: CString, object_size: usize, object_count: usize) -> Result<Self> {
        let mapping_len = PAGE_SIZE + object_size * object_count;

        if unsafe { libc::ftruncate(fd, mapping_len as libc::off_t) } != 0 {
            return Err(Error::Invalid("ftruncate failed on shared memory segment"));
        }

        let mapping = Self::map(fd, mapping_len)?;

        Self::prefault(mapping, mapping_len);
        unsafe {
            libc::madvise(mapping.as_ptr() as *mut libc::c_void, mapping_len, libc::MADV_WILLNEED);
        }

        let header = unsafe { &*(mapping.as_ptr() as *const MegaQueueHeader) };
        header.head.store(0, Ordering::Relaxed);
        header.tail.store(0, Ordering::Relaxed);
        header.delete.store(0, Ordering::Relaxed);
        header.producer_pid.store(unsafe { libc::getpid() } as u64, Ordering::Relaxed);
        header.object_size.store(object_size as u64, Ordering::Relaxed);
        header.object_count.store(object_count as u64, Ordering::Release);

        dinfo!("megaqueue: created {object_count} slots of {object_size} bytes each");

        Ok(MegaQueue {
            mapping,
            mapping_len,
            fd,
            shm_path,
            object_size,
            object_count,
        })
    }

    fn attach_existing(
        fd: RawFd,
        shm_path: CString,
        existing_size: usize,
        object_size: usize,
        object_count: usize,
    ) -> Result<Self> {
        if existing_size <= PAGE_SIZE {
            return Err(Error::Invalid("shared memory segment is smaller than one page"));
        }

        let mapping = Self::map(fd, existing_size)?;
        let header = unsafe { &*(mapping.as_ptr() as *const MegaQueueHeader) };

        let stored_object_size = header.object_size.load(Ordering::Acquire) as usize;
        let stored_object_count = header.object_count.load(Ordering::Acquire) as usize;

        if object_size > stored_object_size || object_count != stored_object_count {
            unsafe {
                libc::munmap(mapping.as_ptr() as *mut libc::c_void, existing_size);
            }
            return Err(Error::Invalid(
                "requested object_size/object_count do not match the existing segment",
            ));
        }

        ddebug!("megaqueue: attached to existing segment with {stored_object_count} slots");

        Ok(MegaQueue {
            mapping,
            mapping_len: existing_size,
            fd,
            shm_path,
            object_size: stored_object_size,
            object_count: stored_object_count,
        })
    }

    fn map(fd: RawFd, len: usize) -> Result<NonNull<u8>> {
        let ptr = unsafe {
            libc::mmap(
                std::ptr::null_mut(),
                len,
                libc::PROT_READ | libc::PROT_WRITE,
                libc::MAP_SHARED,
                fd,
                0,
            )
        };
        if ptr == libc::MAP_FAILED {
            return Err(Error::NoMem {
                requested_cells: 0,
                available_cells: 0,
            });
        }
        Ok(unsafe { NonNull::new_unchecked(ptr as *mut u8) })
    }

    /// Touch one word per page up to the first 512 MiB so the kernel wires
    /// physical frames before production begins. Deliberately a per-page
    /// touch, not a `memset` of the whole segment.
    fn prefault(mapping: NonNull<u8>, len: usize) {
        const PREFAULT_LIMIT: usize = 512 * 1024 * 1024;
        let limit = len.min(PREFAULT_LIMIT);
        let mut offset = 0usize;
        while offset < limit {
            unsafe {
                let word = mapping.as_ptr().add(offset) as *mut u32;
                std::ptr::write_volatile(word, 0);
            }
            offset += PAGE_SIZE;
        }
    }

    #[inline]
    fn header(&self) -> &MegaQueueHeader {
        unsafe { &*(self.mapping.as_ptr() as *const MegaQueueHeader) }
    }

    #[inline]
    unsafe fn slot_ptr(&self, idx: u64) -> *mut u8 {
        self.mapping
            .as_ptr()
            .add(PAGE_SIZE + idx as usize * self.object_size)
    }

    pub fn object_size(&self) -> usize {
        self.object_size
    }

    pub fn object_count(&self) -> usize {
        self.object_count
    }

    /// Reserve the next slot for the producer without publishing it yet.
    pub fn next_slot(&self) -> Result<&mut [u8]> {
        let header = self.header();
        let head = header.head.load(Ordering::Acquire);
        let delete = header.delete.load(Ordering::Acquire);
        if delete == (head + 1) % self.object_count as u64 {
            return Err(Error::NoSpace);
        }
        Ok(unsafe { std::slice::from_raw_parts_mut(self.slot_ptr(head), self.object_size) })
    }

    /// Publish the slot most recently returned by `next_slot`.
    pub fn advance(&self) -> Result<()> {
        let header = self.header();
        let head = header.head.load(Ordering::Acquire);
        let delete = header.delete.load(Ordering::Acquire);
        if delete == (head + 1) % self.object_count as u64 {
            return Err(Error::NoSpace);
        }
        header
            .head
            .store((head + 1) % self.object_count as u64, Ordering::Release);
        Ok(())
    }

    /// Borrow the next unread slot without consuming it.
    pub fn read_next_slot(&self) -> Result<&[u8]> {
        let header = self.header();
        let tail = header.tail.load(Ordering::Acquire);
        let head = header.head.load(Ordering::Acquire);
        if tail == head {
            return Err(Error::Empty);
        }
        Ok(unsafe { std::slice::from_raw_parts(self.slot_ptr(tail), self.object_size) })
    }

    /// Advance the reader cursor only, leaving `delete` behind for a
    /// separate reclaimer role.
    pub fn read_only_advance(&self) -> Result<()> {
        let header = self.header();
        let tail = header.tail.load(Ordering::Acquire);
        let head = header.head.load(Ordering::Acquire);
        if tail == head {
            return Err(Error::Empty);
        }
        header
            .tail
            .store((tail + 1) % self.object_count as u64, Ordering::Release);
        Ok(())
    }

    /// Advance the reclaimer cursor, never passing the reader.
    pub fn delete_advance(&self) -> Result<()> {
        let header = self.header();
        let delete = header.delete.load(Ordering::Acquire);
        let tail = header.tail.load(Ordering::Acquire);
        if delete == tail {
            return Err(Error::Empty);
        }
        header
            .delete
            .store((delete + 1) % self.object_count as u64, Ordering::Release);
        Ok(())
    }

    /// Legacy single-role helper: advances `tail` and snaps `delete` to the
    /// same position. Mutually exclusive with `delete_advance` — a consumer
    /// that calls this should never also call `delete_advance`.
    pub fn read_advance(&self) -> Result<()> {
        let header = self.header();
        let tail = header.tail.load(Ordering::Acquire);
        let head = header.head.load(Ordering::Acquire);
        if tail == head {
            return Err(Error::Empty);
        }
        let new_tail = (tail + 1) % self.object_count as u64;
        header.tail.store(new_tail, Ordering::Release);
        header.delete.store(new_tail, Ordering::Release);
        Ok(())
    }

    /// Unmap the segment, closing the file descriptor. If `unlink` is set,
    /// also removes the segment's name from the shared-memory namespace —
    /// only the last closer should do this.
    pub fn close(self, unlink: bool) -> Result<()> {
        // `ManuallyDrop` lets us run the teardown exactly once here instead
        // of leaking `shm_path`'s allocation the way `mem::forget` would.
        let mut this = std::mem::ManuallyDrop::new(self);
        let result = unsafe {
            if libc::munmap(this.mapping.as_ptr() as *mut libc::c_void, this.mapping_len) != 0 {
                Err(Error::Invalid("munmap failed while closing megaqueue"))
            } else if libc::close(this.fd) != 0 {
                Err(Error::Invalid("close failed while closing megaqueue"))
            } else {
                if unlink {
                    libc::shm_unlink(this.shm_path.as_ptr());
                }
                Ok(())
            }
        };
        unsafe {
            std::ptr::drop_in_place(&mut this.shm_path);
        }
        result
    }
}

impl Drop for MegaQueue {
    fn drop(&mut self) {
        unsafe {
            libc::munmap(self.mapping.as_ptr() as *mut libc::c_void, self.mapping_len);
            libc::close(self.fd);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn unique_name(tag: &str) -> String {
        format!("mqtest_{tag}_{}", std::process::id())
    }

    #[test]
    fn empty_queue_read_fails_and_single_roundtrip_succeeds() {
        let name = unique_name("roundtrip");
        let mq = MegaQueue::open(OpenMode::CreateOrOpen, &name, 128, 16).unwrap();

        assert_eq!(mq.read_next_slot().unwrap_err(), Error::Empty);

        let slot = mq.next_slot().unwrap();
        slot[..8].copy_from_slice(&0xDEADBEEFu64.to_ne_bytes());
        mq.advance().unwrap();

        let read = mq.read_next_slot().unwrap();
        assert_eq!(&read[..8], &0xDEADBEEFu64.to_ne_bytes());

        mq.read_advance().unwrap();
        assert_eq!(mq.read_next_slot().unwrap_err(), Error::Empty);

        mq.close(true).unwrap();
    }

    #[test]
    fn hand_over_matches_the_two_message_scenario() {
        let name = unique_name("handover");
        let mq = MegaQueue::open(OpenMode::CreateOrOpen, &name, 128, 16384).unwrap();

        assert_eq!(mq.read_next_slot().unwrap_err(), Error::Empty);

        {
            let s1 = mq.next_slot().unwrap();
            s1[0..8].copy_from_slice(&0xDEADBEEFCAFEBABEu64.to_le_bytes());
            s1[8..16].copy_from_slice(&0xBEBAFECAEFBEADDEu64.to_le_bytes());
        }
        mq.advance().unwrap();

        {
            let s2 = mq.next_slot().unwrap();
            s2[0..8].copy_from_slice(&0xEFBEADDEBEBAFECAu64.to_le_bytes());
            s2[8..16].copy_from_slice(&0xCAFEBABEDEADBEEFu64.to_le_bytes());
        }
        mq.advance().unwrap();

        let first = mq.read_next_slot().unwrap();
        assert_eq!(&first[0..8], &0xDEADBEEFCAFEBABEu64.to_le_bytes());
        mq.read_advance().unwrap();

        let second = mq.read_next_slot().unwrap();
        assert_eq!(&second[0..8], &0xEFBEADDEBEBAFECAu64.to_le_bytes());
        mq.read_advance().unwrap();

        mq.close(true).unwrap();
    }

    #[test]
    fn full_queue_surfaces_nospace() {
        let name = unique_name("full");
        // object_count=2 means exactly one usable slot (one is always
        // wasted to disambiguate empty/full).
        let mq = MegaQueue::open(OpenMode::CreateOrOpen, &name, 64, 2).unwrap();
        mq.next_slot().unwrap();
        mq.advance().unwrap();
        assert_eq!(mq.advance().unwrap_err(), Error::NoSpace);
        mq.close(true).unwrap();
    }

    #[test]
    fn separate_read_and_delete_cursors_track_independently() {
        let name = unique_name("reclaim");
        let mq = MegaQueue::open(OpenMode::CreateOrOpen, &name, 32, 8).unwrap();

        mq.next_slot().unwrap();
        mq.advance().unwrap();
        mq.next_slot().unwrap();
        mq.advance().unwrap();

        mq.read_only_advance().unwrap();
        // delete hasn't moved, so reclaiming the first slot is still valid.
        mq.delete_advance().unwrap();
        assert_eq!(mq.delete_advance().unwrap_err(), Error::Empty);

        mq.close(true).unwrap();
    }

    #[test]
    fn opening_existing_with_mismatched_object_count_is_invalid() {
        let name = unique_name("mismatch");
        let mq = MegaQueue::open(OpenMode::CreateExclusive, &name, 64, 8).unwrap();
        let reopen = MegaQueue::open(OpenMode::OpenExisting, &name, 64, 4);
        assert!(reopen.is_err());
        mq.close(true).unwrap();
    }
}
