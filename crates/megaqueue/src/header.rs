//! The page-resident superblock at the front of every MegaQueue segment.

use std::sync::atomic::AtomicU64;

use dataplane_core::CachePadded;

/// Matches the page size assumed by `open`'s layout math. Correct for
/// every Linux target this workspace ships to.
pub const PAGE_SIZE: usize = 4096;

/// Cross-process superblock. Each cursor lives on its own cache line so the
/// producer, reader, and reclaimer — who may be in three different
/// processes — never false-share a line.
#[repr(C, align(4096))]
pub struct MegaQueueHeader {
    pub head: CachePadded<AtomicU64>,
    pub tail: CachePadded<AtomicU64>,
    pub delete: CachePadded<AtomicU64>,
    pub producer_pid: CachePadded<AtomicU64>,
    pub object_size: CachePadded<AtomicU64>,
    pub object_count: CachePadded<AtomicU64>,
}

const _: () = assert!(std::mem::size_of::<MegaQueueHeader>() <= PAGE_SIZE);
