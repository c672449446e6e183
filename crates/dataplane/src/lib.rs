//! # dataplane
//!
//! A lock-free dataplane for shuffling fixed-size records between threads
//! and processes with no locks on the hot path.
//!
//! ## Pieces
//!
//! - **[`logalloc`]**: a log-structured, reference-counted region allocator.
//!   Allocation is a bump-and-wrap over a ring of cells; freeing is a
//!   refcount decrement, no compaction, no free list.
//! - **[`megaqueue`]**: a cross-process single-producer/single-consumer ring
//!   backed by POSIX shared memory, for handing records between processes
//!   that don't share an address space.
//! - **[`workerpool`]**: CPU-pinned worker threads, each running a
//!   cooperative poll loop over a set of [`workerpool::Endpoint`]s handed to
//!   it through a small fixed-capacity ring.
//! - **[`mintimer`]**: a `BinaryHeap`-backed timer manager for endpoints that
//!   need to schedule their own future work; decoupled from the rest of the
//!   dataplane, needing only a time source and a heap.
//!
//! ## Architecture
//!
//! ```text
//! ┌───────────────────────────────────────────────────────────────┐
//! │                         workerpool::Pool                      │
//! │   ┌───────────────┐   ┌───────────────┐   ┌───────────────┐   │
//! │   │ WorkerThread 0│   │ WorkerThread 1│   │ WorkerThread N│   │
//! │   │ (pinned cpu0) │   │ (pinned cpu1) │   │ (pinned cpuN) │   │
//! │   │  endpoints[]  │   │  endpoints[]  │   │  endpoints[]  │   │
//! │   │  mintimer     │   │  mintimer     │   │  mintimer     │   │
//! │   └───────┬───────┘   └───────┬───────┘   └───────┬───────┘   │
//! └───────────┼───────────────────┼───────────────────┼───────────┘
//!             ▼                   ▼                   ▼
//!     ┌───────────────┐   ┌───────────────┐   ┌───────────────┐
//!     │   megaqueue   │   │   logalloc    │   │   megaqueue   │
//!     │  (shm ring)   │   │ (cell arena)  │   │  (shm ring)   │
//!     └───────────────┘   └───────────────┘   └───────────────┘
//! ```
//!
//! A typical producer endpoint carves a record out of a `LogAlloc` arena,
//! fills it in, and hands the pointer across a `MegaQueue` slot to a
//! consumer in another process; a typical consumer endpoint reads a slot,
//! processes it, and advances the queue's delete cursor once done with the
//! backing cells.

pub use dataplane_core::cacheline::CachePadded;
pub use dataplane_core::log::{self, current_worker_id, set_current_worker_id};
pub use dataplane_core::refcount::AtomicRefcount;
pub use dataplane_core::time::{FakeTimeSource, SystemTimeSource, TimeSource};
pub use dataplane_core::{ddebug, derror, dinfo, dtrace, dwarn};

pub use dataplane_error::{Error, Result};

pub use logalloc::{HeapParams, HugePageParams, LogAlloc, LogAllocParams};

pub use megaqueue::{MegaQueue, OpenMode};

pub use mintimer::{TimerHandle, TimerManager};

pub use workerpool::{Endpoint, Pool, WorkerState, WorkerThread, DEFAULT_HANDOFF_CAPACITY};
