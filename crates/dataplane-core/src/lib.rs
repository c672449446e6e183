//! # dataplane-core
//!
//! Platform-agnostic building blocks shared by `logalloc`, `megaqueue`,
//! `workerpool`, and `mintimer`.
//!
//! ## Modules
//!
//! - `log` - kernel-style leveled logging macros
//! - `env` - environment-variable ambient configuration helpers
//! - `time` - monotonic time source abstraction
//! - `refcount` - atomic 8-bit acquire/release reference counting
//! - `cacheline` - cache-line padding and alignment constants

#![allow(dead_code)]

pub mod cacheline;
pub mod env;
pub mod log;
pub mod refcount;
pub mod time;

pub use cacheline::{CachePadded, CACHE_LINE_SIZE};
pub use refcount::{AtomicRefcount, IncResult};
pub use time::{FakeTimeSource, SystemTimeSource, TimeSource};
