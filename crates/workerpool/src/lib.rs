//! # workerpool
//!
//! A pool of CPU-pinned, cooperatively scheduled worker threads, each
//! running a poll loop over a set of [`Endpoint`]s. Endpoints are handed to
//! a specific thread through a small fixed-capacity handoff ring so a
//! caller on any thread can inject work without touching the target
//! thread's private endpoint list directly.

#![allow(dead_code)]

mod affinity;
mod endpoint;
mod pool;
mod thread;

pub use endpoint::Endpoint;
pub use pool::Pool;
pub use thread::{WorkerState, WorkerThread, DEFAULT_HANDOFF_CAPACITY};
