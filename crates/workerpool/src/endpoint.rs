//! The polymorphic unit of work a worker thread polls.
//!
//! Grounded in `work_endpoint_ops`'s `{startup, poll, shutdown}`
//! function-pointer triple, reimagined as a trait per the capability-table
//! design note: a `dyn Endpoint` plays the role the C source gives a
//! `struct work_endpoint` plus its vtable.

use dataplane_error::Result;

pub trait Endpoint: Send {
    /// Called once, right before the endpoint's first `poll`, from the
    /// owning worker thread. The endpoint is dropped without being added to
    /// the thread's list if this fails.
    fn startup(&mut self) -> Result<()> {
        Ok(())
    }

    /// Called repeatedly by the owning worker thread. `wait_us` is an
    /// out-parameter only — the thread resets it to 0 before every call, so
    /// an endpoint cannot read a prior call's value back through it. On
    /// return it should hold how long, in microseconds, the thread may wait
    /// before polling this endpoint again. Returning `Err` removes the
    /// endpoint from its thread and calls `shutdown`.
    fn poll(&mut self, wait_us: &mut u32) -> Result<()>;

    /// Called once when the endpoint is removed, whether due to a poll
    /// failure or the owning thread shutting down.
    fn shutdown(&mut self) {}
}
