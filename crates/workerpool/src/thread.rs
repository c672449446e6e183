//! A single CPU-pinned poll-loop worker.
//!
//! Directly grounded in `__work_thread_worker_func`: drain newly handed-off
//! endpoints, poll whichever are due, sleep for the smallest requested
//! wait, repeat until signalled to stop.

use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;

use crossbeam_queue::ArrayQueue;
use dataplane_core::env::env_get;
use dataplane_core::log::set_current_worker_id;
use dataplane_core::time::TimeSource;
use dataplane_core::{ddebug, dwarn};
use dataplane_error::{Error, Result};

use crate::affinity::pin_current_thread;
use crate::endpoint::Endpoint;

/// Matches `WORK_THREAD_MAX_QUEUED_ENDPOINTS` in the original offload pool.
/// Overridable per-process via `DATAPLANE_HANDOFF_CAPACITY`.
pub const DEFAULT_HANDOFF_CAPACITY: usize = 32;

const DEFAULT_MIN_WAIT_CEILING_US: u32 = 5_000;

fn handoff_capacity() -> usize {
    env_get("DATAPLANE_HANDOFF_CAPACITY", DEFAULT_HANDOFF_CAPACITY)
}

/// Overridable per-process via `DATAPLANE_MIN_WAIT_CEILING_US`.
fn min_wait_ceiling_us() -> u32 {
    env_get("DATAPLANE_MIN_WAIT_CEILING_US", DEFAULT_MIN_WAIT_CEILING_US)
}

#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WorkerState {
    StartingUp = 0,
    Running = 1,
    ShutdownRequested = 2,
    /// Reserved: no fast/forced shutdown path exists yet. Kept as a stable
    /// discriminant for when one is added.
    ShutdownForced = 3,
    Shutdown = 4,
}

impl WorkerState {
    fn from_u8(v: u8) -> Self {
        match v {
            0 => Self::StartingUp,
            1 => Self::Running,
            2 => Self::ShutdownRequested,
            3 => Self::ShutdownForced,
            _ => Self::Shutdown,
        }
    }
}

type Handoff = ArrayQueue<Box<dyn Endpoint>>;

pub struct WorkerThread {
    thread_id: u32,
    state: Arc<AtomicU8>,
    handoff: Arc<Handoff>,
    handle: Option<JoinHandle<()>>,
}

impl WorkerThread {
    pub(crate) fn spawn(
        thread_id: u32,
        cpu: Option<usize>,
        time_source: Arc<dyn TimeSource>,
    ) -> Result<Self> {
        let state = Arc::new(AtomicU8::new(WorkerState::StartingUp as u8));
        let handoff: Arc<Handoff> = Arc::new(ArrayQueue::new(handoff_capacity()));

        let thread_state = state.clone();
        let thread_handoff = handoff.clone();

        let handle = std::thread::Builder::new()
            .name(format!("workerpool-{thread_id}"))
            .spawn(move || {
                if let Some(cpu) = cpu {
                    if let Err(err) = pin_current_thread(cpu) {
                        dwarn!("workerpool: worker {thread_id} failed to pin to cpu {cpu}: {err}");
                    }
                }
                set_current_worker_id(thread_id);
                run_poll_loop(&thread_state, thread_handoff.as_ref(), time_source.as_ref());
            })
            .map_err(|_| Error::Invalid("failed to spawn worker thread"))?;

        Ok(WorkerThread {
            thread_id,
            state,
            handoff,
            handle: Some(handle),
        })
    }

    pub fn id(&self) -> u32 {
        self.thread_id
    }

    pub fn state(&self) -> WorkerState {
        WorkerState::from_u8(self.state.load(Ordering::Acquire))
    }

    /// Hand an endpoint off to this thread's poll loop. `NoSpace` if the
    /// handoff ring is momentarily full.
    pub fn add_endpoint(&self, endpoint: Box<dyn Endpoint>) -> Result<()> {
        self.handoff
            .push(endpoint)
            .map_err(|_| Error::NoSpace)
    }

    /// Request the thread stop after its current iteration. Does not join.
    pub fn shutdown(&self) {
        self.state
            .store(WorkerState::ShutdownRequested as u8, Ordering::Release);
    }

    /// Join the underlying OS thread if it has finished. `Busy` if it's
    /// still running.
    pub fn try_join(&mut self) -> Result<()> {
        if self.state() != WorkerState::Shutdown {
            return Err(Error::Busy);
        }
        if let Some(handle) = self.handle.take() {
            handle
                .join()
                .map_err(|_| Error::Invalid("worker thread panicked"))?;
        }
        Ok(())
    }
}

fn run_poll_loop(state: &AtomicU8, handoff: &Handoff, time: &dyn TimeSource) {
    let _ = state.compare_exchange(
        WorkerState::StartingUp as u8,
        WorkerState::Running as u8,
        Ordering::AcqRel,
        Ordering::Acquire,
    );

    let mut endpoints: Vec<(Box<dyn Endpoint>, u64)> = Vec::new();
    let wait_ceiling_us = min_wait_ceiling_us();
    let drain_cap = (handoff_capacity() / 2).max(1);

    while state.load(Ordering::Acquire) == WorkerState::Running as u8 {
        for _ in 0..drain_cap {
            let Some(mut ep) = handoff.pop() else {
                break;
            };
            match ep.startup() {
                Ok(()) => endpoints.push((ep, 0)),
                Err(err) => dwarn!("workerpool: endpoint startup failed, dropping: {err}"),
            }
        }

        let now = time.now_ns();
        let mut min_wait_us = wait_ceiling_us;
        let mut i = 0;
        while i < endpoints.len() {
            if endpoints[i].1 > now {
                i += 1;
                continue;
            }

            let mut wait_us = 0u32;
            let poll_result = endpoints[i].0.poll(&mut wait_us);
            match poll_result {
                Ok(()) => {
                    min_wait_us = min_wait_us.min(wait_us);
                    endpoints[i].1 = now + wait_us as u64 * 1_000;
                    i += 1;
                }
                Err(err) => {
                    dwarn!("workerpool: endpoint poll failed, removing: {err}");
                    let (mut ep, _) = endpoints.remove(i);
                    ep.shutdown();
                }
            }
        }

        if min_wait_us > 0 {
            std::thread::sleep(std::time::Duration::from_micros(min_wait_us as u64));
        }
    }

    ddebug!("workerpool: shutting down, draining {} endpoints", endpoints.len());
    for (mut ep, _) in endpoints.drain(..) {
        ep.shutdown();
    }

    state.store(WorkerState::Shutdown as u8, Ordering::Release);
}

#[cfg(test)]
mod tests {
    use super::*;
    use dataplane_core::time::SystemTimeSource;
    use std::sync::atomic::AtomicU32;

    struct CountingEndpoint {
        polls: Arc<AtomicU32>,
        fail_after: u32,
    }

    impl Endpoint for CountingEndpoint {
        fn poll(&mut self, wait_us: &mut u32) -> Result<()> {
            let count = self.polls.fetch_add(1, Ordering::SeqCst) + 1;
            *wait_us = 200;
            if count >= self.fail_after {
                return Err(Error::Done);
            }
            Ok(())
        }
    }

    #[test]
    fn worker_polls_adopted_endpoint_until_failure() {
        let worker = WorkerThread::spawn(1, None, Arc::new(SystemTimeSource)).unwrap();
        let polls = Arc::new(AtomicU32::new(0));
        worker
            .add_endpoint(Box::new(CountingEndpoint {
                polls: polls.clone(),
                fail_after: 3,
            }))
            .unwrap();

        std::thread::sleep(std::time::Duration::from_millis(50));
        worker.shutdown();

        let mut worker = worker;
        for _ in 0..100 {
            if worker.try_join().is_ok() {
                break;
            }
            std::thread::sleep(std::time::Duration::from_millis(5));
        }

        assert!(polls.load(Ordering::SeqCst) >= 3);
    }
}
