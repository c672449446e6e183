//! logger-endpoint
//!
//! Attaches to (or creates) a MegaQueue and drains it from a single
//! worker-pool thread, logging each record through the dataplane's
//! leveled logging macros. A thin application of the worker pool, as
//! opposed to a standalone consumer loop, so it doubles as a smoke test
//! for `Endpoint` adoption and shutdown.
//!
//! Usage:
//!     logger-endpoint <name> [object_size] [object_count]
//!
//! Pair with a producer writing to the same shared-memory segment, e.g.
//! the `pipeline` demo, or a test harness calling `next_slot`/`advance`
//! directly.

use std::sync::atomic::{AtomicBool, Ordering};

use dataplane_core::{dinfo, dwarn};
use dataplane_error::{Error, Result};
use megaqueue::{MegaQueue, OpenMode};
use workerpool::{Endpoint, Pool};

static RUNNING: AtomicBool = AtomicBool::new(true);

struct DrainEndpoint {
    queue: MegaQueue,
    drained: u64,
}

impl Endpoint for DrainEndpoint {
    fn startup(&mut self) -> Result<()> {
        dinfo!("logger-endpoint: attached, draining {} objects/slot", self.queue.object_size());
        Ok(())
    }

    fn poll(&mut self, wait_us: &mut u32) -> Result<()> {
        loop {
            let record = match self.queue.read_next_slot() {
                Ok(slot) => slot,
                Err(Error::Empty) => {
                    *wait_us = 2_000;
                    return Ok(());
                }
                Err(err) => return Err(err),
            };
            dinfo!("logger-endpoint: record #{}: {} bytes", self.drained, record.len());
            self.queue.read_advance()?;
            self.drained += 1;
        }
    }

    fn shutdown(&mut self) {
        dinfo!("logger-endpoint: shutting down after {} records", self.drained);
    }
}

fn main() {
    let args: Vec<String> = std::env::args().collect();
    let name = args.get(1).cloned().unwrap_or_else(|| "demo_logger".to_string());
    let object_size: usize = args.get(2).and_then(|s| s.parse().ok()).unwrap_or(128);
    let object_count: usize = args.get(3).and_then(|s| s.parse().ok()).unwrap_or(4096);

    unsafe {
        libc::signal(libc::SIGINT, handle_sigint as usize);
        libc::signal(libc::SIGTERM, handle_sigint as usize);
    }

    dinfo!("logger-endpoint: opening megaqueue '{name}' ({object_size}x{object_count})");
    let queue = MegaQueue::open(OpenMode::CreateOrOpen, &name, object_size, object_count)
        .expect("failed to open megaqueue");

    let mut pool = Pool::new();
    let thread_id = pool.add_thread(None).expect("failed to start worker thread");
    pool.add_endpoint(thread_id, Box::new(DrainEndpoint { queue, drained: 0 }))
        .expect("failed to hand off endpoint");

    while RUNNING.load(Ordering::Relaxed) {
        std::thread::sleep(std::time::Duration::from_millis(100));
    }

    dinfo!("logger-endpoint: shutting down");
    pool.shutdown();
    for _ in 0..200 {
        match pool.destroy() {
            Ok(()) => break,
            Err(_) => std::thread::sleep(std::time::Duration::from_millis(5)),
        }
    }
    if !pool.thread_ids().is_empty() {
        dwarn!("logger-endpoint: worker thread did not drain in time, exiting anyway");
    }
}

extern "C" fn handle_sigint(_sig: libc::c_int) {
    RUNNING.store(false, Ordering::Relaxed);
}
