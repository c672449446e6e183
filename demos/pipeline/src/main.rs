//! pipeline
//!
//! Two worker-pool threads wired together: a producer that carves a
//! scratch cell from a `LogAlloc` arena, serializes a counter into it,
//! copies that into a `MegaQueue` slot and frees the cell, and a
//! consumer on a second thread that drains the same queue and logs what
//! it reads. Exercises all three core pieces through the same `Pool`.
//!
//! Usage:
//!     pipeline [object_count]
//!
//! The queue is named after the process id, so concurrent runs don't
//! collide; `Ctrl-C` triggers a clean shutdown. The shared-memory
//! segment is left behind for inspection (the demo never calls
//! `close(unlink: true)`) — remove `/dev/shm/megaqueue_pipeline_<pid>`
//! by hand if you want it gone.

use std::sync::atomic::{AtomicBool, Ordering};

use dataplane_core::{ddebug, dinfo, dwarn};
use dataplane_error::{Error, Result};
use logalloc::LogAlloc;
use megaqueue::{MegaQueue, OpenMode};
use workerpool::{Endpoint, Pool};

const OBJECT_SIZE: usize = 64;
const SCRATCH_CELLS: usize = 256;

static RUNNING: AtomicBool = AtomicBool::new(true);

struct ProducerEndpoint {
    scratch: LogAlloc,
    queue: MegaQueue,
    counter: u64,
}

impl Endpoint for ProducerEndpoint {
    fn startup(&mut self) -> Result<()> {
        dinfo!("pipeline: producer online");
        Ok(())
    }

    fn poll(&mut self, wait_us: &mut u32) -> Result<()> {
        let cell = match self.scratch.alloc(OBJECT_SIZE) {
            Ok(cell) => cell,
            Err(Error::NoMem { .. }) => {
                *wait_us = 1_000;
                return Ok(());
            }
            Err(err) => return Err(err),
        };

        unsafe {
            std::ptr::write(cell.as_ptr() as *mut u64, self.counter);
        }

        match self.queue.next_slot() {
            Ok(slot) => {
                unsafe {
                    std::ptr::copy_nonoverlapping(cell.as_ptr(), slot.as_mut_ptr(), OBJECT_SIZE);
                }
                self.queue.advance()?;
                self.scratch.free(cell)?;
                self.counter += 1;
                *wait_us = 200;
            }
            Err(Error::NoSpace) => {
                self.scratch.free(cell)?;
                *wait_us = 2_000;
            }
            Err(err) => {
                self.scratch.free(cell)?;
                return Err(err);
            }
        }

        Ok(())
    }

    fn shutdown(&mut self) {
        dinfo!("pipeline: producer shutting down, produced {} records", self.counter);
    }
}

struct ConsumerEndpoint {
    queue: MegaQueue,
    consumed: u64,
}

impl Endpoint for ConsumerEndpoint {
    fn startup(&mut self) -> Result<()> {
        dinfo!("pipeline: consumer online");
        Ok(())
    }

    fn poll(&mut self, wait_us: &mut u32) -> Result<()> {
        let record = match self.queue.read_next_slot() {
            Ok(slot) => slot,
            Err(Error::Empty) => {
                *wait_us = 1_000;
                return Ok(());
            }
            Err(err) => return Err(err),
        };

        let value = u64::from_ne_bytes(record[0..8].try_into().unwrap());
        ddebug!("pipeline: consumed counter={value}");
        self.queue.read_advance()?;
        self.consumed += 1;
        *wait_us = 200;
        Ok(())
    }

    fn shutdown(&mut self) {
        dinfo!("pipeline: consumer shutting down, consumed {} records", self.consumed);
    }
}

fn main() {
    let args: Vec<String> = std::env::args().collect();
    let object_count: usize = args.get(1).and_then(|s| s.parse().ok()).unwrap_or(1024);

    unsafe {
        libc::signal(libc::SIGINT, handle_sigint as usize);
        libc::signal(libc::SIGTERM, handle_sigint as usize);
    }

    let pid = std::process::id();
    let name = format!("pipeline_{pid}");

    dinfo!("pipeline: creating megaqueue '{name}' ({OBJECT_SIZE}x{object_count})");
    let producer_queue = MegaQueue::open(OpenMode::CreateExclusive, &name, OBJECT_SIZE, object_count)
        .expect("failed to create megaqueue");
    let consumer_queue = MegaQueue::open(OpenMode::OpenExisting, &name, OBJECT_SIZE, object_count)
        .expect("failed to attach to megaqueue");

    let scratch = LogAlloc::new(OBJECT_SIZE, SCRATCH_CELLS).expect("failed to create scratch arena");

    let mut pool = Pool::new();
    let producer_thread = pool.add_thread(None).expect("failed to start producer thread");
    let consumer_thread = pool.add_thread(None).expect("failed to start consumer thread");

    pool.add_endpoint(
        producer_thread,
        Box::new(ProducerEndpoint { scratch, queue: producer_queue, counter: 0 }),
    )
    .expect("failed to hand off producer");
    pool.add_endpoint(
        consumer_thread,
        Box::new(ConsumerEndpoint { queue: consumer_queue, consumed: 0 }),
    )
    .expect("failed to hand off consumer");

    while RUNNING.load(Ordering::Relaxed) {
        std::thread::sleep(std::time::Duration::from_millis(200));
    }

    dinfo!("pipeline: shutting down");
    pool.shutdown();
    for _ in 0..200 {
        match pool.destroy() {
            Ok(()) => break,
            Err(_) => std::thread::sleep(std::time::Duration::from_millis(5)),
        }
    }
    if !pool.thread_ids().is_empty() {
        dwarn!("pipeline: worker threads did not drain in time, exiting anyway");
    }
}

extern "C" fn handle_sigint(_sig: libc::c_int) {
    RUNNING.store(false, Ordering::Relaxed);
}
