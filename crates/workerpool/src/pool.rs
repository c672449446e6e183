//! The set of worker threads keyed by a monotonically issued thread id.
//!
//! Grounded in `work_pool_create`/`work_pool_add_thread`/
//! `work_pool_add_endpoint`/`work_pool_shutdown`/`work_pool_destroy`.

use std::collections::HashMap;
use std::sync::Arc;

use dataplane_core::dinfo;
use dataplane_core::time::{SystemTimeSource, TimeSource};
use dataplane_error::{Error, Result};

use crate::endpoint::Endpoint;
use crate::thread::WorkerThread;

pub struct Pool {
    threads: HashMap<u32, WorkerThread>,
    last_thread_id: u32,
    time_source: Arc<dyn TimeSource>,
}

impl Pool {
    pub fn new() -> Self {
        Self::with_time_source(Arc::new(SystemTimeSource))
    }

    pub fn with_time_source(time_source: Arc<dyn TimeSource>) -> Self {
        Pool {
            threads: HashMap::new(),
            last_thread_id: 1,
            time_source,
        }
    }

    /// Start a new worker thread pinned to `cpu`, returning its id. Ids are
    /// issued starting at 1 and never reused.
    pub fn add_thread(&mut self, cpu: Option<usize>) -> Result<u32> {
        let thread_id = self.last_thread_id;
        let worker = WorkerThread::spawn(thread_id, cpu, self.time_source.clone())?;
        self.threads.insert(thread_id, worker);
        self.last_thread_id += 1;
        dinfo!("workerpool: started thread {thread_id}" );
        Ok(thread_id)
    }

    /// Hand an endpoint to the named thread's poll loop.
    pub fn add_endpoint(&self, thread_id: u32, endpoint: Box<dyn Endpoint>) -> Result<()> {
        let worker = self.threads.get(&thread_id).ok_or(Error::NotFound)?;
        worker.add_endpoint(endpoint)
    }

    /// Signal every thread to stop after its current iteration. Does not
    /// join — call `destroy` (possibly repeatedly) to reclaim them.
    pub fn shutdown(&self) {
        for worker in self.threads.values() {
            worker.shutdown();
        }
    }

    /// Best-effort teardown: join every thread that has finished shutting
    /// down and drop it from the pool. Returns `Busy` if any requested
    /// thread hasn't finished yet — the caller decides whether/how to
    /// retry, rather than this call spinning internally.
    pub fn destroy(&mut self) -> Result<()> {
        let finished: Vec<u32> = self
            .threads
            .iter_mut()
            .filter_map(|(&id, worker)| worker.try_join().ok().map(|_| id))
            .collect();

        for id in &finished {
            self.threads.remove(id);
        }

        if self.threads.is_empty() {
            Ok(())
        } else {
            Err(Error::Busy)
        }
    }

    pub fn thread_ids(&self) -> Vec<u32> {
        self.threads.keys().copied().collect()
    }
}

impl Default for Pool {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    struct OneShotEndpoint {
        started: Arc<std::sync::atomic::AtomicBool>,
    }

    impl Endpoint for OneShotEndpoint {
        fn startup(&mut self) -> Result<()> {
            self.started.store(true, Ordering::SeqCst);
            Ok(())
        }

        fn poll(&mut self, wait_us: &mut u32) -> Result<()> {
            *wait_us = 1_000;
            Ok(())
        }
    }

    #[test]
    fn thread_ids_start_at_one_and_increase() {
        let mut pool = Pool::new();
        let a = pool.add_thread(None).unwrap();
        let b = pool.add_thread(None).unwrap();
        assert_eq!(a, 1);
        assert_eq!(b, 2);
        pool.shutdown();
        for _ in 0..200 {
            if pool.destroy().is_ok() {
                return;
            }
            std::thread::sleep(std::time::Duration::from_millis(5));
        }
        panic!("pool did not drain in time");
    }

    #[test]
    fn add_endpoint_to_unknown_thread_is_not_found() {
        let pool = Pool::new();
        let ep = Box::new(OneShotEndpoint {
            started: Arc::new(std::sync::atomic::AtomicBool::new(false)),
        });
        assert_eq!(pool.add_endpoint(99, ep).unwrap_err(), Error::NotFound);
    }

    #[test]
    fn adopted_endpoint_receives_startup_call() {
        let mut pool = Pool::new();
        let id = pool.add_thread(None).unwrap();
        let started = Arc::new(std::sync::atomic::AtomicBool::new(false));
        pool.add_endpoint(id, Box::new(OneShotEndpoint { started: started.clone() }))
            .unwrap();

        std::thread::sleep(std::time::Duration::from_millis(50));
        assert!(started.load(Ordering::SeqCst));

        pool.shutdown();
        for _ in 0..200 {
            if pool.destroy().is_ok() {
                break;
            }
            std::thread::sleep(std::time::Duration::from_millis(5));
        }
        let _ = AtomicU32::new(0);
    }
}
