//! Monotonic time source abstraction.
//!
//! `mintimer` and the worker pool's poll loop both need "now" in
//! nanoseconds; tests need to control it deterministically. `SystemTimeSource`
//! is the process-wide monotonic clock (cheap, `Instant`-based, like the
//! scheduler's own `now_ns`); `FakeTimeSource` lets tests fire timers without
//! sleeping.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::OnceLock;
use std::time::Instant;

pub trait TimeSource: Send + Sync {
    fn now_ns(&self) -> u64;

    fn now_us(&self) -> u64 {
        self.now_ns() / 1_000
    }

    fn now_ms(&self) -> u64 {
        self.now_ns() / 1_000_000
    }
}

/// Process-wide monotonic clock, relative to an internal start instant.
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemTimeSource;

impl TimeSource for SystemTimeSource {
    #[inline]
    fn now_ns(&self) -> u64 {
        static START: OnceLock<Instant> = OnceLock::new();
        let start = START.get_or_init(Instant::now);
        start.elapsed().as_nanos() as u64
    }
}

/// A manually advanced clock for deterministic timer tests.
#[derive(Debug, Default)]
pub struct FakeTimeSource {
    now_ns: AtomicU64,
}

impl FakeTimeSource {
    pub const fn new(start_ns: u64) -> Self {
        FakeTimeSource {
            now_ns: AtomicU64::new(start_ns),
        }
    }

    pub fn advance_ns(&self, delta: u64) {
        self.now_ns.fetch_add(delta, Ordering::Relaxed);
    }

    pub fn set_ns(&self, value: u64) {
        self.now_ns.store(value, Ordering::Relaxed);
    }
}

impl TimeSource for FakeTimeSource {
    #[inline]
    fn now_ns(&self) -> u64 {
        self.now_ns.load(Ordering::Relaxed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn system_time_is_monotonic() {
        let src = SystemTimeSource;
        let t1 = src.now_ns();
        std::thread::sleep(std::time::Duration::from_micros(50));
        let t2 = src.now_ns();
        assert!(t2 > t1);
    }

    #[test]
    fn fake_time_only_moves_when_told() {
        let src = FakeTimeSource::new(1_000);
        assert_eq!(src.now_ns(), 1_000);
        src.advance_ns(500);
        assert_eq!(src.now_ns(), 1_500);
        assert_eq!(src.now_us(), 1);
    }
}
