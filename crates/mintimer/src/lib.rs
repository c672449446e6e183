//! A small min-heap timer manager.
//!
//! One of these is meant to live inside a single poll loop (a worker
//! thread's own timer wheel, not a pool-wide shared scheduler), so there is
//! no internal locking — callers needing cross-thread access own that
//! synchronization themselves. Cancellation is lazy: a cancelled handle is
//! recorded in a side set and skipped when it eventually surfaces at the
//! top of the heap, rather than walked out of the heap directly.

use std::cmp::Ordering;
use std::collections::{BinaryHeap, HashSet};
use std::sync::atomic::{AtomicU64, Ordering as AtomicOrdering};

use dataplane_core::time::TimeSource;

/// Opaque identifier for an armed timer, used to cancel it later.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TimerHandle(u64);

struct Entry {
    deadline_us: u64,
    handle: TimerHandle,
}

/// Reverses the natural `Ord` on deadline so a max-heap (`BinaryHeap`'s only
/// mode) behaves as a min-heap: earliest deadline pops first. Ties break on
/// handle so expiry order is deterministic even for same-tick timers.
struct HeapEntry(Entry);

impl PartialEq for HeapEntry {
    fn eq(&self, other: &Self) -> bool {
        self.0.deadline_us == other.0.deadline_us && self.0.handle == other.0.handle
    }
}

impl Eq for HeapEntry {}

impl PartialOrd for HeapEntry {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for HeapEntry {
    fn cmp(&self, other: &Self) -> Ordering {
        match other.0.deadline_us.cmp(&self.0.deadline_us) {
            Ordering::Equal => other.0.handle.cmp(&self.0.handle),
            ord => ord,
        }
    }
}

/// A `BinaryHeap`-backed set of pending deadlines, ordered earliest-first.
pub struct TimerManager {
    heap: BinaryHeap<HeapEntry>,
    cancelled: HashSet<TimerHandle>,
    next_handle: AtomicU64,
}

impl TimerManager {
    pub fn new() -> Self {
        Self::with_capacity(16)
    }

    pub fn with_capacity(capacity: usize) -> Self {
        TimerManager {
            heap: BinaryHeap::with_capacity(capacity),
            cancelled: HashSet::new(),
            next_handle: AtomicU64::new(1),
        }
    }

    /// Arm a one-shot timer that expires at `deadline_us` on whatever clock
    /// the caller's `now_us()` values come from.
    pub fn arm_at(&mut self, deadline_us: u64) -> TimerHandle {
        let handle = TimerHandle(self.next_handle.fetch_add(1, AtomicOrdering::Relaxed));
        self.heap.push(HeapEntry(Entry { deadline_us, handle }));
        handle
    }

    /// Arm a one-shot timer `delay_us` microseconds from `time.now_us()`.
    pub fn arm_after(&mut self, time: &dyn TimeSource, delay_us: u64) -> TimerHandle {
        self.arm_at(time.now_us() + delay_us)
    }

    /// Cancel a still-pending timer. Returns `false` if the handle is
    /// unknown or has already fired. The heap entry itself is left in
    /// place and filtered out lazily when it would otherwise expire.
    pub fn cancel(&mut self, handle: TimerHandle) -> bool {
        self.cancelled.insert(handle)
    }

    /// Pop every timer whose deadline is `<= now_us`, skipping cancelled
    /// ones, and return their handles in expiry order.
    pub fn pop_expired(&mut self, now_us: u64) -> Vec<TimerHandle> {
        let mut expired = Vec::new();

        while let Some(top) = self.heap.peek() {
            if top.0.deadline_us > now_us {
                break;
            }
            let entry = self.heap.pop().unwrap().0;
            if self.cancelled.remove(&entry.handle) {
                continue;
            }
            expired.push(entry.handle);
        }

        if self.heap.is_empty() {
            self.cancelled.clear();
        }

        expired
    }

    /// The next deadline due to fire, ignoring lazily-cancelled entries
    /// still sitting at the top of the heap.
    pub fn next_deadline(&mut self) -> Option<u64> {
        while let Some(top) = self.heap.peek() {
            if self.cancelled.contains(&top.0.handle) {
                let entry = self.heap.pop().unwrap().0;
                self.cancelled.remove(&entry.handle);
                continue;
            }
            return Some(top.0.deadline_us);
        }
        None
    }

    /// Number of timers still pending, not counting ones cancelled but not
    /// yet cleaned out of the heap.
    pub fn len(&self) -> usize {
        self.heap.len().saturating_sub(self.cancelled.len())
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Default for TimerManager {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use dataplane_core::time::FakeTimeSource;

    #[test]
    fn fires_in_deadline_order_regardless_of_arm_order() {
        let mut mgr = TimerManager::new();
        let c = mgr.arm_at(300);
        let a = mgr.arm_at(100);
        let b = mgr.arm_at(200);

        let expired = mgr.pop_expired(1_000);
        assert_eq!(expired, vec![a, b, c]);
    }

    #[test]
    fn only_due_timers_pop() {
        let mut mgr = TimerManager::new();
        let soon = mgr.arm_at(50);
        let later = mgr.arm_at(500);

        let expired = mgr.pop_expired(100);
        assert_eq!(expired, vec![soon]);
        assert_eq!(mgr.len(), 1);

        let expired = mgr.pop_expired(1_000);
        assert_eq!(expired, vec![later]);
    }

    #[test]
    fn cancelled_timer_never_surfaces() {
        let mut mgr = TimerManager::new();
        let handle = mgr.arm_at(10);
        assert!(mgr.cancel(handle));
        assert_eq!(mgr.len(), 0);

        let expired = mgr.pop_expired(1_000);
        assert!(expired.is_empty());
    }

    #[test]
    fn cancel_is_idempotent_and_reports_first_cancel_only() {
        let mut mgr = TimerManager::new();
        let handle = mgr.arm_at(10);
        assert!(mgr.cancel(handle));
        assert!(!mgr.cancel(handle));
    }

    #[test]
    fn next_deadline_skips_lazily_cancelled_entries() {
        let mut mgr = TimerManager::new();
        let first = mgr.arm_at(10);
        mgr.arm_at(20);
        mgr.cancel(first);

        assert_eq!(mgr.next_deadline(), Some(20));
    }

    #[test]
    fn arm_after_uses_the_given_clock() {
        let clock = FakeTimeSource::new(1_000);
        let mut mgr = TimerManager::new();
        let handle = mgr.arm_after(&clock, 500);

        assert!(mgr.pop_expired(1_400).is_empty());
        clock.advance_ns(500_000);
        assert_eq!(mgr.pop_expired(clock.now_us()), vec![handle]);
    }

    #[test]
    fn heap_cleans_up_cancelled_set_once_drained() {
        let mut mgr = TimerManager::new();
        for _ in 0..10 {
            let handle = mgr.arm_at(1);
            mgr.cancel(handle);
        }
        assert!(mgr.pop_expired(1_000).is_empty());
        assert_eq!(mgr.cancelled.len(), 0);
    }
}
