//! Cache-line alignment helpers.
//!
//! MegaQueue cursors and the worker-thread death flag all need to live on
//! their own cache line to avoid false sharing between producer, consumer,
//! and reclaimer.

/// Cache-line size assumed for alignment purposes. Correct for essentially
/// every x86_64 and aarch64 target this workspace runs on.
pub const CACHE_LINE_SIZE: usize = 64;

/// Pads `T` out to a full cache line so that adjacent instances never share
/// one.
#[repr(C, align(64))]
#[derive(Debug, Default)]
pub struct CachePadded<T>(pub T);

impl<T> CachePadded<T> {
    pub const fn new(value: T) -> Self {
        CachePadded(value)
    }
}

impl<T> std::ops::Deref for CachePadded<T> {
    type Target = T;

    fn deref(&self) -> &T {
        &self.0
    }
}

impl<T> std::ops::DerefMut for CachePadded<T> {
    fn deref_mut(&mut self) -> &mut T {
        &mut self.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicU64;

    #[test]
    fn pads_to_cache_line() {
        assert_eq!(std::mem::size_of::<CachePadded<AtomicU64>>(), CACHE_LINE_SIZE);
        assert_eq!(std::mem::align_of::<CachePadded<AtomicU64>>(), CACHE_LINE_SIZE);
    }
}
