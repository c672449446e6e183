//! Thin CPU affinity wrapper.
//!
//! Not a full CPU-mask abstraction (multi-core sets, NUMA-aware config
//! loading) — just enough to pin the calling thread to one core, grounded
//! in the `cpu_set_t`/`sched_setaffinity` pattern from the original CPU
//! mask utility. A richer mask is an external collaborator, out of scope
//! here.

use dataplane_error::{Error, Result};

/// Pin the calling thread to a single CPU core.
pub fn pin_current_thread(cpu: usize) -> Result<()> {
    unsafe {
        let mut set: libc::cpu_set_t = std::mem::zeroed();
        libc::CPU_ZERO(&mut set);
        libc::CPU_SET(cpu, &mut set);

        let rc = libc::sched_setaffinity(0, std::mem::size_of::<libc::cpu_set_t>(), &set);
        if rc != 0 {
            return Err(Error::Invalid("sched_setaffinity failed for requested core"));
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pin_to_current_cpu_succeeds() {
        let cpu = unsafe { libc::sched_getcpu() };
        assert!(cpu >= 0);
        pin_current_thread(cpu as usize).unwrap();
    }
}
