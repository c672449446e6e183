//! Unified error taxonomy shared by `logalloc`, `megaqueue`, and `workerpool`.
//!
//! A single flat enum, no heap allocation, no boxed context. Each variant
//! carries whatever scalar detail a caller or test might reasonably want to
//! assert on. Modeled on `KsvcError` rather than a multi-representation
//! error crate — there is no per-call-site-metrics need here, just a
//! result code and, occasionally, a number.

use std::fmt;

/// The kind of failure. `Ok` is not a variant — success is `Result::Ok(T)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Error {
    /// Out of resources: the allocator or a full queue on the producer side.
    NoMem {
        /// Cells requested.
        requested_cells: u32,
        /// Cells available to satisfy the request.
        available_cells: u32,
    },
    /// Contract violation in the caller (bad argument).
    BadArgs(&'static str),
    /// A key or id did not resolve to a known entity.
    NotFound,
    /// Contention or overflow: refcount at max, handoff ring full, thread
    /// still running on destroy.
    Busy,
    /// A state or argument invariant was violated.
    Invalid(&'static str),
    /// Queue empty on the consumer side.
    Empty,
    /// Ring full.
    NoSpace,
    /// Entity already exists.
    Exist,
    /// Entity is not of the expected kind.
    NotEntity,
    /// Operation already completed; further calls are no-ops or errors.
    Done,
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NoMem { requested_cells, available_cells } => write!(
                f,
                "out of memory: requested {requested_cells} cells, {available_cells} available"
            ),
            Self::BadArgs(msg) => write!(f, "bad argument: {msg}"),
            Self::NotFound => write!(f, "not found"),
            Self::Busy => write!(f, "busy"),
            Self::Invalid(msg) => write!(f, "invalid: {msg}"),
            Self::Empty => write!(f, "empty"),
            Self::NoSpace => write!(f, "no space"),
            Self::Exist => write!(f, "already exists"),
            Self::NotEntity => write!(f, "not the expected entity"),
            Self::Done => write!(f, "done"),
        }
    }
}

impl std::error::Error for Error {}

/// Convenience alias used throughout the workspace.
pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_is_human_readable() {
        let e = Error::NoMem { requested_cells: 300, available_cells: 255 };
        assert_eq!(
            e.to_string(),
            "out of memory: requested 300 cells, 255 available"
        );
        assert_eq!(Error::Busy.to_string(), "busy");
    }

    #[test]
    fn variants_are_copy_and_eq() {
        let a = Error::BadArgs("x");
        let b = a;
        assert_eq!(a, b);
    }
}
