//! The two-byte cell header that precedes every payload in the arena.

use dataplane_core::AtomicRefcount;

/// `nr_cells == 0` means "free, extending to the end of the region" — the
/// allocator never needs to materialize a length for the common tail-free
/// run. `refcnt == 0` is free, `1..=254` live, `255` is the overflow trap
/// (never produced by normal `reference()` calls — `inc_if_live` refuses to
/// cross it).
#[repr(C)]
pub struct CellHeader {
    pub nr_cells: u8,
    pub refcnt: AtomicRefcount,
}

pub const HEADER_SIZE: usize = std::mem::size_of::<CellHeader>();

pub const REFCNT_OVERFLOW: u8 = 255;

const _: () = assert!(HEADER_SIZE == 2);

impl CellHeader {
    #[inline]
    pub fn is_sentinel(&self) -> bool {
        self.nr_cells == 0
    }

    #[inline]
    pub fn is_free(&self) -> bool {
        self.refcnt.get() == 0
    }
}
