//! Append-only sequence variants.
//!
//! All variants share one contract: `push` appends a non-sentinel value
//! exactly once, `size` is an advisory monotone count, and iteration is a
//! weakly consistent snapshot in physical slot order that stops at the
//! first sentinel it meets. They differ in how the backing storage grows
//! and, above all, in how a replaced buffer is reclaimed:
//!
//! - [`FlipVec`]: copy-on-grow, old buffers retired through a cyclic
//!   counter pair.
//! - [`HazardVec`]: copy-on-grow, old buffers retired through per-reader
//!   hazard cells.
//! - [`PagedVec`]: chained fixed-size pages, nothing to reclaim.
//!
//! The traits in [`traits`] tie the variants together so that callers (and
//! the keyed map) can stay generic over the discipline.
//!
//! Lifecycle: construction returns an owned value and `Drop` takes
//! exclusive access, so both ends are single-threaded by construction.
//! Everything in between is a shared-reference operation that must be, and
//! is, safe under arbitrary interleavings of producers and readers.

#[cfg(any(feature = "flip", feature = "hazard"))]
use crossbeam::atomic::AtomicCell;

#[cfg(any(feature = "flip", feature = "hazard"))]
use crate::Word;

#[cfg(feature = "bounded")]
pub mod bounded;
#[cfg(feature = "flip")]
pub mod flip;
#[cfg(feature = "hazard")]
pub mod hazard;
#[cfg(feature = "paged")]
pub mod paged;

#[cfg(feature = "arena")]
pub mod arena;

pub mod traits;

pub mod prelude;

#[cfg(feature = "bounded")]
pub use bounded::BoundedVec;
#[cfg(feature = "flip")]
pub use flip::FlipVec;
#[cfg(feature = "hazard")]
pub use hazard::HazardVec;
#[cfg(feature = "paged")]
pub use paged::{HeapPages, Page, PageSource, PagedVec};

#[cfg(feature = "arena")]
pub use arena::PageArena;

/// Allocates `slots` sentinel-filled cells and leaks them to a raw pointer.
///
/// The buffer must be returned to [`free_slots`] with the same length.
#[cfg(any(feature = "flip", feature = "hazard"))]
pub(crate) fn alloc_slots<T: Word>(slots: usize) -> *mut AtomicCell<T> {
    let buffer: Box<[AtomicCell<T>]> = (0..slots).map(|_| AtomicCell::new(T::SENTINEL)).collect();
    Box::into_raw(buffer) as *mut AtomicCell<T>
}

/// Reconstitutes and drops a buffer produced by [`alloc_slots`].
///
/// Caller guarantees `pointer` came from `alloc_slots(slots)` and that no
/// reader or writer can still reach it.
#[cfg(any(feature = "flip", feature = "hazard"))]
pub(crate) unsafe fn free_slots<T: Word>(pointer: *mut AtomicCell<T>, slots: usize) {
    drop(Box::from_raw(std::ptr::slice_from_raw_parts_mut(
        pointer, slots,
    )));
}

#[cfg(test)]
mod tests;
