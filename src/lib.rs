//! Lock-free, append-only, growable containers for small integral values.
//!
//! The crate provides one abstract shape, a multi-producer multi-consumer
//! sequence that only ever grows, under several concurrency disciplines,
//! plus a fixed-bucket map of such sequences. The hard part is not the
//! append itself (a single atomic reservation) but reclaiming the backing
//! storage when an append has to replace it while other threads are still
//! iterating. Each variant answers that differently:
//!
//! - [`sequence::FlipVec`] reallocates and copies, retiring the old buffer
//!   through a pair of reference counters in cyclic roles.
//! - [`sequence::HazardVec`] reallocates and copies, stalling the writer
//!   until no reader-published hazard cell names the old buffer.
//! - [`sequence::PagedVec`] never copies: it links fixed-size pages and
//!   walks the chain, so nothing is ever reclaimed before drop.
//! - [`sequence::BoundedVec`] never grows: a fixed budget allocated up
//!   front, for workloads that know their total element count.
//! - [`map::SequenceMap`] shards any of the above by a small integer key.
//!
//! Iteration everywhere is a *weakly consistent snapshot*: values pushed
//! before the iterator was created are seen, in slot order; an in-flight
//! push may be missed; the reserved-value sentinel is never yielded.
//! Callers that need completeness repeat the pass until it stops growing
//! (see `Snapshot::converged` in the sequence prelude).

pub mod reclaim;
pub mod sequence;

#[cfg(feature = "map")]
pub mod map;

pub use sequence::prelude;

/// Element contract for every container in this crate.
///
/// A `Word` is a plain machine word (at least 32 bits wide in the provided
/// implementations) with one reserved value, [`Word::SENTINEL`], that marks
/// a slot as *not yet written*. The sentinel must never be pushed; doing so
/// is a contract violation and panics.
///
/// The sentinel is a compile-time property of the element type. The stock
/// implementations (`u32`, `u64`, `usize`) use zero; a payload that needs
/// zero as a legal value can wrap itself in a newtype and pick another
/// sentinel:
///
/// ```
/// use accrete::Word;
///
/// #[derive(Clone, Copy, PartialEq, Eq)]
/// struct Lit(u32);
///
/// impl Word for Lit {
///     const SENTINEL: Self = Lit(u32::MAX);
/// }
/// ```
pub trait Word: Copy + Eq + Send + Sync + 'static {
    /// The reserved "slot not yet written" marker. Never a valid payload.
    const SENTINEL: Self;
}

impl Word for u32 {
    const SENTINEL: Self = 0;
}

impl Word for u64 {
    const SENTINEL: Self = 0;
}

impl Word for usize {
    const SENTINEL: Self = 0;
}

/// Wire format selector for the snapshot codec (see the `Bincode` trait in
/// the sequence prelude).
#[derive(Clone)]
pub enum BincodeConfiguration {
    /// The current bincode default: variable-width integers.
    Standard,
    /// The pre-2.0 layout: fixed-width little-endian integers.
    Legacy,
}
