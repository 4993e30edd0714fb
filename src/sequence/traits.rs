use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::{BincodeConfiguration, Word};

/// ### -> `Allocation Trait`.
///
/// Construction seam for the sequence variants that can be built from a
/// bare capacity. The keyed map uses it to fill its buckets.
///
/// `capacity` is a slot count for the copy-on-grow variants and a hint the
/// paged variant is free to ignore (its granularity is a page). It must be
/// greater than zero.
pub trait Allocation: Sized {
    /// Creates an empty sequence sized for roughly `capacity` elements.
    #[must_use = "Allocated sequences must serve a purpose!"]
    fn with_capacity(capacity: usize) -> Self;
}

/// ### -> `Sequence Trait`.
///
/// The common contract of every append-only variant in this crate. A
/// `Sequence` is shared by reference across producer and reader threads;
/// all three operations are safe under arbitrary interleavings.
///
/// - `push` appends exactly once and returns when the value is visible to
///   any iterator created strictly afterwards. Pushing
///   [`Word::SENTINEL`] panics.
/// - `size` is advisory and monotone. It may count reservations whose
///   store is still in flight; iteration is what handles that.
/// - `iter_with` materialises a weakly consistent snapshot: values appear
///   in physical slot order (reservation order, no cross-producer
///   ordering), each at most once, and the walk ends at the first
///   sentinel it meets. An in-flight push at the time of the call may be
///   missed entirely.
///
/// `reader` identifies the calling reader where the discipline needs it
/// (the hazard variant); the other variants ignore it.
pub trait Sequence: Send + Sync {
    /// Element type.
    type Item: Word;

    /// The snapshot handle. Dropping it releases whatever pin the
    /// discipline takes on the backing storage.
    type Iter<'a>: Iterator<Item = Self::Item>
    where
        Self: 'a;

    /// Appends `value`. Panics if `value` is the sentinel.
    fn push(&self, value: Self::Item);

    /// Advisory element count, monotone across calls.
    fn size(&self) -> usize;

    /// Starts a weakly consistent snapshot on behalf of `reader`.
    #[must_use = "Iterators pin the backing storage and must be consumed or dropped!"]
    fn iter_with(&self, reader: usize) -> Self::Iter<'_>;
}

/// ### -> `Snapshot Trait`.
///
/// One-shot and fixed-point materialisation on top of [`Sequence`].
///
/// A single [`snapshot`](Self::snapshot) can stop short of the pushed data:
/// a slot whose reservation it observes but whose store is still in flight
/// reads as sentinel and ends the walk. [`converged`](Self::converged) is
/// the prescribed answer: repeat the pass until two consecutive passes
/// agree. Every pass is a prefix of the physical slot sequence and written
/// slots never change, so two passes of equal length are identical and the
/// loop needs to compare nothing else.
///
/// Under quiescence `converged` returns every completed push. While
/// producers are still running it returns some fixed prefix, which is all
/// weak consistency promises.
pub trait Snapshot: Sequence {
    /// Collects one weakly consistent pass.
    #[must_use = "Snapshot output must serve a purpose!"]
    fn snapshot(&self, reader: usize) -> Vec<Self::Item> {
        self.iter_with(reader).collect()
    }

    /// Repeats [`snapshot`](Self::snapshot) until it stops growing and
    /// returns the fixed point.
    #[must_use = "Snapshot output must serve a purpose!"]
    fn converged(&self, reader: usize) -> Vec<Self::Item> {
        let mut previous = self.snapshot(reader);
        loop {
            let current = self.snapshot(reader);
            if current.len() == previous.len() {
                return current;
            }
            previous = current;
        }
    }
}

impl<S: Sequence + ?Sized> Snapshot for S {}

/// ### -> `Bincode Trait`.
///
/// Binary snapshot codec: a converged snapshot serialised through bincode,
/// and the reverse rebuild. [`BincodeConfiguration::Standard`] is the
/// bincode 2 default encoding; [`BincodeConfiguration::Legacy`] keeps the
/// pre-2.0 fixed-width layout for data written by older tooling.
///
/// Rebuilding replays the decoded values through `push`, so a payload that
/// contains the sentinel is rejected with an error rather than tripping
/// the push contract.
pub trait Bincode: Snapshot {
    /// Serialises a converged snapshot.
    #[must_use = "Bincode serialization output must serve a purpose!"]
    fn bincode(
        &self,
        reader: usize,
        configuration: &BincodeConfiguration,
    ) -> anyhow::Result<Vec<u8>>
    where
        Self::Item: Serialize,
    {
        let snapshot = self.converged(reader);
        let bytes = match configuration {
            BincodeConfiguration::Standard => {
                bincode::serde::encode_to_vec(&snapshot, bincode::config::standard())?
            }
            BincodeConfiguration::Legacy => {
                bincode::serde::encode_to_vec(&snapshot, bincode::config::legacy())?
            }
        };
        Ok(bytes)
    }

    /// Rebuilds a sequence from bytes produced by
    /// [`bincode`](Self::bincode).
    fn from_bincode(bytes: &[u8], configuration: &BincodeConfiguration) -> anyhow::Result<Self>
    where
        Self: Allocation,
        Self::Item: DeserializeOwned,
    {
        let values: Vec<Self::Item> = match configuration {
            BincodeConfiguration::Standard => {
                bincode::serde::decode_from_slice(bytes, bincode::config::standard())?.0
            }
            BincodeConfiguration::Legacy => {
                bincode::serde::decode_from_slice(bytes, bincode::config::legacy())?.0
            }
        };

        if values.iter().any(|value| *value == Self::Item::SENTINEL) {
            anyhow::bail!("Payload contains the sentinel and cannot be replayed!");
        }

        let sequence = Self::with_capacity(values.len().max(1));
        for value in values {
            sequence.push(value);
        }
        Ok(sequence)
    }
}

impl<S: Snapshot> Bincode for S {}
