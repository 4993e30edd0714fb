//! A fixed array of independent append-only sequences, indexed by a small
//! integer key.

use crate::sequence::traits::{Allocation, Sequence};

/// ### -> `SequenceMap<V>` - keyed family of append-only sequences.
///
/// One bucket per key `k` in `[0, len)`, sized at construction and never
/// resized. Every operation delegates to the addressed bucket and there
/// are no cross-bucket invariants, so contention and throughput scale in
/// the number of distinct keys: producers hitting different keys never
/// meet.
///
/// The bucket type carries the concurrency discipline. A hazard-backed map
/// needs the caller to thread reader ids through
/// [`iter`](Self::iter); the other variants accept and ignore the id, so
/// generic callers always pass one.
///
/// ### -> `Usage`
///
/// ```
/// use accrete::prelude::*;
///
/// let map: SequenceMap<PagedVec<u32, 64>> = SequenceMap::new(4, 100);
/// map.push(0, 7);
/// map.push(3, 9);
///
/// assert_eq!(map.iter(0, 0).collect::<Vec<_>>(), vec![7]);
/// assert_eq!(map.iter(3, 0).collect::<Vec<_>>(), vec![9]);
/// assert_eq!(map.iter(1, 0).count(), 0);
/// ```
pub struct SequenceMap<V> {
    buckets: Box<[V]>,
}

impl<V: Sequence> SequenceMap<V> {
    /// Creates a map of `keys` buckets, each sized for roughly
    /// `per_key_capacity` elements.
    pub fn new(keys: usize, per_key_capacity: usize) -> Self
    where
        V: Allocation,
    {
        Self::with_buckets(keys, |_| V::with_capacity(per_key_capacity))
    }

    /// Creates a map whose buckets come from `make`, for bucket types that
    /// need more than a capacity (arena-backed sequences, say).
    pub fn with_buckets(keys: usize, make: impl FnMut(usize) -> V) -> Self {
        assert!(keys > 0, "A map needs at least one key!");
        Self {
            buckets: (0..keys).map(make).collect(),
        }
    }

    /// Number of keys.
    #[inline(always)]
    pub fn len(&self) -> usize {
        self.buckets.len()
    }

    /// Direct access to a key's sequence.
    ///
    /// Panics if `key` is out of range.
    #[inline(always)]
    pub fn bucket(&self, key: usize) -> &V {
        assert!(
            key < self.buckets.len(),
            "Key {} out of range for {} buckets!",
            key,
            self.buckets.len()
        );
        &self.buckets[key]
    }

    /// Appends `value` under `key`.
    ///
    /// Panics if `key` is out of range or `value` is the sentinel.
    #[inline]
    pub fn push(&self, key: usize, value: V::Item) {
        self.bucket(key).push(value);
    }

    /// Advisory element count under `key`.
    #[inline]
    pub fn size(&self, key: usize) -> usize {
        self.bucket(key).size()
    }

    /// Starts a weakly consistent snapshot of `key`'s sequence on behalf
    /// of `reader`. The id is required by hazard-backed buckets and
    /// ignored by the others.
    #[must_use = "Iterators pin the backing storage and must be consumed or dropped!"]
    pub fn iter(&self, key: usize, reader: usize) -> V::Iter<'_> {
        self.bucket(key).iter_with(reader)
    }
}
