use std::sync::atomic::{AtomicUsize, Ordering};

use crossbeam::atomic::AtomicCell;

use crate::Word;

/// ### -> `BoundedVec<T>` - fixed-capacity append-only vector.
///
/// The degenerate member of the family, for workloads that know their
/// total element count up front: one buffer allocated at construction,
/// never replaced, never grown. With no storage replacement there is
/// nothing to reclaim, so readers need no pin of any kind and an iterator
/// is nothing but a cursor over the slots.
///
/// `try_push` reserves a slot with a `fetch_add` and stores into it; a
/// reservation past the end means the vector is full and is reported as
/// `false` rather than trapping, since running out of a fixed budget is an
/// ordinary outcome, not a contract breach.
///
/// ### -> `Usage`
///
/// ```
/// use accrete::prelude::*;
///
/// let vec = BoundedVec::<u32>::new(3);
/// assert!(vec.try_push(1));
/// assert!(vec.try_push(2));
/// assert!(vec.try_push(3));
/// assert!(!vec.try_push(4));
///
/// assert_eq!(vec.iter().collect::<Vec<_>>(), vec![1, 2, 3]);
/// ```
pub struct BoundedVec<T: Word = u32> {
    slots: Box<[AtomicCell<T>]>,
    cursor: AtomicUsize,
}

impl<T: Word> BoundedVec<T> {
    /// Creates a vector that can hold exactly `capacity` elements.
    pub fn new(capacity: usize) -> Self {
        assert!(capacity > 0, "Capacity must be greater than zero!");
        Self {
            slots: (0..capacity).map(|_| AtomicCell::new(T::SENTINEL)).collect(),
            cursor: AtomicUsize::new(0),
        }
    }

    /// The fixed capacity.
    #[inline(always)]
    pub fn capacity(&self) -> usize {
        self.slots.len()
    }

    /// Advisory element count, capped at the capacity. Monotone.
    #[inline(always)]
    pub fn size(&self) -> usize {
        self.cursor.load(Ordering::Relaxed).min(self.slots.len())
    }

    /// Appends `value` if a slot is left; returns whether it was placed.
    ///
    /// Panics if `value` is the sentinel.
    pub fn try_push(&self, value: T) -> bool {
        assert!(value != T::SENTINEL, "The sentinel cannot be pushed!");
        let position = self.cursor.fetch_add(1, Ordering::Relaxed);
        if position >= self.slots.len() {
            return false;
        }
        self.slots[position].store(value);
        true
    }

    /// The value at `position`, or `None` while its store is still in
    /// flight or the position was never reserved.
    pub fn get(&self, position: usize) -> Option<T> {
        let value = self.slots.get(position)?.load();
        (value != T::SENTINEL).then_some(value)
    }

    /// Returns a snapshot walk: slot order, ending at the first sentinel.
    #[must_use = "Iterators must be consumed or dropped!"]
    pub fn iter(&self) -> Iter<'_, T> {
        Iter {
            slots: &self.slots,
            position: 0,
        }
    }
}

/// Snapshot walk over a [`BoundedVec`]. A plain borrow; there is no pin to
/// release.
pub struct Iter<'a, T: Word> {
    slots: &'a [AtomicCell<T>],
    position: usize,
}

impl<T: Word> Iterator for Iter<'_, T> {
    type Item = T;

    fn next(&mut self) -> Option<T> {
        let slot = self.slots.get(self.position)?;
        let value = slot.load();
        if value == T::SENTINEL {
            self.position = self.slots.len();
            return None;
        }
        self.position += 1;
        Some(value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::thread;

    #[test]
    fn fills_to_capacity_and_rejects_the_rest() {
        let vec = BoundedVec::<u32>::new(100);
        for value in 1..=100 {
            assert!(vec.try_push(value));
        }
        assert!(!vec.try_push(101));
        assert!(!vec.try_push(102));

        assert_eq!(vec.size(), 100);
        assert_eq!(vec.iter().collect::<Vec<_>>(), (1..=100).collect::<Vec<_>>());
        assert_eq!(vec.get(0), Some(1));
        assert_eq!(vec.get(99), Some(100));
        assert_eq!(vec.get(100), None);
    }

    #[test]
    fn concurrent_fill_places_each_accepted_value_once() {
        const WRITERS: usize = 8;
        const CAPACITY: usize = 10_000;

        let vec = Arc::new(BoundedVec::<u32>::new(CAPACITY));

        let mut handles = vec![];
        for writer in 1..=WRITERS as u32 {
            let vec = Arc::clone(&vec);
            handles.push(thread::spawn(move || {
                let mut accepted = 0usize;
                for _ in 0..2_000 {
                    if vec.try_push(writer) {
                        accepted += 1;
                    }
                }
                accepted
            }));
        }

        let accepted: usize = handles.into_iter().map(|h| h.join().unwrap()).sum();
        // 16_000 attempts against 10_000 slots: the capacity is exactly
        // exhausted and nothing is lost or doubled.
        assert_eq!(accepted, CAPACITY);
        assert_eq!(vec.iter().count(), CAPACITY);
        assert_eq!(vec.size(), CAPACITY);
    }

    #[test]
    #[should_panic(expected = "sentinel")]
    fn pushing_the_sentinel_traps() {
        let vec = BoundedVec::<u32>::new(4);
        vec.try_push(0);
    }
}
