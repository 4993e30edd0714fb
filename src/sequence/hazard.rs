use std::marker::PhantomData;
use std::sync::atomic::{AtomicPtr, AtomicUsize, Ordering};

use crossbeam::atomic::AtomicCell;
use crossbeam::utils::Backoff;

use crate::reclaim::HazardSlots;
use crate::sequence::traits::{Allocation, Sequence};
use crate::sequence::{alloc_slots, free_slots};
use crate::Word;

/// ### -> `HazardVec<T, C>` - copy-on-grow append-only vector with hazard-cell reclamation.
///
/// Same layout and growth protocol as `FlipVec`, different reclamation: up
/// to `C` readers, each with a caller-assigned id below `C`, publish the
/// buffer they are reading into their [`HazardSlots`] cell. The grower
/// replaces the buffer, then stalls until no cell names the old one before
/// freeing it.
///
/// ### -> `Reader-id contract`
///
/// Ids are capability tokens the caller hands out: unique among concurrent
/// readers, at most one live iterator per id. Starting a second iterator
/// on an id whose first is still alive panics. The id is only needed here;
/// the other variants accept and ignore one so that callers can stay
/// generic.
///
/// ### -> `Growth`
///
/// The reservation cursor hands the overflow position to exactly one
/// producer, which makes it the sole grower with no further arbitration.
/// The copy loop re-reads sentinel slots (in-flight stores) and thereby
/// drains every pending writer off the old buffer; the hazard scan then
/// drains the readers. As in the flip variant, a producer parked between
/// reservation and store can stall the grower without bound.
///
/// ### -> `Usage`
///
/// ```
/// use accrete::prelude::*;
///
/// // Room for 8 concurrent readers (ids 0..8).
/// let vec = HazardVec::<u32, 8>::with_capacity(4);
/// for value in 1..=10 {
///     vec.push(value);
/// }
///
/// assert_eq!(vec.iter(0).sum::<u32>(), 55);
/// ```
pub struct HazardVec<T: Word = u32, const C: usize = 8> {
    memory: AtomicPtr<AtomicCell<T>>,
    /// Cell count of the current buffer, including the terminator slot.
    slots: AtomicUsize,
    cursor: AtomicUsize,
    hazards: HazardSlots<AtomicCell<T>, C>,
}

unsafe impl<T: Word, const C: usize> Send for HazardVec<T, C> {}
unsafe impl<T: Word, const C: usize> Sync for HazardVec<T, C> {}

impl<T: Word, const C: usize> HazardVec<T, C> {
    /// Creates a vector with room for `capacity` elements before the first
    /// growth and `C` reader ids.
    pub fn new(capacity: usize) -> Self {
        assert!(capacity > 0, "Capacity must be greater than zero!");
        Self {
            memory: AtomicPtr::new(alloc_slots::<T>(capacity + 1)),
            slots: AtomicUsize::new(capacity + 1),
            cursor: AtomicUsize::new(0),
            hazards: HazardSlots::new(),
        }
    }

    /// Elements the current buffer can hold before growing. Advisory.
    #[inline(always)]
    pub fn capacity(&self) -> usize {
        self.slots.load(Ordering::Acquire) - 1
    }

    /// Number of reader ids.
    #[inline(always)]
    pub fn readers(&self) -> usize {
        C
    }

    /// Advisory element count: the number of reserved positions. Monotone.
    #[inline(always)]
    pub fn size(&self) -> usize {
        self.cursor.load(Ordering::Relaxed)
    }

    /// Appends `value`.
    ///
    /// Panics if `value` is the sentinel.
    pub fn push(&self, value: T) {
        assert!(value != T::SENTINEL, "The sentinel cannot be pushed!");
        let position = self.cursor.fetch_add(1, Ordering::Relaxed);
        let backoff = Backoff::new();
        loop {
            let slots = self.slots.load(Ordering::Acquire);
            if position + 1 < slots {
                let memory = self.memory.load(Ordering::Acquire);
                unsafe { (*memory.add(position)).store(value) };
                return;
            }
            if position + 1 == slots {
                self.grow(slots);
                continue;
            }
            backoff.snooze();
        }
    }

    /// Doubles the buffer and retires the old one once no hazard cell
    /// names it. Called by the unique overflow reserver.
    fn grow(&self, slots: usize) {
        let old = self.memory.load(Ordering::Acquire);
        let fresh = alloc_slots::<T>(slots * 2);

        // Sentinel slots are in-flight stores; re-read until they land.
        // Completing this loop also proves no writer can touch `old`
        // afterwards.
        let mut index = 0;
        while index < slots - 1 {
            let value = unsafe { (*old.add(index)).load() };
            if value == T::SENTINEL {
                std::hint::spin_loop();
                continue;
            }
            unsafe { (*fresh.add(index)).store(value) };
            index += 1;
        }

        self.memory.store(fresh, Ordering::Release);
        self.slots.store(slots * 2, Ordering::Release);

        log::trace!(
            "hazard growth: {} -> {} slots, scanning reader cells",
            slots,
            slots * 2
        );

        // `old` is unlinked. The fence orders the unlink before the scan:
        // a reader either re-validates against the fresh pointer, or its
        // published cell is visible to the scan below. Without it a stale
        // re-validation could slip past a completed scan.
        std::sync::atomic::fence(Ordering::SeqCst);
        self.hazards.wait_unprotected(old);
        unsafe { free_slots(old, slots) };
    }

    /// Pins the live buffer on behalf of `reader` and returns a snapshot
    /// walk over it.
    ///
    /// Panics if `reader >= C` or if `reader` already has a live iterator.
    #[must_use = "Iterators pin the backing storage and must be consumed or dropped!"]
    pub fn iter(&self, reader: usize) -> Iter<'_, T, C> {
        let memory = self.hazards.protect(reader, &self.memory);
        Iter {
            hazards: &self.hazards,
            reader,
            position: memory,
            done: false,
            _buffer: PhantomData,
        }
    }
}

impl<T: Word, const C: usize> Drop for HazardVec<T, C> {
    fn drop(&mut self) {
        let memory = *self.memory.get_mut();
        let slots = *self.slots.get_mut();
        unsafe { free_slots(memory, slots) };
    }
}

impl<T: Word, const C: usize> Allocation for HazardVec<T, C> {
    fn with_capacity(capacity: usize) -> Self {
        Self::new(capacity)
    }
}

impl<T: Word, const C: usize> Sequence for HazardVec<T, C> {
    type Item = T;
    type Iter<'a>
        = Iter<'a, T, C>
    where
        Self: 'a;

    fn push(&self, value: T) {
        HazardVec::push(self, value);
    }

    fn size(&self) -> usize {
        HazardVec::size(self)
    }

    fn iter_with(&self, reader: usize) -> Iter<'_, T, C> {
        self.iter(reader)
    }
}

/// Snapshot walk over a [`HazardVec`]. Keeps the reader's hazard cell
/// pointed at the pinned buffer; dropping the iterator clears the cell.
pub struct Iter<'a, T: Word, const C: usize> {
    hazards: &'a HazardSlots<AtomicCell<T>, C>,
    reader: usize,
    position: *const AtomicCell<T>,
    done: bool,
    _buffer: PhantomData<&'a HazardVec<T, C>>,
}

impl<T: Word, const C: usize> Iterator for Iter<'_, T, C> {
    type Item = T;

    fn next(&mut self) -> Option<T> {
        if self.done {
            return None;
        }
        let value = unsafe { (*self.position).load() };
        if value == T::SENTINEL {
            self.done = true;
            return None;
        }
        self.position = unsafe { self.position.add(1) };
        Some(value)
    }
}

impl<T: Word, const C: usize> Drop for Iter<'_, T, C> {
    fn drop(&mut self) {
        self.hazards.clear(self.reader);
    }
}
