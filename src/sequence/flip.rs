use std::marker::PhantomData;
use std::sync::atomic::{AtomicPtr, AtomicUsize, Ordering};

use crossbeam::atomic::AtomicCell;
use crossbeam::utils::Backoff;

use crate::reclaim::CounterPair;
use crate::sequence::traits::{Allocation, Sequence};
use crate::sequence::{alloc_slots, free_slots};
use crate::Word;

/// ### -> `FlipVec<T>` - copy-on-grow append-only vector with counter-pair reclamation.
///
/// `FlipVec` keeps one contiguous buffer of atomic slots. Producers reserve
/// a slot with a single `fetch_add` on the cursor and store their value
/// into it; readers pin the buffer through a [`CounterPair`] and walk it to
/// the first sentinel. When a reservation would overflow the buffer, the
/// reserving producer becomes the *grower*: it allocates a buffer of twice
/// the capacity, copies the visible prefix over, publishes the new buffer,
/// and retires the old one through the counter pair so that it is freed
/// exactly once, exactly when the last reader pin on it is gone.
///
/// ### -> `Concurrency model`
///
/// - `push` is lock-free outside the growth transition: one relaxed
///   `fetch_add` to reserve, one store to publish. A producer whose slot
///   lies beyond the current capacity spins until the grower publishes the
///   new capacity.
/// - Two buffer generations can be live at once (the one being read and
///   the one being filled), never more: the grower first claims the
///   inactive counter, which cannot succeed before the generation before
///   last has fully drained.
/// - The grower's copy loop re-reads any slot that still holds the
///   sentinel, because such a slot is an in-flight store on the old
///   buffer. The loop therefore doubles as the writer-drain barrier: once
///   it completes, no store can land in the old buffer anymore. Under an
///   adversarial scheduler this wait is unbounded (a producer parked
///   between reservation and store stalls the grower); that is an accepted
///   trade-off of the copy-on-grow layout.
///
/// ### -> `Iteration`
///
/// [`iter`](Self::iter) returns a pin-guard implementing
/// `Iterator<Item = T>`. The walk yields slots in reservation order and
/// ends at the first sentinel at or before the reserved cursor; an element
/// whose slot was reserved but not yet stored may thus be missed. Repeat
/// the pass until it stops growing to obtain completeness (see
/// `Snapshot::converged` in the prelude). The buffer always keeps one
/// trailing slot that is never written, so the walk meets a sentinel
/// before the allocation end in every case.
///
/// ### -> `Usage`
///
/// ```
/// use accrete::prelude::*;
///
/// let vec = FlipVec::<u32>::with_capacity(4);
/// for value in 1..=10 {
///     vec.push(value);
/// }
///
/// assert_eq!(vec.size(), 10);
/// assert_eq!(vec.iter().collect::<Vec<_>>(), (1..=10).collect::<Vec<_>>());
/// ```
pub struct FlipVec<T: Word = u32> {
    /// Current buffer; `slots` cells, positions `cursor..` hold the
    /// sentinel.
    memory: AtomicPtr<AtomicCell<T>>,
    /// Cell count of the current buffer, including the terminator slot.
    slots: AtomicUsize,
    /// Next position to reserve.
    cursor: AtomicUsize,
    counters: CounterPair,
}

unsafe impl<T: Word> Send for FlipVec<T> {}
unsafe impl<T: Word> Sync for FlipVec<T> {}

impl<T: Word> FlipVec<T> {
    /// Creates a vector with room for `capacity` elements before the first
    /// growth.
    pub fn new(capacity: usize) -> Self {
        assert!(capacity > 0, "Capacity must be greater than zero!");
        Self {
            memory: AtomicPtr::new(alloc_slots::<T>(capacity + 1)),
            slots: AtomicUsize::new(capacity + 1),
            cursor: AtomicUsize::new(0),
            counters: CounterPair::new(),
        }
    }

    /// Elements the current buffer can hold before growing. Advisory.
    #[inline(always)]
    pub fn capacity(&self) -> usize {
        self.slots.load(Ordering::Acquire) - 1
    }

    /// Advisory element count: the number of reserved positions. Monotone;
    /// may include reservations whose store is still in flight.
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
                // In bounds. The store lands in the generation matching the
                // slot count read above: a growth cannot complete while an
                // in-bounds reservation is still unwritten, because the
                // copy loop waits on exactly those slots.
                let memory = self.memory.load(Ordering::Acquire);
                unsafe { (*memory.add(position)).store(value) };
                return;
            }
            if position + 1 == slots {
                // Sole overflow reserver: this thread grows, then retries
                // with the same reservation, which lands in bounds.
                self.grow(slots);
                continue;
            }
            // Beyond the overflow slot: a grower is at work. Wait for it
            // to publish the new slot count.
            backoff.snooze();
        }
    }

    /// Doubles the buffer. Called by the unique thread whose reservation
    /// hit the overflow slot.
    fn grow(&self, slots: usize) {
        // Claiming the inactive counter is the grow-right and the wait for
        // the generation before last to drain; the token planted here keeps
        // the new buffer alive once the flag flips.
        let _fresh_side = self.counters.pin_inactive();
        let old_side = self.counters.active();

        let old = self.memory.load(Ordering::Acquire);
        let fresh = alloc_slots::<T>(slots * 2);

        // Copy the visible prefix. A sentinel here is an in-flight store:
        // every position below the overflow slot has been reserved, so the
        // value is coming and we re-read until it lands. This is also what
        // guarantees no store can hit `old` after the copy completes.
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
        self.counters.flip();
        // Publishing the slot count unblocks the producers spinning in
        // `push`.
        self.slots.store(slots * 2, Ordering::Release);

        log::trace!(
            "flip growth: {} -> {} slots, waiting on readers of the old buffer",
            slots,
            slots * 2
        );

        // Wait out every reader pin on the old generation, then free it.
        self.counters.unpin_last(old_side);
        unsafe { free_slots(old, slots) };
    }

    /// Pins the live buffer and returns a snapshot walk over it.
    #[must_use = "Iterators pin the backing storage and must be consumed or dropped!"]
    pub fn iter(&self) -> Iter<'_, T> {
        let side = self.counters.pin_active();
        // The pointer may already belong to the next generation; the pin
        // still protects it, because the next grow cannot claim our side
        // before we unpin.
        let memory = self.memory.load(Ordering::Acquire);
        Iter {
            counters: &self.counters,
            side,
            position: memory,
            done: false,
            _buffer: PhantomData,
        }
    }
}

impl<T: Word> Drop for FlipVec<T> {
    fn drop(&mut self) {
        let memory = *self.memory.get_mut();
        let slots = *self.slots.get_mut();
        unsafe { free_slots(memory, slots) };
    }
}

impl<T: Word> Allocation for FlipVec<T> {
    fn with_capacity(capacity: usize) -> Self {
        Self::new(capacity)
    }
}

impl<T: Word> Sequence for FlipVec<T> {
    type Item = T;
    type Iter<'a>
        = Iter<'a, T>
    where
        Self: 'a;

    fn push(&self, value: T) {
        FlipVec::push(self, value);
    }

    fn size(&self) -> usize {
        FlipVec::size(self)
    }

    fn iter_with(&self, _reader: usize) -> Iter<'_, T> {
        self.iter()
    }
}

/// Snapshot walk over a [`FlipVec`]. Holds one reader pin on the counter
/// pair for its whole lifetime; dropping it releases the pin.
pub struct Iter<'a, T: Word> {
    counters: &'a CounterPair,
    side: usize,
    position: *const AtomicCell<T>,
    done: bool,
    _buffer: PhantomData<&'a FlipVec<T>>,
}

impl<T: Word> Iterator for Iter<'_, T> {
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

impl<T: Word> Drop for Iter<'_, T> {
    fn drop(&mut self) {
        self.counters.unpin(self.side);
    }
}
