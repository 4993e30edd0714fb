use std::sync::atomic::{AtomicPtr, Ordering};

use crossbeam::utils::{Backoff, CachePadded};

/// A fixed table of per-reader hazard cells.
///
/// Each of the `C` cells belongs to one reader, identified by a small
/// integer id the caller hands out. A reader publishes the pointer it is
/// about to dereference into its cell; a writer that wants to free a
/// pointer first scans every cell and waits until none of them names it.
///
/// ### -> `Contract`
///
/// - Reader ids must be unique among concurrently iterating readers and
///   below `C`.
/// - At most one live pin per id. [`protect`](Self::protect) panics if the
///   id's cell is already occupied.
///
/// The publish/re-read handshake and the scan both run under `SeqCst`: the
/// store of the hazard and the subsequent re-read of the source must not
/// reorder, and the writer's scan must observe any hazard published before
/// the reader re-validated.
pub struct HazardSlots<P, const C: usize> {
    slots: [CachePadded<AtomicPtr<P>>; C],
}

impl<P, const C: usize> HazardSlots<P, C> {
    pub fn new() -> Self {
        Self {
            slots: std::array::from_fn(|_| CachePadded::new(AtomicPtr::new(std::ptr::null_mut()))),
        }
    }

    /// Number of reader cells.
    #[inline(always)]
    pub const fn len(&self) -> usize {
        C
    }

    /// Publishes the current value of `source` into `reader`'s cell and
    /// returns it once the publication is stable.
    ///
    /// The loop re-reads `source` after every store: only when the source
    /// still equals the published value is the pin visible to any writer
    /// that could free that pointer.
    pub fn protect(&self, reader: usize, source: &AtomicPtr<P>) -> *mut P {
        assert!(reader < C, "Reader id {} out of range (max {})!", reader, C);
        let slot = &self.slots[reader];
        assert!(
            slot.load(Ordering::Relaxed).is_null(),
            "Reader id {} already has a live iterator!",
            reader
        );

        let mut pointer = source.load(Ordering::SeqCst);
        loop {
            slot.store(pointer, Ordering::SeqCst);
            let current = source.load(Ordering::SeqCst);
            if current == pointer {
                return pointer;
            }
            // The source moved between our store and re-read; chase it.
            pointer = current;
        }
    }

    /// Clears `reader`'s cell, ending its pin.
    #[inline]
    pub fn clear(&self, reader: usize) {
        self.slots[reader].store(std::ptr::null_mut(), Ordering::Release);
    }

    /// Blocks until no cell names `pointer`. On return the pointer is
    /// unreachable through this table and may be freed, provided it can no
    /// longer be re-published (the caller must have unlinked it first).
    pub fn wait_unprotected(&self, pointer: *mut P) {
        let backoff = Backoff::new();
        loop {
            let held = self
                .slots
                .iter()
                .any(|slot| slot.load(Ordering::SeqCst) == pointer);
            if !held {
                return;
            }
            backoff.snooze();
        }
    }
}

impl<P, const C: usize> Default for HazardSlots<P, C> {
    fn default() -> Self {
        Self::new()
    }
}
