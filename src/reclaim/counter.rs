use std::sync::atomic::{AtomicUsize, Ordering};

use crossbeam::utils::{Backoff, CachePadded};

/// A pair of reference counters in cyclic active/inactive roles.
///
/// `CounterPair` is the reclamation half of a flip-buffer: two storage
/// generations can be live at once (the buffer being read and the buffer
/// being prepared), and each generation is tracked by one of two counters.
/// Which counter tracks the live generation alternates on every flip, hence
/// "cyclic".
///
/// ### -> `Protocol`
///
/// - Readers call [`pin_active`](Self::pin_active) before touching the live
///   buffer and [`unpin`](Self::unpin) when done. A pin only succeeds on a
///   counter that is already non-zero, so a counter that has drained to
///   zero can never be revived.
/// - The constructor seeds the active side with one *base token*. The base
///   token is what keeps the active counter non-zero between readers; it is
///   retired by [`unpin_last`](Self::unpin_last) when the generation dies.
/// - A writer that wants to replace the buffer calls
///   [`pin_inactive`](Self::pin_inactive): a zero-to-one transition on the
///   inactive counter. It spins while the inactive counter is non-zero,
///   which means it also waits out every reader of the generation before
///   last. The token it plants becomes the base token of the generation it
///   is about to publish. At most one writer can win this transition, so it
///   doubles as the grow-right.
/// - After publishing, the writer calls [`flip`](Self::flip) and then
///   [`unpin_last`](Self::unpin_last) on the old side, which waits until
///   only the old base token remains, retires it, and returns. At that
///   point no reader can hold the old buffer and it may be freed.
///
/// ### -> `Invariant`
///
/// At any moment the active counter is non-zero (its base token has not
/// been retired), and a counter that reads zero tracks a generation with no
/// readers left. Readers that catch the flag mid-flip simply fail the pin
/// and retry on the other side.
pub struct CounterPair {
    counters: [CachePadded<AtomicUsize>; 2],
    active: AtomicUsize,
}

impl CounterPair {
    /// Creates the pair with side `0` active and holding its base token.
    pub fn new() -> Self {
        Self {
            counters: [
                CachePadded::new(AtomicUsize::new(1)),
                CachePadded::new(AtomicUsize::new(0)),
            ],
            active: AtomicUsize::new(0),
        }
    }

    /// The side currently flagged active. Advisory: the flag can move the
    /// moment it is read, which is why [`pin_active`](Self::pin_active)
    /// re-validates through the counter itself.
    #[inline(always)]
    pub fn active(&self) -> usize {
        self.active.load(Ordering::Relaxed)
    }

    /// Increments `counters[side]` only if it is non-zero.
    fn try_pin(&self, side: usize) -> bool {
        let counter = &self.counters[side];
        let mut current = counter.load(Ordering::Relaxed);
        loop {
            if current == 0 {
                return false;
            }
            match counter.compare_exchange_weak(
                current,
                current + 1,
                Ordering::AcqRel,
                Ordering::Relaxed,
            ) {
                Ok(_) => return true,
                Err(observed) => current = observed,
            }
        }
    }

    /// Pins the live generation and returns the side that was pinned.
    ///
    /// The returned side must be handed back to [`unpin`](Self::unpin)
    /// (or [`unpin_last`](Self::unpin_last)) exactly once.
    #[must_use = "A pinned side must be unpinned exactly once!"]
    pub fn pin_active(&self) -> usize {
        let backoff = Backoff::new();
        loop {
            let side = self.active.load(Ordering::Relaxed);
            if self.try_pin(side) {
                return side;
            }
            // The flag moved under us mid-flip; the other side is live now.
            backoff.spin();
        }
    }

    /// Waits until the inactive counter has fully drained, then claims it
    /// with a zero-to-one transition. Returns the side that was claimed.
    ///
    /// At most one caller can win the transition per generation; the token
    /// it plants becomes the base token of the next generation after
    /// [`flip`](Self::flip).
    #[must_use = "The claimed side becomes the next base token and must be tracked!"]
    pub fn pin_inactive(&self) -> usize {
        let backoff = Backoff::new();
        loop {
            let side = 1 - self.active.load(Ordering::Relaxed);
            if self.counters[side]
                .compare_exchange(0, 1, Ordering::AcqRel, Ordering::Relaxed)
                .is_ok()
            {
                return side;
            }
            backoff.snooze();
        }
    }

    /// Releases one pin on `side`.
    #[inline]
    pub fn unpin(&self, side: usize) {
        let previous = self.counters[side].fetch_sub(1, Ordering::Release);
        debug_assert!(previous > 0, "Unpin on a drained counter!");
    }

    /// Moves the active flag to the other side.
    ///
    /// Called by the winner of [`pin_inactive`](Self::pin_inactive) after
    /// the new buffer is published and before the old side is retired.
    #[inline]
    pub fn flip(&self) {
        let side = self.active.load(Ordering::Relaxed);
        self.active.store(1 - side, Ordering::Release);
    }

    /// Waits until `side` holds nothing but its base token, then retires
    /// the token. When this returns, no reader pin on `side`'s generation
    /// exists and its storage may be freed.
    pub fn unpin_last(&self, side: usize) {
        let backoff = Backoff::new();
        while self.counters[side]
            .compare_exchange_weak(1, 0, Ordering::AcqRel, Ordering::Relaxed)
            .is_err()
        {
            backoff.snooze();
        }
    }
}

impl Default for CounterPair {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::thread;

    #[test]
    fn generation_lifecycle() {
        let pair = CounterPair::new();

        // Side 0 is live and holds its base token.
        assert_eq!(pair.active(), 0);
        let side = pair.pin_active();
        assert_eq!(side, 0);
        pair.unpin(side);

        // A writer claims the inactive side, flips, retires the old base.
        let fresh = pair.pin_inactive();
        assert_eq!(fresh, 1);
        pair.flip();
        assert_eq!(pair.active(), 1);
        pair.unpin_last(0);

        // Readers now land on side 1, kept alive by the writer's token.
        let side = pair.pin_active();
        assert_eq!(side, 1);
        pair.unpin(side);

        // The next grow cycle claims side 0 again.
        let fresh = pair.pin_inactive();
        assert_eq!(fresh, 0);
        pair.flip();
        pair.unpin_last(1);
        assert_eq!(pair.active(), 0);
    }

    #[test]
    fn unpin_last_waits_for_readers() {
        let pair = Arc::new(CounterPair::new());

        let reader = {
            let pair = Arc::clone(&pair);
            thread::spawn(move || {
                for _ in 0..10_000 {
                    let side = pair.pin_active();
                    pair.unpin(side);
                }
            })
        };

        for _ in 0..100 {
            let old = pair.active();
            let _fresh = pair.pin_inactive();
            pair.flip();
            pair.unpin_last(old);
        }

        reader.join().unwrap();
    }

    #[test]
    fn concurrent_pins_drain() {
        let pair = Arc::new(CounterPair::new());

        let mut readers = vec![];
        for _ in 0..8 {
            let pair = Arc::clone(&pair);
            readers.push(thread::spawn(move || {
                for _ in 0..50_000 {
                    let side = pair.pin_active();
                    pair.unpin(side);
                }
            }));
        }

        for reader in readers {
            reader.join().unwrap();
        }

        // All reader pins returned; only the base token remains.
        let side = pair.active();
        pair.unpin_last(side);
    }
}
