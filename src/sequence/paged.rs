use std::marker::PhantomData;
use std::ptr::NonNull;
use std::sync::atomic::{AtomicPtr, AtomicUsize, Ordering};

use crossbeam::atomic::AtomicCell;
use crossbeam::utils::Backoff;

use crate::sequence::traits::{Allocation, Sequence};
use crate::Word;

#[cfg(not(target_pointer_width = "64"))]
compile_error!("The paged sequence packs a page address and an index into one word and requires 64-bit pointers.");

/// Low bits of the packed cursor reserved for the in-page index.
///
/// A page address occupies the remaining high bits, which relies on
/// user-space virtual addresses fitting 48 bits on 64-bit targets.
const INDEX_BITS: u32 = 16;

const INDEX_MASK: usize = (1 << INDEX_BITS) - 1;

#[inline(always)]
pub(crate) fn pack<P>(pointer: *mut P, index: usize) -> usize {
    debug_assert!(
        (pointer as usize) >> (usize::BITS - INDEX_BITS) == 0,
        "Page address does not fit the packed cursor!"
    );
    debug_assert!(index <= INDEX_MASK);
    ((pointer as usize) << INDEX_BITS) | index
}

#[inline(always)]
pub(crate) fn unpack_pointer<P>(word: usize) -> *mut P {
    (word >> INDEX_BITS) as *mut P
}

#[inline(always)]
pub(crate) fn unpack_index(word: usize) -> usize {
    word & INDEX_MASK
}

/// One fixed-size segment of a [`PagedVec`]: `N` sentinel-initialised
/// slots followed by the link to the next page. The link starts null and
/// is installed exactly once; after that neither the link nor the page's
/// address ever changes for the lifetime of the owning structure.
pub struct Page<T: Word, const N: usize> {
    data: [AtomicCell<T>; N],
    next: AtomicPtr<Page<T, N>>,
}

impl<T: Word, const N: usize> Page<T, N> {
    pub(crate) fn fresh() -> Self {
        assert!(
            N > 0 && N < (1 << INDEX_BITS),
            "Page size must fit the index bits of the packed cursor!"
        );
        Self {
            data: std::array::from_fn(|_| AtomicCell::new(T::SENTINEL)),
            next: AtomicPtr::new(std::ptr::null_mut()),
        }
    }

    #[inline(always)]
    pub(crate) fn slot(&self, index: usize) -> &AtomicCell<T> {
        &self.data[index]
    }

    #[inline(always)]
    fn next(&self) -> *mut Page<T, N> {
        self.next.load(Ordering::Acquire)
    }
}

/// Where a [`PagedVec`] gets its pages from, and who frees them.
///
/// The two strategies are [`HeapPages`] (each page is boxed on demand and
/// freed when the sequence drops) and a shared [`PageArena`]
/// (`crate::sequence::PageArena`), which retains every page it ever handed
/// out until the arena itself drops.
pub trait PageSource<T: Word, const N: usize> {
    /// Whether pages belong to the sequence and must be freed on its drop.
    const OWNS_PAGES: bool;

    /// Hands out a fresh page: all slots sentinel, link null. The page
    /// must stay valid for the lifetime of the source.
    fn allocate_page(&self) -> NonNull<Page<T, N>>;
}

/// The default page source: plain boxed pages.
#[derive(Clone, Copy, Default)]
pub struct HeapPages;

impl<T: Word, const N: usize> PageSource<T, N> for HeapPages {
    const OWNS_PAGES: bool = true;

    fn allocate_page(&self) -> NonNull<Page<T, N>> {
        // Box::into_raw never returns null; allocation failure aborts.
        unsafe { NonNull::new_unchecked(Box::into_raw(Box::new(Page::fresh()))) }
    }
}

/// ### -> `PagedVec<T, N>` - segmented append-only vector that never copies.
///
/// Storage is a singly linked chain of [`Page`]s of `N` slots each. One
/// atomic word encodes the whole append state: the current page's address
/// in the high bits and the in-page index in the low sixteen bits, so a
/// producer reserves a slot with a single `fetch_add` that advances both
/// at once.
///
/// Because elements never move and pages are only freed on drop, readers
/// need no reclamation protocol at all: an iterator simply walks the chain
/// through the `next` links. This is the variant to pick when iteration
/// dominates or when reader registration (the hazard variant's id
/// contract) is impractical.
///
/// ### -> `Append protocol`
///
/// - Index below `N`: the reservation names a real slot; store and done.
/// - Index exactly `N`: the reserving producer is the *grower*. It
///   allocates a page, installs the `next` link (readers may traverse the
///   instant the link lands), then republishes the cursor as
///   `(fresh page, 0)` and re-contends for a slot.
/// - Index above `N`: another producer is mid-growth; back off until the
///   cursor lands on the fresh page.
///
/// Reservations keep advancing the index while the grower works, so the
/// index can overshoot `N`. The overshoot is bounded by the number of
/// producers inside `push`, which must stay below `2^16 - N`; with the
/// default page size that is over sixty thousand concurrent producers.
///
/// The grower stalls its peers for the duration of one page installation,
/// but never blocks readers, and the stall is bounded to one page of
/// overrun rather than a full copy.
///
/// ### -> `Usage`
///
/// ```
/// use accrete::prelude::*;
///
/// let vec = PagedVec::<u32, 64>::new();
/// for value in 1..=200 {
///     vec.push(value);
/// }
///
/// // Three pages were chained; nothing was copied or freed.
/// assert_eq!(vec.size(), 200);
/// assert_eq!(vec.iter().count(), 200);
/// ```
pub struct PagedVec<T: Word = u32, const N: usize = 1024, A: PageSource<T, N> = HeapPages> {
    head: NonNull<Page<T, N>>,
    /// Packed `(current page, in-page index)` cursor.
    cursor: AtomicUsize,
    source: A,
}

unsafe impl<T: Word, const N: usize, A: PageSource<T, N> + Send> Send for PagedVec<T, N, A> {}
unsafe impl<T: Word, const N: usize, A: PageSource<T, N> + Sync> Sync for PagedVec<T, N, A> {}

impl<T: Word, const N: usize> PagedVec<T, N, HeapPages> {
    /// Creates a vector backed by boxed pages.
    pub fn new() -> Self {
        Self::with_source(HeapPages)
    }
}

impl<T: Word, const N: usize> Default for PagedVec<T, N, HeapPages> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: Word, const N: usize, A: PageSource<T, N>> PagedVec<T, N, A> {
    /// Creates a vector drawing its pages from `source`.
    pub fn with_source(source: A) -> Self {
        let head = source.allocate_page();
        Self {
            head,
            cursor: AtomicUsize::new(pack(head.as_ptr(), 0)),
            source,
        }
    }

    /// Appends `value`.
    ///
    /// Panics if `value` is the sentinel.
    pub fn push(&self, value: T) {
        assert!(value != T::SENTINEL, "The sentinel cannot be pushed!");
        let backoff = Backoff::new();
        loop {
            // Peek before reserving: while a growth is in flight the index
            // sits above `N` and reserving would only widen the overshoot.
            let peek = self.cursor.load(Ordering::Acquire);
            if unpack_index(peek) <= N {
                let reserved = self.cursor.fetch_add(1, Ordering::AcqRel);
                let index = unpack_index(reserved);
                let page = unpack_pointer::<Page<T, N>>(reserved);
                if index < N {
                    unsafe { (*page).slot(index).store(value) };
                    return;
                }
                if index == N {
                    // Sole grower: every slot of `page` is reserved, the
                    // chain gains a page. Link first so readers can hop,
                    // then release the producers with the fresh cursor.
                    let fresh = self.source.allocate_page().as_ptr();
                    unsafe { (*page).next.store(fresh, Ordering::Release) };
                    self.cursor.store(pack(fresh, 0), Ordering::Release);
                    log::trace!("paged growth: installed a page of {} slots", N);
                    // Our own value is still unplaced; re-contend.
                }
                // Index above `N`: our reservation fell into the growth
                // window and is void; retry.
            }
            backoff.spin();
        }
    }

    /// Advisory element count, derived from the packed cursor: full pages
    /// before the cursor page plus the in-page index. Monotone. Walks the
    /// chain, like every whole-structure query here.
    pub fn size(&self) -> usize {
        let cursor = self.cursor.load(Ordering::Acquire);
        let current = unpack_pointer::<Page<T, N>>(cursor);
        let index = unpack_index(cursor).min(N);

        let mut full_pages = 0;
        let mut page = self.head.as_ptr();
        while page != current && !page.is_null() {
            full_pages += 1;
            page = unsafe { (*page).next() };
        }
        full_pages * N + index
    }

    /// Returns a snapshot walk from the first element. No pin is taken;
    /// pages cannot go away.
    #[must_use = "Iterators must be consumed or dropped!"]
    pub fn iter(&self) -> Iter<'_, T, N> {
        Iter {
            page: self.head.as_ptr(),
            index: 0,
            _chain: PhantomData,
        }
    }

    /// Page addresses currently in the chain, head first. Used by tests to
    /// assert that elements never move.
    #[cfg(test)]
    pub(crate) fn page_addresses(&self) -> Vec<*const ()> {
        let mut addresses = Vec::new();
        let mut page = self.head.as_ptr();
        while !page.is_null() {
            addresses.push(page as *const ());
            page = unsafe { (*page).next() };
        }
        addresses
    }
}

impl<T: Word, const N: usize, A: PageSource<T, N>> Drop for PagedVec<T, N, A> {
    fn drop(&mut self) {
        if !A::OWNS_PAGES {
            // The arena keeps the pages; the chain is just a view.
            return;
        }
        let mut page = self.head.as_ptr();
        while !page.is_null() {
            let following = unsafe { (*page).next() };
            drop(unsafe { Box::from_raw(page) });
            page = following;
        }
    }
}

impl<T: Word, const N: usize> Allocation for PagedVec<T, N, HeapPages> {
    /// The capacity hint is ignored: storage granularity is a page.
    fn with_capacity(_capacity: usize) -> Self {
        Self::new()
    }
}

impl<T: Word, const N: usize, A: PageSource<T, N> + Send + Sync> Sequence for PagedVec<T, N, A> {
    type Item = T;
    type Iter<'a>
        = Iter<'a, T, N>
    where
        Self: 'a;

    fn push(&self, value: T) {
        PagedVec::push(self, value);
    }

    fn size(&self) -> usize {
        PagedVec::size(self)
    }

    fn iter_with(&self, _reader: usize) -> Iter<'_, T, N> {
        self.iter()
    }
}

/// Snapshot walk over a [`PagedVec`]: slot by slot, hopping through the
/// `next` link at each page end, ending at the first sentinel or at a
/// page end whose link is still null.
pub struct Iter<'a, T: Word, const N: usize> {
    page: *const Page<T, N>,
    index: usize,
    _chain: PhantomData<&'a Page<T, N>>,
}

impl<T: Word, const N: usize> Iterator for Iter<'_, T, N> {
    type Item = T;

    fn next(&mut self) -> Option<T> {
        loop {
            if self.page.is_null() {
                return None;
            }
            if self.index == N {
                // Hop to the next page, if it has been linked yet.
                self.page = unsafe { (*self.page).next() };
                self.index = 0;
                continue;
            }
            let value = unsafe { (*self.page).slot(self.index).load() };
            if value == T::SENTINEL {
                self.page = std::ptr::null();
                return None;
            }
            self.index += 1;
            return Some(value);
        }
    }
}
