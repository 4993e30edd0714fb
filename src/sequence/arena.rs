use std::ptr::NonNull;
use std::sync::atomic::{AtomicPtr, AtomicUsize, Ordering};

use crossbeam::utils::Backoff;

use crate::sequence::paged::{pack, unpack_index, unpack_pointer, Page, PageSource};
use crate::Word;

/// A block of pages allocated in one go. Chunks form a singly linked chain
/// whose only purpose is the arena's drop walk; allocation goes through
/// the packed cursor.
struct Chunk<T: Word, const N: usize> {
    pages: Box<[Page<T, N>]>,
    next: AtomicPtr<Chunk<T, N>>,
}

impl<T: Word, const N: usize> Chunk<T, N> {
    fn fresh(pages: usize) -> *mut Self {
        let chunk = Self {
            pages: (0..pages).map(|_| Page::fresh()).collect(),
            next: AtomicPtr::new(std::ptr::null_mut()),
        };
        Box::into_raw(Box::new(chunk))
    }
}

/// ### -> `PageArena<T, N>` - bulk page allocator for the segmented sequences.
///
/// Pages for a [`PagedVec`](crate::sequence::PagedVec) are normally boxed
/// one by one. When many short sequences share a workload (one per key of
/// a map, say), an arena amortises that: pages come out of pre-allocated
/// chunks of `pages_per_chunk`, and every page lives until the arena is
/// dropped. Sequences drawing from an arena never free anything
/// themselves.
///
/// Allocation uses the same discipline as the paged append: one atomic
/// word packs `(current chunk, page index)`, a `fetch_add` reserves the
/// next page, and the reserver that hits the chunk end installs and links
/// a fresh chunk before republishing the cursor.
///
/// ### -> `Usage`
///
/// ```
/// use accrete::prelude::*;
///
/// let arena = PageArena::<u32, 64>::new(16);
/// let first = PagedVec::with_source(&arena);
/// let second = PagedVec::with_source(&arena);
///
/// first.push(1);
/// second.push(2);
///
/// assert_eq!(first.iter().collect::<Vec<_>>(), vec![1]);
/// assert_eq!(second.iter().collect::<Vec<_>>(), vec![2]);
/// ```
pub struct PageArena<T: Word = u32, const N: usize = 1024> {
    head: NonNull<Chunk<T, N>>,
    /// Packed `(current chunk, page index)` cursor.
    cursor: AtomicUsize,
    pages_per_chunk: usize,
}

unsafe impl<T: Word, const N: usize> Send for PageArena<T, N> {}
unsafe impl<T: Word, const N: usize> Sync for PageArena<T, N> {}

impl<T: Word, const N: usize> PageArena<T, N> {
    /// Creates an arena that allocates `pages_per_chunk` pages at a time.
    pub fn new(pages_per_chunk: usize) -> Self {
        assert!(
            pages_per_chunk > 0 && pages_per_chunk < (1 << 16),
            "Pages per chunk must fit the index bits of the packed cursor!"
        );
        let head = Chunk::fresh(pages_per_chunk);
        Self {
            // Chunk::fresh boxes the chunk; the pointer is never null.
            head: unsafe { NonNull::new_unchecked(head) },
            cursor: AtomicUsize::new(pack(head, 0)),
            pages_per_chunk,
        }
    }

    /// Hands out the next fresh page. The page stays valid until the arena
    /// is dropped; it is never reused or returned.
    pub fn allocate(&self) -> &Page<T, N> {
        let per_chunk = self.pages_per_chunk;
        let backoff = Backoff::new();
        loop {
            let peek = self.cursor.load(Ordering::Acquire);
            if unpack_index(peek) <= per_chunk {
                let reserved = self.cursor.fetch_add(1, Ordering::AcqRel);
                let index = unpack_index(reserved);
                let chunk = unpack_pointer::<Chunk<T, N>>(reserved);
                if index < per_chunk {
                    return unsafe { &(*chunk).pages[index] };
                }
                if index == per_chunk {
                    // Sole reserver of the chunk end: install the next
                    // chunk and release the waiting allocators.
                    let fresh = Chunk::fresh(per_chunk);
                    unsafe { (*chunk).next.store(fresh, Ordering::Release) };
                    self.cursor.store(pack(fresh, 0), Ordering::Release);
                    log::debug!("page arena: installed a chunk of {} pages", per_chunk);
                }
            }
            backoff.spin();
        }
    }

    /// Number of pages handed out so far. Advisory.
    pub fn allocated(&self) -> usize {
        let cursor = self.cursor.load(Ordering::Acquire);
        let current = unpack_pointer::<Chunk<T, N>>(cursor);
        let index = unpack_index(cursor).min(self.pages_per_chunk);

        let mut full_chunks = 0;
        let mut chunk = self.head.as_ptr();
        while chunk != current && !chunk.is_null() {
            full_chunks += 1;
            chunk = unsafe { (*chunk).next.load(Ordering::Acquire) };
        }
        full_chunks * self.pages_per_chunk + index
    }
}

impl<T: Word, const N: usize> Drop for PageArena<T, N> {
    fn drop(&mut self) {
        let mut chunk = self.head.as_ptr();
        while !chunk.is_null() {
            let following = unsafe { (*chunk).next.load(Ordering::Relaxed) };
            drop(unsafe { Box::from_raw(chunk) });
            chunk = following;
        }
    }
}

/// Arena-backed page source: the sequence borrows the arena and the arena
/// keeps ownership of every page.
impl<'a, T: Word, const N: usize> PageSource<T, N> for &'a PageArena<T, N> {
    const OWNS_PAGES: bool = false;

    fn allocate_page(&self) -> NonNull<Page<T, N>> {
        let page: &Page<T, N> = self.allocate();
        // The reference is only lifetime-bound; the page itself lives
        // until the arena drops, which outlives any sequence borrowing it.
        unsafe { NonNull::new_unchecked(page as *const Page<T, N> as *mut Page<T, N>) }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sequence::PagedVec;
    use std::collections::HashSet;
    use std::sync::Arc;
    use std::thread;

    #[test]
    fn pages_are_distinct_and_stable() {
        let arena = PageArena::<u32, 8>::new(2);

        let mut addresses = Vec::new();
        for _ in 0..5 {
            let page = arena.allocate();
            addresses.push(page as *const Page<u32, 8> as usize);
        }

        let distinct: HashSet<_> = addresses.iter().copied().collect();
        assert_eq!(distinct.len(), addresses.len());
        assert_eq!(arena.allocated(), 5);

        // Crossing two chunk boundaries must not have moved anything; the
        // pages are still readable and fresh.
        for address in addresses {
            let page = address as *const Page<u32, 8>;
            let value = unsafe { (*page).slot(0).load() };
            assert_eq!(value, 0);
        }
    }

    #[test]
    fn concurrent_allocation_never_doubles_up() {
        let arena = Arc::new(PageArena::<u32, 8>::new(4));

        let mut handles = vec![];
        for _ in 0..8 {
            let arena = Arc::clone(&arena);
            handles.push(thread::spawn(move || {
                let mut local = Vec::new();
                for _ in 0..200 {
                    local.push(arena.allocate() as *const Page<u32, 8> as usize);
                }
                local
            }));
        }

        let mut all = Vec::new();
        for handle in handles {
            all.extend(handle.join().unwrap());
        }

        let distinct: HashSet<_> = all.iter().copied().collect();
        assert_eq!(distinct.len(), all.len());
        assert_eq!(arena.allocated(), all.len());
    }

    #[test]
    fn sequences_share_an_arena() {
        let arena = PageArena::<u32, 8>::new(4);
        let first = PagedVec::with_source(&arena);
        let second = PagedVec::with_source(&arena);

        for value in 1..=20 {
            first.push(value);
            second.push(value * 100);
        }

        assert_eq!(first.iter().collect::<Vec<_>>(), (1..=20).collect::<Vec<_>>());
        assert_eq!(
            second.iter().collect::<Vec<_>>(),
            (1..=20).map(|v| v * 100).collect::<Vec<_>>()
        );
    }
}
