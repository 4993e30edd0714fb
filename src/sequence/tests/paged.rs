use crate::sequence::prelude::*;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;

#[test]
fn sequential_fill_keeps_order() {
    let vec = PagedVec::<u32, 64>::new();
    for value in 1..=1000 {
        vec.push(value);
    }

    assert_eq!(vec.size(), 1000);
    assert_eq!(vec.iter().collect::<Vec<_>>(), (1..=1000).collect::<Vec<_>>());
}

#[test]
fn size_tracks_the_packed_cursor() {
    let vec = PagedVec::<u32, 64>::new();
    assert_eq!(vec.size(), 0);

    for value in 1..=64 {
        vec.push(value);
    }
    assert_eq!(vec.size(), 64);

    vec.push(65);
    assert_eq!(vec.size(), 65);
}

#[test]
fn pages_never_move() {
    const WRITERS: usize = 8;
    const PUSHES: usize = 10_000;

    let vec = Arc::new(PagedVec::<u32, 64>::new());

    // Prime a few pages and record where they live.
    for value in 1..=(WRITERS as u32) {
        vec.push(value);
    }
    let before = vec.page_addresses();

    let mut handles = vec![];
    for writer in 1..=WRITERS as u32 {
        let vec = Arc::clone(&vec);
        handles.push(thread::spawn(move || {
            for _ in 0..PUSHES {
                vec.push(writer);
            }
        }));
    }
    for handle in handles {
        handle.join().unwrap();
    }

    // Every address recorded earlier is still the address of the same
    // page: the chain only ever gains a tail.
    let after = vec.page_addresses();
    assert!(after.len() >= before.len());
    assert_eq!(&after[..before.len()], &before[..]);

    let mut counts = vec![0usize; WRITERS + 1];
    for value in vec.iter() {
        assert!(value >= 1 && value <= WRITERS as u32, "Bogus value {}!", value);
        counts[value as usize] += 1;
    }
    for writer in 1..=WRITERS {
        // The priming pass pushed each id once on top of the stress run.
        assert_eq!(counts[writer], PUSHES + 1, "Writer {} lost values!", writer);
    }
}

#[test]
fn readers_poll_during_growth() {
    let vec = Arc::new(PagedVec::<u32, 64>::new());
    let done = Arc::new(AtomicBool::new(false));

    let mut readers = vec![];
    for _ in 0..4 {
        let vec = Arc::clone(&vec);
        let done = Arc::clone(&done);
        readers.push(thread::spawn(move || {
            let mut last_len = 0;
            while !done.load(Ordering::Relaxed) {
                let len = vec.iter().inspect(|value| assert!(*value > 0)).count();
                assert!(len >= last_len, "A pass shrank: {} < {}!", len, last_len);
                last_len = len;
            }
        }));
    }

    let mut writers = vec![];
    for writer in 1..=4u32 {
        let vec = Arc::clone(&vec);
        writers.push(thread::spawn(move || {
            for _ in 0..25_000 {
                vec.push(writer);
            }
        }));
    }

    for writer in writers {
        writer.join().unwrap();
    }
    done.store(true, Ordering::Relaxed);
    for reader in readers {
        reader.join().unwrap();
    }

    assert_eq!(vec.iter().count(), 100_000);
    assert_eq!(vec.size(), 100_000);
}

#[test]
fn single_page_never_links() {
    let vec = PagedVec::<u32, 64>::new();
    for value in 1..=63 {
        vec.push(value);
    }
    assert_eq!(vec.page_addresses().len(), 1);
}

#[test]
#[should_panic(expected = "sentinel")]
fn pushing_the_sentinel_traps() {
    let vec = PagedVec::<u32, 64>::new();
    vec.push(0);
}
