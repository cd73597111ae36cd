//! Tests for shared read access to a heap across threads.

use std::thread;

use loxvm::{Heap, LimitedTracker, NoLimitTracker, NoopTracer, ProfilingTracer, StringObject, fnv1a_32};

fn assert_send_sync<T: Send + Sync>() {}

#[test]
fn heap_is_send_and_sync() {
    assert_send_sync::<Heap<NoLimitTracker>>();
    assert_send_sync::<Heap<LimitedTracker, NoopTracer>>();
    assert_send_sync::<Heap<NoLimitTracker, ProfilingTracer>>();
}

/// Many threads reading the same objects through `&Heap` see identical bytes
/// and hashes.
#[test]
fn concurrent_readers_agree() {
    let mut heap = Heap::new(64, NoLimitTracker);
    let ids: Vec<_> = (0..64)
        .map(|i| heap.make_string(format!("shared string {i}").as_bytes()).unwrap())
        .collect();
    let heap = &heap;
    let ids = &ids;

    let results: Vec<Vec<(Vec<u8>, u32)>> = thread::scope(|scope| {
        let handles: Vec<_> = (0..8)
            .map(|_| {
                scope.spawn(move || {
                    ids.iter()
                        .map(|&id| {
                            let s = heap.downcast::<StringObject>(id).unwrap();
                            (s.as_bytes().to_vec(), s.hash())
                        })
                        .collect::<Vec<_>>()
                })
            })
            .collect();
        handles.into_iter().map(|handle| handle.join().unwrap()).collect()
    });

    for result in &results {
        assert_eq!(result, &results[0]);
    }
    for (bytes, hash) in &results[0] {
        assert_eq!(*hash, fnv1a_32(bytes));
    }
}
