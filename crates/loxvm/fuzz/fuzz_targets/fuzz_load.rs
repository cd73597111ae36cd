//! Fuzz target: load arbitrary bytes as a heap snapshot.
//!
//! Loading must either fail or produce a heap whose live-object chain visits
//! every live object exactly once. It must never panic.

#![no_main]

use libfuzzer_sys::fuzz_target;

use loxvm::{Heap, LimitedTracker};

fuzz_target!(|data: &[u8]| {
    let Ok(heap) = Heap::<LimitedTracker>::load(data) else {
        return;
    };
    assert_eq!(heap.objects().count(), heap.len());
    for id in heap.objects() {
        assert!(heap.contains(id));
        let _ = heap.get(id).tag();
    }
});
