//! Fuzz target: build string objects from arbitrary bytes.
//!
//! Every input must come back byte for byte with a length equal to the input
//! length and a hash equal to FNV-1a of the input, and must survive a sweep
//! that frees every other object.

#![no_main]

use libfuzzer_sys::fuzz_target;

use loxvm::{Heap, NoLimitTracker, StringObject, fnv1a_32};

fuzz_target!(|data: &[u8]| {
    let mut heap = Heap::new(4, NoLimitTracker);
    let id = heap.make_string(data).unwrap();
    // Split the input into chunks so the chain has several neighbours to relink.
    for chunk in data.chunks(7) {
        heap.make_string(chunk).unwrap();
    }
    heap.retain(|candidate, _| candidate == id);

    let s = heap.downcast::<StringObject>(id).unwrap();
    assert_eq!(s.len(), data.len());
    assert_eq!(s.as_bytes(), data);
    assert_eq!(s.hash(), fnv1a_32(data));
    assert_eq!(heap.objects().collect::<Vec<_>>(), vec![id]);
});
