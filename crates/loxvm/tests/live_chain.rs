//! Tests for the live-object chain and the collector-facing heap interface.
//!
//! The heap threads every live object onto a newest-first chain through its
//! header. These tests check that the chain always lists exactly the live
//! objects, that `free` and `retain` keep it intact, and that handles to freed
//! objects are recognised as stale.

use ahash::AHashSet;
use loxvm::{Heap, HeapId, NoLimitTracker, StringObject, UpvalueObject, Value};
use pretty_assertions::assert_eq;

fn strings(heap: &mut Heap<NoLimitTracker>, count: usize) -> Vec<HeapId> {
    (0..count)
        .map(|i| heap.make_string(format!("s{i}").as_bytes()).unwrap())
        .collect()
}

// =============================================================================
// 1. Chain Order
// =============================================================================

/// A fresh heap has an empty chain.
#[test]
fn empty_heap_has_empty_chain() {
    let heap = Heap::new(0, NoLimitTracker);
    assert!(heap.is_empty());
    assert_eq!(heap.objects().count(), 0);
}

/// Allocation pushes onto the head, so the chain runs newest first.
#[test]
fn chain_is_newest_first() {
    let mut heap = Heap::new(4, NoLimitTracker);
    let ids = strings(&mut heap, 4);

    let chain: Vec<_> = heap.objects().collect();
    let expected: Vec<_> = ids.iter().rev().copied().collect();
    assert_eq!(chain, expected);

    assert_eq!(heap.header(ids[0]).next(), None, "oldest object ends the chain");
    assert_eq!(heap.header(ids[3]).next(), Some(ids[2]));
}

/// Freeing the head, a middle object and the tail all leave a chain of exactly
/// the remaining objects.
#[test]
fn free_keeps_chain_exact() {
    let mut heap = Heap::new(5, NoLimitTracker);
    let ids = strings(&mut heap, 5);

    heap.free(ids[4]);
    heap.free(ids[2]);
    heap.free(ids[0]);

    assert_eq!(heap.objects().collect::<Vec<_>>(), vec![ids[3], ids[1]]);
    assert_eq!(heap.len(), 2);
    assert_eq!(heap.header(ids[1]).next(), None);
}

// =============================================================================
// 2. Stale Handles
// =============================================================================

/// A handle to a freed object stays stale after its slot is reused.
#[test]
fn stale_handle_after_reuse() {
    let mut heap = Heap::new(2, NoLimitTracker);
    let old = heap.make_string(b"old").unwrap();
    heap.free(old);
    let new = heap.make_string(b"new").unwrap();

    assert_eq!(old.index(), new.index(), "slot should be recycled");
    assert_ne!(old, new);
    assert!(!heap.contains(old));
    assert!(heap.get_if_live(old).is_none());
    assert!(heap.contains(new));
    assert_eq!(heap.objects().collect::<Vec<_>>(), vec![new]);
}

/// Downcasting through a stale handle is a programming error.
#[test]
#[should_panic(expected = "Heap::downcast: stale or foreign heap id")]
fn downcast_stale_handle_panics() {
    let mut heap = Heap::new(1, NoLimitTracker);
    let id = heap.make_string(b"gone").unwrap();
    heap.free(id);
    let _ = heap.downcast::<StringObject>(id);
}

/// Handles from one heap are never accepted by another, even when the other
/// heap has a live object at the same index and generation.
#[test]
fn foreign_handle_is_rejected() {
    let mut a = Heap::new(1, NoLimitTracker);
    let mut b = Heap::new(1, NoLimitTracker);
    let from_a = a.make_string(b"from a").unwrap();
    let from_b = b.make_string(b"from b").unwrap();

    assert_eq!(from_a.index(), from_b.index());
    assert_eq!(from_a.generation(), from_b.generation());
    assert_ne!(from_a, from_b);
    assert!(!b.contains(from_a));
    assert!(b.get_if_live(from_a).is_none());
    assert!(a.contains(from_a));
}

/// Downcasting through another heap's handle is a programming error.
#[test]
#[should_panic(expected = "Heap::downcast: stale or foreign heap id")]
fn downcast_foreign_handle_panics() {
    let mut a = Heap::new(1, NoLimitTracker);
    let mut b = Heap::new(1, NoLimitTracker);
    let from_a = a.make_string(b"from a").unwrap();
    b.make_string(b"from b").unwrap();
    let _ = b.downcast::<StringObject>(from_a);
}

// =============================================================================
// 3. Sweeping
// =============================================================================

/// `retain` frees exactly the rejected objects in one pass.
#[test]
fn retain_frees_rejected_objects() {
    let mut heap = Heap::new(6, NoLimitTracker);
    let ids = strings(&mut heap, 6);
    let keep: AHashSet<HeapId> = [ids[0], ids[3], ids[5]].into_iter().collect();

    let freed = heap.retain(|id, _| keep.contains(&id));

    assert_eq!(freed, 3);
    assert_eq!(heap.objects().collect::<Vec<_>>(), vec![ids[5], ids[3], ids[0]]);
    for id in &ids {
        assert_eq!(heap.contains(*id), keep.contains(id), "liveness wrong for {id}");
    }
}

/// Keeping everything frees nothing; keeping nothing empties the heap.
#[test]
fn retain_extremes() {
    let mut heap = Heap::new(3, NoLimitTracker);
    strings(&mut heap, 3);

    assert_eq!(heap.retain(|_, _| true), 0);
    assert_eq!(heap.len(), 3);

    assert_eq!(heap.retain(|_, _| false), 3);
    assert!(heap.is_empty());
    assert_eq!(heap.objects().next(), None);
    assert_eq!(heap.heap_stats().free_slots, 3);
}

/// A mark phase driven by `trace` followed by a `retain` sweep keeps exactly
/// what is reachable from the roots.
#[test]
fn mark_and_sweep() {
    let mut heap = Heap::new(8, NoLimitTracker);
    let captured = heap.make_string(b"captured").unwrap();
    let garbage = heap.make_string(b"garbage").unwrap();
    let inner = heap.make_upvalue(Value::Ref(captured)).unwrap();
    let root = heap.make_upvalue(Value::Ref(inner)).unwrap();
    let dead_cell = heap.make_upvalue(Value::Ref(garbage)).unwrap();

    let mut marked = AHashSet::new();
    let mut work_list = vec![root];
    while let Some(id) = work_list.pop() {
        if marked.insert(id) {
            heap.trace(id, &mut work_list);
        }
    }
    let freed = heap.retain(|id, _| marked.contains(&id));

    assert_eq!(freed, 2);
    assert!(!heap.contains(garbage));
    assert!(!heap.contains(dead_cell));
    assert_eq!(heap.objects().collect::<Vec<_>>(), vec![root, inner, captured]);
    assert_eq!(
        heap.downcast::<UpvalueObject>(inner).unwrap().get(),
        Value::Ref(captured)
    );
}

// =============================================================================
// 4. Stats
// =============================================================================

/// Stats count live objects per variant and recycled slots.
#[test]
fn heap_stats_by_type() {
    let mut heap = Heap::new(4, NoLimitTracker);
    let ids = strings(&mut heap, 3);
    heap.make_upvalue(Value::Bool(true)).unwrap();
    heap.free(ids[1]);

    let stats = heap.heap_stats();
    assert_eq!(stats.live_objects, 3);
    assert_eq!(stats.free_slots, 1);
    assert_eq!(stats.total_slots, 4);
    assert_eq!(
        stats.objects_by_type.into_iter().collect::<Vec<_>>(),
        vec![("String", 2), ("Upvalue", 1)]
    );
    assert_eq!(stats.tracker_allocations, None);
    assert_eq!(stats.tracker_memory_bytes, None);
}
