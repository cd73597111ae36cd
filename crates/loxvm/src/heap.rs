use std::{
    collections::BTreeMap,
    fmt,
    sync::atomic::{AtomicU32, Ordering},
};

use crate::{
    error::ObjectError,
    object::{HeapData, HeapObject, MutableHeapObject, ObjectHeader, Tag},
    resource::{ResourceError, ResourceTracker},
    string::StringObject,
    tracer::{HeapTracer, NoopTracer},
    upvalue::UpvalueObject,
    value::Value,
};

/// Largest number of slots the arena can address with a `u32` index.
const MAX_SLOTS: usize = u32::MAX as usize;

/// Source of per-heap identity stamps.
static NEXT_HEAP_STAMP: AtomicU32 = AtomicU32::new(0);

/// Snapshot of heap state at a point in time.
///
/// The `objects_by_type` map uses `BTreeMap` for deterministic iteration order,
/// making snapshots suitable for display and comparison without sort overhead.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HeapStats {
    /// Total number of live objects on the heap.
    pub live_objects: usize,
    /// Number of free (recycled) slots available for reuse.
    pub free_slots: usize,
    /// Total heap capacity (live + free).
    pub total_slots: usize,
    /// Breakdown of live objects by tag name (e.g. "String", "Upvalue").
    pub objects_by_type: BTreeMap<&'static str, usize>,
    /// Resource tracker allocation count, if using `LimitedTracker`.
    pub tracker_allocations: Option<usize>,
    /// Resource tracker memory usage in bytes, if using `LimitedTracker`.
    pub tracker_memory_bytes: Option<usize>,
}

/// Handle to an object stored in the heap arena.
///
/// A handle is the slot index plus the slot's generation at allocation time.
/// Freeing an object and reusing its slot bumps the generation, so a handle
/// kept past its object's lifetime is recognised as stale instead of silently
/// aliasing whatever was allocated next. The handle also carries the stamp of
/// the heap that issued it, so it is never accepted by a different heap.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
pub struct HeapId {
    heap: u32,
    index: u32,
    generation: u32,
}

impl HeapId {
    /// Returns the raw slot index.
    #[inline]
    #[must_use]
    pub fn index(self) -> usize {
        self.index as usize
    }

    #[inline]
    #[must_use]
    pub fn generation(self) -> u32 {
        self.generation
    }
}

impl fmt::Display for HeapId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.index, self.generation)
    }
}

/// One occupied arena slot: the object header and the object's payload.
#[derive(Debug)]
struct HeapValue {
    header: ObjectHeader,
    data: HeapData,
}

// The tag is not serialized; it is rebuilt from the payload variant so a
// snapshot cannot pair a header with the wrong kind of data.
impl serde::Serialize for HeapValue {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serde::Serialize::serialize(&(self.header.next(), &self.data), serializer)
    }
}

impl<'de> serde::Deserialize<'de> for HeapValue {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let (next, data): (Option<HeapId>, HeapData) = serde::Deserialize::deserialize(deserializer)?;
        Ok(Self {
            header: ObjectHeader::new(data.tag(), next),
            data,
        })
    }
}

/// Arena that owns every heap object of a VM.
///
/// Objects live in slots addressed by [`HeapId`]. Every live object is also
/// threaded onto an intrusive singly linked list through its header's `next`
/// field, newest first, so a collector can enumerate everything that was
/// allocated without a separate registry. The heap maintains that chain itself:
/// allocation pushes onto the head, and [`free`](Self::free) and
/// [`retain`](Self::retain) unlink before releasing a slot. Because links are
/// generation-checked handles rather than pointers, a freed object can never be
/// reached through the chain.
///
/// Freed slots go onto a free list and are reused by later allocations.
///
/// Generic over `T: ResourceTracker` to support different resource limits and
/// over `Tr: HeapTracer` for event tracing. With `NoLimitTracker` and
/// `NoopTracer` all accounting and tracing compiles away.
///
/// Mutation needs `&mut Heap`, while any number of readers may share `&Heap`,
/// including across threads. A view returned by [`downcast`](Self::downcast)
/// borrows the heap, so its object cannot be freed while the view exists.
#[derive(Debug)]
pub struct Heap<T: ResourceTracker, Tr: HeapTracer = NoopTracer> {
    entries: Vec<Option<HeapValue>>,
    /// Per-slot generation counters, bumped each time a slot is reused.
    slot_generations: Vec<u32>,
    /// Indices of freed slots available for reuse.
    free_list: Vec<u32>,
    /// Identity stamped into every handle this heap issues.
    stamp: u32,
    /// Most recently allocated live object; start of the live-object chain.
    head: Option<HeapId>,
    /// Number of live objects.
    live: usize,
    /// Resource tracker for enforcing limits.
    tracker: T,
    /// Not serialized; a loaded heap starts with a fresh tracer.
    tracer: Tr,
}

impl<T: ResourceTracker> Heap<T> {
    /// Creates a new, untraced heap with the given resource tracker.
    #[must_use]
    pub fn new(capacity: usize, tracker: T) -> Self {
        Self::with_tracer(capacity, tracker, NoopTracer)
    }
}

impl<T: ResourceTracker, Tr: HeapTracer> Heap<T, Tr> {
    /// Creates a new heap with the given resource tracker and event tracer.
    #[must_use]
    pub fn with_tracer(capacity: usize, tracker: T, tracer: Tr) -> Self {
        Self {
            entries: Vec::with_capacity(capacity),
            slot_generations: Vec::with_capacity(capacity),
            free_list: Vec::new(),
            stamp: NEXT_HEAP_STAMP.fetch_add(1, Ordering::Relaxed),
            head: None,
            live: 0,
            tracker,
            tracer,
        }
    }

    /// Allocates a new object and links it onto the live-object chain.
    ///
    /// The header's tag is taken from the payload variant.
    ///
    /// # Errors
    /// Returns `ObjectError::OutOfMemory` if the resource tracker rejects the
    /// allocation or the arena has run out of addressable slots. A rejected
    /// allocation leaves the heap unchanged.
    pub fn allocate(&mut self, data: HeapData) -> Result<HeapId, ObjectError> {
        let tag = data.tag();
        let size = data.estimate_size();

        if self.free_list.is_empty() && self.entries.len() >= MAX_SLOTS {
            return Err(self.reject(
                tag,
                ResourceError::Allocation {
                    limit: MAX_SLOTS,
                    count: self.entries.len() + 1,
                },
            ));
        }
        if let Err(err) = self.tracker.on_allocate(|| size) {
            return Err(self.reject(tag, err));
        }

        let entry = HeapValue {
            header: ObjectHeader::new(tag, self.head),
            data,
        };

        let id = if let Some(index) = self.free_list.pop() {
            // Reuse a freed slot under a new generation
            let slot = index as usize;
            let generation = self.slot_generations[slot].wrapping_add(1);
            self.slot_generations[slot] = generation;
            self.entries[slot] = Some(entry);
            HeapId {
                heap: self.stamp,
                index,
                generation,
            }
        } else {
            #[expect(clippy::cast_possible_truncation, reason = "bounded by the MAX_SLOTS check above")]
            let index = self.entries.len() as u32;
            self.slot_generations.push(0);
            self.entries.push(Some(entry));
            HeapId {
                heap: self.stamp,
                index,
                generation: 0,
            }
        };

        self.head = Some(id);
        self.live += 1;
        self.tracer.on_allocate(id, tag, size);
        Ok(id)
    }

    fn reject(&mut self, tag: Tag, err: ResourceError) -> ObjectError {
        self.tracer.on_rejected(tag, &err);
        err.into()
    }

    /// Allocates a string object holding a copy of `bytes`.
    ///
    /// Any byte sequence is accepted, including the empty one.
    ///
    /// # Errors
    /// Only `ObjectError::OutOfMemory`.
    pub fn make_string(&mut self, bytes: &[u8]) -> Result<HeapId, ObjectError> {
        let string = StringObject::new(bytes).map_err(|err| self.reject(Tag::String, err))?;
        self.allocate(HeapData::Str(string))
    }

    /// Allocates a closed upvalue holding `value`.
    ///
    /// # Errors
    /// Only `ObjectError::OutOfMemory`.
    pub fn make_upvalue(&mut self, value: Value) -> Result<HeapId, ObjectError> {
        self.allocate(HeapData::Upvalue(UpvalueObject::new(value)))
    }

    fn entry(&self, id: HeapId) -> Option<&HeapValue> {
        if id.heap != self.stamp || self.slot_generations.get(id.index()) != Some(&id.generation) {
            return None;
        }
        self.entries[id.index()].as_ref()
    }

    fn entry_mut(&mut self, id: HeapId) -> Option<&mut HeapValue> {
        if id.heap != self.stamp || self.slot_generations.get(id.index()) != Some(&id.generation) {
            return None;
        }
        self.entries[id.index()].as_mut()
    }

    /// Returns whether `id` refers to a live object of this heap.
    #[must_use]
    pub fn contains(&self, id: HeapId) -> bool {
        self.entry(id).is_some()
    }

    /// Returns the header of a live object.
    ///
    /// # Panics
    /// Panics if `id` is stale or does not belong to this heap.
    #[must_use]
    pub fn header(&self, id: HeapId) -> &ObjectHeader {
        &self.entry(id).expect("Heap::header: stale or foreign heap id").header
    }

    /// Returns the payload of a live object.
    ///
    /// # Panics
    /// Panics if `id` is stale or does not belong to this heap.
    #[must_use]
    pub fn get(&self, id: HeapId) -> &HeapData {
        &self.entry(id).expect("Heap::get: stale or foreign heap id").data
    }

    /// Returns the payload if `id` refers to a live object.
    ///
    /// Unlike `get`, this returns `None` instead of panicking.
    #[must_use]
    pub fn get_if_live(&self, id: HeapId) -> Option<&HeapData> {
        self.entry(id).map(|entry| &entry.data)
    }

    /// Returns the tag of a live object.
    ///
    /// # Panics
    /// Panics if `id` is stale or does not belong to this heap.
    #[must_use]
    pub fn tag_of(&self, id: HeapId) -> Tag {
        self.header(id).tag()
    }

    /// Returns whether the object's tag is `tag`.
    #[must_use]
    pub fn is(&self, id: HeapId, tag: Tag) -> bool {
        self.tag_of(id) == tag
    }

    /// Checked view of an object as the concrete variant `O`.
    ///
    /// The returned reference points into the object's own storage; nothing is
    /// copied.
    ///
    /// ```
    /// use loxvm::{Heap, NoLimitTracker, ObjectError, StringObject, Tag, UpvalueObject};
    ///
    /// let mut heap = Heap::new(4, NoLimitTracker);
    /// let id = heap.make_string(b"Hello, world!").unwrap();
    /// assert_eq!(heap.downcast::<StringObject>(id).unwrap().as_bytes(), b"Hello, world!");
    /// assert_eq!(
    ///     heap.downcast::<UpvalueObject>(id).unwrap_err(),
    ///     ObjectError::TypeMismatch { expected: Tag::Upvalue, found: Tag::String },
    /// );
    /// ```
    ///
    /// # Errors
    /// Returns `ObjectError::TypeMismatch` if the object is not an `O`.
    ///
    /// # Panics
    /// Panics if `id` is stale or does not belong to this heap.
    pub fn downcast<O: HeapObject>(&self, id: HeapId) -> Result<&O, ObjectError> {
        let entry = self.entry(id).expect("Heap::downcast: stale or foreign heap id");
        debug_assert_eq!(entry.header.tag(), entry.data.tag());
        entry.data.downcast_ref()
    }

    /// Checked mutable view of an object as the concrete variant `O`.
    ///
    /// Only variants implementing [`MutableHeapObject`] can be borrowed mutably;
    /// strings cannot:
    ///
    /// ```compile_fail
    /// use loxvm::{Heap, NoLimitTracker, StringObject};
    ///
    /// let mut heap = Heap::new(4, NoLimitTracker);
    /// let id = heap.make_string(b"fixed").unwrap();
    /// let _ = heap.downcast_mut::<StringObject>(id);
    /// ```
    ///
    /// # Errors
    /// Returns `ObjectError::TypeMismatch` if the object is not an `O`.
    ///
    /// # Panics
    /// Panics if `id` is stale or does not belong to this heap.
    pub fn downcast_mut<O: MutableHeapObject>(&mut self, id: HeapId) -> Result<&mut O, ObjectError> {
        let entry = self
            .entry_mut(id)
            .expect("Heap::downcast_mut: stale or foreign heap id");
        entry.data.downcast_mut()
    }

    /// Pushes every heap id the object refers to onto `work_list`.
    ///
    /// # Panics
    /// Panics if `id` is stale or does not belong to this heap.
    pub fn trace(&self, id: HeapId, work_list: &mut Vec<HeapId>) {
        self.get(id).trace(work_list);
    }

    /// Iterates the live-object chain from the newest object to the oldest.
    pub fn objects(&self) -> impl Iterator<Item = HeapId> + '_ {
        std::iter::successors(self.head, |&id| self.header(id).next())
    }

    /// Unlinks an object from the live-object chain, releases its slot and
    /// returns its payload.
    ///
    /// Unlinking walks the chain to find the predecessor, so this is linear in
    /// the number of newer objects. Use [`retain`](Self::retain) to free many
    /// objects in one pass.
    ///
    /// # Panics
    /// Panics if `id` is stale or does not belong to this heap.
    pub fn free(&mut self, id: HeapId) -> HeapData {
        let next = self.header(id).next();
        if self.head == Some(id) {
            self.head = next;
        } else {
            let prev = self
                .objects()
                .find(|&candidate| self.header(candidate).next() == Some(id))
                .expect("Heap::free: live object missing from chain");
            self.link(prev, next);
        }
        self.release(id)
    }

    /// Frees every object for which `keep` returns `false`, in one walk over the
    /// live-object chain. Returns the number of objects freed.
    ///
    /// This is the sweep primitive an external collector drives after marking.
    pub fn retain(&mut self, mut keep: impl FnMut(HeapId, &HeapData) -> bool) -> usize {
        let mut prev: Option<HeapId> = None;
        let mut cursor = self.head;
        let mut freed = 0;

        while let Some(id) = cursor {
            let entry = self.entry(id).expect("Heap::retain: chain points at a freed slot");
            let next = entry.header.next();
            if keep(id, &entry.data) {
                prev = Some(id);
            } else {
                match prev {
                    Some(prev) => self.link(prev, next),
                    None => self.head = next,
                }
                drop(self.release(id));
                freed += 1;
            }
            cursor = next;
        }

        freed
    }

    /// Points `prev`'s chain link at `next`.
    fn link(&mut self, prev: HeapId, next: Option<HeapId>) {
        self.entry_mut(prev)
            .expect("Heap::link: stale predecessor")
            .header
            .set_next(next);
    }

    /// Takes an already unlinked object out of its slot.
    fn release(&mut self, id: HeapId) -> HeapData {
        let entry = self.entries[id.index()]
            .take()
            .expect("Heap::release: object already freed");
        self.free_list.push(id.index);
        self.live -= 1;
        self.tracker.on_free(|| entry.data.estimate_size());
        self.tracer.on_free(id, entry.header.tag());
        entry.data
    }

    /// Number of live objects.
    #[must_use]
    pub fn len(&self) -> usize {
        self.live
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.live == 0
    }

    /// Returns a snapshot of the current heap state.
    ///
    /// Tracker stats are populated only when the tracker records them
    /// (`LimitedTracker`); for `NoLimitTracker` both fields are `None`.
    #[must_use]
    pub fn heap_stats(&self) -> HeapStats {
        let mut objects_by_type: BTreeMap<&'static str, usize> = BTreeMap::new();
        for entry in self.entries.iter().flatten() {
            *objects_by_type.entry(entry.data.variant_name()).or_insert(0) += 1;
        }

        HeapStats {
            live_objects: self.live,
            free_slots: self.free_list.len(),
            total_slots: self.entries.len(),
            objects_by_type,
            tracker_allocations: self.tracker.allocation_count(),
            tracker_memory_bytes: self.tracker.current_memory_bytes(),
        }
    }

    #[must_use]
    pub fn tracker(&self) -> &T {
        &self.tracker
    }

    pub fn tracker_mut(&mut self) -> &mut T {
        &mut self.tracker
    }

    #[must_use]
    pub fn tracer(&self) -> &Tr {
        &self.tracer
    }

    pub fn tracer_mut(&mut self) -> &mut Tr {
        &mut self.tracer
    }

    /// Serializes the heap into a postcard snapshot.
    ///
    /// Handles, chain order, the free list and tracker state are preserved; the
    /// tracer is not.
    pub fn dump(&self) -> Result<Vec<u8>, postcard::Error>
    where
        T: serde::Serialize,
    {
        postcard::to_allocvec(self)
    }

    /// Restores a heap from a snapshot produced by [`dump`](Self::dump).
    ///
    /// String hashes are recomputed from their payloads. The live-object chain
    /// and the tracker counters are checked against the slot table. The loaded
    /// heap keeps the identity of the heap it was dumped from, so handles saved
    /// alongside the snapshot stay valid.
    pub fn load(bytes: &[u8]) -> Result<Self, postcard::Error>
    where
        T: serde::de::DeserializeOwned,
        Tr: Default,
    {
        postcard::from_bytes(bytes)
    }
}

impl<T: ResourceTracker + serde::Serialize, Tr: HeapTracer> serde::Serialize for Heap<T, Tr> {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        use serde::ser::SerializeStruct;

        let mut state = serializer.serialize_struct("Heap", 6)?;
        state.serialize_field("entries", &self.entries)?;
        state.serialize_field("slot_generations", &self.slot_generations)?;
        state.serialize_field("free_list", &self.free_list)?;
        state.serialize_field("stamp", &self.stamp)?;
        state.serialize_field("head", &self.head)?;
        state.serialize_field("tracker", &self.tracker)?;
        state.end()
    }
}

impl<'de, T, Tr> serde::Deserialize<'de> for Heap<T, Tr>
where
    T: ResourceTracker + serde::Deserialize<'de>,
    Tr: HeapTracer + Default,
{
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        use serde::de::Error;

        #[derive(serde::Deserialize)]
        struct HeapFields<T> {
            entries: Vec<Option<HeapValue>>,
            slot_generations: Vec<u32>,
            free_list: Vec<u32>,
            stamp: u32,
            head: Option<HeapId>,
            tracker: T,
        }

        let fields = <HeapFields<T> as serde::Deserialize>::deserialize(deserializer)?;
        if fields.slot_generations.len() != fields.entries.len() {
            return Err(D::Error::custom("slot generation table does not match entries"));
        }

        let live = fields.entries.iter().filter(|slot| slot.is_some()).count();
        if fields.free_list.len() != fields.entries.len() - live {
            return Err(D::Error::custom("free list does not match empty slots"));
        }
        // Each empty slot must be listed exactly once.
        let mut listed = vec![false; fields.entries.len()];
        for &index in &fields.free_list {
            let slot = index as usize;
            if !matches!(fields.entries.get(slot), Some(None)) || listed[slot] {
                return Err(D::Error::custom("free list does not match empty slots"));
            }
            listed[slot] = true;
        }

        let heap = Self {
            entries: fields.entries,
            slot_generations: fields.slot_generations,
            free_list: fields.free_list,
            stamp: fields.stamp,
            head: fields.head,
            live,
            tracker: fields.tracker,
            tracer: Tr::default(),
        };

        // Every live object must appear on the chain exactly once.
        let mut seen = 0;
        let mut cursor = heap.head;
        while let Some(id) = cursor {
            seen += 1;
            if seen > live {
                return Err(D::Error::custom("live-object chain is longer than the heap"));
            }
            let Some(entry) = heap.entry(id) else {
                return Err(D::Error::custom("live-object chain points at a freed slot"));
            };
            cursor = entry.header.next();
        }
        if seen != live {
            return Err(D::Error::custom("live-object chain misses objects"));
        }

        // Tracker counters must account for what the snapshot actually holds.
        if let Some(memory) = heap.tracker.current_memory_bytes() {
            let held = heap
                .entries
                .iter()
                .flatten()
                .fold(0usize, |total, entry| total.saturating_add(entry.data.estimate_size()));
            if memory != held {
                return Err(D::Error::custom("tracker memory does not match live objects"));
            }
        }
        if let Some(count) = heap.tracker.allocation_count()
            && count < live
        {
            return Err(D::Error::custom("tracker allocation count is below live objects"));
        }

        Ok(heap)
    }
}
