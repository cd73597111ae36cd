use crate::{
    heap::HeapId,
    object::{HeapData, HeapObject, MutableHeapObject, Tag},
    value::Value,
};

/// A closed-over variable captured by a closure.
///
/// Unlike strings, upvalues are mutable: assigning to a captured variable
/// writes through the cell. Any heap reference stored here is an outgoing edge
/// the collector must follow, reported by [`UpvalueObject::trace`].
#[derive(Debug, Clone, PartialEq, Default, serde::Serialize, serde::Deserialize)]
pub struct UpvalueObject {
    closed: Value,
}

impl UpvalueObject {
    #[must_use]
    pub fn new(closed: Value) -> Self {
        Self { closed }
    }

    /// The captured value.
    #[must_use]
    pub fn get(&self) -> Value {
        self.closed
    }

    /// Replaces the captured value, returning the previous one.
    pub fn set(&mut self, value: Value) -> Value {
        std::mem::replace(&mut self.closed, value)
    }

    /// Pushes the heap reference held by this upvalue, if any.
    pub fn trace(&self, work_list: &mut Vec<HeapId>) {
        if let Some(id) = self.closed.as_ref_id() {
            work_list.push(id);
        }
    }
}

impl HeapObject for UpvalueObject {
    const TAG: Tag = Tag::Upvalue;

    fn from_data(data: &HeapData) -> Option<&Self> {
        match data {
            HeapData::Upvalue(u) => Some(u),
            _ => None,
        }
    }
}

impl MutableHeapObject for UpvalueObject {
    fn from_data_mut(data: &mut HeapData) -> Option<&mut Self> {
        match data {
            HeapData::Upvalue(u) => Some(u),
            _ => None,
        }
    }
}
