use crate::heap::HeapId;

/// Primary value type stored in VM slots and inside heap objects.
///
/// Scalars are stored inline; anything that needs heap storage is a `Ref` to an
/// arena slot. A `Value` never owns the object it refers to: the heap does, and
/// the collector decides when it goes away.
#[derive(Debug, Clone, Copy, PartialEq, Default, serde::Serialize, serde::Deserialize)]
pub enum Value {
    #[default]
    Nil,
    Bool(bool),
    Number(f64),
    /// A reference to a heap object.
    Ref(HeapId),
}

impl Value {
    /// Returns the heap reference held by this value, if any.
    #[inline]
    #[must_use]
    pub fn as_ref_id(&self) -> Option<HeapId> {
        match self {
            Self::Ref(id) => Some(*id),
            _ => None,
        }
    }
}

impl From<HeapId> for Value {
    fn from(id: HeapId) -> Self {
        Self::Ref(id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{heap::Heap, resource::NoLimitTracker};

    #[test]
    fn only_refs_carry_an_id() {
        let mut heap = Heap::new(1, NoLimitTracker);
        let id = heap.make_string(b"target").unwrap();

        assert_eq!(Value::from(id).as_ref_id(), Some(id));
        assert_eq!(Value::Nil.as_ref_id(), None);
        assert_eq!(Value::Bool(true).as_ref_id(), None);
        assert_eq!(Value::Number(0.0).as_ref_id(), None);
    }

    #[test]
    fn default_is_nil() {
        assert_eq!(Value::default(), Value::Nil);
    }
}
