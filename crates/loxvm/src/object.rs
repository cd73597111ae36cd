//! The tagged heap-object model.
//!
//! Every heap object is an [`ObjectHeader`] plus one [`HeapData`] variant. The
//! header's [`Tag`] names the variant, and the only way from a generic object to
//! variant-specific fields is a checked downcast through [`HeapObject`], which
//! fails with [`ObjectError::TypeMismatch`] instead of reinterpreting storage.

use strum::{Display, EnumIter, FromRepr, IntoStaticStr};

use crate::{error::ObjectError, heap::HeapId, string::StringObject, upvalue::UpvalueObject};

/// Identifies the concrete variant of a heap object.
///
/// The set is closed. Codes are stable because snapshots and byte-level tooling
/// may record them; `0` is reserved and never names a variant, so a zeroed tag
/// byte is always detectably invalid.
#[repr(u8)]
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    PartialOrd,
    Ord,
    FromRepr,
    IntoStaticStr,
    Display,
    EnumIter,
    serde::Serialize,
    serde::Deserialize,
)]
pub enum Tag {
    String = 1,
    Upvalue = 2,
}

impl Tag {
    /// The raw tag code.
    #[inline]
    #[must_use]
    pub fn code(self) -> u8 {
        self as u8
    }
}

/// Common bookkeeping shared by every heap object.
///
/// `tag` is fixed when the object is allocated and has no setter. `next` threads
/// the object onto the heap's live-object chain; only the heap rewrites it, when
/// an object is allocated or unlinked.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ObjectHeader {
    tag: Tag,
    next: Option<HeapId>,
}

impl ObjectHeader {
    pub(crate) fn new(tag: Tag, next: Option<HeapId>) -> Self {
        Self { tag, next }
    }

    #[inline]
    #[must_use]
    pub fn tag(&self) -> Tag {
        self.tag
    }

    /// The next (older) object on the live-object chain.
    #[inline]
    #[must_use]
    pub fn next(&self) -> Option<HeapId> {
        self.next
    }

    #[inline]
    pub(crate) fn set_next(&mut self, next: Option<HeapId>) {
        self.next = next;
    }
}

/// Payload of a heap object, one variant per [`Tag`].
#[derive(Debug, PartialEq, serde::Serialize, serde::Deserialize)]
pub enum HeapData {
    Str(StringObject),
    Upvalue(UpvalueObject),
}

impl HeapData {
    /// The tag matching this variant.
    #[must_use]
    pub fn tag(&self) -> Tag {
        match self {
            Self::Str(_) => Tag::String,
            Self::Upvalue(_) => Tag::Upvalue,
        }
    }

    /// Static variant name, used as the key in heap statistics.
    #[must_use]
    pub fn variant_name(&self) -> &'static str {
        self.tag().into()
    }

    /// Approximate heap footprint in bytes, used for resource accounting.
    #[must_use]
    pub fn estimate_size(&self) -> usize {
        match self {
            Self::Str(s) => s.estimate_size(),
            Self::Upvalue(_) => std::mem::size_of::<UpvalueObject>(),
        }
    }

    /// Pushes every heap id this object refers to onto `work_list`.
    ///
    /// Strings are leaves. This is the hook a collector's mark phase uses.
    pub fn trace(&self, work_list: &mut Vec<HeapId>) {
        match self {
            Self::Str(_) => {}
            Self::Upvalue(u) => u.trace(work_list),
        }
    }

    /// Checked view of this payload as the concrete variant `T`.
    pub fn downcast_ref<T: HeapObject>(&self) -> Result<&T, ObjectError> {
        T::from_data(self).ok_or_else(|| ObjectError::type_mismatch(T::TAG, self.tag()))
    }

    /// Checked mutable view of this payload as the concrete variant `T`.
    pub fn downcast_mut<T: MutableHeapObject>(&mut self) -> Result<&mut T, ObjectError> {
        let found = self.tag();
        T::from_data_mut(self).ok_or_else(|| ObjectError::type_mismatch(T::TAG, found))
    }
}

mod sealed {
    pub trait Sealed {}

    impl Sealed for crate::string::StringObject {}
    impl Sealed for crate::upvalue::UpvalueObject {}
}

/// A concrete heap object variant.
///
/// Implementations guarantee that `from_data` returns `Some` exactly when the
/// payload's tag equals `TAG`. The trait is sealed so that guarantee cannot be
/// broken from outside the crate.
pub trait HeapObject: sealed::Sealed + Sized {
    /// The tag every object of this type carries.
    const TAG: Tag;

    fn from_data(data: &HeapData) -> Option<&Self>;
}

/// A heap object variant whose fields may change after allocation.
///
/// Strings do not implement this, so no `&mut StringObject` can be obtained
/// from the heap.
pub trait MutableHeapObject: HeapObject {
    fn from_data_mut(data: &mut HeapData) -> Option<&mut Self>;
}

#[cfg(test)]
mod tests {
    use strum::IntoEnumIterator;

    use super::*;
    use crate::value::Value;

    fn sample(tag: Tag) -> HeapData {
        match tag {
            Tag::String => HeapData::Str(StringObject::new(b"sample").unwrap()),
            Tag::Upvalue => HeapData::Upvalue(UpvalueObject::new(Value::Number(1.0))),
        }
    }

    #[test]
    fn zero_is_not_a_tag() {
        assert_eq!(Tag::from_repr(0), None);
        assert_eq!(Tag::from_repr(1), Some(Tag::String));
        assert_eq!(Tag::from_repr(2), Some(Tag::Upvalue));
        assert_eq!(Tag::from_repr(3), None);
    }

    #[test]
    fn codes_round_trip() {
        for tag in Tag::iter() {
            assert_ne!(tag.code(), 0);
            assert_eq!(Tag::from_repr(tag.code()), Some(tag));
        }
    }

    #[test]
    fn variant_tags_agree() {
        for tag in Tag::iter() {
            let data = sample(tag);
            assert_eq!(data.tag(), tag);
            assert_eq!(data.variant_name(), tag.to_string());
        }
    }

    #[test]
    fn from_data_matches_tag_exactly() {
        for tag in Tag::iter() {
            let data = sample(tag);
            assert_eq!(StringObject::from_data(&data).is_some(), tag == StringObject::TAG);
            assert_eq!(UpvalueObject::from_data(&data).is_some(), tag == UpvalueObject::TAG);
        }
    }

    #[test]
    fn downcast_ref_mismatch() {
        let data = sample(Tag::String);
        let err = data.downcast_ref::<UpvalueObject>().unwrap_err();
        assert_eq!(
            err,
            ObjectError::TypeMismatch {
                expected: Tag::Upvalue,
                found: Tag::String,
            }
        );
    }

    #[test]
    fn string_is_a_leaf() {
        let mut work_list = Vec::new();
        sample(Tag::String).trace(&mut work_list);
        assert!(work_list.is_empty());
    }
}
