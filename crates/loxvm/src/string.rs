//! Implementation of the Lox string object.
//!
//! A string object owns a single boxed buffer holding the payload bytes followed
//! by one NUL terminator. The terminator exists only so the payload can be
//! handed to byte-string APIs that expect one; it is not part of the string's
//! value and is not counted in its length.
//!
//! The payload and hash are fixed at construction. There is no method on
//! [`StringObject`] that takes `&mut self`, and it does not implement
//! [`MutableHeapObject`](crate::MutableHeapObject), so the heap never hands out a
//! `&mut StringObject`.

use std::{fmt, str::Utf8Error};

use crate::{
    hash::fnv1a_32,
    object::{HeapData, HeapObject, Tag},
    resource::ResourceError,
};

/// Heap-allocated Lox string.
///
/// Equality compares payload bytes, not identity. Two independently allocated
/// strings with the same content compare equal here but live in distinct heap
/// slots with distinct `HeapId`s.
#[derive(Debug, PartialEq, Eq)]
pub struct StringObject {
    /// FNV-1a hash of the payload, computed once in [`StringObject::new`].
    hash: u32,
    /// Payload bytes followed by a single `0` terminator.
    chars: Box<[u8]>,
}

impl StringObject {
    /// Creates a string object from a copy of `bytes`.
    ///
    /// The caller keeps ownership of `bytes`; the new object owns its own copy.
    /// `bytes` may be empty and need not be valid UTF-8.
    ///
    /// # Errors
    /// Returns `ResourceError::Exhausted` if the payload buffer cannot be reserved.
    pub fn new(bytes: &[u8]) -> Result<Self, ResourceError> {
        let requested = bytes.len() + 1;
        let mut chars = Vec::new();
        chars
            .try_reserve_exact(requested)
            .map_err(|_| ResourceError::Exhausted { requested })?;
        chars.extend_from_slice(bytes);
        chars.push(0);

        Ok(Self {
            hash: fnv1a_32(bytes),
            chars: chars.into_boxed_slice(),
        })
    }

    /// Byte length of the payload, excluding the terminator.
    #[inline]
    #[must_use]
    pub fn len(&self) -> usize {
        self.chars.len() - 1
    }

    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// The cached payload hash.
    #[inline]
    #[must_use]
    pub fn hash(&self) -> u32 {
        self.hash
    }

    /// Read-only view of exactly `len()` payload bytes.
    #[inline]
    #[must_use]
    pub fn as_bytes(&self) -> &[u8] {
        &self.chars[..self.len()]
    }

    /// The payload followed by its NUL terminator.
    ///
    /// The payload itself may contain interior NUL bytes, so this is not
    /// necessarily a valid C string.
    #[inline]
    #[must_use]
    pub fn as_bytes_with_nul(&self) -> &[u8] {
        &self.chars
    }

    /// Address of the first payload byte.
    ///
    /// Stable for the object's whole lifetime: the buffer is never reallocated,
    /// and moving the `StringObject` (for instance when the arena grows) moves
    /// only the box pointer, not the bytes.
    #[inline]
    #[must_use]
    pub fn as_ptr(&self) -> *const u8 {
        self.chars.as_ptr()
    }

    /// The payload as UTF-8 text.
    pub fn as_str(&self) -> Result<&str, Utf8Error> {
        std::str::from_utf8(self.as_bytes())
    }

    /// Approximate heap footprint in bytes, used for resource accounting.
    #[must_use]
    pub fn estimate_size(&self) -> usize {
        std::mem::size_of::<Self>() + self.chars.len()
    }
}

impl fmt::Display for StringObject {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&String::from_utf8_lossy(self.as_bytes()))
    }
}

impl HeapObject for StringObject {
    const TAG: Tag = Tag::String;

    fn from_data(data: &HeapData) -> Option<&Self> {
        match data {
            HeapData::Str(s) => Some(s),
            _ => None,
        }
    }
}

// Only the payload is serialized. The hash and terminator are rebuilt on load,
// so a snapshot can never carry a hash that disagrees with its bytes.
impl serde::Serialize for StringObject {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serde::Serialize::serialize(self.as_bytes(), serializer)
    }
}

impl<'de> serde::Deserialize<'de> for StringObject {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let bytes = <Vec<u8> as serde::Deserialize>::deserialize(deserializer)?;
        Self::new(&bytes).map_err(serde::de::Error::custom)
    }
}
