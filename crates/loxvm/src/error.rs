use std::fmt;

use crate::{object::Tag, resource::ResourceError};

/// Errors raised by the object model.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ObjectError {
    /// A checked downcast asked for a variant the object is not.
    TypeMismatch { expected: Tag, found: Tag },
    /// The heap could not satisfy an allocation.
    ///
    /// Fatal by convention: callers should report it and stop rather than try
    /// to continue with a partially built value.
    OutOfMemory(ResourceError),
}

impl ObjectError {
    pub(crate) fn type_mismatch(expected: Tag, found: Tag) -> Self {
        Self::TypeMismatch { expected, found }
    }

    /// Whether the error should terminate the VM.
    #[must_use]
    pub fn is_fatal(&self) -> bool {
        matches!(self, Self::OutOfMemory(_))
    }
}

impl fmt::Display for ObjectError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::TypeMismatch { expected, found } => {
                write!(f, "type mismatch: expected {expected}, found {found}")
            }
            Self::OutOfMemory(err) => write!(f, "out of memory: {err}"),
        }
    }
}

impl std::error::Error for ObjectError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::TypeMismatch { .. } => None,
            Self::OutOfMemory(err) => Some(err),
        }
    }
}

impl From<ResourceError> for ObjectError {
    fn from(err: ResourceError) -> Self {
        Self::OutOfMemory(err)
    }
}
