use std::fmt;

/// Error returned when the heap cannot satisfy an allocation.
///
/// Every variant maps to [`ObjectError::OutOfMemory`](crate::ObjectError::OutOfMemory):
/// a VM treats heap exhaustion as fatal, but the error still reaches the caller
/// so it can be reported before the process stops.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ResourceError {
    /// Maximum number of allocations exceeded.
    Allocation { limit: usize, count: usize },
    /// Maximum memory usage exceeded.
    Memory { limit: usize, used: usize },
    /// The system allocator could not reserve a payload buffer.
    Exhausted { requested: usize },
}

impl fmt::Display for ResourceError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Allocation { limit, count } => {
                write!(f, "allocation limit exceeded: {count} > {limit}")
            }
            Self::Memory { limit, used } => {
                write!(f, "memory limit exceeded: {used} bytes > {limit} bytes")
            }
            Self::Exhausted { requested } => {
                write!(f, "allocator exhausted reserving {requested} bytes")
            }
        }
    }
}

impl std::error::Error for ResourceError {}

/// Trait for tracking heap resource usage.
///
/// The heap calls into the tracker before every allocation and after every
/// free. Implementations decide whether an allocation may proceed.
pub trait ResourceTracker: fmt::Debug {
    /// Called before each heap allocation.
    ///
    /// Returns `Ok(())` if the allocation should proceed, or `Err(ResourceError)`
    /// if a limit would be exceeded. A rejected allocation must leave the tracker
    /// unchanged.
    ///
    /// # Arguments
    /// * `get_size` - Lazily computes the approximate size in bytes of the allocation
    fn on_allocate(&mut self, get_size: impl FnOnce() -> usize) -> Result<(), ResourceError>;

    /// Called when an object is freed.
    ///
    /// # Arguments
    /// * `get_size` - Lazily computes the size in bytes of the freed allocation
    fn on_free(&mut self, get_size: impl FnOnce() -> usize);

    /// Returns the total number of allocations tracked, if this tracker records them.
    ///
    /// `LimitedTracker` returns `Some(count)`; `NoLimitTracker` returns `None`.
    fn allocation_count(&self) -> Option<usize> {
        None
    }

    /// Returns the current approximate memory usage in bytes, if tracked.
    ///
    /// `LimitedTracker` returns `Some(bytes)`; `NoLimitTracker` returns `None`.
    fn current_memory_bytes(&self) -> Option<usize> {
        None
    }
}

/// A resource tracker that never rejects an allocation.
///
/// All checks compile away, so `Heap<NoLimitTracker>` pays nothing for resource
/// accounting. Allocation can still fail with [`ResourceError::Exhausted`] when the
/// system allocator gives up.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct NoLimitTracker;

impl ResourceTracker for NoLimitTracker {
    #[inline]
    fn on_allocate(&mut self, _get_size: impl FnOnce() -> usize) -> Result<(), ResourceError> {
        Ok(())
    }

    #[inline]
    fn on_free(&mut self, _get_size: impl FnOnce() -> usize) {}
}

/// Configuration for heap resource limits.
///
/// All limits are optional - set to `None` to disable a specific limit.
/// Use `ResourceLimits::default()` for no limits, or build custom limits
/// with the builder pattern.
#[derive(Debug, Clone, Default, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct ResourceLimits {
    /// Maximum number of heap allocations allowed over the heap's lifetime.
    pub max_allocations: Option<usize>,
    /// Maximum live heap memory in bytes (approximate).
    pub max_memory: Option<usize>,
}

impl ResourceLimits {
    /// Creates a new ResourceLimits with all limits disabled.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the maximum number of allocations.
    #[must_use]
    pub fn max_allocations(mut self, limit: usize) -> Self {
        self.max_allocations = Some(limit);
        self
    }

    /// Sets the maximum memory usage in bytes.
    #[must_use]
    pub fn max_memory(mut self, limit: usize) -> Self {
        self.max_memory = Some(limit);
        self
    }
}

/// A resource tracker that enforces configurable limits.
///
/// Tracks allocation count and live memory, returning errors when limits are
/// exceeded. Counters are serialized with the heap, so a restored heap keeps
/// its remaining budget.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct LimitedTracker {
    limits: ResourceLimits,
    /// Total number of allocations made.
    allocation_count: usize,
    /// Current approximate memory usage in bytes.
    current_memory: usize,
}

impl LimitedTracker {
    /// Creates a new LimitedTracker with the given limits.
    #[must_use]
    pub fn new(limits: ResourceLimits) -> Self {
        Self {
            limits,
            allocation_count: 0,
            current_memory: 0,
        }
    }

    /// Returns the configured limits.
    #[must_use]
    pub fn limits(&self) -> &ResourceLimits {
        &self.limits
    }

    /// Returns the current allocation count.
    #[must_use]
    pub fn allocation_count(&self) -> usize {
        self.allocation_count
    }

    /// Returns the current approximate memory usage.
    #[must_use]
    pub fn current_memory(&self) -> usize {
        self.current_memory
    }
}

impl ResourceTracker for LimitedTracker {
    fn on_allocate(&mut self, get_size: impl FnOnce() -> usize) -> Result<(), ResourceError> {
        // Check allocation count limit
        if let Some(max) = self.limits.max_allocations
            && self.allocation_count >= max
        {
            return Err(ResourceError::Allocation {
                limit: max,
                count: self.allocation_count + 1,
            });
        }

        let size = get_size();
        // Check memory limit
        if let Some(max) = self.limits.max_memory {
            let new_memory = self.current_memory.saturating_add(size);
            if new_memory > max {
                return Err(ResourceError::Memory {
                    limit: max,
                    used: new_memory,
                });
            }
        }

        self.allocation_count += 1;
        self.current_memory += size;

        Ok(())
    }

    fn on_free(&mut self, get_size: impl FnOnce() -> usize) {
        self.current_memory = self.current_memory.saturating_sub(get_size());
    }

    fn allocation_count(&self) -> Option<usize> {
        Some(self.allocation_count)
    }

    fn current_memory_bytes(&self) -> Option<usize> {
        Some(self.current_memory)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn allocation_limit_rejects_without_counting() {
        let mut tracker = LimitedTracker::new(ResourceLimits::new().max_allocations(1));
        tracker.on_allocate(|| 8).unwrap();
        let err = tracker.on_allocate(|| 8).unwrap_err();
        assert_eq!(err, ResourceError::Allocation { limit: 1, count: 2 });
        assert_eq!(tracker.allocation_count(), 1);
        assert_eq!(tracker.current_memory(), 8);
    }

    #[test]
    fn memory_is_released_on_free() {
        let mut tracker = LimitedTracker::new(ResourceLimits::new().max_memory(16));
        tracker.on_allocate(|| 10).unwrap();
        assert!(tracker.on_allocate(|| 10).is_err());
        tracker.on_free(|| 10);
        tracker.on_allocate(|| 10).unwrap();
        assert_eq!(tracker.current_memory(), 10);
    }

    #[test]
    fn no_limit_tracker_reports_nothing() {
        let mut tracker = NoLimitTracker;
        tracker.on_allocate(|| usize::MAX).unwrap();
        assert_eq!(ResourceTracker::allocation_count(&tracker), None);
        assert_eq!(tracker.current_memory_bytes(), None);
    }

    #[test]
    fn display_messages() {
        let err = ResourceError::Memory { limit: 4, used: 9 };
        assert_eq!(err.to_string(), "memory limit exceeded: 9 bytes > 4 bytes");
        let err = ResourceError::Exhausted { requested: 12 };
        assert_eq!(err.to_string(), "allocator exhausted reserving 12 bytes");
    }
}
