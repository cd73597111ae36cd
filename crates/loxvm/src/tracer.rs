//! Heap event tracing infrastructure.
//!
//! Provides a trait-based tracing system for the heap with zero-cost abstraction.
//! When using [`NoopTracer`], all trace methods compile away entirely via
//! monomorphization, the same way [`NoLimitTracker`](crate::resource::NoLimitTracker)
//! eliminates resource checking overhead.
//!
//! # Architecture
//!
//! The [`HeapTracer`] trait defines hook points at the heap's lifecycle events
//! (allocation, rejected allocation, free). Concrete implementations collect
//! different kinds of data:
//!
//! | Tracer | Purpose |
//! |--------|---------|
//! | [`NoopTracer`] | Zero-cost no-op (production default) |
//! | [`StderrTracer`] | Human-readable event log to stderr |
//! | [`ProfilingTracer`] | Per-tag allocation counters and peak live objects |
//! | [`RecordingTracer`] | Full event recording for tests or post-mortem |
//!
//! # Usage
//!
//! The heap is parameterized as `Heap<T: ResourceTracker, Tr: HeapTracer>`, with
//! `Tr` defaulting to `NoopTracer`:
//!
//! ```
//! use loxvm::{Heap, NoLimitTracker, ProfilingTracer, Tag};
//!
//! let mut heap = Heap::with_tracer(16, NoLimitTracker, ProfilingTracer::new());
//! heap.make_string(b"hello").unwrap();
//! let report = heap.tracer().report();
//! assert_eq!(report.allocations_by_tag, vec![(Tag::String, 1)]);
//! ```

use std::fmt;

use ahash::AHashMap;

use crate::{heap::HeapId, object::Tag, resource::ResourceError};

/// Trace event emitted by the heap.
///
/// Used by [`RecordingTracer`] to capture a full trace.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TraceEvent {
    /// An object was allocated and linked onto the live-object chain.
    Allocate {
        id: HeapId,
        tag: Tag,
        /// Approximate size in bytes charged to the resource tracker.
        size: usize,
    },
    /// An allocation was refused by the resource tracker.
    Rejected { tag: Tag, error: ResourceError },
    /// An object was unlinked and its slot released.
    Free { id: HeapId, tag: Tag },
}

/// Trait for heap event tracing.
///
/// All methods have default no-op implementations, so [`NoopTracer`] requires
/// zero lines of code and compiles to zero instructions. Implementations only
/// override the hooks they care about.
pub trait HeapTracer: fmt::Debug {
    /// Called after an object has been placed in its slot and linked.
    #[inline(always)]
    fn on_allocate(&mut self, _id: HeapId, _tag: Tag, _size: usize) {}

    /// Called when the resource tracker refuses an allocation.
    #[inline(always)]
    fn on_rejected(&mut self, _tag: Tag, _error: &ResourceError) {}

    /// Called after an object has been unlinked, before its data is dropped or returned.
    #[inline(always)]
    fn on_free(&mut self, _id: HeapId, _tag: Tag) {}
}

// ============================================================================
// NoopTracer: zero-cost production default
// ============================================================================

/// A tracer that does nothing.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopTracer;

impl HeapTracer for NoopTracer {}

// ============================================================================
// StderrTracer: human-readable event log
// ============================================================================

/// Tracer that prints a human-readable event log to stderr.
///
/// Output format:
/// ```text
///   +++ ALLOC  String   #0.0  size=46
///   +++ ALLOC  Upvalue  #1.0  size=24
///   --- FREE   String   #0.0
///   !!! REJECT String   memory limit exceeded: 92 bytes > 64 bytes
/// ```
#[derive(Debug, Default)]
pub struct StderrTracer {
    /// Maximum number of events to print before stopping. None = unlimited.
    limit: Option<usize>,
    count: usize,
    stopped: bool,
}

impl StderrTracer {
    /// Creates a new stderr tracer with no event limit.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a new stderr tracer that stops after `limit` events.
    #[must_use]
    pub fn with_limit(limit: usize) -> Self {
        Self {
            limit: Some(limit),
            count: 0,
            stopped: false,
        }
    }

    fn emit(&mut self, line: fmt::Arguments<'_>) {
        if self.stopped {
            return;
        }
        eprintln!("{line}");
        self.count += 1;
        if let Some(limit) = self.limit
            && self.count >= limit
        {
            eprintln!("--- trace limit reached ({limit} events) ---");
            self.stopped = true;
        }
    }
}

impl HeapTracer for StderrTracer {
    fn on_allocate(&mut self, id: HeapId, tag: Tag, size: usize) {
        self.emit(format_args!("  +++ ALLOC  {tag:<8} #{id}  size={size}"));
    }

    fn on_rejected(&mut self, tag: Tag, error: &ResourceError) {
        self.emit(format_args!("  !!! REJECT {tag:<8} {error}"));
    }

    fn on_free(&mut self, id: HeapId, tag: Tag) {
        self.emit(format_args!("  --- FREE   {tag:<8} #{id}"));
    }
}

// ============================================================================
// ProfilingTracer: per-tag counters
// ============================================================================

/// Tracer that collects allocation statistics.
///
/// Retrieve results via [`ProfilingTracer::report`].
#[derive(Debug, Default)]
pub struct ProfilingTracer {
    allocations: AHashMap<Tag, u64>,
    frees: u64,
    rejected: u64,
    live: u64,
    peak_live: u64,
    bytes_allocated: u64,
}

/// Summary report from a profiling trace.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProfilingReport {
    /// Allocation counts per tag, most allocated first (ties ordered by tag).
    pub allocations_by_tag: Vec<(Tag, u64)>,
    pub total_allocations: u64,
    pub total_frees: u64,
    /// Allocations refused by the resource tracker.
    pub rejected: u64,
    /// Highest number of simultaneously live objects observed.
    pub peak_live: u64,
    /// Sum of the estimated sizes of all allocations.
    pub bytes_allocated: u64,
}

impl ProfilingTracer {
    /// Creates a new profiling tracer with zeroed counters.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn report(&self) -> ProfilingReport {
        let mut allocations_by_tag: Vec<_> = self.allocations.iter().map(|(&k, &v)| (k, v)).collect();
        allocations_by_tag.sort_by(|a, b| b.1.cmp(&a.1).then(a.0.cmp(&b.0)));
        ProfilingReport {
            total_allocations: allocations_by_tag.iter().map(|(_, n)| n).sum(),
            allocations_by_tag,
            total_frees: self.frees,
            rejected: self.rejected,
            peak_live: self.peak_live,
            bytes_allocated: self.bytes_allocated,
        }
    }
}

impl HeapTracer for ProfilingTracer {
    #[inline]
    fn on_allocate(&mut self, _id: HeapId, tag: Tag, size: usize) {
        *self.allocations.entry(tag).or_insert(0) += 1;
        self.bytes_allocated += size as u64;
        self.live += 1;
        self.peak_live = self.peak_live.max(self.live);
    }

    fn on_rejected(&mut self, _tag: Tag, _error: &ResourceError) {
        self.rejected += 1;
    }

    #[inline]
    fn on_free(&mut self, _id: HeapId, _tag: Tag) {
        self.frees += 1;
        self.live = self.live.saturating_sub(1);
    }
}

// ============================================================================
// RecordingTracer: full event recording
// ============================================================================

/// Tracer that records every event.
///
/// Allocates per event, so use it only for debugging and tests.
#[derive(Debug, Default)]
pub struct RecordingTracer {
    events: Vec<TraceEvent>,
}

impl RecordingTracer {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn events(&self) -> &[TraceEvent] {
        &self.events
    }

    #[must_use]
    pub fn into_events(self) -> Vec<TraceEvent> {
        self.events
    }
}

impl HeapTracer for RecordingTracer {
    fn on_allocate(&mut self, id: HeapId, tag: Tag, size: usize) {
        self.events.push(TraceEvent::Allocate { id, tag, size });
    }

    fn on_rejected(&mut self, tag: Tag, error: &ResourceError) {
        self.events.push(TraceEvent::Rejected {
            tag,
            error: error.clone(),
        });
    }

    fn on_free(&mut self, id: HeapId, tag: Tag) {
        self.events.push(TraceEvent::Free { id, tag });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{heap::Heap, resource::NoLimitTracker};

    #[test]
    fn profiling_ties_are_ordered_by_tag() {
        let mut heap = Heap::with_tracer(2, NoLimitTracker, ProfilingTracer::new());
        heap.make_upvalue(crate::value::Value::Nil).unwrap();
        heap.make_string(b"s").unwrap();

        let report = heap.tracer().report();
        assert_eq!(report.allocations_by_tag, vec![(Tag::String, 1), (Tag::Upvalue, 1)]);
        assert_eq!(report.peak_live, 2);
    }

    #[test]
    fn peak_live_survives_frees() {
        let mut tracer = ProfilingTracer::new();
        let mut heap = Heap::new(1, NoLimitTracker);
        let id = heap.make_string(b"x").unwrap();

        tracer.on_allocate(id, Tag::String, 8);
        tracer.on_free(id, Tag::String);
        tracer.on_free(id, Tag::String);
        let report = tracer.report();
        assert_eq!(report.peak_live, 1);
        assert_eq!(report.total_frees, 2);
        assert_eq!(report.bytes_allocated, 8);
    }

    #[test]
    fn stderr_tracer_stops_at_limit() {
        let mut tracer = StderrTracer::with_limit(1);
        tracer.on_rejected(Tag::String, &ResourceError::Exhausted { requested: 1 });
        tracer.on_rejected(Tag::String, &ResourceError::Exhausted { requested: 2 });
        assert_eq!(tracer.count, 1);
        assert!(tracer.stopped);
    }
}
