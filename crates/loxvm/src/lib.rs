#![doc = include_str!("../../../README.md")]

mod error;
mod hash;
mod heap;
mod io;
mod object;
mod resource;
mod string;
pub mod tracer;
mod upvalue;
mod value;

pub use crate::{
    error::ObjectError,
    hash::fnv1a_32,
    heap::{Heap, HeapId, HeapStats},
    io::{CollectStringPrint, NoPrint, PrintWriter, StdPrint, print_string},
    object::{HeapData, HeapObject, MutableHeapObject, ObjectHeader, Tag},
    resource::{LimitedTracker, NoLimitTracker, ResourceError, ResourceLimits, ResourceTracker},
    string::StringObject,
    tracer::{HeapTracer, NoopTracer, ProfilingReport, ProfilingTracer, RecordingTracer, StderrTracer, TraceEvent},
    upvalue::UpvalueObject,
    value::Value,
};
