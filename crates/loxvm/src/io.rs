use std::{
    cell::RefCell,
    io::{self, Write as _},
};

use crate::{
    error::ObjectError,
    heap::{Heap, HeapId},
    resource::ResourceTracker,
    string::StringObject,
    tracer::HeapTracer,
};

/// Sink for text printed by the VM.
///
/// Lox strings are byte strings, so writers receive raw bytes and decide for
/// themselves how to treat anything that is not UTF-8. Writers do not report
/// failures: a VM that cannot print keeps running, the same as a C program
/// ignoring the return value of `printf`.
pub trait PrintWriter {
    /// Writes the payload of one printed value, without separators or a newline.
    fn write_bytes(&mut self, bytes: &[u8]);

    /// Adds a single character, generally a space or newline between values.
    fn push(&mut self, end: char);
}

/// Default `PrintWriter` that writes to stdout.
///
/// Output is buffered per thread and flushed when the writer is dropped.
#[derive(Debug)]
pub struct StdPrint;

thread_local! {
    static STDOUT_BUFFER: RefCell<Vec<u8>> = const { RefCell::new(Vec::new()) };
}

impl PrintWriter for StdPrint {
    fn write_bytes(&mut self, bytes: &[u8]) {
        STDOUT_BUFFER.with(|buffer| buffer.borrow_mut().extend_from_slice(bytes));
    }

    fn push(&mut self, end: char) {
        let mut utf8 = [0; 4];
        self.write_bytes(end.encode_utf8(&mut utf8).as_bytes());
    }
}

impl Drop for StdPrint {
    fn drop(&mut self) {
        STDOUT_BUFFER.with(|buffer| {
            let mut buffer = buffer.borrow_mut();
            if buffer.is_empty() {
                return;
            }
            let mut stdout = io::stdout().lock();
            let _ = stdout.write_all(&buffer);
            let _ = stdout.flush();
            buffer.clear();
        });
    }
}

/// A `PrintWriter` that collects all output into a byte buffer.
///
/// Useful for testing or capturing output programmatically.
#[derive(Debug, Default)]
pub struct CollectStringPrint(Vec<u8>);

impl CollectStringPrint {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// The collected output, exactly as written.
    #[must_use]
    pub fn output(&self) -> &[u8] {
        &self.0
    }

    /// The collected output as text, replacing invalid UTF-8.
    #[must_use]
    pub fn output_lossy(&self) -> String {
        String::from_utf8_lossy(&self.0).into_owned()
    }

    #[must_use]
    pub fn into_output(self) -> Vec<u8> {
        self.0
    }
}

impl PrintWriter for CollectStringPrint {
    fn write_bytes(&mut self, bytes: &[u8]) {
        self.0.extend_from_slice(bytes);
    }

    fn push(&mut self, end: char) {
        let mut utf8 = [0; 4];
        self.0.extend_from_slice(end.encode_utf8(&mut utf8).as_bytes());
    }
}

/// `PrintWriter` that ignores all output.
#[derive(Debug, Default)]
pub struct NoPrint;

impl PrintWriter for NoPrint {
    fn write_bytes(&mut self, _bytes: &[u8]) {}

    fn push(&mut self, _end: char) {}
}

/// Prints the payload of the string object `id` to `writer`.
///
/// Exactly `len()` bytes are written, interior NUL bytes included; the
/// terminator and any trailing newline are not.
///
/// # Errors
/// Returns `ObjectError::TypeMismatch` if `id` is not a string. Nothing is
/// written in that case.
///
/// # Panics
/// Panics if `id` is stale or does not belong to `heap`.
pub fn print_string<T: ResourceTracker, Tr: HeapTracer>(
    heap: &Heap<T, Tr>,
    id: HeapId,
    writer: &mut impl PrintWriter,
) -> Result<(), ObjectError> {
    let string = heap.downcast::<StringObject>(id)?;
    writer.write_bytes(string.as_bytes());
    Ok(())
}
