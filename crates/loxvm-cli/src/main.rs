use std::{env, ffi::OsString, process::ExitCode};

use loxvm::{Heap, HeapTracer, NoLimitTracker, ObjectError, PrintWriter, StderrTracer, StdPrint, print_string};

const DEFAULT_TEXT: &[u8] = b"Hello, world!";

fn main() -> ExitCode {
    let (trace, texts) = parse_args(env::args_os().skip(1));

    let result = if trace {
        run(Heap::with_tracer(texts.len(), NoLimitTracker, StderrTracer::new()), &texts)
    } else {
        run(Heap::new(texts.len(), NoLimitTracker), &texts)
    };

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            eprintln!("error: {err}");
            ExitCode::FAILURE
        }
    }
}

/// Splits the arguments into the `--trace` flag and the texts to allocate.
///
/// Texts are kept as raw bytes, so arguments that are not valid UTF-8 are
/// passed through unchanged.
fn parse_args(args: impl IntoIterator<Item = OsString>) -> (bool, Vec<Vec<u8>>) {
    let mut trace = false;
    let mut texts = Vec::new();
    for arg in args {
        if arg == "--trace" {
            trace = true;
        } else {
            texts.push(arg.into_encoded_bytes());
        }
    }
    if texts.is_empty() {
        texts.push(DEFAULT_TEXT.to_vec());
    }
    (trace, texts)
}

/// Allocates one string object per text, prints each on its own line, then
/// frees them all.
fn run<Tr: HeapTracer>(mut heap: Heap<NoLimitTracker, Tr>, texts: &[Vec<u8>]) -> Result<(), ObjectError> {
    let ids = texts
        .iter()
        .map(|text| heap.make_string(text))
        .collect::<Result<Vec<_>, _>>()?;

    let mut writer = StdPrint;
    for &id in &ids {
        print_string(&heap, id, &mut writer)?;
        writer.push('\n');
    }
    drop(writer);

    let freed = heap.retain(|_, _| false);
    debug_assert_eq!(freed, ids.len());
    Ok(())
}
