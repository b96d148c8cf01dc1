//! Backtrace
//!
//! Walks the frame pointer chain of the inspected kernel and prints one pair
//! of lines per frame: the raw frame words, then the resolved source location.

mod unwinder;

pub use unwinder::{ChainEnd, StackFrame, StackFrames, ARG_SLOTS};

use std::io::{self, Write};

use crate::machine::MemoryRegion;
use crate::symbolization::DebugInfoResolver;

/// Text printed for an argument slot that lies outside the stack
pub const MISSING_ARG: &str = "--------";

/// Print the call stack starting at `frame_pointer`
///
/// Returns why the walk stopped. A corrupted chain is reported on the console
/// as well; it is not an error.
///
/// # Errors
/// Only console write failures are returned
pub fn print_backtrace(
    out: &mut dyn Write,
    stack: &MemoryRegion,
    frame_pointer: u32,
    resolver: &dyn DebugInfoResolver,
) -> io::Result<ChainEnd> {
    writeln!(out, "Stack backtrace:")?;

    let mut frames = StackFrames::new(stack, frame_pointer);
    for frame in frames.by_ref() {
        write_frame(out, &frame, resolver)?;
    }

    let end = frames.end().unwrap_or(ChainEnd::Terminated);
    if end.is_corrupted() {
        writeln!(out, "  backtrace stopped: {end}")?;
    }
    Ok(end)
}

/// Print the two report lines of one frame
///
/// # Errors
/// Only console write failures are returned
pub fn write_frame(
    out: &mut dyn Write,
    frame: &StackFrame,
    resolver: &dyn DebugInfoResolver,
) -> io::Result<()> {
    write!(out, "  ebp {:08x}  eip {:08x}  args", frame.frame_pointer, frame.return_address)?;
    for arg in &frame.saved_arguments {
        match arg {
            Some(word) => write!(out, " {word:08x}")?,
            None => write!(out, " {MISSING_ARG}")?,
        }
    }
    writeln!(out)?;

    let info = resolver.resolve(frame.return_address);
    writeln!(
        out,
        "         {}:{}: {}+{}",
        info.file,
        info.line,
        info.name(),
        info.offset(frame.return_address)
    )
}
