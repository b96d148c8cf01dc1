//! Frame pointer chain walker
//!
//! With frame pointers preserved, every activation record on an i386 stack
//! starts with the same two words:
//!
//! ```text
//!            +-------------------+
//!  ebp + 28  |       ...         |
//!  ebp + 8   | arg 0 .. arg 4    |  (best effort, whatever the caller pushed)
//!  ebp + 4   | return address    |
//!  ebp ----> | caller's ebp      | ---> next frame, at a higher address
//!            +-------------------+
//! ```
//!
//! [`StackFrames`] follows that chain through a [`MemoryRegion`], so a wild
//! pointer is just a failed bounds check.

use log::{debug, warn};
use std::fmt;

use crate::machine::MemoryRegion;

/// Number of argument slots reported per frame
pub const ARG_SLOTS: usize = 5;

const WORD: u32 = 4;

/// One reconstructed activation record
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StackFrame {
    /// Address of the saved previous frame pointer
    pub frame_pointer: u32,
    /// Word stored one slot above the frame pointer
    pub return_address: u32,
    /// Words above the return address; `None` where they fall off the stack
    pub saved_arguments: [Option<u32>; ARG_SLOTS],
}

/// Why a frame pointer walk stopped
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChainEnd {
    /// Reached a zero frame pointer
    Terminated,
    /// Frame pointer not aligned to a word
    Misaligned(u32),
    /// Frame pointer or return address slot outside the stack
    OutOfBounds(u32),
    /// Saved frame pointer does not move towards the stack top
    NotMonotonic { from: u32, to: u32 },
    /// More frames than the stack has words
    IterationCap(usize),
}

impl ChainEnd {
    /// Whether the walk stopped because the chain looked corrupted
    #[must_use]
    pub fn is_corrupted(&self) -> bool {
        !matches!(self, ChainEnd::Terminated)
    }
}

impl fmt::Display for ChainEnd {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ChainEnd::Terminated => write!(f, "reached the outermost frame"),
            ChainEnd::Misaligned(fp) => write!(f, "frame pointer {fp:08x} is misaligned"),
            ChainEnd::OutOfBounds(fp) => write!(f, "frame pointer {fp:08x} is outside the stack"),
            ChainEnd::NotMonotonic { from, to } => {
                write!(f, "frame pointer {from:08x} links back to {to:08x}")
            }
            ChainEnd::IterationCap(cap) => write!(f, "more than {cap} frames"),
        }
    }
}

/// Lazy, bounded iterator over the frames of a stack, innermost first
///
/// The iterator is consumed by walking; start a new one to walk again.
#[derive(Debug)]
pub struct StackFrames<'a> {
    stack: &'a MemoryRegion,
    next: Option<u32>,
    remaining: usize,
    end: Option<ChainEnd>,
}

impl<'a> StackFrames<'a> {
    /// Walk `stack` starting from the frame at `frame_pointer`
    #[must_use]
    pub fn new(stack: &'a MemoryRegion, frame_pointer: u32) -> Self {
        Self { stack, next: Some(frame_pointer), remaining: stack.len_words(), end: None }
    }

    /// Why the walk stopped; `None` while frames may still follow
    #[must_use]
    pub fn end(&self) -> Option<ChainEnd> {
        self.end
    }

    fn stop(&mut self, reason: ChainEnd) -> Option<StackFrame> {
        if reason.is_corrupted() {
            warn!("Stack walk stopped: {reason}");
        } else {
            debug!("Stack walk finished");
        }
        self.next = None;
        self.end = Some(reason);
        None
    }

    fn read_at(&self, fp: u32, slot: u32) -> Option<u32> {
        self.stack.read_u32(fp.checked_add(slot * WORD)?)
    }
}

impl Iterator for StackFrames<'_> {
    type Item = StackFrame;

    fn next(&mut self) -> Option<Self::Item> {
        let fp = self.next?;

        if fp == 0 {
            return self.stop(ChainEnd::Terminated);
        }
        if fp % WORD != 0 {
            return self.stop(ChainEnd::Misaligned(fp));
        }
        // Backstop: a strictly increasing chain inside the stack runs out of
        // words before it runs out of iterations
        if self.remaining == 0 {
            return self.stop(ChainEnd::IterationCap(self.stack.len_words()));
        }

        let (Some(saved_fp), Some(return_address)) = (self.read_at(fp, 0), self.read_at(fp, 1))
        else {
            return self.stop(ChainEnd::OutOfBounds(fp));
        };

        let mut saved_arguments = [None; ARG_SLOTS];
        for (slot, arg) in (2..).zip(saved_arguments.iter_mut()) {
            *arg = self.read_at(fp, slot);
        }

        self.remaining -= 1;
        let frame = StackFrame { frame_pointer: fp, return_address, saved_arguments };

        if saved_fp == 0 {
            self.next = Some(0);
        } else if saved_fp <= fp {
            // Report this frame, then refuse to follow the link
            self.stop(ChainEnd::NotMonotonic { from: fp, to: saved_fp });
        } else {
            self.next = Some(saved_fp);
        }

        Some(frame)
    }
}
