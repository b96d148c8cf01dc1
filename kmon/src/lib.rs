//! # kmon - Kernel Debug Monitor
//!
//! kmon is the interactive monitor of a small 32-bit x86 teaching kernel,
//! running on the host against a snapshot of the halted machine. It answers
//! the two questions asked most often after a crash: how did execution get
//! here, and what does the address space look like.
//!
//! ## Architecture Overview
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────┐
//! │               Machine snapshot (JSON)  +  kernel ELF         │
//! └───────────────┬──────────────────────────────┬───────────────┘
//!                 │ snapshot::Snapshot           │ Symbolizer
//!                 ▼                              ▼
//! ┌──────────────────────────────┐   ┌──────────────────────────┐
//! │  Machine                     │   │  DebugInfoResolver       │
//! │  • kernel stack (by va)      │   │  • snapshot symbols      │
//! │  • physical memory + tables  │   │  • DWARF / ELF symbols   │
//! │  • registers, trap frame     │   │  • placeholders          │
//! └───────┬──────────────┬───────┘   └────────────┬─────────────┘
//!         │              │                        │
//!         ▼              ▼                        │
//! ┌──────────────┐ ┌──────────────┐               │
//! │  Backtrace   │ │   Mapping    │◀──────────────┘
//! │  (unwinder)  │ │  Inspector   │
//! └──────┬───────┘ └──────┬───────┘
//!        └───────┬────────┘
//!                ▼
//! ┌──────────────────────────────────────────────────────────────┐
//! │      Monitor: K> help | kerninfo | backtrace | showmappings  │
//! └──────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Module Structure
//!
//! ### Inspection Engines
//!
//! - [`backtrace`]: frame pointer chain walker and the `backtrace` report
//!   - Bounded, lazy iterator; stops on misaligned, out-of-stack or
//!     non-monotonic frame pointers
//!
//! - [`mappings`]: the `showmappings` range report
//!   - Base-prefix aware address parsing, page alignment, per-page lookup
//!
//! ### Machine Model
//!
//! - [`machine`]: bounds-checked memory, page table walker and builder,
//!   kernel layout symbols
//!
//! - [`symbolization`]: return address to `file:line: function+offset`
//!
//! - [`snapshot`]: JSON snapshot loading
//!
//! ### Front End
//!
//! - [`monitor`]: command table, tokenizer and read-eval loop
//!
//! - [`cli`]: command-line argument parsing
//!
//! - [`domain`]: addresses and error types
//!
//! ## Typical Usage
//!
//! ```bash
//! # Interactive session
//! kmon --snapshot crash.json
//!
//! # One-shot commands, symbols from the kernel image
//! kmon --snapshot crash.json --kernel obj/kern/kernel -e backtrace -e kerninfo
//! ```
//!
//! ## Key Concepts
//!
//! - **Frame pointer**: saved `ebp`; each frame stores the caller's `ebp` and
//!   the return address right above it
//! - **Page directory / page table**: the two-level i386 translation
//!   structure; a directory entry with `PS` set maps a 4 MiB page directly
//! - **Trap frame**: register state pushed when the kernel entered the monitor
//!   from an exception

pub mod backtrace;
pub mod cli;
pub mod domain;
pub mod machine;
pub mod mappings;
pub mod monitor;
pub mod snapshot;
pub mod symbolization;
