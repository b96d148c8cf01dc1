//! # Debug Info Resolution
//!
//! Converts a return address found on the kernel stack into the source-level
//! record printed under each backtrace frame:
//!
//! ```text
//!   ebp f010ff18  eip f01000a5  args 00000000 00000000 00000000 f010004a f0111308
//!          kern/init.c:24: test_backtrace+101
//!          \_ file _/ \/ \_ function _/ \_ eip - fn_addr (decimal)
//!                    line
//! ```
//!
//! ## Resolvers
//!
//! Every resolver is **total**: an address it knows nothing about still
//! produces a record, filled with placeholders (see [`EipDebugInfo::unknown`]).
//! A backtrace therefore never stops because a symbol is missing.
//!
//! - **`symbol_table`**: function table carried inside a machine snapshot.
//!   Names may keep their stab-style type suffix (`mon_backtrace:F(0,25)`);
//!   only the part before `:` is printed.
//! - **`symbolizer`**: DWARF line tables and the ELF symbol table of a kernel
//!   image, via `addr2line`, `gimli` and `object`, with Rust names demangled
//!   by `rustc-demangle`.
//! - [`NoDebugInfo`]: placeholders for every address.

pub mod symbol_table;
pub mod symbolizer;

pub use symbol_table::{FunctionSymbol, SymbolTable};
pub use symbolizer::Symbolizer;

/// Placeholder text for unknown files and functions
pub const UNKNOWN: &str = "<unknown>";

/// Source-level information for one instruction address
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EipDebugInfo {
    /// Source file name
    pub file: String,
    /// Source line number, 0 when unknown
    pub line: u32,
    /// Function name, possibly followed by bytes that are not part of it
    pub fn_name: String,
    /// Number of leading bytes of `fn_name` that form the name
    pub fn_namelen: usize,
    /// Entry address of the function
    pub fn_addr: u32,
}

impl EipDebugInfo {
    /// Placeholder record for an address nothing is known about
    #[must_use]
    pub fn unknown(addr: u32) -> Self {
        Self {
            file: UNKNOWN.to_string(),
            line: 0,
            fn_name: UNKNOWN.to_string(),
            fn_namelen: UNKNOWN.len(),
            fn_addr: addr,
        }
    }

    /// The function name truncated to `fn_namelen` bytes
    #[must_use]
    pub fn name(&self) -> &str {
        let mut len = self.fn_namelen.min(self.fn_name.len());
        while !self.fn_name.is_char_boundary(len) {
            len -= 1;
        }
        &self.fn_name[..len]
    }

    /// Distance of `eip` past the function entry
    #[must_use]
    pub fn offset(&self, eip: u32) -> u32 {
        eip.wrapping_sub(self.fn_addr)
    }
}

/// Total mapping from instruction addresses to debug info
pub trait DebugInfoResolver {
    fn resolve(&self, eip: u32) -> EipDebugInfo;
}

/// Resolver used when neither a symbol table nor a kernel image is available
#[derive(Debug, Clone, Copy, Default)]
pub struct NoDebugInfo;

impl DebugInfoResolver for NoDebugInfo {
    fn resolve(&self, eip: u32) -> EipDebugInfo {
        EipDebugInfo::unknown(eip)
    }
}
