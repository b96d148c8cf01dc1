//! Structured error types for kmon
//!
//! Using thiserror for automatic Display implementation and error chaining.
//! [`MonitorError`] renders to the exact line a command prints on the console;
//! it never leaves the command that produced it.

use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum MonitorError {
    #[error("Usage: {0}")]
    Usage(&'static str),

    #[error("Error: invalid address '{0}'")]
    InvalidAddress(String),

    #[error("Error: end_addr must be larger than begin_addr")]
    EmptyRange { begin: u64, end: u64 },

    #[error("Too many arguments (max {0})")]
    TooManyArguments(usize),

    #[error("Unknown command '{0}'")]
    UnknownCommand(String),
}

#[derive(Error, Debug)]
pub enum SnapshotError {
    #[error("Unknown permission '{0}' (expected W, U, PWT, PCD, A, D or G)")]
    UnknownPermission(String),

    #[error("Memory region at {base:#010x} is not word aligned")]
    MisalignedRegion { base: u32 },

    #[error("Memory region at {base:#010x} with {words} words exceeds the 32-bit address space")]
    RegionOverflow { base: u32, words: usize },

    #[error("Physical address {pa:#010x} is outside physical memory ({size:#x} bytes)")]
    OutsidePhysicalMemory { pa: u32, size: u64 },

    #[error("Mapping {va:#010x} -> {pa:#010x} is not aligned to its page size")]
    MisalignedMapping { va: u32, pa: u32 },

    #[error("Mapping for {0:#010x} conflicts with an existing large page")]
    LargePageConflict(u32),

    #[error("Large mapping for {0:#010x} conflicts with an existing page table")]
    PageTableConflict(u32),

    #[error("Large mapping for {0:#010x} cannot also give a size")]
    SizedLargePage(u32),

    #[error("Page table pool exhausted while mapping {0:#010x}")]
    TablePoolExhausted(u32),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Json(#[from] serde_json::Error),
}
