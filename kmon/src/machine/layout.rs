//! Kernel image layout symbols

use kmon_common::{round_up, KERNBASE};

/// Addresses of the linker-provided layout symbols of the kernel image
///
/// `start` is the physical load address; the others are link-time virtual
/// addresses above [`KERNBASE`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct KernelLayout {
    pub start: u32,
    pub entry: u32,
    pub etext: u32,
    pub edata: u32,
    pub end: u32,
}

impl KernelLayout {
    /// Symbol names in the order they are reported
    pub const SYMBOLS: [&'static str; 5] = ["_start", "entry", "etext", "edata", "end"];

    /// Build a layout from a symbol lookup, if every symbol is known
    pub fn from_lookup(mut lookup: impl FnMut(&str) -> Option<u32>) -> Option<Self> {
        Some(Self {
            start: lookup("_start")?,
            entry: lookup("entry")?,
            etext: lookup("etext")?,
            edata: lookup("edata")?,
            end: lookup("end")?,
        })
    }

    /// Physical address of a kernel virtual address
    #[must_use]
    pub fn phys(va: u32) -> u32 {
        va.wrapping_sub(KERNBASE)
    }

    /// Memory occupied from `entry` to `end`, in whole KiB rounded up
    #[must_use]
    pub fn footprint_kb(&self) -> u64 {
        round_up(u64::from(self.end.saturating_sub(self.entry)), 1024) / 1024
    }
}
