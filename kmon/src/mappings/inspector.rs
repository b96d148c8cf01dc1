use kmon_common::PGSIZE;
use log::debug;
use std::fmt;

use super::range::PageRange;
use crate::machine::{PageTableWalker, PteFlags};

/// Mapping status of one virtual page
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PageMapping {
    NotMapped { va: u32 },
    Mapped { va: u32, frame: u32, flags: PteFlags },
}

impl PageMapping {
    #[must_use]
    pub fn va(&self) -> u32 {
        match *self {
            PageMapping::NotMapped { va } | PageMapping::Mapped { va, .. } => va,
        }
    }

    #[must_use]
    pub fn is_mapped(&self) -> bool {
        matches!(self, PageMapping::Mapped { .. })
    }
}

impl fmt::Display for PageMapping {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let va = self.va();
        write!(f, "[{va:08x}, {:08x}): ", u64::from(va) + u64::from(PGSIZE))?;
        match *self {
            PageMapping::NotMapped { .. } => write!(f, "not mapped"),
            PageMapping::Mapped { frame, flags, .. } => write!(
                f,
                "page {frame:08x} PTE_P: {:x}, PTE_W: {:x}, PTE_U: {:x}",
                u8::from(flags.contains(PteFlags::PRESENT)),
                u8::from(flags.contains(PteFlags::WRITABLE)),
                u8::from(flags.contains(PteFlags::USER)),
            ),
        }
    }
}

/// Per-page view of one address space
pub struct MappingInspector<'a, W: PageTableWalker + ?Sized> {
    walker: &'a W,
    pgdir: u32,
}

impl<'a, W: PageTableWalker + ?Sized> MappingInspector<'a, W> {
    pub fn new(walker: &'a W, pgdir: u32) -> Self {
        Self { walker, pgdir }
    }

    /// Mapping status of the page at `va`
    ///
    /// A page table slot without the present bit counts as not mapped.
    pub fn inspect_page(&self, va: u32) -> PageMapping {
        match self.walker.lookup(self.pgdir, va) {
            Some(entry) if entry.is_present() => {
                PageMapping::Mapped { va, frame: entry.frame_addr(va), flags: entry.flags() }
            }
            Some(entry) => {
                debug!("Entry {:#010x} for {va:#010x} is not present", entry.raw());
                PageMapping::NotMapped { va }
            }
            None => PageMapping::NotMapped { va },
        }
    }

    /// Mapping status of every page in `range`, ascending
    pub fn inspect(&self, range: PageRange) -> impl Iterator<Item = PageMapping> + '_ {
        range.pages().map(move |va| self.inspect_page(va))
    }
}
