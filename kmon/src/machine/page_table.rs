//! Two-level i386 page table walk (observe-only)
//!
//! The walker answers "which leaf entry translates this virtual address" by
//! reading the page directory and page table out of [`PhysMemory`]. It takes
//! `&self`, so it cannot allocate tables or modify entries; building tables is
//! the job of [`super::builder::PageTableBuilder`].

use bitflags::bitflags;
use kmon_common::{
    pdx, pte_addr, ptx, PTE_A, PTE_ADDR_MASK, PTE_D, PTE_G, PTE_LARGE_ADDR_MASK, PTE_P, PTE_PCD,
    PTE_PS, PTE_PWT, PTE_U, PTE_W, PTSIZE,
};
use log::debug;

use super::memory::MemoryRegion;
use crate::domain::SnapshotError;

bitflags! {
    /// Permission and status bits of a page table or page directory entry
    #[repr(transparent)]
    #[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
    pub struct PteFlags: u32 {
        const PRESENT = PTE_P;
        const WRITABLE = PTE_W;
        const USER = PTE_U;
        const WRITE_THROUGH = PTE_PWT;
        const CACHE_DISABLE = PTE_PCD;
        const ACCESSED = PTE_A;
        const DIRTY = PTE_D;
        const PAGE_SIZE = PTE_PS;
        const GLOBAL = PTE_G;
    }
}

impl PteFlags {
    pub const USER_RDWR: Self = Self::PRESENT.union(Self::WRITABLE).union(Self::USER);
    pub const USER_RDONLY: Self = Self::PRESENT.union(Self::USER);
}

/// Granularity of a leaf translation
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PageSize {
    /// 4 KiB page mapped by a page table entry
    Small,
    /// 4 MiB page mapped directly by a page directory entry
    Large,
}

/// A leaf translation entry as read from physical memory
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LeafEntry {
    raw: u32,
    size: PageSize,
}

impl LeafEntry {
    #[must_use]
    pub fn small(raw: u32) -> Self {
        Self { raw, size: PageSize::Small }
    }

    #[must_use]
    pub fn large(raw: u32) -> Self {
        Self { raw, size: PageSize::Large }
    }

    #[must_use]
    pub fn raw(&self) -> u32 {
        self.raw
    }

    #[must_use]
    pub fn size(&self) -> PageSize {
        self.size
    }

    #[must_use]
    pub fn flags(&self) -> PteFlags {
        PteFlags::from_bits_truncate(self.raw)
    }

    #[must_use]
    pub fn is_present(&self) -> bool {
        self.flags().contains(PteFlags::PRESENT)
    }

    /// Physical address of the 4 KiB frame backing `va`
    ///
    /// For a large page this is the frame inside the 4 MiB page that `va`
    /// falls in, so per-page reports stay at 4 KiB granularity.
    #[must_use]
    pub fn frame_addr(&self, va: u32) -> u32 {
        match self.size {
            PageSize::Small => pte_addr(self.raw),
            PageSize::Large => {
                (self.raw & PTE_LARGE_ADDR_MASK) | (va & (PTSIZE - 1) & PTE_ADDR_MASK)
            }
        }
    }
}

/// Read-only translation lookup
pub trait PageTableWalker {
    /// Leaf entry translating `va` under the page directory at physical
    /// address `pgdir`
    ///
    /// Returns `None` when no page table covers `va`. A page table slot that
    /// exists but is not present is still returned; callers check
    /// [`LeafEntry::is_present`].
    fn lookup(&self, pgdir: u32, va: u32) -> Option<LeafEntry>;
}

/// Physical memory of the inspected machine, addressed from zero
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PhysMemory {
    region: MemoryRegion,
}

impl PhysMemory {
    /// Zero-filled physical memory of `size` bytes
    ///
    /// # Errors
    /// Fails if `size` does not fit in the 32-bit physical address space
    pub fn new(size: u64) -> Result<Self, SnapshotError> {
        Ok(Self { region: MemoryRegion::zeroed(0, size)? })
    }

    #[must_use]
    pub fn size(&self) -> u64 {
        self.region.size()
    }

    #[must_use]
    pub fn read_u32(&self, pa: u32) -> Option<u32> {
        self.region.read_u32(pa)
    }

    /// # Errors
    /// Fails if `pa` is misaligned or outside physical memory
    pub fn write_u32(&mut self, pa: u32, value: u32) -> Result<(), SnapshotError> {
        self.region
            .write_u32(pa, value)
            .ok_or(SnapshotError::OutsidePhysicalMemory { pa, size: self.region.size() })
    }

    /// # Errors
    /// Fails if the page is not entirely inside physical memory
    pub fn clear_page(&mut self, pa: u32) -> Result<(), SnapshotError> {
        self.region.clear_page(pa)
    }
}

impl PageTableWalker for PhysMemory {
    fn lookup(&self, pgdir: u32, va: u32) -> Option<LeafEntry> {
        // Directory and table indices are at most 1023, so these never wrap
        let pde_addr = pgdir.checked_add(pdx(va) as u32 * 4)?;
        let Some(pde) = self.read_u32(pde_addr) else {
            debug!("Page directory entry at {pde_addr:#010x} is outside physical memory");
            return None;
        };

        if pde & PTE_P == 0 {
            return None;
        }
        if pde & PTE_PS != 0 {
            return Some(LeafEntry::large(pde));
        }

        let pte_addr = pte_addr(pde) + ptx(va) as u32 * 4;
        match self.read_u32(pte_addr) {
            Some(pte) => Some(LeafEntry::small(pte)),
            None => {
                debug!("PDE {pde:#010x} for {va:#010x} points outside physical memory");
                None
            }
        }
    }
}
