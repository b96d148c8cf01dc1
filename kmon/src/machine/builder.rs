//! Page table construction for snapshots and tests
//!
//! Lays out a page directory and its page tables inside [`PhysMemory`] the way
//! the kernel's own `pgdir_walk(create)`/`page_insert` pair would. Page tables
//! are carved out of a bump-allocated pool of physical pages.

use kmon_common::{pdx, pgoff, pte_addr, ptx, PGSIZE, PTE_P, PTE_PS, PTE_U, PTE_W, PTSIZE};
use log::debug;

use super::page_table::{PhysMemory, PteFlags};
use crate::domain::SnapshotError;

pub struct PageTableBuilder<'a> {
    mem: &'a mut PhysMemory,
    pgdir: u32,
    next_table: u64,
}

impl<'a> PageTableBuilder<'a> {
    /// Start building under the page directory at `pgdir`, allocating page
    /// tables from `table_pool` upwards
    ///
    /// # Errors
    /// Fails if the page directory is misaligned or not inside `mem`
    pub fn new(
        mem: &'a mut PhysMemory,
        pgdir: u32,
        table_pool: u32,
    ) -> Result<Self, SnapshotError> {
        if pgoff(pgdir) != 0 || pgoff(table_pool) != 0 {
            return Err(SnapshotError::MisalignedMapping { va: pgdir, pa: table_pool });
        }
        mem.clear_page(pgdir)?;
        Ok(Self { mem, pgdir, next_table: u64::from(table_pool) })
    }

    fn alloc_table(&mut self, va: u32) -> Result<u32, SnapshotError> {
        if self.next_table == u64::from(self.pgdir) {
            self.next_table += u64::from(PGSIZE);
        }
        if self.next_table + u64::from(PGSIZE) > self.mem.size() {
            return Err(SnapshotError::TablePoolExhausted(va));
        }
        let table =
            u32::try_from(self.next_table).map_err(|_| SnapshotError::TablePoolExhausted(va))?;
        self.next_table += u64::from(PGSIZE);

        self.mem.clear_page(table)?;
        debug!("Allocated page table at {table:#010x} for {va:#010x}");
        Ok(table)
    }

    fn pde_addr(&self, va: u32) -> u32 {
        self.pgdir + pdx(va) as u32 * 4
    }

    /// Physical address of the page table slot for `va`, creating the page
    /// table if it does not exist yet
    fn walk_create(&mut self, va: u32) -> Result<u32, SnapshotError> {
        let pde_addr = self.pde_addr(va);
        let pde = self
            .mem
            .read_u32(pde_addr)
            .ok_or(SnapshotError::OutsidePhysicalMemory { pa: pde_addr, size: self.mem.size() })?;

        let table = if pde & PTE_P == 0 {
            let table = self.alloc_table(va)?;
            self.mem.write_u32(pde_addr, table | PTE_P | PTE_W | PTE_U)?;
            table
        } else if pde & PTE_PS != 0 {
            return Err(SnapshotError::LargePageConflict(va));
        } else {
            pte_addr(pde)
        };

        Ok(table + ptx(va) as u32 * 4)
    }

    /// Map the 4 KiB page at `va` to the frame at `pa`
    ///
    /// `PRESENT` is always added to `perm`.
    ///
    /// # Errors
    /// Fails on misaligned addresses, large page conflicts or when the table
    /// pool runs out
    pub fn map_page(&mut self, va: u32, pa: u32, perm: PteFlags) -> Result<(), SnapshotError> {
        if pgoff(va) != 0 || pgoff(pa) != 0 {
            return Err(SnapshotError::MisalignedMapping { va, pa });
        }
        let slot = self.walk_create(va)?;
        self.mem.write_u32(slot, pa | (perm | PteFlags::PRESENT).bits())
    }

    /// Map the 4 MiB page at `va` to the frame at `pa` with a single page
    /// directory entry
    ///
    /// # Errors
    /// Fails on misaligned addresses or when a page table already covers `va`
    pub fn map_large(&mut self, va: u32, pa: u32, perm: PteFlags) -> Result<(), SnapshotError> {
        if va % PTSIZE != 0 || pa % PTSIZE != 0 {
            return Err(SnapshotError::MisalignedMapping { va, pa });
        }
        let pde_addr = self.pde_addr(va);
        let pde = self.mem.read_u32(pde_addr).unwrap_or(0);
        if pde & PTE_P != 0 && pde & PTE_PS == 0 {
            return Err(SnapshotError::PageTableConflict(va));
        }
        let flags = perm | PteFlags::PRESENT | PteFlags::PAGE_SIZE;
        self.mem.write_u32(pde_addr, pa | flags.bits())
    }

    /// Map `[va, va + size)` to `[pa, pa + size)` with 4 KiB pages
    ///
    /// # Errors
    /// Same conditions as [`PageTableBuilder::map_page`]
    pub fn map_region(
        &mut self,
        va: u32,
        size: u32,
        pa: u32,
        perm: PteFlags,
    ) -> Result<(), SnapshotError> {
        for offset in (0..size).step_by(PGSIZE as usize) {
            let (Some(v), Some(p)) = (va.checked_add(offset), pa.checked_add(offset)) else {
                return Err(SnapshotError::MisalignedMapping { va, pa });
            };
            self.map_page(v, p, perm)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::machine::page_table::{PageSize, PageTableWalker};

    #[test]
    fn test_map_page_creates_table() {
        let mut mem = PhysMemory::new(0x10000).unwrap();
        let mut builder = PageTableBuilder::new(&mut mem, 0x1000, 0x2000).unwrap();
        builder.map_page(0x1000, 0x5000, PteFlags::WRITABLE).unwrap();
        builder.map_page(0x0040_0000, 0x6000, PteFlags::USER).unwrap();

        assert_eq!(mem.read_u32(0x1000), Some(0x2000 | PTE_P | PTE_W | PTE_U));
        assert_eq!(mem.read_u32(0x1004), Some(0x3000 | PTE_P | PTE_W | PTE_U));

        let entry = mem.lookup(0x1000, 0x1000).unwrap();
        assert_eq!(entry.frame_addr(0x1000), 0x5000);
        assert_eq!(entry.flags(), PteFlags::PRESENT | PteFlags::WRITABLE);

        let entry = mem.lookup(0x1000, 0x0040_0000).unwrap();
        assert_eq!(entry.flags(), PteFlags::USER_RDONLY);
    }

    #[test]
    fn test_table_pool_skips_page_directory() {
        let mut mem = PhysMemory::new(0x4000).unwrap();
        let mut builder = PageTableBuilder::new(&mut mem, 0x1000, 0x1000).unwrap();
        builder.map_page(0, 0x9000, PteFlags::empty()).unwrap();

        assert_eq!(mem.read_u32(0x1000).map(pte_addr), Some(0x2000));
    }

    #[test]
    fn test_table_pool_exhausted() {
        let mut mem = PhysMemory::new(0x3000).unwrap();
        let mut builder = PageTableBuilder::new(&mut mem, 0x1000, 0x2000).unwrap();
        builder.map_page(0, 0x9000, PteFlags::empty()).unwrap();

        assert!(matches!(
            builder.map_page(0x0040_0000, 0x9000, PteFlags::empty()),
            Err(SnapshotError::TablePoolExhausted(0x0040_0000))
        ));
    }

    #[test]
    fn test_large_page_conflicts() {
        let mut mem = PhysMemory::new(0x4000).unwrap();
        let mut builder = PageTableBuilder::new(&mut mem, 0x1000, 0x2000).unwrap();
        builder.map_large(0xf000_0000, 0, PteFlags::WRITABLE).unwrap();
        builder.map_page(0x1000, 0x1000, PteFlags::empty()).unwrap();

        assert!(matches!(
            builder.map_page(0xf000_1000, 0x1000, PteFlags::empty()),
            Err(SnapshotError::LargePageConflict(_))
        ));
        assert!(matches!(
            builder.map_large(0, 0, PteFlags::empty()),
            Err(SnapshotError::PageTableConflict(0))
        ));

        let entry = mem.lookup(0x1000, 0xf000_5000).unwrap();
        assert_eq!(entry.size(), PageSize::Large);
        assert_eq!(entry.frame_addr(0xf000_5000), 0x5000);
    }

    #[test]
    fn test_misaligned_mapping_rejected() {
        let mut mem = PhysMemory::new(0x4000).unwrap();
        let mut builder = PageTableBuilder::new(&mut mem, 0x1000, 0x2000).unwrap();

        assert!(builder.map_page(0x1001, 0x5000, PteFlags::empty()).is_err());
        assert!(builder.map_large(0x1000, 0, PteFlags::empty()).is_err());
    }

    #[test]
    fn test_map_region() {
        let mut mem = PhysMemory::new(0x4000).unwrap();
        let mut builder = PageTableBuilder::new(&mut mem, 0x1000, 0x2000).unwrap();
        builder.map_region(0x8000, 0x3000, 0x10_0000, PteFlags::WRITABLE).unwrap();

        for page in 0..3 {
            let va = 0x8000 + page * PGSIZE;
            assert_eq!(mem.lookup(0x1000, va).unwrap().frame_addr(va), 0x10_0000 + page * PGSIZE);
        }
        assert!(!mem.lookup(0x1000, 0xb000).unwrap().is_present());
    }
}
