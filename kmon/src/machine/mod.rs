//! # Inspected Machine
//!
//! The monitor never dereferences host pointers. The halted kernel it inspects
//! is modelled as plain data:
//!
//! - **Kernel stack**: a [`MemoryRegion`] indexed by virtual address, walked by
//!   the backtrace unwinder
//! - **Physical memory**: a [`PhysMemory`] holding the page directory and page
//!   tables, walked by the mapping inspector
//! - **Registers**: the monitor's own frame pointer and an optional trap frame
//!
//! ## Module Structure
//!
//! - **`memory`**: bounds-checked flat word buffers
//! - **`page_table`**: entry flags and the observe-only [`PageTableWalker`]
//! - **`builder`**: page table construction used when loading snapshots
//! - **`layout`**: kernel image layout symbols for `kerninfo`

pub mod builder;
pub mod layout;
pub mod memory;
pub mod page_table;

pub use builder::PageTableBuilder;
pub use layout::KernelLayout;
pub use memory::MemoryRegion;
pub use page_table::{LeafEntry, PageSize, PageTableWalker, PhysMemory, PteFlags};

use kmon_common::Trapframe;

/// Snapshot of a halted machine as seen by the monitor
#[derive(Debug, Clone)]
pub struct Machine {
    /// Kernel stack contents, addressed by virtual address
    pub stack: MemoryRegion,
    /// Physical memory holding the translation structures
    pub phys: PhysMemory,
    /// Physical address of the active page directory
    pub pgdir: u32,
    /// Frame pointer of the monitor itself when it was entered
    pub ebp: u32,
    /// Trap frame the monitor was entered with, if any
    pub trapframe: Option<Trapframe>,
    /// Faulting linear address for page faults
    pub cr2: Option<u32>,
    /// Layout symbols recorded with the snapshot
    pub layout: Option<KernelLayout>,
}

impl Machine {
    /// Frame pointer a backtrace starts from
    ///
    /// A trap frame takes priority: it describes where the kernel actually
    /// stopped. Without one the monitor's own frame is used.
    #[must_use]
    pub fn initial_frame_pointer(&self, tf: Option<&Trapframe>) -> u32 {
        tf.map_or(self.ebp, |tf| tf.tf_regs.reg_ebp)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_initial_frame_pointer() {
        let machine = Machine {
            stack: MemoryRegion::new(0, Vec::new()).unwrap(),
            phys: PhysMemory::new(0).unwrap(),
            pgdir: 0,
            ebp: 0xf010_ff38,
            trapframe: None,
            cr2: None,
            layout: None,
        };
        assert_eq!(machine.initial_frame_pointer(None), 0xf010_ff38);

        let mut tf = Trapframe::default();
        tf.tf_regs.reg_ebp = 0xf010_ffd8;
        assert_eq!(machine.initial_frame_pointer(Some(&tf)), 0xf010_ffd8);
    }
}
