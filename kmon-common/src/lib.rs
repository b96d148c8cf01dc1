//! # Shared Machine Layout (Kernel ↔ Monitor)
//!
//! Defines the i386 constants and data structures shared between the kernel
//! that produces a machine snapshot and the monitor that inspects it. All
//! structures use `#[repr(C)]` so they match the layout the kernel pushes on
//! its stack.
//!
//! ## Address Splitting
//!
//! A 32-bit linear address is split for the two-level translation walk:
//!
//! ```text
//! +--------10------+-------10-------+---------12----------+
//! | Page Directory |   Page Table   | Offset within Page  |
//! |      Index     |      Index     |                     |
//! +----------------+----------------+---------------------+
//!  \--- pdx(va) --/ \--- ptx(va) --/ \---- pgoff(va) ----/
//! ```
//!
//! ## Key Types
//!
//! - [`Trapframe`] - Register state saved by the trap entry path
//! - [`PushRegs`] - General purpose registers as laid out by `pushal`

#![no_std]

// ============================================================================
// Paging Constants
// ============================================================================

/// Bytes mapped by one page table entry
pub const PGSIZE: u32 = 4096;

/// log2(PGSIZE)
pub const PGSHIFT: u32 = 12;

/// Bytes mapped by one page directory entry (4 MiB)
pub const PTSIZE: u32 = PGSIZE * NPTENTRIES;

/// Entries per page directory
pub const NPDENTRIES: u32 = 1024;

/// Entries per page table
pub const NPTENTRIES: u32 = 1024;

/// Offset of the page table index in a linear address
pub const PTXSHIFT: u32 = PGSHIFT;

/// Offset of the page directory index in a linear address
pub const PDXSHIFT: u32 = 22;

/// All kernel physical memory is mapped at this virtual address
pub const KERNBASE: u32 = 0xf000_0000;

// ============================================================================
// Page Table / Directory Entry Bits
// ============================================================================

/// Present
pub const PTE_P: u32 = 0x001;
/// Writeable
pub const PTE_W: u32 = 0x002;
/// User
pub const PTE_U: u32 = 0x004;
/// Write-Through
pub const PTE_PWT: u32 = 0x008;
/// Cache-Disable
pub const PTE_PCD: u32 = 0x010;
/// Accessed
pub const PTE_A: u32 = 0x020;
/// Dirty
pub const PTE_D: u32 = 0x040;
/// Page Size (directory entries only: maps a 4 MiB page)
pub const PTE_PS: u32 = 0x080;
/// Global
pub const PTE_G: u32 = 0x100;

/// Frame address bits of a 4 KiB entry
pub const PTE_ADDR_MASK: u32 = !0xfff;

/// Frame address bits of a 4 MiB directory entry
pub const PTE_LARGE_ADDR_MASK: u32 = !(PTSIZE - 1);

/// Page directory index of a linear address
#[must_use]
pub const fn pdx(va: u32) -> usize {
    ((va >> PDXSHIFT) & (NPDENTRIES - 1)) as usize
}

/// Page table index of a linear address
#[must_use]
pub const fn ptx(va: u32) -> usize {
    ((va >> PTXSHIFT) & (NPTENTRIES - 1)) as usize
}

/// Offset within the page
#[must_use]
pub const fn pgoff(va: u32) -> u32 {
    va & (PGSIZE - 1)
}

/// Physical address held by a page table or page directory entry
#[must_use]
pub const fn pte_addr(entry: u32) -> u32 {
    entry & PTE_ADDR_MASK
}

/// Round `n` down to a multiple of `align` (a power of two)
#[must_use]
pub const fn round_down(n: u64, align: u64) -> u64 {
    n & !(align - 1)
}

/// Round `n` up to a multiple of `align` (a power of two)
#[must_use]
pub const fn round_up(n: u64, align: u64) -> u64 {
    round_down(n + align - 1, align)
}

// ============================================================================
// Traps
// ============================================================================

/// Divide error
pub const T_DIVIDE: u32 = 0;
/// Debug exception
pub const T_DEBUG: u32 = 1;
/// Non-maskable interrupt
pub const T_NMI: u32 = 2;
/// Breakpoint
pub const T_BRKPT: u32 = 3;
/// Overflow
pub const T_OFLOW: u32 = 4;
/// Bounds check
pub const T_BOUND: u32 = 5;
/// Illegal opcode
pub const T_ILLOP: u32 = 6;
/// Device not available
pub const T_DEVICE: u32 = 7;
/// Double fault
pub const T_DBLFLT: u32 = 8;
/// Invalid task switch segment
pub const T_TSS: u32 = 10;
/// Segment not present
pub const T_SEGNP: u32 = 11;
/// Stack exception
pub const T_STACK: u32 = 12;
/// General protection fault
pub const T_GPFLT: u32 = 13;
/// Page fault
pub const T_PGFLT: u32 = 14;
/// Floating point error
pub const T_FPERR: u32 = 16;
/// Alignment check
pub const T_ALIGN: u32 = 17;
/// Machine check
pub const T_MCHK: u32 = 18;
/// SIMD floating point error
pub const T_SIMDERR: u32 = 19;
/// System call
pub const T_SYSCALL: u32 = 48;

/// Page fault error code: protection violation (clear means not-present)
pub const FEC_PR: u32 = 0x1;
/// Page fault error code: caused by a write
pub const FEC_WR: u32 = 0x2;
/// Page fault error code: occurred in user mode
pub const FEC_U: u32 = 0x4;

/// Human readable name of a trap number
#[must_use]
pub fn trap_name(trapno: u32) -> &'static str {
    match trapno {
        T_DIVIDE => "Divide error",
        T_DEBUG => "Debug",
        T_NMI => "Non-Maskable Interrupt",
        T_BRKPT => "Breakpoint",
        T_OFLOW => "Overflow",
        T_BOUND => "BOUND Range Exceeded",
        T_ILLOP => "Invalid Opcode",
        T_DEVICE => "Device Not Available",
        T_DBLFLT => "Double Fault",
        9 => "Coprocessor Segment Overrun",
        T_TSS => "Invalid TSS",
        T_SEGNP => "Segment Not Present",
        T_STACK => "Stack Fault",
        T_GPFLT => "General Protection",
        T_PGFLT => "Page Fault",
        T_FPERR => "x87 FPU Floating-Point Error",
        T_ALIGN => "Alignment Check",
        T_MCHK => "Machine-Check",
        T_SIMDERR => "SIMD Floating-Point Exception",
        T_SYSCALL => "System call",
        _ => "(unknown trap)",
    }
}

// ============================================================================
// Trap Frame
// ============================================================================

/// General purpose registers in `pushal` order
#[repr(C)]
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct PushRegs {
    pub reg_edi: u32,
    pub reg_esi: u32,
    pub reg_ebp: u32,
    /// Useless, ignored by `popal`
    pub reg_oesp: u32,
    pub reg_ebx: u32,
    pub reg_edx: u32,
    pub reg_ecx: u32,
    pub reg_eax: u32,
}

/// Register state saved on trap entry
///
/// The segment registers are pushed as 32-bit slots; only the low 16 bits are
/// meaningful, the padding fields hold the rest.
#[repr(C)]
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct Trapframe {
    pub tf_regs: PushRegs,
    pub tf_es: u16,
    pub tf_padding1: u16,
    pub tf_ds: u16,
    pub tf_padding2: u16,
    pub tf_trapno: u32,
    // below here defined by x86 hardware
    pub tf_err: u32,
    pub tf_eip: u32,
    pub tf_cs: u16,
    pub tf_padding3: u16,
    pub tf_eflags: u32,
    // below here only when crossing rings, such as from user to kernel
    pub tf_esp: u32,
    pub tf_ss: u16,
    pub tf_padding4: u16,
}

impl Trapframe {
    /// True when the trap was taken while running at user privilege
    #[must_use]
    pub fn is_from_user(&self) -> bool {
        self.tf_cs & 3 != 0
    }
}
