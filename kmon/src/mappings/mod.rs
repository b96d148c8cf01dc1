//! Page mapping inspector
//!
//! Reports, page by page, how a virtual address range is translated by the
//! active page directory:
//!
//! ```text
//! K> showmappings 0x1000 0x3000
//! [00001000, 00002000): page 00117000 PTE_P: 1, PTE_W: 1, PTE_U: 0
//! [00002000, 00003000): not mapped
//! ```
//!
//! The walk only reads physical memory; nothing here can create or change a
//! translation.

pub mod inspector;
pub mod range;

pub use inspector::{MappingInspector, PageMapping};
pub use range::{PageRange, RangeQuery, USAGE};

use log::{info, warn};
use std::io::{self, Write};

use crate::machine::PageTableWalker;

/// Run `showmappings` over `args` (the arguments after the command name)
///
/// Usage, parse and range problems are printed, never returned.
///
/// # Errors
/// Only console write failures are returned
pub fn show_mappings(
    out: &mut dyn Write,
    args: &[&str],
    walker: &dyn PageTableWalker,
    pgdir: u32,
) -> io::Result<()> {
    let query = match RangeQuery::parse(args) {
        Ok(query) => query,
        Err(err) => return writeln!(out, "{err}"),
    };

    let query = if query.is_page_aligned() {
        query
    } else {
        let aligned = query.page_aligned();
        warn!("Unaligned range {:#x}..{:#x} rounded up", query.begin, query.end);
        writeln!(
            out,
            "Warning: range not page-aligned, rounded up to [{:08x}, {:08x})",
            aligned.begin, aligned.end
        )?;
        aligned
    };

    let range = match query.into_page_range() {
        Ok(range) => range,
        Err(err) => return writeln!(out, "{err}"),
    };

    info!("Inspecting {} pages from {:#010x}", range.page_count(), range.begin());
    let inspector = MappingInspector::new(walker, pgdir);
    for mapping in inspector.inspect(range) {
        writeln!(out, "{mapping}")?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::machine::{PageTableBuilder, PhysMemory, PteFlags};

    const PGDIR: u32 = 0x1000;

    fn run(args: &[&str]) -> String {
        let mut mem = PhysMemory::new(0x4000).unwrap();
        let mut builder = PageTableBuilder::new(&mut mem, PGDIR, 0x2000).unwrap();
        builder.map_page(0x1000, 0x5000, PteFlags::WRITABLE).unwrap();

        let mut out = Vec::new();
        show_mappings(&mut out, args, &mem, PGDIR).unwrap();
        String::from_utf8(out).unwrap()
    }

    #[test]
    fn test_read_write_and_unmapped_pages() {
        assert_eq!(
            run(&["0x1000", "0x3000"]),
            "[00001000, 00002000): page 00005000 PTE_P: 1, PTE_W: 1, PTE_U: 0\n\
             [00002000, 00003000): not mapped\n"
        );
    }

    #[test]
    fn test_unaligned_bounds_warn_then_walk() {
        assert_eq!(
            run(&["0x1001", "0x2500"]),
            "Warning: range not page-aligned, rounded up to [00002000, 00003000)\n\
             [00002000, 00003000): not mapped\n"
        );
    }

    #[test]
    fn test_usage() {
        assert_eq!(run(&["0x1000"]), "Usage: showmappings begin_addr end_addr\n");
    }

    #[test]
    fn test_invalid_address() {
        assert_eq!(run(&["0x1000", "end"]), "Error: invalid address 'end'\n");
    }

    #[test]
    fn test_empty_range() {
        assert_eq!(run(&["0x3000", "0x3000"]), "Error: end_addr must be larger than begin_addr\n");
        assert_eq!(
            run(&["0x2001", "0x1000"]),
            "Warning: range not page-aligned, rounded up to [00003000, 00001000)\n\
             Error: end_addr must be larger than begin_addr\n"
        );
    }

    #[test]
    fn test_directory_outside_memory_reads_as_unmapped() {
        let mem = PhysMemory::new(0x2000).unwrap();
        let mut out = Vec::new();
        show_mappings(&mut out, &["0", "0x400000"], &mem, 0x8000).unwrap();

        let text = String::from_utf8(out).unwrap();
        assert_eq!(text.lines().count(), 1024);
        assert!(text.lines().all(|line| line.ends_with("): not mapped")));
    }

    #[test]
    fn test_decimal_bounds() {
        assert_eq!(run(&["4096", "8192"]).lines().count(), 1);
    }
}
