//! Built-in monitor commands
//!
//! Each command receives the full argument vector, command name included.
//! None of them ever asks the monitor to exit.

use kmon_common::Trapframe;
use log::debug;
use std::io::{self, Write};

use super::{Command, Monitor};
use crate::backtrace::print_backtrace;
use crate::machine::KernelLayout;
use crate::mappings::show_mappings;

/// The command table a monitor starts with, in `help` order
#[must_use]
pub fn default_commands() -> Vec<Command> {
    vec![
        Command::new("help", "Display this list of commands", mon_help),
        Command::new("kerninfo", "Display information about the kernel", mon_kerninfo),
        Command::new("backtrace", "Display a listing of function call frames", mon_backtrace),
        Command::new("showmappings", "Display the memory mapping", mon_showmappings),
    ]
}

/// `help`: one `NAME - DESCRIPTION` line per command
///
/// # Errors
/// Only console write failures are returned
pub fn mon_help(
    monitor: &Monitor<'_>,
    _argv: &[&str],
    _tf: Option<&Trapframe>,
    out: &mut dyn Write,
) -> io::Result<i32> {
    for command in monitor.commands() {
        writeln!(out, "{} - {}", command.name, command.desc)?;
    }
    Ok(0)
}

/// `kerninfo`: layout symbols of the kernel image and its memory footprint
///
/// # Errors
/// Only console write failures are returned
pub fn mon_kerninfo(
    monitor: &Monitor<'_>,
    _argv: &[&str],
    _tf: Option<&Trapframe>,
    out: &mut dyn Write,
) -> io::Result<i32> {
    let Some(layout) = monitor.layout() else {
        writeln!(out, "Kernel layout symbols unavailable")?;
        return Ok(0);
    };

    writeln!(out, "Special kernel symbols:")?;
    writeln!(out, "  _start                  {:08x} (phys)", layout.start)?;
    let virtual_symbols = [
        ("entry", layout.entry),
        ("etext", layout.etext),
        ("edata", layout.edata),
        ("end", layout.end),
    ];
    for (name, va) in virtual_symbols {
        writeln!(out, "  {name:<6} {va:08x} (virt)  {:08x} (phys)", KernelLayout::phys(va))?;
    }
    writeln!(out, "Kernel executable memory footprint: {}KB", layout.footprint_kb())?;
    Ok(0)
}

/// `backtrace`: walk the frame pointer chain of the stopped kernel
///
/// Starts at the trap frame's `ebp` when the monitor was entered from a trap.
///
/// # Errors
/// Only console write failures are returned
pub fn mon_backtrace(
    monitor: &Monitor<'_>,
    _argv: &[&str],
    tf: Option<&Trapframe>,
    out: &mut dyn Write,
) -> io::Result<i32> {
    let machine = monitor.machine();
    let frame_pointer = machine.initial_frame_pointer(tf);
    debug!("Backtrace from ebp {frame_pointer:#010x}");

    print_backtrace(out, &machine.stack, frame_pointer, monitor.debug_info())?;
    Ok(0)
}

/// `showmappings begin_addr end_addr`: per-page translation report
///
/// # Errors
/// Only console write failures are returned
pub fn mon_showmappings(
    monitor: &Monitor<'_>,
    argv: &[&str],
    _tf: Option<&Trapframe>,
    out: &mut dyn Write,
) -> io::Result<i32> {
    let machine = monitor.machine();
    show_mappings(out, argv.get(1..).unwrap_or_default(), &machine.phys, machine.pgdir)?;
    Ok(0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::machine::{Machine, MemoryRegion, PageTableBuilder, PhysMemory, PteFlags};
    use crate::symbolization::{FunctionSymbol, NoDebugInfo, SymbolTable};

    const BOTTOM: u32 = 0xf010_8000;

    fn machine() -> Machine {
        let mut phys = PhysMemory::new(0x4000).unwrap();
        PageTableBuilder::new(&mut phys, 0x1000, 0x2000)
            .unwrap()
            .map_page(0x1000, 0x3000, PteFlags::USER)
            .unwrap();

        Machine {
            stack: MemoryRegion::new(BOTTOM, vec![BOTTOM + 8, 0xf010_0a10, 0, 0xf010_0110])
                .unwrap(),
            phys,
            pgdir: 0x1000,
            ebp: BOTTOM,
            trapframe: None,
            cr2: None,
            layout: None,
        }
    }

    fn run(monitor: &Monitor<'_>, line: &str) -> String {
        let mut out = Vec::new();
        assert_eq!(monitor.runcmd(line, None, &mut out).unwrap(), 0);
        String::from_utf8(out).unwrap()
    }

    #[test]
    fn test_help_lists_table_in_order() {
        let machine = machine();
        let monitor = Monitor::new(&machine, &NoDebugInfo);
        assert_eq!(
            run(&monitor, "help"),
            "help - Display this list of commands\n\
             kerninfo - Display information about the kernel\n\
             backtrace - Display a listing of function call frames\n\
             showmappings - Display the memory mapping\n"
        );
    }

    #[test]
    fn test_kerninfo() {
        let machine = machine();
        let monitor = Monitor::new(&machine, &NoDebugInfo).with_layout(Some(KernelLayout {
            start: 0x0010_000c,
            entry: 0xf010_000c,
            etext: 0xf010_1a75,
            edata: 0xf011_2300,
            end: 0xf011_2960,
        }));
        assert_eq!(
            run(&monitor, "kerninfo"),
            "Special kernel symbols:\n\
             \x20 _start                  0010000c (phys)\n\
             \x20 entry  f010000c (virt)  0010000c (phys)\n\
             \x20 etext  f0101a75 (virt)  00101a75 (phys)\n\
             \x20 edata  f0112300 (virt)  00112300 (phys)\n\
             \x20 end    f0112960 (virt)  00112960 (phys)\n\
             Kernel executable memory footprint: 75KB\n"
        );
    }

    #[test]
    fn test_kerninfo_without_layout() {
        let machine = machine();
        let monitor = Monitor::new(&machine, &NoDebugInfo);
        assert_eq!(run(&monitor, "kerninfo"), "Kernel layout symbols unavailable\n");
    }

    #[test]
    fn test_backtrace_two_frames() {
        let machine = machine();
        let symbols = SymbolTable::new(vec![
            FunctionSymbol {
                name: "i386_init:F(0,25)".into(),
                addr: 0xf010_0100,
                size: Some(0x40),
                file: "kern/init.c".into(),
                lines: vec![(0xf010_0100, 24)],
            },
            FunctionSymbol {
                name: "mon_backtrace".into(),
                addr: 0xf010_0a00,
                size: None,
                file: "kern/monitor.c".into(),
                lines: vec![(0xf010_0a00, 60), (0xf010_0a10, 62)],
            },
        ]);
        let monitor = Monitor::new(&machine, &symbols);

        let text = run(&monitor, "backtrace");
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines.len(), 5);
        assert_eq!(lines[0], "Stack backtrace:");
        assert_eq!(
            lines[1],
            "  ebp f0108000  eip f0100a10  args 00000000 f0100110 -------- -------- --------"
        );
        assert_eq!(lines[2], "         kern/monitor.c:62: mon_backtrace+16");
        assert!(lines[3].starts_with("  ebp f0108008  eip f0100110  args --------"));
        assert_eq!(lines[4], "         kern/init.c:24: i386_init+16");
    }

    #[test]
    fn test_backtrace_prefers_trapframe() {
        let machine = machine();
        let monitor = Monitor::new(&machine, &NoDebugInfo);
        let mut tf = Trapframe::default();
        tf.tf_regs.reg_ebp = BOTTOM + 8;

        let mut out = Vec::new();
        monitor.runcmd("backtrace", Some(&tf), &mut out).unwrap();
        let text = String::from_utf8(out).unwrap();
        assert_eq!(text.lines().count(), 3);
        assert!(text.contains("ebp f0108008"));
    }

    #[test]
    fn test_showmappings() {
        let machine = machine();
        let monitor = Monitor::new(&machine, &NoDebugInfo);
        assert_eq!(
            run(&monitor, "showmappings 0x1000 0x3000"),
            "[00001000, 00002000): page 00003000 PTE_P: 1, PTE_W: 0, PTE_U: 1\n\
             [00002000, 00003000): not mapped\n"
        );
        assert_eq!(run(&monitor, "showmappings"), "Usage: showmappings begin_addr end_addr\n");
    }
}
