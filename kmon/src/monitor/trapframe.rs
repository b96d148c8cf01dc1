//! Trap frame dump printed when the monitor is entered from a trap

use kmon_common::{trap_name, PushRegs, Trapframe, FEC_PR, FEC_U, FEC_WR, T_PGFLT};
use std::io::{self, Write};

/// Print the saved register state of `tf`
///
/// `cr2` is only shown for page faults, together with the decoded error code.
///
/// # Errors
/// Only console write failures are returned
pub fn print_trapframe(out: &mut dyn Write, tf: &Trapframe, cr2: Option<u32>) -> io::Result<()> {
    writeln!(out, "TRAP frame")?;
    print_regs(out, &tf.tf_regs)?;
    writeln!(out, "  es   0x----{:04x}", tf.tf_es)?;
    writeln!(out, "  ds   0x----{:04x}", tf.tf_ds)?;
    writeln!(out, "  trap 0x{:08x} {}", tf.tf_trapno, trap_name(tf.tf_trapno))?;

    let page_fault = tf.tf_trapno == T_PGFLT;
    if let (true, Some(cr2)) = (page_fault, cr2) {
        writeln!(out, "  cr2  0x{cr2:08x}")?;
    }
    write!(out, "  err  0x{:08x}", tf.tf_err)?;
    if page_fault {
        write!(out, " [{}]", describe_fault(tf.tf_err))?;
    }
    writeln!(out)?;

    writeln!(out, "  eip  0x{:08x}", tf.tf_eip)?;
    writeln!(out, "  cs   0x----{:04x}", tf.tf_cs)?;
    writeln!(out, "  flag 0x{:08x}", tf.tf_eflags)?;
    if tf.is_from_user() {
        writeln!(out, "  esp  0x{:08x}", tf.tf_esp)?;
        writeln!(out, "  ss   0x----{:04x}", tf.tf_ss)?;
    }
    Ok(())
}

fn print_regs(out: &mut dyn Write, regs: &PushRegs) -> io::Result<()> {
    for (name, value) in [
        ("edi", regs.reg_edi),
        ("esi", regs.reg_esi),
        ("ebp", regs.reg_ebp),
        ("oesp", regs.reg_oesp),
        ("ebx", regs.reg_ebx),
        ("edx", regs.reg_edx),
        ("ecx", regs.reg_ecx),
        ("eax", regs.reg_eax),
    ] {
        writeln!(out, "  {name:<4} 0x{value:08x}")?;
    }
    Ok(())
}

/// Page fault error code as `[who, access, cause]`
fn describe_fault(err: u32) -> String {
    format!(
        "{}, {}, {}",
        if err & FEC_U != 0 { "user" } else { "kernel" },
        if err & FEC_WR != 0 { "write" } else { "read" },
        if err & FEC_PR != 0 { "protection" } else { "not-present" },
    )
}
