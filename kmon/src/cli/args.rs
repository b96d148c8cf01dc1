//! CLI argument definitions

use clap::Parser;
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(
    name = "kmon",
    about = "Inspect a halted kernel: stack backtraces and page mappings",
    after_help = "\
EXAMPLES:
    kmon --snapshot crash.json                          Interactive monitor session
    kmon --snapshot crash.json -e backtrace             Run one command and exit
    kmon --snapshot crash.json --kernel obj/kern/kernel Resolve symbols from the ELF image
    kmon --snapshot crash.json -e 'showmappings 0xf0000000 0xf0010000'"
)]
pub struct Args {
    /// Machine snapshot (JSON) describing the halted kernel
    #[arg(short, long, value_name = "FILE")]
    pub snapshot: PathBuf,

    /// Kernel ELF image used for symbols instead of the snapshot symbol table
    #[arg(short, long, value_name = "ELF")]
    pub kernel: Option<PathBuf>,

    /// Run a monitor command and exit (repeatable, runs in order)
    #[arg(short = 'e', long = "exec", value_name = "CMD")]
    pub exec: Vec<String>,

    /// Suppress the welcome banner of interactive sessions
    #[arg(short, long)]
    pub quiet: bool,
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_args_definition() {
        Args::command().debug_assert();
    }

    #[test]
    fn test_repeated_exec() {
        let args =
            Args::parse_from(["kmon", "--snapshot", "s.json", "-e", "help", "--exec", "backtrace"]);
        assert_eq!(args.snapshot, PathBuf::from("s.json"));
        assert_eq!(args.exec, vec!["help", "backtrace"]);
        assert!(args.kernel.is_none());
        assert!(!args.quiet);
    }

    #[test]
    fn test_snapshot_required() {
        assert!(Args::try_parse_from(["kmon", "-e", "help"]).is_err());
    }
}
