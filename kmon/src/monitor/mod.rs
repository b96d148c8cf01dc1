//! # Command Dispatcher
//!
//! A thin read-eval loop over an owned command table:
//!
//! ```text
//! K> showmappings 0x1000 0x3000
//!    \__ argv[0] __/ \_ argv[1..] _/
//!          │
//!          ▼
//!   Monitor::runcmd ──▶ tokenize ──▶ command table lookup ──▶ CommandFn
//! ```
//!
//! ## Command Status
//!
//! A command returns a status: negative ends the loop, anything else keeps
//! reading. Problems with the input itself (unknown command, too many
//! arguments) are printed and count as status 0.
//!
//! ## Module Structure
//!
//! - **`commands`**: `help`, `kerninfo`, `backtrace` and `showmappings`
//! - **`trapframe`**: register dump printed on entry from a trap

pub mod commands;
pub mod trapframe;

pub use commands::default_commands;
pub use trapframe::print_trapframe;

use kmon_common::Trapframe;
use log::{debug, info};
use std::fmt;
use std::io::{self, BufRead, Write};

use crate::domain::MonitorError;
use crate::machine::{KernelLayout, Machine};
use crate::symbolization::DebugInfoResolver;

/// Size of the argument vector, command name and terminator included
pub const MAXARGS: usize = 16;

/// Characters separating arguments
pub const WHITESPACE: [char; 4] = ['\t', '\r', '\n', ' '];

/// Prompt printed before each line is read
pub const PROMPT: &str = "K> ";

const BANNER: &str = "\x1b[0;31;40mWelcome \x1b[0;32;40mto \x1b[0;33;40mthe \x1b[0;34;40mJOS \
                      \x1b[0;35;40mkernel \x1b[0;36;40mmonitor!\x1b[0m";

/// Signature shared by all monitor commands
///
/// Receives the argument vector with the command name at index 0.
pub type CommandFn =
    fn(&Monitor<'_>, &[&str], Option<&Trapframe>, &mut dyn Write) -> io::Result<i32>;

/// One entry of the command table
#[derive(Clone, Copy)]
pub struct Command {
    pub name: &'static str,
    pub desc: &'static str,
    pub func: CommandFn,
}

impl Command {
    #[must_use]
    pub fn new(name: &'static str, desc: &'static str, func: CommandFn) -> Self {
        Self { name, desc, func }
    }
}

impl fmt::Debug for Command {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Command").field("name", &self.name).field("desc", &self.desc).finish()
    }
}

/// Split a command line into arguments
///
/// # Errors
/// [`MonitorError::TooManyArguments`] when the line has `MAXARGS - 1` or more
/// arguments
pub fn tokenize(line: &str) -> Result<Vec<&str>, MonitorError> {
    let argv: Vec<&str> = line.split(WHITESPACE).filter(|arg| !arg.is_empty()).collect();
    if argv.len() >= MAXARGS {
        return Err(MonitorError::TooManyArguments(MAXARGS));
    }
    Ok(argv)
}

/// The kernel monitor bound to one inspected machine
pub struct Monitor<'a> {
    commands: Vec<Command>,
    machine: &'a Machine,
    debug_info: &'a dyn DebugInfoResolver,
    layout: Option<KernelLayout>,
    banner: bool,
}

impl<'a> Monitor<'a> {
    /// Monitor with the built-in command table
    #[must_use]
    pub fn new(machine: &'a Machine, debug_info: &'a dyn DebugInfoResolver) -> Self {
        Self::with_commands(default_commands(), machine, debug_info)
    }

    /// Monitor with a caller-supplied command table
    #[must_use]
    pub fn with_commands(
        commands: Vec<Command>,
        machine: &'a Machine,
        debug_info: &'a dyn DebugInfoResolver,
    ) -> Self {
        Self { commands, machine, debug_info, layout: machine.layout, banner: true }
    }

    /// Replace the kernel layout reported by `kerninfo`
    #[must_use]
    pub fn with_layout(mut self, layout: Option<KernelLayout>) -> Self {
        self.layout = layout;
        self
    }

    /// Whether [`Monitor::run`] greets with the welcome banner
    #[must_use]
    pub fn with_banner(mut self, banner: bool) -> Self {
        self.banner = banner;
        self
    }

    #[must_use]
    pub fn commands(&self) -> &[Command] {
        &self.commands
    }

    #[must_use]
    pub fn machine(&self) -> &Machine {
        self.machine
    }

    #[must_use]
    pub fn debug_info(&self) -> &dyn DebugInfoResolver {
        self.debug_info
    }

    #[must_use]
    pub fn layout(&self) -> Option<&KernelLayout> {
        self.layout.as_ref()
    }

    /// Tokenize and dispatch one command line
    ///
    /// # Errors
    /// Only console write failures are returned
    pub fn runcmd(
        &self,
        line: &str,
        tf: Option<&Trapframe>,
        out: &mut dyn Write,
    ) -> io::Result<i32> {
        let argv = match tokenize(line) {
            Ok(argv) => argv,
            Err(err) => {
                writeln!(out, "{err}")?;
                return Ok(0);
            }
        };
        let Some(&name) = argv.first() else {
            return Ok(0);
        };

        match self.commands.iter().find(|command| command.name == name) {
            Some(command) => {
                debug!("Dispatching {name} with {} arguments", argv.len() - 1);
                (command.func)(self, &argv, tf, out)
            }
            None => {
                writeln!(out, "{}", MonitorError::UnknownCommand(name.to_string()))?;
                Ok(0)
            }
        }
    }

    /// Run `lines` in order without banner or prompt
    ///
    /// Stops early when a command returns a negative status, which is
    /// returned; otherwise returns the status of the last command.
    ///
    /// # Errors
    /// Only console write failures are returned
    pub fn execute<S: AsRef<str>>(
        &self,
        lines: &[S],
        tf: Option<&Trapframe>,
        out: &mut dyn Write,
    ) -> io::Result<i32> {
        let mut status = 0;
        for line in lines {
            status = self.runcmd(line.as_ref(), tf, out)?;
            if status < 0 {
                break;
            }
        }
        out.flush()?;
        Ok(status)
    }

    /// Interactive session: banner, trap frame, then a prompt per line until
    /// end of input or a negative command status
    ///
    /// # Errors
    /// Console read or write failures
    pub fn run(
        &self,
        input: &mut dyn BufRead,
        out: &mut dyn Write,
        tf: Option<&Trapframe>,
    ) -> io::Result<()> {
        if self.banner {
            writeln!(out, "{BANNER}")?;
            writeln!(out, "Type 'help' for a list of commands.")?;
        }
        if let Some(tf) = tf {
            print_trapframe(out, tf, self.machine.cr2)?;
        }

        let mut buf = Vec::new();
        loop {
            write!(out, "{PROMPT}")?;
            out.flush()?;

            buf.clear();
            if input.read_until(b'\n', &mut buf)? == 0 {
                info!("End of input, leaving monitor");
                writeln!(out)?;
                break;
            }
            // Console bytes are not guaranteed to be UTF-8
            let line = String::from_utf8_lossy(&buf);
            if self.runcmd(&line, tf, out)? < 0 {
                info!("Command requested exit");
                break;
            }
        }
        out.flush()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::machine::{MemoryRegion, PhysMemory};
    use crate::symbolization::NoDebugInfo;
    use std::io::Cursor;

    fn machine() -> Machine {
        Machine {
            stack: MemoryRegion::new(0xf010_8000, vec![0; 4]).unwrap(),
            phys: PhysMemory::new(0x2000).unwrap(),
            pgdir: 0x1000,
            ebp: 0,
            trapframe: None,
            cr2: None,
            layout: None,
        }
    }

    fn echo(
        _monitor: &Monitor<'_>,
        argv: &[&str],
        _tf: Option<&Trapframe>,
        out: &mut dyn Write,
    ) -> io::Result<i32> {
        writeln!(out, "{}", argv[1..].join(","))?;
        Ok(0)
    }

    fn quit(
        _monitor: &Monitor<'_>,
        _argv: &[&str],
        _tf: Option<&Trapframe>,
        out: &mut dyn Write,
    ) -> io::Result<i32> {
        writeln!(out, "bye")?;
        Ok(-1)
    }

    fn synthetic(machine: &Machine) -> Monitor<'_> {
        Monitor::with_commands(
            vec![
                Command::new("echo", "Print arguments", echo),
                Command::new("quit", "Leave", quit),
            ],
            machine,
            &NoDebugInfo,
        )
    }

    fn runcmd(monitor: &Monitor<'_>, line: &str) -> (i32, String) {
        let mut out = Vec::new();
        let status = monitor.runcmd(line, None, &mut out).unwrap();
        (status, String::from_utf8(out).unwrap())
    }

    #[test]
    fn test_tokenize() {
        assert_eq!(tokenize("  echo\ta \r b\n").unwrap(), vec!["echo", "a", "b"]);
        assert!(tokenize(" \t\r\n").unwrap().is_empty());
    }

    #[test]
    fn test_tokenize_argument_limit() {
        let fifteen = vec!["x"; MAXARGS - 1].join(" ");
        assert_eq!(tokenize(&fifteen).unwrap().len(), MAXARGS - 1);

        let sixteen = vec!["x"; MAXARGS].join(" ");
        assert_eq!(tokenize(&sixteen), Err(MonitorError::TooManyArguments(MAXARGS)));
    }

    #[test]
    fn test_dispatch() {
        let machine = machine();
        let monitor = synthetic(&machine);
        assert_eq!(runcmd(&monitor, "echo a b"), (0, "a,b\n".to_string()));
    }

    #[test]
    fn test_input_problems_continue() {
        let machine = machine();
        let monitor = synthetic(&machine);

        assert_eq!(runcmd(&monitor, ""), (0, String::new()));
        assert_eq!(runcmd(&monitor, "frob 1"), (0, "Unknown command 'frob'\n".to_string()));
        assert_eq!(
            runcmd(&monitor, &vec!["echo"; MAXARGS].join(" ")),
            (0, "Too many arguments (max 16)\n".to_string())
        );
    }

    #[test]
    fn test_command_names_are_case_sensitive() {
        let machine = machine();
        let monitor = Monitor::new(&machine, &NoDebugInfo);
        assert_eq!(runcmd(&monitor, "HELP").1, "Unknown command 'HELP'\n");
    }

    #[test]
    fn test_negative_status_ends_loop() {
        let machine = machine();
        let monitor = synthetic(&machine);
        let mut input = Cursor::new("echo 1\nquit\necho 2\n");
        let mut out = Vec::new();

        monitor.run(&mut input, &mut out, None).unwrap();
        let text = String::from_utf8(out).unwrap();
        assert!(text.contains("Type 'help' for a list of commands.\n"));
        assert!(text.ends_with("K> 1\nK> bye\n"));
    }

    #[test]
    fn test_end_of_input_ends_loop() {
        let machine = machine();
        let monitor = synthetic(&machine);
        let mut out = Vec::new();

        monitor.run(&mut Cursor::new("echo x\n\n"), &mut out, None).unwrap();
        assert!(String::from_utf8(out).unwrap().ends_with("K> x\nK> K> \n"));
    }

    #[test]
    fn test_session_without_banner() {
        let machine = machine();
        let monitor = synthetic(&machine).with_banner(false);
        let mut out = Vec::new();

        monitor.run(&mut Cursor::new("echo q\n"), &mut out, None).unwrap();
        assert_eq!(String::from_utf8(out).unwrap(), "K> q\nK> \n");
    }

    #[test]
    fn test_session_prints_trapframe() {
        let machine = machine();
        let monitor = synthetic(&machine);
        let mut tf = Trapframe::default();
        tf.tf_trapno = 3;

        let mut out = Vec::new();
        monitor.run(&mut Cursor::new(""), &mut out, Some(&tf)).unwrap();
        let text = String::from_utf8(out).unwrap();
        assert!(text.contains("TRAP frame\n"));
        assert!(text.contains("  trap 0x00000003 Breakpoint\n"));
    }

    #[test]
    fn test_invalid_utf8_line_keeps_session_alive() {
        let machine = machine();
        let monitor = Monitor::new(&machine, &NoDebugInfo).with_banner(false);
        let mut out = Vec::new();

        monitor.run(&mut Cursor::new(&b"\xff\xfe\nhelp\n"[..]), &mut out, None).unwrap();
        let text = String::from_utf8(out).unwrap();
        assert!(text.starts_with("K> Unknown command '\u{fffd}\u{fffd}'\n"));
        assert!(text.contains("showmappings - "));
        assert!(text.ends_with("K> \n"));
    }

    #[test]
    fn test_execute_stops_on_negative_status() {
        let machine = machine();
        let monitor = synthetic(&machine);
        let mut out = Vec::new();

        let status = monitor.execute(&["echo a", "quit", "echo b"], None, &mut out).unwrap();
        assert_eq!(status, -1);
        assert_eq!(String::from_utf8(out).unwrap(), "a\nbye\n");
    }
}
