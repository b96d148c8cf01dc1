//! # kmon - Main Entry Point
//!
//! Supports two operational modes:
//! - **Interactive** (`kmon --snapshot FILE`): monitor session on stdin/stdout
//! - **Batch** (`kmon --snapshot FILE -e CMD ...`): run the commands in order and exit

use anyhow::{Context, Result};
use clap::Parser;
use kmon::cli::Args;
use kmon::monitor::Monitor;
use kmon::snapshot::Snapshot;
use kmon::symbolization::{DebugInfoResolver, NoDebugInfo, Symbolizer};
use log::info;
use std::io;

// Exit codes
const EXIT_SUCCESS: i32 = 0;
const EXIT_ERROR: i32 = 1;
const EXIT_USAGE: i32 = 2;

fn main() {
    env_logger::init();

    let args = match Args::try_parse() {
        Ok(args) => args,
        Err(err) => {
            let code = if err.use_stderr() { EXIT_USAGE } else { EXIT_SUCCESS };
            // Nothing left to report to if stderr itself is gone
            let _ = err.print();
            std::process::exit(code);
        }
    };

    std::process::exit(match run(&args) {
        Ok(()) => EXIT_SUCCESS,
        Err(e) => {
            eprintln!("error: {e:#}");
            EXIT_ERROR
        }
    });
}

fn run(args: &Args) -> Result<()> {
    let snapshot = Snapshot::load(&args.snapshot)
        .with_context(|| format!("Failed to load snapshot {}", args.snapshot.display()))?;

    let symbolizer = args
        .kernel
        .as_ref()
        .map(|path| {
            Symbolizer::new(path)
                .with_context(|| format!("Failed to load kernel image {}", path.display()))
        })
        .transpose()?;

    // Kernel image first, then the snapshot's own table
    let debug_info: &dyn DebugInfoResolver = match &symbolizer {
        Some(symbolizer) => symbolizer,
        None if !snapshot.symbols.is_empty() => &snapshot.symbols,
        None => &NoDebugInfo,
    };
    let layout =
        symbolizer.as_ref().and_then(Symbolizer::kernel_layout).or(snapshot.machine.layout);

    let machine = &snapshot.machine;
    let monitor = Monitor::new(machine, debug_info).with_layout(layout).with_banner(!args.quiet);
    let tf = machine.trapframe.as_ref();
    let mut out = io::stdout().lock();

    if args.exec.is_empty() {
        info!("Starting interactive session");
        monitor.run(&mut io::stdin().lock(), &mut out, tf).context("Console I/O failed")?;
    } else {
        info!("Running {} commands", args.exec.len());
        monitor.execute(&args.exec, tf, &mut out).context("Console I/O failed")?;
    }
    Ok(())
}
