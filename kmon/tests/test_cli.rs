use std::io::Write;
use std::process::{Command, Output, Stdio};
use tempfile::NamedTempFile;

const SNAPSHOT: &str = r#"{
    "registers": { "ebp": "0xf010ff00" },
    "stack": { "bottom": "0xf010ff00",
               "words": ["0xf010ff08", "0xf0100a2b", 0, "0xf0100110", 7] },
    "mappings": [ { "va": "0x1000", "pa": "0x5000", "perm": ["W"] } ],
    "symbols": [
        { "name": "mon_backtrace", "addr": "0xf0100a00", "file": "kern/monitor.c",
          "lines": [["0xf0100a00", 60]] },
        { "name": "i386_init", "addr": "0xf0100100", "size": 64, "file": "kern/init.c",
          "lines": [["0xf0100100", 24]] }
    ]
}"#;

fn snapshot_file() -> NamedTempFile {
    let mut file = NamedTempFile::new().expect("Failed to create snapshot file");
    file.write_all(SNAPSHOT.as_bytes()).expect("Failed to write snapshot");
    file
}

fn kmon(args: &[&str]) -> Output {
    Command::new(env!("CARGO_BIN_EXE_kmon")).args(args).output().expect("Failed to run kmon")
}

#[test]
fn test_batch_commands() {
    let file = snapshot_file();
    let path = file.path().to_str().unwrap();

    let output = kmon(&["--snapshot", path, "-e", "backtrace", "-e", "showmappings 0x1000 0x3000"]);
    assert_eq!(output.status.code(), Some(0));
    assert_eq!(
        String::from_utf8_lossy(&output.stdout),
        "Stack backtrace:\n\
         \x20 ebp f010ff00  eip f0100a2b  args 00000000 f0100110 00000007 -------- --------\n\
         \x20        kern/monitor.c:60: mon_backtrace+43\n\
         \x20 ebp f010ff08  eip f0100110  args 00000007 -------- -------- -------- --------\n\
         \x20        kern/init.c:24: i386_init+16\n\
         [00001000, 00002000): page 00005000 PTE_P: 1, PTE_W: 1, PTE_U: 0\n\
         [00002000, 00003000): not mapped\n"
    );
}

#[test]
fn test_interactive_quiet_session() {
    let file = snapshot_file();
    let mut child = Command::new(env!("CARGO_BIN_EXE_kmon"))
        .args(["--snapshot", file.path().to_str().unwrap(), "--quiet"])
        .stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .spawn()
        .expect("Failed to spawn kmon");

    child.stdin.take().unwrap().write_all(b"help\n").unwrap();
    let output = child.wait_with_output().unwrap();

    assert_eq!(output.status.code(), Some(0));
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(stdout.starts_with("K> help - Display this list of commands\n"));
    assert!(stdout.ends_with("K> \n"));
}

#[test]
fn test_missing_snapshot_is_an_error() {
    let output = kmon(&["--snapshot", "/nonexistent/snapshot.json", "-e", "help"]);
    assert_eq!(output.status.code(), Some(1));
    assert!(String::from_utf8_lossy(&output.stderr).contains("Failed to load snapshot"));
}

#[test]
fn test_malformed_snapshot_is_an_error() {
    let mut file = NamedTempFile::new().unwrap();
    file.write_all(b"{ \"stack\": {} }").unwrap();

    let output = kmon(&["--snapshot", file.path().to_str().unwrap(), "-e", "help"]);
    assert_eq!(output.status.code(), Some(1));
}

#[test]
fn test_usage_error_exit_code() {
    assert_eq!(kmon(&[]).status.code(), Some(2));
    assert_eq!(kmon(&["--bogus"]).status.code(), Some(2));
    assert_eq!(kmon(&["--help"]).status.code(), Some(0));
}
