//! Integration tests for the `luna` binary.

use std::io::Write;
use std::process::{Command, Output};

fn luna(args: &[&str]) -> Output {
    Command::new(env!("CARGO_BIN_EXE_luna"))
        .args(args)
        .env("NO_COLOR", "1")
        .env_remove("LUNA_LOG")
        .output()
        .expect("failed to run luna")
}

fn stdout(output: &Output) -> String {
    String::from_utf8_lossy(&output.stdout).into_owned()
}

fn stderr(output: &Output) -> String {
    String::from_utf8_lossy(&output.stderr).into_owned()
}

// ────────────────────────────────────────────────────────────────────────────
// eval
// ────────────────────────────────────────────────────────────────────────────

#[test]
fn test_eval_prints() {
    let output = luna(&["eval", "print(1 + 2)"]);
    assert!(output.status.success());
    assert_eq!(stdout(&output), "3\n");
}

#[test]
fn test_eval_error_exits_with_failure() {
    let output = luna(&["eval", "error('bad things')"]);
    assert!(!output.status.success());
    let err = stderr(&output);
    assert!(err.contains("eval:1: bad things"), "stderr was: {}", err);
    assert!(err.contains("stack traceback:"), "stderr was: {}", err);
}

#[test]
fn test_eval_uses_native_sprite() {
    let output = luna(&["eval", "Sprite:new('x'):say()"]);
    assert!(output.status.success());
    assert_eq!(stdout(&output), "Here I am, saying stuff.\n");
}

// ────────────────────────────────────────────────────────────────────────────
// run
// ────────────────────────────────────────────────────────────────────────────

#[test]
fn test_run_file() {
    let mut file = tempfile::NamedTempFile::new().unwrap();
    writeln!(file, "class('Greeter')").unwrap();
    writeln!(file, "function Greeter:Greeter(name) self.name = name end").unwrap();
    writeln!(file, "function Greeter:greet() print('hello ' .. self.name) end").unwrap();
    writeln!(file, "Greeter:new('world'):greet()").unwrap();

    let path = file.path().to_str().unwrap().to_string();
    let output = luna(&["run", &path]);
    assert!(output.status.success(), "stderr was: {}", stderr(&output));
    assert_eq!(stdout(&output), "hello world\n");
}

#[test]
fn test_run_syntax_error() {
    let mut file = tempfile::NamedTempFile::new().unwrap();
    writeln!(file, "local = 3").unwrap();

    let path = file.path().to_str().unwrap().to_string();
    let output = luna(&["run", &path]);
    assert!(!output.status.success());
    assert!(stderr(&output).contains("error"));
}

#[test]
fn test_run_missing_file() {
    let output = luna(&["run", "/definitely/not/here.lua"]);
    assert!(!output.status.success());
    assert!(stderr(&output).contains("cannot open"));
}

// ────────────────────────────────────────────────────────────────────────────
// demo
// ────────────────────────────────────────────────────────────────────────────

#[test]
fn test_demo_animates_sprite() {
    let output = luna(&["demo", "--frames", "3"]);
    assert!(output.status.success(), "stderr was: {}", stderr(&output));
    assert_eq!(
        stdout(&output),
        "Here I am, saying stuff.\nHere I am, saying stuff.\n"
    );
}

#[test]
fn test_dump_stack_flag() {
    let output = luna(&["--dump-stack", "eval", "x = 1"]);
    assert!(output.status.success());
    assert!(stdout(&output).contains("<empty stack>"));
}
