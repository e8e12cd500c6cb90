//! CLI surface tests: argument handling, exit codes, and the REPL loop.

use assert_cmd::Command;
use predicates::prelude::*;
use std::path::PathBuf;

fn lox_bin() -> PathBuf {
    PathBuf::from(env!("CARGO_BIN_EXE_lox"))
}

#[test]
fn test_extra_arguments_are_a_usage_error() {
    let mut cmd = Command::new(lox_bin());
    cmd.arg("one.lox").arg("two.lox");

    cmd.assert()
        .code(64)
        .stderr(predicate::str::contains("Usage: lox [path]"));
}

#[test]
fn test_unknown_flag_is_a_usage_error() {
    let mut cmd = Command::new(lox_bin());
    cmd.arg("--frobnicate");

    cmd.assert().code(64);
}

#[test]
fn test_missing_file_exits_74() {
    let mut cmd = Command::new(lox_bin());
    cmd.arg("definitely/not/here.lox");

    cmd.assert()
        .code(74)
        .stderr(predicate::str::contains("Could not open file"));
}

#[test]
fn test_help_flag_succeeds() {
    let mut cmd = Command::new(lox_bin());
    cmd.arg("--help");

    cmd.assert().success().stdout(predicate::str::contains("lox"));
}

#[test]
fn test_repl_runs_lines_and_exits_on_eof() {
    let mut cmd = Command::new(lox_bin());
    cmd.write_stdin("print 1 + 2;\n");

    cmd.assert()
        .success()
        .stdout(predicate::str::contains("lox:> "))
        .stdout(predicate::str::contains("3"));
}

#[test]
fn test_repl_state_persists_across_lines() {
    let mut cmd = Command::new(lox_bin());
    cmd.write_stdin("var greeting = \"hello\";\nprint greeting;\n");

    cmd.assert()
        .success()
        .stdout(predicate::str::contains("hello"));
}

#[test]
fn test_repl_survives_errors_and_still_exits_zero() {
    let mut cmd = Command::new(lox_bin());
    cmd.write_stdin("print \"a\" + 1;\nnot lox at all\nprint 2;\n");

    cmd.assert()
        .success()
        .stdout(predicate::str::contains("2"))
        .stderr(predicate::str::contains(
            "Operands must be two numbers or two strings.",
        ));
}

#[test]
fn test_repl_empty_input_exits_zero() {
    let mut cmd = Command::new(lox_bin());
    cmd.write_stdin("");

    cmd.assert().success().stdout(predicate::str::contains("lox:> "));
}
