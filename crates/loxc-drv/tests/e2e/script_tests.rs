//! Script execution tests: language behavior observed through the binary.

use assert_cmd::Command;
use predicates::prelude::*;
use std::path::PathBuf;
use tempfile::TempDir;

fn lox_bin() -> PathBuf {
    PathBuf::from(env!("CARGO_BIN_EXE_lox"))
}

/// Writes `source` to a script file and returns a command running it.
fn run_script(dir: &TempDir, source: &str) -> Command {
    let path = dir.path().join("script.lox");
    std::fs::write(&path, source).expect("failed to write script");

    let mut cmd = Command::new(lox_bin());
    cmd.arg(path);
    cmd
}

#[test]
fn test_arithmetic() {
    let dir = TempDir::new().expect("temp dir");
    run_script(&dir, "print 1 + 2 * 3;")
        .assert()
        .success()
        .stdout("7\n");
}

#[test]
fn test_string_concatenation() {
    let dir = TempDir::new().expect("temp dir");
    run_script(&dir, "var a = \"hi \"; var b = \"there\"; print a + b;")
        .assert()
        .success()
        .stdout("hi there\n");
}

#[test]
fn test_closure_returns_captured_value() {
    let dir = TempDir::new().expect("temp dir");
    run_script(
        &dir,
        "fun make(x) { fun inner() { return x; } return inner; } \
         var f = make(42); print f();",
    )
    .assert()
    .success()
    .stdout("42\n");
}

#[test]
fn test_class_method() {
    let dir = TempDir::new().expect("temp dir");
    run_script(&dir, "class Greet { say() { print \"hi\"; } } Greet().say();")
        .assert()
        .success()
        .stdout("hi\n");
}

#[test]
fn test_super_dispatch() {
    let dir = TempDir::new().expect("temp dir");
    run_script(
        &dir,
        "class A { m(){ print \"A\"; } } \
         class B < A { m(){ super.m(); print \"B\"; } } \
         B().m();",
    )
    .assert()
    .success()
    .stdout("A\nB\n");
}

#[test]
fn test_while_loop() {
    let dir = TempDir::new().expect("temp dir");
    run_script(&dir, "var i = 0; while (i < 3) { print i; i = i + 1; }")
        .assert()
        .success()
        .stdout("0\n1\n2\n");
}

#[test]
fn test_fibonacci_with_clock_timing() {
    let dir = TempDir::new().expect("temp dir");
    run_script(
        &dir,
        "fun fib(n) { if (n < 2) return n; return fib(n - 1) + fib(n - 2); } \
         var start = clock(); \
         print fib(15); \
         print clock() >= start;",
    )
    .assert()
    .success()
    .stdout("610\ntrue\n");
}

// === Runtime errors: exit 70 and the trace format ===

#[test]
fn test_mixed_add_is_a_runtime_error() {
    let dir = TempDir::new().expect("temp dir");
    run_script(&dir, "print \"a\" + 1;")
        .assert()
        .code(70)
        .stderr(predicate::str::contains(
            "Operands must be two numbers or two strings.",
        ))
        .stderr(predicate::str::contains("[line 1] in script"));
}

#[test]
fn test_runtime_trace_lists_every_frame() {
    let dir = TempDir::new().expect("temp dir");
    run_script(
        &dir,
        "fun inner() {\n  return 1 + nil;\n}\nfun outer() {\n  return inner();\n}\nouter();\n",
    )
    .assert()
    .code(70)
    .stderr(predicate::str::contains("Operands must be numbers."))
    .stderr(predicate::str::contains("[line 2] in inner()"))
    .stderr(predicate::str::contains("[line 5] in outer()"))
    .stderr(predicate::str::contains("[line 7] in script"));
}

#[test]
fn test_undefined_variable_runtime_error() {
    let dir = TempDir::new().expect("temp dir");
    run_script(&dir, "print missing;")
        .assert()
        .code(70)
        .stderr(predicate::str::contains("Undefined variable 'missing'."));
}

#[test]
fn test_arity_error_message() {
    let dir = TempDir::new().expect("temp dir");
    run_script(&dir, "fun f(a, b) { } f(1);")
        .assert()
        .code(70)
        .stderr(predicate::str::contains("Expected 2 arguments but got 1."));
}

#[test]
fn test_stack_overflow_message() {
    let dir = TempDir::new().expect("temp dir");
    run_script(&dir, "fun f() { f(); } f();")
        .assert()
        .code(70)
        .stderr(predicate::str::contains("Stack overflow."));
}

#[test]
fn test_superclass_must_be_class_message() {
    let dir = TempDir::new().expect("temp dir");
    run_script(&dir, "var X = 1; class Y < X { }")
        .assert()
        .code(70)
        .stderr(predicate::str::contains("Superclass must be a class."));
}

// === Compile errors: exit 65 and the diagnostic format ===

#[test]
fn test_compile_error_format_and_exit_code() {
    let dir = TempDir::new().expect("temp dir");
    run_script(&dir, "1 = 2;")
        .assert()
        .code(65)
        .stderr(predicate::str::contains(
            "[line 1] Error at '=': Invalid assignment target.",
        ));
}

#[test]
fn test_missing_semicolon_diagnostic() {
    let dir = TempDir::new().expect("temp dir");
    run_script(&dir, "print 1")
        .assert()
        .code(65)
        .stderr(predicate::str::contains(
            "[line 1] Error at end: Expect ';' after value.",
        ));
}

#[test]
fn test_multiple_errors_reported_in_one_pass() {
    let dir = TempDir::new().expect("temp dir");
    run_script(&dir, "var = 1;\nprint 2\nvar a = ;\n")
        .assert()
        .code(65)
        .stderr(predicate::str::contains("[line 1]"))
        .stderr(predicate::str::contains("[line 3]"));
}

#[test]
fn test_local_in_own_initializer_is_compile_time() {
    let dir = TempDir::new().expect("temp dir");
    run_script(&dir, "{ var x = x; }")
        .assert()
        .code(65)
        .stderr(predicate::str::contains(
            "Can't read local variable in its own initializer.",
        ));
}

#[test]
fn test_top_level_self_initializer_fails_at_runtime_instead() {
    let dir = TempDir::new().expect("temp dir");
    // At top level the reference is a late-bound global: no compile error,
    // but the read happens before the define.
    run_script(&dir, "var x = x;")
        .assert()
        .code(70)
        .stderr(predicate::str::contains("Undefined variable 'x'."));
}

#[test]
fn test_this_outside_class_diagnostic() {
    let dir = TempDir::new().expect("temp dir");
    run_script(&dir, "print this;")
        .assert()
        .code(65)
        .stderr(predicate::str::contains("Can't use 'this' outside of a class."));
}

#[test]
fn test_clean_run_exits_zero_with_no_stderr() {
    let dir = TempDir::new().expect("temp dir");
    run_script(&dir, "var silent = 1;")
        .assert()
        .success()
        .stdout("")
        .stderr("");
}
