//! loxc-drv - Interpreter Driver
//!
//! The driver owns the outermost loop of the interpreter: it reads source
//! (from a file or the interactive prompt), hands it to the VM, and maps
//! the outcome onto the process exit code.
//!
//! Exit codes:
//! - 0: clean run (and REPL exit on end of input)
//! - 64: bad command line (usage error)
//! - 65: compile error
//! - 70: runtime error
//! - 74: could not read the source file

use std::io::{self, BufRead, Write};
use std::path::Path;

use tracing::debug;

use loxc_vm::{InterpretError, Vm};

/// Exit code for a usage error.
pub const EXIT_USAGE: i32 = 64;
/// Exit code for a compile error.
pub const EXIT_COMPILE_ERROR: i32 = 65;
/// Exit code for a runtime error.
pub const EXIT_RUNTIME_ERROR: i32 = 70;
/// Exit code for an unreadable input file.
pub const EXIT_IO_ERROR: i32 = 74;

/// The REPL prompt, written to stdout before each line.
const PROMPT: &str = "lox:> ";

fn exit_code(result: Result<(), InterpretError>) -> i32 {
    match result {
        Ok(()) => 0,
        Err(InterpretError::Compile) => EXIT_COMPILE_ERROR,
        Err(InterpretError::Runtime) => EXIT_RUNTIME_ERROR,
    }
}

/// Reads and interprets one script file; returns the process exit code.
pub fn run_file(path: &Path) -> i32 {
    let source = match std::fs::read_to_string(path) {
        Ok(source) => source,
        Err(err) => {
            debug!(?err, path = %path.display(), "failed to read script");
            eprintln!("Could not open file \"{}\".", path.display());
            return EXIT_IO_ERROR;
        }
    };

    debug!(path = %path.display(), bytes = source.len(), "running script");
    let mut vm = Vm::new();
    exit_code(vm.interpret(&source))
}

/// Runs the interactive prompt until end of input; returns the exit code.
///
/// Every line is interpreted against the same VM, so definitions persist
/// across lines; compile and runtime errors are reported and the prompt
/// continues.
pub fn run_repl() -> i32 {
    let stdin = io::stdin();
    run_repl_on(&mut stdin.lock(), &mut io::stdout())
}

/// REPL loop over explicit streams (separated for tests).
pub fn run_repl_on(input: &mut dyn BufRead, prompt_out: &mut dyn Write) -> i32 {
    let mut vm = Vm::new();

    loop {
        if prompt_out.write_all(PROMPT.as_bytes()).is_err() {
            return 0;
        }
        let _ = prompt_out.flush();

        let mut line = String::new();
        match input.read_line(&mut line) {
            // End of input: finish the prompt line and leave cleanly.
            Ok(0) => {
                let _ = writeln!(prompt_out);
                return 0;
            }
            Ok(_) => {
                let _ = vm.interpret(&line);
            }
            Err(err) => {
                debug!(?err, "failed to read from the prompt");
                eprintln!("Could not read input.");
                return EXIT_IO_ERROR;
            }
        }
    }
}
