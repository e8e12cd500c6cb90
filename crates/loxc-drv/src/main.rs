//! Lox CLI - entry point for the interpreter binary.
//!
//! `lox` starts the REPL; `lox <path>` runs a script. Anything else is a
//! usage error (exit 64).

use std::path::PathBuf;
use std::process::ExitCode;

use anyhow::Result;
use clap::error::ErrorKind;
use clap::Parser;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use loxc_drv::{run_file, run_repl, EXIT_USAGE};

/// Lox - a small class-based scripting language
#[derive(Parser, Debug)]
#[command(name = "lox")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "Run a Lox script, or start the REPL", long_about = None)]
struct Cli {
    /// Script to run; starts the REPL when omitted
    script: Option<PathBuf>,

    /// Enable verbose logging
    #[arg(short, long, env = "LOX_VERBOSE")]
    verbose: bool,
}

fn main() -> ExitCode {
    let cli = match Cli::try_parse() {
        Ok(cli) => cli,
        Err(err)
            if matches!(
                err.kind(),
                ErrorKind::DisplayHelp | ErrorKind::DisplayVersion
            ) =>
        {
            let _ = err.print();
            return ExitCode::SUCCESS;
        }
        Err(_) => {
            eprintln!("Usage: lox [path]");
            return exit(EXIT_USAGE);
        }
    };

    if let Err(err) = init_logging(cli.verbose) {
        eprintln!("Failed to initialize logging: {err}");
    }

    let code = match cli.script {
        Some(path) => run_file(&path),
        None => run_repl(),
    };
    exit(code)
}

fn exit(code: i32) -> ExitCode {
    ExitCode::from(code as u8)
}

/// Initialize the logging system.
///
/// Verbose mode lowers the filter to debug; otherwise `RUST_LOG`-style
/// overrides via the environment still apply through `EnvFilter`.
fn init_logging(verbose: bool) -> Result<()> {
    let filter = if verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"))
    };

    let subscriber = fmt::layer()
        .with_writer(std::io::stderr)
        .with_target(false);

    tracing_subscriber::registry()
        .with(filter)
        .with(subscriber)
        .try_init()
        .map_err(|err| anyhow::anyhow!("{err}"))?;

    Ok(())
}
