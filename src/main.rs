//! Interactive driver: read one formula from standard input, optionally
//! run it through a native backend, print the result.

use std::io::{self, BufRead, Write};
use std::process::ExitCode;

use tracing_subscriber::EnvFilter;

enum Mode {
    Interpret,
    Assemble,
    Compile,
}

fn parse_args() -> Result<Mode, String> {
    let mut args = std::env::args().skip(1);
    let mode = match args.next().as_deref() {
        None => Mode::Interpret,
        Some("--assemble") => Mode::Assemble,
        Some("--compile") => Mode::Compile,
        Some(other) => return Err(format!("unknown argument '{other}'")),
    };
    if let Some(extra) = args.next() {
        return Err(format!("unexpected argument '{extra}'"));
    }
    Ok(mode)
}

fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(io::stderr)
        .init();

    let mode = match parse_args() {
        Ok(mode) => mode,
        Err(message) => {
            eprintln!("Error: {message}");
            eprintln!("Usage: formula [--assemble | --compile]");
            return ExitCode::FAILURE;
        }
    };

    println!("Enter an expression:");
    io::stdout().flush().ok();

    let mut line = String::new();
    if io::stdin().lock().read_line(&mut line).is_err() {
        eprintln!("Error: failed to read input");
        return ExitCode::FAILURE;
    }

    let Some(mut formula) = formula_jit::parse(line.trim_end()) else {
        eprintln!("Error: Invalid formula");
        return ExitCode::FAILURE;
    };

    let emitted = match mode {
        Mode::Interpret => true,
        Mode::Assemble => formula.assemble(),
        Mode::Compile => formula.compile(),
    };
    if !emitted {
        return ExitCode::FAILURE;
    }

    println!("Evaluated: {}", formula.evaluate());
    ExitCode::SUCCESS
}
