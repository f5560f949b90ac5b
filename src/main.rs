//! Run a given lambda calculus program and print the normal form of each
//! expression to standard output, or start an interactive session.
//!
//! Example usage:
//!
//!     cargo run -- --src-filepath test_programs/linked_list_length.lc

use std::process::ExitCode;

use clap::Parser;
use lambda_interp::end_to_end::{run_interpreter, InterpreterConfig};

fn main() -> ExitCode {
    let interpreter_config = InterpreterConfig::parse();

    tracing_subscriber::fmt()
        .with_max_level(interpreter_config.log_level())
        .with_writer(std::io::stderr)
        .init();

    match run_interpreter(&interpreter_config) {
        Ok(summary) if interpreter_config.src_filepath.is_some() && summary.failed > 0 => {
            ExitCode::FAILURE
        }
        Ok(_) => ExitCode::SUCCESS,
        Err(run_error) => {
            eprintln!("{}", run_error);
            ExitCode::FAILURE
        }
    }
}
