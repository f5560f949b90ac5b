//! Code to configure and run the interpreter on a source file or
//! interactively.

use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};

use clap::Parser;
use thiserror::Error;
use tracing::{info, Level};

use crate::lexical_analysis::LexerOptions;
use crate::program_execution::{
    ErrorPolicy, ExecutionResult, Session, SessionOptions, StatementOutcome, DEFAULT_STEP_LIMIT,
};
use crate::recursive_descent_parsing::parse_program;
use crate::repl::{self, start_repl, Repl};

/// Config for the interpreter. Instantiate via `InterpreterConfig::parse()`.
#[derive(Parser, Debug)]
#[command(version, about, long_about = None)]
pub struct InterpreterConfig {
    /// The input filepath to run on. Starts an interactive session when
    /// omitted.
    #[arg(short, long)]
    pub src_filepath: Option<PathBuf>,

    /// Maximum number of reduction steps for each evaluated expression.
    #[arg(long, default_value_t = DEFAULT_STEP_LIMIT)]
    pub step_limit: usize,

    /// Reject `#` instead of treating it as the start of a line comment.
    #[arg(long)]
    pub no_comments: bool,

    /// Stop running a file at the first statement that fails.
    #[arg(long)]
    pub stop_on_error: bool,

    /// Print each expression as parsed before its normal form.
    #[arg(long)]
    pub show_parsed: bool,

    /// Log more (-v for debug, -vv for every reduction step).
    #[arg(short, long, action = clap::ArgAction::Count)]
    pub verbose: u8,
}

impl InterpreterConfig {
    pub fn session_options(&self) -> SessionOptions {
        SessionOptions {
            step_limit: self.step_limit,
            lexer_options: LexerOptions {
                allow_comments: !self.no_comments,
            },
            error_policy: if self.stop_on_error {
                ErrorPolicy::Stop
            } else {
                ErrorPolicy::Continue
            },
        }
    }

    pub fn log_level(&self) -> Level {
        match self.verbose {
            0 => Level::WARN,
            1 => Level::DEBUG,
            _ => Level::TRACE,
        }
    }
}

/// Errors that may be thrown when running the interpreter. Failures of
/// individual statements are not among them; those are printed and counted.
#[derive(Debug, Error)]
pub enum RunError {
    #[error("Input file error for {}: {source}", .path.display())]
    InputFile { path: PathBuf, source: io::Error },

    #[error("Output error: {0}")]
    Output(#[from] io::Error),

    #[error("Interactive session error: {0}")]
    Interactive(#[from] repl::Error<io::Error>),
}

/// How a run went, statement by statement.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct RunSummary {
    pub evaluated: usize,
    pub defined: usize,
    pub failed: usize,
}

impl RunSummary {
    fn absorb(&mut self, other: RunSummary) {
        self.evaluated += other.evaluated;
        self.defined += other.defined;
        self.failed += other.failed;
    }
}

/// Writes the printable part of an execution result to `out`: normal forms
/// on their own lines, optionally preceded by the parsed expression, and
/// failures prefixed with `error:`.
pub fn write_execution_result(
    execution_result: &ExecutionResult,
    show_parsed: bool,
    out: &mut impl Write,
) -> io::Result<RunSummary> {
    let mut summary = RunSummary::default();

    for statement_result in execution_result {
        match statement_result {
            Ok(StatementOutcome::Defined { .. }) => summary.defined += 1,
            Ok(StatementOutcome::Evaluated { expr, normal_form }) => {
                if show_parsed {
                    writeln!(out, "parsed: {}", expr)?;
                }
                writeln!(out, "{}", normal_form)?;
                summary.evaluated += 1;
            }
            Err(statement_error) => {
                writeln!(out, "error: {}", statement_error)?;
                summary.failed += 1;
            }
        }
    }

    Ok(summary)
}

/// Runs every statement of the file at `path` in a fresh session.
pub fn run_file(path: &Path, config: &InterpreterConfig) -> Result<RunSummary, RunError> {
    // Read the input file into a string.
    let program_string = fs::read_to_string(path).map_err(|source| RunError::InputFile {
        path: path.to_path_buf(),
        source,
    })?;
    info!(path = %path.display(), "running program");

    let mut session = Session::new(config.session_options());
    let execution_result = session.run_source(&program_string);

    let stdout = io::stdout();
    let summary = write_execution_result(&execution_result, config.show_parsed, &mut stdout.lock())?;
    info!(?summary, "program finished");

    Ok(summary)
}

/// A session driven by the interactive loop.
struct InteractiveSession {
    session: Session,
    show_parsed: bool,
    summary: RunSummary,
}

impl Repl for InteractiveSession {
    type Error = io::Error;
    const HISTORY: Option<&'static str> = Some(".lambda_history");
    const EXIT_COMMAND: Option<&'static str> = Some("exit");

    fn needs_more_input(&self, input: &str) -> bool {
        parse_program(input, self.session.options().lexer_options)
            .last()
            .map_or(false, |parsed| {
                matches!(parsed, Err(parse_error) if parse_error.is_incomplete())
            })
    }

    fn evaluate(&mut self, input: String) -> Result<(), io::Error> {
        let execution_result = self.session.run_source(&input);
        let stdout = io::stdout();
        let summary =
            write_execution_result(&execution_result, self.show_parsed, &mut stdout.lock())?;
        self.summary.absorb(summary);
        Ok(())
    }
}

/// Runs the interactive loop until the user quits.
pub fn run_interactive(config: &InterpreterConfig) -> Result<RunSummary, RunError> {
    let mut options = config.session_options();
    // A failed line must not end the session.
    options.error_policy = ErrorPolicy::Continue;

    let mut interactive = InteractiveSession {
        session: Session::new(options),
        show_parsed: config.show_parsed,
        summary: RunSummary::default(),
    };
    start_repl(&mut interactive)?;
    info!(summary = ?interactive.summary, "interactive session finished");

    Ok(interactive.summary)
}

/// Run the interpreter (i.e. the lexer, parser, and reduction) given an
/// interpreter config.
pub fn run_interpreter(config: &InterpreterConfig) -> Result<RunSummary, RunError> {
    match &config.src_filepath {
        Some(path) => run_file(path, config),
        None => run_interactive(config),
    }
}
