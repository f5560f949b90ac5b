//! A line-editing read-eval-print loop that hands complete statements to an
//! evaluator.

use rustyline::{error::ReadlineError, Editor};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error<E> {
    #[error(transparent)]
    Readline(ReadlineError),
    #[error("Eval failed: {0:?}")]
    EvalError(E),
}

pub trait Repl {
    type Error: std::fmt::Debug;
    const HISTORY: Option<&'static str> = None;
    const PROMPT: &'static str = "λ> ";
    const CONTINUATION_PROMPT: &'static str = ".. ";
    /// A line that ends the session, matched ignoring case and surrounding
    /// whitespace.
    const EXIT_COMMAND: Option<&'static str> = None;

    /// Whether `input` is the unfinished beginning of a statement, so the
    /// loop should read another line before evaluating.
    fn needs_more_input(&self, _input: &str) -> bool {
        false
    }

    fn evaluate(&mut self, input: String) -> Result<(), Self::Error>;
}

/// Whether `line`, typed at a fresh prompt, asks `R` to end the session.
pub fn is_exit_command<R: Repl>(line: &str) -> bool {
    R::EXIT_COMMAND.map_or(false, |command| line.trim().eq_ignore_ascii_case(command))
}

pub fn start_repl<R: Repl>(repl: &mut R) -> Result<(), Error<R::Error>> {
    let mut editor = Editor::<()>::new();
    if let Some(history) = R::HISTORY {
        editor.load_history(history).ok();
    }
    let mut input: Option<String> = None;
    loop {
        let prompt = if input.is_some() {
            R::CONTINUATION_PROMPT
        } else {
            R::PROMPT
        };
        match editor.readline(prompt) {
            Ok(line) if input.is_none() && is_exit_command::<R>(&line) => {
                println!("Bye!");
                break Ok(());
            }
            Ok(line) => {
                let input_so_far = if let Some(mut input) = input.take() {
                    input.push('\n');
                    input.push_str(line.as_str());
                    input
                } else {
                    line
                };
                if repl.needs_more_input(&input_so_far) {
                    input = Some(input_so_far);
                    continue;
                }
                if input_so_far.trim().is_empty() {
                    continue;
                }
                editor.add_history_entry(input_so_far.as_str());
                repl.evaluate(input_so_far).map_err(Error::EvalError)?;
                if let Some(history) = R::HISTORY {
                    editor.save_history(history).map_err(Error::Readline)?;
                }
            }
            // Ctrl-C drops a half-typed statement.
            Err(ReadlineError::Interrupted) if input.is_some() => {
                input = None;
            }
            Err(ReadlineError::Interrupted | ReadlineError::Eof) => {
                println!("Bye!");
                break Ok(());
            }
            Err(e) => break Err(Error::Readline(e)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Silent;

    impl Repl for Silent {
        type Error = ();

        fn evaluate(&mut self, _input: String) -> Result<(), ()> {
            Ok(())
        }
    }

    struct Quittable;

    impl Repl for Quittable {
        type Error = ();
        const EXIT_COMMAND: Option<&'static str> = Some("exit");

        fn evaluate(&mut self, _input: String) -> Result<(), ()> {
            Ok(())
        }
    }

    // Test which lines count as the exit command.
    #[test]
    fn test_exit_command() {
        assert!(is_exit_command::<Quittable>("exit"));
        assert!(is_exit_command::<Quittable>("  EXIT \t"));
        assert!(!is_exit_command::<Quittable>("exit y"));
        assert!(!is_exit_command::<Quittable>("exits"));
        assert!(!is_exit_command::<Silent>("exit"));
    }
}
