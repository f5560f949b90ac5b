//! Reduces lambda calculus terms to normal form, and executes statements
//! against a persistent environment.

use std::cell::OnceCell;
use std::collections::{HashSet, VecDeque};
use std::fmt;
use std::rc::Rc;

use thiserror::Error;
use tracing::{debug, trace};

use crate::environment::Environment;
use crate::lexical_analysis::{LexerOptions, Position};
use crate::program_representation::{Statement, Term, TermRef};
use crate::recursive_descent_parsing::{ParseError, Parser};

/// Reduction steps allowed per evaluated expression unless configured
/// otherwise.
pub const DEFAULT_STEP_LIMIT: usize = 100_000;

/// Represents an evaluation error.
#[derive(Debug, Error, PartialEq, Eq, Clone)]
pub enum EvalError {
    #[error("no normal form reached within {step_limit} steps, last term was: {last_term}")]
    NonTermination {
        step_limit: usize,
        last_term: TermRef,
    },
}

/// Appends primes to `base` until `is_taken` rejects the candidate.
fn fresh_name(base: &str, is_taken: impl Fn(&str) -> bool) -> String {
    let mut candidate = String::from(base);

    while is_taken(candidate.as_str()) {
        candidate.push('\'');
    }

    candidate
}

// Substitutes `var_value` for the free occurrences of `var_name` in `expr_body`.
// Untouched subtrees come back as the very same `Rc`. The free variables of
// the value are only computed once some binder could capture them.
fn substitute_helper<'v>(
    expr_body: &TermRef,
    var_name: &str,
    var_value: &'v TermRef,
    value_free_vars: &OnceCell<HashSet<&'v str>>,
) -> TermRef {
    match &**expr_body {
        Term::Variable { name } => {
            if name == var_name {
                Rc::clone(var_value)
            } else {
                Rc::clone(expr_body)
            }
        }

        Term::Application { function, argument } => {
            let new_function = substitute_helper(function, var_name, var_value, value_free_vars);
            let new_argument = substitute_helper(argument, var_name, var_value, value_free_vars);

            if Rc::ptr_eq(&new_function, function) && Rc::ptr_eq(&new_argument, argument) {
                Rc::clone(expr_body)
            } else {
                Term::application(new_function, new_argument)
            }
        }

        Term::Abstraction { param, body } => {
            // The parameter shadows var_name.
            if param == var_name {
                return Rc::clone(expr_body);
            }

            // The parameter would capture a free variable of the value, so
            // rename it first. Nothing to do if var_name is not used inside.
            let free_vars = value_free_vars.get_or_init(|| var_value.free_variables());
            if free_vars.contains(param.as_str()) {
                if !body.occurs_free(var_name) {
                    return Rc::clone(expr_body);
                }

                let body_vars = body.all_variables();
                let new_param = fresh_name(param, |candidate| {
                    free_vars.contains(candidate) || body_vars.contains(candidate)
                });
                let renamed_body = substitute(body, param, &Term::variable(new_param.as_str()));
                let new_body =
                    substitute_helper(&renamed_body, var_name, var_value, value_free_vars);

                return Term::abstraction(new_param, new_body);
            }

            let new_body = substitute_helper(body, var_name, var_value, value_free_vars);
            if Rc::ptr_eq(&new_body, body) {
                Rc::clone(expr_body)
            } else {
                Term::abstraction(param.as_str(), new_body)
            }
        }
    }
}

/// Capture-avoiding substitution of `var_value` for `var_name` in
/// `expr_body`. Binders that would capture a free variable of `var_value` are
/// renamed by appending primes.
pub fn substitute(expr_body: &TermRef, var_name: &str, var_value: &TermRef) -> TermRef {
    substitute_helper(expr_body, var_name, var_value, &OnceCell::new())
}

// A head that cannot be reduced any further together with the arguments it is
// applied to, in application order.
struct Spine {
    head: TermRef,
    arguments: Vec<TermRef>,
}

impl Spine {
    // `pending` holds the arguments innermost application last.
    fn unwound(head: TermRef, mut pending: Vec<TermRef>) -> Self {
        pending.reverse();
        Spine {
            head,
            arguments: pending,
        }
    }

    fn into_term(self) -> TermRef {
        self.arguments
            .into_iter()
            .fold(self.head, Term::application)
    }
}

// Work still to do around the subterm currently being normalized.
enum Frame {
    // Rebuild an abstraction around the normalized body.
    Abstraction {
        param: String,
    },
    // Normalize the arguments of a stuck head, left to right.
    Arguments {
        head: TermRef,
        normalized: Vec<TermRef>,
        remaining: VecDeque<TermRef>,
    },
}

// Rebuilds the whole term from the frames and the subterm in focus.
fn plug(frames: Vec<Frame>, focus: TermRef) -> TermRef {
    frames.into_iter().rev().fold(focus, |inner, frame| match frame {
        Frame::Abstraction { param } => Term::abstraction(param, inner),
        Frame::Arguments {
            head,
            normalized,
            remaining,
        } => normalized
            .into_iter()
            .chain(std::iter::once(inner))
            .chain(remaining)
            .fold(head, Term::application),
    })
}

/// Normal order reducer. The traversal is driven by an explicit stack of
/// frames, so deep terms do not grow the call stack.
struct Reducer<'e> {
    environment: &'e Environment,
    reserved_names: HashSet<&'e str>,
    step_limit: usize,
    steps_taken: usize,
}

impl<'e> Reducer<'e> {
    fn out_of_steps(&self) -> bool {
        self.steps_taken >= self.step_limit
    }

    /// Reduces the leftmost-outermost redexes of `term` until its head is a
    /// free variable, or an abstraction with no arguments. On running out of
    /// steps, returns the term as far as it got.
    fn reduce_to_weak_head(&mut self, term: TermRef) -> Result<Spine, TermRef> {
        let mut pending: Vec<TermRef> = Vec::new();
        let mut head = term;

        loop {
            let next = match &*head {
                Term::Application { function, argument } => {
                    pending.push(Rc::clone(argument));
                    Rc::clone(function)
                }

                Term::Abstraction { param, body } => match pending.pop() {
                    None => break,
                    Some(argument) if self.out_of_steps() => {
                        pending.push(argument);
                        return Err(Spine::unwound(Rc::clone(&head), pending).into_term());
                    }
                    Some(argument) => {
                        self.steps_taken += 1;
                        trace!(step = self.steps_taken, %param, %argument, "beta step");
                        substitute(body, param, &argument)
                    }
                },

                // Anything reaching the head position is free: binders the
                // reducer has gone under never take a reserved name.
                Term::Variable { name } => match self.environment.lookup(name) {
                    None => break,
                    Some(_) if self.out_of_steps() => {
                        return Err(Spine::unwound(Rc::clone(&head), pending).into_term());
                    }
                    Some(definition) => {
                        self.steps_taken += 1;
                        trace!(step = self.steps_taken, %name, "expanded global binding");
                        definition
                    }
                },
            };

            head = next;
        }

        Ok(Spine::unwound(head, pending))
    }

    /// Renames `param` if it is a reserved name, so that lookups of free
    /// variables below it cannot mistake the parameter for a global, and
    /// definitions expanded below it cannot have their free names captured.
    fn avoid_global_names(&self, param: &str, body: &TermRef) -> (String, TermRef) {
        if !self.reserved_names.contains(param) {
            return (String::from(param), Rc::clone(body));
        }

        let body_vars = body.all_variables();
        let new_param = fresh_name(param, |candidate| {
            self.reserved_names.contains(candidate) || body_vars.contains(candidate)
        });
        let renamed_body = substitute(body, param, &Term::variable(new_param.as_str()));

        (new_param, renamed_body)
    }

    fn normalize(&mut self, term: TermRef) -> Result<TermRef, EvalError> {
        let mut frames: Vec<Frame> = Vec::new();
        let mut focus = term;

        loop {
            let spine = match self.reduce_to_weak_head(focus) {
                Ok(spine) => spine,
                Err(last_focus) => {
                    return Err(EvalError::NonTermination {
                        step_limit: self.step_limit,
                        last_term: plug(frames, last_focus),
                    });
                }
            };

            // A bare abstraction: go under the binder.
            if spine.arguments.is_empty() {
                if let Term::Abstraction { param, body } = &*spine.head {
                    let (param, body) = self.avoid_global_names(param, body);
                    frames.push(Frame::Abstraction { param });
                    focus = body;
                    continue;
                }
            }

            // A stuck head: normalize its arguments one by one.
            let Spine { head, arguments } = spine;
            let mut remaining = VecDeque::from(arguments);
            let mut value = match remaining.pop_front() {
                Some(first) => {
                    frames.push(Frame::Arguments {
                        head,
                        normalized: Vec::new(),
                        remaining,
                    });
                    focus = first;
                    continue;
                }
                None => head,
            };

            // Hand the finished value outwards until some frame has more work.
            loop {
                match frames.pop() {
                    None => return Ok(value),
                    Some(Frame::Abstraction { param }) => {
                        value = Term::abstraction(param, value);
                    }
                    Some(Frame::Arguments {
                        head,
                        mut normalized,
                        mut remaining,
                    }) => {
                        normalized.push(value);
                        match remaining.pop_front() {
                            Some(next) => {
                                frames.push(Frame::Arguments {
                                    head,
                                    normalized,
                                    remaining,
                                });
                                focus = next;
                                break;
                            }
                            None => {
                                value = normalized.into_iter().fold(head, Term::application);
                            }
                        }
                    }
                }
            }
        }
    }
}

/// Reduces `term` to normal form in normal order (leftmost-outermost redex
/// first, under binders too), resolving free variables through
/// `environment`.
///
/// Every beta step and every expansion of a global name costs one step; if
/// `step_limit` steps do not reach a normal form, the term as it stood is
/// returned inside `EvalError::NonTermination`.
pub fn reduce(
    term: TermRef,
    environment: &Environment,
    step_limit: usize,
) -> Result<TermRef, EvalError> {
    let mut reducer = Reducer {
        environment,
        reserved_names: environment.reserved_names(),
        step_limit,
        steps_taken: 0,
    };

    let normal_form = reducer.normalize(term);
    debug!(steps = reducer.steps_taken, ok = normal_form.is_ok(), "reduction finished");
    normal_form
}

/// What to do with the rest of a program after a statement fails.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ErrorPolicy {
    #[default]
    Continue,
    Stop,
}

/// Config for a `Session`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SessionOptions {
    pub step_limit: usize,
    pub lexer_options: LexerOptions,
    pub error_policy: ErrorPolicy,
}

impl Default for SessionOptions {
    fn default() -> Self {
        SessionOptions {
            step_limit: DEFAULT_STEP_LIMIT,
            lexer_options: LexerOptions::default(),
            error_policy: ErrorPolicy::default(),
        }
    }
}

/// Represents the result of one successfully executed statement.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StatementOutcome {
    Defined { name: String },
    Evaluated { expr: TermRef, normal_form: TermRef },
}

impl fmt::Display for StatementOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StatementOutcome::Defined { name } => write!(f, "{} defined", name),
            StatementOutcome::Evaluated { normal_form, .. } => write!(f, "{}", normal_form),
        }
    }
}

/// Errors that make a single statement fail.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum StatementError {
    #[error("parse error: {0}")]
    Parse(#[from] ParseError),

    #[error("evaluation error in statement at {position}: {source}")]
    Eval {
        position: Position,
        source: EvalError,
    },
}

/// One result per statement, in source order.
pub type ExecutionResult = Vec<Result<StatementOutcome, StatementError>>;

/// Converts an ExecutionResult to the text printed for it: one line per
/// evaluated expression or failure. Bindings print nothing.
pub fn execution_result_to_string(execution_result: &ExecutionResult) -> String {
    let mut out = vec![];

    for statement_result in execution_result {
        match statement_result {
            Ok(StatementOutcome::Defined { .. }) => {}
            Ok(outcome) => out.push(outcome.to_string()),
            Err(statement_error) => out.push(format!("error: {}", statement_error)),
        }
    }

    out.join("\n")
}

/// An interpreter session: one environment that lives across every statement
/// and every source string handed to it.
#[derive(Debug, Default)]
pub struct Session {
    environment: Environment,
    options: SessionOptions,
}

impl Session {
    pub fn new(options: SessionOptions) -> Self {
        Session {
            environment: Environment::new(),
            options,
        }
    }

    pub fn environment(&self) -> &Environment {
        &self.environment
    }

    pub fn options(&self) -> &SessionOptions {
        &self.options
    }

    /// Executes one statement. Bindings are stored unevaluated, so they may
    /// refer to names defined later.
    pub fn execute_statement(
        &mut self,
        statement: Statement,
    ) -> Result<StatementOutcome, EvalError> {
        match statement {
            Statement::Binding { name, expr } => {
                debug!(%name, "defining binding");
                self.environment.define(name.as_str(), expr);
                Ok(StatementOutcome::Defined { name })
            }
            Statement::Expr { expr } => {
                debug!(%expr, "evaluating expression");
                let normal_form =
                    reduce(Rc::clone(&expr), &self.environment, self.options.step_limit)?;
                Ok(StatementOutcome::Evaluated { expr, normal_form })
            }
        }
    }

    /// Parses and executes every statement of `source` in order.
    pub fn run_source(&mut self, source: &str) -> ExecutionResult {
        let mut exec_result = Vec::new();

        for parsed in Parser::new(source, self.options.lexer_options) {
            let statement_result = match parsed {
                Ok(source_statement) => self
                    .execute_statement(source_statement.statement)
                    .map_err(|eval_error| StatementError::Eval {
                        position: source_statement.position,
                        source: eval_error,
                    }),
                Err(parse_error) => Err(StatementError::from(parse_error)),
            };

            let failed = statement_result.is_err();
            exec_result.push(statement_result);

            if failed && self.options.error_policy == ErrorPolicy::Stop {
                break;
            }
        }

        exec_result
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::recursive_descent_parsing::parse_expression;

    fn parse(source: &str) -> TermRef {
        parse_expression(source, LexerOptions::default())
            .expect("Unable to parse expression string.")
    }

    fn eval_in(source: &str, environment: &Environment) -> Result<TermRef, EvalError> {
        reduce(parse(source), environment, DEFAULT_STEP_LIMIT)
    }

    fn eval(source: &str) -> TermRef {
        eval_in(source, &Environment::new()).expect("Unable to reduce expression.")
    }

    // Runs program_str in a fresh session and verifies that the printed
    // outputs match expected_str_outputs.
    fn run_execution_test(program_str: &str, expected_str_outputs: &[&str]) {
        let mut session = Session::new(SessionOptions::default());
        let exec_result = session.run_source(program_str);
        let printed = execution_result_to_string(&exec_result);
        let received: Vec<&str> = printed.lines().collect();

        assert_eq!(received, expected_str_outputs);
    }

    // Test reduction on a few simple expressions.
    #[test]
    fn test_reduce_simple() {
        let expressions_and_expected_outputs = vec![
            (r"(\x. x y) (\z. z)", "y"),
            (r"(\a. \b. a b) ((\x. x) (\y. y))", "λb. b"),
            (r"a b c", "a b c"),
            (r"(\x. x) (\y. y) (\z. z)", "λz. z"),
            (r"\x. (\y. y) x", "λx. x"),
            (r"f ((\x. x) a) ((\y. y) b)", "f a b"),
        ];

        for (expression, expected_output) in expressions_and_expected_outputs {
            assert_eq!(eval(expression).to_string(), expected_output);
        }
    }

    // Test that beta reduction renames binders instead of capturing.
    #[test]
    fn test_capture_avoidance() {
        assert_eq!(eval(r"(λx. λy. x) y").to_string(), "λy'. y");

        // The fresh name must also avoid the names already used in the body.
        let reduced = eval(r"(λx. λy. λy'. x y y') y");
        assert_eq!(reduced.to_string(), "λy''. λy'. y y'' y'");
    }

    // Test that substitution shares terms that do not mention the variable.
    #[test]
    fn test_substitution_without_occurrence() {
        let body = parse(r"λy. f y (λz. z)");
        let substituted = substitute(&body, "x", &parse("y"));

        assert!(Rc::ptr_eq(&body, &substituted));
    }

    // Test that a shadowing binder stops substitution.
    #[test]
    fn test_substitution_respects_shadowing() {
        let body = parse(r"x (λx. x)");
        let substituted = substitute(&body, "x", &parse("a"));

        assert_eq!(substituted, parse(r"a (λx. x)"));
    }

    // Test that normal order finds a normal form that applicative order would
    // miss.
    #[test]
    fn test_normal_order() {
        assert_eq!(eval(r"(λx. λy. y) ((λx. x x) (λx. x x))").to_string(), "λy. y");
    }

    // Test that the self-application term runs out of steps instead of
    // hanging.
    #[test]
    fn test_non_termination() {
        let omega = parse(r"(λx. x x) (λx. x x)");
        let eval_error = reduce(Rc::clone(&omega), &Environment::new(), 1_000)
            .expect_err("omega has no normal form");

        let EvalError::NonTermination {
            step_limit,
            last_term,
        } = eval_error;
        assert_eq!(step_limit, 1_000);
        assert!(last_term.alpha_equivalent(&omega));
    }

    // Test that running out of steps under a binder reports the whole term.
    #[test]
    fn test_non_termination_keeps_context() {
        let eval_error = reduce(
            parse(r"λa. f a ((λx. x x) (λx. x x))"),
            &Environment::new(),
            10,
        )
        .expect_err("omega has no normal form");

        let EvalError::NonTermination { last_term, .. } = eval_error;
        assert_eq!(last_term.to_string(), "λa. f a ((λx. x x) (λx. x x))");
    }

    // Test that a zero step limit still returns terms already in normal form.
    #[test]
    fn test_zero_step_limit() {
        let environment = Environment::new();

        assert_eq!(
            reduce(parse(r"λx. f x"), &environment, 0),
            Ok(parse(r"λx. f x"))
        );
        assert!(reduce(parse(r"(λx. x) y"), &environment, 0).is_err());
    }

    // Test that free variables resolve through the environment, and that
    // binders with a global name still refer to their own parameter.
    #[test]
    fn test_environment_resolution() {
        let mut environment = Environment::new();
        environment.define("id", parse(r"λx. x"));
        environment.define("k", parse(r"λa. λb. a"));

        assert_eq!(
            eval_in("id y", &environment).expect("reduction failed"),
            parse("y")
        );
        assert_eq!(
            eval_in(r"λid. id k", &environment)
                .expect("reduction failed")
                .to_string(),
            "λid'. id' (λa. λb. a)"
        );
        assert_eq!(
            eval_in("unbound_name", &environment).expect("reduction failed"),
            parse("unbound_name")
        );
    }

    // Test that a binder does not capture a free name of an expanded
    // definition.
    #[test]
    fn test_definition_free_names_not_captured() {
        let mut environment = Environment::new();
        environment.define("f", parse(r"λx. g"));

        assert_eq!(
            eval_in(r"λg. f", &environment)
                .expect("reduction failed")
                .to_string(),
            "λg'. λx. g"
        );
    }

    // Test that a binding referring to itself is caught by the step limit.
    #[test]
    fn test_self_referential_binding() {
        let mut environment = Environment::new();
        environment.define("loop", parse("loop"));

        assert!(matches!(
            reduce(parse("loop"), &environment, 50),
            Err(EvalError::NonTermination { step_limit: 50, .. })
        ));
    }

    // Test that a deeply nested term does not overflow the stack while
    // being reduced.
    #[test]
    fn test_deep_spine() {
        let mut term = Term::variable("z");
        for _ in 0..50_000 {
            term = Term::application(Term::abstraction("x", Term::variable("x")), term);
        }

        let normal_form = reduce(term, &Environment::new(), DEFAULT_STEP_LIMIT)
            .expect("identity chain should normalize");
        assert_eq!(normal_form, Term::variable("z"));
    }

    // Test addition with numbers in Church encoding.
    #[test]
    fn test_church_addition() {
        let addition_program_str = r"
            zero = λf. λx. x
            succ = λn. λf. λx. f (n f x)
            one = succ zero
            two = succ one
            add = λm. λn. λf. λx. m f (n f x)

            add one two
        ";

        run_execution_test(addition_program_str, &["λf. λx. f (f (f x))"]);
    }

    // Test multiplication and booleans in Church encoding.
    #[test]
    fn test_church_booleans_and_multiplication() {
        let program_str = r"
            true = λt. λf. t; false = λt. λf. f
            not = λb. b false true
            two = λf. λx. f (f x)
            three = λf. λx. f (f (f x))
            mul = λm. λn. λf. m (n f)
            is_zero = λn. n (λx. false) true

            not true
            is_zero (mul two three)
            mul two three
        ";

        run_execution_test(
            program_str,
            &["λt. λf. f", "λt. λf. f", "λf. λx. f (f (f (f (f (f x)))))"],
        );
    }

    // Test bindings persisting across statements and rebinding.
    #[test]
    fn test_binding_persistence() {
        let mut session = Session::new(SessionOptions::default());
        let first = session.run_source("id = λx. x\nid y\nalias = id");
        assert_eq!(execution_result_to_string(&first), "y");

        let second = session.run_source("id = λx. x x\nid y");
        assert_eq!(execution_result_to_string(&second), "y y");
        assert_eq!(session.environment().len(), 2);
    }

    // Test that bindings may refer to names defined after them.
    #[test]
    fn test_forward_references() {
        run_execution_test(
            "
            main = twice id
            twice = λf. λx. f (f x)
            id = λx. x
            main z
            ",
            &["z"],
        );
    }

    // Test that an unclosed parenthesis does not swallow the statements on
    // the lines after it.
    #[test]
    fn test_unclosed_parenthesis_fails_alone() {
        run_execution_test(
            "a = (b\nid = λx. x\nid y\nz",
            &[
                "error: parse error: unexpected `=` at line 2, column 4, expected `)`",
                "y",
                "z",
            ],
        );
    }

    // Test that one failing statement does not stop the rest by default, and
    // does with ErrorPolicy::Stop.
    #[test]
    fn test_error_policy() {
        let program_str = "a = (λx. x x) (λx. x x)\na\n(b\nc";

        let mut session = Session::new(SessionOptions {
            step_limit: 100,
            ..SessionOptions::default()
        });
        let exec_result = session.run_source(program_str);
        assert_eq!(exec_result.len(), 3);
        assert!(matches!(
            exec_result[1],
            Err(StatementError::Eval {
                position: Position { line: 2, column: 1 },
                ..
            })
        ));
        assert!(matches!(exec_result[2], Err(StatementError::Parse(_))));

        let mut stopping_session = Session::new(SessionOptions {
            step_limit: 100,
            error_policy: ErrorPolicy::Stop,
            ..SessionOptions::default()
        });
        assert_eq!(stopping_session.run_source(program_str).len(), 2);
    }
}
