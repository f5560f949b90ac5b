//! Data structures to represent lambda calculus terms and statements, and
//! some utility functions to display and inspect them.
//!
//! Terms are immutable and shared through `Rc`, so rewriting a term only
//! allocates the nodes on the path to the change.

use std::collections::HashSet;
use std::fmt;
use std::rc::Rc;

use crate::lexical_analysis::Position;

pub type TermRef = Rc<Term>;

/// Represents a lambda calculus term.
#[derive(Debug, PartialEq, Eq)]
pub enum Term {
    /// `x`
    Variable { name: String },
    /// `λx. body`
    Abstraction { param: String, body: TermRef },
    /// `function argument`
    Application { function: TermRef, argument: TermRef },
}

impl Term {
    pub fn variable(name: impl Into<String>) -> TermRef {
        Rc::new(Term::Variable { name: name.into() })
    }

    pub fn abstraction(param: impl Into<String>, body: TermRef) -> TermRef {
        Rc::new(Term::Abstraction {
            param: param.into(),
            body,
        })
    }

    pub fn application(function: TermRef, argument: TermRef) -> TermRef {
        Rc::new(Term::Application { function, argument })
    }

    /// Computes the free variables of the term.
    pub fn free_variables(&self) -> HashSet<&str> {
        match self {
            Term::Variable { name } => HashSet::from([name.as_str()]),
            Term::Application { function, argument } => {
                let mut free_vars = function.free_variables();
                free_vars.extend(argument.free_variables());
                free_vars
            }
            Term::Abstraction { param, body } => {
                let mut free_vars = body.free_variables();
                free_vars.remove(param.as_str());
                free_vars
            }
        }
    }

    /// Finds every name used in the term, bound, free or as a binder.
    pub fn all_variables(&self) -> HashSet<&str> {
        match self {
            Term::Variable { name } => HashSet::from([name.as_str()]),
            Term::Application { function, argument } => {
                let mut vars = function.all_variables();
                vars.extend(argument.all_variables());
                vars
            }
            Term::Abstraction { param, body } => {
                let mut vars = body.all_variables();
                vars.insert(param.as_str());
                vars
            }
        }
    }

    /// Whether `var_name` has a free occurrence in the term.
    pub fn occurs_free(&self, var_name: &str) -> bool {
        match self {
            Term::Variable { name } => name == var_name,
            Term::Application { function, argument } => {
                function.occurs_free(var_name) || argument.occurs_free(var_name)
            }
            Term::Abstraction { param, body } => param != var_name && body.occurs_free(var_name),
        }
    }

    /// Structural equality up to consistent renaming of bound variables.
    pub fn alpha_equivalent(&self, other: &Term) -> bool {
        // Binders in scope, innermost last. A bound variable is identified by
        // its distance to the binder that introduced it.
        fn binder_index(binders: &[&str], name: &str) -> Option<usize> {
            binders.iter().rev().position(|binder| *binder == name)
        }

        fn alpha_equivalent_rec<'a>(
            lhs: &'a Term,
            rhs: &'a Term,
            lhs_binders: &mut Vec<&'a str>,
            rhs_binders: &mut Vec<&'a str>,
        ) -> bool {
            match (lhs, rhs) {
                (Term::Variable { name: lhs_name }, Term::Variable { name: rhs_name }) => {
                    match (
                        binder_index(lhs_binders, lhs_name),
                        binder_index(rhs_binders, rhs_name),
                    ) {
                        (None, None) => lhs_name == rhs_name,
                        (lhs_index, rhs_index) => lhs_index == rhs_index,
                    }
                }
                (
                    Term::Abstraction {
                        param: lhs_param,
                        body: lhs_body,
                    },
                    Term::Abstraction {
                        param: rhs_param,
                        body: rhs_body,
                    },
                ) => {
                    lhs_binders.push(lhs_param.as_str());
                    rhs_binders.push(rhs_param.as_str());
                    let equivalent =
                        alpha_equivalent_rec(lhs_body, rhs_body, lhs_binders, rhs_binders);
                    lhs_binders.pop();
                    rhs_binders.pop();
                    equivalent
                }
                (
                    Term::Application {
                        function: lhs_function,
                        argument: lhs_argument,
                    },
                    Term::Application {
                        function: rhs_function,
                        argument: rhs_argument,
                    },
                ) => {
                    alpha_equivalent_rec(lhs_function, rhs_function, lhs_binders, rhs_binders)
                        && alpha_equivalent_rec(
                            lhs_argument,
                            rhs_argument,
                            lhs_binders,
                            rhs_binders,
                        )
                }
                _ => false,
            }
        }

        alpha_equivalent_rec(self, other, &mut vec![], &mut vec![])
    }
}

impl Term {
    // Moves the children out of the term, leaving `placeholder` in their place.
    fn unlink_children(&mut self, placeholder: &TermRef, unlinked: &mut Vec<TermRef>) {
        match self {
            Term::Variable { .. } => {}
            Term::Abstraction { body, .. } => {
                unlinked.push(std::mem::replace(body, Rc::clone(placeholder)));
            }
            Term::Application { function, argument } => {
                unlinked.push(std::mem::replace(function, Rc::clone(placeholder)));
                unlinked.push(std::mem::replace(argument, Rc::clone(placeholder)));
            }
        }
    }

    fn owns_a_child(&self) -> bool {
        match self {
            Term::Variable { .. } => false,
            Term::Abstraction { body, .. } => Rc::strong_count(body) == 1,
            Term::Application { function, argument } => {
                Rc::strong_count(function) == 1 || Rc::strong_count(argument) == 1
            }
        }
    }
}

// Long chains of terms owned by nobody else are freed with an explicit stack
// instead of one nested drop call per level.
impl Drop for Term {
    fn drop(&mut self) {
        if !self.owns_a_child() {
            return;
        }

        let placeholder = Rc::new(Term::Variable {
            name: String::new(),
        });
        let mut unlinked = Vec::new();
        self.unlink_children(&placeholder, &mut unlinked);

        while let Some(child) = unlinked.pop() {
            if let Ok(mut child) = Rc::try_unwrap(child) {
                child.unlink_children(&placeholder, &mut unlinked);
            }
        }
    }
}

// Work left while rendering: a subterm still to render, or fixed text.
enum RenderItem<'a> {
    Term(&'a Term),
    Text(&'static str),
}

// Schedules `term` for rendering, wrapped in parentheses if asked. Items are
// popped from the end, so they are pushed in reverse.
fn push_rendered<'a>(pending: &mut Vec<RenderItem<'a>>, term: &'a Term, parenthesized: bool) {
    if parenthesized {
        pending.push(RenderItem::Text(")"));
        pending.push(RenderItem::Term(term));
        pending.push(RenderItem::Text("("));
    } else {
        pending.push(RenderItem::Term(term));
    }
}

/// Renders a term with the fewest parentheses that still parse back to the
/// same tree. Works through an explicit stack, so terms of any depth render.
pub fn render(term: &Term) -> String {
    let mut out_string = String::new();
    let mut pending = vec![RenderItem::Term(term)];

    while let Some(item) = pending.pop() {
        match item {
            RenderItem::Text(text) => out_string.push_str(text),
            RenderItem::Term(Term::Variable { name }) => out_string.push_str(name),
            RenderItem::Term(Term::Abstraction { param, body }) => {
                out_string.push('λ');
                out_string.push_str(param);
                out_string.push_str(". ");
                pending.push(RenderItem::Term(body));
            }
            RenderItem::Term(Term::Application { function, argument }) => {
                // Applications on the right would re-associate, and
                // abstractions are not atoms.
                let argument_needs_parens = !matches!(**argument, Term::Variable { .. });
                push_rendered(&mut pending, argument, argument_needs_parens);

                pending.push(RenderItem::Text(" "));

                // An abstraction in function position would swallow the argument.
                let function_needs_parens = matches!(**function, Term::Abstraction { .. });
                push_rendered(&mut pending, function, function_needs_parens);
            }
        }
    }

    out_string
}

impl fmt::Display for Term {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&render(self))
    }
}

/// Represents a top-level statement.
#[derive(Debug, PartialEq, Eq, Clone)]
pub enum Statement {
    /// `name = expr`
    Binding { name: String, expr: TermRef },
    /// `expr`
    Expr { expr: TermRef },
}

impl fmt::Display for Statement {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Statement::Binding { name, expr } => write!(f, "{} = {}", name, expr),
            Statement::Expr { expr } => write!(f, "{}", expr),
        }
    }
}

/// A statement together with the position of its first token.
#[derive(Debug, PartialEq, Eq, Clone)]
pub struct SourceStatement {
    pub position: Position,
    pub statement: Statement,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn var(name: &str) -> TermRef {
        Term::variable(name)
    }

    fn lam(param: &str, body: TermRef) -> TermRef {
        Term::abstraction(param, body)
    }

    fn app(function: TermRef, argument: TermRef) -> TermRef {
        Term::application(function, argument)
    }

    // Test rendering of a church numeral successor.
    #[test]
    fn test_render_succ() {
        let succ = lam(
            "n",
            lam(
                "f",
                lam("x", app(var("f"), app(app(var("n"), var("f")), var("x")))),
            ),
        );

        assert_eq!(render(&succ), "λn. λf. λx. f (n f x)");
    }

    // Test that parentheses appear exactly where dropping them changes the parse.
    #[test]
    fn test_render_parenthesization() {
        let identity = lam("x", var("x"));

        assert_eq!(
            render(&app(identity.clone(), var("y"))),
            "(λx. x) y"
        );
        assert_eq!(
            render(&app(var("f"), identity.clone())),
            "f (λx. x)"
        );
        assert_eq!(
            render(&app(app(var("f"), var("x")), var("y"))),
            "f x y"
        );
        assert_eq!(
            render(&app(var("f"), app(var("x"), var("y")))),
            "f (x y)"
        );
        assert_eq!(
            render(&app(identity.clone(), identity)),
            "(λx. x) (λx. x)"
        );
    }

    // Test that a very deep term renders and is freed without exhausting
    // the stack.
    #[test]
    fn test_deep_term() {
        let depth = 500_000;
        let mut term = var("x");
        for _ in 0..depth {
            term = app(var("f"), term);
        }
        let term = lam("f", lam("x", term));

        let rendered = render(&term);
        assert!(rendered.starts_with("λf. λx. f (f (f "));
        assert!(rendered.ends_with("f x))))"));
        assert_eq!(rendered.matches('(').count(), depth - 1);
        drop(term);

        let mut left_nested = var("f");
        for _ in 0..depth {
            left_nested = app(left_nested, var("x"));
        }
        assert_eq!(render(&left_nested).len(), 1 + 2 * depth);
    }

    // Test free and bound variable bookkeeping.
    #[test]
    fn test_free_variables() {
        // λx. x y (λy. y z)
        let term = lam(
            "x",
            app(app(var("x"), var("y")), lam("y", app(var("y"), var("z")))),
        );

        assert_eq!(term.free_variables(), HashSet::from(["y", "z"]));
        assert_eq!(term.all_variables(), HashSet::from(["x", "y", "z"]));
        assert!(term.occurs_free("y"));
        assert!(!term.occurs_free("x"));
        assert!(!lam("y", var("y")).occurs_free("y"));
    }

    // Test alpha equivalence, including shadowing and free names.
    #[test]
    fn test_alpha_equivalence() {
        assert!(lam("x", var("x")).alpha_equivalent(&lam("y", var("y"))));
        assert!(lam("x", lam("x", var("x"))).alpha_equivalent(&lam("a", lam("b", var("b")))));
        assert!(!lam("x", lam("x", var("x"))).alpha_equivalent(&lam("a", lam("b", var("a")))));
        assert!(!lam("x", var("y")).alpha_equivalent(&lam("x", var("z"))));
        assert!(!lam("x", var("y")).alpha_equivalent(&lam("y", var("y"))));
        assert!(!var("x").alpha_equivalent(&lam("x", var("x"))));
    }

    // Test statement display.
    #[test]
    fn test_statement_display() {
        let binding = Statement::Binding {
            name: String::from("id"),
            expr: lam("x", var("x")),
        };
        let expr = Statement::Expr {
            expr: app(var("id"), var("y")),
        };

        assert_eq!(binding.to_string(), "id = λx. x");
        assert_eq!(expr.to_string(), "id y");
    }
}
