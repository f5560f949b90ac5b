//! Recursive descent parser that turns the token stream of a source string
//! into lambda calculus statements.
//!
//! Grammar:
//!
//! ```text
//! program     := statement (EOS statement)* EOF
//! statement   := IDENT '=' expr | expr
//! expr        := LAMBDA IDENT '.' expr | application
//! application := atom+ [LAMBDA IDENT '.' expr]
//! atom        := IDENT | '(' expr ')'
//! ```

use std::collections::VecDeque;

use thiserror::Error;
use tracing::debug;

use crate::lexical_analysis::{LexError, Lexer, LexerOptions, Position, Token, TokenClass};
use crate::program_representation::{SourceStatement, Statement, Term, TermRef};

/// The tokens that may start an expression.
const EXPRESSION_START: &[TokenClass] = &[
    TokenClass::Identifier,
    TokenClass::Lambda,
    TokenClass::LeftParen,
];

/// Represents a parsing error.
#[derive(Debug, Error, PartialEq, Eq, Clone)]
pub enum ParseError {
    #[error(transparent)]
    Lex(#[from] LexError),

    #[error(
        "unexpected {} at {position}, expected {}",
        describe_found(.found, .found_text),
        describe_expected(.expected)
    )]
    UnexpectedToken {
        position: Position,
        expected: Vec<TokenClass>,
        found: TokenClass,
        found_text: String,
    },
}

impl ParseError {
    /// Whether parsing failed only because the input ended too early, i.e.
    /// more input could still complete the statement.
    pub fn is_incomplete(&self) -> bool {
        matches!(
            self,
            ParseError::UnexpectedToken {
                found: TokenClass::EndOfInput,
                ..
            }
        )
    }

    pub fn position(&self) -> Position {
        match self {
            ParseError::Lex(lex_error) => lex_error.position,
            ParseError::UnexpectedToken { position, .. } => *position,
        }
    }
}

fn describe_found(found: &TokenClass, found_text: &str) -> String {
    match found {
        TokenClass::Identifier => format!("identifier `{found_text}`"),
        other => other.to_string(),
    }
}

fn describe_expected(expected: &[TokenClass]) -> String {
    expected
        .iter()
        .map(TokenClass::to_string)
        .collect::<Vec<_>>()
        .join(" or ")
}

/// Parses statements lazily from a source string, one `Result` per
/// statement. After a failed statement the parser skips ahead to where the
/// next statement starts and carries on.
pub struct Parser<'a> {
    lexer: Lexer<'a>,
    lookahead: VecDeque<Result<Token, LexError>>,
}

impl<'a> Parser<'a> {
    pub fn new(source: &'a str, options: LexerOptions) -> Self {
        Parser {
            lexer: Lexer::new(source, options),
            lookahead: VecDeque::new(),
        }
    }

    // Makes sure at least `count` tokens are buffered. Past the end of the
    // input the buffer is padded with `EndOfInput` tokens.
    fn fill_lookahead(&mut self, count: usize) {
        while self.lookahead.len() < count {
            let next = self.lexer.next().unwrap_or_else(|| {
                Ok(Token {
                    token_class: TokenClass::EndOfInput,
                    token_text: String::new(),
                    position: self.lexer.position(),
                })
            });
            self.lookahead.push_back(next);
        }
    }

    fn peek(&mut self, n: usize) -> Result<&Token, ParseError> {
        self.fill_lookahead(n + 1);
        match &self.lookahead[n] {
            Ok(token) => Ok(token),
            Err(lex_error) => Err(lex_error.clone().into()),
        }
    }

    fn peek_class(&mut self, n: usize) -> Result<TokenClass, ParseError> {
        Ok(self.peek(n)?.token_class)
    }

    fn advance(&mut self) -> Result<Token, ParseError> {
        self.fill_lookahead(1);
        match self.lookahead.pop_front() {
            Some(next) => Ok(next?),
            None => Err(self.unexpected(EXPRESSION_START)),
        }
    }

    // Builds the error for the next token not being one of `expected`.
    fn unexpected(&mut self, expected: &[TokenClass]) -> ParseError {
        match self.peek(0) {
            Ok(token) => ParseError::UnexpectedToken {
                position: token.position,
                expected: expected.to_vec(),
                found: token.token_class,
                found_text: token.token_text.clone(),
            },
            Err(parse_error) => parse_error,
        }
    }

    /// Consumes a token of the requested class.
    fn expect(&mut self, token_class: TokenClass) -> Result<Token, ParseError> {
        if self.peek_class(0)? == token_class {
            self.advance()
        } else {
            Err(self.unexpected(&[token_class]))
        }
    }

    // A statement ends at a separator (consumed) or at the end of the input
    // (left for the caller to see).
    fn expect_statement_end(&mut self) -> Result<(), ParseError> {
        match self.peek_class(0)? {
            TokenClass::EndOfStatement => {
                self.advance()?;
                Ok(())
            }
            TokenClass::EndOfInput => Ok(()),
            _ => Err(self.unexpected(&[TokenClass::EndOfStatement])),
        }
    }

    // Drops the rest of a failed statement that started on `statement_line`,
    // up to and including the next statement separator.
    //
    // Inside an unclosed `(` newlines do not end statements, so that separator
    // may only come after every remaining line. Once the skipped tokens reach
    // a later line while a parenthesis is open, lexing starts over on the
    // line after the statement's first one instead.
    fn recover(&mut self, statement_line: usize) {
        loop {
            self.fill_lookahead(1);
            let Some(front) = self.lookahead.front() else {
                return;
            };

            let (token_class, line) = match front {
                Ok(token) => (Some(token.token_class), token.position.line),
                Err(lex_error) => (None, lex_error.position.line),
            };

            match token_class {
                Some(TokenClass::EndOfInput) => return,
                Some(TokenClass::EndOfStatement) => {
                    self.lookahead.pop_front();
                    return;
                }
                _ => {}
            }

            if line > statement_line && self.lexer.in_parentheses() {
                let resume_at = match self.lookahead.front() {
                    // Resuming before a bad character would report it again.
                    Some(Err(lex_error)) => {
                        Position::new(lex_error.position.line, lex_error.position.column + 1)
                    }
                    _ => Position::new(statement_line + 1, 1),
                };

                debug!(%resume_at, "restarting after unclosed parenthesis");
                self.lookahead.clear();
                self.lexer.restart_at(resume_at);
                return;
            }

            self.lookahead.pop_front();
        }
    }

    /// Parses `λ[IDENTIFIER]. [EXPR]`, with the body extending as far right as
    /// possible.
    fn parse_abstraction(&mut self) -> Result<TermRef, ParseError> {
        self.expect(TokenClass::Lambda)?;
        let param_token = self.expect(TokenClass::Identifier)?;
        self.expect(TokenClass::Dot)?;
        let body = self.parse_expr()?;

        Ok(Term::abstraction(param_token.token_text, body))
    }

    /// Parses `[IDENTIFIER]` or `([EXPR])`.
    fn parse_atom(&mut self) -> Result<TermRef, ParseError> {
        match self.peek_class(0)? {
            TokenClass::Identifier => {
                let var_token = self.advance()?;
                Ok(Term::variable(var_token.token_text))
            }
            TokenClass::LeftParen => {
                self.advance()?;
                let expr = self.parse_expr()?;
                self.expect(TokenClass::RightParen)?;
                Ok(expr)
            }
            _ => Err(self.unexpected(&[TokenClass::Identifier, TokenClass::LeftParen])),
        }
    }

    /// Parses a chain of function applications, left-associatively. A
    /// trailing abstraction is taken as the last argument.
    fn parse_application(&mut self) -> Result<TermRef, ParseError> {
        let mut out_expr = self.parse_atom()?;

        loop {
            match self.peek_class(0)? {
                TokenClass::Identifier | TokenClass::LeftParen => {
                    let next_atom = self.parse_atom()?;
                    out_expr = Term::application(out_expr, next_atom);
                }
                TokenClass::Lambda => {
                    let last_arg = self.parse_abstraction()?;
                    return Ok(Term::application(out_expr, last_arg));
                }
                _ => return Ok(out_expr),
            }
        }
    }

    fn parse_expr(&mut self) -> Result<TermRef, ParseError> {
        match self.peek_class(0)? {
            TokenClass::Lambda => self.parse_abstraction(),
            TokenClass::Identifier | TokenClass::LeftParen => self.parse_application(),
            _ => Err(self.unexpected(EXPRESSION_START)),
        }
    }

    fn parse_statement(&mut self) -> Result<SourceStatement, ParseError> {
        let position = self.peek(0)?.position;

        // `name = ...` is told apart from an expression starting with `name`
        // by the token after the identifier.
        let is_binding = self.peek_class(0)? == TokenClass::Identifier
            && self.peek_class(1)? == TokenClass::Equals;

        let statement = if is_binding {
            let name_token = self.advance()?;
            self.advance()?;
            Statement::Binding {
                name: name_token.token_text,
                expr: self.parse_expr()?,
            }
        } else {
            Statement::Expr {
                expr: self.parse_expr()?,
            }
        };

        self.expect_statement_end()?;

        Ok(SourceStatement {
            position,
            statement,
        })
    }

    /// Parses the next statement, or returns `None` once the input is used up.
    pub fn next_statement(&mut self) -> Option<Result<SourceStatement, ParseError>> {
        loop {
            match self.peek_class(0) {
                Ok(TokenClass::EndOfStatement) => {
                    self.lookahead.pop_front();
                }
                Ok(TokenClass::EndOfInput) => return None,
                _ => break,
            }
        }

        let statement_line = match self.peek(0) {
            Ok(token) => token.position.line,
            Err(parse_error) => parse_error.position().line,
        };

        let parse_result = self.parse_statement();
        if parse_result.is_err() {
            self.recover(statement_line);
        }

        Some(parse_result)
    }

    /// Parses a single expression spanning the whole input.
    pub fn parse_whole_expression(&mut self) -> Result<TermRef, ParseError> {
        let expr = self.parse_expr()?;

        while self.peek_class(0)? == TokenClass::EndOfStatement {
            self.advance()?;
        }

        self.expect(TokenClass::EndOfInput)?;
        Ok(expr)
    }
}

impl<'a> Iterator for Parser<'a> {
    type Item = Result<SourceStatement, ParseError>;

    fn next(&mut self) -> Option<Self::Item> {
        self.next_statement()
    }
}

/// The statements of a program in source order, each parsed independently.
pub type Program = Vec<Result<SourceStatement, ParseError>>;

/// Parses every statement of `source`.
pub fn parse_program(source: &str, options: LexerOptions) -> Program {
    Parser::new(source, options).collect()
}

/// Parses `source` as exactly one expression.
pub fn parse_expression(source: &str, options: LexerOptions) -> Result<TermRef, ParseError> {
    Parser::new(source, options).parse_whole_expression()
}
