//! Lexer that turns lambda calculus source text into a lazy stream of tokens.

use std::fmt;

use lazy_static::lazy_static;
use regex::Regex;
use thiserror::Error;

/// The different classes of tokens handed to the parser.
#[derive(PartialEq, Eq, Debug, Clone, Copy, Hash)]
pub enum TokenClass {
    Identifier,
    Lambda,
    Dot,
    LeftParen,
    RightParen,
    Equals,
    EndOfStatement,
    EndOfInput,
}

impl TokenClass {
    // A statement cannot end right after one of these, so a newline following
    // them is plain whitespace.
    fn continues_statement(self) -> bool {
        matches!(
            self,
            TokenClass::Lambda | TokenClass::Dot | TokenClass::Equals | TokenClass::LeftParen
        )
    }
}

impl fmt::Display for TokenClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let description = match self {
            TokenClass::Identifier => "identifier",
            TokenClass::Lambda => "`λ`",
            TokenClass::Dot => "`.`",
            TokenClass::LeftParen => "`(`",
            TokenClass::RightParen => "`)`",
            TokenClass::Equals => "`=`",
            TokenClass::EndOfStatement => "end of statement",
            TokenClass::EndOfInput => "end of input",
        };
        f.write_str(description)
    }
}

/// A 1-based line/column location in the source text. Columns count
/// characters, not bytes.
#[derive(PartialEq, Eq, PartialOrd, Ord, Debug, Clone, Copy, Hash)]
pub struct Position {
    pub line: usize,
    pub column: usize,
}

impl Position {
    pub fn new(line: usize, column: usize) -> Self {
        Position { line, column }
    }

    fn advance_over(&mut self, text: &str) {
        for ch in text.chars() {
            if ch == '\n' {
                self.line += 1;
                self.column = 1;
            } else {
                self.column += 1;
            }
        }
    }
}

impl Default for Position {
    fn default() -> Self {
        Position::new(1, 1)
    }
}

impl fmt::Display for Position {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "line {}, column {}", self.line, self.column)
    }
}

/// Represents a single token of the language.
#[derive(PartialEq, Eq, Debug, Clone)]
pub struct Token {
    pub token_class: TokenClass,
    pub token_text: String,
    pub position: Position,
}

/// A character that no lexical rule accepts.
#[derive(Debug, Error, PartialEq, Eq, Clone)]
#[error("unrecognized character {character:?} at {position}")]
pub struct LexError {
    pub position: Position,
    pub character: char,
}

/// Switches for the optional parts of the lexical grammar.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LexerOptions {
    /// Treat `#` up to the end of the line as a comment. When off, `#` is a
    /// lexical error.
    pub allow_comments: bool,
}

impl Default for LexerOptions {
    fn default() -> Self {
        LexerOptions {
            allow_comments: true,
        }
    }
}

// Everything a rule can recognize, including the lexemes the parser never sees.
#[derive(PartialEq, Eq, Debug, Clone, Copy)]
enum LexemeClass {
    Token(TokenClass),
    Newline,
    Whitespace,
    Comment,
}

// Represents how to recognize a lexeme class.
#[derive(Debug)]
struct LexemeRule {
    lexeme_class: LexemeClass,
    regex: Regex,
}

impl LexemeRule {
    fn new(lexeme_class: LexemeClass, pattern: &str) -> Self {
        LexemeRule {
            lexeme_class,
            regex: Regex::new(pattern)
                .unwrap_or_else(|err| panic!("invalid {lexeme_class:?} rule regex: {err}")),
        }
    }
}

// Rules are anchored at the start of the remaining input. Order matters only
// for ties: the earlier rule wins, which makes `lambda` a keyword.
lazy_static! {
    static ref LEXEME_RULES: Vec<LexemeRule> = vec![
        LexemeRule::new(LexemeClass::Token(TokenClass::Lambda), r"\A(?:λ|\\|lambda)"),
        LexemeRule::new(LexemeClass::Token(TokenClass::Dot), r"\A\."),
        LexemeRule::new(LexemeClass::Token(TokenClass::LeftParen), r"\A\("),
        LexemeRule::new(LexemeClass::Token(TokenClass::RightParen), r"\A\)"),
        LexemeRule::new(LexemeClass::Token(TokenClass::Equals), r"\A="),
        LexemeRule::new(LexemeClass::Token(TokenClass::EndOfStatement), r"\A;"),
        LexemeRule::new(
            LexemeClass::Token(TokenClass::Identifier),
            r"\A[^\s\p{Cc}().=;#λ\\]+"
        ),
        LexemeRule::new(LexemeClass::Newline, r"\A(?:\r\n|\n)"),
        LexemeRule::new(LexemeClass::Whitespace, r"\A[^\S\n]+"),
        LexemeRule::new(LexemeClass::Comment, r"\A#[^\n]*"),
    ];
}

// Finds the rule that matches the most characters from the start of the input
// string, or `None` if no rule matches at all.
fn longest_matching_rule(
    input_str: &str,
    options: LexerOptions,
) -> Option<(&'static LexemeRule, usize)> {
    let mut longest: Option<(&'static LexemeRule, usize)> = None;

    for rule in LEXEME_RULES.iter() {
        if rule.lexeme_class == LexemeClass::Comment && !options.allow_comments {
            continue;
        }

        if let Some(match_obj) = rule.regex.find(input_str) {
            if match_obj.len() > longest.map_or(0, |(_, len)| len) {
                longest = Some((rule, match_obj.len()));
            }
        }
    }

    longest
}

/// Lazily tokenizes a source string. Yields exactly one `EndOfInput` token
/// and then stops; lexical errors are yielded in place and lexing resumes
/// after the offending character.
#[derive(Debug, Clone)]
pub struct Lexer<'a> {
    source: &'a str,
    offset: usize,
    position: Position,
    options: LexerOptions,
    paren_depth: usize,
    last_class: Option<TokenClass>,
    finished: bool,
}

impl<'a> Lexer<'a> {
    pub fn new(source: &'a str, options: LexerOptions) -> Self {
        Lexer {
            source,
            offset: 0,
            position: Position::default(),
            options,
            paren_depth: 0,
            last_class: None,
            finished: false,
        }
    }

    /// Position of the next unread character.
    pub fn position(&self) -> Position {
        self.position
    }

    /// Whether a `(` read so far is still unclosed.
    pub fn in_parentheses(&self) -> bool {
        self.paren_depth > 0
    }

    /// Forgets any open parentheses and resumes lexing at `position`, which
    /// may lie before the current position. A position past the end of the
    /// source resumes at the end.
    pub fn restart_at(&mut self, position: Position) {
        self.offset = 0;
        self.position = Position::default();

        let source = self.source;
        while self.position < position {
            match source[self.offset..].chars().next() {
                Some(ch) => self.consume(ch.len_utf8()),
                None => break,
            }
        }

        self.paren_depth = 0;
        self.last_class = None;
        self.finished = false;
    }

    fn consume(&mut self, len: usize) {
        let source = self.source;
        self.position
            .advance_over(&source[self.offset..self.offset + len]);
        self.offset += len;
    }

    fn newline_ends_statement(&self) -> bool {
        if self.paren_depth > 0 {
            return false;
        }

        match self.last_class {
            None | Some(TokenClass::EndOfStatement) => false,
            Some(token_class) => !token_class.continues_statement(),
        }
    }

    fn emit(&mut self, token_class: TokenClass, token_text: &str, position: Position) -> Token {
        match token_class {
            TokenClass::LeftParen => self.paren_depth += 1,
            TokenClass::RightParen => self.paren_depth = self.paren_depth.saturating_sub(1),
            _ => {}
        }
        self.last_class = Some(token_class);

        Token {
            token_class,
            token_text: String::from(token_text),
            position,
        }
    }
}

impl<'a> Iterator for Lexer<'a> {
    type Item = Result<Token, LexError>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            if self.finished {
                return None;
            }

            let source = self.source;
            let rest = &source[self.offset..];
            let start = self.position;

            let Some(character) = rest.chars().next() else {
                self.finished = true;
                return Some(Ok(self.emit(TokenClass::EndOfInput, "", start)));
            };

            let Some((rule, match_len)) = longest_matching_rule(rest, self.options) else {
                self.consume(character.len_utf8());
                return Some(Err(LexError {
                    position: start,
                    character,
                }));
            };

            let text = &rest[..match_len];
            self.consume(match_len);

            match rule.lexeme_class {
                LexemeClass::Whitespace | LexemeClass::Comment => continue,
                LexemeClass::Newline => {
                    if self.newline_ends_statement() {
                        return Some(Ok(self.emit(TokenClass::EndOfStatement, text, start)));
                    }
                }
                LexemeClass::Token(token_class) => {
                    return Some(Ok(self.emit(token_class, text, start)));
                }
            }
        }
    }
}

/// Given a string, returns the vector of tokens that comprise it, ending with
/// `EndOfInput`. Fails on the first unrecognized character.
pub fn run_lexical_analysis(program_str: &str, options: LexerOptions) -> Result<Vec<Token>, LexError> {
    Lexer::new(program_str, options).collect()
}
