//! LambdaXP - small-step interpreter for an extended untyped lambda calculus
//!
//! This crate evaluates programs written in a teaching language built on the pure
//! lambda calculus, extended with floating-point arithmetic, conditionals,
//! equality/ordering, `let`/`letrec`, an explicit fixed-point operator, sequencing
//! and cons lists.
//!
//! ```text
//! (\x.x + 1) 5                                     ; => 6.0
//! letrec f = \n. if n==0 then 1 else n*f(n-1) in f 4  ; => 24.0
//! hd (1:2:#)                                       ; => 1.0
//! 1:2:# == 1:2:#                                   ; => 1.0
//! ```
//!
//! ## Reduction Strategy
//!
//! Evaluation is normal order: the leftmost-outermost redex is reduced first,
//! function arguments are passed unevaluated (call-by-name) and lambda bodies
//! are never reduced until the lambda is applied. Lists and both sides of a
//! sequence (`;;`) are forced eagerly.
//!
//! Operators applied to operands of the wrong shape do not raise errors: the term
//! is *stuck* and evaluates to itself, so `hd a` prints back as `(hd a)`.
//!
//! Evaluation is bounded by a step budget. A term that is still reducible once the
//! budget is spent yields [`Error::NonTermination`].
//!
//! ## Modules
//!
//! - `ast`: term representation, value equality and the pretty-printer
//! - `subst`: free variables, fresh names and capture-avoiding substitution
//! - `evaluator`: the single-step reducer and the bounded driver loop
//! - `parser`: concrete syntax to [`ast::Term`] (feature `parser`)

use std::fmt;

/// Maximum parsing depth to prevent stack overflow on hostile input
/// This limits nested parentheses, binders and prefix operators
pub const MAX_PARSE_DEPTH: usize = 256;

/// Default number of reduction steps before evaluation is reported as non-terminating
/// This is an approximation of termination checking, not a halting test
/// The reference driver reports non-termination whenever the last allowed step made
/// progress, even if that step reached a normal form; here that case is accepted
pub const MAX_STEPS: usize = 500_000;

/// Categorizes the different kinds of parsing errors.
#[derive(Debug, PartialEq, Clone)]
pub enum ParseErrorKind {
    /// Invalid or unexpected syntax (bad tokens, malformed expressions)
    InvalidSyntax,
    /// Input ended before the expression was complete (unclosed parens, missing `in`/`else`)
    Incomplete,
    /// Expression nesting exceeded the maximum parse depth
    TooDeeplyNested,
    /// Extra input found after a complete, valid expression
    TrailingContent,
}

/// A structured error providing detailed information about a parsing failure.
#[derive(Debug, PartialEq, Clone)]
pub struct ParseError {
    pub kind: ParseErrorKind,
    pub message: String,
    /// Context snippet from the input showing where the error occurred (max 100 chars)
    pub context: Option<String>,
    /// The problematic token or character encountered, if identifiable
    pub found: Option<String>,
}

impl ParseError {
    /// Create a ParseError with all fields
    pub fn new(
        kind: ParseErrorKind,
        message: impl Into<String>,
        context: Option<String>,
        found: Option<String>,
    ) -> Self {
        ParseError {
            kind,
            message: message.into(),
            context,
            found,
        }
    }

    /// Create a simple ParseError with a kind and message but no context
    pub fn from_message(kind: ParseErrorKind, message: impl Into<String>) -> Self {
        Self::new(kind, message, None, None)
    }

    /// Create a ParseError with context extracted from input at a given byte offset,
    /// reporting the next token at that offset as `found`
    pub fn with_context(
        kind: ParseErrorKind,
        message: impl Into<String>,
        input: &str,
        error_offset: usize,
    ) -> Self {
        let found: String = input
            .get(error_offset..)
            .unwrap_or_default()
            .split_whitespace()
            .next()
            .unwrap_or_default()
            .chars()
            .take(20)
            .collect();
        let found = (!found.is_empty()).then_some(found);

        const MAX_CONTEXT: usize = 100;

        // Show a little of what came before the error
        let context_start = input
            .get(..error_offset)
            .map(|before| before.chars().count())
            .unwrap_or_default()
            .saturating_sub(20);

        let context_str: String = input
            .chars()
            .skip(context_start)
            .take(MAX_CONTEXT)
            .collect();

        let mut display_context = String::new();
        if context_start > 0 {
            display_context.push_str("[...]");
        }
        display_context.push_str(&context_str);
        if context_start + context_str.chars().count() < input.chars().count() {
            display_context.push_str("[...]");
        }

        let display_context = display_context.replace('\n', "\\n").replace('\r', "");

        Self::new(kind, message, Some(display_context), found)
    }
}

/// Error types for the interpreter
///
/// Stuck terms are deliberately absent: an operator that cannot make progress
/// leaves its term in place and evaluation succeeds with that residual term.
#[derive(Debug, Clone, PartialEq)]
pub enum Error {
    ParseError(ParseError),
    /// The step budget ran out while the term could still be reduced
    NonTermination { steps: usize },
}

impl Error {
    /// True for the budget-exhaustion outcome
    pub fn is_non_termination(&self) -> bool {
        matches!(self, Error::NonTermination { .. })
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Error::ParseError(e) => {
                write!(f, "ParseError: {}", e.message)?;
                if let Some(found) = &e.found {
                    write!(f, "\nFound: {found}")?;
                }
                if let Some(context) = &e.context {
                    write!(f, "\nContext: {context}")?;
                }
                Ok(())
            }
            Error::NonTermination { steps } => {
                write!(f, "<non-terminating> (no normal form within {steps} steps)")
            }
        }
    }
}

impl std::error::Error for Error {}

impl From<ParseError> for Error {
    fn from(e: ParseError) -> Self {
        Error::ParseError(e)
    }
}

pub mod ast;
pub mod evaluator;
pub mod subst;

#[cfg(feature = "parser")]
pub mod parser;

pub use ast::Term;
pub use evaluator::{EvalResult, Evaluator, evaluate};

/// Parse and evaluate a program, rendering the result the way the command-line
/// driver prints it (`<non-terminating>` when the step budget runs out).
#[cfg(feature = "parser")]
pub fn interpret(source: &str) -> Result<String, Error> {
    let term = parser::parse(source)?;
    match evaluate(term) {
        Ok(value) => Ok(value.to_string()),
        Err(Error::NonTermination { .. }) => Ok("<non-terminating>".to_owned()),
        Err(other) => Err(other),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_error_context_marks_truncation() {
        let input = format!("{}@ {}", "x ".repeat(30), "y ".repeat(80));
        let offset = input.find('@').unwrap_or_default();
        let err = ParseError::with_context(ParseErrorKind::InvalidSyntax, "bad", &input, offset);

        let context = err.context.unwrap_or_default();
        assert!(context.starts_with("[...]"), "context: {context}");
        assert!(context.ends_with("[...]"), "context: {context}");
        assert!(context.contains('@'));
        assert_eq!(err.found.as_deref(), Some("@"));
    }

    #[test]
    fn test_parse_error_context_escapes_newlines() {
        let err = ParseError::with_context(ParseErrorKind::Incomplete, "eof", "let x =\n", 8);
        assert_eq!(err.context.as_deref(), Some("let x =\\n"));
        assert_eq!(err.found, None);
    }

    #[test]
    fn test_error_display() {
        let parse = Error::ParseError(ParseError::new(
            ParseErrorKind::InvalidSyntax,
            "Unexpected token",
            Some("1 + )".into()),
            Some(")".into()),
        ));
        assert_eq!(
            parse.to_string(),
            "ParseError: Unexpected token\nFound: )\nContext: 1 + )"
        );

        let diverged = Error::NonTermination { steps: 10 };
        assert!(diverged.is_non_termination());
        assert!(diverged.to_string().starts_with("<non-terminating>"));
        assert!(!parse.is_non_termination());
    }
}
