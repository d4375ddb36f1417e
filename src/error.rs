//! The two diagnostic error kinds that flow through the compiler core.
//!
//! Parse errors are caught at top-level element boundaries and allow the
//! parser to resynchronise; evaluation errors terminate the current
//! compilation immediately. Both carry a human-readable message and, where
//! known, the source line that produced them.

use thiserror::Error;

/// A malformed token stream, unexpected character, unresolved identifier or
/// other problem detected while building the AST.
#[derive(Debug, Clone, Error)]
#[error("{message}")]
pub struct ParseError {
    /// Human-readable description. Text wrapped in `===` is emphasised by
    /// the reporter.
    pub message: String,
    /// Source line the error was raised at, when known.
    pub line: Option<usize>,
}

impl ParseError {
    /// Creates a parse error with no line information.
    pub fn new(message: impl Into<String>) -> Self {
        ParseError {
            message: message.into(),
            line: None,
        }
    }

    /// Creates a parse error attributed to a source line.
    pub fn at(line: usize, message: impl Into<String>) -> Self {
        ParseError {
            message: message.into(),
            line: Some(line),
        }
    }

    /// Returns the same error with the line filled in if it was missing.
    pub fn with_line(mut self, line: usize) -> Self {
        self.line.get_or_insert(line);
        self
    }
}

/// A semantic problem found while symbolically evaluating the AST or
/// lowering the result to a netlist: type mismatches, non-constant loop
/// conditions, out-of-bounds constant indices, writes to read-only objects
/// and similar.
#[derive(Debug, Clone, Error)]
#[error("{message}")]
pub struct EvalError {
    /// Human-readable description. Text wrapped in `===` is emphasised by
    /// the reporter.
    pub message: String,
    /// Source line the error was raised at, when known.
    pub line: Option<usize>,
}

impl EvalError {
    /// Creates an evaluation error with no line information.
    pub fn new(message: impl Into<String>) -> Self {
        EvalError {
            message: message.into(),
            line: None,
        }
    }

    /// Creates an evaluation error for an internal inconsistency, such as
    /// hitting the null sentinel.
    pub fn internal(message: impl Into<String>) -> Self {
        EvalError {
            message: format!(
                "{} (probably an internal error, please report)",
                message.into()
            ),
            line: None,
        }
    }

    /// Returns the same error with the line filled in if it was missing.
    pub fn with_line(mut self, line: usize) -> Self {
        self.line.get_or_insert(line);
        self
    }
}

/// Everything that can go wrong over a whole compilation, for callers that
/// drive the phases end to end.
#[derive(Debug, Error)]
pub enum Error {
    /// The source could not be turned into an AST.
    #[error(transparent)]
    Parse(#[from] ParseError),
    /// Evaluation or synthesis failed.
    #[error(transparent)]
    Eval(#[from] EvalError),
    /// Reading the input or writing the output failed.
    #[error("{0}")]
    Io(String),
}

/// Convenience alias used throughout the evaluator and synthesis code.
pub type EvalResult<T> = Result<T, EvalError>;

/// Convenience alias used throughout the parser.
pub type ParseResult<T> = Result<T, ParseError>;
