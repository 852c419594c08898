//! nanlisp - a small Scheme runtime built around a fixed-capacity object arena.
//!
//! The crate is organised leaf-first:
//!
//! - `value`: NaN-boxed 64-bit [`Value`] words (doubles, immediates, object handles)
//! - `heap`: the preallocated slot arena with its free list and root bookkeeping
//! - `gc`: mark-and-sweep collection over the arena
//! - `environment`: chained binding frames, themselves arena objects
//! - `evaluator`: eval/apply over `quote`, `lambda`, `cond`, `define`, `set!`, `if`,
//!   `begin` and procedure application, plus the [`Runtime`] context value
//! - `builtinops`: the builtin procedure table the evaluator dispatches into
//! - `printer`: external representation of values
//! - `scheme`: S-expression reader (feature `scheme`)
//!
//! ```scheme
//! (define (fact n)
//!   (cond ((= n 0) 1)
//!         (else (* n (fact (- n 1))))))
//! (fact 10)            ; => 3628800
//! ```
//!
//! ## Memory model
//!
//! Every heap object lives in one slot of an arena whose size is fixed when the
//! [`Runtime`] is created. Values never own objects; the collector is the only
//! thing that destroys them. Anything not reachable from the evaluator's roots
//! (current expression, current environment, global environment, argument
//! temporaries, and values pinned by the host) is reclaimed at the next collection,
//! which runs when the free list is empty or when the host asks for one.
//!
//! ## Errors
//!
//! Evaluation errors are ordinary [`Error`] values returned through `Result`, so a
//! REPL can print them and keep going. The one exception is
//! [`Error::OutOfMemory`]: the arena has no growth path, so exhausting it
//! terminates the runtime.

use std::fmt;

/// Maximum parsing depth to prevent stack overflow attacks
pub const MAX_PARSE_DEPTH: usize = 256;

/// Default maximum depth of nested (non-tail) evaluation.
/// Tail positions do not count against this limit.
pub const MAX_EVAL_DEPTH: usize = 1024;

/// Default number of object slots in a runtime's arena.
pub const DEFAULT_HEAP_CAPACITY: usize = 1 << 20;

/// Categorizes the different kinds of parsing errors.
#[derive(Debug, PartialEq, Clone)]
pub enum ParseErrorKind {
    /// Invalid or unexpected syntax (bad tokens, malformed expressions)
    InvalidSyntax,
    /// Input ended before the expression was complete (unterminated string, unclosed parens)
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

    /// Create a ParseError with context extracted from input at a given byte offset
    pub fn with_context(
        kind: ParseErrorKind,
        message: impl Into<String>,
        input: &str,
        error_offset: usize,
    ) -> Self {
        const MAX_CONTEXT: usize = 100;

        let error_offset = error_offset.min(input.len());
        let context_start = input[..error_offset]
            .char_indices()
            .rev()
            .nth(19)
            .map_or(0, |(i, _)| i);

        let context_str: String = input[context_start..].chars().take(MAX_CONTEXT).collect();

        let mut display_context = String::new();
        if context_start > 0 {
            display_context.push_str("[...]");
        }
        display_context.push_str(&context_str);
        if context_start + context_str.len() < input.len() {
            display_context.push_str("[...]");
        }

        let display_context = display_context.replace('\n', "\\n").replace('\r', "");

        let found = input[error_offset..].chars().next().map(|c| c.to_string());

        Self::new(kind, message, Some(display_context), found)
    }
}

/// Number of arguments a procedure accepts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Arity {
    Exact(usize),
    AtLeast(usize),
    /// Inclusive bounds, for procedures with optional trailing arguments
    Range(usize, usize),
    Any,
}

impl Arity {
    pub fn validate(self, got: usize) -> Result<(), Error> {
        let ok = match self {
            Arity::Exact(n) => got == n,
            Arity::AtLeast(n) => got >= n,
            Arity::Range(min, max) => (min..=max).contains(&got),
            Arity::Any => true,
        };
        if ok {
            Ok(())
        } else {
            Err(Error::arity_mismatch(self, got))
        }
    }
}

impl fmt::Display for Arity {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Arity::Exact(n) => write!(f, "{n}"),
            Arity::AtLeast(n) => write!(f, "at least {n}"),
            Arity::Range(min, max) => write!(f, "{min} to {max}"),
            Arity::Any => write!(f, "any number of"),
        }
    }
}

/// Error types for the runtime
#[derive(Debug, Clone, PartialEq)]
pub enum Error {
    ParseError(ParseError),
    /// Lookup or `set!` of a name bound nowhere in the environment chain
    UnboundVariable(String),
    ArityMismatch {
        expected: Arity,
        got: usize,
    },
    /// Application of something that is not a procedure
    NotApplicable(String),
    /// The arena is full even after a collection. Fatal for the runtime.
    OutOfMemory,
    /// Malformed special form
    BadSyntax(String),
    TypeError(String),
    EvalError(String),
}

impl Error {
    pub fn arity_mismatch(expected: Arity, got: usize) -> Self {
        Error::ArityMismatch { expected, got }
    }

    /// Whether the runtime that produced this error can keep evaluating.
    pub fn is_fatal(&self) -> bool {
        matches!(self, Error::OutOfMemory)
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
            Error::UnboundVariable(var) => write!(f, "Unbound variable: {var}"),
            Error::ArityMismatch { expected, got } => write!(
                f,
                "ArityMismatch: procedure expected {expected} arguments but got {got}"
            ),
            Error::NotApplicable(what) => write!(f, "Not applicable: {what}"),
            Error::OutOfMemory => write!(f, "Out of memory: object heap exhausted"),
            Error::BadSyntax(msg) => write!(f, "Bad syntax: {msg}"),
            Error::TypeError(msg) => write!(f, "Type error: {msg}"),
            Error::EvalError(msg) => write!(f, "EvaluationError: {msg}"),
        }
    }
}

impl std::error::Error for Error {}

impl From<ParseError> for Error {
    fn from(e: ParseError) -> Self {
        Error::ParseError(e)
    }
}

pub mod builtinops;
pub mod environment;
pub mod evaluator;
pub mod gc;
pub mod heap;
pub mod printer;
pub mod value;

#[cfg(feature = "scheme")]
pub mod scheme;

pub use builtinops::{BuiltinFn, Builtins};
pub use environment::EnvHandle;
pub use evaluator::{Runtime, RuntimeConfig};
pub use heap::{BuiltinId, GcStats, Heap, NativeResource, Object, Port, RootId};
pub use printer::Printed;
pub use value::{ObjectHandle, Unpacked, Value};

#[cfg(feature = "scheme")]
pub use scheme::{parse_scheme, parse_scheme_all};
