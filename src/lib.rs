//! lispwright - trampolined interpreter runtime for a small Lisp-family language
//!
//! This crate evaluates an already-parsed abstract syntax tree for a dynamically
//! typed Scheme-like language. The interesting parts are the evaluation core:
//!
//! - **Proper tail calls**: every construct that evaluates an expression in tail
//!   position hands back a [`evaluator::Trampoline`] marker instead of recursing,
//!   and the outer loop in [`evaluator::Runtime`] resolves it iteratively.
//! - **Two-tier macros**: host special forms receive unevaluated operand forms,
//!   and user `syntax-rules` macros expand templates whose free identifiers
//!   resolve in the macro's defining scope.
//! - **Escape continuations and conditions**: `call/cc`, `dynamic-wind`,
//!   `raise`, `raise-continuable`, `error` and `with-exception-handler` are all
//!   layered on explicit unwind signals rather than host exceptions.
//!
//! ```scheme
//! (define (loop n acc) (if (= n 0) acc (loop (- n 1) (+ acc n))))
//! (loop 100000 0)                                  ; => 5000050000
//! (call-with-current-continuation
//!   (lambda (k) (+ 1 (k 42))))                     ; => 42
//! (define-syntax my-list
//!   (syntax-rules () ((_ a ...) (list a ...))))
//! (my-list 1 2 3)                                  ; => (1 2 3)
//! ```
//!
//! ## Modules
//!
//! - `ast`: the closed value/AST union, pairs, symbols and runtime objects
//! - `evaluator`: the [`evaluator::Runtime`], scopes and the trampoline
//! - `macros`: host special forms (`if`, `define`, `let`, `cond`, ...)
//! - `syntaxrules`: pattern/template macro matching and instantiation
//! - `continuations`: escape continuations, `dynamic-wind` and conditions
//! - `quasiquote`: the quote transform and quasiquote splicing
//! - `builtinops`: the builtin function catalogue
//! - `interop`: the foreign binding resolver boundary
//! - `scheme`: S-expression reader (feature `scheme`)

use std::fmt;
use std::rc::Rc;

use crate::ast::ErrorObject;

/// Maximum reader nesting depth to keep hostile input from exhausting the stack
pub const MAX_PARSE_DEPTH: usize = 256;

/// Default limit on *native* evaluation nesting.
///
/// Tail calls are trampolined and never count against this limit; only
/// non-tail nesting such as `(+ 1 (f x))` does. Each level costs several
/// native frames, far more in unoptimized builds, so the default is sized
/// to trip before a 2 MiB thread stack runs out in either profile.
pub const DEFAULT_MAX_EVAL_DEPTH: usize = if cfg!(debug_assertions) { 96 } else { 512 };

/// Reader failure classes
#[derive(Debug, PartialEq, Clone)]
pub enum ParseErrorKind {
    /// Malformed token or form
    InvalidSyntax,
    /// More input could complete the datum (open list, unterminated string)
    Incomplete,
    /// Nesting deeper than [`MAX_PARSE_DEPTH`]
    TooDeeplyNested,
    /// A complete datum followed by more text where one datum was expected
    TrailingContent,
}

/// Reader error with an excerpt of the offending input
#[derive(Debug, PartialEq, Clone)]
pub struct ParseError {
    pub kind: ParseErrorKind,
    pub message: String,
    pub context: Option<String>,
}

impl ParseError {
    pub fn new(kind: ParseErrorKind, message: impl Into<String>, context: Option<String>) -> Self {
        ParseError {
            kind,
            message: message.into(),
            context,
        }
    }

    /// Attach a one-line excerpt of `input` around byte `offset`
    pub fn with_context(
        kind: ParseErrorKind,
        message: impl Into<String>,
        input: &str,
        offset: usize,
    ) -> Self {
        const BEFORE: usize = 20;
        const WIDTH: usize = 100;

        let floor = |mut i: usize| {
            i = i.min(input.len());
            while !input.is_char_boundary(i) {
                i -= 1;
            }
            i
        };
        let start = floor(offset.saturating_sub(BEFORE));
        let end = floor(start + WIDTH);

        let excerpt: String = input[start..end]
            .chars()
            .filter(|c| *c != '\r')
            .map(|c| if c == '\n' { ' ' } else { c })
            .collect();
        let lead = if start > 0 { "..." } else { "" };
        let tail = if end < input.len() { "..." } else { "" };

        Self::new(kind, message, Some(format!("{lead}{excerpt}{tail}")))
    }

    /// True when more input could complete the expression (REPL continuation lines)
    pub fn is_incomplete(&self) -> bool {
        self.kind == ParseErrorKind::Incomplete
    }
}

impl fmt::Display for ParseError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ParseError: {}", self.message)?;
        if let Some(context) = &self.context {
            write!(f, "\nContext: {context}")?;
        }
        Ok(())
    }
}

/// Error types for the interpreter
///
/// `ArityError` and `TypeError` together form the argument-contract family:
/// they are fatal to the current evaluation and are never offered to
/// in-language handlers. Only `Raised` and `StructuredError` are recoverable
/// through `with-exception-handler`.
#[derive(Debug, Clone, thiserror::Error)]
pub enum Error {
    #[error("{0}")]
    ParseError(ParseError),
    #[error("Duplicate definition: {0} is already defined in this scope")]
    DuplicateDefinition(String),
    #[error("Unbound variable: {0}")]
    UnboundVariable(String),
    #[error("Undefined variable for set!: {0}")]
    UndefinedVariable(String),
    #[error("Immutable scope: {0} is bound in the root scope and cannot be set!")]
    ImmutableScope(String),
    #[error("{}", arity_message(.expected, .got, .expression))]
    ArityError {
        expected: usize,
        got: usize,
        expression: Option<String>,
    },
    #[error("Type error: {0}")]
    TypeError(String),
    #[error("EvaluationError: {0}")]
    EvalError(String),
    #[error("Uncaught raise: {0}")]
    Raised(Value),
    #[error("{0}")]
    StructuredError(Rc<ErrorObject>),
    #[error("Continuation invoked outside its dynamic extent")]
    ContinuationExpired,
    #[error("Interop error: {0}")]
    Interop(String),
}

fn arity_message(expected: &usize, got: &usize, expression: &Option<String>) -> String {
    match expression {
        Some(expr) => {
            format!("ArityError: expression {expr}: expected {expected} arguments, got {got}")
        }
        None => format!("ArityError: function expected {expected} arguments but got {got}"),
    }
}

impl From<ParseError> for Error {
    fn from(error: ParseError) -> Self {
        Error::ParseError(error)
    }
}

impl Error {
    /// Create an ArityError without expression context
    pub fn arity_error(expected: usize, got: usize) -> Self {
        Error::ArityError {
            expected,
            got,
            expression: None,
        }
    }

    /// Create an ArityError with expression context
    pub fn arity_error_with_expr(expected: usize, got: usize, expression: String) -> Self {
        Error::ArityError {
            expected,
            got,
            expression: Some(expression),
        }
    }

    /// The condition value a handler receives, if this error is catchable in-language
    pub(crate) fn condition_value(&self) -> Option<Value> {
        match self {
            Error::Raised(value) => Some(value.clone()),
            Error::StructuredError(object) => Some(Value::Condition(Rc::clone(object))),
            _ => None,
        }
    }
}

/// Internal signal carrying a value from an escape procedure back to the
/// `call/cc` site that created it.
///
/// The fields are crate-private: user code can propagate an escape but can
/// neither forge nor inspect one.
#[derive(Debug, Clone)]
pub struct EscapeSignal {
    pub(crate) id: u64,
    pub(crate) value: Value,
}

/// Everything that can leave an evaluation early.
///
/// Escapes are kept in their own variant so handler dispatch, which only looks
/// inside `Unwind::Error`, cannot observe them.
#[derive(Debug, Clone)]
pub enum Unwind {
    Error(Error),
    Escape(EscapeSignal),
}

impl From<Error> for Unwind {
    fn from(error: Error) -> Self {
        Unwind::Error(error)
    }
}

impl From<Unwind> for Error {
    fn from(unwind: Unwind) -> Self {
        match unwind {
            Unwind::Error(error) => error,
            Unwind::Escape(_) => Error::ContinuationExpired,
        }
    }
}

impl fmt::Display for Unwind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Unwind::Error(error) => write!(f, "{error}"),
            Unwind::Escape(_) => write!(f, "#<escape>"),
        }
    }
}

pub mod ast;
pub mod builtinops;
pub mod continuations;
pub mod evaluator;
pub mod interop;
pub mod macros;
pub mod quasiquote;
pub mod syntaxrules;

#[cfg(feature = "scheme")]
pub mod scheme;

pub use ast::Value;
pub use evaluator::{Runtime, RuntimeConfig};
