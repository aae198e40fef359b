//! Error types for function files: parsing, evaluation, and invocation.
//!
//! [`ParseError`] makes a whole file unloadable. [`RuntimeError`] is a trap
//! raised while evaluating a function body. [`InvokeError`] is what callers of
//! the registry see and distinguishes the failure kinds the HTTP layer maps to
//! distinct status codes.

use thiserror::Error;

/// Errors produced while tokenizing or parsing a function file.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ParseError {
    #[error("line {line}: unexpected character '{ch}'")]
    UnexpectedChar { line: usize, ch: char },

    #[error("line {line}: unterminated string literal")]
    UnterminatedString { line: usize },

    #[error("line {line}: invalid escape sequence '\\{ch}'")]
    InvalidEscape { line: usize, ch: char },

    #[error("line {line}: invalid number literal '{text}'")]
    InvalidNumber { line: usize, text: String },

    #[error("line {line}: expected {expected}, found {found}")]
    Expected {
        line: usize,
        expected: String,
        found: String,
    },

    #[error("line {line}: unknown type '{name}'")]
    UnknownType { line: usize, name: String },

    #[error("line {line}: duplicate parameter '{name}'")]
    DuplicateParam { line: usize, name: String },

    #[error("line {line}: expression nesting exceeds {limit} levels")]
    TooDeep { line: usize, limit: usize },
}

/// Runtime traps raised while evaluating a function body.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum RuntimeError {
    #[error("type mismatch: expected {expected}, got {got}")]
    TypeMismatch { expected: String, got: String },

    #[error("integer overflow")]
    IntegerOverflow,

    #[error("Division by zero is not allowed.")]
    DivideByZero,

    #[error("undefined variable '{name}'")]
    UndefinedVariable { name: String },

    #[error("call to undefined function {name}()")]
    UnknownFunction { name: String },

    #[error("function '{name}' expects {expected} argument(s), {got} given")]
    ArityMismatch {
        name: String,
        expected: usize,
        got: usize,
    },

    #[error("index {index} out of bounds for length {len}")]
    IndexOutOfBounds { index: i64, len: usize },

    #[error("undefined key '{key}'")]
    MissingKey { key: String },

    #[error("call depth limit ({limit}) exceeded")]
    RecursionLimitExceeded { limit: usize },

    #[error("expression nesting limit ({limit}) exceeded")]
    NestingLimitExceeded { limit: usize },

    #[error("argument '{param}' must be of type {expected}, {got} given")]
    InvalidArgument {
        param: String,
        expected: String,
        got: String,
    },

    /// Raised explicitly by the `raise(message)` builtin.
    #[error("{message}")]
    Raised { message: String },
}

/// Failures of a registry invocation.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum InvokeError {
    #[error("Function or command '{0}' not found.")]
    NotFound(String),

    #[error("Incorrect number of arguments for function '{name}'.")]
    ArgumentMismatch {
        name: String,
        expected: usize,
        got: usize,
    },

    #[error(transparent)]
    Runtime(#[from] RuntimeError),
}

/// Failures while registering or loading functions.
#[derive(Debug, Error)]
pub enum LoadError {
    #[error("failed to read function directory '{path}': {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("function '{name}' is already defined in {existing}")]
    Duplicate { name: String, existing: String },

    #[error("'{name}' is a reserved builtin name")]
    ReservedName { name: String },
}
