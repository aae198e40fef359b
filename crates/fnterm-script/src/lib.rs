//! Function files and the function registry for fnterm.
//!
//! Operators keep server-side functions as `*.fn` files in a function
//! directory. Each file declares one or more functions in a small expression
//! language:
//!
//! ```text
//! /// Adds two numbers together.
//! fn add(a: int, b: int) -> int {
//!     a + b
//! }
//! ```
//!
//! # Modules
//!
//! - [`lexer`], [`parser`], [`ast`]: function-file syntax
//! - [`value`]: runtime values and declared parameter types
//! - [`interp`]: the evaluator, with checked arithmetic and a call depth limit
//! - [`builtins`]: reserved builtin functions
//! - [`registry`]: the [`Callable`] trait and [`FunctionRegistry`]
//! - [`error`]: parse, runtime, invocation and load errors

pub mod ast;
pub mod builtins;
pub mod error;
pub mod interp;
pub mod lexer;
pub mod parser;
pub mod registry;
pub mod value;

pub use error::{InvokeError, LoadError, ParseError, RuntimeError};
pub use interp::{CallContext, FunctionScope, MAX_CALL_DEPTH, MAX_EVAL_NESTING};
pub use parser::{parse_unit, MAX_NESTING};
pub use registry::{
    Callable, FunctionDescriptor, FunctionRegistry, ParamDescriptor, ScriptFunction,
    FUNCTION_EXTENSION,
};
pub use value::{ParamType, Value};
