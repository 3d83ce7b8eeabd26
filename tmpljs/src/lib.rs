#![warn(missing_docs)]
#![allow(clippy::result_large_err)]
#![doc = include_str!("../README.md")]

#[macro_use]
mod tracing_macros;

pub mod accumulator;
mod compile;
pub mod emitter;
mod error;
pub mod escape;
mod lower;

// Re-export the driver
pub use compile::{Compiler, DEFAULT_RUNTIME, compile_to_script};

// Re-export error types
pub use error::{CompileError, CompileErrorKind, InternalError};

// Re-export the front-end
pub use tmpljs_parse::{self as parse, ParseError, Tree, TreeSet};
