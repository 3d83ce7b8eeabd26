#![warn(missing_docs)]
#![allow(clippy::result_large_err)]
#![doc = include_str!("../README.md")]

#[macro_use]
mod tracing_macros;

mod ast;
mod error;
mod funcs;
mod lex;
mod number;
mod parse;
mod unquote;

use std::collections::BTreeMap;

// Re-export the node model
pub use ast::{
    ActionNode, BoolNode, BranchNode, BreakNode, ChainNode, CommandNode, ContinueNode, DotNode,
    FieldNode, IdentifierNode, ListNode, NilNode, Node, NodeKind, NumberKind, NumberNode,
    PipeNode, Pos, StringNode, TemplateNode, TextNode, Tree, VariableNode,
};

// Re-export error types
pub use error::{ParseError, ParseErrorKind};

// Re-export function tables
pub use funcs::{BUILTINS, FuncNames};

pub use parse::parse;

/// Parsed templates by name. Iteration is sorted by name.
pub type TreeSet = BTreeMap<String, Tree>;

/// Left delimiter used when none is given.
pub const DEFAULT_LEFT_DELIM: &str = "{{";

/// Right delimiter used when none is given.
pub const DEFAULT_RIGHT_DELIM: &str = "}}";
