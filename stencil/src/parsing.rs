//! Parsing
//!
//!     Turns template source into syntax trees:
//!         1. Scanning: split source into text and action segments. See [lexing](crate::lexing).
//!         2. Parsing: tokenize each action and build nodes. See [parser](parser).
//!
//!     The output of one source is a [`Parsed`]: its main [`Tree`] plus one tree
//!     per `define` or `block`. Trees know nothing about each other; template
//!     calls are resolved by name when they execute, through the
//!     [`TemplateSet`](crate::set::TemplateSet) the trees are defined in.
//!
//! Terminology
//!
//!     - action: anything between the delimiters
//!     - pipeline: optional declarations plus `|`-separated commands
//!     - command: a function, method, field or literal followed by its arguments
//!     - escaper stage: a command appended by the escaping analyzer, never written by hand

pub mod ast;
pub mod error;
pub mod parser;

pub use ast::{
    ActionNode, Arg, BranchNode, CallKind, Command, Node, Pipeline, TemplateNode, TextNode, Tree,
};
pub use error::ParseError;
pub use parser::{parse, parse_segments, Parsed};
