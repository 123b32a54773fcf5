//! Execution errors

use crate::funcs::FuncError;
use crate::lexing::Pos;
use crate::set::RegistryError;
use std::io;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ExecError {
    #[error("{template}:{pos}: can't evaluate field {field} in type {type_name}")]
    NoSuchField {
        template: String,
        pos: Pos,
        field: String,
        type_name: String,
    },

    #[error("{template}:{pos}: nil pointer evaluating {field}")]
    NilDereference {
        template: String,
        pos: Pos,
        field: String,
    },

    #[error("{template}:{pos}: exceeded maximum template depth ({limit})")]
    RecursionLimitExceeded {
        template: String,
        pos: Pos,
        limit: usize,
    },

    #[error("{template}:{pos}: error calling {name}: {source}")]
    Func {
        template: String,
        pos: Pos,
        name: String,
        #[source]
        source: FuncError,
    },

    #[error("{template}:{pos}: {name:?} is not a defined function")]
    UndefinedFunction {
        template: String,
        pos: Pos,
        name: String,
    },

    #[error("{template}:{pos}: {message}")]
    Type {
        template: String,
        pos: Pos,
        message: String,
    },

    /// Not analyzed, or only analyzed as a callee in a non-text context
    #[error("template {name:?} has not been escaped for html")]
    NotEscaped { name: String },

    #[error(transparent)]
    Registry(#[from] RegistryError),

    #[error("writing output: {0}")]
    Io(#[from] io::Error),
}
