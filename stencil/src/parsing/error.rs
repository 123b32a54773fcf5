//! Parse errors
//!
//! Every variant names the template source and the position of the offending
//! action as `line:column`.

use crate::funcs::Arity;
use crate::lexing::Pos;
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ParseError {
    /// An `end`/`else` without an open construct, or a construct never closed
    #[error("{template}:{pos}: unmatched {construct}: {detail}")]
    UnmatchedBlock {
        template: String,
        pos: Pos,
        construct: String,
        detail: String,
    },

    #[error("{template}:{pos}: wrong number of args for {name}: want {want}, got {got}")]
    ArityError {
        template: String,
        pos: Pos,
        name: String,
        want: Arity,
        got: usize,
    },

    #[error("{template}:{pos}: {message}")]
    Syntax {
        template: String,
        pos: Pos,
        message: String,
    },
}

impl ParseError {
    pub fn pos(&self) -> Pos {
        match self {
            ParseError::UnmatchedBlock { pos, .. }
            | ParseError::ArityError { pos, .. }
            | ParseError::Syntax { pos, .. } => *pos,
        }
    }
}
