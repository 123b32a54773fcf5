//! Analysis errors

use super::context::Context;
use crate::lexing::Pos;
use crate::set::RegistryError;
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AnalysisError {
    /// Control-flow paths end in contexts that can't be reconciled, or an
    /// action sits where its context can't be known statically
    #[error("{template}:{pos}: {message}")]
    AmbiguousContext {
        template: String,
        pos: Pos,
        message: String,
    },

    /// A template called in a context other than the one it was escaped for
    #[error("{template}:{pos}: cannot call {callee:?} in context {context}: already escaped for {previous}")]
    ContextConflict {
        template: String,
        pos: Pos,
        callee: String,
        context: Context,
        previous: Context,
    },

    #[error("{template}:{pos}: {action} appears in unsafe context {context}")]
    UnsafeContext {
        template: String,
        pos: Pos,
        action: String,
        context: Context,
    },

    #[error("{template}: ends in a non-text context: {context}")]
    UnterminatedContext { template: String, context: Context },

    #[error("{template}:{pos}: predefined escaper {name:?} disallowed in template")]
    PredefinedEscaper {
        template: String,
        pos: Pos,
        name: String,
    },

    #[error(transparent)]
    Registry(#[from] RegistryError),
}
