//! Host objects
//!
//! Data that isn't plain JSON-like structure implements [`Object`]. Every
//! method has a default, so an implementation only provides what its type
//! actually supports: fields, methods, indexing, iteration.

use super::{Entries, Value};
use crate::funcs::FuncError;
use std::fmt;

/// A host value with dynamically resolved fields and methods.
///
/// Implementations must be `Send + Sync`: template sets are rendered from
/// many threads at once with the same data.
pub trait Object: fmt::Debug + Send + Sync {
    fn type_name(&self) -> &str;

    /// `.Name` access. `None` means the field doesn't exist.
    fn field(&self, _name: &str) -> Option<Value> {
        None
    }

    /// `.Name arg...` invocation. `None` means the method doesn't exist.
    fn call_method(&self, _name: &str, _args: &[Value]) -> Option<Result<Value, FuncError>> {
        None
    }

    /// Whether `call_method` accepts `name`. Lets field chains tell a
    /// zero-argument method apart from a missing member without calling it.
    fn has_method(&self, _name: &str) -> bool {
        false
    }

    /// The `index` built-in.
    fn index(&self, _key: &Value) -> Option<Value> {
        None
    }

    /// Key/element pairs for `range`, or `None` when not iterable.
    fn entries(&self) -> Option<Entries<'_>> {
        None
    }

    fn len(&self) -> Option<usize> {
        None
    }

    fn is_truthy(&self) -> bool {
        true
    }

    fn render(&self) -> String {
        format!("<{}>", self.type_name())
    }
}
