//! Function map
//!
//!     A [`FuncMap`] maps identifiers used in actions to callables with a
//!     declared [`Arity`]. The parser consults it to reject unknown names and
//!     wrong argument counts; the executor consults it to call them.
//!
//!     `FuncMap::new()` starts from the built-ins (a lazily built static) and
//!     hosts extend it with [`FuncMap::register`]. Registering a name that
//!     already exists replaces it, built-ins included.
//!
//! Short-circuiting
//!
//!     `and` and `or` are not plain callables: their arguments are evaluated
//!     one at a time by the executor, which stops as soon as the result is
//!     known. They are marked with [`FuncKind::And`] / [`FuncKind::Or`].

pub mod builtins;
pub mod format;

use crate::value::Value;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use thiserror::Error;

/// Signature of a host-provided function
pub type NativeFn = Arc<dyn Fn(&[Value]) -> Result<Value, FuncError> + Send + Sync>;

/// Errors returned by function bodies
#[derive(Debug, Clone, PartialEq, Error)]
pub enum FuncError {
    #[error("{0}")]
    Failed(String),

    #[error("argument {index}: expected {expected}, found {found}")]
    InvalidArgument {
        index: usize,
        expected: String,
        found: String,
    },

    #[error("index {index} out of range for length {len}")]
    IndexOutOfRange { index: i64, len: usize },

    #[error("incompatible types for comparison: {left} and {right}")]
    Incomparable { left: String, right: String },

    #[error("wrong number of arguments: want {expected}, got {found}")]
    WrongArgCount { expected: Arity, found: usize },
}

impl FuncError {
    pub fn failed(message: impl Into<String>) -> Self {
        FuncError::Failed(message.into())
    }

    pub fn invalid_argument(index: usize, expected: &str, found: &Value) -> Self {
        FuncError::InvalidArgument {
            index,
            expected: expected.to_string(),
            found: found.type_name().to_string(),
        }
    }
}

/// Accepted argument count, piped value included
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Arity {
    pub min: usize,
    /// `None` for variadic functions
    pub max: Option<usize>,
}

impl Arity {
    pub fn exact(n: usize) -> Self {
        Arity {
            min: n,
            max: Some(n),
        }
    }

    pub fn at_least(min: usize) -> Self {
        Arity { min, max: None }
    }

    pub fn between(min: usize, max: usize) -> Self {
        Arity {
            min,
            max: Some(max),
        }
    }

    pub fn accepts(&self, count: usize) -> bool {
        count >= self.min && self.max.map_or(true, |max| count <= max)
    }
}

impl fmt::Display for Arity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.max {
            Some(max) if max == self.min => write!(f, "{}", max),
            Some(max) => write!(f, "{} to {}", self.min, max),
            None => write!(f, "at least {}", self.min),
        }
    }
}

#[derive(Clone)]
pub enum FuncKind {
    Native(NativeFn),
    /// Short-circuit logical and
    And,
    /// Short-circuit logical or
    Or,
}

/// A registered function
#[derive(Clone)]
pub struct Function {
    pub arity: Arity,
    pub kind: FuncKind,
}

impl Function {
    pub fn native<F>(arity: Arity, f: F) -> Self
    where
        F: Fn(&[Value]) -> Result<Value, FuncError> + Send + Sync + 'static,
    {
        Function {
            arity,
            kind: FuncKind::Native(Arc::new(f)),
        }
    }

    /// Call with already evaluated arguments. The count is checked against
    /// [`Function::arity`] before the body runs.
    pub fn call(&self, args: &[Value]) -> Result<Value, FuncError> {
        if !self.arity.accepts(args.len()) {
            return Err(FuncError::WrongArgCount {
                expected: self.arity,
                found: args.len(),
            });
        }
        match &self.kind {
            FuncKind::Native(f) => f(args),
            FuncKind::And => Ok(args
                .iter()
                .find(|arg| !arg.is_truthy())
                .or_else(|| args.last())
                .cloned()
                .unwrap_or_default()),
            FuncKind::Or => Ok(args
                .iter()
                .find(|arg| arg.is_truthy())
                .or_else(|| args.last())
                .cloned()
                .unwrap_or_default()),
        }
    }
}

impl fmt::Debug for Function {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let kind = match self.kind {
            FuncKind::Native(_) => "native",
            FuncKind::And => "and",
            FuncKind::Or => "or",
        };
        f.debug_struct("Function")
            .field("arity", &self.arity)
            .field("kind", &kind)
            .finish()
    }
}

/// Name → function table
#[derive(Debug, Clone)]
pub struct FuncMap {
    funcs: HashMap<String, Function>,
}

impl FuncMap {
    /// A map pre-seeded with the built-ins.
    pub fn new() -> Self {
        builtins::BUILTINS.clone()
    }

    /// A map with no functions at all, not even the built-ins.
    pub fn empty() -> Self {
        FuncMap {
            funcs: HashMap::new(),
        }
    }

    /// Add or replace a function.
    pub fn register<F>(&mut self, name: impl Into<String>, arity: Arity, f: F) -> &mut Self
    where
        F: Fn(&[Value]) -> Result<Value, FuncError> + Send + Sync + 'static,
    {
        self.insert(name, Function::native(arity, f))
    }

    pub fn insert(&mut self, name: impl Into<String>, function: Function) -> &mut Self {
        self.funcs.insert(name.into(), function);
        self
    }

    pub fn get(&self, name: &str) -> Option<&Function> {
        self.funcs.get(name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.funcs.contains_key(name)
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.funcs.keys().map(String::as_str)
    }
}

impl Default for FuncMap {
    fn default() -> Self {
        FuncMap::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_arity_accepts() {
        assert!(Arity::exact(2).accepts(2));
        assert!(!Arity::exact(2).accepts(3));
        assert!(Arity::at_least(1).accepts(9));
        assert!(!Arity::at_least(1).accepts(0));
        assert!(Arity::between(1, 3).accepts(3));
        assert!(!Arity::between(1, 3).accepts(4));
    }

    #[test]
    fn test_register_replaces_builtin() {
        let mut funcs = FuncMap::new();
        funcs.register("len", Arity::exact(1), |_| Ok(Value::Int(-1)));
        let len = funcs.get("len").unwrap();
        assert_eq!(len.call(&[Value::from("abc")]), Ok(Value::Int(-1)));
        // The shared built-ins are untouched
        let fresh = FuncMap::new();
        assert_eq!(fresh.get("len").unwrap().call(&[Value::from("abc")]), Ok(Value::Int(3)));
    }

    #[test]
    fn test_empty_map() {
        let funcs = FuncMap::empty();
        assert!(!funcs.contains("print"));
        assert_eq!(funcs.names().count(), 0);
    }

    #[test]
    fn test_and_or_eager_call() {
        let funcs = FuncMap::new();
        let and = funcs.get("and").unwrap();
        let or = funcs.get("or").unwrap();
        assert_eq!(and.call(&[Value::Int(1), Value::Int(0), Value::Int(2)]), Ok(Value::Int(0)));
        assert_eq!(and.call(&[Value::Int(1), Value::Int(2)]), Ok(Value::Int(2)));
        assert_eq!(or.call(&[Value::Int(0), Value::from("x")]), Ok(Value::from("x")));
        assert_eq!(or.call(&[Value::Int(0), Value::Nil]), Ok(Value::Nil));
    }

    #[test]
    fn test_call_checks_arity_before_the_body() {
        let funcs = FuncMap::new();
        let not = funcs.get("not").unwrap();
        assert_eq!(
            not.call(&[]),
            Err(FuncError::WrongArgCount {
                expected: Arity::exact(1),
                found: 0
            })
        );
        let index = funcs.get("index").unwrap();
        assert!(matches!(index.call(&[]), Err(FuncError::WrongArgCount { found: 0, .. })));
        assert_eq!(
            funcs.get("and").unwrap().call(&[]).unwrap_err().to_string(),
            "wrong number of arguments: want at least 1, got 0"
        );
    }
}
