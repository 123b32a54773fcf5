//! Runtime values
//!
//! Templates are evaluated against [`Value`]s. Plain data (JSON, anything
//! `Serialize`) converts structurally; host types that need live fields or
//! methods implement [`Object`] and travel as `Value::Object`.
//!
//! Map iteration order is part of the contract: keys ascend, booleans sort
//! before integers, integers before strings, integers numerically and strings
//! by byte order. `range` over a map always follows this order.

pub mod convert;
pub mod object;

pub use object::Object;

/// Lazily produced `(key, element)` pairs for `range`
pub type Entries<'a> = Box<dyn Iterator<Item = (Value, Value)> + 'a>;

use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

/// Which output context a [`SafeString`] has been vetted for
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ContentKind {
    /// A fragment of well-formed HTML
    Html,
    /// One or more complete `name="value"` attribute pairs or an attribute value
    HtmlAttr,
    /// A URL that may be emitted without scheme filtering
    Url,
    /// A JavaScript expression
    Js,
    /// The inside of a JavaScript string literal
    JsStr,
    /// A CSS value or declaration list
    Css,
}

impl fmt::Display for ContentKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ContentKind::Html => "html",
            ContentKind::HtmlAttr => "html_attr",
            ContentKind::Url => "url",
            ContentKind::Js => "js",
            ContentKind::JsStr => "js_str",
            ContentKind::Css => "css",
        };
        f.write_str(name)
    }
}

/// Content pre-declared safe for one output context.
///
/// The escaper for the matching context passes it through unchanged. In any
/// other context it is escaped like plain text.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct SafeString {
    pub kind: ContentKind,
    pub text: String,
}

impl SafeString {
    pub fn new(kind: ContentKind, text: impl Into<String>) -> Self {
        SafeString {
            kind,
            text: text.into(),
        }
    }

    pub fn html(text: impl Into<String>) -> Self {
        SafeString::new(ContentKind::Html, text)
    }

    pub fn html_attr(text: impl Into<String>) -> Self {
        SafeString::new(ContentKind::HtmlAttr, text)
    }

    pub fn url(text: impl Into<String>) -> Self {
        SafeString::new(ContentKind::Url, text)
    }

    pub fn js(text: impl Into<String>) -> Self {
        SafeString::new(ContentKind::Js, text)
    }

    pub fn js_str(text: impl Into<String>) -> Self {
        SafeString::new(ContentKind::JsStr, text)
    }

    pub fn css(text: impl Into<String>) -> Self {
        SafeString::new(ContentKind::Css, text)
    }
}

/// Map keys, ordered as documented at the module level
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum MapKey {
    Bool(bool),
    Int(i64),
    String(String),
}

impl MapKey {
    pub fn to_value(&self) -> Value {
        match self {
            MapKey::Bool(b) => Value::Bool(*b),
            MapKey::Int(i) => Value::Int(*i),
            MapKey::String(s) => Value::String(s.clone()),
        }
    }

    /// Convert a value used as an index into a key; floats and containers can't be keys.
    pub fn from_value(value: &Value) -> Option<MapKey> {
        match value {
            Value::Bool(b) => Some(MapKey::Bool(*b)),
            Value::Int(i) => Some(MapKey::Int(*i)),
            Value::String(s) => Some(MapKey::String(s.clone())),
            Value::Safe(safe) => Some(MapKey::String(safe.text.clone())),
            _ => None,
        }
    }
}

impl fmt::Display for MapKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MapKey::Bool(b) => write!(f, "{}", b),
            MapKey::Int(i) => write!(f, "{}", i),
            MapKey::String(s) => f.write_str(s),
        }
    }
}

/// A value flowing through template evaluation
#[derive(Debug, Clone, Default)]
pub enum Value {
    #[default]
    Nil,
    Bool(bool),
    Int(i64),
    Float(f64),
    String(String),
    List(Vec<Value>),
    Map(BTreeMap<MapKey, Value>),
    Safe(SafeString),
    Object(Arc<dyn Object>),
}

impl PartialEq for Value {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Value::Nil, Value::Nil) => true,
            (Value::Bool(a), Value::Bool(b)) => a == b,
            (Value::Int(a), Value::Int(b)) => a == b,
            (Value::Float(a), Value::Float(b)) => a == b,
            (Value::Int(a), Value::Float(b)) | (Value::Float(b), Value::Int(a)) => {
                (*a as f64) == *b
            }
            (Value::String(a), Value::String(b)) => a == b,
            (Value::List(a), Value::List(b)) => a == b,
            (Value::Map(a), Value::Map(b)) => a == b,
            (Value::Safe(a), Value::Safe(b)) => a == b,
            (Value::Object(a), Value::Object(b)) => Arc::ptr_eq(a, b),
            _ => false,
        }
    }
}

impl Value {
    /// Truthiness used by `if`, `with`, `and`, `or` and `not`.
    ///
    /// Nil, false, zero numbers and empty strings/containers are false.
    pub fn is_truthy(&self) -> bool {
        match self {
            Value::Nil => false,
            Value::Bool(b) => *b,
            Value::Int(i) => *i != 0,
            Value::Float(f) => *f != 0.0,
            Value::String(s) => !s.is_empty(),
            Value::List(items) => !items.is_empty(),
            Value::Map(entries) => !entries.is_empty(),
            Value::Safe(safe) => !safe.text.is_empty(),
            Value::Object(object) => object.is_truthy(),
        }
    }

    pub fn is_nil(&self) -> bool {
        matches!(self, Value::Nil)
    }

    pub fn type_name(&self) -> &str {
        match self {
            Value::Nil => "nil",
            Value::Bool(_) => "bool",
            Value::Int(_) => "int",
            Value::Float(_) => "float",
            Value::String(_) => "string",
            Value::List(_) => "list",
            Value::Map(_) => "map",
            Value::Safe(_) => "safe string",
            Value::Object(object) => object.type_name(),
        }
    }

    /// The string form written to the output when no escaping applies.
    pub fn to_text(&self) -> String {
        match self {
            Value::Nil => String::new(),
            Value::Bool(b) => b.to_string(),
            Value::Int(i) => i.to_string(),
            Value::Float(f) => float_to_text(*f),
            Value::String(s) => s.clone(),
            Value::List(items) => {
                let parts: Vec<String> = items.iter().map(Value::to_text).collect();
                format!("[{}]", parts.join(" "))
            }
            Value::Map(entries) => {
                let parts: Vec<String> = entries
                    .iter()
                    .map(|(k, v)| format!("{}:{}", k, v.to_text()))
                    .collect();
                format!("map[{}]", parts.join(" "))
            }
            Value::Safe(safe) => safe.text.clone(),
            Value::Object(object) => object.render(),
        }
    }

    /// Number of elements, for `len` and `slice`.
    pub fn len(&self) -> Option<usize> {
        match self {
            Value::String(s) => Some(s.chars().count()),
            Value::Safe(safe) => Some(safe.text.chars().count()),
            Value::List(items) => Some(items.len()),
            Value::Map(entries) => Some(entries.len()),
            Value::Object(object) => object.len(),
            _ => None,
        }
    }

    /// Key/element pairs in iteration order, or `None` if the value can't be ranged over.
    ///
    /// Pairs are produced on demand, so ranging over a large integer or
    /// breaking out early never materializes the whole sequence.
    pub fn entries(&self) -> Option<Entries<'_>> {
        match self {
            Value::Nil => Some(Box::new(std::iter::empty())),
            Value::List(items) => Some(Box::new(
                items
                    .iter()
                    .enumerate()
                    .map(|(i, item)| (Value::Int(i as i64), item.clone())),
            )),
            Value::Map(entries) => Some(Box::new(
                entries.iter().map(|(k, v)| (k.to_value(), v.clone())),
            )),
            Value::Int(n) => Some(Box::new((0..*n).map(|i| (Value::Int(i), Value::Int(i))))),
            Value::Object(object) => object.entries(),
            _ => None,
        }
    }

    /// Build a map value from string-keyed pairs.
    pub fn map<K, V, I>(pairs: I) -> Value
    where
        K: Into<MapKey>,
        V: Into<Value>,
        I: IntoIterator<Item = (K, V)>,
    {
        Value::Map(
            pairs
                .into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        )
    }

    pub fn object(object: impl Object + 'static) -> Value {
        Value::Object(Arc::new(object))
    }
}

fn float_to_text(f: f64) -> String {
    if f.is_nan() {
        "NaN".to_string()
    } else if f.is_infinite() {
        if f > 0.0 { "+Inf" } else { "-Inf" }.to_string()
    } else {
        f.to_string()
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_text())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_truthiness() {
        assert!(!Value::Nil.is_truthy());
        assert!(!Value::Int(0).is_truthy());
        assert!(!Value::String(String::new()).is_truthy());
        assert!(!Value::List(vec![]).is_truthy());
        assert!(!Value::Map(BTreeMap::new()).is_truthy());
        assert!(Value::Int(-1).is_truthy());
        assert!(Value::from("x").is_truthy());
        assert!(Value::List(vec![Value::Nil]).is_truthy());
    }

    #[test]
    fn test_map_key_order() {
        let value = Value::map([
            (MapKey::String("b".into()), 1),
            (MapKey::Int(10), 2),
            (MapKey::Int(2), 3),
            (MapKey::Bool(true), 4),
        ]);
        let keys: Vec<Value> = value.entries().unwrap().map(|(k, _)| k).collect();
        assert_eq!(
            keys,
            vec![
                Value::Bool(true),
                Value::Int(2),
                Value::Int(10),
                Value::from("b")
            ]
        );
    }

    #[test]
    fn test_to_text() {
        assert_eq!(Value::Nil.to_text(), "");
        assert_eq!(Value::Float(2.5).to_text(), "2.5");
        assert_eq!(Value::Float(3.0).to_text(), "3");
        assert_eq!(
            Value::List(vec![Value::Int(1), Value::from("a")]).to_text(),
            "[1 a]"
        );
        assert_eq!(Value::map([("a", 1), ("b", 2)]).to_text(), "map[a:1 b:2]");
    }

    #[test]
    fn test_range_over_int() {
        let entries: Vec<_> = Value::Int(3).entries().unwrap().collect();
        assert_eq!(entries.len(), 3);
        assert_eq!(entries[2], (Value::Int(2), Value::Int(2)));
        assert_eq!(Value::Int(-4).entries().unwrap().count(), 0);

        let mut huge = Value::Int(i64::MAX).entries().unwrap();
        assert_eq!(huge.next(), Some((Value::Int(0), Value::Int(0))));
        assert_eq!(huge.nth(9), Some((Value::Int(10), Value::Int(10))));
    }

    #[test]
    fn test_int_float_equality() {
        assert_eq!(Value::Int(2), Value::Float(2.0));
        assert_ne!(Value::Int(2), Value::from("2"));
    }
}
