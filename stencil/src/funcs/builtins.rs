//! Built-in functions
//!
//! Built once into [`BUILTINS`] and cloned into every [`FuncMap::new`].

use super::format::sprintf;
use super::{Arity, FuncError, FuncKind, FuncMap, Function};
use crate::value::{MapKey, Value};
use once_cell::sync::Lazy;
use std::cmp::Ordering;
use std::collections::HashMap;

/// The default function table
pub static BUILTINS: Lazy<FuncMap> = Lazy::new(|| {
    let mut funcs = FuncMap {
        funcs: HashMap::new(),
    };
    funcs
        .insert(
            "and",
            Function {
                arity: Arity::at_least(1),
                kind: FuncKind::And,
            },
        )
        .insert(
            "or",
            Function {
                arity: Arity::at_least(1),
                kind: FuncKind::Or,
            },
        )
        .register("not", Arity::exact(1), |args| {
            Ok(Value::Bool(!args[0].is_truthy()))
        })
        .register("eq", Arity::at_least(2), eq)
        .register("ne", Arity::exact(2), |args| {
            Ok(Value::Bool(!equal(&args[0], &args[1])?))
        })
        .register("lt", Arity::exact(2), |args| {
            compare(&args[0], &args[1]).map(|o| Value::Bool(o == Ordering::Less))
        })
        .register("le", Arity::exact(2), |args| {
            compare(&args[0], &args[1]).map(|o| Value::Bool(o != Ordering::Greater))
        })
        .register("gt", Arity::exact(2), |args| {
            compare(&args[0], &args[1]).map(|o| Value::Bool(o == Ordering::Greater))
        })
        .register("ge", Arity::exact(2), |args| {
            compare(&args[0], &args[1]).map(|o| Value::Bool(o != Ordering::Less))
        })
        .register("len", Arity::exact(1), len)
        .register("index", Arity::at_least(1), index)
        .register("slice", Arity::between(1, 3), slice)
        .register("print", Arity::at_least(0), |args| {
            Ok(Value::String(sprint(args)))
        })
        .register("println", Arity::at_least(0), |args| {
            Ok(Value::String(sprintln(args)))
        })
        .register("printf", Arity::at_least(1), |args| {
            Ok(Value::String(sprintf(&args[0].to_text(), &args[1..])))
        })
        .register("html", Arity::at_least(0), |args| {
            Ok(Value::String(html_escape(&joined(args))))
        })
        .register("js", Arity::at_least(0), |args| {
            Ok(Value::String(js_escape(&joined(args))))
        })
        .register("urlquery", Arity::at_least(0), |args| {
            Ok(Value::String(query_escape(&joined(args))))
        });
    funcs
});

/// Names of the built-ins that escape their output.
pub const PREDEFINED_ESCAPERS: &[&str] = &["html", "js", "urlquery"];

fn is_stringish(value: &Value) -> bool {
    matches!(value, Value::String(_) | Value::Safe(_))
}

/// Concatenate operands, adding spaces between operands when neither is a string.
pub fn sprint(args: &[Value]) -> String {
    let mut out = String::new();
    for (i, arg) in args.iter().enumerate() {
        if i > 0 && !is_stringish(arg) && !is_stringish(&args[i - 1]) {
            out.push(' ');
        }
        out.push_str(&arg.to_text());
    }
    out
}

/// Space-separated operands followed by a newline.
pub fn sprintln(args: &[Value]) -> String {
    let parts: Vec<String> = args.iter().map(Value::to_text).collect();
    format!("{}\n", parts.join(" "))
}

fn joined(args: &[Value]) -> String {
    match args {
        [single] => single.to_text(),
        _ => sprint(args),
    }
}

fn eq(args: &[Value]) -> Result<Value, FuncError> {
    let (first, rest) = args
        .split_first()
        .ok_or_else(|| FuncError::failed("missing argument for comparison"))?;
    for other in rest {
        if equal(first, other)? {
            return Ok(Value::Bool(true));
        }
    }
    Ok(Value::Bool(false))
}

fn is_basic(value: &Value) -> bool {
    matches!(
        value,
        Value::Nil | Value::Bool(_) | Value::Int(_) | Value::Float(_) | Value::String(_) | Value::Safe(_)
    )
}

fn equal(left: &Value, right: &Value) -> Result<bool, FuncError> {
    if !is_basic(left) || !is_basic(right) {
        return Err(FuncError::Incomparable {
            left: left.type_name().to_string(),
            right: right.type_name().to_string(),
        });
    }
    Ok(match (left, right) {
        (Value::Safe(a), b) | (b, Value::Safe(a)) => b.to_text() == a.text,
        _ => left == right,
    })
}

fn compare(left: &Value, right: &Value) -> Result<Ordering, FuncError> {
    let ordering = match (left, right) {
        (Value::Int(a), Value::Int(b)) => Some(a.cmp(b)),
        (Value::Int(a), Value::Float(b)) => (*a as f64).partial_cmp(b),
        (Value::Float(a), Value::Int(b)) => a.partial_cmp(&(*b as f64)),
        (Value::Float(a), Value::Float(b)) => a.partial_cmp(b),
        (Value::String(a), Value::String(b)) => Some(a.cmp(b)),
        _ => None,
    };
    ordering.ok_or_else(|| FuncError::Incomparable {
        left: left.type_name().to_string(),
        right: right.type_name().to_string(),
    })
}

fn len(args: &[Value]) -> Result<Value, FuncError> {
    args[0]
        .len()
        .map(Value::from)
        .ok_or_else(|| FuncError::failed(format!("len of {}", args[0].type_name())))
}

fn index_int(value: &Value, position: usize) -> Result<i64, FuncError> {
    match value {
        Value::Int(i) => Ok(*i),
        other => Err(FuncError::invalid_argument(position, "int", other)),
    }
}

fn index(args: &[Value]) -> Result<Value, FuncError> {
    let mut current = args[0].clone();
    for (offset, key) in args[1..].iter().enumerate() {
        current = match &current {
            Value::List(items) => {
                let i = index_int(key, offset + 1)?;
                usize::try_from(i)
                    .ok()
                    .and_then(|i| items.get(i))
                    .cloned()
                    .ok_or(FuncError::IndexOutOfRange {
                        index: i,
                        len: items.len(),
                    })?
            }
            Value::Map(entries) => {
                let key = MapKey::from_value(key)
                    .ok_or_else(|| FuncError::invalid_argument(offset + 1, "map key", key))?;
                entries.get(&key).cloned().unwrap_or_default()
            }
            Value::Object(object) => object.index(key).unwrap_or_default(),
            Value::Nil => return Err(FuncError::failed("index of nil")),
            other => {
                return Err(FuncError::failed(format!(
                    "can't index item of type {}",
                    other.type_name()
                )))
            }
        };
    }
    Ok(current)
}

fn slice(args: &[Value]) -> Result<Value, FuncError> {
    let bound = |position: usize, len: usize| -> Result<usize, FuncError> {
        let i = index_int(&args[position], position)?;
        usize::try_from(i)
            .ok()
            .filter(|i| *i <= len)
            .ok_or(FuncError::IndexOutOfRange { index: i, len })
    };
    let range = |len: usize| -> Result<(usize, usize), FuncError> {
        let start = if args.len() > 1 { bound(1, len)? } else { 0 };
        let end = if args.len() > 2 { bound(2, len)? } else { len };
        if start > end {
            return Err(FuncError::failed(format!(
                "invalid slice index: {} > {}",
                start, end
            )));
        }
        Ok((start, end))
    };

    match &args[0] {
        Value::List(items) => {
            let (start, end) = range(items.len())?;
            Ok(Value::List(items[start..end].to_vec()))
        }
        Value::String(s) => {
            let chars: Vec<char> = s.chars().collect();
            let (start, end) = range(chars.len())?;
            Ok(Value::String(chars[start..end].iter().collect()))
        }
        other => Err(FuncError::failed(format!(
            "can't slice item of type {}",
            other.type_name()
        ))),
    }
}

/// Escape text for HTML, quotes included.
pub fn html_escape(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&#34;"),
            '\'' => out.push_str("&#39;"),
            '\0' => out.push('\u{FFFD}'),
            _ => out.push(c),
        }
    }
    out
}

/// Escape text for embedding in JavaScript.
pub fn js_escape(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '\\' => out.push_str("\\\\"),
            '\'' => out.push_str("\\'"),
            '"' => out.push_str("\\\""),
            '<' => out.push_str("\\u003C"),
            '>' => out.push_str("\\u003E"),
            '&' => out.push_str("\\u0026"),
            '=' => out.push_str("\\u003D"),
            c if c.is_control() => out.push_str(&format!("\\u{:04X}", c as u32)),
            _ => out.push(c),
        }
    }
    out
}

/// Query-string escaping: space becomes `+`, everything but unreserved bytes is percent-encoded.
pub fn query_escape(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for byte in text.bytes() {
        match byte {
            b' ' => out.push('+'),
            b'A'..=b'Z' | b'a'..=b'z' | b'0'..=b'9' | b'-' | b'_' | b'.' | b'~' => {
                out.push(byte as char)
            }
            _ => out.push_str(&format!("%{:02X}", byte)),
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    fn call(name: &str, args: &[Value]) -> Result<Value, FuncError> {
        BUILTINS.get(name).expect("builtin exists").call(args)
    }

    #[rstest]
    #[case("eq", vec![Value::Int(1), Value::Int(2), Value::Int(1)], true)]
    #[case("eq", vec![Value::from("a"), Value::from("b")], false)]
    #[case("ne", vec![Value::Int(1), Value::Float(1.0)], false)]
    #[case("lt", vec![Value::Int(1), Value::Float(1.5)], true)]
    #[case("le", vec![Value::from("a"), Value::from("a")], true)]
    #[case("gt", vec![Value::from("b"), Value::from("a")], true)]
    #[case("ge", vec![Value::Int(1), Value::Int(2)], false)]
    #[case("not", vec![Value::from("")], true)]
    fn test_comparisons(#[case] name: &str, #[case] args: Vec<Value>, #[case] expected: bool) {
        assert_eq!(call(name, &args), Ok(Value::Bool(expected)));
    }

    #[test]
    fn test_lt_incomparable() {
        assert!(matches!(
            call("lt", &[Value::Int(1), Value::from("1")]),
            Err(FuncError::Incomparable { .. })
        ));
    }

    #[test]
    fn test_len() {
        assert_eq!(call("len", &[Value::from("héllo")]), Ok(Value::Int(5)));
        assert_eq!(call("len", &[Value::from(vec![1, 2])]), Ok(Value::Int(2)));
        assert!(call("len", &[Value::Int(3)]).is_err());
    }

    #[test]
    fn test_index() {
        let data = Value::map([("a", Value::from(vec![10, 20, 30]))]);
        assert_eq!(
            call("index", &[data.clone(), Value::from("a"), Value::Int(1)]),
            Ok(Value::Int(20))
        );
        assert_eq!(call("index", &[data.clone(), Value::from("zz")]), Ok(Value::Nil));
        assert_eq!(
            call("index", &[data, Value::from("a"), Value::Int(3)]),
            Err(FuncError::IndexOutOfRange { index: 3, len: 3 })
        );
    }

    #[test]
    fn test_slice() {
        let list = Value::from(vec![1, 2, 3, 4]);
        assert_eq!(
            call("slice", &[list.clone(), Value::Int(1), Value::Int(3)]),
            Ok(Value::from(vec![2, 3]))
        );
        assert_eq!(call("slice", &[Value::from("abc"), Value::Int(1)]), Ok(Value::from("bc")));
        assert!(call("slice", &[list, Value::Int(3), Value::Int(1)]).is_err());
    }

    #[test]
    fn test_print_spacing() {
        assert_eq!(sprint(&[Value::Int(1), Value::Int(2)]), "1 2");
        assert_eq!(sprint(&[Value::from("a"), Value::Int(2)]), "a2");
        assert_eq!(sprintln(&[Value::from("a"), Value::Int(2)]), "a 2\n");
    }

    #[test]
    fn test_escaping_builtins() {
        assert_eq!(
            call("html", &[Value::from("<a href='x'>")]),
            Ok(Value::from("&lt;a href=&#39;x&#39;&gt;"))
        );
        assert_eq!(call("js", &[Value::from("a'b<")]), Ok(Value::from("a\\'b\\u003C")));
        assert_eq!(call("urlquery", &[Value::from("a b&c")]), Ok(Value::from("a+b%26c")));
    }
}
