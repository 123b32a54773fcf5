//! `printf` formatting
//!
//! Supports the verbs templates actually use: `%v %s %d %q %f %e %x %X %t %c %%`,
//! with `-`, `+`, `0` and space flags, a width, and a precision. A verb whose
//! operand has the wrong type renders as `%!d(string=abc)`; missing operands as
//! `%!d(MISSING)`; leftovers are appended as `%!(EXTRA type=value, ...)`.

use crate::value::Value;

#[derive(Debug, Default)]
struct Spec {
    left: bool,
    plus: bool,
    zero: bool,
    space: bool,
    width: Option<usize>,
    precision: Option<usize>,
}

pub fn sprintf(format: &str, args: &[Value]) -> String {
    let mut out = String::with_capacity(format.len());
    let mut chars = format.chars().peekable();
    let mut next_arg = 0;

    while let Some(c) = chars.next() {
        if c != '%' {
            out.push(c);
            continue;
        }

        let mut spec = Spec::default();
        while let Some(&flag) = chars.peek() {
            match flag {
                '-' => spec.left = true,
                '+' => spec.plus = true,
                '0' => spec.zero = true,
                ' ' => spec.space = true,
                _ => break,
            }
            chars.next();
        }
        spec.width = read_number(&mut chars);
        if chars.peek() == Some(&'.') {
            chars.next();
            spec.precision = Some(read_number(&mut chars).unwrap_or(0));
        }

        let Some(verb) = chars.next() else {
            out.push_str("%!(NOVERB)");
            break;
        };
        if verb == '%' {
            out.push('%');
            continue;
        }

        match args.get(next_arg) {
            Some(arg) => {
                let body = format_one(verb, &spec, arg);
                out.push_str(&pad(body, &spec, arg));
            }
            None => out.push_str(&format!("%!{}(MISSING)", verb)),
        }
        next_arg += 1;
    }

    if next_arg < args.len() {
        let extra: Vec<String> = args[next_arg..]
            .iter()
            .map(|arg| format!("{}={}", arg.type_name(), arg.to_text()))
            .collect();
        out.push_str(&format!("%!(EXTRA {})", extra.join(", ")));
    }
    out
}

fn read_number(chars: &mut std::iter::Peekable<std::str::Chars<'_>>) -> Option<usize> {
    let mut number: Option<usize> = None;
    while let Some(digit) = chars.peek().and_then(|c| c.to_digit(10)) {
        number = Some(number.unwrap_or(0) * 10 + digit as usize);
        chars.next();
    }
    number
}

fn bad_verb(verb: char, arg: &Value) -> String {
    format!("%!{}({}={})", verb, arg.type_name(), arg.to_text())
}

fn sign(spec: &Spec, negative: bool) -> &'static str {
    if negative {
        "-"
    } else if spec.plus {
        "+"
    } else if spec.space {
        " "
    } else {
        ""
    }
}

fn format_one(verb: char, spec: &Spec, arg: &Value) -> String {
    match (verb, arg) {
        ('v', _) => arg.to_text(),
        ('s', Value::String(_) | Value::Safe(_)) => truncate(arg.to_text(), spec.precision),
        ('s', _) => arg.to_text(),
        ('t', Value::Bool(b)) => b.to_string(),
        ('d', Value::Int(i)) => format!("{}{}", sign(spec, *i < 0), i.unsigned_abs()),
        ('c', Value::Int(i)) => u32::try_from(*i)
            .ok()
            .and_then(char::from_u32)
            .map(String::from)
            .unwrap_or_else(|| "\u{FFFD}".to_string()),
        ('x', Value::Int(i)) => format!("{}{:x}", sign(spec, *i < 0), i.unsigned_abs()),
        ('X', Value::Int(i)) => format!("{}{:X}", sign(spec, *i < 0), i.unsigned_abs()),
        ('x', Value::String(s)) => s.bytes().map(|b| format!("{:02x}", b)).collect(),
        ('X', Value::String(s)) => s.bytes().map(|b| format!("{:02X}", b)).collect(),
        ('q', Value::String(s)) => quote(s),
        ('q', Value::Safe(safe)) => quote(&safe.text),
        ('f' | 'F', Value::Float(f)) => {
            let precision = spec.precision.unwrap_or(6);
            format!("{}{:.*}", sign(spec, *f < 0.0), precision, f.abs())
        }
        ('e', Value::Float(f)) => {
            let precision = spec.precision.unwrap_or(6);
            format!("{}{}", sign(spec, *f < 0.0), exponent(f.abs(), precision))
        }
        _ => bad_verb(verb, arg),
    }
}

fn truncate(text: String, precision: Option<usize>) -> String {
    match precision {
        Some(n) => text.chars().take(n).collect(),
        None => text,
    }
}

/// Exponent notation with a signed two-digit exponent: `1.500000e+03`.
fn exponent(f: f64, precision: usize) -> String {
    let formatted = format!("{:.*e}", precision, f);
    match formatted.split_once('e') {
        Some((mantissa, exp)) => {
            let (exp_sign, digits) = match exp.strip_prefix('-') {
                Some(digits) => ('-', digits),
                None => ('+', exp),
            };
            format!("{}e{}{:0>2}", mantissa, exp_sign, digits)
        }
        None => formatted,
    }
}

/// Double-quoted string literal with escapes for quotes, backslash and control characters.
pub fn quote(text: &str) -> String {
    let mut out = String::with_capacity(text.len() + 2);
    out.push('"');
    for c in text.chars() {
        match c {
            '"' => out.push_str("\\\""),
            '\\' => out.push_str("\\\\"),
            '\n' => out.push_str("\\n"),
            '\t' => out.push_str("\\t"),
            '\r' => out.push_str("\\r"),
            c if c.is_control() => {
                if (c as u32) < 0x100 {
                    out.push_str(&format!("\\x{:02x}", c as u32));
                } else {
                    out.push_str(&format!("\\u{:04x}", c as u32));
                }
            }
            _ => out.push(c),
        }
    }
    out.push('"');
    out
}

fn pad(body: String, spec: &Spec, arg: &Value) -> String {
    let Some(width) = spec.width else {
        return body;
    };
    let len = body.chars().count();
    if len >= width {
        return body;
    }
    let fill = width - len;
    if spec.left {
        return format!("{}{}", body, " ".repeat(fill));
    }
    let numeric = matches!(arg, Value::Int(_) | Value::Float(_));
    if spec.zero && numeric {
        // Zeros go after the sign
        let (sign, digits) = match body.chars().next() {
            Some(c @ ('-' | '+' | ' ')) => (c.to_string(), body[1..].to_string()),
            _ => (String::new(), body),
        };
        return format!("{}{}{}", sign, "0".repeat(fill), digits);
    }
    format!("{}{}", " ".repeat(fill), body)
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case("%d items", vec![Value::Int(3)], "3 items")]
    #[case("%5d|", vec![Value::Int(42)], "   42|")]
    #[case("%-5d|", vec![Value::Int(42)], "42   |")]
    #[case("%05d", vec![Value::Int(-42)], "-0042")]
    #[case("%+d", vec![Value::Int(7)], "+7")]
    #[case("%.2f", vec![Value::Float(3.14159)], "3.14")]
    #[case("%f", vec![Value::Float(1.5)], "1.500000")]
    #[case("%e", vec![Value::Float(1500.0)], "1.500000e+03")]
    #[case("%x %X", vec![Value::Int(255), Value::Int(255)], "ff FF")]
    #[case("%x", vec![Value::from("hi")], "6869")]
    #[case("%q", vec![Value::from("a\"b\n")], r#""a\"b\n""#)]
    #[case("%t", vec![Value::Bool(true)], "true")]
    #[case("%v and %s", vec![Value::from(vec![1, 2]), Value::from("x")], "[1 2] and x")]
    #[case("%.2s", vec![Value::from("abcdef")], "ab")]
    #[case("100%%", vec![], "100%")]
    #[case("%c", vec![Value::Int(65)], "A")]
    fn test_sprintf(#[case] format: &str, #[case] args: Vec<Value>, #[case] expected: &str) {
        assert_eq!(sprintf(format, &args), expected);
    }

    #[test]
    fn test_wrong_type() {
        assert_eq!(sprintf("%d", &[Value::from("abc")]), "%!d(string=abc)");
    }

    #[test]
    fn test_missing_and_extra() {
        assert_eq!(sprintf("%d %d", &[Value::Int(1)]), "1 %!d(MISSING)");
        assert_eq!(
            sprintf("%d", &[Value::Int(1), Value::from("x")]),
            "1%!(EXTRA string=x)"
        );
    }
}
