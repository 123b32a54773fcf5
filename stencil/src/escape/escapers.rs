//! Escaper stages
//!
//! Each [`Escaper`] turns a value into text that is inert in one context. A
//! [`SafeString`](crate::value::SafeString) of the kind an escaper vouches for
//! passes through that escaper untouched; any other value is escaped from its
//! printed form.

use crate::value::{ContentKind, Value};
use std::fmt::Write;

/// Replacement emitted when a value is rejected outright
pub const UNSAFE_MARKER: &str = "ZunsafeZ";

/// Replacement for URLs with a disallowed scheme
pub const UNSAFE_URL: &str = "about:invalid#ZunsafeZ";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Escaper {
    Html,
    RcData,
    Attr,
    UnquotedAttr,
    UrlFilter,
    UrlNormalizer,
    UrlEscaper,
    JsVal,
    JsStr,
    JsRegexp,
    CssValueFilter,
    CssEscaper,
}

impl Escaper {
    pub fn name(self) -> &'static str {
        match self {
            Escaper::Html => "html",
            Escaper::RcData => "rcdata",
            Escaper::Attr => "attr",
            Escaper::UnquotedAttr => "unquoted_attr",
            Escaper::UrlFilter => "url_filter",
            Escaper::UrlNormalizer => "url_normalizer",
            Escaper::UrlEscaper => "url_escaper",
            Escaper::JsVal => "js_value",
            Escaper::JsStr => "js_string",
            Escaper::JsRegexp => "js_regexp",
            Escaper::CssValueFilter => "css_value_filter",
            Escaper::CssEscaper => "css_string",
        }
    }

    pub fn apply(self, value: &Value) -> Value {
        let safe_kind = match value {
            Value::Safe(safe) => Some(safe.kind),
            _ => None,
        };
        let text = value.to_text();
        let out = match self {
            Escaper::Html if safe_kind == Some(ContentKind::Html) => return value.clone(),
            Escaper::Html | Escaper::RcData => escape_html(&text, false),
            Escaper::Attr => match safe_kind {
                Some(ContentKind::HtmlAttr) => return value.clone(),
                Some(ContentKind::Html) => escape_attr(&strip_tags(&text), true),
                _ => escape_attr(&text, false),
            },
            Escaper::UnquotedAttr => match safe_kind {
                Some(ContentKind::Html) => escape_unquoted_attr(&strip_tags(&text), true),
                _ => escape_unquoted_attr(&text, false),
            },
            Escaper::UrlFilter => match safe_kind {
                Some(ContentKind::Url) => return value.clone(),
                _ => filter_url(&text),
            },
            Escaper::UrlNormalizer => process_url(&text, true),
            // Safe URLs are already encoded; only normalize them
            Escaper::UrlEscaper => process_url(&text, safe_kind == Some(ContentKind::Url)),
            Escaper::JsVal => match safe_kind {
                Some(ContentKind::Js) => return value.clone(),
                Some(ContentKind::JsStr) => format!("\"{}\"", text),
                _ => js_value(value),
            },
            Escaper::JsStr => match safe_kind {
                Some(ContentKind::JsStr) => return value.clone(),
                _ => escape_js_string(&text),
            },
            Escaper::JsRegexp => escape_js_regexp(&text),
            Escaper::CssValueFilter => match safe_kind {
                Some(ContentKind::Css) => return value.clone(),
                _ => filter_css_value(&text),
            },
            Escaper::CssEscaper => escape_css_string(&text),
        };
        Value::String(out)
    }
}

fn escape_html(text: &str, keep_entities: bool) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '&' if !keep_entities => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '\0' => out.push('\u{FFFD}'),
            _ => out.push(c),
        }
    }
    out
}

fn escape_attr(text: &str, keep_entities: bool) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '"' => out.push_str("&#34;"),
            '\'' => out.push_str("&#39;"),
            '&' if !keep_entities => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '\0' => out.push('\u{FFFD}'),
            _ => out.push(c),
        }
    }
    out
}

fn escape_unquoted_attr(text: &str, keep_entities: bool) -> String {
    // An empty unquoted value would swallow the next attribute
    if text.is_empty() {
        return UNSAFE_MARKER.to_string();
    }
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '&' if keep_entities => out.push('&'),
            '\t' | '\n' | '\x0b' | '\x0c' | '\r' | ' ' | '"' | '&' | '\'' | '+' | '<' | '='
            | '>' | '`' => {
                let _ = write!(out, "&#{};", c as u32);
            }
            '\0' => out.push('\u{FFFD}'),
            _ => out.push(c),
        }
    }
    out
}

/// Drop markup from an HTML fragment, keeping its text.
fn strip_tags(html: &str) -> String {
    let mut out = String::with_capacity(html.len());
    let mut chars = html.chars().peekable();
    while let Some(c) = chars.next() {
        let starts_tag = c == '<'
            && chars
                .peek()
                .is_some_and(|next| next.is_ascii_alphabetic() || matches!(next, '/' | '!'));
        if !starts_tag {
            out.push(c);
            continue;
        }
        let mut quote = None;
        for inner in chars.by_ref() {
            match quote {
                Some(q) if inner == q => quote = None,
                Some(_) => {}
                None if inner == '"' || inner == '\'' => quote = Some(inner),
                None if inner == '>' => break,
                None => {}
            }
        }
    }
    out
}

fn filter_url(text: &str) -> String {
    if let Some(colon) = text.find(':') {
        if !text[..colon].contains('/') {
            let scheme = text[..colon].to_ascii_lowercase();
            if !matches!(scheme.as_str(), "http" | "https" | "mailto") {
                return UNSAFE_URL.to_string();
            }
        }
    }
    text.to_string()
}

/// Percent-encode a URL. When normalizing, reserved characters and valid
/// `%XX` escapes are kept; otherwise only unreserved characters are.
fn process_url(text: &str, normalize: bool) -> String {
    let bytes = text.as_bytes();
    let mut out = String::with_capacity(text.len());
    for (i, &b) in bytes.iter().enumerate() {
        let keep = match b {
            b'A'..=b'Z' | b'a'..=b'z' | b'0'..=b'9' | b'-' | b'.' | b'_' | b'~' => true,
            b'!' | b'#' | b'$' | b'&' | b'*' | b'+' | b',' | b'/' | b':' | b';' | b'=' | b'?'
            | b'@' | b'[' | b']' => normalize,
            b'%' => {
                normalize
                    && bytes.get(i + 1).is_some_and(u8::is_ascii_hexdigit)
                    && bytes.get(i + 2).is_some_and(u8::is_ascii_hexdigit)
            }
            _ => false,
        };
        if keep {
            out.push(b as char);
        } else {
            let _ = write!(out, "%{:02X}", b);
        }
    }
    out
}

fn is_js_ident_part(c: char) -> bool {
    c.is_alphanumeric() || c == '_' || c == '$'
}

fn js_value(value: &Value) -> String {
    let json = serde_json::to_string(value).unwrap_or_else(|_| "null".to_string());
    let mut out = String::with_capacity(json.len() + 2);
    for c in json.chars() {
        match c {
            '<' => out.push_str("\\u003c"),
            '>' => out.push_str("\\u003e"),
            '&' => out.push_str("\\u0026"),
            '\'' => out.push_str("\\u0027"),
            '\u{2028}' => out.push_str("\\u2028"),
            '\u{2029}' => out.push_str("\\u2029"),
            _ => out.push(c),
        }
    }
    // Keep identifiers and numbers from running into adjacent keywords
    let pad = out.chars().next().is_some_and(is_js_ident_part)
        || out.chars().last().is_some_and(is_js_ident_part);
    if pad {
        format!(" {} ", out)
    } else {
        out
    }
}

fn escape_js_string(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
        push_js_string_char(&mut out, c);
    }
    out
}

fn push_js_string_char(out: &mut String, c: char) {
    match c {
        '\\' => out.push_str("\\\\"),
        '\t' => out.push_str("\\t"),
        '\n' => out.push_str("\\n"),
        '\r' => out.push_str("\\r"),
        '\x0c' => out.push_str("\\f"),
        '/' => out.push_str("\\/"),
        '"' | '\'' | '`' | '&' | '+' | '<' | '>' | '\u{2028}' | '\u{2029}' => {
            let _ = write!(out, "\\u{:04x}", c as u32);
        }
        c if (c as u32) < 0x20 || c == '\x7f' => {
            let _ = write!(out, "\\u{:04x}", c as u32);
        }
        _ => out.push(c),
    }
}

/// Like a JS string, with regex operators escaped so the value only ever
/// matches itself.
fn escape_js_regexp(text: &str) -> String {
    // An empty body would turn `/{{.}}/` into a line comment
    if text.is_empty() {
        return "(?:)".to_string();
    }
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '$' | '(' | ')' | '*' | '+' | '-' | '.' | '?' | '[' | ']' | '^' | '{' | '|' | '}' => {
                out.push('\\');
                out.push(c);
            }
            _ => push_js_string_char(&mut out, c),
        }
    }
    out
}

fn filter_css_value(text: &str) -> String {
    let allowed = text
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || matches!(c, ' ' | '#' | '%' | '+' | ',' | '.' | '!' | '_' | '-'));
    let lower = text.to_ascii_lowercase();
    if !allowed || lower.contains("expression") || lower.contains("mozbinding") {
        return UNSAFE_MARKER.to_string();
    }
    text.to_string()
}

fn escape_css_string(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    let mut chars = text.chars().peekable();
    while let Some(c) = chars.next() {
        if c.is_alphanumeric() || c == ' ' {
            out.push(c);
            continue;
        }
        let _ = write!(out, "\\{:x}", c as u32);
        // A following hex digit or space would be read as part of the escape
        if chars.peek().is_some_and(|next| next.is_ascii_hexdigit() || *next == ' ') {
            out.push(' ');
        }
    }
    out
}
