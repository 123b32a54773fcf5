//! Context transitions over literal text
//!
//!     [`advance`] feeds a text node through a reduced HTML tokenizer and
//!     returns the context at its end. Each state has a transition function
//!     that consumes a prefix of its input and reports the next context; the
//!     driver loops until the text is used up.
//!
//! Attribute Values
//!
//!     While a delimiter is active, only the text up to the closing quote (or,
//!     for unquoted values, whitespace or `>`) belongs to the value. That part
//!     is run through the value's own state (URL, JS, CSS or plain) and the
//!     delimiter itself returns the context to `Tag`.
//!
//! Raw Text Elements
//!
//!     Inside `<script>`, `<style>`, `<textarea>` and `<title>` only the
//!     matching end tag (compared case-insensitively) leaves the element. It
//!     does so whatever the inner JS or CSS state is, the way browsers do.
//!
//! Slashes in JS
//!
//!     A `/` in script code either divides or opens a regular expression
//!     literal, depending on the token before it. The context carries that
//!     answer ([`JsCtx`]) from one token to the next and across actions, which
//!     always leave an operand behind. When branches disagree the answer is
//!     unknown, and a `/` met in that state is an [`AmbiguousSlash`].
//!
//! Limitations
//!
//!     Entities inside attribute values aren't decoded before the value's own
//!     rules run. A regex character class is only recognized within one text
//!     node.

use super::context::{attr_start_state, Attr, Context, Delim, Element, JsCtx, State, UrlPart};

const WHITESPACE: [char; 5] = [' ', '\t', '\n', '\x0c', '\r'];

/// A `/` in JS code whose meaning depends on which branch ran before it
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AmbiguousSlash {
    /// Byte offset of the `/` within the text
    pub offset: usize,
}

/// Context after `text` when it starts in `ctx`.
pub fn advance(mut ctx: Context, text: &str) -> Result<Context, AmbiguousSlash> {
    let mut rest = text;
    while !rest.is_empty() {
        let offset = text.len() - rest.len();
        let (next, consumed) = step(ctx, rest).map_err(|at| AmbiguousSlash { offset: offset + at })?;
        if consumed == 0 && next == ctx {
            break;
        }
        ctx = next;
        rest = &rest[consumed..];
    }
    Ok(ctx)
}

/// One transition. Errors carry the offset of an ambiguous `/` in `s`.
type Step = Result<(Context, usize), usize>;

fn step(ctx: Context, s: &str) -> Step {
    if ctx.delim == Delim::None {
        let end = special_tag_end(ctx, s);
        if end == 0 {
            return Ok((Context::default(), 0));
        }
        return transition(ctx, &s[..end]);
    }

    let Some(i) = s.find(ctx.delim.end_chars()) else {
        let mut inner = ctx;
        let mut rest = s;
        while !rest.is_empty() {
            let offset = s.len() - rest.len();
            let (next, consumed) = transition(inner, rest).map_err(|at| offset + at)?;
            if consumed == 0 && next == inner {
                break;
            }
            inner = next;
            rest = &rest[consumed..];
        }
        return Ok((inner, s.len()));
    };

    let consumed = if ctx.delim == Delim::SpaceOrTagEnd { i } else { i + 1 };
    Ok((
        Context {
            state: State::Tag,
            element: ctx.element,
            ..Context::default()
        },
        consumed,
    ))
}

fn is_element_content(state: State) -> bool {
    matches!(
        state,
        State::Js
            | State::JsDqStr
            | State::JsSqStr
            | State::JsTmplLit
            | State::JsRegexp
            | State::JsLineComment
            | State::JsBlockComment
            | State::Css
            | State::CssDqStr
            | State::CssSqStr
            | State::CssComment
            | State::RcData
    )
}

/// Offset of the end tag closing the current raw text element, or `s.len()`.
fn special_tag_end(ctx: Context, s: &str) -> usize {
    if ctx.element == Element::None || !is_element_content(ctx.state) {
        return s.len();
    }
    index_tag_end(s, ctx.element.tag_name()).unwrap_or(s.len())
}

fn index_tag_end(s: &str, tag: &str) -> Option<usize> {
    let bytes = s.as_bytes();
    let mut from = 0;
    while let Some(rel) = s[from..].find("</") {
        let start = from + rel;
        let name_start = start + 2;
        let name_end = name_start + tag.len();
        if name_end <= bytes.len() && bytes[name_start..name_end].eq_ignore_ascii_case(tag.as_bytes()) {
            match bytes.get(name_end) {
                Some(b'>' | b' ' | b'\t' | b'\n' | b'\x0c' | b'\r' | b'/') | None => return Some(start),
                _ => {}
            }
        }
        from = name_start;
    }
    None
}

fn transition(ctx: Context, s: &str) -> Step {
    let next = match ctx.state {
        State::Text => t_text(ctx, s),
        State::TagOpen => t_tag_open(s, false),
        State::EndTagOpen => t_tag_open(s, true),
        State::Tag => t_tag(ctx, s),
        State::AttrName => t_attr_name(ctx, s),
        State::AfterName => t_after_name(ctx, s),
        State::BeforeValue => t_before_value(ctx, s),
        State::Attr | State::RcData => (ctx, s.len()),
        State::Url => t_url(ctx, s),
        State::Js => t_js(ctx, s)?,
        State::JsDqStr => t_delimited(ctx, s, '"', State::Js),
        State::JsSqStr => t_delimited(ctx, s, '\'', State::Js),
        State::JsTmplLit => t_delimited(ctx, s, '`', State::Js),
        State::JsRegexp => t_js_regexp(ctx, s),
        State::JsLineComment => t_line_comment(ctx, s),
        State::JsBlockComment => t_block_comment(ctx, s, State::Js),
        State::Css => t_css(ctx, s),
        State::CssDqStr => t_delimited(ctx, s, '"', State::Css),
        State::CssSqStr => t_delimited(ctx, s, '\'', State::Css),
        State::CssComment => t_block_comment(ctx, s, State::Css),
        State::HtmlComment => t_html_comment(ctx, s),
    };
    Ok(next)
}

fn t_text(ctx: Context, s: &str) -> (Context, usize) {
    let bytes = s.as_bytes();
    let mut from = 0;
    loop {
        let Some(rel) = s[from..].find('<') else {
            return (ctx, s.len());
        };
        let open = from + rel;
        if s[open..].starts_with("<!--") {
            return (Context::new(State::HtmlComment), open + 4);
        }
        let mut name = open + 1;
        if name == bytes.len() {
            return (Context::new(State::TagOpen), s.len());
        }
        let closing = bytes[name] == b'/';
        if closing {
            name += 1;
            if name == bytes.len() {
                return (Context::new(State::EndTagOpen), s.len());
            }
        }
        let (name_end, element) = eat_tag_name(s, name);
        if name_end != name {
            return (tag_context(element, closing), name_end);
        }
        from = name;
    }
}

fn tag_context(element: Element, closing: bool) -> Context {
    Context {
        state: State::Tag,
        element: if closing { Element::None } else { element },
        ..Context::default()
    }
}

/// Text following a `<` or `</` that ended the previous text node.
fn t_tag_open(s: &str, closing: bool) -> (Context, usize) {
    let (name_end, element) = eat_tag_name(s, 0);
    if name_end == 0 {
        // The `<` was literal text after all
        return (Context::default(), 0);
    }
    (tag_context(element, closing), name_end)
}

fn eat_tag_name(s: &str, start: usize) -> (usize, Element) {
    let bytes = s.as_bytes();
    if !bytes.get(start).is_some_and(u8::is_ascii_alphabetic) {
        return (start, Element::None);
    }
    let mut end = start + 1;
    while end < bytes.len() {
        let b = bytes[end];
        if b.is_ascii_alphanumeric() {
            end += 1;
        } else if (b == b':' || b == b'-')
            && bytes.get(end + 1).is_some_and(u8::is_ascii_alphanumeric)
        {
            end += 2;
        } else {
            break;
        }
    }
    (end, Element::from_tag(&s[start..end]))
}

fn eat_whitespace(s: &str, start: usize) -> usize {
    s[start..]
        .find(|c: char| !WHITESPACE.contains(&c))
        .map_or(s.len(), |i| start + i)
}

fn eat_attr_name(s: &str, start: usize) -> usize {
    s[start..]
        .find(|c: char| WHITESPACE.contains(&c) || matches!(c, '=' | '>' | '/'))
        .map_or(s.len(), |i| start + i)
}

const URL_ATTRS: &[&str] = &[
    "action",
    "background",
    "cite",
    "codebase",
    "data",
    "formaction",
    "href",
    "icon",
    "longdesc",
    "manifest",
    "poster",
    "profile",
    "src",
    "srcset",
    "usemap",
    "xmlns",
];

/// Classify an attribute by its lowercased name.
pub fn attr_type(name: &str) -> Attr {
    let name = name.strip_prefix("data-").unwrap_or(name);
    if name.starts_with("xmlns:") {
        return Attr::Url;
    }
    // Drop a namespace prefix such as `xlink:`
    let local = name.split_once(':').map_or(name, |(_, local)| local);
    if local == "style" {
        Attr::Style
    } else if URL_ATTRS.contains(&local) {
        Attr::Url
    } else if local.starts_with("on") {
        Attr::Script
    } else if local.contains("src") || local.contains("uri") || local.contains("url") {
        Attr::Url
    } else {
        Attr::Normal
    }
}

fn t_tag(ctx: Context, s: &str) -> (Context, usize) {
    let i = eat_whitespace(s, 0);
    let Some(next) = s[i..].chars().next() else {
        return (ctx, s.len());
    };
    match next {
        '>' => (
            Context {
                state: ctx.element.content_state(),
                element: ctx.element,
                ..Context::default()
            },
            i + 1,
        ),
        '/' => (ctx, i + 1),
        _ => {
            let end = eat_attr_name(s, i).max(i + next.len_utf8());
            let attr = attr_type(&s[i..end].to_ascii_lowercase());
            let state = if end == s.len() {
                State::AttrName
            } else {
                State::AfterName
            };
            (
                Context {
                    state,
                    attr,
                    element: ctx.element,
                    ..Context::default()
                },
                end,
            )
        }
    }
}

fn t_attr_name(ctx: Context, s: &str) -> (Context, usize) {
    let end = eat_attr_name(s, 0);
    if end == s.len() {
        return (ctx, s.len());
    }
    (
        Context {
            state: State::AfterName,
            ..ctx
        },
        end,
    )
}

fn t_after_name(ctx: Context, s: &str) -> (Context, usize) {
    let i = eat_whitespace(s, 0);
    if i == s.len() {
        return (ctx, s.len());
    }
    if !s[i..].starts_with('=') {
        // A valueless attribute
        return (
            Context {
                state: State::Tag,
                attr: Attr::None,
                ..ctx
            },
            i,
        );
    }
    (
        Context {
            state: State::BeforeValue,
            ..ctx
        },
        i + 1,
    )
}

fn t_before_value(ctx: Context, s: &str) -> (Context, usize) {
    let i = eat_whitespace(s, 0);
    if i == s.len() {
        return (ctx, s.len());
    }
    let (delim, start) = match s.as_bytes()[i] {
        b'"' => (Delim::DoubleQuote, i + 1),
        b'\'' => (Delim::SingleQuote, i + 1),
        _ => (Delim::SpaceOrTagEnd, i),
    };
    (
        Context {
            state: attr_start_state(ctx.attr),
            delim,
            url_part: UrlPart::None,
            ..ctx
        },
        start,
    )
}

fn t_url(mut ctx: Context, s: &str) -> (Context, usize) {
    if s.contains(['?', '#']) {
        ctx.url_part = UrlPart::QueryOrFragment;
    } else if ctx.url_part == UrlPart::None && !s.trim_matches(&WHITESPACE[..]).is_empty() {
        ctx.url_part = UrlPart::PreQuery;
    }
    (ctx, s.len())
}

fn t_js(ctx: Context, s: &str) -> Step {
    let Some(i) = s.find(['"', '\'', '`', '/']) else {
        let js_ctx = next_js_ctx(s, ctx.js_ctx);
        return Ok((Context { js_ctx, ..ctx }, s.len()));
    };
    let js_ctx = next_js_ctx(&s[..i], ctx.js_ctx);
    let enter = |state| Context {
        state,
        js_ctx: JsCtx::Regexp,
        ..ctx
    };
    let comment = |state| Context { state, js_ctx, ..ctx };
    let next = match s.as_bytes()[i] {
        b'"' => (enter(State::JsDqStr), i + 1),
        b'\'' => (enter(State::JsSqStr), i + 1),
        b'`' => (enter(State::JsTmplLit), i + 1),
        _ => match s.as_bytes().get(i + 1) {
            Some(b'/') => (comment(State::JsLineComment), i + 2),
            Some(b'*') => (comment(State::JsBlockComment), i + 2),
            _ => match js_ctx {
                JsCtx::Regexp => (enter(State::JsRegexp), i + 1),
                // Division; an operand follows
                JsCtx::DivOp => (enter(State::Js), i + 1),
                JsCtx::Unknown => return Err(i),
            },
        },
    };
    Ok(next)
}

const REGEXP_PRECEDER_KEYWORDS: &[&str] = &[
    "break",
    "case",
    "continue",
    "delete",
    "do",
    "else",
    "finally",
    "in",
    "instanceof",
    "return",
    "throw",
    "try",
    "typeof",
    "void",
];

fn is_js_ident_part(c: char) -> bool {
    c.is_alphanumeric() || c == '_' || c == '$'
}

/// What a `/` means right after `code`, given what it meant before it.
pub fn next_js_ctx(code: &str, preceding: JsCtx) -> JsCtx {
    let code = code.trim_end_matches(|c: char| {
        WHITESPACE.contains(&c) || matches!(c, '\u{2028}' | '\u{2029}')
    });
    let Some(last) = code.chars().last() else {
        return preceding;
    };
    match last {
        '+' | '-' => {
            // `x++ /` divides, `x + /` and `x +++ /` start a regexp
            let run = code.len() - code.trim_end_matches(last).len();
            if run % 2 == 1 {
                JsCtx::Regexp
            } else {
                JsCtx::DivOp
            }
        }
        '.' => {
            // `1. / 2` divides
            let before = code[..code.len() - 1].chars().last();
            if before.is_some_and(|c| c.is_ascii_digit()) {
                JsCtx::DivOp
            } else {
                JsCtx::Regexp
            }
        }
        ',' | '<' | '>' | '=' | '*' | '%' | '&' | '|' | '^' | '?' | '!' | '~' | '(' | '['
        | ':' | ';' | '{' | '}' => JsCtx::Regexp,
        _ => {
            let word = &code[code.trim_end_matches(is_js_ident_part).len()..];
            if REGEXP_PRECEDER_KEYWORDS.contains(&word) {
                JsCtx::Regexp
            } else {
                JsCtx::DivOp
            }
        }
    }
}

/// Strings and template literals: ends at an unescaped `quote`.
fn t_delimited(ctx: Context, s: &str, quote: char, exit: State) -> (Context, usize) {
    let mut chars = s.char_indices();
    while let Some((i, c)) = chars.next() {
        if c == '\\' {
            chars.next();
        } else if c == quote {
            let js_ctx = match exit {
                State::Js => JsCtx::DivOp,
                _ => ctx.js_ctx,
            };
            return (
                Context {
                    state: exit,
                    js_ctx,
                    ..ctx
                },
                i + 1,
            );
        }
    }
    (ctx, s.len())
}

/// Regular expression literals: ends at an unescaped `/` outside a class.
fn t_js_regexp(ctx: Context, s: &str) -> (Context, usize) {
    let mut in_class = false;
    let mut chars = s.char_indices();
    while let Some((i, c)) = chars.next() {
        match c {
            '\\' => {
                chars.next();
            }
            '[' => in_class = true,
            ']' => in_class = false,
            '/' if !in_class => {
                return (
                    Context {
                        state: State::Js,
                        js_ctx: JsCtx::DivOp,
                        ..ctx
                    },
                    i + 1,
                )
            }
            _ => {}
        }
    }
    (ctx, s.len())
}

fn t_line_comment(ctx: Context, s: &str) -> (Context, usize) {
    match s.find(['\n', '\r', '\u{2028}', '\u{2029}']) {
        // The line terminator itself belongs to the code
        Some(i) => (
            Context {
                state: State::Js,
                ..ctx
            },
            i,
        ),
        None => (ctx, s.len()),
    }
}

fn t_block_comment(ctx: Context, s: &str, exit: State) -> (Context, usize) {
    match s.find("*/") {
        Some(i) => (Context { state: exit, ..ctx }, i + 2),
        None => (ctx, s.len()),
    }
}

fn t_css(ctx: Context, s: &str) -> (Context, usize) {
    let mut from = 0;
    loop {
        let Some(rel) = s[from..].find(['"', '\'', '/']) else {
            return (ctx, s.len());
        };
        let i = from + rel;
        let with_state = |state| Context { state, ..ctx };
        match s.as_bytes()[i] {
            b'"' => return (with_state(State::CssDqStr), i + 1),
            b'\'' => return (with_state(State::CssSqStr), i + 1),
            _ if s[i + 1..].starts_with('*') => return (with_state(State::CssComment), i + 2),
            _ => from = i + 1,
        }
    }
}

fn t_html_comment(ctx: Context, s: &str) -> (Context, usize) {
    match s.find("-->") {
        Some(i) => (Context::default(), i + 3),
        None => (ctx, s.len()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    fn after(ctx: Context, text: &str) -> Context {
        advance(ctx, text).expect("unambiguous text")
    }

    fn state_after(text: &str) -> State {
        after(Context::default(), text).state
    }

    #[rstest]
    #[case("plain text", State::Text)]
    #[case("a < b", State::Text)]
    #[case("<", State::TagOpen)]
    #[case("</", State::EndTagOpen)]
    #[case("<div", State::Tag)]
    #[case("<div ", State::Tag)]
    #[case("<div cl", State::AttrName)]
    #[case("<div class", State::AttrName)]
    #[case("<div class ", State::AfterName)]
    #[case("<div class=", State::BeforeValue)]
    #[case("<div class=\"", State::Attr)]
    #[case("<div class=\"x\"", State::Tag)]
    #[case("<div class=\"x\">", State::Text)]
    #[case("<a href=\"", State::Url)]
    #[case("<a onclick='", State::Js)]
    #[case("<a style=\"", State::Css)]
    #[case("<script>", State::Js)]
    #[case("<script>var s = \"", State::JsDqStr)]
    #[case("<script>var s = 'a' + ", State::Js)]
    #[case("<script>x = `", State::JsTmplLit)]
    #[case("<script>// note", State::JsLineComment)]
    #[case("<script>// note\n", State::Js)]
    #[case("<script>/* a", State::JsBlockComment)]
    #[case("<script>a / b", State::Js)]
    #[case("<script>var r = /\"/", State::Js)]
    #[case("<script>var r = /[/\"]", State::JsRegexp)]
    #[case("<script>x = a / \"", State::JsDqStr)]
    #[case("<script>return /a", State::JsRegexp)]
    #[case("<script>x = (1) / '", State::JsSqStr)]
    #[case("<script>var s = \"</script>", State::Text)]
    #[case("<SCRIPT>x</Script >", State::Text)]
    #[case("<style>", State::Css)]
    #[case("<style>p { font: '", State::CssSqStr)]
    #[case("<style>/* x", State::CssComment)]
    #[case("<textarea>", State::RcData)]
    #[case("<textarea><b>", State::RcData)]
    #[case("<title>x</title>", State::Text)]
    #[case("<!-- x", State::HtmlComment)]
    #[case("<!-- x --> y", State::Text)]
    #[case("<input checked>", State::Text)]
    #[case("<br/>", State::Text)]
    #[case("<a href=x>", State::Text)]
    fn test_state_after(#[case] text: &str, #[case] expected: State) {
        assert_eq!(state_after(text), expected);
    }

    #[test]
    fn test_url_parts() {
        let ctx = after(Context::default(), "<a href=\"");
        assert_eq!(ctx.url_part, UrlPart::None);
        assert_eq!(ctx.delim, Delim::DoubleQuote);
        assert_eq!(ctx.attr, Attr::Url);
        let ctx = after(ctx, "/search");
        assert_eq!(ctx.url_part, UrlPart::PreQuery);
        let ctx = after(ctx, "?q=");
        assert_eq!(ctx.url_part, UrlPart::QueryOrFragment);
    }

    #[test]
    fn test_element_remembered() {
        let ctx = after(Context::default(), "<script type=\"text/javascript\"");
        assert_eq!(ctx.state, State::Tag);
        assert_eq!(ctx.element, Element::Script);
        assert_eq!(after(ctx, ">").state, State::Js);
    }

    #[test]
    fn test_end_tag_clears_element() {
        let ctx = after(Context::default(), "<script></script");
        assert_eq!(ctx.state, State::Tag);
        assert_eq!(ctx.element, Element::None);
    }

    #[test]
    fn test_split_tag_open() {
        let ctx = after(Context::default(), "a <");
        assert_eq!(ctx.state, State::TagOpen);
        assert_eq!(after(ctx, "b>").state, State::Text);
        assert_eq!(after(ctx, " 3").state, State::Text);
    }

    #[rstest]
    #[case("x = ", JsCtx::Regexp)]
    #[case("return", JsCtx::Regexp)]
    #[case("typeof ", JsCtx::Regexp)]
    #[case("a", JsCtx::DivOp)]
    #[case("returned", JsCtx::DivOp)]
    #[case("f(x)", JsCtx::DivOp)]
    #[case("x++", JsCtx::DivOp)]
    #[case("x +", JsCtx::Regexp)]
    #[case("1.", JsCtx::DivOp)]
    #[case("a.", JsCtx::Regexp)]
    #[case("}", JsCtx::Regexp)]
    #[case("]", JsCtx::DivOp)]
    #[case("  \n", JsCtx::Unknown)]
    fn test_next_js_ctx(#[case] code: &str, #[case] expected: JsCtx) {
        assert_eq!(next_js_ctx(code, JsCtx::Unknown), expected);
    }

    #[test]
    fn test_quote_inside_regexp_is_not_a_string() {
        let ctx = after(Context::default(), "<script>var r = /\"/; var x = ");
        assert_eq!(ctx.state, State::Js);
        assert_eq!(ctx.js_ctx, JsCtx::Regexp);
        let ctx = after(Context::default(), "<script>var r = /[/]\\//g.test(s) ? '");
        assert_eq!(ctx.state, State::JsSqStr);
    }

    #[test]
    fn test_ambiguous_slash() {
        let unknown = Context {
            js_ctx: JsCtx::Unknown,
            element: Element::Script,
            ..Context::new(State::Js)
        };
        assert_eq!(advance(unknown, " /x/"), Err(AmbiguousSlash { offset: 1 }));
        // Any token before the slash settles it
        assert_eq!(after(unknown, "a /x").state, State::Js);
        assert_eq!(after(unknown, "= /x").state, State::JsRegexp);
        // Inside an event handler the offset counts from the text start
        let handler = Context {
            delim: Delim::DoubleQuote,
            attr: Attr::Script,
            ..unknown
        };
        assert_eq!(advance(handler, "  / 2"), Err(AmbiguousSlash { offset: 2 }));
    }

    #[rstest]
    #[case("href", Attr::Url)]
    #[case("src", Attr::Url)]
    #[case("srcset", Attr::Url)]
    #[case("data-href", Attr::Url)]
    #[case("xlink:href", Attr::Url)]
    #[case("onclick", Attr::Script)]
    #[case("style", Attr::Style)]
    #[case("class", Attr::Normal)]
    #[case("imgurl", Attr::Url)]
    fn test_attr_type(#[case] name: &str, #[case] expected: Attr) {
        assert_eq!(attr_type(name), expected);
    }
}
