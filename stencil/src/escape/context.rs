//! Escape contexts
//!
//! A [`Context`] is the state of an HTML tokenizer at one point of the output,
//! reduced to what decides how a value must be escaped there.

use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum State {
    /// Between tags
    #[default]
    Text,
    /// Right after `<`, before the tag name
    TagOpen,
    /// Right after `</`
    EndTagOpen,
    /// Inside a tag, between attributes
    Tag,
    AttrName,
    /// After an attribute name, before `=`
    AfterName,
    /// After `=`, before the value
    BeforeValue,
    /// A plain attribute value
    Attr,
    Url,
    Js,
    JsDqStr,
    JsSqStr,
    JsTmplLit,
    /// Inside a regular expression literal
    JsRegexp,
    JsLineComment,
    JsBlockComment,
    Css,
    CssDqStr,
    CssSqStr,
    CssComment,
    HtmlComment,
    /// Text inside `<textarea>` or `<title>`
    RcData,
}

/// How the current attribute value ends
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum Delim {
    #[default]
    None,
    DoubleQuote,
    SingleQuote,
    /// Unquoted value, ended by whitespace or `>`
    SpaceOrTagEnd,
}

impl Delim {
    pub(crate) fn end_chars(self) -> &'static [char] {
        match self {
            Delim::None => &[],
            Delim::DoubleQuote => &['"'],
            Delim::SingleQuote => &['\''],
            Delim::SpaceOrTagEnd => &[' ', '\t', '\n', '\x0c', '\r', '>'],
        }
    }
}

/// Position inside a URL
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum UrlPart {
    /// Nothing emitted yet; a scheme may still follow
    #[default]
    None,
    /// Past the start, before any `?` or `#`
    PreQuery,
    QueryOrFragment,
    /// Branches disagree about the part
    Unknown,
}

/// What a `/` means at the current point of JS code
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum JsCtx {
    /// Start of an expression: `/` opens a regular expression literal
    #[default]
    Regexp,
    /// After an operand: `/` is the division operator
    DivOp,
    /// Branches disagree
    Unknown,
}

/// Kind of the attribute being processed
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum Attr {
    #[default]
    None,
    Normal,
    Url,
    Script,
    Style,
}

/// Elements whose content isn't parsed as HTML
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum Element {
    #[default]
    None,
    Script,
    Style,
    Textarea,
    Title,
}

impl Element {
    pub fn from_tag(name: &str) -> Element {
        match name.to_ascii_lowercase().as_str() {
            "script" => Element::Script,
            "style" => Element::Style,
            "textarea" => Element::Textarea,
            "title" => Element::Title,
            _ => Element::None,
        }
    }

    pub fn tag_name(self) -> &'static str {
        match self {
            Element::None => "",
            Element::Script => "script",
            Element::Style => "style",
            Element::Textarea => "textarea",
            Element::Title => "title",
        }
    }

    /// State entered after the start tag's `>`.
    pub fn content_state(self) -> State {
        match self {
            Element::None => State::Text,
            Element::Script => State::Js,
            Element::Style => State::Css,
            Element::Textarea | Element::Title => State::RcData,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct Context {
    pub state: State,
    pub delim: Delim,
    pub url_part: UrlPart,
    pub js_ctx: JsCtx,
    pub attr: Attr,
    pub element: Element,
}

impl Context {
    pub fn new(state: State) -> Self {
        Context {
            state,
            ..Context::default()
        }
    }

    /// Resolve positions where an action can only mean one thing: between
    /// attributes it would be an attribute name, after `=` an unquoted value.
    pub fn nudge(self) -> Context {
        match self.state {
            State::Tag | State::AfterName => Context {
                state: State::AttrName,
                attr: Attr::None,
                ..self
            },
            State::BeforeValue => Context {
                state: attr_start_state(self.attr),
                delim: Delim::SpaceOrTagEnd,
                ..self
            },
            _ => self,
        }
    }

    /// Reconcile the exit contexts of two control-flow paths, or `None` when
    /// they can't be reconciled.
    pub fn join(self, other: Context) -> Option<Context> {
        if self == other {
            return Some(self);
        }
        // A plain attribute escapes exactly like no attribute
        let (plain_a, plain_b) = (self.without_plain_attr(), other.without_plain_attr());
        if plain_a == plain_b {
            return Some(plain_a);
        }
        let same_but_url = Context {
            url_part: other.url_part,
            ..self
        };
        if self.state == State::Url && same_but_url == other {
            return Some(Context {
                url_part: UrlPart::Unknown,
                ..self
            });
        }
        let same_but_js = Context {
            js_ctx: other.js_ctx,
            ..self
        };
        if same_but_js == other {
            return Some(Context {
                js_ctx: JsCtx::Unknown,
                ..self
            });
        }
        let (a, b) = (self.nudge(), other.nudge());
        if (a, b) != (self, other) {
            return a.join(b);
        }
        None
    }
}

impl Context {
    fn without_plain_attr(self) -> Context {
        match self.attr {
            Attr::Normal => Context {
                attr: Attr::None,
                ..self
            },
            _ => self,
        }
    }
}

/// State at the start of an attribute value.
pub fn attr_start_state(attr: Attr) -> State {
    match attr {
        Attr::None | Attr::Normal => State::Attr,
        Attr::Url => State::Url,
        Attr::Script => State::Js,
        Attr::Style => State::Css,
    }
}

impl fmt::Display for Context {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{{{:?}", self.state)?;
        if self.delim != Delim::None {
            write!(f, " delim={:?}", self.delim)?;
        }
        if self.url_part != UrlPart::None {
            write!(f, " url={:?}", self.url_part)?;
        }
        if self.js_ctx != JsCtx::Regexp {
            write!(f, " js={:?}", self.js_ctx)?;
        }
        if self.attr != Attr::None {
            write!(f, " attr={:?}", self.attr)?;
        }
        if self.element != Element::None {
            write!(f, " element={:?}", self.element)?;
        }
        f.write_str("}")
    }
}
