//! Testing utilities
//!
//!     Helpers shared by the unit tests and the integration tests under
//!     `tests/`. They are meant for tests only and panic with the failing
//!     template and error rather than returning them, except the `try_`
//!     variants.
//!
//! Sets and Rendering
//!
//!     Most escaping tests follow the same three steps: parse one or more
//!     sources into an HTML set, analyze from an entry template, render it with
//!     some data. [`render_html`] does all three for a single source named
//!     `page`; [`html_set`] and [`escaped_set`] cover multi-template cases.
//!
//! Tree Assertions
//!
//!     [`assert_escaped`] compares the analyzed tree's template syntax, where
//!     inserted escapers print as `_name` stages. [`TextMatch`] allows looser
//!     checks on rendered output.

use crate::error::Result;
use crate::funcs::FuncMap;
use crate::set::{Mode, TemplateSet};
use crate::value::Value;

/// Name given to single-source templates by the helpers
pub const PAGE: &str = "page";

/// Parse `sources` as `(name, source)` pairs into a set of the given mode.
pub fn try_set(mode: Mode, sources: &[(&str, &str)], funcs: &FuncMap) -> Result<TemplateSet> {
    let mut set = TemplateSet::new(mode);
    for (name, source) in sources {
        set.parse(name, source, funcs)?;
    }
    Ok(set)
}

pub fn html_set(sources: &[(&str, &str)]) -> TemplateSet {
    try_set(Mode::Html, sources, &FuncMap::new())
        .unwrap_or_else(|err| panic!("failed to parse test sources: {}", err))
}

pub fn text_set(sources: &[(&str, &str)]) -> TemplateSet {
    try_set(Mode::Text, sources, &FuncMap::new())
        .unwrap_or_else(|err| panic!("failed to parse test sources: {}", err))
}

/// [`html_set`] analyzed from `entry`.
pub fn escaped_set(sources: &[(&str, &str)], entry: &str) -> TemplateSet {
    let mut set = html_set(sources);
    if let Err(err) = set.escape(entry) {
        panic!("escaping {:?} failed: {}", entry, err);
    }
    set
}

/// Parse, analyze and render a single HTML source.
pub fn try_render_html(source: &str, data: &Value) -> Result<String> {
    let funcs = FuncMap::new();
    let mut set = try_set(Mode::Html, &[(PAGE, source)], &funcs)?;
    set.escape(PAGE)?;
    Ok(set.render(PAGE, &funcs, data)?)
}

pub fn render_html(source: &str, data: &Value) -> String {
    try_render_html(source, data)
        .unwrap_or_else(|err| panic!("rendering {:?} failed: {}", source, err))
}

pub fn render_text(source: &str, data: &Value) -> String {
    let funcs = FuncMap::new();
    text_set(&[(PAGE, source)])
        .render(PAGE, &funcs, data)
        .unwrap_or_else(|err| panic!("rendering {:?} failed: {}", source, err))
}

/// Assert that analyzing `source` yields `expected` in template syntax.
pub fn assert_escaped(source: &str, expected: &str) {
    let set = escaped_set(&[(PAGE, source)], PAGE);
    let actual = set
        .lookup(PAGE)
        .map(ToString::to_string)
        .unwrap_or_default();
    assert_eq!(actual, expected, "escaping {:?}", source);
}

/// Text matching strategies for rendered output
#[derive(Debug, Clone)]
pub enum TextMatch {
    Exact(String),
    StartsWith(String),
    Contains(String),
}

impl TextMatch {
    pub fn matches(&self, actual: &str) -> bool {
        match self {
            TextMatch::Exact(expected) => actual == expected,
            TextMatch::StartsWith(prefix) => actual.starts_with(prefix),
            TextMatch::Contains(substring) => actual.contains(substring),
        }
    }

    pub fn assert(&self, actual: &str, context: &str) {
        assert!(
            self.matches(actual),
            "{}: expected output matching {:?}, got {:?}",
            context,
            self,
            actual
        );
    }
}
