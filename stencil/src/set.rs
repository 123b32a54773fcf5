//! Template sets
//!
//!     A [`TemplateSet`] maps names to parsed trees. Every source parsed into a
//!     set contributes its main tree under the source's name plus one tree per
//!     `define` or `block`. `{{template "name"}}` is resolved against the set
//!     when it runs, so templates may be defined in any order and a later
//!     definition replaces an earlier one.
//!
//! Cloning and Overlays
//!
//!     Trees are shared between clones through `Arc`. Escaping analysis and
//!     redefinition replace a set's own `Arc` and never touch the tree other
//!     clones see, so a base set can be cloned per page and each clone given
//!     its own block overrides:
//!
//!         let base = ...;                       // defines "page" with {{block "body" .}}
//!         let home = base.overlay_source("home", r#"{{define "body"}}Welcome{{end}}"#, &funcs)?;
//!
//! Escaping State
//!
//!     In HTML mode a set remembers which templates have been analyzed, and in
//!     which context. Execution refuses templates that haven't been, and only
//!     renders a template directly when it was analyzed as a page of its own:
//!     starting and ending in HTML text. Any
//!     definition forgets all of it, because a replaced callee may change the
//!     context its callers end in.

pub mod error;

pub use error::RegistryError;

use crate::escape::{analyze, AnalysisError, Context, Escaped, State};
use crate::exec;
use crate::funcs::FuncMap;
use crate::lexing::Delimiters;
use crate::parsing::Tree;
use crate::transforms::stages::Source;
use crate::transforms::standard::parse_pipeline;
use crate::value::Value;
use serde::Deserialize;
use std::collections::HashMap;
use std::io;
use std::sync::Arc;
use tracing::debug;

/// Whether actions are escaped for HTML
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Mode {
    /// Values print as they are
    Text,
    #[default]
    Html,
}

/// What a field lookup on a map does when the key is absent
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MissingKey {
    /// Yield nil, which prints as nothing
    #[default]
    Default,
    Error,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExecOptions {
    /// Deepest allowed nesting of template calls
    pub max_depth: usize,
    pub missing_key: MissingKey,
}

impl Default for ExecOptions {
    fn default() -> Self {
        ExecOptions {
            max_depth: 200,
            missing_key: MissingKey::Default,
        }
    }
}

#[derive(Debug, Clone)]
pub struct TemplateSet {
    mode: Mode,
    options: ExecOptions,
    delimiters: Delimiters,
    parsed: bool,
    trees: HashMap<String, Arc<Tree>>,
    escaped: HashMap<String, Escaped>,
}

impl TemplateSet {
    pub fn new(mode: Mode) -> Self {
        TemplateSet::with_options(mode, ExecOptions::default())
    }

    pub fn with_options(mode: Mode, options: ExecOptions) -> Self {
        TemplateSet {
            mode,
            options,
            delimiters: Delimiters::default(),
            parsed: false,
            trees: HashMap::new(),
            escaped: HashMap::new(),
        }
    }

    /// A set whose templates print values unescaped.
    pub fn text() -> Self {
        TemplateSet::new(Mode::Text)
    }

    /// A set whose templates are escaped for HTML.
    pub fn html() -> Self {
        TemplateSet::new(Mode::Html)
    }

    pub fn mode(&self) -> Mode {
        self.mode
    }

    pub fn options(&self) -> &ExecOptions {
        &self.options
    }

    pub fn delimiters(&self) -> &Delimiters {
        &self.delimiters
    }

    /// Change the action delimiters. Only allowed before the first parse.
    pub fn set_delimiters(
        &mut self,
        left: impl Into<String>,
        right: impl Into<String>,
    ) -> Result<&mut Self, RegistryError> {
        if self.parsed {
            return Err(RegistryError::DelimitersLocked);
        }
        let delimiters = Delimiters::new(left, right);
        if delimiters.left.is_empty() || delimiters.right.is_empty() {
            return Err(RegistryError::EmptyDelimiter);
        }
        self.delimiters = delimiters;
        Ok(self)
    }

    /// Parse `source` as template `name` and define every template in it.
    ///
    /// A main body of nothing but whitespace doesn't replace an existing
    /// template, so a source made only of `define`s can be parsed under an
    /// existing name.
    pub fn parse(&mut self, name: &str, source: &str, funcs: &FuncMap) -> crate::Result<&mut Self> {
        let parsed = parse_pipeline(self.delimiters.clone(), funcs.clone())
            .run(Source::new(name, source))?;
        self.parsed = true;
        for tree in std::iter::once(parsed.main).chain(parsed.defines) {
            if tree.is_blank() && self.trees.contains_key(&tree.name) {
                continue;
            }
            let name = tree.name.clone();
            self.define(name, tree);
        }
        Ok(self)
    }

    /// Add or replace template `name`.
    pub fn define(&mut self, name: impl Into<String>, mut tree: Tree) -> &mut Self {
        tree.name = name.into();
        debug!(template = %tree.name, "defined template");
        self.escaped.clear();
        self.trees.insert(tree.name.clone(), Arc::new(tree));
        self
    }

    pub fn lookup(&self, name: &str) -> Option<&Tree> {
        self.trees.get(name).map(Arc::as_ref)
    }

    /// Template names in sorted order.
    pub fn names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.trees.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }

    /// A clone of this set with every template of `overrides` defined in it.
    pub fn overlay(&self, overrides: &TemplateSet) -> TemplateSet {
        let mut out = self.clone();
        for (name, tree) in &overrides.trees {
            out.escaped.clear();
            out.trees.insert(name.clone(), Arc::clone(tree));
        }
        out
    }

    /// A clone of this set with `source` parsed into it.
    pub fn overlay_source(
        &self,
        name: &str,
        source: &str,
        funcs: &FuncMap,
    ) -> crate::Result<TemplateSet> {
        let mut out = self.clone();
        out.parse(name, source, funcs)?;
        Ok(out)
    }

    /// Run escaping analysis from `name`, rewriting this set on success.
    /// A no-op in text mode.
    pub fn escape(&mut self, name: &str) -> Result<&mut Self, AnalysisError> {
        if self.mode == Mode::Html {
            *self = analyze(name, self)?;
        }
        Ok(self)
    }

    /// Whether `name` has been analyzed since the last definition.
    pub fn is_escaped(&self, name: &str) -> bool {
        self.escaped.contains_key(name)
    }

    /// Whether `name` has been analyzed as a page of its own, entering and
    /// leaving in HTML text. Templates analyzed only through a call from
    /// another context don't qualify.
    pub fn is_escaped_entry(&self, name: &str) -> bool {
        self.escaped
            .get(name)
            .is_some_and(|done| done.entry == Context::default() && done.exit.state == State::Text)
    }

    pub fn execute<W: io::Write + ?Sized>(
        &self,
        name: &str,
        funcs: &FuncMap,
        data: &Value,
        sink: &mut W,
    ) -> Result<(), exec::ExecError> {
        exec::execute(name, self, funcs, data, sink)
    }

    /// Execute `name` into a string.
    pub fn render(&self, name: &str, funcs: &FuncMap, data: &Value) -> Result<String, exec::ExecError> {
        exec::render(name, self, funcs, data)
    }

    pub(crate) fn tree(&self, name: &str) -> Option<&Arc<Tree>> {
        self.trees.get(name)
    }

    pub(crate) fn escaped_templates(&self) -> &HashMap<String, Escaped> {
        &self.escaped
    }

    pub(crate) fn commit_escaped(
        &mut self,
        rewritten: HashMap<String, Tree>,
        memo: HashMap<String, Escaped>,
    ) {
        for (name, tree) in rewritten {
            self.trees.insert(name, Arc::new(tree));
        }
        self.escaped = memo;
    }

    #[cfg(test)]
    pub(crate) fn invalidate_escaped(&mut self) {
        self.escaped.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn funcs() -> FuncMap {
        FuncMap::new()
    }

    #[test]
    fn test_parse_defines_nested_templates() {
        let mut set = TemplateSet::text();
        set.parse("page", r#"<{{block "title" .}}T{{end}}>{{define "foot"}}F{{end}}"#, &funcs())
            .unwrap();
        assert_eq!(set.names(), vec!["foot", "page", "title"]);
        assert_eq!(set.lookup("title").unwrap().to_string(), "T");
    }

    #[test]
    fn test_blank_main_does_not_replace() {
        let mut set = TemplateSet::text();
        set.parse("page", "hello", &funcs()).unwrap();
        set.parse("page", "  \n{{define \"x\"}}x{{end}}\n", &funcs())
            .unwrap();
        assert_eq!(set.lookup("page").unwrap().to_string(), "hello");
        assert!(set.lookup("x").is_some());
    }

    #[test]
    fn test_last_definition_wins() {
        let mut set = TemplateSet::text();
        set.parse("a", "one", &funcs()).unwrap();
        set.parse("a", "two", &funcs()).unwrap();
        assert_eq!(set.lookup("a").unwrap().to_string(), "two");
    }

    #[test]
    fn test_delimiters_lock_after_parse() {
        let mut set = TemplateSet::text();
        assert_eq!(set.set_delimiters("", "}}").unwrap_err(), RegistryError::EmptyDelimiter);
        set.set_delimiters("[[", "]]").unwrap();
        set.parse("t", "[[ .X ]]{{.Y}}", &funcs()).unwrap();
        assert_eq!(
            set.set_delimiters("<%", "%>").unwrap_err(),
            RegistryError::DelimitersLocked
        );
    }

    #[test]
    fn test_overlay_leaves_base_alone() {
        let mut base = TemplateSet::text();
        base.parse("page", r#"[{{block "body" .}}base{{end}}]"#, &funcs())
            .unwrap();
        let home = base
            .overlay_source("page", r#"{{define "body"}}home{{end}}"#, &funcs())
            .unwrap();
        assert_eq!(home.lookup("body").unwrap().to_string(), "home");
        assert_eq!(base.lookup("body").unwrap().to_string(), "base");
        assert_eq!(home.lookup("page"), base.lookup("page"));
    }

    #[test]
    fn test_definition_forgets_escaping() {
        let mut set = TemplateSet::html();
        set.parse("t", "{{.}}", &funcs()).unwrap();
        set.escape("t").unwrap();
        assert!(set.is_escaped("t"));
        set.parse("u", "x", &funcs()).unwrap();
        assert!(!set.is_escaped("t"));
        set.escape("t").unwrap();
        assert_eq!(set.lookup("t").unwrap().to_string(), "{{. | _html}}");
    }

    #[test]
    fn test_escape_on_clone_is_independent() {
        let mut base = TemplateSet::html();
        base.parse("t", "{{.}}", &funcs()).unwrap();
        let mut copy = base.clone();
        copy.escape("t").unwrap();
        assert_eq!(base.lookup("t").unwrap().to_string(), "{{.}}");
        assert!(copy.is_escaped("t"));
    }

    #[test]
    fn test_callee_analysis_is_not_an_entry() {
        let mut set = TemplateSet::html();
        set.parse("page", r#"<script>{{template "js" .}}</script>{{template "open" .}}">"#, &funcs())
            .unwrap();
        set.parse("js", "f({{.}})", &funcs()).unwrap();
        set.parse("open", r#"<a href=""#, &funcs()).unwrap();
        set.escape("page").unwrap();
        assert!(set.is_escaped_entry("page"));
        for callee in ["js", "open"] {
            assert!(set.is_escaped(callee));
            assert!(!set.is_escaped_entry(callee), "{callee}");
        }
    }
}
