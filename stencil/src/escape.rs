//! Contextual auto-escaping
//!
//!     In HTML mode every action is escaped for the place in the document it
//!     prints into. The analyzer tracks the state an HTML tokenizer would be in
//!     at each point of a template's literal text and appends escaper stages
//!     to each action's pipeline before the template ever runs:
//!
//!         <a href="/search?q={{.Query}}">{{.Title}}</a>
//!
//!     becomes
//!
//!         <a href="/search?q={{.Query | _url_escaper | _attr}}">{{.Title | _html}}</a>
//!
//!     No data is consulted. Conditionals, loops and template calls are
//!     followed statically, and any place where the context depends on data
//!     is rejected instead of guessed.
//!
//! Modules
//!
//!     - [context]: the tracked tokenizer state and how two states join
//!     - [transition]: how literal text moves the state forward
//!     - [escapers]: the escaper stages and what they do to values
//!     - [analyzer]: the tree walk that puts it together

pub mod analyzer;
pub mod context;
pub mod error;
pub mod escapers;
pub mod transition;

pub use analyzer::{analyze, Escaped};
pub use context::{Attr, Context, Delim, Element, JsCtx, State, UrlPart};
pub use error::AnalysisError;
pub use escapers::Escaper;
pub use transition::advance;
