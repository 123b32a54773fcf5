//! # stencil
//!
//! Text and HTML templates with contextual auto-escaping.
//!
//! Templates mix literal text with actions between `{{` and `}}`: data
//! lookups, pipelines of function calls, conditionals, loops and calls to
//! other named templates. In HTML mode a static analysis pass works out, for
//! every action, where in the HTML document its output lands (element text,
//! a quoted attribute, a URL, a script, a stylesheet) and makes the action
//! escape its value for exactly that place.
//!
//! Layout
//!
//!     lexing      delimiter scanning and the logos token enum for actions
//!     parsing     syntax tree and recursive descent parser
//!     funcs       the function map and built-in functions
//!     value       runtime values and the host object trait
//!     set         named template collections, cloning and overlays
//!     escape      escape contexts, escapers and the analyzer
//!     exec        the tree walker that renders templates
//!     transforms  composable source-to-tree stages
//!     testing     helpers shared by unit and integration tests
//!
//! Usage
//!
//!     let funcs = FuncMap::new();
//!     let mut set = TemplateSet::html();
//!     set.parse("page", r#"<a href="{{.Url}}">{{.Title}}</a>"#, &funcs)?;
//!     set.escape("page")?;
//!     let html = set.render("page", &funcs, &Value::from_serialize(&page)?)?;

pub mod error;
pub mod escape;
pub mod exec;
pub mod funcs;
pub mod lexing;
pub mod parsing;
pub mod set;
pub mod testing;
pub mod transforms;
pub mod value;

pub use error::{Error, Result};
pub use escape::{analyze, AnalysisError, Context, Escaper};
pub use exec::{execute, ExecError};
pub use funcs::{Arity, FuncError, FuncMap};
pub use lexing::Delimiters;
pub use parsing::{parse, Parsed, Tree};
pub use set::{ExecOptions, MissingKey, Mode, RegistryError, TemplateSet};
pub use value::{ContentKind, MapKey, Object, SafeString, Value};
