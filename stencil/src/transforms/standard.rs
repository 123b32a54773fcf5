//! Prebuilt pipelines
//!
//! [`parse_pipeline`] builds the source → trees pipeline a [`TemplateSet`]
//! runs for every `parse`, with that set's delimiters. [`STANDARD_PARSE`] is
//! the same pipeline prebuilt for the default `{{`/`}}` delimiters and the
//! built-in functions.
//!
//! [`TemplateSet`]: crate::set::TemplateSet

use super::stages::{Parsing, Scanning, Source};
use super::Transform;
use crate::funcs::FuncMap;
use crate::lexing::Delimiters;
use crate::parsing::Parsed;
use once_cell::sync::Lazy;

pub type ParseTransform = Transform<Source, Parsed>;

/// Source → main tree plus nested definitions
pub fn parse_pipeline(delimiters: Delimiters, funcs: FuncMap) -> ParseTransform {
    Transform::from_fn(Ok)
        .then(Scanning::new(delimiters))
        .then(Parsing::new(funcs))
}

/// [`parse_pipeline`] with the default delimiters and built-in functions
pub static STANDARD_PARSE: Lazy<ParseTransform> =
    Lazy::new(|| parse_pipeline(Delimiters::default(), FuncMap::new()));
