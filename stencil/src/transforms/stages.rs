//! Individual stages

use super::{Runnable, TransformError};
use crate::funcs::FuncMap;
use crate::lexing::{scan, Delimiters, Scanned};
use crate::parsing::{parse_segments, Parsed};

/// A named template source
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Source {
    pub name: String,
    pub text: String,
}

impl Source {
    pub fn new(name: impl Into<String>, text: impl Into<String>) -> Self {
        Source {
            name: name.into(),
            text: text.into(),
        }
    }
}

/// Source → text and action segments
#[derive(Debug, Clone, Default)]
pub struct Scanning {
    delimiters: Delimiters,
}

impl Scanning {
    pub fn new(delimiters: Delimiters) -> Self {
        Scanning { delimiters }
    }
}

impl Runnable<Source, Scanned> for Scanning {
    fn run(&self, input: Source) -> Result<Scanned, TransformError> {
        Ok(scan(&input.name, &input.text, &self.delimiters)?)
    }
}

/// Segments → trees, resolving names against a function map
#[derive(Debug, Clone, Default)]
pub struct Parsing {
    funcs: FuncMap,
}

impl Parsing {
    pub fn new(funcs: FuncMap) -> Self {
        Parsing { funcs }
    }
}

impl Runnable<Scanned, Parsed> for Parsing {
    fn run(&self, input: Scanned) -> Result<Parsed, TransformError> {
        Ok(parse_segments(&input, &self.funcs)?)
    }
}
