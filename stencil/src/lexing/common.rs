//! Common lexer module
//!
//! Shared position tracking and the lexing error type.

use std::fmt;
use thiserror::Error;

/// A resolved source position (1-based line and column, 0-based byte offset).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct Pos {
    pub offset: usize,
    pub line: usize,
    pub column: usize,
}

impl Pos {
    pub fn new(offset: usize, line: usize, column: usize) -> Self {
        Pos {
            offset,
            line,
            column,
        }
    }
}

impl fmt::Display for Pos {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.line, self.column)
    }
}

/// Maps byte offsets to line/column positions.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LineIndex {
    line_starts: Vec<usize>,
}

impl LineIndex {
    pub fn new(source: &str) -> Self {
        let mut line_starts = vec![0];
        line_starts.extend(
            source
                .bytes()
                .enumerate()
                .filter(|(_, b)| *b == b'\n')
                .map(|(i, _)| i + 1),
        );
        LineIndex { line_starts }
    }

    pub fn locate(&self, offset: usize) -> Pos {
        let line = match self.line_starts.binary_search(&offset) {
            Ok(line) => line,
            Err(next) => next - 1,
        };
        Pos::new(offset, line + 1, offset - self.line_starts[line] + 1)
    }
}

/// Errors raised while splitting source into text and actions
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum LexError {
    #[error("{template}:{pos}: unclosed action")]
    UnterminatedAction { template: String, pos: Pos },

    #[error("{template}:{pos}: unclosed comment")]
    UnterminatedComment { template: String, pos: Pos },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_locate_first_line() {
        let index = LineIndex::new("hello\nworld");
        assert_eq!(index.locate(0), Pos::new(0, 1, 1));
        assert_eq!(index.locate(4), Pos::new(4, 1, 5));
    }

    #[test]
    fn test_locate_after_newline() {
        let index = LineIndex::new("hello\nworld\n!");
        assert_eq!(index.locate(6), Pos::new(6, 2, 1));
        assert_eq!(index.locate(12), Pos::new(12, 3, 1));
    }

    #[test]
    fn test_pos_display() {
        assert_eq!(Pos::new(10, 3, 7).to_string(), "3:7");
    }
}
