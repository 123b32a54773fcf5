//! Lexer
//!
//!     Lexing happens in two passes. The [scanner](scanner) splits template source
//!     into literal text and action segments, honoring the delimiter pair, trim
//!     markers and comments. The parser then runs the logos lexer in
//!     [tokens](tokens) over each action body.
//!
//!     Logos tokens carry the byte range of their source text relative to the
//!     action body. The parser shifts them by the segment's `body_offset` so
//!     every error can be reported against the original source.

pub mod common;
pub mod scanner;
pub mod tokens;

pub use common::{LexError, LineIndex, Pos};
pub use scanner::{scan, Delimiters, Scanned, Segment};
pub use tokens::Token;

use logos::Logos;
use std::ops::Range;

/// Tokenize an action body, returning tokens paired with absolute byte ranges.
///
/// On an unrecognized character, returns the absolute offset where lexing stopped.
pub fn tokenize_action(body: &str, body_offset: usize) -> Result<Vec<(Token, Range<usize>)>, usize> {
    let mut lexer = Token::lexer(body);
    let mut tokens = Vec::new();

    while let Some(result) = lexer.next() {
        let span = lexer.span();
        let span = span.start + body_offset..span.end + body_offset;
        match result {
            Ok(token) => tokens.push((token, span)),
            Err(()) => return Err(span.start),
        }
    }

    Ok(tokens)
}
