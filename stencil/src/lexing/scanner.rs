//! Delimiter scanner
//!
//!     Cuts template source into literal text and action segments. This is the
//!     outer half of lexing: it knows about delimiters, trim markers and comments,
//!     but nothing about what is inside an action. Action bodies are handed to the
//!     logos lexer in [tokens](super::tokens) by the parser.
//!
//! Trim Markers
//!
//!     `{{- ` (a dash followed by whitespace) removes all whitespace at the end of
//!     the preceding text; ` -}}` removes all whitespace at the start of the
//!     following text. The dash must be separated from the action body so that
//!     `{{-3}}` still reads as the number -3.
//!
//! Comments
//!
//!     `{{/* ... */}}` is dropped from the segment stream entirely. The comment
//!     must close right before the close delimiter (optionally with a trim
//!     marker), anything else is reported as an unterminated comment.

use super::common::{LexError, LineIndex, Pos};

const TRIM_MARKER: char = '-';

fn is_space(c: char) -> bool {
    matches!(c, ' ' | '\t' | '\r' | '\n')
}

/// Open/close delimiter pair
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Delimiters {
    pub left: String,
    pub right: String,
}

impl Delimiters {
    pub fn new(left: impl Into<String>, right: impl Into<String>) -> Self {
        Delimiters {
            left: left.into(),
            right: right.into(),
        }
    }
}

impl Default for Delimiters {
    fn default() -> Self {
        Delimiters::new("{{", "}}")
    }
}

/// A run of literal text or the body of one action
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Segment {
    Text {
        text: String,
        pos: Pos,
    },
    Action {
        body: String,
        /// Position of the open delimiter
        pos: Pos,
        /// Byte offset of the body within the source
        body_offset: usize,
    },
}

/// Scanner output: the segments of one source plus its line index
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Scanned {
    pub name: String,
    pub segments: Vec<Segment>,
    pub lines: LineIndex,
}

/// Split `source` into text and action segments.
pub fn scan(name: &str, source: &str, delims: &Delimiters) -> Result<Scanned, LexError> {
    let lines = LineIndex::new(source);
    let mut segments = Vec::new();
    let mut cursor = 0;
    let mut trim_next = false;

    loop {
        let Some(relative) = source[cursor..].find(&delims.left) else {
            let mut text = &source[cursor..];
            if trim_next {
                text = text.trim_start_matches(is_space);
            }
            push_text(&mut segments, &lines, source, text);
            break;
        };
        let open = cursor + relative;
        let mut inner = open + delims.left.len();

        let mut text = &source[cursor..open];
        if trim_next {
            text = text.trim_start_matches(is_space);
        }
        if has_left_trim(&source[inner..]) {
            text = text.trim_end_matches(is_space);
            inner += 1;
        }
        push_text(&mut segments, &lines, source, text);

        let comment_start = inner + (source[inner..].len() - source[inner..].trim_start_matches(is_space).len());
        if source[comment_start..].starts_with("/*") {
            let unterminated = || LexError::UnterminatedComment {
                template: name.to_string(),
                pos: lines.locate(open),
            };
            let close = source[comment_start + 2..]
                .find("*/")
                .map(|i| comment_start + 2 + i + 2)
                .ok_or_else(unterminated)?;
            let (after, trimmed) =
                close_after_comment(&source[close..], &delims.right).ok_or_else(unterminated)?;
            cursor = close + after;
            trim_next = trimmed;
            continue;
        }

        let close = find_close(source, inner, &delims.right).ok_or_else(|| {
            LexError::UnterminatedAction {
                template: name.to_string(),
                pos: lines.locate(open),
            }
        })?;
        let mut body = &source[inner..close];
        trim_next = has_right_trim(body);
        if trim_next {
            body = &body[..body.len() - 1];
        }
        segments.push(Segment::Action {
            body: body.to_string(),
            pos: lines.locate(open),
            body_offset: inner,
        });
        cursor = close + delims.right.len();
    }

    Ok(Scanned {
        name: name.to_string(),
        segments,
        lines,
    })
}

fn push_text(segments: &mut Vec<Segment>, lines: &LineIndex, source: &str, text: &str) {
    if text.is_empty() {
        return;
    }
    let offset = text.as_ptr() as usize - source.as_ptr() as usize;
    segments.push(Segment::Text {
        text: text.to_string(),
        pos: lines.locate(offset),
    });
}

fn has_left_trim(rest: &str) -> bool {
    let mut chars = rest.chars();
    chars.next() == Some(TRIM_MARKER) && chars.next().is_some_and(is_space)
}

fn has_right_trim(body: &str) -> bool {
    let mut chars = body.chars().rev();
    chars.next() == Some(TRIM_MARKER) && chars.next().is_some_and(is_space)
}

/// After `*/`: returns the bytes to skip through the close delimiter and
/// whether a right trim marker was present.
fn close_after_comment(rest: &str, right: &str) -> Option<(usize, bool)> {
    if rest.starts_with(right) {
        return Some((right.len(), false));
    }
    let trimmed = rest.trim_start_matches(is_space);
    let spaces = rest.len() - trimmed.len();
    if spaces > 0 {
        if let Some(tail) = trimmed.strip_prefix(TRIM_MARKER) {
            if tail.starts_with(right) {
                return Some((spaces + 1 + right.len(), true));
            }
        }
    }
    None
}

/// Find the close delimiter, skipping over quoted literals.
fn find_close(source: &str, from: usize, right: &str) -> Option<usize> {
    let bytes = source.as_bytes();
    let right = right.as_bytes();
    let mut i = from;
    while i < bytes.len() {
        if bytes[i..].starts_with(right) {
            return Some(i);
        }
        match bytes[i] {
            quote @ (b'"' | b'\'') => {
                i += 1;
                while i < bytes.len() && bytes[i] != quote {
                    if bytes[i] == b'\\' {
                        i += 1;
                    }
                    i += 1;
                }
            }
            b'`' => {
                i += 1;
                while i < bytes.len() && bytes[i] != b'`' {
                    i += 1;
                }
            }
            _ => {}
        }
        i += 1;
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;

    fn scan_default(source: &str) -> Vec<Segment> {
        scan("t", source, &Delimiters::default())
            .expect("scan failed")
            .segments
    }

    fn texts_and_bodies(source: &str) -> Vec<String> {
        scan_default(source)
            .into_iter()
            .map(|segment| match segment {
                Segment::Text { text, .. } => format!("T({})", text),
                Segment::Action { body, .. } => format!("A({})", body),
            })
            .collect()
    }

    #[test]
    fn test_text_only() {
        assert_eq!(texts_and_bodies("hello"), vec!["T(hello)"]);
    }

    #[test]
    fn test_text_and_action() {
        assert_eq!(
            texts_and_bodies("Hello, {{.Name}}!"),
            vec!["T(Hello, )", "A(.Name)", "T(!)"]
        );
    }

    #[test]
    fn test_trim_markers() {
        assert_eq!(
            texts_and_bodies("a  \n {{- .X -}} \n b"),
            vec!["T(a)", "A( .X )", "T(b)"]
        );
    }

    #[test]
    fn test_negative_number_is_not_trim() {
        assert_eq!(texts_and_bodies("a {{-3}}"), vec!["T(a )", "A(-3)"]);
    }

    #[test]
    fn test_comments_are_dropped() {
        assert_eq!(texts_and_bodies("a{{/* note */}}b"), vec!["T(a)", "T(b)"]);
        assert_eq!(texts_and_bodies("a {{- /* note */ -}} b"), vec!["T(a)", "T(b)"]);
    }

    #[test]
    fn test_close_delimiter_inside_string() {
        assert_eq!(
            texts_and_bodies(r#"{{print "}}"}}x"#),
            vec![r#"A(print "}}")"#, "T(x)"]
        );
    }

    #[test]
    fn test_non_ascii_inside_actions() {
        assert_eq!(
            texts_and_bodies("é{{ é }}ü{{print \"ß\"}}"),
            vec!["T(é)", "A( é )", "T(ü)", r#"A(print "ß")"#]
        );
        let scanned = scan("t", "{{.Prénom»}}", &Delimiters::new("{{", "»}}")).unwrap();
        assert!(matches!(&scanned.segments[0], Segment::Action { body, .. } if body == ".Prénom"));
    }

    #[test]
    fn test_custom_delimiters() {
        let scanned = scan("t", "<% .X %>{{y}}", &Delimiters::new("<%", "%>")).unwrap();
        assert_eq!(scanned.segments.len(), 2);
        assert!(matches!(&scanned.segments[1], Segment::Text { text, .. } if text == "{{y}}"));
    }

    #[test]
    fn test_unterminated_action() {
        let err = scan("page", "line\n  {{ .X", &Delimiters::default()).unwrap_err();
        assert_eq!(
            err,
            LexError::UnterminatedAction {
                template: "page".to_string(),
                pos: Pos::new(7, 2, 3),
            }
        );
    }

    #[test]
    fn test_unterminated_comment() {
        let err = scan("t", "{{/* open", &Delimiters::default()).unwrap_err();
        assert!(matches!(err, LexError::UnterminatedComment { .. }));
    }

    #[test]
    fn test_comment_must_end_at_delimiter() {
        let err = scan("t", "{{/* x */ .Y}}", &Delimiters::default()).unwrap_err();
        assert!(matches!(err, LexError::UnterminatedComment { .. }));
    }

    #[test]
    fn test_action_positions() {
        let segments = scan_default("ab\n{{.X}}");
        match &segments[1] {
            Segment::Action {
                pos, body_offset, ..
            } => {
                assert_eq!(*pos, Pos::new(3, 2, 1));
                assert_eq!(*body_offset, 5);
            }
            other => panic!("expected action, got {:?}", other),
        }
    }
}
