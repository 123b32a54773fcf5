//! Token definitions for action bodies
//!
//! Everything between an open and a close delimiter is tokenized with the
//! logos derive below. Literal text never reaches this lexer; see
//! [scanner](super::scanner) for how actions are cut out of the source.
use logos::Logos;

/// All tokens that can appear inside an action
#[derive(Logos, Debug, PartialEq, Clone)]
#[logos(skip r"[ \t\r\n]+")]
pub enum Token {
    // Pipeline structure
    #[token("|")]
    Pipe,
    #[token("(")]
    LeftParen,
    #[token(")")]
    RightParen,
    #[token(":=")]
    Declare,
    #[token("=")]
    Assign,
    #[token(",")]
    Comma,

    // Data references
    #[token(".")]
    Dot,
    #[regex(r"\.[A-Za-z_][A-Za-z0-9_]*", |lex| lex.slice()[1..].to_string())]
    Field(String),
    #[regex(r"\$[A-Za-z0-9_]*", |lex| lex.slice()[1..].to_string())]
    Variable(String),

    // Keywords
    #[token("if")]
    If,
    #[token("else")]
    Else,
    #[token("end")]
    End,
    #[token("range")]
    Range,
    #[token("with")]
    With,
    #[token("define")]
    Define,
    #[token("block")]
    Block,
    #[token("template")]
    Template,
    #[token("break")]
    Break,
    #[token("continue")]
    Continue,
    #[token("true")]
    True,
    #[token("false")]
    False,
    #[token("nil")]
    Nil,

    // Function names
    #[regex(r"[A-Za-z_][A-Za-z0-9_]*", |lex| lex.slice().to_string())]
    Identifier(String),

    // Literals
    #[regex(r"-?[0-9]+", |lex| lex.slice().parse::<i64>().ok())]
    #[regex(r"-?0[xX][0-9a-fA-F]+", parse_hex)]
    Int(i64),
    #[regex(r"-?[0-9]+\.[0-9]+([eE][-+]?[0-9]+)?", |lex| lex.slice().parse::<f64>().ok())]
    Float(f64),
    #[regex(r#""([^"\\]|\\.)*""#, unquote)]
    #[regex(r"`[^`]*`", |lex| { let s = lex.slice(); s[1..s.len() - 1].to_string() })]
    String(String),
}

impl Token {
    /// Short human-readable form used in syntax errors
    pub fn describe(&self) -> String {
        match self {
            Token::Pipe => "'|'".to_string(),
            Token::LeftParen => "'('".to_string(),
            Token::RightParen => "')'".to_string(),
            Token::Declare => "':='".to_string(),
            Token::Assign => "'='".to_string(),
            Token::Comma => "','".to_string(),
            Token::Dot => "'.'".to_string(),
            Token::Field(name) => format!("field .{}", name),
            Token::Variable(name) => format!("variable ${}", name),
            Token::Identifier(name) => format!("identifier {}", name),
            Token::Int(value) => format!("number {}", value),
            Token::Float(value) => format!("number {}", value),
            Token::String(value) => format!("string {:?}", value),
            Token::True => "true".to_string(),
            Token::False => "false".to_string(),
            Token::Nil => "nil".to_string(),
            keyword => format!("keyword {:?}", keyword).to_lowercase(),
        }
    }
}

fn parse_hex(lex: &mut logos::Lexer<Token>) -> Option<i64> {
    let slice = lex.slice();
    let (negative, digits) = match slice.strip_prefix('-') {
        Some(rest) => (true, &rest[2..]),
        None => (false, &slice[2..]),
    };
    let value = i64::from_str_radix(digits, 16).ok()?;
    Some(if negative { -value } else { value })
}

fn unquote(lex: &mut logos::Lexer<Token>) -> Option<String> {
    let slice = lex.slice();
    let body = &slice[1..slice.len() - 1];
    let mut out = String::with_capacity(body.len());
    let mut chars = body.chars();
    while let Some(c) = chars.next() {
        if c != '\\' {
            out.push(c);
            continue;
        }
        match chars.next()? {
            'n' => out.push('\n'),
            't' => out.push('\t'),
            'r' => out.push('\r'),
            '0' => out.push('\0'),
            '\\' => out.push('\\'),
            '"' => out.push('"'),
            '\'' => out.push('\''),
            'x' => {
                let hex: String = chars.by_ref().take(2).collect();
                out.push(char::from(u8::from_str_radix(&hex, 16).ok()?));
            }
            'u' => {
                let hex: String = chars.by_ref().take(4).collect();
                out.push(char::from_u32(u32::from_str_radix(&hex, 16).ok()?)?);
            }
            _ => return None,
        }
    }
    Some(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn kinds(source: &str) -> Vec<Token> {
        Token::lexer(source).map(|t| t.expect("valid token")).collect()
    }

    #[test]
    fn test_field_chain_tokens() {
        assert_eq!(
            kinds(".User.Name"),
            vec![
                Token::Field("User".to_string()),
                Token::Field("Name".to_string())
            ]
        );
    }

    #[test]
    fn test_dot_and_variables() {
        assert_eq!(
            kinds(". $ $x"),
            vec![
                Token::Dot,
                Token::Variable(String::new()),
                Token::Variable("x".to_string())
            ]
        );
    }

    #[test]
    fn test_keywords_win_over_identifiers() {
        assert_eq!(
            kinds("if iffy end"),
            vec![
                Token::If,
                Token::Identifier("iffy".to_string()),
                Token::End
            ]
        );
    }

    #[test]
    fn test_numbers() {
        assert_eq!(
            kinds("42 -7 0x1F 1.5"),
            vec![
                Token::Int(42),
                Token::Int(-7),
                Token::Int(31),
                Token::Float(1.5)
            ]
        );
    }

    #[test]
    fn test_strings_are_unquoted() {
        assert_eq!(
            kinds(r#""a\"b\n" `raw\n`"#),
            vec![
                Token::String("a\"b\n".to_string()),
                Token::String("raw\\n".to_string())
            ]
        );
    }

    #[test]
    fn test_declaration_tokens() {
        assert_eq!(
            kinds("$k, $v := range .Items"),
            vec![
                Token::Variable("k".to_string()),
                Token::Comma,
                Token::Variable("v".to_string()),
                Token::Declare,
                Token::Range,
                Token::Field("Items".to_string())
            ]
        );
    }

    #[test]
    fn test_invalid_character() {
        let mut lexer = Token::lexer("#");
        assert_eq!(lexer.next(), Some(Err(())));
    }
}
