//! Recursive descent over scanned segments
//!
//!     The parser walks the segment stream once. Text segments become text
//!     nodes; each action segment is tokenized on demand and dispatched on its
//!     first token. Control constructs recurse into [`Parser::parse_list`], which
//!     returns when it meets `{{end}}`, `{{else ...}}` or the end of input, and the
//!     caller decides whether that terminator is legal where it was found.
//!
//! Names Resolved While Parsing
//!
//!     Variables and function identifiers are checked here, not at execution
//!     time. The parser keeps a stack of visible variable names: a control
//!     construct's declarations are visible in its body and else branch, a
//!     body's own declarations end with the body. `define` and `block` bodies
//!     start over with only `$`. Function identifiers must exist in the
//!     [`FuncMap`] handed to the parser and be called with an argument count
//!     their [`Arity`](crate::funcs::Arity) accepts. A piped value counts as
//!     the final argument.
//!
//! Field Chains
//!
//!     `.A.B`, `$x.A` and `(pipeline).A` are recognized by token adjacency: a
//!     field token that starts exactly where the previous operand ended
//!     continues the chain. Any other token glued to an operand is an error.

use super::ast::{
    ActionNode, Arg, BranchNode, CallKind, Command, Node, Pipeline, TemplateNode, TextNode, Tree,
};
use super::error::ParseError;
use crate::funcs::FuncMap;
use crate::lexing::{scan, tokenize_action, Delimiters, LineIndex, Pos, Scanned, Segment, Token};
use std::ops::Range;
use tracing::{debug, trace};

/// Result of parsing one source: its main body and every `define`/`block` in it
#[derive(Debug, Clone, PartialEq)]
pub struct Parsed {
    pub name: String,
    pub main: Tree,
    pub defines: Vec<Tree>,
}

/// Scan and parse `source` as template `name`.
pub fn parse(
    name: &str,
    source: &str,
    delims: &Delimiters,
    funcs: &FuncMap,
) -> Result<Parsed, crate::Error> {
    let scanned = scan(name, source, delims)?;
    Ok(parse_segments(&scanned, funcs)?)
}

/// Parse already scanned segments.
pub fn parse_segments(scanned: &Scanned, funcs: &FuncMap) -> Result<Parsed, ParseError> {
    let mut parser = Parser {
        name: &scanned.name,
        segments: &scanned.segments,
        index: 0,
        lines: &scanned.lines,
        funcs,
        vars: vec![String::new()],
        range_depth: 0,
        depth: 0,
        defines: Vec::new(),
    };
    let nodes = parser.parse_top()?;
    debug!(
        template = %scanned.name,
        nodes = nodes.len(),
        defines = parser.defines.len(),
        "parsed template"
    );
    Ok(Parsed {
        name: scanned.name.clone(),
        main: Tree::new(scanned.name.clone(), nodes),
        defines: parser.defines,
    })
}

type Spanned = (Token, Range<usize>);

/// Tokens of one action with a read cursor
struct Action {
    pos: Pos,
    /// Absolute offset just past the body
    end: usize,
    tokens: Vec<Spanned>,
    index: usize,
}

impl Action {
    fn peek(&self) -> Option<&Token> {
        self.tokens.get(self.index).map(|(token, _)| token)
    }

    fn peek_nth(&self, n: usize) -> Option<&Token> {
        self.tokens.get(self.index + n).map(|(token, _)| token)
    }

    fn next(&mut self) -> Option<Spanned> {
        let item = self.tokens.get(self.index).cloned();
        if item.is_some() {
            self.index += 1;
        }
        item
    }

    fn is_done(&self) -> bool {
        self.index >= self.tokens.len()
    }

    /// Offset of the upcoming token, or the end of the body.
    fn offset(&self) -> usize {
        self.tokens
            .get(self.index)
            .map_or(self.end, |(_, span)| span.start)
    }

    /// Whether the upcoming token is glued to whatever ended at `end`.
    fn touches(&self, end: usize) -> bool {
        self.tokens
            .get(self.index)
            .is_some_and(|(_, span)| span.start == end)
    }
}

/// Why [`Parser::parse_list`] returned
enum Stop {
    End(Pos),
    Else(Pos, Action),
    Eof,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Construct {
    If,
    Range,
    With,
    Define,
    Block,
}

impl Construct {
    fn name(self) -> &'static str {
        match self {
            Construct::If => "if",
            Construct::Range => "range",
            Construct::With => "with",
            Construct::Define => "define",
            Construct::Block => "block",
        }
    }
}

/// Where a pipeline appears; decides whether declarations are allowed
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Context {
    Command,
    If,
    Range,
    With,
    Template,
    Paren,
}

impl Context {
    fn name(self) -> &'static str {
        match self {
            Context::Command => "command",
            Context::If => "if",
            Context::Range => "range",
            Context::With => "with",
            Context::Template => "template",
            Context::Paren => "parenthesized pipeline",
        }
    }

    fn allows_declarations(self) -> bool {
        matches!(
            self,
            Context::Command | Context::If | Context::Range | Context::With
        )
    }
}

struct Parser<'a> {
    name: &'a str,
    segments: &'a [Segment],
    index: usize,
    lines: &'a LineIndex,
    funcs: &'a FuncMap,
    /// Visible variable names, innermost last
    vars: Vec<String>,
    range_depth: usize,
    /// Open control constructs and definitions
    depth: usize,
    defines: Vec<Tree>,
}

impl<'a> Parser<'a> {
    fn syntax(&self, offset: usize, message: impl Into<String>) -> ParseError {
        self.syntax_at(self.lines.locate(offset), message)
    }

    fn syntax_at(&self, pos: Pos, message: impl Into<String>) -> ParseError {
        ParseError::Syntax {
            template: self.name.to_string(),
            pos,
            message: message.into(),
        }
    }

    fn unmatched(&self, pos: Pos, construct: &str, detail: &str) -> ParseError {
        ParseError::UnmatchedBlock {
            template: self.name.to_string(),
            pos,
            construct: construct.to_string(),
            detail: detail.to_string(),
        }
    }

    fn unclosed(&self, construct: Construct, pos: Pos) -> ParseError {
        self.unmatched(pos, construct.name(), "missing {{end}}")
    }

    fn tokenize(&self, body: &str, pos: Pos, body_offset: usize) -> Result<Action, ParseError> {
        let tokens = tokenize_action(body, body_offset)
            .map_err(|offset| self.syntax(offset, "unexpected character in action"))?;
        Ok(Action {
            pos,
            end: body_offset + body.len(),
            tokens,
            index: 0,
        })
    }

    fn expect_done(&self, action: &Action, what: &str) -> Result<(), ParseError> {
        match action.tokens.get(action.index) {
            None => Ok(()),
            Some((token, span)) => Err(self.syntax(
                span.start,
                format!("unexpected {} in {}", token.describe(), what),
            )),
        }
    }

    fn parse_top(&mut self) -> Result<Vec<Node>, ParseError> {
        let (nodes, stop) = self.parse_list()?;
        match stop {
            Stop::Eof => Ok(nodes),
            Stop::End(pos) => Err(self.unmatched(pos, "end", "no open block")),
            Stop::Else(pos, _) => Err(self.unmatched(pos, "else", "no open if, range or with")),
        }
    }

    fn parse_list(&mut self) -> Result<(Vec<Node>, Stop), ParseError> {
        let segments = self.segments;
        let mut nodes = Vec::new();

        while let Some(segment) = segments.get(self.index) {
            self.index += 1;
            let (body, pos, body_offset) = match segment {
                Segment::Text { text, pos } => {
                    nodes.push(Node::Text(TextNode {
                        pos: *pos,
                        text: text.clone(),
                    }));
                    continue;
                }
                Segment::Action {
                    body,
                    pos,
                    body_offset,
                } => (body, *pos, *body_offset),
            };

            let mut action = self.tokenize(body, pos, body_offset)?;
            let Some(first) = action.peek().cloned() else {
                return Err(self.syntax_at(pos, "missing value for command"));
            };
            trace!(template = self.name, %pos, token = %first.describe(), "action");

            match first {
                Token::End => {
                    action.next();
                    self.expect_done(&action, "{{end}}")?;
                    return Ok((nodes, Stop::End(pos)));
                }
                Token::Else => {
                    action.next();
                    return Ok((nodes, Stop::Else(pos, action)));
                }
                Token::If => {
                    action.next();
                    nodes.push(Node::If(self.parse_branch(Construct::If, action)?));
                }
                Token::Range => {
                    action.next();
                    nodes.push(Node::Range(self.parse_branch(Construct::Range, action)?));
                }
                Token::With => {
                    action.next();
                    nodes.push(Node::With(self.parse_branch(Construct::With, action)?));
                }
                Token::Define => {
                    action.next();
                    self.parse_define(action)?;
                }
                Token::Block => {
                    action.next();
                    nodes.push(Node::Template(self.parse_block(action)?));
                }
                Token::Template => {
                    action.next();
                    nodes.push(Node::Template(self.parse_template(action)?));
                }
                Token::Break | Token::Continue => {
                    action.next();
                    let keyword = if first == Token::Break { "break" } else { "continue" };
                    self.expect_done(&action, &format!("{{{{{}}}}}", keyword))?;
                    if self.range_depth == 0 {
                        return Err(self.syntax_at(
                            pos,
                            format!("{{{{{}}}}} outside {{{{range}}}}", keyword),
                        ));
                    }
                    nodes.push(if first == Token::Break {
                        Node::Break(pos)
                    } else {
                        Node::Continue(pos)
                    });
                }
                _ => {
                    let pipe = self.parse_pipeline(&mut action, Context::Command)?;
                    nodes.push(Node::Action(ActionNode { pos, pipe }));
                }
            }
        }

        Ok((nodes, Stop::Eof))
    }

    /// `if`, `range` and `with`, from just after the keyword through the matching `end`.
    fn parse_branch(
        &mut self,
        construct: Construct,
        mut action: Action,
    ) -> Result<BranchNode, ParseError> {
        let pos = action.pos;
        let scope = self.vars.len();
        let context = match construct {
            Construct::Range => Context::Range,
            Construct::With => Context::With,
            _ => Context::If,
        };
        let pipe = self.parse_pipeline(&mut action, context)?;
        let body_scope = self.vars.len();

        self.depth += 1;
        if construct == Construct::Range {
            self.range_depth += 1;
        }
        let (body, stop) = self.parse_list()?;
        if construct == Construct::Range {
            self.range_depth -= 1;
        }
        self.vars.truncate(body_scope);

        let else_body = match stop {
            Stop::End(_) => None,
            Stop::Eof => return Err(self.unclosed(construct, pos)),
            Stop::Else(else_pos, mut rest) => match rest.peek().cloned() {
                None => {
                    let (else_body, stop) = self.parse_list()?;
                    match stop {
                        Stop::End(_) => Some(else_body),
                        Stop::Else(pos, _) => {
                            return Err(self.unmatched(
                                pos,
                                "else",
                                &format!("second {{{{else}}}} in {}", construct.name()),
                            ))
                        }
                        Stop::Eof => return Err(self.unclosed(construct, else_pos)),
                    }
                }
                // `else if` / `else with` chains share the final `end`
                Some(Token::If) if construct == Construct::If => {
                    rest.next();
                    Some(vec![Node::If(self.parse_branch(Construct::If, rest)?)])
                }
                Some(Token::With) if construct == Construct::With => {
                    rest.next();
                    Some(vec![Node::With(self.parse_branch(Construct::With, rest)?)])
                }
                Some(token) => {
                    return Err(self.syntax(
                        rest.offset(),
                        format!("unexpected {} after else in {}", token.describe(), construct.name()),
                    ))
                }
            },
        };

        self.depth -= 1;
        self.vars.truncate(scope);
        Ok(BranchNode {
            pos,
            pipe,
            body,
            else_body,
        })
    }

    fn template_name(&self, action: &mut Action, keyword: &str) -> Result<String, ParseError> {
        match action.next() {
            Some((Token::String(name), _)) => Ok(name),
            Some((_, span)) => Err(self.syntax(
                span.start,
                format!("{} name must be a string constant", keyword),
            )),
            None => Err(self.syntax_at(action.pos, format!("missing name for {}", keyword))),
        }
    }

    /// Body of a `define` or `block`, parsed with a fresh variable scope.
    fn parse_body(&mut self, construct: Construct, name: String, pos: Pos) -> Result<Tree, ParseError> {
        let vars = std::mem::replace(&mut self.vars, vec![String::new()]);
        let range_depth = std::mem::replace(&mut self.range_depth, 0);
        self.depth += 1;

        let (nodes, stop) = self.parse_list()?;
        match stop {
            Stop::End(_) => {}
            Stop::Else(pos, _) => {
                return Err(self.unmatched(pos, "else", "no open if, range or with"))
            }
            Stop::Eof => return Err(self.unclosed(construct, pos)),
        }

        self.depth -= 1;
        self.vars = vars;
        self.range_depth = range_depth;
        debug!(template = self.name, define = %name, "parsed {}", construct.name());
        Ok(Tree::new(name, nodes))
    }

    fn parse_define(&mut self, mut action: Action) -> Result<(), ParseError> {
        if self.depth > 0 {
            return Err(self.syntax_at(action.pos, "{{define}} must appear at top level"));
        }
        let name = self.template_name(&mut action, "define")?;
        self.expect_done(&action, "define")?;
        let tree = self.parse_body(Construct::Define, name, action.pos)?;
        self.defines.push(tree);
        Ok(())
    }

    fn parse_block(&mut self, mut action: Action) -> Result<TemplateNode, ParseError> {
        let pos = action.pos;
        let name = self.template_name(&mut action, "block")?;
        let pipe = self.parse_pipeline(&mut action, Context::Template)?;
        let tree = self.parse_body(Construct::Block, name.clone(), pos)?;
        self.defines.push(tree);
        Ok(TemplateNode {
            pos,
            name,
            pipe: Some(pipe),
            kind: CallKind::Block,
        })
    }

    fn parse_template(&mut self, mut action: Action) -> Result<TemplateNode, ParseError> {
        let pos = action.pos;
        let name = self.template_name(&mut action, "template")?;
        let pipe = if action.is_done() {
            None
        } else {
            Some(self.parse_pipeline(&mut action, Context::Template)?)
        };
        Ok(TemplateNode {
            pos,
            name,
            pipe,
            kind: CallKind::Template,
        })
    }

    fn parse_pipeline(&mut self, action: &mut Action, context: Context) -> Result<Pipeline, ParseError> {
        let pos = self.lines.locate(action.offset());
        let mut decl = Vec::new();
        let mut is_assign = false;

        let declares = matches!(action.peek(), Some(Token::Variable(_)))
            && matches!(
                action.peek_nth(1),
                Some(Token::Declare | Token::Assign | Token::Comma)
            );
        if declares && context.allows_declarations() {
            loop {
                let Some((Token::Variable(name), span)) = action.next() else {
                    return Err(self.syntax(action.offset(), "expected variable in declaration"));
                };
                decl.push((name, span));
                match action.next() {
                    Some((Token::Comma, span)) => {
                        if context != Context::Range || decl.len() > 1 {
                            return Err(self.syntax(span.start, "too many declarations"));
                        }
                    }
                    Some((Token::Declare, _)) => break,
                    Some((Token::Assign, _)) => {
                        is_assign = true;
                        break;
                    }
                    Some((token, span)) => {
                        return Err(self.syntax(
                            span.start,
                            format!("unexpected {} in declaration", token.describe()),
                        ))
                    }
                    None => return Err(self.syntax(action.end, "unexpected end of declaration")),
                }
            }
            if is_assign {
                if let Some((name, span)) = decl.iter().find(|(name, _)| !self.vars.contains(name)) {
                    return Err(self.syntax(span.start, format!("undefined variable ${}", name)));
                }
            }
        }

        let mut cmds = Vec::new();
        loop {
            cmds.push(self.parse_command(action, cmds.len(), context)?);
            if action.peek() == Some(&Token::Pipe) {
                action.next();
            } else {
                break;
            }
        }
        if context != Context::Paren {
            self.expect_done(action, context.name())?;
        }

        let decl: Vec<String> = decl.into_iter().map(|(name, _)| name).collect();
        if !is_assign {
            self.vars.extend(decl.iter().cloned());
        }
        Ok(Pipeline {
            pos,
            decl,
            is_assign,
            cmds,
        })
    }

    fn parse_command(
        &mut self,
        action: &mut Action,
        stage: usize,
        context: Context,
    ) -> Result<Command, ParseError> {
        let start = action.offset();
        let mut args = Vec::new();
        while let Some(token) = action.peek() {
            if matches!(token, Token::Pipe | Token::RightParen) {
                break;
            }
            let is_head = args.is_empty();
            args.push(self.parse_operand(action, is_head)?);
        }

        let Some(head) = args.first() else {
            return Err(self.syntax(start, format!("missing value for {}", context.name())));
        };
        let piped = usize::from(stage > 0);
        if stage > 0 && !head.is_executable() {
            return Err(self.syntax(
                start,
                format!("non executable command in pipeline stage {}", stage + 1),
            ));
        }
        match head {
            Arg::Identifier(name) => {
                let given = args.len() - 1 + piped;
                if let Some(function) = self.funcs.get(name) {
                    if !function.arity.accepts(given) {
                        return Err(ParseError::ArityError {
                            template: self.name.to_string(),
                            pos: self.lines.locate(start),
                            name: name.clone(),
                            want: function.arity,
                            got: given,
                        });
                    }
                }
            }
            Arg::Field(_) | Arg::Chain { .. } => {}
            Arg::Variable { fields, .. } if !fields.is_empty() => {}
            other if args.len() > 1 || stage > 0 => {
                return Err(self.syntax(
                    start,
                    format!("can't give argument to non-function {}", other),
                ))
            }
            _ => {}
        }

        Ok(Command {
            pos: self.lines.locate(start),
            args,
        })
    }

    fn parse_operand(&mut self, action: &mut Action, is_head: bool) -> Result<Arg, ParseError> {
        let Some((token, span)) = action.next() else {
            return Err(self.syntax(action.end, "missing operand"));
        };
        let mut end = span.end;

        let arg = match token {
            Token::Identifier(name) => {
                let Some(function) = self.funcs.get(&name) else {
                    return Err(self.syntax(span.start, format!("function {:?} not defined", name)));
                };
                if !is_head && !function.arity.accepts(0) {
                    return Err(ParseError::ArityError {
                        template: self.name.to_string(),
                        pos: self.lines.locate(span.start),
                        name,
                        want: function.arity,
                        got: 0,
                    });
                }
                Arg::Identifier(name)
            }
            Token::Dot => Arg::Dot,
            Token::Nil => Arg::Nil,
            Token::True => Arg::Bool(true),
            Token::False => Arg::Bool(false),
            Token::Int(i) => Arg::Int(i),
            Token::Float(x) => Arg::Float(x),
            Token::String(s) => Arg::String(s),
            Token::Field(name) => {
                let mut fields = vec![name];
                end = self.field_chain(action, end, &mut fields);
                Arg::Field(fields)
            }
            Token::Variable(name) => {
                if !self.vars.contains(&name) {
                    return Err(self.syntax(span.start, format!("undefined variable ${}", name)));
                }
                let mut fields = Vec::new();
                end = self.field_chain(action, end, &mut fields);
                Arg::Variable { name, fields }
            }
            Token::LeftParen => {
                let pipe = self.parse_pipeline(action, Context::Paren)?;
                match action.next() {
                    Some((Token::RightParen, close)) => end = close.end,
                    _ => return Err(self.syntax(span.start, "unclosed left paren")),
                }
                let target = Arg::Pipeline(Box::new(pipe));
                let mut fields = Vec::new();
                end = self.field_chain(action, end, &mut fields);
                if fields.is_empty() {
                    target
                } else {
                    Arg::Chain {
                        target: Box::new(target),
                        fields,
                    }
                }
            }
            other => {
                return Err(self.syntax(
                    span.start,
                    format!("unexpected {} in operand", other.describe()),
                ))
            }
        };

        if action.touches(end) && !matches!(action.peek(), Some(Token::Pipe | Token::RightParen)) {
            return Err(self.syntax(end, "missing space between operands"));
        }
        Ok(arg)
    }

    /// Append glued `.Field` tokens to `fields`, returning the new end offset.
    fn field_chain(&self, action: &mut Action, mut end: usize, fields: &mut Vec<String>) -> usize {
        while action.touches(end) {
            let Some(Token::Field(name)) = action.peek().cloned() else {
                break;
            };
            if let Some((_, span)) = action.next() {
                end = span.end;
            }
            fields.push(name);
        }
        end
    }
}
