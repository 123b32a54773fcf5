//! Template syntax tree
//!
//!     A parsed source yields one [`Tree`] for its main body plus one per
//!     `define`/`block`. Trees only reference other templates by name through
//!     [`TemplateNode`], so each tree is owned outright by the set it lives in.
//!
//!     Every node renders back to template syntax through `Display`. Escaper
//!     stages inserted by the analyzer print as `_name` (for example
//!     `{{.Title | _html}}`), which makes analyzed trees easy to inspect.

use crate::escape::Escaper;
use crate::funcs::format::quote;
use crate::lexing::Pos;
use std::fmt;

/// A named body of nodes
#[derive(Debug, Clone, PartialEq)]
pub struct Tree {
    pub name: String,
    pub nodes: Vec<Node>,
}

impl Tree {
    pub fn new(name: impl Into<String>, nodes: Vec<Node>) -> Self {
        Tree {
            name: name.into(),
            nodes,
        }
    }

    /// True when the tree holds nothing but whitespace text.
    pub fn is_blank(&self) -> bool {
        self.nodes.iter().all(|node| match node {
            Node::Text(text) => text.text.trim().is_empty(),
            _ => false,
        })
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Node {
    Text(TextNode),
    Action(ActionNode),
    If(BranchNode),
    Range(BranchNode),
    With(BranchNode),
    Template(TemplateNode),
    Break(Pos),
    Continue(Pos),
}

impl Node {
    pub fn pos(&self) -> Pos {
        match self {
            Node::Text(node) => node.pos,
            Node::Action(node) => node.pos,
            Node::If(node) | Node::Range(node) | Node::With(node) => node.pos,
            Node::Template(node) => node.pos,
            Node::Break(pos) | Node::Continue(pos) => *pos,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct TextNode {
    pub pos: Pos,
    pub text: String,
}

/// `{{pipeline}}`
#[derive(Debug, Clone, PartialEq)]
pub struct ActionNode {
    pub pos: Pos,
    pub pipe: Pipeline,
}

/// Shared shape of `if`, `range` and `with`
#[derive(Debug, Clone, PartialEq)]
pub struct BranchNode {
    pub pos: Pos,
    pub pipe: Pipeline,
    pub body: Vec<Node>,
    pub else_body: Option<Vec<Node>>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CallKind {
    Template,
    Block,
}

/// `{{template "name" pipeline}}`, also produced in place of a `block`
#[derive(Debug, Clone, PartialEq)]
pub struct TemplateNode {
    pub pos: Pos,
    pub name: String,
    pub pipe: Option<Pipeline>,
    pub kind: CallKind,
}

/// Optional declarations followed by `|`-separated commands
#[derive(Debug, Clone, PartialEq)]
pub struct Pipeline {
    pub pos: Pos,
    /// Declared or assigned variable names, without the `$`
    pub decl: Vec<String>,
    /// `$x = ...` rather than `$x := ...`
    pub is_assign: bool,
    pub cmds: Vec<Command>,
}

impl Pipeline {
    /// Actions that only bind variables produce no output.
    pub fn is_binding(&self) -> bool {
        !self.decl.is_empty()
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Command {
    pub pos: Pos,
    pub args: Vec<Arg>,
}

/// One operand of a command
#[derive(Debug, Clone, PartialEq)]
pub enum Arg {
    Nil,
    Bool(bool),
    Int(i64),
    Float(f64),
    String(String),
    Dot,
    /// `$name.F.G`; the root variable has an empty name
    Variable { name: String, fields: Vec<String> },
    /// `.F.G`
    Field(Vec<String>),
    /// `(pipeline).F.G`
    Chain { target: Box<Arg>, fields: Vec<String> },
    /// A function name from the func map
    Identifier(String),
    Pipeline(Box<Pipeline>),
    /// Stage inserted by the escaping analyzer
    Escaper(Escaper),
}

impl Arg {
    /// Whether this operand can head a pipeline stage that receives a piped value.
    pub fn is_executable(&self) -> bool {
        !matches!(
            self,
            Arg::Nil | Arg::Bool(_) | Arg::Int(_) | Arg::Float(_) | Arg::String(_) | Arg::Dot
        )
    }
}

fn write_nodes(f: &mut fmt::Formatter<'_>, nodes: &[Node]) -> fmt::Result {
    nodes.iter().try_for_each(|node| write!(f, "{}", node))
}

fn write_fields(f: &mut fmt::Formatter<'_>, fields: &[String]) -> fmt::Result {
    fields.iter().try_for_each(|field| write!(f, ".{}", field))
}

impl fmt::Display for Tree {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write_nodes(f, &self.nodes)
    }
}

impl fmt::Display for Node {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let (keyword, branch) = match self {
            Node::Text(node) => return f.write_str(&node.text),
            Node::Action(node) => return write!(f, "{{{{{}}}}}", node.pipe),
            Node::Template(node) => {
                write!(f, "{{{{template {}", quote(&node.name))?;
                if let Some(pipe) = &node.pipe {
                    write!(f, " {}", pipe)?;
                }
                return f.write_str("}}");
            }
            Node::Break(_) => return f.write_str("{{break}}"),
            Node::Continue(_) => return f.write_str("{{continue}}"),
            Node::If(branch) => ("if", branch),
            Node::Range(branch) => ("range", branch),
            Node::With(branch) => ("with", branch),
        };
        write!(f, "{{{{{} {}}}}}", keyword, branch.pipe)?;
        write_nodes(f, &branch.body)?;
        if let Some(else_body) = &branch.else_body {
            f.write_str("{{else}}")?;
            write_nodes(f, else_body)?;
        }
        f.write_str("{{end}}")
    }
}

impl fmt::Display for Pipeline {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if !self.decl.is_empty() {
            let names: Vec<String> = self.decl.iter().map(|name| format!("${}", name)).collect();
            let op = if self.is_assign { "=" } else { ":=" };
            write!(f, "{} {} ", names.join(", "), op)?;
        }
        for (i, cmd) in self.cmds.iter().enumerate() {
            if i > 0 {
                f.write_str(" | ")?;
            }
            write!(f, "{}", cmd)?;
        }
        Ok(())
    }
}

impl fmt::Display for Command {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, arg) in self.args.iter().enumerate() {
            if i > 0 {
                f.write_str(" ")?;
            }
            write!(f, "{}", arg)?;
        }
        Ok(())
    }
}

impl fmt::Display for Arg {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Arg::Nil => f.write_str("nil"),
            Arg::Bool(b) => write!(f, "{}", b),
            Arg::Int(i) => write!(f, "{}", i),
            Arg::Float(x) => write!(f, "{:?}", x),
            Arg::String(s) => f.write_str(&quote(s)),
            Arg::Dot => f.write_str("."),
            Arg::Variable { name, fields } => {
                write!(f, "${}", name)?;
                write_fields(f, fields)
            }
            Arg::Field(fields) => write_fields(f, fields),
            Arg::Chain { target, fields } => {
                write!(f, "{}", target)?;
                write_fields(f, fields)
            }
            Arg::Identifier(name) => f.write_str(name),
            Arg::Pipeline(pipe) => write!(f, "({})", pipe),
            Arg::Escaper(escaper) => write!(f, "_{}", escaper.name()),
        }
    }
}
