//! Tree walker
//!
//!     [`State`] carries everything one render needs: the output buffer, the
//!     frame stack and the current template-call depth. It borrows the set and
//!     the function map, so any number of renders can share them.
//!
//! Frames
//!
//!     Each frame holds a dot and the variables declared while it is on top.
//!     A control construct pushes one frame for the declarations in its own
//!     pipeline and another for each run of a body. A template call swaps the
//!     whole stack for a fresh one rooted at the call's argument, so callees
//!     never see their caller's variables.

use super::error::ExecError;
use crate::funcs::{FuncKind, FuncMap};
use crate::lexing::Pos;
use crate::parsing::{Arg, BranchNode, Command, Node, Pipeline, TemplateNode};
use crate::set::{MissingKey, Mode, RegistryError, TemplateSet};
use crate::value::{MapKey, Value};
use tracing::trace;

type Result<T> = std::result::Result<T, ExecError>;

/// How a list of nodes finished
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Flow {
    Normal,
    Break,
    Continue,
}

#[derive(Debug)]
struct Frame {
    dot: Value,
    vars: Vec<(String, Value)>,
}

impl Frame {
    fn new(dot: Value) -> Self {
        Frame {
            dot,
            vars: Vec::new(),
        }
    }

    /// The bottom frame of a template, where `$` is bound.
    fn root(dot: Value) -> Self {
        Frame {
            vars: vec![(String::new(), dot.clone())],
            dot,
        }
    }
}

pub(crate) struct State<'a> {
    set: &'a TemplateSet,
    funcs: &'a FuncMap,
    template: &'a str,
    frames: Vec<Frame>,
    depth: usize,
    pub(crate) out: String,
}

impl<'a> State<'a> {
    pub(crate) fn new(set: &'a TemplateSet, funcs: &'a FuncMap, template: &'a str, data: Value) -> Self {
        State {
            set,
            funcs,
            template,
            frames: vec![Frame::root(data)],
            depth: 0,
            out: String::new(),
        }
    }

    pub(crate) fn walk_list(&mut self, nodes: &'a [Node]) -> Result<Flow> {
        for node in nodes {
            let flow = self.walk(node)?;
            if flow != Flow::Normal {
                return Ok(flow);
            }
        }
        Ok(Flow::Normal)
    }

    fn walk(&mut self, node: &'a Node) -> Result<Flow> {
        match node {
            Node::Text(text) => {
                self.out.push_str(&text.text);
                Ok(Flow::Normal)
            }
            Node::Action(action) => {
                let value = self.eval_pipeline(&action.pipe)?;
                if !action.pipe.is_binding() {
                    self.out.push_str(&value.to_text());
                }
                Ok(Flow::Normal)
            }
            Node::If(branch) => self.walk_if(branch),
            Node::With(branch) => self.walk_with(branch),
            Node::Range(branch) => self.walk_range(branch),
            Node::Template(call) => {
                self.call_template(call)?;
                Ok(Flow::Normal)
            }
            Node::Break(_) => Ok(Flow::Break),
            Node::Continue(_) => Ok(Flow::Continue),
        }
    }

    fn dot(&self) -> Value {
        self.frames
            .last()
            .map(|frame| frame.dot.clone())
            .unwrap_or_default()
    }

    /// Run `nodes` in a new frame with `dot`.
    fn walk_body(&mut self, dot: Value, nodes: &'a [Node]) -> Result<Flow> {
        self.frames.push(Frame::new(dot));
        let flow = self.walk_list(nodes);
        self.frames.pop();
        flow
    }

    /// Run `f` with a frame for the construct's own declarations.
    fn in_construct<T>(&mut self, f: impl FnOnce(&mut Self) -> Result<T>) -> Result<T> {
        let dot = self.dot();
        self.frames.push(Frame::new(dot));
        let result = f(self);
        self.frames.pop();
        result
    }

    fn walk_if(&mut self, branch: &'a BranchNode) -> Result<Flow> {
        self.in_construct(|state| {
            let test = state.eval_pipeline(&branch.pipe)?;
            let dot = state.dot();
            match (test.is_truthy(), &branch.else_body) {
                (true, _) => state.walk_body(dot, &branch.body),
                (false, Some(else_body)) => state.walk_body(dot, else_body),
                (false, None) => Ok(Flow::Normal),
            }
        })
    }

    fn walk_with(&mut self, branch: &'a BranchNode) -> Result<Flow> {
        self.in_construct(|state| {
            let value = state.eval_pipeline(&branch.pipe)?;
            match (value.is_truthy(), &branch.else_body) {
                (true, _) => state.walk_body(value, &branch.body),
                (false, Some(else_body)) => {
                    let outer = state.dot();
                    state.walk_body(outer, else_body)
                }
                (false, None) => Ok(Flow::Normal),
            }
        })
    }

    fn walk_range(&mut self, branch: &'a BranchNode) -> Result<Flow> {
        let pipe = &branch.pipe;
        self.in_construct(|state| {
            let value = state.eval_commands(pipe)?;
            let mut entries = value
                .entries()
                .ok_or_else(|| ExecError::Type {
                    template: state.template.to_string(),
                    pos: pipe.pos,
                    message: format!("range can't iterate over {}", value.type_name()),
                })?
                .peekable();
            trace!(template = state.template, pos = %branch.pos, "range");

            if entries.peek().is_none() {
                if let Some(else_body) = &branch.else_body {
                    let dot = state.dot();
                    state.walk_body(dot, else_body)?;
                }
                return Ok(Flow::Normal);
            }
            for (key, item) in entries {
                let mut frame = Frame::new(item.clone());
                match pipe.decl.as_slice() {
                    [] => {}
                    [elem] => frame.vars.push((elem.clone(), item)),
                    [key_name, elem, ..] => {
                        frame.vars.push((key_name.clone(), key));
                        frame.vars.push((elem.clone(), item));
                    }
                }
                state.frames.push(frame);
                let flow = state.walk_list(&branch.body);
                state.frames.pop();
                if flow? == Flow::Break {
                    break;
                }
            }
            Ok(Flow::Normal)
        })
    }

    fn call_template(&mut self, call: &'a TemplateNode) -> Result<()> {
        let set = self.set;
        let tree = set
            .tree(&call.name)
            .ok_or_else(|| RegistryError::UndefinedTemplate {
                name: call.name.clone(),
            })?;
        if set.mode() == Mode::Html && !set.is_escaped(&call.name) {
            return Err(ExecError::NotEscaped {
                name: call.name.clone(),
            });
        }
        let limit = set.options().max_depth;
        if self.depth >= limit {
            return Err(ExecError::RecursionLimitExceeded {
                template: self.template.to_string(),
                pos: call.pos,
                limit,
            });
        }

        let dot = match &call.pipe {
            Some(pipe) => self.eval_pipeline(pipe)?,
            None => Value::Nil,
        };
        let frames = std::mem::replace(&mut self.frames, vec![Frame::root(dot)]);
        let caller = std::mem::replace(&mut self.template, tree.name.as_str());
        self.depth += 1;
        let result = self.walk_list(&tree.nodes);
        self.depth -= 1;
        self.template = caller;
        self.frames = frames;
        result.map(|_| ())
    }

    /// Evaluate a pipeline and bind its declarations.
    fn eval_pipeline(&mut self, pipe: &'a Pipeline) -> Result<Value> {
        let value = self.eval_commands(pipe)?;
        for name in &pipe.decl {
            if pipe.is_assign {
                self.assign(pipe.pos, name, value.clone())?;
            } else if let Some(frame) = self.frames.last_mut() {
                frame.vars.push((name.clone(), value.clone()));
            }
        }
        Ok(value)
    }

    /// Evaluate a pipeline's commands, leaving its declarations alone.
    fn eval_commands(&mut self, pipe: &'a Pipeline) -> Result<Value> {
        let mut piped = None;
        for cmd in &pipe.cmds {
            piped = Some(self.eval_command(cmd, piped)?);
        }
        Ok(piped.unwrap_or_default())
    }

    fn eval_command(&mut self, cmd: &'a Command, piped: Option<Value>) -> Result<Value> {
        let Some((head, operands)) = cmd.args.split_first() else {
            return Ok(piped.unwrap_or_default());
        };
        let has_args = !operands.is_empty() || piped.is_some();
        match head {
            Arg::Identifier(name) => self.call_function(cmd.pos, name, operands, piped),
            Arg::Escaper(escaper) => Ok(escaper.apply(&piped.unwrap_or_default())),
            Arg::Field(fields) if has_args => {
                let dot = self.dot();
                self.call_method(cmd.pos, dot, fields, operands, piped)
            }
            Arg::Variable { name, fields } if has_args && !fields.is_empty() => {
                let receiver = self.variable(cmd.pos, name)?;
                self.call_method(cmd.pos, receiver, fields, operands, piped)
            }
            Arg::Chain { target, fields } if has_args => {
                let receiver = self.eval_arg(cmd.pos, target)?;
                self.call_method(cmd.pos, receiver, fields, operands, piped)
            }
            _ if has_args => Err(self.type_error(
                cmd.pos,
                format!("can't give argument to non-function {}", head),
            )),
            _ => self.eval_arg(cmd.pos, head),
        }
    }

    fn eval_arg(&mut self, pos: Pos, arg: &'a Arg) -> Result<Value> {
        match arg {
            Arg::Nil => Ok(Value::Nil),
            Arg::Bool(b) => Ok(Value::Bool(*b)),
            Arg::Int(i) => Ok(Value::Int(*i)),
            Arg::Float(f) => Ok(Value::Float(*f)),
            Arg::String(s) => Ok(Value::String(s.clone())),
            Arg::Dot => Ok(self.dot()),
            Arg::Variable { name, fields } => {
                let value = self.variable(pos, name)?;
                self.eval_fields(pos, value, fields)
            }
            Arg::Field(fields) => {
                let dot = self.dot();
                self.eval_fields(pos, dot, fields)
            }
            Arg::Chain { target, fields } => {
                let value = self.eval_arg(pos, target)?;
                self.eval_fields(pos, value, fields)
            }
            Arg::Identifier(name) => self.call_function(pos, name, &[], None),
            Arg::Pipeline(pipe) => self.eval_pipeline(pipe),
            Arg::Escaper(escaper) => Ok(escaper.apply(&Value::Nil)),
        }
    }

    fn call_function(
        &mut self,
        pos: Pos,
        name: &str,
        operands: &'a [Arg],
        piped: Option<Value>,
    ) -> Result<Value> {
        let funcs = self.funcs;
        let function = funcs.get(name).ok_or_else(|| ExecError::UndefinedFunction {
            template: self.template.to_string(),
            pos,
            name: name.to_string(),
        })?;
        let count = operands.len() + usize::from(piped.is_some());
        if !function.arity.accepts(count) {
            return Err(self.type_error(
                pos,
                format!(
                    "wrong number of args for {}: want {}, got {}",
                    name, function.arity, count
                ),
            ));
        }

        match &function.kind {
            FuncKind::And | FuncKind::Or => {
                let stop_when = matches!(function.kind, FuncKind::Or);
                let mut last = Value::Nil;
                for operand in operands {
                    let value = self.eval_arg(pos, operand)?;
                    if value.is_truthy() == stop_when {
                        return Ok(value);
                    }
                    last = value;
                }
                Ok(piped.unwrap_or(last))
            }
            FuncKind::Native(_) => {
                let mut args = operands
                    .iter()
                    .map(|operand| self.eval_arg(pos, operand))
                    .collect::<Result<Vec<_>>>()?;
                args.extend(piped);
                function.call(&args).map_err(|source| ExecError::Func {
                    template: self.template.to_string(),
                    pos,
                    name: name.to_string(),
                    source,
                })
            }
        }
    }

    /// `.A.B.Method arg...`: walk to the receiver, then invoke the last name.
    fn call_method(
        &mut self,
        pos: Pos,
        receiver: Value,
        fields: &'a [String],
        operands: &'a [Arg],
        piped: Option<Value>,
    ) -> Result<Value> {
        let Some((method, path)) = fields.split_last() else {
            return Err(self.type_error(pos, "can't give argument to non-function".to_string()));
        };
        let receiver = self.eval_fields(pos, receiver, path)?;
        let mut args = operands
            .iter()
            .map(|operand| self.eval_arg(pos, operand))
            .collect::<Result<Vec<_>>>()?;
        args.extend(piped);

        match &receiver {
            Value::Object(object) => match object.call_method(method, &args) {
                Some(result) => result.map_err(|source| ExecError::Func {
                    template: self.template.to_string(),
                    pos,
                    name: method.clone(),
                    source,
                }),
                None => Err(ExecError::NoSuchField {
                    template: self.template.to_string(),
                    pos,
                    field: method.clone(),
                    type_name: object.type_name().to_string(),
                }),
            },
            Value::Nil => Err(ExecError::NilDereference {
                template: self.template.to_string(),
                pos,
                field: method.clone(),
            }),
            other => Err(self.type_error(
                pos,
                format!(
                    "{} is not a method of {} but has arguments",
                    method,
                    other.type_name()
                ),
            )),
        }
    }

    fn eval_fields(&self, pos: Pos, mut value: Value, fields: &[String]) -> Result<Value> {
        for field in fields {
            value = self.field(pos, &value, field)?;
        }
        Ok(value)
    }

    fn field(&self, pos: Pos, receiver: &Value, name: &str) -> Result<Value> {
        let no_such_field = |type_name: &str| ExecError::NoSuchField {
            template: self.template.to_string(),
            pos,
            field: name.to_string(),
            type_name: type_name.to_string(),
        };
        match receiver {
            Value::Nil => Err(ExecError::NilDereference {
                template: self.template.to_string(),
                pos,
                field: name.to_string(),
            }),
            Value::Map(entries) => match entries.get(&MapKey::String(name.to_string())) {
                Some(value) => Ok(value.clone()),
                None => match self.set.options().missing_key {
                    MissingKey::Default => Ok(Value::Nil),
                    MissingKey::Error => Err(no_such_field("map")),
                },
            },
            Value::Object(object) => {
                if let Some(value) = object.field(name) {
                    return Ok(value);
                }
                if object.has_method(name) {
                    if let Some(result) = object.call_method(name, &[]) {
                        return result.map_err(|source| ExecError::Func {
                            template: self.template.to_string(),
                            pos,
                            name: name.to_string(),
                            source,
                        });
                    }
                }
                Err(no_such_field(object.type_name()))
            }
            other => Err(no_such_field(other.type_name())),
        }
    }

    fn variable(&self, pos: Pos, name: &str) -> Result<Value> {
        self.frames
            .iter()
            .rev()
            .flat_map(|frame| frame.vars.iter().rev())
            .find(|(var, _)| var == name)
            .map(|(_, value)| value.clone())
            .ok_or_else(|| self.type_error(pos, format!("undefined variable ${}", name)))
    }

    fn assign(&mut self, pos: Pos, name: &str, value: Value) -> Result<()> {
        let slot = self
            .frames
            .iter_mut()
            .rev()
            .flat_map(|frame| frame.vars.iter_mut().rev())
            .find(|(var, _)| var == name);
        if let Some((_, current)) = slot {
            *current = value;
            return Ok(());
        }
        Err(self.type_error(pos, format!("undefined variable ${}", name)))
    }

    fn type_error(&self, pos: Pos, message: String) -> ExecError {
        ExecError::Type {
            template: self.template.to_string(),
            pos,
            message,
        }
    }
}
