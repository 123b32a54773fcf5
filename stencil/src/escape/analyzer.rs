//! Escaping analyzer
//!
//!     Walks a template tree with the [`Context`] in force at each node. Text
//!     nodes advance the context, actions receive the escaper stages for the
//!     context they print in, and control constructs reconcile the contexts
//!     their paths end in.
//!
//!     Called templates are analyzed under the context at the call site and
//!     memoized with their entry and exit context. A template reached again
//!     while it is still being walked is assumed to end where it started;
//!     the assumption is checked once its walk completes.
//!
//! Ranges
//!
//!     A range body can run again right after it ends. Its exit context,
//!     joined with the contexts at every `break` and `continue`, is the
//!     re-entry context. When that differs from the entry context the body is
//!     walked a second time from it; the second walk must choose the same
//!     escapers and end in a joinable context.
//!
//!     All rewriting happens on copies. Nothing is written back to the set
//!     unless the whole analysis succeeds.

use super::context::{Context, Delim, JsCtx, State, UrlPart};
use super::error::AnalysisError;
use super::escapers::Escaper;
use super::transition::advance;
use crate::funcs::builtins::PREDEFINED_ESCAPERS;
use crate::lexing::Pos;
use crate::parsing::{ActionNode, Arg, BranchNode, Command, Node, Pipeline, Tree};
use crate::set::{Mode, RegistryError, TemplateSet};
use std::collections::HashMap;
use tracing::{debug, trace, warn};

/// Entry and exit context of an analyzed template
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Escaped {
    pub entry: Context,
    pub exit: Context,
}

/// Analyze template `name` and everything it calls, returning a copy of the
/// set with escaper stages in place.
///
/// Text-mode sets are returned unchanged.
pub fn analyze(name: &str, set: &TemplateSet) -> Result<TemplateSet, AnalysisError> {
    if set.mode() == Mode::Text {
        return Ok(set.clone());
    }
    let mut analyzer = Analyzer::new(set);
    let result = analyzer
        .escape_template(name, Context::default(), name, Pos::default())
        .and_then(|exit| match exit.state {
            State::Text => Ok(()),
            _ => Err(AnalysisError::UnterminatedContext {
                template: name.to_string(),
                context: exit,
            }),
        });
    if let Err(err) = result {
        warn!(template = name, error = %err, "escaping analysis failed");
        return Err(err);
    }

    debug!(
        template = name,
        rewritten = analyzer.rewritten.len(),
        "escaping analysis complete"
    );
    let mut out = set.clone();
    out.commit_escaped(analyzer.rewritten, analyzer.memo);
    Ok(out)
}

struct InProgress {
    entry: Context,
    recursed: bool,
}

struct Analyzer<'a> {
    set: &'a TemplateSet,
    memo: HashMap<String, Escaped>,
    in_progress: HashMap<String, InProgress>,
    rewritten: HashMap<String, Tree>,
    /// Contexts at `break`/`continue`, one entry per enclosing range
    loops: Vec<Vec<(Pos, Context)>>,
}

impl<'a> Analyzer<'a> {
    fn new(set: &'a TemplateSet) -> Self {
        Analyzer {
            set,
            memo: set.escaped_templates().clone(),
            in_progress: HashMap::new(),
            rewritten: HashMap::new(),
            loops: Vec::new(),
        }
    }

    fn escape_template(
        &mut self,
        name: &str,
        entry: Context,
        caller: &str,
        pos: Pos,
    ) -> Result<Context, AnalysisError> {
        let conflict = |previous: Context| AnalysisError::ContextConflict {
            template: caller.to_string(),
            pos,
            callee: name.to_string(),
            context: entry,
            previous,
        };
        if let Some(done) = self.memo.get(name) {
            return match done.entry == entry {
                true => Ok(done.exit),
                false => Err(conflict(done.entry)),
            };
        }
        if let Some(progress) = self.in_progress.get_mut(name) {
            if progress.entry != entry {
                return Err(conflict(progress.entry));
            }
            progress.recursed = true;
            return Ok(entry);
        }

        let mut tree = self
            .set
            .tree(name)
            .map(|tree| Tree::clone(tree))
            .ok_or_else(|| RegistryError::UndefinedTemplate {
                name: name.to_string(),
            })?;
        debug!(template = name, context = %entry, "analyzing template");
        self.in_progress.insert(
            name.to_string(),
            InProgress {
                entry,
                recursed: false,
            },
        );
        let result = self.escape_list(name, entry, &mut tree.nodes);
        let recursed = self
            .in_progress
            .remove(name)
            .is_some_and(|progress| progress.recursed);
        let exit = result?;
        if recursed && exit != entry {
            return Err(AnalysisError::AmbiguousContext {
                template: name.to_string(),
                pos: tree.nodes.first().map(Node::pos).unwrap_or_default(),
                message: format!(
                    "recursive call assumes the template ends in {}, but it ends in {}",
                    entry, exit
                ),
            });
        }

        self.memo.insert(name.to_string(), Escaped { entry, exit });
        self.rewritten.insert(name.to_string(), tree);
        Ok(exit)
    }

    fn escape_list(
        &mut self,
        template: &str,
        mut ctx: Context,
        nodes: &mut [Node],
    ) -> Result<Context, AnalysisError> {
        for node in nodes {
            ctx = self.escape_node(template, ctx, node)?;
        }
        Ok(ctx)
    }

    fn escape_node(
        &mut self,
        template: &str,
        ctx: Context,
        node: &mut Node,
    ) -> Result<Context, AnalysisError> {
        match node {
            Node::Text(text) => {
                let next = advance(ctx, &text.text).map_err(|slash| {
                    AnalysisError::AmbiguousContext {
                        template: template.to_string(),
                        pos: text.pos,
                        message: format!(
                            "'/' at byte {} of this text could start a division or a regular expression",
                            slash.offset
                        ),
                    }
                })?;
                trace!(template, pos = %text.pos, from = %ctx, to = %next, "text");
                Ok(next)
            }
            Node::Action(action) => escape_action(template, ctx, action),
            Node::If(branch) => self.escape_branch(template, ctx, branch, "if"),
            Node::With(branch) => self.escape_branch(template, ctx, branch, "with"),
            Node::Range(branch) => self.escape_range(template, ctx, branch),
            Node::Template(call) => self.escape_template(&call.name, ctx, template, call.pos),
            Node::Break(pos) | Node::Continue(pos) => {
                if let Some(jumps) = self.loops.last_mut() {
                    jumps.push((*pos, ctx));
                }
                Ok(ctx)
            }
        }
    }

    fn escape_branch(
        &mut self,
        template: &str,
        ctx: Context,
        branch: &mut BranchNode,
        construct: &str,
    ) -> Result<Context, AnalysisError> {
        let then_exit = self.escape_list(template, ctx, &mut branch.body)?;
        let else_exit = match &mut branch.else_body {
            Some(nodes) => self.escape_list(template, ctx, nodes)?,
            None => ctx,
        };
        join(template, branch.pos, then_exit, else_exit, construct)
    }

    fn escape_range(
        &mut self,
        template: &str,
        ctx: Context,
        branch: &mut BranchNode,
    ) -> Result<Context, AnalysisError> {
        let original = branch.body.clone();
        let body_exit = self.escape_loop_body(template, ctx, &mut branch.body, branch.pos)?;

        if body_exit != ctx {
            trace!(template, pos = %branch.pos, context = %body_exit, "range re-entry");
            let mut again = original;
            let again_exit = self
                .escape_loop_body(template, body_exit, &mut again, branch.pos)
                .map_err(|err| on_reentry(err, branch.pos))?;
            if again != branch.body {
                return Err(AnalysisError::AmbiguousContext {
                    template: template.to_string(),
                    pos: branch.pos,
                    message: format!(
                        "on range loop re-entry: actions need different escaping in {} and {}",
                        ctx, body_exit
                    ),
                });
            }
            join(template, branch.pos, body_exit, again_exit, "range")
                .map_err(|err| on_reentry(err, branch.pos))?;
        }

        let else_exit = match &mut branch.else_body {
            Some(nodes) => self.escape_list(template, ctx, nodes)?,
            None => ctx,
        };
        join(template, branch.pos, body_exit, else_exit, "range")
    }

    /// Walk one pass of a range body and join its exit with every
    /// `break`/`continue` inside it.
    fn escape_loop_body(
        &mut self,
        template: &str,
        ctx: Context,
        body: &mut [Node],
        pos: Pos,
    ) -> Result<Context, AnalysisError> {
        self.loops.push(Vec::new());
        let exit = self.escape_list(template, ctx, body);
        let jumps = self.loops.pop().unwrap_or_default();
        let mut exit = exit?;
        for (jump_pos, jump_ctx) in jumps {
            exit = exit.join(jump_ctx).ok_or_else(|| AnalysisError::AmbiguousContext {
                template: template.to_string(),
                pos: jump_pos,
                message: format!(
                    "{{{{range}}}} at {} branches end in different contexts: {} and {}",
                    pos, exit, jump_ctx
                ),
            })?;
        }
        Ok(exit)
    }
}

fn join(
    template: &str,
    pos: Pos,
    a: Context,
    b: Context,
    construct: &str,
) -> Result<Context, AnalysisError> {
    a.join(b).ok_or_else(|| AnalysisError::AmbiguousContext {
        template: template.to_string(),
        pos,
        message: format!(
            "{{{{{}}}}} branches end in different contexts: {} and {}",
            construct, a, b
        ),
    })
}

/// Problems found while walking a range body a second time are problems of
/// the loop, not of the action they surfaced at.
fn on_reentry(err: AnalysisError, range_pos: Pos) -> AnalysisError {
    let (template, message) = match err {
        AnalysisError::AmbiguousContext {
            template, message, ..
        } => (template, message),
        AnalysisError::UnsafeContext {
            template,
            action,
            context,
            ..
        } => (
            template,
            format!("{} appears in unsafe context {}", action, context),
        ),
        other => return other,
    };
    AnalysisError::AmbiguousContext {
        template,
        pos: range_pos,
        message: format!("on range loop re-entry: {}", message),
    }
}

fn escape_action(
    template: &str,
    ctx: Context,
    action: &mut ActionNode,
) -> Result<Context, AnalysisError> {
    strip_escapers(&mut action.pipe);
    if action.pipe.is_binding() {
        return Ok(ctx);
    }
    if let Some(name) = predefined_escaper(&action.pipe) {
        return Err(AnalysisError::PredefinedEscaper {
            template: template.to_string(),
            pos: action.pos,
            name: name.to_string(),
        });
    }

    let ctx = ctx.nudge();
    let stages = escapers_for(ctx).map_err(|problem| match problem {
        Problem::Unsafe => AnalysisError::UnsafeContext {
            template: template.to_string(),
            pos: action.pos,
            action: format!("{{{{{}}}}}", action.pipe),
            context: ctx,
        },
        Problem::Ambiguous => AnalysisError::AmbiguousContext {
            template: template.to_string(),
            pos: action.pos,
            message: format!(
                "{{{{{}}}}} appears in an ambiguous context within a URL",
                action.pipe
            ),
        },
    })?;
    trace!(template, pos = %action.pos, context = %ctx, stages = stages.len(), "action");
    // A printed JS value is an operand
    let exit = match ctx.state {
        State::Js => Context {
            js_ctx: JsCtx::DivOp,
            ..ctx
        },
        _ => ctx,
    };
    action
        .pipe
        .cmds
        .extend(stages.into_iter().map(|escaper| Command {
            pos: action.pos,
            args: vec![Arg::Escaper(escaper)],
        }));
    Ok(exit)
}

/// Drop stages inserted by an earlier analysis.
fn strip_escapers(pipe: &mut Pipeline) {
    pipe.cmds
        .retain(|cmd| !matches!(cmd.args.as_slice(), [Arg::Escaper(_)]));
}

fn predefined_escaper(pipe: &Pipeline) -> Option<&str> {
    match pipe.cmds.last()?.args.first()? {
        Arg::Identifier(name) if PREDEFINED_ESCAPERS.contains(&name.as_str()) => Some(name),
        _ => None,
    }
}

enum Problem {
    Unsafe,
    Ambiguous,
}

/// Escaper stages for an action printing in `ctx` (already nudged).
fn escapers_for(ctx: Context) -> Result<Vec<Escaper>, Problem> {
    let mut stages = match ctx.state {
        State::Text => vec![Escaper::Html],
        State::RcData => vec![Escaper::RcData],
        State::Url => match ctx.url_part {
            UrlPart::None => vec![Escaper::UrlFilter, Escaper::UrlNormalizer],
            UrlPart::PreQuery => vec![Escaper::UrlNormalizer],
            UrlPart::QueryOrFragment => vec![Escaper::UrlEscaper],
            UrlPart::Unknown => return Err(Problem::Ambiguous),
        },
        State::Js => vec![Escaper::JsVal],
        State::JsDqStr | State::JsSqStr => vec![Escaper::JsStr],
        State::JsRegexp => vec![Escaper::JsRegexp],
        State::Css => vec![Escaper::CssValueFilter],
        State::CssDqStr | State::CssSqStr => vec![Escaper::CssEscaper],
        State::Attr => Vec::new(),
        State::TagOpen
        | State::EndTagOpen
        | State::Tag
        | State::AttrName
        | State::AfterName
        | State::BeforeValue
        | State::JsTmplLit
        | State::JsLineComment
        | State::JsBlockComment
        | State::CssComment
        | State::HtmlComment => return Err(Problem::Unsafe),
    };
    match ctx.delim {
        Delim::None => {}
        Delim::DoubleQuote | Delim::SingleQuote => stages.push(Escaper::Attr),
        Delim::SpaceOrTagEnd => stages.push(Escaper::UnquotedAttr),
    }
    Ok(stages)
}
