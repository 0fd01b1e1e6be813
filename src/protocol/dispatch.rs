//! Controller request handling.

use crate::debugger::breakpoint::{Breakpoint, BreakpointKind, ExceptionBreakpoint};
use crate::debugger::command::{Action, InternalCommand, Target};
use crate::debugger::frame::{FrameSelector, Location};
use crate::debugger::thread::{ControlState, ThreadContext, ThreadId};
use crate::debugger::variable::path::Scope;
use crate::debugger::{Error, Session};
use crate::protocol::{codec, xml, CommandId, VERSION};
use std::str::FromStr;
use std::sync::Arc;

/// Address of all threads in THREAD_SUSPEND, THREAD_RUN and THREAD_KILL.
const ALL_THREADS: &str = "*";

struct Fields(Vec<String>);

impl Fields {
    fn parse(payload: &str) -> Self {
        Fields(codec::split_fields(payload))
    }

    fn required(&self, idx: usize, what: &'static str) -> Result<&str, Error> {
        self.0
            .get(idx)
            .map(String::as_str)
            .ok_or_else(|| Error::InvalidPayload(what, "missing field".to_string()))
    }

    /// Field value, `None` and empty text mean an absent value.
    fn optional(&self, idx: usize) -> Option<String> {
        self.0
            .get(idx)
            .filter(|f| !f.is_empty() && f.as_str() != "None")
            .cloned()
    }

    fn number<T: FromStr>(&self, idx: usize, what: &'static str) -> Result<T, Error> {
        let field = self.required(idx, what)?;
        field
            .trim()
            .parse()
            .map_err(|_| Error::InvalidPayload(what, field.to_string()))
    }

    fn flag(&self, idx: usize) -> bool {
        self.0
            .get(idx)
            .is_some_and(|f| matches!(f.as_str(), "true" | "True" | "1"))
    }

    /// Attribute path steps from `idx` to the end, a field may hold several
    /// tab separated steps.
    fn path_from(&self, idx: usize) -> Vec<String> {
        self.0
            .iter()
            .skip(idx)
            .flat_map(|f| split_path(f))
            .collect()
    }
}

fn split_path(field: &str) -> Vec<String> {
    field
        .split('\t')
        .filter(|step| !step.is_empty())
        .map(ToString::to_string)
        .collect()
}

impl Session {
    /// Handle a request from a controller.
    ///
    /// Failures are reported to the controller with ERROR, echoing request sequence.
    pub fn process_net_command(&self, id: u32, seq: i64, payload: &str) {
        if seq % 2 == 0 {
            self.respond_error(seq, &Error::SequenceParity(seq));
            return;
        }
        let Some(cmd) = CommandId::from_code(id) else {
            log::warn!(target: "rdbg::wire", "unknown command {id}");
            self.respond_error(seq, &Error::UnknownCommand(id));
            return;
        };
        log::debug!(target: "rdbg::wire", "<- {} {seq}", cmd.name());

        if let Err(e) = self.dispatch(cmd, seq, payload) {
            self.respond_error(seq, &e);
        }
    }

    fn dispatch(&self, cmd: CommandId, seq: i64, payload: &str) -> Result<(), Error> {
        let fields = Fields::parse(payload);
        let inner = self.inner();

        match cmd {
            CommandId::Version => {
                log::info!(target: "debugger", "controller version: {payload}");
                inner
                    .outgoing
                    .respond(CommandId::Version, seq, VERSION.to_string());
            }
            CommandId::Run => self.mark_ready(),
            CommandId::ListThreads => {
                let threads = inner.threads.all();
                inner.outgoing.respond(
                    CommandId::Return,
                    seq,
                    xml::thread_list(threads.iter().map(|ctx| ctx.thread())),
                );
            }
            CommandId::ThreadSuspend => {
                for ctx in self.addressed_threads(fields.required(0, "thread id")?)? {
                    ctx.request_suspend();
                }
            }
            CommandId::ThreadRun => {
                let target = fields.required(0, "thread id")?;
                for ctx in self.addressed_threads(target)? {
                    if target != ALL_THREADS || ctx.is_suspended() {
                        self.post(&ctx, Action::Resume(ControlState::Running))?;
                    }
                }
            }
            CommandId::ThreadKill => {
                if fields.required(0, "thread id")? != ALL_THREADS {
                    return Err(Error::Unsupported("kill a single thread"));
                }
                self.finish();
            }
            CommandId::StepInto | CommandId::StepOver | CommandId::StepReturn => {
                let state = match cmd {
                    CommandId::StepInto => ControlState::StepInto,
                    CommandId::StepOver => ControlState::StepOver,
                    _ => ControlState::StepReturn,
                };
                let ctx = self.thread(fields.required(0, "thread id")?)?;
                self.post(&ctx, Action::Resume(state))?;
            }
            CommandId::RunToLine => {
                let ctx = self.thread(fields.required(0, "thread id")?)?;
                let state = ControlState::RunToLine {
                    line: fields.number(1, "line")?,
                    function: fields.optional(2),
                };
                self.post(&ctx, Action::Resume(state))?;
            }
            CommandId::SetNextStatement => {
                let ctx = self.thread(fields.required(0, "thread id")?)?;
                let line = fields.number(1, "line")?;
                self.post(&ctx, Action::SetNextStatement { seq, line })?;
            }
            CommandId::GetVariable => {
                let ctx = self.thread(fields.required(0, "thread id")?)?;
                let action = Action::GetVariable {
                    seq,
                    frame: FrameSelector::parse(fields.required(1, "frame id")?)?,
                    scope: Scope::parse(fields.required(2, "scope")?)?,
                    path: fields.path_from(3),
                };
                self.post(&ctx, action)?;
            }
            CommandId::GetFrame => {
                let ctx = self.thread(fields.required(0, "thread id")?)?;
                let frame = FrameSelector::parse(fields.required(1, "frame id")?)?;
                self.post(&ctx, Action::GetFrame { seq, frame })?;
            }
            CommandId::EvaluateExpression | CommandId::ExecExpression => {
                let ctx = self.thread(fields.required(0, "thread id")?)?;
                let action = Action::Evaluate {
                    seq,
                    frame: FrameSelector::parse(fields.required(1, "frame id")?)?,
                    expression: fields.required(2, "expression")?.to_string(),
                    exec: cmd == CommandId::ExecExpression || fields.flag(3),
                    response: cmd,
                };
                self.post(&ctx, action)?;
            }
            CommandId::ChangeVariable => {
                let ctx = self.thread(fields.required(0, "thread id")?)?;
                let action = Action::ChangeVariable {
                    seq,
                    frame: FrameSelector::parse(fields.required(1, "frame id")?)?,
                    path: split_path(fields.required(2, "attribute path")?),
                    expression: fields.required(3, "expression")?.to_string(),
                };
                self.post(&ctx, action)?;
            }
            CommandId::GetCompletions => {
                let ctx = self.thread(fields.required(0, "thread id")?)?;
                let action = Action::Completions {
                    seq,
                    frame: FrameSelector::parse(fields.required(1, "frame id")?)?,
                    token: fields.required(2, "token")?.to_string(),
                };
                self.post(&ctx, action)?;
            }
            CommandId::RunCustomOperation => {
                let ctx = self.thread(fields.required(0, "thread id")?)?;
                let action = Action::CustomOperation {
                    seq,
                    frame: FrameSelector::parse(fields.required(1, "frame id")?)?,
                    scope: Scope::parse(fields.required(2, "scope")?)?,
                    path: split_path(fields.required(3, "attribute path")?),
                    style: fields.required(4, "style")?.to_string(),
                    code: fields.required(5, "code")?.to_string(),
                    fn_name: fields.required(6, "function name")?.to_string(),
                };
                self.post(&ctx, action)?;
            }
            CommandId::SendCurrExceptionTrace => {
                let ctx = self.thread(fields.required(0, "thread id")?)?;
                self.post(&ctx, Action::ExceptionTrace { seq })?;
            }
            CommandId::SetBreak => self.set_break(&fields)?,
            CommandId::RemoveBreak => {
                let kind = parse_kind(fields.required(1, "breakpoint kind")?)?;
                let file = fields.required(2, "file")?;
                match kind {
                    BreakpointKind::Line => {
                        let id = fields.number(0, "breakpoint id")?;
                        let file = Location::new(&inner.source_map.to_server(file), 0).file;
                        inner.breakpoints.remove(id, &file);
                    }
                    BreakpointKind::Exception => {
                        inner.breakpoints.remove_exception(file);
                    }
                }
            }
            CommandId::SetPyException => {
                let notify_always = fields.flag(0);
                let notify_on_terminate = fields.flag(1);
                let breakpoints = fields
                    .0
                    .iter()
                    .skip(2)
                    .filter(|name| !name.is_empty())
                    .map(|name| ExceptionBreakpoint {
                        type_name: name.clone(),
                        notify_always,
                        notify_on_terminate,
                    })
                    .collect();
                inner.breakpoints.set_exceptions(breakpoints);
            }
            CommandId::IgnoreThrownExceptionAt => {
                let file = inner.source_map.to_server(fields.required(0, "file")?);
                let line = fields.number(1, "line")?;
                inner.breakpoints.ignore_exceptions_at(Location::new(&file, line));
            }
            CommandId::EnableDontTrace => {
                inner.file_filter.set_enabled(fields.flag(0));
                // memoized skips depend on the denylist
                inner.breakpoints.invalidate();
            }
            CommandId::ReloadCode => {
                let module = fields.required(0, "module")?.to_string();
                inner
                    .commands
                    .post(InternalCommand::new(Target::Any, Action::ReloadCode { seq, module }))?;
            }
            CommandId::GetFileContents => {
                let file = inner.source_map.to_server(fields.required(0, "file")?);
                let content = std::fs::read_to_string(&file)?;
                inner
                    .outgoing
                    .respond(CommandId::GetFileContents, seq, content);
            }
            CommandId::ThreadCreate
            | CommandId::WriteToConsole
            | CommandId::GetBreakpointException
            | CommandId::StepCaughtException
            | CommandId::SendCurrExceptionTraceProceeded
            | CommandId::SignatureCallTrace
            | CommandId::Return
            | CommandId::Error => return Err(Error::UnexpectedCommand(cmd.name())),
        }
        Ok(())
    }

    fn set_break(&self, fields: &Fields) -> Result<(), Error> {
        let inner = self.inner();
        let kind = parse_kind(fields.required(1, "breakpoint kind")?)?;
        let file = fields.required(2, "file")?;
        match kind {
            BreakpointKind::Line => {
                let file = inner.source_map.to_server(file);
                let breakpoint = Breakpoint {
                    condition: fields.optional(4),
                    expression: fields.optional(5),
                    function: fields.optional(6),
                    ..Breakpoint::new(
                        fields.number(0, "breakpoint id")?,
                        Location::new(&file, fields.number(3, "line")?),
                    )
                };
                inner.breakpoints.add(breakpoint);
            }
            BreakpointKind::Exception => {
                inner.breakpoints.add_exception(ExceptionBreakpoint {
                    type_name: file.to_string(),
                    notify_always: true,
                    notify_on_terminate: true,
                });
            }
        }
        Ok(())
    }

    fn thread(&self, id: &str) -> Result<Arc<ThreadContext>, Error> {
        self.inner()
            .threads
            .get(&ThreadId::from(id))
            .ok_or_else(|| Error::ThreadNotFound(id.to_string()))
    }

    fn addressed_threads(&self, id: &str) -> Result<Vec<Arc<ThreadContext>>, Error> {
        if id == ALL_THREADS {
            return Ok(self.inner().threads.all());
        }
        self.thread(id).map(|ctx| vec![ctx])
    }

    fn post(&self, ctx: &ThreadContext, action: Action) -> Result<(), Error> {
        self.inner()
            .commands
            .post(InternalCommand::new(Target::Thread(ctx.id().clone()), action))
    }
}

fn parse_kind(kind: &str) -> Result<BreakpointKind, Error> {
    BreakpointKind::from_str(kind).map_err(|_| Error::InvalidPayload("breakpoint kind", kind.to_string()))
}
