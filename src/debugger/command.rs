//! Internal commands: controller requests that must run on a program thread.

use crate::debugger::error::Error;
use crate::debugger::frame::{find_frame, Frame, FrameSelector};
use crate::debugger::thread::{ControlState, StopReason, ThreadContext, ThreadId};
use crate::debugger::variable::path::{self, Scope};
use crate::debugger::variable::resolver::MapResolver;
use crate::debugger::variable::Value;
use crate::debugger::Session;
use crate::protocol::{codec, xml, CommandId};
use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Condvar, Mutex, MutexGuard};

/// Thread a command must be executed on.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum Target {
    Thread(ThreadId),
    /// First thread that reaches the engine.
    Any,
}

#[derive(Debug, Clone, PartialEq)]
pub(crate) enum Action {
    Resume(ControlState),
    SetNextStatement {
        seq: i64,
        line: u32,
    },
    GetVariable {
        seq: i64,
        frame: FrameSelector,
        scope: Scope,
        path: Vec<String>,
    },
    GetFrame {
        seq: i64,
        frame: FrameSelector,
    },
    Evaluate {
        seq: i64,
        frame: FrameSelector,
        expression: String,
        exec: bool,
        /// Id of the request, echoed in the response.
        response: CommandId,
    },
    ChangeVariable {
        seq: i64,
        frame: FrameSelector,
        path: Vec<String>,
        expression: String,
    },
    Completions {
        seq: i64,
        frame: FrameSelector,
        token: String,
    },
    CustomOperation {
        seq: i64,
        frame: FrameSelector,
        scope: Scope,
        path: Vec<String>,
        style: String,
        code: String,
        fn_name: String,
    },
    ExceptionTrace {
        seq: i64,
    },
    ReloadCode {
        seq: i64,
        module: String,
    },
}

#[derive(Debug, Clone, PartialEq)]
pub(crate) struct InternalCommand {
    pub(crate) target: Target,
    pub(crate) action: Action,
}

impl InternalCommand {
    pub(crate) fn new(target: Target, action: Action) -> Self {
        Self { target, action }
    }

    fn is_for(&self, id: &ThreadId) -> bool {
        match &self.target {
            Target::Thread(target) => target == id,
            Target::Any => true,
        }
    }
}

pub(crate) enum Polled {
    Command(InternalCommand),
    Terminated,
}

#[derive(Default)]
struct QueueState {
    commands: VecDeque<InternalCommand>,
    terminated: bool,
}

/// Queue of commands waiting for their threads.
///
/// Running threads poll it on every traced event, suspended threads block on it.
#[derive(Default)]
pub(crate) struct CommandQueue {
    state: Mutex<QueueState>,
    posted: Condvar,
    pending: AtomicUsize,
}

impl CommandQueue {
    fn state(&self) -> MutexGuard<'_, QueueState> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    pub(crate) fn post(&self, command: InternalCommand) -> Result<(), Error> {
        let mut state = self.state();
        if state.terminated {
            return Err(Error::SessionTerminated);
        }
        state.commands.push_back(command);
        self.pending.fetch_add(1, Ordering::SeqCst);
        self.posted.notify_all();
        Ok(())
    }

    /// Whether any command waits for execution, lock free.
    pub(crate) fn has_pending(&self) -> bool {
        self.pending.load(Ordering::SeqCst) > 0
    }

    fn take_one(&self, state: &mut QueueState, id: &ThreadId) -> Option<InternalCommand> {
        let pos = state.commands.iter().position(|cmd| cmd.is_for(id))?;
        self.pending.fetch_sub(1, Ordering::SeqCst);
        state.commands.remove(pos)
    }

    /// Remove all commands a thread can execute, in posting order.
    pub(crate) fn take_for(&self, id: &ThreadId) -> Vec<InternalCommand> {
        if !self.has_pending() {
            return vec![];
        }
        let mut state = self.state();
        std::iter::from_fn(|| self.take_one(&mut state, id)).collect()
    }

    /// Block until a command for a thread is posted or the queue is terminated.
    pub(crate) fn wait_for(&self, id: &ThreadId) -> Polled {
        let mut state = self.state();
        loop {
            if state.terminated {
                return Polled::Terminated;
            }
            if let Some(cmd) = self.take_one(&mut state, id) {
                return Polled::Command(cmd);
            }
            state = self
                .posted
                .wait(state)
                .unwrap_or_else(|e| e.into_inner());
        }
    }

    /// Drop commands addressed to a thread that is gone.
    pub(crate) fn discard_for(&self, id: &ThreadId) {
        let mut state = self.state();
        let before = state.commands.len();
        state
            .commands
            .retain(|cmd| cmd.target != Target::Thread(id.clone()));
        self.pending
            .fetch_sub(before - state.commands.len(), Ordering::SeqCst);
    }

    /// Wake up all waiters, further posts fail.
    pub(crate) fn terminate(&self) {
        let mut state = self.state();
        state.terminated = true;
        self.pending
            .fetch_sub(state.commands.len(), Ordering::SeqCst);
        state.commands.clear();
        self.posted.notify_all();
    }
}

/// What a thread does after a command.
#[derive(Debug, Clone, PartialEq)]
pub(crate) enum Flow {
    Stay,
    Resume(ControlState),
    /// Stay suspended but report a new stop.
    Resuspend(StopReason),
}

impl Session {
    /// Execute a command on the current thread, `top` is its topmost frame.
    ///
    /// Responses and errors are sent to the controller from here.
    pub(crate) fn execute(
        &self,
        ctx: &ThreadContext,
        top: &Arc<dyn Frame>,
        action: Action,
        suspended: bool,
    ) -> Flow {
        match action {
            Action::Resume(state) => {
                if suspended {
                    return Flow::Resume(state);
                }
                log::debug!(target: "debugger", "thread {} is running, resume ignored", ctx.id());
                Flow::Stay
            }
            Action::SetNextStatement { seq, line } => {
                let result = if suspended {
                    top.jump_to_line(line)
                } else {
                    Err(Error::ThreadNotSuspended(ctx.id().to_string()))
                };
                match result {
                    Ok(()) => Flow::Resuspend(StopReason::SetNextStatement),
                    Err(e) => {
                        self.respond_error(seq, &e);
                        Flow::Stay
                    }
                }
            }
            Action::GetVariable {
                seq,
                frame,
                scope,
                path,
            } => {
                let result = find_frame(top, frame).and_then(|frame| {
                    let children = path::resolve_children(
                        frame.as_ref(),
                        self.inner.runtime.as_ref(),
                        &self.inner.resolvers,
                        scope,
                        &path,
                    )?;
                    Ok(self.vars_xml(&children))
                });
                self.respond(CommandId::GetVariable, seq, result);
                Flow::Stay
            }
            Action::GetFrame { seq, frame } => {
                let result = find_frame(top, frame).map(|frame| self.vars_xml(&frame.locals()));
                self.respond(CommandId::GetFrame, seq, result);
                Flow::Stay
            }
            Action::Evaluate {
                seq,
                frame,
                expression,
                exec,
                response,
            } => {
                let result = find_frame(top, frame).and_then(|frame| {
                    let value = if exec {
                        self.inner.runtime.execute(frame.as_ref(), &expression)?
                    } else {
                        self.inner.runtime.evaluate(frame.as_ref(), &expression)?
                    };
                    Ok(self.vars_xml(&[(expression.as_str(), value)]))
                });
                self.respond(response, seq, result);
                Flow::Stay
            }
            Action::ChangeVariable {
                seq,
                frame,
                path,
                expression,
            } => {
                let result = find_frame(top, frame)
                    .and_then(|frame| self.change_variable(frame.as_ref(), &path, &expression));
                self.respond(CommandId::Return, seq, result);
                Flow::Stay
            }
            Action::Completions { seq, frame, token } => {
                let result = find_frame(top, frame).and_then(|frame| {
                    let completions = self.inner.runtime.completions(frame.as_ref(), &token)?;
                    Ok(xml::completions(&completions))
                });
                self.respond(CommandId::GetCompletions, seq, result);
                Flow::Stay
            }
            Action::CustomOperation {
                seq,
                frame,
                scope,
                path,
                style,
                code,
                fn_name,
            } => {
                let result = find_frame(top, frame).and_then(|frame| {
                    let value = path::resolve_compound_variable(
                        frame.as_ref(),
                        self.inner.runtime.as_ref(),
                        &self.inner.resolvers,
                        scope,
                        &path,
                    )?
                    .ok_or_else(|| Error::InvalidPayload("variable path", String::new()))?;
                    self.inner
                        .runtime
                        .custom_operation(&value, &style, &code, &fn_name)
                });
                self.respond(CommandId::RunCustomOperation, seq, result);
                Flow::Stay
            }
            Action::ExceptionTrace { seq } => {
                let result = ctx
                    .exception()
                    .ok_or_else(|| Error::Evaluation("no current exception".to_string()))
                    .map(|info| {
                        codec::join_fields(&[
                            info.type_name,
                            info.message,
                            xml::suspended_thread(
                                ctx.thread(),
                                ctx.control().stop_reason.unwrap_or(StopReason::Suspend),
                                top,
                                &self.inner.source_map,
                            ),
                        ])
                    });
                self.respond(CommandId::SendCurrExceptionTrace, seq, result);
                Flow::Stay
            }
            Action::ReloadCode { seq, module } => {
                match self.inner.runtime.reload_module(&module) {
                    Ok(true) => log::info!(target: "debugger", "module {module} reloaded"),
                    Ok(false) => {
                        self.respond_error(seq, &Error::NameNotFound(module));
                    }
                    Err(e) => self.respond_error(seq, &e),
                }
                Flow::Stay
            }
        }
    }

    fn vars_xml<S: AsRef<str>>(&self, vars: &[(S, Value)]) -> String {
        xml::vars(
            &self.inner.resolvers,
            vars,
            self.inner.config.max_variable_repr,
        )
    }

    /// Assign the value of `expression` to a variable addressed by an attribute path.
    fn change_variable(
        &self,
        frame: &dyn Frame,
        path: &[String],
        expression: &str,
    ) -> Result<String, Error> {
        let Some((name, parent_path)) = path.split_last() else {
            return Err(Error::InvalidPayload("variable path", String::new()));
        };
        let value = self.inner.runtime.evaluate(frame, expression)?;

        if parent_path.is_empty() {
            frame.set_local(name, value.clone())?;
        } else {
            let parent = path::resolve_compound_variable(
                frame,
                self.inner.runtime.as_ref(),
                &self.inner.resolvers,
                Scope::Frame,
                parent_path,
            )?
            .ok_or_else(|| Error::InvalidPayload("variable path", parent_path.join(".")))?;
            assign_child(&parent, name, value.clone())?;
        }

        Ok(self.vars_xml(&[(name.as_str(), value)]))
    }

    pub(crate) fn respond(&self, id: CommandId, seq: i64, result: Result<String, Error>) {
        match result {
            Ok(payload) => self.inner.outgoing.respond(id, seq, payload),
            Err(e) => self.respond_error(seq, &e),
        }
    }

    pub(crate) fn respond_error(&self, seq: i64, error: &Error) {
        log::debug!(target: "debugger", "request {seq} failed: {error:#}");
        self.inner
            .outgoing
            .respond(CommandId::Error, seq, error.to_string());
    }
}

/// Replace a child of a mutable container.
fn assign_child(parent: &Value, child: &str, value: Value) -> Result<(), Error> {
    let not_found = || Error::AttributeNotFound {
        type_name: parent.type_identity().to_string(),
        attr: child.to_string(),
    };
    match parent {
        Value::Object(obj) => {
            obj.set_attr(child, value);
            Ok(())
        }
        Value::List(items) => {
            let idx = child.parse::<usize>().map_err(|_| not_found())?;
            let mut items = items.write().unwrap_or_else(|e| e.into_inner());
            let slot = items.get_mut(idx).ok_or_else(not_found)?;
            *slot = value;
            Ok(())
        }
        Value::Dict(entries) => {
            let mut entries = entries.write().unwrap_or_else(|e| e.into_inner());
            let (_, slot) = entries
                .iter_mut()
                .find(|(k, _)| MapResolver::key_name(k) == child)
                .ok_or_else(not_found)?;
            *slot = value;
            Ok(())
        }
        _ => Err(Error::Unsupported("assignment into immutable value")),
    }
}
