//! Step and suspend state machine.

use crate::debugger::breakpoint::{Breakpoint, ExceptionInfo, Snapshot};
use crate::debugger::command::{Flow, Polled};
use crate::debugger::filter::{TraceEvent, TraceEventKind};
use crate::debugger::frame::{Frame, Location};
use crate::debugger::thread::{ControlState, StopReason, ThreadContext};
use crate::debugger::variable::render::ReprOptions;
use crate::debugger::variable::Value;
use crate::debugger::Session;
use crate::protocol::{codec, xml, CommandId};
use std::sync::Arc;

/// Outcome of an event for the state machine.
pub(crate) enum Decision {
    /// Nothing to do at this location, it may be memoized.
    NoInterest,
    /// Nothing to do now, but the location must stay traced.
    Continue,
    /// Suspend the thread in a frame.
    Suspend(StopReason, Arc<dyn Frame>),
}

impl Session {
    pub(super) fn decide(
        &self,
        ctx: &ThreadContext,
        event: &TraceEvent,
        file: &str,
        snapshot: &Snapshot,
    ) -> Decision {
        let frame = &event.frame;
        let control = ctx.control_snapshot();
        let anchored = |depth: usize| control.anchor.map_or(true, |a| depth <= a.depth);

        match &event.kind {
            TraceEventKind::Call => {
                let interested = match control.state {
                    ControlState::StepInto | ControlState::RunToLine { .. } => true,
                    _ => ctx.has_suspend_request(),
                };
                if interested
                    || snapshot.has_breakpoints_in(file)
                    || snapshot.has_exception_breakpoints()
                {
                    Decision::Continue
                } else {
                    Decision::NoInterest
                }
            }
            TraceEventKind::Line => {
                if ctx.take_suspend_request() {
                    return Decision::Suspend(StopReason::Suspend, frame.clone());
                }

                let line = frame.line();
                let breakpoints = snapshot.at(file, line);
                if let Some(reason) = self.check_breakpoints(ctx, frame, breakpoints) {
                    return Decision::Suspend(reason, frame.clone());
                }

                let reason = match &control.state {
                    ControlState::StepInto => Some(StopReason::StepInto),
                    ControlState::StepOver if anchored(frame.depth()) => Some(StopReason::StepOver),
                    ControlState::RunToLine {
                        line: target,
                        function,
                    } if *target == line
                        && function
                            .as_deref()
                            .map_or(true, |f| f == frame.function_name()) =>
                    {
                        Some(StopReason::RunToLine)
                    }
                    _ => None,
                };
                match reason {
                    Some(reason) => Decision::Suspend(reason, frame.clone()),
                    None if control.state.is_stepping() || !breakpoints.is_empty() => {
                        Decision::Continue
                    }
                    None => Decision::NoInterest,
                }
            }
            TraceEventKind::Return => {
                let reason = match control.state {
                    ControlState::StepOver => StopReason::StepOver,
                    ControlState::StepReturn => StopReason::StepReturn,
                    ControlState::StepInto | ControlState::RunToLine { .. } => {
                        return Decision::Continue
                    }
                    ControlState::Running | ControlState::Suspended => {
                        return Decision::NoInterest
                    }
                };
                if !anchored(frame.depth()) {
                    return Decision::Continue;
                }
                match frame.parent() {
                    Some(parent) => Decision::Suspend(reason, parent),
                    // leaving the outermost frame, nothing left to stop in
                    None => Decision::Continue,
                }
            }
            TraceEventKind::Exception(info) => {
                let location = Location::new(file, frame.line());
                match snapshot.exception_stop(info, &location) {
                    Some(reason) => Decision::Suspend(reason, frame.clone()),
                    None => Decision::Continue,
                }
            }
        }
    }

    /// Check line breakpoints in registration order, the first one that hits
    /// gives the stop reason and later ones are not evaluated.
    ///
    /// Log points are evaluated here and never suspend a thread.
    fn check_breakpoints(
        &self,
        ctx: &ThreadContext,
        frame: &Arc<dyn Frame>,
        breakpoints: &[Arc<Breakpoint>],
    ) -> Option<StopReason> {
        let runtime = self.inner.runtime.as_ref();
        for bp in breakpoints {
            if !bp.matches_function(frame.function_name()) {
                continue;
            }

            if let Some(condition) = &bp.condition {
                match runtime.evaluate(frame.as_ref(), condition) {
                    Ok(value) if value.is_truthy() => {}
                    Ok(_) => continue,
                    Err(e) => {
                        log::debug!(target: "debugger", "breakpoint {} condition `{condition}`: {e:#}", bp.id);
                        self.inner.outgoing.notify(
                            CommandId::GetBreakpointException,
                            codec::join_fields(&[
                                ctx.id().to_string(),
                                condition.clone(),
                                e.to_string(),
                            ]),
                        );
                        if self.inner.config.suspend_on_breakpoint_exception {
                            return Some(StopReason::Breakpoint(bp.id));
                        }
                        continue;
                    }
                }
            }

            if bp.is_log_point() {
                self.log_point(frame, bp);
                continue;
            }

            return Some(StopReason::Breakpoint(bp.id));
        }
        None
    }

    /// Print log point expression to the controller console.
    fn log_point(&self, frame: &Arc<dyn Frame>, bp: &Breakpoint) {
        let Some(expression) = &bp.expression else {
            return;
        };
        match self.inner.runtime.evaluate(frame.as_ref(), expression) {
            Ok(value) => {
                let text = self.log_point_text(&value);
                self.write_to_console(&format!("{text}\n"), 1);
            }
            Err(e) => self.write_to_console(&format!("{e}\n"), 2),
        }
    }

    /// Strings are printed as is, other values as their repr.
    fn log_point_text(&self, value: &Value) -> String {
        if let Value::Str(s) = value {
            return s.to_string();
        }
        let opts = ReprOptions {
            max_len: self.inner.config.max_variable_repr,
            ..ReprOptions::default()
        };
        self.inner
            .resolvers
            .lookup(value)
            .repr(value, &opts)
            .unwrap_or_else(|_| format!("Unable to get repr for {}", value.type_identity()))
    }

    /// Execute pending commands of a running thread.
    pub(super) fn process_pending_commands(&self, ctx: &ThreadContext, frame: &Arc<dyn Frame>) {
        for cmd in self.inner.commands.take_for(ctx.id()) {
            let flow = self.execute(ctx, frame, cmd.action, false);
            debug_assert_eq!(flow, Flow::Stay);
        }
    }

    /// Suspend a thread and serve controller commands until it resumes.
    pub(super) fn suspend(
        &self,
        ctx: &ThreadContext,
        top: Arc<dyn Frame>,
        reason: StopReason,
        exception: Option<ExceptionInfo>,
    ) {
        log::debug!(target: "debugger", "thread {} suspended at {}:{} ({reason:?})", ctx.id(), top.file(), top.line());
        ctx.set_suspended(reason);
        // request arrived together with another stop reason is satisfied by this stop
        ctx.take_suspend_request();

        if let Some(info) = &exception {
            ctx.set_exception(Some(info.clone()));
            self.inner.outgoing.notify(
                CommandId::SendCurrExceptionTrace,
                codec::join_fields(&[
                    top.id().to_string(),
                    info.type_name.clone(),
                    info.message.clone(),
                    self.suspended_xml(ctx, reason, &top),
                ]),
            );
        }
        self.inner
            .outgoing
            .notify(CommandId::ThreadSuspend, self.suspended_xml(ctx, reason, &top));

        loop {
            let cmd = match self.inner.commands.wait_for(ctx.id()) {
                Polled::Command(cmd) => cmd,
                Polled::Terminated => {
                    ctx.resume(ControlState::Running, 0);
                    break;
                }
            };
            match self.execute(ctx, &top, cmd.action, true) {
                Flow::Stay => {}
                Flow::Resume(state) => {
                    let code = state.resume_reason().code();
                    ctx.resume(state, top.depth());
                    self.notify_run(ctx, code);
                    break;
                }
                Flow::Resuspend(reason) => {
                    self.notify_run(ctx, reason.command_id().code());
                    ctx.set_suspended(reason);
                    self.inner
                        .outgoing
                        .notify(CommandId::ThreadSuspend, self.suspended_xml(ctx, reason, &top));
                }
            }
        }

        if exception.is_some() {
            ctx.set_exception(None);
            if !self.is_finished() {
                self.inner.outgoing.notify(
                    CommandId::SendCurrExceptionTraceProceeded,
                    ctx.id().to_string(),
                );
            }
        }
        log::debug!(target: "debugger", "thread {} resumed", ctx.id());
    }

    fn suspended_xml(&self, ctx: &ThreadContext, reason: StopReason, top: &Arc<dyn Frame>) -> String {
        xml::suspended_thread(ctx.thread(), reason, top, &self.inner.source_map)
    }

    fn notify_run(&self, ctx: &ThreadContext, code: u16) {
        self.inner.outgoing.notify(
            CommandId::ThreadRun,
            codec::join_fields(&[ctx.id().to_string(), code.to_string()]),
        );
    }
}
