use crate::debugger::breakpoint::ExceptionInfo;
use crate::protocol::CommandId;
use indexmap::IndexMap;
use std::fmt::{Display, Formatter};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, RwLock};

/// Thread identifier assigned by the host runtime.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ThreadId(String);

impl ThreadId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Display for ThreadId {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for ThreadId {
    fn from(id: &str) -> Self {
        Self::new(id)
    }
}

/// Thread as reported by the host.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ThreadRef {
    pub id: ThreadId,
    pub name: String,
}

impl ThreadRef {
    pub fn new(id: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            id: ThreadId::new(id),
            name: name.into(),
        }
    }
}

/// Execution control requested for a thread.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum ControlState {
    #[default]
    Running,
    StepInto,
    StepOver,
    StepReturn,
    RunToLine {
        line: u32,
        function: Option<String>,
    },
    Suspended,
}

impl ControlState {
    pub fn is_stepping(&self) -> bool {
        matches!(
            self,
            ControlState::StepInto
                | ControlState::StepOver
                | ControlState::StepReturn
                | ControlState::RunToLine { .. }
        )
    }

    /// Command id sent in THREAD_RUN when a thread resumes in this state.
    pub fn resume_reason(&self) -> CommandId {
        match self {
            ControlState::StepInto => CommandId::StepInto,
            ControlState::StepOver => CommandId::StepOver,
            ControlState::StepReturn => CommandId::StepReturn,
            ControlState::RunToLine { .. } => CommandId::RunToLine,
            ControlState::Running | ControlState::Suspended => CommandId::ThreadRun,
        }
    }
}

/// Stack depth of the frame a step started from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StepAnchor {
    pub depth: usize,
}

/// Why a thread suspended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopReason {
    /// Id of the breakpoint that hit.
    Breakpoint(u32),
    StepInto,
    StepOver,
    StepReturn,
    Suspend,
    RunToLine,
    SetNextStatement,
    CaughtException,
    UncaughtException,
}

impl StopReason {
    /// Wire code of a stop reason, the id of the command that caused a stop.
    pub fn command_id(self) -> CommandId {
        match self {
            StopReason::Breakpoint(_) => CommandId::SetBreak,
            StopReason::StepInto => CommandId::StepInto,
            StopReason::StepOver => CommandId::StepOver,
            StopReason::StepReturn => CommandId::StepReturn,
            StopReason::Suspend => CommandId::ThreadSuspend,
            StopReason::RunToLine => CommandId::RunToLine,
            StopReason::SetNextStatement => CommandId::SetNextStatement,
            StopReason::CaughtException => CommandId::StepCaughtException,
            StopReason::UncaughtException => CommandId::SetPyException,
        }
    }

    pub fn is_exception(self) -> bool {
        matches!(self, StopReason::CaughtException | StopReason::UncaughtException)
    }
}

#[derive(Debug, Default, Clone)]
pub struct Control {
    pub state: ControlState,
    pub anchor: Option<StepAnchor>,
    pub stop_reason: Option<StopReason>,
}

/// Per-thread debugger state.
#[derive(Debug)]
pub struct ThreadContext {
    thread: ThreadRef,
    control: Mutex<Control>,
    /// Set while the thread executes engine code (condition evaluation, commands,
    /// suspension), events reported in this window are ignored.
    in_engine: AtomicBool,
    suspend_requested: AtomicBool,
    exception: Mutex<Option<ExceptionInfo>>,
}

impl ThreadContext {
    pub fn new(thread: ThreadRef) -> Self {
        Self {
            thread,
            control: Mutex::default(),
            in_engine: AtomicBool::new(false),
            suspend_requested: AtomicBool::new(false),
            exception: Mutex::default(),
        }
    }

    pub fn id(&self) -> &ThreadId {
        &self.thread.id
    }

    pub fn thread(&self) -> &ThreadRef {
        &self.thread
    }

    pub fn control(&self) -> MutexGuard<'_, Control> {
        self.control.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Snapshot of the control block.
    pub fn control_snapshot(&self) -> Control {
        self.control().clone()
    }

    pub fn is_suspended(&self) -> bool {
        self.control().state == ControlState::Suspended
    }

    pub(crate) fn set_suspended(&self, reason: StopReason) {
        let mut control = self.control();
        control.state = ControlState::Suspended;
        control.anchor = None;
        control.stop_reason = Some(reason);
    }

    /// Resume a thread in `state`, steps are anchored at `depth`.
    pub(crate) fn resume(&self, state: ControlState, depth: usize) {
        let mut control = self.control();
        control.anchor = state.is_stepping().then_some(StepAnchor { depth });
        control.state = state;
        control.stop_reason = None;
    }

    pub fn request_suspend(&self) {
        self.suspend_requested.store(true, Ordering::SeqCst);
    }

    pub fn has_suspend_request(&self) -> bool {
        self.suspend_requested.load(Ordering::SeqCst)
    }

    pub(crate) fn take_suspend_request(&self) -> bool {
        self.suspend_requested.swap(false, Ordering::SeqCst)
    }

    pub fn is_in_engine(&self) -> bool {
        self.in_engine.load(Ordering::SeqCst)
    }

    /// Mark a thread as running engine code, `None` if it already does.
    pub(crate) fn enter_engine(&self) -> Option<EngineGuard<'_>> {
        self.in_engine
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .ok()
            .map(|_| EngineGuard { ctx: self })
    }

    pub(crate) fn set_exception(&self, info: Option<ExceptionInfo>) {
        *self.exception.lock().unwrap_or_else(|e| e.into_inner()) = info;
    }

    pub fn exception(&self) -> Option<ExceptionInfo> {
        self.exception
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }
}

/// Clears the reentrancy flag on drop.
pub(crate) struct EngineGuard<'a> {
    ctx: &'a ThreadContext,
}

impl Drop for EngineGuard<'_> {
    fn drop(&mut self) {
        self.ctx.in_engine.store(false, Ordering::SeqCst);
    }
}

/// All known threads in order of appearance.
#[derive(Default)]
pub(crate) struct Registry {
    threads: RwLock<IndexMap<ThreadId, Arc<ThreadContext>>>,
}

impl Registry {
    pub(crate) fn get(&self, id: &ThreadId) -> Option<Arc<ThreadContext>> {
        self.threads
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .get(id)
            .cloned()
    }

    /// Return thread context, create it if not exists. Second value is true for a new context.
    pub(crate) fn get_or_create(&self, thread: &ThreadRef) -> (Arc<ThreadContext>, bool) {
        if let Some(ctx) = self.get(&thread.id) {
            return (ctx, false);
        }
        let mut threads = self.threads.write().unwrap_or_else(|e| e.into_inner());
        if let Some(ctx) = threads.get(&thread.id) {
            return (ctx.clone(), false);
        }
        let ctx = Arc::new(ThreadContext::new(thread.clone()));
        threads.insert(thread.id.clone(), ctx.clone());
        (ctx, true)
    }

    pub(crate) fn remove(&self, id: &ThreadId) -> Option<Arc<ThreadContext>> {
        self.threads
            .write()
            .unwrap_or_else(|e| e.into_inner())
            .shift_remove(id)
    }

    pub(crate) fn all(&self) -> Vec<Arc<ThreadContext>> {
        self.threads
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .values()
            .cloned()
            .collect()
    }
}
