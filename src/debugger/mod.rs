pub mod breakpoint;
pub(crate) mod command;
pub mod error;
mod filter;
pub mod frame;
pub mod runtime;
pub mod signature;
pub mod skip;
mod step;
pub mod thread;
pub mod variable;

pub use error::Error;
pub use filter::{FileFilter, TraceEvent, TraceEventKind};

use crate::config::EngineConfig;
use crate::debugger::breakpoint::BreakpointRegistry;
use crate::debugger::command::CommandQueue;
use crate::debugger::runtime::{DefaultRuntime, Runtime};
use crate::debugger::signature::SignatureRecorder;
use crate::debugger::thread::{ThreadContext, ThreadId, ThreadRef};
use crate::debugger::variable::resolver::{Predicate, Resolver, ResolverRegistry};
use crate::protocol::io::{self, Outbox, Outgoing};
use crate::protocol::sourcemap::SourceMap;
use crate::protocol::tracer::FileTracer;
use crate::protocol::transport::{Shutdown, Transport};
use crate::protocol::{xml, CommandId};
use crate::weak_error;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Condvar, Mutex};
use std::time::Duration;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Lifecycle {
    /// Waiting for RUN from a controller.
    Initial,
    Running,
    Finished,
}

pub(crate) struct Inner {
    pub(crate) config: EngineConfig,
    pub(crate) runtime: Arc<dyn Runtime>,
    pub(crate) resolvers: ResolverRegistry,
    pub(crate) breakpoints: BreakpointRegistry,
    pub(crate) threads: thread::Registry,
    pub(crate) commands: CommandQueue,
    pub(crate) file_filter: FileFilter,
    pub(crate) signatures: Option<SignatureRecorder>,
    pub(crate) source_map: SourceMap,
    pub(crate) outgoing: Outgoing,
    lifecycle: Mutex<Lifecycle>,
    lifecycle_changed: Condvar,
    finished: AtomicBool,
    shutdown: Mutex<Option<Box<dyn Shutdown>>>,
}

/// Debugger session: the engine side of a controller connection.
///
/// A session is a cheap handle, clones share the same state. Host runtime
/// threads report execution events with [`Session::on_event`], a controller
/// drives the session through the protocol reader loop.
#[derive(Clone)]
pub struct Session {
    inner: Arc<Inner>,
}

/// Builder of a [`Session`].
pub struct SessionBuilder {
    config: EngineConfig,
    runtime: Arc<dyn Runtime>,
    resolvers: ResolverRegistry,
}

impl Default for SessionBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl SessionBuilder {
    pub fn new() -> Self {
        Self {
            config: EngineConfig::default(),
            runtime: Arc::new(DefaultRuntime),
            resolvers: ResolverRegistry::with_builtins(),
        }
    }

    pub fn with_config(self, config: EngineConfig) -> Self {
        Self { config, ..self }
    }

    /// Set host runtime services, [`DefaultRuntime`] is used if not set.
    pub fn with_runtime(self, runtime: impl Runtime + 'static) -> Self {
        Self {
            runtime: Arc::new(runtime),
            ..self
        }
    }

    /// Register a variable resolver, it takes precedence over built-in resolvers
    /// and resolvers registered before.
    pub fn with_resolver(
        mut self,
        predicate: impl Fn(&variable::Value) -> bool + Send + Sync + 'static,
        resolver: impl Resolver + 'static,
    ) -> Self {
        let predicate: Predicate = Box::new(predicate);
        self.resolvers.register(predicate, Arc::new(resolver));
        self
    }

    /// Create a session not bound to a transport, outgoing messages are
    /// available through returned [`Outbox`].
    pub fn build_detached(self) -> (Session, Outbox) {
        let (outgoing, outbox) = Outgoing::new();
        let signatures = self
            .config
            .record_call_signatures
            .then(|| SignatureRecorder::new(self.config.project_roots.clone()));
        let inner = Inner {
            file_filter: FileFilter::new(&self.config),
            source_map: SourceMap::from_config(&self.config.path_mappings),
            signatures,
            config: self.config,
            runtime: self.runtime,
            resolvers: self.resolvers,
            breakpoints: BreakpointRegistry::default(),
            threads: thread::Registry::default(),
            commands: CommandQueue::default(),
            outgoing,
            lifecycle: Mutex::new(Lifecycle::Initial),
            lifecycle_changed: Condvar::new(),
            finished: AtomicBool::new(false),
            shutdown: Mutex::new(None),
        };
        (
            Session {
                inner: Arc::new(inner),
            },
            outbox,
        )
    }

    /// Create a session and start reader and writer loops over a transport.
    pub fn connect<T: Transport>(self, transport: T) -> Result<Session, Error> {
        let tracer = match &self.config.wire_trace_file {
            Some(path) => weak_error!(FileTracer::new(path), "wire tracing disabled:"),
            None => None,
        };
        let delay = Duration::from_millis(self.config.writer_delay_ms);
        let (session, outbox) = self.build_detached();
        let (reader, writer, shutdown) = transport.split()?;
        *session.lock_shutdown() = Some(shutdown);

        let writer_session = session.clone();
        let writer_tracer = tracer.clone();
        std::thread::Builder::new()
            .name("rdbg-writer".to_string())
            .spawn(move || io::writer_loop(writer_session, outbox, writer, delay, writer_tracer))?;

        let reader_session = session.clone();
        std::thread::Builder::new()
            .name("rdbg-reader".to_string())
            .spawn(move || io::reader_loop(reader_session, reader, tracer))?;

        log::info!(target: "debugger", "session started");
        Ok(session)
    }
}

impl Session {
    pub fn builder() -> SessionBuilder {
        SessionBuilder::new()
    }

    pub fn config(&self) -> &EngineConfig {
        &self.inner.config
    }

    pub fn resolvers(&self) -> &ResolverRegistry {
        &self.inner.resolvers
    }

    pub fn breakpoints(&self) -> &BreakpointRegistry {
        &self.inner.breakpoints
    }

    pub fn is_finished(&self) -> bool {
        self.inner.finished.load(Ordering::SeqCst)
    }

    fn lock_shutdown(&self) -> std::sync::MutexGuard<'_, Option<Box<dyn Shutdown>>> {
        self.inner
            .shutdown
            .lock()
            .unwrap_or_else(|e| e.into_inner())
    }

    fn set_lifecycle(&self, state: Lifecycle) {
        let mut lifecycle = self
            .inner
            .lifecycle
            .lock()
            .unwrap_or_else(|e| e.into_inner());
        if *lifecycle != Lifecycle::Finished {
            *lifecycle = state;
        }
        self.inner.lifecycle_changed.notify_all();
    }

    /// Release hosts waiting in [`Session::wait_for_run`].
    pub(crate) fn mark_ready(&self) {
        self.set_lifecycle(Lifecycle::Running);
    }

    /// Block until a controller sends RUN. Return false if the session
    /// finished before that.
    pub fn wait_for_run(&self) -> bool {
        let mut lifecycle = self
            .inner
            .lifecycle
            .lock()
            .unwrap_or_else(|e| e.into_inner());
        while *lifecycle == Lifecycle::Initial {
            lifecycle = self
                .inner
                .lifecycle_changed
                .wait(lifecycle)
                .unwrap_or_else(|e| e.into_inner());
        }
        *lifecycle == Lifecycle::Running
    }

    /// Terminate the session: suspended threads are released, further events
    /// are ignored, the connection is closed. Idempotent.
    pub fn finish(&self) {
        if self.inner.finished.swap(true, Ordering::SeqCst) {
            return;
        }
        log::info!(target: "debugger", "session finished");
        self.inner.commands.terminate();
        {
            let mut lifecycle = self
                .inner
                .lifecycle
                .lock()
                .unwrap_or_else(|e| e.into_inner());
            *lifecycle = Lifecycle::Finished;
            self.inner.lifecycle_changed.notify_all();
        }
        for ctx in self.inner.threads.all() {
            ctx.resume(thread::ControlState::Running, 0);
        }
        // the writer loop closes the transport once queued messages are sent
        self.inner.outgoing.close();
    }

    /// Close the controller connection, unblocks the reader loop.
    pub(crate) fn shutdown_transport(&self) {
        if let Some(shutdown) = self.lock_shutdown().take() {
            shutdown.shutdown();
        }
    }

    /// Register a new thread and notify a controller about it.
    pub fn on_thread_start(&self, thread: &ThreadRef) {
        if self.is_finished() {
            return;
        }
        self.thread_context(thread);
    }

    /// Forget a thread and notify a controller about its exit.
    pub fn on_thread_exit(&self, id: &ThreadId) {
        if self.is_finished() {
            return;
        }
        self.inner.commands.discard_for(id);
        if self.inner.threads.remove(id).is_some() {
            self.inner
                .outgoing
                .notify(CommandId::ThreadKill, id.to_string());
        }
    }

    /// Return a thread context, create it and send THREAD_CREATE if not exists.
    pub(crate) fn thread_context(&self, thread: &ThreadRef) -> Arc<ThreadContext> {
        let (ctx, created) = self.inner.threads.get_or_create(thread);
        if created {
            log::debug!(target: "debugger", "new thread {} ({})", thread.id, thread.name);
            self.inner
                .outgoing
                .notify(CommandId::ThreadCreate, xml::thread_created(thread));
        }
        ctx
    }

    /// Send text to the controller console, `ctx` is 1 for stdout and 2 for stderr.
    pub fn write_to_console(&self, text: &str, ctx: u8) {
        if self.is_finished() {
            return;
        }
        self.inner.outgoing.notify(
            CommandId::WriteToConsole,
            xml::console_output(text, ctx, self.inner.config.max_io_message),
        );
    }

    pub(crate) fn inner(&self) -> &Inner {
        &self.inner
    }
}
