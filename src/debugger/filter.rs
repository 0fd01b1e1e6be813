//! Execution event filter: the hot path every traced event goes through.

use crate::config::{EngineConfig, FileKind};
use crate::debugger::breakpoint::ExceptionInfo;
use crate::debugger::frame::{file_name, normalize_path, Frame};
use crate::debugger::skip::{SkipKey, SkipScope};
use crate::debugger::step::Decision;
use crate::debugger::thread::ThreadRef;
use crate::debugger::Session;
use crate::protocol::CommandId;
use itertools::Itertools;
use regex::Regex;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TraceEventKind {
    Call,
    Line,
    Return,
    Exception(ExceptionInfo),
}

impl TraceEventKind {
    fn skip_scope(&self) -> Option<SkipScope> {
        match self {
            TraceEventKind::Call => Some(SkipScope::Call),
            TraceEventKind::Line => Some(SkipScope::Line),
            TraceEventKind::Return => Some(SkipScope::Return),
            TraceEventKind::Exception(_) => None,
        }
    }
}

/// Execution event reported by a host runtime.
#[derive(Clone)]
pub struct TraceEvent {
    pub kind: TraceEventKind,
    /// Frame the event happened in.
    pub frame: Arc<dyn Frame>,
}

impl TraceEvent {
    pub fn new(kind: TraceEventKind, frame: Arc<dyn Frame>) -> Self {
        Self { kind, frame }
    }

    pub fn call(frame: Arc<dyn Frame>) -> Self {
        Self::new(TraceEventKind::Call, frame)
    }

    pub fn line(frame: Arc<dyn Frame>) -> Self {
        Self::new(TraceEventKind::Line, frame)
    }

    pub fn ret(frame: Arc<dyn Frame>) -> Self {
        Self::new(TraceEventKind::Return, frame)
    }

    pub fn exception(frame: Arc<dyn Frame>, info: ExceptionInfo) -> Self {
        Self::new(TraceEventKind::Exception(info), frame)
    }
}

/// Files excluded from tracing.
pub struct FileFilter {
    enabled: AtomicBool,
    /// File base name -> kind.
    files: HashMap<String, FileKind>,
    project_roots: Vec<String>,
    step_filters: Vec<Regex>,
}

impl FileFilter {
    pub fn new(config: &EngineConfig) -> Self {
        Self {
            enabled: AtomicBool::new(config.dont_trace_enabled),
            files: config
                .dont_trace
                .iter()
                .map(|(k, v)| (k.clone(), *v))
                .collect(),
            project_roots: config
                .project_roots
                .iter()
                .map(|root| normalize_path(root).into_owned())
                .collect(),
            step_filters: config
                .step_filters
                .iter()
                .filter_map(|pattern| {
                    crate::weak_error!(glob_regex(pattern), "step filter ignored:")
                })
                .collect(),
        }
    }

    pub fn set_enabled(&self, enabled: bool) {
        self.enabled.store(enabled, Ordering::SeqCst);
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled.load(Ordering::SeqCst)
    }

    /// Whether a file is inside one of project roots.
    pub fn in_project(&self, path: &str) -> bool {
        self.project_roots.iter().any(|root| path.starts_with(root.as_str()))
    }

    /// Whether events from a file must be ignored (normalized path expected).
    pub fn is_excluded(&self, path: &str) -> bool {
        if !self.is_enabled() {
            return false;
        }
        match self.files.get(file_name(path)) {
            None => false,
            Some(FileKind::Engine) => true,
            Some(FileKind::Library) => !self.in_project(path),
        }
    }

    /// Whether stepping must pass through a file without stopping.
    pub fn is_step_filtered(&self, path: &str) -> bool {
        self.step_filters
            .iter()
            .any(|pattern| pattern.is_match(path))
    }
}

/// Compile a step filter glob, `*` matches any sequence of chars.
fn glob_regex(pattern: &str) -> Result<Regex, regex::Error> {
    let body = pattern.split('*').map(regex::escape).join(".*");
    Regex::new(&format!("^{body}$"))
}

impl Session {
    /// Process an execution event of a program thread.
    ///
    /// Return false if the event was discarded. For a call event that means
    /// the engine has no interest in the new frame, so a host may stop
    /// tracing it. The call blocks while the thread is suspended.
    pub fn on_event(&self, thread: &ThreadRef, event: TraceEvent) -> bool {
        if self.is_finished() {
            return false;
        }
        let ctx = match self.inner.threads.get(&thread.id) {
            Some(ctx) => ctx,
            None => self.thread_context(thread),
        };
        let Some(_guard) = ctx.enter_engine() else {
            return false;
        };

        let file = normalize_path(event.frame.file());
        let line = event.frame.line();
        let scope = event.kind.skip_scope();
        let stepping = ctx.control().state.is_stepping();
        let pending = self.inner.commands.has_pending() || ctx.has_suspend_request();

        if !stepping && !pending {
            if let Some(scope) = scope {
                if self
                    .inner
                    .breakpoints
                    .skip_cache()
                    .contains(&file, line, scope)
                {
                    return false;
                }
            }
        }

        let snapshot = self.inner.breakpoints.snapshot();
        let memoize = |scope: Option<SkipScope>| {
            if let Some(scope) = scope {
                self.inner.breakpoints.skip_cache().insert(
                    SkipKey {
                        file: file.to_string(),
                        line,
                        scope,
                    },
                    snapshot.generation(),
                );
            }
        };

        if self.inner.file_filter.is_excluded(&file) {
            if !stepping {
                memoize(scope);
            }
            return false;
        }
        if stepping && self.inner.file_filter.is_step_filtered(&file) {
            return false;
        }

        if event.kind == TraceEventKind::Call {
            if let Some(recorder) = &self.inner.signatures {
                if let Some(signature) = recorder.record(event.frame.as_ref(), &file) {
                    self.inner
                        .outgoing
                        .notify(CommandId::SignatureCallTrace, signature.to_xml());
                }
            }
        }

        self.process_pending_commands(&ctx, &event.frame);
        if self.is_finished() {
            return false;
        }

        // state may be changed by commands
        let stepping = ctx.control().state.is_stepping();
        match self.decide(&ctx, &event, &file, &snapshot) {
            Decision::NoInterest => {
                if !stepping {
                    memoize(scope);
                }
                false
            }
            Decision::Continue => true,
            Decision::Suspend(reason, frame) => {
                let exception = match &event.kind {
                    TraceEventKind::Exception(info) if reason.is_exception() => Some(info.clone()),
                    _ => None,
                };
                self.suspend(&ctx, frame, reason, exception);
                true
            }
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use std::collections::BTreeMap;

    #[test]
    fn test_step_filters() {
        struct TestCase {
            path: &'static str,
            filtered: bool,
        }
        let test_cases = vec![
            TestCase {
                path: "/usr/lib/site-packages/requests/api.py",
                filtered: true,
            },
            TestCase {
                path: "/app/main.py",
                filtered: false,
            },
            TestCase {
                path: "/app/x/util.py",
                filtered: true,
            },
            TestCase {
                path: "/app/vendor.py",
                filtered: true,
            },
            TestCase {
                path: "/app/vendor.pyc",
                filtered: false,
            },
            TestCase {
                path: "/app/vendorXpy",
                filtered: false,
            },
            TestCase {
                path: "/opt/gen(1)/a+b.py",
                filtered: true,
            },
        ];

        let config = EngineConfig {
            step_filters: vec![
                "*/site-packages/*".to_string(),
                "/app/x/*.py".to_string(),
                "/app/vendor.py".to_string(),
                "/opt/gen(1)/*+b.py".to_string(),
            ],
            ..EngineConfig::default()
        };
        let filter = FileFilter::new(&config);
        for tc in test_cases {
            assert_eq!(filter.is_step_filtered(tc.path), tc.filtered, "{}", tc.path);
        }

        let everything = FileFilter::new(&EngineConfig {
            step_filters: vec!["*".to_string()],
            ..EngineConfig::default()
        });
        assert!(everything.is_step_filtered(""));
        assert!(!FileFilter::new(&EngineConfig::default()).is_step_filtered("/app/main.py"));
    }

    #[test]
    fn test_file_filter() {
        let config = EngineConfig {
            dont_trace: BTreeMap::from([
                ("threading.py".to_string(), FileKind::Library),
                ("rdbg_hooks.py".to_string(), FileKind::Engine),
            ]),
            project_roots: vec!["/srv/app".to_string()],
            ..EngineConfig::default()
        };
        let filter = FileFilter::new(&config);
        assert!(filter.is_excluded("/usr/lib/threading.py"));
        assert!(!filter.is_excluded("/srv/app/threading.py"));
        assert!(filter.is_excluded("/srv/app/rdbg_hooks.py"));
        assert!(!filter.is_excluded("/srv/app/main.py"));

        filter.set_enabled(false);
        assert!(!filter.is_excluded("/usr/lib/threading.py"));
    }
}
