use crate::debugger::frame::Location;
use crate::debugger::skip::SkipCache;
use crate::debugger::thread::StopReason;
use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::{Arc, RwLock};

#[derive(Debug, Clone, Copy, PartialEq, Eq, strum_macros::EnumString, strum_macros::Display)]
pub enum BreakpointKind {
    #[strum(serialize = "line", serialize = "python-line")]
    Line,
    #[strum(serialize = "exception")]
    Exception,
}

/// Line breakpoint representation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Breakpoint {
    pub id: u32,
    pub location: Location,
    /// Breakpoint hits only if condition is truthy.
    pub condition: Option<String>,
    /// Log point expression, a hit writes its value to the console instead of suspending.
    pub expression: Option<String>,
    /// Breakpoint hits only in frames of this function.
    pub function: Option<String>,
}

impl Breakpoint {
    pub fn new(id: u32, location: Location) -> Self {
        Self {
            id,
            location,
            condition: None,
            expression: None,
            function: None,
        }
    }

    pub fn is_log_point(&self) -> bool {
        self.expression.is_some()
    }

    /// Whether the breakpoint applies to a frame of `function`.
    pub fn matches_function(&self, function: &str) -> bool {
        self.function.as_deref().map_or(true, |f| f == function)
    }
}

/// Break on raised exceptions of a type (or its subtypes).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExceptionBreakpoint {
    pub type_name: String,
    /// Stop on exceptions that will be caught.
    pub notify_always: bool,
    /// Stop on exceptions nobody catches.
    pub notify_on_terminate: bool,
}

/// Exception raised in the debugged program, as reported by the host.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExceptionInfo {
    pub type_name: String,
    /// Names of base types, nearest first.
    pub ancestors: Vec<String>,
    pub message: String,
    /// No handler will catch this exception.
    pub unhandled: bool,
}

impl ExceptionInfo {
    pub fn is_instance_of(&self, type_name: &str) -> bool {
        self.type_name == type_name || self.ancestors.iter().any(|a| a == type_name)
    }
}

/// Immutable state of all breakpoints, replaced on every change.
#[derive(Debug, Default, Clone)]
pub struct Snapshot {
    generation: u64,
    lines: HashMap<String, BTreeMap<u32, Vec<Arc<Breakpoint>>>>,
    exceptions: Vec<ExceptionBreakpoint>,
    ignored_exceptions: HashSet<Location>,
}

impl Snapshot {
    pub fn generation(&self) -> u64 {
        self.generation
    }

    /// Breakpoints at a location in registration order.
    pub fn at(&self, file: &str, line: u32) -> &[Arc<Breakpoint>] {
        self.lines
            .get(file)
            .and_then(|lines| lines.get(&line))
            .map(|bps| bps.as_slice())
            .unwrap_or(&[])
    }

    pub fn has_breakpoints_in(&self, file: &str) -> bool {
        self.lines.get(file).is_some_and(|lines| !lines.is_empty())
    }

    pub fn has_exception_breakpoints(&self) -> bool {
        !self.exceptions.is_empty()
    }

    pub fn exception_breakpoints(&self) -> &[ExceptionBreakpoint] {
        &self.exceptions
    }

    /// Reason to stop on a raised exception, if any.
    pub fn exception_stop(&self, info: &ExceptionInfo, location: &Location) -> Option<StopReason> {
        let matched = self
            .exceptions
            .iter()
            .filter(|bp| info.is_instance_of(&bp.type_name));
        for bp in matched {
            if info.unhandled && bp.notify_on_terminate {
                return Some(StopReason::UncaughtException);
            }
            if !info.unhandled && bp.notify_always && !self.ignored_exceptions.contains(location) {
                return Some(StopReason::CaughtException);
            }
        }
        None
    }

    fn remove_line(&mut self, id: u32, file: &str) -> Option<Breakpoint> {
        let lines = self.lines.get_mut(file)?;
        let mut removed = None;
        lines.retain(|_, bps| {
            if let Some(pos) = bps.iter().position(|bp| bp.id == id) {
                removed = Some(bps.remove(pos));
            }
            !bps.is_empty()
        });
        if lines.is_empty() {
            self.lines.remove(file);
        }
        removed.map(|bp| (*bp).clone())
    }
}

/// Registry of breakpoints shared between the protocol reader and program threads.
///
/// Readers take a snapshot (an `Arc` clone), writers build the next snapshot
/// and swap it, then reset the skip cache to the new generation.
#[derive(Default)]
pub struct BreakpointRegistry {
    snapshot: RwLock<Arc<Snapshot>>,
    skip_cache: SkipCache,
}

impl BreakpointRegistry {
    pub fn snapshot(&self) -> Arc<Snapshot> {
        self.snapshot
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }

    pub fn skip_cache(&self) -> &SkipCache {
        &self.skip_cache
    }

    fn update<T>(&self, f: impl FnOnce(&mut Snapshot) -> T) -> T {
        let mut current = self.snapshot.write().unwrap_or_else(|e| e.into_inner());
        let mut next = Snapshot::clone(&current);
        let result = f(&mut next);
        next.generation = current.generation + 1;
        let generation = next.generation;
        *current = Arc::new(next);
        self.skip_cache.reset(generation);
        result
    }

    /// Add a line breakpoint, a breakpoint with the same id and file is replaced.
    pub fn add(&self, breakpoint: Breakpoint) {
        log::debug!(target: "debugger", "set breakpoint {} at {}", breakpoint.id, breakpoint.location);
        self.update(|snapshot| {
            snapshot.remove_line(breakpoint.id, &breakpoint.location.file);
            snapshot
                .lines
                .entry(breakpoint.location.file.clone())
                .or_default()
                .entry(breakpoint.location.line)
                .or_default()
                .push(Arc::new(breakpoint));
        })
    }

    /// Remove a line breakpoint, return it if it exists.
    pub fn remove(&self, id: u32, file: &str) -> Option<Breakpoint> {
        let removed = self.update(|snapshot| snapshot.remove_line(id, file));
        if removed.is_none() {
            log::warn!(target: "debugger", "breakpoint {id} not found in {file}");
        }
        removed
    }

    pub fn add_exception(&self, breakpoint: ExceptionBreakpoint) {
        self.update(|snapshot| {
            snapshot
                .exceptions
                .retain(|bp| bp.type_name != breakpoint.type_name);
            snapshot.exceptions.push(breakpoint);
        })
    }

    pub fn remove_exception(&self, type_name: &str) -> bool {
        self.update(|snapshot| {
            let before = snapshot.exceptions.len();
            snapshot.exceptions.retain(|bp| bp.type_name != type_name);
            before != snapshot.exceptions.len()
        })
    }

    /// Replace all exception breakpoints.
    pub fn set_exceptions(&self, breakpoints: Vec<ExceptionBreakpoint>) {
        self.update(|snapshot| snapshot.exceptions = breakpoints)
    }

    /// Start a new generation without changes, memoized skips are dropped.
    pub fn invalidate(&self) {
        self.update(|_| ())
    }

    /// Never stop on caught exceptions raised at `location`.
    pub fn ignore_exceptions_at(&self, location: Location) {
        self.update(|snapshot| {
            snapshot.ignored_exceptions.insert(location);
        })
    }
}
