//! Addressing of nested values by attribute paths.

use crate::debugger::error::Error;
use crate::debugger::frame::Frame;
use crate::debugger::runtime::Runtime;
use crate::debugger::variable::resolver::ResolverRegistry;
use crate::debugger::variable::Value;
use std::str::FromStr;

/// Root a variable path starts from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, strum_macros::EnumString, strum_macros::Display)]
pub enum Scope {
    /// Frame locals, first path step is a local name.
    #[strum(serialize = "FRAME")]
    Frame,
    /// Frame globals, first path step is a global name.
    #[strum(serialize = "GLOBAL")]
    Global,
    /// First path step is an expression evaluated in the frame.
    #[strum(serialize = "EXPRESSION")]
    Expression,
}

impl Scope {
    pub fn parse(s: &str) -> Result<Self, Error> {
        Scope::from_str(s).map_err(|_| Error::InvalidPayload("scope", s.to_string()))
    }
}

/// Walk `path` starting from `root`, each step is resolved by the resolver of the current value.
pub fn resolve_path<S: AsRef<str>>(
    registry: &ResolverRegistry,
    root: Value,
    path: &[S],
) -> Result<Value, Error> {
    path.iter().try_fold(root, |current, step| {
        let resolver = registry.lookup(&current);
        if !resolver.is_container() {
            return Err(Error::NotAContainer(current.type_identity().to_string()));
        }
        resolver.resolve(&current, step.as_ref())
    })
}

/// Find a root variable of the scope by name.
pub fn scope_variable(
    frame: &dyn Frame,
    runtime: &dyn Runtime,
    scope: Scope,
    name: &str,
) -> Result<Value, Error> {
    let lookup = |vars: Vec<(String, Value)>| {
        vars.into_iter()
            .find_map(|(n, v)| (n == name).then_some(v))
            .ok_or_else(|| Error::NameNotFound(name.to_string()))
    };
    match scope {
        Scope::Frame => lookup(frame.locals()),
        Scope::Global => lookup(frame.globals()),
        Scope::Expression => runtime.evaluate(frame, name),
    }
}

/// Value addressed by `scope` and `path` in a frame.
///
/// An empty path addresses the scope itself, which isn't a value, so `None` is returned.
pub fn resolve_compound_variable<S: AsRef<str>>(
    frame: &dyn Frame,
    runtime: &dyn Runtime,
    registry: &ResolverRegistry,
    scope: Scope,
    path: &[S],
) -> Result<Option<Value>, Error> {
    let Some((first, rest)) = path.split_first() else {
        return Ok(None);
    };
    let root = scope_variable(frame, runtime, scope, first.as_ref())?;
    resolve_path(registry, root, rest).map(Some)
}

/// Children of the value addressed by `scope` and `path`, or scope variables for an empty path.
pub fn resolve_children<S: AsRef<str>>(
    frame: &dyn Frame,
    runtime: &dyn Runtime,
    registry: &ResolverRegistry,
    scope: Scope,
    path: &[S],
) -> Result<Vec<(String, Value)>, Error> {
    match resolve_compound_variable(frame, runtime, registry, scope, path)? {
        Some(value) => registry.lookup(&value).children(&value),
        None => match scope {
            Scope::Frame | Scope::Expression => Ok(frame.locals()),
            Scope::Global => Ok(frame.globals()),
        },
    }
}
