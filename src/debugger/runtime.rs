use crate::debugger::error::Error;
use crate::debugger::frame::Frame;
use crate::debugger::variable::{expression, Value};

/// Completion proposal for GET_COMPLETIONS.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Completion {
    pub name: String,
    pub doc: String,
    pub args: String,
    /// Kind code understood by controllers (11 - variable, 13 - attribute).
    pub kind: u8,
}

pub const COMPLETION_VARIABLE: u8 = 11;
pub const COMPLETION_ATTRIBUTE: u8 = 13;

/// Services of the host language runtime.
///
/// Every method is called on a thread stopped inside the engine, with the frame
/// of that thread.
pub trait Runtime: Send + Sync {
    /// Evaluate an expression in a frame.
    fn evaluate(&self, frame: &dyn Frame, expression: &str) -> Result<Value, Error>;

    /// Execute a statement in a frame, return its result if any.
    fn execute(&self, frame: &dyn Frame, code: &str) -> Result<Value, Error> {
        self.evaluate(frame, code)
    }

    /// Completion proposals for a token typed by a user.
    fn completions(&self, frame: &dyn Frame, token: &str) -> Result<Vec<Completion>, Error> {
        let (base, prefix) = match token.rsplit_once('.') {
            Some((base, prefix)) => (Some(base), prefix),
            None => (None, token),
        };

        let candidates: Vec<(String, u8)> = match base {
            None => frame
                .locals()
                .into_iter()
                .chain(frame.globals())
                .map(|(name, _)| (name, COMPLETION_VARIABLE))
                .collect(),
            Some(base) => match self.evaluate(frame, base)? {
                Value::Object(obj) => obj
                    .attributes()
                    .keys()
                    .map(|name| (name.clone(), COMPLETION_ATTRIBUTE))
                    .collect(),
                _ => vec![],
            },
        };

        let mut seen = std::collections::HashSet::new();
        Ok(candidates
            .into_iter()
            .filter(|(name, _)| name.starts_with(prefix) && seen.insert(name.clone()))
            .map(|(name, kind)| Completion {
                name,
                doc: String::new(),
                args: String::new(),
                kind,
            })
            .collect())
    }

    /// Run a user provided operation over a value, return its text result.
    fn custom_operation(
        &self,
        _value: &Value,
        _style: &str,
        _code: &str,
        _fn_name: &str,
    ) -> Result<String, Error> {
        Err(Error::Unsupported("custom operation"))
    }

    /// Reload module code, return true if module was found.
    fn reload_module(&self, _name: &str) -> Result<bool, Error> {
        Err(Error::Unsupported("code reload"))
    }
}

/// Runtime backed by the built-in expression language.
#[derive(Debug, Default, Clone, Copy)]
pub struct DefaultRuntime;

impl Runtime for DefaultRuntime {
    fn evaluate(&self, frame: &dyn Frame, expression: &str) -> Result<Value, Error> {
        expression::evaluate(frame, expression)
    }
}
