//! Call signature recording: argument types of called functions.

use crate::debugger::frame::{normalize_path, Frame};
use crate::protocol::xml;

/// Function arguments with runtime type names, as observed on a call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CallSignature {
    pub file: String,
    pub name: String,
    /// (argument name, type name) pairs in declaration order.
    pub args: Vec<(String, String)>,
}

impl CallSignature {
    pub fn to_xml(&self) -> String {
        xml::call_signature(&self.file, &self.name, &self.args)
    }
}

pub struct SignatureRecorder {
    project_roots: Vec<String>,
}

impl SignatureRecorder {
    /// Calls are recorded only for files under `project_roots`, or for all files
    /// if there are no roots.
    pub fn new(project_roots: Vec<String>) -> Self {
        Self {
            project_roots: project_roots
                .iter()
                .map(|root| normalize_path(root).into_owned())
                .collect(),
        }
    }

    fn in_scope(&self, file: &str) -> bool {
        self.project_roots.is_empty()
            || self
                .project_roots
                .iter()
                .any(|root| file.starts_with(root.as_str()))
    }

    /// Signature of a just called frame, `None` for out of scope files.
    pub fn record(&self, frame: &dyn Frame, file: &str) -> Option<CallSignature> {
        if !self.in_scope(file) {
            return None;
        }
        let locals = frame.locals();
        let args = frame
            .arg_names()
            .into_iter()
            .map(|arg| {
                let type_name = locals
                    .iter()
                    .find(|(name, _)| *name == arg)
                    .map(|(_, value)| value.type_identity().to_string())
                    .unwrap_or_else(|| "unknown".to_string());
                (arg, type_name)
            })
            .collect();
        Some(CallSignature {
            file: file.to_string(),
            name: frame.function_name().to_string(),
            args,
        })
    }
}
