//! Engine configuration.
//!
//! Configuration is a TOML document, every field is optional:
//!
//! ```toml
//! max_variable_repr = 1000
//! writer_delay_ms = 0
//! project_roots = ["/home/user/project"]
//! step_filters = ["*/site-packages/*"]
//!
//! [dont_trace]
//! "threading.py" = "library"
//! "rdbg_helpers.py" = "engine"
//!
//! [[path_mappings]]
//! client = "C:\\work\\project"
//! server = "/srv/project"
//!
//! [log]
//! filter = "debugger=debug,rdbg::wire=trace"
//! ```

use crate::debugger::Error;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs::read_to_string;
use std::path::{Path, PathBuf};

/// Classification of files excluded from tracing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FileKind {
    /// Third-party or standard library file. Traced only when it lies inside a project root.
    Library,
    /// File that belongs to the debugger itself. Never traced.
    Engine,
}

/// Prefix mapping between controller-side and program-side paths.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PathMapping {
    pub client: String,
    pub server: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LogConfig {
    /// env_logger filter directives, `RUST_LOG` syntax.
    pub filter: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Max length of a rendered variable value, longer values end with `...`.
    pub max_variable_repr: usize,
    /// Max length of a console message sent to the controller.
    pub max_io_message: usize,
    /// Pause between two outgoing messages, milliseconds.
    pub writer_delay_ms: u64,
    pub dont_trace_enabled: bool,
    /// File base name -> kind.
    pub dont_trace: BTreeMap<String, FileKind>,
    pub project_roots: Vec<String>,
    /// Glob patterns (`*` wildcard) of files ignored while stepping.
    pub step_filters: Vec<String>,
    pub record_call_signatures: bool,
    pub suspend_on_breakpoint_exception: bool,
    pub path_mappings: Vec<PathMapping>,
    /// Write every incoming and outgoing message into this file.
    pub wire_trace_file: Option<PathBuf>,
    pub log: LogConfig,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            max_variable_repr: 1000,
            max_io_message: 1000,
            writer_delay_ms: 0,
            dont_trace_enabled: true,
            dont_trace: BTreeMap::new(),
            project_roots: vec![],
            step_filters: vec![],
            record_call_signatures: false,
            suspend_on_breakpoint_exception: true,
            path_mappings: vec![],
            wire_trace_file: None,
            log: LogConfig::default(),
        }
    }
}

impl EngineConfig {
    /// Load configuration from a TOML file.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, Error> {
        let data = read_to_string(path)?;
        Self::from_toml_str(&data)
    }

    pub fn from_toml_str(data: &str) -> Result<Self, Error> {
        Ok(toml::de::from_str(data)?)
    }
}
