//! Controller protocol.
//!
//! Every message is a single line `<command id>\t<sequence>\t<payload>\n`
//! where payload is percent-encoded. Requests from a controller carry odd
//! sequence numbers, the engine uses even numbers for its own notifications
//! and echoes a request sequence in a response.

pub mod codec;
mod dispatch;
pub mod io;
pub mod sourcemap;
pub mod tracer;
pub mod transport;
pub mod xml;

use strum_macros::{Display, FromRepr, IntoStaticStr};

/// Version reported in reply to a VERSION request.
pub const VERSION: &str = "1.1";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, FromRepr, Display, IntoStaticStr)]
#[strum(serialize_all = "SCREAMING_SNAKE_CASE")]
#[repr(u16)]
pub enum CommandId {
    Run = 101,
    ListThreads = 102,
    ThreadCreate = 103,
    ThreadKill = 104,
    ThreadSuspend = 105,
    ThreadRun = 106,
    StepInto = 107,
    StepOver = 108,
    StepReturn = 109,
    GetVariable = 110,
    SetBreak = 111,
    RemoveBreak = 112,
    EvaluateExpression = 113,
    GetFrame = 114,
    ExecExpression = 115,
    WriteToConsole = 116,
    ChangeVariable = 117,
    RunToLine = 118,
    ReloadCode = 119,
    GetCompletions = 120,
    SetNextStatement = 121,
    SetPyException = 122,
    GetFileContents = 123,
    RunCustomOperation = 127,
    GetBreakpointException = 128,
    StepCaughtException = 129,
    SendCurrExceptionTrace = 130,
    SendCurrExceptionTraceProceeded = 131,
    IgnoreThrownExceptionAt = 132,
    EnableDontTrace = 133,
    SignatureCallTrace = 150,
    Version = 501,
    Return = 502,
    Error = 901,
}

impl CommandId {
    pub fn from_code(code: u32) -> Option<Self> {
        u16::try_from(code).ok().and_then(CommandId::from_repr)
    }

    pub fn code(self) -> u16 {
        self as u16
    }

    pub fn name(self) -> &'static str {
        self.into()
    }
}

/// A single protocol message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NetCommand {
    pub id: CommandId,
    pub seq: i64,
    /// Payload before percent-encoding.
    pub payload: String,
}

impl NetCommand {
    pub fn new(id: CommandId, seq: i64, payload: impl Into<String>) -> Self {
        Self {
            id,
            seq,
            payload: payload.into(),
        }
    }

    /// Wire representation, including the trailing newline.
    pub fn to_line(&self) -> String {
        format!(
            "{}\t{}\t{}\n",
            self.id.code(),
            self.seq,
            codec::quote(&self.payload)
        )
    }
}

/// Incoming frame with a not yet interpreted command id.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawCommand {
    pub id: u32,
    pub seq: i64,
    pub payload: String,
}
