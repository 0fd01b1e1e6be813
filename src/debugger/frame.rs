use crate::debugger::error::Error;
use crate::debugger::variable::Value;
use std::borrow::Cow;
use std::fmt::{Display, Formatter};
use std::sync::Arc;

/// Identifier of a stack frame, unique while the frame is alive.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct FrameId(pub u64);

impl Display for FrameId {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Frame selector of a request: `*` stands for the topmost frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FrameSelector {
    Top,
    Id(FrameId),
}

impl FrameSelector {
    pub fn parse(s: &str) -> Result<Self, Error> {
        if s == "*" {
            return Ok(FrameSelector::Top);
        }
        s.parse::<u64>()
            .map(|id| FrameSelector::Id(FrameId(id)))
            .map_err(|_| Error::InvalidPayload("frame id", s.to_string()))
    }
}

/// Source location, file path uses `/` separators.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Location {
    pub file: String,
    pub line: u32,
}

impl Location {
    pub fn new(file: &str, line: u32) -> Self {
        Self {
            file: normalize_path(file).into_owned(),
            line,
        }
    }
}

impl Display for Location {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}:{}", self.file, self.line)
    }
}

/// Replace windows separators, allocates only when needed.
pub fn normalize_path(path: &str) -> Cow<'_, str> {
    if path.contains('\\') {
        Cow::Owned(path.replace('\\', "/"))
    } else {
        Cow::Borrowed(path)
    }
}

/// Base name of a normalized path.
pub fn file_name(path: &str) -> &str {
    path.rsplit('/').next().unwrap_or(path)
}

/// Stack frame of the debugged program, provided by the host runtime.
///
/// A frame reference is valid only while its thread is stopped inside the
/// engine, hosts may invalidate it once the thread resumes.
pub trait Frame: Send + Sync {
    fn id(&self) -> FrameId;

    fn function_name(&self) -> &str;

    fn file(&self) -> &str;

    fn line(&self) -> u32;

    /// Caller frame.
    fn parent(&self) -> Option<Arc<dyn Frame>>;

    /// Number of frames below this one.
    fn depth(&self) -> usize {
        let mut depth = 0;
        let mut current = self.parent();
        while let Some(frame) = current {
            depth += 1;
            current = frame.parent();
        }
        depth
    }

    fn locals(&self) -> Vec<(String, Value)>;

    fn globals(&self) -> Vec<(String, Value)>;

    /// Names of function arguments, in declaration order.
    fn arg_names(&self) -> Vec<String> {
        vec![]
    }

    fn set_local(&self, _name: &str, _value: Value) -> Result<(), Error> {
        Err(Error::Unsupported("set local variable"))
    }

    /// Move execution point to another line of the same function.
    fn jump_to_line(&self, _line: u32) -> Result<(), Error> {
        Err(Error::Unsupported("jump to line"))
    }
}

/// Iterate over a stack from `top` to the outermost frame.
pub fn stack(top: Arc<dyn Frame>) -> impl Iterator<Item = Arc<dyn Frame>> {
    std::iter::successors(Some(top), |frame| frame.parent())
}

/// Find a frame in the stack of `top`.
pub fn find_frame(top: &Arc<dyn Frame>, selector: FrameSelector) -> Result<Arc<dyn Frame>, Error> {
    match selector {
        FrameSelector::Top => Ok(top.clone()),
        FrameSelector::Id(id) => stack(top.clone())
            .find(|frame| frame.id() == id)
            .ok_or_else(|| Error::FrameNotFound(id.to_string())),
    }
}
