use std::string::FromUtf8Error;

#[derive(thiserror::Error, Debug)]
pub enum Error {
    // --------------------------------- transport errors ------------------------------------------
    #[error(transparent)]
    IO(#[from] std::io::Error),
    #[error("connection closed by controller")]
    TransportClosed,

    // --------------------------------- protocol errors -------------------------------------------
    #[error("malformed frame: {0}")]
    MalformedFrame(String),
    #[error("unknown command id {0}")]
    UnknownCommand(u32),
    #[error("command {0} is not accepted from a controller")]
    UnexpectedCommand(&'static str),
    #[error("invalid {0} payload: {1}")]
    InvalidPayload(&'static str, String),
    #[error("request sequence number must be odd, got {0}")]
    SequenceParity(i64),
    #[error(transparent)]
    FromUtf8(#[from] FromUtf8Error),

    // --------------------------------- session errors --------------------------------------------
    #[error("thread {0} not found")]
    ThreadNotFound(String),
    #[error("thread {0} is not suspended")]
    ThreadNotSuspended(String),
    #[error("frame {0} not found")]
    FrameNotFound(String),
    #[error("session terminated")]
    SessionTerminated,

    // --------------------------------- evaluation errors -----------------------------------------
    #[error("expression parsing error: {0}")]
    ExpressionParsing(String),
    #[error("name `{0}` is not defined")]
    NameNotFound(String),
    #[error("`{type_name}` has no attribute `{attr}`")]
    AttributeNotFound { type_name: String, attr: String },
    #[error("evaluation error: {0}")]
    Evaluation(String),
    #[error("unsupported operation: {0}")]
    Unsupported(&'static str),

    // --------------------------------- resolver errors -------------------------------------------
    #[error("resolver `{0}` failed: {1}")]
    Resolver(&'static str, String),
    #[error("value of type `{0}` has no children")]
    NotAContainer(String),

    // --------------------------------- configuration errors --------------------------------------
    #[error("configuration: {0}")]
    ConfigParsing(#[from] toml::de::Error),

    // --------------------------------- host errors -----------------------------------------------
    #[error("host: {0:#}")]
    Host(anyhow::Error),
}

impl Error {
    /// Return a hint to a caller - continue the session after error or stop it.
    pub fn is_fatal(&self) -> bool {
        match self {
            Error::MalformedFrame(_) => false,
            Error::UnknownCommand(_) => false,
            Error::UnexpectedCommand(_) => false,
            Error::InvalidPayload(_, _) => false,
            Error::SequenceParity(_) => false,
            Error::FromUtf8(_) => false,
            Error::ThreadNotFound(_) => false,
            Error::ThreadNotSuspended(_) => false,
            Error::FrameNotFound(_) => false,
            Error::ExpressionParsing(_) => false,
            Error::NameNotFound(_) => false,
            Error::AttributeNotFound { .. } => false,
            Error::Evaluation(_) => false,
            Error::Unsupported(_) => false,
            Error::Resolver(_, _) => false,
            Error::NotAContainer(_) => false,
            Error::ConfigParsing(_) => false,
            Error::Host(_) => false,

            // session can't continue without a controller
            Error::IO(_) => true,
            Error::TransportClosed => true,
            Error::SessionTerminated => true,
        }
    }
}

impl From<anyhow::Error> for Error {
    fn from(e: anyhow::Error) -> Self {
        Error::Host(e)
    }
}

#[macro_export]
macro_rules! _error {
    ($log_fn: path, $res: expr) => {
        match $res {
            Ok(value) => Some(value),
            Err(e) => {
                $log_fn!(target: "debugger", "{:#}", e);
                None
            }
        }
    };
    ($log_fn: path, $res: expr, $msg: tt) => {
        match $res {
            Ok(value) => Some(value),
            Err(e) => {
                $log_fn!(target: "debugger", concat!($msg, " {:#}"), e);
                None
            }
        }
    };
}

/// Transforms `Result` into `Option` and logs an error if it occurs.
#[macro_export]
macro_rules! weak_error {
    ($res: expr) => {
        $crate::_error!(log::warn, $res)
    };
    ($res: expr, $msg: tt) => {
        $crate::_error!(log::warn, $res, $msg)
    };
}
