//! rdbg - remote debugger session engine.
//!
//! The engine lives inside an instrumented program. The host runtime reports
//! execution events (calls, lines, returns, exceptions) through
//! [`debugger::Session::on_event`], a controller (an IDE) drives the session
//! over a line-oriented, tab-separated, percent-encoded protocol.

pub mod config;
pub mod debugger;
pub mod log;
pub mod protocol;
