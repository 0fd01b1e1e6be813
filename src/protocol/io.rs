//! Reader and writer loops of a controller connection.

use crate::debugger::{Error, Session};
use crate::protocol::tracer::FileTracer;
use crate::protocol::{codec, CommandId, NetCommand, RawCommand};
use std::io::{BufRead, Write};
use std::sync::mpsc::{self, Receiver, RecvTimeoutError, Sender};
use std::sync::Mutex;
use std::time::Duration;

pub enum WriterMessage {
    Command(NetCommand),
    Close,
}

struct OutgoingState {
    last_seq: i64,
    sender: Sender<WriterMessage>,
}

/// Producer side of the outgoing queue.
///
/// Sequence numbers of notifications are assigned under the same lock that
/// enqueues a message, so they appear on the wire strictly increasing.
pub(crate) struct Outgoing {
    state: Mutex<OutgoingState>,
}

impl Outgoing {
    pub(crate) fn new() -> (Self, Outbox) {
        let (sender, receiver) = mpsc::channel();
        let outgoing = Self {
            state: Mutex::new(OutgoingState {
                last_seq: 0,
                sender,
            }),
        };
        (outgoing, Outbox { receiver })
    }

    fn state(&self) -> std::sync::MutexGuard<'_, OutgoingState> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Send an engine notification with a fresh even sequence number.
    pub(crate) fn notify(&self, id: CommandId, payload: String) -> i64 {
        let mut state = self.state();
        state.last_seq += 2;
        let seq = state.last_seq;
        log::debug!(target: "rdbg::wire", "-> {} {seq}", id.name());
        _ = state
            .sender
            .send(WriterMessage::Command(NetCommand::new(id, seq, payload)));
        seq
    }

    /// Send a response to a request with sequence `seq`.
    pub(crate) fn respond(&self, id: CommandId, seq: i64, payload: String) {
        log::debug!(target: "rdbg::wire", "-> {} {seq}", id.name());
        _ = self
            .state()
            .sender
            .send(WriterMessage::Command(NetCommand::new(id, seq, payload)));
    }

    pub(crate) fn close(&self) {
        _ = self.state().sender.send(WriterMessage::Close);
    }
}

/// Consumer side of the outgoing queue.
pub struct Outbox {
    receiver: Receiver<WriterMessage>,
}

impl Outbox {
    /// Next outgoing command, `None` if the queue is closed or the timeout elapsed.
    pub fn recv_timeout(&self, timeout: Duration) -> Option<NetCommand> {
        match self.receiver.recv_timeout(timeout) {
            Ok(WriterMessage::Command(cmd)) => Some(cmd),
            Ok(WriterMessage::Close) => None,
            Err(RecvTimeoutError::Timeout) | Err(RecvTimeoutError::Disconnected) => None,
        }
    }

    /// All already queued commands.
    pub fn drain(&self) -> Vec<NetCommand> {
        self.receiver
            .try_iter()
            .filter_map(|msg| match msg {
                WriterMessage::Command(cmd) => Some(cmd),
                WriterMessage::Close => None,
            })
            .collect()
    }

    fn recv(&self) -> Option<WriterMessage> {
        self.receiver.recv().ok()
    }
}

/// Newline framed reader.
pub struct FrameReader<R> {
    reader: R,
    buf: Vec<u8>,
}

impl<R: BufRead> FrameReader<R> {
    pub fn new(reader: R) -> Self {
        Self {
            reader,
            buf: Vec::with_capacity(256),
        }
    }

    /// Read a frame. [`Error::TransportClosed`] means the peer closed the connection,
    /// non fatal errors mean a malformed frame that should be skipped.
    pub fn read_frame(&mut self) -> Result<RawCommand, Error> {
        self.buf.clear();
        let n = self.reader.read_until(b'\n', &mut self.buf)?;
        if n == 0 {
            return Err(Error::TransportClosed);
        }
        match std::str::from_utf8(&self.buf) {
            Ok(line) => codec::parse_frame(line),
            Err(_) => Err(Error::MalformedFrame("frame is not valid utf-8".to_string())),
        }
    }
}

/// Read controller messages until the connection closes or the session ends.
pub(crate) fn reader_loop(session: Session, reader: impl BufRead, tracer: Option<FileTracer>) {
    let mut frames = FrameReader::new(reader);
    loop {
        match frames.read_frame() {
            Ok(cmd) => {
                if let Some(tracer) = &tracer {
                    tracer.incoming(&format!("{}\t{}\t{}", cmd.id, cmd.seq, cmd.payload));
                }
                session.process_net_command(cmd.id, cmd.seq, &cmd.payload);
            }
            Err(Error::TransportClosed) => {
                log::info!(target: "debugger", "{}", Error::TransportClosed);
                break;
            }
            Err(e) if e.is_fatal() => {
                if !session.is_finished() {
                    log::warn!(target: "debugger", "read from controller: {e:#}");
                }
                break;
            }
            Err(e) => {
                log::warn!(target: "rdbg::wire", "skip frame: {e:#}");
            }
        }
        if session.is_finished() {
            break;
        }
    }
    session.finish();
}

/// Write queued messages until the queue is closed.
pub(crate) fn writer_loop(
    session: Session,
    outbox: Outbox,
    mut writer: impl Write,
    delay: Duration,
    tracer: Option<FileTracer>,
) {
    while let Some(msg) = outbox.recv() {
        let cmd = match msg {
            WriterMessage::Command(cmd) => cmd,
            WriterMessage::Close => break,
        };
        let line = cmd.to_line();
        if let Some(tracer) = &tracer {
            tracer.outgoing(&format!("{}\t{}\t{}", cmd.id.code(), cmd.seq, cmd.payload));
        }
        if let Err(e) = writer
            .write_all(line.as_bytes())
            .and_then(|_| writer.flush())
            .map_err(Error::from)
        {
            log::warn!(target: "debugger", "write to controller: {e:#}");
            session.finish();
            break;
        }
        if !delay.is_zero() {
            std::thread::sleep(delay);
        }
    }
    _ = writer.flush();
    session.shutdown_transport();
}
