use rdbg::config::EngineConfig;
use rdbg::debugger::frame::{Frame, FrameId};
use rdbg::debugger::thread::ThreadRef;
use rdbg::debugger::variable::Value;
use rdbg::debugger::{Error, Session, SessionBuilder, TraceEvent};
use rdbg::protocol::codec;
use rdbg::protocol::transport::TcpTransport;
use rdbg::protocol::CommandId;
use std::io::{BufRead, BufReader, Write};
use std::net::{TcpListener, TcpStream};
use std::sync::atomic::{AtomicU32, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::thread::JoinHandle;
use std::time::Duration;

static NEXT_FRAME_ID: AtomicU64 = AtomicU64::new(1);

/// Frame of a fake program, line is moved by the program driver.
pub struct FakeFrame {
    id: FrameId,
    function: String,
    file: String,
    line: AtomicU32,
    parent: Option<Arc<dyn Frame>>,
    locals: Mutex<Vec<(String, Value)>>,
    globals: Vec<(String, Value)>,
}

impl FakeFrame {
    pub fn new(function: &str, file: &str) -> Self {
        Self {
            id: FrameId(NEXT_FRAME_ID.fetch_add(1, Ordering::Relaxed)),
            function: function.to_string(),
            file: file.to_string(),
            line: AtomicU32::new(0),
            parent: None,
            locals: Mutex::default(),
            globals: vec![],
        }
    }

    pub fn with_parent(mut self, parent: Arc<FakeFrame>) -> Self {
        self.parent = Some(parent as Arc<dyn Frame>);
        self
    }

    pub fn with_local(self, name: &str, value: Value) -> Self {
        self.locals.lock().unwrap().push((name.to_string(), value));
        self
    }

    pub fn with_global(mut self, name: &str, value: Value) -> Self {
        self.globals.push((name.to_string(), value));
        self
    }

    pub fn set_line(&self, line: u32) {
        self.line.store(line, Ordering::SeqCst);
    }

    pub fn local(&self, name: &str) -> Option<Value> {
        self.locals
            .lock()
            .unwrap()
            .iter()
            .find_map(|(n, v)| (n == name).then(|| v.clone()))
    }
}

impl Frame for FakeFrame {
    fn id(&self) -> FrameId {
        self.id
    }

    fn function_name(&self) -> &str {
        &self.function
    }

    fn file(&self) -> &str {
        &self.file
    }

    fn line(&self) -> u32 {
        self.line.load(Ordering::SeqCst)
    }

    fn parent(&self) -> Option<Arc<dyn Frame>> {
        self.parent.clone()
    }

    fn locals(&self) -> Vec<(String, Value)> {
        self.locals.lock().unwrap().clone()
    }

    fn globals(&self) -> Vec<(String, Value)> {
        self.globals.clone()
    }

    fn set_local(&self, name: &str, value: Value) -> Result<(), Error> {
        let mut locals = self.locals.lock().unwrap();
        match locals.iter_mut().find(|(n, _)| n == name) {
            Some((_, v)) => *v = value,
            None => locals.push((name.to_string(), value)),
        }
        Ok(())
    }

    fn jump_to_line(&self, line: u32) -> Result<(), Error> {
        self.set_line(line);
        Ok(())
    }
}

/// Step of a fake program.
pub enum Op {
    Call(Arc<FakeFrame>),
    Line(Arc<FakeFrame>, u32),
    Return(Arc<FakeFrame>),
}

/// Run a fake program on a new thread: wait for RUN, then report events.
pub fn run_program(session: &Session, thread: ThreadRef, ops: Vec<Op>) -> JoinHandle<()> {
    let session = session.clone();
    std::thread::spawn(move || {
        if !session.wait_for_run() {
            return;
        }
        session.on_thread_start(&thread);
        for op in ops {
            let event = match op {
                Op::Call(frame) => TraceEvent::call(frame),
                Op::Line(frame, line) => {
                    frame.set_line(line);
                    TraceEvent::line(frame)
                }
                Op::Return(frame) => TraceEvent::ret(frame),
            };
            session.on_event(&thread, event);
        }
        session.on_thread_exit(&thread.id);
    })
}

/// Message received by a controller.
#[derive(Debug)]
pub struct Msg {
    pub id: u16,
    pub seq: i64,
    pub payload: String,
}

impl Msg {
    pub fn fields(&self) -> Vec<String> {
        codec::split_fields(&self.payload)
    }
}

/// Controller side of a session connection.
pub struct Controller {
    reader: BufReader<TcpStream>,
    writer: TcpStream,
    next_seq: i64,
}

impl Controller {
    /// Start a session connected to a fresh controller.
    pub fn start(config: EngineConfig) -> (Controller, Session) {
        Self::start_with(Session::builder().with_config(config))
    }

    pub fn start_with(builder: SessionBuilder) -> (Controller, Session) {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap();
        let session = builder
            .connect(TcpTransport::connect(addr).unwrap())
            .unwrap();
        let (stream, _) = listener.accept().unwrap();
        stream
            .set_read_timeout(Some(Duration::from_secs(10)))
            .unwrap();
        let controller = Controller {
            reader: BufReader::new(stream.try_clone().unwrap()),
            writer: stream,
            next_seq: 1,
        };
        (controller, session)
    }

    /// Send a request, return its sequence number.
    pub fn send(&mut self, id: CommandId, fields: &[&str]) -> i64 {
        let seq = self.next_seq;
        self.next_seq += 2;
        self.send_raw(id.code() as u32, seq, &codec::join_fields(fields));
        seq
    }

    pub fn send_raw(&mut self, id: u32, seq: i64, payload: &str) {
        let line = format!("{id}\t{seq}\t{}\n", codec::quote(payload));
        self.writer.write_all(line.as_bytes()).unwrap();
    }

    pub fn recv(&mut self) -> Option<Msg> {
        let mut line = String::new();
        if self.reader.read_line(&mut line).ok()? == 0 {
            return None;
        }
        let mut parts = line.trim_end_matches('\n').splitn(3, '\t');
        let id = parts.next()?.parse().ok()?;
        let seq = parts.next()?.parse().ok()?;
        let payload = codec::unquote(parts.next().unwrap_or_default());
        Some(Msg { id, seq, payload })
    }

    /// Skip messages until one with `id` arrives.
    pub fn wait_for(&mut self, id: CommandId) -> Msg {
        loop {
            let msg = self
                .recv()
                .unwrap_or_else(|| panic!("connection closed while waiting for {id}"));
            if msg.id == id.code() {
                return msg;
            }
        }
    }

    /// Send a request and wait for a message echoing its sequence.
    pub fn request(&mut self, id: CommandId, fields: &[&str]) -> Msg {
        let seq = self.send(id, fields);
        loop {
            let msg = self.recv().expect("connection closed");
            if msg.seq == seq {
                return msg;
            }
        }
    }

    /// Read all messages until the engine closes the connection.
    pub fn drain(&mut self) -> Vec<Msg> {
        std::iter::from_fn(|| self.recv()).collect()
    }
}
