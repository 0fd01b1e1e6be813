//! Controller connection.

use std::io::{BufRead, BufReader, Write};
use std::net::{Shutdown as NetShutdown, TcpListener, TcpStream, ToSocketAddrs};

/// Unblocks a reader waiting for input, used to stop the session.
pub trait Shutdown: Send + Sync {
    fn shutdown(&self);
}

/// Bidirectional byte stream to a controller.
pub trait Transport: Send {
    type Reader: BufRead + Send + 'static;
    type Writer: Write + Send + 'static;

    /// Split a transport into independent reader, writer and a shutdown handle.
    fn split(self) -> std::io::Result<(Self::Reader, Self::Writer, Box<dyn Shutdown>)>;
}

/// TCP transport. The engine either connects to a listening controller or
/// listens and waits for a controller connection.
pub struct TcpTransport {
    stream: TcpStream,
}

impl TcpTransport {
    pub fn new(stream: TcpStream) -> std::io::Result<Self> {
        stream.set_nodelay(true)?;
        Ok(Self { stream })
    }

    /// Connect to a controller.
    pub fn connect(addr: impl ToSocketAddrs) -> std::io::Result<Self> {
        let stream = TcpStream::connect(addr)?;
        log::info!(target: "debugger", "connected to controller at {}", stream.peer_addr()?);
        Self::new(stream)
    }

    /// Accept a single controller connection.
    pub fn accept(listener: &TcpListener) -> std::io::Result<Self> {
        let (stream, peer) = listener.accept()?;
        log::info!(target: "debugger", "controller connected from {peer}");
        Self::new(stream)
    }
}

struct TcpShutdown(TcpStream);

impl Shutdown for TcpShutdown {
    fn shutdown(&self) {
        _ = self.0.shutdown(NetShutdown::Both);
    }
}

impl Transport for TcpTransport {
    type Reader = BufReader<TcpStream>;
    type Writer = TcpStream;

    fn split(self) -> std::io::Result<(Self::Reader, Self::Writer, Box<dyn Shutdown>)> {
        let reader = BufReader::new(self.stream.try_clone()?);
        let shutdown = TcpShutdown(self.stream.try_clone()?);
        Ok((reader, self.stream, Box::new(shutdown)))
    }
}
