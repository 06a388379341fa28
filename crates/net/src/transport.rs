//! Transport seam between the session and the relay socket.
//!
//! The session never blocks: it pumps the transport once per pulse with
//! `try_send`/`try_recv`. [`TcpTransport`] is the bundled implementation;
//! an embedding host can substitute anything that carries whole text
//! frames (a TLS stream, a websocket bridge) behind the same trait.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};

use tokio::net::TcpStream;

use crate::error::{Error, Result};
use crate::frame;

/// Non-blocking text-frame connection to the relay.
pub trait Transport: Send {
    /// Queue a frame and push as many buffered bytes as the socket will
    /// take without blocking.
    fn try_send(&mut self, frame: &str) -> Result<()>;

    /// Non-blocking receive. `Ok(None)` when no complete frame is
    /// available yet.
    fn try_recv(&mut self) -> Result<Option<String>>;

    /// Push buffered outbound bytes without queueing a new frame.
    fn flush(&mut self) -> Result<()> {
        Ok(())
    }

    fn close(&mut self);
}

/// TCP transport driven entirely by the pump: no task is spawned, all
/// reads and writes happen through `try_read`/`try_write` on the pulse.
pub struct TcpTransport {
    stream: TcpStream,
    read_buf: Vec<u8>,
    write_buf: Vec<u8>,
}

impl TcpTransport {
    /// Open a connection to the relay. The caller owns retry policy.
    pub async fn dial(addr: &str) -> Result<Self> {
        let stream = TcpStream::connect(addr).await?;
        stream.set_nodelay(true)?;
        Ok(Self::from_stream(stream))
    }

    /// Wrap an already-connected stream.
    pub fn from_stream(stream: TcpStream) -> Self {
        Self {
            stream,
            read_buf: Vec::new(),
            write_buf: Vec::new(),
        }
    }

    fn push_pending(&mut self) -> Result<()> {
        while !self.write_buf.is_empty() {
            match self.stream.try_write(&self.write_buf) {
                Ok(0) => return Err(Error::ConnectionClosed),
                Ok(n) => {
                    self.write_buf.drain(..n);
                }
                Err(e) if e.kind() == std::io::ErrorKind::WouldBlock => break,
                Err(e) => return Err(Error::Io(e)),
            }
        }
        Ok(())
    }
}

impl Transport for TcpTransport {
    fn try_send(&mut self, frame: &str) -> Result<()> {
        let encoded = frame::encode(frame)?;
        self.write_buf.extend_from_slice(&encoded);
        self.push_pending()
    }

    fn try_recv(&mut self) -> Result<Option<String>> {
        loop {
            if let Some(text) = frame::decode(&mut self.read_buf)? {
                return Ok(Some(text));
            }
            let mut chunk = [0u8; 4096];
            match self.stream.try_read(&mut chunk) {
                Ok(0) => return Err(Error::ConnectionClosed),
                Ok(n) => self.read_buf.extend_from_slice(&chunk[..n]),
                Err(e) if e.kind() == std::io::ErrorKind::WouldBlock => return Ok(None),
                Err(e) => return Err(Error::Io(e)),
            }
        }
    }

    fn flush(&mut self) -> Result<()> {
        self.push_pending()
    }

    fn close(&mut self) {
        // Dropping the stream closes the socket; buffered bytes for a
        // torn-down session are intentionally discarded.
        self.read_buf.clear();
        self.write_buf.clear();
    }
}

/// In-memory loopback transport for tests and for embedding without a
/// live relay. Clones share the same queues, so a test can keep a handle
/// while the session owns the boxed transport.
#[derive(Debug, Clone, Default)]
pub struct MemoryTransport {
    inner: Arc<Mutex<MemoryInner>>,
}

#[derive(Debug, Default)]
struct MemoryInner {
    incoming: VecDeque<String>,
    sent: Vec<String>,
    closed: bool,
}

impl MemoryTransport {
    pub fn new() -> Self {
        Self::default()
    }

    /// Stage a frame as if the relay had sent it.
    pub fn push_incoming(&self, frame: impl Into<String>) {
        self.inner.lock().unwrap().incoming.push_back(frame.into());
    }

    /// Everything the session has transmitted so far.
    pub fn sent(&self) -> Vec<String> {
        self.inner.lock().unwrap().sent.clone()
    }

    pub fn is_closed(&self) -> bool {
        self.inner.lock().unwrap().closed
    }
}

impl Transport for MemoryTransport {
    fn try_send(&mut self, frame: &str) -> Result<()> {
        let mut inner = self.inner.lock().unwrap();
        if inner.closed {
            return Err(Error::NotConnected);
        }
        inner.sent.push(frame.to_string());
        Ok(())
    }

    fn try_recv(&mut self) -> Result<Option<String>> {
        let mut inner = self.inner.lock().unwrap();
        if inner.closed {
            return Err(Error::ConnectionClosed);
        }
        Ok(inner.incoming.pop_front())
    }

    fn close(&mut self) {
        self.inner.lock().unwrap().closed = true;
    }
}
