/*!
In-memory transport.

[`MemoryTransport::pair`] returns two connected endpoints. Each direction is a
bounded `BytesMut` pipe; writes fire the reader's readiness callback and reads
fire the writer's, so sessions on either end can wait for activity exactly as
they would on a network socket.
*/

use std::io;
use std::net::{Ipv4Addr, SocketAddr};
use std::sync::Arc;
use std::time::Instant;

use bytes::{BufMut, BytesMut};
use log::debug;
use parking_lot::{Condvar, Mutex};

use crate::core::constants::DEFAULT_PIPE_CAPACITY;
use crate::core::error::{Error, Result};
use crate::core::socket::{Sigio, Socket, Timeout};

struct PipeState {
    buf: BytesMut,
    closed: bool,
    /// Callback of the endpoint reading from this pipe
    reader_sigio: Option<Sigio>,
    /// Callback of the endpoint writing to this pipe
    writer_sigio: Option<Sigio>,
}

struct Pipe {
    state: Mutex<PipeState>,
    cond: Condvar,
    capacity: usize,
}

impl Pipe {
    fn new(capacity: usize) -> Arc<Self> {
        Arc::new(Self {
            state: Mutex::new(PipeState {
                buf: BytesMut::with_capacity(capacity),
                closed: false,
                reader_sigio: None,
                writer_sigio: None,
            }),
            cond: Condvar::new(),
            capacity,
        })
    }

    fn close(&self) {
        let callbacks = {
            let mut state = self.state.lock();
            if state.closed {
                return;
            }
            state.closed = true;
            (state.reader_sigio.clone(), state.writer_sigio.clone())
        };
        self.cond.notify_all();
        for callback in [callbacks.0, callbacks.1].into_iter().flatten() {
            callback();
        }
    }
}

/// Wait on `cond` until `ready` holds or `timeout` expires; false on expiry
fn wait_until(
    cond: &Condvar,
    state: &mut parking_lot::MutexGuard<'_, PipeState>,
    timeout: Timeout,
    ready: impl Fn(&PipeState) -> bool,
) -> bool {
    let deadline = match timeout {
        Timeout::After(duration) => Instant::now().checked_add(duration),
        Timeout::Infinite => None,
        Timeout::Immediate => return ready(&**state),
    };
    while !ready(&**state) {
        match deadline {
            Some(deadline) => {
                if cond.wait_until(state, deadline).timed_out() {
                    return ready(&**state);
                }
            }
            None => cond.wait(state),
        }
    }
    true
}

/// One endpoint of an in-memory stream
pub struct MemoryTransport {
    inbound: Arc<Pipe>,
    outbound: Arc<Pipe>,
    timeout: Timeout,
    peer: Option<SocketAddr>,
    closed: bool,
}

impl MemoryTransport {
    /// Connected pair with the default pipe capacity
    pub fn pair() -> (Self, Self) {
        Self::pair_with_capacity(DEFAULT_PIPE_CAPACITY)
    }

    /// Connected pair with `capacity` bytes of buffering per direction
    pub fn pair_with_capacity(capacity: usize) -> (Self, Self) {
        let capacity = capacity.max(1);
        let a_to_b = Pipe::new(capacity);
        let b_to_a = Pipe::new(capacity);
        let a = Self::endpoint(Arc::clone(&b_to_a), Arc::clone(&a_to_b));
        let b = Self::endpoint(a_to_b, b_to_a);
        (a, b)
    }

    fn endpoint(inbound: Arc<Pipe>, outbound: Arc<Pipe>) -> Self {
        Self {
            inbound,
            outbound,
            timeout: Timeout::Immediate,
            peer: None,
            closed: false,
        }
    }

    /// Bytes waiting to be read on this endpoint
    pub fn available(&self) -> usize {
        self.inbound.state.lock().buf.len()
    }

    /// Whether `close` has been called on this endpoint
    pub fn is_closed(&self) -> bool {
        self.closed
    }

    /// Current blocking policy
    pub fn timeout(&self) -> Timeout {
        self.timeout
    }
}

impl Socket for MemoryTransport {
    fn connect(&mut self, address: SocketAddr) -> Result<()> {
        if self.closed {
            return Err(Error::NoSocket);
        }
        if self.peer.is_some() {
            return Err(Error::IsConnected);
        }
        debug!("Memory transport connected to {}", address);
        self.peer = Some(address);
        Ok(())
    }

    fn send(&mut self, data: &[u8]) -> Result<usize> {
        if self.closed {
            return Err(Error::NoSocket);
        }
        if data.is_empty() {
            return Ok(0);
        }

        let pipe = &self.outbound;
        let (size, callback) = {
            let mut state = pipe.state.lock();
            let has_room = |s: &PipeState| s.closed || s.buf.len() < pipe.capacity;
            if !wait_until(&pipe.cond, &mut state, self.timeout, has_room) {
                return Err(Error::WouldBlock);
            }
            if state.closed {
                return Err(Error::Io(io::Error::from(io::ErrorKind::BrokenPipe)));
            }
            let size = data.len().min(pipe.capacity - state.buf.len());
            state.buf.put_slice(&data[..size]);
            (size, state.reader_sigio.clone())
        };
        pipe.cond.notify_all();
        if let Some(callback) = callback {
            callback();
        }
        Ok(size)
    }

    fn recv(&mut self, buf: &mut [u8]) -> Result<usize> {
        if self.closed {
            return Err(Error::NoSocket);
        }
        if buf.is_empty() {
            return Ok(0);
        }

        let pipe = &self.inbound;
        let (size, callback) = {
            let mut state = pipe.state.lock();
            let readable = |s: &PipeState| s.closed || !s.buf.is_empty();
            if !wait_until(&pipe.cond, &mut state, self.timeout, readable) {
                return Err(Error::WouldBlock);
            }
            if state.buf.is_empty() {
                // Peer closed and everything was drained
                return Ok(0);
            }
            let size = buf.len().min(state.buf.len());
            let chunk = state.buf.split_to(size);
            buf[..size].copy_from_slice(&chunk);
            (size, state.writer_sigio.clone())
        };
        pipe.cond.notify_all();
        if let Some(callback) = callback {
            callback();
        }
        Ok(size)
    }

    fn close(&mut self) -> Result<()> {
        if self.closed {
            return Err(Error::NoSocket);
        }
        self.closed = true;
        self.inbound.close();
        self.outbound.close();
        Ok(())
    }

    fn set_blocking(&mut self, blocking: bool) {
        self.timeout = if blocking {
            Timeout::Infinite
        } else {
            Timeout::Immediate
        };
    }

    fn set_timeout(&mut self, timeout: Timeout) {
        self.timeout = timeout;
    }

    fn sigio(&mut self, callback: Option<Sigio>) {
        self.inbound.state.lock().reader_sigio = callback.clone();
        self.outbound.state.lock().writer_sigio = callback;
    }

    fn getpeername(&self) -> Result<SocketAddr> {
        self.peer.ok_or(Error::NoConnection)
    }

    fn bind(&mut self, _address: SocketAddr) -> Result<()> {
        Ok(())
    }
}

impl io::Read for MemoryTransport {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        Socket::recv(self, buf).map_err(io::Error::from)
    }
}

impl io::Write for MemoryTransport {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        Socket::send(self, buf).map_err(io::Error::from)
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

impl Drop for MemoryTransport {
    fn drop(&mut self) {
        if !self.closed {
            self.inbound.close();
            self.outbound.close();
        }
    }
}

impl std::fmt::Debug for MemoryTransport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MemoryTransport")
            .field("timeout", &self.timeout)
            .field("peer", &self.peer)
            .field("closed", &self.closed)
            .finish()
    }
}

/// Loopback address handy for connecting memory transports
pub fn loopback(port: u16) -> SocketAddr {
    SocketAddr::from((Ipv4Addr::LOCALHOST, port))
}
