/*!
Socket capability shared by transports and TLS sessions.

A [`Socket`] is a non-blocking, connection-oriented byte stream. Transports
implement it, and so does the TLS session itself, which makes a session a
drop-in substitute for the plain socket it wraps.
*/

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use crate::core::constants::DEFAULT_TIMEOUT_MS;
use crate::core::error::{Error, Result};

/// Readiness callback invoked by a socket whenever it becomes readable,
/// writable, or hits an error.
///
/// Callbacks may run on any thread and must not block.
pub type Sigio = Arc<dyn Fn() + Send + Sync>;

/// Blocking policy of a socket operation
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Timeout {
    /// Block until the operation can make progress
    Infinite,
    /// Never block; report `WouldBlock` instead
    Immediate,
    /// Block up to the given duration
    After(Duration),
}

impl Timeout {
    /// Convert from the millisecond convention: -1 blocks forever, 0 never
    /// blocks, N > 0 blocks up to N milliseconds.
    pub fn from_millis(ms: i32) -> Self {
        match ms {
            ms if ms < 0 => Timeout::Infinite,
            0 => Timeout::Immediate,
            ms => Timeout::After(Duration::from_millis(ms as u64)),
        }
    }

    /// Convert back to the millisecond convention, saturating at `i32::MAX`
    pub fn as_millis(&self) -> i32 {
        match self {
            Timeout::Infinite => -1,
            Timeout::Immediate => 0,
            Timeout::After(d) if d.is_zero() => 0,
            Timeout::After(d) => i32::try_from(d.as_millis()).unwrap_or(i32::MAX).max(1),
        }
    }

    /// Whether this timeout never suspends
    pub fn is_immediate(&self) -> bool {
        match self {
            Timeout::Immediate => true,
            Timeout::After(d) => d.is_zero(),
            Timeout::Infinite => false,
        }
    }

    /// Blocking flag equivalent of this timeout
    pub fn is_blocking(&self) -> bool {
        !self.is_immediate()
    }
}

impl Default for Timeout {
    fn default() -> Self {
        Timeout::from_millis(DEFAULT_TIMEOUT_MS)
    }
}

impl From<i32> for Timeout {
    fn from(ms: i32) -> Self {
        Timeout::from_millis(ms)
    }
}

/// Non-blocking, connection-oriented socket.
///
/// `send`/`recv` return `Err(Error::WouldBlock)` when the operation cannot
/// make progress without blocking; `recv` returns `Ok(0)` once the peer has
/// closed the stream.
pub trait Socket {
    /// Connect to a remote address
    fn connect(&mut self, address: SocketAddr) -> Result<()>;

    /// Send data, returning the number of bytes accepted
    fn send(&mut self, data: &[u8]) -> Result<usize>;

    /// Receive data into `buf`, returning the number of bytes read
    fn recv(&mut self, buf: &mut [u8]) -> Result<usize>;

    /// Close the socket
    fn close(&mut self) -> Result<()>;

    /// Switch between blocking and non-blocking mode
    fn set_blocking(&mut self, blocking: bool);

    /// Register (or clear) the readiness callback
    fn sigio(&mut self, callback: Option<Sigio>);

    /// Set the blocking policy
    fn set_timeout(&mut self, timeout: Timeout) {
        self.set_blocking(timeout.is_blocking());
    }

    /// Bind to a local address
    fn bind(&mut self, _address: SocketAddr) -> Result<()> {
        Err(Error::Unsupported)
    }

    /// Send to an address; connection-oriented sockets ignore the address
    fn sendto(&mut self, _address: SocketAddr, data: &[u8]) -> Result<usize> {
        self.send(data)
    }

    /// Receive data and report the sender's address when known
    fn recvfrom(&mut self, buf: &mut [u8]) -> Result<(usize, Option<SocketAddr>)> {
        let address = self.getpeername().ok();
        let size = self.recv(buf)?;
        Ok((size, address))
    }

    /// Address of the connected peer
    fn getpeername(&self) -> Result<SocketAddr> {
        Err(Error::Unsupported)
    }

    /// Set a socket option
    fn setsockopt(&mut self, _level: i32, _optname: i32, _optval: &[u8]) -> Result<()> {
        Err(Error::Unsupported)
    }

    /// Read a socket option into `optval`, returning its length
    fn getsockopt(&mut self, _level: i32, _optname: i32, _optval: &mut [u8]) -> Result<usize> {
        Err(Error::Unsupported)
    }

    /// Put the socket in listening mode
    fn listen(&mut self, _backlog: i32) -> Result<()> {
        Err(Error::Unsupported)
    }

    /// Accept an incoming connection
    fn accept(&mut self) -> Result<Box<dyn Socket>> {
        Err(Error::Unsupported)
    }
}

macro_rules! forward_socket {
    () => {
        fn connect(&mut self, address: SocketAddr) -> Result<()> {
            (**self).connect(address)
        }
        fn send(&mut self, data: &[u8]) -> Result<usize> {
            (**self).send(data)
        }
        fn recv(&mut self, buf: &mut [u8]) -> Result<usize> {
            (**self).recv(buf)
        }
        fn close(&mut self) -> Result<()> {
            (**self).close()
        }
        fn set_blocking(&mut self, blocking: bool) {
            (**self).set_blocking(blocking)
        }
        fn sigio(&mut self, callback: Option<Sigio>) {
            (**self).sigio(callback)
        }
        fn set_timeout(&mut self, timeout: Timeout) {
            (**self).set_timeout(timeout)
        }
        fn bind(&mut self, address: SocketAddr) -> Result<()> {
            (**self).bind(address)
        }
        fn sendto(&mut self, address: SocketAddr, data: &[u8]) -> Result<usize> {
            (**self).sendto(address, data)
        }
        fn recvfrom(&mut self, buf: &mut [u8]) -> Result<(usize, Option<SocketAddr>)> {
            (**self).recvfrom(buf)
        }
        fn getpeername(&self) -> Result<SocketAddr> {
            (**self).getpeername()
        }
        fn setsockopt(&mut self, level: i32, optname: i32, optval: &[u8]) -> Result<()> {
            (**self).setsockopt(level, optname, optval)
        }
        fn getsockopt(&mut self, level: i32, optname: i32, optval: &mut [u8]) -> Result<usize> {
            (**self).getsockopt(level, optname, optval)
        }
        fn listen(&mut self, backlog: i32) -> Result<()> {
            (**self).listen(backlog)
        }
        fn accept(&mut self) -> Result<Box<dyn Socket>> {
            (**self).accept()
        }
    };
}

// Borrowed transports stay owned by the caller.
impl<S: Socket + ?Sized> Socket for &mut S {
    forward_socket!();
}

impl<S: Socket + ?Sized> Socket for Box<S> {
    forward_socket!();
}
