/*!
I/O bridge between a TLS engine and the transport socket.

Engines speak `std::io::Read`/`Write`; transports speak the socket error
vocabulary. The bridge translates `Error::WouldBlock` into
`io::ErrorKind::WouldBlock` so that engines report `WantRead`/`WantWrite`.
*/

use std::io;

use log::error;

use crate::core::error::{Error, Result};
use crate::core::socket::Socket;

/// Transport view handed to the engine for the duration of one call
pub struct IoBridge<'a> {
    transport: &'a mut dyn Socket,
}

impl<'a> IoBridge<'a> {
    /// Wrap a transport for one engine call
    pub fn new(transport: &'a mut dyn Socket) -> Self {
        Self { transport }
    }

    /// Raw transport send, for engines driving the socket directly
    pub fn send(&mut self, data: &[u8]) -> Result<usize> {
        self.transport.send(data)
    }

    /// Raw transport recv, for engines driving the socket directly
    pub fn recv(&mut self, buf: &mut [u8]) -> Result<usize> {
        self.transport.recv(buf)
    }
}

fn to_io(error: Error, op: &str) -> io::Error {
    if !matches!(error, Error::WouldBlock) {
        error!("Socket {} error: {}", op, error);
    }
    io::Error::from(error)
}

impl io::Read for IoBridge<'_> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        self.transport.recv(buf).map_err(|e| to_io(e, "recv"))
    }
}

impl io::Write for IoBridge<'_> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.transport.send(buf).map_err(|e| to_io(e, "send"))
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}
