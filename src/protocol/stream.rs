/*!
std::io adapters and convenience loops for TLS sessions.

Sessions implement `std::io::Read`/`Write`, and any [`Socket`] gains
[`TlsWriteExt::send_all`] and [`TlsReadExt::recv_to_end`].
*/

use std::io;

use log::debug;

use crate::core::constants::TLS_MAX_PLAINTEXT;
use crate::core::engine::TlsBackend;
use crate::core::error::{Error, Result};
use crate::core::session::TlsSocketWrapper;
use crate::core::socket::Socket;

impl<B: TlsBackend, T: Socket> io::Read for TlsSocketWrapper<B, T> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        TlsSocketWrapper::recv(self, buf).map_err(io::Error::from)
    }
}

impl<B: TlsBackend, T: Socket> io::Write for TlsSocketWrapper<B, T> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        TlsSocketWrapper::send(self, buf).map_err(io::Error::from)
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

/// Extension trait for sending whole buffers over a socket.
pub trait TlsWriteExt: Socket {
    /// Send all of `data`, looping over partial writes.
    ///
    /// Returns the number of bytes sent. A `WouldBlock` after some progress
    /// ends the loop early with the partial count; before any progress it is
    /// returned as an error.
    fn send_all(&mut self, data: &[u8]) -> Result<usize> {
        let mut sent = 0;
        while sent < data.len() {
            match self.send(&data[sent..]) {
                Ok(0) => return Err(Error::DeviceError("socket accepted no data".into())),
                Ok(size) => sent += size,
                Err(Error::WouldBlock) if sent > 0 => break,
                Err(e) => return Err(e),
            }
        }
        debug!("send_all {} of {}", sent, data.len());
        Ok(sent)
    }
}

impl<S: Socket + ?Sized> TlsWriteExt for S {}

/// Extension trait for draining a socket.
pub trait TlsReadExt: Socket {
    /// Receive until the peer closes, appending to `out`.
    ///
    /// Returns the number of bytes appended.
    fn recv_to_end(&mut self, out: &mut Vec<u8>) -> Result<usize> {
        let mut buf = [0u8; TLS_MAX_PLAINTEXT];
        let start = out.len();
        loop {
            match self.recv(&mut buf)? {
                0 => return Ok(out.len() - start),
                size => out.extend_from_slice(&buf[..size]),
            }
        }
    }
}

impl<S: Socket + ?Sized> TlsReadExt for S {}
