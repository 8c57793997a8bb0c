/*!
`Socket` implementation for TLS sessions.

A session can stand in wherever a plain socket is expected, including as the
transport of another session.
*/

use std::net::SocketAddr;

use crate::core::engine::TlsBackend;
use crate::core::error::Result;
use crate::core::session::TlsSocketWrapper;
use crate::core::socket::{Sigio, Socket, Timeout};

impl<B: TlsBackend, T: Socket> Socket for TlsSocketWrapper<B, T> {
    fn connect(&mut self, address: SocketAddr) -> Result<()> {
        TlsSocketWrapper::connect(self, address)
    }

    fn send(&mut self, data: &[u8]) -> Result<usize> {
        TlsSocketWrapper::send(self, data)
    }

    fn recv(&mut self, buf: &mut [u8]) -> Result<usize> {
        TlsSocketWrapper::recv(self, buf)
    }

    fn close(&mut self) -> Result<()> {
        TlsSocketWrapper::close(self)
    }

    fn set_blocking(&mut self, blocking: bool) {
        TlsSocketWrapper::set_blocking(self, blocking)
    }

    fn sigio(&mut self, callback: Option<Sigio>) {
        TlsSocketWrapper::sigio(self, callback)
    }

    fn set_timeout(&mut self, timeout: Timeout) {
        TlsSocketWrapper::set_timeout(self, timeout)
    }

    fn bind(&mut self, address: SocketAddr) -> Result<()> {
        TlsSocketWrapper::bind(self, address)
    }

    fn sendto(&mut self, address: SocketAddr, data: &[u8]) -> Result<usize> {
        TlsSocketWrapper::sendto(self, address, data)
    }

    fn recvfrom(&mut self, buf: &mut [u8]) -> Result<(usize, Option<SocketAddr>)> {
        TlsSocketWrapper::recvfrom(self, buf)
    }

    fn getpeername(&self) -> Result<SocketAddr> {
        TlsSocketWrapper::getpeername(self)
    }

    fn setsockopt(&mut self, level: i32, optname: i32, optval: &[u8]) -> Result<()> {
        TlsSocketWrapper::setsockopt(self, level, optname, optval)
    }

    fn getsockopt(&mut self, level: i32, optname: i32, optval: &mut [u8]) -> Result<usize> {
        TlsSocketWrapper::getsockopt(self, level, optname, optval)
    }

    fn listen(&mut self, backlog: i32) -> Result<()> {
        TlsSocketWrapper::listen(self, backlog)
    }

    fn accept(&mut self) -> Result<Box<dyn Socket>> {
        TlsSocketWrapper::accept(self)
    }
}
