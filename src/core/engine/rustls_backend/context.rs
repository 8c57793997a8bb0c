/*!
Per-connection rustls state.

Drives a [`ClientConnection`] over the [`IoBridge`]: records are pulled with
`read_tls` + `process_new_packets` and pushed with `write_tls`. A transport
`WouldBlock` surfaces as `WantRead` or `WantWrite`.
*/

use std::io::{self, Read, Write};

use log::{debug, error};
use rustls::ClientConnection;

use super::verifier::VerifyOutcome;
use crate::core::engine::{IoBridge, TlsContext, VerifyFailure};
use crate::core::error::EngineError;

/// rustls client connection bound to one session
pub struct RustlsContext {
    conn: ClientConnection,
    outcome: VerifyOutcome,
    verification_disabled: bool,
    peer_reported: bool,
}

fn map_tls_error(error: rustls::Error) -> EngineError {
    match error {
        rustls::Error::InvalidCertificate(_) => EngineError::Verification(error.to_string()),
        other => EngineError::Protocol(other.to_string()),
    }
}

impl RustlsContext {
    pub(crate) fn new(conn: ClientConnection, outcome: VerifyOutcome, verification_disabled: bool) -> Self {
        Self {
            conn,
            outcome,
            verification_disabled,
            peer_reported: false,
        }
    }

    /// Negotiated ALPN protocol
    pub fn alpn_protocol(&self) -> Option<&[u8]> {
        self.conn.alpn_protocol()
    }

    /// Negotiated protocol version
    pub fn protocol_version(&self) -> Option<rustls::ProtocolVersion> {
        self.conn.protocol_version()
    }

    /// Underlying rustls connection
    pub fn connection(&self) -> &ClientConnection {
        &self.conn
    }

    /// Push pending records to the transport
    fn flush(&mut self, io: &mut IoBridge<'_>) -> Result<(), EngineError> {
        while self.conn.wants_write() {
            match self.conn.write_tls(io) {
                Ok(0) => return Err(EngineError::Transport("transport accepted no data".into())),
                Ok(_) => {}
                Err(e) if e.kind() == io::ErrorKind::WouldBlock => return Err(EngineError::WantWrite),
                Err(e) => return Err(EngineError::Transport(e.to_string())),
            }
        }
        Ok(())
    }

    /// Flush, treating a full transport as progress for later
    fn flush_pending(&mut self, io: &mut IoBridge<'_>) -> Result<(), EngineError> {
        match self.flush(io) {
            Ok(()) | Err(EngineError::WantWrite) => Ok(()),
            Err(e) => Err(e),
        }
    }

    /// Pull records from the transport; returns 0 at end of stream
    fn fill(&mut self, io: &mut IoBridge<'_>) -> Result<usize, EngineError> {
        let size = match self.conn.read_tls(io) {
            Ok(size) => size,
            Err(e) if e.kind() == io::ErrorKind::WouldBlock => return Err(EngineError::WantRead),
            Err(e) => return Err(EngineError::Transport(e.to_string())),
        };
        if size > 0 {
            if let Err(e) = self.conn.process_new_packets() {
                // Best effort to deliver the alert
                let _ = self.conn.write_tls(io);
                return Err(map_tls_error(e));
            }
        }
        Ok(size)
    }

    fn report_peer(&mut self) {
        if self.peer_reported {
            return;
        }
        self.peer_reported = true;

        let Some(der) = self.peer_certificate() else {
            return;
        };
        match x509_parser::parse_x509_certificate(&der) {
            Ok((_, cert)) => debug!(
                "Server certificate subject: {}, issuer: {}, valid {} to {}",
                cert.subject(),
                cert.issuer(),
                cert.validity().not_before,
                cert.validity().not_after
            ),
            Err(e) => error!("Failed to parse server certificate: {}", e),
        }
    }
}

impl TlsContext for RustlsContext {
    fn handshake(&mut self, io: &mut IoBridge<'_>) -> Result<(), EngineError> {
        loop {
            self.flush(io)?;
            if !self.conn.is_handshaking() {
                self.report_peer();
                return Ok(());
            }
            if self.fill(io)? == 0 {
                return Err(EngineError::Protocol("connection closed during handshake".into()));
            }
        }
    }

    fn write(&mut self, io: &mut IoBridge<'_>, data: &[u8]) -> Result<usize, EngineError> {
        self.flush(io)?;
        let size = self
            .conn
            .writer()
            .write(data)
            .map_err(|e| EngineError::Transport(e.to_string()))?;
        if size == 0 && !data.is_empty() {
            return Err(EngineError::WantWrite);
        }
        self.flush_pending(io)?;
        Ok(size)
    }

    fn read(&mut self, io: &mut IoBridge<'_>, buf: &mut [u8]) -> Result<usize, EngineError> {
        if buf.is_empty() {
            return Ok(0);
        }
        self.flush_pending(io)?;
        loop {
            match self.conn.reader().read(buf) {
                Ok(0) => return Err(EngineError::PeerClosed),
                Ok(size) => return Ok(size),
                Err(e) if e.kind() == io::ErrorKind::WouldBlock => {}
                Err(e) if e.kind() == io::ErrorKind::UnexpectedEof => {
                    return Err(EngineError::PeerClosed);
                }
                Err(e) => return Err(EngineError::Protocol(e.to_string())),
            }

            if self.fill(io)? == 0 {
                return match self.conn.reader().read(buf) {
                    Ok(size) if size > 0 => Ok(size),
                    _ => Err(EngineError::PeerClosed),
                };
            }
        }
    }

    fn close_notify(&mut self, io: &mut IoBridge<'_>) -> Result<(), EngineError> {
        self.conn.send_close_notify();
        self.flush(io)
    }

    fn peer_certificate(&self) -> Option<Vec<u8>> {
        self.conn
            .peer_certificates()
            .and_then(|certs| certs.first())
            .map(|cert| cert.as_ref().to_vec())
    }

    fn verify_result(&self) -> Option<VerifyFailure> {
        if self.verification_disabled {
            return Some(VerifyFailure::Other("verification disabled".into()));
        }
        self.outcome.lock().clone()
    }
}
