/*!
TLS session over a non-blocking transport.

[`TlsSocketWrapper`] layers a TLS client session on top of any [`Socket`].
It owns the engine context, drives the handshake incrementally, and turns the
engine's "need more I/O" outcomes into either a bounded wait on transport
readiness or a `WouldBlock`/`Already` result, depending on the configured
[`Timeout`].
*/

use std::fmt;
use std::net::SocketAddr;
use std::sync::Arc;

use log::{debug, error, info, warn};
use parking_lot::Mutex;

use crate::core::constants::MAX_HOSTNAME_LEN;
use crate::core::engine::verify::certificate_fingerprint;
use crate::core::engine::{IoBridge, TlsBackend, TlsContext, VerifyFailure, VerifyPolicy};
use crate::core::error::{EngineError, Error, Result};
use crate::core::readiness::Readiness;
use crate::core::session::credentials::Credentials;
use crate::core::session::state::{HandshakeState, StateManager, TransportControl};
use crate::core::socket::{Sigio, Socket, Timeout};
use crate::param_err;

/// Run one engine operation, waiting for transport readiness between
/// attempts while the engine wants more I/O and the timeout allows it.
///
/// An `Immediate` timeout performs exactly one step.
fn pump<C, R>(
    context: &mut C,
    transport: &mut dyn Socket,
    readiness: &Readiness,
    timeout: Timeout,
    mut step: impl FnMut(&mut C, &mut IoBridge<'_>) -> std::result::Result<R, EngineError>,
) -> std::result::Result<R, EngineError> {
    loop {
        let mut io = IoBridge::new(&mut *transport);
        match step(context, &mut io) {
            Err(want) if want.wants_io() => {
                if timeout.is_immediate() || !readiness.wait_for_activity(timeout) {
                    return Err(want);
                }
                debug!("Transport activity, retrying ({})", want);
            }
            outcome => return outcome,
        }
    }
}

/// TLS client session wrapping a transport socket
pub struct TlsSocketWrapper<B: TlsBackend, T: Socket> {
    /// Underlying transport; released by `close`
    transport: Option<T>,
    /// Server name for SNI and certificate name checks
    hostname: Option<String>,
    /// Engine context, created once per session
    context: Option<B::Context>,
    /// CA chain, client identity and configuration
    credentials: Credentials<B>,
    /// Handshake state
    state: StateManager,
    /// Blocking policy for handshake, send and recv
    timeout: Timeout,
    /// Whether connect/close also drive the transport
    control: TransportControl,
    /// Transport readiness signal
    readiness: Readiness,
}

impl<B: TlsBackend, T: Socket> TlsSocketWrapper<B, T> {
    /// Create a session bound to `transport`.
    ///
    /// `hostname` enables SNI and the certificate name check.
    pub fn new(transport: T, hostname: Option<&str>, control: TransportControl) -> Result<Self> {
        let mut session = Self {
            transport: Some(transport),
            hostname: None,
            context: None,
            credentials: Credentials::new(),
            state: StateManager::new(),
            timeout: Timeout::default(),
            control,
            readiness: Readiness::new(),
        };
        if let Some(hostname) = hostname {
            session.set_hostname(hostname)?;
        }
        Ok(session)
    }

    /// Set the server name used for SNI and certificate verification.
    ///
    /// Only takes effect if the handshake has not started yet.
    pub fn set_hostname(&mut self, hostname: &str) -> Result<()> {
        if hostname.is_empty() {
            return param_err!("empty hostname");
        }
        if hostname.len() > MAX_HOSTNAME_LEN {
            return param_err!("hostname longer than {} bytes", MAX_HOSTNAME_LEN);
        }
        if self.state.is_started() {
            warn!("Hostname {} set after handshake start, ignored for this connection", hostname);
        }
        self.hostname = Some(hostname.to_string());
        Ok(())
    }

    /// Configured server name
    pub fn hostname(&self) -> Option<&str> {
        self.hostname.as_deref()
    }

    /// Current handshake state
    pub fn state(&self) -> HandshakeState {
        self.state.state()
    }

    /// Whether the engine context has been created
    pub fn is_handshake_started(&self) -> bool {
        self.context.is_some()
    }

    /// Whether the handshake has completed
    pub fn is_handshake_completed(&self) -> bool {
        self.state.is_established()
    }

    /// Current blocking policy
    pub fn timeout(&self) -> Timeout {
        self.timeout
    }

    /// Transport ownership flags
    pub fn transport_control(&self) -> TransportControl {
        self.control
    }

    /// Wrapped transport, until `close` releases it
    pub fn transport(&self) -> Option<&T> {
        self.transport.as_ref()
    }

    /// Mutable access to the wrapped transport
    pub fn transport_mut(&mut self) -> Option<&mut T> {
        self.transport.as_mut()
    }

    /// Readiness signal shared with the transport
    pub fn readiness(&self) -> &Readiness {
        &self.readiness
    }

    /// Begin the handshake, or continue it if already begun.
    ///
    /// With `first_call`, a handshake that is still pending reports
    /// `InProgress` instead of `Already`, and one that completes reports
    /// `Ok(())` instead of `IsConnected`.
    pub fn start_handshake(&mut self, first_call: bool) -> Result<()> {
        if self.transport.is_none() {
            return Err(Error::NoSocket);
        }
        if self.context.is_some() {
            return self.continue_handshake();
        }

        info!(
            "Starting TLS handshake with {}",
            self.hostname.as_deref().unwrap_or("unnamed peer")
        );

        let context = {
            let config = self.credentials.config()?;
            B::new_context(&config.lock(), self.hostname.as_deref())
        }
        .map_err(|e| {
            error!("TLS context setup failed: {}", e);
            Error::AuthFailure(e)
        })?;

        if let Some(transport) = self.transport.as_mut() {
            transport.set_blocking(false);
            transport.sigio(Some(self.readiness.notifier()));
        }
        self.context = Some(context);
        self.state.transition_to_handshaking();

        let result = self.continue_handshake();
        if !first_call {
            return result;
        }
        match result {
            Err(Error::Already) => Err(Error::InProgress),
            Err(Error::IsConnected) => Ok(()),
            other => other,
        }
    }

    /// Advance a started handshake.
    ///
    /// Completion, during this call or earlier, is reported as `IsConnected`.
    pub fn continue_handshake(&mut self) -> Result<()> {
        if self.state.is_established() {
            return Err(Error::IsConnected);
        }

        let Self {
            transport,
            context,
            readiness,
            timeout,
            ..
        } = &mut *self;
        let Some(context) = context.as_mut() else {
            return Err(Error::NoConnection);
        };
        let Some(transport) = transport.as_mut() else {
            return Err(Error::NoSocket);
        };

        match pump(context, transport, readiness, *timeout, |ctx, io| ctx.handshake(io)) {
            Ok(()) => {}
            Err(want) if want.wants_io() => {
                debug!("TLS handshake pending: {}", want);
                return Err(Error::Already);
            }
            Err(e) => {
                error!("TLS handshake failed: {}", e);
                return Err(Error::AuthFailure(e));
            }
        }

        info!(
            "TLS connection to {} established",
            self.hostname.as_deref().unwrap_or("unnamed peer")
        );
        self.log_peer_certificate();
        self.state.transition_to_established();
        Err(Error::IsConnected)
    }

    fn log_peer_certificate(&self) {
        let Some(context) = self.context.as_ref() else {
            return;
        };
        match context.peer_certificate() {
            Some(der) => debug!("Server certificate SHA-256: {}", certificate_fingerprint(&der)),
            None => debug!("Server presented no certificate"),
        }
        match context.verify_result() {
            Some(failure) => warn!("Certificate verification failed, overridden: {}", failure),
            None => info!("Certificate verification passed"),
        }
    }

    /// Drive the handshake to completion before data transfer
    fn ensure_established(&mut self) -> Result<()> {
        if self.state.is_established() {
            return Ok(());
        }
        match self.continue_handshake() {
            Ok(()) | Err(Error::IsConnected) => Ok(()),
            Err(Error::Already) => Err(Error::WouldBlock),
            Err(e) => Err(e),
        }
    }

    /// Encrypt and send `data`, returning the number of bytes accepted
    pub fn send(&mut self, data: &[u8]) -> Result<usize> {
        if self.transport.is_none() {
            return Err(Error::NoSocket);
        }
        debug!("send {}", data.len());
        self.ensure_established()?;

        let Self {
            transport,
            context,
            readiness,
            timeout,
            ..
        } = &mut *self;
        let (Some(transport), Some(context)) = (transport.as_mut(), context.as_mut()) else {
            return Err(Error::NoSocket);
        };

        match pump(context, transport, readiness, *timeout, |ctx, io| ctx.write(io, data)) {
            Ok(size) => Ok(size),
            Err(want) if want.wants_io() => Err(Error::WouldBlock),
            Err(e) => {
                error!("TLS write failed: {}", e);
                Err(Error::DeviceError(e.to_string()))
            }
        }
    }

    /// Receive and decrypt into `buf`; `Ok(0)` once the peer has closed
    pub fn recv(&mut self, buf: &mut [u8]) -> Result<usize> {
        if self.transport.is_none() {
            return Err(Error::NoSocket);
        }
        self.ensure_established()?;

        let Self {
            transport,
            context,
            readiness,
            timeout,
            ..
        } = &mut *self;
        let (Some(transport), Some(context)) = (transport.as_mut(), context.as_mut()) else {
            return Err(Error::NoSocket);
        };

        match pump(context, transport, readiness, *timeout, |ctx, io| {
            ctx.read(io, &mut *buf)
        }) {
            Ok(size) => {
                debug!("recv {}", size);
                Ok(size)
            }
            Err(EngineError::PeerClosed) => {
                debug!("Peer closed the TLS session");
                Ok(0)
            }
            Err(want) if want.wants_io() => Err(Error::WouldBlock),
            Err(e) => {
                error!("TLS read failed: {}", e);
                Err(Error::DeviceError(e.to_string()))
            }
        }
    }

    /// Send ignoring the address
    pub fn sendto(&mut self, _address: SocketAddr, data: &[u8]) -> Result<usize> {
        self.send(data)
    }

    /// Receive, reporting the peer address when the handshake has completed
    pub fn recvfrom(&mut self, buf: &mut [u8]) -> Result<(usize, Option<SocketAddr>)> {
        let address = self.getpeername().ok();
        let size = self.recv(buf)?;
        Ok((size, address))
    }

    /// Shut the session down.
    ///
    /// Sends close_notify if the handshake completed, closes the transport if
    /// the session controls it, and releases the transport either way.
    pub fn close(&mut self) -> Result<()> {
        if !self.state.is_started() {
            return Err(Error::NoSocket);
        }
        let Some(mut transport) = self.transport.take() else {
            return Err(Error::NoSocket);
        };

        info!("Closing TLS");

        let mut result = Ok(());
        if self.state.is_established() {
            transport.set_blocking(true);
            if let Some(context) = self.context.as_mut() {
                let mut io = IoBridge::new(&mut transport);
                if let Err(e) = context.close_notify(&mut io) {
                    error!("TLS close_notify failed: {}", e);
                    result = Err(Error::DeviceError(e.to_string()));
                }
            }
        }
        transport.sigio(None);

        if self.control.closes_transport() {
            let closed = transport.close();
            if result.is_ok() {
                result = closed;
            }
        }

        self.state.transition_to_closed();
        result
    }

    /// Connect the transport (if controlled) and start the handshake
    pub fn connect(&mut self, address: SocketAddr) -> Result<()> {
        let started = self.is_handshake_started();
        let Some(transport) = self.transport.as_mut() else {
            return Err(Error::NoSocket);
        };

        let mut connected_cleanly = true;
        if !started && self.control.connects_transport() {
            match transport.connect(address) {
                Ok(()) => {}
                Err(Error::IsConnected) => connected_cleanly = false,
                Err(e) => return Err(e),
            }
        }
        self.start_handshake(connected_cleanly)
    }

    /// Bind the transport
    pub fn bind(&mut self, address: SocketAddr) -> Result<()> {
        self.transport.as_mut().ok_or(Error::NoSocket)?.bind(address)
    }

    /// Set the blocking policy.
    ///
    /// Before the handshake starts, a bounded or immediate timeout is also
    /// applied to a transport whose connection this session controls.
    pub fn set_timeout(&mut self, timeout: Timeout) {
        self.timeout = timeout;
        if !self.state.is_started()
            && timeout != Timeout::Infinite
            && self.control.connects_transport()
        {
            if let Some(transport) = self.transport.as_mut() {
                transport.set_timeout(timeout);
            }
        }
    }

    /// Blocking (`Infinite`) or non-blocking (`Immediate`) mode
    pub fn set_blocking(&mut self, blocking: bool) {
        self.set_timeout(if blocking {
            Timeout::Infinite
        } else {
            Timeout::Immediate
        });
    }

    /// Register (or clear) the caller's readiness callback.
    ///
    /// Every transport event is relayed to it, whether or not a blocked
    /// operation consumed the event.
    pub fn sigio(&mut self, callback: Option<Sigio>) {
        let Some(transport) = self.transport.as_mut() else {
            return;
        };
        self.readiness.set_relay(callback);
        transport.sigio(Some(self.readiness.notifier()));
    }

    /// Set a transport socket option
    pub fn setsockopt(&mut self, level: i32, optname: i32, optval: &[u8]) -> Result<()> {
        self.transport
            .as_mut()
            .ok_or(Error::NoSocket)?
            .setsockopt(level, optname, optval)
    }

    /// Read a transport socket option
    pub fn getsockopt(&mut self, level: i32, optname: i32, optval: &mut [u8]) -> Result<usize> {
        self.transport
            .as_mut()
            .ok_or(Error::NoSocket)?
            .getsockopt(level, optname, optval)
    }

    /// Peer address, available once the handshake has completed
    pub fn getpeername(&self) -> Result<SocketAddr> {
        if !self.state.is_established() {
            return Err(Error::NoConnection);
        }
        self.transport.as_ref().ok_or(Error::NoSocket)?.getpeername()
    }

    /// Not supported on TLS client sessions
    pub fn listen(&mut self, _backlog: i32) -> Result<()> {
        Err(Error::Unsupported)
    }

    /// Not supported on TLS client sessions
    pub fn accept(&mut self) -> Result<Box<dyn Socket>> {
        Err(Error::Unsupported)
    }

    // Credentials and configuration

    /// Parse a PEM or DER CA chain and trust it
    pub fn set_root_ca_cert(&mut self, data: &[u8]) -> Result<()> {
        self.credentials.set_root_ca(data)
    }

    /// Parse a PEM CA chain and trust it
    pub fn set_root_ca_cert_pem(&mut self, pem: &str) -> Result<()> {
        self.set_root_ca_cert(pem.as_bytes())
    }

    /// Parse a client certificate and private key and present them
    pub fn set_client_cert_key(&mut self, cert: &[u8], key: &[u8]) -> Result<()> {
        self.credentials.set_client_identity(cert, key)
    }

    /// PEM form of [`set_client_cert_key`](Self::set_client_cert_key)
    pub fn set_client_cert_key_pem(&mut self, cert: &str, key: &str) -> Result<()> {
        self.set_client_cert_key(cert.as_bytes(), key.as_bytes())
    }

    /// Trust an externally constructed CA chain, or clear the chain
    pub fn set_ca_chain(&mut self, chain: Option<Arc<B::Certificate>>) -> Result<()> {
        self.credentials.set_ca_chain(chain)
    }

    /// Installed CA chain
    pub fn ca_chain(&self) -> Option<&B::Certificate> {
        self.credentials.ca_chain()
    }

    /// Present an externally constructed client identity, or clear it
    pub fn set_own_cert(&mut self, identity: Option<Arc<B::Identity>>) -> Result<()> {
        self.credentials.set_own_cert(identity)
    }

    /// Installed client identity
    pub fn own_cert(&self) -> Option<&B::Identity> {
        self.credentials.own_cert()
    }

    /// Engine configuration, created with defaults on first use
    pub fn ssl_config(&mut self) -> Result<&Mutex<B::Config>> {
        self.credentials.config()
    }

    /// Replace the engine configuration with an external one
    pub fn set_ssl_config(&mut self, config: Option<Arc<Mutex<B::Config>>>) {
        self.credentials.set_config(config);
    }

    /// Replace the certificate verification policy
    pub fn set_verify_policy(&mut self, policy: VerifyPolicy) -> Result<()> {
        let config = self.credentials.config()?;
        B::set_verify_policy(&mut config.lock(), policy);
        Ok(())
    }

    /// Credential store of this session
    pub fn credentials(&self) -> &Credentials<B> {
        &self.credentials
    }

    /// Engine context, once the handshake has started
    pub fn ssl_context(&self) -> Option<&B::Context> {
        self.context.as_ref()
    }

    /// Mutable engine context
    pub fn ssl_context_mut(&mut self) -> Option<&mut B::Context> {
        self.context.as_mut()
    }

    /// DER encoding of the server certificate
    pub fn peer_certificate(&self) -> Option<Vec<u8>> {
        self.context.as_ref().and_then(TlsContext::peer_certificate)
    }

    /// Verification failure that policy allowed the handshake to ignore
    pub fn verify_result(&self) -> Option<VerifyFailure> {
        self.context.as_ref().and_then(TlsContext::verify_result)
    }
}

impl<B: TlsBackend, T: Socket> Drop for TlsSocketWrapper<B, T> {
    fn drop(&mut self) {
        if self.transport.is_none() {
            return;
        }
        if self.state.is_started() {
            if let Err(e) = self.close() {
                warn!("Error closing TLS session on drop: {}", e);
            }
        } else if self.control.closes_transport() {
            if let Some(mut transport) = self.transport.take() {
                if let Err(e) = transport.close() {
                    warn!("Error closing transport on drop: {}", e);
                }
            }
        }
    }
}

impl<B: TlsBackend, T: Socket> fmt::Debug for TlsSocketWrapper<B, T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TlsSocketWrapper")
            .field("hostname", &self.hostname)
            .field("state", &self.state.state())
            .field("timeout", &self.timeout)
            .field("control", &self.control)
            .field("has_transport", &self.transport.is_some())
            .field("credentials", &self.credentials)
            .finish()
    }
}
