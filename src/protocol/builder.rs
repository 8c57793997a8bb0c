/*!
Session builder.

This module provides a builder pattern for creating TLS sessions with their
credentials, hostname and blocking policy configured up front.
*/

use std::sync::Arc;

use parking_lot::Mutex;

use crate::core::{
    engine::{TlsBackend, VerifyPolicy},
    error::Result,
    session::{TlsSocketWrapper, state::TransportControl},
    socket::{Socket, Timeout},
};

#[cfg(feature = "rustls-backend")]
use crate::core::engine::rustls_backend::RustlsBackend;

/// Builder for TLS sessions
pub struct TlsSocketBuilder<B: TlsBackend> {
    /// Server name for SNI and verification
    hostname: Option<String>,

    /// Transport lifecycle ownership
    control: TransportControl,

    /// Blocking policy
    timeout: Option<Timeout>,

    /// CA chain, PEM or DER
    root_ca: Option<Vec<u8>>,

    /// Client certificate and key, PEM or DER
    identity: Option<(Vec<u8>, Vec<u8>)>,

    /// Externally shared configuration
    config: Option<Arc<Mutex<B::Config>>>,

    /// Verification policy override
    policy: Option<VerifyPolicy>,
}

impl<B: TlsBackend> Default for TlsSocketBuilder<B> {
    fn default() -> Self {
        Self::new()
    }
}

impl<B: TlsBackend> TlsSocketBuilder<B> {
    /// Create a new builder: no hostname, session owns the transport
    /// lifecycle, blocking.
    pub fn new() -> Self {
        Self {
            hostname: None,
            control: TransportControl::default(),
            timeout: None,
            root_ca: None,
            identity: None,
            config: None,
            policy: None,
        }
    }

    /// Set the server name
    pub fn with_hostname(mut self, hostname: &str) -> Self {
        self.hostname = Some(hostname.to_string());
        self
    }

    /// Set which transport operations the session performs
    pub fn with_transport_control(mut self, control: TransportControl) -> Self {
        self.control = control;
        self
    }

    /// Leave the transport lifecycle to the caller
    pub fn borrowed_transport(mut self) -> Self {
        self.control = TransportControl::None;
        self
    }

    /// Set the blocking policy
    pub fn with_timeout(mut self, timeout: Timeout) -> Self {
        self.timeout = Some(timeout);
        self
    }

    /// Blocking (`true`) or non-blocking (`false`)
    pub fn with_blocking(self, blocking: bool) -> Self {
        self.with_timeout(if blocking {
            Timeout::Infinite
        } else {
            Timeout::Immediate
        })
    }

    /// Trust the given CA chain (PEM or DER)
    pub fn with_root_ca(mut self, ca: impl Into<Vec<u8>>) -> Self {
        self.root_ca = Some(ca.into());
        self
    }

    /// Present a client certificate and key (PEM or DER)
    pub fn with_client_cert_key(mut self, cert: impl Into<Vec<u8>>, key: impl Into<Vec<u8>>) -> Self {
        self.identity = Some((cert.into(), key.into()));
        self
    }

    /// Use an externally shared configuration
    pub fn with_ssl_config(mut self, config: Arc<Mutex<B::Config>>) -> Self {
        self.config = Some(config);
        self
    }

    /// Override the verification policy
    pub fn with_verify_policy(mut self, policy: VerifyPolicy) -> Self {
        self.policy = Some(policy);
        self
    }

    /// Build a session over `transport`
    pub fn build<T: Socket>(self, transport: T) -> Result<TlsSocketWrapper<B, T>> {
        let mut session = TlsSocketWrapper::new(transport, self.hostname.as_deref(), self.control)?;

        if let Some(config) = self.config {
            session.set_ssl_config(Some(config));
        }
        if let Some(policy) = self.policy {
            session.set_verify_policy(policy)?;
        }
        if let Some(ca) = self.root_ca {
            session.set_root_ca_cert(&ca)?;
        }
        if let Some((cert, key)) = self.identity {
            session.set_client_cert_key(&cert, &key)?;
        }
        if let Some(timeout) = self.timeout {
            session.set_timeout(timeout);
        }

        Ok(session)
    }
}

/// Builder for a rustls client session to `hostname`
#[cfg(feature = "rustls-backend")]
pub fn client(hostname: &str) -> TlsSocketBuilder<RustlsBackend> {
    TlsSocketBuilder::new().with_hostname(hostname)
}
