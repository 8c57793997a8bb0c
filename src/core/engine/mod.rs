/*!
TLS engine capability.

The session state machine is generic over a [`TlsBackend`]: the backend owns
configuration, credential parsing and context creation, and its
[`TlsContext`] runs the handshake and record layer. Every context call reports
one of four outcomes: success, `EngineError::WantRead`,
`EngineError::WantWrite`, or a fatal `EngineError`.
*/

pub mod bridge;
pub mod verify;

#[cfg(feature = "rustls-backend")]
pub mod rustls_backend;

pub use self::bridge::IoBridge;
pub use self::verify::{VerifyFailure, VerifyPolicy};

use crate::core::error::EngineError;

/// Per-connection engine state driven by the session
pub trait TlsContext {
    /// Advance the handshake by as much as the transport allows
    fn handshake(&mut self, io: &mut IoBridge<'_>) -> Result<(), EngineError>;

    /// Encrypt and send application data
    fn write(&mut self, io: &mut IoBridge<'_>, data: &[u8]) -> Result<usize, EngineError>;

    /// Receive and decrypt application data.
    ///
    /// Returns `Err(EngineError::PeerClosed)` once the peer has shut down.
    fn read(&mut self, io: &mut IoBridge<'_>, buf: &mut [u8]) -> Result<usize, EngineError>;

    /// Send close_notify and flush it
    fn close_notify(&mut self, io: &mut IoBridge<'_>) -> Result<(), EngineError>;

    /// DER encoding of the peer's end-entity certificate, if known
    fn peer_certificate(&self) -> Option<Vec<u8>>;

    /// Verification failure that was overridden by policy, if any
    fn verify_result(&self) -> Option<VerifyFailure>;
}

/// TLS engine factory and configuration surface
pub trait TlsBackend {
    /// Engine configuration shared by contexts it creates
    type Config: Send;
    /// Parsed CA chain
    type Certificate: Send + Sync;
    /// Parsed client certificate chain and private key
    type Identity: Send + Sync;
    /// Per-connection engine state
    type Context: TlsContext;

    /// Default client configuration: peer verification required, clock-skew
    /// verify policy.
    fn default_config() -> Result<Self::Config, EngineError>;

    /// Parse one or more PEM or DER certificates
    fn parse_certificates(data: &[u8]) -> Result<Self::Certificate, EngineError>;

    /// Parse a client certificate chain and its private key
    fn parse_identity(cert: &[u8], key: &[u8]) -> Result<Self::Identity, EngineError>;

    /// Install (or clear) the trusted CA chain
    fn install_ca_chain(
        config: &mut Self::Config,
        chain: Option<&Self::Certificate>,
    ) -> Result<(), EngineError>;

    /// Install (or clear) the client identity
    fn install_identity(
        config: &mut Self::Config,
        identity: Option<&Self::Identity>,
    ) -> Result<(), EngineError>;

    /// Replace the verification policy
    fn set_verify_policy(config: &mut Self::Config, policy: VerifyPolicy);

    /// Create the per-connection context, with SNI when a hostname is given
    fn new_context(
        config: &Self::Config,
        hostname: Option<&str>,
    ) -> Result<Self::Context, EngineError>;
}
