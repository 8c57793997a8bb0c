/*!
Configuration for the rustls backend.

This module provides the trust anchors, client identity and protocol options
that every rustls context created from a session is built from.
*/

use std::fmt;

use rustls::pki_types::{CertificateDer, PrivateKeyDer};
use rustls::{RootCertStore, SupportedProtocolVersion};

use crate::core::engine::verify::{self, VerifyPolicy};
use crate::core::error::EngineError;

/// Peer certificate verification mode
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum VerifyMode {
    /// Verify the server chain against the trust anchors
    #[default]
    Required,
    /// Accept any server certificate
    None,
}

static TLS13_ONLY: &[&SupportedProtocolVersion] = &[&rustls::version::TLS13];

/// TLS protocol versions offered to the server
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ProtocolVersions {
    /// TLS 1.2 and TLS 1.3
    #[default]
    All,
    /// TLS 1.3 only
    Tls13Only,
}

impl ProtocolVersions {
    /// rustls protocol version list
    pub fn versions(&self) -> &'static [&'static SupportedProtocolVersion] {
        match self {
            ProtocolVersions::All => rustls::ALL_VERSIONS,
            ProtocolVersions::Tls13Only => TLS13_ONLY,
        }
    }
}

/// Parsed certificate chain
#[derive(Debug, Clone)]
pub struct CertificateChain {
    certs: Vec<CertificateDer<'static>>,
}

impl CertificateChain {
    pub(crate) fn new(certs: Vec<CertificateDer<'static>>) -> Self {
        Self { certs }
    }

    /// Certificates in the order they were supplied
    pub fn certificates(&self) -> &[CertificateDer<'static>] {
        &self.certs
    }

    /// Number of certificates in the chain
    pub fn len(&self) -> usize {
        self.certs.len()
    }

    /// Whether the chain is empty
    pub fn is_empty(&self) -> bool {
        self.certs.is_empty()
    }
}

/// Client certificate chain and matching private key
pub struct ClientIdentity {
    chain: Vec<CertificateDer<'static>>,
    key: PrivateKeyDer<'static>,
}

impl ClientIdentity {
    pub(crate) fn new(chain: Vec<CertificateDer<'static>>, key: PrivateKeyDer<'static>) -> Self {
        Self { chain, key }
    }

    /// Client certificate chain, leaf first
    pub fn chain(&self) -> &[CertificateDer<'static>] {
        &self.chain
    }

    pub(crate) fn key(&self) -> PrivateKeyDer<'static> {
        self.key.clone_key()
    }
}

impl fmt::Debug for ClientIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ClientIdentity")
            .field("chain_len", &self.chain.len())
            .finish_non_exhaustive()
    }
}

/// rustls backend configuration
pub struct RustlsConfig {
    /// Trusted CA certificates
    roots: RootCertStore,
    /// Client certificate chain and key, if presenting one
    identity: Option<(Vec<CertificateDer<'static>>, PrivateKeyDer<'static>)>,
    /// Peer verification mode
    verify_mode: VerifyMode,
    /// ALPN protocols, in preference order
    alpn_protocols: Vec<Vec<u8>>,
    /// Offered protocol versions
    versions: ProtocolVersions,
    /// Overridable verification failures
    policy: VerifyPolicy,
}

impl Default for RustlsConfig {
    fn default() -> Self {
        Self::new()
    }
}

impl RustlsConfig {
    /// Client defaults: verification required, all protocol versions,
    /// date errors tolerated.
    pub fn new() -> Self {
        Self {
            roots: RootCertStore::empty(),
            identity: None,
            verify_mode: VerifyMode::Required,
            alpn_protocols: Vec::new(),
            versions: ProtocolVersions::All,
            policy: verify::default_policy(),
        }
    }

    /// TLS 1.3 only, and no verification failure is ever overridden
    pub fn strict() -> Self {
        Self {
            versions: ProtocolVersions::Tls13Only,
            policy: verify::strict_policy(),
            ..Self::new()
        }
    }

    /// Set the verification mode
    pub fn with_verify_mode(mut self, mode: VerifyMode) -> Self {
        self.verify_mode = mode;
        self
    }

    /// Set the ALPN protocols
    pub fn with_alpn_protocols(mut self, protocols: Vec<Vec<u8>>) -> Self {
        self.alpn_protocols = protocols;
        self
    }

    /// Set the offered protocol versions
    pub fn with_protocol_versions(mut self, versions: ProtocolVersions) -> Self {
        self.versions = versions;
        self
    }

    /// Set the verification policy
    pub fn with_verify_policy(mut self, policy: VerifyPolicy) -> Self {
        self.policy = policy;
        self
    }

    /// Change the verification mode in place
    pub fn set_verify_mode(&mut self, mode: VerifyMode) {
        self.verify_mode = mode;
    }

    /// Change the verification policy in place
    pub fn set_verify_policy(&mut self, policy: VerifyPolicy) {
        self.policy = policy;
    }

    /// Replace the trust anchors; `None` clears them
    pub fn set_trust_anchors(&mut self, chain: Option<&CertificateChain>) -> Result<(), EngineError> {
        let mut roots = RootCertStore::empty();
        if let Some(chain) = chain {
            let (added, ignored) = roots.add_parsable_certificates(chain.certificates().iter().cloned());
            if added == 0 {
                return Err(EngineError::Credential(format!(
                    "no usable trust anchor among {} certificates",
                    ignored
                )));
            }
        }
        self.roots = roots;
        Ok(())
    }

    /// Replace the client identity; `None` stops presenting one
    pub fn set_identity(&mut self, identity: Option<&ClientIdentity>) {
        self.identity = identity.map(|id| (id.chain().to_vec(), id.key()));
    }

    /// Peer verification mode
    pub fn verify_mode(&self) -> VerifyMode {
        self.verify_mode
    }

    /// Offered protocol versions
    pub fn protocol_versions(&self) -> ProtocolVersions {
        self.versions
    }

    /// ALPN protocols
    pub fn alpn_protocols(&self) -> &[Vec<u8>] {
        &self.alpn_protocols
    }

    /// Number of installed trust anchors
    pub fn trust_anchor_count(&self) -> usize {
        self.roots.len()
    }

    /// Whether a client identity is installed
    pub fn has_client_identity(&self) -> bool {
        self.identity.is_some()
    }

    pub(crate) fn roots(&self) -> &RootCertStore {
        &self.roots
    }

    pub(crate) fn identity(&self) -> Option<(Vec<CertificateDer<'static>>, PrivateKeyDer<'static>)> {
        self.identity
            .as_ref()
            .map(|(chain, key)| (chain.clone(), key.clone_key()))
    }

    pub(crate) fn policy(&self) -> VerifyPolicy {
        self.policy.clone()
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<(), EngineError> {
        if self.verify_mode == VerifyMode::Required && self.roots.is_empty() {
            return Err(EngineError::Credential(
                "peer verification required but no CA certificate installed".into(),
            ));
        }

        for protocol in &self.alpn_protocols {
            if protocol.is_empty() || protocol.len() > 255 {
                return Err(EngineError::Protocol(format!(
                    "invalid ALPN protocol length {}",
                    protocol.len()
                )));
            }
        }

        Ok(())
    }
}

impl fmt::Debug for RustlsConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RustlsConfig")
            .field("trust_anchors", &self.roots.len())
            .field("client_identity", &self.identity.is_some())
            .field("verify_mode", &self.verify_mode)
            .field("alpn_protocols", &self.alpn_protocols)
            .field("versions", &self.versions)
            .finish()
    }
}
