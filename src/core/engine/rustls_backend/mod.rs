/*!
rustls implementation of the TLS engine capability.

Certificates and keys are accepted as PEM (detected by the `-----BEGIN`
armor) or DER. Trailing NUL bytes, as left by C-string buffers, are ignored.
*/

pub mod config;
pub mod context;
pub mod verifier;

use std::sync::Arc;

use log::debug;
use parking_lot::Mutex;
use rustls::ClientConfig;
use rustls::client::danger::ServerCertVerifier;
use rustls::crypto::CryptoProvider;
use rustls::pki_types::{CertificateDer, PrivateKeyDer, PrivatePkcs8KeyDer, ServerName};

pub use self::config::{CertificateChain, ClientIdentity, ProtocolVersions, RustlsConfig, VerifyMode};
pub use self::context::RustlsContext;
use self::verifier::{NoVerification, PolicyVerifier};
use crate::core::constants::PLACEHOLDER_SERVER_NAME;
use crate::core::engine::{TlsBackend, VerifyPolicy};
use crate::core::error::EngineError;

/// TLS engine backed by rustls with the ring crypto provider
#[derive(Debug, Clone, Copy, Default)]
pub struct RustlsBackend;

fn provider() -> Arc<CryptoProvider> {
    Arc::new(rustls::crypto::ring::default_provider())
}

fn trim_nul(data: &[u8]) -> &[u8] {
    let end = data.iter().rposition(|&b| b != 0).map_or(0, |i| i + 1);
    &data[..end]
}

fn is_pem(data: &[u8]) -> bool {
    data.windows(10).any(|window| window == b"-----BEGIN")
}

/// Parse one or more certificates from PEM or a single DER certificate
pub fn parse_certificates(data: &[u8]) -> Result<Vec<CertificateDer<'static>>, EngineError> {
    let data = trim_nul(data);
    if data.is_empty() {
        return Err(EngineError::Credential("empty certificate data".into()));
    }

    let certs = if is_pem(data) {
        rustls_pemfile::certs(&mut &data[..])
            .collect::<Result<Vec<_>, _>>()
            .map_err(|e| EngineError::Credential(format!("invalid PEM: {}", e)))?
    } else {
        vec![CertificateDer::from(data.to_vec())]
    };

    if certs.is_empty() {
        return Err(EngineError::Credential("no certificate found".into()));
    }
    for cert in &certs {
        x509_parser::parse_x509_certificate(cert.as_ref())
            .map_err(|e| EngineError::Credential(format!("invalid certificate: {}", e)))?;
    }
    Ok(certs)
}

/// Parse a private key from PEM, or from DER as PKCS#8
pub fn parse_private_key(data: &[u8]) -> Result<PrivateKeyDer<'static>, EngineError> {
    let data = trim_nul(data);
    if data.is_empty() {
        return Err(EngineError::Credential("empty private key".into()));
    }

    let key = if is_pem(data) {
        rustls_pemfile::private_key(&mut &data[..])
            .map_err(|e| EngineError::Credential(format!("invalid PEM: {}", e)))?
            .ok_or_else(|| EngineError::Credential("no private key found".into()))?
    } else {
        PrivateKeyDer::Pkcs8(PrivatePkcs8KeyDer::from(data.to_vec()))
    };

    // Make sure the provider can actually sign with it
    provider()
        .key_provider
        .load_private_key(key.clone_key())
        .map_err(|e| EngineError::Credential(format!("unusable private key: {}", e)))?;
    Ok(key)
}

impl TlsBackend for RustlsBackend {
    type Config = RustlsConfig;
    type Certificate = CertificateChain;
    type Identity = ClientIdentity;
    type Context = RustlsContext;

    fn default_config() -> Result<RustlsConfig, EngineError> {
        Ok(RustlsConfig::new())
    }

    fn parse_certificates(data: &[u8]) -> Result<CertificateChain, EngineError> {
        let certs = parse_certificates(data)?;
        debug!("Parsed {} certificates", certs.len());
        Ok(CertificateChain::new(certs))
    }

    fn parse_identity(cert: &[u8], key: &[u8]) -> Result<ClientIdentity, EngineError> {
        let chain = parse_certificates(cert)?;
        let key = parse_private_key(key)?;
        Ok(ClientIdentity::new(chain, key))
    }

    fn install_ca_chain(
        config: &mut RustlsConfig,
        chain: Option<&CertificateChain>,
    ) -> Result<(), EngineError> {
        config.set_trust_anchors(chain)
    }

    fn install_identity(
        config: &mut RustlsConfig,
        identity: Option<&ClientIdentity>,
    ) -> Result<(), EngineError> {
        config.set_identity(identity);
        Ok(())
    }

    fn set_verify_policy(config: &mut RustlsConfig, policy: VerifyPolicy) {
        config.set_verify_policy(policy);
    }

    fn new_context(config: &RustlsConfig, hostname: Option<&str>) -> Result<RustlsContext, EngineError> {
        config.validate()?;

        let provider = provider();
        let outcome = Arc::new(Mutex::new(None));
        let verifier: Arc<dyn ServerCertVerifier> = match config.verify_mode() {
            VerifyMode::Required => Arc::new(PolicyVerifier::new(
                config.roots().clone(),
                Arc::clone(&provider),
                config.policy(),
                hostname.is_some(),
                Arc::clone(&outcome),
            )?),
            VerifyMode::None => Arc::new(NoVerification::new(Arc::clone(&provider))),
        };

        let builder = ClientConfig::builder_with_provider(provider)
            .with_protocol_versions(config.protocol_versions().versions())
            .map_err(|e| EngineError::Protocol(e.to_string()))?
            .dangerous()
            .with_custom_certificate_verifier(verifier);

        let mut client = match config.identity() {
            Some((chain, key)) => builder
                .with_client_auth_cert(chain, key)
                .map_err(|e| EngineError::Credential(e.to_string()))?,
            None => builder.with_no_client_auth(),
        };
        client.alpn_protocols = config.alpn_protocols().to_vec();
        client.enable_sni = hostname.is_some();

        let name = hostname.unwrap_or(PLACEHOLDER_SERVER_NAME).to_string();
        let server_name = ServerName::try_from(name)
            .map_err(|e| EngineError::Credential(format!("invalid server name: {}", e)))?;

        let conn = rustls::ClientConnection::new(Arc::new(client), server_name)
            .map_err(|e| EngineError::Protocol(e.to_string()))?;
        Ok(RustlsContext::new(
            conn,
            outcome,
            config.verify_mode() == VerifyMode::None,
        ))
    }
}
