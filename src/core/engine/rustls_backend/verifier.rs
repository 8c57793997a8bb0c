/*!
Server certificate verifiers for the rustls backend.

[`PolicyVerifier`] runs the regular webpki checks and consults the session's
[`VerifyPolicy`] when they fail. Overriding a date-range failure still
requires the chain to verify at the leaf's own validity start, so only the
clock is ignored, never the signatures or trust path.
*/

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use log::warn;
use parking_lot::Mutex;
use rustls::client::WebPkiServerVerifier;
use rustls::client::danger::{HandshakeSignatureValid, ServerCertVerified, ServerCertVerifier};
use rustls::crypto::{CryptoProvider, verify_tls12_signature, verify_tls13_signature};
use rustls::pki_types::{CertificateDer, ServerName, UnixTime};
use rustls::{CertificateError, DigitallySignedStruct, RootCertStore, SignatureScheme};

use crate::core::engine::verify::{VerifyFailure, VerifyPolicy};
use crate::core::error::EngineError;

/// Failure recorded by a verifier after the policy overrode it
pub type VerifyOutcome = Arc<Mutex<Option<VerifyFailure>>>;

/// Classify a rustls verification error
pub fn classify(error: &rustls::Error) -> VerifyFailure {
    match error {
        rustls::Error::InvalidCertificate(cert_error) => match cert_error {
            CertificateError::Expired | CertificateError::ExpiredContext { .. } => {
                VerifyFailure::Expired
            }
            CertificateError::NotValidYet | CertificateError::NotValidYetContext { .. } => {
                VerifyFailure::NotYetValid
            }
            CertificateError::NotValidForName | CertificateError::NotValidForNameContext { .. } => {
                VerifyFailure::NameMismatch
            }
            CertificateError::UnknownIssuer => VerifyFailure::UnknownIssuer,
            other => VerifyFailure::Other(format!("{:?}", other)),
        },
        other => VerifyFailure::Other(other.to_string()),
    }
}

/// One second into the certificate's validity period
fn validity_start(cert: &CertificateDer<'_>) -> Option<UnixTime> {
    let (_, parsed) = x509_parser::parse_x509_certificate(cert.as_ref()).ok()?;
    let not_before = u64::try_from(parsed.validity().not_before.timestamp()).ok()?;
    Some(UnixTime::since_unix_epoch(Duration::from_secs(not_before + 1)))
}

/// webpki verification with policy-controlled overrides
pub struct PolicyVerifier {
    inner: Arc<WebPkiServerVerifier>,
    policy: VerifyPolicy,
    /// False when no hostname was configured
    check_name: bool,
    outcome: VerifyOutcome,
}

impl PolicyVerifier {
    /// Build a verifier over `roots`
    pub fn new(
        roots: RootCertStore,
        provider: Arc<CryptoProvider>,
        policy: VerifyPolicy,
        check_name: bool,
        outcome: VerifyOutcome,
    ) -> Result<Self, EngineError> {
        let inner = WebPkiServerVerifier::builder_with_provider(Arc::new(roots), provider)
            .build()
            .map_err(|e| EngineError::Credential(e.to_string()))?;
        Ok(Self {
            inner,
            policy,
            check_name,
            outcome,
        })
    }

    fn verify_at(
        &self,
        end_entity: &CertificateDer<'_>,
        intermediates: &[CertificateDer<'_>],
        server_name: &ServerName<'_>,
        ocsp_response: &[u8],
        now: UnixTime,
    ) -> Result<ServerCertVerified, rustls::Error> {
        match self
            .inner
            .verify_server_cert(end_entity, intermediates, server_name, ocsp_response, now)
        {
            // The name is checked after the chain, so the chain is good here.
            Err(e) if !self.check_name && classify(&e) == VerifyFailure::NameMismatch => {
                Ok(ServerCertVerified::assertion())
            }
            other => other,
        }
    }
}

impl fmt::Debug for PolicyVerifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PolicyVerifier")
            .field("check_name", &self.check_name)
            .finish_non_exhaustive()
    }
}

impl ServerCertVerifier for PolicyVerifier {
    fn verify_server_cert(
        &self,
        end_entity: &CertificateDer<'_>,
        intermediates: &[CertificateDer<'_>],
        server_name: &ServerName<'_>,
        ocsp_response: &[u8],
        now: UnixTime,
    ) -> Result<ServerCertVerified, rustls::Error> {
        let error = match self.verify_at(end_entity, intermediates, server_name, ocsp_response, now) {
            Ok(verified) => return Ok(verified),
            Err(error) => error,
        };

        let failure = classify(&error);
        if !(self.policy)(&failure) {
            return Err(error);
        }

        if failure.is_date_error() {
            let Some(start) = validity_start(end_entity) else {
                return Err(error);
            };
            self.verify_at(end_entity, intermediates, server_name, ocsp_response, start)?;
        }

        warn!("Certificate verification failure overridden: {}", failure);
        *self.outcome.lock() = Some(failure);
        Ok(ServerCertVerified::assertion())
    }

    fn verify_tls12_signature(
        &self,
        message: &[u8],
        cert: &CertificateDer<'_>,
        dss: &DigitallySignedStruct,
    ) -> Result<HandshakeSignatureValid, rustls::Error> {
        self.inner.verify_tls12_signature(message, cert, dss)
    }

    fn verify_tls13_signature(
        &self,
        message: &[u8],
        cert: &CertificateDer<'_>,
        dss: &DigitallySignedStruct,
    ) -> Result<HandshakeSignatureValid, rustls::Error> {
        self.inner.verify_tls13_signature(message, cert, dss)
    }

    fn supported_verify_schemes(&self) -> Vec<SignatureScheme> {
        self.inner.supported_verify_schemes()
    }
}

/// Accepts any server certificate; handshake signatures are still checked
#[derive(Debug)]
pub struct NoVerification {
    provider: Arc<CryptoProvider>,
}

impl NoVerification {
    pub fn new(provider: Arc<CryptoProvider>) -> Self {
        Self { provider }
    }
}

impl ServerCertVerifier for NoVerification {
    fn verify_server_cert(
        &self,
        _end_entity: &CertificateDer<'_>,
        _intermediates: &[CertificateDer<'_>],
        _server_name: &ServerName<'_>,
        _ocsp_response: &[u8],
        _now: UnixTime,
    ) -> Result<ServerCertVerified, rustls::Error> {
        Ok(ServerCertVerified::assertion())
    }

    fn verify_tls12_signature(
        &self,
        message: &[u8],
        cert: &CertificateDer<'_>,
        dss: &DigitallySignedStruct,
    ) -> Result<HandshakeSignatureValid, rustls::Error> {
        verify_tls12_signature(
            message,
            cert,
            dss,
            &self.provider.signature_verification_algorithms,
        )
    }

    fn verify_tls13_signature(
        &self,
        message: &[u8],
        cert: &CertificateDer<'_>,
        dss: &DigitallySignedStruct,
    ) -> Result<HandshakeSignatureValid, rustls::Error> {
        verify_tls13_signature(
            message,
            cert,
            dss,
            &self.provider.signature_verification_algorithms,
        )
    }

    fn supported_verify_schemes(&self) -> Vec<SignatureScheme> {
        self.provider
            .signature_verification_algorithms
            .supported_schemes()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_classify() {
        let expired = rustls::Error::InvalidCertificate(CertificateError::Expired);
        assert_eq!(classify(&expired), VerifyFailure::Expired);

        let future = rustls::Error::InvalidCertificate(CertificateError::NotValidYet);
        assert_eq!(classify(&future), VerifyFailure::NotYetValid);

        let issuer = rustls::Error::InvalidCertificate(CertificateError::UnknownIssuer);
        assert_eq!(classify(&issuer), VerifyFailure::UnknownIssuer);

        let name = rustls::Error::InvalidCertificate(CertificateError::NotValidForName);
        assert_eq!(classify(&name), VerifyFailure::NameMismatch);

        let other = rustls::Error::General("boom".into());
        assert!(matches!(classify(&other), VerifyFailure::Other(_)));
    }

    #[test]
    fn test_validity_start_rejects_garbage() {
        assert!(validity_start(&CertificateDer::from(vec![0u8; 8])).is_none());
    }
}
