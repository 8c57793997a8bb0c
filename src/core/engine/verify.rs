/*!
Certificate verification policy.

The engine's verifier reports each failure as a [`VerifyFailure`]; a
[`VerifyPolicy`] decides whether it is fatal. The default policy accepts
date-range failures, since the device clock may be unset or unsynchronized
at boot, and rejects everything else.
*/

use std::fmt;
use std::sync::Arc;

use sha2::{Digest, Sha256};

/// Classified peer certificate verification failure
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum VerifyFailure {
    /// Certificate validity period ended before the local clock
    Expired,
    /// Certificate validity period starts after the local clock
    NotYetValid,
    /// Certificate is not valid for the requested host name
    NameMismatch,
    /// Chain does not lead to a configured trust anchor
    UnknownIssuer,
    /// Any other verification failure
    Other(String),
}

impl VerifyFailure {
    /// Whether the failure is purely a date-range error
    pub fn is_date_error(&self) -> bool {
        matches!(self, VerifyFailure::Expired | VerifyFailure::NotYetValid)
    }
}

impl fmt::Display for VerifyFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            VerifyFailure::Expired => write!(f, "certificate expired"),
            VerifyFailure::NotYetValid => write!(f, "certificate not yet valid"),
            VerifyFailure::NameMismatch => write!(f, "certificate not valid for host name"),
            VerifyFailure::UnknownIssuer => write!(f, "unknown issuer"),
            VerifyFailure::Other(reason) => write!(f, "{}", reason),
        }
    }
}

/// Decides whether a verification failure may be overridden (`true`)
pub type VerifyPolicy = Arc<dyn Fn(&VerifyFailure) -> bool + Send + Sync>;

/// Accept date-range failures only
pub fn allow_clock_skew(failure: &VerifyFailure) -> bool {
    failure.is_date_error()
}

/// Default policy installed in new configurations
pub fn default_policy() -> VerifyPolicy {
    Arc::new(allow_clock_skew)
}

/// Policy that never overrides anything
pub fn strict_policy() -> VerifyPolicy {
    Arc::new(|_: &VerifyFailure| false)
}

/// Colon-separated uppercase SHA-256 fingerprint of a DER certificate
pub fn certificate_fingerprint(der: &[u8]) -> String {
    let digest = Sha256::digest(der);
    digest
        .iter()
        .map(|byte| format!("{:02X}", byte))
        .collect::<Vec<_>>()
        .join(":")
}
