/*!
Credential store for a TLS session.

Holds the trusted CA chain, the client identity and the engine configuration.
Each slot remembers whether the session parsed the object itself
([`Slot::Owned`]) or was handed an externally constructed one
([`Slot::External`]); only owned objects are released with the session.
*/

use std::fmt;
use std::sync::Arc;

use log::{debug, error};
use parking_lot::Mutex;

use crate::core::engine::TlsBackend;
use crate::core::error::{EngineError, Error, Result};

/// Credential slot tagged with its ownership
pub enum Slot<T> {
    /// Parsed or created by the session; released with it
    Owned(Box<T>),
    /// Supplied by the caller; the session holds a shared reference only
    External(Arc<T>),
}

impl<T> Slot<T> {
    /// Borrow the held object
    pub fn get(&self) -> &T {
        match self {
            Slot::Owned(value) => value,
            Slot::External(value) => value,
        }
    }

    /// Whether the session allocated this object
    pub fn is_owned(&self) -> bool {
        matches!(self, Slot::Owned(_))
    }
}

impl<T> fmt::Debug for Slot<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Slot::Owned(_) => write!(f, "Owned"),
            Slot::External(_) => write!(f, "External"),
        }
    }
}

/// CA chain, client identity and configuration of one session
pub struct Credentials<B: TlsBackend> {
    ca_chain: Option<Slot<B::Certificate>>,
    own_cert: Option<Slot<B::Identity>>,
    config: Option<Slot<Mutex<B::Config>>>,
}

impl<B: TlsBackend> Default for Credentials<B> {
    fn default() -> Self {
        Self {
            ca_chain: None,
            own_cert: None,
            config: None,
        }
    }
}

fn credential_error(what: &str, cause: EngineError) -> Error {
    error!("Failed to parse {}: {}", what, cause);
    Error::Parameter(format!("{}: {}", what, cause))
}

impl<B: TlsBackend> Credentials<B> {
    /// Create an empty store
    pub fn new() -> Self {
        Self::default()
    }

    /// The configuration, created on first use
    pub fn config(&mut self) -> Result<&Mutex<B::Config>> {
        if self.config.is_none() {
            let config = B::default_config().map_err(|e| {
                error!("Failed to create TLS configuration: {}", e);
                Error::NoMemory
            })?;
            debug!("Created default TLS configuration");
            self.config = Some(Slot::Owned(Box::new(Mutex::new(config))));
        }
        match &self.config {
            Some(slot) => Ok(slot.get()),
            None => Err(Error::NoMemory),
        }
    }

    /// The configuration if one exists, without creating it
    pub fn existing_config(&self) -> Option<&Mutex<B::Config>> {
        self.config.as_ref().map(Slot::get)
    }

    /// Whether the configuration was created by this session
    pub fn owns_config(&self) -> bool {
        self.config.as_ref().is_some_and(Slot::is_owned)
    }

    /// Replace the configuration with an external one, or drop it entirely.
    ///
    /// The previous configuration is released if owned. Installed credentials
    /// are not carried over.
    pub fn set_config(&mut self, config: Option<Arc<Mutex<B::Config>>>) {
        self.config = config.map(Slot::External);
    }

    /// Parse and install a CA chain
    pub fn set_root_ca(&mut self, data: &[u8]) -> Result<()> {
        let chain = B::parse_certificates(data).map_err(|e| credential_error("CA chain", e))?;
        self.install_ca_chain(Slot::Owned(Box::new(chain)))
    }

    /// Install (or clear) an external CA chain
    pub fn set_ca_chain(&mut self, chain: Option<Arc<B::Certificate>>) -> Result<()> {
        match chain {
            Some(chain) => self.install_ca_chain(Slot::External(chain)),
            None => {
                if let Some(config) = self.existing_config() {
                    B::install_ca_chain(&mut config.lock(), None)
                        .map_err(|e| credential_error("CA chain", e))?;
                }
                self.ca_chain = None;
                Ok(())
            }
        }
    }

    fn install_ca_chain(&mut self, slot: Slot<B::Certificate>) -> Result<()> {
        {
            let config = self.config()?;
            B::install_ca_chain(&mut config.lock(), Some(slot.get()))
                .map_err(|e| credential_error("CA chain", e))?;
        }
        // Releases the previous chain if it was ours.
        self.ca_chain = Some(slot);
        Ok(())
    }

    /// Parse and install a client certificate and private key
    pub fn set_client_identity(&mut self, cert: &[u8], key: &[u8]) -> Result<()> {
        let identity =
            B::parse_identity(cert, key).map_err(|e| credential_error("client identity", e))?;
        self.install_identity(Slot::Owned(Box::new(identity)))
    }

    /// Install (or clear) an external client identity
    pub fn set_own_cert(&mut self, identity: Option<Arc<B::Identity>>) -> Result<()> {
        match identity {
            Some(identity) => self.install_identity(Slot::External(identity)),
            None => {
                if let Some(config) = self.existing_config() {
                    B::install_identity(&mut config.lock(), None)
                        .map_err(|e| credential_error("client identity", e))?;
                }
                self.own_cert = None;
                Ok(())
            }
        }
    }

    fn install_identity(&mut self, slot: Slot<B::Identity>) -> Result<()> {
        {
            let config = self.config()?;
            B::install_identity(&mut config.lock(), Some(slot.get()))
                .map_err(|e| credential_error("client identity", e))?;
        }
        self.own_cert = Some(slot);
        Ok(())
    }

    /// Installed CA chain
    pub fn ca_chain(&self) -> Option<&B::Certificate> {
        self.ca_chain.as_ref().map(Slot::get)
    }

    /// Installed client identity
    pub fn own_cert(&self) -> Option<&B::Identity> {
        self.own_cert.as_ref().map(Slot::get)
    }

    /// Whether the CA chain was parsed by this session
    pub fn owns_ca_chain(&self) -> bool {
        self.ca_chain.as_ref().is_some_and(Slot::is_owned)
    }

    /// Whether the client identity was parsed by this session
    pub fn owns_own_cert(&self) -> bool {
        self.own_cert.as_ref().is_some_and(Slot::is_owned)
    }
}

impl<B: TlsBackend> fmt::Debug for Credentials<B> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("ca_chain", &self.ca_chain)
            .field("own_cert", &self.own_cert)
            .field("config", &self.config)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_slot_ownership() {
        let owned = Slot::Owned(Box::new(7u32));
        assert!(owned.is_owned());
        assert_eq!(*owned.get(), 7);

        let shared = Arc::new(9u32);
        let external = Slot::External(Arc::clone(&shared));
        assert!(!external.is_owned());
        assert_eq!(*external.get(), 9);
        assert_eq!(Arc::strong_count(&shared), 2);

        drop(external);
        assert_eq!(Arc::strong_count(&shared), 1);
    }
}
