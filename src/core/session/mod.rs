/*!
TLS session management.

This module provides the handshake state machine, the credential store and
the session type that ties them to a transport.
*/

// State management
pub mod state;

// CA chain, client identity and configuration
pub mod credentials;

// Session implementation
pub mod session;

// Re-export main session types
pub use self::credentials::{Credentials, Slot};
pub use self::session::TlsSocketWrapper;
pub use self::state::{HandshakeState, StateManager, TransportControl};

/// Session over the rustls backend
#[cfg(feature = "rustls-backend")]
pub type TlsSocket<T> = TlsSocketWrapper<crate::core::engine::rustls_backend::RustlsBackend, T>;
