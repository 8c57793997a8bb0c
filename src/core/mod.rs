//! Core components of the TLS socket wrapper.
//!
//! This module contains the socket capability, the TLS engine capability and
//! its rustls implementation, the session state machine, readiness
//! coordination and error handling.

// Socket capability and blocking policy
pub mod socket;

// TLS engine capability
pub mod engine;

// Session management
pub mod session;

// Readiness/timeout coordination
pub mod readiness;

// Transport implementations
pub mod transport;

// Constants
pub mod constants;

// Error handling
pub mod error;

// Re-exports for convenience
pub use self::constants::VERSION;
pub use self::error::{EngineError, Error, Result};
pub use self::session::{HandshakeState, TlsSocketWrapper, TransportControl};
pub use self::socket::{Sigio, Socket, Timeout};
