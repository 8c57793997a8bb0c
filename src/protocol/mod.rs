//! Socket-facing surface of TLS sessions.
//!
//! This module contains the session builder, the `Socket` implementation
//! that makes a session drop-in substitutable for a plain socket, and the
//! std::io adapters.

// Builder
pub mod builder;

// Socket trait implementation
pub mod socket;

// std::io adapters and extension traits
pub mod stream;

// Re-export for convenience
pub use builder::TlsSocketBuilder;
#[cfg(feature = "rustls-backend")]
pub use builder::client;
pub use stream::{TlsReadExt, TlsWriteExt};
